use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::RgbaImage;
use tokio_util::sync::CancellationToken;

use crate::foundation::cache::{CacheDir, remove_if_exists};
use crate::foundation::error::{AssetError, AssetResult};
use crate::foundation::progress::StageProgress;
use crate::foundation::rendezvous::Rendezvous;
use crate::media::backend::{MediaBackend, MediaInfo, MuxInput, MuxRequest, TrackInfo};
use crate::media::metadata::{MetadataItem, TimedMetadata};
use crate::media::sample::{AudioTrackSpec, TrackKind, TrackSpec, VideoTrackSpec};
use crate::media::writer::WriterSession;
use crate::paired::exif::encode_tagged_jpeg;
use crate::paired::still::{StillSource, select_still};

/// A still image and a video cross-referenced by a shared identifier.
#[derive(Clone, Debug, PartialEq)]
pub struct PairedAsset {
    pub still: PathBuf,
    pub video: PathBuf,
    pub identifier: String,
    /// Offset of the still frame inside the video, in seconds.
    pub still_time: f64,
    pub still_source: StillSource,
}

/// Fresh pairing identifier: an upper-case hyphenated UUID.
pub fn new_identifier() -> String {
    uuid::Uuid::new_v4().to_string().to_uppercase()
}

/// Builds paired assets from an encoded video.
#[derive(Clone, Debug)]
pub struct PairedAssetComposer {
    backend: Arc<dyn MediaBackend>,
    cache: CacheDir,
    queue_depth: usize,
    still_offset_fraction: f64,
    jpeg_quality: u8,
}

type LoopResult = (TrackKind, AssetResult<PathBuf>);

struct CopyLoop {
    backend: Arc<dyn MediaBackend>,
    source: PathBuf,
    spec: TrackSpec,
    out: PathBuf,
    queue_depth: usize,
    abort: CancellationToken,
    total: usize,
    progress: Option<StageProgress>,
}

impl CopyLoop {
    /// Append every sample of the source track to a fresh track file.
    fn run(self) -> AssetResult<PathBuf> {
        let kind = self.spec.kind();
        let mut reader = self.backend.open_reader(&self.source, kind)?;
        let mut session =
            WriterSession::open(self.backend.as_ref(), &self.out, &self.spec, self.queue_depth)?;
        session.start(0.0)?;

        let mut copied = 0usize;
        while let Some(sample) = reader.next_sample()? {
            if self.abort.is_cancelled() {
                return Err(AssetError::Cancelled);
            }
            session.wait_until_ready()?;
            session.append(sample)?;
            copied += 1;
            if let Some(p) = &self.progress
                && self.total > 0
            {
                p.report(0.9 * copied as f64 / self.total as f64);
            }
        }
        tracing::debug!(?kind, copied, "paired copy loop finished");
        session.finish()
    }
}

fn video_spec(track: &TrackInfo) -> AssetResult<TrackSpec> {
    let (width, height) = track
        .natural_size
        .ok_or(AssetError::CouldNotAccessVideoTrack)?;
    Ok(TrackSpec::Video(VideoTrackSpec {
        width,
        height,
        fps: track.frame_rate.map_or(30, |r| (r.round() as u32).max(1)),
        transform: track.transform,
    }))
}

fn audio_spec(track: &TrackInfo) -> TrackSpec {
    TrackSpec::Audio(AudioTrackSpec {
        sample_rate: track.sample_rate.unwrap_or(48_000),
        channels: track.channels.unwrap_or(2),
    })
}

impl PairedAssetComposer {
    pub fn new(backend: Arc<dyn MediaBackend>, cache: CacheDir) -> Self {
        Self {
            backend,
            cache,
            queue_depth: 4,
            still_offset_fraction: 0.5,
            jpeg_quality: 90,
        }
    }

    pub fn with_queue_depth(mut self, depth: usize) -> Self {
        self.queue_depth = depth;
        self
    }

    /// Still offset used when the video has no still-image-time marker.
    pub fn with_still_offset_fraction(mut self, fraction: f64) -> Self {
        self.still_offset_fraction = fraction;
        self
    }

    pub fn with_jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality;
        self
    }

    /// Pair `video` with a still.
    ///
    /// The video is re-muxed through two independent copy loops (video, and audio when
    /// present) joined by a [`Rendezvous`]; when one loop fails its sibling is aborted. The
    /// identifier item and still-image-time marker are attached to the final container.
    #[tracing::instrument(skip(self, still, progress), fields(video = %video.display()))]
    pub fn compose(
        &self,
        video: &Path,
        still: Option<RgbaImage>,
        progress: &StageProgress,
    ) -> AssetResult<PairedAsset> {
        let info = self.backend.probe(video)?;
        let track = info
            .video_track()
            .ok_or(AssetError::CouldNotAccessVideoTrack)?;
        let video_spec = video_spec(track)?;
        let audio_spec = info.audio_tracks().next().map(audio_spec);

        let identifier = new_identifier();
        let selected = select_still(
            self.backend.as_ref(),
            video,
            &info,
            still,
            self.still_offset_fraction,
        )?;
        let still_path = self.cache.fresh_path(&format!("paired-{identifier}.jpg"))?;
        let jpeg = encode_tagged_jpeg(&selected.image, self.jpeg_quality, &identifier)?;
        std::fs::write(&still_path, jpeg).map_err(|e| {
            AssetError::output_location(format!("'{}': {e}", still_path.display()))
        })?;
        tracing::debug!(source = ?selected.source, time = selected.time, "paired still written");

        let metadata = vec![MetadataItem::content_identifier(identifier.clone())];
        let timed_metadata = vec![TimedMetadata::still_image_time(selected.time)];

        let tracks = self.copy_tracks(video, &info, video_spec, audio_spec, progress);
        let tracks = match tracks {
            Ok(tracks) => tracks,
            Err(e) => {
                let _ = remove_if_exists(&still_path);
                return Err(e);
            }
        };

        let out = self.cache.fresh_path(&format!("paired-{identifier}.mov"))?;
        let muxed = self.backend.mux(&MuxRequest {
            inputs: tracks
                .iter()
                .map(|(kind, path)| MuxInput {
                    path: path.clone(),
                    kind: *kind,
                })
                .collect(),
            output: out.clone(),
            metadata,
            timed_metadata,
        });
        for (_, path) in &tracks {
            let _ = remove_if_exists(path);
        }
        if let Err(e) = muxed {
            let _ = remove_if_exists(&still_path);
            return Err(e);
        }

        progress.finish();
        tracing::info!(%identifier, still = %still_path.display(), video = %out.display(), "paired asset composed");
        Ok(PairedAsset {
            still: still_path,
            video: out,
            identifier,
            still_time: selected.time,
            still_source: selected.source,
        })
    }

    /// Run one copy loop per track and wait for all of them.
    fn copy_tracks(
        &self,
        video: &Path,
        info: &MediaInfo,
        video_spec: TrackSpec,
        audio_spec: Option<TrackSpec>,
        progress: &StageProgress,
    ) -> AssetResult<Vec<(TrackKind, PathBuf)>> {
        let abort = CancellationToken::new();
        let video_total = info.video_track().map_or(0, TrackInfo::sample_count);
        let mut loops = vec![(video_spec, Some(progress.clone()), video_total)];
        if let Some(spec) = audio_spec {
            loops.push((spec, None, 0));
        }

        // Every output path is allocated before any loop starts.
        let mut jobs = Vec::with_capacity(loops.len());
        for (spec, progress, total) in loops {
            let kind = spec.kind();
            let out = self.cache.unique_path(
                &format!("paired-{kind:?}").to_lowercase(),
                if kind == TrackKind::Video { "mov" } else { "m4a" },
            )?;
            jobs.push(CopyLoop {
                backend: self.backend.clone(),
                source: video.to_path_buf(),
                spec,
                out,
                queue_depth: self.queue_depth,
                abort: abort.clone(),
                total,
                progress,
            });
        }

        let expected = jobs.len();
        let (rendezvous, done) = Rendezvous::<LoopResult>::channel(expected);
        for job in jobs {
            let kind = job.spec.kind();
            let rv = rendezvous.clone();
            let loop_abort = abort.clone();
            let spawned = std::thread::Builder::new()
                .name(format!("framecast-paired-{kind:?}").to_lowercase())
                .spawn(move || {
                    let path = job.out.clone();
                    let res = job.run();
                    if let Err(e) = &res {
                        if !matches!(e, AssetError::Cancelled) {
                            tracing::warn!(?kind, error = %e, "paired copy loop failed; aborting sibling");
                        }
                        loop_abort.cancel();
                        let _ = remove_if_exists(&path);
                    }
                    rv.arrive((kind, res));
                });
            if let Err(e) = spawned {
                abort.cancel();
                rendezvous.arrive((kind, Err(AssetError::from(e))));
            }
        }

        let results = done
            .recv()
            .map_err(|_| AssetError::unknown("paired copy loops ended without reporting"))?;
        let mut tracks = Vec::with_capacity(expected);
        let mut first_error: Option<AssetError> = None;
        for (kind, res) in results {
            match res {
                Ok(path) => tracks.push((kind, path)),
                Err(AssetError::Cancelled) => {}
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }
        if first_error.is_some() || tracks.len() < expected {
            for (_, path) in &tracks {
                let _ = remove_if_exists(path);
            }
            return Err(first_error.unwrap_or(AssetError::Cancelled));
        }
        tracks.sort_by_key(|(kind, _)| *kind);
        Ok(tracks)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/paired/composer.rs"]
mod tests;
