//! Tool-free backend that stores every container as a JSON track manifest.
//!
//! Manifests keep sample times, sizes, transforms and metadata exactly, and a per-sample color
//! swatch in place of pixels, which makes them suited to tests and dry runs.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use image::RgbaImage;

use crate::encode::pixel::{PixelBuffer, PixelBufferConverter};
use crate::foundation::cache::{ensure_parent_dir, remove_if_exists};
use crate::foundation::core::Affine;
use crate::foundation::error::{AssetError, AssetResult};
use crate::media::backend::{
    MediaBackend, MediaInfo, MuxRequest, SampleReader, SampleSink, TrackInfo,
};
use crate::media::metadata::TimedMetadata;
use crate::media::sample::{AudioSample, Sample, TrackKind, TrackSpec, VideoSample};

const FORMAT_TAG: &str = "framecast-manifest/1";

/// Make sinks of one track kind fail once they have accepted `after_samples` samples.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FailurePlan {
    pub kind: TrackKind,
    pub after_samples: usize,
}

#[derive(Clone, Debug, Default)]
pub struct ManifestBackend {
    failure: Option<FailurePlan>,
    sample_delay: Option<Duration>,
}

impl ManifestBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_failure(mut self, plan: FailurePlan) -> Self {
        self.failure = Some(plan);
        self
    }

    /// Sleep for `delay` on every written sample, to emulate a slow encoder.
    pub fn with_sample_delay(mut self, delay: Duration) -> Self {
        self.sample_delay = Some(delay);
        self
    }
}

#[derive(Clone, Debug, Default, serde::Serialize, serde::Deserialize)]
struct ManifestFile {
    format: String,
    tracks: Vec<ManifestTrack>,
    #[serde(default)]
    metadata: BTreeMap<String, String>,
    #[serde(default)]
    timed_metadata: Vec<TimedMetadata>,
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
struct ManifestTrack {
    kind: TrackKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    natural_size: Option<(u32, u32)>,
    transform: Affine,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    frame_rate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sample_rate: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    channels: Option<u16>,
    samples: Vec<ManifestSample>,
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
struct ManifestSample {
    pts: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    swatch: Option<[u8; 4]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    frames: Option<usize>,
}

impl ManifestTrack {
    fn end_time(&self) -> f64 {
        let Some(last) = self.samples.last() else {
            return 0.0;
        };
        let len = match self.kind {
            TrackKind::Video => self.frame_rate.filter(|r| *r > 0.0).map_or(0.0, |r| 1.0 / r),
            TrackKind::Audio => match (last.frames, self.sample_rate) {
                (Some(n), Some(rate)) if rate > 0 => n as f64 / f64::from(rate),
                _ => 0.0,
            },
            TrackKind::Metadata => 0.0,
        };
        last.pts + len
    }

    fn info(&self) -> TrackInfo {
        TrackInfo {
            kind: self.kind,
            natural_size: self.natural_size,
            transform: self.transform,
            frame_rate: self.frame_rate,
            sample_rate: self.sample_rate,
            channels: self.channels,
            sample_times: self.samples.iter().map(|s| s.pts).collect(),
        }
    }
}

fn load(path: &Path) -> AssetResult<ManifestFile> {
    let bytes = std::fs::read(path).map_err(|e| {
        AssetError::composition(format!("failed to read '{}': {e}", path.display()))
    })?;
    let file: ManifestFile = serde_json::from_slice(&bytes).map_err(|e| {
        AssetError::composition(format!("'{}' is not a track manifest: {e}", path.display()))
    })?;
    if file.format != FORMAT_TAG {
        return Err(AssetError::composition(format!(
            "'{}' has unsupported manifest format '{}'",
            path.display(),
            file.format
        )));
    }
    Ok(file)
}

fn store(path: &Path, file: &ManifestFile) -> AssetResult<()> {
    let json = serde_json::to_vec_pretty(file)
        .map_err(|e| AssetError::writer(format!("manifest serialization failed: {e}")))?;
    std::fs::write(path, json)
        .map_err(|e| AssetError::writer(format!("failed to write '{}': {e}", path.display())))
}

fn first_track(file: &ManifestFile, kind: TrackKind, path: &Path) -> AssetResult<ManifestTrack> {
    file.tracks
        .iter()
        .find(|t| t.kind == kind)
        .cloned()
        .ok_or_else(|| missing_track(kind, path))
}

fn missing_track(kind: TrackKind, path: &Path) -> AssetError {
    match kind {
        TrackKind::Video => AssetError::CouldNotAccessVideoTrack,
        other => AssetError::composition(format!(
            "no {other:?} track in '{}'",
            path.display()
        )),
    }
}

fn solid_buffer(size: (u32, u32), swatch: [u8; 4]) -> AssetResult<PixelBuffer> {
    let img = RgbaImage::from_pixel(size.0, size.1, image::Rgba(swatch));
    PixelBufferConverter::convert_image(&img)
        .ok_or_else(|| AssetError::writer("manifest video track has an empty natural size"))
}

struct ManifestSink {
    path: PathBuf,
    track: ManifestTrack,
    fail_after: Option<usize>,
    delay: Option<Duration>,
}

impl SampleSink for ManifestSink {
    fn write(&mut self, sample: Sample) -> AssetResult<()> {
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        if let Some(limit) = self.fail_after
            && self.track.samples.len() >= limit
        {
            return Err(AssetError::writer(format!(
                "injected {:?} failure after {limit} samples",
                self.track.kind
            )));
        }

        let entry = match sample {
            Sample::Video(v) => {
                if Some((v.buffer.width, v.buffer.height)) != self.track.natural_size {
                    return Err(AssetError::writer(format!(
                        "pixel buffer is {}x{}, track expects {:?}",
                        v.buffer.width, v.buffer.height, self.track.natural_size
                    )));
                }
                ManifestSample {
                    pts: v.pts,
                    swatch: Some(v.buffer.swatch()),
                    frames: None,
                }
            }
            Sample::Audio(a) => ManifestSample {
                pts: a.pts,
                swatch: None,
                frames: Some(a.frames()),
            },
        };
        self.track.samples.push(entry);
        Ok(())
    }

    fn finish(self: Box<Self>) -> AssetResult<()> {
        let file = ManifestFile {
            format: FORMAT_TAG.to_string(),
            tracks: vec![self.track],
            ..ManifestFile::default()
        };
        store(&self.path, &file)
    }
}

struct ManifestReader {
    track: ManifestTrack,
    next: usize,
}

impl SampleReader for ManifestReader {
    fn next_sample(&mut self) -> AssetResult<Option<Sample>> {
        let Some(entry) = self.track.samples.get(self.next) else {
            return Ok(None);
        };
        self.next += 1;
        let sample = match self.track.kind {
            TrackKind::Video => {
                let size = self.track.natural_size.unwrap_or((0, 0));
                Sample::Video(VideoSample {
                    pts: entry.pts,
                    buffer: solid_buffer(size, entry.swatch.unwrap_or([0, 0, 0, 255]))?,
                })
            }
            TrackKind::Audio => {
                let channels = self.track.channels.unwrap_or(2);
                Sample::Audio(AudioSample {
                    pts: entry.pts,
                    sample_rate: self.track.sample_rate.unwrap_or(48_000),
                    channels,
                    pcm: vec![0.0; entry.frames.unwrap_or(0) * usize::from(channels)],
                })
            }
            TrackKind::Metadata => return Ok(None),
        };
        Ok(Some(sample))
    }
}

impl MediaBackend for ManifestBackend {
    fn name(&self) -> &'static str {
        "manifest"
    }

    fn open_sink(&self, path: &Path, spec: &TrackSpec) -> AssetResult<Box<dyn SampleSink>> {
        ensure_parent_dir(path)?;
        std::fs::File::create(path).map_err(|e| {
            AssetError::writer(format!("failed to create '{}': {e}", path.display()))
        })?;

        let track = match spec {
            TrackSpec::Video(v) => {
                if v.width == 0 || v.height == 0 || v.fps == 0 {
                    return Err(AssetError::configuration(
                        "video track needs non-zero size and fps",
                    ));
                }
                ManifestTrack {
                    kind: TrackKind::Video,
                    natural_size: Some((v.width, v.height)),
                    transform: v.transform,
                    frame_rate: Some(f64::from(v.fps)),
                    sample_rate: None,
                    channels: None,
                    samples: Vec::new(),
                }
            }
            TrackSpec::Audio(a) => ManifestTrack {
                kind: TrackKind::Audio,
                natural_size: None,
                transform: Affine::IDENTITY,
                frame_rate: None,
                sample_rate: Some(a.sample_rate),
                channels: Some(a.channels),
                samples: Vec::new(),
            },
        };

        let fail_after = self
            .failure
            .filter(|plan| plan.kind == spec.kind())
            .map(|plan| plan.after_samples);
        Ok(Box::new(ManifestSink {
            path: path.to_path_buf(),
            track,
            fail_after,
            delay: self.sample_delay,
        }))
    }

    fn probe(&self, path: &Path) -> AssetResult<MediaInfo> {
        let file = load(path)?;
        let duration = file
            .tracks
            .iter()
            .map(ManifestTrack::end_time)
            .fold(0.0, f64::max);
        Ok(MediaInfo {
            duration,
            tracks: file.tracks.iter().map(ManifestTrack::info).collect(),
            metadata: file.metadata,
            timed_metadata: file.timed_metadata,
        })
    }

    fn open_reader(&self, path: &Path, kind: TrackKind) -> AssetResult<Box<dyn SampleReader>> {
        let file = load(path)?;
        let track = first_track(&file, kind, path)?;
        Ok(Box::new(ManifestReader { track, next: 0 }))
    }

    fn frame_at(&self, path: &Path, seconds: f64) -> AssetResult<RgbaImage> {
        let file = load(path)?;
        let track = first_track(&file, TrackKind::Video, path)?;
        let (w, h) = track.natural_size.ok_or(AssetError::CouldNotAccessVideoTrack)?;
        let sample = track
            .samples
            .iter()
            .rev()
            .find(|s| s.pts <= seconds + 1e-9)
            .or_else(|| track.samples.first())
            .ok_or_else(|| {
                AssetError::composition(format!("'{}' has no video samples", path.display()))
            })?;
        Ok(RgbaImage::from_pixel(
            w,
            h,
            image::Rgba(sample.swatch.unwrap_or([0, 0, 0, 255])),
        ))
    }

    fn mux(&self, request: &MuxRequest) -> AssetResult<()> {
        let mut tracks = Vec::with_capacity(request.inputs.len());
        for input in &request.inputs {
            let file = load(&input.path)?;
            tracks.push(first_track(&file, input.kind, &input.path)?);
        }

        remove_if_exists(&request.output)?;
        ensure_parent_dir(&request.output)?;
        let file = ManifestFile {
            format: FORMAT_TAG.to_string(),
            tracks,
            metadata: request
                .metadata
                .iter()
                .map(|m| (m.key.wire_key().to_string(), m.value.clone()))
                .collect(),
            timed_metadata: request.timed_metadata.clone(),
        };
        store(&request.output, &file)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/media/manifest.rs"]
mod tests;
