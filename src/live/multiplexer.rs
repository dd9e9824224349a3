use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, mpsc};

use parking_lot::Mutex;

use crate::encode::pixel::PixelBuffer;
use crate::foundation::cache::CacheDir;
use crate::foundation::core::Affine;
use crate::foundation::error::{AssetError, AssetResult};
use crate::foundation::rendezvous::Rendezvous;
use crate::live::merge::{ChannelFiles, merge_channels};
use crate::media::backend::MediaBackend;
use crate::media::sample::{
    AudioSample, AudioTrackSpec, Sample, TrackKind, TrackSpec, VideoSample, VideoTrackSpec,
};
use crate::media::writer::{WriterSession, WriterState};

/// Source channel of a live buffer.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    Video,
    MicAudio,
    AppAudio,
}

impl ChannelKind {
    pub const ALL: [Self; 3] = [Self::Video, Self::MicAudio, Self::AppAudio];

    pub fn track_kind(self) -> TrackKind {
        match self {
            Self::Video => TrackKind::Video,
            Self::MicAudio | Self::AppAudio => TrackKind::Audio,
        }
    }

    /// Intermediate track file name. Stable across sessions so a file left behind by an
    /// interrupted capture is replaced by the next one.
    fn file_name(self) -> &'static str {
        match self {
            Self::Video => "live-video.mov",
            Self::MicAudio => "live-mic.m4a",
            Self::AppAudio => "live-app.m4a",
        }
    }
}

/// One channel-tagged buffer from a live capture.
#[derive(Clone, Debug)]
pub struct LiveBuffer {
    pub channel: ChannelKind,
    pub sample: Sample,
}

impl LiveBuffer {
    /// A video buffer stamped with the capture clock.
    pub fn video(pts: f64, buffer: PixelBuffer) -> Self {
        Self {
            channel: ChannelKind::Video,
            sample: Sample::Video(VideoSample { pts, buffer }),
        }
    }

    pub fn mic(sample: AudioSample) -> Self {
        Self {
            channel: ChannelKind::MicAudio,
            sample: Sample::Audio(sample),
        }
    }

    pub fn app(sample: AudioSample) -> Self {
        Self {
            channel: ChannelKind::AppAudio,
            sample: Sample::Audio(sample),
        }
    }
}

/// Outcome of [`DualTrackLiveMultiplexer::push`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PushOutcome {
    Written,
    /// Dropped while paused.
    Paused,
    /// Dropped because its timestamp did not advance past the channel's last sample.
    OutOfOrder,
}

/// Live multiplexer settings.
#[derive(Clone, Debug)]
pub struct LiveOptions {
    pub fps: u32,
    pub transform: Affine,
    pub queue_depth: usize,
}

impl Default for LiveOptions {
    fn default() -> Self {
        Self {
            fps: crate::foundation::core::DEFAULT_PREFERRED_FPS,
            transform: Affine::IDENTITY,
            queue_depth: 4,
        }
    }
}

type TimeFn = Arc<dyn Fn(f64) + Send + Sync>;
type ChannelStates = Arc<Mutex<BTreeMap<ChannelKind, WriterState>>>;

/// Writes each live channel to its own track file, then merges them into one container.
///
/// Channels are allocated lazily on their first buffer, and that buffer's timestamp becomes
/// the channel's own session start. A failing channel does not cancel its siblings; the failure
/// is reported once every allocated channel has finished.
pub struct DualTrackLiveMultiplexer {
    backend: Arc<dyn MediaBackend>,
    cache: CacheDir,
    opts: LiveOptions,
    sessions: BTreeMap<ChannelKind, WriterSession>,
    states: ChannelStates,
    failures: BTreeMap<ChannelKind, AssetError>,
    paused: AtomicBool,
    current_time: Option<f64>,
    on_time: Option<TimeFn>,
    dropped: u64,
    finalized: bool,
}

impl std::fmt::Debug for DualTrackLiveMultiplexer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DualTrackLiveMultiplexer")
            .field("channels", &self.sessions.keys().collect::<Vec<_>>())
            .field("paused", &self.is_paused())
            .field("current_time", &self.current_time)
            .finish_non_exhaustive()
    }
}

impl DualTrackLiveMultiplexer {
    pub fn new(backend: Arc<dyn MediaBackend>, cache: CacheDir, opts: LiveOptions) -> Self {
        Self {
            backend,
            cache,
            opts,
            sessions: BTreeMap::new(),
            states: Arc::new(Mutex::new(BTreeMap::new())),
            failures: BTreeMap::new(),
            paused: AtomicBool::new(false),
            current_time: None,
            on_time: None,
            dropped: 0,
            finalized: false,
        }
    }

    /// Called with the new current time whenever a video buffer is written.
    pub fn on_current_time(&mut self, f: impl Fn(f64) + Send + Sync + 'static) {
        self.on_time = Some(Arc::new(f));
    }

    /// While paused, buffers of every channel are dropped.
    pub fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::SeqCst);
        tracing::debug!(paused, "live capture pause toggled");
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// Latest video timestamp minus the video channel's session start.
    pub fn current_time(&self) -> Option<f64> {
        self.current_time
    }

    /// Buffers dropped so far (paused or out of order).
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// `None` for channels that never received a buffer.
    pub fn channel_state(&self, channel: ChannelKind) -> Option<WriterState> {
        if let Some(session) = self.sessions.get(&channel) {
            return Some(session.state());
        }
        self.states.lock().get(&channel).copied()
    }

    /// Write one buffer to its channel's track.
    pub fn push(&mut self, buffer: LiveBuffer) -> AssetResult<PushOutcome> {
        if self.finalized {
            return Err(AssetError::configuration("live session is already finalized"));
        }
        if self.is_paused() {
            self.dropped += 1;
            return Ok(PushOutcome::Paused);
        }
        let LiveBuffer { channel, sample } = buffer;
        if sample.kind() != channel.track_kind() {
            return Err(AssetError::configuration(format!(
                "{:?} sample tagged as {channel:?}",
                sample.kind()
            )));
        }
        if let Some(e) = self.failures.get(&channel) {
            return Err(AssetError::writer(format!("{channel:?} channel failed: {e}")));
        }

        let pts = sample.pts();
        if !self.sessions.contains_key(&channel) {
            let session = self.allocate(channel, &sample)?;
            self.sessions.insert(channel, session);
        }
        let Some(session) = self.sessions.get_mut(&channel) else {
            return Err(AssetError::CouldNotWriteAsset);
        };

        let start = session.session_start().unwrap_or(pts);
        if let Some(last) = session.last_pts()
            && pts - start <= last
        {
            tracing::warn!(?channel, pts, "out-of-order live buffer dropped");
            self.dropped += 1;
            return Ok(PushOutcome::OutOfOrder);
        }

        let written = session
            .wait_until_ready()
            .and_then(|()| session.append(sample));
        if let Err(e) = written {
            tracing::warn!(?channel, error = %e, "live channel failed");
            let reported = AssetError::writer(format!("{channel:?} channel failed: {e}"));
            self.failures.insert(channel, e);
            return Err(reported);
        }

        if channel == ChannelKind::Video {
            let now = pts - start;
            self.current_time = Some(now);
            if let Some(cb) = &self.on_time {
                cb(now);
            }
        }
        Ok(PushOutcome::Written)
    }

    fn allocate(&self, channel: ChannelKind, first: &Sample) -> AssetResult<WriterSession> {
        let spec = match first {
            Sample::Video(v) => TrackSpec::Video(VideoTrackSpec {
                width: v.buffer.width,
                height: v.buffer.height,
                fps: self.opts.fps,
                transform: self.opts.transform,
            }),
            Sample::Audio(a) => TrackSpec::Audio(AudioTrackSpec {
                sample_rate: a.sample_rate,
                channels: a.channels,
            }),
        };
        let path = self.cache.fresh_path(channel.file_name())?;
        let mut session =
            WriterSession::open(self.backend.as_ref(), &path, &spec, self.opts.queue_depth)?;
        session.start(first.pts())?;
        self.states.lock().insert(channel, WriterState::Writing);
        tracing::debug!(?channel, start = first.pts(), "live channel allocated");
        Ok(session)
    }

    /// Finish every allocated channel, then merge them into `out`.
    ///
    /// Channels finalize concurrently; the merge runs on the thread of the last one to report.
    /// `completion` is called exactly once. Intermediate files are removed on every path.
    pub fn finalize(
        &mut self,
        out: impl Into<PathBuf>,
        completion: impl FnOnce(AssetResult<PathBuf>) + Send + 'static,
    ) {
        let out = out.into();
        if self.finalized {
            completion(Err(AssetError::configuration(
                "live session is already finalized",
            )));
            return;
        }
        self.finalized = true;

        let sessions = std::mem::take(&mut self.sessions);
        self.remove_stale_channels(&sessions);
        if !sessions.contains_key(&ChannelKind::Video) {
            let err = if sessions.is_empty() {
                AssetError::NoFrames
            } else {
                AssetError::CouldNotAccessVideoTrack
            };
            let files = ChannelFiles {
                video: None,
                audio: sessions.values().map(|s| s.path().to_path_buf()).collect(),
            };
            drop(sessions);
            files.remove_all();
            completion(Err(err));
            return;
        }

        let failures = std::mem::take(&mut self.failures);
        let backend = self.backend.clone();
        tracing::debug!(channels = sessions.len(), "live session finalizing");

        let rendezvous = Rendezvous::new(
            sessions.len(),
            move |mut results: Vec<(ChannelKind, AssetResult<PathBuf>)>| {
                results.sort_by_key(|(channel, _)| *channel);

                let mut files = ChannelFiles::default();
                let mut first_error = None;
                for (channel, res) in results {
                    match res {
                        Ok(path) if channel == ChannelKind::Video => files.video = Some(path),
                        Ok(path) => files.audio.push(path),
                        Err(e) => {
                            let e = match failures.get(&channel) {
                                Some(orig) => AssetError::channel_failed(channel, orig),
                                None => AssetError::channel_failed(channel, e),
                            };
                            first_error.get_or_insert(e);
                        }
                    }
                }

                let merged = match first_error {
                    Some(e) => Err(e),
                    None => merge_channels(backend.as_ref(), &files, &out),
                };
                files.remove_all();
                match &merged {
                    Ok(path) => tracing::info!(path = %path.display(), "live capture merged"),
                    Err(e) => tracing::warn!(error = %e, "live capture merge failed"),
                }
                completion(merged);
            },
        );

        for (channel, session) in sessions {
            let states = self.states.clone();
            let path = session.path().to_path_buf();
            let cleanup = move |states: &ChannelStates, res: &AssetResult<PathBuf>| {
                let state = if res.is_ok() {
                    WriterState::Done
                } else {
                    ChannelFiles {
                        video: Some(path.clone()),
                        audio: Vec::new(),
                    }
                    .remove_all();
                    WriterState::Failed
                };
                states.lock().insert(channel, state);
            };
            self.states.lock().insert(channel, WriterState::Finalizing);

            let on_done = cleanup.clone();
            let rv = rendezvous.clone();
            let spawned = session.finish_in_background(move |_kind, res| {
                on_done(&states, &res);
                rv.arrive((channel, res));
            });
            if let Err(e) = spawned {
                let res = Err(e);
                cleanup(&self.states, &res);
                rendezvous.arrive((channel, res));
            }
        }
    }

    /// Remove leftovers of channels this session never allocated.
    fn remove_stale_channels(&self, sessions: &BTreeMap<ChannelKind, WriterSession>) {
        let stale = ChannelFiles {
            video: None,
            audio: ChannelKind::ALL
                .into_iter()
                .filter(|channel| !sessions.contains_key(channel))
                .map(|channel| self.cache.root().join(channel.file_name()))
                .collect(),
        };
        stale.remove_all();
    }

    /// Blocking form of [`DualTrackLiveMultiplexer::finalize`].
    pub fn finalize_blocking(&mut self, out: impl Into<PathBuf>) -> AssetResult<PathBuf> {
        let (tx, rx) = mpsc::channel();
        self.finalize(out, move |res| {
            let _ = tx.send(res);
        });
        rx.recv()
            .map_err(|_| AssetError::unknown("live finalize completion was dropped"))?
    }
}

#[cfg(test)]
#[path = "../../tests/unit/live/multiplexer.rs"]
mod tests;
