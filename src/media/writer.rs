use std::path::{Path, PathBuf};
use std::sync::{Arc, mpsc};
use std::thread::JoinHandle;

use parking_lot::{Condvar, Mutex};

use crate::foundation::cache::remove_if_exists;
use crate::foundation::error::{AssetError, AssetResult};
use crate::media::backend::{MediaBackend, SampleSink};
use crate::media::sample::{Sample, TrackKind, TrackSpec};

/// Lifecycle of a [`WriterSession`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriterState {
    Idle,
    Writing,
    Finalizing,
    Done,
    Failed,
}

impl WriterState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

#[derive(Debug)]
struct Gate {
    in_flight: usize,
    capacity: usize,
    failed: bool,
}

/// Per-channel "ready for more data" signal.
///
/// Bounds the samples queued between the producer and the sink worker. Producers block in
/// [`Readiness::wait_until_ready`] until the worker drains a slot or fails.
#[derive(Debug)]
pub struct Readiness {
    gate: Mutex<Gate>,
    cv: Condvar,
}

impl Readiness {
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            gate: Mutex::new(Gate {
                in_flight: 0,
                capacity: capacity.max(1),
                failed: false,
            }),
            cv: Condvar::new(),
        })
    }

    /// Block until a slot is free. Returns `false` once the consumer has failed.
    pub fn wait_until_ready(&self) -> bool {
        let mut gate = self.gate.lock();
        while gate.in_flight >= gate.capacity && !gate.failed {
            self.cv.wait(&mut gate);
        }
        !gate.failed
    }

    pub fn is_ready(&self) -> bool {
        let gate = self.gate.lock();
        !gate.failed && gate.in_flight < gate.capacity
    }

    pub fn has_failed(&self) -> bool {
        self.gate.lock().failed
    }

    pub fn in_flight(&self) -> usize {
        self.gate.lock().in_flight
    }

    fn acquire(&self) {
        self.gate.lock().in_flight += 1;
    }

    fn release(&self) {
        let mut gate = self.gate.lock();
        gate.in_flight = gate.in_flight.saturating_sub(1);
        drop(gate);
        self.cv.notify_all();
    }

    fn fail(&self) {
        self.gate.lock().failed = true;
        self.cv.notify_all();
    }
}

/// One output track plus its backing file.
///
/// Samples are appended in strictly increasing presentation order; times are rebased to the
/// session start given to [`WriterSession::start`]. A dedicated worker thread drains them into
/// the backend sink.
pub struct WriterSession {
    kind: TrackKind,
    path: PathBuf,
    state: WriterState,
    start: Option<f64>,
    last_pts: Option<f64>,
    appended: u64,
    readiness: Arc<Readiness>,
    sink: Option<Box<dyn SampleSink>>,
    tx: Option<mpsc::Sender<Sample>>,
    worker: Option<JoinHandle<AssetResult<()>>>,
}

impl std::fmt::Debug for WriterSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriterSession")
            .field("kind", &self.kind)
            .field("path", &self.path)
            .field("state", &self.state)
            .field("appended", &self.appended)
            .finish_non_exhaustive()
    }
}

impl WriterSession {
    /// Allocate the track writer. Any file already at `path` is removed first.
    pub fn open(
        backend: &dyn MediaBackend,
        path: &Path,
        spec: &TrackSpec,
        queue_depth: usize,
    ) -> AssetResult<Self> {
        remove_if_exists(path)?;
        let sink = backend.open_sink(path, spec)?;
        tracing::debug!(kind = ?spec.kind(), path = %path.display(), "writer session configured");
        Ok(Self {
            kind: spec.kind(),
            path: path.to_path_buf(),
            state: WriterState::Idle,
            start: None,
            last_pts: None,
            appended: 0,
            readiness: Readiness::new(queue_depth),
            sink: Some(sink),
            tx: None,
            worker: None,
        })
    }

    pub fn kind(&self) -> TrackKind {
        self.kind
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn state(&self) -> WriterState {
        self.state
    }

    /// Absolute time of the first sample, as given to `start`.
    pub fn session_start(&self) -> Option<f64> {
        self.start
    }

    /// Last appended presentation time, relative to the session start.
    pub fn last_pts(&self) -> Option<f64> {
        self.last_pts
    }

    pub fn appended(&self) -> u64 {
        self.appended
    }

    pub fn readiness(&self) -> Arc<Readiness> {
        self.readiness.clone()
    }

    /// Idle -> Writing. `at` becomes this track's time origin.
    pub fn start(&mut self, at: f64) -> AssetResult<()> {
        if self.state != WriterState::Idle {
            return Err(AssetError::configuration(format!(
                "cannot start writer session in state {:?}",
                self.state
            )));
        }
        let mut sink = self.sink.take().ok_or(AssetError::CouldNotWriteAsset)?;
        let (tx, rx) = mpsc::channel::<Sample>();
        let readiness = self.readiness.clone();

        let worker = std::thread::Builder::new()
            .name(format!("framecast-{:?}-writer", self.kind).to_lowercase())
            .spawn(move || -> AssetResult<()> {
                for sample in rx {
                    if let Err(e) = sink.write(sample) {
                        readiness.fail();
                        return Err(e);
                    }
                    readiness.release();
                }
                sink.finish().inspect_err(|_| readiness.fail())
            })?;

        self.start = Some(at);
        self.tx = Some(tx);
        self.worker = Some(worker);
        self.state = WriterState::Writing;
        Ok(())
    }

    /// Block until the track accepts another sample.
    pub fn wait_until_ready(&mut self) -> AssetResult<()> {
        if self.state != WriterState::Writing {
            return Err(AssetError::configuration("writer session is not writing"));
        }
        if self.readiness.wait_until_ready() {
            Ok(())
        } else {
            Err(self.collect_failure())
        }
    }

    /// Append a sample stamped with an absolute presentation time.
    pub fn append(&mut self, sample: Sample) -> AssetResult<()> {
        if self.state != WriterState::Writing {
            return Err(AssetError::configuration("writer session is not writing"));
        }
        if sample.kind() != self.kind {
            return Err(AssetError::configuration(format!(
                "{:?} sample appended to {:?} track",
                sample.kind(),
                self.kind
            )));
        }
        if self.readiness.has_failed() {
            return Err(self.collect_failure());
        }

        let rel = sample.pts() - self.start.unwrap_or(0.0);
        if let Some(last) = self.last_pts
            && rel <= last
        {
            return Err(AssetError::configuration(format!(
                "presentation time must strictly increase ({rel} <= {last})"
            )));
        }

        let Some(tx) = self.tx.as_ref() else {
            return Err(AssetError::CouldNotWriteAsset);
        };
        self.readiness.acquire();
        if tx.send(sample.with_pts(rel)).is_err() {
            self.readiness.release();
            return Err(self.collect_failure());
        }
        self.last_pts = Some(rel);
        self.appended += 1;
        Ok(())
    }

    /// Mark input finished and finalize the file.
    pub fn finish(mut self) -> AssetResult<PathBuf> {
        match self.state {
            WriterState::Idle => {
                self.state = WriterState::Finalizing;
                let sink = self.sink.take().ok_or(AssetError::CouldNotWriteAsset)?;
                match sink.finish() {
                    Ok(()) => self.done(),
                    Err(e) => {
                        self.state = WriterState::Failed;
                        Err(e)
                    }
                }
            }
            WriterState::Writing => {
                self.state = WriterState::Finalizing;
                drop(self.tx.take());
                match self.join_worker() {
                    Ok(()) => self.done(),
                    Err(e) => {
                        self.state = WriterState::Failed;
                        Err(e)
                    }
                }
            }
            WriterState::Failed => Err(AssetError::CouldNotWriteAsset),
            state => Err(AssetError::configuration(format!(
                "cannot finish writer session in state {state:?}"
            ))),
        }
    }

    /// Finalize on a background thread; `done` receives the outcome.
    ///
    /// When the thread cannot be spawned, `done` is never called and the spawn error is
    /// returned instead; the caller reports it in place of the outcome.
    pub fn finish_in_background(
        self,
        done: impl FnOnce(TrackKind, AssetResult<PathBuf>) + Send + 'static,
    ) -> AssetResult<()> {
        let kind = self.kind;
        std::thread::Builder::new()
            .name(format!("framecast-{kind:?}-finalize").to_lowercase())
            .spawn(move || {
                let res = self.finish();
                done(kind, res);
            })
            .map_err(|e| {
                tracing::warn!(?kind, error = %e, "failed to spawn finalize thread");
                AssetError::from(e)
            })?;
        Ok(())
    }

    fn done(&mut self) -> AssetResult<PathBuf> {
        self.state = WriterState::Done;
        tracing::debug!(kind = ?self.kind, samples = self.appended, "writer session done");
        Ok(self.path.clone())
    }

    fn join_worker(&mut self) -> AssetResult<()> {
        match self.worker.take() {
            Some(handle) => match handle.join() {
                Ok(res) => res,
                Err(_) => Err(AssetError::writer("writer thread panicked")),
            },
            None => Err(AssetError::CouldNotWriteAsset),
        }
    }

    /// Transition to `Failed` and return the sink's own error when it reported one.
    fn collect_failure(&mut self) -> AssetError {
        self.state = WriterState::Failed;
        drop(self.tx.take());
        match self.join_worker() {
            Err(e) => e,
            Ok(()) => AssetError::CouldNotWriteAsset,
        }
    }
}

impl Drop for WriterSession {
    fn drop(&mut self) {
        drop(self.tx.take());
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/media/writer.rs"]
mod tests;
