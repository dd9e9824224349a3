use std::sync::Arc;

use parking_lot::Mutex;

/// Progress callback. Invoked from background threads; marshaling is the caller's job.
pub type ProgressFn = Arc<dyn Fn(f64) + Send + Sync>;

/// A callback that drops every value.
pub fn noop_progress() -> ProgressFn {
    Arc::new(|_: f64| {})
}

/// Clamped, non-decreasing reporter for one run.
#[derive(Clone)]
pub struct StageProgress {
    sink: ProgressFn,
    last: Arc<Mutex<Option<f64>>>,
}

impl std::fmt::Debug for StageProgress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageProgress")
            .field("last", &self.last())
            .finish_non_exhaustive()
    }
}

impl StageProgress {
    pub fn new(sink: ProgressFn) -> Self {
        Self {
            sink,
            last: Arc::new(Mutex::new(None)),
        }
    }

    /// A reporter nobody listens to.
    pub fn detached() -> Self {
        Self::new(noop_progress())
    }

    /// Report `fraction`; values below the last reported one are swallowed.
    pub fn report(&self, fraction: f64) {
        let mut f = if fraction.is_nan() {
            0.0
        } else {
            fraction.clamp(0.0, 1.0)
        };
        if f > 1.0 - 1e-9 {
            f = 1.0;
        }
        // Held across the callback so concurrent reporters deliver in order.
        let mut last = self.last.lock();
        match *last {
            Some(prev) if f <= prev => return,
            _ => *last = Some(f),
        }
        (self.sink)(f);
    }

    pub fn finish(&self) {
        self.report(1.0);
    }

    /// Last value forwarded to the callback.
    pub fn last(&self) -> Option<f64> {
        *self.last.lock()
    }
}

/// Blends per-stage `[0, 1]` fractions into one overall value using fixed weights.
#[derive(Clone, Debug)]
pub struct ProgressBlender {
    offsets: Vec<f64>,
    weights: Vec<f64>,
    overall: StageProgress,
}

impl ProgressBlender {
    /// `weights` are normalized; an empty or all-zero slice behaves like a single stage.
    pub fn new(weights: &[f64], sink: ProgressFn) -> Self {
        let clean: Vec<f64> = weights
            .iter()
            .map(|w| if w.is_finite() && *w > 0.0 { *w } else { 0.0 })
            .collect();
        let total: f64 = clean.iter().sum();
        let weights = if total > 0.0 {
            clean.iter().map(|w| w / total).collect()
        } else {
            vec![1.0]
        };

        let mut offsets = Vec::with_capacity(weights.len());
        let mut acc = 0.0;
        for w in &weights {
            offsets.push(acc);
            acc += w;
        }

        Self {
            offsets,
            weights,
            overall: StageProgress::new(sink),
        }
    }

    pub fn stage_count(&self) -> usize {
        self.weights.len()
    }

    /// Reporter for stage `idx`. Out-of-range indices map onto the last stage.
    pub fn stage(&self, idx: usize) -> StageProgress {
        let idx = idx.min(self.weights.len() - 1);
        let offset = self.offsets[idx];
        let weight = self.weights[idx];
        let overall = self.overall.clone();
        StageProgress::new(Arc::new(move |local: f64| overall.report(offset + weight * local)))
    }

    pub fn finish(&self) {
        self.overall.finish();
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/progress.rs"]
mod tests;
