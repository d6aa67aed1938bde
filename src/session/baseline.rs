use crate::exercise::{CounterSnapshot, ExerciseKey};
use tracing::debug;

/// Counter values at the moment the active question started.
///
/// Armed once per question index; arming the same index again is a no-op
/// until a different index has been armed.
#[derive(Debug, Clone, Default)]
pub struct RepBaseline {
    armed_for: Option<usize>,
    values: CounterSnapshot,
}

impl RepBaseline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Capture `snapshot` as the zero point for question `index`.
    /// Returns false if the baseline was already armed for `index`.
    pub fn set_baseline(&mut self, index: usize, snapshot: &CounterSnapshot) -> bool {
        if self.armed_for == Some(index) {
            return false;
        }
        debug!("Baseline for question {} armed at {:?}", index, snapshot);
        self.armed_for = Some(index);
        self.values = snapshot.clone();
        true
    }

    /// Replace the zero point for the question already armed. Used when the
    /// counters themselves were reset under it.
    pub fn rebase(&mut self, snapshot: &CounterSnapshot) {
        if let Some(index) = self.armed_for {
            debug!("Baseline for question {} rebased to {:?}", index, snapshot);
            self.values = snapshot.clone();
        }
    }

    pub fn armed_for(&self) -> Option<usize> {
        self.armed_for
    }

    pub fn is_armed_for(&self, index: usize) -> bool {
        self.armed_for == Some(index)
    }

    pub fn values(&self) -> &CounterSnapshot {
        &self.values
    }

    /// `max(0, current - baseline)` for one exercise
    pub fn reps_done(&self, key: ExerciseKey, snapshot: &CounterSnapshot) -> u32 {
        snapshot.get(key).saturating_sub(self.values.get(key))
    }

    /// Whether `key` has moved past its baseline value
    pub fn advanced(&self, key: ExerciseKey, snapshot: &CounterSnapshot) -> bool {
        snapshot.get(key) > self.values.get(key)
    }
}
