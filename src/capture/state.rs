use crate::backend::Detection;
use crate::exercise::{CounterSnapshot, Landmark};

/// Latest detector output as seen by the rest of the session
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectionState {
    /// Bumped on every counter reset; snapshots carry the generation they
    /// were taken in
    pub generation: u64,
    pub counters: CounterSnapshot,
    pub landmarks: Vec<Landmark>,
    pub detected: bool,
    /// The remote reset for `generation` failed, so `counters` still holds
    /// the detector's running totals
    pub stale_remote: bool,
    pub frames_processed: u64,
}

impl DetectionState {
    /// Fold one detector response in. Counters are replaced wholesale.
    pub fn apply(&mut self, detection: Detection) {
        self.counters = detection.exercises;
        self.frames_processed += 1;

        if !detection.detected {
            self.detected = false;
            self.landmarks.clear();
            return;
        }

        self.detected = true;
        // An empty list is a glitch; keep the previous pose to avoid flicker
        if let Some(landmarks) = detection.landmarks.filter(|l| !l.is_empty()) {
            self.landmarks = landmarks;
        }
    }

    /// Remote counters were zeroed for `generation`
    pub fn begin_generation(&mut self, generation: u64) {
        self.generation = generation;
        self.counters = CounterSnapshot::zeroed();
        self.stale_remote = false;
    }

    /// Remote reset for `generation` failed; counters keep their running totals
    pub fn begin_stale_generation(&mut self, generation: u64) {
        self.generation = generation;
        self.stale_remote = true;
    }

    /// Drop everything that only makes sense while the camera runs
    pub fn clear_pose(&mut self) {
        self.landmarks.clear();
        self.detected = false;
    }
}
