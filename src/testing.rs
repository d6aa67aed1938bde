//! In-process fakes for the backend seams.

use crate::backend::{
    AnswerEntry, BackendResult, Detection, Detector, GeneratedWorkout, Question,
    ResponseSubmitter, SpeechSynthesizer, SubmitOutcome, Survey, SurveyProvider,
    WorkoutPreferences,
};
use crate::camera::ReplayFrameSource;
use crate::error::BackendError;
use crate::exercise::{CounterSnapshot, ExerciseKey, Landmark};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn server_error(endpoint: &str) -> BackendError {
    BackendError::Status {
        endpoint: endpoint.to_string(),
        status: 500,
        body: "injected failure".to_string(),
    }
}

pub fn replay_source() -> Arc<ReplayFrameSource> {
    Arc::new(
        ReplayFrameSource::from_frames(vec![vec![0xFF, 0xD8, 0x00, 0xFF, 0xD9]], (64, 48), 30)
            .unwrap(),
    )
}

/// Detector whose counters the test moves by hand
pub struct FakeDetector {
    counters: Mutex<CounterSnapshot>,
    detected: AtomicBool,
    landmarks: Mutex<Option<Vec<Landmark>>>,
    fail_frames: AtomicBool,
    fail_resets: AtomicBool,
    frames: AtomicU64,
    resets: AtomicU64,
    latency: Duration,
}

impl FakeDetector {
    pub fn new() -> Arc<Self> {
        Self::with_latency(Duration::ZERO)
    }

    pub fn with_latency(latency: Duration) -> Arc<Self> {
        Arc::new(Self {
            counters: Mutex::new(CounterSnapshot::zeroed()),
            detected: AtomicBool::new(true),
            landmarks: Mutex::new(None),
            fail_frames: AtomicBool::new(false),
            fail_resets: AtomicBool::new(false),
            frames: AtomicU64::new(0),
            resets: AtomicU64::new(0),
            latency,
        })
    }

    pub fn set_counters(&self, counters: CounterSnapshot) {
        *self.counters.lock() = counters;
    }

    pub fn add_reps(&self, key: ExerciseKey, reps: u32) {
        let mut counters = self.counters.lock();
        let current = counters.get(key);
        *counters = counters.clone().with(key, current + reps);
    }

    pub fn set_pose(&self, detected: bool, landmarks: Option<Vec<Landmark>>) {
        self.detected.store(detected, Ordering::SeqCst);
        *self.landmarks.lock() = landmarks;
    }

    pub fn fail_frames(&self, fail: bool) {
        self.fail_frames.store(fail, Ordering::SeqCst);
    }

    pub fn fail_resets(&self, fail: bool) {
        self.fail_resets.store(fail, Ordering::SeqCst);
    }

    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::SeqCst)
    }

    pub fn resets(&self) -> u64 {
        self.resets.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Detector for FakeDetector {
    async fn process_frame(&self, _jpeg: Arc<Vec<u8>>) -> BackendResult<Detection> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.frames.fetch_add(1, Ordering::SeqCst);
        if self.fail_frames.load(Ordering::SeqCst) {
            return Err(server_error("/api/process-frame"));
        }
        Ok(Detection {
            exercises: self.counters.lock().clone(),
            detected: self.detected.load(Ordering::SeqCst),
            landmarks: self.landmarks.lock().clone(),
        })
    }

    async fn reset_counters(&self) -> BackendResult<()> {
        if self.fail_resets.load(Ordering::SeqCst) {
            return Err(server_error("/api/reset-counters"));
        }
        self.resets.fetch_add(1, Ordering::SeqCst);
        *self.counters.lock() = CounterSnapshot::zeroed();
        Ok(())
    }
}

/// Synthesizer that echoes the text back as "audio"
#[derive(Default)]
pub struct EchoSynthesizer {
    pub fail_on: Mutex<Vec<String>>,
}

#[async_trait]
impl SpeechSynthesizer for EchoSynthesizer {
    async fn synthesize(&self, text: &str) -> BackendResult<Vec<u8>> {
        if self.fail_on.lock().iter().any(|t| t == text) {
            return Err(server_error("/api/text-to-speech"));
        }
        Ok(text.as_bytes().to_vec())
    }
}

/// Records every submission
#[derive(Default)]
pub struct RecordingSubmitter {
    pub submissions: Mutex<Vec<(String, Vec<AnswerEntry>)>>,
    pub fail: AtomicBool,
}

#[async_trait]
impl ResponseSubmitter for RecordingSubmitter {
    async fn submit_responses(
        &self,
        survey_id: &str,
        answers: Vec<AnswerEntry>,
    ) -> BackendResult<SubmitOutcome> {
        self.submissions
            .lock()
            .push((survey_id.to_string(), answers));
        if self.fail.load(Ordering::SeqCst) {
            return Err(server_error("/surveys/responses"));
        }
        Ok(SubmitOutcome {
            success: true,
            message: None,
            response_id: Some("r-1".to_string()),
        })
    }
}

/// Serves one fixed survey and workout
pub struct FixedSurveyProvider {
    pub survey: Survey,
    /// `None` makes workout generation fail
    pub workout: Option<GeneratedWorkout>,
}

#[async_trait]
impl SurveyProvider for FixedSurveyProvider {
    async fn get_survey(&self, survey_id: &str) -> BackendResult<Survey> {
        if survey_id != self.survey.id {
            return Err(BackendError::Status {
                endpoint: format!("/surveys/{}", survey_id),
                status: 404,
                body: "Survey not found".to_string(),
            });
        }
        Ok(self.survey.clone())
    }

    async fn generate_workout(
        &self,
        _preferences: WorkoutPreferences,
        _questions: &[Question],
    ) -> BackendResult<GeneratedWorkout> {
        self.workout
            .clone()
            .ok_or_else(|| server_error("/api/generate-workout"))
    }
}
