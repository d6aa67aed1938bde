mod client;
mod detector;
mod survey;
mod tts;
mod types;
mod workout;
#[cfg(test)]
mod tests;

use crate::error::BackendError;
use async_trait::async_trait;
use std::sync::Arc;

pub use client::BackendClient;
pub use types::{
    AnswerEntry, Detection, Exercise, ExerciseMapping, GenerateWorkoutRequest, GeneratedWorkout,
    Question, QuestionType, SubmitOutcome, SubmitResponsesRequest, Survey, SurveyList,
    SurveyOption, TextToSpeechRequest, VoiceSettings, WorkoutPreferences, WorkoutQuestion,
    WorkoutSegment,
};

pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// Remote pose detector with server-side rep counters
#[async_trait]
pub trait Detector: Send + Sync {
    /// Submit one JPEG frame; returns the counters after this frame
    async fn process_frame(&self, jpeg: Arc<Vec<u8>>) -> BackendResult<Detection>;

    /// Zero the server-side counters
    async fn reset_counters(&self) -> BackendResult<()>;
}

/// Turns text into an encoded audio clip
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str) -> BackendResult<Vec<u8>>;
}

/// Where surveys and their workouts come from
#[async_trait]
pub trait SurveyProvider: Send + Sync {
    async fn get_survey(&self, survey_id: &str) -> BackendResult<Survey>;

    async fn generate_workout(
        &self,
        preferences: WorkoutPreferences,
        questions: &[Question],
    ) -> BackendResult<GeneratedWorkout>;
}

/// Receives the finished survey
#[async_trait]
pub trait ResponseSubmitter: Send + Sync {
    async fn submit_responses(
        &self,
        survey_id: &str,
        answers: Vec<AnswerEntry>,
    ) -> BackendResult<SubmitOutcome>;
}
