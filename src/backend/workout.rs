use super::client::BackendClient;
use super::types::{GenerateWorkoutRequest, GeneratedWorkout, Question, WorkoutPreferences};
use super::BackendResult;
use tracing::info;

const GENERATE_WORKOUT: &str = "/api/generate-workout";

impl BackendClient {
    /// `POST /api/generate-workout` for the questions of a survey
    pub async fn generate_workout(
        &self,
        preferences: WorkoutPreferences,
        questions: &[Question],
    ) -> BackendResult<GeneratedWorkout> {
        let body = GenerateWorkoutRequest {
            preferences,
            survey_questions: questions.iter().map(Into::into).collect(),
        };

        let response = self
            .http
            .post(self.url(&["api", "generate-workout"])?)
            .json(&body)
            .send()
            .await
            .map_err(Self::transport(GENERATE_WORKOUT))?;

        let workout: GeneratedWorkout = Self::json(GENERATE_WORKOUT, response).await?;
        info!(
            "Generated {}-minute workout with {} segments",
            workout.total_duration,
            workout.segments.len()
        );
        Ok(workout)
    }
}
