use super::client::BackendClient;
use super::types::{
    AnswerEntry, GeneratedWorkout, Question, SubmitOutcome, SubmitResponsesRequest, Survey,
    SurveyList, WorkoutPreferences,
};
use super::{BackendResult, ResponseSubmitter, SurveyProvider};
use async_trait::async_trait;
use tracing::info;

impl BackendClient {
    /// `GET /surveys/{id}`
    pub async fn get_survey(&self, survey_id: &str) -> BackendResult<Survey> {
        let endpoint = format!("/surveys/{}", survey_id);
        let response = self
            .http
            .get(self.url(&["surveys", survey_id])?)
            .send()
            .await
            .map_err(Self::transport(&endpoint))?;

        let survey: Survey = Self::json(&endpoint, response).await?;
        info!(
            "Fetched survey '{}' with {} questions",
            survey.title,
            survey.questions.len()
        );
        Ok(survey)
    }

    /// `GET /surveys`
    pub async fn list_surveys(&self) -> BackendResult<SurveyList> {
        let response = self
            .http
            .get(self.url(&["surveys"])?)
            .send()
            .await
            .map_err(Self::transport("/surveys"))?;

        Self::json("/surveys", response).await
    }

    /// `POST /surveys/{id}/responses`
    pub async fn submit_responses(
        &self,
        survey_id: &str,
        answers: Vec<AnswerEntry>,
    ) -> BackendResult<SubmitOutcome> {
        let endpoint = format!("/surveys/{}/responses", survey_id);
        let body = SubmitResponsesRequest {
            survey_id: survey_id.to_string(),
            answers,
        };

        let response = self
            .http
            .post(self.url(&["surveys", survey_id, "responses"])?)
            .json(&body)
            .send()
            .await
            .map_err(Self::transport(&endpoint))?;

        Self::json(&endpoint, response).await
    }
}

#[async_trait]
impl ResponseSubmitter for BackendClient {
    async fn submit_responses(
        &self,
        survey_id: &str,
        answers: Vec<AnswerEntry>,
    ) -> BackendResult<SubmitOutcome> {
        BackendClient::submit_responses(self, survey_id, answers).await
    }
}

#[async_trait]
impl SurveyProvider for BackendClient {
    async fn get_survey(&self, survey_id: &str) -> BackendResult<Survey> {
        BackendClient::get_survey(self, survey_id).await
    }

    async fn generate_workout(
        &self,
        preferences: WorkoutPreferences,
        questions: &[Question],
    ) -> BackendResult<GeneratedWorkout> {
        BackendClient::generate_workout(self, preferences, questions).await
    }
}
