use super::client::BackendClient;
use super::types::TextToSpeechRequest;
use super::{BackendResult, SpeechSynthesizer};
use crate::error::BackendError;
use async_trait::async_trait;
use tracing::debug;

const TEXT_TO_SPEECH: &str = "/api/text-to-speech";

impl BackendClient {
    /// `POST /api/text-to-speech`; returns the encoded audio
    pub async fn text_to_speech(&self, text: &str) -> BackendResult<Vec<u8>> {
        let text = text.trim();
        if text.is_empty() {
            return Err(BackendError::InvalidRequest {
                endpoint: TEXT_TO_SPEECH.to_string(),
                details: "text must not be empty".to_string(),
            });
        }

        let body = TextToSpeechRequest {
            text,
            voice: &self.voice,
        };
        let response = self
            .http
            .post(self.url(&["api", "text-to-speech"])?)
            .json(&body)
            .send()
            .await
            .map_err(Self::transport(TEXT_TO_SPEECH))?;

        let audio = Self::check(TEXT_TO_SPEECH, response)
            .await?
            .bytes()
            .await
            .map_err(Self::transport(TEXT_TO_SPEECH))?;

        debug!(bytes = audio.len(), "synthesized speech");
        Ok(audio.to_vec())
    }
}

#[async_trait]
impl SpeechSynthesizer for BackendClient {
    async fn synthesize(&self, text: &str) -> BackendResult<Vec<u8>> {
        self.text_to_speech(text).await
    }
}
