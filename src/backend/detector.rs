use super::client::BackendClient;
use super::types::Detection;
use super::{BackendResult, Detector};
use crate::error::BackendError;
use crate::exercise::CounterSnapshot;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use std::sync::Arc;
use tracing::{debug, trace};

const PROCESS_FRAME: &str = "/api/process-frame";
const RESET_COUNTERS: &str = "/api/reset-counters";
const COUNTERS: &str = "/api/counters";

impl BackendClient {
    /// `POST /api/process-frame` with the frame as multipart field `file`
    pub async fn process_frame(&self, jpeg: Arc<Vec<u8>>) -> BackendResult<Detection> {
        trace!(bytes = jpeg.len(), "submitting frame");

        let part = Part::bytes(jpeg.as_ref().clone())
            .file_name("frame.jpg")
            .mime_str("image/jpeg")
            .map_err(|e| BackendError::InvalidRequest {
                endpoint: PROCESS_FRAME.to_string(),
                details: e.to_string(),
            })?;
        let form = Form::new().part("file", part);

        let response = self
            .http
            .post(self.url(&["api", "process-frame"])?)
            .multipart(form)
            .send()
            .await
            .map_err(Self::transport(PROCESS_FRAME))?;

        Self::json(PROCESS_FRAME, response).await
    }

    /// `POST /api/reset-counters`
    pub async fn reset_counters(&self) -> BackendResult<()> {
        let response = self
            .http
            .post(self.url(&["api", "reset-counters"])?)
            .send()
            .await
            .map_err(Self::transport(RESET_COUNTERS))?;

        Self::check(RESET_COUNTERS, response).await?;
        debug!("Remote counters reset");
        Ok(())
    }

    /// `GET /api/counters`
    pub async fn counters(&self) -> BackendResult<CounterSnapshot> {
        let response = self
            .http
            .get(self.url(&["api", "counters"])?)
            .send()
            .await
            .map_err(Self::transport(COUNTERS))?;

        Self::json(COUNTERS, response).await
    }
}

#[async_trait]
impl Detector for BackendClient {
    async fn process_frame(&self, jpeg: Arc<Vec<u8>>) -> BackendResult<Detection> {
        BackendClient::process_frame(self, jpeg).await
    }

    async fn reset_counters(&self) -> BackendResult<()> {
        BackendClient::reset_counters(self).await
    }
}
