use super::types::VoiceSettings;
use super::BackendResult;
use crate::config::{BackendConfig, NarrationConfig};
use crate::error::BackendError;
use reqwest::{Response, Url};
use serde::de::DeserializeOwned;
use tracing::debug;

/// HTTP client for the survey / detection backend.
///
/// One instance serves every endpoint; it is cheap to clone.
#[derive(Clone)]
pub struct BackendClient {
    pub(super) http: reqwest::Client,
    base_url: Url,
    pub(super) voice: VoiceSettings,
}

impl BackendClient {
    pub fn new(backend: &BackendConfig, narration: &NarrationConfig) -> BackendResult<Self> {
        let base_url = Url::parse(&backend.base_url).map_err(|e| BackendError::InvalidRequest {
            endpoint: backend.base_url.clone(),
            details: format!("invalid base URL: {}", e),
        })?;

        let http = reqwest::Client::builder()
            .timeout(backend.request_timeout())
            .build()
            .map_err(|source| BackendError::Transport {
                endpoint: backend.base_url.clone(),
                source,
            })?;

        debug!("Backend client for {}", base_url);
        Ok(Self {
            http,
            base_url,
            voice: VoiceSettings::from(narration),
        })
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_str()
    }

    /// Absolute URL for a path below the base URL; segments are percent-encoded
    pub(super) fn url(&self, segments: &[&str]) -> BackendResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| BackendError::InvalidRequest {
                endpoint: segments.join("/"),
                details: format!("base URL {} cannot carry a path", self.base_url),
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Turn a non-2xx response into a `Status` error carrying the body
    pub(super) async fn check(endpoint: &str, response: Response) -> BackendResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        debug!(endpoint, status = %status, "backend request failed");
        Err(BackendError::Status {
            endpoint: endpoint.to_string(),
            status: status.as_u16(),
            body,
        })
    }

    pub(super) async fn json<T: DeserializeOwned>(endpoint: &str, response: Response) -> BackendResult<T> {
        let response = Self::check(endpoint, response).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| BackendError::InvalidResponse {
                endpoint: endpoint.to_string(),
                details: e.to_string(),
            })
    }

    pub(super) fn transport(endpoint: &str) -> impl FnOnce(reqwest::Error) -> BackendError + '_ {
        move |source| BackendError::Transport {
            endpoint: endpoint.to_string(),
            source,
        }
    }
}
