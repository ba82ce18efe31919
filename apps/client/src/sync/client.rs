//! HTTP client for the progress sync endpoints.

use memora_core::sync::{
    AllQuestionProgressResponse, GetProgressResponse, QuestionProgress, QuestionProgressResponse,
    SaveProgressRequest, SaveProgressResponse, SyncQuestionProgressRequest,
    SyncQuestionProgressResponse,
};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;

use crate::config::ClientConfig;
use crate::sync::SyncError;

/// One method per sync endpoint. Every call is bounded by the configured timeouts.
#[derive(Clone)]
pub struct SyncClient {
    client: Client,
    backend_url: String,
}

impl SyncClient {
    pub fn new(config: &ClientConfig) -> Result<Self, SyncError> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| SyncError::Network(e.to_string()))?;

        Ok(Self {
            client,
            backend_url: config.backend_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.backend_url, path.trim_start_matches('/'))
    }

    /// Check if backend is reachable.
    pub async fn check_connectivity(&self) -> Result<bool, SyncError> {
        let resp = self
            .client
            .get(self.url("/health"))
            .send()
            .await
            .map_err(request_error)?;
        Ok(resp.status().is_success())
    }

    /// POST /api/sync-question-progress
    pub async fn push_question_progress(
        &self,
        token: &str,
        package_uuid: &str,
        progress: Vec<QuestionProgress>,
    ) -> Result<SyncQuestionProgressResponse, SyncError> {
        let request = SyncQuestionProgressRequest {
            package_uuid: package_uuid.to_string(),
            progress,
        };

        let resp = self
            .client
            .post(self.url("/api/sync-question-progress"))
            .bearer_auth(token)
            .json(&request)
            .send()
            .await
            .map_err(request_error)?;

        parse_response(resp).await
    }

    /// GET /api/get-question-progress
    pub async fn pull_question_progress(
        &self,
        token: &str,
        package_uuid: &str,
    ) -> Result<QuestionProgressResponse, SyncError> {
        let resp = self
            .client
            .get(self.url("/api/get-question-progress"))
            .bearer_auth(token)
            .query(&[("packageUuid", package_uuid)])
            .send()
            .await
            .map_err(request_error)?;

        parse_response(resp).await
    }

    /// GET /api/get-all-question-progress
    pub async fn pull_all_question_progress(&self, token: &str) -> Result<AllQuestionProgressResponse, SyncError> {
        let resp = self
            .client
            .get(self.url("/api/get-all-question-progress"))
            .bearer_auth(token)
            .send()
            .await
            .map_err(request_error)?;

        parse_response(resp).await
    }

    /// POST /api/save-progress
    pub async fn save_progress(
        &self,
        token: &str,
        request: &SaveProgressRequest,
    ) -> Result<SaveProgressResponse, SyncError> {
        let resp = self
            .client
            .post(self.url("/api/save-progress"))
            .bearer_auth(token)
            .json(request)
            .send()
            .await
            .map_err(request_error)?;

        parse_response(resp).await
    }

    /// GET /api/get-progress
    pub async fn get_progress(&self, token: &str, package_uuid: &str) -> Result<GetProgressResponse, SyncError> {
        let resp = self
            .client
            .get(self.url("/api/get-progress"))
            .bearer_auth(token)
            .query(&[("packageUuid", package_uuid)])
            .send()
            .await
            .map_err(request_error)?;

        parse_response(resp).await
    }
}

fn request_error(e: reqwest::Error) -> SyncError {
    if e.is_timeout() {
        SyncError::Timeout(e.to_string())
    } else {
        SyncError::Network(e.to_string())
    }
}

async fn parse_response<T: DeserializeOwned>(resp: Response) -> Result<T, SyncError> {
    match resp.status() {
        StatusCode::UNAUTHORIZED => {
            let message = resp.text().await.unwrap_or_default();
            Err(SyncError::Unauthorized(message))
        }
        StatusCode::NOT_FOUND => {
            let message = resp.text().await.unwrap_or_default();
            Err(SyncError::PackageNotFound(message))
        }
        status if !status.is_success() => {
            let message = resp.text().await.unwrap_or_default();
            Err(SyncError::Backend {
                status: status.as_u16(),
                message,
            })
        }
        _ => resp.json().await.map_err(|e| {
            if e.is_timeout() {
                SyncError::Timeout(e.to_string())
            } else {
                SyncError::Parse(e.to_string())
            }
        }),
    }
}
