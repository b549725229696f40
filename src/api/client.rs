use std::time::Duration;

use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;

use super::error::ApiError;
use super::types::{ActionListResponse, ActionResponse, ErrorResponse};
use super::ActionSource;
use crate::action::{Action, ActionId};

pub const DEFAULT_ENDPOINT: &str = "https://api.hetzner.cloud/v1";

/// Read-only client for the provider's actions endpoint.
///
/// Cheap to clone and safe to share between concurrent waits: it holds no
/// per-call state beyond the connection pool inside `reqwest::Client`.
#[derive(Clone)]
pub struct CloudClient {
    token: String,
    client: Client,
    base_url: String,
}

impl CloudClient {
    /// Create a client for `base_url`, normally [`DEFAULT_ENDPOINT`] or the
    /// configured endpoint.
    pub fn with_base_url(token: String, base_url: String) -> Result<Self, ApiError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("cloudwait/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            token,
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Fetch the current snapshots of a batch of actions in one request.
    pub async fn get_actions(&self, ids: &[ActionId]) -> Result<Vec<Action>, ApiError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let id_params: Vec<(&str, u64)> = ids.iter().map(|id| ("id", id.0)).collect();
        let response = self
            .client
            .get(format!("{}/actions", self.base_url))
            .bearer_auth(&self.token)
            .query(&id_params)
            .query(&[("per_page", ids.len())])
            .send()
            .await?;

        let body: ActionListResponse = decode(response).await?;
        Ok(body.actions)
    }

    /// Fetch a single action by ID. Unlike [`CloudClient::get_actions`], an
    /// unknown ID is an error (404) rather than an empty answer.
    pub async fn get_action(&self, id: ActionId) -> Result<Action, ApiError> {
        let response = self
            .client
            .get(format!("{}/actions/{id}", self.base_url))
            .bearer_auth(&self.token)
            .send()
            .await?;

        let body: ActionResponse = decode(response).await?;
        Ok(body.action)
    }
}

// The token never shows up in logs.
impl std::fmt::Debug for CloudClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl ActionSource for CloudClient {
    async fn fetch_actions(&self, ids: &[ActionId]) -> Result<Vec<Action>, ApiError> {
        self.get_actions(ids).await
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
    let status = response.status();

    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .map(|secs| secs.saturating_mul(1000))
            .unwrap_or(1000);
        return Err(ApiError::RateLimited {
            retry_after_ms: retry_after,
        });
    }

    let text = response.text().await?;

    if !status.is_success() {
        let (code, message) = match serde_json::from_str::<ErrorResponse>(&text) {
            Ok(envelope) => (envelope.error.code, envelope.error.message),
            Err(_) => ("unknown".to_string(), text),
        };
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(ApiError::Unauthorized {
                status: status.as_u16(),
                message,
            });
        }
        return Err(ApiError::Api {
            status: status.as_u16(),
            code,
            message,
        });
    }

    serde_json::from_str(&text).map_err(|e| ApiError::Decode(e.to_string()))
}
