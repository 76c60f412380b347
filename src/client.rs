//! Blocking HTTP client for the digital-twin store (subset of the data-plane API).
//!
//! - Blocking client using `ureq` (no async).
//! - Covers exactly the three calls the bridge needs: get, create-or-replace and JSON Patch update.
//! - Authentication is a static bearer token supplied through configuration; acquiring it is
//!   left to the deployment.

use http::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

use crate::config::Config;
use crate::models::twin::{NewTwin, PatchOperation};

const JSON_PATCH_CONTENT_TYPE: &str = "application/json-patch+json";

#[derive(Debug, Error)]
pub enum TwinClientError {
    #[error("twin '{0}' not found")]
    NotFound(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("http {status}: {message}")]
    Http { status: u16, message: String },
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<ureq::Error> for TwinClientError {
    fn from(value: ureq::Error) -> Self {
        TwinClientError::Transport(value.to_string())
    }
}

/// The parts of a stored twin the bridge looks at. Only used for logging, so every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExistingTwin {
    #[serde(rename = "$dtId", default)]
    pub id: String,
    #[serde(rename = "$etag", default)]
    pub etag: Option<String>,
    #[serde(rename = "$metadata", default)]
    pub metadata: Option<ExistingTwinMetadata>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExistingTwinMetadata {
    #[serde(rename = "$model", default)]
    pub model: Option<String>,
}

impl ExistingTwin {
    /// A 2xx answer means the twin exists; an unexpected body only loses the log details.
    pub fn from_body(id: &str, body: &str) -> Self {
        let mut twin: ExistingTwin = serde_json::from_str(body).unwrap_or_default();
        if twin.id.is_empty() {
            twin.id = id.to_string();
        }
        twin
    }
}

/// Operations the reconciler consumes from a twin store.
pub trait TwinStore {
    fn get_twin(&self, id: &str) -> Result<ExistingTwin, TwinClientError>;
    fn create_or_replace_twin(&self, id: &str, model_id: &str) -> Result<(), TwinClientError>;
    fn update_twin(&self, id: &str, operations: &[PatchOperation]) -> Result<(), TwinClientError>;
}

/// Builds the agent shared by the twin client and the mapping fetch.
/// Status codes are inspected by the caller rather than surfaced as transport errors.
pub fn build_agent(timeout: Duration) -> ureq::Agent {
    let config = ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        .http_status_as_error(false)
        .build();
    ureq::Agent::new_with_config(config)
}

pub struct TwinClient {
    agent: ureq::Agent,
    base_url: String,
    api_version: String,
    bearer: Option<String>,
}

impl TwinClient {
    pub fn new(cfg: &Config) -> Self {
        TwinClient {
            agent: build_agent(cfg.request_timeout),
            base_url: cfg.twin_store_url.clone(),
            api_version: cfg.api_version.clone(),
            bearer: cfg.access_token.as_ref().map(|t| format!("Bearer {}", t)),
        }
    }

    fn twin_url(&self, id: &str) -> String {
        format!("{}/digitaltwins/{}", self.base_url, urlencoding::encode(id))
    }

    fn authorize<B>(&self, req: ureq::RequestBuilder<B>) -> ureq::RequestBuilder<B> {
        let req = req
            .header("Accept", "application/json")
            .query("api-version", &self.api_version);
        match &self.bearer {
            Some(b) => req.header("Authorization", b),
            None => req,
        }
    }

    /// Maps a response onto its body, or the error its status implies.
    fn read_body(id: &str, resp: http::Response<ureq::Body>) -> Result<String, TwinClientError> {
        let status = resp.status();
        let body = resp.into_body().read_to_string();
        if status.is_success() {
            // the status already reports the outcome; a truncated body does not change it
            Ok(body.unwrap_or_default())
        } else if status == StatusCode::NOT_FOUND {
            Err(TwinClientError::NotFound(id.to_string()))
        } else {
            Err(TwinClientError::Http {
                status: status.as_u16(),
                message: body.unwrap_or_else(|_| String::from("<no body>")),
            })
        }
    }
}

impl TwinStore for TwinClient {
    fn get_twin(&self, id: &str) -> Result<ExistingTwin, TwinClientError> {
        let resp = self.authorize(self.agent.get(&self.twin_url(id))).call()?;
        let body = Self::read_body(id, resp)?;
        Ok(ExistingTwin::from_body(id, &body))
    }

    fn create_or_replace_twin(&self, id: &str, model_id: &str) -> Result<(), TwinClientError> {
        let resp = self
            .authorize(self.agent.put(&self.twin_url(id)))
            .send_json(NewTwin::new(id, model_id))?;
        Self::read_body(id, resp).map(|_| ())
    }

    fn update_twin(&self, id: &str, operations: &[PatchOperation]) -> Result<(), TwinClientError> {
        let doc = serde_json::to_string(operations)?;
        let resp = self
            .authorize(self.agent.patch(&self.twin_url(id)))
            .header("Content-Type", JSON_PATCH_CONTENT_TYPE)
            .send(doc)?;
        Self::read_body(id, resp).map(|_| ())
    }
}
