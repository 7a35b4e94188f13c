//! General knowledge model reached through a `generateContent` endpoint.

use medinfo_shared::{GenericModelConfig, MedinfoError, Result, ServiceError, read_secret};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::{AnswerModel, build_client, transport_error};

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<RequestContent<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestContent<'a> {
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Client for the generic-knowledge tier.
#[derive(Clone)]
pub struct GenericModelClient {
    client: Client,
    endpoint: String,
    api_key: String,
}

impl std::fmt::Debug for GenericModelClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenericModelClient")
            .field("endpoint", &self.endpoint)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

impl GenericModelClient {
    /// Build the client, reading the API key from the configured env var.
    pub fn new(config: &GenericModelConfig) -> Result<Self> {
        let var_name = &config.api_key_env;
        let api_key = read_secret(var_name).ok_or_else(|| {
            MedinfoError::config(format!(
                "generic model API key not found. Set the {var_name} environment variable \
                 or disable the tier with `[generic_model] enabled = false`."
            ))
        })?;
        Self::with_api_key(config, api_key)
    }

    /// Build the client with an explicit key.
    pub fn with_api_key(config: &GenericModelConfig, api_key: impl Into<String>) -> Result<Self> {
        Ok(Self {
            client: build_client(config.timeout_secs)?,
            endpoint: config.endpoint.clone(),
            api_key: api_key.into(),
        })
    }
}

impl AnswerModel for GenericModelClient {
    fn name(&self) -> &str {
        "generic-model"
    }

    #[instrument(skip_all)]
    async fn ask(&self, query: &str) -> std::result::Result<String, ServiceError> {
        let request = GenerateRequest {
            contents: vec![RequestContent {
                parts: vec![RequestPart { text: query }],
            }],
        };

        let response = self
            .client
            .post(&self.endpoint)
            .query(&[("key", self.api_key.as_str())])
            .json(&request)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let body = response.text().await.map_err(transport_error)?;

        if status != StatusCode::OK {
            return Err(ServiceError::Status {
                status: status.as_u16(),
                body,
            });
        }

        extract_text(&body)
    }
}

/// Pull `candidates[0].content.parts[0].text` out of a 200 response body.
fn extract_text(body: &str) -> std::result::Result<String, ServiceError> {
    let parsed: GenerateResponse = serde_json::from_str(body)
        .map_err(|e| ServiceError::Malformed(format!("response body: {e}")))?;

    let candidate = parsed
        .candidates
        .into_iter()
        .next()
        .ok_or(ServiceError::NoCandidates)?;

    candidate
        .content
        .and_then(|c| c.parts.into_iter().next())
        .and_then(|p| p.text)
        .ok_or_else(|| ServiceError::Malformed("first candidate has no text part".into()))
}
