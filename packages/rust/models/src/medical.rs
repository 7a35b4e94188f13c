//! Medical chat model hosted behind the Gradio HTTP call API.
//!
//! A prediction is two requests:
//! 1. `POST {base}/call/{api}` with `{"data": [...]}` returns an `event_id`
//! 2. `GET {base}/call/{api}/{event_id}` streams server-sent events until a
//!    `complete` (answer in `data`) or `error` event

use medinfo_shared::{MedicalModelConfig, MedinfoError, Result, ServiceError, read_secret};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, instrument};

use crate::{AnswerModel, build_client, transport_error};

/// Response to the submit request.
#[derive(Debug, Deserialize)]
struct CallResponse {
    event_id: String,
}

/// Client for the medical-model tier.
#[derive(Clone)]
pub struct MedicalModelClient {
    client: Client,
    base_url: String,
    api_name: String,
    system_message: String,
    max_tokens: u32,
    temperature: f64,
    top_p: f64,
    token: Option<String>,
}

impl std::fmt::Debug for MedicalModelClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MedicalModelClient")
            .field("base_url", &self.base_url)
            .field("api_name", &self.api_name)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl MedicalModelClient {
    /// Build the client without touching the network.
    pub fn new(config: &MedicalModelConfig) -> Result<Self> {
        Ok(Self {
            client: build_client(config.timeout_secs)?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_name: config.api_name.trim_matches('/').to_string(),
            system_message: config.system_message.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            top_p: config.top_p,
            token: read_secret(&config.token_env),
        })
    }

    /// Build the client and check the app is reachable (`GET {base}/info`).
    ///
    /// Callers decide whether a failure here disables the tier or aborts.
    #[instrument(skip_all, fields(base_url = %config.base_url))]
    pub async fn connect(config: &MedicalModelConfig) -> Result<Self> {
        let client = Self::new(config)?;
        let url = format!("{}/info", client.base_url);

        let response = client
            .authorized(client.client.get(&url))
            .send()
            .await
            .map_err(|e| MedinfoError::Network(format!("{url}: {}", e.without_url())))?;

        let status = response.status();
        if !status.is_success() {
            return Err(MedinfoError::Network(format!("{url}: HTTP {status}")));
        }

        info!("medical model endpoint reachable");
        Ok(client)
    }

    fn call_url(&self) -> String {
        format!("{}/call/{}", self.base_url, self.api_name)
    }

    fn authorized(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    /// Submit a prediction job and return its event id.
    async fn submit(&self, message: &str) -> std::result::Result<String, ServiceError> {
        let body = serde_json::json!({
            "data": [
                message,
                self.system_message,
                self.max_tokens,
                self.temperature,
                self.top_p,
            ]
        });

        let response = self
            .authorized(self.client.post(self.call_url()))
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let text = response.text().await.map_err(transport_error)?;
        if !status.is_success() {
            return Err(ServiceError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        let call: CallResponse = serde_json::from_str(&text)
            .map_err(|e| ServiceError::Malformed(format!("submit response: {e}")))?;
        Ok(call.event_id)
    }

    /// Read the event stream for `event_id` to completion.
    async fn fetch_result(&self, event_id: &str) -> std::result::Result<String, ServiceError> {
        let url = format!("{}/{event_id}", self.call_url());
        let response = self
            .authorized(self.client.get(&url))
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let text = response.text().await.map_err(transport_error)?;
        if !status.is_success() {
            return Err(ServiceError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        parse_event_stream(&text)
    }
}

impl AnswerModel for MedicalModelClient {
    fn name(&self) -> &str {
        "medical-model"
    }

    #[instrument(skip_all, fields(api = %self.api_name))]
    async fn ask(&self, query: &str) -> std::result::Result<String, ServiceError> {
        let event_id = self.submit(query).await?;
        debug!(%event_id, "prediction submitted");
        self.fetch_result(&event_id).await
    }
}

/// Extract the answer from a Gradio event stream body.
///
/// The last `complete` event wins; any `error` event fails the call.
pub fn parse_event_stream(body: &str) -> std::result::Result<String, ServiceError> {
    let mut event = "";
    let mut answer = None;

    for line in body.lines() {
        if let Some(name) = line.strip_prefix("event:") {
            event = name.trim();
        } else if let Some(data) = line.strip_prefix("data:") {
            let data = data.trim();
            match event {
                "complete" => answer = Some(extract_answer(data)),
                "error" => {
                    let detail = if data.is_empty() || data == "null" {
                        "the model reported an error".to_string()
                    } else {
                        data.to_string()
                    };
                    return Err(ServiceError::Remote(detail));
                }
                _ => {}
            }
        }
    }

    answer.unwrap_or_else(|| {
        Err(ServiceError::Malformed(
            "event stream ended without a `complete` event".into(),
        ))
    })
}

/// The `complete` payload is a JSON array whose first element is the answer.
fn extract_answer(data: &str) -> std::result::Result<String, ServiceError> {
    let value: Value = serde_json::from_str(data)
        .map_err(|e| ServiceError::Malformed(format!("complete event data: {e}")))?;

    match value {
        Value::String(text) => Ok(text),
        Value::Array(items) => match items.into_iter().next() {
            Some(Value::String(text)) => Ok(text),
            Some(other) => Err(ServiceError::Malformed(format!(
                "expected a string answer, got {other}"
            ))),
            None => Err(ServiceError::Malformed("complete event carried no data".into())),
        },
        other => Err(ServiceError::Malformed(format!(
            "unexpected complete event data: {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(server: &MockServer) -> MedicalModelConfig {
        MedicalModelConfig {
            base_url: format!("{}/gradio_api", server.uri()),
            token_env: "MEDINFO_TEST_UNSET_HF_TOKEN".into(),
            timeout_secs: 5,
            ..Default::default()
        }
    }

    #[test]
    fn parses_complete_event() {
        let body = "event: generating\ndata: [\"Par\"]\n\nevent: complete\ndata: [\"Paracetamol reduces fever.\"]\n\n";
        assert_eq!(parse_event_stream(body).unwrap(), "Paracetamol reduces fever.");
    }

    #[test]
    fn last_complete_event_wins() {
        let body = "event: complete\ndata: [\"first\"]\n\nevent: complete\ndata: [\"second\"]\n";
        assert_eq!(parse_event_stream(body).unwrap(), "second");
    }

    #[test]
    fn error_event_is_remote_error() {
        let body = "event: error\ndata: null\n\n";
        assert!(matches!(parse_event_stream(body), Err(ServiceError::Remote(_))));
    }

    #[test]
    fn stream_without_complete_is_malformed() {
        let body = "event: heartbeat\ndata: null\n\n";
        assert!(matches!(parse_event_stream(body), Err(ServiceError::Malformed(_))));
    }

    #[test]
    fn non_string_answer_is_malformed() {
        let body = "event: complete\ndata: [42]\n";
        assert!(matches!(parse_event_stream(body), Err(ServiceError::Malformed(_))));
    }

    #[tokio::test]
    async fn ask_submits_then_reads_stream() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/gradio_api/call/chat"))
            .and(body_json(serde_json::json!({
                "data": ["what is ibuprofen", system_message(), 512, 0.8, 0.9]
            })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"event_id": "ev-1"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/gradio_api/call/chat/ev-1"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "event: complete\ndata: [\"Ibuprofen is an NSAID.\"]\n\n",
            ))
            .expect(1)
            .mount(&server)
            .await;

        let client = MedicalModelClient::new(&config_for(&server)).unwrap();
        let answer = client.ask("what is ibuprofen").await.unwrap();
        assert_eq!(answer, "Ibuprofen is an NSAID.");
    }

    #[tokio::test]
    async fn submit_failure_is_status_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/gradio_api/call/chat"))
            .respond_with(ResponseTemplate::new(503).set_body_string("sleeping"))
            .mount(&server)
            .await;

        let client = MedicalModelClient::new(&config_for(&server)).unwrap();
        let err = client.ask("anything").await.unwrap_err();
        assert_eq!(
            err,
            ServiceError::Status {
                status: 503,
                body: "sleeping".into()
            }
        );
    }

    #[tokio::test]
    async fn garbage_submit_body_is_malformed() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/gradio_api/call/chat"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let client = MedicalModelClient::new(&config_for(&server)).unwrap();
        assert!(matches!(
            client.ask("anything").await,
            Err(ServiceError::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn unreachable_host_is_transport_error() {
        let config = MedicalModelConfig {
            base_url: "http://127.0.0.1:9/gradio_api".into(),
            token_env: "MEDINFO_TEST_UNSET_HF_TOKEN".into(),
            timeout_secs: 2,
            ..Default::default()
        };
        let client = MedicalModelClient::new(&config).unwrap();
        assert!(matches!(
            client.ask("anything").await,
            Err(ServiceError::Transport(_))
        ));
    }

    #[tokio::test]
    async fn connect_checks_info_endpoint() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/gradio_api/info"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .expect(1)
            .mount(&server)
            .await;

        MedicalModelClient::connect(&config_for(&server))
            .await
            .expect("info check succeeds");
    }

    #[tokio::test]
    async fn connect_fails_when_app_is_down() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/gradio_api/info"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = MedicalModelClient::connect(&config_for(&server))
            .await
            .unwrap_err();
        assert!(matches!(err, MedinfoError::Network(_)));
    }

    #[tokio::test]
    async fn bearer_token_is_sent_when_configured() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/gradio_api/info"))
            .and(header("authorization", "Bearer hf_test"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let mut client = MedicalModelClient::new(&config_for(&server)).unwrap();
        client.token = Some("hf_test".into());
        let url = format!("{}/info", client.base_url);
        let status = client
            .authorized(client.client.get(&url))
            .send()
            .await
            .unwrap()
            .status();
        assert!(status.is_success());
    }

    #[test]
    fn debug_output_redacts_token() {
        let mut client = MedicalModelClient::new(&MedicalModelConfig::default()).unwrap();
        client.token = Some("hf_secret".into());
        let rendered = format!("{client:?}");
        assert!(!rendered.contains("hf_secret"));
        assert!(rendered.contains("<redacted>"));
    }

    fn system_message() -> &'static str {
        medinfo_shared::config::DEFAULT_SYSTEM_MESSAGE
    }
}
