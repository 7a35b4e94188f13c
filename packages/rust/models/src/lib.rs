//! Remote text-generation tiers.
//!
//! Both remote sources implement [`AnswerModel`], so the resolver can treat
//! them uniformly and tests can swap in counting fakes:
//! - [`MedicalModelClient`]: a hosted medical chat model behind the Gradio
//!   HTTP call API (submit, then read the event stream)
//! - [`GenericModelClient`]: a `generateContent`-style general knowledge model
//!
//! Every failure of a single call is reported as a [`ServiceError`]; nothing
//! here panics or returns a process-fatal error once a client is built.

mod generic;
mod medical;

use std::future::Future;
use std::time::Duration;

use medinfo_shared::{MedinfoError, Result, ServiceError};
use reqwest::Client;

pub use generic::GenericModelClient;
pub use medical::{MedicalModelClient, parse_event_stream};

/// User-Agent string for all outgoing model requests.
const USER_AGENT: &str = concat!("medinfo/", env!("CARGO_PKG_VERSION"));

/// A remote source that answers a free-text query.
pub trait AnswerModel: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Send `query` and return the answer text.
    fn ask(&self, query: &str) -> impl Future<Output = std::result::Result<String, ServiceError>> + Send;
}

/// Build a reqwest client with the shared user agent and a per-request timeout.
fn build_client(timeout_secs: u64) -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| MedinfoError::Network(format!("failed to build HTTP client: {e}")))
}

/// Map a reqwest send/read failure to a transport error.
///
/// The URL is stripped because request URLs may carry an API key.
fn transport_error(err: reqwest::Error) -> ServiceError {
    if err.is_timeout() {
        return ServiceError::Transport(format!("request timed out: {}", err.without_url()));
    }
    ServiceError::Transport(err.without_url().to_string())
}
