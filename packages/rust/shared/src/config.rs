//! Application configuration for medinfo.
//!
//! User config lives at `~/.medinfo/medinfo.toml`.
//! CLI flags override config file values, which override defaults.
//! Credentials are never stored here, only the names of the env vars that
//! hold them.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{MedinfoError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "medinfo.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".medinfo";

/// System instruction sent with every medical-model request.
pub const DEFAULT_SYSTEM_MESSAGE: &str = "You are a Medical AI Assistant. Please be thorough \
     and provide an informative answer. If you don't know the answer to a specific medical \
     inquiry, advise seeking professional help.";

// ---------------------------------------------------------------------------
// Config structs (matching medinfo.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Local medicine dataset.
    #[serde(default)]
    pub dataset: DatasetConfig,

    /// Medical language model tier.
    #[serde(default)]
    pub medical_model: MedicalModelConfig,

    /// Generic knowledge model tier.
    #[serde(default)]
    pub generic_model: GenericModelConfig,
}

/// `[dataset]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetConfig {
    /// Path to the medicine CSV file.
    #[serde(default = "default_dataset_path")]
    pub path: String,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            path: default_dataset_path(),
        }
    }
}

fn default_dataset_path() -> String {
    "Medicine_Details.csv".into()
}

/// `[medical_model]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MedicalModelConfig {
    /// Whether this tier is consulted at all.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Base URL of the hosted chat app's HTTP API.
    #[serde(default = "default_medical_base_url")]
    pub base_url: String,

    /// Endpoint name under `/call/`.
    #[serde(default = "default_api_name")]
    pub api_name: String,

    /// Fixed system instruction.
    #[serde(default = "default_system_message")]
    pub system_message: String,

    /// Response length cap.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f64,

    /// Nucleus-sampling threshold.
    #[serde(default = "default_top_p")]
    pub top_p: f64,

    /// Per-call deadline in seconds.
    #[serde(default = "default_medical_timeout")]
    pub timeout_secs: u64,

    /// Name of the env var holding an optional bearer token.
    #[serde(default = "default_token_env")]
    pub token_env: String,
}

impl Default for MedicalModelConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: default_medical_base_url(),
            api_name: default_api_name(),
            system_message: default_system_message(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            top_p: default_top_p(),
            timeout_secs: default_medical_timeout(),
            token_env: default_token_env(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_medical_base_url() -> String {
    "https://ruslanmv-medical-llama3-v2.hf.space/gradio_api".into()
}
fn default_api_name() -> String {
    "chat".into()
}
fn default_system_message() -> String {
    DEFAULT_SYSTEM_MESSAGE.into()
}
fn default_max_tokens() -> u32 {
    512
}
fn default_temperature() -> f64 {
    0.8
}
fn default_top_p() -> f64 {
    0.9
}
fn default_medical_timeout() -> u64 {
    60
}
fn default_token_env() -> String {
    "HF_TOKEN".into()
}

/// `[generic_model]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenericModelConfig {
    /// Whether the terminal generic tier is consulted.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// `generateContent` endpoint URL (without the key parameter).
    #[serde(default = "default_generic_endpoint")]
    pub endpoint: String,

    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Per-call deadline in seconds.
    #[serde(default = "default_generic_timeout")]
    pub timeout_secs: u64,
}

impl Default for GenericModelConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: default_generic_endpoint(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_generic_timeout(),
        }
    }
}

fn default_generic_endpoint() -> String {
    "https://generativelanguage.googleapis.com/v1beta/models/gemini-1.5-flash-latest:generateContent"
        .into()
}
fn default_api_key_env() -> String {
    "GEMINI_API_KEY".into()
}
fn default_generic_timeout() -> u64 {
    30
}

impl AppConfig {
    /// Check URLs and sampling parameters before any client is built.
    pub fn validate(&self) -> Result<()> {
        if self.dataset.path.trim().is_empty() {
            return Err(MedinfoError::config("dataset.path must not be empty"));
        }

        if self.medical_model.enabled {
            let m = &self.medical_model;
            Url::parse(&m.base_url).map_err(|e| {
                MedinfoError::config(format!("medical_model.base_url '{}': {e}", m.base_url))
            })?;
            if m.api_name.trim().is_empty() {
                return Err(MedinfoError::config("medical_model.api_name must not be empty"));
            }
            if !(0.0..=2.0).contains(&m.temperature) {
                return Err(MedinfoError::config(format!(
                    "medical_model.temperature {} out of range 0.0..=2.0",
                    m.temperature
                )));
            }
            if !(0.0..=1.0).contains(&m.top_p) || m.top_p == 0.0 {
                return Err(MedinfoError::config(format!(
                    "medical_model.top_p {} out of range (0.0, 1.0]",
                    m.top_p
                )));
            }
            if m.max_tokens == 0 || m.timeout_secs == 0 {
                return Err(MedinfoError::config(
                    "medical_model.max_tokens and timeout_secs must be positive",
                ));
            }
        }

        if self.generic_model.enabled {
            let g = &self.generic_model;
            Url::parse(&g.endpoint).map_err(|e| {
                MedinfoError::config(format!("generic_model.endpoint '{}': {e}", g.endpoint))
            })?;
            if g.timeout_secs == 0 {
                return Err(MedinfoError::config("generic_model.timeout_secs must be positive"));
            }
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.medinfo/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| MedinfoError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.medinfo/medinfo.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| MedinfoError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| MedinfoError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| MedinfoError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| MedinfoError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| MedinfoError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read a credential from the env var named `var_name`.
///
/// Returns `None` when the variable is unset or empty.
pub fn read_secret(var_name: &str) -> Option<String> {
    match std::env::var(var_name) {
        Ok(val) if !val.trim().is_empty() => Some(val),
        _ => None,
    }
}
