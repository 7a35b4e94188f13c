//! Shared types, error model, and configuration for medinfo.
//!
//! This crate is the foundation depended on by all other medinfo crates.
//! It provides:
//! - [`MedinfoError`] and [`ServiceError`], the error model
//! - Domain types ([`MedicineRecord`], [`ConversationTurn`], [`Role`], [`SessionId`])
//! - Configuration ([`AppConfig`] and its sections, config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DatasetConfig, GenericModelConfig, MedicalModelConfig, config_dir,
    config_file_path, init_config, load_config, load_config_from, read_secret,
};
pub use error::{MedinfoError, Result, ServiceError};
pub use types::{ConversationTurn, MedicineRecord, Role, SessionId};
