//! Startup: turn an [`AppConfig`] into a ready [`Resolver`].
//!
//! 1. Validate config
//! 2. Load the dataset (fatal on any error)
//! 3. Connect the medical tier (skipped with a warning if unreachable)
//! 4. Build the generic tier (fatal if enabled but its API key is missing)

use std::path::Path;

use medinfo_dataset::MedicineDataset;
use medinfo_models::{GenericModelClient, MedicalModelClient};
use medinfo_shared::{AppConfig, Result};
use tracing::{info, instrument, warn};

use crate::resolver::{Resolver, ResolverOptions};

/// The resolver wired to the real remote clients.
pub type DefaultResolver = Resolver<MedicalModelClient, GenericModelClient>;

/// Build the production resolver from config.
#[instrument(skip_all, fields(dataset = %config.dataset.path))]
pub async fn build_resolver(config: &AppConfig) -> Result<DefaultResolver> {
    config.validate()?;

    let dataset = MedicineDataset::load(Path::new(&config.dataset.path))?;
    let mut resolver = Resolver::new(dataset, ResolverOptions::from(config));

    if config.medical_model.enabled {
        match MedicalModelClient::connect(&config.medical_model).await {
            Ok(client) => resolver = resolver.with_medical(client),
            Err(e) => warn!(error = %e, "medical model unavailable, continuing without it"),
        }
    } else {
        info!("medical model tier disabled");
    }

    if config.generic_model.enabled {
        resolver = resolver.with_generic(GenericModelClient::new(&config.generic_model)?);
    } else {
        info!("generic model tier disabled");
    }

    info!(tiers = ?resolver.active_tiers(), "resolver ready");
    Ok(resolver)
}
