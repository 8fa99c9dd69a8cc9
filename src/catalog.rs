//! Model catalog: one flat, sorted model-id list per provider group.
//!
//! Fetch failures are surfaced as a retryable [`ArenaError::Catalog`]; retries
//! are always user-initiated. Lookup helpers mirror how panels pick defaults:
//! the first entry after a provider switch, and a panel-count-cycled entry for
//! a freshly added panel.

use std::collections::HashMap;

use crate::error::ArenaError;
use crate::providers::{HttpBackend, Provider};

#[derive(Debug, Clone, Default)]
pub struct ModelCatalog {
    groups: HashMap<Provider, Vec<String>>,
}

impl ModelCatalog {
    pub fn new() -> Self {
        ModelCatalog::default()
    }

    /// Install the id list for one provider group, sorted for stable display.
    pub fn insert(&mut self, provider: Provider, mut ids: Vec<String>) {
        ids.sort();
        self.groups.insert(provider, ids);
    }

    pub fn models(&self, provider: Provider) -> &[String] {
        self.groups.get(&provider).map(Vec::as_slice).unwrap_or(&[])
    }

    /// First catalog entry for a group, used when a panel switches provider.
    pub fn first(&self, provider: Provider) -> Option<&str> {
        self.models(provider).first().map(String::as_str)
    }

    /// Default model for a panel being added while `panel_count` panels
    /// already exist: cycle the catalog by count modulo size.
    pub fn default_for_panel(&self, provider: Provider, panel_count: usize) -> Option<String> {
        let models = self.models(provider);
        if models.is_empty() {
            return None;
        }
        Some(models[panel_count % models.len()].clone())
    }

    /// A uniformly random entry, used to seed the second default panel.
    pub fn random(&self, provider: Provider) -> Option<String> {
        use rand::Rng;
        let models = self.models(provider);
        if models.is_empty() {
            return None;
        }
        let idx = rand::thread_rng().gen_range(0..models.len());
        Some(models[idx].clone())
    }

    /// Total model count across all groups (the header badge).
    pub fn total(&self) -> usize {
        self.groups.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

/// Fetch the catalog for every listed provider. The first provider whose
/// listing fails aborts the whole fetch with a retryable error; the caller
/// re-invokes on user request.
pub async fn fetch_catalog(
    backend: &HttpBackend,
    providers: &[Provider],
) -> Result<ModelCatalog, ArenaError> {
    let mut catalog = ModelCatalog::new();
    for &provider in providers {
        let ids = backend
            .list_models(provider)
            .await
            .map_err(|e| ArenaError::Catalog {
                provider: provider.to_string(),
                reason: e.to_string(),
            })?;
        catalog.insert(provider, ids);
    }
    Ok(catalog)
}
