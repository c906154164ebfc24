//! Provider registry
//!
//! Maps provider slugs to their adapters. Only providers whose OAuth client is
//! configured are registered.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::warn;

use crate::config::AppConfig;
use crate::connectors::{GoogleCalendarProvider, OutreachProvider, Provider, SalesforceProvider};
use crate::mapper::ProviderKind;

/// Error type for registry operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum RegistryError {
    #[error("Provider '{name}' not found")]
    ProviderNotFound { name: String },
}

#[derive(Clone, Default)]
pub struct Registry {
    providers: HashMap<String, Arc<dyn Provider>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the registry from configuration, skipping providers without
    /// client credentials.
    pub fn from_config(config: &AppConfig) -> Self {
        let mut registry = Self::new();

        if config.salesforce.credentials().is_some() {
            registry.register(Arc::new(SalesforceProvider::new(
                config.salesforce.clone(),
                config.salesforce_api_version.clone(),
                &config.sync,
            )));
        } else {
            warn!("Salesforce provider not registered: missing Salesforce client credentials");
        }

        if config.outreach.credentials().is_some() {
            registry.register(Arc::new(OutreachProvider::new(config.outreach.clone())));
        } else {
            warn!("Outreach provider not registered: missing Outreach client credentials");
        }

        if config.google_calendar.credentials().is_some() {
            registry.register(Arc::new(GoogleCalendarProvider::new(
                config.google_calendar.clone(),
                &config.sync,
            )));
        } else {
            warn!(
                "Google Calendar provider not registered: missing Google Calendar client credentials"
            );
        }

        registry
    }

    pub fn register(&mut self, provider: Arc<dyn Provider>) {
        self.providers
            .insert(provider.kind().slug().to_string(), provider);
    }

    pub fn get(&self, slug: &str) -> Result<Arc<dyn Provider>, RegistryError> {
        self.providers
            .get(slug)
            .cloned()
            .ok_or_else(|| RegistryError::ProviderNotFound {
                name: slug.to_string(),
            })
    }

    /// Registered providers in sync priority order
    pub fn providers(&self) -> Vec<Arc<dyn Provider>> {
        ProviderKind::ALL
            .iter()
            .filter_map(|kind| self.providers.get(kind.slug()).cloned())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}
