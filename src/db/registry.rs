//! Provider registry.
//!
//! Maps provider names to ready-made driver capabilities. Registration happens
//! at startup; lookups happen on every manager construction and are served
//! under a read lock.

use crate::db::driver::DriverCapability;
use crate::error::{FacadeError, FacadeResult};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::{Arc, LazyLock};
use tracing::{debug, info};

static GLOBAL: LazyLock<ProviderRegistry> = LazyLock::new(ProviderRegistry::new);

/// Name to driver capability mapping. Cloning shares the same table.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: Arc<RwLock<HashMap<String, Arc<dyn DriverCapability>>>>,
}

impl ProviderRegistry {
    /// Create an empty registry, independent of the process-wide one.
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry used by `ConnectionManager::new`.
    pub fn global() -> &'static ProviderRegistry {
        &GLOBAL
    }

    /// Register a capability under a provider name.
    pub fn register(
        &self,
        name: impl Into<String>,
        capability: Arc<dyn DriverCapability>,
    ) -> FacadeResult<()> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(FacadeError::invalid_provider(
                name,
                "provider name must not be empty",
            ));
        }

        let mut providers = self.providers.write();
        if providers.contains_key(&name) {
            return Err(FacadeError::duplicate_provider(name));
        }
        info!(provider = %name, "Provider registered");
        providers.insert(name, capability);
        Ok(())
    }

    /// Remove a provider. Unknown names are ignored.
    pub fn unregister(&self, name: &str) {
        if self.providers.write().remove(name).is_some() {
            info!(provider = %name, "Provider unregistered");
        }
    }

    /// Look up the capability registered under a name.
    pub fn resolve(&self, name: &str) -> FacadeResult<Arc<dyn DriverCapability>> {
        let capability = self
            .providers
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| FacadeError::unknown_provider(name))?;
        debug!(provider = %name, "Provider resolved");
        Ok(capability)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.providers.read().contains_key(name)
    }

    /// Registered provider names, sorted.
    pub fn provider_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.providers.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.providers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.read().is_empty()
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.provider_names())
            .finish()
    }
}
