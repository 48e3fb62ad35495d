//! Plugin-based backend registry
//!
//! The registry maps backend type names to factories so the binary can
//! build a fabric client and a store from configuration without hardcoded
//! if-else chains.
//!
//! ## Registration
//!
//! Fabric backends register themselves during initialization:
//!
//! ```rust,ignore
//! // In storenet-fabric-cloudflare
//! pub fn register(registry: &BackendRegistry) {
//!     registry.register_fabric("cloudflare", Box::new(CloudflareFactory));
//! }
//! ```
//!
//! The built-in stores (`memory`, `file`) are registered by
//! [`BackendRegistry::with_builtin_stores`].

use crate::config::{DnsConfig, FabricConfig, StoreConfig};
use crate::error::{Error, Result};
use crate::store::{FileStoreFactory, MemoryStoreFactory};
use crate::traits::{FabricBackend, FabricBackendFactory, ProvisioningStore, StoreFactory};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Registry of fabric backend and store factories
///
/// ## Thread Safety
///
/// Interior mutability with RwLock allows concurrent reads and exclusive
/// writes.
#[derive(Default)]
pub struct BackendRegistry {
    fabrics: RwLock<HashMap<String, Box<dyn FabricBackendFactory>>>,
    stores: RwLock<HashMap<String, Arc<dyn StoreFactory>>>,
}

impl BackendRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the `memory` and `file` stores
    pub fn with_builtin_stores() -> Self {
        let registry = Self::new();
        registry.register_store("memory", Box::new(MemoryStoreFactory));
        registry.register_store("file", Box::new(FileStoreFactory));
        registry
    }

    /// Register a fabric backend factory
    pub fn register_fabric(&self, name: impl Into<String>, factory: Box<dyn FabricBackendFactory>) {
        let mut fabrics = self.fabrics.write().unwrap_or_else(|e| e.into_inner());
        fabrics.insert(name.into(), factory);
    }

    /// Register a store factory
    pub fn register_store(&self, name: impl Into<String>, factory: Box<dyn StoreFactory>) {
        let mut stores = self.stores.write().unwrap_or_else(|e| e.into_inner());
        stores.insert(name.into(), Arc::from(factory));
    }

    /// Create the fabric and DNS clients from configuration
    ///
    /// # Errors
    ///
    /// [`Error::Config`] if the backend type is not registered.
    pub fn create_fabric(&self, fabric: &FabricConfig, dns: &DnsConfig) -> Result<FabricBackend> {
        let backend_type = fabric.type_name();
        let fabrics = self.fabrics.read().unwrap_or_else(|e| e.into_inner());

        let factory = fabrics
            .get(backend_type)
            .ok_or_else(|| Error::config(format!("Unknown fabric backend: {}", backend_type)))?;

        factory.create(fabric, dns)
    }

    /// Create a store from configuration
    pub async fn create_store(&self, config: &StoreConfig) -> Result<Box<dyn ProvisioningStore>> {
        let store_type = config.type_name().to_string();

        let factory = {
            let stores = self.stores.read().unwrap_or_else(|e| e.into_inner());
            stores
                .get(&store_type)
                .ok_or_else(|| Error::config(format!("Unknown store type: {}", store_type)))?
                .clone()
        };

        let config_json = match config {
            StoreConfig::Custom { config, .. } => config.clone(),
            other => serde_json::to_value(other)?,
        };

        factory.create(&config_json).await
    }

    /// List registered fabric backends
    pub fn list_fabrics(&self) -> Vec<String> {
        let fabrics = self.fabrics.read().unwrap_or_else(|e| e.into_inner());
        fabrics.keys().cloned().collect()
    }

    /// List registered stores
    pub fn list_stores(&self) -> Vec<String> {
        let stores = self.stores.read().unwrap_or_else(|e| e.into_inner());
        stores.keys().cloned().collect()
    }

    /// Check if a fabric backend is registered
    pub fn has_fabric(&self, name: &str) -> bool {
        let fabrics = self.fabrics.read().unwrap_or_else(|e| e.into_inner());
        fabrics.contains_key(name)
    }

    /// Check if a store is registered
    pub fn has_store(&self, name: &str) -> bool {
        let stores = self.stores.read().unwrap_or_else(|e| e.into_inner());
        stores.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MockFabricFactory;

    impl FabricBackendFactory for MockFabricFactory {
        fn create(&self, _fabric: &FabricConfig, _dns: &DnsConfig) -> Result<FabricBackend> {
            Err(Error::not_found("Mock fabric not implemented"))
        }
    }

    #[test]
    fn test_registry_registration() {
        let registry = BackendRegistry::new();
        assert!(!registry.has_fabric("mock"));

        registry.register_fabric("mock", Box::new(MockFabricFactory));

        assert!(registry.has_fabric("mock"));
        assert!(registry.list_fabrics().contains(&"mock".to_string()));
    }

    #[test]
    fn test_unknown_fabric_is_config_error() {
        let registry = BackendRegistry::new();
        let result = registry.create_fabric(&FabricConfig::default(), &DnsConfig::default());
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_builtin_stores() {
        let registry = BackendRegistry::with_builtin_stores();
        assert!(registry.has_store("memory"));
        assert!(registry.has_store("file"));

        let store = registry.create_store(&StoreConfig::Memory).await.unwrap();
        assert!(store.location_by_code("1042").await.unwrap().is_none());
    }
}
