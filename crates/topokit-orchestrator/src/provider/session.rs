//! Engine session shared by the engine-backed providers.

use std::path::Path;
use std::sync::Arc;

use crate::container::{ContainerFilter, LABEL_ROLE};
use crate::error::Result;
use crate::images::ImageResolver;
use crate::manager::{ContainerManager, SharedManager};
use crate::options::ProviderOptions;
use crate::registry::ActiveNodeRegistry;
use crate::settings::ProviderSettings;
use topokit_core::NodeRole;

/// A container manager plus the state a provider keeps for the run.
///
/// Cloning is cheap; clones share the manager and the registry.
#[derive(Clone)]
pub struct EngineSession {
    manager: SharedManager,
    registry: ActiveNodeRegistry,
    images: ImageResolver,
    settings: Arc<ProviderSettings>,
}

impl EngineSession {
    /// Creates a session over `manager`.
    pub fn new(manager: SharedManager, settings: ProviderSettings) -> Self {
        Self {
            manager,
            registry: ActiveNodeRegistry::new(),
            images: ImageResolver::new(settings.config_root.clone()),
            settings: Arc::new(settings),
        }
    }

    /// Returns the container manager.
    pub fn manager(&self) -> &dyn ContainerManager {
        self.manager.as_ref()
    }

    /// Returns the active node registry.
    pub fn registry(&self) -> &ActiveNodeRegistry {
        &self.registry
    }

    /// Returns the image resolver.
    pub fn images(&self) -> &ImageResolver {
        &self.images
    }

    /// Returns the provider settings.
    pub fn settings(&self) -> &ProviderSettings {
        &self.settings
    }

    /// Returns the network nodes join, if network addressing is on.
    pub fn network(&self) -> Option<&str> {
        self.settings.network.as_deref()
    }

    /// Returns true if node ports are published on the host.
    pub fn expose_ports(&self) -> bool {
        self.settings.expose_ports
    }

    /// Loads provider options, from the default path when none is given.
    pub fn load_options(&self, path: Option<&Path>) -> Result<ProviderOptions> {
        ProviderOptions::from_file(&self.settings.options_path(path))
    }

    /// Counts server containers already present on any participant host.
    pub async fn existing_server_count(&self) -> Result<usize> {
        let filter = ContainerFilter::by_label(LABEL_ROLE, NodeRole::Server.name());
        Ok(self.manager.locate_containers(&filter).await?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockManager;

    #[tokio::test]
    async fn test_existing_server_count_uses_role_label() {
        let manager = MockManager::new()
            .with_existing("node_1", NodeRole::Server)
            .with_existing("node_2", NodeRole::Server)
            .with_existing("sg_1", NodeRole::Gateway)
            .with_unlabelled("couchbase_lookalike");
        let session = EngineSession::new(Arc::new(manager), ProviderSettings::default());

        assert_eq!(session.existing_server_count().await.unwrap(), 2);
    }

    #[test]
    fn test_missing_options_file() {
        let settings = ProviderSettings::builder()
            .config_root("/nonexistent")
            .build();
        let session = EngineSession::new(Arc::new(MockManager::new()), settings);
        assert!(session.load_options(None).is_err());
    }
}
