//! Wiring the store, enforcer and administrative service from configuration.

use std::sync::Arc;
use tracing::info;

use crate::config::Config;
use crate::error::Result;
use crate::rbac::{store, Enforcer, PolicyAdminService, PolicyStore, SeedPolicy};

/// A ready-to-serve authorization stack.
pub struct Gatekeeper {
    pub store: Arc<dyn PolicyStore>,
    pub enforcer: Arc<Enforcer>,
    pub admin: PolicyAdminService,
}

impl Gatekeeper {
    /// Open the configured store, apply startup seeds and load the enforcer.
    ///
    /// The initial load must succeed; there is no previous snapshot to fall
    /// back to.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let store = store::connect(&config.store).await?;
        Self::with_store(store, config).await
    }

    /// Like [`from_config`](Self::from_config) with an already opened store.
    pub async fn with_store(store: Arc<dyn PolicyStore>, config: &Config) -> Result<Self> {
        let enforcer = Arc::new(
            Enforcer::new(store.clone()).with_reload_timeout(config.enforcer.reload_timeout),
        );
        let admin = PolicyAdminService::new(store.clone(), enforcer.clone())
            .with_reload_on_write(config.enforcer.reload_on_write);

        let mut seed = SeedPolicy::default();
        if config.enforcer.seed_defaults {
            seed.extend(SeedPolicy::defaults());
        }
        if let Some(path) = &config.enforcer.seed_path {
            seed.extend(SeedPolicy::from_path(path)?);
        }
        if !seed.is_empty() {
            seed.apply(store.as_ref(), admin.manager()).await?;
        }

        let report = enforcer.reload().await?;
        info!(
            backend = ?config.store.backend,
            generation = report.generation,
            rules = report.rules,
            "Gatekeeper ready"
        );

        Ok(Self {
            store,
            enforcer,
            admin,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rbac::{Action, MemoryPolicyStore};
    use std::io::Write;

    #[tokio::test]
    async fn test_defaults_seeded() {
        let gk = Gatekeeper::from_config(&Config::default()).await.unwrap();

        assert_eq!(gk.enforcer.generation(), 1);
        assert_eq!(gk.store.list_policies().await.unwrap().len(), 9);
        assert!(!gk.enforcer.is_allowed("anyone", "/api/me", Action::Read));
    }

    #[tokio::test]
    async fn test_seed_file_and_no_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "p, viewer, /docs, read\ng, u1, viewer").unwrap();

        let mut config = Config::default();
        config.enforcer.seed_defaults = false;
        config.enforcer.seed_path = Some(file.path().to_path_buf());

        let gk = Gatekeeper::with_store(Arc::new(MemoryPolicyStore::new()), &config)
            .await
            .unwrap();

        assert!(gk.enforcer.is_allowed("u1", "/docs", Action::Read));
        assert_eq!(gk.store.list_policies().await.unwrap().len(), 1);
    }
}
