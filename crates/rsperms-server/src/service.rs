//! Service assembly: wires storage, engine and handlers from configuration.

use std::sync::Arc;
use std::time::Duration;

use rsperms_domain::resolver::{ContextCalculator, StaticContextCalculator};
use rsperms_domain::{ContextSet, IdentityTranslation, PermissionEngine};
use rsperms_storage::{DataStore, MemoryDataStore, StorageError};
use tokio::task::JoinHandle;
use tracing::info;
use uuid::Uuid;

use crate::config::{ConfigLoadError, ServerConfig};
use crate::handlers::audit::AuditRecorder;
use crate::handlers::login::LoginHandler;
use crate::handlers::mutation::MutationHandler;
use crate::subject::UserSubject;

/// Errors raised while starting the service.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Config(#[from] ConfigLoadError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("unsupported storage backend: {0}")]
    UnsupportedBackend(String),
}

/// A running permission service.
pub struct PermissionService {
    engine: Arc<PermissionEngine>,
    store: Arc<dyn DataStore>,
    translation: Arc<IdentityTranslation>,
    calculator: Arc<dyn ContextCalculator>,
    static_context: ContextSet,
    audit: Arc<AuditRecorder>,
    login: LoginHandler,
    mutations: MutationHandler,
    sweeper: Option<JoinHandle<()>>,
}

impl PermissionService {
    /// Starts the service with the configured storage backend.
    pub async fn start(config: ServerConfig) -> Result<Self, ServiceError> {
        let store: Arc<dyn DataStore> = match config.storage.backend.as_str() {
            "memory" => {
                info!("Using in-memory storage backend");
                MemoryDataStore::new_shared()
            }
            other => return Err(ServiceError::UnsupportedBackend(other.to_string())),
        };
        Self::with_store(config, store).await
    }

    /// Starts the service over an existing store.
    pub async fn with_store(config: ServerConfig, store: Arc<dyn DataStore>) -> Result<Self, ServiceError> {
        config.validate()?;

        let static_context = config.resolver.static_context().map_err(|err| {
            ConfigLoadError::Invalid {
                message: err.to_string(),
            }
        })?;
        let engine = Arc::new(PermissionEngine::new(
            config.resolver.to_resolver_config(),
            config.cache.to_cache_config(),
        ));
        let translation = Arc::new(IdentityTranslation::new());
        let calculator: Arc<dyn ContextCalculator> =
            Arc::new(StaticContextCalculator::new(static_context.clone()));

        let audit = Arc::new(
            AuditRecorder::restore(Arc::clone(&store), config.audit.persist, config.audit.page_size)
                .await?,
        );
        let login = LoginHandler::new(
            Arc::clone(&engine),
            Arc::clone(&store),
            Arc::clone(&translation),
            config.login.clone(),
            static_context.clone(),
        );
        let mutations = MutationHandler::new(Arc::clone(&engine), Arc::clone(&store), Arc::clone(&audit));

        let sweeper = (config.cache.expiry_sweep_secs > 0).then(|| {
            engine.spawn_expiry_sweeper(Duration::from_secs(config.cache.expiry_sweep_secs))
        });

        info!(
            backend = %config.storage.backend,
            audit_entries = audit.log().len(),
            "permission service started"
        );

        Ok(Self {
            engine,
            store,
            translation,
            calculator,
            static_context,
            audit,
            login,
            mutations,
            sweeper,
        })
    }

    pub fn engine(&self) -> &Arc<PermissionEngine> {
        &self.engine
    }

    pub fn store(&self) -> &Arc<dyn DataStore> {
        &self.store
    }

    pub fn audit(&self) -> &Arc<AuditRecorder> {
        &self.audit
    }

    pub fn login(&self) -> &LoginHandler {
        &self.login
    }

    pub fn mutations(&self) -> &MutationHandler {
        &self.mutations
    }

    /// The subject adapter for a logged-in player.
    pub fn subject(&self, platform_id: Uuid) -> UserSubject {
        UserSubject::new(
            platform_id,
            Arc::clone(&self.engine),
            Arc::clone(&self.translation),
            Arc::clone(&self.calculator),
        )
    }

    /// The context applied to every subject on this instance.
    pub fn static_context(&self) -> &ContextSet {
        &self.static_context
    }
}

impl Drop for PermissionService {
    fn drop(&mut self) {
        if let Some(sweeper) = self.sweeper.take() {
            sweeper.abort();
        }
    }
}

impl std::fmt::Debug for PermissionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PermissionService")
            .field("engine", &self.engine)
            .field("audit", &self.audit)
            .field("login", &self.login)
            .finish()
    }
}
