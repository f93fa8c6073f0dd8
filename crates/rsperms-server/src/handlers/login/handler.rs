//! Login handler implementation.

use std::sync::Arc;
use std::time::Instant;

use rsperms_domain::model::{Identity, IdentityId};
use rsperms_domain::{ContextSet, IdentityTranslation, PermissionEngine};
use rsperms_storage::{DataStore, StoredUser, DEFAULT_GROUP};
use tokio::runtime::Handle;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::types::{LoginError, LoginOutcome, LoginResult};
use crate::adapters::{user_from_stored, user_to_stored};
use crate::config::LoginSettings;
use crate::loader::load_parent_groups;
use crate::rules;

/// Bootstraps player sessions.
///
/// A login resolves the canonical id, persists the name mapping, loads the
/// user and every group it inherits, applies default assignments and
/// computes the first snapshot without waiting for a debounce window.
pub struct LoginHandler {
    engine: Arc<PermissionEngine>,
    store: Arc<dyn DataStore>,
    translation: Arc<IdentityTranslation>,
    settings: LoginSettings,
    /// Context the initial snapshot is computed for.
    initial_context: ContextSet,
}

impl LoginHandler {
    pub fn new(
        engine: Arc<PermissionEngine>,
        store: Arc<dyn DataStore>,
        translation: Arc<IdentityTranslation>,
        settings: LoginSettings,
        initial_context: ContextSet,
    ) -> Self {
        Self {
            engine,
            store,
            translation,
            settings,
            initial_context,
        }
    }

    pub fn translation(&self) -> &Arc<IdentityTranslation> {
        &self.translation
    }

    /// Runs a login to completion.
    #[instrument(skip(self), fields(platform_id = %platform_id))]
    pub async fn login(&self, platform_id: Uuid, username: &str) -> LoginResult<LoginOutcome> {
        let started = Instant::now();

        let (canonical_id, first_login) = self.resolve_identity(platform_id, username).await?;
        if first_login {
            info!(username, %canonical_id, "first login");
        }
        self.save_mapping(username, canonical_id).await;

        let stored = self.load_user_with_retry(canonical_id, username).await?;
        let mut user = user_from_stored(&stored);

        let mut changed = false;
        if self.settings.give_default_group {
            changed |= rules::give_default_if_needed(&mut user, DEFAULT_GROUP);
        }
        let assignments_changed = rules::apply_all(&self.settings.default_assignments, &mut user);
        if changed || assignments_changed {
            self.save_user(&user, &stored).await;
        }

        let groups_loaded = load_parent_groups(&self.engine, self.store.as_ref(), &user).await;
        let id = user.id().clone();
        self.engine.load_identity(user);
        let data = self.engine.compute_now(&id, &self.initial_context)?;

        let elapsed = started.elapsed();
        metrics::histogram!("rsperms_login_duration_seconds").record(elapsed.as_secs_f64());
        if elapsed >= self.settings.slow_login_threshold() {
            warn!(
                username,
                elapsed_ms = elapsed.as_millis() as u64,
                "slow login"
            );
        }
        debug!(username, groups_loaded, "login processed");

        Ok(LoginOutcome {
            canonical_id,
            first_login,
            assignments_changed,
            groups_loaded,
            data,
            elapsed,
        })
    }

    /// Runs a login from a thread outside the runtime, blocking until it
    /// completes.
    ///
    /// # Panics
    ///
    /// Panics if called from within an asynchronous execution context.
    pub fn login_blocking(
        &self,
        handle: &Handle,
        platform_id: Uuid,
        username: &str,
    ) -> LoginResult<LoginOutcome> {
        handle.block_on(self.login(platform_id, username))
    }

    /// Recomputes a logged-in player's snapshots immediately.
    pub fn refresh_player(&self, platform_id: Uuid) -> LoginResult<()> {
        let id = IdentityId::User(self.translation.get_canonical(platform_id));
        if !self.engine.is_loaded(&id) {
            return Err(LoginError::NotLoaded { platform_id });
        }
        self.engine.refresh_now(&id);
        Ok(())
    }

    /// Ends a session: unloads the user and forgets its id mapping.
    /// Returns true if a user was loaded.
    pub fn logout(&self, platform_id: Uuid) -> bool {
        let canonical = self
            .translation
            .remove(platform_id)
            .unwrap_or(platform_id);
        self.engine
            .unload_identity(&IdentityId::User(canonical))
            .is_some()
    }

    async fn resolve_identity(&self, platform_id: Uuid, username: &str) -> LoginResult<(Uuid, bool)> {
        if self.settings.use_platform_ids {
            self.translation.add_to_cache(platform_id, platform_id);
            let known = self
                .store
                .get_name(platform_id)
                .await
                .map_err(|err| LoginError::lookup(username, err))?;
            return Ok((platform_id, known.is_none()));
        }

        let found = self
            .store
            .get_canonical_id(username)
            .await
            .map_err(|err| LoginError::lookup(username, err))?;
        let (canonical, first_login) = match found {
            Some(canonical) => (canonical, false),
            None => (platform_id, true),
        };
        self.translation.add_to_cache(platform_id, canonical);
        Ok((canonical, first_login))
    }

    async fn save_mapping(&self, username: &str, canonical_id: Uuid) {
        if self.settings.save_mapping_blocking {
            if let Err(err) = self.store.save_identity_mapping(username, canonical_id).await {
                warn!(username, error = %err, "failed to save identity mapping");
            }
            return;
        }

        let store = Arc::clone(&self.store);
        let username = username.to_string();
        tokio::spawn(async move {
            if let Err(err) = store.save_identity_mapping(&username, canonical_id).await {
                warn!(username = %username, error = %err, "failed to save identity mapping");
            }
        });
    }

    async fn load_user_with_retry(&self, canonical_id: Uuid, username: &str) -> LoginResult<StoredUser> {
        match self.store.load_user(canonical_id, Some(username)).await {
            Ok(user) => return Ok(user),
            Err(err) => warn!(username, error = %err, "failed to load user, retrying"),
        }
        self.store
            .load_user(canonical_id, Some(username))
            .await
            .map_err(|err| {
                warn!(username, error = %err, "failed to load user");
                LoginError::LoadFailed {
                    username: username.to_string(),
                    reason: err.to_string(),
                }
            })
    }

    async fn save_user(&self, user: &Identity, stored: &StoredUser) {
        let record = match user_to_stored(user, &stored.primary_group) {
            Ok(record) => record,
            Err(err) => {
                warn!(error = %err, "cannot encode user");
                return;
            }
        };
        if let Err(err) = self.store.save_user(&record).await {
            warn!(user = %user.id(), error = %err, "failed to save user after default assignments");
        }
    }
}

impl std::fmt::Debug for LoginHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginHandler")
            .field("sessions", &self.translation.len())
            .field("settings", &self.settings)
            .field("initial_context", &self.initial_context)
            .finish()
    }
}
