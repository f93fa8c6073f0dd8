//! Host-platform subject adapter.
//!
//! Platforms ask permission questions about a player through
//! [`PlatformSubject`]. [`UserSubject`] answers them from the engine's
//! cached snapshots, translating the platform id to the canonical one.

use std::sync::Arc;

use chrono::Utc;
use rsperms_domain::model::{IdentityId, Tristate, PREFIX_KEY, SUFFIX_KEY};
use rsperms_domain::resolver::ContextCalculator;
use rsperms_domain::{ContextSet, IdentityTranslation, PermissionEngine};
use tracing::debug;
use uuid::Uuid;

/// A permission subject as seen by the host platform.
pub trait PlatformSubject: Send + Sync {
    /// Stable identifier of the subject, as the platform knows it.
    fn identifier(&self) -> String;

    fn permission_value(&self, contexts: &ContextSet, permission: &str) -> Tristate;

    /// Names of every loaded group the subject inherits under `contexts`,
    /// directly or transitively, plus the parents of the defaults layers.
    /// Sorted and free of duplicates.
    fn parents(&self, contexts: &ContextSet) -> Vec<String>;

    /// Whether the subject inherits `group` under `contexts`.
    fn is_child_of(&self, contexts: &ContextSet, group: &str) -> bool;

    /// Prefix, suffix or meta value for `key`.
    fn option(&self, contexts: &ContextSet, key: &str) -> Option<String>;

    /// The subject's context right now.
    fn active_contexts(&self) -> ContextSet;

    /// Permission check under the current context.
    fn has_permission(&self, permission: &str) -> bool {
        self.permission_value(&self.active_contexts(), permission)
            .as_bool()
    }
}

/// A logged-in player.
pub struct UserSubject {
    platform_id: Uuid,
    engine: Arc<PermissionEngine>,
    translation: Arc<IdentityTranslation>,
    calculator: Arc<dyn ContextCalculator>,
}

impl UserSubject {
    pub fn new(
        platform_id: Uuid,
        engine: Arc<PermissionEngine>,
        translation: Arc<IdentityTranslation>,
        calculator: Arc<dyn ContextCalculator>,
    ) -> Self {
        Self {
            platform_id,
            engine,
            translation,
            calculator,
        }
    }

    fn id(&self) -> IdentityId {
        IdentityId::User(self.translation.get_canonical(self.platform_id))
    }
}

impl PlatformSubject for UserSubject {
    fn identifier(&self) -> String {
        let canonical = self.translation.get_canonical(self.platform_id);
        self.translation
            .get_platform_id(canonical)
            .unwrap_or(self.platform_id)
            .to_string()
    }

    fn permission_value(&self, contexts: &ContextSet, permission: &str) -> Tristate {
        match self.engine.check_permission(&self.id(), permission, contexts) {
            Ok(value) => value,
            Err(err) => {
                debug!(subject = %self.platform_id, error = %err, "permission check on unloaded subject");
                Tristate::Undefined
            }
        }
    }

    fn parents(&self, contexts: &ContextSet) -> Vec<String> {
        let Ok(data) = self.engine.get_or_compute(&self.id(), contexts) else {
            return Vec::new();
        };
        let now = Utc::now();
        let mut parents: Vec<String> = data.groups().to_vec();
        for layer in self.engine.resolver().config().default_layers() {
            parents.extend(layer.parents(contexts, now).map(str::to_string));
        }
        parents.sort();
        parents.dedup();
        parents
    }

    fn is_child_of(&self, contexts: &ContextSet, group: &str) -> bool {
        let Ok(data) = self.engine.get_or_compute(&self.id(), contexts) else {
            return false;
        };
        if data.inherits(group) {
            return true;
        }
        let group = group.trim().to_lowercase();
        let now = Utc::now();
        self.engine
            .resolver()
            .config()
            .default_layers()
            .into_iter()
            .any(|layer| layer.parents(contexts, now).any(|parent| parent == group))
    }

    fn option(&self, contexts: &ContextSet, key: &str) -> Option<String> {
        let data = self.engine.get_or_compute(&self.id(), contexts).ok()?;
        let meta = data.meta();
        let (inherited, meta_key) = if key.eq_ignore_ascii_case(PREFIX_KEY) {
            (meta.prefix(), PREFIX_KEY)
        } else if key.eq_ignore_ascii_case(SUFFIX_KEY) {
            (meta.suffix(), SUFFIX_KEY)
        } else {
            (None, key)
        };
        // no prefix or suffix node anywhere falls back to meta and defaults
        inherited.or_else(|| meta.get(meta_key)).map(str::to_string)
    }

    fn active_contexts(&self) -> ContextSet {
        self.calculator.active_contexts(&self.id())
    }
}

impl std::fmt::Debug for UserSubject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserSubject")
            .field("platform_id", &self.platform_id)
            .finish()
    }
}
