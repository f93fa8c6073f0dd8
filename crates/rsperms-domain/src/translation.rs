//! Platform id to canonical id translation.
//!
//! Populated once per session at login and cleared at logout. Unknown
//! platform ids translate to themselves.

use dashmap::DashMap;
use uuid::Uuid;

/// Bidirectional platform/canonical id mapping.
#[derive(Debug, Default)]
pub struct IdentityTranslation {
    to_canonical: DashMap<Uuid, Uuid>,
    to_platform: DashMap<Uuid, Uuid>,
}

impl IdentityTranslation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `platform` maps to `canonical`, replacing any previous
    /// mapping of either id.
    pub fn add_to_cache(&self, platform: Uuid, canonical: Uuid) {
        if let Some(previous) = self.to_canonical.insert(platform, canonical) {
            if previous != canonical {
                self.to_platform.remove_if(&previous, |_, p| *p == platform);
            }
        }
        self.to_platform.insert(canonical, platform);
    }

    /// Canonical id for `platform`, or `platform` itself when unmapped.
    pub fn get_canonical(&self, platform: Uuid) -> Uuid {
        self.to_canonical.get(&platform).map_or(platform, |c| *c)
    }

    pub fn get_platform_id(&self, canonical: Uuid) -> Option<Uuid> {
        self.to_platform.get(&canonical).map(|p| *p)
    }

    /// Drops the mapping for `platform`, returning its canonical id.
    pub fn remove(&self, platform: Uuid) -> Option<Uuid> {
        let (_, canonical) = self.to_canonical.remove(&platform)?;
        self.to_platform.remove_if(&canonical, |_, p| *p == platform);
        Some(canonical)
    }

    pub fn clear(&self) {
        self.to_canonical.clear();
        self.to_platform.clear();
    }

    pub fn len(&self) -> usize {
        self.to_canonical.len()
    }

    pub fn is_empty(&self) -> bool {
        self.to_canonical.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unmapped_id_translates_to_itself() {
        let translation = IdentityTranslation::new();
        let id = Uuid::from_u128(5);
        assert_eq!(translation.get_canonical(id), id);
        assert_eq!(translation.get_platform_id(id), None);
    }

    #[test]
    fn test_mapping_is_bidirectional() {
        let translation = IdentityTranslation::new();
        let platform = Uuid::from_u128(1);
        let canonical = Uuid::from_u128(2);

        translation.add_to_cache(platform, canonical);

        assert_eq!(translation.get_canonical(platform), canonical);
        assert_eq!(translation.get_platform_id(canonical), Some(platform));
        assert_eq!(translation.len(), 1);
    }

    #[test]
    fn test_remapping_drops_old_reverse_entry() {
        let translation = IdentityTranslation::new();
        let platform = Uuid::from_u128(1);
        translation.add_to_cache(platform, Uuid::from_u128(2));
        translation.add_to_cache(platform, Uuid::from_u128(3));

        assert_eq!(translation.get_platform_id(Uuid::from_u128(2)), None);
        assert_eq!(translation.get_platform_id(Uuid::from_u128(3)), Some(platform));
    }

    #[test]
    fn test_remove_and_clear() {
        let translation = IdentityTranslation::new();
        translation.add_to_cache(Uuid::from_u128(1), Uuid::from_u128(2));
        translation.add_to_cache(Uuid::from_u128(3), Uuid::from_u128(4));

        assert_eq!(translation.remove(Uuid::from_u128(1)), Some(Uuid::from_u128(2)));
        assert_eq!(translation.remove(Uuid::from_u128(1)), None);
        assert_eq!(translation.get_platform_id(Uuid::from_u128(2)), None);

        translation.clear();
        assert!(translation.is_empty());
    }
}
