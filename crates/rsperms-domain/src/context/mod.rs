//! Context sets: situational key/value constraints.
//!
//! A [`ContextSet`] describes either the *active* state of a subject
//! (e.g. `world=nether, server=lobby`) or the *filter* attached to a node or
//! inheritance edge. A key may hold several values; as a filter this means
//! "any of these".
//!
//! Keys and values are trimmed and lowercased on insertion so that sets built
//! at different call sites compare equal and collapse into one cache key.

mod set_proptest;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

fn normalize(key: &str, value: &str) -> DomainResult<(String, String)> {
    let k = key.trim().to_lowercase();
    let v = value.trim().to_lowercase();
    if k.is_empty() {
        return Err(DomainError::InvalidContext {
            key: key.to_string(),
            value: value.to_string(),
            message: "key cannot be empty".to_string(),
        });
    }
    if v.is_empty() {
        return Err(DomainError::InvalidContext {
            key: key.to_string(),
            value: value.to_string(),
            message: "value cannot be empty".to_string(),
        });
    }
    Ok((k, v))
}

/// An immutable set of context pairs.
///
/// Equality and hashing are defined over the full pair set. The backing
/// store is ordered, so iteration and `Display` are deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "RawContextSet")]
pub struct ContextSet {
    pairs: BTreeMap<String, BTreeSet<String>>,
}

/// Wire shape of [`ContextSet`], normalized on the way in.
#[derive(Deserialize)]
struct RawContextSet {
    pairs: BTreeMap<String, BTreeSet<String>>,
}

impl TryFrom<RawContextSet> for ContextSet {
    type Error = DomainError;

    fn try_from(raw: RawContextSet) -> DomainResult<Self> {
        ContextSet::from_pairs(
            raw.pairs
                .iter()
                .flat_map(|(k, values)| values.iter().map(move |v| (k, v))),
        )
    }
}

impl ContextSet {
    /// The empty (global) context set.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Builds a set from `(key, value)` pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> DomainResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut builder = MutableContextSet::new();
        for (k, v) in pairs {
            builder.add(k.as_ref(), v.as_ref())?;
        }
        Ok(builder.freeze())
    }

    /// Returns true if the set has no pairs.
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Number of key/value pairs.
    pub fn len(&self) -> usize {
        self.pairs.values().map(BTreeSet::len).sum()
    }

    /// Values recorded for `key`.
    pub fn values(&self, key: &str) -> impl Iterator<Item = &str> {
        self.pairs
            .get(&key.trim().to_lowercase())
            .into_iter()
            .flat_map(|values| values.iter().map(String::as_str))
    }

    /// Returns true if the exact pair is present.
    pub fn has(&self, key: &str, value: &str) -> bool {
        match normalize(key, value) {
            Ok((k, v)) => self.pairs.get(&k).is_some_and(|values| values.contains(&v)),
            Err(_) => false,
        }
    }

    /// Iterates over all pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs
            .iter()
            .flat_map(|(k, values)| values.iter().map(move |v| (k.as_str(), v.as_str())))
    }

    /// Returns true iff every pair in `other` is present in `self`.
    pub fn contains(&self, other: &ContextSet) -> bool {
        other.pairs.iter().all(|(key, values)| {
            self.pairs
                .get(key)
                .is_some_and(|ours| values.is_subset(ours))
        })
    }

    /// Returns true if this set, used as a filter, applies under `active`.
    ///
    /// Every key of the filter must be present in `active` with at least one
    /// of the filter's accepted values. The empty filter always applies.
    pub fn is_satisfied_by(&self, active: &ContextSet) -> bool {
        self.pairs.iter().all(|(key, accepted)| {
            active
                .pairs
                .get(key)
                .is_some_and(|values| !values.is_disjoint(accepted))
        })
    }

    /// Copies this set into a builder.
    pub fn to_mutable(&self) -> MutableContextSet {
        MutableContextSet {
            pairs: self.pairs.clone(),
        }
    }
}

impl fmt::Display for ContextSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (k, v)) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{k}={v}")?;
        }
        f.write_str("}")
    }
}

/// Builder accumulating context pairs before freezing into a [`ContextSet`].
#[derive(Debug, Clone, Default)]
pub struct MutableContextSet {
    pairs: BTreeMap<String, BTreeSet<String>>,
}

impl MutableContextSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a pair. Keys may hold several values.
    pub fn add(&mut self, key: &str, value: &str) -> DomainResult<&mut Self> {
        let (k, v) = normalize(key, value)?;
        self.pairs.entry(k).or_default().insert(v);
        Ok(self)
    }

    /// Removes every value recorded for `key`.
    pub fn remove_all(&mut self, key: &str) -> &mut Self {
        self.pairs.remove(&key.trim().to_lowercase());
        self
    }

    /// Adds every pair from `other`.
    pub fn add_all(&mut self, other: &ContextSet) -> &mut Self {
        for (k, values) in &other.pairs {
            self.pairs
                .entry(k.clone())
                .or_default()
                .extend(values.iter().cloned());
        }
        self
    }

    /// Freezes the builder into an immutable set.
    pub fn freeze(self) -> ContextSet {
        ContextSet { pairs: self.pairs }
    }
}
