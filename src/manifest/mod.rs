//! Bidirectional origin/output manifest for build pipelines.
//!
//! The [`Manifest`] records, for every file the pipeline has produced, where
//! it came from (its origin, the first entry of the file's path history) and
//! where it currently lives in the build output. Tooling that consumes the
//! build output can translate in either direction:
//!
//! - [`Manifest::get_by_key`] resolves an origin to its output path
//! - [`Manifest::get_by_value`] resolves an output path back to its origin
//!
//! The forward and reverse maps are kept as exact inverses of each other and
//! are never exposed directly, so the only way to mutate them is through
//! [`Manifest::set_entry`] and [`Manifest::remove_key`].
//!
//! # Persistence
//!
//! A manifest persists as a [`Snapshot`], which is exactly `{keys, values}`.
//! The mutation event log is process-local and never written out.
//!
//! ```
//! use buildmap::manifest::Manifest;
//!
//! # fn main() -> anyhow::Result<()> {
//! let mut manifest = Manifest::new();
//! manifest.set_entry("app/pages/index.tsx", "dist/pages/index.js");
//!
//! assert_eq!(manifest.get_by_key("app/pages/index.tsx"), Some("dist/pages/index.js"));
//! assert_eq!(manifest.get_by_value("dist/pages/index.js"), Some("app/pages/index.tsx"));
//!
//! let json = manifest.to_json(true)?;
//! assert!(json.starts_with("{\"keys\":"));
//! # Ok(())
//! # }
//! ```

pub mod errors;
pub mod loader;

pub use errors::ManifestError;
pub use loader::ManifestLoader;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

/// Persisted form of a manifest
///
/// Maps are ordered so the written file is stable between runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Origin path -> output path
    pub keys: BTreeMap<String, String>,
    /// Output path -> origin path
    pub values: BTreeMap<String, String>,
}

/// In-memory origin <-> output map with an append-only mutation log
#[derive(Debug, Clone, Default)]
pub struct Manifest {
    /// Origin path -> output path
    keys: HashMap<String, String>,
    /// Output path -> origin path
    values: HashMap<String, String>,
    /// `set:<dest>` / `del:<key>` descriptors, in mutation order
    events: Vec<String>,
}

impl Manifest {
    /// Create a new empty manifest
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a manifest, optionally seeded from a prior snapshot
    ///
    /// The snapshot is taken verbatim. A snapshot whose maps are not inverses
    /// of each other is trusted as-is.
    #[must_use]
    pub fn create(snapshot: Option<Snapshot>) -> Self {
        snapshot.map_or_else(Self::new, Self::from_snapshot)
    }

    /// Build a manifest from a snapshot with an empty event log
    #[must_use]
    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        Self {
            keys: snapshot.keys.into_iter().collect(),
            values: snapshot.values.into_iter().collect(),
            events: Vec::new(),
        }
    }

    /// Output path currently produced from `key`
    #[must_use]
    pub fn get_by_key(&self, key: &str) -> Option<&str> {
        self.keys.get(key).map(String::as_str)
    }

    /// Origin path that produced the output `value`
    #[must_use]
    pub fn get_by_value(&self, value: &str) -> Option<&str> {
        self.values.get(value).map(String::as_str)
    }

    /// Record that `key` now produces `dest`
    ///
    /// Only one mapping per origin is kept: if `key` previously produced a
    /// different output, that output's reverse entry is dropped. Likewise, if
    /// `dest` was claimed by another origin, that origin's forward entry is
    /// dropped.
    pub fn set_entry(&mut self, key: impl Into<String>, dest: impl Into<String>) {
        let key = key.into();
        let dest = dest.into();
        debug!(key = %key, dest = %dest, "Setting key");

        if let Some(previous) = self.keys.get(&key).filter(|p| **p != dest).cloned() {
            debug!(key = %key, previous = %previous, "Dropping stale output");
            self.values.remove(&previous);
        }
        if let Some(owner) = self.values.get(&dest).filter(|o| **o != key).cloned() {
            debug!(dest = %dest, owner = %owner, "Output taken over by another origin");
            self.keys.remove(&owner);
        }

        self.keys.insert(key.clone(), dest.clone());
        self.values.insert(dest.clone(), key);
        self.events.push(format!("set:{dest}"));
    }

    /// Remove the mapping for `key`, returning the output it produced
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::NotFound`] if `key` has no mapping; the
    /// manifest is left untouched in that case.
    pub fn remove_key(&mut self, key: &str) -> Result<String, ManifestError> {
        debug!(key = %key, "Removing key");
        let dest = self.keys.remove(key).ok_or_else(|| ManifestError::NotFound {
            key: key.to_string(),
        })?;
        self.values.remove(&dest);
        self.events.push(format!("del:{key}"));
        Ok(dest)
    }

    /// Every mutation recorded since this manifest was created
    #[must_use]
    pub fn events(&self) -> &[String] {
        &self.events
    }

    /// Number of tracked origins
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Check if nothing is tracked
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Current `{keys, values}` state, without the event log
    #[must_use]
    pub fn to_snapshot(&self) -> Snapshot {
        Snapshot {
            keys: self
                .keys
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            values: self
                .values
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }

    /// Serialize the snapshot as JSON
    ///
    /// `compact` produces a single dense line; otherwise the output is
    /// indented with two spaces.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails
    pub fn to_json(&self, compact: bool) -> Result<String> {
        let snapshot = self.to_snapshot();
        if compact {
            serde_json::to_string(&snapshot).context("Failed to serialize manifest")
        } else {
            serde_json::to_string_pretty(&snapshot).context("Failed to serialize manifest")
        }
    }
}

/// Handle to a manifest shared between the owning stage and readers
///
/// Both maps sit behind a single lock so a reader never observes one map
/// updated without the other.
#[derive(Debug, Clone, Default)]
pub struct SharedManifest {
    inner: Arc<RwLock<Manifest>>,
}

impl SharedManifest {
    /// Wrap a manifest for sharing
    #[must_use]
    pub fn new(manifest: Manifest) -> Self {
        Self {
            inner: Arc::new(RwLock::new(manifest)),
        }
    }

    /// Output path currently produced from `key`
    #[must_use]
    pub fn get_by_key(&self, key: &str) -> Option<String> {
        self.read().get_by_key(key).map(str::to_string)
    }

    /// Origin path that produced the output `value`
    #[must_use]
    pub fn get_by_value(&self, value: &str) -> Option<String> {
        self.read().get_by_value(value).map(str::to_string)
    }

    /// Copy of the mutation log
    #[must_use]
    pub fn events(&self) -> Vec<String> {
        self.read().events().to_vec()
    }

    /// Current `{keys, values}` state
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        self.read().to_snapshot()
    }

    /// Serialize the current state as JSON
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails
    pub fn to_json(&self, compact: bool) -> Result<String> {
        self.read().to_json(compact)
    }

    /// Number of tracked origins
    #[must_use]
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Check if nothing is tracked
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Read access to the whole manifest
    pub fn read(&self) -> RwLockReadGuard<'_, Manifest> {
        // Every mutation completes under one guard, so a poisoned lock still
        // holds consistent maps.
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, Manifest> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl From<Manifest> for SharedManifest {
    fn from(manifest: Manifest) -> Self {
        Self::new(manifest)
    }
}
