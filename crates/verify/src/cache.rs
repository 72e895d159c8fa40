//! Persistent entry cache (C11): avoids re-walking the whole RSL from the
//! object store on every verification by remembering, for entries already
//! validated once, their `(number, ref, target, parent)` tuple and the most
//! recent entry id seen for each reference.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use gittuf_rsl::Entry;
use gittuf_store::Oid;

use crate::error::VerifyError;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CachedEntry {
    pub number: u64,
    pub ref_name: Option<String>,
    pub target_id: Option<String>,
    pub parent: Option<String>,
}

#[derive(Default, Serialize, Deserialize)]
struct CacheFile {
    entries: BTreeMap<String, CachedEntry>,
    last_for_ref: BTreeMap<String, String>,
}

/// A cache of RSL entries already validated, persisted as JSON so repeated
/// verifications across process restarts don't re-walk the whole log.
pub struct EntryCache {
    path: PathBuf,
    file: CacheFile,
}

impl EntryCache {
    /// Load the cache at `path`, or start empty if it doesn't exist yet.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, VerifyError> {
        let path = path.as_ref().to_path_buf();
        let file = match std::fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(_) => CacheFile::default(),
        };
        Ok(Self { path, file })
    }

    pub fn save(&self) -> Result<(), VerifyError> {
        let bytes = serde_json::to_vec_pretty(&self.file)?;
        std::fs::write(&self.path, bytes)?;
        Ok(())
    }

    /// Record `entry` as validated, refreshing the "latest seen" pointer for
    /// its reference if it is a reference entry.
    pub fn record(&mut self, entry: &Entry) {
        let ref_name = entry.body.as_reference().map(|r| r.ref_name.clone());
        let target_id = entry.body.as_reference().map(|r| r.target_id.to_string());
        if let Some(name) = &ref_name {
            self.file.last_for_ref.insert(name.clone(), entry.id.to_string());
        }
        self.file.entries.insert(
            entry.id.to_string(),
            CachedEntry {
                number: entry.body.number(),
                ref_name,
                target_id,
                parent: entry.parent.map(|p| p.to_string()),
            },
        );
    }

    pub fn get(&self, entry_id: Oid) -> Option<&CachedEntry> {
        self.file.entries.get(&entry_id.to_string())
    }

    /// The id of the most recently recorded entry for `ref_name`, if any
    /// entry for it has been cached.
    pub fn last_entry_id_for_ref(&self, ref_name: &str) -> Option<Oid> {
        self.file
            .last_for_ref
            .get(ref_name)
            .and_then(|s| s.parse().ok())
    }

    pub fn len(&self) -> usize {
        self.file.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.file.entries.is_empty()
    }
}
