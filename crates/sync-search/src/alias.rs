//! Alias manifest.
//!
//! Tantivy has no native aliases, so network aliases are recorded in an
//! `aliases.json` file at the catalog root mapping alias name to the index
//! names it spans. Creating an alias replaces its previous member list.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::SearchError;

const MANIFEST_FILE: &str = "aliases.json";

/// Alias name -> member index names
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasManifest {
    #[serde(default)]
    pub aliases: BTreeMap<String, Vec<String>>,
}

impl AliasManifest {
    fn path(root: &Path) -> PathBuf {
        root.join(MANIFEST_FILE)
    }

    /// Load the manifest, empty when none has been written yet.
    pub fn load(root: &Path) -> Result<Self, SearchError> {
        let path = Self::path(root);
        if !path.exists() {
            return Ok(Self::default());
        }
        let bytes = std::fs::read(&path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Write the manifest atomically (temp file then rename).
    pub fn save(&self, root: &Path) -> Result<(), SearchError> {
        std::fs::create_dir_all(root)?;
        let tmp = root.join(format!("{}.tmp", MANIFEST_FILE));
        std::fs::write(&tmp, serde_json::to_vec_pretty(self)?)?;
        std::fs::rename(&tmp, Self::path(root))?;
        Ok(())
    }

    /// Member indexes of an alias
    pub fn get(&self, alias: &str) -> Option<&[String]> {
        self.aliases.get(alias).map(Vec::as_slice)
    }

    /// Point `alias` at `indices` and persist the manifest.
    pub fn put_alias(root: &Path, alias: &str, indices: &[String]) -> Result<(), SearchError> {
        if alias.is_empty() {
            return Err(SearchError::InvalidName("empty alias".to_string()));
        }
        let mut manifest = Self::load(root)?;
        manifest.aliases.insert(alias.to_string(), indices.to_vec());
        manifest.save(root)?;
        info!(alias, members = indices.len(), "Updated alias");
        Ok(())
    }
}
