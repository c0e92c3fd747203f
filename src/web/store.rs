// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The server's copy of the blocklist, kept in a JSON file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::debug;

use super::constants::DEFAULT_FIXED_EXTENSIONS;
use super::error::WebError;
use crate::gatekeeper::extension::{Blocklist, MAX_CUSTOM_EXTENSIONS, normalize_extension};
use crate::protocol::{ApiResult, ERR_DUPLICATE, ERR_INVALID_LENGTH, ERR_MAX_200, ERR_UNKNOWN_FIXED_EXT};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockConfig {
    #[serde(default)]
    pub fixed: BTreeMap<String, bool>,
    #[serde(default)]
    pub custom: Vec<String>,
}

impl Default for BlockConfig {
    fn default() -> Self {
        Self {
            fixed: DEFAULT_FIXED_EXTENSIONS
                .iter()
                .map(|ext| (ext.to_string(), false))
                .collect(),
            custom: Vec::new(),
        }
    }
}

impl BlockConfig {
    /// Stored fixed flags override the defaults, stored custom entries replace them.
    fn merged_over_defaults(stored: BlockConfig) -> Self {
        let mut cfg = BlockConfig::default();
        cfg.fixed.extend(stored.fixed);
        cfg.custom = stored.custom;
        cfg
    }

    pub fn blocklist(&self) -> Blocklist {
        self.fixed
            .iter()
            .filter(|(_, checked)| **checked)
            .map(|(ext, _)| ext.as_str())
            .chain(self.custom.iter().map(String::as_str))
            .collect()
    }
}

pub struct BlockStore {
    path: PathBuf,
    // serialises load-modify-save cycles
    lock: Mutex<()>,
}

impl BlockStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn load(&self) -> Result<BlockConfig, WebError> {
        let _guard = self.lock.lock().await;
        self.read().await
    }

    async fn read(&self) -> Result<BlockConfig, WebError> {
        if !fs::try_exists(&self.path).await? {
            return Ok(BlockConfig::default());
        }
        let raw = fs::read_to_string(&self.path).await?;
        let stored: BlockConfig = serde_json::from_str(&raw)?;
        Ok(BlockConfig::merged_over_defaults(stored))
    }

    async fn write(&self, cfg: &BlockConfig) -> Result<(), WebError> {
        let raw = serde_json::to_string_pretty(cfg)?;
        fs::write(&self.path, raw).await?;
        debug!(path = %self.path.display(), "Saved blocklist config");
        Ok(())
    }

    pub async fn set_fixed(&self, ext: &str, checked: bool) -> Result<ApiResult, WebError> {
        let ext = ext.to_lowercase();
        let _guard = self.lock.lock().await;
        let mut cfg = self.read().await?;

        match cfg.fixed.get_mut(&ext) {
            Some(flag) => *flag = checked,
            None => return Ok(ApiResult::failed(ERR_UNKNOWN_FIXED_EXT)),
        }
        self.write(&cfg).await?;
        Ok(ApiResult::ok())
    }

    pub async fn add_custom(&self, raw: &str) -> Result<ApiResult, WebError> {
        let Ok(ext) = normalize_extension(raw) else {
            return Ok(ApiResult::failed(ERR_INVALID_LENGTH));
        };

        let _guard = self.lock.lock().await;
        let mut cfg = self.read().await?;

        if cfg.custom.len() >= MAX_CUSTOM_EXTENSIONS {
            return Ok(ApiResult::failed(ERR_MAX_200));
        }
        if cfg.custom.contains(&ext) {
            return Ok(ApiResult::failed(ERR_DUPLICATE));
        }

        cfg.custom.push(ext.clone());
        self.write(&cfg).await?;
        Ok(ApiResult::created(ext))
    }

    /// Removing an extension that is not stored still succeeds.
    pub async fn remove_custom(&self, raw: &str) -> Result<ApiResult, WebError> {
        let ext = raw.trim().to_lowercase();
        let _guard = self.lock.lock().await;
        let mut cfg = self.read().await?;

        if let Some(pos) = cfg.custom.iter().position(|stored| *stored == ext) {
            cfg.custom.remove(pos);
            self.write(&cfg).await?;
        }
        Ok(ApiResult::ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store_in(dir: &TempDir) -> BlockStore {
        BlockStore::new(dir.path().join("block_config.json"))
    }

    #[tokio::test]
    async fn test_missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let cfg = store_in(&dir).load().await.unwrap();
        assert_eq!(cfg, BlockConfig::default());
        assert_eq!(cfg.fixed.len(), DEFAULT_FIXED_EXTENSIONS.len());
        assert!(cfg.blocklist().is_empty());
    }

    #[tokio::test]
    async fn test_stored_values_merge_over_defaults() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        fs::write(store.path(), r#"{"fixed": {"exe": true}, "custom": ["sh"]}"#)
            .await
            .unwrap();

        let cfg = store.load().await.unwrap();
        assert_eq!(cfg.fixed.get("exe"), Some(&true));
        assert_eq!(cfg.fixed.get("bat"), Some(&false));
        assert_eq!(cfg.custom, vec!["sh"]);
    }

    #[tokio::test]
    async fn test_set_fixed_persists_and_rejects_unknown() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        assert_eq!(store.set_fixed("BAT", true).await.unwrap(), ApiResult::ok());
        assert_eq!(
            store.set_fixed("zip", true).await.unwrap(),
            ApiResult::failed(ERR_UNKNOWN_FIXED_EXT)
        );

        let cfg = store.load().await.unwrap();
        assert_eq!(cfg.fixed.get("bat"), Some(&true));
        assert!(!cfg.fixed.contains_key("zip"));
    }

    #[tokio::test]
    async fn test_add_custom_rules() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        assert_eq!(store.add_custom(" .SH ").await.unwrap(), ApiResult::created("sh"));
        assert_eq!(
            store.add_custom("sh").await.unwrap(),
            ApiResult::failed(ERR_DUPLICATE)
        );
        assert_eq!(
            store.add_custom("").await.unwrap(),
            ApiResult::failed(ERR_INVALID_LENGTH)
        );
        assert_eq!(
            store.add_custom(&"a".repeat(21)).await.unwrap(),
            ApiResult::failed(ERR_INVALID_LENGTH)
        );
        assert_eq!(store.load().await.unwrap().custom, vec!["sh"]);
    }

    #[tokio::test]
    async fn test_add_custom_caps_at_limit() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let full = BlockConfig {
            custom: (0..MAX_CUSTOM_EXTENSIONS).map(|i| format!("x{i}")).collect(),
            ..Default::default()
        };
        store.write(&full).await.unwrap();

        assert_eq!(
            store.add_custom("new").await.unwrap(),
            ApiResult::failed(ERR_MAX_200)
        );
        assert_eq!(store.load().await.unwrap().custom.len(), MAX_CUSTOM_EXTENSIONS);
    }

    #[tokio::test]
    async fn test_remove_custom_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.add_custom("sh").await.unwrap();
        store.add_custom("php").await.unwrap();

        assert!(store.remove_custom(" SH ").await.unwrap().success);
        assert!(store.remove_custom("sh").await.unwrap().success);
        assert_eq!(store.load().await.unwrap().custom, vec!["php"]);
    }

    #[tokio::test]
    async fn test_blocklist_from_config() {
        let cfg = BlockConfig {
            fixed: BTreeMap::from([("bat".to_string(), true), ("exe".to_string(), false)]),
            custom: vec!["sh".to_string()],
        };
        let list = cfg.blocklist();
        assert!(list.contains("bat"));
        assert!(list.contains("sh"));
        assert!(!list.contains("exe"));
    }
}
