//! Persistent trust cache for incremental runs (`spec.md` §3, §4.4)
//!
//! A keyed JSON document persisted beside the configuration file as
//! `.deploy_cache_<config-stem>.json`. Loaded at run start (missing file is
//! not an error — it is treated as an empty cache, i.e. full comparison).
//! After a successful run it is serialized to a temporary sibling file and
//! renamed over the real cache file; on any unhandled error in any phase it
//! is not rewritten.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::CacheError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileCacheEntry {
	pub size: u64,
	pub mtime: u64,
	pub deployed_at: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SqlScriptEntry {
	pub mtime: u64,
	pub executed_at: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Cache {
	#[serde(default)]
	pub files: BTreeMap<String, FileCacheEntry>,
	#[serde(default)]
	pub last_deployment: u64,
	#[serde(default)]
	pub db_scripts: BTreeMap<String, SqlScriptEntry>,
	/// destination-rename-target -> source mtime
	#[serde(default)]
	pub file_mappings: BTreeMap<String, u64>,
	/// watched-source-path -> mtime at last successful build
	#[serde(default)]
	pub prebuild: BTreeMap<String, u64>,
}

impl Cache {
	/// Load the cache at `path`. A missing or unreadable file is non-fatal
	/// — it is treated as "no cache, do full comparison" per `spec.md` §7.
	pub fn load(path: &Path) -> Cache {
		match std::fs::read_to_string(path) {
			Ok(contents) => serde_json::from_str(&contents).unwrap_or_default(),
			Err(_) => Cache::default(),
		}
	}

	/// Atomically rewrite the cache file: write to a temporary sibling then
	/// rename over the real path. Write failure here is logged loudly by
	/// the caller but does not fail an already-successful deploy.
	pub fn save(&self, path: &Path) -> Result<(), CacheError> {
		let tmp = sibling_tmp_path(path);
		let json = serde_json::to_string_pretty(self).map_err(|e| CacheError::WriteFailed {
			path: path.display().to_string(),
			message: e.to_string(),
		})?;
		std::fs::write(&tmp, json).map_err(|e| CacheError::WriteFailed {
			path: tmp.display().to_string(),
			message: e.to_string(),
		})?;
		std::fs::rename(&tmp, path).map_err(|e| CacheError::WriteFailed {
			path: path.display().to_string(),
			message: e.to_string(),
		})?;
		Ok(())
	}
}

fn sibling_tmp_path(path: &Path) -> PathBuf {
	let mut name = path.file_name().and_then(|n| n.to_str()).unwrap_or("cache").to_string();
	name.push_str(".tmp");
	path.with_file_name(name)
}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::TempDir;

	#[test]
	fn missing_cache_loads_as_default() {
		let tmp = TempDir::new().unwrap();
		let cache = Cache::load(&tmp.path().join("nope.json"));
		assert_eq!(cache, Cache::default());
	}

	#[test]
	fn save_then_load_round_trips() {
		let tmp = TempDir::new().unwrap();
		let path = tmp.path().join(".deploy_cache_acme.json");

		let mut cache = Cache::default();
		cache.files.insert("a/b.txt".into(), FileCacheEntry { size: 10, mtime: 1700000000, deployed_at: 1 });
		cache.last_deployment = 42;
		cache.save(&path).unwrap();

		let loaded = Cache::load(&path);
		assert_eq!(loaded, cache);
	}

	#[test]
	fn save_does_not_leave_tmp_file_behind() {
		let tmp = TempDir::new().unwrap();
		let path = tmp.path().join(".deploy_cache_acme.json");
		Cache::default().save(&path).unwrap();
		assert!(!sibling_tmp_path(&path).exists());
	}

	#[test]
	fn corrupted_cache_falls_back_to_default() {
		let tmp = TempDir::new().unwrap();
		let path = tmp.path().join(".deploy_cache_acme.json");
		std::fs::write(&path, "not json").unwrap();
		assert_eq!(Cache::load(&path), Cache::default());
	}
}

// vim: ts=4
