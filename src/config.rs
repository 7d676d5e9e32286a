//! Configuration document shape and structural validation.
//!
//! This module owns the `serde`-derived shape that a (separately loaded,
//! out-of-scope) JSON configuration document deserializes into, plus the
//! structural validation the orchestrator requires before a run can begin:
//! required-field presence, the `migration_only`/`clean_install` mutual
//! exclusion, and endpoint credential shape per `type`.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::ConfigurationError;

/// Top-level configuration document (`spec.md` §6).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
	pub agent_name: String,
	pub application_name: Option<String>,
	pub description: Option<String>,
	pub warn: Option<String>,
	pub source: EndpointConfig,
	pub destination: EndpointConfig,
	pub ignore: IgnoreConfig,
	pub options: Options,
	pub website: Option<serde_json::Value>,
	pub database: Option<DatabaseConfig>,
	pub file_mappings: Vec<FileMappingConfig>,
	pub set_permissions_script: Option<String>,
}

impl Config {
	/// Structural validation per `spec.md` §7 (`ConfigurationError`).
	/// Does not load or parse the document — that is the CLI layer's job.
	pub fn validate(&self) -> Result<(), ConfigurationError> {
		if self.agent_name != "ai-deploy" {
			return Err(ConfigurationError::WrongAgent { found: self.agent_name.clone() });
		}
		self.source.validate("source")?;
		self.destination.validate("destination")?;
		if let Some(db) = &self.database {
			db.validate()?;
		}
		Ok(())
	}
}

/// `type ∈ {windows_share, ssh}` endpoint descriptor.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct EndpointConfig {
	#[serde(rename = "type")]
	pub kind: EndpointKind,
	pub path: String,
	/// Windows-share credentials, carried purely for documentation.
	pub user: Option<String>,
	pub password: Option<String>,
	/// SSH credentials.
	pub host: Option<String>,
	pub port: Option<u16>,
	pub username: Option<String>,
	pub private_key_file: Option<String>,
}

impl EndpointConfig {
	fn validate(&self, field: &str) -> Result<(), ConfigurationError> {
		if self.path.is_empty() {
			return Err(ConfigurationError::MissingField { field: format!("{}.path", field) });
		}
		if self.kind == EndpointKind::Ssh {
			if self.host.is_none() {
				return Err(ConfigurationError::MissingField { field: format!("{}.host", field) });
			}
			if self.username.is_none() {
				return Err(ConfigurationError::MissingField { field: format!("{}.username", field) });
			}
			if self.password.is_none() && self.private_key_file.is_none() {
				return Err(ConfigurationError::InvalidValue {
					field: field.to_string(),
					message: "ssh endpoint needs exactly one of password or private_key_file".into(),
				});
			}
		}
		Ok(())
	}

	/// Effective SSH port, defaulting to 22.
	pub fn ssh_port(&self) -> u16 {
		self.port.unwrap_or(22)
	}

	/// True when `path` looks like a Windows path/UNC share — drives case
	/// sensitivity of the ignore matcher (open question 3).
	pub fn is_windows_root(&self) -> bool {
		self.kind == EndpointKind::WindowsShare
			|| self.path.contains('\\')
			|| (self.path.len() > 1 && self.path.as_bytes()[1] == b':')
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EndpointKind {
	#[default]
	WindowsShare,
	Ssh,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct IgnoreConfig {
	pub files: Vec<String>,
	pub folders: Vec<String>,
	/// Extensions including the leading dot, e.g. `".tmp"`.
	pub extensions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
	pub dry_run: bool,
	pub delete_extra_files: bool,
	pub verbose: bool,
	pub ignore_cache: bool,
	pub clean_install: bool,
	pub migration_only: bool,
	pub max_concurrent_transfers: usize,
}

impl Default for Options {
	fn default() -> Self {
		Options {
			dry_run: false,
			delete_extra_files: true,
			verbose: true,
			ignore_cache: false,
			clean_install: false,
			migration_only: false,
			max_concurrent_transfers: 20,
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct FileMappingConfig {
	pub source: String,
	pub destination: String,
}

/// `database` document fragment (`spec.md` §4.6–§4.7).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct DatabaseConfig {
	pub admin_username: String,
	pub admin_password: String,
	pub host: Option<String>,
	pub port: Option<u16>,
	pub main: ScriptDirs,
	pub tenants: Option<TenantsConfig>,
	pub tenant_data_scripts: Option<ScriptDir>,
	pub migration_only: bool,
	pub clean_install: bool,
	pub seed_tables: Vec<SeedTableSpecConfig>,
}

impl DatabaseConfig {
	fn validate(&self) -> Result<(), ConfigurationError> {
		if self.migration_only && self.clean_install {
			return Err(ConfigurationError::MutuallyExclusive {
				a: "database.migration_only".into(),
				b: "database.clean_install".into(),
			});
		}
		if self.admin_username.is_empty() {
			return Err(ConfigurationError::MissingField { field: "database.admin_username".into() });
		}
		Ok(())
	}

	/// Tunnel target: defaults to 127.0.0.1:3306 on the destination host.
	pub fn db_host(&self) -> &str {
		self.host.as_deref().unwrap_or("127.0.0.1")
	}

	pub fn db_port(&self) -> u16 {
		self.port.unwrap_or(3306)
	}
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ScriptDirs {
	pub database: Option<String>,
	pub setup_path: Option<String>,
	pub tables_path: Option<String>,
	pub procedures_path: Option<String>,
	pub data_path: Option<String>,
	pub migration_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ScriptDir {
	pub data_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct TenantsConfig {
	pub config_files_path: String,
	pub database: ScriptDirs,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SeedTableSpecConfig {
	pub table_name: String,
	pub database: Option<String>,
	pub table_script_file: String,
	pub begin_mark: String,
	pub end_mark: String,
	pub check_exists_query: Option<String>,
	pub array_field: Option<String>,
	pub nested_array_field: Option<String>,
	pub variables: Vec<VariableBindingConfig>,
	pub config_files_path: String,
	pub config_files_extension: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct VariableBindingConfig {
	pub placeholder: String,
	pub json_field: String,
	pub from_parent: bool,
	pub default_value: Option<String>,
}

/// Derive the cache sidecar file name from the configuration file's stem,
/// per `spec.md` §3/§4.4: `.deploy_cache_<config-stem>.json` beside it.
pub fn cache_path_for(config_path: &Path) -> std::path::PathBuf {
	let stem = config_path.file_stem().and_then(|s| s.to_str()).unwrap_or("config");
	let dir = config_path.parent().unwrap_or_else(|| Path::new("."));
	dir.join(format!(".deploy_cache_{}.json", stem))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn rejects_wrong_agent_name() {
		let mut cfg = Config::default();
		cfg.agent_name = "other".into();
		cfg.source.kind = EndpointKind::WindowsShare;
		cfg.source.path = "C:\\src".into();
		cfg.destination.path = "C:\\dst".into();
		assert!(matches!(cfg.validate(), Err(ConfigurationError::WrongAgent { .. })));
	}

	#[test]
	fn rejects_migration_only_with_clean_install() {
		let mut cfg = Config::default();
		cfg.agent_name = "ai-deploy".into();
		cfg.source.path = "/src".into();
		cfg.destination.path = "/dst".into();
		let mut db = DatabaseConfig::default();
		db.admin_username = "root".into();
		db.migration_only = true;
		db.clean_install = true;
		cfg.database = Some(db);
		assert!(matches!(cfg.validate(), Err(ConfigurationError::MutuallyExclusive { .. })));
	}

	#[test]
	fn ssh_endpoint_requires_one_credential() {
		let mut ep = EndpointConfig { kind: EndpointKind::Ssh, path: "/srv".into(), ..Default::default() };
		ep.host = Some("example.com".into());
		ep.username = Some("deploy".into());
		assert!(ep.validate("source").is_err());
		ep.password = Some("secret".into());
		assert!(ep.validate("source").is_ok());
	}

	#[test]
	fn cache_path_derives_from_config_stem() {
		let p = cache_path_for(Path::new("/etc/deploy/acme.json"));
		assert_eq!(p, Path::new("/etc/deploy/.deploy_cache_acme.json"));
	}
}

// vim: ts=4
