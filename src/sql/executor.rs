//! Phase ordering, statement splitting, and incremental skipping for the
//! SQL script executor (`spec.md` §4.6).

use mysql::prelude::Queryable;
use mysql::{Conn, OptsBuilder};
use std::path::Path;
use std::time::{Duration, UNIX_EPOCH};

use crate::cache::{Cache, SqlScriptEntry};
use crate::config::DatabaseConfig;
use crate::error::SqlError;
use crate::template;
use crate::types::{DatabaseScope, DeploymentPhase, PhaseKind, TenantDescriptor};

/// Builds the ordered `DeploymentPhase` list from configuration, per
/// §4.6's phase order table.
pub struct PlanBuilder;

impl PlanBuilder {
	pub fn build(db: &DatabaseConfig, tenants: &[TenantDescriptor]) -> Vec<DeploymentPhase> {
		if db.migration_only {
			return Self::build_migration(db, tenants);
		}

		let mut phases = Vec::new();

		for (kind, dir) in [
			(PhaseKind::Setup, &db.main.setup_path),
			(PhaseKind::Tables, &db.main.tables_path),
			(PhaseKind::Procedures, &db.main.procedures_path),
			(PhaseKind::Data, &db.main.data_path),
		] {
			if let Some(dir) = dir {
				phases.push(DeploymentPhase {
					scope: DatabaseScope::Main,
					kind,
					directory: dir.clone(),
					per_tenant: false,
					db_name: db.main.database.clone(),
				});
			}
		}

		if let Some(tenants_cfg) = &db.tenants {
			for (kind, dir) in [
				(PhaseKind::Setup, &tenants_cfg.database.setup_path),
				(PhaseKind::Tables, &tenants_cfg.database.tables_path),
				(PhaseKind::Procedures, &tenants_cfg.database.procedures_path),
				(PhaseKind::Data, &tenants_cfg.database.data_path),
			] {
				if let Some(dir) = dir {
					phases.push(DeploymentPhase {
						scope: DatabaseScope::Tenant,
						kind,
						directory: dir.clone(),
						per_tenant: true,
						db_name: tenants_cfg.database.database.clone(),
					});
				}
			}
		}
		let _ = tenants;

		if let Some(tenant_data) = &db.tenant_data_scripts {
			if let Some(dir) = &tenant_data.data_path {
				phases.push(DeploymentPhase {
					scope: DatabaseScope::Main,
					kind: PhaseKind::TenantDataScripts,
					directory: dir.clone(),
					per_tenant: false,
					db_name: None,
				});
			}
		}

		phases
	}

	fn build_migration(db: &DatabaseConfig, _tenants: &[TenantDescriptor]) -> Vec<DeploymentPhase> {
		let mut phases = Vec::new();
		if let Some(dir) = &db.main.migration_path {
			phases.push(DeploymentPhase {
				scope: DatabaseScope::Main,
				kind: PhaseKind::Migration,
				directory: dir.clone(),
				per_tenant: false,
				db_name: db.main.database.clone(),
			});
		}
		if let Some(tenants_cfg) = &db.tenants {
			if let Some(dir) = &tenants_cfg.database.migration_path {
				phases.push(DeploymentPhase {
					scope: DatabaseScope::Tenant,
					kind: PhaseKind::Migration,
					directory: dir.clone(),
					per_tenant: true,
					db_name: tenants_cfg.database.database.clone(),
				});
			}
		}
		phases
	}
}

pub struct Executor {
	conn: Conn,
}

impl Executor {
	pub fn connect(host: &str, port: u16, admin_username: &str, admin_password: &str) -> Result<Self, SqlError> {
		let opts = OptsBuilder::new()
			.ip_or_hostname(Some(host))
			.tcp_port(port)
			.user(Some(admin_username))
			.pass(Some(admin_password))
			.tcp_connect_timeout(Some(Duration::from_secs(30)));
		let conn = Conn::new(opts).map_err(|e| SqlError::ConnectFailed { message: e.to_string() })?;
		Ok(Executor { conn })
	}

	pub fn conn_mut(&mut self) -> &mut Conn {
		&mut self.conn
	}

	/// Drop every database about to be (re)created, for `clean_install`.
	pub fn drop_databases(&mut self, names: &[String]) -> Result<(), SqlError> {
		for name in names {
			let stmt = format!("DROP DATABASE IF EXISTS `{}`", sanitize_identifier(name));
			self.conn
				.query_drop(&stmt)
				.map_err(|e| SqlError::StatementFailed { file: "<clean_install>".into(), statement: stmt, message: e.to_string() })?;
		}
		Ok(())
	}

	/// Run every phase in order, applying incremental skipping via `cache`.
	/// `application_name` feeds template pass 2; tenants are iterated in
	/// sorted-filename order for per-tenant phases.
	pub fn run_phases(
		&mut self,
		phases: &[DeploymentPhase],
		tenants: &[TenantDescriptor],
		application_name: &str,
		cache: &mut Cache,
		ignore_cache: bool,
		clean_install: bool,
	) -> Result<(usize, usize), SqlError> {
		let mut run_count = 0;
		let mut skip_count = 0;

		for phase in phases {
			if phase.per_tenant {
				for tenant in tenants {
					let db_name = phase.db_name.as_deref().map(|n| template::expand_sql(n, application_name, Some(&tenant.webid)));
					if let Some(db_name) = &db_name {
						self.use_database(db_name)?;
					}
					let (r, s) = self.run_directory(
						&phase.directory,
						application_name,
						Some(&tenant.webid),
						cache,
						ignore_cache,
						clean_install,
					)?;
					run_count += r;
					skip_count += s;
				}
			} else {
				if let Some(db_name) = &phase.db_name {
					let db_name = template::expand_sql(db_name, application_name, None);
					self.use_database(&db_name)?;
				}
				let (r, s) = self.run_directory(
					&phase.directory,
					application_name,
					None,
					cache,
					ignore_cache,
					clean_install,
				)?;
				run_count += r;
				skip_count += s;
			}
		}

		Ok((run_count, skip_count))
	}

	fn use_database(&mut self, db_name: &str) -> Result<(), SqlError> {
		let stmt = format!("USE `{}`", sanitize_identifier(db_name));
		self.conn
			.query_drop(&stmt)
			.map_err(|e| SqlError::StatementFailed { file: "<use>".into(), statement: stmt, message: e.to_string() })
	}

	/// Run every `.sql` file directly under `dir`, sorted by filename,
	/// honoring incremental skipping.
	fn run_directory(
		&mut self,
		dir: &str,
		application_name: &str,
		webid: Option<&str>,
		cache: &mut Cache,
		ignore_cache: bool,
		clean_install: bool,
	) -> Result<(usize, usize), SqlError> {
		let path = Path::new(dir);
		let mut files: Vec<_> = match std::fs::read_dir(path) {
			Ok(entries) => entries
				.filter_map(|e| e.ok())
				.map(|e| e.path())
				.filter(|p| p.extension().and_then(|e| e.to_str()) == Some("sql"))
				.collect(),
			Err(_) => return Ok((0, 0)),
		};
		files.sort();

		let mut run_count = 0;
		let mut skip_count = 0;

		for file in files {
			let abs = file.display().to_string();
			let mtime = file_mtime(&file);

			if !ignore_cache && !clean_install {
				if let Some(entry) = cache.db_scripts.get(&abs) {
					if entry.mtime == mtime {
						skip_count += 1;
						continue;
					}
				}
			}

			let contents = std::fs::read_to_string(&file).map_err(|e| SqlError::StatementFailed {
				file: abs.clone(),
				statement: String::new(),
				message: e.to_string(),
			})?;
			let expanded = template::expand_sql(&contents, application_name, webid);

			for statement in split_statements(&expanded) {
				self.conn.query_drop(&statement).map_err(|e| SqlError::StatementFailed {
					file: abs.clone(),
					statement: statement.clone(),
					message: e.to_string(),
				})?;
			}

			cache.db_scripts.insert(
				abs,
				SqlScriptEntry { mtime, executed_at: now_secs() },
			);
			run_count += 1;
		}

		Ok((run_count, skip_count))
	}
}

fn sanitize_identifier(name: &str) -> String {
	name.chars().filter(|c| c.is_alphanumeric() || *c == '_').collect()
}

fn file_mtime(path: &Path) -> u64 {
	std::fs::metadata(path)
		.ok()
		.and_then(|m| m.modified().ok())
		.and_then(|t| t.duration_since(UNIX_EPOCH).ok())
		.map(|d| d.as_secs())
		.unwrap_or(0)
}

fn now_secs() -> u64 {
	std::time::SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

/// Split a SQL file body on semicolons at statement terminators, honoring
/// `DELIMITER` redefinitions used by stored-procedure files. Empty
/// statements and pure line-comments are dropped.
pub fn split_statements(sql: &str) -> Vec<String> {
	let mut statements = Vec::new();
	let mut delimiter = ";".to_string();
	let mut current = String::new();

	for line in sql.lines() {
		let trimmed = line.trim();
		if let Some(rest) = trimmed.strip_prefix("DELIMITER ") {
			if !current.trim().is_empty() {
				statements.push(current.trim().to_string());
				current.clear();
			}
			delimiter = rest.trim().to_string();
			continue;
		}
		current.push_str(line);
		current.push('\n');

		while let Some(idx) = current.find(&delimiter) {
			let (stmt, rest) = current.split_at(idx);
			let stmt = stmt.trim().to_string();
			let rest = rest[delimiter.len()..].to_string();
			if !stmt.is_empty() && !is_pure_comment(&stmt) {
				statements.push(stmt);
			}
			current = rest;
		}
	}

	let tail = current.trim();
	if !tail.is_empty() && !is_pure_comment(tail) {
		statements.push(tail.to_string());
	}

	statements
}

fn is_pure_comment(stmt: &str) -> bool {
	stmt.lines().all(|l| {
		let l = l.trim();
		l.is_empty() || l.starts_with("--") || l.starts_with('#')
	})
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn splits_on_semicolons() {
		let stmts = split_statements("SELECT 1;\nSELECT 2;");
		assert_eq!(stmts, vec!["SELECT 1", "SELECT 2"]);
	}

	#[test]
	fn honors_delimiter_redefinition() {
		let sql = "DELIMITER $$\nCREATE PROCEDURE p() BEGIN SELECT 1; END$$\nDELIMITER ;\nSELECT 2;";
		let stmts = split_statements(sql);
		assert_eq!(stmts.len(), 2);
		assert!(stmts[0].contains("CREATE PROCEDURE"));
		assert_eq!(stmts[1], "SELECT 2");
	}

	#[test]
	fn drops_empty_and_comment_only_statements() {
		let stmts = split_statements("-- just a comment\n;\nSELECT 1;\n\n;");
		assert_eq!(stmts, vec!["SELECT 1"]);
	}
}

// vim: ts=4
