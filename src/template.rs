//! Template engine (`spec.md` §4.5)
//!
//! Two passes. Pass 1 runs once after configuration loading: every string
//! value in the configuration tree is scanned for `{{APPLICATION_NAME}}`
//! and substituted in place. Pass 2 runs at SQL execution time: the raw
//! bytes of every SQL file are substituted for both `{{APPLICATION_NAME}}`
//! and, when the execution context is per-tenant, `{{WEBID}}`.
//!
//! Substitution is plain textual replacement, case-sensitive, and
//! non-recursive — a value containing another placeholder is not
//! re-expanded. Unsubstituted placeholders are not an error; they are left
//! intact (pass 1) or reach the server as-is (pass 2).

use crate::config::Config;

pub const APPLICATION_NAME_TOKEN: &str = "{{APPLICATION_NAME}}";
pub const WEBID_TOKEN: &str = "{{WEBID}}";

/// Pass 1: substitute `{{APPLICATION_NAME}}` across every path-bearing
/// string field of the configuration tree — per `spec.md` §4.5, every path
/// inside the document is subject to this pass, including `database`'s
/// script directories and seed-table file paths.
pub fn expand_config(config: &mut Config, application_name: &str) {
	if let Some(desc) = &mut config.description {
		*desc = substitute_once(desc, APPLICATION_NAME_TOKEN, application_name);
	}
	if let Some(warn) = &mut config.warn {
		*warn = substitute_once(warn, APPLICATION_NAME_TOKEN, application_name);
	}
	config.source.path = substitute_once(&config.source.path, APPLICATION_NAME_TOKEN, application_name);
	config.destination.path =
		substitute_once(&config.destination.path, APPLICATION_NAME_TOKEN, application_name);
	if let Some(script) = &mut config.set_permissions_script {
		*script = substitute_once(script, APPLICATION_NAME_TOKEN, application_name);
	}
	for mapping in &mut config.file_mappings {
		mapping.source = substitute_once(&mapping.source, APPLICATION_NAME_TOKEN, application_name);
		mapping.destination =
			substitute_once(&mapping.destination, APPLICATION_NAME_TOKEN, application_name);
	}
	if let Some(db) = &mut config.database {
		expand_database(db, application_name);
	}
}

fn expand_database(db: &mut crate::config::DatabaseConfig, application_name: &str) {
	expand_script_dirs(&mut db.main, application_name);
	if let Some(tenants) = &mut db.tenants {
		tenants.config_files_path = substitute_once(&tenants.config_files_path, APPLICATION_NAME_TOKEN, application_name);
		expand_script_dirs(&mut tenants.database, application_name);
	}
	if let Some(tenant_data) = &mut db.tenant_data_scripts {
		if let Some(dir) = &mut tenant_data.data_path {
			*dir = substitute_once(dir, APPLICATION_NAME_TOKEN, application_name);
		}
	}
	for table in &mut db.seed_tables {
		table.table_script_file = substitute_once(&table.table_script_file, APPLICATION_NAME_TOKEN, application_name);
		table.config_files_path = substitute_once(&table.config_files_path, APPLICATION_NAME_TOKEN, application_name);
	}
}

fn expand_script_dirs(dirs: &mut crate::config::ScriptDirs, application_name: &str) {
	for field in [
		&mut dirs.setup_path,
		&mut dirs.tables_path,
		&mut dirs.procedures_path,
		&mut dirs.data_path,
		&mut dirs.migration_path,
	] {
		if let Some(path) = field {
			*path = substitute_once(path, APPLICATION_NAME_TOKEN, application_name);
		}
	}
}

/// Pass 2: substitute `{{APPLICATION_NAME}}` and, when `webid` is given,
/// `{{WEBID}}` into a raw SQL file body.
pub fn expand_sql(sql: &str, application_name: &str, webid: Option<&str>) -> String {
	let mut out = substitute_once(sql, APPLICATION_NAME_TOKEN, application_name);
	if let Some(webid) = webid {
		out = substitute_once(&out, WEBID_TOKEN, webid);
	}
	out
}

/// Plain, single-pass, non-recursive textual replacement.
fn substitute_once(input: &str, token: &str, value: &str) -> String {
	input.replace(token, value)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn application_name_expands_into_paths() {
		let mut cfg = Config::default();
		cfg.source.path = "/srv/{{APPLICATION_NAME}}/app".into();
		expand_config(&mut cfg, "acme");
		assert_eq!(cfg.source.path, "/srv/acme/app");
	}

	#[test]
	fn application_name_expands_into_database_and_seed_paths() {
		use crate::config::{DatabaseConfig, SeedTableSpecConfig, TenantsConfig};

		let mut cfg = Config::default();
		let mut db = DatabaseConfig::default();
		db.main.tables_path = Some("/srv/{{APPLICATION_NAME}}/sql/tables".into());
		db.main.data_path = Some("/srv/{{APPLICATION_NAME}}/sql/data".into());
		db.tenants = Some(TenantsConfig {
			config_files_path: "/srv/{{APPLICATION_NAME}}/tenants".into(),
			database: Default::default(),
		});
		db.tenants.as_mut().unwrap().database.setup_path = Some("/srv/{{APPLICATION_NAME}}/tenant-sql/setup".into());
		let mut seed = SeedTableSpecConfig::default();
		seed.table_script_file = "/srv/{{APPLICATION_NAME}}/sql/users.sql".into();
		seed.config_files_path = "/srv/{{APPLICATION_NAME}}/seed/users".into();
		db.seed_tables.push(seed);
		cfg.database = Some(db);

		expand_config(&mut cfg, "acme");

		let db = cfg.database.unwrap();
		assert_eq!(db.main.tables_path.unwrap(), "/srv/acme/sql/tables");
		assert_eq!(db.main.data_path.unwrap(), "/srv/acme/sql/data");
		let tenants = db.tenants.unwrap();
		assert_eq!(tenants.config_files_path, "/srv/acme/tenants");
		assert_eq!(tenants.database.setup_path.unwrap(), "/srv/acme/tenant-sql/setup");
		assert_eq!(db.seed_tables[0].table_script_file, "/srv/acme/sql/users.sql");
		assert_eq!(db.seed_tables[0].config_files_path, "/srv/acme/seed/users");
	}

	#[test]
	fn substitution_is_not_recursive() {
		// A value that itself contains a placeholder is not re-expanded.
		let out = substitute_once("{{APPLICATION_NAME}}", "{{APPLICATION_NAME}}", "{{WEBID}}");
		assert_eq!(out, "{{WEBID}}");
	}

	#[test]
	fn unmatched_tokens_are_left_intact() {
		let out = expand_sql("SELECT * FROM t WHERE x = {{UNKNOWN}}", "acme", None);
		assert_eq!(out, "SELECT * FROM t WHERE x = {{UNKNOWN}}");
	}

	#[test]
	fn sql_pass_substitutes_both_tokens_in_tenant_context() {
		let out = expand_sql(
			"INSERT INTO t (app, tenant) VALUES ('{{APPLICATION_NAME}}', '{{WEBID}}')",
			"acme",
			Some("demo"),
		);
		assert_eq!(out, "INSERT INTO t (app, tenant) VALUES ('acme', 'demo')");
	}
}

// vim: ts=4
