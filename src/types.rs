//! Core data types for the deployment engine

use std::collections::BTreeMap;
use std::time::Duration;

/// A single filesystem entry as seen by an endpoint driver.
///
/// Invariant: two `FileRecord`s are "the same file" iff their `rel_path`
/// fields are byte-equal. `rel_path` always uses `/` regardless of which
/// endpoint produced it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileRecord {
	/// Slash-normalized path relative to the endpoint root.
	pub rel_path: String,
	/// Absolute path on the endpoint that produced this record.
	pub abs_path: String,
	pub size: u64,
	/// Modification time, whole seconds since epoch.
	pub mtime: u64,
	pub is_dir: bool,
}

impl FileRecord {
	pub fn file(rel_path: impl Into<String>, abs_path: impl Into<String>, size: u64, mtime: u64) -> Self {
		FileRecord { rel_path: rel_path.into(), abs_path: abs_path.into(), size, mtime, is_dir: false }
	}
}

/// The three disjoint sets of relative paths a sync run computes.
///
/// Invariant: every path in `deletes` lies inside the destination root.
/// Immutable once built.
#[derive(Debug, Default, Clone)]
pub struct SyncPlan {
	pub creates: Vec<FileRecord>,
	pub updates: Vec<FileRecord>,
	pub deletes: Vec<String>,
	/// True when the destination was actually listed (as opposed to the
	/// cache's view being trusted) — callers use this to decide whether an
	/// empty `deletes` means "nothing to delete" or "deletion was skipped".
	pub destination_was_listed: bool,
}

impl SyncPlan {
	pub fn is_empty(&self) -> bool {
		self.creates.is_empty() && self.updates.is_empty() && self.deletes.is_empty()
	}
}

/// One tenant, derived from a seed JSON file's required `webid` field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TenantDescriptor {
	pub webid: String,
	/// Absolute path of the JSON file this tenant was derived from.
	pub source_file: String,
}

/// A rule mapping an SQL placeholder to a JSON path plus optional default
/// and parent-scope flag.
#[derive(Clone, Debug)]
pub struct VariableBinding {
	/// The literal placeholder token, e.g. `"{{USERNAME}}"`.
	pub placeholder: String,
	/// Dot-notation JSON field path. The single dot `.` denotes the current
	/// element for primitive arrays.
	pub json_field: String,
	pub from_parent: bool,
	pub default_value: Option<String>,
}

/// Which database a seed spec or a tenant-scoped script phase targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DatabaseScope {
	Main,
	Tenant,
}

/// A single seeding rule: expand an INSERT template from parent JSON and
/// optional nested arrays into a stream of SQL statements.
#[derive(Clone, Debug)]
pub struct SeedTableSpec {
	pub table_name: String,
	pub database: DatabaseScope,
	pub table_script_file: String,
	pub begin_mark: String,
	pub end_mark: String,
	pub check_exists_query: Option<String>,
	pub array_field: Option<String>,
	pub nested_array_field: Option<String>,
	pub variables: Vec<VariableBinding>,
	pub config_files_path: String,
	pub config_files_extension: String,
}

/// One subdirectory of SQL scripts executed as an atomic group.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PhaseKind {
	Setup,
	Tables,
	Procedures,
	Data,
	/// `tenant_data_scripts`: files carry their own `USE <db>;` statements
	/// and are routed without pre-binding a default database.
	TenantDataScripts,
	Migration,
}

/// One phase of a `DatabaseDeploymentPlan`: a scope, a directory kind, an
/// absolute directory path, and whether it repeats once per tenant.
#[derive(Clone, Debug)]
pub struct DeploymentPhase {
	pub scope: DatabaseScope,
	pub kind: PhaseKind,
	pub directory: String,
	pub per_tenant: bool,
	/// Database to `USE` before running this phase's files, templated with
	/// `{{WEBID}}` per tenant. `None` for `TenantDataScripts`, whose files
	/// carry their own `USE` statements.
	pub db_name: Option<String>,
}

/// Ordered list of phases, produced from configuration and filtered by
/// `migration_only`.
#[derive(Clone, Debug, Default)]
pub struct DatabaseDeploymentPlan {
	pub phases: Vec<DeploymentPhase>,
}

/// An (absolute-or-relative source file, destination-relative target) pair
/// processed after the main sync plan executes.
#[derive(Clone, Debug)]
pub struct FileMapping {
	pub source: String,
	pub destination_rel: String,
}

/// Summary returned by the orchestrator at the end of a run and logged as
/// the final structured line before `main` maps it to an exit code.
#[derive(Debug, Default)]
pub struct DeploySummary {
	pub files_created: usize,
	pub files_updated: usize,
	pub files_deleted: usize,
	pub file_mappings_applied: usize,
	pub sql_files_run: usize,
	pub sql_files_skipped: usize,
	pub seed_rows_inserted: usize,
	pub transfer_errors: Vec<String>,
	pub dry_run: bool,
	pub duration: Duration,
}

/// Per-parent-JSON scratch state threaded through seed expansion; not part
/// of the public data model but kept here alongside its siblings.
pub type JsonFileIndex = BTreeMap<String, serde_json::Value>;

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn file_records_compare_by_rel_path_only() {
		let a = FileRecord::file("a/b.txt", "/src/a/b.txt", 10, 1700000000);
		let b = FileRecord::file("a/b.txt", "/dst/a/b.txt", 999, 1);
		assert_eq!(a.rel_path, b.rel_path);
	}

	#[test]
	fn sync_plan_is_empty_when_all_sets_empty() {
		let plan = SyncPlan::default();
		assert!(plan.is_empty());
	}

	#[test]
	fn sync_plan_not_empty_with_a_create() {
		let mut plan = SyncPlan::default();
		plan.creates.push(FileRecord::file("x", "/x", 1, 1));
		assert!(!plan.is_empty());
	}
}

// vim: ts=4
