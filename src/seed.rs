//! JSON-to-SQL seed engine (`spec.md` §4.7)
//!
//! Expands an INSERT template, extracted once from between a spec's
//! begin/end markers, over one JSON file per tenant/config record and its
//! optional nested arrays, substituting `VariableBinding`s with escaping,
//! NULL handling, and bcrypt-aware password hashing.

use mysql::prelude::Queryable;
use mysql::Conn;
use serde_json::Value;
use std::path::Path;

use crate::error::{SeedError, SqlError};
use crate::template;
use crate::types::{DatabaseScope, SeedTableSpec, TenantDescriptor, VariableBinding};

const BCRYPT_COST: u32 = 10;

/// Derive one `TenantDescriptor` per JSON file in `config_files_path`, in
/// sorted-filename order, identity taken from its required `webid` field.
pub fn discover_tenants(config_files_path: &str) -> Result<Vec<TenantDescriptor>, SeedError> {
	let mut files: Vec<_> = std::fs::read_dir(config_files_path)
		.map_err(|e| SeedError::JsonParse { file: config_files_path.to_string(), message: e.to_string() })?
		.filter_map(|e| e.ok())
		.map(|e| e.path())
		.filter(|p| p.extension().and_then(|e| e.to_str()) == Some("json"))
		.collect();
	files.sort();

	let mut tenants = Vec::new();
	for file in files {
		let contents = std::fs::read_to_string(&file)
			.map_err(|e| SeedError::JsonParse { file: file.display().to_string(), message: e.to_string() })?;
		let value: Value = serde_json::from_str(&contents)
			.map_err(|e| SeedError::JsonParse { file: file.display().to_string(), message: e.to_string() })?;
		let webid = value
			.get("webid")
			.and_then(|v| v.as_str())
			.ok_or_else(|| SeedError::MissingField { spec: file.display().to_string(), field: "webid".into() })?;
		tenants.push(TenantDescriptor { webid: webid.to_string(), source_file: file.display().to_string() });
	}
	Ok(tenants)
}

/// Run one seed spec against every matching JSON file under
/// `config_files_path`, in sorted-filename order.
pub fn run_spec(
	conn: &mut Conn,
	spec: &SeedTableSpec,
	tenants: &[TenantDescriptor],
	application_name: &str,
) -> Result<usize, SeedError> {
	let template_sql = extract_template(spec)?;
	let mut inserted = 0;

	let mut files: Vec<_> = std::fs::read_dir(&spec.config_files_path)
		.map_err(|e| SeedError::JsonParse { file: spec.config_files_path.clone(), message: e.to_string() })?
		.filter_map(|e| e.ok())
		.map(|e| e.path())
		.filter(|p| {
			p.extension().and_then(|e| e.to_str()).map(|e| format!(".{}", e)) == Some(spec.config_files_extension.clone())
		})
		.collect();
	files.sort();

	for file in files {
		inserted += run_spec_for_file(conn, spec, &file, &template_sql, tenants, application_name)?;
	}

	Ok(inserted)
}

fn run_spec_for_file(
	conn: &mut Conn,
	spec: &SeedTableSpec,
	file: &Path,
	template_sql: &str,
	tenants: &[TenantDescriptor],
	application_name: &str,
) -> Result<usize, SeedError> {
	let contents = std::fs::read_to_string(file)
		.map_err(|e| SeedError::JsonParse { file: file.display().to_string(), message: e.to_string() })?;
	let parent: Value = serde_json::from_str(&contents)
		.map_err(|e| SeedError::JsonParse { file: file.display().to_string(), message: e.to_string() })?;

	if let Some(check) = &spec.check_exists_query {
		let resolved = resolve_check_query(check, spec, &parent, file)?;
		let count: Option<i64> = conn.query_first(&resolved).map_err(|e| {
			SeedError::Sql(SqlError::StatementFailed { file: file.display().to_string(), statement: resolved.clone(), message: e.to_string() })
		})?;
		if count.unwrap_or(0) >= 1 {
			// skip entire array for this parent (open question 2: authoritative)
			return Ok(0);
		}
	}

	let mut statements = Vec::new();
	spec_emissions(spec, &parent, file, template_sql, &mut statements)?;

	let targets: Vec<Option<&str>> = match spec.database {
		DatabaseScope::Main => vec![None],
		DatabaseScope::Tenant => tenants.iter().map(|t| Some(t.webid.as_str())).collect(),
	};

	let mut inserted = 0;
	for webid in targets {
		for stmt in &statements {
			let expanded = template::expand_sql(stmt, application_name, webid);
			conn.query_drop(&expanded).map_err(|e| {
				SeedError::Sql(SqlError::StatementFailed { file: file.display().to_string(), statement: expanded.clone(), message: e.to_string() })
			})?;
			inserted += 1;
		}
	}

	Ok(inserted)
}

fn resolve_check_query(check: &str, spec: &SeedTableSpec, parent: &Value, file: &Path) -> Result<String, SeedError> {
	substitute_variables(check, &spec.variables, parent, None, None, spec, file)
}

/// Produce one INSERT statement per array/nested-array emission.
fn spec_emissions(
	spec: &SeedTableSpec,
	parent: &Value,
	file: &Path,
	template_sql: &str,
	out: &mut Vec<String>,
) -> Result<(), SeedError> {
	match (&spec.array_field, &spec.nested_array_field) {
		(Some(array_field), Some(nested_field)) => {
			let outer = array(parent, array_field, spec, file)?;
			for elem in outer {
				let inner = array(elem, nested_field, spec, file)?;
				for nested in inner {
					out.push(substitute_variables(template_sql, &spec.variables, parent, Some(elem), Some(nested), spec, file)?);
				}
			}
		}
		(Some(array_field), None) => {
			let outer = array(parent, array_field, spec, file)?;
			for elem in outer {
				// `elem` is the innermost object here; `from_parent` falls
				// back straight to `parent` (there is no level in between).
				out.push(substitute_variables(template_sql, &spec.variables, parent, None, Some(elem), spec, file)?);
			}
		}
		(None, _) => {
			out.push(substitute_variables(template_sql, &spec.variables, parent, None, None, spec, file)?);
		}
	}
	Ok(())
}

fn array<'a>(value: &'a Value, field: &str, spec: &SeedTableSpec, file: &Path) -> Result<Vec<&'a Value>, SeedError> {
	match value.get(field) {
		Some(Value::Array(items)) => Ok(items.iter().collect()),
		Some(_) => Err(SeedError::MisshapedArray { spec: file_spec_name(spec, file), field: field.to_string() }),
		None => Err(SeedError::MisshapedArray { spec: file_spec_name(spec, file), field: field.to_string() }),
	}
}

fn file_spec_name(spec: &SeedTableSpec, file: &Path) -> String {
	format!("{} ({})", spec.table_name, file.display())
}

/// Resolve every `VariableBinding` against (parent, outer element, innermost
/// element) and substitute into `template_sql`.
///
/// - `from_parent=true`: read from the outermost available object — the
///   outer element in nested-array mode, else the parent.
/// - json_field `"."`: use the innermost element as-is.
/// - otherwise: read from the innermost element.
fn substitute_variables(
	template_sql: &str,
	variables: &[VariableBinding],
	parent: &Value,
	outer: Option<&Value>,
	innermost: Option<&Value>,
	spec: &SeedTableSpec,
	file: &Path,
) -> Result<String, SeedError> {
	let mut out = template_sql.to_string();

	for binding in variables {
		let is_password_field = binding.placeholder == "{{PASSWORD}}" || binding.placeholder == "{{PASSWORD_HASH}}";

		let raw = if binding.json_field == "." {
			innermost.or(outer).unwrap_or(parent)
		} else if binding.from_parent {
			outer.unwrap_or(parent)
		} else {
			innermost.or(outer).unwrap_or(parent)
		};

		let resolved = if binding.json_field == "." {
			Some(raw.clone())
		} else {
			dot_path(raw, &binding.json_field)
		};

		let sql_value = match resolved {
			Some(value) if !value.is_null() => {
				let mut s = json_scalar_to_string(&value);
				if is_password_field {
					s = hash_password(&s);
				}
				Substitution::Quoted(s)
			}
			_ => match &binding.default_value {
				Some(default) => Substitution::Quoted(default.clone()),
				None => Substitution::Null,
			},
		};

		out = apply_substitution(&out, &binding.placeholder, sql_value);
	}

	let _ = spec;
	let _ = file;
	Ok(out)
}

enum Substitution {
	Quoted(String),
	Null,
}

/// Apply one placeholder substitution. A `NULL` substitution strips
/// surrounding single quotes from the template (`'{{X}}'` -> `NULL`, not
/// `'NULL'`); a string substitution doubles embedded single quotes.
fn apply_substitution(template: &str, placeholder: &str, value: Substitution) -> String {
	match value {
		Substitution::Quoted(s) => {
			let escaped = s.replace('\'', "''");
			template.replace(placeholder, &escaped)
		}
		Substitution::Null => {
			let quoted = format!("'{}'", placeholder);
			if template.contains(&quoted) {
				template.replace(&quoted, "NULL")
			} else {
				template.replace(placeholder, "NULL")
			}
		}
	}
}

fn dot_path(value: &Value, path: &str) -> Option<Value> {
	let mut current = value.clone();
	for segment in path.split('.') {
		current = current.get(segment)?.clone();
	}
	Some(current)
}

fn json_scalar_to_string(value: &Value) -> String {
	match value {
		Value::String(s) => s.clone(),
		Value::Number(n) => n.to_string(),
		Value::Bool(b) => b.to_string(),
		other => other.to_string(),
	}
}

/// Bcrypt-hash `plaintext` at cost 10, formatted as `$2y$10$...` (60 chars),
/// per P8.
fn hash_password(plaintext: &str) -> String {
	let parts = bcrypt::hash_with_result(plaintext, BCRYPT_COST).expect("bcrypt hashing cannot fail for valid cost/input");
	parts.format_for_version(bcrypt::Version::TwoY)
}

/// Extract the region strictly between `begin_mark` and `end_mark` (first
/// occurrence) from `table_script_file`, trimmed of surrounding
/// block-comment delimiters if present.
fn extract_template(spec: &SeedTableSpec) -> Result<String, SeedError> {
	let contents = std::fs::read_to_string(&spec.table_script_file).map_err(|e| SeedError::JsonParse {
		file: spec.table_script_file.clone(),
		message: e.to_string(),
	})?;

	let begin = contents.find(&spec.begin_mark).ok_or_else(|| SeedError::MissingField {
		spec: spec.table_name.clone(),
		field: "begin_mark".into(),
	})?;
	let after_begin = begin + spec.begin_mark.len();
	let end = contents[after_begin..].find(&spec.end_mark).ok_or_else(|| SeedError::MissingField {
		spec: spec.table_name.clone(),
		field: "end_mark".into(),
	})?;

	let region = contents[after_begin..after_begin + end].trim();
	// The markers typically sit inside their own block comments
	// (`/* BEGIN ... */ ... /* END ... */`), so the extracted region is
	// bounded by the closing half of one and the opening half of the next.
	let region = region.trim_start_matches("*/").trim_end_matches("/*").trim();
	Ok(region.to_string())
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::types::DatabaseScope;

	fn spec() -> SeedTableSpec {
		SeedTableSpec {
			table_name: "users".into(),
			database: DatabaseScope::Main,
			table_script_file: String::new(),
			begin_mark: "BEGIN".into(),
			end_mark: "END".into(),
			check_exists_query: None,
			array_field: Some("users".into()),
			nested_array_field: Some("roles".into()),
			variables: vec![],
			config_files_path: String::new(),
			config_files_extension: ".json".into(),
		}
	}

	#[test]
	fn nested_array_emits_one_insert_per_leaf() {
		let parent: Value = serde_json::from_str(
			r#"{"webid":"demo","users":[{"username":"u1","password":"p","roles":["A","B"]}]}"#,
		)
		.unwrap();
		let mut out = Vec::new();
		spec_emissions(&spec(), &parent, Path::new("x.json"), "INSERT INTO t VALUES ('{{ROLE_NAME}}')", &mut out).unwrap();
		assert_eq!(out.len(), 2);
	}

	#[test]
	fn null_substitution_strips_surrounding_quotes() {
		let out = apply_substitution("INSERT INTO t (a) VALUES ('{{X}}')", "{{X}}", Substitution::Null);
		assert_eq!(out, "INSERT INTO t (a) VALUES (NULL)");
		assert!(!out.contains("'NULL'"));
	}

	#[test]
	fn string_substitution_doubles_single_quotes() {
		let out = apply_substitution(
			"INSERT INTO t (a) VALUES ('{{X}}')",
			"{{X}}",
			Substitution::Quoted("O'Brien".into()),
		);
		assert_eq!(out, "INSERT INTO t (a) VALUES ('O''Brien')");
	}

	#[test]
	fn bcrypt_hash_matches_expected_format_and_verifies() {
		let hash = hash_password("secret");
		assert!(hash.starts_with("$2y$10$"));
		assert_eq!(hash.len(), 60);
		assert!(bcrypt::verify("secret", &hash).unwrap());
	}

	#[test]
	fn extract_template_trims_block_comment_delimiters() {
		let tmp = tempfile::NamedTempFile::new().unwrap();
		std::fs::write(
			tmp.path(),
			"-- preamble\n/* BEGIN AI-AGENT.AI-DEPLOY: */\nINSERT INTO t VALUES (1);\n/* END AI-AGENT.AI-DEPLOY: */\n",
		)
		.unwrap();
		let mut spec = spec();
		spec.table_script_file = tmp.path().display().to_string();
		spec.begin_mark = "BEGIN AI-AGENT.AI-DEPLOY:".into();
		spec.end_mark = "END AI-AGENT.AI-DEPLOY:".into();
		let region = extract_template(&spec).unwrap();
		assert_eq!(region, "INSERT INTO t VALUES (1);");
	}
}

// vim: ts=4
