//! Orchestrator (`spec.md` §2, §9 "Shared SSH session")
//!
//! Wires every component together for one run: loads and validates
//! configuration, expands templates, builds the ignore matcher, acquires
//! endpoints, runs the file sync engine, applies file mappings, drives the
//! SQL executor and seed engine, and writes the cache — releasing every
//! acquired resource on every exit path.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::cache::Cache;
use crate::config::{self, cache_path_for, Config, DatabaseConfig, EndpointKind, SeedTableSpecConfig};
use crate::endpoint::{Endpoint, LocalEndpoint, SshEndpoint};
use crate::error::DeployError;
use crate::ignore::IgnoreMatcher;
use crate::sql::{executor::PlanBuilder, Executor};
use crate::sync;
use crate::template;
use crate::types::{DatabaseScope, DeploySummary, FileMapping, SeedTableSpec, TenantDescriptor, VariableBinding};

pub type DeploySummaryResult = Result<DeploySummary, DeployError>;

/// Run a full deployment for an already-loaded, already-validated
/// configuration document found at `config_path`.
pub async fn run(mut config: Config, config_path: &std::path::Path) -> DeploySummaryResult {
	let start = Instant::now();
	config.validate()?;

	let application_name = config.application_name.clone().unwrap_or_default();
	template::expand_config(&mut config, &application_name);

	let ignore = IgnoreMatcher::new(
		&config.ignore.files,
		&config.ignore.folders,
		&config.ignore.extensions,
		config.source.is_windows_root(),
	)?;

	let cache_path = cache_path_for(config_path);
	let cache_existed = cache_path.exists();
	let mut cache = if config.options.ignore_cache { Cache::default() } else { Cache::load(&cache_path) };

	let source: Arc<dyn Endpoint> = open_endpoint(&config.source, config.options.max_concurrent_transfers).await?;
	let destination: Arc<dyn Endpoint> = open_endpoint(&config.destination, config.options.max_concurrent_transfers).await?;

	let result = run_inner(&config, &application_name, &ignore, &mut cache, cache_existed, source, destination).await;

	match result {
		Ok(mut summary) => {
			summary.duration = start.elapsed();
			if !config.options.dry_run && summary.transfer_errors.is_empty() {
				if let Err(e) = cache.save(&cache_path) {
					tracing::error!("cache write failed (deploy already succeeded): {}", e);
				}
			}
			Ok(summary)
		}
		Err(e) => Err(e),
	}
}

async fn run_inner(
	config: &Config,
	application_name: &str,
	ignore: &IgnoreMatcher,
	cache: &mut Cache,
	cache_existed: bool,
	source: Arc<dyn Endpoint>,
	destination: Arc<dyn Endpoint>,
) -> DeploySummaryResult {
	let options = &config.options;

	if options.clean_install {
		tracing::warn!("clean_install: wiping destination root before sync plan runs");
		wipe_destination_root(destination.as_ref()).await?;
	}

	let plan = sync::build_plan(
		source.as_ref(),
		destination.as_ref(),
		ignore,
		cache,
		cache_existed,
		options.ignore_cache,
		options.clean_install,
		options.delete_extra_files,
	)
	.await?;

	let both_local =
		config.source.kind == EndpointKind::WindowsShare && config.destination.kind == EndpointKind::WindowsShare;

	let (new_entries, transfer_errors) = sync::execute_plan(
		source.clone(),
		destination.clone(),
		&plan,
		options.max_concurrent_transfers,
		both_local,
		options.dry_run,
	)
	.await;

	let mut summary = DeploySummary {
		files_created: plan.creates.len(),
		files_updated: plan.updates.len(),
		files_deleted: plan.deletes.len(),
		dry_run: options.dry_run,
		..Default::default()
	};

	if !transfer_errors.is_empty() {
		summary.transfer_errors = transfer_errors.iter().map(|e| e.to_string()).collect();
		return Err(DeployError::TransferErrors(transfer_errors));
	}

	if !options.dry_run {
		for (path, mut entry) in new_entries {
			entry.deployed_at = now_secs();
			cache.files.insert(path, entry);
		}
		cache.last_deployment = now_secs();

		let mapping_errors = sync::apply_file_mappings(
			source.as_ref(),
			destination.as_ref(),
			&file_mappings(config),
			cache,
			options.ignore_cache,
		)
		.await;
		summary.file_mappings_applied = config.file_mappings.len() - mapping_errors.len();
		if !mapping_errors.is_empty() {
			summary.transfer_errors = mapping_errors.iter().map(|e| e.to_string()).collect();
			return Err(DeployError::TransferErrors(mapping_errors));
		}
	}

	if let Some(db) = &config.database {
		if !options.dry_run {
			run_database_phases(db, application_name, destination.as_ref(), cache, options.ignore_cache, options.clean_install, &mut summary)
				.await?;
		}
	}

	Ok(summary)
}

async fn open_endpoint(cfg: &config::EndpointConfig, max_concurrent_transfers: usize) -> Result<Arc<dyn Endpoint>, DeployError> {
	match cfg.kind {
		EndpointKind::WindowsShare => Ok(Arc::new(LocalEndpoint::new(&cfg.path))),
		EndpointKind::Ssh => {
			let creds = crate::endpoint::ssh::SshCredentials {
				host: cfg.host.as_deref().unwrap_or_default(),
				port: cfg.ssh_port(),
				username: cfg.username.as_deref().unwrap_or_default(),
				password: cfg.password.as_deref(),
				private_key_file: cfg.private_key_file.as_deref(),
				connect_timeout: Duration::from_secs(30),
				operation_timeout: Duration::from_secs(120),
				max_concurrent_transfers,
			};
			let endpoint = SshEndpoint::connect(&cfg.path, creds).map_err(DeployError::Endpoint)?;
			Ok(Arc::new(endpoint))
		}
	}
}

async fn wipe_destination_root(destination: &dyn Endpoint) -> Result<(), DeployError> {
	for file in destination.list().await.map_err(DeployError::Endpoint)? {
		destination.delete_file(&file.rel_path).await.map_err(DeployError::Endpoint)?;
	}
	Ok(())
}

fn file_mappings(config: &Config) -> Vec<FileMapping> {
	config
		.file_mappings
		.iter()
		.map(|m| FileMapping { source: m.source.clone(), destination_rel: m.destination.clone() })
		.collect()
}

async fn run_database_phases(
	db: &DatabaseConfig,
	application_name: &str,
	destination: &dyn Endpoint,
	cache: &mut Cache,
	ignore_cache: bool,
	clean_install: bool,
	summary: &mut DeploySummary,
) -> Result<(), DeployError> {
	let tenants = discover_tenants(db)?;

	// Reuse the destination's SSH session for the database tunnel; a local
	// destination connects to the configured database host directly.
	let tunnel = destination
		.ssh_session()
		.map(|session| crate::sql::Tunnel::open(&session, db.db_host(), db.db_port()))
		.transpose()
		.map_err(DeployError::Sql)?;
	let (connect_host, connect_port) = match &tunnel {
		Some(t) => ("127.0.0.1".to_string(), t.local_port),
		None => (db.db_host().to_string(), db.db_port()),
	};

	let db = db.clone();
	let application_name = application_name.to_string();
	let phases = PlanBuilder::build(&db, &tenants);
	let clean_install_dbs = clean_install_db_names(&db, &tenants, &application_name);
	let seed_specs = seed_specs(&db);
	let mut moved_cache = std::mem::take(cache);

	let outcome = tokio::task::spawn_blocking(move || -> Result<(usize, usize, usize, Cache), DeployError> {
		let mut executor = Executor::connect(&connect_host, connect_port, &db.admin_username, &db.admin_password)
			.map_err(DeployError::Sql)?;
		if clean_install {
			executor.drop_databases(&clean_install_dbs).map_err(DeployError::Sql)?;
		}
		let (run_count, skip_count) =
			executor.run_phases(&phases, &tenants, &application_name, &mut moved_cache, ignore_cache, clean_install).map_err(DeployError::Sql)?;

		let mut seed_rows = 0;
		for spec in &seed_specs {
			seed_rows += crate::seed::run_spec(executor.conn_mut(), spec, &tenants, &application_name)
				.map_err(|e| DeployError::Other { message: e.to_string() })?;
		}

		Ok((run_count, skip_count, seed_rows, moved_cache))
	})
	.await
	.map_err(|e| DeployError::Other { message: e.to_string() })??;

	let (run_count, skip_count, seed_rows, restored_cache) = outcome;
	*cache = restored_cache;
	summary.sql_files_run = run_count;
	summary.sql_files_skipped = skip_count;
	summary.seed_rows_inserted = seed_rows;
	drop(tunnel);

	Ok(())
}

fn discover_tenants(db: &DatabaseConfig) -> Result<Vec<TenantDescriptor>, DeployError> {
	match &db.tenants {
		Some(tenants_cfg) => {
			crate::seed::discover_tenants(&tenants_cfg.config_files_path).map_err(|e| DeployError::Other { message: e.to_string() })
		}
		None => Ok(Vec::new()),
	}
}

fn clean_install_db_names(db: &DatabaseConfig, tenants: &[TenantDescriptor], application_name: &str) -> Vec<String> {
	let mut names = Vec::new();
	if let Some(name) = &db.main.database {
		names.push(template::expand_sql(name, application_name, None));
	}
	if let Some(tenants_cfg) = &db.tenants {
		if let Some(name) = &tenants_cfg.database.database {
			for tenant in tenants {
				names.push(template::expand_sql(name, application_name, Some(&tenant.webid)));
			}
		}
	}
	names
}

fn seed_specs(db: &DatabaseConfig) -> Vec<SeedTableSpec> {
	db.seed_tables.iter().map(convert_seed_spec).collect()
}

fn convert_seed_spec(cfg: &SeedTableSpecConfig) -> SeedTableSpec {
	SeedTableSpec {
		table_name: cfg.table_name.clone(),
		database: match cfg.database.as_deref() {
			Some("tenant") => DatabaseScope::Tenant,
			_ => DatabaseScope::Main,
		},
		table_script_file: cfg.table_script_file.clone(),
		begin_mark: cfg.begin_mark.clone(),
		end_mark: cfg.end_mark.clone(),
		check_exists_query: cfg.check_exists_query.clone(),
		array_field: cfg.array_field.clone(),
		nested_array_field: cfg.nested_array_field.clone(),
		variables: cfg.variables.iter().map(convert_binding).collect(),
		config_files_path: cfg.config_files_path.clone(),
		config_files_extension: cfg.config_files_extension.clone().unwrap_or_else(|| ".json".into()),
	}
}

fn convert_binding(cfg: &config::VariableBindingConfig) -> VariableBinding {
	VariableBinding {
		placeholder: cfg.placeholder.clone(),
		json_field: cfg.json_field.clone(),
		from_parent: cfg.from_parent,
		default_value: cfg.default_value.clone(),
	}
}

fn now_secs() -> u64 {
	std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

// vim: ts=4
