//! CLI entry point.
//!
//! Loads and structurally validates the configuration document, then hands
//! it to the orchestrator. JSON parsing/schema validation beyond `serde`'s
//! own deserialization and the post-deploy permissions-script invocation
//! are external contracts (`spec.md` §1) and are not reimplemented here.

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

use ai_deploy::config::Config;
use ai_deploy::{logging, orchestrator, DeployError};

#[derive(Parser, Debug)]
#[command(name = "ai-deploy", about = "Incremental file sync and database provisioning engine")]
struct Cli {
	/// Path to the JSON configuration document.
	config: PathBuf,

	/// Only `ai-deploy` is recognized by this core.
	#[arg(long, default_value = "ai-deploy")]
	agent_type: String,

	#[arg(short, long)]
	verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
	let cli = Cli::parse();
	logging::init_tracing(cli.verbose);

	if cli.agent_type != "ai-deploy" {
		tracing::error!("unrecognized --agent-type: {}", cli.agent_type);
		return ExitCode::FAILURE;
	}

	let config = match load_config(&cli.config) {
		Ok(config) => config,
		Err(e) => {
			tracing::error!("{}", e);
			return ExitCode::FAILURE;
		}
	};

	match orchestrator::run(config, &cli.config).await {
		Ok(summary) => {
			tracing::info!(
				files_created = summary.files_created,
				files_updated = summary.files_updated,
				files_deleted = summary.files_deleted,
				file_mappings_applied = summary.file_mappings_applied,
				sql_files_run = summary.sql_files_run,
				sql_files_skipped = summary.sql_files_skipped,
				seed_rows_inserted = summary.seed_rows_inserted,
				dry_run = summary.dry_run,
				duration_ms = summary.duration.as_millis() as u64,
				"deploy finished"
			);
			ExitCode::SUCCESS
		}
		Err(e) => {
			tracing::error!("deploy failed: {}", e);
			ExitCode::FAILURE
		}
	}
}

fn load_config(path: &PathBuf) -> Result<Config, DeployError> {
	let contents = std::fs::read_to_string(path).map_err(|e| {
		DeployError::Configuration(ai_deploy::error::ConfigurationError::UnreadableFile {
			path: path.display().to_string(),
			source: e,
		})
	})?;
	serde_json::from_str(&contents).map_err(|e| DeployError::Other { message: format!("invalid configuration JSON: {}", e) })
}

// vim: ts=4
