use ai_deploy::config::{Config, EndpointConfig, EndpointKind, FileMappingConfig, IgnoreConfig, Options};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn local_config(src: &Path, dst: &Path) -> Config {
	Config {
		agent_name: "ai-deploy".into(),
		source: EndpointConfig { kind: EndpointKind::WindowsShare, path: src.display().to_string(), ..Default::default() },
		destination: EndpointConfig { kind: EndpointKind::WindowsShare, path: dst.display().to_string(), ..Default::default() },
		..Default::default()
	}
}

fn cache_path(config_path: &Path) -> std::path::PathBuf {
	ai_deploy::config::cache_path_for(config_path)
}

#[tokio::test]
async fn first_deploy_creates_missing_file() {
	let src = TempDir::new().unwrap();
	let dst = TempDir::new().unwrap();
	let config_dir = TempDir::new().unwrap();
	let config_path = config_dir.path().join("acme.json");

	fs::write(src.path().join("a").join("..").join("placeholder"), "").ok();
	fs::create_dir_all(src.path().join("a")).unwrap();
	fs::write(src.path().join("a/b.txt"), b"0123456789").unwrap();

	let config = local_config(src.path(), dst.path());
	let summary = ai_deploy::orchestrator::run(config, &config_path).await.unwrap();

	assert_eq!(summary.files_created, 1);
	assert_eq!(summary.files_updated, 0);
	assert!(dst.path().join("a/b.txt").exists());
	assert!(cache_path(&config_path).exists());
}

#[tokio::test]
async fn incremental_no_op_skips_destination_listing_and_transfers_nothing() {
	let src = TempDir::new().unwrap();
	let dst = TempDir::new().unwrap();
	let config_dir = TempDir::new().unwrap();
	let config_path = config_dir.path().join("acme.json");

	fs::write(src.path().join("a.txt"), b"hello").unwrap();

	let config = local_config(src.path(), dst.path());
	ai_deploy::orchestrator::run(config.clone(), &config_path).await.unwrap();

	let summary = ai_deploy::orchestrator::run(config, &config_path).await.unwrap();
	assert_eq!(summary.files_created, 0);
	assert_eq!(summary.files_updated, 0);
	assert_eq!(summary.files_deleted, 0);
}

#[tokio::test]
async fn incremental_update_runs_on_size_change() {
	let src = TempDir::new().unwrap();
	let dst = TempDir::new().unwrap();
	let config_dir = TempDir::new().unwrap();
	let config_path = config_dir.path().join("acme.json");

	fs::write(src.path().join("a.txt"), b"hello").unwrap();
	let config = local_config(src.path(), dst.path());
	ai_deploy::orchestrator::run(config.clone(), &config_path).await.unwrap();

	fs::write(src.path().join("a.txt"), b"hello world, much longer now").unwrap();
	let summary = ai_deploy::orchestrator::run(config, &config_path).await.unwrap();
	assert_eq!(summary.files_updated, 1);
	assert_eq!(fs::read(dst.path().join("a.txt")).unwrap(), b"hello world, much longer now");
}

#[tokio::test]
async fn deletes_are_skipped_when_destination_listing_is_skipped() {
	let src = TempDir::new().unwrap();
	let dst = TempDir::new().unwrap();
	let config_dir = TempDir::new().unwrap();
	let config_path = config_dir.path().join("acme.json");

	fs::write(src.path().join("a.txt"), b"keep").unwrap();
	fs::write(src.path().join("b.txt"), b"remove-me").unwrap();
	let config = local_config(src.path(), dst.path());
	ai_deploy::orchestrator::run(config.clone(), &config_path).await.unwrap();
	assert!(dst.path().join("b.txt").exists());

	fs::remove_file(src.path().join("b.txt")).unwrap();
	let summary = ai_deploy::orchestrator::run(config, &config_path).await.unwrap();

	// Cache is trusted, so the destination is never listed: no deletes occur
	// even though b.txt is gone from the source (P2 — no phantom deletes).
	assert_eq!(summary.files_deleted, 0);
	assert!(dst.path().join("b.txt").exists());
}

#[tokio::test]
async fn deletes_propagate_when_ignore_cache_forces_destination_listing() {
	let src = TempDir::new().unwrap();
	let dst = TempDir::new().unwrap();
	let config_dir = TempDir::new().unwrap();
	let config_path = config_dir.path().join("acme.json");

	fs::write(src.path().join("a.txt"), b"keep").unwrap();
	fs::write(src.path().join("b.txt"), b"remove-me").unwrap();
	let mut config = local_config(src.path(), dst.path());
	ai_deploy::orchestrator::run(config.clone(), &config_path).await.unwrap();

	fs::remove_file(src.path().join("b.txt")).unwrap();
	config.options.ignore_cache = true;
	let summary = ai_deploy::orchestrator::run(config, &config_path).await.unwrap();

	assert_eq!(summary.files_deleted, 1);
	assert!(!dst.path().join("b.txt").exists());
}

#[tokio::test]
async fn ignore_patterns_exclude_matching_paths_from_the_plan() {
	let src = TempDir::new().unwrap();
	let dst = TempDir::new().unwrap();
	let config_dir = TempDir::new().unwrap();
	let config_path = config_dir.path().join("acme.json");

	fs::write(src.path().join("keep.txt"), b"keep").unwrap();
	fs::write(src.path().join("debug.log"), b"noisy").unwrap();

	let mut config = local_config(src.path(), dst.path());
	config.ignore = IgnoreConfig { files: vec!["*.log".into()], folders: vec![], extensions: vec![] };
	let summary = ai_deploy::orchestrator::run(config, &config_path).await.unwrap();

	assert_eq!(summary.files_created, 1);
	assert!(dst.path().join("keep.txt").exists());
	assert!(!dst.path().join("debug.log").exists());
}

#[tokio::test]
async fn application_name_template_expands_into_endpoint_paths() {
	let outer = TempDir::new().unwrap();
	let src_root = outer.path().join("acme");
	fs::create_dir_all(&src_root).unwrap();
	fs::write(src_root.join("a.txt"), b"hi").unwrap();
	let dst = TempDir::new().unwrap();
	let config_dir = TempDir::new().unwrap();
	let config_path = config_dir.path().join("acme.json");

	let mut config = local_config(Path::new("placeholder"), dst.path());
	config.application_name = Some("acme".into());
	config.source.path = format!("{}/{{{{APPLICATION_NAME}}}}", outer.path().display());

	let summary = ai_deploy::orchestrator::run(config, &config_path).await.unwrap();
	assert_eq!(summary.files_created, 1);
	assert!(dst.path().join("a.txt").exists());
}

#[tokio::test]
async fn dry_run_performs_no_writes_and_does_not_write_cache() {
	let src = TempDir::new().unwrap();
	let dst = TempDir::new().unwrap();
	let config_dir = TempDir::new().unwrap();
	let config_path = config_dir.path().join("acme.json");

	fs::write(src.path().join("a.txt"), b"hello").unwrap();
	let mut config = local_config(src.path(), dst.path());
	config.options.dry_run = true;

	let summary = ai_deploy::orchestrator::run(config, &config_path).await.unwrap();
	assert_eq!(summary.files_created, 1);
	assert!(!dst.path().join("a.txt").exists());
	assert!(!cache_path(&config_path).exists());
}

#[tokio::test]
async fn file_mappings_apply_after_the_main_plan() {
	let src = TempDir::new().unwrap();
	let dst = TempDir::new().unwrap();
	let config_dir = TempDir::new().unwrap();
	let config_path = config_dir.path().join("acme.json");

	fs::write(src.path().join("license.txt"), b"MIT").unwrap();
	let mut config = local_config(src.path(), dst.path());
	config.file_mappings =
		vec![FileMappingConfig { source: src.path().join("license.txt").display().to_string(), destination: "LICENSE".into() }];

	let summary = ai_deploy::orchestrator::run(config, &config_path).await.unwrap();
	assert_eq!(summary.file_mappings_applied, 1);
	assert_eq!(fs::read(dst.path().join("LICENSE")).unwrap(), b"MIT");
}

#[tokio::test]
async fn wrong_agent_name_is_a_fatal_configuration_error() {
	let src = TempDir::new().unwrap();
	let dst = TempDir::new().unwrap();
	let config_dir = TempDir::new().unwrap();
	let config_path = config_dir.path().join("acme.json");

	let mut config = local_config(src.path(), dst.path());
	config.agent_name = "some-other-agent".into();

	let result = ai_deploy::orchestrator::run(config, &config_path).await;
	assert!(result.is_err());
	assert!(!dst.path().join("anything").exists());
}

#[allow(dead_code)]
fn unused_options_default_sanity() -> Options {
	Options::default()
}
