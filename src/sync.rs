//! Sync engine (`spec.md` §4.3): listing, diffing, and bounded-worker plan
//! execution.

use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Semaphore;

use crate::cache::{Cache, FileCacheEntry};
use crate::endpoint::{with_retry, Endpoint};
use crate::error::{EndpointError, TransferError};
use crate::ignore::IgnoreMatcher;
use crate::types::{FileMapping, FileRecord, SyncPlan};

/// Build the `SyncPlan` per §4.3's listing and diffing rules.
///
/// Destination listing is skipped (the cache's `files` map stands in for
/// it) unless `ignore_cache`, `clean_install`, or no prior cache exists.
#[allow(clippy::too_many_arguments)]
pub async fn build_plan(
	source: &dyn Endpoint,
	destination: &dyn Endpoint,
	ignore: &IgnoreMatcher,
	cache: &Cache,
	cache_existed: bool,
	ignore_cache: bool,
	clean_install: bool,
	delete_extra_files: bool,
) -> Result<SyncPlan, EndpointError> {
	let source_files: Vec<FileRecord> =
		source.list().await?.into_iter().filter(|f| !ignore.is_ignored(&f.rel_path)).collect();
	let source_by_path: BTreeMap<&str, &FileRecord> =
		source_files.iter().map(|f| (f.rel_path.as_str(), f)).collect();

	let must_list_destination = ignore_cache || clean_install || !cache_existed;

	let dest_view: BTreeMap<String, (u64, u64)> = if must_list_destination {
		destination
			.list()
			.await?
			.into_iter()
			.map(|f| (f.rel_path, (f.size, f.mtime)))
			.collect()
	} else {
		cache.files.iter().map(|(path, entry)| (path.clone(), (entry.size, entry.mtime))).collect()
	};

	let mut plan = SyncPlan { destination_was_listed: must_list_destination, ..Default::default() };

	for file in &source_files {
		match dest_view.get(file.rel_path.as_str()) {
			None => plan.creates.push(file.clone()),
			Some((size, mtime)) => {
				if file.size != *size || file.mtime > *mtime {
					plan.updates.push(file.clone());
				}
			}
		}
	}

	if delete_extra_files && must_list_destination {
		for path in dest_view.keys() {
			if !source_by_path.contains_key(path.as_str()) && !ignore.is_ignored(path) {
				plan.deletes.push(path.clone());
			}
		}
	}

	Ok(plan)
}

/// Transfer failures are transient unless the underlying error is
/// authentication or a missing-file/permission condition, per §4.1.
fn is_transient_transfer_error(err: &EndpointError) -> bool {
	matches!(err, EndpointError::Io(_) | EndpointError::SftpSubsystemFailed { .. })
}

/// Execute `plan`: creates/updates run on a bounded worker pool (single
/// worker when both endpoints are local); deletes run after, single
/// threaded. Returns per-path transfer errors instead of aborting, and the
/// cache entries observed for successfully transferred files.
pub async fn execute_plan(
	source: Arc<dyn Endpoint>,
	destination: Arc<dyn Endpoint>,
	plan: &SyncPlan,
	max_concurrent_transfers: usize,
	both_local: bool,
	dry_run: bool,
) -> (BTreeMap<String, FileCacheEntry>, Vec<TransferError>) {
	let mut new_entries = BTreeMap::new();
	let mut errors = Vec::new();

	if dry_run {
		for file in plan.creates.iter().chain(plan.updates.iter()) {
			tracing::info!(path = %file.rel_path, "would transfer (dry run)");
		}
		for path in &plan.deletes {
			tracing::info!(path, "would delete (dry run)");
		}
		return (new_entries, errors);
	}

	let worker_count = if both_local { 1 } else { max_concurrent_transfers.max(1) };
	let semaphore = Arc::new(Semaphore::new(worker_count));
	let mut join_set = tokio::task::JoinSet::new();

	for file in plan.creates.iter().chain(plan.updates.iter()).cloned() {
		let source = source.clone();
		let destination = destination.clone();
		let semaphore = semaphore.clone();
		join_set.spawn(async move {
			let _permit = semaphore.acquire_owned().await.expect("semaphore never closed");
			let result = with_retry(is_transient_transfer_error, || {
				let source = source.clone();
				let destination = destination.clone();
				let rel_path = file.rel_path.clone();
				let mtime = file.mtime;
				async move {
					let mut buf = Vec::new();
					source.read_to(&rel_path, &mut buf).await?;
					destination.write_from(&rel_path, &buf, mtime).await
				}
			})
			.await;
			(file, result)
		});
	}

	while let Some(joined) = join_set.join_next().await {
		match joined {
			Ok((file, Ok(()))) => {
				new_entries.insert(
					file.rel_path.clone(),
					FileCacheEntry { size: file.size, mtime: file.mtime, deployed_at: 0 },
				);
			}
			Ok((file, Err(e))) => {
				errors.push(TransferError { path: file.rel_path, message: e.to_string() });
			}
			Err(join_err) => {
				errors.push(TransferError { path: "<unknown>".into(), message: join_err.to_string() });
			}
		}
	}

	for path in &plan.deletes {
		if let Err(e) = destination.delete_file(path).await {
			errors.push(TransferError { path: path.clone(), message: e.to_string() });
		}
	}

	if delete_extra_files_left_empty_dirs(plan) {
		reap_empty_ancestor_dirs(&destination, &plan.deletes).await;
	}

	(new_entries, errors)
}

fn delete_extra_files_left_empty_dirs(plan: &SyncPlan) -> bool {
	!plan.deletes.is_empty()
}

/// Best-effort: ask the destination to remove now-empty ancestor
/// directories of deleted files. Endpoint drivers treat a non-empty or
/// already-missing directory deletion as a no-op failure we can ignore.
async fn reap_empty_ancestor_dirs(destination: &Arc<dyn Endpoint>, deleted_paths: &[String]) {
	let mut dirs: Vec<&str> = deleted_paths
		.iter()
		.filter_map(|p| p.rfind('/').map(|idx| &p[..idx]))
		.collect();
	dirs.sort_unstable();
	dirs.dedup();
	// Deepest directories first so a parent empties out only after its
	// children have already been reaped.
	dirs.sort_by_key(|d| std::cmp::Reverse(d.matches('/').count()));
	for dir in dirs {
		let _ = destination.delete_dir(dir).await;
	}
}

/// Apply explicit file mappings after the main plan. Mappings bypass the
/// ignore matcher and use the cache's `file_mappings` sub-map to skip
/// unchanged entries.
pub async fn apply_file_mappings(
	source: &dyn Endpoint,
	destination: &dyn Endpoint,
	mappings: &[FileMapping],
	cache: &mut Cache,
	ignore_cache: bool,
) -> Vec<TransferError> {
	let mut errors = Vec::new();

	for mapping in mappings {
		let stat = match source.stat(&mapping.source).await {
			Ok(Some(stat)) => stat,
			Ok(None) => {
				errors.push(TransferError { path: mapping.source.clone(), message: "mapping source not found".into() });
				continue;
			}
			Err(e) => {
				errors.push(TransferError { path: mapping.source.clone(), message: e.to_string() });
				continue;
			}
		};

		if !ignore_cache {
			if let Some(&cached_mtime) = cache.file_mappings.get(&mapping.destination_rel) {
				if cached_mtime == stat.mtime {
					continue;
				}
			}
		}

		let mut buf = Vec::new();
		let result = async {
			source.read_to(&mapping.source, &mut buf).await?;
			destination.write_from(&mapping.destination_rel, &buf, stat.mtime).await
		}
		.await;

		match result {
			Ok(()) => {
				cache.file_mappings.insert(mapping.destination_rel.clone(), stat.mtime);
			}
			Err(e) => errors.push(TransferError { path: mapping.destination_rel.clone(), message: e.to_string() }),
		}
	}

	errors
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::endpoint::LocalEndpoint;
	use tempfile::TempDir;

	#[tokio::test]
	async fn first_deploy_creates_single_file() {
		let src = TempDir::new().unwrap();
		let dst = TempDir::new().unwrap();
		std::fs::write(src.path().join("a.txt"), b"0123456789").unwrap();

		let source = LocalEndpoint::new(src.path());
		let destination = LocalEndpoint::new(dst.path());
		let ignore = IgnoreMatcher::new(&[], &[], &[], false).unwrap();
		let cache = Cache::default();

		let plan = build_plan(&source, &destination, &ignore, &cache, false, false, false, true).await.unwrap();
		assert_eq!(plan.creates.len(), 1);
		assert!(plan.destination_was_listed);
		assert!(plan.deletes.is_empty());
	}

	#[tokio::test]
	async fn incremental_no_op_skips_destination_listing() {
		let src = TempDir::new().unwrap();
		let dst = TempDir::new().unwrap();
		std::fs::write(src.path().join("a.txt"), b"0123456789").unwrap();

		let source = LocalEndpoint::new(src.path());
		let destination = LocalEndpoint::new(dst.path());
		let ignore = IgnoreMatcher::new(&[], &[], &[], false).unwrap();

		let mut cache = Cache::default();
		cache.files.insert("a.txt".into(), FileCacheEntry { size: 10, mtime: 4102444800, deployed_at: 1 });

		let plan = build_plan(&source, &destination, &ignore, &cache, true, false, false, true).await.unwrap();
		assert!(!plan.destination_was_listed);
		assert!(plan.is_empty());
	}

	#[tokio::test]
	async fn no_phantom_deletes_when_destination_not_listed() {
		let src = TempDir::new().unwrap();
		let dst = TempDir::new().unwrap();

		let source = LocalEndpoint::new(src.path());
		let destination = LocalEndpoint::new(dst.path());
		let ignore = IgnoreMatcher::new(&[], &[], &[], false).unwrap();

		let mut cache = Cache::default();
		cache.files.insert("gone.txt".into(), FileCacheEntry { size: 1, mtime: 1, deployed_at: 1 });

		let plan = build_plan(&source, &destination, &ignore, &cache, true, false, false, true).await.unwrap();
		assert!(!plan.destination_was_listed);
		assert!(plan.deletes.is_empty());
	}

	#[tokio::test]
	async fn ignored_paths_excluded_from_creates() {
		let src = TempDir::new().unwrap();
		let dst = TempDir::new().unwrap();
		std::fs::write(src.path().join("a.log"), b"x").unwrap();
		std::fs::write(src.path().join("a.txt"), b"x").unwrap();

		let source = LocalEndpoint::new(src.path());
		let destination = LocalEndpoint::new(dst.path());
		let ignore = IgnoreMatcher::new(&["*.log".to_string()], &[], &[], false).unwrap();
		let cache = Cache::default();

		let plan = build_plan(&source, &destination, &ignore, &cache, false, false, false, true).await.unwrap();
		assert_eq!(plan.creates.len(), 1);
		assert_eq!(plan.creates[0].rel_path, "a.txt");
	}

	#[tokio::test]
	async fn execute_plan_transfers_file_and_records_cache_entry() {
		let src = TempDir::new().unwrap();
		let dst = TempDir::new().unwrap();
		std::fs::write(src.path().join("a.txt"), b"hello").unwrap();

		let source: Arc<dyn Endpoint> = Arc::new(LocalEndpoint::new(src.path()));
		let destination: Arc<dyn Endpoint> = Arc::new(LocalEndpoint::new(dst.path()));
		let ignore = IgnoreMatcher::new(&[], &[], &[], false).unwrap();
		let cache = Cache::default();

		let plan = build_plan(source.as_ref(), destination.as_ref(), &ignore, &cache, false, false, false, true)
			.await
			.unwrap();
		let (entries, errors) = execute_plan(source, destination, &plan, 4, false, false).await;
		assert!(errors.is_empty());
		assert!(entries.contains_key("a.txt"));
		assert!(dst.path().join("a.txt").exists());
	}
}

// vim: ts=4
