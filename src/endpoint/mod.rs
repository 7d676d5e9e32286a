//! Endpoint drivers (`spec.md` §4.1)
//!
//! A uniform capability set over either a local filesystem root (possibly
//! a UNC share) or a remote SSH+SFTP session rooted at a remote absolute
//! path. The `type` field of the configuration selects the concrete
//! variant at construction; the orchestrator holds the trait object for
//! its entire run and releases it on every exit path.

pub mod local;
pub mod ssh;

use async_trait::async_trait;
use std::time::Duration;

use crate::error::EndpointError;
use crate::types::FileRecord;

pub use local::LocalEndpoint;
pub use ssh::SshEndpoint;

/// Transient errors are retried up to three times with exponential
/// backoff (0.5s, 1s, 2s); permanent errors surface immediately.
const RETRY_DELAYS_MS: [u64; 3] = [500, 1000, 2000];

/// Capability set every endpoint driver exposes uniformly, per §4.1.
#[async_trait]
pub trait Endpoint: Send + Sync {
	/// Recursive list of every regular file under root. mtimes are
	/// truncated to whole seconds; paths are relative, `/`-separated.
	async fn list(&self) -> Result<Vec<FileRecord>, EndpointError>;

	async fn stat(&self, rel_path: &str) -> Result<Option<FileRecord>, EndpointError>;

	/// Stream `rel_path` from this endpoint to `dest`'s `rel_path`,
	/// creating any missing ancestor directories on the destination first.
	async fn read_to(&self, rel_path: &str, buf: &mut Vec<u8>) -> Result<(), EndpointError>;

	async fn write_from(&self, rel_path: &str, data: &[u8], mtime: u64) -> Result<(), EndpointError>;

	async fn delete_file(&self, rel_path: &str) -> Result<(), EndpointError>;

	async fn delete_dir(&self, rel_path: &str) -> Result<(), EndpointError>;

	/// Remote-only: execute a shell command on the endpoint host (used for
	/// the external permissions-script hook). Local endpoints return an
	/// error — shell execution is unavailable there, per §4.1.
	async fn exec(&self, command: &str) -> Result<String, EndpointError>;

	fn root(&self) -> &str;

	/// The shared SSH session backing this endpoint, when it is remote.
	/// The SQL executor's database tunnel reuses this session rather than
	/// opening a second authenticated connection (§9 "Shared SSH session").
	fn ssh_session(&self) -> Option<std::sync::Arc<std::sync::Mutex<ssh2::Session>>> {
		None
	}
}

/// Run `op` up to four attempts total (one initial + three retries),
/// sleeping `RETRY_DELAYS_MS` between attempts. `is_transient` decides
/// whether a given error is worth retrying at all; permanent errors (auth,
/// permission, no-such-file) return immediately on the first failure.
pub async fn with_retry<F, Fut, T>(
	is_transient: impl Fn(&EndpointError) -> bool,
	mut op: F,
) -> Result<T, EndpointError>
where
	F: FnMut() -> Fut,
	Fut: std::future::Future<Output = Result<T, EndpointError>>,
{
	let mut last_err = None;
	for (attempt, delay_ms) in std::iter::once(0).chain(RETRY_DELAYS_MS).enumerate() {
		if attempt > 0 {
			tokio::time::sleep(Duration::from_millis(delay_ms)).await;
		}
		match op().await {
			Ok(v) => return Ok(v),
			Err(e) => {
				if !is_transient(&e) {
					return Err(e);
				}
				tracing::warn!(attempt, "transient endpoint error, retrying: {}", e);
				last_err = Some(e);
			}
		}
	}
	Err(last_err.expect("loop always runs at least once"))
}

// vim: ts=4
