//! Local filesystem endpoint driver.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use super::Endpoint;
use crate::error::EndpointError;
use crate::types::FileRecord;

pub struct LocalEndpoint {
	root: PathBuf,
	root_display: String,
}

impl LocalEndpoint {
	pub fn new(root: impl Into<PathBuf>) -> Self {
		let root = root.into();
		let root_display = root.display().to_string();
		LocalEndpoint { root, root_display }
	}

	fn abs(&self, rel_path: &str) -> PathBuf {
		self.root.join(rel_path)
	}
}

#[async_trait]
impl Endpoint for LocalEndpoint {
	async fn list(&self) -> Result<Vec<FileRecord>, EndpointError> {
		let root = self.root.clone();
		tokio::task::spawn_blocking(move || list_recursive(&root))
			.await
			.map_err(|e| EndpointError::Io(std::io::Error::other(e.to_string())))?
	}

	async fn stat(&self, rel_path: &str) -> Result<Option<FileRecord>, EndpointError> {
		let abs = self.abs(rel_path);
		match tokio::fs::metadata(&abs).await {
			Ok(meta) => Ok(Some(record_from(rel_path, &abs, &meta)?)),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
			Err(e) => Err(e.into()),
		}
	}

	async fn read_to(&self, rel_path: &str, buf: &mut Vec<u8>) -> Result<(), EndpointError> {
		*buf = tokio::fs::read(self.abs(rel_path)).await?;
		Ok(())
	}

	async fn write_from(&self, rel_path: &str, data: &[u8], mtime: u64) -> Result<(), EndpointError> {
		let abs = self.abs(rel_path);
		if let Some(parent) = abs.parent() {
			tokio::fs::create_dir_all(parent).await?;
		}
		tokio::fs::write(&abs, data).await?;
		let _ = mtime; // best-effort only; cache records the source-observed mtime.
		Ok(())
	}

	async fn delete_file(&self, rel_path: &str) -> Result<(), EndpointError> {
		match tokio::fs::remove_file(self.abs(rel_path)).await {
			Ok(()) => Ok(()),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
			Err(e) => Err(e.into()),
		}
	}

	async fn delete_dir(&self, rel_path: &str) -> Result<(), EndpointError> {
		match tokio::fs::remove_dir_all(self.abs(rel_path)).await {
			Ok(()) => Ok(()),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
			Err(e) => Err(e.into()),
		}
	}

	async fn exec(&self, _command: &str) -> Result<String, EndpointError> {
		Err(EndpointError::SftpSubsystemFailed {
			endpoint: self.root_display.clone(),
			message: "shell execution is unavailable on local endpoints".into(),
		})
	}

	fn root(&self) -> &str {
		&self.root_display
	}
}

fn list_recursive(root: &Path) -> Result<Vec<FileRecord>, EndpointError> {
	let mut out = Vec::new();
	let mut stack = vec![root.to_path_buf()];
	while let Some(dir) = stack.pop() {
		let entries = match std::fs::read_dir(&dir) {
			Ok(e) => e,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
			Err(e) => return Err(e.into()),
		};
		for entry in entries {
			let entry = entry?;
			let path = entry.path();
			let meta = entry.metadata()?;
			if meta.is_dir() {
				stack.push(path);
				continue;
			}
			let rel = path
				.strip_prefix(root)
				.unwrap_or(&path)
				.to_str()
				.unwrap_or_default()
				.replace('\\', "/");
			out.push(record_from(&rel, &path, &meta)?);
		}
	}
	Ok(out)
}

fn record_from(rel_path: &str, abs_path: &Path, meta: &std::fs::Metadata) -> Result<FileRecord, EndpointError> {
	let mtime = meta
		.modified()
		.ok()
		.and_then(|t| t.duration_since(UNIX_EPOCH).ok())
		.map(|d| d.as_secs())
		.unwrap_or(0);
	Ok(FileRecord {
		rel_path: rel_path.to_string(),
		abs_path: abs_path.display().to_string(),
		size: meta.len(),
		mtime,
		is_dir: meta.is_dir(),
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::TempDir;

	#[tokio::test]
	async fn lists_nested_files_with_slash_relative_paths() {
		let tmp = TempDir::new().unwrap();
		std::fs::create_dir_all(tmp.path().join("a/b")).unwrap();
		std::fs::write(tmp.path().join("a/b/c.txt"), b"hi").unwrap();

		let ep = LocalEndpoint::new(tmp.path());
		let files = ep.list().await.unwrap();
		assert_eq!(files.len(), 1);
		assert_eq!(files[0].rel_path, "a/b/c.txt");
		assert_eq!(files[0].size, 2);
	}

	#[tokio::test]
	async fn write_creates_missing_ancestor_directories() {
		let tmp = TempDir::new().unwrap();
		let ep = LocalEndpoint::new(tmp.path());
		ep.write_from("x/y/z.txt", b"data", 0).await.unwrap();
		assert!(tmp.path().join("x/y/z.txt").exists());
	}

	#[tokio::test]
	async fn delete_file_is_idempotent() {
		let tmp = TempDir::new().unwrap();
		let ep = LocalEndpoint::new(tmp.path());
		ep.delete_file("missing.txt").await.unwrap();
	}
}

// vim: ts=4
