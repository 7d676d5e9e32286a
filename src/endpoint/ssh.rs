//! Remote SSH+SFTP endpoint driver.
//!
//! One authenticated `ssh2::Session` per run, shared with the SQL
//! executor's tunnel (§4.6, §9 "Shared SSH session"). `ssh2` is a blocking
//! API, so every operation runs on a blocking thread; concurrency across
//! "channels" is modeled with a `tokio::sync::Semaphore` sized to
//! `max_concurrent_transfers`, while the underlying SFTP subsystem itself
//! is serialized behind a `Mutex` — one physical connection, multiplexed
//! the way the `ssh2` crate actually allows it to be.

use async_trait::async_trait;
use ssh2::Session;
use std::io::{Read, Write};
use std::net::TcpStream;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;

use super::Endpoint;
use crate::error::EndpointError;
use crate::types::FileRecord;

pub struct SshEndpoint {
	session: Arc<Mutex<Session>>,
	sftp: Arc<Mutex<ssh2::Sftp>>,
	root: String,
	host_display: String,
	channel_permits: Arc<Semaphore>,
}

pub struct SshCredentials<'a> {
	pub host: &'a str,
	pub port: u16,
	pub username: &'a str,
	pub password: Option<&'a str>,
	pub private_key_file: Option<&'a str>,
	pub connect_timeout: Duration,
	pub operation_timeout: Duration,
	pub max_concurrent_transfers: usize,
}

impl SshEndpoint {
	pub fn connect(root: &str, creds: SshCredentials<'_>) -> Result<Self, EndpointError> {
		let host_display = format!("{}@{}:{}", creds.username, creds.host, creds.port);

		let addr = format!("{}:{}", creds.host, creds.port);
		let tcp = TcpStream::connect(&addr).map_err(|e| EndpointError::ConnectFailed {
			endpoint: host_display.clone(),
			source: crate::error::boxed_error(e),
		})?;
		tcp.set_read_timeout(Some(creds.connect_timeout)).ok();

		let mut session = Session::new().map_err(|e| EndpointError::ConnectFailed {
			endpoint: host_display.clone(),
			source: crate::error::boxed_error(e),
		})?;
		session.set_tcp_stream(tcp);
		session.set_timeout(creds.operation_timeout.as_millis() as u32);
		session.handshake().map_err(|e| EndpointError::ConnectFailed {
			endpoint: host_display.clone(),
			source: crate::error::boxed_error(e),
		})?;

		match (creds.password, creds.private_key_file) {
			(Some(password), _) => {
				session.userauth_password(creds.username, password).map_err(|e| {
					EndpointError::AuthenticationFailed { endpoint: host_display.clone(), message: e.to_string() }
				})?;
			}
			(None, Some(key_file)) => {
				session.userauth_pubkey_file(creds.username, None, Path::new(key_file), None).map_err(
					|e| EndpointError::AuthenticationFailed {
						endpoint: host_display.clone(),
						message: e.to_string(),
					},
				)?;
			}
			(None, None) => {
				return Err(EndpointError::AuthenticationFailed {
					endpoint: host_display.clone(),
					message: "no password or private key configured".into(),
				});
			}
		}

		let sftp = session.sftp().map_err(|e| EndpointError::SftpSubsystemFailed {
			endpoint: host_display.clone(),
			message: e.to_string(),
		})?;

		Ok(SshEndpoint {
			session: Arc::new(Mutex::new(session)),
			sftp: Arc::new(Mutex::new(sftp)),
			root: root.to_string(),
			host_display,
			channel_permits: Arc::new(Semaphore::new(creds.max_concurrent_transfers.max(1))),
		})
	}

	/// Shared session handle, used by the SQL executor to open its
	/// database tunnel without a second authentication round-trip.
	pub fn session(&self) -> Arc<Mutex<Session>> {
		self.session.clone()
	}

	fn abs(&self, rel_path: &str) -> String {
		format!("{}/{}", self.root.trim_end_matches('/'), rel_path)
	}
}

#[async_trait]
impl Endpoint for SshEndpoint {
	async fn list(&self) -> Result<Vec<FileRecord>, EndpointError> {
		let sftp = self.sftp.clone();
		let root = self.root.clone();
		let host = self.host_display.clone();
		let host_for_err = host.clone();
		let _permit = self.channel_permits.acquire().await;
		tokio::task::spawn_blocking(move || list_recursive(&sftp, &root, &host))
			.await
			.map_err(|e| EndpointError::SftpSubsystemFailed { endpoint: host_for_err, message: e.to_string() })?
	}

	async fn stat(&self, rel_path: &str) -> Result<Option<FileRecord>, EndpointError> {
		let sftp = self.sftp.clone();
		let abs = self.abs(rel_path);
		let rel = rel_path.to_string();
		let _permit = self.channel_permits.acquire().await;
		tokio::task::spawn_blocking(move || {
			let sftp = sftp.lock().unwrap();
			match sftp.stat(Path::new(&abs)) {
				Ok(stat) => Ok(Some(FileRecord {
					rel_path: rel,
					abs_path: abs,
					size: stat.size.unwrap_or(0),
					mtime: stat.mtime.unwrap_or(0),
					is_dir: stat.is_dir(),
				})),
				Err(e) if e.code() == ssh2::ErrorCode::SFTP(2) => Ok(None), // no such file
				Err(e) => Err(EndpointError::Io(std::io::Error::other(e.to_string()))),
			}
		})
		.await
		.map_err(|e| EndpointError::Io(std::io::Error::other(e.to_string())))?
	}

	async fn read_to(&self, rel_path: &str, buf: &mut Vec<u8>) -> Result<(), EndpointError> {
		let sftp = self.sftp.clone();
		let abs = self.abs(rel_path);
		let _permit = self.channel_permits.acquire().await;
		let data = tokio::task::spawn_blocking(move || -> Result<Vec<u8>, EndpointError> {
			let sftp = sftp.lock().unwrap();
			let mut file = sftp.open(Path::new(&abs)).map_err(|e| EndpointError::Io(std::io::Error::other(e.to_string())))?;
			let mut data = Vec::new();
			file.read_to_end(&mut data)?;
			Ok(data)
		})
		.await
		.map_err(|e| EndpointError::Io(std::io::Error::other(e.to_string())))??;
		*buf = data;
		Ok(())
	}

	async fn write_from(&self, rel_path: &str, data: &[u8], mtime: u64) -> Result<(), EndpointError> {
		let sftp = self.sftp.clone();
		let abs = self.abs(rel_path);
		let data = data.to_vec();
		let _permit = self.channel_permits.acquire().await;
		tokio::task::spawn_blocking(move || -> Result<(), EndpointError> {
			let sftp = sftp.lock().unwrap();
			create_ancestors(&sftp, &abs);
			let mut file =
				sftp.create(Path::new(&abs)).map_err(|e| EndpointError::Io(std::io::Error::other(e.to_string())))?;
			file.write_all(&data)?;
			let _ = mtime;
			Ok(())
		})
		.await
		.map_err(|e| EndpointError::Io(std::io::Error::other(e.to_string())))?
	}

	async fn delete_file(&self, rel_path: &str) -> Result<(), EndpointError> {
		let sftp = self.sftp.clone();
		let abs = self.abs(rel_path);
		let _permit = self.channel_permits.acquire().await;
		tokio::task::spawn_blocking(move || -> Result<(), EndpointError> {
			let sftp = sftp.lock().unwrap();
			match sftp.unlink(Path::new(&abs)) {
				Ok(()) => Ok(()),
				Err(e) if e.code() == ssh2::ErrorCode::SFTP(2) => Ok(()),
				Err(e) => Err(EndpointError::Io(std::io::Error::other(e.to_string()))),
			}
		})
		.await
		.map_err(|e| EndpointError::Io(std::io::Error::other(e.to_string())))?
	}

	async fn delete_dir(&self, rel_path: &str) -> Result<(), EndpointError> {
		let sftp = self.sftp.clone();
		let abs = self.abs(rel_path);
		let _permit = self.channel_permits.acquire().await;
		tokio::task::spawn_blocking(move || -> Result<(), EndpointError> {
			let sftp = sftp.lock().unwrap();
			remove_dir_recursive(&sftp, &abs)
		})
		.await
		.map_err(|e| EndpointError::Io(std::io::Error::other(e.to_string())))?
	}

	async fn exec(&self, command: &str) -> Result<String, EndpointError> {
		let session = self.session.clone();
		let command = command.to_string();
		let host = self.host_display.clone();
		tokio::task::spawn_blocking(move || -> Result<String, EndpointError> {
			let session = session.lock().unwrap();
			let mut channel = session.channel_session().map_err(|e| EndpointError::SftpSubsystemFailed {
				endpoint: host.clone(),
				message: e.to_string(),
			})?;
			channel.exec(&command).map_err(|e| EndpointError::SftpSubsystemFailed {
				endpoint: host.clone(),
				message: e.to_string(),
			})?;
			let mut output = String::new();
			channel.read_to_string(&mut output)?;
			channel.wait_close().ok();
			Ok(output)
		})
		.await
		.map_err(|e| EndpointError::Io(std::io::Error::other(e.to_string())))?
	}

	fn root(&self) -> &str {
		&self.root
	}

	fn ssh_session(&self) -> Option<Arc<Mutex<Session>>> {
		Some(self.session.clone())
	}
}

fn create_ancestors(sftp: &ssh2::Sftp, abs_file_path: &str) {
	let path = Path::new(abs_file_path);
	if let Some(parent) = path.parent() {
		let mut built = String::new();
		for component in parent.components() {
			built.push_str(&component.as_os_str().to_string_lossy());
			built.push('/');
			let _ = sftp.mkdir(Path::new(&built), 0o755);
		}
	}
}

fn remove_dir_recursive(sftp: &ssh2::Sftp, abs_path: &str) -> Result<(), EndpointError> {
	let entries = match sftp.readdir(Path::new(abs_path)) {
		Ok(e) => e,
		Err(e) if e.code() == ssh2::ErrorCode::SFTP(2) => return Ok(()),
		Err(e) => return Err(EndpointError::Io(std::io::Error::other(e.to_string()))),
	};
	for (path, stat) in entries {
		let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
		if name == "." || name == ".." {
			continue;
		}
		let child = path.to_string_lossy().to_string();
		if stat.is_dir() {
			remove_dir_recursive(sftp, &child)?;
		} else {
			sftp.unlink(&path).map_err(|e| EndpointError::Io(std::io::Error::other(e.to_string())))?;
		}
	}
	sftp.rmdir(Path::new(abs_path)).map_err(|e| EndpointError::Io(std::io::Error::other(e.to_string())))?;
	Ok(())
}

/// Recursive directory listing. Symbolic links are traversed one level
/// (their target is listed as a file); any path repeating within the
/// in-flight traversal stack is skipped rather than followed again.
fn list_recursive(sftp: &Arc<Mutex<ssh2::Sftp>>, root: &str, host: &str) -> Result<Vec<FileRecord>, EndpointError> {
	let sftp = sftp.lock().unwrap();
	let mut out = Vec::new();
	let mut in_flight: Vec<String> = Vec::new();
	walk(&sftp, root, root, &mut in_flight, &mut out, host)?;
	Ok(out)
}

fn walk(
	sftp: &ssh2::Sftp,
	root: &str,
	dir: &str,
	in_flight: &mut Vec<String>,
	out: &mut Vec<FileRecord>,
	host: &str,
) -> Result<(), EndpointError> {
	if in_flight.iter().any(|p| p == dir) {
		return Ok(());
	}
	in_flight.push(dir.to_string());

	let entries = match sftp.readdir(Path::new(dir)) {
		Ok(e) => e,
		Err(e) if e.code() == ssh2::ErrorCode::SFTP(2) => {
			in_flight.pop();
			return Ok(());
		}
		Err(e) => {
			in_flight.pop();
			return Err(EndpointError::SftpSubsystemFailed { endpoint: host.to_string(), message: e.to_string() });
		}
	};

	for (path, mut stat) in entries {
		let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
		if name == "." || name == ".." {
			continue;
		}
		let abs = path.to_string_lossy().to_string();
		let is_symlink = stat.file_type().is_symlink();

		if is_symlink {
			if let Ok(target_stat) = sftp.stat(&path) {
				stat = target_stat;
			}
		}

		let rel = abs.strip_prefix(root).unwrap_or(&abs).trim_start_matches('/').to_string();

		if stat.is_dir() && !is_symlink {
			walk(sftp, root, &abs, in_flight, out, host)?;
		} else {
			// A symlink is traversed one level: even if it resolves to a
			// directory, it is listed as a single file record rather than
			// recursed into.
			out.push(FileRecord {
				rel_path: rel,
				abs_path: abs,
				size: stat.size.unwrap_or(0),
				mtime: stat.mtime.unwrap_or(0),
				is_dir: false,
			});
		}
	}

	in_flight.pop();
	Ok(())
}

// vim: ts=4
