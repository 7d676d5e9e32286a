//! SSH-tunneled database connection (`spec.md` §4.6, §9 "Shared SSH session")
//!
//! The `mysql` crate only speaks to a real TCP socket, so the destination's
//! database port is forwarded through the shared SSH session via
//! `channel_direct_tcpip`: a loopback listener accepts one local connection
//! from `mysql::Conn`, and a background thread pumps bytes between that
//! socket and the SSH channel for as long as the tunnel is alive.

use ssh2::Session;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use crate::error::SqlError;

pub struct Tunnel {
	pub local_port: u16,
	pump: Option<JoinHandle<()>>,
}

impl Tunnel {
	/// Open a local loopback listener, accept exactly one connection from
	/// it, and pump bytes to/from an SSH direct-tcpip channel to
	/// `remote_host:remote_port`. Blocks until that one connection arrives.
	pub fn open(session: &Arc<Mutex<Session>>, remote_host: &str, remote_port: u16) -> Result<Self, SqlError> {
		let listener = TcpListener::bind("127.0.0.1:0")
			.map_err(|e| SqlError::TunnelFailed { message: format!("cannot bind local tunnel socket: {}", e) })?;
		let local_port = listener
			.local_addr()
			.map_err(|e| SqlError::TunnelFailed { message: e.to_string() })?
			.port();

		let session = session.clone();
		let remote_host = remote_host.to_string();

		let pump = std::thread::spawn(move || {
			let (local_stream, _addr) = match listener.accept() {
				Ok(pair) => pair,
				Err(_) => return,
			};
			let channel = {
				let session = session.lock().unwrap();
				session.channel_direct_tcpip(&remote_host, remote_port, None)
			};
			let channel = match channel {
				Ok(c) => c,
				Err(_) => return,
			};
			pump_bytes(local_stream, channel);
		});

		Ok(Tunnel { local_port, pump: Some(pump) })
	}
}

impl Drop for Tunnel {
	fn drop(&mut self) {
		if let Some(handle) = self.pump.take() {
			let _ = handle.join();
		}
	}
}

fn pump_bytes(local: TcpStream, channel: ssh2::Channel) {
	let mut local_reader = match local.try_clone() {
		Ok(s) => s,
		Err(_) => return,
	};
	let mut local_writer = local;
	let channel = Arc::new(Mutex::new(channel));
	let channel_for_write = channel.clone();

	let to_remote = std::thread::spawn(move || {
		let mut buf = [0u8; 16 * 1024];
		loop {
			let n = match local_reader.read(&mut buf) {
				Ok(0) | Err(_) => break,
				Ok(n) => n,
			};
			let mut channel = channel_for_write.lock().unwrap();
			if channel.write_all(&buf[..n]).is_err() {
				break;
			}
		}
		let mut channel = channel_for_write.lock().unwrap();
		let _ = channel.send_eof();
	});

	let mut buf = [0u8; 16 * 1024];
	loop {
		let n = {
			let mut channel = channel.lock().unwrap();
			match channel.read(&mut buf) {
				Ok(0) | Err(_) => break,
				Ok(n) => n,
			}
		};
		if local_writer.write_all(&buf[..n]).is_err() {
			break;
		}
	}

	let _ = to_remote.join();
}

// vim: ts=4
