// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Seam to the WireGuard data plane.
//!
//! [`WgQuickEngine`] drives the kernel implementation through `wg-quick` and
//! reads transfer counters from `wg show <iface> dump`.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::fs;
use tokio::process::Command;
use tracing::{debug, info, instrument};
use zeroize::Zeroize;

use crate::descriptor::TunnelDescriptor;

pub const DEFAULT_INTERFACE: &str = "burrow0";

#[derive(Error, Debug)]
pub enum EngineError {
	#[error("failed to run {program}: {source}")]
	Spawn {
		program: String,
		#[source]
		source: std::io::Error,
	},

	#[error("{program} exited with {status}: {stderr}")]
	CommandFailed {
		program: String,
		status: String,
		stderr: String,
	},

	#[error("unexpected `wg show` output: {0}")]
	Parse(String),

	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunnelState {
	Up,
	Down,
}

impl TunnelState {
	pub fn toggled(self) -> Self {
		match self {
			TunnelState::Up => TunnelState::Down,
			TunnelState::Down => TunnelState::Up,
		}
	}
}

impl fmt::Display for TunnelState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			TunnelState::Up => f.write_str("up"),
			TunnelState::Down => f.write_str("down"),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerStatistics {
	pub public_key: String,
	pub rx_bytes: u64,
	pub tx_bytes: u64,
	pub latest_handshake: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TunnelStatistics {
	pub peers: Vec<PeerStatistics>,
}

impl TunnelStatistics {
	pub fn total_rx(&self) -> u64 {
		self.peers.iter().map(|p| p.rx_bytes).sum()
	}

	pub fn total_tx(&self) -> u64 {
		self.peers.iter().map(|p| p.tx_bytes).sum()
	}

	pub fn latest_handshake(&self) -> Option<DateTime<Utc>> {
		self.peers.iter().filter_map(|p| p.latest_handshake).max()
	}
}

#[async_trait]
pub trait TunnelEngine: Send + Sync {
	fn interface(&self) -> &str;

	async fn state(&self) -> Result<TunnelState, EngineError>;

	/// Drive the tunnel to `desired` and report where it ended up.
	async fn set_state(
		&self,
		descriptor: &TunnelDescriptor,
		desired: TunnelState,
	) -> Result<TunnelState, EngineError>;

	/// Flip the current state.
	async fn toggle(&self, descriptor: &TunnelDescriptor) -> Result<TunnelState, EngineError> {
		let current = self.state().await?;
		self.set_state(descriptor, current.toggled()).await
	}

	async fn statistics(&self) -> Result<TunnelStatistics, EngineError>;
}

/// [`TunnelEngine`] backed by `wg-quick` and `wg`.
#[derive(Debug, Clone)]
pub struct WgQuickEngine {
	interface: String,
	config_dir: PathBuf,
	use_sudo: bool,
}

impl WgQuickEngine {
	pub fn new(interface: impl Into<String>, config_dir: impl Into<PathBuf>) -> Self {
		Self {
			interface: interface.into(),
			config_dir: config_dir.into(),
			use_sudo: false,
		}
	}

	pub fn with_sudo(mut self, use_sudo: bool) -> Self {
		self.use_sudo = use_sudo;
		self
	}

	/// `wg-quick` names the interface after the file stem.
	pub fn config_path(&self) -> PathBuf {
		self.config_dir.join(format!("{}.conf", self.interface))
	}

	async fn run(&self, program: &str, args: &[&str]) -> Result<Vec<u8>, EngineError> {
		let mut command = if self.use_sudo {
			let mut c = Command::new("sudo");
			c.arg("-n").arg(program);
			c
		} else {
			Command::new(program)
		};
		let output = command
			.args(args)
			.stdin(Stdio::null())
			.stdout(Stdio::piped())
			.stderr(Stdio::piped())
			.kill_on_drop(true)
			.output()
			.await
			.map_err(|source| EngineError::Spawn {
				program: program.to_string(),
				source,
			})?;

		if !output.status.success() {
			return Err(EngineError::CommandFailed {
				program: program.to_string(),
				status: output.status.to_string(),
				stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
			});
		}
		Ok(output.stdout)
	}
}

#[async_trait]
impl TunnelEngine for WgQuickEngine {
	fn interface(&self) -> &str {
		&self.interface
	}

	async fn state(&self) -> Result<TunnelState, EngineError> {
		match self.run("wg", &["show", &self.interface, "public-key"]).await {
			Ok(_) => Ok(TunnelState::Up),
			Err(EngineError::CommandFailed { .. }) => Ok(TunnelState::Down),
			Err(e) => Err(e),
		}
	}

	#[instrument(skip(self, descriptor), fields(interface = %self.interface, %desired))]
	async fn set_state(
		&self,
		descriptor: &TunnelDescriptor,
		desired: TunnelState,
	) -> Result<TunnelState, EngineError> {
		if self.state().await? == desired {
			debug!("tunnel already in desired state");
			return Ok(desired);
		}

		let path = self.config_path();
		let path_arg = path.display().to_string();
		match desired {
			TunnelState::Up => {
				write_config(&path, descriptor).await?;
				self.run("wg-quick", &["up", &path_arg]).await?;
				info!(address = %descriptor.address(), endpoint = %descriptor.endpoint(), "tunnel up");
			}
			TunnelState::Down => {
				self.run("wg-quick", &["down", &path_arg]).await?;
				remove_config(&path).await?;
				info!("tunnel down");
			}
		}
		Ok(desired)
	}

	async fn statistics(&self) -> Result<TunnelStatistics, EngineError> {
		let mut stdout = self.run("wg", &["show", &self.interface, "dump"]).await?;
		let parsed = parse_wg_dump(&String::from_utf8_lossy(&stdout));
		// the first dump line carries the interface private key
		stdout.zeroize();
		parsed
	}
}

async fn write_config(path: &Path, descriptor: &TunnelDescriptor) -> Result<(), EngineError> {
	if let Some(parent) = path.parent() {
		fs::create_dir_all(parent).await?;
	}

	#[cfg(unix)]
	{
		use tokio::fs::OpenOptions;
		use tokio::io::AsyncWriteExt;

		let mut file = OpenOptions::new()
			.write(true)
			.create(true)
			.truncate(true)
			.mode(0o600)
			.open(path)
			.await?;
		file.write_all(descriptor.render().expose().as_bytes()).await?;
	}

	#[cfg(not(unix))]
	{
		fs::write(path, descriptor.render().expose()).await?;
	}

	Ok(())
}

async fn remove_config(path: &Path) -> Result<(), EngineError> {
	match fs::remove_file(path).await {
		Ok(()) => Ok(()),
		Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
		Err(e) => Err(e.into()),
	}
}

/// Parse `wg show <iface> dump`. The interface line is skipped; each peer
/// line is tab-separated: public-key, preshared-key, endpoint, allowed-ips,
/// latest-handshake, transfer-rx, transfer-tx, persistent-keepalive.
pub fn parse_wg_dump(text: &str) -> Result<TunnelStatistics, EngineError> {
	let mut peers = Vec::new();
	for line in text.lines().skip(1).filter(|l| !l.trim().is_empty()) {
		let fields: Vec<&str> = line.split('\t').collect();
		if fields.len() < 8 {
			return Err(EngineError::Parse(format!(
				"expected 8 fields per peer, got {}",
				fields.len()
			)));
		}
		let number = |idx: usize, name: &str| {
			fields[idx]
				.parse::<u64>()
				.map_err(|_| EngineError::Parse(format!("{name} is not a number")))
		};

		let handshake = number(4, "latest-handshake")?;
		let latest_handshake = if handshake == 0 {
			None
		} else {
			i64::try_from(handshake)
				.ok()
				.and_then(|secs| DateTime::from_timestamp(secs, 0))
		};

		peers.push(PeerStatistics {
			public_key: fields[0].to_string(),
			rx_bytes: number(5, "transfer-rx")?,
			tx_bytes: number(6, "transfer-tx")?,
			latest_handshake,
		});
	}
	Ok(TunnelStatistics { peers })
}
