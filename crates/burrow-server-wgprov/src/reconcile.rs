// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Mirrors registry changes onto the live WireGuard endpoint.
//!
//! Each operation is one shell script piped to `sh -s` over a single SSH
//! connection. Scripts travel on stdin so preshared keys never appear in a
//! process argument list on either host. Every command is safe to repeat.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use burrow_common_secret::Secret;
use burrow_server_config::ReconcileConfig;
use burrow_wgprov_common::{OverlaySubnet, PresharedKey, WgPublicKey};
use ipnet::Ipv4Net;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, instrument};

pub const DEFAULT_INTERFACE: &str = "wg0";

#[derive(Error, Debug)]
pub enum ReconcileError {
	#[error("live reconciliation is not configured")]
	NotConfigured,

	#[error("failed to launch ssh: {0}")]
	Spawn(#[source] std::io::Error),

	#[error("remote command timed out after {0:?}")]
	Timeout(Duration),

	#[error("remote command failed ({status}): {stderr}")]
	CommandFailed { status: String, stderr: String },
}

/// Runs a script with root privileges on the endpoint host.
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
	/// Human-readable target for logs.
	fn target(&self) -> String;

	async fn run(&self, script: Secret<String>) -> Result<String, ReconcileError>;
}

/// [`RemoteExecutor`] backed by the system `ssh` client.
pub struct SshExecutor {
	config: ReconcileConfig,
	ssh_binary: PathBuf,
}

impl SshExecutor {
	pub fn new(config: ReconcileConfig) -> Self {
		Self {
			config,
			ssh_binary: PathBuf::from("ssh"),
		}
	}

	pub fn with_binary(mut self, ssh_binary: impl Into<PathBuf>) -> Self {
		self.ssh_binary = ssh_binary.into();
		self
	}

	pub(crate) fn args(&self) -> Vec<String> {
		let mut args = vec![
			"-o".to_string(),
			"BatchMode=yes".to_string(),
			"-o".to_string(),
			"StrictHostKeyChecking=accept-new".to_string(),
			"-o".to_string(),
			format!("ConnectTimeout={}", self.config.timeout.as_secs().max(1)),
			"-p".to_string(),
			self.config.ssh_port.to_string(),
		];
		if let Some(identity) = &self.config.ssh_identity_file {
			args.push("-i".to_string());
			args.push(identity.display().to_string());
		}
		args.push(self.config.destination());
		if self.config.use_sudo {
			args.push("sudo -n sh -s".to_string());
		} else {
			args.push("sh -s".to_string());
		}
		args
	}
}

#[async_trait]
impl RemoteExecutor for SshExecutor {
	fn target(&self) -> String {
		format!("{}:{}", self.config.destination(), self.config.ssh_port)
	}

	async fn run(&self, script: Secret<String>) -> Result<String, ReconcileError> {
		let mut child = Command::new(&self.ssh_binary)
			.args(self.args())
			.stdin(Stdio::piped())
			.stdout(Stdio::piped())
			.stderr(Stdio::piped())
			.kill_on_drop(true)
			.spawn()
			.map_err(ReconcileError::Spawn)?;

		let timeout = self.config.timeout;
		let exchange = async move {
			if let Some(mut stdin) = child.stdin.take() {
				stdin
					.write_all(script.expose().as_bytes())
					.await
					.map_err(ReconcileError::Spawn)?;
				stdin.shutdown().await.map_err(ReconcileError::Spawn)?;
			}
			child.wait_with_output().await.map_err(ReconcileError::Spawn)
		};

		let output = tokio::time::timeout(timeout, exchange)
			.await
			.map_err(|_| ReconcileError::Timeout(timeout))??;

		if !output.status.success() {
			return Err(ReconcileError::CommandFailed {
				status: output.status.to_string(),
				stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
			});
		}

		Ok(String::from_utf8_lossy(&output.stdout).into_owned())
	}
}

/// Script that installs one peer and makes sure the endpoint forwards and
/// masquerades overlay traffic.
///
/// Every step stands on its own line so `set -e` aborts on the first failure.
pub fn render_apply_script(
	wg_interface: &str,
	wan_interface: &str,
	subnet: &OverlaySubnet,
	public_key: &WgPublicKey,
	preshared_key: &PresharedKey,
	allowed: Ipv4Net,
) -> Secret<String> {
	let psk = preshared_key.to_base64();
	let nat_rule = format!(
		"POSTROUTING -s {subnet} -o {wan_interface} -j MASQUERADE",
		subnet = subnet.net()
	);
	Secret::new(format!(
		"set -e
umask 077
PSK_FILE=$(mktemp)
trap 'rm -f \"$PSK_FILE\"' EXIT
printf '%s' '{psk}' > \"$PSK_FILE\"
wg set {wg_interface} peer '{public_key}' preshared-key \"$PSK_FILE\" allowed-ips {allowed}
rm -f \"$PSK_FILE\"
sysctl -q -w net.ipv4.ip_forward=1
iptables -t nat -C {nat_rule} 2>/dev/null || iptables -t nat -A {nat_rule}
",
		psk = psk.expose(),
	))
}

pub fn render_remove_script(wg_interface: &str, public_key: &WgPublicKey) -> Secret<String> {
	Secret::new(format!(
		"set -e\nwg set {wg_interface} peer '{public_key}' remove\n"
	))
}

/// Result of a best-effort reconciliation, as reported to API callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileOutcome {
	pub applied: bool,
	pub error: Option<String>,
}

impl From<Result<(), ReconcileError>> for ReconcileOutcome {
	fn from(result: Result<(), ReconcileError>) -> Self {
		match result {
			Ok(()) => Self {
				applied: true,
				error: None,
			},
			Err(e) => Self {
				applied: false,
				error: Some(e.to_string()),
			},
		}
	}
}

struct Channel {
	executor: Arc<dyn RemoteExecutor>,
	wg_interface: String,
	wan_interface: String,
}

pub struct Reconciler {
	channel: Option<Channel>,
	subnet: OverlaySubnet,
}

impl Reconciler {
	pub fn disabled(subnet: OverlaySubnet) -> Self {
		Self {
			channel: None,
			subnet,
		}
	}

	pub fn new(
		executor: Arc<dyn RemoteExecutor>,
		wg_interface: impl Into<String>,
		wan_interface: impl Into<String>,
		subnet: OverlaySubnet,
	) -> Self {
		Self {
			channel: Some(Channel {
				executor,
				wg_interface: wg_interface.into(),
				wan_interface: wan_interface.into(),
			}),
			subnet,
		}
	}

	pub fn from_config(config: Option<ReconcileConfig>, subnet: OverlaySubnet) -> Self {
		match config {
			Some(config) => {
				let wg_interface = config.wg_interface.clone();
				let wan_interface = config.wan_interface.clone();
				let executor = Arc::new(SshExecutor::new(config));
				info!(target = %executor.target(), "live reconciliation enabled");
				Self::new(executor, wg_interface, wan_interface, subnet)
			}
			None => {
				info!("live reconciliation disabled (no ssh host configured)");
				Self::disabled(subnet)
			}
		}
	}

	pub fn is_enabled(&self) -> bool {
		self.channel.is_some()
	}

	pub fn wg_interface(&self) -> &str {
		self.channel
			.as_ref()
			.map(|c| c.wg_interface.as_str())
			.unwrap_or(DEFAULT_INTERFACE)
	}

	fn channel(&self) -> Result<&Channel, ReconcileError> {
		self.channel.as_ref().ok_or(ReconcileError::NotConfigured)
	}

	#[instrument(skip(self, preshared_key), fields(public_key = %public_key, %allowed))]
	pub async fn apply_peer(
		&self,
		public_key: &WgPublicKey,
		preshared_key: &PresharedKey,
		allowed: Ipv4Net,
	) -> Result<(), ReconcileError> {
		let channel = self.channel()?;
		let script = render_apply_script(
			&channel.wg_interface,
			&channel.wan_interface,
			&self.subnet,
			public_key,
			preshared_key,
			allowed,
		);
		channel.executor.run(script).await?;
		debug!("peer applied to live endpoint");
		Ok(())
	}

	#[instrument(skip(self), fields(public_key = %public_key))]
	pub async fn remove_peer(&self, public_key: &WgPublicKey) -> Result<(), ReconcileError> {
		let channel = self.channel()?;
		let script = render_remove_script(&channel.wg_interface, public_key);
		channel.executor.run(script).await?;
		debug!("peer removed from live endpoint");
		Ok(())
	}
}

#[cfg(test)]
pub(crate) mod testing {
	use super::*;
	use std::sync::Mutex;

	/// Records scripts instead of running them.
	#[derive(Default)]
	pub struct RecordingExecutor {
		pub scripts: Mutex<Vec<String>>,
		pub fail_with: Option<String>,
	}

	impl RecordingExecutor {
		pub fn failing(stderr: &str) -> Self {
			Self {
				scripts: Mutex::new(Vec::new()),
				fail_with: Some(stderr.to_string()),
			}
		}

		pub fn scripts(&self) -> Vec<String> {
			self.scripts.lock().unwrap().clone()
		}
	}

	#[async_trait]
	impl RemoteExecutor for RecordingExecutor {
		fn target(&self) -> String {
			"recording".to_string()
		}

		async fn run(&self, script: Secret<String>) -> Result<String, ReconcileError> {
			self.scripts.lock().unwrap().push(script.expose().clone());
			match &self.fail_with {
				Some(stderr) => Err(ReconcileError::CommandFailed {
					status: "exit status: 1".to_string(),
					stderr: stderr.clone(),
				}),
				None => Ok(String::new()),
			}
		}
	}
}
