// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Live endpoint reconciliation over SSH.
//!
//! Reconciliation is enabled only when `ssh_host` is set. Every other field
//! has a default, so a bare host is a complete configuration.

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_SSH_USER: &str = "root";
pub const DEFAULT_SSH_PORT: u16 = 22;
pub const DEFAULT_WG_INTERFACE: &str = "wg0";
pub const DEFAULT_WAN_INTERFACE: &str = "eth0";
pub const DEFAULT_TIMEOUT_SECS: u64 = 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileConfig {
	pub ssh_host: String,
	pub ssh_user: String,
	pub ssh_port: u16,
	pub ssh_identity_file: Option<PathBuf>,
	pub wg_interface: String,
	pub wan_interface: String,
	/// Prefix remote commands with `sudo -n` for non-root users.
	pub use_sudo: bool,
	pub timeout: Duration,
}

impl ReconcileConfig {
	/// `user@host` as passed to ssh.
	pub fn destination(&self) -> String {
		format!("{}@{}", self.ssh_user, self.ssh_host)
	}
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReconcileConfigLayer {
	#[serde(default)]
	pub ssh_host: Option<String>,
	#[serde(default)]
	pub ssh_user: Option<String>,
	#[serde(default)]
	pub ssh_port: Option<u16>,
	#[serde(default)]
	pub ssh_identity_file: Option<PathBuf>,
	#[serde(default)]
	pub wg_interface: Option<String>,
	#[serde(default)]
	pub wan_interface: Option<String>,
	#[serde(default)]
	pub use_sudo: Option<bool>,
	#[serde(default)]
	pub timeout_secs: Option<u64>,
}

impl ReconcileConfigLayer {
	pub fn merge(&mut self, other: ReconcileConfigLayer) {
		if other.ssh_host.is_some() {
			self.ssh_host = other.ssh_host;
		}
		if other.ssh_user.is_some() {
			self.ssh_user = other.ssh_user;
		}
		if other.ssh_port.is_some() {
			self.ssh_port = other.ssh_port;
		}
		if other.ssh_identity_file.is_some() {
			self.ssh_identity_file = other.ssh_identity_file;
		}
		if other.wg_interface.is_some() {
			self.wg_interface = other.wg_interface;
		}
		if other.wan_interface.is_some() {
			self.wan_interface = other.wan_interface;
		}
		if other.use_sudo.is_some() {
			self.use_sudo = other.use_sudo;
		}
		if other.timeout_secs.is_some() {
			self.timeout_secs = other.timeout_secs;
		}
	}

	/// `None` means reconciliation is disabled.
	pub fn finalize(self) -> Option<ReconcileConfig> {
		let ssh_host = self.ssh_host.filter(|h| !h.trim().is_empty())?;
		Some(ReconcileConfig {
			ssh_host,
			ssh_user: self
				.ssh_user
				.unwrap_or_else(|| DEFAULT_SSH_USER.to_string()),
			ssh_port: self.ssh_port.unwrap_or(DEFAULT_SSH_PORT),
			ssh_identity_file: self.ssh_identity_file,
			wg_interface: self
				.wg_interface
				.unwrap_or_else(|| DEFAULT_WG_INTERFACE.to_string()),
			wan_interface: self
				.wan_interface
				.unwrap_or_else(|| DEFAULT_WAN_INTERFACE.to_string()),
			use_sudo: self.use_sudo.unwrap_or(false),
			timeout: Duration::from_secs(self.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS)),
		})
	}
}
