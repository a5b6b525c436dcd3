// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! OS permission to create a VPN interface.
//!
//! A prompt receives a one-shot continuation and completes it whenever the
//! grant or denial arrives; the caller simply awaits the receiver.

use tokio::process::Command;
use tokio::sync::oneshot;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionOutcome {
	Granted,
	Denied,
}

pub trait PermissionPrompt: Send + Sync {
	/// Ask for permission and complete `respond` with the outcome. Dropping
	/// `respond` counts as a denial.
	fn request(&self, respond: oneshot::Sender<PermissionOutcome>);
}

/// Await a prompt's continuation.
pub async fn await_permission(prompt: &dyn PermissionPrompt) -> PermissionOutcome {
	let (tx, rx) = oneshot::channel();
	prompt.request(tx);
	rx.await.unwrap_or(PermissionOutcome::Denied)
}

/// For setups where interface management is already authorized.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlreadyGranted;

impl PermissionPrompt for AlreadyGranted {
	fn request(&self, respond: oneshot::Sender<PermissionOutcome>) {
		let _ = respond.send(PermissionOutcome::Granted);
	}
}

/// Grants when running as root, or when passwordless sudo is allowed and
/// `allow_sudo` is set.
#[derive(Debug, Clone, Copy, Default)]
pub struct RootCheck {
	pub allow_sudo: bool,
}

impl PermissionPrompt for RootCheck {
	fn request(&self, respond: oneshot::Sender<PermissionOutcome>) {
		let allow_sudo = self.allow_sudo;
		tokio::spawn(async move {
			let outcome = if is_root().await || (allow_sudo && sudo_available().await) {
				PermissionOutcome::Granted
			} else {
				PermissionOutcome::Denied
			};
			debug!(?outcome, "permission check finished");
			let _ = respond.send(outcome);
		});
	}
}

async fn is_root() -> bool {
	match Command::new("id").arg("-u").output().await {
		Ok(output) if output.status.success() => {
			String::from_utf8_lossy(&output.stdout).trim() == "0"
		}
		Ok(_) => false,
		Err(e) => {
			warn!(error = %e, "could not determine effective user");
			false
		}
	}
}

async fn sudo_available() -> bool {
	Command::new("sudo")
		.args(["-n", "true"])
		.output()
		.await
		.map(|output| output.status.success())
		.unwrap_or(false)
}
