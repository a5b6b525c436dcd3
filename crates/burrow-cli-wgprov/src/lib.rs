// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

pub mod client;
pub mod commands;
pub mod descriptor;
pub mod error;
pub mod identity;
pub mod monitor;
pub mod permission;
pub mod registration;
pub mod store;
pub mod tunnel;

pub use client::{ProvisioningClient, DEFAULT_TIMEOUT};
pub use commands::device::{
	default_config_dir, handle_device_command, handle_down, handle_forget, handle_register,
	handle_status, handle_toggle, handle_up, CliContext, DeviceCommands, RegisterArgs, UpArgs,
};
pub use commands::peers::{
	handle_health, handle_list as handle_peers_list, handle_peers_command,
	handle_revoke as handle_peers_revoke, handle_sync as handle_peers_sync, PeersCommands,
	RevokeArgs,
};
pub use descriptor::{IssuedConfig, TunnelDescriptor};
pub use error::{CliError, Result};
pub use identity::KeyIdentity;
pub use monitor::{LogEntry, LogKind, NetworkMonitor, TrafficSnapshot};
pub use permission::{await_permission, AlreadyGranted, PermissionOutcome, PermissionPrompt, RootCheck};
pub use registration::{ClientRegistrationFlow, KeyMode, MAX_REGISTRATION_ATTEMPTS};
pub use store::{FileStore, MemoryStore, SecureStore, StoreError};
pub use tunnel::{
	EngineError, PeerStatistics, TunnelEngine, TunnelState, TunnelStatistics, WgQuickEngine,
	DEFAULT_INTERFACE,
};
