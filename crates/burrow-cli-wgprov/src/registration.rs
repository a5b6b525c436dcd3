// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Device registration and tunnel control.
//!
//! Registration walks `NoIdentity -> HasIdentity -> Registering -> Registered`.
//! A 409 while registering rotates the identity and tries again; a second
//! 409 is returned to the caller.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use burrow_common_secret::Secret;
use burrow_wgprov_common::{
	parse_client_config, IssuedMaterial, ProtocolMode, RegisterPeerResponse, WgPrivateKey,
	WgPublicKey,
};
use tracing::{info, instrument, warn};

use crate::client::ProvisioningClient;
use crate::descriptor::{IssuedConfig, TunnelDescriptor};
use crate::error::{CliError, Result};
use crate::identity::KeyIdentity;
use crate::monitor::NetworkMonitor;
use crate::permission::{await_permission, AlreadyGranted, PermissionOutcome, PermissionPrompt};
use crate::store::SecureStore;
use crate::tunnel::{TunnelEngine, TunnelState};

/// The first attempt plus one retry after rotating the identity.
pub const MAX_REGISTRATION_ATTEMPTS: u32 = 2;

/// Who generates the device's private key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum KeyMode {
	/// The device generates its key and only the public half is sent.
	#[default]
	ClientGenerated,
	/// A `PrivateKey` in an embedded config block replaces the local key.
	ServerIssued,
}

impl fmt::Display for KeyMode {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			KeyMode::ClientGenerated => f.write_str("client-generated"),
			KeyMode::ServerIssued => f.write_str("server-issued"),
		}
	}
}

impl FromStr for KeyMode {
	type Err = String;

	fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
		match s.trim().to_ascii_lowercase().as_str() {
			"client-generated" => Ok(KeyMode::ClientGenerated),
			"server-issued" => Ok(KeyMode::ServerIssued),
			other => Err(format!(
				"unknown key mode '{other}' (expected 'client-generated' or 'server-issued')"
			)),
		}
	}
}

pub struct ClientRegistrationFlow {
	client: ProvisioningClient,
	identity: KeyIdentity,
	store: Arc<dyn SecureStore>,
	engine: Arc<dyn TunnelEngine>,
	permission: Arc<dyn PermissionPrompt>,
	monitor: Arc<NetworkMonitor>,
	protocol_mode: ProtocolMode,
	key_mode: KeyMode,
}

impl ClientRegistrationFlow {
	pub fn new(
		client: ProvisioningClient,
		store: Arc<dyn SecureStore>,
		engine: Arc<dyn TunnelEngine>,
	) -> Self {
		Self {
			client,
			identity: KeyIdentity::new(Arc::clone(&store)),
			store,
			engine,
			permission: Arc::new(AlreadyGranted),
			monitor: NetworkMonitor::global(),
			protocol_mode: ProtocolMode::default(),
			key_mode: KeyMode::default(),
		}
	}

	pub fn with_permission(mut self, permission: Arc<dyn PermissionPrompt>) -> Self {
		self.permission = permission;
		self
	}

	pub fn with_monitor(mut self, monitor: Arc<NetworkMonitor>) -> Self {
		self.monitor = monitor;
		self
	}

	pub fn with_protocol_mode(mut self, mode: ProtocolMode) -> Self {
		self.protocol_mode = mode;
		self
	}

	pub fn with_key_mode(mut self, mode: KeyMode) -> Self {
		self.key_mode = mode;
		self
	}

	pub fn client(&self) -> &ProvisioningClient {
		&self.client
	}

	pub fn identity(&self) -> &KeyIdentity {
		&self.identity
	}

	pub fn monitor(&self) -> &Arc<NetworkMonitor> {
		&self.monitor
	}

	pub fn engine(&self) -> &Arc<dyn TunnelEngine> {
		&self.engine
	}

	#[instrument(skip(self), fields(protocol_mode = %self.protocol_mode, key_mode = %self.key_mode))]
	pub async fn register_device(&self, name: &str) -> Result<IssuedConfig> {
		let mut attempt = 1;
		loop {
			let public_key = self.identity.ensure().await?;
			match self.client.register(name, &public_key).await {
				Ok(response) => return self.persist(&response).await,
				Err(CliError::Conflict(message)) if attempt < MAX_REGISTRATION_ATTEMPTS => {
					warn!(%public_key, %message, attempt, "public key already registered, rotating identity");
					self.identity.clear().await?;
					attempt += 1;
				}
				Err(e) => return Err(e),
			}
		}
	}

	async fn persist(&self, response: &RegisterPeerResponse) -> Result<IssuedConfig> {
		let material = response.material(self.protocol_mode).ok_or_else(|| {
			CliError::MalformedResponse(format!(
				"registration response carries no {} configuration",
				self.protocol_mode
			))
		})?;

		let mut adopted = None;
		let issued = match material {
			IssuedMaterial::Structured(server) => IssuedConfig {
				server_public_key: server.server_public_key,
				endpoint: server.endpoint,
				preshared_key: Secret::new(server.preshared_key),
				dns: server.dns,
				allowed_ips: server.allowed_ips,
				persistent_keepalive: server.persistent_keepalive,
				assigned_address: response.peer.assigned_ip.clone(),
			},
			IssuedMaterial::EmbeddedText(text) => {
				let parsed = parse_client_config(&text)
					.map_err(|e| CliError::MalformedResponse(e.to_string()))?;

				if let Some(private_key) = &parsed.private_key {
					match self.key_mode {
						KeyMode::ServerIssued => {
							let key = WgPrivateKey::from_base64(private_key.expose()).map_err(|e| {
								CliError::MalformedResponse(format!("issued private key: {e}"))
							})?;
							adopted = Some(key);
						}
						KeyMode::ClientGenerated => {
							warn!("ignoring server-issued private key in client-generated mode")
						}
					}
				}

				IssuedConfig {
					server_public_key: parsed.server_public_key,
					endpoint: parsed.endpoint,
					preshared_key: parsed.preshared_key,
					dns: parsed.dns,
					allowed_ips: parsed.allowed_ips,
					persistent_keepalive: parsed.persistent_keepalive,
					assigned_address: parsed.address,
				}
			}
		};

		WgPublicKey::from_base64(&issued.server_public_key)
			.map_err(|e| CliError::MalformedResponse(format!("server public key: {e}")))?;

		// nothing is written until the whole response has been checked
		match adopted {
			Some(key) => {
				self.identity.adopt_private_key(key, &issued).await?;
			}
			None => issued.save(self.store.as_ref()).await?,
		}

		if response.server_applied {
			info!(assigned_address = %issued.assigned_address, "device registered");
		} else {
			warn!(
				assigned_address = %issued.assigned_address,
				server_error = response.server_error.as_deref().unwrap_or("reconciliation disabled"),
				"device registered, endpoint not yet updated"
			);
		}
		Ok(issued)
	}

	pub async fn is_registered(&self) -> Result<bool> {
		Ok(self.build_tunnel_descriptor().await?.is_some())
	}

	/// `None` until the private key and every issued value are stored.
	pub async fn build_tunnel_descriptor(&self) -> Result<Option<TunnelDescriptor>> {
		let Some(private_key) = self.identity.current_private_key().await? else {
			return Ok(None);
		};
		let Some(issued) = IssuedConfig::load(self.store.as_ref()).await? else {
			return Ok(None);
		};
		Ok(Some(TunnelDescriptor::new(&private_key, &issued)))
	}

	pub async fn tunnel_state(&self) -> Result<TunnelState> {
		Ok(self.engine.state().await?)
	}

	/// Bring the tunnel to `desired`. Going up requires the permission
	/// prompt to grant; the monitor follows the resulting state.
	#[instrument(skip(self), fields(interface = %self.engine.interface(), %desired))]
	pub async fn set_tunnel(&self, desired: TunnelState) -> Result<TunnelState> {
		let descriptor = self.require_descriptor().await?;
		if desired == TunnelState::Up {
			self.require_permission().await?;
		}

		let state = self.engine.set_state(&descriptor, desired).await?;
		self.follow(state).await;
		Ok(state)
	}

	#[instrument(skip(self), fields(interface = %self.engine.interface()))]
	pub async fn toggle_tunnel(&self) -> Result<TunnelState> {
		let descriptor = self.require_descriptor().await?;
		if self.engine.state().await? == TunnelState::Down {
			self.require_permission().await?;
		}

		let state = self.engine.toggle(&descriptor).await?;
		self.follow(state).await;
		Ok(state)
	}

	async fn require_descriptor(&self) -> Result<TunnelDescriptor> {
		self.build_tunnel_descriptor()
			.await?
			.ok_or(CliError::NotRegistered)
	}

	async fn require_permission(&self) -> Result<()> {
		match await_permission(self.permission.as_ref()).await {
			PermissionOutcome::Granted => Ok(()),
			PermissionOutcome::Denied => Err(CliError::PermissionDenied),
		}
	}

	async fn follow(&self, state: TunnelState) {
		match state {
			TunnelState::Up => {
				self.monitor.start(Arc::clone(&self.engine)).await;
			}
			TunnelState::Down => {
				self.monitor.stop().await;
			}
		}
	}

	/// Take the tunnel down if it is up and wipe the identity and every
	/// issued value.
	#[instrument(skip(self))]
	pub async fn forget(&self) -> Result<()> {
		if self.build_tunnel_descriptor().await?.is_some()
			&& self.engine.state().await? == TunnelState::Up
		{
			self.set_tunnel(TunnelState::Down).await?;
		}
		self.monitor.stop().await;
		self.identity.clear().await
	}
}
