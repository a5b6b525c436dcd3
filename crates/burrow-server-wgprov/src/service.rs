// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Request orchestration: validate, register, reconcile, respond.
//!
//! Reconciliation always runs after the registry lock has been released and
//! its failure never fails the request. The registry stays authoritative and
//! callers see `serverApplied`/`serverRemoved` flags instead.
//!
//! Operations on the same public key hold a per-key guard from before the
//! registry mutation until their reconciliation finishes, so the endpoint
//! sees them in registry order.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use burrow_common_secret::Secret;
use burrow_server_config::OverlayConfig;
use burrow_wgprov_common::{
	render_server_peer_block, InterfaceSection, IssuedMaterial, PeerInfo, PeerSection,
	ProtocolMode, RegisterPeerResponse, RemovedPeer, RevokePeerResponse, ServerConfig,
	SyncResponse, WgPublicKey, WgQuickConfig,
};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, info, instrument, warn};

use crate::error::{Result, WgProvError};
use crate::reconcile::{ReconcileError, ReconcileOutcome, Reconciler};
use crate::registry::{validate_registration, PeerRecord, PeerRegistry};

/// A completed registration.
#[derive(Debug)]
pub struct Registration {
	pub record: PeerRecord,
	pub material: IssuedMaterial,
	pub server_peer_block: Secret<String>,
	pub reconcile: ReconcileOutcome,
}

impl Registration {
	pub fn into_response(self) -> RegisterPeerResponse {
		let (server_config, client_config) = match self.material {
			IssuedMaterial::Structured(config) => (Some(config), None),
			IssuedMaterial::EmbeddedText(text) => (None, Some(text)),
		};
		RegisterPeerResponse {
			message: format!("Peer \"{}\" registered", self.record.name),
			peer: self.record.summary(),
			server_config,
			client_config,
			server_peer_block: self.server_peer_block.expose().clone(),
			server_applied: self.reconcile.applied,
			server_error: self.reconcile.error,
		}
	}
}

/// A completed revocation.
#[derive(Debug)]
pub struct Revocation {
	pub record: PeerRecord,
	pub reconcile: ReconcileOutcome,
	/// Manual command for the operator when the live endpoint was not updated.
	pub server_action: Option<String>,
}

impl Revocation {
	pub fn into_response(self) -> RevokePeerResponse {
		RevokePeerResponse {
			message: format!("Peer \"{}\" revoked", self.record.name),
			removed_peer: RemovedPeer {
				name: self.record.name.clone(),
				public_key: self.record.public_key.to_base64(),
				assigned_ip: self.record.overlay_address.to_string(),
			},
			server_removed: self.reconcile.applied,
			server_action: self.server_action,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Health {
	pub peer_count: usize,
	pub reconciliation_enabled: bool,
}

/// One async mutex per public key with an operation in flight.
#[derive(Default)]
struct KeyGuards {
	slots: Mutex<HashMap<WgPublicKey, Arc<AsyncMutex<()>>>>,
}

impl KeyGuards {
	async fn acquire(&self, public_key: &WgPublicKey) -> OwnedMutexGuard<()> {
		let slot = {
			let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
			// a slot only the map references has no holder and no waiter
			slots.retain(|_, slot| Arc::strong_count(slot) > 1);
			Arc::clone(slots.entry(*public_key).or_default())
		};
		slot.lock_owned().await
	}

	#[cfg(test)]
	fn tracked(&self) -> usize {
		let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
		slots.retain(|_, slot| Arc::strong_count(slot) > 1);
		slots.len()
	}
}

pub struct ProvisioningService {
	registry: PeerRegistry,
	reconciler: Reconciler,
	overlay: OverlayConfig,
	guards: KeyGuards,
}

impl ProvisioningService {
	pub fn new(overlay: OverlayConfig, reconciler: Reconciler) -> Self {
		Self {
			registry: PeerRegistry::new(overlay.subnet),
			reconciler,
			overlay,
			guards: KeyGuards::default(),
		}
	}

	pub fn overlay(&self) -> &OverlayConfig {
		&self.overlay
	}

	#[instrument(skip(self, public_key))]
	pub async fn register(&self, name: &str, public_key: &str) -> Result<Registration> {
		let peer = validate_registration(name, public_key)?;
		let _guard = self.guards.acquire(&peer.public_key).await;
		let record = self.registry.register(peer).await?;

		let reconcile = ReconcileOutcome::from(
			self.reconciler
				.apply_peer(
					&record.public_key,
					&record.preshared_key,
					record.overlay_address,
				)
				.await,
		);
		if !reconcile.applied {
			warn!(
				public_key = %record.public_key,
				error = reconcile.error.as_deref().unwrap_or_default(),
				"control-plane record created, live endpoint not yet updated"
			);
		}

		info!(
			public_key = %record.public_key,
			assigned_ip = %record.overlay_address,
			server_applied = reconcile.applied,
			"peer registered"
		);

		let preshared_key = record.preshared_key.to_base64();
		let server_peer_block = render_server_peer_block(
			&record.name,
			&record.public_key.to_base64(),
			&preshared_key,
			&record.overlay_address.to_string(),
		);
		let material = self.issued_material(&record, &preshared_key);

		Ok(Registration {
			record,
			material,
			server_peer_block,
			reconcile,
		})
	}

	fn issued_material(&self, record: &PeerRecord, preshared_key: &Secret<String>) -> IssuedMaterial {
		let config = ServerConfig {
			server_public_key: self.overlay.server_public_key.to_base64(),
			endpoint: self.overlay.endpoint.clone(),
			preshared_key: preshared_key.expose().clone(),
			dns: self.overlay.dns.clone(),
			allowed_ips: self.overlay.allowed_ips.clone(),
			persistent_keepalive: self.overlay.persistent_keepalive,
		};

		match self.overlay.response_mode {
			ProtocolMode::Structured => IssuedMaterial::Structured(config),
			ProtocolMode::Embedded => {
				// the client holds its own private key and fills it in
				let block = WgQuickConfig {
					interface: InterfaceSection {
						private_key: None,
						address: record.overlay_address.to_string(),
						dns: config.dns,
					},
					peer: PeerSection {
						public_key: config.server_public_key,
						preshared_key: Secret::new(config.preshared_key),
						endpoint: config.endpoint,
						allowed_ips: config.allowed_ips,
						persistent_keepalive: config.persistent_keepalive,
					},
				};
				IssuedMaterial::EmbeddedText(block.render().expose().clone())
			}
		}
	}

	pub async fn list(&self) -> Vec<PeerInfo> {
		self.registry.list().await
	}

	#[instrument(skip(self))]
	pub async fn revoke(&self, public_key: &str) -> Result<Revocation> {
		// an undecodable key can never have been registered
		let public_key =
			WgPublicKey::from_base64(public_key).map_err(|_| WgProvError::PeerNotFound)?;
		let _guard = self.guards.acquire(&public_key).await;
		let record = self.registry.revoke(&public_key).await?;

		let reconcile = ReconcileOutcome::from(self.reconciler.remove_peer(&public_key).await);
		let server_action = if reconcile.applied {
			None
		} else {
			Some(format!(
				"Run on server: wg set {} peer {} remove",
				self.reconciler.wg_interface(),
				public_key
			))
		};

		info!(
			public_key = %public_key,
			assigned_ip = %record.overlay_address,
			server_removed = reconcile.applied,
			"peer revoked"
		);

		Ok(Revocation {
			record,
			reconcile,
			server_action,
		})
	}

	pub async fn health(&self) -> Health {
		Health {
			peer_count: self.registry.len().await,
			reconciliation_enabled: self.reconciler.is_enabled(),
		}
	}

	/// Push every registered peer to the live endpoint again.
	///
	/// Peers revoked while the sync is running are skipped rather than
	/// re-applied.
	#[instrument(skip(self))]
	pub async fn sync(&self) -> std::result::Result<SyncResponse, ReconcileError> {
		if !self.reconciler.is_enabled() {
			return Err(ReconcileError::NotConfigured);
		}

		let mut report = SyncResponse {
			applied: 0,
			failed: 0,
			errors: Vec::new(),
		};
		for snapshot in self.registry.records().await {
			let _guard = self.guards.acquire(&snapshot.public_key).await;
			let Some(record) = self.registry.get(&snapshot.public_key).await else {
				debug!(public_key = %snapshot.public_key, "peer revoked during sync, skipping");
				continue;
			};
			match self
				.reconciler
				.apply_peer(
					&record.public_key,
					&record.preshared_key,
					record.overlay_address,
				)
				.await
			{
				Ok(()) => report.applied += 1,
				Err(e) => {
					warn!(public_key = %record.public_key, error = %e, "sync failed for peer");
					report.failed += 1;
					report.errors.push(format!("{}: {e}", record.public_key));
				}
			}
		}

		info!(applied = report.applied, failed = report.failed, "sync complete");
		Ok(report)
	}
}
