// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The authoritative in-memory peer table.
//!
//! The peer map and the address allocator live behind a single lock, so the
//! duplicate check, the allocation and the insert happen as one step with
//! respect to every other registration.

use std::collections::HashMap;

use burrow_wgprov_common::{OverlaySubnet, PeerInfo, PresharedKey, WgPublicKey};
use chrono::{DateTime, Utc};
use ipnet::Ipv4Net;
use tokio::sync::RwLock;
use tracing::{debug, instrument};

use crate::error::{Result, WgProvError};
use crate::ip_allocator::AddressAllocator;

pub const MAX_NAME_CHARS: usize = 64;

/// A registered peer. Immutable once created.
#[derive(Debug, Clone)]
pub struct PeerRecord {
	pub public_key: WgPublicKey,
	pub name: String,
	pub overlay_address: Ipv4Net,
	pub preshared_key: PresharedKey,
	pub created_at: DateTime<Utc>,
}

impl PeerRecord {
	/// Listing view; carries no key material beyond the public key.
	pub fn summary(&self) -> PeerInfo {
		PeerInfo {
			name: self.name.clone(),
			public_key: self.public_key.to_base64(),
			assigned_ip: self.overlay_address.to_string(),
			created_at: self.created_at,
		}
	}
}

/// A registration request that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPeer {
	pub public_key: WgPublicKey,
	pub name: String,
}

/// Check a raw registration request. Nothing is allocated here.
pub fn validate_registration(name: &str, public_key: &str) -> Result<NewPeer> {
	let name = name.trim();
	if name.is_empty() {
		return Err(WgProvError::InvalidInput("Peer name is required".to_string()));
	}
	if name.chars().count() > MAX_NAME_CHARS {
		return Err(WgProvError::InvalidInput(format!(
			"Peer name must be at most {MAX_NAME_CHARS} characters"
		)));
	}
	// names end up as a comment line in the server peer block
	if name.chars().any(char::is_control) {
		return Err(WgProvError::InvalidInput(
			"Peer name must not contain control characters".to_string(),
		));
	}

	let public_key = public_key.trim();
	if public_key.is_empty() {
		return Err(WgProvError::InvalidInput(
			"Client public key (base64) is required".to_string(),
		));
	}
	let public_key = WgPublicKey::from_base64(public_key).map_err(|_| {
		WgProvError::InvalidInput("Invalid public key: must be 32 bytes (Curve25519)".to_string())
	})?;

	Ok(NewPeer {
		public_key,
		name: name.to_string(),
	})
}

#[derive(Debug)]
struct RegistryState {
	peers: HashMap<WgPublicKey, PeerRecord>,
	allocator: AddressAllocator,
}

#[derive(Debug)]
pub struct PeerRegistry {
	state: RwLock<RegistryState>,
}

impl PeerRegistry {
	pub fn new(subnet: OverlaySubnet) -> Self {
		Self {
			state: RwLock::new(RegistryState {
				peers: HashMap::new(),
				allocator: AddressAllocator::new(subnet),
			}),
		}
	}

	/// Insert a new peer. A key that is already present is rejected, never
	/// replayed.
	#[instrument(skip(self, peer), fields(public_key = %peer.public_key, name = %peer.name))]
	pub async fn register(&self, peer: NewPeer) -> Result<PeerRecord> {
		let mut state = self.state.write().await;

		if state.peers.contains_key(&peer.public_key) {
			return Err(WgProvError::PeerAlreadyExists);
		}

		let overlay_address = state.allocator.allocate()?;
		let record = PeerRecord {
			public_key: peer.public_key,
			name: peer.name,
			overlay_address,
			preshared_key: PresharedKey::generate(),
			created_at: Utc::now(),
		};
		state.peers.insert(record.public_key, record.clone());

		debug!(%overlay_address, peers = state.peers.len(), "peer registered");
		Ok(record)
	}

	/// Snapshot of every peer, ordered by overlay address.
	pub async fn list(&self) -> Vec<PeerInfo> {
		self.records()
			.await
			.iter()
			.map(PeerRecord::summary)
			.collect()
	}

	/// Full records, ordered by overlay address. Contains preshared keys.
	pub async fn records(&self) -> Vec<PeerRecord> {
		let state = self.state.read().await;
		let mut records: Vec<PeerRecord> = state.peers.values().cloned().collect();
		records.sort_by_key(|r| r.overlay_address.addr());
		records
	}

	pub async fn get(&self, public_key: &WgPublicKey) -> Option<PeerRecord> {
		self.state.read().await.peers.get(public_key).cloned()
	}

	#[instrument(skip(self), fields(public_key = %public_key))]
	pub async fn revoke(&self, public_key: &WgPublicKey) -> Result<PeerRecord> {
		let mut state = self.state.write().await;
		let record = state
			.peers
			.remove(public_key)
			.ok_or(WgProvError::PeerNotFound)?;
		debug!(overlay_address = %record.overlay_address, peers = state.peers.len(), "peer revoked");
		Ok(record)
	}

	pub async fn len(&self) -> usize {
		self.state.read().await.peers.len()
	}

	pub async fn is_empty(&self) -> bool {
		self.len().await == 0
	}

	pub async fn remaining_addresses(&self) -> u32 {
		self.state.read().await.allocator.remaining()
	}
}
