// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The device's WireGuard identity, held in the secure store.
//!
//! Only [`WgPublicKey`] values leave this module toward the network. The
//! private half is read back solely to build a local tunnel descriptor.

use std::sync::Arc;

use burrow_wgprov_common::{WgKeyPair, WgPrivateKey, WgPublicKey};
use tracing::{info, instrument};

use crate::descriptor::IssuedConfig;
use crate::error::Result;
use crate::store::{slot, SecureStore};

#[derive(Debug, Clone)]
pub struct KeyIdentity {
	store: Arc<dyn SecureStore>,
}

impl KeyIdentity {
	pub fn new(store: Arc<dyn SecureStore>) -> Self {
		Self { store }
	}

	/// Generate a fresh keypair, replacing any stored identity.
	#[instrument(skip(self))]
	pub async fn generate(&self) -> Result<WgPublicKey> {
		let pair = WgKeyPair::generate();
		self.persist(&pair).await?;
		info!(public_key = %pair.public_key(), "generated device identity");
		Ok(*pair.public_key())
	}

	pub async fn current_public_key(&self) -> Result<Option<WgPublicKey>> {
		match self.store.get(slot::PUBLIC_KEY).await? {
			Some(value) => Ok(Some(WgPublicKey::from_base64(value.expose())?)),
			None => Ok(None),
		}
	}

	pub async fn current_private_key(&self) -> Result<Option<WgPrivateKey>> {
		match self.store.get(slot::PRIVATE_KEY).await? {
			Some(value) => Ok(Some(WgPrivateKey::from_base64(value.expose())?)),
			None => Ok(None),
		}
	}

	/// The stored public key, generating an identity if either half is
	/// missing.
	pub async fn ensure(&self) -> Result<WgPublicKey> {
		if let (Some(public), Some(_)) = (
			self.current_public_key().await?,
			self.current_private_key().await?,
		) {
			return Ok(public);
		}
		self.generate().await
	}

	/// Wipe the identity together with everything issued for it.
	#[instrument(skip(self))]
	pub async fn clear(&self) -> Result<()> {
		self.store.clear().await?;
		info!("device identity cleared");
		Ok(())
	}

	/// Replace the local key with one generated by the server. The key and
	/// the material issued with it land in the store in one write.
	#[instrument(skip_all)]
	pub async fn adopt_private_key(
		&self,
		private_key: WgPrivateKey,
		issued: &IssuedConfig,
	) -> Result<WgPublicKey> {
		let pair = WgKeyPair::from_private_key(private_key);
		let private = pair.private_key().to_base64();
		let public = pair.public_key().to_base64();
		let keepalive = issued.persistent_keepalive.to_string();

		let mut entries = issued.entries(&keepalive).to_vec();
		entries.push((slot::PRIVATE_KEY, private.expose().as_str()));
		entries.push((slot::PUBLIC_KEY, public.as_str()));
		self.store.put_all(&entries).await?;

		info!(public_key = %pair.public_key(), "adopted server-issued identity");
		Ok(*pair.public_key())
	}

	async fn persist(&self, pair: &WgKeyPair) -> Result<()> {
		let private = pair.private_key().to_base64();
		let public = pair.public_key().to_base64();
		self.store
			.put_all(&[
				(slot::PRIVATE_KEY, private.expose().as_str()),
				(slot::PUBLIC_KEY, public.as_str()),
			])
			.await?;
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::store::MemoryStore;

	fn identity() -> (KeyIdentity, Arc<MemoryStore>) {
		let store = Arc::new(MemoryStore::new());
		(KeyIdentity::new(Arc::clone(&store) as Arc<dyn SecureStore>), store)
	}

	#[tokio::test]
	async fn absent_until_generated() {
		let (identity, _) = identity();
		assert!(identity.current_public_key().await.unwrap().is_none());
		assert!(identity.current_private_key().await.unwrap().is_none());

		let public = identity.generate().await.unwrap();
		let private = identity.current_private_key().await.unwrap().unwrap();
		assert_eq!(private.public_key(), public);
		assert_eq!(identity.current_public_key().await.unwrap(), Some(public));
	}

	#[tokio::test]
	async fn ensure_reuses_existing_identity() {
		let (identity, _) = identity();
		let first = identity.ensure().await.unwrap();
		let second = identity.ensure().await.unwrap();
		assert_eq!(first, second);
	}

	#[tokio::test]
	async fn generate_overwrites_previous_identity() {
		let (identity, _) = identity();
		let first = identity.generate().await.unwrap();
		let second = identity.generate().await.unwrap();
		assert_ne!(first, second);
		assert_eq!(identity.current_public_key().await.unwrap(), Some(second));
	}

	#[tokio::test]
	async fn clear_wipes_issued_values_too() {
		let (identity, store) = identity();
		identity.generate().await.unwrap();
		store.put(slot::ASSIGNED_IP, "10.66.66.2/32").await.unwrap();

		identity.clear().await.unwrap();
		assert!(identity.current_public_key().await.unwrap().is_none());
		assert!(store.get(slot::ASSIGNED_IP).await.unwrap().is_none());
	}

	#[tokio::test]
	async fn half_identity_is_regenerated() {
		let (identity, store) = identity();
		let first = identity.generate().await.unwrap();
		store.remove(slot::PRIVATE_KEY).await.unwrap();

		let second = identity.ensure().await.unwrap();
		assert_ne!(first, second);
		assert!(identity.current_private_key().await.unwrap().is_some());
	}

	#[tokio::test]
	async fn adopt_derives_matching_public_key() {
		let (identity, store) = identity();
		identity.generate().await.unwrap();

		let config = IssuedConfig {
			server_public_key: "G1ReQCSgRG/MdfF5/SMrcnU+lKQMlwkr9aIA7/ZK5WI=".to_string(),
			endpoint: "203.0.113.10:51820".to_string(),
			preshared_key: burrow_common_secret::Secret::new(
				"c2VjcmV0LXNlY3JldC1zZWNyZXQtc2VjcmV0LXNlYw==".to_string(),
			),
			dns: "1.1.1.1".to_string(),
			allowed_ips: "0.0.0.0/0".to_string(),
			persistent_keepalive: 25,
			assigned_address: "10.66.66.7/32".to_string(),
		};

		let issued = WgPrivateKey::generate();
		let expected = issued.public_key();
		let adopted = identity.adopt_private_key(issued, &config).await.unwrap();
		assert_eq!(adopted, expected);
		assert_eq!(identity.current_public_key().await.unwrap(), Some(expected));
		assert_eq!(
			IssuedConfig::load(store.as_ref()).await.unwrap(),
			Some(config)
		);
	}
}
