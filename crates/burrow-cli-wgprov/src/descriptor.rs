// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use burrow_common_secret::Secret;
use burrow_wgprov_common::{
	InterfaceSection, PeerSection, WgPrivateKey, WgQuickConfig, DEFAULT_ALLOWED_IPS, DEFAULT_DNS,
	DEFAULT_KEEPALIVE_SECS,
};

use crate::error::Result;
use crate::store::{slot, SecureStore};

/// Endpoint parameters the control plane issued to this device.
#[derive(Debug, Clone, PartialEq)]
pub struct IssuedConfig {
	pub server_public_key: String,
	pub endpoint: String,
	pub preshared_key: Secret<String>,
	pub dns: String,
	pub allowed_ips: String,
	pub persistent_keepalive: u16,
	pub assigned_address: String,
}

impl IssuedConfig {
	pub async fn save(&self, store: &dyn SecureStore) -> Result<()> {
		let keepalive = self.persistent_keepalive.to_string();
		store.put_all(&self.entries(&keepalive)).await?;
		Ok(())
	}

	/// Store slots and values; `keepalive` is the rendered keepalive.
	pub(crate) fn entries<'a>(&'a self, keepalive: &'a str) -> [(&'static str, &'a str); 7] {
		[
			(slot::PRESHARED_KEY, self.preshared_key.expose().as_str()),
			(slot::ASSIGNED_IP, self.assigned_address.as_str()),
			(slot::SERVER_PUBLIC_KEY, self.server_public_key.as_str()),
			(slot::SERVER_ENDPOINT, self.endpoint.as_str()),
			(slot::DNS, self.dns.as_str()),
			(slot::ALLOWED_IPS, self.allowed_ips.as_str()),
			(slot::KEEPALIVE, keepalive),
		]
	}

	/// `None` unless the address, preshared key and server parameters are
	/// all present.
	pub async fn load(store: &dyn SecureStore) -> Result<Option<Self>> {
		let get = |key: &'static str| async move {
			store
				.get(key)
				.await
				.map(|value| value.map(|v| v.expose().clone()))
		};

		let (Some(assigned_address), Some(preshared_key), Some(server_public_key), Some(endpoint)) = (
			get(slot::ASSIGNED_IP).await?,
			get(slot::PRESHARED_KEY).await?,
			get(slot::SERVER_PUBLIC_KEY).await?,
			get(slot::SERVER_ENDPOINT).await?,
		) else {
			return Ok(None);
		};

		let persistent_keepalive = get(slot::KEEPALIVE)
			.await?
			.and_then(|v| v.parse().ok())
			.unwrap_or(DEFAULT_KEEPALIVE_SECS);

		Ok(Some(Self {
			server_public_key,
			endpoint,
			preshared_key: Secret::new(preshared_key),
			dns: get(slot::DNS).await?.unwrap_or_else(|| DEFAULT_DNS.to_string()),
			allowed_ips: get(slot::ALLOWED_IPS)
				.await?
				.unwrap_or_else(|| DEFAULT_ALLOWED_IPS.to_string()),
			persistent_keepalive,
			assigned_address,
		}))
	}
}

/// Everything a tunnel engine needs to bring the interface up. Built on
/// demand and never stored whole.
#[derive(Debug, Clone)]
pub struct TunnelDescriptor {
	config: WgQuickConfig,
}

impl TunnelDescriptor {
	pub fn new(private_key: &WgPrivateKey, issued: &IssuedConfig) -> Self {
		Self {
			config: WgQuickConfig {
				interface: InterfaceSection {
					private_key: Some(private_key.to_base64()),
					address: issued.assigned_address.clone(),
					dns: issued.dns.clone(),
				},
				peer: PeerSection {
					public_key: issued.server_public_key.clone(),
					preshared_key: issued.preshared_key.clone(),
					endpoint: issued.endpoint.clone(),
					allowed_ips: issued.allowed_ips.clone(),
					persistent_keepalive: issued.persistent_keepalive,
				},
			},
		}
	}

	pub fn address(&self) -> &str {
		&self.config.interface.address
	}

	pub fn endpoint(&self) -> &str {
		&self.config.peer.endpoint
	}

	pub fn server_public_key(&self) -> &str {
		&self.config.peer.public_key
	}

	/// `wg-quick` text, including the private key.
	pub fn render(&self) -> Secret<String> {
		self.config.render()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::store::MemoryStore;
	use burrow_wgprov_common::parse_client_config;

	fn issued() -> IssuedConfig {
		IssuedConfig {
			server_public_key: "G1ReQCSgRG/MdfF5/SMrcnU+lKQMlwkr9aIA7/ZK5WI=".to_string(),
			endpoint: "vpn.example.com:51820".to_string(),
			preshared_key: Secret::new("AQEBAQEBAQEBAQEBAQEBAQEBAQEBAQEBAQEBAQEBAQE=".to_string()),
			dns: DEFAULT_DNS.to_string(),
			allowed_ips: DEFAULT_ALLOWED_IPS.to_string(),
			persistent_keepalive: 25,
			assigned_address: "10.66.66.2/32".to_string(),
		}
	}

	#[tokio::test]
	async fn issued_config_survives_store() {
		let store = MemoryStore::new();
		assert!(IssuedConfig::load(&store).await.unwrap().is_none());

		issued().save(&store).await.unwrap();
		assert_eq!(IssuedConfig::load(&store).await.unwrap(), Some(issued()));
	}

	#[tokio::test]
	async fn missing_required_value_means_absent() {
		let store = MemoryStore::new();
		issued().save(&store).await.unwrap();
		store.remove(slot::SERVER_ENDPOINT).await.unwrap();
		assert!(IssuedConfig::load(&store).await.unwrap().is_none());
	}

	#[tokio::test]
	async fn optional_values_fall_back_to_defaults() {
		let store = MemoryStore::new();
		issued().save(&store).await.unwrap();
		store.remove(slot::DNS).await.unwrap();
		store.put(slot::KEEPALIVE, "soon").await.unwrap();

		let loaded = IssuedConfig::load(&store).await.unwrap().unwrap();
		assert_eq!(loaded.dns, DEFAULT_DNS);
		assert_eq!(loaded.persistent_keepalive, DEFAULT_KEEPALIVE_SECS);
	}

	#[test]
	fn descriptor_renders_wg_quick_text() {
		let private_key = WgPrivateKey::generate();
		let descriptor = TunnelDescriptor::new(&private_key, &issued());
		let text = descriptor.render();

		let parsed = parse_client_config(text.expose()).unwrap();
		assert_eq!(
			parsed.private_key.unwrap().expose(),
			private_key.to_base64().expose()
		);
		assert_eq!(parsed.address, "10.66.66.2/32");
		assert_eq!(parsed.endpoint, "vpn.example.com:51820");
		assert_eq!(parsed.allowed_ips, DEFAULT_ALLOWED_IPS);
		assert_eq!(parsed.persistent_keepalive, 25);
		assert!(!format!("{descriptor:?}").contains(private_key.to_base64().expose()));
	}
}
