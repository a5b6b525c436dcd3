// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Overlay network and issued-material configuration.

use burrow_wgprov_common::{
	OverlaySubnet, ProtocolMode, WgPublicKey, DEFAULT_ALLOWED_IPS, DEFAULT_DNS,
	DEFAULT_KEEPALIVE_SECS,
};
use serde::Deserialize;

use crate::error::ConfigError;

pub const DEFAULT_SERVER_PUBLIC_KEY: &str = "G1ReQCSgRG/MdfF5/SMrcnU+lKQMlwkr9aIA7/ZK5WI=";
pub const DEFAULT_SERVER_ENDPOINT: &str = "vpn.example.com:51820";

/// Overlay configuration (runtime, fully resolved).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlayConfig {
	pub subnet: OverlaySubnet,
	pub server_public_key: WgPublicKey,
	/// `host:port` clients dial.
	pub endpoint: String,
	pub dns: String,
	pub allowed_ips: String,
	pub persistent_keepalive: u16,
	pub response_mode: ProtocolMode,
}

impl Default for OverlayConfig {
	fn default() -> Self {
		Self {
			subnet: OverlaySubnet::default(),
			server_public_key: WgPublicKey::from_base64(DEFAULT_SERVER_PUBLIC_KEY)
				.unwrap_or_else(|_| WgPublicKey::from_bytes([0u8; 32])),
			endpoint: DEFAULT_SERVER_ENDPOINT.to_string(),
			dns: DEFAULT_DNS.to_string(),
			allowed_ips: DEFAULT_ALLOWED_IPS.to_string(),
			persistent_keepalive: DEFAULT_KEEPALIVE_SECS,
			response_mode: ProtocolMode::Structured,
		}
	}
}

/// Overlay configuration layer (partial, for merging).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OverlayConfigLayer {
	#[serde(default)]
	pub subnet: Option<String>,
	#[serde(default)]
	pub server_public_key: Option<String>,
	#[serde(default)]
	pub endpoint: Option<String>,
	#[serde(default)]
	pub dns: Option<String>,
	#[serde(default)]
	pub allowed_ips: Option<String>,
	#[serde(default)]
	pub persistent_keepalive: Option<u16>,
	#[serde(default)]
	pub response_mode: Option<ProtocolMode>,
}

impl OverlayConfigLayer {
	pub fn merge(&mut self, other: OverlayConfigLayer) {
		if other.subnet.is_some() {
			self.subnet = other.subnet;
		}
		if other.server_public_key.is_some() {
			self.server_public_key = other.server_public_key;
		}
		if other.endpoint.is_some() {
			self.endpoint = other.endpoint;
		}
		if other.dns.is_some() {
			self.dns = other.dns;
		}
		if other.allowed_ips.is_some() {
			self.allowed_ips = other.allowed_ips;
		}
		if other.persistent_keepalive.is_some() {
			self.persistent_keepalive = other.persistent_keepalive;
		}
		if other.response_mode.is_some() {
			self.response_mode = other.response_mode;
		}
	}

	pub fn finalize(self) -> Result<OverlayConfig, ConfigError> {
		let defaults = OverlayConfig::default();

		let subnet = match self.subnet {
			Some(s) => s
				.parse()
				.map_err(|e: burrow_wgprov_common::OverlayError| {
					ConfigError::invalid("overlay.subnet", e.to_string())
				})?,
			None => defaults.subnet,
		};

		let server_public_key = match self.server_public_key {
			Some(s) => WgPublicKey::from_base64(&s)
				.map_err(|e| ConfigError::invalid("overlay.server_public_key", e.to_string()))?,
			None => defaults.server_public_key,
		};

		let endpoint = self.endpoint.unwrap_or(defaults.endpoint);
		if !endpoint.contains(':') {
			return Err(ConfigError::invalid(
				"overlay.endpoint",
				format!("'{endpoint}' must be host:port"),
			));
		}

		Ok(OverlayConfig {
			subnet,
			server_public_key,
			endpoint,
			dns: self.dns.unwrap_or(defaults.dns),
			allowed_ips: self.allowed_ips.unwrap_or(defaults.allowed_ips),
			persistent_keepalive: self
				.persistent_keepalive
				.unwrap_or(defaults.persistent_keepalive),
			response_mode: self.response_mode.unwrap_or(defaults.response_mode),
		})
	}
}
