// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! JSON bodies exchanged between `burrow-server` and its clients.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::conf;

pub const SERVICE_NAME: &str = "burrow-control-plane";

/// Which shape of issued material a deployment exchanges.
///
/// `Structured` carries a `serverConfig` object. `Embedded` carries a
/// `clientConfig` block in `wg-quick` format. Both ends are configured with
/// the same mode; neither side guesses from the response body.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolMode {
	#[default]
	Structured,
	Embedded,
}

impl fmt::Display for ProtocolMode {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ProtocolMode::Structured => f.write_str("structured"),
			ProtocolMode::Embedded => f.write_str("embedded"),
		}
	}
}

impl FromStr for ProtocolMode {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.trim().to_ascii_lowercase().as_str() {
			"structured" => Ok(ProtocolMode::Structured),
			"embedded" => Ok(ProtocolMode::Embedded),
			other => Err(format!(
				"unknown protocol mode '{other}' (expected 'structured' or 'embedded')"
			)),
		}
	}
}

/// Missing or non-string fields deserialize as empty so validation can name
/// them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterPeerRequest {
	#[serde(default, deserialize_with = "string_or_empty")]
	pub name: String,
	#[serde(default, deserialize_with = "string_or_empty")]
	pub public_key: String,
}

fn string_or_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
	D: serde::Deserializer<'de>,
{
	#[derive(Deserialize)]
	#[serde(untagged)]
	enum Field {
		Text(String),
		Other(serde::de::IgnoredAny),
	}

	Ok(match Field::deserialize(deserializer)? {
		Field::Text(text) => text,
		Field::Other(_) => String::new(),
	})
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerInfo {
	pub name: String,
	pub public_key: String,
	#[serde(rename = "assignedIP")]
	pub assigned_ip: String,
	pub created_at: DateTime<Utc>,
}

/// Endpoint parameters handed to a newly registered peer.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
	pub server_public_key: String,
	pub endpoint: String,
	pub preshared_key: String,
	pub dns: String,
	#[serde(rename = "allowedIPs")]
	pub allowed_ips: String,
	pub persistent_keepalive: u16,
}

impl fmt::Debug for ServerConfig {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ServerConfig")
			.field("server_public_key", &self.server_public_key)
			.field("endpoint", &self.endpoint)
			.field("preshared_key", &burrow_common_secret::REDACTED)
			.field("dns", &self.dns)
			.field("allowed_ips", &self.allowed_ips)
			.field("persistent_keepalive", &self.persistent_keepalive)
			.finish()
	}
}

/// Issued material extracted from a registration response.
#[derive(Clone, PartialEq, Eq)]
pub enum IssuedMaterial {
	Structured(ServerConfig),
	EmbeddedText(String),
}

impl fmt::Debug for IssuedMaterial {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			IssuedMaterial::Structured(config) => {
				f.debug_tuple("Structured").field(config).finish()
			}
			IssuedMaterial::EmbeddedText(_) => f
				.debug_tuple("EmbeddedText")
				.field(&conf::REDACTED_BLOCK)
				.finish(),
		}
	}
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterPeerResponse {
	pub message: String,
	pub peer: PeerInfo,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub server_config: Option<ServerConfig>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub client_config: Option<String>,
	pub server_peer_block: String,
	#[serde(default)]
	pub server_applied: bool,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub server_error: Option<String>,
}

impl RegisterPeerResponse {
	/// The issued material for `mode`, or `None` if the response does not
	/// carry that variant.
	pub fn material(&self, mode: ProtocolMode) -> Option<IssuedMaterial> {
		match mode {
			ProtocolMode::Structured => self
				.server_config
				.clone()
				.map(IssuedMaterial::Structured),
			ProtocolMode::Embedded => self
				.client_config
				.clone()
				.map(IssuedMaterial::EmbeddedText),
		}
	}
}

impl fmt::Debug for RegisterPeerResponse {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("RegisterPeerResponse")
			.field("message", &self.message)
			.field("peer", &self.peer)
			.field("server_config", &self.server_config)
			.field(
				"client_config",
				&self.client_config.as_ref().map(|_| conf::REDACTED_BLOCK),
			)
			.field("server_applied", &self.server_applied)
			.field("server_error", &self.server_error)
			.finish_non_exhaustive()
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerListResponse {
	pub count: usize,
	pub peers: Vec<PeerInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemovedPeer {
	pub name: String,
	pub public_key: String,
	#[serde(rename = "assignedIP")]
	pub assigned_ip: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevokePeerResponse {
	pub message: String,
	pub removed_peer: RemovedPeer,
	#[serde(default)]
	pub server_removed: bool,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub server_action: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
	pub status: String,
	pub service: String,
	pub active_peers: usize,
	pub reconciliation_enabled: bool,
	pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncResponse {
	pub applied: usize,
	pub failed: usize,
	#[serde(default)]
	pub errors: Vec<String>,
}

/// Body of every non-2xx response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiErrorBody {
	pub error: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub details: Option<String>,
}

impl ApiErrorBody {
	pub fn new(error: impl Into<String>) -> Self {
		Self {
			error: error.into(),
			details: None,
		}
	}

	pub fn with_details(mut self, details: impl Into<String>) -> Self {
		self.details = Some(details.into());
		self
	}
}
