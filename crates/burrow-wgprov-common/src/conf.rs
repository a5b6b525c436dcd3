// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! `wg-quick` INI rendering and the embedded-text parser.

use burrow_common_secret::Secret;
use regex::Regex;
use std::fmt::Write as _;
use thiserror::Error;

pub const DEFAULT_DNS: &str = "1.1.1.1, 1.0.0.1";
pub const DEFAULT_ALLOWED_IPS: &str = "0.0.0.0/0, ::/0";
pub const DEFAULT_KEEPALIVE_SECS: u16 = 25;

pub(crate) const REDACTED_BLOCK: &str = "[REDACTED CONFIG BLOCK]";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfError {
	#[error("config block is missing required key '{0}'")]
	MissingKey(&'static str),

	#[error("invalid value for '{key}': {value}")]
	InvalidValue { key: &'static str, value: String },
}

/// Value of the first `Key = value` line for `key`, trimmed.
pub fn parse_conf_value(text: &str, key: &str) -> Option<String> {
	let pattern = format!(r"(?m)^\s*{}\s*=\s*(.+?)\s*$", regex::escape(key));
	let re = Regex::new(&pattern).ok()?;
	re.captures(text)
		.and_then(|caps| caps.get(1))
		.map(|m| m.as_str().to_string())
		.filter(|v| !v.is_empty())
}

/// The `[Interface]` half of a `wg-quick` file.
#[derive(Debug, Clone)]
pub struct InterfaceSection {
	/// Omitted when the server renders a block for a client-held key.
	pub private_key: Option<Secret<String>>,
	pub address: String,
	pub dns: String,
}

/// The `[Peer]` half of a `wg-quick` file, as seen from a client.
#[derive(Debug, Clone)]
pub struct PeerSection {
	pub public_key: String,
	pub preshared_key: Secret<String>,
	pub endpoint: String,
	pub allowed_ips: String,
	pub persistent_keepalive: u16,
}

#[derive(Debug, Clone)]
pub struct WgQuickConfig {
	pub interface: InterfaceSection,
	pub peer: PeerSection,
}

impl WgQuickConfig {
	/// Render as `wg-quick` text. The result contains key material.
	pub fn render(&self) -> Secret<String> {
		let mut out = String::from("[Interface]\n");
		if let Some(private_key) = &self.interface.private_key {
			let _ = writeln!(out, "PrivateKey = {}", private_key.expose());
		}
		let _ = writeln!(out, "Address = {}", self.interface.address);
		if !self.interface.dns.trim().is_empty() {
			let _ = writeln!(out, "DNS = {}", self.interface.dns);
		}
		out.push_str("\n[Peer]\n");
		let _ = writeln!(out, "PublicKey = {}", self.peer.public_key);
		let _ = writeln!(out, "PresharedKey = {}", self.peer.preshared_key.expose());
		let _ = writeln!(out, "Endpoint = {}", self.peer.endpoint);
		let _ = writeln!(out, "AllowedIPs = {}", self.peer.allowed_ips);
		if self.peer.persistent_keepalive > 0 {
			let _ = writeln!(
				out,
				"PersistentKeepalive = {}",
				self.peer.persistent_keepalive
			);
		}
		Secret::new(out)
	}
}

/// Fields recovered from an embedded `clientConfig` block.
#[derive(Debug, Clone)]
pub struct ParsedClientConfig {
	pub private_key: Option<Secret<String>>,
	pub address: String,
	pub dns: String,
	pub server_public_key: String,
	pub preshared_key: Secret<String>,
	pub endpoint: String,
	pub allowed_ips: String,
	pub persistent_keepalive: u16,
}

/// Parse a `wg-quick` block. `DNS`, `AllowedIPs` and `PersistentKeepalive`
/// fall back to the service defaults when absent.
pub fn parse_client_config(text: &str) -> Result<ParsedClientConfig, ConfError> {
	let required = |key: &'static str| parse_conf_value(text, key).ok_or(ConfError::MissingKey(key));

	let persistent_keepalive = match parse_conf_value(text, "PersistentKeepalive") {
		Some(v) => v.parse().map_err(|_| ConfError::InvalidValue {
			key: "PersistentKeepalive",
			value: v,
		})?,
		None => DEFAULT_KEEPALIVE_SECS,
	};

	Ok(ParsedClientConfig {
		private_key: parse_conf_value(text, "PrivateKey").map(Secret::new),
		address: required("Address")?,
		dns: parse_conf_value(text, "DNS").unwrap_or_else(|| DEFAULT_DNS.to_string()),
		server_public_key: required("PublicKey")?,
		preshared_key: Secret::new(required("PresharedKey")?),
		endpoint: required("Endpoint")?,
		allowed_ips: parse_conf_value(text, "AllowedIPs")
			.unwrap_or_else(|| DEFAULT_ALLOWED_IPS.to_string()),
		persistent_keepalive,
	})
}

/// The `[Peer]` stanza an operator pastes into the endpoint's own config.
pub fn render_server_peer_block(
	name: &str,
	public_key: &str,
	preshared_key: &Secret<String>,
	allowed_ips: &str,
) -> Secret<String> {
	Secret::new(format!(
		"\n[Peer]\n# {name}\nPublicKey = {public_key}\nPresharedKey = {}\nAllowedIPs = {allowed_ips}\n",
		preshared_key.expose()
	))
}

#[cfg(test)]
mod tests {
	use super::*;

	const BLOCK: &str = "[Interface]
PrivateKey = yAnz5TF+lXXJte14tji3zlMNq+hd2rYUIgJBgB3fBmk=
Address = 10.66.66.7/32
DNS = 9.9.9.9

[Peer]
PublicKey = G1ReQCSgRG/MdfF5/SMrcnU+lKQMlwkr9aIA7/ZK5WI=
PresharedKey = c2VjcmV0LXNlY3JldC1zZWNyZXQtc2VjcmV0LXNlYw==
Endpoint = 203.0.113.10:51820
AllowedIPs = 10.66.66.0/24
PersistentKeepalive = 15
";

	#[test]
	fn parses_full_block() {
		let parsed = parse_client_config(BLOCK).unwrap();
		assert_eq!(
			parsed.private_key.as_ref().map(|k| k.expose().as_str()),
			Some("yAnz5TF+lXXJte14tji3zlMNq+hd2rYUIgJBgB3fBmk=")
		);
		assert_eq!(parsed.address, "10.66.66.7/32");
		assert_eq!(parsed.dns, "9.9.9.9");
		assert_eq!(
			parsed.server_public_key,
			"G1ReQCSgRG/MdfF5/SMrcnU+lKQMlwkr9aIA7/ZK5WI="
		);
		assert_eq!(parsed.endpoint, "203.0.113.10:51820");
		assert_eq!(parsed.allowed_ips, "10.66.66.0/24");
		assert_eq!(parsed.persistent_keepalive, 15);
	}

	#[test]
	fn optional_keys_fall_back_to_defaults() {
		let block = "Address = 10.66.66.3/32\nPublicKey = pk\nPresharedKey = psk\nEndpoint = h:1\n";
		let parsed = parse_client_config(block).unwrap();
		assert!(parsed.private_key.is_none());
		assert_eq!(parsed.dns, DEFAULT_DNS);
		assert_eq!(parsed.allowed_ips, DEFAULT_ALLOWED_IPS);
		assert_eq!(parsed.persistent_keepalive, DEFAULT_KEEPALIVE_SECS);
	}

	#[test]
	fn missing_required_key_is_reported() {
		let block = "Address = 10.66.66.3/32\nPublicKey = pk\nEndpoint = h:1\n";
		assert_eq!(
			parse_client_config(block).unwrap_err(),
			ConfError::MissingKey("PresharedKey")
		);
	}

	#[test]
	fn base64_padding_survives_value_parsing() {
		let text = "  PresharedKey =  abc+/def==  \n";
		assert_eq!(
			parse_conf_value(text, "PresharedKey").as_deref(),
			Some("abc+/def==")
		);
	}

	#[test]
	fn rendered_config_parses_back() {
		let config = WgQuickConfig {
			interface: InterfaceSection {
				private_key: Some(Secret::new("priv".to_string())),
				address: "10.66.66.2/32".to_string(),
				dns: DEFAULT_DNS.to_string(),
			},
			peer: PeerSection {
				public_key: "server".to_string(),
				preshared_key: Secret::new("psk".to_string()),
				endpoint: "203.0.113.10:51820".to_string(),
				allowed_ips: DEFAULT_ALLOWED_IPS.to_string(),
				persistent_keepalive: 25,
			},
		};
		let text = config.render();
		assert!(text.expose().starts_with("[Interface]\nPrivateKey = priv\n"));
		assert!(text.expose().contains("\n[Peer]\nPublicKey = server\n"));

		let parsed = parse_client_config(text.expose()).unwrap();
		assert_eq!(parsed.address, "10.66.66.2/32");
		assert_eq!(parsed.persistent_keepalive, 25);
	}

	#[test]
	fn server_peer_block_layout() {
		let block = render_server_peer_block(
			"Pixel",
			"AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=",
			&Secret::new("psk".to_string()),
			"10.66.66.2/32",
		);
		assert_eq!(
			block.expose(),
			"\n[Peer]\n# Pixel\nPublicKey = AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=\nPresharedKey = psk\nAllowedIPs = 10.66.66.2/32\n"
		);
	}
}
