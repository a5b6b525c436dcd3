// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! IPv4 overlay subnet arithmetic.
//!
//! Host 1 of the subnet is the endpoint's own interface address. Peers are
//! numbered from [`FIRST_PEER_HOST`] up to the last host below broadcast, and
//! each receives a single-address `/32` route.

use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;
use thiserror::Error;

pub const DEFAULT_OVERLAY_SUBNET: &str = "10.66.66.0/24";
pub const SERVER_HOST: u32 = 1;
pub const FIRST_PEER_HOST: u32 = 2;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OverlayError {
	#[error("invalid overlay subnet '{0}'")]
	InvalidSubnet(String),

	#[error("overlay subnet {0} is too small to hold any peers")]
	TooSmall(Ipv4Net),
}

#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OverlaySubnet {
	net: Ipv4Net,
}

impl OverlaySubnet {
	pub fn new(net: Ipv4Net) -> Result<Self, OverlayError> {
		let net = net.trunc();
		// network, endpoint, one peer, broadcast
		if net.prefix_len() > 30 {
			return Err(OverlayError::TooSmall(net));
		}
		Ok(Self { net })
	}

	pub fn net(&self) -> Ipv4Net {
		self.net
	}

	/// The `/32` for host number `n`, or `None` outside the usable range.
	pub fn host(&self, n: u32) -> Option<Ipv4Net> {
		if n == 0 || n > self.last_host() {
			return None;
		}
		let base = u32::from(self.net.network());
		let addr = Ipv4Addr::from(base.checked_add(n)?);
		Ipv4Net::new(addr, 32).ok()
	}

	/// Highest host number that is not the broadcast address.
	pub fn last_host(&self) -> u32 {
		let host_bits = 32 - u32::from(self.net.prefix_len());
		((1u64 << host_bits) - 2) as u32
	}

	/// Number of addresses available to peers.
	pub fn peer_capacity(&self) -> u32 {
		self.last_host() - FIRST_PEER_HOST + 1
	}

	pub fn server_address(&self) -> Ipv4Net {
		// prefix_len <= 30 guarantees host 1 exists
		Ipv4Net::new(
			Ipv4Addr::from(u32::from(self.net.network()) + SERVER_HOST),
			self.net.prefix_len(),
		)
		.unwrap_or(self.net)
	}

	pub fn contains(&self, addr: Ipv4Addr) -> bool {
		self.net.contains(&addr)
	}
}

impl Default for OverlaySubnet {
	fn default() -> Self {
		Self {
			net: Ipv4Net::new(Ipv4Addr::new(10, 66, 66, 0), 24)
				.unwrap_or_else(|_| Ipv4Net::default()),
		}
	}
}

impl FromStr for OverlaySubnet {
	type Err = OverlayError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let net: Ipv4Net = s
			.trim()
			.parse()
			.map_err(|_| OverlayError::InvalidSubnet(s.to_string()))?;
		Self::new(net)
	}
}

impl TryFrom<String> for OverlaySubnet {
	type Error = OverlayError;

	fn try_from(value: String) -> Result<Self, Self::Error> {
		value.parse()
	}
}

impl From<OverlaySubnet> for String {
	fn from(value: OverlaySubnet) -> Self {
		value.to_string()
	}
}

impl fmt::Display for OverlaySubnet {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.net)
	}
}

impl fmt::Debug for OverlaySubnet {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "OverlaySubnet({})", self.net)
	}
}
