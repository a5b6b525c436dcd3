// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Monotonic overlay address allocation.
//!
//! Addresses are never handed out twice in one process, even after the peer
//! holding one is revoked. The endpoint may still route a revoked address
//! until it is reconciled, so reuse could deliver one peer's traffic to
//! another. A `/24` therefore supports 253 registrations per process
//! lifetime.

use burrow_wgprov_common::{OverlaySubnet, FIRST_PEER_HOST};
use ipnet::Ipv4Net;

use crate::error::{Result, WgProvError};

/// Not synchronized; [`crate::PeerRegistry`] owns it inside its lock.
#[derive(Debug)]
pub struct AddressAllocator {
	subnet: OverlaySubnet,
	next_host: u32,
}

impl AddressAllocator {
	pub fn new(subnet: OverlaySubnet) -> Self {
		Self {
			subnet,
			next_host: FIRST_PEER_HOST,
		}
	}

	pub fn allocate(&mut self) -> Result<Ipv4Net> {
		let addr = self
			.subnet
			.host(self.next_host)
			.ok_or(WgProvError::IpPoolExhausted {
				capacity: self.subnet.peer_capacity(),
			})?;
		self.next_host += 1;
		Ok(addr)
	}

	pub fn subnet(&self) -> OverlaySubnet {
		self.subnet
	}

	pub fn issued(&self) -> u32 {
		self.next_host - FIRST_PEER_HOST
	}

	pub fn remaining(&self) -> u32 {
		self.subnet.peer_capacity().saturating_sub(self.issued())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;
	use std::net::Ipv4Addr;

	#[test]
	fn starts_at_host_two() {
		let mut allocator = AddressAllocator::new(OverlaySubnet::default());
		assert_eq!(allocator.allocate().unwrap().to_string(), "10.66.66.2/32");
		assert_eq!(allocator.allocate().unwrap().to_string(), "10.66.66.3/32");
		assert_eq!(allocator.issued(), 2);
		assert_eq!(allocator.remaining(), 251);
	}

	#[test]
	fn exhausts_below_broadcast() {
		let subnet: OverlaySubnet = "10.9.9.0/29".parse().unwrap();
		let mut allocator = AddressAllocator::new(subnet);
		let issued: Vec<String> = (0..5)
			.map(|_| allocator.allocate().unwrap().to_string())
			.collect();
		assert_eq!(issued.last().map(String::as_str), Some("10.9.9.6/32"));
		assert_eq!(
			allocator.allocate(),
			Err(WgProvError::IpPoolExhausted { capacity: 5 })
		);
		assert_eq!(allocator.remaining(), 0);
	}

	proptest! {
		#[test]
		fn allocations_strictly_increase(count in 1usize..200) {
			let mut allocator = AddressAllocator::new(OverlaySubnet::default());
			let mut last: Option<Ipv4Addr> = None;
			for _ in 0..count {
				let addr = allocator.allocate().unwrap();
				prop_assert_eq!(addr.prefix_len(), 32);
				if let Some(prev) = last {
					prop_assert!(addr.addr() > prev);
				}
				last = Some(addr.addr());
			}
		}
	}
}
