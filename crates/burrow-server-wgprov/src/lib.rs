// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Server side of the burrow peer provisioning protocol.
//!
//! [`ProvisioningService`] validates registrations, records them in the
//! [`PeerRegistry`] and pushes them to the live endpoint through the
//! [`Reconciler`].

pub mod error;
pub mod ip_allocator;
pub mod reconcile;
pub mod registry;
pub mod service;

pub use error::{Result, WgProvError};
pub use ip_allocator::AddressAllocator;
pub use reconcile::{ReconcileError, ReconcileOutcome, Reconciler, RemoteExecutor, SshExecutor};
pub use registry::{validate_registration, NewPeer, PeerRecord, PeerRegistry};
pub use service::{Health, ProvisioningService, Registration, Revocation};
