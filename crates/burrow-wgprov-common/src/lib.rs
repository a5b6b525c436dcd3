// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Types shared by both ends of the burrow peer provisioning protocol.

pub mod api;
pub mod conf;
pub mod keys;
pub mod overlay;

pub use api::{
	ApiErrorBody, HealthResponse, IssuedMaterial, PeerInfo, PeerListResponse, ProtocolMode,
	RegisterPeerRequest, RegisterPeerResponse, RemovedPeer, RevokePeerResponse, ServerConfig,
	SyncResponse, SERVICE_NAME,
};
pub use conf::{
	parse_client_config, parse_conf_value, render_server_peer_block, ConfError, InterfaceSection,
	ParsedClientConfig, PeerSection, WgQuickConfig, DEFAULT_ALLOWED_IPS, DEFAULT_DNS,
	DEFAULT_KEEPALIVE_SECS,
};
pub use keys::{KeyError, PresharedKey, WgKeyPair, WgPrivateKey, WgPublicKey};
pub use overlay::{OverlayError, OverlaySubnet, DEFAULT_OVERLAY_SUBNET, FIRST_PEER_HOST};
