// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! HTTP surface of the burrow control plane.

pub mod routes;

use std::sync::Arc;

use axum::routing::{delete, get, post};
use axum::Router;
use burrow_server_config::ServerConfig;
use burrow_server_wgprov::{ProvisioningService, Reconciler};

#[derive(Clone)]
pub struct AppState {
	pub service: Arc<ProvisioningService>,
}

impl AppState {
	pub fn new(service: ProvisioningService) -> Self {
		Self {
			service: Arc::new(service),
		}
	}
}

/// Wire up the provisioning service from resolved configuration.
pub fn create_app_state(config: &ServerConfig) -> AppState {
	let reconciler = Reconciler::from_config(config.reconcile.clone(), config.overlay.subnet);
	AppState::new(ProvisioningService::new(config.overlay.clone(), reconciler))
}

pub fn create_router(state: AppState) -> Router {
	Router::new()
		.route("/api/health", get(routes::health::health_check))
		.route(
			"/api/peers",
			post(routes::peers::register_peer).get(routes::peers::list_peers),
		)
		.route("/api/peers/sync", post(routes::peers::sync_peers))
		.route("/api/peers/{public_key}", delete(routes::peers::revoke_peer))
		.with_state(state)
}
