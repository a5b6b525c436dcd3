// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Liveness endpoint.

use axum::{extract::State, Json};
use burrow_wgprov_common::{HealthResponse, SERVICE_NAME};
use chrono::Utc;

use crate::AppState;

/// GET /api/health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
	let health = state.service.health().await;
	Json(HealthResponse {
		status: "ok".to_string(),
		service: SERVICE_NAME.to_string(),
		active_peers: health.peer_count,
		reconciliation_enabled: health.reconciliation_enabled,
		timestamp: Utc::now(),
	})
}
