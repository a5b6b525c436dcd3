// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Peer registration, listing and revocation handlers.

use axum::{
	extract::{rejection::JsonRejection, Path, State},
	http::StatusCode,
	response::{IntoResponse, Response},
	Json,
};
use burrow_server_wgprov::{ReconcileError, WgProvError};
use burrow_wgprov_common::{ApiErrorBody, PeerListResponse, RegisterPeerRequest};
use tracing::warn;

use crate::AppState;

/// POST /api/peers
pub async fn register_peer(
	State(state): State<AppState>,
	payload: Result<Json<RegisterPeerRequest>, JsonRejection>,
) -> Response {
	let Json(request) = match payload {
		Ok(payload) => payload,
		Err(rejection) => {
			warn!(error = %rejection, "rejected registration body");
			return (
				StatusCode::BAD_REQUEST,
				Json(ApiErrorBody::new("Invalid request body").with_details(rejection.body_text())),
			)
				.into_response();
		}
	};

	match state
		.service
		.register(&request.name, &request.public_key)
		.await
	{
		Ok(registration) => (StatusCode::CREATED, Json(registration.into_response())).into_response(),
		Err(e) => e.into_response(),
	}
}

/// GET /api/peers
pub async fn list_peers(State(state): State<AppState>) -> Json<PeerListResponse> {
	let peers = state.service.list().await;
	Json(PeerListResponse {
		count: peers.len(),
		peers,
	})
}

/// DELETE /api/peers/{public_key}
///
/// The key arrives percent-decoded, so `/` and `+` in base64 survive when
/// clients encode them.
pub async fn revoke_peer(
	State(state): State<AppState>,
	Path(public_key): Path<String>,
) -> Result<Response, WgProvError> {
	let revocation = state.service.revoke(&public_key).await?;
	Ok(Json(revocation.into_response()).into_response())
}

/// POST /api/peers/sync
pub async fn sync_peers(State(state): State<AppState>) -> Response {
	match state.service.sync().await {
		Ok(report) => Json(report).into_response(),
		Err(ReconcileError::NotConfigured) => (
			StatusCode::SERVICE_UNAVAILABLE,
			Json(ApiErrorBody::new("Live reconciliation is not configured")),
		)
			.into_response(),
		Err(e) => (
			StatusCode::BAD_GATEWAY,
			Json(ApiErrorBody::new("Failed to sync peers").with_details(e.to_string())),
		)
			.into_response(),
	}
}
