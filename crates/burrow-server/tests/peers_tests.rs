// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Integration tests for the peer provisioning endpoints.
//!
//! Tests cover:
//! - Registration, listing and revocation through the router
//! - Validation and conflict status codes
//! - Live reconciliation flags with and without a remote executor

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
	body::Body,
	http::{Request, StatusCode},
	Router,
};
use burrow_common_secret::Secret;
use burrow_server::{create_app_state, create_router, AppState};
use burrow_server_config::{OverlayConfig, ServerConfig};
use burrow_server_wgprov::{ProvisioningService, ReconcileError, Reconciler, RemoteExecutor};
use serde_json::{json, Value};
use tower::ServiceExt;

const ZERO_KEY: &str = "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=";
const ONES_KEY: &str = "AQEBAQEBAQEBAQEBAQEBAQEBAQEBAQEBAQEBAQEBAQE=";
const SLASHY_KEY: &str = "+/v7+/v7+/v7+/v7+/v7+/v7+/v7+/v7+/v7+/v7+/s=";

fn setup_test_app() -> Router {
	create_router(create_app_state(&ServerConfig::default()))
}

#[derive(Default)]
struct FakeEndpoint {
	scripts: Mutex<Vec<String>>,
}

#[async_trait]
impl RemoteExecutor for FakeEndpoint {
	fn target(&self) -> String {
		"fake".to_string()
	}

	async fn run(&self, script: Secret<String>) -> Result<String, ReconcileError> {
		self.scripts.lock().unwrap().push(script.expose().clone());
		Ok(String::new())
	}
}

fn setup_reconciling_app() -> (Router, Arc<FakeEndpoint>) {
	let endpoint = Arc::new(FakeEndpoint::default());
	let overlay = OverlayConfig::default();
	let reconciler = Reconciler::new(
		Arc::clone(&endpoint) as Arc<dyn RemoteExecutor>,
		"wg0",
		"eth0",
		overlay.subnet,
	);
	let state = AppState::new(ProvisioningService::new(overlay, reconciler));
	(create_router(state), endpoint)
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
	let response = app.clone().oneshot(request).await.unwrap();
	let status = response.status();
	let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
		.await
		.unwrap();
	let body = if bytes.is_empty() {
		Value::Null
	} else {
		serde_json::from_slice(&bytes).unwrap()
	};
	(status, body)
}

fn register_request(body: Value) -> Request<Body> {
	Request::builder()
		.method("POST")
		.uri("/api/peers")
		.header("content-type", "application/json")
		.body(Body::from(body.to_string()))
		.unwrap()
}

fn get_request(uri: &str) -> Request<Body> {
	Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn revoke_request(public_key: &str) -> Request<Body> {
	let encoded: String = url::form_urlencoded::byte_serialize(public_key.as_bytes()).collect();
	Request::builder()
		.method("DELETE")
		.uri(format!("/api/peers/{encoded}"))
		.body(Body::empty())
		.unwrap()
}

// ============================================================================
// Registration
// ============================================================================

#[tokio::test]
async fn test_register_first_peer_gets_host_two() {
	let app = setup_test_app();

	let (status, body) = send(
		&app,
		register_request(json!({"name": "Pixel", "publicKey": ZERO_KEY})),
	)
	.await;

	assert_eq!(status, StatusCode::CREATED);
	assert_eq!(body["message"], "Peer \"Pixel\" registered");
	assert_eq!(body["peer"]["name"], "Pixel");
	assert_eq!(body["peer"]["assignedIP"], "10.66.66.2/32");
	assert_eq!(body["serverConfig"]["persistentKeepalive"], 25);
	assert_eq!(body["serverConfig"]["dns"], "1.1.1.1, 1.0.0.1");
	assert_eq!(body["serverConfig"]["allowedIPs"], "0.0.0.0/0, ::/0");
	assert_eq!(body["serverApplied"], false);
	assert!(body["serverError"].is_string());

	let psk = body["serverConfig"]["presharedKey"].as_str().unwrap();
	assert_eq!(psk.len(), 44);
	let block = body["serverPeerBlock"].as_str().unwrap();
	assert!(block.contains("\n[Peer]\n# Pixel\n"));
	assert!(block.contains(&format!("PublicKey = {ZERO_KEY}")));
	assert!(block.contains("AllowedIPs = 10.66.66.2/32"));
}

#[tokio::test]
async fn test_sequential_registrations_increment_address() {
	let app = setup_test_app();

	let (_, first) = send(
		&app,
		register_request(json!({"name": "a", "publicKey": ZERO_KEY})),
	)
	.await;
	let (_, second) = send(
		&app,
		register_request(json!({"name": "b", "publicKey": ONES_KEY})),
	)
	.await;

	assert_eq!(first["peer"]["assignedIP"], "10.66.66.2/32");
	assert_eq!(second["peer"]["assignedIP"], "10.66.66.3/32");
	assert_ne!(
		first["serverConfig"]["presharedKey"],
		second["serverConfig"]["presharedKey"]
	);
}

#[tokio::test]
async fn test_duplicate_key_is_conflict() {
	let app = setup_test_app();
	send(
		&app,
		register_request(json!({"name": "Pixel", "publicKey": ZERO_KEY})),
	)
	.await;

	let (status, body) = send(
		&app,
		register_request(json!({"name": "Other", "publicKey": ZERO_KEY})),
	)
	.await;
	assert_eq!(status, StatusCode::CONFLICT);
	assert_eq!(body["error"], "Peer with this public key already exists");

	let (_, list) = send(&app, get_request("/api/peers")).await;
	assert_eq!(list["count"], 1);
	assert_eq!(list["peers"][0]["name"], "Pixel");
}

#[tokio::test]
async fn test_invalid_requests_are_bad_request() {
	let app = setup_test_app();

	let cases = [
		(json!({"name": "  ", "publicKey": ZERO_KEY}), "Peer name is required"),
		(json!({"publicKey": ZERO_KEY}), "Peer name is required"),
		(
			json!({"name": "Pixel"}),
			"Client public key (base64) is required",
		),
		(
			json!({"name": "Pixel", "publicKey": "c2hvcnQ="}),
			"Invalid public key: must be 32 bytes (Curve25519)",
		),
		(json!({"name": 5, "publicKey": ZERO_KEY}), "Peer name is required"),
		(
			json!({"name": "Pixel", "publicKey": {"key": ZERO_KEY}}),
			"Client public key (base64) is required",
		),
	];

	for (request, message) in cases {
		let (status, body) = send(&app, register_request(request)).await;
		assert_eq!(status, StatusCode::BAD_REQUEST);
		assert_eq!(body["error"], message);
	}

	let malformed = Request::builder()
		.method("POST")
		.uri("/api/peers")
		.header("content-type", "application/json")
		.body(Body::from("{not json"))
		.unwrap();
	let (status, body) = send(&app, malformed).await;
	assert_eq!(status, StatusCode::BAD_REQUEST);
	assert_eq!(body["error"], "Invalid request body");

	// nothing was allocated by the rejected requests
	let (_, body) = send(
		&app,
		register_request(json!({"name": "Pixel", "publicKey": ZERO_KEY})),
	)
	.await;
	assert_eq!(body["peer"]["assignedIP"], "10.66.66.2/32");
}

// ============================================================================
// Listing and revocation
// ============================================================================

#[tokio::test]
async fn test_list_never_exposes_preshared_keys() {
	let app = setup_test_app();
	send(
		&app,
		register_request(json!({"name": "Pixel", "publicKey": ZERO_KEY})),
	)
	.await;

	let (status, body) = send(&app, get_request("/api/peers")).await;
	assert_eq!(status, StatusCode::OK);
	assert_eq!(body["count"], 1);
	let peer = &body["peers"][0];
	assert_eq!(peer["publicKey"], ZERO_KEY);
	assert_eq!(peer["assignedIP"], "10.66.66.2/32");
	assert!(peer["createdAt"].is_string());
	assert!(!body.to_string().contains("presharedKey"));
}

#[tokio::test]
async fn test_revoke_drops_count_and_second_revoke_is_not_found() {
	let app = setup_test_app();
	send(
		&app,
		register_request(json!({"name": "a", "publicKey": ZERO_KEY})),
	)
	.await;
	send(
		&app,
		register_request(json!({"name": "b", "publicKey": SLASHY_KEY})),
	)
	.await;

	let (status, body) = send(&app, revoke_request(SLASHY_KEY)).await;
	assert_eq!(status, StatusCode::OK);
	assert_eq!(body["message"], "Peer \"b\" revoked");
	assert_eq!(body["removedPeer"]["publicKey"], SLASHY_KEY);
	assert_eq!(body["removedPeer"]["assignedIP"], "10.66.66.3/32");
	assert_eq!(body["serverRemoved"], false);
	assert_eq!(
		body["serverAction"],
		format!("Run on server: wg set wg0 peer {SLASHY_KEY} remove")
	);

	let (_, list) = send(&app, get_request("/api/peers")).await;
	assert_eq!(list["count"], 1);

	let (status, body) = send(&app, revoke_request(SLASHY_KEY)).await;
	assert_eq!(status, StatusCode::NOT_FOUND);
	assert_eq!(body["error"], "Peer not found");

	let (_, list) = send(&app, get_request("/api/peers")).await;
	assert_eq!(list["count"], 1);
}

// ============================================================================
// Live reconciliation
// ============================================================================

#[tokio::test]
async fn test_reconciling_app_reports_applied_and_removed() {
	let (app, endpoint) = setup_reconciling_app();

	let (status, body) = send(
		&app,
		register_request(json!({"name": "Pixel", "publicKey": ZERO_KEY})),
	)
	.await;
	assert_eq!(status, StatusCode::CREATED);
	assert_eq!(body["serverApplied"], true);
	assert!(body.get("serverError").is_none());

	let (_, body) = send(&app, revoke_request(ZERO_KEY)).await;
	assert_eq!(body["serverRemoved"], true);
	assert!(body.get("serverAction").is_none());

	let scripts = endpoint.scripts.lock().unwrap().clone();
	assert_eq!(scripts.len(), 2);
	assert!(scripts[0].contains("allowed-ips 10.66.66.2/32"));
	assert!(scripts[1].contains(&format!("wg set wg0 peer '{ZERO_KEY}' remove")));
}

#[tokio::test]
async fn test_sync_requires_reconciliation() {
	let app = setup_test_app();
	let request = Request::builder()
		.method("POST")
		.uri("/api/peers/sync")
		.body(Body::empty())
		.unwrap();
	let (status, _) = send(&app, request).await;
	assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

	let (app, endpoint) = setup_reconciling_app();
	send(
		&app,
		register_request(json!({"name": "Pixel", "publicKey": ZERO_KEY})),
	)
	.await;
	let request = Request::builder()
		.method("POST")
		.uri("/api/peers/sync")
		.body(Body::empty())
		.unwrap();
	let (status, body) = send(&app, request).await;
	assert_eq!(status, StatusCode::OK);
	assert_eq!(body["applied"], 1);
	assert_eq!(body["failed"], 0);
	assert_eq!(endpoint.scripts.lock().unwrap().len(), 2);
}
