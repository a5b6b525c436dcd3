// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use burrow_wgprov_common::ApiErrorBody;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WgProvError {
	#[error("{0}")]
	InvalidInput(String),

	#[error("Peer with this public key already exists")]
	PeerAlreadyExists,

	#[error("Peer not found")]
	PeerNotFound,

	#[error("overlay address pool exhausted after {capacity} peers")]
	IpPoolExhausted { capacity: u32 },

	#[error("internal error: {0}")]
	Internal(String),
}

pub type Result<T> = std::result::Result<T, WgProvError>;

impl WgProvError {
	pub fn status(&self) -> StatusCode {
		match self {
			WgProvError::InvalidInput(_) => StatusCode::BAD_REQUEST,
			WgProvError::PeerAlreadyExists => StatusCode::CONFLICT,
			WgProvError::PeerNotFound => StatusCode::NOT_FOUND,
			WgProvError::IpPoolExhausted { .. } | WgProvError::Internal(_) => {
				StatusCode::INTERNAL_SERVER_ERROR
			}
		}
	}
}

impl IntoResponse for WgProvError {
	fn into_response(self) -> Response {
		let status = self.status();
		let body = match &self {
			WgProvError::IpPoolExhausted { .. } | WgProvError::Internal(_) => {
				tracing::error!(error = %self, "peer operation failed");
				ApiErrorBody::new("Failed to register peer").with_details(self.to_string())
			}
			_ => ApiErrorBody::new(self.to_string()),
		};
		(status, Json(body)).into_response()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn status_mapping() {
		assert_eq!(
			WgProvError::InvalidInput("x".into()).status(),
			StatusCode::BAD_REQUEST
		);
		assert_eq!(WgProvError::PeerAlreadyExists.status(), StatusCode::CONFLICT);
		assert_eq!(WgProvError::PeerNotFound.status(), StatusCode::NOT_FOUND);
		assert_eq!(
			WgProvError::IpPoolExhausted { capacity: 253 }.status(),
			StatusCode::INTERNAL_SERVER_ERROR
		);
	}

	#[test]
	fn messages_are_client_facing() {
		assert_eq!(
			WgProvError::PeerAlreadyExists.to_string(),
			"Peer with this public key already exists"
		);
		assert_eq!(WgProvError::PeerNotFound.to_string(), "Peer not found");
	}
}
