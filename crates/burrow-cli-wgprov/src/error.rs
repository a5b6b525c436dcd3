// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use thiserror::Error;

use crate::store::StoreError;
use crate::tunnel::EngineError;

#[derive(Error, Debug)]
pub enum CliError {
	#[error("HTTP request failed: {0}")]
	Transport(#[from] reqwest::Error),

	/// 409 from the control plane, carrying the server's message.
	#[error("{0}")]
	Conflict(String),

	#[error("API error: {status} - {message}")]
	Api { status: u16, message: String },

	#[error("malformed server response: {0}")]
	MalformedResponse(String),

	#[error("device not registered, run 'burrow register' first")]
	NotRegistered,

	#[error("VPN permission denied")]
	PermissionDenied,

	#[error("secure store error: {0}")]
	Store(#[from] StoreError),

	#[error("tunnel engine error: {0}")]
	Engine(#[from] EngineError),

	#[error("key error: {0}")]
	Key(#[from] burrow_wgprov_common::KeyError),

	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),

	#[error("JSON error: {0}")]
	Json(#[from] serde_json::Error),

	#[error("URL parse error: {0}")]
	UrlParse(#[from] url::ParseError),
}

pub type Result<T> = std::result::Result<T, CliError>;
