// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::time::Duration;

use burrow_wgprov_common::{
	ApiErrorBody, HealthResponse, PeerListResponse, RegisterPeerRequest, RegisterPeerResponse,
	RevokePeerResponse, SyncResponse, WgPublicKey,
};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::instrument;
use url::Url;

use crate::error::{CliError, Result};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP client for the burrow control plane.
///
/// Registration takes a [`WgPublicKey`]; there is no way to hand it a
/// private key.
#[derive(Debug, Clone)]
pub struct ProvisioningClient {
	http: Client,
	base_url: Url,
}

impl ProvisioningClient {
	pub fn new(base_url: Url) -> Result<Self> {
		Self::with_timeout(base_url, DEFAULT_TIMEOUT)
	}

	pub fn with_timeout(base_url: Url, timeout: Duration) -> Result<Self> {
		let http = Client::builder()
			.timeout(timeout)
			.user_agent(concat!("burrow/", env!("CARGO_PKG_VERSION")))
			.build()?;
		Ok(Self { http, base_url })
	}

	pub fn base_url(&self) -> &Url {
		&self.base_url
	}

	fn api_url(&self, path: &str) -> Result<Url> {
		Ok(self.base_url.join(path)?)
	}

	#[instrument(skip(self, public_key), fields(public_key = %public_key))]
	pub async fn register(&self, name: &str, public_key: &WgPublicKey) -> Result<RegisterPeerResponse> {
		let url = self.api_url("/api/peers")?;
		let request = RegisterPeerRequest {
			name: name.to_string(),
			public_key: public_key.to_base64(),
		};

		let response = self.http.post(url).json(&request).send().await?;
		decode(response).await
	}

	#[instrument(skip(self))]
	pub async fn list(&self) -> Result<PeerListResponse> {
		let url = self.api_url("/api/peers")?;
		let response = self.http.get(url).send().await?;
		decode(response).await
	}

	/// Revoke by base64 public key. `/` and `+` are percent-encoded into a
	/// single path segment.
	#[instrument(skip(self))]
	pub async fn revoke(&self, public_key: &str) -> Result<RevokePeerResponse> {
		let mut url = self.api_url("/api/peers")?;
		url.path_segments_mut()
			.map_err(|_| CliError::UrlParse(url::ParseError::RelativeUrlWithCannotBeABaseBase))?
			.push(public_key);

		let response = self.http.delete(url).send().await?;
		decode(response).await
	}

	#[instrument(skip(self))]
	pub async fn health(&self) -> Result<HealthResponse> {
		let url = self.api_url("/api/health")?;
		let response = self.http.get(url).send().await?;
		decode(response).await
	}

	#[instrument(skip(self))]
	pub async fn sync(&self) -> Result<SyncResponse> {
		let url = self.api_url("/api/peers/sync")?;
		let response = self.http.post(url).send().await?;
		decode(response).await
	}
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
	let status = response.status();
	if !status.is_success() {
		let text = response.text().await.unwrap_or_default();
		// surface the server's own wording when it sent an error body
		let message = serde_json::from_str::<ApiErrorBody>(&text)
			.map(|body| body.error)
			.unwrap_or(text);
		if status == StatusCode::CONFLICT {
			return Err(CliError::Conflict(message));
		}
		return Err(CliError::Api {
			status: status.as_u16(),
			message,
		});
	}

	let body = response.bytes().await?;
	serde_json::from_slice(&body).map_err(|e| CliError::MalformedResponse(e.to_string()))
}
