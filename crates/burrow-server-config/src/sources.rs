// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration sources: built-in defaults, a TOML file and the environment.

use std::path::PathBuf;

use tracing::{debug, trace};

use crate::error::ConfigError;
use crate::layer::ServerConfigLayer;
use crate::sections::{
	HttpConfigLayer, LoggingConfigLayer, OverlayConfigLayer, ReconcileConfigLayer,
};

/// Source precedence levels (higher = overrides lower).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
	Defaults = 10,
	ConfigFile = 20,
	Environment = 50,
}

pub trait ConfigSource: Send + Sync {
	fn name(&self) -> &'static str;
	fn precedence(&self) -> Precedence;
	fn load(&self) -> Result<ServerConfigLayer, ConfigError>;
}

pub struct DefaultsSource;

impl ConfigSource for DefaultsSource {
	fn name(&self) -> &'static str {
		"defaults"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Defaults
	}

	fn load(&self) -> Result<ServerConfigLayer, ConfigError> {
		debug!("loading defaults");
		Ok(ServerConfigLayer::default())
	}
}

pub struct TomlSource {
	path: PathBuf,
}

impl TomlSource {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}

	pub fn system() -> Self {
		Self::new("/etc/burrow/server.toml")
	}
}

impl ConfigSource for TomlSource {
	fn name(&self) -> &'static str {
		"toml-config"
	}

	fn precedence(&self) -> Precedence {
		Precedence::ConfigFile
	}

	fn load(&self) -> Result<ServerConfigLayer, ConfigError> {
		if !self.path.exists() {
			debug!(path = %self.path.display(), "config file not found, skipping");
			return Ok(ServerConfigLayer::default());
		}

		debug!(path = %self.path.display(), "loading config file");
		let content = std::fs::read_to_string(&self.path).map_err(|e| ConfigError::FileRead {
			path: self.path.clone(),
			source: e,
		})?;

		let layer: ServerConfigLayer =
			toml::from_str(&content).map_err(|e| ConfigError::TomlParse {
				path: self.path.clone(),
				source: e,
			})?;

		trace!("parsed config layer from TOML");
		Ok(layer)
	}
}

/// Environment variable source.
///
/// Convention: BURROW_SERVER_<SECTION>_<FIELD>
pub struct EnvSource;

impl ConfigSource for EnvSource {
	fn name(&self) -> &'static str {
		"environment"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Environment
	}

	fn load(&self) -> Result<ServerConfigLayer, ConfigError> {
		debug!("loading environment variables");
		Ok(ServerConfigLayer {
			http: Some(load_http_from_env()?),
			overlay: Some(load_overlay_from_env()?),
			reconcile: Some(load_reconcile_from_env()?),
			logging: Some(LoggingConfigLayer {
				level: env_var("BURROW_SERVER_LOG_LEVEL"),
			}),
		})
	}
}

fn env_var(name: &str) -> Option<String> {
	std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn env_bool(name: &str) -> Option<bool> {
	env_var(name).map(|v| v.eq_ignore_ascii_case("true") || v == "1")
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Result<Option<T>, ConfigError> {
	match env_var(name) {
		Some(v) => v.parse().map(Some).map_err(|_| ConfigError::InvalidValue {
			key: name.to_string(),
			message: format!("invalid value '{v}'"),
		}),
		None => Ok(None),
	}
}

fn load_http_from_env() -> Result<HttpConfigLayer, ConfigError> {
	Ok(HttpConfigLayer {
		host: env_var("BURROW_SERVER_HOST"),
		port: env_parse("BURROW_SERVER_PORT")?,
	})
}

fn load_overlay_from_env() -> Result<OverlayConfigLayer, ConfigError> {
	Ok(OverlayConfigLayer {
		subnet: env_var("BURROW_SERVER_OVERLAY_SUBNET"),
		server_public_key: env_var("BURROW_SERVER_PUBLIC_KEY"),
		endpoint: env_var("BURROW_SERVER_ENDPOINT"),
		dns: env_var("BURROW_SERVER_DNS"),
		allowed_ips: env_var("BURROW_SERVER_ALLOWED_IPS"),
		persistent_keepalive: env_parse("BURROW_SERVER_PERSISTENT_KEEPALIVE")?,
		response_mode: env_parse("BURROW_SERVER_RESPONSE_MODE")?,
	})
}

fn load_reconcile_from_env() -> Result<ReconcileConfigLayer, ConfigError> {
	Ok(ReconcileConfigLayer {
		ssh_host: env_var("BURROW_SERVER_RECONCILE_SSH_HOST"),
		ssh_user: env_var("BURROW_SERVER_RECONCILE_SSH_USER"),
		ssh_port: env_parse("BURROW_SERVER_RECONCILE_SSH_PORT")?,
		ssh_identity_file: env_var("BURROW_SERVER_RECONCILE_SSH_IDENTITY_FILE").map(PathBuf::from),
		wg_interface: env_var("BURROW_SERVER_RECONCILE_WG_INTERFACE"),
		wan_interface: env_var("BURROW_SERVER_RECONCILE_WAN_INTERFACE"),
		use_sudo: env_bool("BURROW_SERVER_RECONCILE_USE_SUDO"),
		timeout_secs: env_parse("BURROW_SERVER_RECONCILE_TIMEOUT_SECS")?,
	})
}
