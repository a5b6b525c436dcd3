// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration for burrow-server.
//!
//! Layers are merged lowest precedence first:
//! 1. Built-in defaults
//! 2. Config file (`/etc/burrow/server.toml`)
//! 3. Environment variables (`BURROW_SERVER_*`)
//!
//! ```ignore
//! let config = burrow_server_config::load_config()?;
//! println!("listening on {}", config.socket_addr());
//! ```

pub mod error;
pub mod layer;
pub mod sections;
pub mod sources;

pub use error::ConfigError;
pub use layer::ServerConfigLayer;
pub use sections::*;
pub use sources::{ConfigSource, DefaultsSource, EnvSource, Precedence, TomlSource};

use tracing::{debug, info};

/// Fully resolved server configuration.
#[derive(Debug, Clone, Default)]
pub struct ServerConfig {
	pub http: HttpConfig,
	pub overlay: OverlayConfig,
	/// `None` when reconciliation is disabled.
	pub reconcile: Option<ReconcileConfig>,
	pub logging: LoggingConfig,
}

impl ServerConfig {
	pub fn socket_addr(&self) -> String {
		format!("{}:{}", self.http.host, self.http.port)
	}
}

/// Load configuration from all sources with standard precedence.
pub fn load_config() -> Result<ServerConfig, ConfigError> {
	load_from_sources(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::system()),
		Box::new(EnvSource),
	])
}

/// Load configuration with a custom config file path.
pub fn load_config_with_file(
	config_path: impl Into<std::path::PathBuf>,
) -> Result<ServerConfig, ConfigError> {
	load_from_sources(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::new(config_path)),
		Box::new(EnvSource),
	])
}

pub fn load_from_sources(
	mut sources: Vec<Box<dyn ConfigSource>>,
) -> Result<ServerConfig, ConfigError> {
	sources.sort_by_key(|s| s.precedence());

	let mut merged = ServerConfigLayer::default();
	for source in sources {
		debug!(source = source.name(), "loading configuration source");
		merged.merge(source.load()?);
	}

	finalize(merged)
}

fn finalize(layer: ServerConfigLayer) -> Result<ServerConfig, ConfigError> {
	let http = layer.http.unwrap_or_default().finalize();
	let overlay = layer.overlay.unwrap_or_default().finalize()?;
	let reconcile = layer.reconcile.and_then(|l| l.finalize());
	let logging = layer.logging.unwrap_or_default().finalize();

	validate_config(&overlay, reconcile.as_ref())?;

	info!(
		host = %http.host,
		port = http.port,
		subnet = %overlay.subnet,
		endpoint = %overlay.endpoint,
		response_mode = %overlay.response_mode,
		reconcile_enabled = reconcile.is_some(),
		"Server configuration loaded"
	);

	Ok(ServerConfig {
		http,
		overlay,
		reconcile,
		logging,
	})
}

fn validate_config(
	overlay: &OverlayConfig,
	reconcile: Option<&ReconcileConfig>,
) -> Result<(), ConfigError> {
	if overlay.persistent_keepalive > 3600 {
		return Err(ConfigError::Validation(format!(
			"persistent keepalive of {}s exceeds one hour",
			overlay.persistent_keepalive
		)));
	}

	if let Some(reconcile) = reconcile {
		let name_ok = |s: &str| {
			!s.is_empty()
				&& s
					.chars()
					.all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
		};
		if !name_ok(&reconcile.wg_interface) || !name_ok(&reconcile.wan_interface) {
			return Err(ConfigError::Validation(format!(
				"interface names must be alphanumeric (got '{}' and '{}')",
				reconcile.wg_interface, reconcile.wan_interface
			)));
		}
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	struct FixedSource(&'static str, Precedence);

	impl ConfigSource for FixedSource {
		fn name(&self) -> &'static str {
			"fixed"
		}

		fn precedence(&self) -> Precedence {
			self.1
		}

		fn load(&self) -> Result<ServerConfigLayer, ConfigError> {
			Ok(toml::from_str(self.0).unwrap())
		}
	}

	#[test]
	fn test_socket_addr() {
		let config = ServerConfig::default();
		assert_eq!(config.socket_addr(), "0.0.0.0:3000");
	}

	#[test]
	fn test_higher_precedence_applied_last() {
		let config = load_from_sources(vec![
			Box::new(FixedSource("[http]\nport = 5000", Precedence::Environment)),
			Box::new(FixedSource("[http]\nport = 4000", Precedence::ConfigFile)),
		])
		.unwrap();
		assert_eq!(config.http.port, 5000);
		assert!(config.reconcile.is_none());
	}

	#[test]
	fn test_interface_names_are_validated() {
		let result = load_from_sources(vec![Box::new(FixedSource(
			"[reconcile]\nssh_host = \"h\"\nwg_interface = \"wg0; reboot\"",
			Precedence::ConfigFile,
		))]);
		assert!(matches!(result, Err(ConfigError::Validation(_))));
	}
}
