// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! burrow - register this device with a burrow control plane and manage its
//! WireGuard tunnel.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use burrow_cli_wgprov::{
	default_config_dir, handle_device_command, handle_health, handle_peers_command, CliContext,
	DeviceCommands, KeyMode, PeersCommands, DEFAULT_INTERFACE,
};
use burrow_wgprov_common::ProtocolMode;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use url::Url;

#[derive(Parser, Debug)]
#[command(name = "burrow", version, about = "WireGuard peer provisioning client")]
struct Args {
	/// Control plane base URL
	#[arg(
		long,
		global = true,
		env = "BURROW_SERVER_URL",
		default_value = "http://localhost:3000"
	)]
	server_url: String,

	/// Directory for the encrypted store and tunnel config (default ~/.burrow)
	#[arg(long, global = true, env = "BURROW_CONFIG_DIR")]
	config_dir: Option<PathBuf>,

	/// WireGuard interface name
	#[arg(long, global = true, env = "BURROW_INTERFACE", default_value = DEFAULT_INTERFACE)]
	interface: String,

	/// Shape of issued material the control plane sends (structured or embedded)
	#[arg(long, global = true, env = "BURROW_PROTOCOL_MODE", default_value = "structured")]
	protocol_mode: ProtocolMode,

	/// Who generates the device private key
	#[arg(long, global = true, env = "BURROW_KEY_MODE", value_enum, default_value_t = KeyMode::ClientGenerated)]
	key_mode: KeyMode,

	/// Run wg and wg-quick through passwordless sudo
	#[arg(long, global = true, env = "BURROW_SUDO")]
	sudo: bool,

	/// HTTP request timeout in seconds
	#[arg(long, global = true, env = "BURROW_TIMEOUT_SECS", default_value_t = 30)]
	timeout_secs: u64,

	/// Log level when RUST_LOG is unset
	#[arg(long, global = true, env = "BURROW_LOG_LEVEL", default_value = "warn")]
	log_level: String,

	/// Emit logs as JSON
	#[arg(long, global = true, env = "BURROW_LOG_JSON")]
	log_json: bool,

	#[command(subcommand)]
	command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
	#[command(flatten)]
	Device(DeviceCommands),

	/// Check control plane health
	Health,

	/// Manage peers registered with the control plane
	#[command(subcommand)]
	Peers(PeersCommands),
}

#[tokio::main]
async fn main() -> Result<()> {
	dotenvy::dotenv().ok();

	let args = Args::parse();
	init_tracing(&args.log_level, args.log_json);

	let ctx = create_context(&args).await?;

	match args.command {
		Commands::Device(cmd) => handle_device_command(cmd, &ctx).await,
		Commands::Health => handle_health(&ctx).await,
		Commands::Peers(cmd) => handle_peers_command(cmd, &ctx).await,
	}
}

fn init_tracing(level: &str, json: bool) {
	let filter = EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| EnvFilter::new(format!("burrow={level},burrow_cli_wgprov={level}")));

	let registry = tracing_subscriber::registry().with(filter);
	if json {
		registry
			.with(fmt::layer().json().with_writer(std::io::stderr))
			.init();
	} else {
		registry
			.with(fmt::layer().compact().with_writer(std::io::stderr))
			.init();
	}
}

async fn create_context(args: &Args) -> Result<CliContext> {
	let server_url: Url = args.server_url.parse().context("invalid server URL")?;

	let config_dir = match &args.config_dir {
		Some(dir) => dir.clone(),
		None => default_config_dir().context("no home directory; pass --config-dir")?,
	};

	tokio::fs::create_dir_all(&config_dir)
		.await
		.context("failed to create burrow config directory")?;

	let mut ctx = CliContext::new(server_url, config_dir);
	ctx.interface = args.interface.clone();
	ctx.protocol_mode = args.protocol_mode;
	ctx.key_mode = args.key_mode;
	ctx.use_sudo = args.sudo;
	ctx.timeout = Duration::from_secs(args.timeout_secs);
	Ok(ctx)
}

#[cfg(test)]
mod tests {
	use super::*;
	use burrow_cli_wgprov::RegisterArgs;

	#[test]
	fn test_register_parses_with_globals() {
		let args = Args::try_parse_from([
			"burrow",
			"--server-url",
			"https://burrow.example.com",
			"register",
			"--name",
			"laptop",
			"--protocol-mode",
			"embedded",
			"--key-mode",
			"server-issued",
		])
		.unwrap();

		assert_eq!(args.server_url, "https://burrow.example.com");
		assert_eq!(args.protocol_mode, ProtocolMode::Embedded);
		assert_eq!(args.key_mode, KeyMode::ServerIssued);
		match args.command {
			Commands::Device(DeviceCommands::Register(RegisterArgs { name })) => {
				assert_eq!(name, "laptop")
			}
			other => panic!("expected register, got {other:?}"),
		}
	}

	#[test]
	fn test_peers_and_health_parse() {
		let args = Args::try_parse_from(["burrow", "peers", "revoke", "abc="]).unwrap();
		match args.command {
			Commands::Peers(PeersCommands::Revoke(revoke)) => assert_eq!(revoke.public_key, "abc="),
			other => panic!("expected peers revoke, got {other:?}"),
		}

		let args = Args::try_parse_from(["burrow", "health"]).unwrap();
		assert!(matches!(args.command, Commands::Health));
	}

	#[test]
	fn test_unknown_protocol_mode_rejected() {
		assert!(Args::try_parse_from(["burrow", "--protocol-mode", "yaml", "status"]).is_err());
	}

	#[tokio::test]
	async fn test_context_uses_explicit_config_dir() {
		let dir = tempfile::tempdir().unwrap();
		let nested = dir.path().join("state");
		let args = Args::try_parse_from([
			"burrow",
			"--config-dir",
			nested.to_str().unwrap(),
			"--interface",
			"wg-test",
			"--timeout-secs",
			"5",
			"status",
		])
		.unwrap();

		let ctx = create_context(&args).await.unwrap();
		assert!(nested.is_dir());
		assert_eq!(ctx.config_dir, nested);
		assert_eq!(ctx.interface, "wg-test");
		assert_eq!(ctx.timeout, Duration::from_secs(5));
	}

	#[tokio::test]
	async fn test_invalid_server_url_rejected() {
		let args = Args::try_parse_from(["burrow", "--server-url", "not a url", "status"]).unwrap();
		assert!(create_context(&args).await.is_err());
	}
}
