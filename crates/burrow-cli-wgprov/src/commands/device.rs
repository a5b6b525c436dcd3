// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use burrow_wgprov_common::ProtocolMode;
use chrono::{DateTime, Utc};
use clap::{Args, Subcommand};
use console::style;
use tracing::instrument;
use url::Url;

use crate::client::{ProvisioningClient, DEFAULT_TIMEOUT};
use crate::monitor::{format_bytes, format_rate, LogKind, NetworkMonitor, POLL_INTERVAL};
use crate::permission::RootCheck;
use crate::registration::{ClientRegistrationFlow, KeyMode};
use crate::store::{FileStore, SecureStore};
use crate::tunnel::{TunnelEngine, TunnelState, WgQuickEngine, DEFAULT_INTERFACE};

#[derive(Debug, Subcommand)]
pub enum DeviceCommands {
	/// Register this device with the control plane
	Register(RegisterArgs),
	/// Bring the tunnel up
	Up(UpArgs),
	/// Take the tunnel down
	Down,
	/// Flip the tunnel between up and down
	Toggle,
	/// Show registration and tunnel status
	Status,
	/// Take the tunnel down and delete the local identity
	Forget,
}

#[derive(Debug, Clone, Args)]
pub struct RegisterArgs {
	/// Human-readable name for this device
	#[arg(long)]
	pub name: String,
}

#[derive(Debug, Clone, Args)]
pub struct UpArgs {
	/// Stay in the foreground printing traffic; Ctrl+C takes the tunnel down
	#[arg(long)]
	pub watch: bool,
}

pub struct CliContext {
	pub server_url: Url,
	pub config_dir: PathBuf,
	pub interface: String,
	pub protocol_mode: ProtocolMode,
	pub key_mode: KeyMode,
	pub use_sudo: bool,
	pub timeout: Duration,
}

impl CliContext {
	pub fn new(server_url: Url, config_dir: PathBuf) -> Self {
		Self {
			server_url,
			config_dir,
			interface: DEFAULT_INTERFACE.to_string(),
			protocol_mode: ProtocolMode::default(),
			key_mode: KeyMode::default(),
			use_sudo: false,
			timeout: DEFAULT_TIMEOUT,
		}
	}

	pub fn client(&self) -> crate::error::Result<ProvisioningClient> {
		ProvisioningClient::with_timeout(self.server_url.clone(), self.timeout)
	}

	pub fn engine(&self) -> Arc<dyn TunnelEngine> {
		Arc::new(
			WgQuickEngine::new(&self.interface, self.config_dir.join("tunnels"))
				.with_sudo(self.use_sudo),
		)
	}

	pub async fn flow(&self) -> crate::error::Result<ClientRegistrationFlow> {
		let store: Arc<dyn SecureStore> = Arc::new(FileStore::open(&self.config_dir).await?);
		Ok(ClientRegistrationFlow::new(self.client()?, store, self.engine())
			.with_permission(Arc::new(RootCheck {
				allow_sudo: self.use_sudo,
			}))
			.with_protocol_mode(self.protocol_mode)
			.with_key_mode(self.key_mode))
	}
}

/// `~/.burrow`, or `None` when there is no home directory.
pub fn default_config_dir() -> Option<PathBuf> {
	dirs::home_dir().map(|home| home.join(".burrow"))
}

pub async fn handle_device_command(cmd: DeviceCommands, ctx: &CliContext) -> anyhow::Result<()> {
	match cmd {
		DeviceCommands::Register(args) => handle_register(args, ctx).await,
		DeviceCommands::Up(args) => handle_up(args, ctx).await,
		DeviceCommands::Down => handle_down(ctx).await,
		DeviceCommands::Toggle => handle_toggle(ctx).await,
		DeviceCommands::Status => handle_status(ctx).await,
		DeviceCommands::Forget => handle_forget(ctx).await,
	}
}

#[instrument(skip(ctx))]
pub async fn handle_register(args: RegisterArgs, ctx: &CliContext) -> anyhow::Result<()> {
	let flow = ctx.flow().await?;
	let issued = flow.register_device(&args.name).await?;

	println!("{} Device registered", style("✓").green().bold());
	println!("  Name:     {}", args.name);
	println!("  Address:  {}", style(&issued.assigned_address).cyan());
	println!("  Endpoint: {}", style(&issued.endpoint).cyan());
	println!("  DNS:      {}", style(&issued.dns).dim());
	println!("\nRun 'burrow up' to connect.");

	Ok(())
}

#[instrument(skip(ctx))]
pub async fn handle_up(args: UpArgs, ctx: &CliContext) -> anyhow::Result<()> {
	let flow = ctx.flow().await?;
	flow.set_tunnel(TunnelState::Up).await?;
	print_tunnel_up(&flow).await?;

	if args.watch {
		println!("\nPress Ctrl+C to stop the tunnel...");
		watch_traffic(flow.monitor()).await;

		println!("\n{} Shutting down...", style("→").yellow());
		flow.set_tunnel(TunnelState::Down).await?;
		println!("{} Tunnel stopped", style("✓").green().bold());
	}

	Ok(())
}

#[instrument(skip(ctx))]
pub async fn handle_down(ctx: &CliContext) -> anyhow::Result<()> {
	let flow = ctx.flow().await?;
	if flow.tunnel_state().await? == TunnelState::Down {
		println!("{} No tunnel is running", style("!").yellow().bold());
		return Ok(());
	}

	flow.set_tunnel(TunnelState::Down).await?;
	println!("{} Tunnel stopped", style("✓").green().bold());
	Ok(())
}

#[instrument(skip(ctx))]
pub async fn handle_toggle(ctx: &CliContext) -> anyhow::Result<()> {
	let flow = ctx.flow().await?;
	match flow.toggle_tunnel().await? {
		TunnelState::Up => print_tunnel_up(&flow).await?,
		TunnelState::Down => println!("{} Tunnel stopped", style("✓").green().bold()),
	}
	Ok(())
}

#[instrument(skip(ctx))]
pub async fn handle_status(ctx: &CliContext) -> anyhow::Result<()> {
	let flow = ctx.flow().await?;
	let Some(descriptor) = flow.build_tunnel_descriptor().await? else {
		println!("{} Device is not registered", style("●").dim());
		return Ok(());
	};

	match flow.tunnel_state().await? {
		TunnelState::Up => {
			println!("{} Tunnel is running", style("●").green().bold());
		}
		TunnelState::Down => {
			println!("{} Tunnel is stopped", style("●").red().bold());
		}
	}
	println!("  Interface: {}", style(flow.engine().interface()).cyan());
	println!("  Address:   {}", style(descriptor.address()).cyan());
	println!("  Endpoint:  {}", style(descriptor.endpoint()).cyan());

	if flow.tunnel_state().await? == TunnelState::Up {
		let stats = flow.engine().statistics().await?;
		println!();
		println!("  Received: {}", format_bytes(stats.total_rx()));
		println!("  Sent:     {}", format_bytes(stats.total_tx()));
		println!(
			"  Last handshake: {}",
			style(handshake_text(stats.latest_handshake(), Utc::now())).dim()
		);
	}

	Ok(())
}

#[instrument(skip(ctx))]
pub async fn handle_forget(ctx: &CliContext) -> anyhow::Result<()> {
	let flow = ctx.flow().await?;
	flow.forget().await?;
	println!(
		"{} Local identity and issued configuration removed",
		style("✓").green().bold()
	);
	println!("  The control plane still lists this peer; revoke it with 'burrow peers revoke'.");
	Ok(())
}

async fn print_tunnel_up(flow: &ClientRegistrationFlow) -> anyhow::Result<()> {
	println!("{} Tunnel started", style("✓").green().bold());
	if let Some(descriptor) = flow.build_tunnel_descriptor().await? {
		println!("  Interface: {}", style(flow.engine().interface()).cyan());
		println!("  Address:   {}", style(descriptor.address()).cyan());
		println!("  Endpoint:  {}", style(descriptor.endpoint()).cyan());
	}
	Ok(())
}

async fn watch_traffic(monitor: &NetworkMonitor) {
	let mut ticker = tokio::time::interval(POLL_INTERVAL);
	let mut last_printed: Option<DateTime<Utc>> = None;

	loop {
		tokio::select! {
			_ = tokio::signal::ctrl_c() => break,
			_ = ticker.tick() => {
				for entry in monitor.logs().await {
					if last_printed.is_some_and(|at| entry.at <= at) {
						continue;
					}
					last_printed = Some(entry.at);
					let marker = match entry.kind {
						LogKind::Info => style("•").cyan(),
						LogKind::Traffic => style("•").green(),
						LogKind::Error => style("•").red(),
					};
					println!(
						"  {} {} {}",
						style(entry.at.format("%H:%M:%S")).dim(),
						marker,
						entry.message
					);
				}

				let snapshot = monitor.snapshot().await;
				println!(
					"  {} ↓ {} ({})  ↑ {} ({})  handshake: {}",
					style("≈").dim(),
					format_bytes(snapshot.rx_bytes),
					format_rate(snapshot.rx_rate),
					format_bytes(snapshot.tx_bytes),
					format_rate(snapshot.tx_rate),
					snapshot
						.handshake_age(Utc::now())
						.unwrap_or_else(|| "never".to_string())
				);
			}
		}
	}
}

fn handshake_text(at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
	at.map(|at| crate::monitor::format_handshake_age((now - at).num_seconds()))
		.unwrap_or_else(|| "never".to_string())
}

#[cfg(test)]
mod tests {
	use super::*;
	use clap::Parser;

	#[derive(Parser)]
	struct TestCli {
		#[command(subcommand)]
		cmd: DeviceCommands,
	}

	#[test]
	fn test_register_args_parse() {
		let cli = TestCli::parse_from(["test", "register", "--name", "My Laptop"]);
		match cli.cmd {
			DeviceCommands::Register(args) => assert_eq!(args.name, "My Laptop"),
			_ => panic!("expected Register command"),
		}
	}

	#[test]
	fn test_register_requires_name() {
		assert!(TestCli::try_parse_from(["test", "register"]).is_err());
	}

	#[test]
	fn test_tunnel_commands_parse() {
		let cli = TestCli::parse_from(["test", "up", "--watch"]);
		match cli.cmd {
			DeviceCommands::Up(args) => assert!(args.watch),
			_ => panic!("expected Up command"),
		}

		assert!(matches!(
			TestCli::parse_from(["test", "down"]).cmd,
			DeviceCommands::Down
		));
		assert!(matches!(
			TestCli::parse_from(["test", "toggle"]).cmd,
			DeviceCommands::Toggle
		));
		assert!(matches!(
			TestCli::parse_from(["test", "status"]).cmd,
			DeviceCommands::Status
		));
		assert!(matches!(
			TestCli::parse_from(["test", "forget"]).cmd,
			DeviceCommands::Forget
		));
	}

	#[test]
	fn test_context_defaults() {
		let ctx = CliContext::new(
			Url::parse("http://localhost:3000").unwrap(),
			PathBuf::from("/tmp/burrow-test"),
		);
		assert_eq!(ctx.interface, DEFAULT_INTERFACE);
		assert_eq!(ctx.protocol_mode, ProtocolMode::Structured);
		assert_eq!(ctx.key_mode, KeyMode::ClientGenerated);
		assert_eq!(ctx.timeout, DEFAULT_TIMEOUT);
		assert_eq!(ctx.engine().interface(), DEFAULT_INTERFACE);
	}

	#[tokio::test]
	async fn test_status_for_unregistered_device() {
		let dir = tempfile::tempdir().unwrap();
		let ctx = CliContext::new(
			Url::parse("http://localhost:3000").unwrap(),
			dir.path().to_path_buf(),
		);
		handle_status(&ctx).await.unwrap();
		assert!(ctx.flow().await.unwrap().build_tunnel_descriptor().await.unwrap().is_none());
	}

	#[test]
	fn test_handshake_text() {
		let now = DateTime::from_timestamp(2_000, 0).unwrap();
		assert_eq!(handshake_text(None, now), "never");
		assert_eq!(
			handshake_text(DateTime::from_timestamp(1_990, 0), now),
			"10s ago"
		);
	}
}
