// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use burrow_wgprov_common::PeerInfo;
use clap::{Args, Subcommand};
use console::style;
use tracing::instrument;

use crate::commands::device::CliContext;

#[derive(Debug, Subcommand)]
pub enum PeersCommands {
	/// List registered peers
	List,
	/// Revoke a peer by public key
	Revoke(RevokeArgs),
	/// Re-apply every registered peer to the live endpoint
	Sync,
}

#[derive(Debug, Clone, Args)]
pub struct RevokeArgs {
	/// Base64 WireGuard public key of the peer
	pub public_key: String,
}

pub async fn handle_peers_command(cmd: PeersCommands, ctx: &CliContext) -> anyhow::Result<()> {
	match cmd {
		PeersCommands::List => handle_list(ctx).await,
		PeersCommands::Revoke(args) => handle_revoke(args, ctx).await,
		PeersCommands::Sync => handle_sync(ctx).await,
	}
}

#[instrument(skip(ctx))]
pub async fn handle_list(ctx: &CliContext) -> anyhow::Result<()> {
	let client = ctx.client()?;
	let response = client.list().await?;

	if response.peers.is_empty() {
		println!("No peers registered");
		return Ok(());
	}

	println!(
		"{:<20} {:<18} {:<47} {}",
		style("NAME").bold().underlined(),
		style("ADDRESS").bold().underlined(),
		style("PUBLIC KEY").bold().underlined(),
		style("CREATED").bold().underlined()
	);
	for peer in &response.peers {
		print_peer(peer);
	}
	println!("\n{} peer(s)", response.count);

	Ok(())
}

fn print_peer(peer: &PeerInfo) {
	let created = peer.created_at.format("%Y-%m-%d %H:%M").to_string();
	println!(
		"{:<20} {:<18} {:<47} {}",
		peer.name,
		peer.assigned_ip,
		style(&peer.public_key).dim(),
		style(created).dim()
	);
}

#[instrument(skip(ctx))]
pub async fn handle_revoke(args: RevokeArgs, ctx: &CliContext) -> anyhow::Result<()> {
	let client = ctx.client()?;
	let response = client.revoke(&args.public_key).await?;

	println!(
		"{} Peer {} revoked ({})",
		style("✓").green().bold(),
		style(&response.removed_peer.name).cyan(),
		response.removed_peer.assigned_ip
	);
	if let (false, Some(action)) = (response.server_removed, &response.server_action) {
		println!(
			"{} Endpoint not updated. {}",
			style("!").yellow().bold(),
			action
		);
	}

	Ok(())
}

#[instrument(skip(ctx))]
pub async fn handle_sync(ctx: &CliContext) -> anyhow::Result<()> {
	let client = ctx.client()?;
	let response = client.sync().await?;

	if response.failed == 0 {
		println!(
			"{} {} peer(s) applied to the endpoint",
			style("✓").green().bold(),
			response.applied
		);
	} else {
		println!(
			"{} {} applied, {} failed",
			style("!").yellow().bold(),
			response.applied,
			response.failed
		);
		for error in &response.errors {
			println!("  {} {}", style("•").red(), error);
		}
	}

	Ok(())
}

#[instrument(skip(ctx))]
pub async fn handle_health(ctx: &CliContext) -> anyhow::Result<()> {
	let client = ctx.client()?;
	let health = client.health().await?;

	println!(
		"{} {} is {}",
		style("●").green().bold(),
		health.service,
		health.status
	);
	println!("  Active peers:   {}", health.active_peers);
	println!(
		"  Reconciliation: {}",
		if health.reconciliation_enabled {
			style("enabled").green()
		} else {
			style("disabled").yellow()
		}
	);
	println!("  Checked at:     {}", style(health.timestamp.to_rfc3339()).dim());

	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use clap::Parser;
	use serde_json::json;
	use std::path::PathBuf;
	use url::Url;
	use wiremock::matchers::{method, path};
	use wiremock::{Mock, MockServer, ResponseTemplate};

	#[derive(Parser)]
	struct TestCli {
		#[command(subcommand)]
		cmd: PeersCommands,
	}

	#[test]
	fn test_peers_commands_parse() {
		let cli = TestCli::parse_from(["test", "list"]);
		assert!(matches!(cli.cmd, PeersCommands::List));

		let cli = TestCli::parse_from(["test", "sync"]);
		assert!(matches!(cli.cmd, PeersCommands::Sync));

		let cli = TestCli::parse_from([
			"test",
			"revoke",
			"G1ReQCSgRG/MdfF5/SMrcnU+lKQMlwkr9aIA7/ZK5WI=",
		]);
		match cli.cmd {
			PeersCommands::Revoke(args) => {
				assert_eq!(args.public_key, "G1ReQCSgRG/MdfF5/SMrcnU+lKQMlwkr9aIA7/ZK5WI=");
			}
			_ => panic!("expected Revoke command"),
		}
	}

	#[test]
	fn test_revoke_requires_key() {
		assert!(TestCli::try_parse_from(["test", "revoke"]).is_err());
	}

	fn context(server: &MockServer) -> CliContext {
		CliContext::new(
			Url::parse(&server.uri()).unwrap(),
			PathBuf::from("/tmp/burrow-peers-test"),
		)
	}

	#[tokio::test]
	async fn test_list_and_health_against_server() {
		let server = MockServer::start().await;
		Mock::given(method("GET"))
			.and(path("/api/peers"))
			.respond_with(ResponseTemplate::new(200).set_body_json(json!({
				"count": 1,
				"peers": [{
					"name": "Pixel",
					"publicKey": "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=",
					"assignedIP": "10.66.66.2/32",
					"createdAt": "2026-01-03T12:00:00Z"
				}]
			})))
			.expect(1)
			.mount(&server)
			.await;
		Mock::given(method("GET"))
			.and(path("/api/health"))
			.respond_with(ResponseTemplate::new(200).set_body_json(json!({
				"status": "ok",
				"service": "burrow-control-plane",
				"activePeers": 1,
				"reconciliationEnabled": false,
				"timestamp": "2026-01-03T12:00:00Z"
			})))
			.expect(1)
			.mount(&server)
			.await;

		let ctx = context(&server);
		handle_list(&ctx).await.unwrap();
		handle_health(&ctx).await.unwrap();
	}

	#[tokio::test]
	async fn test_sync_surfaces_unavailable_reconciliation() {
		let server = MockServer::start().await;
		Mock::given(method("POST"))
			.and(path("/api/peers/sync"))
			.respond_with(
				ResponseTemplate::new(503)
					.set_body_json(json!({"error": "Reconciliation not configured"})),
			)
			.mount(&server)
			.await;

		let err = handle_sync(&context(&server)).await.unwrap_err();
		assert!(err.to_string().contains("Reconciliation not configured"));
	}
}
