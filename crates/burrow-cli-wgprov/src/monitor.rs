// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Background polling of tunnel transfer counters.
//!
//! One [`NetworkMonitor`] exists per process ([`NetworkMonitor::global`]).
//! `start` while running is a no-op and `stop` while stopped is harmless, so
//! callers can tie them directly to tunnel up/down transitions.

use std::collections::VecDeque;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::tunnel::{TunnelEngine, TunnelStatistics};

pub const POLL_INTERVAL: Duration = Duration::from_secs(2);
pub const BURST_THRESHOLD_BYTES: u64 = 50_000;
pub const MAX_LOG_ENTRIES: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogKind {
	Info,
	Traffic,
	Error,
}

#[derive(Debug, Clone)]
pub struct LogEntry {
	pub at: DateTime<Utc>,
	pub kind: LogKind,
	pub message: String,
}

/// Latest derived view of the tunnel's traffic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrafficSnapshot {
	pub rx_bytes: u64,
	pub tx_bytes: u64,
	pub rx_rate: u64,
	pub tx_rate: u64,
	pub last_handshake: Option<DateTime<Utc>>,
	pub polls: u64,
}

impl TrafficSnapshot {
	pub fn handshake_age(&self, now: DateTime<Utc>) -> Option<String> {
		self.last_handshake
			.map(|at| format_handshake_age((now - at).num_seconds()))
	}
}

#[derive(Debug, Default)]
struct MonitorState {
	snapshot: TrafficSnapshot,
	previous: Option<(u64, u64)>,
	logs: VecDeque<LogEntry>,
}

impl MonitorState {
	fn log(&mut self, kind: LogKind, message: impl Into<String>) {
		if self.logs.len() == MAX_LOG_ENTRIES {
			self.logs.pop_front();
		}
		self.logs.push_back(LogEntry {
			at: Utc::now(),
			kind,
			message: message.into(),
		});
	}

	fn record(&mut self, stats: &TunnelStatistics, interval: Duration) {
		let rx = stats.total_rx();
		let tx = stats.total_tx();
		let secs = interval.as_secs().max(1);

		if let Some((prev_rx, prev_tx)) = self.previous {
			let rx_delta = rx.saturating_sub(prev_rx);
			let tx_delta = tx.saturating_sub(prev_tx);
			self.snapshot.rx_rate = rx_delta / secs;
			self.snapshot.tx_rate = tx_delta / secs;

			if rx_delta > BURST_THRESHOLD_BYTES {
				self.log(LogKind::Traffic, format!("↓ {} received", format_bytes(rx_delta)));
			}
			if tx_delta > BURST_THRESHOLD_BYTES {
				self.log(LogKind::Traffic, format!("↑ {} sent", format_bytes(tx_delta)));
			}
		}

		self.previous = Some((rx, tx));
		self.snapshot.rx_bytes = rx;
		self.snapshot.tx_bytes = tx;
		if let Some(at) = stats.latest_handshake() {
			self.snapshot.last_handshake = Some(at);
		}
		self.snapshot.polls += 1;
	}
}

struct Running {
	shutdown: watch::Sender<bool>,
	handle: JoinHandle<()>,
}

pub struct NetworkMonitor {
	interval: Duration,
	state: Arc<RwLock<MonitorState>>,
	running: Mutex<Option<Running>>,
}

impl Default for NetworkMonitor {
	fn default() -> Self {
		Self::with_interval(POLL_INTERVAL)
	}
}

impl NetworkMonitor {
	pub fn with_interval(interval: Duration) -> Self {
		Self {
			interval,
			state: Arc::new(RwLock::new(MonitorState::default())),
			running: Mutex::new(None),
		}
	}

	/// The process-wide monitor.
	pub fn global() -> Arc<NetworkMonitor> {
		static GLOBAL: OnceLock<Arc<NetworkMonitor>> = OnceLock::new();
		Arc::clone(GLOBAL.get_or_init(|| Arc::new(NetworkMonitor::default())))
	}

	/// Start polling `engine`. Returns `false` if already running.
	pub async fn start(&self, engine: Arc<dyn TunnelEngine>) -> bool {
		let mut running = self.running.lock().await;
		if running.as_ref().is_some_and(|r| !r.handle.is_finished()) {
			debug!("monitor already running");
			return false;
		}

		{
			let mut state = self.state.write().await;
			state.previous = None;
			state.snapshot.rx_rate = 0;
			state.snapshot.tx_rate = 0;
			state.log(
				LogKind::Info,
				format!("Tunnel {} up, monitoring started", engine.interface()),
			);
		}

		let (shutdown, mut shutdown_rx) = watch::channel(false);
		let state = Arc::clone(&self.state);
		let interval = self.interval;

		let handle = tokio::spawn(async move {
			let mut ticker = tokio::time::interval(interval);
			ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

			loop {
				tokio::select! {
					biased;

					_ = shutdown_rx.changed() => break,

					_ = ticker.tick() => {
						match engine.statistics().await {
							Ok(stats) => state.write().await.record(&stats, interval),
							Err(e) => {
								warn!(error = %e, "statistics poll failed");
								state.write().await.log(LogKind::Error, format!("Monitor: {e}"));
							}
						}
					}
				}
			}
		});

		*running = Some(Running { shutdown, handle });
		info!(interval_ms = interval.as_millis() as u64, "network monitor started");
		true
	}

	/// Stop polling. Returns `false` if nothing was running.
	pub async fn stop(&self) -> bool {
		let Some(running) = self.running.lock().await.take() else {
			return false;
		};
		let _ = running.shutdown.send(true);
		running.handle.abort();
		let _ = running.handle.await;
		self.state
			.write()
			.await
			.log(LogKind::Info, "Monitoring stopped");
		info!("network monitor stopped");
		true
	}

	pub async fn is_running(&self) -> bool {
		self.running
			.lock()
			.await
			.as_ref()
			.is_some_and(|r| !r.handle.is_finished())
	}

	pub async fn snapshot(&self) -> TrafficSnapshot {
		self.state.read().await.snapshot.clone()
	}

	pub async fn logs(&self) -> Vec<LogEntry> {
		self.state.read().await.logs.iter().cloned().collect()
	}

	pub async fn log(&self, kind: LogKind, message: impl Into<String>) {
		self.state.write().await.log(kind, message);
	}
}

pub fn format_handshake_age(secs: i64) -> String {
	match secs {
		s if s < 5 => "Just now".to_string(),
		s if s < 60 => format!("{s}s ago"),
		s => format!("{}m {}s ago", s / 60, s % 60),
	}
}

pub fn format_bytes(bytes: u64) -> String {
	const KB: f64 = 1024.0;
	let b = bytes as f64;
	match bytes {
		n if n < 1024 => format!("{n} B"),
		n if n < 1024 * 1024 => format!("{:.1} KB", b / KB),
		n if n < 1024 * 1024 * 1024 => format!("{:.1} MB", b / (KB * KB)),
		_ => format!("{:.2} GB", b / (KB * KB * KB)),
	}
}

pub fn format_rate(bytes_per_sec: u64) -> String {
	const KB: f64 = 1024.0;
	let b = bytes_per_sec as f64;
	match bytes_per_sec {
		n if n < 1024 => format!("{n} B/s"),
		n if n < 1024 * 1024 => format!("{:.1} KB/s", b / KB),
		_ => format!("{:.1} MB/s", b / (KB * KB)),
	}
}
