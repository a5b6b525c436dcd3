// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration layer for merging from multiple sources.

use serde::Deserialize;

use crate::sections::{
	HttpConfigLayer, LoggingConfigLayer, OverlayConfigLayer, ReconcileConfigLayer,
};

/// Server configuration layer - all fields are Option for merging.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerConfigLayer {
	#[serde(default)]
	pub http: Option<HttpConfigLayer>,
	#[serde(default)]
	pub overlay: Option<OverlayConfigLayer>,
	#[serde(default)]
	pub reconcile: Option<ReconcileConfigLayer>,
	#[serde(default)]
	pub logging: Option<LoggingConfigLayer>,
}

impl ServerConfigLayer {
	/// Merge another layer into this one. Other layer takes precedence.
	pub fn merge(&mut self, other: ServerConfigLayer) {
		merge_option(&mut self.http, other.http, HttpConfigLayer::merge);
		merge_option(&mut self.overlay, other.overlay, OverlayConfigLayer::merge);
		merge_option(
			&mut self.reconcile,
			other.reconcile,
			ReconcileConfigLayer::merge,
		);
		merge_option(&mut self.logging, other.logging, LoggingConfigLayer::merge);
	}
}

fn merge_option<T>(base: &mut Option<T>, other: Option<T>, merge: fn(&mut T, T)) {
	match (base.as_mut(), other) {
		(Some(b), Some(o)) => merge(b, o),
		(None, Some(o)) => *base = Some(o),
		_ => {}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_later_layer_wins_per_field() {
		let mut base: ServerConfigLayer = toml::from_str(
			r#"
			[http]
			port = 4000

			[reconcile]
			ssh_host = "wg.internal"
			ssh_user = "ops"
			"#,
		)
		.unwrap();
		let env: ServerConfigLayer = toml::from_str(
			r#"
			[reconcile]
			ssh_user = "root"
			"#,
		)
		.unwrap();

		base.merge(env);

		let reconcile = base.reconcile.unwrap();
		assert_eq!(reconcile.ssh_host.as_deref(), Some("wg.internal"));
		assert_eq!(reconcile.ssh_user.as_deref(), Some("root"));
		assert_eq!(base.http.unwrap().port, Some(4000));
	}
}
