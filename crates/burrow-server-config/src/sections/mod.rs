// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration sections.

mod http;
mod logging;
mod overlay;
mod reconcile;

pub use http::{HttpConfig, HttpConfigLayer};
pub use logging::{LoggingConfig, LoggingConfigLayer};
pub use overlay::{OverlayConfig, OverlayConfigLayer, DEFAULT_SERVER_ENDPOINT, DEFAULT_SERVER_PUBLIC_KEY};
pub use reconcile::{ReconcileConfig, ReconcileConfigLayer};
