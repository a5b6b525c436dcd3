// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

pub mod device;
pub mod peers;

pub use device::{CliContext, DeviceCommands, RegisterArgs, UpArgs};
pub use peers::{PeersCommands, RevokeArgs};
