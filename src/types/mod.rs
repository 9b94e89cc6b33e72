// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Custom resource types.

pub mod secret_sync;

pub use secret_sync::{Condition, PolicyRef, SecretSync, SecretSyncSpec, SecretSyncStatus};
