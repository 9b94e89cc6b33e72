// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Kubernetes reconcilers that react to watch events.

pub mod finalizer;
pub mod secret_sync;
pub mod status;

pub use secret_sync::{Context, SecretSyncReconciler};
pub use status::{report_status, SyncOutcome};
