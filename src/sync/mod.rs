// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Secret copying, ownership checks and the source-to-policy index.

pub mod index;
pub mod ownership;
pub mod secrets;

pub use index::{scan_matching, SharedSourceIndex, SourceIndex, WatchMapper};
pub use ownership::OwnershipMarkers;
pub use secrets::{
    create_managed_copy, delete_managed_copies, prune_stale_copies, sync_secret_to_namespaces,
    SyncSummary,
};
