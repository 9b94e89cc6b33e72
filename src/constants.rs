// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

/// Ownership marker keys written as both labels and annotations on every managed copy
pub mod markers {
    /// Identity of the controller that manages the copy
    pub const MANAGED_BY: &str = "app.kubernetes.io/managed-by";
    /// Name of the SecretSync that owns the copy
    pub const OWNER_NAME: &str = "secretsync.geeko.me/owner-name";
    /// Namespace of the SecretSync that owns the copy
    pub const OWNER_NAMESPACE: &str = "secretsync.geeko.me/owner-namespace";
    /// Longest value Kubernetes accepts for a label
    pub const MAX_LABEL_VALUE_LEN: usize = 63;
}

/// Default controller identity, also used as the server-side apply field manager
pub const CONTROLLER_NAME: &str = "secret-sync-controller";

/// Finalizer placed on every SecretSync until its copies are cleaned up
pub const FINALIZER: &str = "secretsync.geeko.me/finalizer";

/// Status condition vocabulary
pub mod condition {
    pub const SYNCED: &str = "Synced";
    pub const SUCCESS_REASON: &str = "SecretSyncedSuccessfully";
    pub const FAILED_REASON: &str = "SecretSyncFailed";
    pub const TRUE: &str = "True";
    pub const FALSE: &str = "False";
}

/// Fixed delay before retrying a transiently failed reconcile
pub const DEFAULT_RETRY_DELAY_SECS: u64 = 300;

/// CRD polling configuration
pub mod crd {
    /// Initial polling interval in seconds when waiting for CRD
    pub const POLL_INTERVAL_SECS: u64 = 10;
    /// Maximum polling interval in seconds (exponential backoff cap)
    pub const POLL_MAX_INTERVAL_SECS: u64 = 60;
}
