// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SecretSyncError {
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    SourceUnavailable(String),

    #[error(transparent)]
    Ownership(#[from] OwnershipConflict),

    #[error(transparent)]
    Sync(#[from] SyncErrors),

    #[error("finalizer {finalizer:?} not found on SecretSync {policy}")]
    FinalizerMissing { finalizer: String, policy: String },

    #[error("reconcile cancelled")]
    Cancelled,
}

impl SecretSyncError {
    /// Whether retrying without a spec change can resolve the error
    pub fn is_transient(&self) -> bool {
        !matches!(self, Self::Validation(_) | Self::Ownership(_))
    }

    /// Whether the error is a Kubernetes 404
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::KubeError(kube::Error::Api(err)) if err.code == 404)
    }
}

/// Reason a managed copy may not be written by the requesting SecretSync
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OwnershipConflict {
    #[error(
        "the secret {name} already exists in namespace {namespace} but has no ownership markers, refusing to adopt it"
    )]
    Unmarked { name: String, namespace: String },

    #[error(
        "the secret {name} already exists in namespace {namespace} and is managed by {managed_by:?}, not by this controller"
    )]
    ForeignController {
        name: String,
        namespace: String,
        managed_by: Option<String>,
    },

    #[error(
        "the secret {name} already exists in namespace {namespace} and is owned by SecretSync {owner}, not by {requester}"
    )]
    ForeignPolicy {
        name: String,
        namespace: String,
        owner: String,
        requester: String,
    },
}

/// A failure scoped to a single target namespace
#[derive(Debug, Clone, PartialEq, Eq)]
struct TargetFailure {
    namespace: String,
    message: String,
}

/// Cumulative per-namespace failures of one sync or cleanup pass.
/// Pushing never discards earlier entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncErrors {
    failures: Vec<TargetFailure>,
}

impl SyncErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, namespace: impl Into<String>, error: impl fmt::Display) {
        self.failures.push(TargetFailure {
            namespace: namespace.into(),
            message: error.to_string(),
        });
    }

    pub fn extend(&mut self, other: SyncErrors) {
        self.failures.extend(other.failures);
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    /// Namespaces that failed, in the order they failed
    pub fn namespaces(&self) -> Vec<&str> {
        self.failures.iter().map(|f| f.namespace.as_str()).collect()
    }

    pub fn into_result(self) -> Result<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(SecretSyncError::Sync(self))
        }
    }
}

impl fmt::Display for SyncErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, failure) in self.failures.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "namespace {}: {}", failure.namespace, failure.message)?;
        }
        Ok(())
    }
}

impl std::error::Error for SyncErrors {}

pub type Result<T> = std::result::Result<T, SecretSyncError>;
