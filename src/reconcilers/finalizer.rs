// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Adding and removing the cleanup finalizer on a SecretSync.
//! Both functions only edit the object; the caller persists it when they return `true`.

use crate::error::{Result, SecretSyncError};
use crate::types::{PolicyRef, SecretSync};

/// Add `finalizer` unless present. Returns whether the object changed.
pub fn ensure_finalizer(policy: &mut SecretSync, finalizer: &str) -> bool {
    if policy.has_finalizer(finalizer) {
        return false;
    }
    policy
        .metadata
        .finalizers
        .get_or_insert_with(Vec::new)
        .push(finalizer.to_string());
    true
}

/// Remove `finalizer`. A missing finalizer is an error: it means cleanup ran twice.
pub fn remove_finalizer(policy: &mut SecretSync, finalizer: &str) -> Result<bool> {
    if !policy.has_finalizer(finalizer) {
        return Err(SecretSyncError::FinalizerMissing {
            finalizer: finalizer.to_string(),
            policy: PolicyRef::from_policy(policy).to_string(),
        });
    }
    if let Some(finalizers) = policy.metadata.finalizers.as_mut() {
        finalizers.retain(|f| f != finalizer);
    }
    Ok(true)
}
