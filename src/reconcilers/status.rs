// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Writes the single `Synced` condition describing the last reconcile.

use crate::constants::condition;
use crate::error::Result;
use crate::kubernetes::Store;
use crate::types::{Condition, PolicyRef, SecretSync, SecretSyncStatus};
use chrono::{DateTime, SecondsFormat, Utc};
use tracing::debug;

/// Outcome recorded in the `Synced` condition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Succeeded,
    Failed,
}

/// Build the status replacing `previous`. The transition time is carried over when
/// the condition status does not flip.
pub fn build_status(
    previous: Option<&SecretSyncStatus>,
    message: &str,
    outcome: SyncOutcome,
    generation: Option<i64>,
    now: DateTime<Utc>,
) -> SecretSyncStatus {
    let now = now.to_rfc3339_opts(SecondsFormat::Secs, true);
    let (status, reason) = match outcome {
        SyncOutcome::Succeeded => (condition::TRUE, condition::SUCCESS_REASON),
        SyncOutcome::Failed => (condition::FALSE, condition::FAILED_REASON),
    };

    let last_transition_time = previous
        .and_then(SecretSyncStatus::synced_condition)
        .filter(|c| c.status == status)
        .map(|c| c.last_transition_time.clone())
        .unwrap_or_else(|| now.clone());

    SecretSyncStatus {
        last_sync_time: Some(now),
        conditions: vec![Condition {
            condition_type: condition::SYNCED.to_string(),
            status: status.to_string(),
            reason: reason.to_string(),
            message: message.to_string(),
            last_transition_time,
            observed_generation: generation,
        }],
    }
}

/// Replace the status of `policy` with a single condition and persist it
pub async fn report_status(
    store: &dyn Store,
    policy: &SecretSync,
    message: &str,
    outcome: SyncOutcome,
) -> Result<()> {
    let status = build_status(
        policy.status.as_ref(),
        message,
        outcome,
        policy.metadata.generation,
        Utc::now(),
    );
    let key = PolicyRef::from_policy(policy);
    store.patch_policy_status(&key, &status).await?;
    debug!(policy = %key, ?outcome, "Status updated");
    Ok(())
}
