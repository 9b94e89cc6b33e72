// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Copying a source secret into target namespaces and cleaning the copies up

use crate::error::{Result, SecretSyncError, SyncErrors};
use crate::kubernetes::Store;
use crate::sync::ownership::OwnershipMarkers;
use crate::types::PolicyRef;
use k8s_openapi::api::core::v1::Secret;
use kube::{api::ObjectMeta, ResourceExt};
use std::collections::BTreeMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

const DEFAULT_SECRET_TYPE: &str = "Opaque";

/// Namespaces touched by a successful sync pass
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncSummary {
    /// Copies created or updated
    pub written: Vec<String>,
    /// Copies already identical to the source
    pub unchanged: Vec<String>,
}

/// Upsert the source secret into every target namespace.
///
/// Each target is checked by the ownership guard first; a refused or failed target is
/// recorded and the remaining targets are still processed. All failures are returned
/// together.
#[instrument(
    skip(store, markers, owner, source, namespaces, cancel),
    fields(policy = %owner, secret = %source.name_any())
)]
pub async fn sync_secret_to_namespaces(
    store: &dyn Store,
    markers: &OwnershipMarkers,
    owner: &PolicyRef,
    source: &Secret,
    namespaces: &[String],
    cancel: &CancellationToken,
) -> Result<SyncSummary> {
    let mut summary = SyncSummary::default();
    let mut errors = SyncErrors::new();

    for namespace in namespaces {
        if cancel.is_cancelled() {
            return Err(SecretSyncError::Cancelled);
        }

        match copy_secret_to_namespace(store, markers, owner, source, namespace).await {
            Ok(true) => summary.written.push(namespace.clone()),
            Ok(false) => summary.unchanged.push(namespace.clone()),
            Err(e) => {
                warn!("Failed to sync secret into namespace {}: {}", namespace, e);
                errors.push(namespace.as_str(), e);
            }
        }
    }

    errors.into_result()?;
    Ok(summary)
}

/// Copy the source into one namespace. Returns whether a write was issued.
async fn copy_secret_to_namespace(
    store: &dyn Store,
    markers: &OwnershipMarkers,
    owner: &PolicyRef,
    source: &Secret,
    namespace: &str,
) -> Result<bool> {
    let name = source.name_any();
    let existing = markers.check(store, namespace, &name, owner).await?;
    let desired = create_managed_copy(source, namespace, markers, owner);

    if existing
        .as_ref()
        .is_some_and(|e| copy_is_current(e, &desired))
    {
        debug!("Copy in namespace {} is up to date", namespace);
        return Ok(false);
    }

    store
        .apply_secret(&desired, &markers.controller_name)
        .await?;

    info!("Synced secret {} into namespace {}", name, namespace);
    Ok(true)
}

/// Build the copy written into `target_namespace`: source payload and type, plus the
/// ownership markers as both labels and annotations
pub fn create_managed_copy(
    source: &Secret,
    target_namespace: &str,
    markers: &OwnershipMarkers,
    owner: &PolicyRef,
) -> Secret {
    let owner_markers = markers.for_owner(owner);

    Secret {
        metadata: ObjectMeta {
            name: source.metadata.name.clone(),
            namespace: Some(target_namespace.to_string()),
            labels: Some(owner_markers.clone()),
            annotations: Some(owner_markers),
            ..Default::default()
        },
        data: source.data.clone(),
        type_: source.type_.clone(),
        ..Default::default()
    }
}

/// Whether `existing` already holds everything `desired` would write
fn copy_is_current(existing: &Secret, desired: &Secret) -> bool {
    let contains_all = |have: &BTreeMap<String, String>, want: &BTreeMap<String, String>| {
        want.iter().all(|(k, v)| have.get(k) == Some(v))
    };
    let no_data = BTreeMap::new();

    existing.data.as_ref().unwrap_or(&no_data) == desired.data.as_ref().unwrap_or(&no_data)
        && existing.type_.as_deref().unwrap_or(DEFAULT_SECRET_TYPE)
            == desired.type_.as_deref().unwrap_or(DEFAULT_SECRET_TYPE)
        && contains_all(existing.labels(), desired.labels())
        && contains_all(existing.annotations(), desired.annotations())
}

/// Delete the copy named `name` from every namespace in `namespaces`.
///
/// Missing copies count as deleted. Copies `owner` does not own are left alone.
#[instrument(skip(store, markers, owner, namespaces, cancel), fields(policy = %owner))]
pub async fn delete_managed_copies(
    store: &dyn Store,
    markers: &OwnershipMarkers,
    owner: &PolicyRef,
    name: &str,
    namespaces: &[String],
    cancel: &CancellationToken,
) -> Result<usize> {
    let mut deleted = 0;
    let mut errors = SyncErrors::new();

    for namespace in namespaces {
        if cancel.is_cancelled() {
            return Err(SecretSyncError::Cancelled);
        }

        match delete_managed_copy(store, markers, owner, namespace, name).await {
            Ok(true) => deleted += 1,
            Ok(false) => {}
            Err(e) => {
                warn!("Failed to delete secret {} in namespace {}: {}", name, namespace, e);
                errors.push(namespace.as_str(), format!("error deleting secret {name}: {e}"));
            }
        }
    }

    errors.into_result()?;
    Ok(deleted)
}

async fn delete_managed_copy(
    store: &dyn Store,
    markers: &OwnershipMarkers,
    owner: &PolicyRef,
    namespace: &str,
    name: &str,
) -> Result<bool> {
    let existing = match markers.check(store, namespace, name, owner).await {
        Ok(existing) => existing,
        Err(SecretSyncError::Ownership(conflict)) => {
            debug!("Not deleting secret we do not own: {}", conflict);
            return Ok(false);
        }
        Err(e) => return Err(e),
    };

    if existing.is_none() {
        debug!("Secret {} already absent from namespace {}", name, namespace);
        return Ok(false);
    }

    let deleted = store.delete_secret(namespace, name).await?;
    if deleted {
        info!("Deleted secret {} from namespace {}", name, namespace);
    }
    Ok(deleted)
}

/// Delete every copy labelled as owned by `owner` that is not `keep_name` in one of
/// `keep_namespaces`.
///
/// This removes copies left behind in namespaces dropped from the target list, and
/// copies named after a previous source. Returns the `namespace/name` of each deletion.
#[instrument(skip(store, markers, owner, keep_namespaces, cancel), fields(policy = %owner))]
pub async fn prune_stale_copies(
    store: &dyn Store,
    markers: &OwnershipMarkers,
    owner: &PolicyRef,
    keep_name: Option<&str>,
    keep_namespaces: &[String],
    cancel: &CancellationToken,
) -> Result<Vec<String>> {
    let managed = store
        .list_secrets_with_labels(&markers.for_owner(owner))
        .await?;

    let mut pruned = Vec::new();
    let mut errors = SyncErrors::new();

    for secret in managed {
        if cancel.is_cancelled() {
            return Err(SecretSyncError::Cancelled);
        }

        let namespace = secret.namespace().unwrap_or_default();
        let name = secret.name_any();
        let wanted = keep_name == Some(name.as_str()) && keep_namespaces.contains(&namespace);
        if wanted {
            continue;
        }

        match delete_managed_copy(store, markers, owner, &namespace, &name).await {
            Ok(true) => {
                info!("Pruned stale copy {}/{}", namespace, name);
                pruned.push(format!("{namespace}/{name}"));
            }
            Ok(false) => {}
            Err(e) => {
                warn!("Failed to prune stale copy {}/{}: {}", namespace, name, e);
                errors.push(namespace, format!("error pruning secret {name}: {e}"));
            }
        }
    }

    errors.into_result()?;
    Ok(pruned)
}
