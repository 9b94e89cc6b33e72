// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Ownership markers on managed copies and the guard deciding who may write them.
//!
//! Copies live in other namespaces than their SecretSync, so owner references cannot
//! be used. Instead every copy carries the controller identity and the owning
//! SecretSync's name and namespace, as labels (for selection) and annotations.

use crate::config::Config;
use crate::constants::markers;
use crate::error::{OwnershipConflict, Result};
use crate::kubernetes::Store;
use crate::types::PolicyRef;
use k8s_openapi::api::core::v1::Secret;
use std::collections::BTreeMap;
use tracing::debug;

/// Marker keys and the identity of this controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnershipMarkers {
    pub controller_name: String,
    pub managed_by_key: String,
    pub owner_name_key: String,
    pub owner_namespace_key: String,
}

impl OwnershipMarkers {
    pub fn new(controller_name: impl Into<String>) -> Self {
        Self {
            controller_name: controller_name.into(),
            managed_by_key: markers::MANAGED_BY.to_string(),
            owner_name_key: markers::OWNER_NAME.to_string(),
            owner_namespace_key: markers::OWNER_NAMESPACE.to_string(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.controller_name.clone())
    }

    /// The three markers identifying `owner` as the writer of a copy
    pub fn for_owner(&self, owner: &PolicyRef) -> BTreeMap<String, String> {
        BTreeMap::from([
            (self.managed_by_key.clone(), self.controller_name.clone()),
            (self.owner_name_key.clone(), owner.name.clone()),
            (self.owner_namespace_key.clone(), owner.namespace.clone()),
        ])
    }

    /// Decide whether `owner` may write `existing`, the object currently stored at
    /// `namespace/name`.
    ///
    /// Markers are read from labels and annotations alike. A copy is marked when either
    /// set carries a marker, and every recorded value of a marker must match.
    pub fn evaluate(
        &self,
        existing: Option<&Secret>,
        namespace: &str,
        name: &str,
        owner: &PolicyRef,
    ) -> std::result::Result<(), OwnershipConflict> {
        let Some(existing) = existing else {
            return Ok(());
        };

        let managed_by = recorded(existing, &self.managed_by_key);
        let owner_name = recorded(existing, &self.owner_name_key);
        let owner_namespace = recorded(existing, &self.owner_namespace_key);

        if managed_by.is_empty() && owner_name.is_empty() && owner_namespace.is_empty() {
            return Err(OwnershipConflict::Unmarked {
                name: name.to_string(),
                namespace: namespace.to_string(),
            });
        }

        if !all_equal(&managed_by, &self.controller_name) {
            return Err(OwnershipConflict::ForeignController {
                name: name.to_string(),
                namespace: namespace.to_string(),
                managed_by: mismatch(&managed_by, &self.controller_name).map(str::to_string),
            });
        }

        if !all_equal(&owner_name, &owner.name) || !all_equal(&owner_namespace, &owner.namespace)
        {
            return Err(OwnershipConflict::ForeignPolicy {
                name: name.to_string(),
                namespace: namespace.to_string(),
                owner: format!(
                    "{}/{}",
                    mismatch(&owner_namespace, &owner.namespace).unwrap_or("<unset>"),
                    mismatch(&owner_name, &owner.name).unwrap_or("<unset>")
                ),
                requester: owner.to_string(),
            });
        }

        Ok(())
    }

    /// Fetch the object at `namespace/name` and check `owner` may write it.
    /// On success returns the existing object, if any.
    pub async fn check(
        &self,
        store: &dyn Store,
        namespace: &str,
        name: &str,
        owner: &PolicyRef,
    ) -> Result<Option<Secret>> {
        let existing = store.get_secret(namespace, name).await?;
        self.evaluate(existing.as_ref(), namespace, name, owner)?;
        debug!(
            namespace,
            name,
            exists = existing.is_some(),
            "Copy is writable by {}",
            owner
        );
        Ok(existing)
    }
}

/// Values recorded for `key` in the labels and annotations of `secret`
fn recorded<'a>(secret: &'a Secret, key: &str) -> Vec<&'a str> {
    [
        secret.metadata.labels.as_ref(),
        secret.metadata.annotations.as_ref(),
    ]
    .into_iter()
    .flatten()
    .filter_map(|set| set.get(key).map(String::as_str))
    .collect()
}

fn all_equal(values: &[&str], expected: &str) -> bool {
    !values.is_empty() && values.iter().all(|v| *v == expected)
}

/// The recorded value that differs from `expected`, or the first one if all agree
fn mismatch<'a>(values: &[&'a str], expected: &str) -> Option<&'a str> {
    values
        .iter()
        .find(|v| **v != expected)
        .or_else(|| values.first())
        .copied()
}
