// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use crate::constants::{condition, markers};
use crate::error::{Result, SecretSyncError};
use kube::{runtime::reflector::ObjectRef, CustomResource, ResourceExt};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, PartialEq, schemars::JsonSchema)]
#[kube(group = "secretsync.geeko.me", version = "v1alpha1", kind = "SecretSync")]
#[kube(namespaced)]
#[kube(status = "SecretSyncStatus")]
#[kube(shortname = "ssync")]
#[kube(printcolumn = r#"{"name":"Source","type":"string","jsonPath":".spec.sourceName"}"#)]
#[kube(printcolumn = r#"{"name":"Synced","type":"string","jsonPath":".status.conditions[0].status"}"#)]
#[kube(printcolumn = r#"{"name":"Last Sync","type":"date","jsonPath":".status.lastSyncTime"}"#)]
#[serde(rename_all = "camelCase")]
pub struct SecretSyncSpec {
    /// Name of the Secret to copy
    #[schemars(length(min = 1))]
    pub source_name: String,
    /// Namespace the Secret is read from
    #[schemars(length(min = 1))]
    pub source_namespace: String,
    /// Namespaces the Secret is copied into
    #[schemars(length(min = 1))]
    pub target_namespaces: Vec<String>,
}

impl SecretSyncSpec {
    /// Reject specs that cannot be synced without an edit by the user
    pub fn validate(&self) -> Result<()> {
        if self.source_name.is_empty() {
            return Err(SecretSyncError::Validation(
                "sourceName must not be empty".to_string(),
            ));
        }
        if self.source_namespace.is_empty() {
            return Err(SecretSyncError::Validation(
                "sourceNamespace must not be empty".to_string(),
            ));
        }
        if self.target_namespaces.is_empty() {
            return Err(SecretSyncError::Validation(
                "targetNamespaces must contain at least one namespace".to_string(),
            ));
        }
        if self.target_namespaces.iter().any(|ns| ns.is_empty()) {
            return Err(SecretSyncError::Validation(
                "targetNamespaces must not contain empty namespace names".to_string(),
            ));
        }
        if self.target_namespaces.contains(&self.source_namespace) {
            return Err(SecretSyncError::Validation(format!(
                "the sourceNamespace {} is in the targetNamespaces list {}, please remove this",
                self.source_namespace,
                self.target_namespaces.join(",")
            )));
        }
        Ok(())
    }

    /// Target namespaces without duplicates, first occurrence wins
    pub fn targets(&self) -> Vec<String> {
        let mut targets: Vec<String> = Vec::with_capacity(self.target_namespaces.len());
        for ns in &self.target_namespaces {
            if !targets.contains(ns) {
                targets.push(ns.clone());
            }
        }
        targets
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SecretSyncStatus {
    /// RFC 3339 time of the last reconcile that reported status
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_sync_time: Option<String>,
    /// Holds at most one `Synced` condition
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

impl SecretSyncStatus {
    pub fn synced_condition(&self) -> Option<&Condition> {
        self.conditions
            .iter()
            .find(|c| c.condition_type == condition::SYNCED)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub condition_type: String,
    pub status: String,
    pub reason: String,
    pub message: String,
    pub last_transition_time: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

impl Condition {
    pub fn is_true(&self) -> bool {
        self.status == condition::TRUE
    }
}

impl SecretSync {
    /// Validate the spec, and that the name and namespace fit in the ownership labels
    /// written on every copy
    pub fn validate(&self) -> Result<()> {
        let owner = PolicyRef::from_policy(self);
        for (field, value) in [("name", &owner.name), ("namespace", &owner.namespace)] {
            if value.len() > markers::MAX_LABEL_VALUE_LEN {
                return Err(SecretSyncError::Validation(format!(
                    "the SecretSync {field} {value} is longer than {} characters and cannot be used as a label value",
                    markers::MAX_LABEL_VALUE_LEN
                )));
            }
        }
        self.spec.validate()
    }

    pub fn is_deleting(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    pub fn has_finalizer(&self, finalizer: &str) -> bool {
        self.finalizers().iter().any(|f| f == finalizer)
    }
}

/// Identity of a SecretSync, the key every reconcile runs for
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PolicyRef {
    pub namespace: String,
    pub name: String,
}

impl PolicyRef {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    pub fn from_policy(policy: &SecretSync) -> Self {
        Self::new(policy.namespace().unwrap_or_default(), policy.name_any())
    }

    pub fn to_object_ref(&self) -> ObjectRef<SecretSync> {
        ObjectRef::new(&self.name).within(&self.namespace)
    }
}

impl fmt::Display for PolicyRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}
