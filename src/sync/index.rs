// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Reverse index from source secrets to the SecretSyncs that copy them.

use crate::types::{PolicyRef, SecretSync};
use k8s_openapi::api::core::v1::Secret;
use kube::runtime::reflector::ObjectRef;
use kube::ResourceExt;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;

/// Index key for a source secret
pub fn source_key(name: &str, namespace: &str) -> String {
    format!("{name}/{namespace}")
}

/// Inverted map `"name/namespace"` of a source secret to every SecretSync referencing it
#[derive(Debug, Default)]
pub struct SourceIndex {
    by_source: HashMap<String, BTreeSet<PolicyRef>>,
    by_policy: HashMap<PolicyRef, String>,
}

pub type SharedSourceIndex = Arc<RwLock<SourceIndex>>;

impl SourceIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedSourceIndex {
        Arc::new(RwLock::new(Self::new()))
    }

    /// Replace the whole index with the references held by `policies`
    pub fn rebuild(&mut self, policies: &[SecretSync]) {
        self.by_source.clear();
        self.by_policy.clear();
        for policy in policies {
            self.upsert(policy);
        }
    }

    /// Record the source `policy` currently references, dropping any previous one
    pub fn upsert(&mut self, policy: &SecretSync) {
        let policy_ref = PolicyRef::from_policy(policy);
        let key = source_key(&policy.spec.source_name, &policy.spec.source_namespace);

        if self.by_policy.get(&policy_ref) == Some(&key) {
            return;
        }

        self.remove(&policy_ref);
        self.by_source
            .entry(key.clone())
            .or_default()
            .insert(policy_ref.clone());
        self.by_policy.insert(policy_ref, key);
    }

    pub fn remove(&mut self, policy: &PolicyRef) {
        let Some(key) = self.by_policy.remove(policy) else {
            return;
        };
        if let Some(refs) = self.by_source.get_mut(&key) {
            refs.remove(policy);
            if refs.is_empty() {
                self.by_source.remove(&key);
            }
        }
    }

    /// SecretSyncs referencing the secret `namespace/name`, in sorted order
    pub fn lookup(&self, name: &str, namespace: &str) -> Vec<PolicyRef> {
        self.by_source
            .get(&source_key(name, namespace))
            .map(|refs| refs.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.by_policy.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_policy.is_empty()
    }
}

/// Linear scan equivalent of [`SourceIndex::lookup`], kept as a reference for the index
pub fn scan_matching(policies: &[SecretSync], name: &str, namespace: &str) -> Vec<PolicyRef> {
    let mut refs: Vec<PolicyRef> = policies
        .iter()
        .filter(|p| p.spec.source_name == name && p.spec.source_namespace == namespace)
        .map(PolicyRef::from_policy)
        .collect();
    refs.sort();
    refs.dedup();
    refs
}

/// Turns source secret changes into the SecretSync keys to reconcile.
/// SecretSync changes need no mapping, the controller's primary watch keys them directly.
#[derive(Debug, Clone)]
pub struct WatchMapper {
    index: SharedSourceIndex,
}

impl WatchMapper {
    pub fn new(index: SharedSourceIndex) -> Self {
        Self { index }
    }

    /// SecretSyncs to reconcile after the secret `namespace/name` changed
    pub fn map_source(&self, name: &str, namespace: &str) -> Vec<PolicyRef> {
        self.index
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .lookup(name, namespace)
    }

    /// Mapper for the Secret watch of the controller
    pub fn map_secret(&self, secret: &Secret) -> Vec<ObjectRef<SecretSync>> {
        let name = secret.name_any();
        let namespace = secret.namespace().unwrap_or_default();
        let refs = self.map_source(&name, &namespace);
        if !refs.is_empty() {
            debug!(
                "Secret {}/{} changed, requeueing {} SecretSync(s)",
                namespace,
                name,
                refs.len()
            );
        }
        refs.iter().map(PolicyRef::to_object_ref).collect()
    }
}
