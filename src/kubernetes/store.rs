// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Object store capability used by the reconciler, and its Kubernetes implementation

use crate::error::{Result, SecretSyncError};
use crate::types::{PolicyRef, SecretSync, SecretSyncStatus};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::{
    api::{DeleteParams, ListParams, Patch, PatchParams, PostParams},
    Api, Client, ResourceExt,
};
use std::collections::BTreeMap;
use tracing::{debug, instrument};

/// Reads and writes the reconciler performs against the cluster.
/// Absence is reported as `None`/`false`, never as an error.
#[async_trait]
pub trait Store: Send + Sync {
    async fn get_policy(&self, policy: &PolicyRef) -> Result<Option<SecretSync>>;

    async fn list_policies(&self) -> Result<Vec<SecretSync>>;

    /// Replace the policy object; the resourceVersion it carries guards against lost updates
    async fn update_policy(&self, policy: &SecretSync) -> Result<SecretSync>;

    /// Write the status subresource only
    async fn patch_policy_status(&self, policy: &PolicyRef, status: &SecretSyncStatus)
        -> Result<()>;

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>>;

    /// Server-side apply of a fully specified secret under `field_manager`
    async fn apply_secret(&self, secret: &Secret, field_manager: &str) -> Result<()>;

    /// Returns `false` when there was nothing to delete
    async fn delete_secret(&self, namespace: &str, name: &str) -> Result<bool>;

    /// All secrets, in any namespace, carrying every label in `labels`
    async fn list_secrets_with_labels(&self, labels: &BTreeMap<String, String>)
        -> Result<Vec<Secret>>;
}

/// `Store` backed by the Kubernetes API server
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
    watch_namespace: Option<String>,
}

impl KubeStore {
    pub fn new(client: Client, watch_namespace: Option<String>) -> Self {
        Self {
            client,
            watch_namespace,
        }
    }

    fn policies(&self, namespace: &str) -> Api<SecretSync> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn secrets(&self, namespace: &str) -> Api<Secret> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

/// Render labels as an equality-based label selector
pub fn label_selector(labels: &BTreeMap<String, String>) -> String {
    labels
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",")
}

fn ignore_not_found<T>(result: kube::Result<T>) -> Result<Option<T>> {
    match result.map_err(SecretSyncError::from) {
        Ok(v) => Ok(Some(v)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

#[async_trait]
impl Store for KubeStore {
    async fn get_policy(&self, policy: &PolicyRef) -> Result<Option<SecretSync>> {
        Ok(self.policies(&policy.namespace).get_opt(&policy.name).await?)
    }

    async fn list_policies(&self) -> Result<Vec<SecretSync>> {
        let api: Api<SecretSync> = match &self.watch_namespace {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        };
        Ok(api.list(&ListParams::default()).await?.items)
    }

    #[instrument(skip(self, policy), fields(policy = %PolicyRef::from_policy(policy)))]
    async fn update_policy(&self, policy: &SecretSync) -> Result<SecretSync> {
        let namespace = policy.namespace().unwrap_or_default();
        let updated = self
            .policies(&namespace)
            .replace(&policy.name_any(), &PostParams::default(), policy)
            .await?;
        debug!("SecretSync updated");
        Ok(updated)
    }

    #[instrument(skip(self, status), fields(policy = %policy))]
    async fn patch_policy_status(
        &self,
        policy: &PolicyRef,
        status: &SecretSyncStatus,
    ) -> Result<()> {
        let patch = serde_json::json!({ "status": status });
        self.policies(&policy.namespace)
            .patch_status(&policy.name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>> {
        Ok(self.secrets(namespace).get_opt(name).await?)
    }

    #[instrument(skip(self, secret), fields(secret = %format!("{}/{}", secret.namespace().unwrap_or_default(), secret.name_any())))]
    async fn apply_secret(&self, secret: &Secret, field_manager: &str) -> Result<()> {
        let namespace = secret.namespace().unwrap_or_default();
        let pp = PatchParams::apply(field_manager).force();
        self.secrets(&namespace)
            .patch(&secret.name_any(), &pp, &Patch::Apply(secret))
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_secret(&self, namespace: &str, name: &str) -> Result<bool> {
        let deleted = ignore_not_found(
            self.secrets(namespace)
                .delete(name, &DeleteParams::default())
                .await,
        )?;
        Ok(deleted.is_some())
    }

    async fn list_secrets_with_labels(
        &self,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<Secret>> {
        let secrets: Api<Secret> = Api::all(self.client.clone());
        let lp = ListParams::default().labels(&label_selector(labels));
        Ok(secrets.list(&lp).await?.items)
    }
}
