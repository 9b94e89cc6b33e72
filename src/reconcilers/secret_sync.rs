// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! SecretSync reconciler - keeps copies of a source secret in every target namespace.
//!
//! One pass fetches the SecretSync, then either cleans up (deletion in progress),
//! adds the finalizer, or validates, syncs and reports status. Every write is safe to
//! repeat, so a pass interrupted anywhere is completed by the next one.

use crate::config::Config;
use crate::constants::FINALIZER;
use crate::error::{Result, SecretSyncError, SyncErrors};
use crate::kubernetes::Store;
use crate::reconcilers::finalizer::{ensure_finalizer, remove_finalizer};
use crate::reconcilers::status::{report_status, SyncOutcome};
use crate::sync::{
    delete_managed_copies, prune_stale_copies, sync_secret_to_namespaces, OwnershipMarkers,
    SharedSourceIndex, WatchMapper,
};
use crate::types::{PolicyRef, SecretSync};
use futures::StreamExt;
use k8s_openapi::api::core::v1::Secret;
use kube::{
    runtime::{controller::Action, Controller},
    Api, Client,
};
use kube_runtime::watcher::Config as WatcherConfig;
use std::fmt;
use std::sync::{Arc, PoisonError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Shared state handed to every reconcile
pub struct Context {
    store: Arc<dyn Store>,
    markers: OwnershipMarkers,
    index: SharedSourceIndex,
    finalizer: String,
    retry_delay: Duration,
    resync_interval: Option<Duration>,
    cancel: CancellationToken,
}

impl Context {
    pub fn new(
        store: Arc<dyn Store>,
        config: &Config,
        index: SharedSourceIndex,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            store,
            markers: OwnershipMarkers::from_config(config),
            index,
            finalizer: FINALIZER.to_string(),
            retry_delay: config.retry_delay,
            resync_interval: config.resync_interval,
            cancel,
        }
    }

    pub fn index(&self) -> &SharedSourceIndex {
        &self.index
    }

    /// Load every SecretSync into the source index
    pub async fn rebuild_index(&self) -> Result<usize> {
        let policies = self.store.list_policies().await?;
        let mut index = self.index.write().unwrap_or_else(PoisonError::into_inner);
        index.rebuild(&policies);
        Ok(index.len())
    }

    fn remember(&self, policy: &SecretSync) {
        self.index
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .upsert(policy);
    }

    fn forget(&self, key: &PolicyRef) {
        self.index
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }

    fn retry(&self) -> Action {
        Action::requeue(self.retry_delay)
    }

    fn after_success(&self) -> Action {
        self.resync_interval
            .map(Action::requeue)
            .unwrap_or_else(Action::await_change)
    }

    /// Persist the status, then return `next`. A failed status write is retried.
    async fn report(
        &self,
        policy: &SecretSync,
        message: &str,
        outcome: SyncOutcome,
        next: Action,
    ) -> Action {
        match report_status(self.store.as_ref(), policy, message, outcome).await {
            Ok(()) => next,
            Err(e) => {
                warn!("Failed to update status: {}", e);
                self.retry()
            }
        }
    }

    /// Run one reconcile pass for the SecretSync identified by `key`
    #[instrument(skip(self, key), fields(policy = %key))]
    pub async fn reconcile_policy(&self, key: &PolicyRef) -> Result<Action> {
        let Some(mut policy) = self.store.get_policy(key).await? else {
            info!("SecretSync not found, it might have been deleted");
            self.forget(key);
            return Ok(Action::await_change());
        };

        if policy.is_deleting() {
            return self.finalize(policy, key).await;
        }

        self.remember(&policy);

        if ensure_finalizer(&mut policy, &self.finalizer) {
            self.store.update_policy(&policy).await?;
            info!("Finalizer added");
            return Ok(Action::requeue(Duration::ZERO));
        }

        if let Err(e) = policy.validate() {
            warn!("Invalid SecretSync: {}", e);
            let next = Action::await_change();
            return Ok(self
                .report(&policy, &e.to_string(), SyncOutcome::Failed, next)
                .await);
        }

        let spec = &policy.spec;
        let source = match self.fetch_source(&policy).await {
            Ok(source) => source,
            Err(e) => {
                warn!("{}", e);
                return Ok(self
                    .report(&policy, &e.to_string(), SyncOutcome::Failed, self.retry())
                    .await);
            }
        };

        let targets = spec.targets();
        let mut failures = PassFailures::default();

        if let Some(summary) = failures.absorb(
            sync_secret_to_namespaces(
                self.store.as_ref(),
                &self.markers,
                key,
                &source,
                &targets,
                &self.cancel,
            )
            .await,
        )? {
            debug!(
                written = summary.written.len(),
                unchanged = summary.unchanged.len(),
                "Sync pass complete"
            );
        }

        if let Some(pruned) = failures.absorb(
            prune_stale_copies(
                self.store.as_ref(),
                &self.markers,
                key,
                Some(&spec.source_name),
                &targets,
                &self.cancel,
            )
            .await,
        )? {
            if !pruned.is_empty() {
                info!("Pruned copies no longer targeted: {}", pruned.join(","));
            }
        }

        if !failures.is_empty() {
            let msg = format!("failed to sync secret {}: {}", spec.source_name, failures);
            warn!("{}", msg);
            return Ok(self
                .report(&policy, &msg, SyncOutcome::Failed, self.retry())
                .await);
        }

        let msg = format!(
            "successfully synced secret {} to namespaces: {}",
            spec.source_name,
            targets.join(",")
        );
        info!("{}", msg);
        Ok(self
            .report(&policy, &msg, SyncOutcome::Succeeded, self.after_success())
            .await)
    }

    /// Read the source secret. Absence and read errors are both `SourceUnavailable`.
    async fn fetch_source(&self, policy: &SecretSync) -> Result<Secret> {
        let spec = &policy.spec;
        match self
            .store
            .get_secret(&spec.source_namespace, &spec.source_name)
            .await
        {
            Ok(Some(source)) => Ok(source),
            Ok(None) => Err(SecretSyncError::SourceUnavailable(format!(
                "source secret {} not found in namespace {}",
                spec.source_name, spec.source_namespace
            ))),
            Err(e) => Err(SecretSyncError::SourceUnavailable(format!(
                "error reading source secret {} in namespace {}: {}",
                spec.source_name, spec.source_namespace, e
            ))),
        }
    }

    /// Delete every copy, then release the finalizer. The finalizer stays until all
    /// copies are confirmed gone.
    async fn finalize(&self, mut policy: SecretSync, key: &PolicyRef) -> Result<Action> {
        info!("Deleting copies of SecretSync");
        let mut failures = PassFailures::default();

        if let Some(deleted) = failures.absorb(
            delete_managed_copies(
                self.store.as_ref(),
                &self.markers,
                key,
                &policy.spec.source_name,
                &policy.spec.targets(),
                &self.cancel,
            )
            .await,
        )? {
            debug!(deleted, "Target copies deleted");
        }

        failures.absorb(
            prune_stale_copies(
                self.store.as_ref(),
                &self.markers,
                key,
                None,
                &[],
                &self.cancel,
            )
            .await,
        )?;

        if !failures.is_empty() {
            let msg = format!("failed to delete child objects: {}", failures);
            warn!("{}", msg);
            return Ok(self
                .report(&policy, &msg, SyncOutcome::Failed, self.retry())
                .await);
        }

        if let Err(e) = remove_finalizer(&mut policy, &self.finalizer) {
            error!("{}", e);
            return Ok(self
                .report(&policy, &e.to_string(), SyncOutcome::Failed, self.retry())
                .await);
        }

        if let Err(e) = self.store.update_policy(&policy).await {
            warn!("Failed to persist finalizer removal: {}", e);
            return Ok(self.retry());
        }

        self.forget(key);
        info!("Copies deleted and finalizer removed");
        Ok(Action::await_change())
    }
}

/// Failures collected across the steps of one pass
#[derive(Debug, Default)]
struct PassFailures {
    per_namespace: SyncErrors,
    general: Vec<String>,
}

impl PassFailures {
    /// Record a step's failure and carry on; cancellation aborts the pass
    fn absorb<T>(&mut self, result: Result<T>) -> Result<Option<T>> {
        match result {
            Ok(v) => Ok(Some(v)),
            Err(SecretSyncError::Sync(errors)) => {
                self.per_namespace.extend(errors);
                Ok(None)
            }
            Err(SecretSyncError::Cancelled) => Err(SecretSyncError::Cancelled),
            Err(e) => {
                self.general.push(e.to_string());
                Ok(None)
            }
        }
    }

    fn is_empty(&self) -> bool {
        self.per_namespace.is_empty() && self.general.is_empty()
    }
}

impl fmt::Display for PassFailures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts: Vec<String> = Vec::new();
        if !self.per_namespace.is_empty() {
            parts.push(self.per_namespace.to_string());
        }
        parts.extend(self.general.iter().cloned());
        f.write_str(&parts.join("; "))
    }
}

pub async fn reconcile(policy: Arc<SecretSync>, ctx: Arc<Context>) -> Result<Action> {
    ctx.reconcile_policy(&PolicyRef::from_policy(&policy)).await
}

pub fn error_policy(policy: Arc<SecretSync>, error: &SecretSyncError, ctx: Arc<Context>) -> Action {
    error!(
        policy = %PolicyRef::from_policy(&policy),
        transient = error.is_transient(),
        "Reconciliation error: {}", error
    );
    ctx.retry()
}

pub struct SecretSyncReconciler {
    client: Client,
    config: Config,
    context: Context,
}

impl SecretSyncReconciler {
    pub fn new(client: Client, config: Config, context: Context) -> Self {
        Self {
            client,
            config,
            context,
        }
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let indexed = self.context.rebuild_index().await?;
        info!("Indexed {} SecretSync(s) by source secret", indexed);

        let policies: Api<SecretSync> = match &self.config.watch_namespace {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        };
        let secrets: Api<Secret> = Api::all(self.client.clone());
        let mapper = WatchMapper::new(self.context.index().clone());
        let context = Arc::new(self.context);

        Controller::new(policies, WatcherConfig::default())
            .watches(secrets, WatcherConfig::default(), move |secret| {
                mapper.map_secret(&secret)
            })
            .shutdown_on_signal()
            .run(reconcile, error_policy, context)
            .for_each(|res| async move {
                match res {
                    Ok((obj, _)) => debug!("Reconciled SecretSync: {}", obj),
                    Err(e) => warn!("Reconciliation error: {:?}", e),
                }
            })
            .await;

        Ok(())
    }
}
