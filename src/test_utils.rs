// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Test utilities: a canned-response Kubernetes API and an in-memory `Store`.

use crate::error::{Result, SecretSyncError};
use crate::kubernetes::Store;
use crate::types::{PolicyRef, SecretSync, SecretSyncSpec, SecretSyncStatus};
use async_trait::async_trait;
use http::{Request, Response};
use http_body_util::BodyExt;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use k8s_openapi::ByteString;
use kube::api::ObjectMeta;
use kube::client::Body;
use kube::error::ErrorResponse;
use kube::{Client, ResourceExt};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tower::Service;
use url::form_urlencoded;

/// A request received by `MockService`
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl RecordedRequest {
    pub fn query_param(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).unwrap()
    }
}

/// A mock HTTP service that returns predefined responses based on request paths,
/// and records every request it receives.
#[derive(Clone)]
pub struct MockService {
    responses: Arc<Mutex<HashMap<(String, String), (u16, String)>>>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl MockService {
    pub fn new() -> Self {
        Self {
            responses: Arc::new(Mutex::new(HashMap::new())),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Add a response for requests with `method` matching the exact path
    pub fn on(self, method: &str, path: &str, status: u16, body: &str) -> Self {
        self.responses.lock().unwrap().insert(
            (method.to_string(), path.to_string()),
            (status, body.to_string()),
        );
        self
    }

    pub fn on_get(self, path: &str, status: u16, body: &str) -> Self {
        self.on("GET", path, status, body)
    }

    pub fn on_delete(self, path: &str, status: u16, body: &str) -> Self {
        self.on("DELETE", path, status, body)
    }

    /// Build a kube Client from this mock service. Clone the service first to keep
    /// access to the recorded requests.
    pub fn into_client(self) -> Client {
        Client::new(self, "default")
    }

    /// Requests received so far, in arrival order
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn find_response(&self, method: &str, path: &str) -> Option<(u16, String)> {
        self.responses
            .lock()
            .unwrap()
            .get(&(method.to_string(), path.to_string()))
            .cloned()
    }
}

impl Default for MockService {
    fn default() -> Self {
        Self::new()
    }
}

impl Service<Request<Body>> for MockService {
    type Response = Response<Body>;
    type Error = tower::BoxError;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = std::result::Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<std::result::Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let (parts, body) = req.into_parts();
        let method = parts.method.to_string();
        let path = parts.uri.path().to_string();
        let query = parts
            .uri
            .query()
            .map(|q| form_urlencoded::parse(q.as_bytes()).into_owned().collect())
            .unwrap_or_default();
        let content_type = parts
            .headers
            .get(http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let (status, response_body) = self
            .find_response(&method, &path)
            .unwrap_or_else(|| (404, not_found_json("resource", &path)));
        let requests = self.requests.clone();

        Box::pin(async move {
            let body = body.collect().await?.to_bytes().to_vec();
            requests.lock().unwrap().push(RecordedRequest {
                method,
                path,
                query,
                content_type,
                body,
            });

            Ok(Response::builder()
                .status(status)
                .header("content-type", "application/json")
                .body(Body::from(response_body.into_bytes()))
                .unwrap())
        })
    }
}

/// Create a mock Secret JSON response
pub fn secret_json(namespace: &str, name: &str) -> String {
    serde_json::json!({
        "apiVersion": "v1",
        "kind": "Secret",
        "metadata": {
            "name": name,
            "namespace": namespace,
            "uid": "test-uid"
        },
        "type": "Opaque",
        "data": { "password": "c2VjcmV0MTIz" }
    })
    .to_string()
}

/// Create a mock SecretSync JSON response
pub fn policy_json(namespace: &str, name: &str) -> String {
    serde_json::json!({
        "apiVersion": "secretsync.geeko.me/v1alpha1",
        "kind": "SecretSync",
        "metadata": {
            "name": name,
            "namespace": namespace,
            "resourceVersion": "8",
            "finalizers": [crate::constants::FINALIZER]
        },
        "spec": {
            "sourceName": "db-credentials",
            "sourceNamespace": "src",
            "targetNamespaces": ["team-a"]
        }
    })
    .to_string()
}

/// Wrap JSON items into a list response of `kind`
pub fn list_json(api_version: &str, kind: &str, items: &[String]) -> String {
    let items: Vec<serde_json::Value> = items
        .iter()
        .map(|i| serde_json::from_str(i).unwrap())
        .collect();
    serde_json::json!({
        "apiVersion": api_version,
        "kind": kind,
        "metadata": { "resourceVersion": "1" },
        "items": items
    })
    .to_string()
}

/// Create a 404 not found response
pub fn not_found_json(resource: &str, name: &str) -> String {
    serde_json::json!({
        "kind": "Status",
        "apiVersion": "v1",
        "status": "Failure",
        "message": format!("{} \"{}\" not found", resource, name),
        "reason": "NotFound",
        "code": 404
    })
    .to_string()
}

pub fn server_error(message: &str) -> SecretSyncError {
    SecretSyncError::KubeError(kube::Error::Api(ErrorResponse {
        status: "Failure".to_string(),
        message: message.to_string(),
        reason: "InternalError".to_string(),
        code: 500,
    }))
}

pub fn make_secret(namespace: &str, name: &str, password: &str) -> Secret {
    Secret {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        data: Some(BTreeMap::from([(
            "password".to_string(),
            ByteString(password.as_bytes().to_vec()),
        )])),
        type_: Some("Opaque".to_string()),
        ..Default::default()
    }
}

pub fn make_policy(
    namespace: &str,
    name: &str,
    source_name: &str,
    source_namespace: &str,
    targets: &[&str],
) -> SecretSync {
    let mut policy = SecretSync::new(
        name,
        SecretSyncSpec {
            source_name: source_name.to_string(),
            source_namespace: source_namespace.to_string(),
            target_namespaces: targets.iter().map(|s| s.to_string()).collect(),
        },
    );
    policy.metadata.namespace = Some(namespace.to_string());
    policy.metadata.generation = Some(1);
    policy
}

/// Mark a policy as being deleted
pub fn mark_deleting(policy: &mut SecretSync) {
    policy.metadata.deletion_timestamp = Some(Time(chrono::Utc::now()));
}

/// Operations of `FakeStore` that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FakeOp {
    GetSecret,
    ApplySecret,
    DeleteSecret,
    ListSecrets,
    GetPolicy,
    UpdatePolicy,
    PatchStatus,
}

#[derive(Debug, Default)]
struct FakeState {
    policies: BTreeMap<(String, String), SecretSync>,
    secrets: BTreeMap<(String, String), Secret>,
    failures: HashSet<(FakeOp, Option<String>)>,
    applies: usize,
    deletes: usize,
    status_patches: usize,
    policy_updates: usize,
}

impl FakeState {
    fn check(&self, op: FakeOp, namespace: &str) -> Result<()> {
        if self.failures.contains(&(op, None))
            || self.failures.contains(&(op, Some(namespace.to_string())))
        {
            return Err(server_error(&format!("injected {op:?} failure in {namespace}")));
        }
        Ok(())
    }
}

/// In-memory `Store` that records writes and can inject failures
#[derive(Debug, Default)]
pub struct FakeStore {
    state: Mutex<FakeState>,
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_policy(&self, policy: SecretSync) {
        let key = (policy.namespace().unwrap_or_default(), policy.name_any());
        self.state.lock().unwrap().policies.insert(key, policy);
    }

    pub fn policy(&self, namespace: &str, name: &str) -> Option<SecretSync> {
        self.state
            .lock()
            .unwrap()
            .policies
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    pub fn insert_secret(&self, secret: Secret) {
        let key = (secret.namespace().unwrap_or_default(), secret.name_any());
        self.state.lock().unwrap().secrets.insert(key, secret);
    }

    pub fn secret(&self, namespace: &str, name: &str) -> Option<Secret> {
        self.state
            .lock()
            .unwrap()
            .secrets
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    /// Make `op` fail, in `namespace` only or everywhere
    pub fn fail(&self, op: FakeOp, namespace: Option<&str>) {
        self.state
            .lock()
            .unwrap()
            .failures
            .insert((op, namespace.map(str::to_string)));
    }

    pub fn heal(&self) {
        self.state.lock().unwrap().failures.clear();
    }

    pub fn applies(&self) -> usize {
        self.state.lock().unwrap().applies
    }

    pub fn deletes(&self) -> usize {
        self.state.lock().unwrap().deletes
    }

    pub fn status_patches(&self) -> usize {
        self.state.lock().unwrap().status_patches
    }

    pub fn policy_updates(&self) -> usize {
        self.state.lock().unwrap().policy_updates
    }
}

#[async_trait]
impl Store for FakeStore {
    async fn get_policy(&self, policy: &PolicyRef) -> Result<Option<SecretSync>> {
        let state = self.state.lock().unwrap();
        state.check(FakeOp::GetPolicy, &policy.namespace)?;
        Ok(state
            .policies
            .get(&(policy.namespace.clone(), policy.name.clone()))
            .cloned())
    }

    async fn list_policies(&self) -> Result<Vec<SecretSync>> {
        Ok(self.state.lock().unwrap().policies.values().cloned().collect())
    }

    async fn update_policy(&self, policy: &SecretSync) -> Result<SecretSync> {
        let mut state = self.state.lock().unwrap();
        let namespace = policy.namespace().unwrap_or_default();
        state.check(FakeOp::UpdatePolicy, &namespace)?;
        let key = (namespace, policy.name_any());
        let Some(stored) = state.policies.get_mut(&key) else {
            return Err(server_error("policy does not exist"));
        };
        // Only metadata and spec go through this path
        stored.metadata = policy.metadata.clone();
        stored.spec = policy.spec.clone();
        let updated = stored.clone();
        // A finalized object whose last finalizer is gone disappears
        if updated.is_deleting() && updated.finalizers().is_empty() {
            state.policies.remove(&key);
        }
        state.policy_updates += 1;
        Ok(updated)
    }

    async fn patch_policy_status(
        &self,
        policy: &PolicyRef,
        status: &SecretSyncStatus,
    ) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.check(FakeOp::PatchStatus, &policy.namespace)?;
        let Some(stored) = state
            .policies
            .get_mut(&(policy.namespace.clone(), policy.name.clone()))
        else {
            return Err(server_error("policy does not exist"));
        };
        stored.status = Some(status.clone());
        state.status_patches += 1;
        Ok(())
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>> {
        let state = self.state.lock().unwrap();
        state.check(FakeOp::GetSecret, namespace)?;
        Ok(state
            .secrets
            .get(&(namespace.to_string(), name.to_string()))
            .cloned())
    }

    async fn apply_secret(&self, secret: &Secret, _field_manager: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let namespace = secret.namespace().unwrap_or_default();
        state.check(FakeOp::ApplySecret, &namespace)?;
        state
            .secrets
            .insert((namespace, secret.name_any()), secret.clone());
        state.applies += 1;
        Ok(())
    }

    async fn delete_secret(&self, namespace: &str, name: &str) -> Result<bool> {
        let mut state = self.state.lock().unwrap();
        state.check(FakeOp::DeleteSecret, namespace)?;
        let removed = state
            .secrets
            .remove(&(namespace.to_string(), name.to_string()))
            .is_some();
        if removed {
            state.deletes += 1;
        }
        Ok(removed)
    }

    async fn list_secrets_with_labels(
        &self,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<Secret>> {
        let state = self.state.lock().unwrap();
        state.check(FakeOp::ListSecrets, "")?;
        Ok(state
            .secrets
            .values()
            .filter(|s| {
                let have = s.labels();
                labels.iter().all(|(k, v)| have.get(k) == Some(v))
            })
            .cloned()
            .collect())
    }
}
