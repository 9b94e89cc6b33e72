// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Kubernetes access: the object store capability and CRD discovery.

pub mod crd;
pub mod store;

pub use crd::wait_for_secretsync_crd;
pub use store::{KubeStore, Store};
