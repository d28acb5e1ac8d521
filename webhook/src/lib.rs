/*
Copyright 2024 The Kubernetes Authors.

Licensed under the Apache License, Version 2.0 (the "License");
you may not use this file except in compliance with the License.
You may obtain a copy of the License at

    http://www.apache.org/licenses/LICENSE-2.0

Unless required by applicable law or agreed to in writing, software
distributed under the License is distributed on an "AS IS" BASIS,
WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
See the License for the specific language governing permissions and
limitations under the License.
*/

//! Admission webhook that keeps the `cluster.x-k8s.io/watch-filter` label of
//! cluster-api resources consistent with the namespace they live in.
//!
//! The decision engine ([`LabelReconciler`]) is transport independent: it takes a
//! namespace name and the resource's label map and returns a [`Verdict`]. The
//! [`server`] module adapts it to Kubernetes `AdmissionReview` requests.

use std::time::Duration;

use thiserror::Error;

pub use admission::Verdict;
pub use config::{Cli, NamespacePolicy, PolicyMode};
pub use namespace::{KubeNamespaceStore, NamespaceClassifier, NamespaceLabels, NamespaceStore};
pub use patch::{label_path, synthesize};
pub use reconciler::{LabelDecision, LabelReconciler, Rejection};

pub mod admission;
pub mod config;
pub mod consts;
pub mod namespace;
pub mod patch;
pub mod reconciler;
pub mod server;

#[derive(Error, Debug)]
pub enum Error {
    #[error("kube error: {0}")]
    KubeError(#[source] kube::Error),
    #[error("cannot get namespace `{0}`: not found")]
    NamespaceNotFound(String),
    #[error("cannot get namespace `{namespace}`: lookup timed out after {timeout:?}")]
    NamespaceLookupTimeout { namespace: String, timeout: Duration },
    #[error("invalid configuration: `{0}`")]
    InvalidConfigError(String),
    #[error("error loading configuration file `{path}`: {reason}")]
    ConfigFileError { path: String, reason: String },
    #[error("server error: {0}")]
    ServerError(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
