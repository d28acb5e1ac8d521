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

use std::{collections::BTreeMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Namespace;
use kube::{Api, Client};
use tracing::{debug, debug_span, Instrument};

use crate::consts::HOSTED_CONTROL_PLANE_ENABLED;
use crate::{Error, NamespacePolicy, Result};

pub type NamespaceLabels = BTreeMap<String, String>;

/// Read-only access to the cluster's namespaces.
#[async_trait]
pub trait NamespaceStore: Send + Sync {
    /// Returns the labels of the namespace, or `None` if it does not exist.
    async fn get_namespace(&self, name: &str) -> Result<Option<NamespaceLabels>>;
}

/// [`NamespaceStore`] backed by the Kubernetes API server.
#[derive(Clone)]
pub struct KubeNamespaceStore {
    api: Api<Namespace>,
}

impl KubeNamespaceStore {
    pub fn new(client: Client) -> Self {
        Self {
            api: Api::all(client),
        }
    }
}

#[async_trait]
impl NamespaceStore for KubeNamespaceStore {
    async fn get_namespace(&self, name: &str) -> Result<Option<NamespaceLabels>> {
        let namespace = self.api.get_opt(name).await.map_err(Error::KubeError)?;
        Ok(namespace.map(|ns| ns.metadata.labels.unwrap_or_default()))
    }
}

/// Decides whether a namespace is exempt from carrying the managed label.
#[derive(Clone)]
pub struct NamespaceClassifier {
    policy: Arc<NamespacePolicy>,
    store: Arc<dyn NamespaceStore>,
    lookup_timeout: Duration,
}

impl NamespaceClassifier {
    pub fn new(
        policy: Arc<NamespacePolicy>,
        store: Arc<dyn NamespaceStore>,
        lookup_timeout: Duration,
    ) -> Self {
        Self {
            policy,
            store,
            lookup_timeout,
        }
    }

    /// Returns true for the exempt namespace itself and for hosted control plane namespaces.
    ///
    /// The namespace is looked up on every call. A missing namespace, an API error or a
    /// lookup exceeding the timeout is returned as an error, never as a classification.
    /// A `deadline` set by the caller shortens the configured lookup timeout, it never
    /// extends it.
    pub async fn is_exempt(&self, namespace: &str, deadline: Option<Duration>) -> Result<bool> {
        if namespace == self.policy.exempt_namespace {
            return Ok(true);
        }

        let timeout = deadline.map_or(self.lookup_timeout, |d| d.min(self.lookup_timeout));
        let lookup = self
            .store
            .get_namespace(namespace)
            .instrument(debug_span!("namespace_lookup", namespace, ?timeout));
        let labels = tokio::time::timeout(timeout, lookup)
            .await
            .map_err(|_| Error::NamespaceLookupTimeout {
                namespace: namespace.to_string(),
                timeout,
            })??
            .ok_or_else(|| Error::NamespaceNotFound(namespace.to_string()))?;

        let hosted = is_hosted_control_plane(&labels, &self.policy.hosted_control_plane_label);
        debug!(namespace, hosted, "classified namespace");
        Ok(hosted)
    }
}

// Only the literal "true" counts; "True", "1" or "yes" do not.
fn is_hosted_control_plane(labels: &NamespaceLabels, label: &str) -> bool {
    labels.get(label).map(String::as_str) == Some(HOSTED_CONTROL_PLANE_ENABLED)
}
