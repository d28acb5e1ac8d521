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

use std::{collections::BTreeMap, fmt, sync::Arc, time::Duration};

use tracing::{debug_span, info, Instrument, Span};

use crate::admission::Verdict;
use crate::consts::WATCH_FILTER_LABEL;
use crate::namespace::{NamespaceClassifier, NamespaceStore};
use crate::patch::synthesize;
use crate::{Error, NamespacePolicy, PolicyMode, Result};

/// A policy violation. The message is matched literally by API clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    message: String,
}

impl Rejection {
    fn new(message: String) -> Self {
        Self { message }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Outcome of reconciling the watch-filter label against the namespace policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LabelDecision {
    /// The label is acceptable as it is.
    Unchanged,
    /// The label must be set to `value`.
    Set { value: String },
    Reject(Rejection),
}

impl LabelDecision {
    pub fn must_change(&self) -> bool {
        matches!(self, LabelDecision::Set { .. })
    }

    pub fn target_value(&self) -> Option<&str> {
        match self {
            LabelDecision::Set { value } => Some(value),
            _ => None,
        }
    }

    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            LabelDecision::Reject(rejection) => Some(rejection),
            _ => None,
        }
    }

    /// Applies the policy to an already classified namespace.
    ///
    /// In strict mode an exempt namespace only rejects the managed value itself; any
    /// other label, including one unrelated to this webhook, is left alone.
    pub fn decide(
        mode: PolicyMode,
        policy: &NamespacePolicy,
        exempt: bool,
        old_value: &str,
    ) -> LabelDecision {
        let managed = policy.managed_label_value.as_str();
        match (mode, exempt) {
            (PolicyMode::Strict, true) if old_value == managed => LabelDecision::Reject(
                Rejection::new(format!("Invalid configuration, cannot use label \"{old_value}\"")),
            ),
            (_, true) => LabelDecision::Unchanged,
            (_, false) if old_value.is_empty() => LabelDecision::Set {
                value: managed.to_string(),
            },
            (_, false) if old_value == managed => LabelDecision::Unchanged,
            (PolicyMode::Strict, false) => LabelDecision::Reject(Rejection::new(format!(
                "Invalid configuration, cannot use label \"{old_value}\" (it should be: \"{managed}\")"
            ))),
            // Quoted like the strict messages; earlier releases printed the values bare.
            (PolicyMode::Injector, false) => LabelDecision::Reject(Rejection::new(format!(
                "Invalid configuration, cannot change the label \"{old_value}\" -> \"{managed}\""
            ))),
        }
    }
}

/// The decision engine. Holds only immutable state and can be shared across requests.
#[derive(Clone)]
pub struct LabelReconciler {
    mode: PolicyMode,
    policy: Arc<NamespacePolicy>,
    classifier: NamespaceClassifier,
    span: Span,
}

impl LabelReconciler {
    /// `span` parents everything the engine logs.
    pub fn new(
        mode: PolicyMode,
        policy: NamespacePolicy,
        store: Arc<dyn NamespaceStore>,
        lookup_timeout: Duration,
        span: Span,
    ) -> Self {
        let policy = Arc::new(policy);
        let classifier = NamespaceClassifier::new(policy.clone(), store, lookup_timeout);
        Self {
            mode,
            policy,
            classifier,
            span,
        }
    }

    pub fn mode(&self) -> PolicyMode {
        self.mode
    }

    pub fn policy(&self) -> &NamespacePolicy {
        &self.policy
    }

    /// Classifies `namespace` and decides what happens to the watch-filter label.
    ///
    /// `deadline` is the time the caller is still willing to wait; the namespace lookup
    /// is bounded by the shorter of it and the configured lookup timeout.
    pub async fn reconcile(
        &self,
        namespace: &str,
        old_value: &str,
        deadline: Option<Duration>,
    ) -> Result<LabelDecision> {
        let span = debug_span!(parent: &self.span, "reconcile", namespace);
        async {
            let exempt = self.classifier.is_exempt(namespace, deadline).await?;
            let decision = LabelDecision::decide(self.mode, &self.policy, exempt, old_value);
            match &decision {
                LabelDecision::Reject(rejection) => {
                    info!(namespace, old_value, %rejection, "rejecting label")
                }
                LabelDecision::Set { value } => {
                    info!(namespace, old_value, value = %value, "setting label")
                }
                LabelDecision::Unchanged => {}
            }
            Ok::<_, Error>(decision)
        }
        .instrument(span)
        .await
    }

    /// Runs the whole pipeline for a resource in `namespace` with the given labels.
    pub async fn review(
        &self,
        namespace: &str,
        labels: Option<&BTreeMap<String, String>>,
        deadline: Option<Duration>,
    ) -> Result<Verdict> {
        let old_value = labels
            .and_then(|l| l.get(WATCH_FILTER_LABEL))
            .map(String::as_str)
            .unwrap_or_default();

        let decision = self.reconcile(namespace, old_value, deadline).await?;

        let patches = synthesize(&decision, labels);
        Ok(Verdict::build(&decision, patches))
    }
}
