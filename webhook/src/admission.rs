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

use json_patch::{Patch, PatchOperation};
use kube::core::admission::{AdmissionResponse, SerializePatchError};

use crate::reconciler::LabelDecision;

/// Admission verdict, independent of the webhook transport.
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub allowed: bool,
    /// Set only when the request is denied.
    pub message: Option<String>,
    /// Set only when the request is allowed with a label change.
    pub patch: Option<Patch>,
}

impl Verdict {
    pub fn build(decision: &LabelDecision, patches: Vec<PatchOperation>) -> Self {
        match decision {
            LabelDecision::Reject(rejection) => Verdict {
                allowed: false,
                message: Some(rejection.message().to_string()),
                patch: None,
            },
            LabelDecision::Unchanged => Verdict {
                allowed: true,
                message: None,
                patch: None,
            },
            // An empty patch must not be sent: clients can observe the patch type alone.
            LabelDecision::Set { .. } => Verdict {
                allowed: true,
                message: None,
                patch: (!patches.is_empty()).then(|| Patch(patches)),
            },
        }
    }

    /// Applies the verdict to a response created from the admission request.
    pub fn into_admission_response(
        self,
        response: AdmissionResponse,
    ) -> Result<AdmissionResponse, SerializePatchError> {
        if !self.allowed {
            return Ok(response.deny(self.message.unwrap_or_default()));
        }
        match self.patch {
            Some(patch) => response.with_patch(patch),
            None => Ok(response),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patch::synthesize;
    use crate::{NamespacePolicy, PolicyMode};

    fn decide(exempt: bool, old: &str) -> LabelDecision {
        LabelDecision::decide(PolicyMode::Strict, &NamespacePolicy::default(), exempt, old)
    }

    #[test]
    fn rejection_is_denied_with_the_message_verbatim() {
        let decision = decide(false, "other-label");
        let verdict = Verdict::build(&decision, synthesize(&decision, None));

        assert!(!verdict.allowed);
        assert_eq!(
            verdict.message.as_deref(),
            Some("Invalid configuration, cannot use label \"other-label\" (it should be: \"multicluster-engine\")")
        );
        assert!(verdict.patch.is_none());

        let response = verdict
            .into_admission_response(AdmissionResponse::invalid("placeholder"))
            .unwrap();
        assert!(!response.allowed);
        assert_eq!(
            response.result.message,
            "Invalid configuration, cannot use label \"other-label\" (it should be: \"multicluster-engine\")"
        );
    }

    #[test]
    fn unchanged_drops_the_label_map_creation() {
        let decision = decide(true, "");
        let verdict = Verdict::build(&decision, synthesize(&decision, None));

        assert_eq!(
            verdict,
            Verdict {
                allowed: true,
                message: None,
                patch: None,
            }
        );
    }

    #[test]
    fn change_carries_a_json_patch() {
        let decision = decide(false, "");
        let verdict = Verdict::build(&decision, synthesize(&decision, None));

        assert!(verdict.allowed);
        assert_eq!(verdict.patch.as_ref().map(|p| p.0.len()), Some(2));
    }

    fn allowed_base() -> AdmissionResponse {
        let mut base = AdmissionResponse::invalid("placeholder");
        base.allowed = true;
        base
    }

    #[test]
    fn empty_change_omits_the_patch_type() {
        let decision = decide(false, "");
        let verdict = Verdict::build(&decision, Vec::new());
        assert!(verdict.patch.is_none());

        let response = verdict.into_admission_response(allowed_base()).unwrap();
        let json = serde_json::to_value(&response).unwrap();
        assert!(json.get("patchType").map_or(true, serde_json::Value::is_null));
        assert!(json.get("patch").map_or(true, serde_json::Value::is_null));
    }

    #[test]
    fn patch_is_serialized_into_the_response() {
        let decision = decide(false, "");
        let verdict = Verdict::build(&decision, synthesize(&decision, None));

        let response = verdict.into_admission_response(allowed_base()).unwrap();
        assert!(response.allowed);
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["patchType"], "JSONPatch");
        assert!(!json["patch"].is_null());
    }
}
