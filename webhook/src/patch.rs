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

use std::collections::BTreeMap;

use json_patch::jsonptr::PointerBuf;
use json_patch::{AddOperation, PatchOperation, ReplaceOperation};
use serde_json::{json, Value};

use crate::consts::WATCH_FILTER_LABEL;
use crate::reconciler::LabelDecision;

// JSON pointer to a label; `~` and `/` in the key are escaped as `~0` and `~1`.
pub fn label_path(key: &str) -> PointerBuf {
    PointerBuf::from_tokens(["metadata", "labels", key])
}

fn labels_path() -> PointerBuf {
    PointerBuf::from_tokens(["metadata", "labels"])
}

/// Builds the JSON patch operations that bring the watch-filter label in line with `decision`.
///
/// A resource without a label map always gets an operation creating an empty one first,
/// so the label operation has a parent to land in.
pub fn synthesize(
    decision: &LabelDecision,
    labels: Option<&BTreeMap<String, String>>,
) -> Vec<PatchOperation> {
    let mut ops = Vec::new();

    if labels.is_none() {
        ops.push(PatchOperation::Add(AddOperation {
            path: labels_path(),
            value: json!({}),
        }));
    }

    let Some(target) = decision.target_value() else {
        return ops;
    };

    let old_value = labels
        .and_then(|l| l.get(WATCH_FILTER_LABEL))
        .map(String::as_str)
        .unwrap_or_default();
    let path = label_path(WATCH_FILTER_LABEL);
    let value = Value::String(target.to_string());
    if old_value.is_empty() {
        ops.push(PatchOperation::Add(AddOperation { path, value }));
    } else {
        ops.push(PatchOperation::Replace(ReplaceOperation { path, value }));
    }

    ops
}
