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

// The label cluster-api controllers use as a watch filter to select the resources they manage.
pub const WATCH_FILTER_LABEL: &str = "cluster.x-k8s.io/watch-filter";

// JSON pointer of the watch-filter label inside a resource.
pub const WATCH_FILTER_LABEL_PATH: &str = "/metadata/labels/cluster.x-k8s.io~1watch-filter";

// JSON pointer of a resource's label map.
pub const LABELS_PATH: &str = "/metadata/labels";

// The namespace the platform's own cluster-api instance runs in.
pub const DEFAULT_EXEMPT_NAMESPACE: &str = "openshift-cluster-api";

// Namespace label marking a hosted control plane namespace.
pub const DEFAULT_HOSTED_CONTROL_PLANE_LABEL: &str = "hypershift.openshift.io/hosted-control-plane";

// Watch-filter value identifying resources managed by the multicluster engine.
pub const DEFAULT_MANAGED_LABEL_VALUE: &str = "multicluster-engine";

// Value the hosted control plane label must carry, compared literally.
pub const HOSTED_CONTROL_PLANE_ENABLED: &str = "true";

// Default address of the admission endpoint.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:9443";

// Default bound on a single namespace lookup, matching the API server's default webhook timeout.
pub const DEFAULT_NAMESPACE_LOOKUP_TIMEOUT_SECS: u64 = 10;
