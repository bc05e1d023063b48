// Copyright 2025 JiangLong.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

/// Resource labels
pub const LABEL_TYPE: &str = "type";
pub const LABEL_TYPE_VALUE: &str = "flink-native-kubernetes";
pub const LABEL_APP: &str = "app";
pub const LABEL_COMPONENT: &str = "component";
pub const LABEL_CONFIGMAP_TYPE: &str = "configmap-type";
pub const LABEL_CONFIGMAP_TYPE_HIGH_AVAILABILITY: &str = "high-availability";

/// Components
pub const COMPONENT_JOB_MANAGER: &str = "jobmanager";
pub const COMPONENT_TASK_MANAGER: &str = "taskmanager";

/// Service names and suffixes
pub const SERVICE_SUFFIX_REST: &str = "-rest";

/// Port names
pub const PORT_NAME_REST: &str = "rest";

/// Leader election record annotation
pub const LEADER_ANNOTATION_KEY: &str = "control-plane.alpha.kubernetes.io/leader";

/// Resource kinds used in error messages
pub const DEPLOYMENT_KIND: &str = "Deployment";
pub const KIND_POD: &str = "Pod";
pub const KIND_SERVICE: &str = "Service";
pub const KIND_CONFIG_MAP: &str = "ConfigMap";

/// Client defaults
pub const DEFAULT_NAMESPACE: &str = "default";
pub const DEFAULT_MAX_RETRY_ATTEMPTS: usize = 5;
pub const DEFAULT_IO_POOL_SIZE: usize = 4;
pub const DEFAULT_SHUTDOWN_GRACE_SECS: u64 = 5;
pub const DEFAULT_RETRY_MIN_DELAY_MS: u64 = 10;
pub const DEFAULT_RETRY_MAX_DELAY_MS: u64 = 1000;

/// Leader election defaults
pub const DEFAULT_LEASE_DURATION_SECS: u64 = 15;
pub const DEFAULT_RENEW_DEADLINE_SECS: u64 = 10;
pub const DEFAULT_RETRY_PERIOD_SECS: u64 = 2;

/// Longest cluster id that still leaves room for the derived resource names
pub const MAX_CLUSTER_ID_LEN: usize = 45;
