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

use crate::domain::cluster::resources::ServiceKind;
use crate::infrastructure::constants::*;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::BTreeMap;

/// Scopes every resource one cluster instance creates.
///
/// All names and labels are derived from the pair, so resources can be
/// rediscovered and bulk-deleted by label alone.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClusterIdentity {
    cluster_id: String,
    namespace: String,
}

impl ClusterIdentity {
    pub fn new(cluster_id: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            cluster_id: cluster_id.into(),
            namespace: namespace.into(),
        }
    }

    pub fn cluster_id(&self) -> &str {
        &self.cluster_id
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn deployment_name(&self) -> String {
        self.cluster_id.clone()
    }

    pub fn rest_service_name(&self) -> String {
        format!("{}{}", self.cluster_id, SERVICE_SUFFIX_REST)
    }

    pub fn internal_service_name(&self) -> String {
        self.cluster_id.clone()
    }

    pub fn service_name(&self, kind: ServiceKind) -> String {
        match kind {
            ServiceKind::Rest => self.rest_service_name(),
            ServiceKind::Internal => self.internal_service_name(),
        }
    }

    /// In-cluster DNS name of the REST service.
    pub fn namespaced_rest_service_name(&self) -> String {
        format!("{}.{}", self.rest_service_name(), self.namespace)
    }

    pub fn common_labels(&self) -> BTreeMap<String, String> {
        let mut labels = BTreeMap::new();
        labels.insert(LABEL_TYPE.to_string(), LABEL_TYPE_VALUE.to_string());
        labels.insert(LABEL_APP.to_string(), self.cluster_id.clone());
        labels
    }

    pub fn master_labels(&self) -> BTreeMap<String, String> {
        let mut labels = self.common_labels();
        labels.insert(
            LABEL_COMPONENT.to_string(),
            COMPONENT_JOB_MANAGER.to_string(),
        );
        labels
    }

    pub fn worker_labels(&self) -> BTreeMap<String, String> {
        let mut labels = self.common_labels();
        labels.insert(
            LABEL_COMPONENT.to_string(),
            COMPONENT_TASK_MANAGER.to_string(),
        );
        labels
    }

    pub fn shared_state_labels(&self) -> BTreeMap<String, String> {
        let mut labels = self.common_labels();
        labels.insert(
            LABEL_CONFIGMAP_TYPE.to_string(),
            LABEL_CONFIGMAP_TYPE_HIGH_AVAILABILITY.to_string(),
        );
        labels
    }
}

/// Merges `labels` into the metadata; identity keys win over caller values.
pub(crate) fn stamp_labels(metadata: &mut ObjectMeta, labels: &BTreeMap<String, String>) {
    let merged = metadata.labels.get_or_insert_with(BTreeMap::new);
    for (key, value) in labels {
        merged.insert(key.clone(), value.clone());
    }
}

pub(crate) fn label_selector(labels: &BTreeMap<String, String>) -> String {
    labels
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(",")
}
