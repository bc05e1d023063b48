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

use crate::infrastructure::constants::{KIND_CONFIG_MAP, KIND_SERVICE};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Pod, Service};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::BTreeMap;
use std::fmt;

/// Fully resolved master deployment plus the resources that live and die with it.
#[derive(Debug, Clone)]
pub struct MasterSpecification {
    pub deployment: Deployment,
    pub accompanying_resources: Vec<AccompanyingResource>,
}

impl MasterSpecification {
    pub fn new(deployment: Deployment, accompanying_resources: Vec<AccompanyingResource>) -> Self {
        Self {
            deployment,
            accompanying_resources,
        }
    }
}

#[derive(Debug, Clone)]
pub enum AccompanyingResource {
    Service(Service),
    ConfigMap(ConfigMap),
}

impl AccompanyingResource {
    pub fn kind(&self) -> &'static str {
        match self {
            AccompanyingResource::Service(_) => KIND_SERVICE,
            AccompanyingResource::ConfigMap(_) => KIND_CONFIG_MAP,
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.metadata().name.as_deref()
    }

    pub fn metadata(&self) -> &ObjectMeta {
        match self {
            AccompanyingResource::Service(service) => &service.metadata,
            AccompanyingResource::ConfigMap(config_map) => &config_map.metadata,
        }
    }

    pub fn metadata_mut(&mut self) -> &mut ObjectMeta {
        match self {
            AccompanyingResource::Service(service) => &mut service.metadata,
            AccompanyingResource::ConfigMap(config_map) => &mut config_map.metadata,
        }
    }
}

/// Which of the two master services an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceKind {
    Rest,
    Internal,
}

/// One worker process scheduled as a pod.
#[derive(Debug, Clone)]
pub struct WorkerPod {
    inner: Pod,
}

impl WorkerPod {
    pub fn new(pod: Pod) -> Self {
        Self { inner: pod }
    }

    pub fn name(&self) -> &str {
        self.inner.metadata.name.as_deref().unwrap_or_default()
    }

    pub fn phase(&self) -> Option<&str> {
        self.inner
            .status
            .as_ref()
            .and_then(|status| status.phase.as_deref())
    }

    pub fn owner_uid(&self) -> Option<&str> {
        self.inner
            .metadata
            .owner_references
            .as_ref()
            .and_then(|refs| refs.first())
            .map(|owner| owner.uid.as_str())
    }

    pub fn is_terminated(&self) -> bool {
        if matches!(self.phase(), Some("Failed") | Some("Succeeded")) {
            return true;
        }

        self.inner
            .status
            .as_ref()
            .and_then(|status| status.container_statuses.as_ref())
            .map(|statuses| {
                statuses.iter().any(|cs| {
                    cs.state
                        .as_ref()
                        .and_then(|state| state.terminated.as_ref())
                        .is_some()
                })
            })
            .unwrap_or(false)
    }

    /// Exit code and reason of every terminated container.
    pub fn terminated_diagnostics(&self) -> String {
        let statuses = match self
            .inner
            .status
            .as_ref()
            .and_then(|status| status.container_statuses.as_ref())
        {
            Some(statuses) => statuses,
            None => return String::new(),
        };

        statuses
            .iter()
            .filter_map(|cs| {
                let terminated = cs.state.as_ref()?.terminated.as_ref()?;
                Some(format!(
                    "Pod terminated, container termination details: container={}, exitCode={}, reason={}, message={}",
                    cs.name,
                    terminated.exit_code,
                    terminated.reason.as_deref().unwrap_or("unknown"),
                    terminated.message.as_deref().unwrap_or("")
                ))
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn as_pod(&self) -> &Pod {
        &self.inner
    }

    pub fn into_inner(self) -> Pod {
        self.inner
    }
}

impl From<Pod> for WorkerPod {
    fn from(pod: Pod) -> Self {
        Self::new(pod)
    }
}

/// A small named key-value blob persisted as a config map.
///
/// The resource version is the optimistic concurrency token: a replace
/// carrying a stale version is rejected by the control plane.
#[derive(Debug, Clone, PartialEq)]
pub struct SharedStateEntry {
    inner: ConfigMap,
}

impl SharedStateEntry {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: ConfigMap {
                metadata: ObjectMeta {
                    name: Some(name.into()),
                    ..Default::default()
                },
                data: Some(BTreeMap::new()),
                ..Default::default()
            },
        }
    }

    pub fn name(&self) -> &str {
        self.inner.metadata.name.as_deref().unwrap_or_default()
    }

    pub fn data(&self) -> BTreeMap<String, String> {
        self.inner.data.clone().unwrap_or_default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.inner
            .data
            .as_ref()
            .and_then(|data| data.get(key))
            .map(String::as_str)
    }

    pub fn labels(&self) -> BTreeMap<String, String> {
        self.inner.metadata.labels.clone().unwrap_or_default()
    }

    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.inner
            .metadata
            .annotations
            .as_ref()
            .and_then(|annotations| annotations.get(key))
            .map(String::as_str)
    }

    pub fn resource_version(&self) -> Option<&str> {
        self.inner.metadata.resource_version.as_deref()
    }

    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.inner
            .data
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), value.into());
        self
    }

    pub fn without_data(mut self, key: &str) -> Self {
        if let Some(data) = self.inner.data.as_mut() {
            data.remove(key);
        }
        self
    }

    pub fn with_labels(mut self, labels: BTreeMap<String, String>) -> Self {
        self.inner
            .metadata
            .labels
            .get_or_insert_with(BTreeMap::new)
            .extend(labels);
        self
    }

    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.inner
            .metadata
            .annotations
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), value.into());
        self
    }

    pub fn without_annotation(mut self, key: &str) -> Self {
        if let Some(annotations) = self.inner.metadata.annotations.as_mut() {
            annotations.remove(key);
        }
        self
    }

    pub fn as_config_map(&self) -> &ConfigMap {
        &self.inner
    }

    pub fn into_inner(self) -> ConfigMap {
        self.inner
    }
}

impl From<ConfigMap> for SharedStateEntry {
    fn from(config_map: ConfigMap) -> Self {
        Self { inner: config_map }
    }
}

/// Connectable address of a cluster's REST endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: i32,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: i32) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}
