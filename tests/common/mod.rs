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

//! In-memory control plane for driving `FlinkKubeClient` without a cluster.

#![allow(dead_code)]

use async_trait::async_trait;
use flink_kube::infrastructure::kubernetes::{ControlPlane, EventStream, ResourceEvent};
use flink_kube::KubeError;
use futures::channel::mpsc::{unbounded, UnboundedSender};
use futures::StreamExt;
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    ConfigMap, Container, LoadBalancerIngress, LoadBalancerStatus, Pod, PodSpec, PodStatus,
    PodTemplateSpec, Service, ServicePort, ServiceSpec, ServiceStatus,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use kube::Resource;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub const NAMESPACE: &str = "flink";
pub const ADVERTISED_HOST: &str = "api.example.com";

#[derive(Default)]
pub struct Counters {
    pub deployment_gets: AtomicUsize,
    pub config_map_gets: AtomicUsize,
    pub config_map_replaces: AtomicUsize,
    pub config_map_writes: AtomicUsize,
}

impl Counters {
    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
struct State {
    deployments: BTreeMap<String, Deployment>,
    pods: BTreeMap<String, Pod>,
    services: BTreeMap<String, Service>,
    config_maps: BTreeMap<String, ConfigMap>,
    next_uid: u64,
    next_version: u64,
    pod_watchers: Vec<(BTreeMap<String, String>, UnboundedSender<ResourceEvent<Pod>>)>,
    config_map_watchers: Vec<(String, UnboundedSender<ResourceEvent<ConfigMap>>)>,
    injected_conflicts: usize,
}

impl State {
    fn stamp(&mut self, meta: &mut ObjectMeta) {
        self.next_uid += 1;
        meta.uid = Some(format!("uid-{}", self.next_uid));
        meta.namespace = Some(NAMESPACE.to_string());
        self.bump(meta);
    }

    fn bump(&mut self, meta: &mut ObjectMeta) {
        self.next_version += 1;
        meta.resource_version = Some(self.next_version.to_string());
    }

    fn notify_pod(&mut self, event: impl Fn(Pod) -> ResourceEvent<Pod>, pod: &Pod) {
        let labels = pod.metadata.labels.clone().unwrap_or_default();
        self.pod_watchers.retain(|(selector, tx)| {
            if !matches_labels(&labels, selector) {
                return !tx.is_closed();
            }
            tx.unbounded_send(event(pod.clone())).is_ok()
        });
    }

    fn notify_config_map(
        &mut self,
        event: impl Fn(ConfigMap) -> ResourceEvent<ConfigMap>,
        config_map: &ConfigMap,
    ) {
        let name = config_map.metadata.name.clone().unwrap_or_default();
        self.config_map_watchers.retain(|(watched, tx)| {
            if *watched != name {
                return !tx.is_closed();
            }
            tx.unbounded_send(event(config_map.clone())).is_ok()
        });
    }

    fn remove_owned_by(&mut self, uid: &str) {
        let owned = |meta: &ObjectMeta| {
            meta.owner_references
                .as_ref()
                .map(|refs| refs.iter().any(|r| r.uid == uid))
                .unwrap_or(false)
        };

        let pods: Vec<Pod> = self
            .pods
            .values()
            .filter(|p| owned(&p.metadata))
            .cloned()
            .collect();
        for pod in pods {
            self.pods.remove(pod.metadata.name.as_deref().unwrap_or_default());
            self.notify_pod(ResourceEvent::Deleted, &pod);
        }
        self.services.retain(|_, s| !owned(&s.metadata));
        self.config_maps.retain(|_, c| !owned(&c.metadata));
    }
}

fn matches_labels(labels: &BTreeMap<String, String>, selector: &BTreeMap<String, String>) -> bool {
    selector.iter().all(|(k, v)| labels.get(k) == Some(v))
}

fn name_of<K: Resource>(obj: &K) -> Result<String, KubeError> {
    obj.meta()
        .name
        .clone()
        .ok_or_else(|| KubeError::invalid_spec("metadata.name is required"))
}

fn check_version(
    kind: &str,
    name: &str,
    incoming: &ObjectMeta,
    stored: &ObjectMeta,
) -> Result<(), KubeError> {
    match (&incoming.resource_version, &stored.resource_version) {
        (Some(incoming), Some(stored)) if incoming != stored => {
            Err(KubeError::version_conflict(kind, name))
        }
        _ => Ok(()),
    }
}

pub struct FakeControlPlane {
    state: Mutex<State>,
    pub counters: Counters,
    config_map_read_delay: Mutex<Option<Duration>>,
    closed: AtomicUsize,
}

impl FakeControlPlane {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            counters: Counters::default(),
            config_map_read_delay: Mutex::new(None),
            closed: AtomicUsize::new(0),
        }
    }

    /// Every config map read sleeps this long, forcing concurrent writers to interleave.
    pub fn set_config_map_read_delay(&self, delay: Duration) {
        *self.config_map_read_delay.lock().unwrap() = Some(delay);
    }

    /// The next `n` config map replaces fail with a version conflict.
    pub fn inject_version_conflicts(&self, n: usize) {
        self.state.lock().unwrap().injected_conflicts = n;
    }

    pub fn deployment(&self, name: &str) -> Option<Deployment> {
        self.state.lock().unwrap().deployments.get(name).cloned()
    }

    pub fn pod(&self, name: &str) -> Option<Pod> {
        self.state.lock().unwrap().pods.get(name).cloned()
    }

    pub fn service(&self, name: &str) -> Option<Service> {
        self.state.lock().unwrap().services.get(name).cloned()
    }

    pub fn config_map(&self, name: &str) -> Option<ConfigMap> {
        self.state.lock().unwrap().config_maps.get(name).cloned()
    }

    pub fn pod_count(&self) -> usize {
        self.state.lock().unwrap().pods.len()
    }

    pub fn service_count(&self) -> usize {
        self.state.lock().unwrap().services.len()
    }

    pub fn config_map_count(&self) -> usize {
        self.state.lock().unwrap().config_maps.len()
    }

    pub fn close_count(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    /// Stores a deployment directly, as if created by another client.
    pub fn seed_deployment(&self, mut deployment: Deployment) -> Deployment {
        let mut state = self.state.lock().unwrap();
        state.stamp(&mut deployment.metadata);
        let name = deployment.metadata.name.clone().unwrap_or_default();
        state.deployments.insert(name, deployment.clone());
        deployment
    }

    pub fn set_load_balancer_ingress(&self, service: &str, ingress: LoadBalancerIngress) {
        let mut state = self.state.lock().unwrap();
        if let Some(svc) = state.services.get_mut(service) {
            svc.status = Some(ServiceStatus {
                load_balancer: Some(LoadBalancerStatus {
                    ingress: Some(vec![ingress]),
                    ..Default::default()
                }),
                ..Default::default()
            });
        }
    }

    pub fn set_pod_phase(&self, name: &str, phase: &str) {
        let mut state = self.state.lock().unwrap();
        let Some(mut pod) = state.pods.get(name).cloned() else {
            return;
        };
        pod.status = Some(PodStatus {
            phase: Some(phase.to_string()),
            ..Default::default()
        });
        state.bump(&mut pod.metadata);
        state.pods.insert(name.to_string(), pod.clone());
        state.notify_pod(ResourceEvent::Modified, &pod);
    }

    /// Breaks every open watch with an error event.
    pub fn fail_watches(&self, message: &str) {
        let mut state = self.state.lock().unwrap();
        for (_, tx) in state.pod_watchers.drain(..) {
            let _ = tx.unbounded_send(ResourceEvent::Error(KubeError::orchestration(message)));
        }
        for (_, tx) in state.config_map_watchers.drain(..) {
            let _ = tx.unbounded_send(ResourceEvent::Error(KubeError::orchestration(message)));
        }
    }
}

#[async_trait]
impl ControlPlane for FakeControlPlane {
    fn namespace(&self) -> &str {
        NAMESPACE
    }

    fn advertised_host(&self) -> Option<String> {
        Some(ADVERTISED_HOST.to_string())
    }

    async fn create_deployment(&self, deployment: &Deployment) -> Result<Deployment, KubeError> {
        let name = name_of(deployment)?;
        let mut state = self.state.lock().unwrap();
        if state.deployments.contains_key(&name) {
            return Err(KubeError::resource_conflict("Deployment", &name, NAMESPACE));
        }
        let mut created = deployment.clone();
        state.stamp(&mut created.metadata);
        state.deployments.insert(name, created.clone());
        Ok(created)
    }

    async fn get_deployment(&self, name: &str) -> Result<Option<Deployment>, KubeError> {
        self.counters.deployment_gets.fetch_add(1, Ordering::SeqCst);
        // Leaves room for concurrent callers to pile up on the master lookup.
        tokio::time::sleep(Duration::from_millis(10)).await;
        Ok(self.state.lock().unwrap().deployments.get(name).cloned())
    }

    async fn delete_deployment(&self, name: &str, cascade: bool) -> Result<bool, KubeError> {
        let mut state = self.state.lock().unwrap();
        let Some(deployment) = state.deployments.remove(name) else {
            return Ok(false);
        };
        if cascade {
            if let Some(uid) = deployment.metadata.uid.as_deref() {
                state.remove_owned_by(uid);
            }
        }
        Ok(true)
    }

    async fn create_pod(&self, pod: &Pod) -> Result<Pod, KubeError> {
        let name = name_of(pod)?;
        let mut state = self.state.lock().unwrap();
        if state.pods.contains_key(&name) {
            return Err(KubeError::resource_conflict("Pod", &name, NAMESPACE));
        }
        let mut created = pod.clone();
        state.stamp(&mut created.metadata);
        state.pods.insert(name, created.clone());
        state.notify_pod(ResourceEvent::Added, &created);
        Ok(created)
    }

    async fn list_pods(&self, labels: &BTreeMap<String, String>) -> Result<Vec<Pod>, KubeError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .pods
            .values()
            .filter(|p| matches_labels(&p.metadata.labels.clone().unwrap_or_default(), labels))
            .cloned()
            .collect())
    }

    async fn delete_pod(&self, name: &str) -> Result<bool, KubeError> {
        let mut state = self.state.lock().unwrap();
        let Some(pod) = state.pods.remove(name) else {
            return Ok(false);
        };
        state.notify_pod(ResourceEvent::Deleted, &pod);
        Ok(true)
    }

    async fn watch_pods(
        &self,
        labels: &BTreeMap<String, String>,
    ) -> Result<EventStream<Pod>, KubeError> {
        let (tx, rx) = unbounded();
        self.state
            .lock()
            .unwrap()
            .pod_watchers
            .push((labels.clone(), tx));
        Ok(rx.boxed())
    }

    async fn create_service(&self, service: &Service) -> Result<Service, KubeError> {
        let name = name_of(service)?;
        let mut state = self.state.lock().unwrap();
        if state.services.contains_key(&name) {
            return Err(KubeError::resource_conflict("Service", &name, NAMESPACE));
        }
        let mut created = service.clone();
        state.stamp(&mut created.metadata);
        if let Some(spec) = created.spec.as_mut() {
            if spec.cluster_ip.is_none() {
                spec.cluster_ip = Some(format!("10.96.0.{}", state.next_uid));
            }
        }
        state.services.insert(name, created.clone());
        Ok(created)
    }

    async fn get_service(&self, name: &str) -> Result<Option<Service>, KubeError> {
        Ok(self.state.lock().unwrap().services.get(name).cloned())
    }

    async fn replace_service(&self, service: &Service) -> Result<Service, KubeError> {
        let name = name_of(service)?;
        let mut state = self.state.lock().unwrap();
        let Some(stored) = state.services.get(&name).cloned() else {
            return Err(KubeError::not_found("Service", &name, NAMESPACE));
        };
        check_version("Service", &name, &service.metadata, &stored.metadata)?;

        let mut replaced = service.clone();
        replaced.metadata.uid = stored.metadata.uid;
        replaced.metadata.namespace = Some(NAMESPACE.to_string());
        state.bump(&mut replaced.metadata);
        state.services.insert(name, replaced.clone());
        Ok(replaced)
    }

    async fn create_config_map(&self, config_map: &ConfigMap) -> Result<ConfigMap, KubeError> {
        let name = name_of(config_map)?;
        let mut state = self.state.lock().unwrap();
        if state.config_maps.contains_key(&name) {
            return Err(KubeError::resource_conflict("ConfigMap", &name, NAMESPACE));
        }
        self.counters.config_map_writes.fetch_add(1, Ordering::SeqCst);
        let mut created = config_map.clone();
        state.stamp(&mut created.metadata);
        state.config_maps.insert(name, created.clone());
        state.notify_config_map(ResourceEvent::Added, &created);
        Ok(created)
    }

    async fn get_config_map(&self, name: &str) -> Result<Option<ConfigMap>, KubeError> {
        self.counters.config_map_gets.fetch_add(1, Ordering::SeqCst);
        let delay = *self.config_map_read_delay.lock().unwrap();
        let found = self.state.lock().unwrap().config_maps.get(name).cloned();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(found)
    }

    async fn list_config_maps(
        &self,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<ConfigMap>, KubeError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .config_maps
            .values()
            .filter(|c| matches_labels(&c.metadata.labels.clone().unwrap_or_default(), labels))
            .cloned()
            .collect())
    }

    async fn replace_config_map(&self, config_map: &ConfigMap) -> Result<ConfigMap, KubeError> {
        self.counters.config_map_replaces.fetch_add(1, Ordering::SeqCst);
        let name = name_of(config_map)?;
        let mut state = self.state.lock().unwrap();
        if state.injected_conflicts > 0 {
            state.injected_conflicts -= 1;
            return Err(KubeError::version_conflict("ConfigMap", &name));
        }
        let Some(stored) = state.config_maps.get(&name).cloned() else {
            return Err(KubeError::not_found("ConfigMap", &name, NAMESPACE));
        };
        check_version("ConfigMap", &name, &config_map.metadata, &stored.metadata)?;

        self.counters.config_map_writes.fetch_add(1, Ordering::SeqCst);
        let mut replaced = config_map.clone();
        replaced.metadata.uid = stored.metadata.uid;
        replaced.metadata.namespace = Some(NAMESPACE.to_string());
        state.bump(&mut replaced.metadata);
        state.config_maps.insert(name, replaced.clone());
        state.notify_config_map(ResourceEvent::Modified, &replaced);
        Ok(replaced)
    }

    async fn delete_config_map(&self, name: &str) -> Result<bool, KubeError> {
        let mut state = self.state.lock().unwrap();
        let Some(config_map) = state.config_maps.remove(name) else {
            return Ok(false);
        };
        state.notify_config_map(ResourceEvent::Deleted, &config_map);
        Ok(true)
    }

    async fn delete_config_maps_by_labels(
        &self,
        labels: &BTreeMap<String, String>,
    ) -> Result<(), KubeError> {
        let mut state = self.state.lock().unwrap();
        let doomed: Vec<ConfigMap> = state
            .config_maps
            .values()
            .filter(|c| matches_labels(&c.metadata.labels.clone().unwrap_or_default(), labels))
            .cloned()
            .collect();
        for config_map in doomed {
            state
                .config_maps
                .remove(config_map.metadata.name.as_deref().unwrap_or_default());
            state.notify_config_map(ResourceEvent::Deleted, &config_map);
        }
        Ok(())
    }

    async fn watch_config_map(&self, name: &str) -> Result<EventStream<ConfigMap>, KubeError> {
        let (tx, rx) = unbounded();
        self.state
            .lock()
            .unwrap()
            .config_map_watchers
            .push((name.to_string(), tx));
        Ok(rx.boxed())
    }

    fn close(&self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

fn container(name: &str) -> Container {
    Container {
        name: name.to_string(),
        image: Some("flink:1.20".to_string()),
        ..Default::default()
    }
}

pub fn master_deployment(cluster_id: &str) -> Deployment {
    Deployment {
        metadata: ObjectMeta {
            name: Some(cluster_id.to_string()),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            replicas: Some(1),
            selector: LabelSelector::default(),
            template: PodTemplateSpec {
                metadata: None,
                spec: Some(PodSpec {
                    containers: vec![container("flink-main-container")],
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn rest_service(cluster_id: &str, type_: &str) -> Service {
    Service {
        metadata: ObjectMeta {
            name: Some(format!("{}-rest", cluster_id)),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            type_: Some(type_.to_string()),
            ports: Some(vec![ServicePort {
                name: Some("rest".to_string()),
                port: 8081,
                node_port: Some(30081),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn internal_service(cluster_id: &str) -> Service {
    Service {
        metadata: ObjectMeta {
            name: Some(cluster_id.to_string()),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            cluster_ip: Some("None".to_string()),
            ports: Some(vec![
                ServicePort {
                    name: Some("jobmanager-rpc".to_string()),
                    port: 6123,
                    ..Default::default()
                },
                ServicePort {
                    name: Some("blobserver".to_string()),
                    port: 6124,
                    ..Default::default()
                },
            ]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn worker_pod(name: &str) -> Pod {
    Pod {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            labels: Some(BTreeMap::from([("user".to_string(), "kept".to_string())])),
            ..Default::default()
        },
        spec: Some(PodSpec {
            containers: vec![container("flink-main-container")],
            ..Default::default()
        }),
        ..Default::default()
    }
}
