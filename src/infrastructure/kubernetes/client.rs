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

use crate::domain::cluster::identity::{label_selector, stamp_labels};
use crate::domain::cluster::{
    AccompanyingResource, ClusterIdentity, Endpoint, MasterSpecification, ServiceKind,
    SharedStateEntry, SpecValidator, WorkerPod,
};
use crate::domain::config::{KubeClientConfig, LeaderElectionConfig};
use crate::infrastructure::kubernetes::control_plane::{ControlPlane, KubeControlPlane};
use crate::infrastructure::kubernetes::endpoint::{exposed_type_of, resolve_with_type};
use crate::infrastructure::kubernetes::executor::{IoExecutor, KubeFuture};
use crate::infrastructure::kubernetes::leader::{
    ConfigMapLock, LeaderCallbackHandler, LeaderElector,
};
use crate::infrastructure::kubernetes::owner::attach_owner;
use crate::infrastructure::kubernetes::state_store::{RetryPolicy, StateStore};
use crate::infrastructure::kubernetes::watch::{dispatch, WatchHandle, WatchHandler};
use crate::shared::error::KubeError;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Pod, Service};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use serde::Serialize;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Lifecycle operations for the master deployment, worker pods, services and
/// shared state of one cluster.
///
/// Every control-plane call runs on the client's bounded [`IoExecutor`].
/// Dependents of the master carry an owner reference to it, so deleting the
/// master with cascading enabled is the only teardown step needed.
pub struct FlinkKubeClient {
    control_plane: Arc<dyn ControlPlane>,
    config: KubeClientConfig,
    identity: ClusterIdentity,
    executor: IoExecutor,
    state_store: Arc<StateStore>,
    master: MasterCache,
}

/// The master deployment dependents are owned by, per client instance.
///
/// Filled by `create_master` or by the first worker that needs it, replaced
/// on every `create_master` and cleared when the cluster is stopped.
#[derive(Clone, Default)]
struct MasterCache(Arc<RwLock<Option<Deployment>>>);

impl MasterCache {
    async fn get(&self) -> Option<Deployment> {
        self.0.read().await.clone()
    }

    async fn replace(&self, deployment: Deployment) {
        *self.0.write().await = Some(deployment);
    }

    async fn clear(&self) {
        self.0.write().await.take();
    }

    /// Returns the cached master, resolving it at most once across
    /// concurrent callers while the cache is empty.
    async fn get_or_resolve<F, Fut>(&self, resolve: F) -> Result<Deployment, KubeError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Deployment, KubeError>>,
    {
        if let Some(deployment) = self.get().await {
            return Ok(deployment);
        }

        let mut slot = self.0.write().await;
        if let Some(deployment) = slot.as_ref() {
            return Ok(deployment.clone());
        }
        let deployment = resolve().await?;
        *slot = Some(deployment.clone());
        Ok(deployment)
    }
}

impl FlinkKubeClient {
    pub fn new(
        config: KubeClientConfig,
        control_plane: Arc<dyn ControlPlane>,
    ) -> Result<Self, KubeError> {
        config.validate()?;
        if config.namespace != control_plane.namespace() {
            return Err(KubeError::Config(format!(
                "Client namespace '{}' does not match control plane namespace '{}'",
                config.namespace,
                control_plane.namespace()
            )));
        }

        let executor = IoExecutor::new(config.io_executor_pool_size)?;
        let state_store = Arc::new(StateStore::new(
            control_plane.clone(),
            RetryPolicy::from_config(&config),
        ));

        Ok(Self {
            identity: ClusterIdentity::new(&config.cluster_id, &config.namespace),
            control_plane,
            config,
            executor,
            state_store,
            master: MasterCache::default(),
        })
    }

    /// Connects to the cluster described by the kubeconfig settings of `config`.
    pub async fn connect(config: KubeClientConfig) -> Result<Self, KubeError> {
        let control_plane = if config.kubeconfig.is_some() || config.context.is_some() {
            KubeControlPlane::new_with_config(
                config.namespace.clone(),
                config.kubeconfig.clone(),
                config.context.clone(),
            )
            .await?
        } else {
            KubeControlPlane::new(config.namespace.clone()).await?
        };

        Self::new(config, Arc::new(control_plane))
    }

    pub fn identity(&self) -> &ClusterIdentity {
        &self.identity
    }

    pub fn namespace(&self) -> &str {
        self.identity.namespace()
    }

    pub fn config(&self) -> &KubeClientConfig {
        &self.config
    }

    /// The master deployment, if this client created or resolved it already.
    pub async fn master_deployment(&self) -> Option<Deployment> {
        self.master.get().await
    }

    fn submit<T, F, Fut>(&self, operation: F) -> KubeFuture<T>
    where
        T: Send + 'static,
        F: FnOnce(Arc<dyn ControlPlane>) -> Fut,
        Fut: Future<Output = Result<T, KubeError>> + Send + 'static,
    {
        self.executor.submit(operation(self.control_plane.clone()))
    }

    /// Creates the master deployment, then its accompanying resources owned by it.
    ///
    /// Completes once every resource has been accepted by the control plane.
    pub async fn create_master(&self, spec: MasterSpecification) -> Result<Deployment, KubeError> {
        SpecValidator::validate_master(&spec)?;

        let MasterSpecification {
            mut deployment,
            mut accompanying_resources,
        } = spec;

        let expected_name = self.identity.deployment_name();
        if deployment.metadata.name.as_deref() != Some(expected_name.as_str()) {
            return Err(KubeError::invalid_spec(format!(
                "Master deployment must be named '{}' for cluster '{}'",
                expected_name,
                self.identity.cluster_id()
            )));
        }

        let namespace = self.namespace().to_string();
        deployment.metadata.namespace = Some(namespace.clone());
        stamp_labels(&mut deployment.metadata, &self.identity.master_labels());

        let common_labels = self.identity.common_labels();
        let master = self.master.clone();

        self.submit(move |cp| async move {
            debug!(
                "Start to create deployment with spec\n{}",
                pretty_yaml(&deployment)
            );
            // The uid of the created object is what dependents must point at.
            let created = cp.create_deployment(&deployment).await?;
            info!(
                deployment = created.metadata.name.as_deref().unwrap_or_default(),
                uid = created.metadata.uid.as_deref().unwrap_or_default(),
                "Master deployment created"
            );

            attach_owner(
                &created,
                accompanying_resources.iter_mut().map(|r| r.metadata_mut()),
            )?;

            for mut resource in accompanying_resources {
                resource.metadata_mut().namespace = Some(namespace.clone());
                stamp_labels(resource.metadata_mut(), &common_labels);
                create_or_replace(cp.as_ref(), resource).await?;
            }

            master.replace(created.clone()).await;
            Ok(created)
        })
        .await
    }

    /// Creates a worker pod owned by the master deployment.
    pub fn create_worker(&self, mut pod: Pod) -> KubeFuture<()> {
        if let Err(e) = SpecValidator::validate_pod(&pod) {
            return KubeFuture::ready(Err(e));
        }

        pod.metadata.namespace = Some(self.namespace().to_string());
        stamp_labels(&mut pod.metadata, &self.identity.worker_labels());

        let master = self.master.clone();
        let identity = self.identity.clone();

        self.submit(move |cp| async move {
            let owner = master
                .get_or_resolve(|| async {
                    let name = identity.deployment_name();
                    cp.get_deployment(&name)
                        .await?
                        .ok_or_else(|| KubeError::MasterNotFound {
                            name,
                            namespace: identity.namespace().to_string(),
                        })
                })
                .await?;

            attach_owner(&owner, [&mut pod.metadata])?;

            debug!("Start to create pod with spec\n{}", pretty_yaml(&pod));
            cp.create_pod(&pod).await?;
            Ok(())
        })
    }

    /// Deletes a worker pod. An absent pod is not an error.
    pub fn stop_worker(&self, name: &str) -> KubeFuture<()> {
        let name = name.to_string();
        self.submit(move |cp| async move {
            if !cp.delete_pod(&name).await? {
                debug!(pod = %name, "Pod to stop does not exist");
            }
            Ok(())
        })
    }

    /// Deletes the master deployment with cascading enabled; dependents are
    /// reclaimed through their owner references.
    pub async fn stop_cluster(&self, cluster_id: &str) -> Result<(), KubeError> {
        let name = ClusterIdentity::new(cluster_id, self.namespace()).deployment_name();
        let master = (cluster_id == self.identity.cluster_id()).then(|| self.master.clone());
        self.submit(move |cp| async move {
            if cp.delete_deployment(&name, true).await? {
                info!(deployment = %name, "Master deployment deleted, dependents will be garbage-collected");
            } else {
                debug!(deployment = %name, "Master deployment already absent");
            }
            if let Some(master) = master {
                master.clear().await;
            }
            Ok(())
        })
        .await
    }

    pub async fn get_service(
        &self,
        kind: ServiceKind,
        cluster_id: &str,
    ) -> Result<Option<Service>, KubeError> {
        let name = ClusterIdentity::new(cluster_id, self.namespace()).service_name(kind);
        self.submit(move |cp| async move {
            let service = cp.get_service(&name).await?;
            if service.is_none() {
                debug!(service = %name, "Service does not exist");
            }
            Ok(service)
        })
        .await
    }

    /// Resolves the REST endpoint of a cluster; `None` until it is reachable.
    pub async fn get_endpoint(&self, cluster_id: &str) -> Result<Option<Endpoint>, KubeError> {
        let Some(service) = self.get_service(ServiceKind::Rest, cluster_id).await? else {
            return Ok(None);
        };

        let identity = ClusterIdentity::new(cluster_id, self.namespace());
        let exposed_type = exposed_type_of(&service, self.config.rest_service_exposed_type)?;
        resolve_with_type(
            exposed_type,
            &service,
            &identity,
            self.control_plane.advertised_host().as_deref(),
        )
    }

    pub async fn list_workers(
        &self,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<WorkerPod>, KubeError> {
        let labels = labels.clone();
        self.submit(move |cp| async move {
            Ok(cp
                .list_pods(&labels)
                .await?
                .into_iter()
                .map(WorkerPod::from)
                .collect())
        })
        .await
    }

    pub async fn watch_workers(
        &self,
        labels: &BTreeMap<String, String>,
        handler: Arc<dyn WatchHandler<WorkerPod>>,
    ) -> Result<WatchHandle, KubeError> {
        let watch_name = format!("pods[{}]", label_selector(labels));
        let labels = labels.clone();
        let stream = self
            .submit(move |cp| async move { cp.watch_pods(&labels).await })
            .await?;

        Ok(dispatch(watch_name, stream, handler, WorkerPod::from))
    }

    pub async fn watch_shared_state(
        &self,
        name: &str,
        handler: Arc<dyn WatchHandler<SharedStateEntry>>,
    ) -> Result<WatchHandle, KubeError> {
        let watch_name = format!("configmap[{}]", name);
        let name = name.to_string();
        let stream = self
            .submit(move |cp| async move { cp.watch_config_map(&name).await })
            .await?;

        Ok(dispatch(watch_name, stream, handler, SharedStateEntry::from))
    }

    /// Builds an elector contending for a lock in this client's namespace.
    ///
    /// The elector is idle until [`LeaderElector::run`] is called.
    pub fn create_leader_elector(
        &self,
        config: LeaderElectionConfig,
        handler: Arc<dyn LeaderCallbackHandler>,
    ) -> Result<Arc<LeaderElector>, KubeError> {
        config.validate()?;
        let lock = ConfigMapLock::new(
            self.control_plane.clone(),
            config.lock_name.clone(),
            config.identity.clone(),
            self.identity.shared_state_labels(),
        );
        Ok(Arc::new(LeaderElector::new(lock, config, handler)))
    }

    pub fn create_shared_state(&self, entry: SharedStateEntry) -> KubeFuture<()> {
        let mut config_map = entry.into_inner();
        config_map.metadata.namespace = Some(self.namespace().to_string());
        stamp_labels(&mut config_map.metadata, &self.identity.shared_state_labels());

        self.submit(move |cp| async move {
            cp.create_config_map(&config_map).await?;
            Ok(())
        })
    }

    pub async fn get_shared_state(&self, name: &str) -> Result<Option<SharedStateEntry>, KubeError> {
        let name = name.to_string();
        self.submit(move |cp| async move {
            Ok(cp.get_config_map(&name).await?.map(SharedStateEntry::from))
        })
        .await
    }

    pub async fn list_shared_state(
        &self,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<SharedStateEntry>, KubeError> {
        let labels = labels.clone();
        self.submit(move |cp| async move {
            Ok(cp
                .list_config_maps(&labels)
                .await?
                .into_iter()
                .map(SharedStateEntry::from)
                .collect())
        })
        .await
    }

    /// Optimistic read-modify-write of a shared-state entry.
    ///
    /// Resolves to `true` if a new version was written and `false` if the
    /// mutator returned `None`.
    pub fn update_shared_state<F>(&self, name: &str, mutator: F) -> KubeFuture<bool>
    where
        F: Fn(&SharedStateEntry) -> Option<SharedStateEntry> + Send + Sync + 'static,
    {
        let name = name.to_string();
        let store = self.state_store.clone();
        self.executor
            .submit(async move { store.check_and_update(&name, mutator).await })
    }

    pub fn delete_shared_state(&self, name: &str) -> KubeFuture<()> {
        let name = name.to_string();
        self.submit(move |cp| async move {
            cp.delete_config_map(&name).await?;
            Ok(())
        })
    }

    pub fn delete_shared_state_by_labels(&self, labels: &BTreeMap<String, String>) -> KubeFuture<()> {
        let labels = labels.clone();
        self.submit(move |cp| async move { cp.delete_config_maps_by_labels(&labels).await })
    }

    /// Points the named port of a master service at `target_port`.
    ///
    /// Does nothing if the service does not exist.
    pub fn update_service_target_port(
        &self,
        kind: ServiceKind,
        cluster_id: &str,
        port_name: &str,
        target_port: i32,
    ) -> KubeFuture<()> {
        let name = ClusterIdentity::new(cluster_id, self.namespace()).service_name(kind);
        let port_name = port_name.to_string();
        debug!("Update {} target port to {}", port_name, target_port);

        self.submit(move |cp| async move {
            let Some(service) = cp.get_service(&name).await? else {
                debug!(service = %name, "Service does not exist, skipping target port update");
                return Ok(());
            };
            let updated = with_target_port(&service, &port_name, target_port)?;
            cp.replace_service(&updated).await?;
            Ok(())
        })
    }

    /// Drains outstanding operations for up to the configured grace period,
    /// then releases the control-plane connection.
    pub async fn close(&self) {
        self.executor.shutdown(self.config.shutdown_grace()).await;
        self.control_plane.close();
        info!(cluster_id = %self.identity.cluster_id(), "Kubernetes client closed");
    }
}

async fn create_or_replace(
    cp: &dyn ControlPlane,
    resource: AccompanyingResource,
) -> Result<(), KubeError> {
    match resource {
        AccompanyingResource::Service(service) => match cp.create_service(&service).await {
            Err(KubeError::ResourceConflict { .. }) => {
                let name = service.metadata.name.clone().unwrap_or_default();
                let mut replacement = service;
                if let Some(existing) = cp.get_service(&name).await? {
                    replacement.metadata.resource_version = existing.metadata.resource_version;
                    if let (Some(existing_spec), Some(new_spec)) =
                        (existing.spec, replacement.spec.as_mut())
                    {
                        new_spec.cluster_ip = existing_spec.cluster_ip;
                        new_spec.cluster_ips = existing_spec.cluster_ips;
                    }
                }
                cp.replace_service(&replacement).await?;
                Ok(())
            }
            other => other.map(|_| ()),
        },
        AccompanyingResource::ConfigMap(config_map) => {
            match cp.create_config_map(&config_map).await {
                Err(KubeError::ResourceConflict { .. }) => {
                    let name = config_map.metadata.name.clone().unwrap_or_default();
                    let mut replacement = config_map;
                    if let Some(existing) = cp.get_config_map(&name).await? {
                        replacement.metadata.resource_version = existing.metadata.resource_version;
                    }
                    cp.replace_config_map(&replacement).await?;
                    Ok(())
                }
                other => other.map(|_| ()),
            }
        }
    }
}

/// Copy of `service` with the target port of `port_name` changed; nothing else differs.
fn with_target_port(
    service: &Service,
    port_name: &str,
    target_port: i32,
) -> Result<Service, KubeError> {
    let mut updated = service.clone();
    let port = updated
        .spec
        .as_mut()
        .and_then(|spec| spec.ports.as_mut())
        .and_then(|ports| {
            ports
                .iter_mut()
                .find(|port| port.name.as_deref() == Some(port_name))
        })
        .ok_or_else(|| {
            KubeError::invalid_spec(format!(
                "Service '{}' has no port named '{}'",
                service.metadata.name.as_deref().unwrap_or_default(),
                port_name
            ))
        })?;

    port.target_port = Some(IntOrString::Int(target_port));
    Ok(updated)
}

fn pretty_yaml<T: Serialize>(resource: &T) -> String {
    serde_yaml::to_string(resource).unwrap_or_else(|e| format!("<unprintable: {}>", e))
}
