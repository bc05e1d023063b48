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

use crate::domain::cluster::identity::label_selector;
use crate::infrastructure::constants::*;
use crate::shared::error::KubeError;
use futures::stream::BoxStream;
use futures::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Pod, Service};
use k8s_openapi::NamespaceResourceScope;
use kube::api::{DeleteParams, ListParams, PostParams, WatchEvent, WatchParams};
use kube::{Api, Client, Resource};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Debug;

/// One change notification from a resource watch.
#[derive(Debug)]
pub enum ResourceEvent<K> {
    Added(K),
    Modified(K),
    Deleted(K),
    Error(KubeError),
}

pub type EventStream<K> = BoxStream<'static, ResourceEvent<K>>;

/// Typed operations against the orchestration control plane, scoped to one namespace.
///
/// Absent objects are reported as `None` (get) or `false` (delete), never as errors.
/// A replace carrying a stale `metadata.resourceVersion` fails with
/// [`KubeError::VersionConflict`].
#[async_trait::async_trait]
pub trait ControlPlane: Send + Sync {
    fn namespace(&self) -> &str;

    /// Host of the API server, reachable from outside the cluster.
    fn advertised_host(&self) -> Option<String>;

    async fn create_deployment(&self, deployment: &Deployment) -> Result<Deployment, KubeError>;

    async fn get_deployment(&self, name: &str) -> Result<Option<Deployment>, KubeError>;

    /// With `cascade` the platform garbage-collects every dependent owned by the deployment.
    async fn delete_deployment(&self, name: &str, cascade: bool) -> Result<bool, KubeError>;

    async fn create_pod(&self, pod: &Pod) -> Result<Pod, KubeError>;

    async fn list_pods(&self, labels: &BTreeMap<String, String>) -> Result<Vec<Pod>, KubeError>;

    async fn delete_pod(&self, name: &str) -> Result<bool, KubeError>;

    async fn watch_pods(
        &self,
        labels: &BTreeMap<String, String>,
    ) -> Result<EventStream<Pod>, KubeError>;

    async fn create_service(&self, service: &Service) -> Result<Service, KubeError>;

    async fn get_service(&self, name: &str) -> Result<Option<Service>, KubeError>;

    async fn replace_service(&self, service: &Service) -> Result<Service, KubeError>;

    async fn create_config_map(&self, config_map: &ConfigMap) -> Result<ConfigMap, KubeError>;

    async fn get_config_map(&self, name: &str) -> Result<Option<ConfigMap>, KubeError>;

    async fn list_config_maps(
        &self,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<ConfigMap>, KubeError>;

    async fn replace_config_map(&self, config_map: &ConfigMap) -> Result<ConfigMap, KubeError>;

    async fn delete_config_map(&self, name: &str) -> Result<bool, KubeError>;

    async fn delete_config_maps_by_labels(
        &self,
        labels: &BTreeMap<String, String>,
    ) -> Result<(), KubeError>;

    async fn watch_config_map(&self, name: &str) -> Result<EventStream<ConfigMap>, KubeError>;

    /// Releases the connection. Later calls may fail.
    fn close(&self) {}
}

#[derive(Debug, Clone, Copy)]
enum Operation {
    Create,
    Replace,
    Other,
}

pub struct KubeControlPlane {
    client: Client,
    namespace: String,
    advertised_host: Option<String>,
}

impl KubeControlPlane {
    pub async fn new(namespace: String) -> Result<Self, KubeError> {
        let config = kube::Config::infer().await.map_err(|e| {
            KubeError::Config(format!("Failed to infer Kubernetes config: {}", e))
        })?;
        Self::from_config(namespace, config)
    }

    pub async fn new_with_config(
        namespace: String,
        kubeconfig_path: Option<String>,
        context: Option<String>,
    ) -> Result<Self, KubeError> {
        use kube::config::{KubeConfigOptions, Kubeconfig};

        let kubeconfig = if let Some(path) = kubeconfig_path {
            Kubeconfig::read_from(path)
                .map_err(|e| KubeError::Config(format!("Failed to load kubeconfig: {}", e)))?
        } else {
            Kubeconfig::read()
                .map_err(|e| KubeError::Config(format!("Failed to load kubeconfig: {}", e)))?
        };

        let config_options = KubeConfigOptions {
            context,
            cluster: None,
            user: None,
        };

        let config = kube::Config::from_custom_kubeconfig(kubeconfig, &config_options)
            .await
            .map_err(|e| KubeError::Config(format!("Failed to create Kubernetes config: {}", e)))?;

        Self::from_config(namespace, config)
    }

    fn from_config(namespace: String, config: kube::Config) -> Result<Self, KubeError> {
        let advertised_host = config.cluster_url.host().map(str::to_string);
        let client = Client::try_from(config)
            .map_err(|e| KubeError::Config(format!("Failed to create Kubernetes client: {}", e)))?;

        Ok(Self {
            client,
            namespace,
            advertised_host,
        })
    }

    pub fn get_client(&self) -> Client {
        self.client.clone()
    }

    fn api<K>(&self) -> Api<K>
    where
        K: Resource<Scope = NamespaceResourceScope>,
        <K as Resource>::DynamicType: Default,
    {
        Api::namespaced(self.client.clone(), &self.namespace)
    }

    fn map_error(&self, err: kube::Error, kind: &str, name: &str, op: Operation) -> KubeError {
        match (&err, op) {
            (kube::Error::Api(ae), Operation::Create) if ae.code == 409 => {
                KubeError::resource_conflict(kind, name, &self.namespace)
            }
            (kube::Error::Api(ae), Operation::Replace) if ae.code == 409 => {
                KubeError::version_conflict(kind, name)
            }
            (kube::Error::Api(ae), _) if ae.code == 400 || ae.code == 422 => {
                KubeError::InvalidSpec(format!("{} '{}': {}", kind, name, ae.message))
            }
            _ => KubeError::from(err),
        }
    }

    async fn create<K>(&self, kind: &str, obj: &K) -> Result<K, KubeError>
    where
        K: Resource<Scope = NamespaceResourceScope>
            + Clone
            + DeserializeOwned
            + Serialize
            + Debug,
        <K as Resource>::DynamicType: Default,
    {
        let name = obj.meta().name.clone().unwrap_or_default();
        self.api::<K>()
            .create(&PostParams::default(), obj)
            .await
            .map_err(|e| self.map_error(e, kind, &name, Operation::Create))
    }

    async fn get<K>(&self, kind: &str, name: &str) -> Result<Option<K>, KubeError>
    where
        K: Resource<Scope = NamespaceResourceScope> + Clone + DeserializeOwned + Debug,
        <K as Resource>::DynamicType: Default,
    {
        self.api::<K>()
            .get_opt(name)
            .await
            .map_err(|e| self.map_error(e, kind, name, Operation::Other))
    }

    async fn replace<K>(&self, kind: &str, obj: &K) -> Result<K, KubeError>
    where
        K: Resource<Scope = NamespaceResourceScope>
            + Clone
            + DeserializeOwned
            + Serialize
            + Debug,
        <K as Resource>::DynamicType: Default,
    {
        let name = obj
            .meta()
            .name
            .clone()
            .ok_or_else(|| KubeError::invalid_spec(format!("{} name is required", kind)))?;
        self.api::<K>()
            .replace(&name, &PostParams::default(), obj)
            .await
            .map_err(|e| self.map_error(e, kind, &name, Operation::Replace))
    }

    async fn list<K>(&self, kind: &str, labels: &BTreeMap<String, String>) -> Result<Vec<K>, KubeError>
    where
        K: Resource<Scope = NamespaceResourceScope> + Clone + DeserializeOwned + Debug,
        <K as Resource>::DynamicType: Default,
    {
        let lp = ListParams::default().labels(&label_selector(labels));
        self.api::<K>()
            .list(&lp)
            .await
            .map(|list| list.items)
            .map_err(|e| self.map_error(e, kind, "", Operation::Other))
    }

    async fn delete<K>(&self, kind: &str, name: &str, dp: &DeleteParams) -> Result<bool, KubeError>
    where
        K: Resource<Scope = NamespaceResourceScope> + Clone + DeserializeOwned + Debug,
        <K as Resource>::DynamicType: Default,
    {
        match self.api::<K>().delete(name, dp).await {
            Ok(_) => Ok(true),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(false),
            Err(e) => Err(self.map_error(e, kind, name, Operation::Other)),
        }
    }

    async fn watch<K>(&self, kind: &str, wp: &WatchParams) -> Result<EventStream<K>, KubeError>
    where
        K: Resource<Scope = NamespaceResourceScope>
            + Clone
            + DeserializeOwned
            + Debug
            + Send
            + 'static,
        <K as Resource>::DynamicType: Default,
    {
        let stream = self
            .api::<K>()
            .watch(wp, "0")
            .await
            .map_err(|e| self.map_error(e, kind, "", Operation::Other))?;

        Ok(stream
            .filter_map(|item| async move {
                match item {
                    Ok(WatchEvent::Added(obj)) => Some(ResourceEvent::Added(obj)),
                    Ok(WatchEvent::Modified(obj)) => Some(ResourceEvent::Modified(obj)),
                    Ok(WatchEvent::Deleted(obj)) => Some(ResourceEvent::Deleted(obj)),
                    Ok(WatchEvent::Bookmark(_)) => None,
                    Ok(WatchEvent::Error(status)) => {
                        Some(ResourceEvent::Error(KubeError::orchestration(format!(
                            "watch failed with status {}: {}",
                            status.code, status.message
                        ))))
                    }
                    Err(e) => Some(ResourceEvent::Error(KubeError::from(e))),
                }
            })
            .boxed())
    }
}

#[async_trait::async_trait]
impl ControlPlane for KubeControlPlane {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    fn advertised_host(&self) -> Option<String> {
        self.advertised_host.clone()
    }

    async fn create_deployment(&self, deployment: &Deployment) -> Result<Deployment, KubeError> {
        self.create(DEPLOYMENT_KIND, deployment).await
    }

    async fn get_deployment(&self, name: &str) -> Result<Option<Deployment>, KubeError> {
        self.get(DEPLOYMENT_KIND, name).await
    }

    async fn delete_deployment(&self, name: &str, cascade: bool) -> Result<bool, KubeError> {
        let dp = if cascade {
            DeleteParams::background()
        } else {
            DeleteParams::orphan()
        };
        self.delete::<Deployment>(DEPLOYMENT_KIND, name, &dp).await
    }

    async fn create_pod(&self, pod: &Pod) -> Result<Pod, KubeError> {
        self.create(KIND_POD, pod).await
    }

    async fn list_pods(&self, labels: &BTreeMap<String, String>) -> Result<Vec<Pod>, KubeError> {
        self.list(KIND_POD, labels).await
    }

    async fn delete_pod(&self, name: &str) -> Result<bool, KubeError> {
        self.delete::<Pod>(KIND_POD, name, &DeleteParams::default())
            .await
    }

    async fn watch_pods(
        &self,
        labels: &BTreeMap<String, String>,
    ) -> Result<EventStream<Pod>, KubeError> {
        let wp = WatchParams::default().labels(&label_selector(labels));
        self.watch(KIND_POD, &wp).await
    }

    async fn create_service(&self, service: &Service) -> Result<Service, KubeError> {
        self.create(KIND_SERVICE, service).await
    }

    async fn get_service(&self, name: &str) -> Result<Option<Service>, KubeError> {
        self.get(KIND_SERVICE, name).await
    }

    async fn replace_service(&self, service: &Service) -> Result<Service, KubeError> {
        self.replace(KIND_SERVICE, service).await
    }

    async fn create_config_map(&self, config_map: &ConfigMap) -> Result<ConfigMap, KubeError> {
        self.create(KIND_CONFIG_MAP, config_map).await
    }

    async fn get_config_map(&self, name: &str) -> Result<Option<ConfigMap>, KubeError> {
        self.get(KIND_CONFIG_MAP, name).await
    }

    async fn list_config_maps(
        &self,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<ConfigMap>, KubeError> {
        self.list(KIND_CONFIG_MAP, labels).await
    }

    async fn replace_config_map(&self, config_map: &ConfigMap) -> Result<ConfigMap, KubeError> {
        self.replace(KIND_CONFIG_MAP, config_map).await
    }

    async fn delete_config_map(&self, name: &str) -> Result<bool, KubeError> {
        self.delete::<ConfigMap>(KIND_CONFIG_MAP, name, &DeleteParams::default())
            .await
    }

    async fn delete_config_maps_by_labels(
        &self,
        labels: &BTreeMap<String, String>,
    ) -> Result<(), KubeError> {
        let api: Api<ConfigMap> = self.api();
        let lp = ListParams::default().labels(&label_selector(labels));

        api.delete_collection(&DeleteParams::default(), &lp)
            .await
            .map_err(|e| self.map_error(e, KIND_CONFIG_MAP, "", Operation::Other))?;
        Ok(())
    }

    async fn watch_config_map(&self, name: &str) -> Result<EventStream<ConfigMap>, KubeError> {
        let wp = WatchParams::default().fields(&format!("metadata.name={}", name));
        self.watch(KIND_CONFIG_MAP, &wp).await
    }
}
