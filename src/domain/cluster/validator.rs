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

use crate::domain::cluster::resources::{AccompanyingResource, MasterSpecification};
use crate::domain::config::kubernetes::is_valid_k8s_name;
use crate::shared::error::KubeError;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Pod, PodSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

/// Structural checks run before anything is sent to the control plane.
pub struct SpecValidator;

impl SpecValidator {
    pub fn validate_master(spec: &MasterSpecification) -> Result<(), KubeError> {
        Self::validate_deployment(&spec.deployment)?;
        for resource in &spec.accompanying_resources {
            Self::validate_accompanying(resource)?;
        }
        Ok(())
    }

    pub fn validate_deployment(deployment: &Deployment) -> Result<(), KubeError> {
        let name = Self::validate_name("Deployment", &deployment.metadata)?;

        let spec = deployment.spec.as_ref().ok_or_else(|| {
            KubeError::invalid_spec(format!("Deployment '{}' has no spec", name))
        })?;

        let pod_spec = spec.template.spec.as_ref().ok_or_else(|| {
            KubeError::invalid_spec(format!("Deployment '{}' has no pod template spec", name))
        })?;
        Self::validate_pod_spec("Deployment", name, pod_spec)?;

        if let Some(replicas) = spec.replicas {
            if replicas < 0 {
                return Err(KubeError::invalid_spec(format!(
                    "Deployment '{}' has negative replicas: {}",
                    name, replicas
                )));
            }
        }

        Ok(())
    }

    pub fn validate_pod(pod: &Pod) -> Result<(), KubeError> {
        let name = Self::validate_name("Pod", &pod.metadata)?;
        let pod_spec = pod
            .spec
            .as_ref()
            .ok_or_else(|| KubeError::invalid_spec(format!("Pod '{}' has no spec", name)))?;
        Self::validate_pod_spec("Pod", name, pod_spec)
    }

    pub fn validate_accompanying(resource: &AccompanyingResource) -> Result<(), KubeError> {
        let name = Self::validate_name(resource.kind(), resource.metadata())?;
        if let AccompanyingResource::Service(service) = resource {
            let has_ports = service
                .spec
                .as_ref()
                .and_then(|spec| spec.ports.as_ref())
                .map(|ports| !ports.is_empty())
                .unwrap_or(false);
            if !has_ports {
                return Err(KubeError::invalid_spec(format!(
                    "Service '{}' declares no ports",
                    name
                )));
            }
        }
        Ok(())
    }

    fn validate_name<'a>(kind: &str, metadata: &'a ObjectMeta) -> Result<&'a str, KubeError> {
        let name = metadata
            .name
            .as_deref()
            .ok_or_else(|| KubeError::invalid_spec(format!("{} name is required", kind)))?;

        if !is_valid_k8s_name(name) {
            return Err(KubeError::invalid_spec(format!(
                "{} name '{}' is not a valid Kubernetes name",
                kind, name
            )));
        }

        Ok(name)
    }

    fn validate_pod_spec(kind: &str, name: &str, pod_spec: &PodSpec) -> Result<(), KubeError> {
        if pod_spec.containers.is_empty() {
            return Err(KubeError::invalid_spec(format!(
                "{} '{}' declares no containers",
                kind, name
            )));
        }

        for container in &pod_spec.containers {
            if container.name.is_empty() {
                return Err(KubeError::invalid_spec(format!(
                    "{} '{}' has a container without a name",
                    kind, name
                )));
            }
        }

        Ok(())
    }
}
