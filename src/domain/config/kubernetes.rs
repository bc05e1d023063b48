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

use crate::infrastructure::constants::*;
use crate::shared::error::KubeError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Settings of one cluster resource client instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KubeClientConfig {
    pub cluster_id: String,
    pub namespace: String,
    pub kubeconfig: Option<String>,
    pub context: Option<String>,
    /// Retries after the first attempt of an optimistic update.
    pub max_retry_attempts: usize,
    pub io_executor_pool_size: usize,
    pub shutdown_grace_secs: u64,
    pub retry_min_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    pub rest_service_exposed_type: ServiceExposedType,
}

impl Default for KubeClientConfig {
    fn default() -> Self {
        Self {
            cluster_id: String::new(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            kubeconfig: None,
            context: None,
            max_retry_attempts: DEFAULT_MAX_RETRY_ATTEMPTS,
            io_executor_pool_size: DEFAULT_IO_POOL_SIZE,
            shutdown_grace_secs: DEFAULT_SHUTDOWN_GRACE_SECS,
            retry_min_delay_ms: DEFAULT_RETRY_MIN_DELAY_MS,
            retry_max_delay_ms: DEFAULT_RETRY_MAX_DELAY_MS,
            rest_service_exposed_type: ServiceExposedType::ClusterIP,
        }
    }
}

impl KubeClientConfig {
    pub fn new(cluster_id: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            cluster_id: cluster_id.into(),
            namespace: namespace.into(),
            ..Default::default()
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self, KubeError> {
        let config: KubeClientConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, KubeError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    pub fn retry_min_delay(&self) -> Duration {
        Duration::from_millis(self.retry_min_delay_ms)
    }

    pub fn retry_max_delay(&self) -> Duration {
        Duration::from_millis(self.retry_max_delay_ms)
    }

    pub fn validate(&self) -> Result<(), KubeError> {
        if !is_valid_k8s_name(&self.cluster_id) {
            return Err(KubeError::Config(format!(
                "Invalid cluster_id: '{}'",
                self.cluster_id
            )));
        }

        if self.cluster_id.len() > MAX_CLUSTER_ID_LEN {
            return Err(KubeError::Config(format!(
                "cluster_id too long (max {} chars): {}",
                MAX_CLUSTER_ID_LEN, self.cluster_id
            )));
        }

        if !is_valid_k8s_name(&self.namespace) {
            return Err(KubeError::Config(format!(
                "Invalid namespace: '{}'",
                self.namespace
            )));
        }

        if self.io_executor_pool_size == 0 {
            return Err(KubeError::Config(
                "io_executor_pool_size must be > 0".to_string(),
            ));
        }

        if self.retry_min_delay_ms > self.retry_max_delay_ms {
            return Err(KubeError::Config(format!(
                "retry_min_delay_ms ({}) must not exceed retry_max_delay_ms ({})",
                self.retry_min_delay_ms, self.retry_max_delay_ms
            )));
        }

        Ok(())
    }
}

/// How the REST service of the master is exposed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceExposedType {
    ClusterIP,
    NodePort,
    LoadBalancer,
}

impl ServiceExposedType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceExposedType::ClusterIP => "ClusterIP",
            ServiceExposedType::NodePort => "NodePort",
            ServiceExposedType::LoadBalancer => "LoadBalancer",
        }
    }
}

impl std::str::FromStr for ServiceExposedType {
    type Err = KubeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ClusterIP" => Ok(ServiceExposedType::ClusterIP),
            "NodePort" => Ok(ServiceExposedType::NodePort),
            "LoadBalancer" => Ok(ServiceExposedType::LoadBalancer),
            _ => Err(KubeError::Config(format!("Invalid service type: {}", s))),
        }
    }
}

/// Parameters of one leader election, bound to a lock resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderElectionConfig {
    pub lock_name: String,
    pub identity: String,
    #[serde(default = "default_lease_duration_secs")]
    pub lease_duration_secs: u64,
    #[serde(default = "default_renew_deadline_secs")]
    pub renew_deadline_secs: u64,
    #[serde(default = "default_retry_period_secs")]
    pub retry_period_secs: u64,
}

fn default_lease_duration_secs() -> u64 {
    DEFAULT_LEASE_DURATION_SECS
}

fn default_renew_deadline_secs() -> u64 {
    DEFAULT_RENEW_DEADLINE_SECS
}

fn default_retry_period_secs() -> u64 {
    DEFAULT_RETRY_PERIOD_SECS
}

impl LeaderElectionConfig {
    pub fn new(lock_name: impl Into<String>, identity: impl Into<String>) -> Self {
        Self {
            lock_name: lock_name.into(),
            identity: identity.into(),
            lease_duration_secs: DEFAULT_LEASE_DURATION_SECS,
            renew_deadline_secs: DEFAULT_RENEW_DEADLINE_SECS,
            retry_period_secs: DEFAULT_RETRY_PERIOD_SECS,
        }
    }

    pub fn lease_duration(&self) -> Duration {
        Duration::from_secs(self.lease_duration_secs)
    }

    pub fn renew_deadline(&self) -> Duration {
        Duration::from_secs(self.renew_deadline_secs)
    }

    pub fn retry_period(&self) -> Duration {
        Duration::from_secs(self.retry_period_secs)
    }

    pub fn validate(&self) -> Result<(), KubeError> {
        if !is_valid_k8s_name(&self.lock_name) {
            return Err(KubeError::Config(format!(
                "Invalid leader election lock name: '{}'",
                self.lock_name
            )));
        }

        if self.identity.is_empty() {
            return Err(KubeError::Config(
                "Leader election identity must not be empty".to_string(),
            ));
        }

        if self.renew_deadline_secs >= self.lease_duration_secs {
            return Err(KubeError::Config(
                "renew_deadline must be shorter than lease_duration".to_string(),
            ));
        }

        if self.retry_period_secs == 0 {
            return Err(KubeError::Config("retry_period must be > 0".to_string()));
        }

        Ok(())
    }
}

pub(crate) fn is_valid_k8s_name(name: &str) -> bool {
    if name.is_empty() || name.len() > 253 {
        return false;
    }

    if !name.chars().next().unwrap_or(' ').is_ascii_alphanumeric() {
        return false;
    }
    if !name.chars().last().unwrap_or(' ').is_ascii_alphanumeric() {
        return false;
    }

    name.chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '.')
}
