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

//! `-D key=value` overrides for [`KubeClientConfig`], keyed by the engine's
//! configuration option names.

use crate::domain::config::{KubeClientConfig, ServiceExposedType};
use crate::shared::error::KubeError;
use std::collections::HashMap;
use std::str::FromStr;

pub const KEY_CLUSTER_ID: &str = "kubernetes.cluster-id";
pub const KEY_NAMESPACE: &str = "kubernetes.namespace";
pub const KEY_KUBECONFIG: &str = "kubernetes.config.file";
pub const KEY_CONTEXT: &str = "kubernetes.context";
pub const KEY_MAX_RETRIES: &str = "kubernetes.transactional-operation.max-retries";
pub const KEY_IO_POOL_SIZE: &str = "kubernetes.client.io-pool.size";
pub const KEY_REST_EXPOSED_TYPE: &str = "kubernetes.rest-service.exposed.type";

pub fn apply_to_client_config(
    configs: &HashMap<String, String>,
    config: &mut KubeClientConfig,
) -> Result<(), KubeError> {
    if let Some(cluster_id) = configs.get(KEY_CLUSTER_ID) {
        config.cluster_id = cluster_id.clone();
    }

    if let Some(namespace) = configs.get(KEY_NAMESPACE) {
        config.namespace = namespace.clone();
    }

    if let Some(path) = configs.get(KEY_KUBECONFIG) {
        config.kubeconfig = Some(path.clone());
    }

    if let Some(context) = configs.get(KEY_CONTEXT) {
        config.context = Some(context.clone());
    }

    if let Some(value) = configs.get(KEY_MAX_RETRIES) {
        config.max_retry_attempts = parse_value(KEY_MAX_RETRIES, value)?;
    }

    if let Some(value) = configs.get(KEY_IO_POOL_SIZE) {
        config.io_executor_pool_size = parse_value(KEY_IO_POOL_SIZE, value)?;
    }

    if let Some(value) = configs.get(KEY_REST_EXPOSED_TYPE) {
        config.rest_service_exposed_type = ServiceExposedType::from_str(value)?;
    }

    Ok(())
}

fn parse_value<T: FromStr>(key: &str, value: &str) -> Result<T, KubeError> {
    value
        .trim()
        .parse()
        .map_err(|_| KubeError::Config(format!("Invalid value '{}' for {}", value, key)))
}
