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

use crate::domain::cluster::SharedStateEntry;
use crate::domain::config::KubeClientConfig;
use crate::infrastructure::constants::KIND_CONFIG_MAP;
use crate::infrastructure::kubernetes::control_plane::ControlPlane;
use crate::shared::error::KubeError;
use backon::{ExponentialBuilder, Retryable};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: usize,
    pub min_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &KubeClientConfig) -> Self {
        Self {
            max_retries: config.max_retry_attempts,
            min_delay: config.retry_min_delay(),
            max_delay: config.retry_max_delay(),
        }
    }

    fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.min_delay)
            .with_max_delay(self.max_delay)
            .with_max_times(self.max_retries)
            .with_jitter()
    }
}

/// Read-modify-write over shared-state config maps guarded by resource versions.
pub struct StateStore {
    control_plane: Arc<dyn ControlPlane>,
    policy: RetryPolicy,
}

impl StateStore {
    pub fn new(control_plane: Arc<dyn ControlPlane>, policy: RetryPolicy) -> Self {
        Self {
            control_plane,
            policy,
        }
    }

    /// Applies `mutator` to the latest version of `name` and writes the result back.
    ///
    /// Returns `Ok(false)` when the mutator reports no change. Only version
    /// conflicts are retried; a missing entry fails at once with
    /// [`KubeError::NotFound`] without any write.
    pub async fn check_and_update<F>(&self, name: &str, mutator: F) -> Result<bool, KubeError>
    where
        F: Fn(&SharedStateEntry) -> Option<SharedStateEntry> + Send + Sync,
    {
        let mutator = &mutator;
        let result = (move || self.try_update_once(name, mutator))
            .retry(self.policy.backoff())
            .when(KubeError::is_version_conflict)
            .notify(|_, delay| {
                debug!(
                    config_map = name,
                    retry_in_ms = delay.as_millis() as u64,
                    "Failed to update ConfigMap because of concurrent modifications, trying again"
                );
            })
            .await;

        match result {
            Err(e) if e.is_version_conflict() => Err(KubeError::ConcurrentModificationExhausted {
                name: name.to_string(),
                attempts: self.policy.max_retries + 1,
            }),
            other => other,
        }
    }

    async fn try_update_once<F>(&self, name: &str, mutator: &F) -> Result<bool, KubeError>
    where
        F: Fn(&SharedStateEntry) -> Option<SharedStateEntry> + Send + Sync,
    {
        let current = self
            .control_plane
            .get_config_map(name)
            .await?
            .map(SharedStateEntry::from)
            .ok_or_else(|| {
                KubeError::not_found(KIND_CONFIG_MAP, name, self.control_plane.namespace())
            })?;

        let Some(updated) = mutator(&current) else {
            return Ok(false);
        };

        // The write is always guarded by the version that was read.
        let mut config_map = updated.into_inner();
        config_map.metadata.name = Some(name.to_string());
        config_map.metadata.resource_version = current.resource_version().map(str::to_string);

        self.control_plane.replace_config_map(&config_map).await?;
        Ok(true)
    }
}
