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

use thiserror::Error;
pub type Result<T> = std::result::Result<T, KubeError>;

#[derive(Error, Debug)]
pub enum KubeError {
    #[error("Invalid resource specification: {0}")]
    InvalidSpec(String),

    #[error("Resource already exists: {resource_type} '{name}' in namespace '{namespace}'")]
    ResourceConflict {
        resource_type: String,
        name: String,
        namespace: String,
    },

    #[error("Master deployment '{name}' not found in namespace '{namespace}'")]
    MasterNotFound { name: String, namespace: String },

    #[error("Resource not found: {resource_type} '{name}' in namespace '{namespace}'")]
    NotFound {
        resource_type: String,
        name: String,
        namespace: String,
    },

    /// The control plane rejected a write because the resource version moved on.
    #[error("Resource version conflict on {resource_type} '{name}'")]
    VersionConflict { resource_type: String, name: String },

    #[error("Gave up updating '{name}' after {attempts} attempts due to concurrent modifications")]
    ConcurrentModificationExhausted { name: String, attempts: usize },

    #[error("Kubernetes API error: {message}")]
    Orchestration {
        message: String,
        #[source]
        source: Option<kube::Error>,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Kubernetes client is closed")]
    Closed,

    #[error("Background task aborted: {0}")]
    TaskAborted(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),
}

impl From<kube::Error> for KubeError {
    fn from(err: kube::Error) -> Self {
        KubeError::Orchestration {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl KubeError {
    pub fn config_error(context: impl Into<String>) -> Self {
        Self::Config(context.into())
    }

    pub fn invalid_spec(context: impl Into<String>) -> Self {
        Self::InvalidSpec(context.into())
    }

    pub fn orchestration(message: impl Into<String>) -> Self {
        Self::Orchestration {
            message: message.into(),
            source: None,
        }
    }

    pub fn not_found(
        resource_type: impl Into<String>,
        name: impl Into<String>,
        namespace: impl Into<String>,
    ) -> Self {
        Self::NotFound {
            resource_type: resource_type.into(),
            name: name.into(),
            namespace: namespace.into(),
        }
    }

    pub fn resource_conflict(
        resource_type: impl Into<String>,
        name: impl Into<String>,
        namespace: impl Into<String>,
    ) -> Self {
        Self::ResourceConflict {
            resource_type: resource_type.into(),
            name: name.into(),
            namespace: namespace.into(),
        }
    }

    pub fn version_conflict(resource_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self::VersionConflict {
            resource_type: resource_type.into(),
            name: name.into(),
        }
    }

    /// The only failure the optimistic update path retries.
    pub fn is_version_conflict(&self) -> bool {
        matches!(self, KubeError::VersionConflict { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            KubeError::NotFound { .. } | KubeError::MasterNotFound { .. }
        )
    }
}
