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

//! Kubernetes-backed cluster resource client

pub mod client;
pub mod control_plane;
pub mod endpoint;
pub mod executor;
pub mod leader;
pub mod owner;
pub mod state_store;
pub mod watch;

pub use self::client::FlinkKubeClient;
pub use self::control_plane::{ControlPlane, EventStream, KubeControlPlane, ResourceEvent};
pub use self::executor::{IoExecutor, KubeFuture};
pub use self::leader::{
    ConfigMapLock, LeaderCallbackHandler, LeaderElectionRecord, LeaderElector, LeaderState,
    LockAttempt,
};
pub use self::state_store::{RetryPolicy, StateStore};
pub use self::watch::{WatchHandle, WatchHandler};
