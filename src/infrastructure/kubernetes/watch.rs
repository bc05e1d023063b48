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

use crate::infrastructure::kubernetes::control_plane::{EventStream, ResourceEvent};
use crate::shared::error::KubeError;
use futures::StreamExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Receives the events of one watch.
///
/// `on_error` is terminal: the watch is closed afterwards and is not
/// re-established automatically.
pub trait WatchHandler<T>: Send + Sync {
    fn on_changed(&self, resource: T);

    fn on_removed(&self, resource: T);

    fn on_error(&self, error: KubeError);
}

/// A live subscription. Closing or dropping it releases the underlying watch connection.
pub struct WatchHandle {
    name: String,
    closed: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl WatchHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            debug!(watch = %self.name, "Closing watch");
        }
        self.task.abort();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst) || self.task.is_finished()
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Forwards `stream` to `handler` on a background task until the first error.
pub fn dispatch<K, T, F>(
    name: impl Into<String>,
    mut stream: EventStream<K>,
    handler: Arc<dyn WatchHandler<T>>,
    convert: F,
) -> WatchHandle
where
    K: Send + 'static,
    T: Send + 'static,
    F: Fn(K) -> T + Send + 'static,
{
    let name = name.into();
    let closed = Arc::new(AtomicBool::new(false));

    let task_name = name.clone();
    let task_closed = closed.clone();
    let task = tokio::spawn(async move {
        while let Some(event) = stream.next().await {
            match event {
                ResourceEvent::Added(obj) | ResourceEvent::Modified(obj) => {
                    handler.on_changed(convert(obj))
                }
                ResourceEvent::Deleted(obj) => handler.on_removed(convert(obj)),
                ResourceEvent::Error(error) => {
                    warn!(watch = %task_name, error = %error, "Watch failed, closing it");
                    task_closed.store(true, Ordering::SeqCst);
                    handler.on_error(error);
                    return;
                }
            }
        }

        task_closed.store(true, Ordering::SeqCst);
        handler.on_error(KubeError::orchestration(format!(
            "watch '{}' was closed by the control plane",
            task_name
        )));
    });

    WatchHandle { name, closed, task }
}
