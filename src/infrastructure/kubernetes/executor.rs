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

use crate::shared::error::KubeError;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

/// Result of an operation submitted to the [`IoExecutor`].
///
/// Dropping it does not stop the submitted work; in-flight calls always run to completion.
#[must_use = "dropping a KubeFuture does not cancel the submitted operation"]
pub struct KubeFuture<T> {
    inner: BoxFuture<'static, Result<T, KubeError>>,
}

impl<T: Send + 'static> KubeFuture<T> {
    pub fn ready(result: Result<T, KubeError>) -> Self {
        Self {
            inner: futures::future::ready(result).boxed(),
        }
    }
}

impl<T> Future for KubeFuture<T> {
    type Output = Result<T, KubeError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.inner.poll_unpin(cx)
    }
}

/// Bounded pool running every blocking control-plane call off the caller's task.
pub struct IoExecutor {
    handle: Handle,
    permits: Arc<Semaphore>,
    tracker: TaskTracker,
    shutdown: CancellationToken,
}

impl IoExecutor {
    pub fn new(pool_size: usize) -> Result<Self, KubeError> {
        if pool_size == 0 {
            return Err(KubeError::Config(
                "io executor pool size must be > 0".to_string(),
            ));
        }

        let handle = Handle::try_current().map_err(|e| {
            KubeError::Config(format!("Kubernetes client requires a Tokio runtime: {}", e))
        })?;

        Ok(Self {
            handle,
            permits: Arc::new(Semaphore::new(pool_size)),
            tracker: TaskTracker::new(),
            shutdown: CancellationToken::new(),
        })
    }

    pub fn submit<T, F>(&self, task: F) -> KubeFuture<T>
    where
        T: Send + 'static,
        F: Future<Output = Result<T, KubeError>> + Send + 'static,
    {
        if self.tracker.is_closed() {
            return KubeFuture::ready(Err(KubeError::Closed));
        }

        let permits = self.permits.clone();
        let shutdown = self.shutdown.clone();
        let join = self.tracker.spawn_on(
            async move {
                let permit = tokio::select! {
                    permit = permits.acquire_owned() => permit.ok(),
                    _ = shutdown.cancelled() => None,
                };
                let Some(_permit) = permit else {
                    return Err(KubeError::Closed);
                };

                tokio::select! {
                    result = task => result,
                    _ = shutdown.cancelled() => Err(KubeError::TaskAborted(
                        "executor was shut down before the operation completed".to_string(),
                    )),
                }
            },
            &self.handle,
        );

        KubeFuture {
            inner: async move {
                match join.await {
                    Ok(result) => result,
                    Err(e) => Err(KubeError::TaskAborted(e.to_string())),
                }
            }
            .boxed(),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tracker.is_closed()
    }

    /// Stops accepting work and waits up to `grace` before cancelling what is left.
    pub async fn shutdown(&self, grace: Duration) {
        self.tracker.close();
        debug!(outstanding = self.tracker.len(), "Shutting down io executor");

        if tokio::time::timeout(grace, self.tracker.wait()).await.is_err() {
            warn!(
                outstanding = self.tracker.len(),
                grace_secs = grace.as_secs(),
                "Io executor did not drain within grace period, cancelling remaining tasks"
            );
            self.shutdown.cancel();
            self.tracker.wait().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_submit_returns_task_result() {
        let executor = IoExecutor::new(2).unwrap();
        let value = executor.submit(async { Ok(41 + 1) }).await.unwrap();
        assert_eq!(value, 42);
    }

    #[tokio::test]
    async fn test_errors_propagate_through_future() {
        let executor = IoExecutor::new(1).unwrap();
        let result: Result<(), _> = executor
            .submit(async { Err(KubeError::orchestration("boom")) })
            .await;
        assert!(matches!(result, Err(KubeError::Orchestration { .. })));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_pool_bounds_concurrency() {
        let executor = IoExecutor::new(2).unwrap();
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let futures: Vec<_> = (0..8)
            .map(|_| {
                let running = running.clone();
                let peak = peak.clone();
                executor.submit(async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                })
            })
            .collect();

        for result in futures::future::join_all(futures).await {
            result.unwrap();
        }
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_submit_after_shutdown_is_rejected() {
        let executor = IoExecutor::new(1).unwrap();
        executor.shutdown(Duration::from_millis(10)).await;
        assert!(executor.is_closed());
        let result = executor.submit(async { Ok(()) }).await;
        assert!(matches!(result, Err(KubeError::Closed)));
    }

    #[tokio::test]
    async fn test_shutdown_cancels_stragglers_after_grace() {
        let executor = IoExecutor::new(1).unwrap();
        let pending = executor.submit(async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        });

        executor.shutdown(Duration::from_millis(20)).await;
        assert!(matches!(pending.await, Err(KubeError::TaskAborted(_))));
    }

    #[test]
    fn test_requires_runtime() {
        assert!(matches!(IoExecutor::new(1), Err(KubeError::Config(_))));
    }
}
