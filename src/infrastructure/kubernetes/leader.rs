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

//! Leader election over a config map lock
//!
//! The lock record lives in an annotation of a config map and is only ever
//! written with a version-guarded replace, so two contenders can never both
//! believe they took the lock in the same round.

use crate::domain::cluster::SharedStateEntry;
use crate::domain::config::LeaderElectionConfig;
use crate::infrastructure::constants::LEADER_ANNOTATION_KEY;
use crate::infrastructure::kubernetes::control_plane::ControlPlane;
use crate::shared::error::KubeError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

// Retry delay after losing a version race on the lock entry.
const CONFLICT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Callbacks delivered on leadership changes.
pub trait LeaderCallbackHandler: Send + Sync {
    fn on_granted(&self);

    fn on_revoked(&self);
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderElectionRecord {
    pub holder_identity: String,
    pub lease_duration_seconds: i64,
    pub acquire_time: DateTime<Utc>,
    pub renew_time: DateTime<Utc>,
    pub leader_transitions: i32,
}

impl LeaderElectionRecord {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.holder_identity.is_empty()
            || now > self.renew_time + chrono::Duration::seconds(self.lease_duration_seconds)
    }
}

/// Outcome of one acquire-or-renew round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockAttempt {
    /// The lock record now names this identity.
    Held,
    /// Another identity holds a lease that has not expired.
    HeldByOther,
    /// The lock entry changed between read and write. Shared-state updates
    /// on the same config map cause this as well as other contenders.
    Conflict,
}

/// Distributed lock stored in the annotations of one config map.
pub struct ConfigMapLock {
    control_plane: Arc<dyn ControlPlane>,
    name: String,
    identity: String,
    labels: BTreeMap<String, String>,
}

impl ConfigMapLock {
    pub fn new(
        control_plane: Arc<dyn ControlPlane>,
        name: impl Into<String>,
        identity: impl Into<String>,
        labels: BTreeMap<String, String>,
    ) -> Self {
        Self {
            control_plane,
            name: name.into(),
            identity: identity.into(),
            labels,
        }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub async fn current_record(&self) -> Result<Option<LeaderElectionRecord>, KubeError> {
        Ok(self
            .control_plane
            .get_config_map(&self.name)
            .await?
            .map(SharedStateEntry::from)
            .and_then(|entry| parse_record(&entry)))
    }

    /// Takes the lock if it is free or expired, renews it if already held.
    ///
    pub async fn try_acquire_or_renew(
        &self,
        lease_duration: Duration,
        now: DateTime<Utc>,
    ) -> Result<LockAttempt, KubeError> {
        let existing = self
            .control_plane
            .get_config_map(&self.name)
            .await?
            .map(SharedStateEntry::from);

        let Some(entry) = existing else {
            let record = self.record(lease_duration, now, None);
            let entry = SharedStateEntry::new(&self.name)
                .with_labels(self.labels.clone())
                .with_annotation(LEADER_ANNOTATION_KEY, serde_json::to_string(&record)?);
            return match self
                .control_plane
                .create_config_map(entry.as_config_map())
                .await
            {
                Ok(_) => Ok(LockAttempt::Held),
                Err(KubeError::ResourceConflict { .. }) => Ok(LockAttempt::Conflict),
                Err(e) => Err(e),
            };
        };

        let previous = parse_record(&entry);
        if let Some(ref previous) = previous {
            if previous.holder_identity != self.identity && !previous.is_expired(now) {
                return Ok(LockAttempt::HeldByOther);
            }
        }

        let record = self.record(lease_duration, now, previous.as_ref());
        let updated = entry.with_annotation(LEADER_ANNOTATION_KEY, serde_json::to_string(&record)?);
        match self
            .control_plane
            .replace_config_map(updated.as_config_map())
            .await
        {
            Ok(_) => Ok(LockAttempt::Held),
            Err(e) if e.is_version_conflict() => Ok(LockAttempt::Conflict),
            Err(e) => Err(e),
        }
    }

    /// Clears the holder if this identity still holds the lock.
    pub async fn release(&self) -> Result<(), KubeError> {
        let Some(entry) = self
            .control_plane
            .get_config_map(&self.name)
            .await?
            .map(SharedStateEntry::from)
        else {
            return Ok(());
        };

        let Some(mut record) = parse_record(&entry) else {
            return Ok(());
        };
        if record.holder_identity != self.identity {
            return Ok(());
        }

        record.holder_identity = String::new();
        let updated = entry.with_annotation(LEADER_ANNOTATION_KEY, serde_json::to_string(&record)?);
        match self
            .control_plane
            .replace_config_map(updated.as_config_map())
            .await
        {
            Ok(_) => Ok(()),
            // Someone else already moved the lock on.
            Err(e) if e.is_version_conflict() => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn record(
        &self,
        lease_duration: Duration,
        now: DateTime<Utc>,
        previous: Option<&LeaderElectionRecord>,
    ) -> LeaderElectionRecord {
        let (acquire_time, leader_transitions) = match previous {
            Some(prev) if prev.holder_identity == self.identity => {
                (prev.acquire_time, prev.leader_transitions)
            }
            Some(prev) => (now, prev.leader_transitions + 1),
            None => (now, 0),
        };

        LeaderElectionRecord {
            holder_identity: self.identity.clone(),
            lease_duration_seconds: lease_duration.as_secs() as i64,
            acquire_time,
            renew_time: now,
            leader_transitions,
        }
    }
}

fn parse_record(entry: &SharedStateEntry) -> Option<LeaderElectionRecord> {
    let raw = entry.annotation(LEADER_ANNOTATION_KEY)?;
    match serde_json::from_str(raw) {
        Ok(record) => Some(record),
        Err(e) => {
            warn!(config_map = entry.name(), error = %e, "Ignoring malformed leader record");
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaderState {
    Follower,
    Leader,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Granted,
    Revoked,
}

impl LeaderState {
    pub fn next(self, holds_lock: bool) -> (LeaderState, Option<Transition>) {
        match (self, holds_lock) {
            (LeaderState::Follower, true) => (LeaderState::Leader, Some(Transition::Granted)),
            (LeaderState::Leader, false) => (LeaderState::Follower, Some(Transition::Revoked)),
            (state, _) => (state, None),
        }
    }
}

/// Binds a lock to the caller's callbacks; holds no cluster state of its own.
pub struct LeaderElector {
    lock: ConfigMapLock,
    config: LeaderElectionConfig,
    handler: Arc<dyn LeaderCallbackHandler>,
    state: Mutex<LeaderState>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl LeaderElector {
    pub fn new(
        lock: ConfigMapLock,
        config: LeaderElectionConfig,
        handler: Arc<dyn LeaderCallbackHandler>,
    ) -> Self {
        Self {
            lock,
            config,
            handler,
            state: Mutex::new(LeaderState::Follower),
            cancel: CancellationToken::new(),
            task: Mutex::new(None),
        }
    }

    pub fn is_leader(&self) -> bool {
        self.state() == LeaderState::Leader
    }

    pub fn state(&self) -> LeaderState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Starts contending for the lock in the background.
    pub fn run(self: &Arc<Self>) {
        let mut task = self.task.lock().unwrap_or_else(|e| e.into_inner());
        if task.is_some() {
            return;
        }

        info!(
            identity = %self.config.identity,
            lock = %self.config.lock_name,
            "Starting leader election"
        );
        let elector = Arc::clone(self);
        *task = Some(tokio::spawn(async move { elector.election_loop().await }));
    }

    /// Stops contending, releases the lock and revokes leadership if held.
    pub async fn stop(&self) {
        self.cancel.cancel();
        let task = self.task.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(task) = task {
            let _ = task.await;
        }

        if self.is_leader() {
            if let Err(e) = self.lock.release().await {
                warn!(identity = %self.config.identity, error = %e, "Failed to release leader lock");
            }
            self.apply(false);
        }
    }

    async fn election_loop(&self) {
        let mut last_renewal: Option<Instant> = None;

        loop {
            let mut delay = self.config.retry_period();
            let holds_lock = match self
                .lock
                .try_acquire_or_renew(self.config.lease_duration(), Utc::now())
                .await
            {
                Ok(LockAttempt::Held) => {
                    last_renewal = Some(Instant::now());
                    true
                }
                Ok(LockAttempt::HeldByOther) => {
                    debug!(identity = %self.config.identity, "Leader lock held by another contender");
                    false
                }
                Ok(LockAttempt::Conflict) => {
                    debug!(identity = %self.config.identity, "Leader lock changed concurrently, retrying");
                    delay = delay.min(CONFLICT_RETRY_DELAY);
                    self.keeps_leadership(last_renewal)
                }
                Err(e) => {
                    warn!(
                        identity = %self.config.identity,
                        error = %e,
                        "Failed to acquire or renew leader lock"
                    );
                    self.keeps_leadership(last_renewal)
                }
            };

            self.apply(holds_lock);

            tokio::select! {
                _ = self.cancel.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    // A failed renewal is tolerated until the renew deadline passes.
    fn keeps_leadership(&self, last_renewal: Option<Instant>) -> bool {
        self.is_leader()
            && last_renewal
                .map(|at| at.elapsed() < self.config.renew_deadline())
                .unwrap_or(false)
    }

    fn apply(&self, holds_lock: bool) {
        let transition = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            let (next, transition) = state.next(holds_lock);
            *state = next;
            transition
        };

        match transition {
            Some(Transition::Granted) => {
                info!(identity = %self.config.identity, "Leadership granted");
                self.handler.on_granted();
            }
            Some(Transition::Revoked) => {
                info!(identity = %self.config.identity, "Leadership revoked");
                self.handler.on_revoked();
            }
            None => {}
        }
    }
}
