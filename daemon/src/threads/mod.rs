// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Worker thread lifecycle registry.
//!
//! The registry is the sole owner of worker records: a worker is in the
//! registry exactly while it is alive, facades refer to workers only by
//! identifier, and identifiers are never reused. Stopping a worker
//! removes its record under the lock, then cancels and joins outside
//! it, so enumeration never blocks behind a shutdown.

pub mod cancel;
pub mod cpulist;
pub mod sched;

use crate::error::{CoreError, Result};
use crate::events::{self, Event};
use crate::nic;
use cancel::CancelToken;
use log::{error, info, warn};
use ringtap_common::system::fd_to_path;
use sched::{SchedCapability, SchedPolicy};
use std::collections::BTreeMap;
use std::os::unix::io::RawFd;
use std::os::unix::thread::JoinHandleExt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::thread::{Builder, JoinHandle};

/// Stable worker identifier, allocated at start and never reused.
pub type WorkerId = u64;

const INITIAL_WORKER_ID: WorkerId = 1000;

// Ids come from a process-wide monotonic counter and are never reused,
// so a stale id can never alias a newer worker.
static NEXT_WORKER_ID: AtomicU64 = AtomicU64::new(INITIAL_WORKER_ID);

fn next_worker_id() -> WorkerId {
    NEXT_WORKER_ID.fetch_add(1, Ordering::Relaxed)
}

/// What a worker does.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkerKind {
    Capture,
    Replay,
}

impl WorkerKind {
    pub fn name(self) -> &'static str {
        match self {
            WorkerKind::Capture => "capture",
            WorkerKind::Replay => "replay",
        }
    }
}

/// Aggregated health of a worker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkerHealth {
    /// Draining or filling its ring.
    Ok,
    /// Parked in a readiness wait.
    Stalled,
    /// Exited after a pcap failure.
    FileError,
}

/// State a worker shares with the registry and the facades.
///
/// Carries the configuration snapshot reported over RPC plus the
/// worker-updated health value.
pub struct WorkerShared {
    kind: WorkerKind,
    interface: String,
    ifindex: u32,
    frame_size: u32,
    frame_count: u32,
    pcap_path: PathBuf,
    pcap_fd: RawFd,
    health: Mutex<WorkerHealth>,
}

impl WorkerShared {
    pub fn new(
        kind: WorkerKind,
        interface: String,
        ifindex: u32,
        frame_size: u32,
        frame_count: u32,
        pcap_path: PathBuf,
        pcap_fd: RawFd,
    ) -> WorkerShared {
        WorkerShared {
            kind,
            interface,
            ifindex,
            frame_size,
            frame_count,
            pcap_path,
            pcap_fd,
            health: Mutex::new(WorkerHealth::Ok),
        }
    }

    pub fn kind(&self) -> WorkerKind {
        self.kind
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }

    pub fn ifindex(&self) -> u32 {
        self.ifindex
    }

    pub fn frame_size(&self) -> u32 {
        self.frame_size
    }

    pub fn frame_count(&self) -> u32 {
        self.frame_count
    }

    /// Path of the pcap file, resolved through the process's open-file
    /// directory while the descriptor is open, as requested otherwise.
    pub fn pcap_path(&self) -> PathBuf {
        fd_to_path(self.pcap_fd).unwrap_or_else(|_| self.pcap_path.clone())
    }

    pub fn health(&self) -> WorkerHealth {
        *self.health.lock().expect("Failed to acquire lock on worker health")
    }

    pub(crate) fn set_health(&self, health: WorkerHealth) {
        *self.health.lock().expect("Failed to acquire lock on worker health") = health;
    }
}

/// Snapshot of one worker for enumeration. Owned data only; no handle
/// into the worker's resources.
#[derive(Clone, Debug)]
pub struct WorkerView {
    pub id: WorkerId,
    pub kind: WorkerKind,
    pub health: WorkerHealth,
    pub interface: String,
    pub pcap: PathBuf,
    pub frame_size: u32,
    pub frame_count: u32,
    pub policy: SchedPolicy,
    pub priority: i32,
    pub cpu_affinity: String,
}

/// A scheduling change to apply; unset fields keep their value.
#[derive(Clone, Debug, Default)]
pub struct SchedSettings {
    pub policy: Option<SchedPolicy>,
    pub priority: Option<i32>,
    /// CPU list in the `0,5,7,9-11` grammar.
    pub cpu_list: Option<String>,
}

struct WorkerRecord {
    kind: WorkerKind,
    shared: std::sync::Arc<WorkerShared>,
    cancel: CancelToken,
    handle: JoinHandle<()>,
    pthread: libc::pthread_t,
}

/// The process-wide collection of running workers.
pub struct WorkerRegistry {
    workers: Mutex<BTreeMap<WorkerId, WorkerRecord>>,
}

impl WorkerRegistry {
    pub fn new() -> WorkerRegistry {
        WorkerRegistry { workers: Mutex::new(BTreeMap::new()) }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<WorkerId, WorkerRecord>> {
        self.workers.lock().expect("Failed to acquire lock on worker registry")
    }

    /// Spawn `body` on a dedicated thread and record it. The body owns
    /// the worker's ring, pcap handle, and filter; they drop when it
    /// returns.
    pub fn start<F>(
        &self,
        kind: WorkerKind,
        shared: std::sync::Arc<WorkerShared>,
        cancel: CancelToken,
        body: F,
    ) -> Result<WorkerId>
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        let id = next_worker_id();
        let handle = Builder::new()
            .name(format!("{}-{}", kind.name(), id))
            .spawn(move || {
                if let Err(err) = body() {
                    error!("{} worker {} exited with error: {}", kind.name(), id, err);
                }
            })
            .map_err(CoreError::Io)?;
        let pthread = handle.as_pthread_t();
        let record = WorkerRecord { kind, shared, cancel, handle, pthread };
        self.lock().insert(id, record);
        info!("started {} worker {}", kind.name(), id);
        events::publish(Event::WorkerStarted { id, kind });
        Ok(id)
    }

    /// Stop a worker of any kind.
    pub fn stop(&self, id: WorkerId) -> Result<()> {
        let record = self.lock().remove(&id).ok_or(CoreError::NotFound(id))?;
        Self::shutdown(id, record)
    }

    /// Stop a worker, requiring it to be of `kind`. Ids of the other
    /// kind report `NotFound`, exactly like unknown ids.
    pub fn stop_kind(&self, id: WorkerId, kind: WorkerKind) -> Result<()> {
        let record = {
            let mut workers = self.lock();
            let kind_matches = workers.get(&id).map_or(false, |record| record.kind == kind);
            if !kind_matches {
                return Err(CoreError::NotFound(id));
            }
            workers.remove(&id).expect("record present under lock")
        };
        Self::shutdown(id, record)
    }

    /// Stop every worker, or every worker of one kind. Aborts on the
    /// first failure.
    pub fn stop_all(&self, kind: Option<WorkerKind>) -> Result<()> {
        loop {
            let next = {
                let mut workers = self.lock();
                let id = workers
                    .iter()
                    .find(|(_, record)| kind.map_or(true, |kind| record.kind == kind))
                    .map(|(id, _)| *id);
                id.map(|id| (id, workers.remove(&id).expect("record present under lock")))
            };
            match next {
                Some((id, record)) => Self::shutdown(id, record)?,
                None => return Ok(()),
            }
        }
    }

    fn shutdown(id: WorkerId, record: WorkerRecord) -> Result<()> {
        record.cancel.cancel();
        // The worker drops its resources on exit: filter detaches,
        // pcap closes, ring unmaps and its socket closes.
        if record.handle.join().is_err() {
            warn!("worker {} panicked before shutdown", id);
        }
        info!("stopped {} worker {}", record.kind.name(), id);
        events::publish(Event::WorkerStopped { id, kind: record.kind });
        Ok(())
    }

    /// Self-consistent snapshot of the running workers.
    pub fn list(&self, kind: Option<WorkerKind>) -> Vec<WorkerView> {
        self.lock()
            .iter()
            .filter(|(_, record)| kind.map_or(true, |kind| record.kind == kind))
            .map(|(id, record)| Self::view(*id, record))
            .collect()
    }

    fn view(id: WorkerId, record: &WorkerRecord) -> WorkerView {
        let (policy, priority) =
            sched::param_get(record.pthread).unwrap_or((SchedPolicy::Other, 0));
        let cpu_affinity = sched::affinity_get(record.pthread)
            .map(|cpus| cpulist::format(&cpus))
            .unwrap_or_default();
        let interface = nic::ifname(record.shared.ifindex())
            .unwrap_or_else(|_| record.shared.interface().to_string());
        WorkerView {
            id,
            kind: record.kind,
            health: record.shared.health(),
            interface,
            pcap: record.shared.pcap_path(),
            frame_size: record.shared.frame_size(),
            frame_count: record.shared.frame_count(),
            policy,
            priority,
            cpu_affinity,
        }
    }

    /// Apply any subset of policy, priority, and affinity. Validation
    /// happens before anything is applied; application aborts on the
    /// first failure.
    pub fn reconfigure(&self, id: WorkerId, settings: &SchedSettings) -> Result<()> {
        let cpus = settings.cpu_list.as_deref().map(cpulist::parse).transpose()?;
        let workers = self.lock();
        let record = workers.get(&id).ok_or(CoreError::NotFound(id))?;
        let (current_policy, current_priority) = sched::param_get(record.pthread)?;
        let policy = settings.policy.unwrap_or(current_policy);
        let priority = settings.priority.unwrap_or(current_priority);
        sched::validate_priority(policy, priority)?;
        sched::param_set(record.pthread, policy, priority)?;
        if let Some(cpus) = cpus {
            sched::affinity_set(record.pthread, &cpus)?;
        }
        info!("reconfigured worker {}: {:?} priority {}", id, policy, priority);
        Ok(())
    }

    /// The priority ranges the system supports per policy.
    pub fn capabilities(&self) -> Result<Vec<SchedCapability>> {
        sched::capabilities()
    }
}

impl Default for WorkerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    // A worker body that parks until cancelled, like a real worker
    // with a quiet ring.
    fn idle_worker(registry: &WorkerRegistry, kind: WorkerKind) -> WorkerId {
        let cancel = CancelToken::new().unwrap();
        let shared = Arc::new(WorkerShared::new(
            kind,
            "any".to_string(),
            0,
            2048,
            8,
            PathBuf::from("/tmp/test.pcap"),
            -1,
        ));
        let body_cancel = cancel.clone();
        registry
            .start(kind, shared, cancel, move || {
                while !body_cancel.is_cancelled() {
                    std::thread::sleep(Duration::from_millis(1));
                }
                Ok(())
            })
            .unwrap()
    }

    #[test]
    fn test_identifier_stability() {
        let registry = WorkerRegistry::new();
        let first = idle_worker(&registry, WorkerKind::Capture);
        let second = idle_worker(&registry, WorkerKind::Replay);
        // Ids are monotonic across the process and never reused.
        assert!(second > first);
        assert!(first >= 1000);

        let views = registry.list(None);
        assert_eq!(views.len(), 2);
        assert!(views.iter().any(|view| view.id == first));

        registry.stop(first).unwrap();
        assert!(matches!(registry.stop(first), Err(CoreError::NotFound(id)) if id == first));
        assert_eq!(registry.list(None).len(), 1);

        registry.stop_all(None).unwrap();
        assert!(registry.list(None).is_empty());
        assert!(matches!(registry.stop(second), Err(CoreError::NotFound(_))));
    }

    #[test]
    fn test_list_filters_by_kind() {
        let registry = WorkerRegistry::new();
        idle_worker(&registry, WorkerKind::Capture);
        idle_worker(&registry, WorkerKind::Capture);
        let replay = idle_worker(&registry, WorkerKind::Replay);

        assert_eq!(registry.list(Some(WorkerKind::Capture)).len(), 2);
        assert_eq!(registry.list(Some(WorkerKind::Replay)).len(), 1);

        // Stopping through the wrong kind does not touch the worker.
        assert!(matches!(
            registry.stop_kind(replay, WorkerKind::Capture),
            Err(CoreError::NotFound(_))
        ));
        assert_eq!(registry.list(Some(WorkerKind::Replay)).len(), 1);

        registry.stop_all(Some(WorkerKind::Capture)).unwrap();
        assert_eq!(registry.list(None).len(), 1);
        registry.stop_all(None).unwrap();
    }

    #[test]
    fn test_reconfigure_unknown_worker() {
        let registry = WorkerRegistry::new();
        assert!(matches!(
            registry.reconfigure(42, &SchedSettings::default()),
            Err(CoreError::NotFound(42))
        ));
    }

    #[test]
    fn test_reconfigure_rejects_out_of_range_priority() {
        let registry = WorkerRegistry::new();
        let id = idle_worker(&registry, WorkerKind::Capture);
        let settings = SchedSettings { priority: Some(99), ..Default::default() };
        assert!(matches!(
            registry.reconfigure(id, &settings),
            Err(CoreError::InvalidArgument(_))
        ));
        // Nothing changed.
        let view = &registry.list(None)[0];
        assert_eq!(view.policy, SchedPolicy::Other);
        assert_eq!(view.priority, 0);
        registry.stop_all(None).unwrap();
    }

    #[test]
    fn test_reconfigure_affinity() {
        let registry = WorkerRegistry::new();
        let id = idle_worker(&registry, WorkerKind::Capture);
        let settings = SchedSettings { cpu_list: Some("0".to_string()), ..Default::default() };
        registry.reconfigure(id, &settings).unwrap();
        let view = &registry.list(None)[0];
        assert_eq!(view.cpu_affinity, "0");
        registry.stop_all(None).unwrap();
    }

    #[test]
    fn test_capabilities() {
        let registry = WorkerRegistry::new();
        assert_eq!(registry.capabilities().unwrap().len(), 3);
    }
}
