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

//! Worker thread scheduling: policy, priority, and CPU affinity.

use crate::error::{CoreError, Result};

/// Scheduling policy of a worker thread.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SchedPolicy {
    /// Default time-sharing scheduling.
    Other,
    /// First-in first-out real-time scheduling.
    Fifo,
    /// Round-robin real-time scheduling.
    RoundRobin,
}

impl SchedPolicy {
    fn to_raw(self) -> libc::c_int {
        match self {
            SchedPolicy::Other => libc::SCHED_OTHER,
            SchedPolicy::Fifo => libc::SCHED_FIFO,
            SchedPolicy::RoundRobin => libc::SCHED_RR,
        }
    }

    fn from_raw(raw: libc::c_int) -> Option<SchedPolicy> {
        match raw {
            libc::SCHED_OTHER => Some(SchedPolicy::Other),
            libc::SCHED_FIFO => Some(SchedPolicy::Fifo),
            libc::SCHED_RR => Some(SchedPolicy::RoundRobin),
            _ => None,
        }
    }
}

/// Valid priority range of one scheduling policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SchedCapability {
    pub policy: SchedPolicy,
    pub priority_min: i32,
    pub priority_max: i32,
}

/// The priority ranges the system supports per policy.
pub fn capabilities() -> Result<Vec<SchedCapability>> {
    let mut list = Vec::new();
    for policy in [SchedPolicy::Other, SchedPolicy::Fifo, SchedPolicy::RoundRobin] {
        // SAFETY: plain sched_get_priority_{min,max}(2) calls.
        let priority_min = unsafe { libc::sched_get_priority_min(policy.to_raw()) };
        let priority_max = unsafe { libc::sched_get_priority_max(policy.to_raw()) };
        if priority_min < 0 || priority_max < 0 {
            return Err(CoreError::last_os_error());
        }
        list.push(SchedCapability { policy, priority_min, priority_max });
    }
    Ok(list)
}

/// Checks `priority` against the capability range of `policy`.
pub fn validate_priority(policy: SchedPolicy, priority: i32) -> Result<()> {
    let capability = capabilities()?
        .into_iter()
        .find(|capability| capability.policy == policy)
        .expect("capabilities covers every policy");
    if priority < capability.priority_min || priority > capability.priority_max {
        return Err(CoreError::InvalidArgument(format!(
            "priority {} outside [{}, {}] for {:?}",
            priority, capability.priority_min, capability.priority_max, policy
        )));
    }
    Ok(())
}

pub(crate) fn param_get(thread: libc::pthread_t) -> Result<(SchedPolicy, i32)> {
    let mut raw_policy: libc::c_int = 0;
    // SAFETY: sched_param is plain-old-data.
    let mut param: libc::sched_param = unsafe { std::mem::zeroed() };
    // SAFETY: out-pointers are valid for the call.
    let rc = unsafe { libc::pthread_getschedparam(thread, &mut raw_policy, &mut param) };
    if rc != 0 {
        return Err(CoreError::Io(std::io::Error::from_raw_os_error(rc)));
    }
    // A policy this module never sets reads back as time-sharing.
    let policy = SchedPolicy::from_raw(raw_policy).unwrap_or(SchedPolicy::Other);
    Ok((policy, param.sched_priority))
}

pub(crate) fn param_set(
    thread: libc::pthread_t,
    policy: SchedPolicy,
    priority: i32,
) -> Result<()> {
    // SAFETY: sched_param is plain-old-data.
    let mut param: libc::sched_param = unsafe { std::mem::zeroed() };
    param.sched_priority = priority;
    // SAFETY: param is valid for the call.
    let rc = unsafe { libc::pthread_setschedparam(thread, policy.to_raw(), &param) };
    if rc != 0 {
        return Err(CoreError::Io(std::io::Error::from_raw_os_error(rc)));
    }
    Ok(())
}

pub(crate) fn affinity_get(thread: libc::pthread_t) -> Result<Vec<usize>> {
    // SAFETY: cpu_set_t is plain-old-data.
    let mut set: libc::cpu_set_t = unsafe { std::mem::zeroed() };
    // SAFETY: set is a full-size cpu_set_t.
    let rc = unsafe {
        libc::pthread_getaffinity_np(thread, std::mem::size_of::<libc::cpu_set_t>(), &mut set)
    };
    if rc != 0 {
        return Err(CoreError::Io(std::io::Error::from_raw_os_error(rc)));
    }
    Ok((0..libc::CPU_SETSIZE as usize).filter(|&cpu| unsafe { libc::CPU_ISSET(cpu, &set) }).collect())
}

pub(crate) fn affinity_set(thread: libc::pthread_t, cpus: &[usize]) -> Result<()> {
    if cpus.is_empty() {
        return Err(CoreError::InvalidArgument("empty cpu affinity set".to_string()));
    }
    // SAFETY: cpu_set_t is plain-old-data.
    let mut set: libc::cpu_set_t = unsafe { std::mem::zeroed() };
    unsafe { libc::CPU_ZERO(&mut set) };
    for &cpu in cpus {
        if cpu >= libc::CPU_SETSIZE as usize {
            return Err(CoreError::InvalidArgument(format!("cpu {} out of range", cpu)));
        }
        unsafe { libc::CPU_SET(cpu, &mut set) };
    }
    // SAFETY: set is a full-size cpu_set_t.
    let rc = unsafe {
        libc::pthread_setaffinity_np(thread, std::mem::size_of::<libc::cpu_set_t>(), &set)
    };
    if rc != 0 {
        return Err(CoreError::Io(std::io::Error::from_raw_os_error(rc)));
    }
    Ok(())
}
