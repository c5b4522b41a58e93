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

//! Capture service facade.
//!
//! Validates a capture request, assembles the receive worker's
//! resources in a fixed order (socket, pcap file, optional filter,
//! ring), and registers the worker. A failure at any step unwinds
//! everything acquired so far.

use crate::capture::rx::RxWorker;
use crate::error::{CoreError, Result};
use crate::filter::{AttachedFilter, FilterProgram};
use crate::nic;
use crate::resource::clone_registry;
use crate::ring::{packet_socket, FrameSize, Ring, RingConfig, RingKind};
use crate::threads::cancel::CancelToken;
use crate::threads::{WorkerId, WorkerKind, WorkerShared, WorkerView};
use ringtap_pcap::pcap::{LinkType, Mode, Pcap};
use std::os::unix::io::AsRawFd;
use std::path::PathBuf;
use std::sync::Arc;

/// Frame slot size used when a request does not name one.
pub const DEFAULT_FRAME_SIZE: u32 = 2048;

/// A capture request.
#[derive(Clone, Debug)]
pub struct CaptureParams {
    /// Target interface name.
    pub interface: String,
    /// Output pcap file path.
    pub pcap: String,
    /// Frame slot size in bytes, one of the supported sizes.
    pub frame_size: u32,
    /// Number of ring slots, a power of two of at least 8.
    pub frame_count: u32,
    /// Append to an existing pcap file instead of creating a new one.
    pub append: bool,
    /// Optional packet filter, attached before the ring is drained.
    pub filter: Option<FilterProgram>,
}

impl Default for CaptureParams {
    fn default() -> Self {
        CaptureParams {
            interface: String::new(),
            pcap: String::new(),
            frame_size: DEFAULT_FRAME_SIZE,
            frame_count: 0,
            append: false,
            filter: None,
        }
    }
}

pub(crate) fn validate_names(interface: &str, pcap: &str) -> Result<()> {
    if interface.is_empty() || interface.len() >= nic::IF_NAMESIZE {
        return Err(CoreError::InvalidArgument(format!(
            "invalid interface name {:?}",
            interface
        )));
    }
    if pcap.is_empty() {
        return Err(CoreError::InvalidArgument("empty pcap path".to_string()));
    }
    Ok(())
}

pub(crate) fn validate_frame_size(frame_size: u32) -> Result<FrameSize> {
    FrameSize::from_u32(frame_size)
        .ok_or_else(|| CoreError::InvalidArgument(format!("unsupported frame size {}", frame_size)))
}

/// Start a capture. Returns the identifier of the new worker.
pub fn start_capture(params: CaptureParams) -> Result<WorkerId> {
    // Validation precedes every resource acquisition.
    validate_names(&params.interface, &params.pcap)?;
    let frame_size = validate_frame_size(params.frame_size)?;
    let config = RingConfig {
        kind: RingKind::Receive,
        interface: params.interface.clone(),
        frame_size,
        frame_count: params.frame_count,
    };
    config.validate()?;

    // Acquisition order: socket, pcap, filter, ring, worker. Each value
    // unwinds on drop, so an error below releases everything above it.
    let sock = packet_socket()?;
    let pcap = if params.append {
        Pcap::open(&params.pcap, Mode::Append)?
    } else {
        Pcap::create(&params.pcap, LinkType::Ethernet)?
    };
    let filter = match params.filter {
        Some(program) if !program.is_empty() => {
            Some(AttachedFilter::attach(sock.as_raw_fd(), program)?)
        }
        _ => None,
    };
    let ring = Ring::create(sock, &config)?;

    let shared = Arc::new(WorkerShared::new(
        WorkerKind::Capture,
        params.interface,
        ring.ifindex(),
        ring.frame_size(),
        ring.frame_count(),
        PathBuf::from(&params.pcap),
        pcap.as_raw_fd(),
    ));
    let cancel = CancelToken::new()?;
    let worker = RxWorker::new(filter, Some(pcap), ring, shared.clone(), cancel.clone());
    clone_registry().start(WorkerKind::Capture, shared, cancel, move || worker.run())
}

/// Stop one capture. Unknown or non-capture identifiers report
/// `NotFound`.
pub fn stop_capture(id: WorkerId) -> Result<()> {
    clone_registry().stop_kind(id, WorkerKind::Capture)
}

/// Stop every capture; aborts on the first failure.
pub fn stop_all_captures() -> Result<()> {
    clone_registry().stop_all(Some(WorkerKind::Capture))
}

/// Snapshot views of the running captures.
pub fn list_captures() -> Vec<WorkerView> {
    clone_registry().list(Some(WorkerKind::Capture))
}

#[cfg(test)]
mod tests {
    use super::*;

    // Validation failures surface before any resource is acquired, so
    // these need no privileges and leave nothing behind.

    #[test]
    fn test_rejects_empty_interface() {
        let params =
            CaptureParams { pcap: "/tmp/x.pcap".to_string(), frame_count: 8, ..Default::default() };
        assert!(matches!(start_capture(params), Err(CoreError::InvalidArgument(_))));
    }

    #[test]
    fn test_rejects_oversized_interface_name() {
        let params = CaptureParams {
            interface: "a".repeat(nic::IF_NAMESIZE),
            pcap: "/tmp/x.pcap".to_string(),
            frame_count: 8,
            ..Default::default()
        };
        assert!(matches!(start_capture(params), Err(CoreError::InvalidArgument(_))));
    }

    #[test]
    fn test_rejects_empty_pcap_path() {
        let params =
            CaptureParams { interface: "lo".to_string(), frame_count: 8, ..Default::default() };
        assert!(matches!(start_capture(params), Err(CoreError::InvalidArgument(_))));
    }

    #[test]
    fn test_rejects_unsupported_frame_size() {
        let params = CaptureParams {
            interface: "lo".to_string(),
            pcap: "/tmp/x.pcap".to_string(),
            frame_size: 4096,
            frame_count: 8,
            ..Default::default()
        };
        assert!(matches!(start_capture(params), Err(CoreError::InvalidArgument(_))));
    }

    #[test]
    fn test_rejects_bad_frame_count() {
        for frame_count in [0, 4, 12] {
            let params = CaptureParams {
                interface: "lo".to_string(),
                pcap: "/tmp/x.pcap".to_string(),
                frame_count,
                ..Default::default()
            };
            assert!(matches!(start_capture(params), Err(CoreError::InvalidArgument(_))));
        }
    }

    #[test]
    fn test_stop_unknown_capture() {
        assert!(matches!(stop_capture(7), Err(CoreError::NotFound(7))));
    }
}
