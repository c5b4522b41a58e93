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

//! Replay service facade.
//!
//! Mirrors the capture facade with transmit semantics: the pcap file is
//! opened read-only, there is no filter, and the socket is set to drop
//! frames on congestion before the ring is created.

use crate::capture::facade::{validate_frame_size, validate_names};
use crate::error::Result;
use crate::replay::tx::{set_packet_loss, TxWorker};
use crate::resource::clone_registry;
use crate::ring::{packet_socket, Ring, RingConfig, RingKind};
use crate::threads::cancel::CancelToken;
use crate::threads::{WorkerId, WorkerKind, WorkerShared, WorkerView};
use ringtap_pcap::pcap::{Mode, Pcap};
use std::os::unix::io::AsRawFd;
use std::path::PathBuf;
use std::sync::Arc;

/// Frame slot size used when a request does not name one.
pub const DEFAULT_FRAME_SIZE: u32 = 2048;

/// Ring slot count used when a request does not name one.
pub const DEFAULT_FRAME_COUNT: u32 = 32;

/// A replay request.
#[derive(Clone, Debug)]
pub struct ReplayParams {
    /// Target interface name.
    pub interface: String,
    /// Source pcap file path.
    pub pcap: String,
    /// Frame slot size in bytes, one of the supported sizes.
    pub frame_size: u32,
    /// Number of ring slots, a power of two of at least 8.
    pub frame_count: u32,
}

impl Default for ReplayParams {
    fn default() -> Self {
        ReplayParams {
            interface: String::new(),
            pcap: String::new(),
            frame_size: DEFAULT_FRAME_SIZE,
            frame_count: DEFAULT_FRAME_COUNT,
        }
    }
}

/// Start a replay. Returns the identifier of the new worker.
pub fn start_replay(params: ReplayParams) -> Result<WorkerId> {
    validate_names(&params.interface, &params.pcap)?;
    let frame_size = validate_frame_size(params.frame_size)?;
    let config = RingConfig {
        kind: RingKind::Transmit,
        interface: params.interface.clone(),
        frame_size,
        frame_count: params.frame_count,
    };
    config.validate()?;

    let sock = packet_socket()?;
    let pcap = Pcap::open(&params.pcap, Mode::Read)?;
    // Fixed contract of the replay path: congestion drops frames.
    set_packet_loss(sock.as_raw_fd(), true)?;
    let ring = Ring::create(sock, &config)?;

    let shared = Arc::new(WorkerShared::new(
        WorkerKind::Replay,
        params.interface,
        ring.ifindex(),
        ring.frame_size(),
        ring.frame_count(),
        PathBuf::from(&params.pcap),
        pcap.as_raw_fd(),
    ));
    let cancel = CancelToken::new()?;
    let worker = TxWorker::new(pcap, ring, shared.clone(), cancel.clone());
    clone_registry().start(WorkerKind::Replay, shared, cancel, move || worker.run())
}

/// Stop one replay. Unknown or non-replay identifiers report
/// `NotFound`.
pub fn stop_replay(id: WorkerId) -> Result<()> {
    clone_registry().stop_kind(id, WorkerKind::Replay)
}

/// Stop every replay; aborts on the first failure.
pub fn stop_all_replays() -> Result<()> {
    clone_registry().stop_all(Some(WorkerKind::Replay))
}

/// Snapshot views of the running replays.
pub fn list_replays() -> Vec<WorkerView> {
    clone_registry().list(Some(WorkerKind::Replay))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;

    #[test]
    fn test_rejects_empty_names() {
        assert!(matches!(
            start_replay(ReplayParams::default()),
            Err(CoreError::InvalidArgument(_))
        ));
        let params = ReplayParams { interface: "lo".to_string(), ..Default::default() };
        assert!(matches!(start_replay(params), Err(CoreError::InvalidArgument(_))));
    }

    #[test]
    fn test_rejects_bad_geometry() {
        let params = ReplayParams {
            interface: "lo".to_string(),
            pcap: "/tmp/x.pcap".to_string(),
            frame_size: 512,
            ..Default::default()
        };
        assert!(matches!(start_replay(params), Err(CoreError::InvalidArgument(_))));
        let params = ReplayParams {
            interface: "lo".to_string(),
            pcap: "/tmp/x.pcap".to_string(),
            frame_count: 24,
            ..Default::default()
        };
        assert!(matches!(start_replay(params), Err(CoreError::InvalidArgument(_))));
    }

    #[test]
    fn test_default_frame_count() {
        assert_eq!(ReplayParams::default().frame_count, DEFAULT_FRAME_COUNT);
    }

    #[test]
    fn test_stop_unknown_replay() {
        assert!(matches!(stop_replay(9), Err(CoreError::NotFound(9))));
    }
}
