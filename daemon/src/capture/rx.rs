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

//! The receive worker loop.

use crate::error::Result;
use crate::filter::AttachedFilter;
use crate::ring::{Ring, SlotStatus, Wake};
use crate::threads::cancel::CancelToken;
use crate::threads::{WorkerHealth, WorkerShared};
use ringtap_pcap::pcap::Pcap;
use std::sync::Arc;

/// One running capture. Owns every resource of the session.
///
/// Field order is teardown order: the filter detaches, the pcap file
/// closes, then the ring unmaps and its socket closes.
pub(crate) struct RxWorker {
    // Held only for its detach-on-drop effect.
    _filter: Option<AttachedFilter>,
    pcap: Option<Pcap>,
    ring: Ring,
    shared: Arc<WorkerShared>,
    cancel: CancelToken,
}

impl RxWorker {
    pub(crate) fn new(
        filter: Option<AttachedFilter>,
        pcap: Option<Pcap>,
        ring: Ring,
        shared: Arc<WorkerShared>,
        cancel: CancelToken,
    ) -> RxWorker {
        RxWorker { _filter: filter, pcap, ring, shared, cancel }
    }

    /// Drain the ring until cancelled.
    ///
    /// Scans the slots in index order, which matches packet arrival
    /// order, and parks in the readiness wait once a full scan finds
    /// nothing user-owned. A pcap write failure ends the session; the
    /// worker never retries.
    pub(crate) fn run(mut self) -> Result<()> {
        let frame_count = self.ring.frame_count();
        let frame_size = self.ring.frame_size();
        loop {
            for index in 0..frame_count {
                if self.cancel.is_cancelled() {
                    return Ok(());
                }
                let slot = self.ring.slot(index);
                if slot.status() == SlotStatus::Kernel {
                    self.shared.set_health(WorkerHealth::Stalled);
                    let wake = self.ring.wait(&self.cancel);
                    self.shared.set_health(WorkerHealth::Ok);
                    match wake? {
                        Wake::Cancelled => return Ok(()),
                        Wake::Ready => {}
                    }
                }
                if slot.status() != SlotStatus::User {
                    continue;
                }
                if let Some(pcap) = self.pcap.as_mut() {
                    let snaplen = slot.captured_len().min(frame_size);
                    let (tv_sec, tv_usec) = slot.timestamp();
                    if let Err(err) =
                        pcap.write_record(slot.rx_frame(), slot.wire_len(), snaplen, tv_sec, tv_usec)
                    {
                        // The slot stays user-owned; the session is over
                        // and the file position is no longer trusted.
                        self.shared.set_health(WorkerHealth::FileError);
                        return Err(err.into());
                    }
                }
                slot.release(SlotStatus::Kernel);
            }
        }
    }
}
