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

//! The transmit worker loop.

use crate::error::{CoreError, Result};
use crate::ring::{sys, Ring, SlotStatus, Wake};
use crate::threads::cancel::CancelToken;
use crate::threads::{WorkerHealth, WorkerShared};
use ringtap_pcap::pcap::{self, Pcap};
use std::os::unix::io::RawFd;
use std::sync::Arc;

/// Configure a transmit socket to drop frames on congestion instead of
/// reporting errors. Must be set before the ring is created.
pub(crate) fn set_packet_loss(sock: RawFd, discard: bool) -> Result<()> {
    let value: libc::c_int = discard as libc::c_int;
    // SAFETY: value is a valid int option.
    let rc = unsafe {
        libc::setsockopt(
            sock,
            libc::SOL_PACKET,
            sys::PACKET_LOSS,
            &value as *const libc::c_int as *const libc::c_void,
            std::mem::size_of::<libc::c_int>() as libc::socklen_t,
        )
    };
    if rc < 0 {
        return Err(CoreError::last_os_error());
    }
    Ok(())
}

/// One running replay. Owns the pcap handle and the transmit ring.
pub(crate) struct TxWorker {
    pcap: Pcap,
    ring: Ring,
    shared: Arc<WorkerShared>,
    cancel: CancelToken,
}

impl TxWorker {
    pub(crate) fn new(
        pcap: Pcap,
        ring: Ring,
        shared: Arc<WorkerShared>,
        cancel: CancelToken,
    ) -> TxWorker {
        TxWorker { pcap, ring, shared, cancel }
    }

    /// Feed the ring until cancelled.
    ///
    /// Each pass fills every `Available` slot with the next pcap
    /// record, submits the filled slots with a non-blocking send, and
    /// rewinds the file once end of file is observed, so the replay
    /// loops indefinitely. A pass that placed nothing parks in the
    /// writable readiness wait. The pcap file is never modified.
    pub(crate) fn run(mut self) -> Result<()> {
        let frame_count = self.ring.frame_count();
        let mut eof = false;
        loop {
            let mut filled = 0;
            for index in 0..frame_count {
                if self.cancel.is_cancelled() {
                    return Ok(());
                }
                if eof {
                    break;
                }
                let mut slot = self.ring.slot(index);
                if slot.status() != SlotStatus::Available {
                    continue;
                }
                match self.pcap.read_record(slot.tx_frame_mut()) {
                    Ok(length) => {
                        slot.set_frame_len(length as u32);
                        slot.release(SlotStatus::SendRequest);
                        filled += 1;
                    }
                    Err(pcap::Error::EndOfFile) => eof = true,
                    Err(err) => {
                        self.shared.set_health(WorkerHealth::FileError);
                        return Err(err.into());
                    }
                }
            }
            self.ring.submit();
            if eof {
                if let Err(err) = self.pcap.rewind() {
                    self.shared.set_health(WorkerHealth::FileError);
                    return Err(err.into());
                }
                eof = false;
            } else if filled == 0 {
                self.shared.set_health(WorkerHealth::Stalled);
                let wake = self.ring.wait(&self.cancel);
                self.shared.set_health(WorkerHealth::Ok);
                match wake? {
                    Wake::Cancelled => return Ok(()),
                    Wake::Ready => {}
                }
            }
        }
    }
}
