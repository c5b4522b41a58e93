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

//! Frame slots and the per-slot ownership protocol.

use super::sys::{
    tpacket_align, TpacketHdr, TP_STATUS_AVAILABLE, TP_STATUS_KERNEL, TP_STATUS_SEND_REQUEST,
    TP_STATUS_USER,
};
use super::RingKind;
use std::marker::PhantomData;
use std::mem::size_of;
use std::sync::atomic::Ordering;

// The kernel status word is a c_ulong, which matches the pointer width
// on every Linux target.
#[cfg(target_pointer_width = "64")]
type AtomicStatus = std::sync::atomic::AtomicU64;
#[cfg(target_pointer_width = "32")]
type AtomicStatus = std::sync::atomic::AtomicU32;

/// Ownership state of one frame slot.
///
/// The holder of the status word at a given value is the sole party
/// permitted to touch the slot's payload bytes. User-space stores that
/// hand a slot to the kernel are release stores issued only after the
/// payload is complete; loads that take a slot from the kernel are
/// acquire loads issued before the payload is read.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotStatus {
    /// Kernel owns the slot: empty on receive, sent on transmit.
    Kernel,
    /// User space owns a received frame.
    User,
    /// User space may fill this transmit slot.
    Available,
    /// Kernel owns a filled transmit slot pending submission.
    SendRequest,
}

/// Byte offset from a transmit slot's origin to its frame payload.
pub fn tx_frame_offset() -> usize {
    tpacket_align(size_of::<TpacketHdr>())
}

/// A view over one fixed-size cell of the ring.
///
/// The slot borrows the ring's mapping; it never outlives the `Ring`
/// that produced it.
pub struct Slot<'a> {
    ptr: *mut u8,
    len: usize,
    kind: RingKind,
    _ring: PhantomData<&'a super::Ring>,
}

impl Slot<'_> {
    /// # Safety
    ///
    /// `ptr` must point at the start of a mapped slot of `len` bytes
    /// that stays mapped for the lifetime `'a`.
    pub(super) unsafe fn new(ptr: *mut u8, len: usize, kind: RingKind) -> Slot<'static> {
        Slot { ptr, len, kind, _ring: PhantomData }
    }

    fn header(&self) -> &TpacketHdr {
        // SAFETY: the slot starts with a kernel-written TpacketHdr and
        // is aligned to TPACKET_ALIGNMENT.
        unsafe { &*(self.ptr as *const TpacketHdr) }
    }

    fn status_word(&self) -> &AtomicStatus {
        // SAFETY: tp_status is the first field of the slot header,
        // aligned and of the same width as AtomicStatus.
        unsafe { &*(self.ptr as *const AtomicStatus) }
    }

    /// Current ownership state, decoded for this ring's direction.
    /// Acquire ordering: header and payload reads are valid afterwards.
    pub fn status(&self) -> SlotStatus {
        let raw = self.status_word().load(Ordering::Acquire) as libc::c_ulong;
        match self.kind {
            RingKind::Receive => {
                if raw & TP_STATUS_USER != 0 {
                    SlotStatus::User
                } else {
                    // Anything else, the kernel still owns the slot.
                    SlotStatus::Kernel
                }
            }
            RingKind::Transmit => {
                if raw == TP_STATUS_AVAILABLE {
                    SlotStatus::Available
                } else if raw & TP_STATUS_SEND_REQUEST != 0 {
                    SlotStatus::SendRequest
                } else {
                    SlotStatus::Kernel
                }
            }
        }
    }

    /// Hand the slot over with a release store. The payload must be
    /// complete before calling.
    pub fn release(&self, status: SlotStatus) {
        let raw = match status {
            SlotStatus::Kernel => TP_STATUS_KERNEL,
            SlotStatus::User => TP_STATUS_USER,
            SlotStatus::Available => TP_STATUS_AVAILABLE,
            SlotStatus::SendRequest => TP_STATUS_SEND_REQUEST,
        };
        self.status_word().store(raw as _, Ordering::Release);
    }

    /// On-wire length of the frame in this slot.
    pub fn wire_len(&self) -> u32 {
        self.header().tp_len
    }

    /// Captured length of the frame in this slot.
    pub fn captured_len(&self) -> u32 {
        self.header().tp_snaplen
    }

    /// Kernel receive timestamp, seconds and microseconds.
    pub fn timestamp(&self) -> (u32, u32) {
        let header = self.header();
        (header.tp_sec, header.tp_usec)
    }

    /// Received frame bytes, starting at the kernel-reported MAC offset.
    /// Only valid while the slot status is `User`.
    pub fn rx_frame(&self) -> &[u8] {
        let start = (self.header().tp_mac as usize).min(self.len);
        let end = (start + self.header().tp_snaplen as usize).min(self.len);
        // SAFETY: start..end lies inside this slot's mapped bytes.
        unsafe { std::slice::from_raw_parts(self.ptr.add(start), end - start) }
    }

    /// Writable frame area of a transmit slot, after the aligned header.
    /// Only valid while the slot status is `Available`.
    pub fn tx_frame_mut(&mut self) -> &mut [u8] {
        let start = tx_frame_offset();
        // SAFETY: start..len lies inside this slot's mapped bytes and
        // the slot is exclusively user-owned at Available.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.add(start), self.len - start) }
    }

    /// Record the frame length of a filled transmit slot. Must precede
    /// the `SendRequest` release.
    pub fn set_frame_len(&mut self, len: u32) {
        // SAFETY: exclusive user ownership at Available; plain stores
        // are ordered before the subsequent release of the status word.
        unsafe {
            let header = self.ptr as *mut TpacketHdr;
            (*header).tp_len = len;
            (*header).tp_snaplen = len;
        }
    }
}
