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

//! TPACKET_V1 kernel ABI: ring layout request, per-slot frame header,
//! and the status word values. Mirrors `<linux/if_packet.h>`; kept
//! local so the crate does not depend on which of these the libc crate
//! happens to re-export.

/// `PACKET_RX_RING` socket option, registers a receive ring.
pub const PACKET_RX_RING: libc::c_int = 5;
/// `PACKET_TX_RING` socket option, registers a transmit ring.
pub const PACKET_TX_RING: libc::c_int = 13;
/// `PACKET_LOSS` socket option, drop frames on transmit congestion.
pub const PACKET_LOSS: libc::c_int = 14;

/// Slot owned by the kernel: empty on receive, sent on transmit.
pub const TP_STATUS_KERNEL: libc::c_ulong = 0;
/// Receive slot holding a frame for user space.
pub const TP_STATUS_USER: libc::c_ulong = 1 << 0;
/// Transmit slot free for user space to fill.
pub const TP_STATUS_AVAILABLE: libc::c_ulong = 0;
/// Transmit slot filled and handed to the kernel for sending.
pub const TP_STATUS_SEND_REQUEST: libc::c_ulong = 1 << 0;

/// Alignment of slot headers and payload offsets inside the ring.
pub const TPACKET_ALIGNMENT: usize = 16;

/// Round `len` up to the ring alignment.
pub const fn tpacket_align(len: usize) -> usize {
    (len + TPACKET_ALIGNMENT - 1) & !(TPACKET_ALIGNMENT - 1)
}

/// Ring layout registered on the packet socket.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
pub struct TpacketReq {
    /// Minimal contiguous block size.
    pub tp_block_size: libc::c_uint,
    /// Number of blocks.
    pub tp_block_nr: libc::c_uint,
    /// Size of one frame slot.
    pub tp_frame_size: libc::c_uint,
    /// Total number of frame slots.
    pub tp_frame_nr: libc::c_uint,
}

/// Kernel-populated header at the start of every frame slot.
///
/// `tp_status` is the ownership token between kernel and user space;
/// the remaining fields are only valid while user space owns the slot.
#[repr(C)]
pub struct TpacketHdr {
    pub tp_status: libc::c_ulong,
    pub tp_len: libc::c_uint,
    pub tp_snaplen: libc::c_uint,
    pub tp_mac: libc::c_ushort,
    pub tp_net: libc::c_ushort,
    pub tp_sec: libc::c_uint,
    pub tp_usec: libc::c_uint,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tpacket_align() {
        assert_eq!(tpacket_align(0), 0);
        assert_eq!(tpacket_align(1), 16);
        assert_eq!(tpacket_align(16), 16);
        assert_eq!(tpacket_align(17), 32);
        assert_eq!(tpacket_align(std::mem::size_of::<TpacketHdr>()) % TPACKET_ALIGNMENT, 0);
    }

    #[test]
    fn test_layout_request_is_four_words() {
        assert_eq!(std::mem::size_of::<TpacketReq>(), 16);
    }
}
