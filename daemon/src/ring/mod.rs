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

//! The kernel-shared packet ring.
//!
//! A ring is a bounded circular buffer of fixed-size frame slots mapped
//! into both kernel and user space, bound to one interface on one
//! packet-family socket. Slots are handed back and forth through the
//! status word at the start of each slot; see [`slot::SlotStatus`].

mod slot;
pub(crate) mod sys;

pub use slot::{tx_frame_offset, Slot, SlotStatus};

use crate::error::{CoreError, Result};
use crate::nic;
use crate::threads::cancel::CancelToken;
use log::debug;
use std::os::unix::io::{AsRawFd, FromRawFd, OwnedFd, RawFd};

/// Direction of a ring, fixed at creation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RingKind {
    /// Frames flow kernel to user space.
    Receive,
    /// Frames flow user space to kernel.
    Transmit,
}

impl RingKind {
    fn sockopt(self) -> libc::c_int {
        match self {
            RingKind::Receive => sys::PACKET_RX_RING,
            RingKind::Transmit => sys::PACKET_TX_RING,
        }
    }

    fn poll_events(self) -> libc::c_short {
        match self {
            RingKind::Receive => libc::POLLIN | libc::POLLERR,
            RingKind::Transmit => libc::POLLOUT,
        }
    }
}

/// The supported frame slot sizes.
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameSize {
    /// Standard Ethernet frames.
    Standard = 2048,
    /// Jumbo frames.
    Jumbo = 16384,
    /// Super jumbo frames.
    SuperJumbo = 65536,
}

impl FrameSize {
    /// Maps a raw byte count onto a supported slot size.
    pub fn from_u32(bytes: u32) -> Option<FrameSize> {
        match bytes {
            2048 => Some(FrameSize::Standard),
            16384 => Some(FrameSize::Jumbo),
            65536 => Some(FrameSize::SuperJumbo),
            _ => None,
        }
    }

    /// Slot size in bytes.
    pub fn bytes(self) -> u32 {
        self as u32
    }
}

/// Smallest accepted frame count.
pub const MIN_FRAME_COUNT: u32 = 8;

// Fixed ring geometry: every block carries eight frames.
const FRAMES_PER_BLOCK: u32 = 8;

/// Configuration of a ring to create.
pub struct RingConfig {
    pub kind: RingKind,
    pub interface: String,
    pub frame_size: FrameSize,
    pub frame_count: u32,
}

impl RingConfig {
    /// Validates the geometry. The frame count must be a power of two
    /// of at least [`MIN_FRAME_COUNT`].
    pub fn validate(&self) -> Result<()> {
        if self.frame_count < MIN_FRAME_COUNT || !self.frame_count.is_power_of_two() {
            return Err(CoreError::InvalidArgument(format!(
                "frame count {} is not a power of two >= {}",
                self.frame_count, MIN_FRAME_COUNT
            )));
        }
        Ok(())
    }

    fn layout(&self) -> sys::TpacketReq {
        let frame_size = self.frame_size.bytes();
        sys::TpacketReq {
            tp_block_size: frame_size * FRAMES_PER_BLOCK,
            tp_block_nr: self.frame_count / FRAMES_PER_BLOCK,
            tp_frame_size: frame_size,
            tp_frame_nr: self.frame_count,
        }
    }
}

/// Outcome of a readiness wait.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Wake {
    /// The socket became ready for the ring's direction.
    Ready,
    /// The wait was interrupted by worker cancellation.
    Cancelled,
}

/// Open a packet-family socket receiving all protocols.
pub fn packet_socket() -> Result<OwnedFd> {
    // SAFETY: plain socket(2) call.
    let fd = unsafe {
        libc::socket(libc::AF_PACKET, libc::SOCK_RAW, (libc::ETH_P_ALL as u16).to_be() as i32)
    };
    if fd < 0 {
        return Err(CoreError::last_os_error());
    }
    // SAFETY: fd was just returned by socket(2) and is owned by no one else.
    Ok(unsafe { OwnedFd::from_raw_fd(fd) })
}

/// One kernel-shared frame ring.
///
/// Owns the packet socket and the mapped region for its whole life;
/// dropping the ring unmaps the region, clears the kernel ring option,
/// then closes the socket.
pub struct Ring {
    kind: RingKind,
    ifindex: u32,
    layout: sys::TpacketReq,
    map: *mut u8,
    map_len: usize,
    // Declared last: teardown in Drop runs before the descriptor closes.
    sock: OwnedFd,
}

// SAFETY: the mapping is owned exclusively by the worker thread that
// owns the Ring; the raw pointer is never shared.
unsafe impl Send for Ring {}

impl Ring {
    /// Register, map, and bind a ring on `sock`.
    ///
    /// Runs the creation sequence atomically from the caller's view: on
    /// any failure everything done so far is undone, including closing
    /// the socket, before the error returns.
    pub fn create(sock: OwnedFd, config: &RingConfig) -> Result<Ring> {
        config.validate()?;
        let ifindex = nic::ifindex(&config.interface)?;
        let layout = config.layout();
        register(&sock, config.kind, &layout)?;
        let map_len = layout.tp_block_size as usize * layout.tp_block_nr as usize;
        // SAFETY: the kernel sizes the mapping from the registered
        // layout; map_len matches it.
        let map = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                map_len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED | libc::MAP_LOCKED,
                sock.as_raw_fd(),
                0,
            )
        };
        if map == libc::MAP_FAILED {
            let err = CoreError::last_os_error();
            unregister(&sock, config.kind);
            return Err(err);
        }
        let ring = Ring { kind: config.kind, ifindex, layout, map: map as *mut u8, map_len, sock };
        // A bind failure drops the partially built ring, which unmaps
        // and unregisters.
        ring.bind()?;
        debug!(
            "created {:?} ring: ifindex {} frame_size {} frame_count {}",
            ring.kind, ring.ifindex, layout.tp_frame_size, layout.tp_frame_nr
        );
        Ok(ring)
    }

    fn bind(&self) -> Result<()> {
        // SAFETY: sockaddr_ll is a plain-old-data struct.
        let mut addr: libc::sockaddr_ll = unsafe { std::mem::zeroed() };
        addr.sll_family = libc::AF_PACKET as libc::c_ushort;
        addr.sll_protocol = (libc::ETH_P_ALL as u16).to_be();
        addr.sll_ifindex = self.ifindex as libc::c_int;
        // SAFETY: addr is a valid sockaddr_ll for the socket family.
        let rc = unsafe {
            libc::bind(
                self.sock.as_raw_fd(),
                &addr as *const libc::sockaddr_ll as *const libc::sockaddr,
                std::mem::size_of::<libc::sockaddr_ll>() as libc::socklen_t,
            )
        };
        if rc < 0 {
            return Err(CoreError::last_os_error());
        }
        Ok(())
    }

    /// Direction of this ring.
    pub fn kind(&self) -> RingKind {
        self.kind
    }

    /// Index of the bound interface, 0 for all interfaces.
    pub fn ifindex(&self) -> u32 {
        self.ifindex
    }

    /// Number of frame slots.
    pub fn frame_count(&self) -> u32 {
        self.layout.tp_frame_nr
    }

    /// Size of one frame slot in bytes.
    pub fn frame_size(&self) -> u32 {
        self.layout.tp_frame_size
    }

    /// The slot at `index`. Slot `i` covers the mapped byte range
    /// `[i * frame_size, (i + 1) * frame_size)`.
    pub fn slot(&self, index: u32) -> Slot<'_> {
        assert!(index < self.layout.tp_frame_nr);
        let frame_size = self.layout.tp_frame_size as usize;
        // SAFETY: index is in range, so the slot lies inside the mapping.
        unsafe { Slot::new(self.map.add(index as usize * frame_size), frame_size, self.kind) }
    }

    /// Block until the socket is ready for this ring's direction or the
    /// worker is cancelled. Unbounded; cancellation is the only way out
    /// of a quiet socket.
    pub fn wait(&self, cancel: &CancelToken) -> Result<Wake> {
        let mut fds = [
            libc::pollfd {
                fd: self.sock.as_raw_fd(),
                events: self.kind.poll_events(),
                revents: 0,
            },
            libc::pollfd { fd: cancel.wake_fd(), events: libc::POLLIN, revents: 0 },
        ];
        loop {
            // SAFETY: fds points at two valid pollfd entries.
            let rc = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, -1) };
            if rc < 0 {
                let err = std::io::Error::last_os_error();
                if err.kind() == std::io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(CoreError::Io(err));
            }
            if cancel.is_cancelled() || fds[1].revents != 0 {
                return Ok(Wake::Cancelled);
            }
            if fds[0].revents != 0 {
                return Ok(Wake::Ready);
            }
        }
    }

    /// Kick the kernel to send every `SendRequest` slot. Non-blocking;
    /// transient send failures are left for the next submission.
    pub fn submit(&self) {
        // SAFETY: zero-length send with no buffer.
        let rc = unsafe {
            libc::send(self.sock.as_raw_fd(), std::ptr::null(), 0, libc::MSG_DONTWAIT)
        };
        if rc < 0 {
            debug!("ring submit: {}", std::io::Error::last_os_error());
        }
    }

    /// The underlying packet socket.
    pub fn socket(&self) -> RawFd {
        self.sock.as_raw_fd()
    }
}

impl Drop for Ring {
    fn drop(&mut self) {
        // SAFETY: map/map_len describe the mapping made in create().
        unsafe { libc::munmap(self.map as *mut libc::c_void, self.map_len) };
        unregister(&self.sock, self.kind);
        // sock closes after this.
    }
}

fn register(sock: &OwnedFd, kind: RingKind, layout: &sys::TpacketReq) -> Result<()> {
    // SAFETY: layout is a valid TpacketReq.
    let rc = unsafe {
        libc::setsockopt(
            sock.as_raw_fd(),
            libc::SOL_PACKET,
            kind.sockopt(),
            layout as *const sys::TpacketReq as *const libc::c_void,
            std::mem::size_of::<sys::TpacketReq>() as libc::socklen_t,
        )
    };
    if rc < 0 {
        return Err(CoreError::last_os_error());
    }
    Ok(())
}

fn unregister(sock: &OwnedFd, kind: RingKind) {
    let layout = sys::TpacketReq::default();
    // SAFETY: a zeroed layout clears the ring option; failure here is
    // not actionable, the socket is about to close.
    unsafe {
        libc::setsockopt(
            sock.as_raw_fd(),
            libc::SOL_PACKET,
            kind.sockopt(),
            &layout as *const sys::TpacketReq as *const libc::c_void,
            std::mem::size_of::<sys::TpacketReq>() as libc::socklen_t,
        )
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(frame_count: u32) -> RingConfig {
        RingConfig {
            kind: RingKind::Receive,
            interface: "lo".to_string(),
            frame_size: FrameSize::Standard,
            frame_count,
        }
    }

    #[test]
    fn test_frame_size_from_u32() {
        assert_eq!(FrameSize::from_u32(2048), Some(FrameSize::Standard));
        assert_eq!(FrameSize::from_u32(16384), Some(FrameSize::Jumbo));
        assert_eq!(FrameSize::from_u32(65536), Some(FrameSize::SuperJumbo));
        assert_eq!(FrameSize::from_u32(0), None);
        assert_eq!(FrameSize::from_u32(1024), None);
        assert_eq!(FrameSize::from_u32(4096), None);
    }

    #[test]
    fn test_validate_frame_count() {
        assert!(config(8).validate().is_ok());
        assert!(config(1024).validate().is_ok());
        for bad in [0, 1, 4, 6, 12, 100] {
            assert!(
                matches!(config(bad).validate(), Err(CoreError::InvalidArgument(_))),
                "frame count {bad} should be rejected"
            );
        }
    }

    // frame_count == block_count * (block_size / frame_size)
    #[test]
    fn test_layout_invariant() {
        for frame_size in [FrameSize::Standard, FrameSize::Jumbo, FrameSize::SuperJumbo] {
            for frame_count in [8u32, 16, 64, 512] {
                let layout = RingConfig {
                    kind: RingKind::Transmit,
                    interface: "any".to_string(),
                    frame_size,
                    frame_count,
                }
                .layout();
                assert_eq!(
                    layout.tp_frame_nr,
                    layout.tp_block_nr * (layout.tp_block_size / layout.tp_frame_size)
                );
                assert!(layout.tp_block_nr > 0);
            }
        }
    }
}
