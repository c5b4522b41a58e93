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

//! Cooperative worker cancellation.
//!
//! Workers consult the token on every slot visit and poll its wake
//! pipe alongside the ring socket, so cancellation takes effect no
//! later than the next status-word poll or the return from a blocked
//! readiness wait.

use crate::error::{CoreError, Result};
use std::os::unix::io::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

struct Inner {
    cancelled: AtomicBool,
    // Wake pipe: the read end is polled by the worker, the write end
    // is written once on cancel.
    read: OwnedFd,
    write: OwnedFd,
}

/// Shared cancellation token between the registry and one worker.
#[derive(Clone)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

impl CancelToken {
    pub fn new() -> Result<CancelToken> {
        let mut fds = [0 as libc::c_int; 2];
        // SAFETY: fds points at two writable c_ints.
        let rc = unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC | libc::O_NONBLOCK) };
        if rc < 0 {
            return Err(CoreError::last_os_error());
        }
        // SAFETY: both descriptors were just created by pipe2.
        let (read, write) = unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) };
        Ok(CancelToken {
            inner: Arc::new(Inner { cancelled: AtomicBool::new(false), read, write }),
        })
    }

    /// Request cancellation and wake any readiness wait.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::Release);
        let byte = [1u8];
        // SAFETY: one-byte write into the pipe; a full pipe is fine,
        // the flag alone suffices once the worker wakes.
        unsafe { libc::write(self.inner.write.as_raw_fd(), byte.as_ptr() as *const libc::c_void, 1) };
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// Read end of the wake pipe, for polling next to a socket.
    pub fn wake_fd(&self) -> RawFd {
        self.inner.read.as_raw_fd()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_sets_flag_and_wakes_pipe() {
        let token = CancelToken::new().unwrap();
        assert!(!token.is_cancelled());
        let observer = token.clone();
        token.cancel();
        assert!(observer.is_cancelled());

        // The wake pipe is readable after cancel.
        let mut fds =
            [libc::pollfd { fd: token.wake_fd(), events: libc::POLLIN, revents: 0 }];
        let rc = unsafe { libc::poll(fds.as_mut_ptr(), 1, 0) };
        assert_eq!(rc, 1);
        assert_ne!(fds[0].revents & libc::POLLIN, 0);
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let token = CancelToken::new().unwrap();
        token.cancel();
        token.cancel();
        assert!(token.is_cancelled());
    }
}
