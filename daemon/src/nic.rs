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

//! Interface name to interface index resolution.

use crate::error::{CoreError, Result};
use std::ffi::{CStr, CString};

/// Pseudo interface name matching every interface (index 0).
pub const ANY_INTERFACE: &str = "any";

/// Maximum interface name length, including the terminating NUL.
pub const IF_NAMESIZE: usize = libc::IF_NAMESIZE;

/// Resolve an interface name to its kernel interface index.
pub fn ifindex(name: &str) -> Result<u32> {
    if name == ANY_INTERFACE {
        return Ok(0);
    }
    let cname = CString::new(name)
        .map_err(|_| CoreError::InvalidArgument(format!("invalid interface name {:?}", name)))?;
    // SAFETY: cname is a valid NUL-terminated string.
    match unsafe { libc::if_nametoindex(cname.as_ptr()) } {
        0 => Err(CoreError::last_os_error()),
        index => Ok(index),
    }
}

/// Resolve an interface index back to its name.
pub fn ifname(index: u32) -> Result<String> {
    if index == 0 {
        return Ok(ANY_INTERFACE.to_string());
    }
    let mut buf = [0 as libc::c_char; libc::IF_NAMESIZE];
    // SAFETY: buf is IF_NAMESIZE bytes as if_indextoname requires.
    let name = unsafe { libc::if_indextoname(index, buf.as_mut_ptr()) };
    if name.is_null() {
        return Err(CoreError::last_os_error());
    }
    // SAFETY: on success the buffer holds a NUL-terminated name.
    Ok(unsafe { CStr::from_ptr(buf.as_ptr()) }.to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_any_interface_is_index_zero() {
        assert_eq!(ifindex(ANY_INTERFACE).unwrap(), 0);
        assert_eq!(ifname(0).unwrap(), ANY_INTERFACE);
    }

    #[test]
    fn test_loopback_round_trip() {
        let index = ifindex("lo").unwrap();
        assert!(index > 0);
        assert_eq!(ifname(index).unwrap(), "lo");
    }

    #[test]
    fn test_unknown_interface() {
        assert!(ifindex("no-such-interface0").is_err());
    }

    #[test]
    fn test_embedded_nul_rejected() {
        assert!(matches!(ifindex("lo\0lo"), Err(CoreError::InvalidArgument(_))));
    }
}
