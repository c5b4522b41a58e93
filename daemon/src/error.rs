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

//! Error taxonomy shared across the daemon.

use crate::threads::WorkerId;
use ringtap_pcap::pcap;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors surfaced by the capture/replay core.
///
/// The RPC transport maps these onto its stable numeric codes; inside
/// the daemon they flow as ordinary `Result` values.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Configuration rejected by validation.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// Pcap or filter program content is structurally wrong.
    #[error("invalid format: {0}")]
    InvalidFormat(String),
    /// Underlying system call failure.
    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),
    /// Allocation failure while materializing a ring or filter.
    #[error("out of memory")]
    OutOfMemory,
    /// Unknown worker identifier in a registry operation.
    #[error("no worker with id {0}")]
    NotFound(WorkerId),
    /// Reserved for future back-pressure reporting.
    #[error("resource busy")]
    Busy,
}

impl From<pcap::Error> for CoreError {
    fn from(err: pcap::Error) -> Self {
        match err {
            pcap::Error::Io(err) => CoreError::Io(err),
            pcap::Error::InvalidFormat(msg) => CoreError::InvalidFormat(msg),
            // End of file is worker-internal control flow; reaching a
            // facade boundary means the file had no usable content.
            pcap::Error::EndOfFile => {
                CoreError::InvalidFormat("unexpected end of pcap file".to_string())
            }
        }
    }
}

impl CoreError {
    /// Captures `errno` after a failed libc call, folding allocation
    /// failures into the dedicated kind.
    pub(crate) fn last_os_error() -> CoreError {
        let err = std::io::Error::last_os_error();
        match err.raw_os_error() {
            Some(libc::ENOMEM) => CoreError::OutOfMemory,
            _ => CoreError::Io(err),
        }
    }
}
