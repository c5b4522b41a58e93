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

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::mem::size_of;
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::Path;
use thiserror::Error;
use zerocopy::{AsBytes, FromBytes};
use zerocopy_derive::{AsBytes, FromBytes, FromZeroes};

pub type Result<A> = std::result::Result<A, Error>;

/// Errors produced by the pcap codec.
#[derive(Debug, Error)]
pub enum Error {
    /// Underlying filesystem failure.
    #[error("pcap i/o failure: {0}")]
    Io(#[from] io::Error),
    /// Bad magic, unsupported version or link type, or a truncated header.
    #[error("invalid pcap format: {0}")]
    InvalidFormat(String),
    /// No more records in the file. A signalling value, not a fault.
    #[error("end of pcap file")]
    EndOfFile,
}

/// Size in bytes of the pcap file header.
pub const FILE_HEADER_LEN: usize = size_of::<FileHeader>();

/// Size in bytes of a pcap packet record header.
pub const RECORD_HEADER_LEN: usize = size_of::<PacketHeader>();

/// Represents the global header of a pcap capture file.
///
/// This struct defines the global header that appears at the beginning of a
/// pcap capture file. It contains metadata about the capture, such as the
/// file format version, the data link type, and the maximum snapshot length.
///
/// # File Header format
/// ```text
///                         1                   2                   3
///     0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
///    +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///  0 |                          Magic Number                         |
///    +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///  4 |          Major Version        |         Minor Version         |
///    +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///  8 |                            Thiszone                           |
///    +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// 12 |                            Sigfigs                            |
///    +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// 16 |                            SnapLen                            |
///    +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// 20 |                            LinkType                           |
///    +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
///
/// A file written on a machine of the opposite byte order carries the
/// byte-swapped magic; every multi-byte field of the file header and of
/// each packet record header must then be swapped on read.
#[repr(C)]
#[derive(Clone, Copy, AsBytes, FromBytes, FromZeroes)]
pub struct FileHeader {
    /// Magic number identifying the file format.
    pub magic: u32,
    /// Major version of the pcap format.
    pub version_major: u16,
    /// Minor version of the pcap format.
    pub version_minor: u16,
    /// GMT to local time zone offset, always zero.
    pub thiszone: i32,
    /// Timestamp accuracy, always zero.
    pub sigfigs: u32,
    /// Maximum recorded packet length in bytes.
    pub snaplen: u32,
    /// Data link type of packets.
    pub linktype: u32,
}

impl FileHeader {
    /// The canonical pcap magic value.
    pub const MAGIC: u32 = 0xa1b2c3d4;
    const VERSION_MAJOR: u16 = 2u16;
    const VERSION_MINOR: u16 = 4u16;
    /// Default snapshot length of created files.
    pub const SNAP_LEN: u32 = 65535;

    /// Returns a copy with every multi-byte field byte-swapped.
    pub fn byte_swapped(&self) -> FileHeader {
        FileHeader {
            magic: self.magic.swap_bytes(),
            version_major: self.version_major.swap_bytes(),
            version_minor: self.version_minor.swap_bytes(),
            thiszone: self.thiszone.swap_bytes(),
            sigfigs: self.sigfigs.swap_bytes(),
            snaplen: self.snaplen.swap_bytes(),
            linktype: self.linktype.swap_bytes(),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.version_major != FileHeader::VERSION_MAJOR
            || self.version_minor != FileHeader::VERSION_MINOR
        {
            return Err(Error::InvalidFormat(format!(
                "unsupported pcap version {}.{}",
                self.version_major, self.version_minor
            )));
        }
        if self.linktype != LinkType::Ethernet as u32 {
            return Err(Error::InvalidFormat(format!(
                "unsupported link type {}",
                self.linktype
            )));
        }
        Ok(())
    }
}

impl Default for FileHeader {
    fn default() -> Self {
        FileHeader {
            magic: FileHeader::MAGIC,
            version_major: FileHeader::VERSION_MAJOR,
            version_minor: FileHeader::VERSION_MINOR,
            thiszone: 0,
            sigfigs: 0,
            snaplen: FileHeader::SNAP_LEN,
            linktype: LinkType::Ethernet as u32,
        }
    }
}

/// Represents the link layer header type of a pcap capture.
///
/// For a complete list of link types and their descriptions,
/// refer to the tcpdump documentation:
/// https://www.tcpdump.org/linktypes.html
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkType {
    /// Null link type (BSD loopback)
    Null = 0,
    /// Ethernet v2, the only link type ringtap produces or accepts.
    Ethernet = 1,
}

impl From<LinkType> for u32 {
    fn from(val: LinkType) -> Self {
        val as u32
    }
}

/// Represents the header prepended to each packet in a pcap capture file.
///
/// * `tv_sec`:  The seconds component of the timestamp.
/// * `tv_usec`: The microseconds component of the timestamp.
/// * `caplen`: The number of bytes of packet data saved in the file.
/// * `len`: The original length of the packet on the wire.
#[repr(C)]
#[derive(Clone, Copy, AsBytes, FromBytes, FromZeroes)]
pub struct PacketHeader {
    /// Timestamp of the captured packet (seconds).
    pub tv_sec: u32,
    /// Timestamp of the captured packet (microseconds).
    pub tv_usec: u32,
    /// Number of bytes captured from the packet.
    pub caplen: u32,
    /// Original length of the packet on the network.
    pub len: u32,
}

impl PacketHeader {
    /// Returns a copy with every field byte-swapped.
    pub fn byte_swapped(&self) -> PacketHeader {
        PacketHeader {
            tv_sec: self.tv_sec.swap_bytes(),
            tv_usec: self.tv_usec.swap_bytes(),
            caplen: self.caplen.swap_bytes(),
            len: self.len.swap_bytes(),
        }
    }
}

/// Open mode for an existing pcap file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    /// Read records from the start of the file.
    Read,
    /// Validate the header, then position at end of file for writing.
    Append,
}

/// An open pcap file.
///
/// The file position is immediately after the file header on open and
/// immediately after a complete packet record at all other rest points.
/// A failed `write_record` leaves the position indeterminate; the handle
/// must be discarded.
pub struct Pcap {
    file: File,
    swapped: bool,
}

impl Pcap {
    /// Create a new pcap file with a native-endian file header.
    ///
    /// An existing file at `path` is truncated. If the header cannot be
    /// written the partially created file is unlinked before returning.
    pub fn create<P: AsRef<Path>>(path: P, link_type: LinkType) -> Result<Pcap> {
        let path = path.as_ref();
        let mut file =
            OpenOptions::new().read(true).write(true).create(true).truncate(true).open(path)?;
        let header = FileHeader { linktype: link_type as u32, ..Default::default() };
        if let Err(err) = file.write_all(header.as_bytes()) {
            drop(file);
            let _ = std::fs::remove_file(path);
            return Err(err.into());
        }
        Ok(Pcap { file, swapped: false })
    }

    /// Open an existing pcap file.
    ///
    /// The file header is validated in either byte order; the detected
    /// order applies to every subsequent read and write through this
    /// handle, so appends to a foreign-endian file stay consistent.
    pub fn open<P: AsRef<Path>>(path: P, mode: Mode) -> Result<Pcap> {
        let mut file =
            OpenOptions::new().read(true).write(mode == Mode::Append).open(path.as_ref())?;
        let mut header_bytes = [0u8; FILE_HEADER_LEN];
        file.read_exact(&mut header_bytes).map_err(|err| match err.kind() {
            io::ErrorKind::UnexpectedEof => {
                Error::InvalidFormat("truncated pcap file header".to_string())
            }
            _ => Error::Io(err),
        })?;
        let header = FileHeader::read_from(&header_bytes[..])
            .ok_or(Error::InvalidFormat("failed to parse pcap file header".to_string()))?;
        let swapped = match header.magic {
            FileHeader::MAGIC => false,
            m if m == FileHeader::MAGIC.swap_bytes() => true,
            m => {
                return Err(Error::InvalidFormat(format!("invalid magic 0x{:x}", m)));
            }
        };
        let header = if swapped { header.byte_swapped() } else { header };
        header.validate()?;
        if mode == Mode::Append {
            file.seek(SeekFrom::End(0))?;
        }
        Ok(Pcap { file, swapped })
    }

    /// Append a single packet record.
    ///
    /// Writes the record header and the first `caplen` bytes of `packet`
    /// as one write, in the byte order of the file. Returns the total
    /// number of bytes written. On any error the file position is
    /// indeterminate and the handle must be discarded.
    pub fn write_record(
        &mut self,
        packet: &[u8],
        wire_len: u32,
        caplen: u32,
        tv_sec: u32,
        tv_usec: u32,
    ) -> Result<usize> {
        let caplen = caplen.min(packet.len() as u32);
        let payload = &packet[..caplen as usize];
        let header = PacketHeader { tv_sec, tv_usec, caplen, len: wire_len };
        let header = if self.swapped { header.byte_swapped() } else { header };
        let mut bytes = Vec::<u8>::with_capacity(RECORD_HEADER_LEN + payload.len());
        bytes.extend_from_slice(header.as_bytes());
        bytes.extend_from_slice(payload);
        self.file.write_all(&bytes)?;
        Ok(RECORD_HEADER_LEN + payload.len())
    }

    /// Read the next packet record into `packet`.
    ///
    /// Copies `min(caplen, packet.len())` payload bytes and skips the
    /// remainder so the position stays record-aligned. Returns the number
    /// of bytes copied, `Error::EndOfFile` on a clean end of file, and
    /// `Error::InvalidFormat` if the file ends inside a record.
    pub fn read_record(&mut self, packet: &mut [u8]) -> Result<usize> {
        let mut header_bytes = [0u8; RECORD_HEADER_LEN];
        let read = self.file.read(&mut header_bytes)?;
        if read == 0 {
            return Err(Error::EndOfFile);
        }
        self.file.read_exact(&mut header_bytes[read..]).map_err(|err| match err.kind() {
            io::ErrorKind::UnexpectedEof => {
                Error::InvalidFormat("truncated pcap record header".to_string())
            }
            _ => Error::Io(err),
        })?;
        let header = PacketHeader::read_from(&header_bytes[..])
            .ok_or(Error::InvalidFormat("failed to parse pcap record header".to_string()))?;
        let header = if self.swapped { header.byte_swapped() } else { header };
        let wanted = header.caplen as usize;
        let copied = wanted.min(packet.len());
        self.file.read_exact(&mut packet[..copied]).map_err(|err| match err.kind() {
            io::ErrorKind::UnexpectedEof => {
                Error::InvalidFormat("truncated pcap record payload".to_string())
            }
            _ => Error::Io(err),
        })?;
        if wanted > copied {
            self.file.seek(SeekFrom::Current((wanted - copied) as i64))?;
        }
        Ok(copied)
    }

    /// Reposition the file to the first packet record.
    pub fn rewind(&mut self) -> Result<()> {
        self.file.seek(SeekFrom::Start(FILE_HEADER_LEN as u64))?;
        Ok(())
    }

    /// True when the file was recorded with the opposite byte order.
    pub fn is_swapped(&self) -> bool {
        self.swapped
    }
}

impl AsRawFd for Pcap {
    fn as_raw_fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_sizes() {
        assert_eq!(FILE_HEADER_LEN, 24);
        assert_eq!(RECORD_HEADER_LEN, 16);
    }

    #[test]
    fn test_default_file_header() {
        let header = FileHeader::default();
        assert_eq!(header.magic, 0xa1b2c3d4);
        assert_eq!(header.version_major, 2);
        assert_eq!(header.version_minor, 4);
        assert_eq!(header.thiszone, 0);
        assert_eq!(header.sigfigs, 0);
        assert_eq!(header.snaplen, 65535);
        assert_eq!(header.linktype, u32::from(LinkType::Ethernet));
    }

    #[test]
    fn test_byte_swapped_round_trip() {
        let header = FileHeader::default();
        let twice = header.byte_swapped().byte_swapped();
        assert_eq!(header.as_bytes(), twice.as_bytes());
        let record = PacketHeader { tv_sec: 1, tv_usec: 2, caplen: 3, len: 4 };
        let swapped = record.byte_swapped();
        assert_eq!(swapped.tv_sec, 1u32.swap_bytes());
        assert_eq!(record.as_bytes(), swapped.byte_swapped().as_bytes());
    }
}
