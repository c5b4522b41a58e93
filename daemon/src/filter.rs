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

//! Kernel packet filter programs.
//!
//! A filter program is an ordered sequence of classic BPF instructions
//! evaluated by the kernel on every incoming frame; a non-zero result
//! accepts the frame, zero drops it. Programs arrive in the textual
//! form emitted by `tcpdump -ddd`-style tooling, one instruction per
//! `{ code, jt, jf, k },` line.

use crate::error::{CoreError, Result};
use std::io::BufRead;
use std::os::unix::io::RawFd;

const BPF_CLASS_MASK: u16 = 0x07;
const BPF_CLASS_JMP: u16 = 0x05;
const BPF_CLASS_RET: u16 = 0x06;
// Unconditional jump: opcode bits select JA, the target comes from k.
const BPF_OP_MASK: u16 = 0xf0;
const BPF_OP_JA: u16 = 0x00;

/// One filter instruction, layout-identical to the kernel's
/// `sock_filter`.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SocketFilter {
    /// Opcode.
    pub code: u16,
    /// Branch offset when the comparison holds.
    pub jt: u8,
    /// Branch offset when it does not.
    pub jf: u8,
    /// Literal operand.
    pub k: u32,
}

impl SocketFilter {
    fn class(&self) -> u16 {
        self.code & BPF_CLASS_MASK
    }
}

/// An owned filter program. The worker that attaches it holds it for
/// its lifetime and drops it with the worker.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FilterProgram {
    instructions: Vec<SocketFilter>,
}

impl FilterProgram {
    /// A program with no instructions, meaning "no filter".
    pub fn empty() -> FilterProgram {
        FilterProgram::default()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    /// Parse the line-oriented textual form.
    ///
    /// Lines not starting with `{` are comments and skipped. A valid
    /// line is `{ 0xHH, N, N, 0xHHHHHHHH },`; any deviation fails the
    /// entire parse.
    pub fn parse<R: BufRead>(reader: R) -> Result<FilterProgram> {
        let mut instructions = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if !line.starts_with('{') {
                continue;
            }
            instructions.push(parse_instruction(&line)?);
        }
        Ok(FilterProgram { instructions })
    }

    /// Structural validation: every branch target lands inside the
    /// program and the last instruction is a return.
    pub fn validate(&self) -> bool {
        let len = self.instructions.len();
        if len == 0 {
            return false;
        }
        for (index, instruction) in self.instructions.iter().enumerate() {
            if instruction.class() == BPF_CLASS_JMP {
                if instruction.code & BPF_OP_MASK == BPF_OP_JA {
                    if index as u64 + 1 + instruction.k as u64 >= len as u64 {
                        return false;
                    }
                } else if index + 1 + instruction.jt as usize >= len
                    || index + 1 + instruction.jf as usize >= len
                {
                    return false;
                }
            }
        }
        self.instructions[len - 1].class() == BPF_CLASS_RET
    }
}

fn parse_instruction(line: &str) -> Result<SocketFilter> {
    let malformed = || CoreError::InvalidFormat(format!("malformed filter line {:?}", line));
    let body = line
        .strip_prefix('{')
        .and_then(|rest| rest.split_once('}'))
        .map(|(body, _)| body)
        .ok_or_else(malformed)?;
    let fields: Vec<&str> = body.split(',').map(str::trim).collect();
    if fields.len() != 4 {
        return Err(malformed());
    }
    let code = fields[0]
        .strip_prefix("0x")
        .and_then(|hex| u16::from_str_radix(hex, 16).ok())
        .ok_or_else(malformed)?;
    let jt = fields[1].parse::<u8>().map_err(|_| malformed())?;
    let jf = fields[2].parse::<u8>().map_err(|_| malformed())?;
    let k = fields[3]
        .strip_prefix("0x")
        .and_then(|hex| u32::from_str_radix(hex, 16).ok())
        .ok_or_else(malformed)?;
    Ok(SocketFilter { code, jt, jf, k })
}

/// A filter program installed on a packet socket.
///
/// Detaches on drop, so a worker's filter disappears with the worker
/// and before the socket closes.
pub struct AttachedFilter {
    sock: RawFd,
    program: FilterProgram,
}

impl AttachedFilter {
    /// Validate `program` and install it on `sock` for kernel
    /// evaluation.
    pub fn attach(sock: RawFd, program: FilterProgram) -> Result<AttachedFilter> {
        if !program.validate() {
            return Err(CoreError::InvalidFormat(
                "filter program fails structural validation".to_string(),
            ));
        }
        let prog = libc::sock_fprog {
            len: program.instructions.len() as u16,
            // SocketFilter is layout-identical to libc::sock_filter.
            filter: program.instructions.as_ptr() as *mut libc::sock_filter,
        };
        // SAFETY: prog points at program.instructions, alive for the call.
        let rc = unsafe {
            libc::setsockopt(
                sock,
                libc::SOL_SOCKET,
                libc::SO_ATTACH_FILTER,
                &prog as *const libc::sock_fprog as *const libc::c_void,
                std::mem::size_of::<libc::sock_fprog>() as libc::socklen_t,
            )
        };
        if rc < 0 {
            return Err(CoreError::last_os_error());
        }
        Ok(AttachedFilter { sock, program })
    }

    /// The installed program.
    pub fn program(&self) -> &FilterProgram {
        &self.program
    }
}

impl Drop for AttachedFilter {
    fn drop(&mut self) {
        let _ = detach(self.sock);
    }
}

/// Clear any filter installed on `sock`.
pub fn detach(sock: RawFd) -> Result<()> {
    let dummy: libc::c_int = 0;
    // SAFETY: SO_DETACH_FILTER ignores the option value.
    let rc = unsafe {
        libc::setsockopt(
            sock,
            libc::SOL_SOCKET,
            libc::SO_DETACH_FILTER,
            &dummy as *const libc::c_int as *const libc::c_void,
            std::mem::size_of::<libc::c_int>() as libc::socklen_t,
        )
    };
    if rc < 0 {
        return Err(CoreError::last_os_error());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    // Accept-all: load the frame length, return it capped to 0xffff.
    const ACCEPT_ALL: &str = "# retrieve frame length\n\
                              { 0x80, 0, 0, 0x00000000 },\n\
                              { 0x06, 0, 0, 0x0000ffff },\n";

    #[test]
    fn test_parse_accept_all() {
        let program = FilterProgram::parse(Cursor::new(ACCEPT_ALL)).unwrap();
        assert_eq!(program.len(), 2);
        assert!(program.validate());
    }

    #[test]
    fn test_parse_skips_comments_and_blanks() {
        let text = "; comment\n\n   \nret below\n{ 0x06, 0, 0, 0x0000ffff },\n";
        let program = FilterProgram::parse(Cursor::new(text)).unwrap();
        assert_eq!(program.len(), 1);
        assert!(program.validate());
    }

    #[test]
    fn test_parse_rejects_malformed_lines() {
        for bad in [
            "{ 0x06, 0, 0 },",                   // missing field
            "{ 0x06, 0, 0, 0xffff, 1 },",        // extra field
            "{ 6, 0, 0, 0x0000ffff },",          // code not hex
            "{ 0x06, a, 0, 0x0000ffff },",       // branch not numeric
            "{ 0x06, 300, 0, 0x0000ffff },",     // branch out of byte range
            "{ 0x06, 0, 0, 0x0000ffff",          // truncated
        ] {
            assert!(
                matches!(
                    FilterProgram::parse(Cursor::new(bad)),
                    Err(CoreError::InvalidFormat(_))
                ),
                "line {bad:?} should fail the parse"
            );
        }
    }

    #[test]
    fn test_validate_requires_terminal_return() {
        let program = FilterProgram {
            instructions: vec![SocketFilter { code: 0x80, jt: 0, jf: 0, k: 0 }],
        };
        assert!(!program.validate());
    }

    #[test]
    fn test_validate_rejects_out_of_range_branches() {
        // jeq with both branches past the end of the program
        let program = FilterProgram {
            instructions: vec![
                SocketFilter { code: 0x15, jt: 4, jf: 5, k: 0x0800 },
                SocketFilter { code: 0x06, jt: 0, jf: 0, k: 0xffff },
            ],
        };
        assert!(!program.validate());
    }

    #[test]
    fn test_validate_rejects_empty_program() {
        assert!(!FilterProgram::empty().validate());
    }

    #[test]
    fn test_validate_unconditional_jump_target() {
        // ja +2 over a single following instruction jumps past the end
        let program = FilterProgram {
            instructions: vec![
                SocketFilter { code: 0x05, jt: 0, jf: 0, k: 2 },
                SocketFilter { code: 0x06, jt: 0, jf: 0, k: 0xffff },
            ],
        };
        assert!(!program.validate());
        let program = FilterProgram {
            instructions: vec![
                SocketFilter { code: 0x05, jt: 0, jf: 0, k: 0 },
                SocketFilter { code: 0x06, jt: 0, jf: 0, k: 0xffff },
            ],
        };
        assert!(program.validate());
    }

    #[test]
    fn test_layout_matches_kernel_sock_filter() {
        assert_eq!(
            std::mem::size_of::<SocketFilter>(),
            std::mem::size_of::<libc::sock_filter>()
        );
    }
}
