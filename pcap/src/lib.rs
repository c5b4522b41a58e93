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

//! A library for reading and writing pcap (packet capture) files in Rust.
//!
//! This crate provides a synchronous API for working with pcap files,
//! allowing capture workers to append packet records and replay workers
//! to read them back, including files recorded on a machine of the
//! opposite byte order.
//!
//! # Features
//!
//! * **Blocking API:** capture and replay run on dedicated OS threads,
//!   so file access is plain `std::fs` I/O.
//! * **Zero-copy headers:** Uses the `zerocopy` crate for zero-cost
//!   conversions between structs and byte slices.
//! * **Standard pcap format:** Supports the standard pcap file format,
//!   ensuring compatibility with other pcap tools.
//!

/// This module contains the core functionality for reading and writing pcap files.
pub mod pcap;
