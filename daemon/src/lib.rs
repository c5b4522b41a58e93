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

//! Ringtap daemon libraries.
//!
//! Captures and replays Ethernet frames on Linux interfaces through the
//! kernel's shared-memory packet rings. The capture and replay facades
//! are the entry points for the surrounding RPC transport; each running
//! capture or replay is a dedicated worker thread tracked by the
//! process-wide worker registry.

pub mod capture;
pub mod error;
pub mod events;
pub mod filter;
pub mod nic;
pub mod replay;
pub mod resource;
pub mod ring;
pub mod threads;
