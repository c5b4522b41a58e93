//
//  Copyright 2025 Google, Inc.
//
//  Licensed under the Apache License, Version 2.0 (the "License");
//  you may not use this file except in compliance with the License.
//  You may obtain a copy of the License at:
//
//  http://www.apache.org/licenses/LICENSE-2.0
//
//  Unless required by applicable law or agreed to in writing, software
//  distributed under the License is distributed on an "AS IS" BASIS,
//  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//  See the License for the specific language governing permissions and
//  limitations under the License.

//! Logging for the ringtap daemon.
//!
//! Built on env_logger, so verbosity is controlled through the
//! RUST_LOG environment variable and defaults to info. A line carries
//! the level, a UTC timestamp, and the emitting module, which is
//! enough to tell the per-worker threads apart without a process
//! prefix; ringtap runs as a single daemon.

use env_logger::{Builder, Env};
use std::io::Write;

use crate::util::time_display::log_current_time;

/// Initialize logging for the daemon process.
///
/// Example line: `INFO  08-01 12:30:00.042 ringtap_daemon::threads - started capture worker 1000`
pub fn init() {
    let mut builder = Builder::from_env(Env::default().default_filter_or("info"));
    builder.format(|buf, record| {
        writeln!(
            buf,
            "{:5} {} {} - {}",
            record.level(),
            log_current_time(),
            record.target(),
            record.args()
        )
    });
    builder.init();
}

/// Initialize logging in Rust unit tests.
///
/// Output is captured per test and the timestamp is dropped; test
/// harness ordering makes it noise.
pub fn init_for_test() {
    let mut binding = Builder::from_env(Env::default().default_filter_or("debug"));
    let builder = binding.is_test(true);
    builder.format(|buf, record| {
        writeln!(buf, "{:5} {} - {}", record.level(), record.target(), record.args())
    });
    builder.init();
}

/// This test is an example of having logs in Rust unit tests
///
/// Expected log: `INFO  ringtap_common::util::logger - Hello ringtap`
#[test]
fn test_init_for_test() {
    init_for_test();
    log::info!("Hello ringtap");
}
