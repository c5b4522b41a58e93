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

//! Inspection and manipulation of the system environment.

use std::env;
use std::io::Result;
use std::os::unix::io::RawFd;
use std::path::PathBuf;

/// Resolve an open file descriptor back to a filesystem path.
///
/// Reads the symlink the kernel keeps for every open descriptor under
/// the process's open-file directory. The result is whatever the
/// operating system reports, without further canonicalization; the
/// target may no longer exist if the file was unlinked after opening.
pub fn fd_to_path(fd: RawFd) -> Result<PathBuf> {
    std::fs::read_link(format!("/proc/self/fd/{}", fd))
}

/// Get or create the ringtap temporary directory.
///
/// Used for scratch files in tests and tooling. The directory is
/// `$TMP/ringtap-$USER` so multiple users can co-exist on a system.
pub fn ringtap_temp_dir() -> PathBuf {
    let path = ringtap_temp_dir_pathbuf();
    if !path.is_dir() {
        std::fs::create_dir_all(&path).expect("Could not create ringtap temp directory");
    }
    path
}

/// Helper function for ringtap_temp_dir() to allow read-only unit tests.
fn ringtap_temp_dir_pathbuf() -> PathBuf {
    let mut path = env::temp_dir();
    let dir = match env::var("USER") {
        Ok(user) => format!("ringtap-{}", user),
        _ => "ringtap".to_string(),
    };
    path.push(dir);
    path
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::os::unix::io::AsRawFd;

    #[test]
    fn test_fd_to_path() {
        let dir = ringtap_temp_dir();
        let path = dir.join(format!("fd_to_path-{}", std::process::id()));
        let file = File::create(&path).unwrap();
        let resolved = fd_to_path(file.as_raw_fd()).unwrap();
        assert_eq!(resolved, path.canonicalize().unwrap());
        drop(file);
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_fd_to_path_bad_fd() {
        assert!(fd_to_path(-1).is_err());
    }

    #[test]
    fn test_temp_dir_under_system_tmp() {
        assert!(ringtap_temp_dir_pathbuf().starts_with(env::temp_dir()));
    }
}
