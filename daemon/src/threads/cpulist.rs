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

//! CPU list rendering and parsing.
//!
//! A CPU set displays as a run-length list like `0,1-4,5,7`. The same
//! grammar parses back, with an optional `first-last:stride` step on
//! ranges.

use crate::error::{CoreError, Result};

/// Render sorted CPU numbers as a run-length list.
pub fn format(cpus: &[usize]) -> String {
    let mut out = String::new();
    let mut index = 0;
    while index < cpus.len() {
        let start = cpus[index];
        let mut run = 0;
        while index + run + 1 < cpus.len() && cpus[index + run + 1] == cpus[index + run] + 1 {
            run += 1;
        }
        if !out.is_empty() {
            out.push(',');
        }
        match run {
            0 => out.push_str(&start.to_string()),
            1 => out.push_str(&format!("{},{}", start, start + 1)),
            _ => out.push_str(&format!("{}-{}", start, start + run)),
        }
        index += run + 1;
    }
    out
}

/// Parse a CPU list back into sorted, deduplicated CPU numbers.
pub fn parse(list: &str) -> Result<Vec<usize>> {
    let malformed = || CoreError::InvalidArgument(format!("malformed cpu list {:?}", list));
    let mut cpus = Vec::new();
    for entry in list.split(',') {
        let entry = entry.trim();
        let (range, stride) = match entry.split_once(':') {
            Some((range, stride)) => (range, stride.parse::<usize>().map_err(|_| malformed())?),
            None => (entry, 1),
        };
        if stride == 0 {
            return Err(malformed());
        }
        let (first, last) = match range.split_once('-') {
            Some((first, last)) => (
                first.parse::<usize>().map_err(|_| malformed())?,
                last.parse::<usize>().map_err(|_| malformed())?,
            ),
            None => {
                let cpu = range.parse::<usize>().map_err(|_| malformed())?;
                (cpu, cpu)
            }
        };
        if first > last {
            return Err(malformed());
        }
        cpus.extend((first..=last).step_by(stride));
    }
    cpus.sort_unstable();
    cpus.dedup();
    Ok(cpus)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_runs() {
        assert_eq!(format(&[]), "");
        assert_eq!(format(&[3]), "3");
        assert_eq!(format(&[0, 1]), "0,1");
        assert_eq!(format(&[0, 1, 2, 3, 4]), "0-4");
        assert_eq!(format(&[0, 2, 4]), "0,2,4");
        assert_eq!(format(&[0, 5, 7, 9, 10, 11]), "0,5,7,9-11");
    }

    #[test]
    fn test_parse_lists_and_ranges() {
        assert_eq!(parse("3").unwrap(), vec![3]);
        assert_eq!(parse("0,5,7,9-11").unwrap(), vec![0, 5, 7, 9, 10, 11]);
        assert_eq!(parse("0-6:2").unwrap(), vec![0, 2, 4, 6]);
        assert_eq!(parse("1, 3").unwrap(), vec![1, 3]);
        // duplicates collapse
        assert_eq!(parse("2,1-3").unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_round_trip() {
        for list in ["0", "0,1", "0-4", "0,5,7,9-11"] {
            assert_eq!(format(&parse(list).unwrap()), list);
        }
    }

    #[test]
    fn test_parse_rejects_garbage() {
        for bad in ["", "a", "1-", "-3", "3-1", "1-4:0", "1;2", "0x2"] {
            assert!(parse(bad).is_err(), "{bad:?} should be rejected");
        }
    }
}
