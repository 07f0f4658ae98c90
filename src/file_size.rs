/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use anyhow::anyhow;

/// Size per file, in MiB, when spreading `total_gib` over `num_files` files.
///
/// Sizes of 4 MiB or more are rounded up to a multiple of 4 MiB so they stay aligned with large
/// block sizes; smaller sizes are rounded up to the next whole MiB.
pub fn adjusted_file_size_mib(total_gib: f64, num_files: u64) -> anyhow::Result<u64> {
    if num_files == 0 {
        return Err(anyhow!("Number of files must be greater than 0"));
    }
    if !total_gib.is_finite() || total_gib < 0.0 {
        return Err(anyhow!("Invalid total volume {}", total_gib));
    }

    let raw_mib = total_gib * 1024.0 / num_files as f64;
    let adjusted = if raw_mib >= 4.0 {
        (raw_mib / 4.0).ceil() * 4.0
    } else {
        raw_mib.ceil()
    };
    Ok(adjusted as u64)
}

#[derive(Debug, Clone, PartialEq)]
pub struct FileSize {
    pub files: u64,
    pub mib: u64,
}
impl FileSize {
    pub fn gib(&self) -> f64 {
        self.mib as f64 / 1024.0
    }

    pub fn kib(&self) -> u64 {
        self.mib * 1024
    }
}

pub fn file_sizes(total_gib: f64, file_counts: &[u64]) -> anyhow::Result<Vec<FileSize>> {
    file_counts
        .iter()
        .map(|files| {
            adjusted_file_size_mib(total_gib, *files).map(|mib| FileSize { files: *files, mib })
        })
        .collect()
}
