// Copyright 2026 The Zeta Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Roll-up of loose objects into packs.
//!
//! GC packs, it does not prune: every loose object ends up in a pack and
//! remains addressable through the pack index. Reachability is never
//! computed here.

use std::fs;
use std::io;
use std::io::Write as _;
use std::time::Duration;
use std::time::SystemTime;

use thiserror::Error;

use crate::file_util::persist_content_addressed_temp_file;
use crate::hash_id::HashID;
use crate::hash_id::Hasher;
use crate::odb::ObjectDatabase;

#[derive(Clone, Debug, Default)]
pub struct PackObjectsOptions {
    /// Only loose objects older than this are rolled up; `None` packs
    /// everything. Freshly written objects may still be mid-rename in a
    /// concurrent writer, which is why callers usually pass a grace window.
    pub pack_older_than: Option<Duration>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PackSummary {
    pub packed: usize,
    pub bytes: u64,
}

#[derive(Debug, Error)]
pub enum GcError {
    #[error("Failed to pack objects")]
    Io { source: io::Error },
}

impl From<io::Error> for GcError {
    fn from(source: io::Error) -> Self {
        Self::Io { source }
    }
}

/// Rolls eligible loose objects into a single new pack and deletes the
/// loose files. Returns an empty summary when nothing is eligible.
pub fn pack_objects(
    odb: &ObjectDatabase,
    options: &PackObjectsOptions,
) -> Result<PackSummary, GcError> {
    let objects_root = odb.objects_root();
    let cutoff = options
        .pack_older_than
        .map(|age| SystemTime::now().checked_sub(age).unwrap_or(SystemTime::UNIX_EPOCH));

    // Gather eligible loose objects: two-hex fan-out dirs only.
    let mut loose: Vec<(HashID, std::path::PathBuf)> = vec![];
    for dir_entry in objects_root.read_dir()? {
        let dir_entry = dir_entry?;
        let dir_name = dir_entry.file_name();
        let Some(dir_name) = dir_name.to_str() else {
            continue;
        };
        if dir_name.len() != 2 || !dir_name.bytes().all(|b| b.is_ascii_hexdigit()) {
            continue;
        }
        for file_entry in dir_entry.path().read_dir()? {
            let file_entry = file_entry?;
            let file_name = file_entry.file_name();
            let Some(file_name) = file_name.to_str() else {
                continue;
            };
            let Ok(hash) = HashID::try_from_hex(format!("{dir_name}{file_name}")) else {
                continue;
            };
            if let Some(cutoff) = cutoff {
                let modified = file_entry.metadata()?.modified()?;
                if modified > cutoff {
                    continue;
                }
            }
            loose.push((hash, file_entry.path()));
        }
    }
    if loose.is_empty() {
        return Ok(PackSummary::default());
    }
    loose.sort_by_key(|(hash, _)| *hash);

    // Concatenate into the pack body, remembering offsets.
    let mut data: Vec<u8> = vec![];
    let mut entries: Vec<(HashID, u64, u64)> = vec![];
    for (hash, path) in &loose {
        let bytes = fs::read(path)?;
        entries.push((*hash, data.len() as u64, bytes.len() as u64));
        data.extend_from_slice(&bytes);
    }

    let mut index: Vec<u8> = vec![];
    index.extend_from_slice(b"ZPIX");
    index.extend_from_slice(&(entries.len() as u32).to_le_bytes());
    for (hash, offset, len) in &entries {
        index.extend_from_slice(hash.as_bytes());
        index.extend_from_slice(&offset.to_le_bytes());
        index.extend_from_slice(&len.to_le_bytes());
    }

    // The pack name is the hash of its index, so retries are idempotent.
    let name = {
        let mut hasher = Hasher::new();
        hasher.update(&index);
        hasher.finalize().hex()
    };
    let pack_dir = objects_root.join("pack");
    fs::create_dir_all(&pack_dir)?;
    let pack_path = pack_dir.join(format!("pack-{name}.zpak"));
    let idx_path = pack_dir.join(format!("pack-{name}.zidx"));

    let mut temp_file = tempfile::NamedTempFile::new_in(&pack_dir)?;
    temp_file.write_all(&data)?;
    persist_content_addressed_temp_file(temp_file, &pack_path)?;
    // The index lands after the pack body, so a crash in between leaves an
    // unreferenced pack file rather than dangling index entries.
    let mut temp_file = tempfile::NamedTempFile::new_in(&pack_dir)?;
    temp_file.write_all(&index)?;
    persist_content_addressed_temp_file(temp_file, &idx_path)?;

    for (_, path) in &loose {
        match fs::remove_file(path) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }
    }
    odb.reload_packs();
    tracing::info!(packed = entries.len(), bytes = data.len(), "rolled up loose objects");
    Ok(PackSummary {
        packed: entries.len(),
        bytes: data.len() as u64,
    })
}

/// Parses a human prune duration: `now`, `14d`, `36h`, `30m`, `90s`.
pub fn parse_duration(input: &str) -> Option<Duration> {
    if input == "now" {
        return Some(Duration::ZERO);
    }
    let (number, unit) = input.split_at(input.len().checked_sub(1)?);
    let number: u64 = number.parse().ok()?;
    let seconds = match unit {
        "d" => number.checked_mul(24 * 3600)?,
        "h" => number.checked_mul(3600)?,
        "m" => number.checked_mul(60)?,
        "s" => number,
        _ => return None,
    };
    Some(Duration::from_secs(seconds))
}
