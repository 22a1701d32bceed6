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

//! The staging snapshot: an ordered set of tracked path entries.
//!
//! The index is read as a sorted entry list, mutated through a builder that
//! caches entries in a map keyed by path (last writer wins, O(1) removal),
//! and atomically replaced on write.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::io::Write as _;
use std::path::Path;

use thiserror::Error;

use crate::file_util::persist_temp_file;
use crate::hash_id::HashID;
use crate::hash_id::hash_bytes;
use crate::object::EntryMode;
use crate::repo_path::RepoPath;
use crate::repo_path::RepoPathBuf;

const INDEX_MAGIC: &[u8; 4] = b"zidx";
const INDEX_VERSION: u32 = 1;

/// One tracked path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexEntry {
    pub path: RepoPathBuf,
    pub hash: HashID,
    pub mode: EntryMode,
    pub size: u64,
    /// Modification time observed when the file was last written or
    /// snapshotted, used to skip re-hashing unchanged files. Zero for
    /// pseudo entries whose file was never materialized.
    pub mtime_millis: i64,
}

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("Failed to read index")]
    Read { source: io::Error },
    #[error("Failed to write index")]
    Write { source: io::Error },
    #[error("Index file is corrupt: {reason}")]
    Corrupt { reason: &'static str },
}

/// The set of tracked paths, sorted by path.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Index {
    entries: Vec<IndexEntry>,
}

impl Index {
    pub fn from_sorted_entries(entries: Vec<IndexEntry>) -> Self {
        debug_assert!(entries.is_sorted_by(|a, b| a.path < b.path));
        Self { entries }
    }

    /// Loads the index file. A missing file is an empty index.
    pub fn load(path: &Path) -> Result<Self, IndexError> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(err) => return Err(IndexError::Read { source: err }),
        };
        Self::decode(&bytes)
    }

    /// Atomically replaces the index file.
    pub fn save(&self, path: &Path) -> Result<(), IndexError> {
        let bytes = self.encode();
        let dir = path.parent().unwrap();
        let mut temp_file =
            tempfile::NamedTempFile::new_in(dir).map_err(|source| IndexError::Write { source })?;
        temp_file
            .write_all(&bytes)
            .map_err(|source| IndexError::Write { source })?;
        persist_temp_file(temp_file, path).map_err(|source| IndexError::Write { source })?;
        Ok(())
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, path: &RepoPath) -> Option<&IndexEntry> {
        let index = self
            .entries
            .binary_search_by(|entry| AsRef::<RepoPath>::as_ref(&entry.path).cmp(path))
            .ok()?;
        Some(&self.entries[index])
    }

    pub fn into_builder(self) -> IndexBuilder {
        IndexBuilder::from_index(self)
    }

    fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(INDEX_MAGIC);
        out.extend_from_slice(&INDEX_VERSION.to_le_bytes());
        out.extend_from_slice(&(self.entries.len() as u32).to_le_bytes());
        for entry in &self.entries {
            let path = entry.path.as_internal_str().as_bytes();
            out.extend_from_slice(&(path.len() as u32).to_le_bytes());
            out.extend_from_slice(path);
            out.extend_from_slice(entry.hash.as_bytes());
            out.extend_from_slice(entry.mode.as_octal().as_bytes());
            out.push(b'\n');
            out.extend_from_slice(&entry.size.to_le_bytes());
            out.extend_from_slice(&entry.mtime_millis.to_le_bytes());
        }
        // Trailing checksum detects torn or hand-edited files.
        let checksum = hash_bytes(&out);
        out.extend_from_slice(checksum.as_bytes());
        out
    }

    fn decode(bytes: &[u8]) -> Result<Self, IndexError> {
        let corrupt = |reason| IndexError::Corrupt { reason };
        let payload_len = bytes
            .len()
            .checked_sub(HashID::LEN)
            .ok_or_else(|| corrupt("too short"))?;
        let (payload, checksum) = bytes.split_at(payload_len);
        if hash_bytes(payload).as_bytes() != checksum {
            return Err(corrupt("checksum mismatch"));
        }

        let mut rest = payload
            .strip_prefix(INDEX_MAGIC)
            .ok_or_else(|| corrupt("bad magic"))?;
        let version = take_u32(&mut rest).ok_or_else(|| corrupt("truncated"))?;
        if version != INDEX_VERSION {
            return Err(corrupt("unsupported version"));
        }
        let count = take_u32(&mut rest).ok_or_else(|| corrupt("truncated"))?;
        let mut entries = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let path_len = take_u32(&mut rest).ok_or_else(|| corrupt("truncated"))? as usize;
            let path = take(&mut rest, path_len).ok_or_else(|| corrupt("truncated"))?;
            let path = std::str::from_utf8(path)
                .ok()
                .and_then(|path| RepoPathBuf::from_internal_string(path).ok())
                .ok_or_else(|| corrupt("bad path"))?;
            let hash = take(&mut rest, HashID::LEN)
                .map(|bytes| HashID::from_bytes(bytes).unwrap())
                .ok_or_else(|| corrupt("truncated"))?;
            let mode = {
                let nl = rest
                    .iter()
                    .position(|&b| b == b'\n')
                    .ok_or_else(|| corrupt("truncated"))?;
                let octal = std::str::from_utf8(&rest[..nl]).map_err(|_| corrupt("bad mode"))?;
                rest = &rest[nl + 1..];
                EntryMode::from_octal(octal).ok_or_else(|| corrupt("bad mode"))?
            };
            let size = take(&mut rest, 8)
                .map(|bytes| u64::from_le_bytes(bytes.try_into().unwrap()))
                .ok_or_else(|| corrupt("truncated"))?;
            let mtime_millis = take(&mut rest, 8)
                .map(|bytes| i64::from_le_bytes(bytes.try_into().unwrap()))
                .ok_or_else(|| corrupt("truncated"))?;
            entries.push(IndexEntry {
                path,
                hash,
                mode,
                size,
                mtime_millis,
            });
        }
        if !rest.is_empty() {
            return Err(corrupt("trailing bytes"));
        }
        if !entries.is_sorted_by(|a, b| a.path < b.path) {
            return Err(corrupt("entries out of order"));
        }
        Ok(Self { entries })
    }
}

fn take<'a>(input: &mut &'a [u8], n: usize) -> Option<&'a [u8]> {
    let (taken, rest) = input.split_at_checked(n)?;
    *input = rest;
    Some(taken)
}

fn take_u32(input: &mut &[u8]) -> Option<u32> {
    take(input, 4).map(|bytes| u32::from_le_bytes(bytes.try_into().unwrap()))
}

/// Mutation buffer over an [`Index`]. Writes go through a path-keyed map so
/// the last writer wins and removal is O(1); `build` materializes the fresh
/// sorted entry list.
#[derive(Debug, Default)]
pub struct IndexBuilder {
    entries: HashMap<RepoPathBuf, IndexEntry>,
}

impl IndexBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_index(index: Index) -> Self {
        let entries = index
            .entries
            .into_iter()
            .map(|entry| (entry.path.clone(), entry))
            .collect();
        Self { entries }
    }

    pub fn set(&mut self, entry: IndexEntry) {
        self.entries.insert(entry.path.clone(), entry);
    }

    pub fn remove(&mut self, path: &RepoPath) {
        self.entries.remove(path);
    }

    pub fn build(self) -> Index {
        let mut entries: Vec<_> = self.entries.into_values().collect();
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Index { entries }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;

    use super::*;

    fn entry(path: &str, contents: &[u8]) -> IndexEntry {
        IndexEntry {
            path: RepoPathBuf::from_internal_string(path).unwrap(),
            hash: hash_bytes(contents),
            mode: EntryMode::Regular,
            size: contents.len() as u64,
            mtime_millis: 1700000000000,
        }
    }

    #[test]
    fn test_save_load_round_trip() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("index");

        let mut builder = IndexBuilder::new();
        builder.set(entry("b/deep/file", b"2"));
        builder.set(entry("a.txt", b"1"));
        let index = builder.build();
        index.save(&path).unwrap();

        let loaded = Index::load(&path).unwrap();
        assert_eq!(loaded, index);
        assert_eq!(loaded.entries()[0].path.as_internal_str(), "a.txt");
    }

    #[test]
    fn test_missing_file_is_empty_index() {
        let temp_dir = tempfile::tempdir().unwrap();
        let index = Index::load(&temp_dir.path().join("index")).unwrap();
        assert!(index.is_empty());
    }

    #[test]
    fn test_builder_last_writer_wins() {
        let mut builder = IndexBuilder::new();
        builder.set(entry("file", b"old"));
        builder.set(entry("file", b"new"));
        builder.set(entry("gone", b"x"));
        builder.remove(RepoPath::from_internal_string("gone").unwrap());
        let index = builder.build();
        assert_eq!(index.len(), 1);
        assert_eq!(index.entries()[0].hash, hash_bytes(b"new"));
    }

    #[test]
    fn test_get_by_path() {
        let mut builder = IndexBuilder::new();
        builder.set(entry("dir/file", b"1"));
        let index = builder.build();
        let path = RepoPath::from_internal_string("dir/file").unwrap();
        assert!(index.get(path).is_some());
        assert!(index.get(RepoPath::from_internal_string("dir").unwrap()).is_none());
    }

    #[test]
    fn test_corrupt_file_is_rejected() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("index");

        let mut builder = IndexBuilder::new();
        builder.set(entry("a", b"1"));
        builder.build().save(&path).unwrap();

        let mut bytes = fs::read(&path).unwrap();
        bytes[8] ^= 0xff;
        fs::write(&path, &bytes).unwrap();
        assert_matches!(Index::load(&path), Err(IndexError::Corrupt { .. }));
    }
}
