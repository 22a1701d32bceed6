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

//! The local object database: loose objects, packs, and the shared-root
//! fallback pool.
//!
//! Objects are written to a temporary file under the object root and renamed
//! into place, so a partially written object is never visible under its
//! identifier. A configured shared root is a second on-disk pool consulted
//! read-only for objects missing locally; the promisor is the fallback of
//! last resort and fetches from the remote.

use std::fs;
use std::fs::File;
use std::io;
use std::io::Read;
use std::io::Write as _;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Mutex;

use tempfile::NamedTempFile;
use thiserror::Error;

use crate::file_util::persist_content_addressed_temp_file;
use crate::hash_id::HashID;
use crate::hash_id::Hasher;
use crate::hash_id::hash_bytes;
use crate::object::Blob;
use crate::object::CodecError;
use crate::object::Commit;
use crate::object::Encode;
use crate::object::Fragments;
use crate::object::Object;
use crate::object::ObjectKind;
use crate::object::Tag;
use crate::object::Tree;
use crate::object::decode_commit_body;
use crate::object::decode_fragments_body;
use crate::object::decode_tag_body;
use crate::object::decode_tree_body;
use crate::object::encode_header;
use crate::promisor::Promisor;

/// Maximum annotated-tag hops when resolving a revision to a commit.
const MAX_TAG_DEPTH: usize = 16;

#[derive(Debug, Error)]
pub enum OdbError {
    #[error("Object {0} not found")]
    NoSuchObject(HashID),
    #[error("Object {hash} is a {actual}, expected {expected}")]
    MismatchedObjectType {
        hash: HashID,
        expected: ObjectKind,
        actual: ObjectKind,
    },
    #[error("Object {hash} is corrupt")]
    Corrupt {
        hash: HashID,
        source: CodecError,
    },
    #[error("Object {hash} does not hash to its identifier")]
    HashMismatch { hash: HashID },
    #[error("Error when reading object {hash}")]
    ReadObject {
        hash: HashID,
        source: io::Error,
    },
    #[error("Could not write object")]
    WriteObject { source: io::Error },
    #[error("Fetch of object {hash} failed: {reason}")]
    Fetch { hash: HashID, reason: String },
}

pub type OdbResult<T> = Result<T, OdbError>;

/// An object opened for streaming: kind, body length, and a reader over the
/// body bytes. Used directly for blobs; other kinds get decoded in memory.
struct RawObject {
    kind: ObjectKind,
    size: u64,
    reader: Box<dyn Read + Send>,
}

/// In-memory index of one pack file.
struct PackIndex {
    pack_path: PathBuf,
    // sorted by hash
    entries: Vec<(HashID, u64, u64)>,
}

impl PackIndex {
    fn lookup(&self, hash: &HashID) -> Option<(u64, u64)> {
        let index = self
            .entries
            .binary_search_by(|(entry_hash, _, _)| entry_hash.cmp(hash))
            .ok()?;
        let (_, offset, len) = self.entries[index];
        Some((offset, len))
    }
}

#[derive(Debug)]
pub struct ObjectDatabase {
    root: PathBuf,
    shared_root: Option<PathBuf>,
    promisor: Option<Promisor>,
    empty_tree_id: HashID,
    // Lazily loaded pack indexes; invalidated by gc through reload_packs().
    packs: Mutex<Option<Vec<PackIndex>>>,
}

impl std::fmt::Debug for PackIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PackIndex")
            .field("pack_path", &self.pack_path)
            .field("entries", &self.entries.len())
            .finish()
    }
}

impl ObjectDatabase {
    /// Creates the on-disk layout and stores the well-known empty objects.
    pub fn init(root: &Path) -> OdbResult<Self> {
        let map_err = |source| OdbError::WriteObject { source };
        fs::create_dir_all(root).map_err(map_err)?;
        fs::create_dir_all(root.join("pack")).map_err(map_err)?;
        let odb = Self::load(root.to_path_buf(), None, None);
        let written = odb.write_object(&Tree::default())?;
        debug_assert_eq!(written, odb.empty_tree_id);
        odb.write_blob_bytes(b"")?;
        Ok(odb)
    }

    pub fn load(root: PathBuf, shared_root: Option<PathBuf>, promisor: Option<Promisor>) -> Self {
        Self {
            root,
            shared_root,
            promisor,
            empty_tree_id: Tree::default().hash(),
            packs: Mutex::new(None),
        }
    }

    /// The singleton empty tree, used as the synthetic "other side" of
    /// initial-commit diffs and unrelated-history merges.
    pub fn empty_tree_id(&self) -> &HashID {
        &self.empty_tree_id
    }

    pub fn empty_tree(&self) -> Tree {
        Tree::default()
    }

    fn loose_path(&self, root: &Path, hash: &HashID) -> PathBuf {
        let hex = hash.hex();
        root.join(&hex[..2]).join(&hex[2..])
    }

    /// Membership check. When `allow_shared` is true, the shared-root pool is
    /// consulted in addition to the local pool. The promisor is never asked.
    pub fn exists(&self, hash: &HashID, allow_shared: bool) -> bool {
        if self.loose_path(&self.root, hash).is_file() || self.pack_lookup(hash).is_some() {
            return true;
        }
        if allow_shared && let Some(shared) = &self.shared_root {
            return self.loose_path(shared, hash).is_file();
        }
        false
    }

    /// Kind-tagged lookup.
    pub fn object(&self, hash: &HashID) -> OdbResult<Object> {
        let raw = self.open_raw(hash)?;
        match raw.kind {
            ObjectKind::Blob => Ok(Object::Blob(Blob::new(raw.size, raw.reader))),
            kind => {
                let body = self.read_verified_body(hash, kind, raw)?;
                let object = match kind {
                    ObjectKind::Tree => Object::Tree(self.decode(hash, decode_tree_body(&body))?),
                    ObjectKind::Commit => {
                        Object::Commit(self.decode(hash, decode_commit_body(&body))?)
                    }
                    ObjectKind::Tag => Object::Tag(self.decode(hash, decode_tag_body(&body))?),
                    ObjectKind::Fragments => {
                        Object::Fragments(self.decode(hash, decode_fragments_body(&body))?)
                    }
                    ObjectKind::Blob => unreachable!(),
                };
                Ok(object)
            }
        }
    }

    pub fn blob(&self, hash: &HashID) -> OdbResult<Blob> {
        let raw = self.open_raw(hash)?;
        match raw.kind {
            ObjectKind::Blob => Ok(Blob::new(raw.size, raw.reader)),
            actual => Err(OdbError::MismatchedObjectType {
                hash: *hash,
                expected: ObjectKind::Blob,
                actual,
            }),
        }
    }

    pub fn tree(&self, hash: &HashID) -> OdbResult<Tree> {
        if *hash == self.empty_tree_id {
            return Ok(Tree::default());
        }
        match self.object(hash)? {
            Object::Tree(tree) => Ok(tree),
            other => Err(OdbError::MismatchedObjectType {
                hash: *hash,
                expected: ObjectKind::Tree,
                actual: other.kind(),
            }),
        }
    }

    pub fn commit(&self, hash: &HashID) -> OdbResult<Commit> {
        match self.object(hash)? {
            Object::Commit(commit) => Ok(commit),
            other => Err(OdbError::MismatchedObjectType {
                hash: *hash,
                expected: ObjectKind::Commit,
                actual: other.kind(),
            }),
        }
    }

    pub fn tag(&self, hash: &HashID) -> OdbResult<Tag> {
        match self.object(hash)? {
            Object::Tag(tag) => Ok(tag),
            other => Err(OdbError::MismatchedObjectType {
                hash: *hash,
                expected: ObjectKind::Tag,
                actual: other.kind(),
            }),
        }
    }

    pub fn fragments(&self, hash: &HashID) -> OdbResult<Fragments> {
        match self.object(hash)? {
            Object::Fragments(fragments) => Ok(fragments),
            other => Err(OdbError::MismatchedObjectType {
                hash: *hash,
                expected: ObjectKind::Fragments,
                actual: other.kind(),
            }),
        }
    }

    /// Resolves an identifier through any chain of annotated tags to a
    /// commit. Fails with a type mismatch if the chain does not terminate at
    /// a commit.
    pub fn parse_rev_exhaustive(&self, hash: &HashID) -> OdbResult<Commit> {
        let commit_id = self.peel_to_commit_id(hash)?;
        self.commit(&commit_id)
    }

    /// Follows any chain of annotated tags and returns the commit's own
    /// identifier (unlike [`Self::parse_rev_exhaustive`], which returns the
    /// commit value).
    pub fn peel_to_commit_id(&self, hash: &HashID) -> OdbResult<HashID> {
        let mut current = *hash;
        for _ in 0..MAX_TAG_DEPTH {
            match self.object(&current)? {
                Object::Commit(_) => return Ok(current),
                Object::Tag(tag) => current = tag.object,
                other => {
                    return Err(OdbError::MismatchedObjectType {
                        hash: current,
                        expected: ObjectKind::Commit,
                        actual: other.kind(),
                    });
                }
            }
        }
        Err(OdbError::Corrupt {
            hash: *hash,
            source: CodecError::Malformed {
                kind: ObjectKind::Tag,
                reason: "tag chain too deep",
            },
        })
    }

    /// Writes an encodable object, returning its identifier. Overwriting an
    /// object that already exists is a no-op.
    pub fn write_object(&self, object: &impl Encode) -> OdbResult<HashID> {
        let bytes = object.canonical_bytes();
        let hash = hash_bytes(&bytes);
        self.insert_canonical_unchecked(&hash, &bytes)?;
        Ok(hash)
    }

    pub fn write_blob_bytes(&self, contents: &[u8]) -> OdbResult<HashID> {
        self.write_blob_stream(contents.len() as u64, &mut io::Cursor::new(contents))
    }

    /// Streams a blob of a known size into the store, hashing while writing.
    pub fn write_blob_stream(&self, size: u64, reader: &mut dyn Read) -> OdbResult<HashID> {
        let map_err = |source| OdbError::WriteObject { source };
        let temp_file = NamedTempFile::new_in(&self.root).map_err(map_err)?;
        let mut file = temp_file.as_file();
        let mut hasher = Hasher::new();
        let header = encode_header(ObjectKind::Blob, size);
        file.write_all(&header).map_err(map_err)?;
        hasher.update(&header);

        let mut written: u64 = 0;
        let mut buf = vec![0; 1 << 14];
        loop {
            let read = reader.read(&mut buf).map_err(map_err)?;
            if read == 0 {
                break;
            }
            let bytes = &buf[..read];
            file.write_all(bytes).map_err(map_err)?;
            hasher.update(bytes);
            written += read as u64;
        }
        if written != size {
            return Err(map_err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("blob stream length {written} does not match declared size {size}"),
            )));
        }
        file.flush().map_err(map_err)?;
        let hash = hasher.finalize();
        let target = self.loose_path(&self.root, &hash);
        fs::create_dir_all(target.parent().unwrap()).map_err(map_err)?;
        persist_content_addressed_temp_file(temp_file, target).map_err(map_err)?;
        Ok(hash)
    }

    /// Installs complete canonical bytes under `expected`, verifying the
    /// identifier first. This is the promisor's insertion path.
    pub fn insert_canonical(&self, expected: &HashID, bytes: &[u8]) -> OdbResult<()> {
        if hash_bytes(bytes) != *expected {
            return Err(OdbError::HashMismatch { hash: *expected });
        }
        self.insert_canonical_unchecked(expected, bytes)
    }

    fn insert_canonical_unchecked(&self, hash: &HashID, bytes: &[u8]) -> OdbResult<()> {
        let target = self.loose_path(&self.root, hash);
        if target.is_file() {
            return Ok(());
        }
        let map_err = |source| OdbError::WriteObject { source };
        fs::create_dir_all(target.parent().unwrap()).map_err(map_err)?;
        let mut temp_file = NamedTempFile::new_in(&self.root).map_err(map_err)?;
        temp_file.write_all(bytes).map_err(map_err)?;
        persist_content_addressed_temp_file(temp_file, target).map_err(map_err)?;
        Ok(())
    }

    /// Forgets cached pack indexes; the next lookup rescans the pack dir.
    pub fn reload_packs(&self) {
        *self.packs.lock().unwrap() = None;
    }

    pub fn objects_root(&self) -> &Path {
        &self.root
    }

    fn open_raw(&self, hash: &HashID) -> OdbResult<RawObject> {
        match self.open_raw_no_fetch(hash)? {
            Some(raw) => Ok(raw),
            None => {
                let Some(promisor) = &self.promisor else {
                    return Err(OdbError::NoSuchObject(*hash));
                };
                // One fetch and one recheck per distinct call; a second miss
                // means the remote doesn't have it either.
                promisor
                    .fetch(hash, None, &|bytes| {
                        self.insert_canonical(hash, bytes).map_err(|err| err.to_string())
                    })
                    .map_err(|err| OdbError::Fetch {
                        hash: *hash,
                        reason: err.reason,
                    })?;
                self.open_raw_no_fetch(hash)?
                    .ok_or(OdbError::NoSuchObject(*hash))
            }
        }
    }

    fn open_raw_no_fetch(&self, hash: &HashID) -> OdbResult<Option<RawObject>> {
        let local = self.loose_path(&self.root, hash);
        match File::open(&local) {
            Ok(file) => return self.stream_loose(hash, file).map(Some),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => {
                return Err(OdbError::ReadObject {
                    hash: *hash,
                    source: err,
                });
            }
        }
        if let Some((kind, body)) = self.pack_read(hash)? {
            return Ok(Some(RawObject {
                kind,
                size: body.len() as u64,
                reader: Box::new(io::Cursor::new(body)),
            }));
        }
        if let Some(shared) = &self.shared_root {
            match File::open(self.loose_path(shared, hash)) {
                Ok(file) => return self.stream_loose(hash, file).map(Some),
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => {
                    return Err(OdbError::ReadObject {
                        hash: *hash,
                        source: err,
                    });
                }
            }
        }
        Ok(None)
    }

    fn stream_loose(&self, hash: &HashID, mut file: File) -> OdbResult<RawObject> {
        // The header is tiny; read a fixed chunk and split at the NUL.
        let mut head = [0u8; 64];
        let mut filled = 0;
        while filled < head.len() {
            let read = file
                .read(&mut head[filled..])
                .map_err(|source| OdbError::ReadObject {
                    hash: *hash,
                    source,
                })?;
            if read == 0 {
                break;
            }
            filled += read;
        }
        let head = &head[..filled];
        let nul = head.iter().position(|&b| b == 0).ok_or(OdbError::Corrupt {
            hash: *hash,
            source: CodecError::TruncatedHeader,
        })?;
        let header = std::str::from_utf8(&head[..nul]).map_err(|_| OdbError::Corrupt {
            hash: *hash,
            source: CodecError::TruncatedHeader,
        })?;
        let (kind, size) = header
            .split_once(' ')
            .and_then(|(kind, len)| {
                Some((ObjectKind::from_name(kind)?, len.parse::<u64>().ok()?))
            })
            .ok_or(OdbError::Corrupt {
                hash: *hash,
                source: CodecError::TruncatedHeader,
            })?;
        let leftover = head[nul + 1..].to_vec();
        Ok(RawObject {
            kind,
            size,
            reader: Box::new(io::Cursor::new(leftover).chain(file)),
        })
    }

    /// Reads the body and checks that header + body hash to the identifier.
    /// Corrupted bytes are fatal; there is no retry.
    fn read_verified_body(
        &self,
        hash: &HashID,
        kind: ObjectKind,
        mut raw: RawObject,
    ) -> OdbResult<Vec<u8>> {
        let mut body = Vec::with_capacity(raw.size.min(1 << 24) as usize);
        raw.reader
            .read_to_end(&mut body)
            .map_err(|source| OdbError::ReadObject {
                hash: *hash,
                source,
            })?;
        if body.len() as u64 != raw.size {
            return Err(OdbError::Corrupt {
                hash: *hash,
                source: CodecError::LengthMismatch {
                    expected: raw.size,
                    actual: body.len() as u64,
                },
            });
        }
        let mut hasher = Hasher::new();
        hasher.update(encode_header(kind, raw.size));
        hasher.update(&body);
        if hasher.finalize() != *hash {
            return Err(OdbError::HashMismatch { hash: *hash });
        }
        Ok(body)
    }

    fn decode<T>(&self, hash: &HashID, result: Result<T, CodecError>) -> OdbResult<T> {
        result.map_err(|source| OdbError::Corrupt {
            hash: *hash,
            source,
        })
    }

    fn pack_lookup(&self, hash: &HashID) -> Option<(PathBuf, u64, u64)> {
        let mut packs = self.packs.lock().unwrap();
        let packs = packs.get_or_insert_with(|| load_pack_indexes(&self.root.join("pack")));
        for pack in packs.iter() {
            if let Some((offset, len)) = pack.lookup(hash) {
                return Some((pack.pack_path.clone(), offset, len));
            }
        }
        None
    }

    fn pack_read(&self, hash: &HashID) -> OdbResult<Option<(ObjectKind, Vec<u8>)>> {
        let Some((pack_path, offset, len)) = self.pack_lookup(hash) else {
            return Ok(None);
        };
        let map_err = |source| OdbError::ReadObject {
            hash: *hash,
            source,
        };
        let mut file = File::open(&pack_path).map_err(map_err)?;
        use std::io::Seek as _;
        file.seek(io::SeekFrom::Start(offset)).map_err(map_err)?;
        let mut bytes = vec![0; len as usize];
        file.read_exact(&mut bytes).map_err(map_err)?;
        let (kind, body) = crate::object::decode_header(&bytes).map_err(|source| {
            OdbError::Corrupt {
                hash: *hash,
                source,
            }
        })?;
        Ok(Some((kind, body.to_vec())))
    }
}

/// Scans `pack_dir` for `*.zidx` files and loads their entry tables.
fn load_pack_indexes(pack_dir: &Path) -> Vec<PackIndex> {
    let Ok(dir) = pack_dir.read_dir() else {
        return vec![];
    };
    let mut packs = vec![];
    for entry in dir.flatten() {
        let path = entry.path();
        if path.extension().is_none_or(|ext| ext != "zidx") {
            continue;
        }
        match load_pack_index(&path) {
            Ok(pack) => packs.push(pack),
            Err(err) => {
                tracing::warn!(?path, ?err, "skipping unreadable pack index");
            }
        }
    }
    packs
}

fn load_pack_index(idx_path: &Path) -> io::Result<PackIndex> {
    let bytes = fs::read(idx_path)?;
    let bad = || io::Error::new(io::ErrorKind::InvalidData, "malformed pack index");
    let rest = bytes.strip_prefix(b"ZPIX").ok_or_else(bad)?;
    let (count, mut rest) = rest.split_at_checked(4).ok_or_else(bad)?;
    let count = u32::from_le_bytes(count.try_into().unwrap()) as usize;
    let mut entries = Vec::with_capacity(count);
    for _ in 0..count {
        let (record, tail) = rest
            .split_at_checked(HashID::LEN + 16)
            .ok_or_else(bad)?;
        rest = tail;
        let hash = HashID::from_bytes(&record[..HashID::LEN]).unwrap();
        let offset = u64::from_le_bytes(record[HashID::LEN..HashID::LEN + 8].try_into().unwrap());
        let len = u64::from_le_bytes(record[HashID::LEN + 8..].try_into().unwrap());
        entries.push((hash, offset, len));
    }
    if !rest.is_empty() || !entries.is_sorted_by(|a, b| a.0 < b.0) {
        return Err(bad());
    }
    Ok(PackIndex {
        pack_path: idx_path.with_extension("zpak"),
        entries,
    })
}
