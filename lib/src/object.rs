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

//! Object model and canonical codec.
//!
//! Every stored object is addressed by the hash of its canonical encoding
//! (`"<kind> <body-len>\0"` followed by the body). Encoding is deterministic,
//! and objects are hashed while being encoded so stored bytes and identifiers
//! can never disagree.

use std::fmt;
use std::fmt::Debug;
use std::io;
use std::io::Cursor;
use std::io::Read;

use thiserror::Error;

use crate::hash_id::HashID;
use crate::hash_id::Hasher;
use crate::repo_path::RepoPathComponent;
use crate::repo_path::RepoPathComponentBuf;

/// Discriminant of a stored object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    Blob,
    Tree,
    Commit,
    Tag,
    Fragments,
}

impl ObjectKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::Blob => "blob",
            Self::Tree => "tree",
            Self::Commit => "commit",
            Self::Tag => "tag",
            Self::Fragments => "fragments",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "blob" => Some(Self::Blob),
            "tree" => Some(Self::Tree),
            "commit" => Some(Self::Commit),
            "tag" => Some(Self::Tag),
            "fragments" => Some(Self::Fragments),
            _ => None,
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Error)]
#[error("Timestamp out of range")]
pub struct TimestampOutOfRange;

/// A point in time as recorded in signatures: milliseconds since the Unix
/// epoch, plus the recording side's UTC offset in minutes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Timestamp {
    pub millis: i64,
    pub tz_offset_minutes: i32,
}

impl Timestamp {
    pub fn now() -> Self {
        Self::from_datetime(chrono::Local::now())
    }

    pub fn from_datetime<Tz: chrono::TimeZone<Offset = chrono::offset::FixedOffset>>(
        datetime: chrono::DateTime<Tz>,
    ) -> Self {
        Self {
            millis: datetime.timestamp_millis(),
            tz_offset_minutes: datetime.offset().local_minus_utc() / 60,
        }
    }

    /// Converts back to a zoned datetime. Fails if the millis value is
    /// outside chrono's representable range or the recorded offset is not a
    /// valid UTC offset; decoded data can contain either.
    pub fn to_datetime(
        &self,
    ) -> Result<chrono::DateTime<chrono::FixedOffset>, TimestampOutOfRange> {
        let utc = chrono::DateTime::from_timestamp_millis(self.millis)
            .ok_or(TimestampOutOfRange)?;
        let offset = chrono::FixedOffset::east_opt(self.tz_offset_minutes * 60)
            .ok_or(TimestampOutOfRange)?;
        Ok(utc.with_timezone(&offset))
    }
}

impl serde::Serialize for Timestamp {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self.to_datetime() {
            Ok(datetime) => datetime.serialize(serializer),
            Err(err) => Err(serde::ser::Error::custom(err)),
        }
    }
}

/// Represents a [`Commit`] or [`Tag`] signature.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct Signature {
    pub name: String,
    pub email: String,
    pub timestamp: Timestamp,
}

/// File mode of a [`TreeEntry`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryMode {
    Regular,
    Executable,
    Symlink,
    Dir,
    /// A large file stored as a [`Fragments`] manifest instead of one blob.
    Fragments,
}

impl EntryMode {
    pub fn as_octal(self) -> &'static str {
        match self {
            Self::Regular => "100644",
            Self::Executable => "100755",
            Self::Symlink => "120000",
            Self::Dir => "40000",
            Self::Fragments => "160000",
        }
    }

    pub fn from_octal(octal: &str) -> Option<Self> {
        match octal {
            "100644" => Some(Self::Regular),
            "100755" => Some(Self::Executable),
            "120000" => Some(Self::Symlink),
            "40000" => Some(Self::Dir),
            "160000" => Some(Self::Fragments),
            _ => None,
        }
    }

    pub fn is_dir(self) -> bool {
        self == Self::Dir
    }

    /// Whether the entry materializes as a plain file whose executable bit is
    /// meaningful.
    pub fn is_regular_file(self) -> bool {
        matches!(self, Self::Regular | Self::Executable)
    }
}

/// A single entry of a [`Tree`].
///
/// `payload` optionally inlines small contents (short symlink targets, tiny
/// files), avoiding a second object lookup on checkout.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct TreeEntry {
    pub name: RepoPathComponentBuf,
    pub mode: EntryMode,
    pub hash: HashID,
    pub size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Vec<u8>>,
}

/// A [`TreeEntry`] without its name: the value stored at some path.
///
/// Diff, merge, and the tree builder all shuffle these between path-keyed
/// containers before the names are reattached on encode.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct EntryValue {
    pub mode: EntryMode,
    pub hash: HashID,
    pub size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Vec<u8>>,
}

impl TreeEntry {
    pub fn value(&self) -> EntryValue {
        EntryValue {
            mode: self.mode,
            hash: self.hash,
            size: self.size,
            payload: self.payload.clone(),
        }
    }

    pub fn from_value(name: RepoPathComponentBuf, value: EntryValue) -> Self {
        Self {
            name,
            mode: value.mode,
            hash: value.hash,
            size: value.size,
            payload: value.payload,
        }
    }
}

/// An ordered sequence of named entries.
///
/// Entries are kept in canonical order (by name, bytes ascending); the diff
/// and merge walks rely on it. Insertion order from callers is irrelevant.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct Tree {
    entries: Vec<TreeEntry>,
}

impl Tree {
    pub fn from_sorted_entries(entries: Vec<TreeEntry>) -> Self {
        debug_assert!(entries.is_sorted_by(|a, b| a.name < b.name));
        Self { entries }
    }

    pub fn from_entries(mut entries: Vec<TreeEntry>) -> Self {
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Self { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[TreeEntry] {
        &self.entries
    }

    pub fn entry(&self, name: &RepoPathComponent) -> Option<&TreeEntry> {
        let index = self
            .entries
            .binary_search_by(|entry| {
                entry.name.as_internal_str().cmp(name.as_internal_str())
            })
            .ok()?;
        Some(&self.entries[index])
    }
}

/// A commit. Parent order is significant; the first parent is the mainline.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct Commit {
    pub tree: HashID,
    pub parents: Vec<HashID>,
    pub author: Signature,
    pub committer: Signature,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub extra_headers: Vec<(String, String)>,
    pub message: String,
}

impl Commit {
    /// First line of the message.
    pub fn subject(&self) -> &str {
        self.message.lines().next().unwrap_or("")
    }
}

/// An annotated tag pointing at a commit or another tag.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct Tag {
    pub object: HashID,
    pub object_kind: ObjectKind,
    pub name: String,
    pub tagger: Signature,
    pub content: String,
}

/// One piece of a [`Fragments`] manifest.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct FragmentEntry {
    pub index: u32,
    pub hash: HashID,
    pub size: u64,
}

/// Declarative description of a large file split into independent
/// content-addressed pieces.
///
/// The logical content is the ordered concatenation of the referenced blobs.
/// A fragments object is never itself split into fragments.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct Fragments {
    /// Hash of the complete logical content.
    pub origin: HashID,
    /// Total logical size in bytes.
    pub size: u64,
    pub entries: Vec<FragmentEntry>,
}

/// A blob's streamable content. The reader is a linear resource; callers are
/// responsible for draining or dropping it.
pub struct Blob {
    size: u64,
    reader: Box<dyn Read + Send>,
}

impl Blob {
    pub fn new(size: u64, reader: Box<dyn Read + Send>) -> Self {
        Self { size, reader }
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self {
            size: bytes.len() as u64,
            reader: Box::new(Cursor::new(bytes)),
        }
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn reader(&mut self) -> &mut (dyn Read + Send) {
        &mut self.reader
    }

    pub fn into_reader(self) -> Box<dyn Read + Send> {
        self.reader
    }

    pub fn read_to_bytes(mut self) -> io::Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(self.size.min(1 << 20) as usize);
        self.reader.read_to_end(&mut buf)?;
        Ok(buf)
    }
}

impl Debug for Blob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Blob").field("size", &self.size).finish()
    }
}

/// A decoded object, tagged by kind.
#[derive(Debug)]
pub enum Object {
    Blob(Blob),
    Tree(Tree),
    Commit(Commit),
    Tag(Tag),
    Fragments(Fragments),
}

impl Object {
    pub fn kind(&self) -> ObjectKind {
        match self {
            Self::Blob(_) => ObjectKind::Blob,
            Self::Tree(_) => ObjectKind::Tree,
            Self::Commit(_) => ObjectKind::Commit,
            Self::Tag(_) => ObjectKind::Tag,
            Self::Fragments(_) => ObjectKind::Fragments,
        }
    }
}

/// Decoding failed; the bytes are not a valid canonical encoding.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("truncated object header")]
    TruncatedHeader,
    #[error("unknown object kind {kind:?}")]
    UnknownKind { kind: String },
    #[error("object body length mismatch (header says {expected}, got {actual})")]
    LengthMismatch { expected: u64, actual: u64 },
    #[error("malformed {kind} object: {reason}")]
    Malformed {
        kind: ObjectKind,
        reason: &'static str,
    },
}

/// Capability: the value has a canonical encoding and therefore a [`HashID`].
///
/// Blobs are not `Encode`; their content streams through the store instead of
/// being buffered, and only their header is synthesized here.
pub trait Encode {
    fn kind(&self) -> ObjectKind;

    /// Appends the canonical body to `out`.
    fn encode_body(&self, out: &mut Vec<u8>);

    /// The complete canonical encoding, header included.
    fn canonical_bytes(&self) -> Vec<u8> {
        let mut body = Vec::new();
        self.encode_body(&mut body);
        let mut out = encode_header(self.kind(), body.len() as u64);
        out.extend_from_slice(&body);
        out
    }

    /// Hash of the canonical encoding.
    fn hash(&self) -> HashID {
        let mut body = Vec::new();
        self.encode_body(&mut body);
        let mut hasher = Hasher::new();
        hasher.update(encode_header(self.kind(), body.len() as u64));
        hasher.update(&body);
        hasher.finalize()
    }

    /// Length of the canonical body in bytes.
    fn body_len(&self) -> u64 {
        let mut body = Vec::new();
        self.encode_body(&mut body);
        body.len() as u64
    }
}

pub fn encode_header(kind: ObjectKind, body_len: u64) -> Vec<u8> {
    format!("{} {}\0", kind.name(), body_len).into_bytes()
}

impl Encode for Tree {
    fn kind(&self) -> ObjectKind {
        ObjectKind::Tree
    }

    fn encode_body(&self, out: &mut Vec<u8>) {
        for entry in &self.entries {
            out.extend_from_slice(entry.mode.as_octal().as_bytes());
            out.push(b' ');
            out.extend_from_slice(entry.name.as_internal_str().as_bytes());
            out.push(0);
            out.extend_from_slice(entry.hash.as_bytes());
            write_varint(out, entry.size);
            match &entry.payload {
                Some(payload) => {
                    debug_assert!(!payload.is_empty());
                    write_varint(out, payload.len() as u64);
                    out.extend_from_slice(payload);
                }
                None => write_varint(out, 0),
            }
        }
    }
}

impl Encode for Commit {
    fn kind(&self) -> ObjectKind {
        ObjectKind::Commit
    }

    fn encode_body(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(format!("tree {}\n", self.tree.hex()).as_bytes());
        for parent in &self.parents {
            out.extend_from_slice(format!("parent {}\n", parent.hex()).as_bytes());
        }
        out.extend_from_slice(format!("author {}\n", encode_signature(&self.author)).as_bytes());
        out.extend_from_slice(
            format!("committer {}\n", encode_signature(&self.committer)).as_bytes(),
        );
        for (key, value) in &self.extra_headers {
            out.extend_from_slice(format!("{key} {value}\n").as_bytes());
        }
        out.push(b'\n');
        out.extend_from_slice(self.message.as_bytes());
    }
}

impl Encode for Tag {
    fn kind(&self) -> ObjectKind {
        ObjectKind::Tag
    }

    fn encode_body(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(format!("object {}\n", self.object.hex()).as_bytes());
        out.extend_from_slice(format!("kind {}\n", self.object_kind.name()).as_bytes());
        out.extend_from_slice(format!("tag {}\n", self.name).as_bytes());
        out.extend_from_slice(format!("tagger {}\n", encode_signature(&self.tagger)).as_bytes());
        out.push(b'\n');
        out.extend_from_slice(self.content.as_bytes());
    }
}

impl Encode for Fragments {
    fn kind(&self) -> ObjectKind {
        ObjectKind::Fragments
    }

    fn encode_body(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(format!("origin {}\n", self.origin.hex()).as_bytes());
        out.extend_from_slice(format!("size {}\n", self.size).as_bytes());
        for entry in &self.entries {
            out.extend_from_slice(
                format!("{} {} {}\n", entry.index, entry.hash.hex(), entry.size).as_bytes(),
            );
        }
    }
}

fn encode_signature(sig: &Signature) -> String {
    format!(
        "{} <{}> {} {}",
        sig.name, sig.email, sig.timestamp.millis, sig.timestamp.tz_offset_minutes
    )
}

fn decode_signature(kind: ObjectKind, value: &str) -> Result<Signature, CodecError> {
    let malformed = |reason| CodecError::Malformed { kind, reason };
    let (rest, tz) = value
        .rsplit_once(' ')
        .ok_or_else(|| malformed("bad signature"))?;
    let (rest, millis) = rest
        .rsplit_once(' ')
        .ok_or_else(|| malformed("bad signature"))?;
    let tz_offset_minutes = tz
        .parse::<i32>()
        .map_err(|_| malformed("bad signature timezone"))?;
    let millis = millis
        .parse::<i64>()
        .map_err(|_| malformed("bad signature timestamp"))?;
    let rest = rest
        .strip_suffix('>')
        .ok_or_else(|| malformed("bad signature email"))?;
    let (name, email) = rest
        .rsplit_once(" <")
        .ok_or_else(|| malformed("bad signature email"))?;
    Ok(Signature {
        name: name.to_owned(),
        email: email.to_owned(),
        timestamp: Timestamp {
            millis,
            tz_offset_minutes,
        },
    })
}

/// Splits a canonical encoding into `(kind, body)`, verifying the declared
/// body length.
pub fn decode_header(bytes: &[u8]) -> Result<(ObjectKind, &[u8]), CodecError> {
    let nul = bytes
        .iter()
        .position(|&b| b == 0)
        .ok_or(CodecError::TruncatedHeader)?;
    let header = std::str::from_utf8(&bytes[..nul]).map_err(|_| CodecError::TruncatedHeader)?;
    let (kind, len) = header.split_once(' ').ok_or(CodecError::TruncatedHeader)?;
    let kind = ObjectKind::from_name(kind).ok_or_else(|| CodecError::UnknownKind {
        kind: kind.to_owned(),
    })?;
    let expected: u64 = len.parse().map_err(|_| CodecError::TruncatedHeader)?;
    let body = &bytes[nul + 1..];
    if body.len() as u64 != expected {
        return Err(CodecError::LengthMismatch {
            expected,
            actual: body.len() as u64,
        });
    }
    Ok((kind, body))
}

/// Decodes a complete canonical encoding into an in-memory [`Object`].
pub fn decode_object(bytes: &[u8]) -> Result<Object, CodecError> {
    let (kind, body) = decode_header(bytes)?;
    match kind {
        ObjectKind::Blob => Ok(Object::Blob(Blob::from_bytes(body.to_vec()))),
        ObjectKind::Tree => Ok(Object::Tree(decode_tree_body(body)?)),
        ObjectKind::Commit => Ok(Object::Commit(decode_commit_body(body)?)),
        ObjectKind::Tag => Ok(Object::Tag(decode_tag_body(body)?)),
        ObjectKind::Fragments => Ok(Object::Fragments(decode_fragments_body(body)?)),
    }
}

pub fn decode_tree_body(mut body: &[u8]) -> Result<Tree, CodecError> {
    const KIND: ObjectKind = ObjectKind::Tree;
    let malformed = |reason| CodecError::Malformed { kind: KIND, reason };
    let mut entries = Vec::new();
    while !body.is_empty() {
        let space = body
            .iter()
            .position(|&b| b == b' ')
            .ok_or_else(|| malformed("missing mode"))?;
        let mode = std::str::from_utf8(&body[..space])
            .ok()
            .and_then(EntryMode::from_octal)
            .ok_or_else(|| malformed("bad mode"))?;
        body = &body[space + 1..];
        let nul = body
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| malformed("missing name terminator"))?;
        let name = std::str::from_utf8(&body[..nul]).map_err(|_| malformed("non-utf8 name"))?;
        let name = RepoPathComponentBuf::new(name).map_err(|_| malformed("bad entry name"))?;
        body = &body[nul + 1..];
        if body.len() < HashID::LEN {
            return Err(malformed("truncated hash"));
        }
        let hash = HashID::from_bytes(&body[..HashID::LEN]).unwrap();
        body = &body[HashID::LEN..];
        let size = read_varint(&mut body).ok_or_else(|| malformed("truncated size"))?;
        let payload_len = read_varint(&mut body).ok_or_else(|| malformed("truncated payload"))?;
        let payload = if payload_len == 0 {
            None
        } else {
            if (body.len() as u64) < payload_len {
                return Err(malformed("truncated payload"));
            }
            let (payload, rest) = body.split_at(payload_len as usize);
            body = rest;
            Some(payload.to_vec())
        };
        entries.push(TreeEntry {
            name,
            mode,
            hash,
            size,
            payload,
        });
    }
    if !entries.is_sorted_by(|a, b| a.name < b.name) {
        return Err(malformed("entries out of canonical order"));
    }
    Ok(Tree::from_sorted_entries(entries))
}

pub fn decode_commit_body(body: &[u8]) -> Result<Commit, CodecError> {
    const KIND: ObjectKind = ObjectKind::Commit;
    let malformed = |reason| CodecError::Malformed { kind: KIND, reason };
    let body = std::str::from_utf8(body).map_err(|_| malformed("non-utf8 body"))?;
    let (headers, message) = body
        .split_once("\n\n")
        .ok_or_else(|| malformed("missing message separator"))?;

    let mut tree = None;
    let mut parents = Vec::new();
    let mut author = None;
    let mut committer = None;
    let mut extra_headers = Vec::new();
    for line in headers.lines() {
        let (key, value) = line.split_once(' ').ok_or_else(|| malformed("bad header"))?;
        match key {
            "tree" => {
                tree = Some(
                    HashID::try_from_hex(value).map_err(|_| malformed("bad tree hash"))?,
                );
            }
            "parent" => {
                parents
                    .push(HashID::try_from_hex(value).map_err(|_| malformed("bad parent hash"))?);
            }
            "author" => author = Some(decode_signature(KIND, value)?),
            "committer" => committer = Some(decode_signature(KIND, value)?),
            _ => extra_headers.push((key.to_owned(), value.to_owned())),
        }
    }
    Ok(Commit {
        tree: tree.ok_or_else(|| malformed("missing tree header"))?,
        parents,
        author: author.ok_or_else(|| malformed("missing author"))?,
        committer: committer.ok_or_else(|| malformed("missing committer"))?,
        extra_headers,
        message: message.to_owned(),
    })
}

pub fn decode_tag_body(body: &[u8]) -> Result<Tag, CodecError> {
    const KIND: ObjectKind = ObjectKind::Tag;
    let malformed = |reason| CodecError::Malformed { kind: KIND, reason };
    let body = std::str::from_utf8(body).map_err(|_| malformed("non-utf8 body"))?;
    let (headers, content) = body
        .split_once("\n\n")
        .ok_or_else(|| malformed("missing content separator"))?;

    let mut object = None;
    let mut object_kind = None;
    let mut name = None;
    let mut tagger = None;
    for line in headers.lines() {
        let (key, value) = line.split_once(' ').ok_or_else(|| malformed("bad header"))?;
        match key {
            "object" => {
                object =
                    Some(HashID::try_from_hex(value).map_err(|_| malformed("bad object hash"))?);
            }
            "kind" => {
                let kind = ObjectKind::from_name(value)
                    .filter(|kind| matches!(kind, ObjectKind::Commit | ObjectKind::Tag))
                    .ok_or_else(|| malformed("tag must point to a commit or tag"))?;
                object_kind = Some(kind);
            }
            "tag" => name = Some(value.to_owned()),
            "tagger" => tagger = Some(decode_signature(KIND, value)?),
            _ => return Err(malformed("unknown header")),
        }
    }
    Ok(Tag {
        object: object.ok_or_else(|| malformed("missing object header"))?,
        object_kind: object_kind.ok_or_else(|| malformed("missing kind header"))?,
        name: name.ok_or_else(|| malformed("missing tag name"))?,
        tagger: tagger.ok_or_else(|| malformed("missing tagger"))?,
        content: content.to_owned(),
    })
}

pub fn decode_fragments_body(body: &[u8]) -> Result<Fragments, CodecError> {
    const KIND: ObjectKind = ObjectKind::Fragments;
    let malformed = |reason| CodecError::Malformed { kind: KIND, reason };
    let body = std::str::from_utf8(body).map_err(|_| malformed("non-utf8 body"))?;
    let mut lines = body.lines();

    let origin = lines
        .next()
        .and_then(|line| line.strip_prefix("origin "))
        .and_then(|hex| HashID::try_from_hex(hex).ok())
        .ok_or_else(|| malformed("missing origin"))?;
    let size = lines
        .next()
        .and_then(|line| line.strip_prefix("size "))
        .and_then(|n| n.parse::<u64>().ok())
        .ok_or_else(|| malformed("missing size"))?;

    let mut entries = Vec::new();
    for line in lines {
        let mut fields = line.split(' ');
        let entry = (|| {
            let index = fields.next()?.parse::<u32>().ok()?;
            let hash = HashID::try_from_hex(fields.next()?).ok()?;
            let size = fields.next()?.parse::<u64>().ok()?;
            fields.next().is_none().then_some(FragmentEntry {
                index,
                hash,
                size,
            })
        })()
        .ok_or_else(|| malformed("bad fragment entry"))?;
        entries.push(entry);
    }
    Ok(Fragments {
        origin,
        size,
        entries,
    })
}

fn write_varint(out: &mut Vec<u8>, mut value: u64) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

fn read_varint(input: &mut &[u8]) -> Option<u64> {
    let mut value: u64 = 0;
    let mut shift = 0;
    loop {
        let (&byte, rest) = input.split_first()?;
        *input = rest;
        value |= u64::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            return Some(value);
        }
        shift += 7;
        if shift >= 64 {
            return None;
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::hash_id::hash_bytes;

    fn signature(name: &str) -> Signature {
        Signature {
            name: name.to_owned(),
            email: format!("{}@example.com", name.to_ascii_lowercase()),
            timestamp: Timestamp {
                millis: 1700000000000,
                tz_offset_minutes: -480,
            },
        }
    }

    fn component(name: &str) -> RepoPathComponentBuf {
        RepoPathComponentBuf::new(name).unwrap()
    }

    #[test]
    fn test_varint_round_trip() {
        for value in [0, 1, 127, 128, 300, u64::from(u32::MAX), u64::MAX] {
            let mut out = Vec::new();
            write_varint(&mut out, value);
            let mut input = &out[..];
            assert_eq!(read_varint(&mut input), Some(value));
            assert!(input.is_empty());
        }
    }

    #[test]
    fn test_tree_round_trip() {
        let tree = Tree::from_entries(vec![
            TreeEntry {
                name: component("zz.bin"),
                mode: EntryMode::Fragments,
                hash: hash_bytes(b"zz"),
                size: 1 << 33,
                payload: None,
            },
            TreeEntry {
                name: component("README.md"),
                mode: EntryMode::Regular,
                hash: hash_bytes(b"readme"),
                size: 6,
                payload: Some(b"hello\n".to_vec()),
            },
            TreeEntry {
                name: component("link"),
                mode: EntryMode::Symlink,
                hash: hash_bytes(b"target"),
                size: 6,
                payload: Some(b"target".to_vec()),
            },
        ]);
        // from_entries sorts into canonical order
        assert_eq!(tree.entries()[0].name.as_internal_str(), "README.md");
        let bytes = tree.canonical_bytes();
        let decoded = match decode_object(&bytes).unwrap() {
            Object::Tree(tree) => tree,
            other => panic!("unexpected object: {other:?}"),
        };
        assert_eq!(decoded, tree);
        assert_eq!(hash_bytes(&bytes), tree.hash());
    }

    #[test]
    fn test_commit_round_trip() {
        let commit = Commit {
            tree: hash_bytes(b"tree"),
            parents: vec![hash_bytes(b"p1"), hash_bytes(b"p2")],
            author: signature("Arthur Two Sheds Jackson"),
            committer: signature("Eric"),
            extra_headers: vec![("encoding".to_owned(), "utf-8".to_owned())],
            message: "subject line\n\nbody text\n".to_owned(),
        };
        let bytes = commit.canonical_bytes();
        let decoded = match decode_object(&bytes).unwrap() {
            Object::Commit(commit) => commit,
            other => panic!("unexpected object: {other:?}"),
        };
        assert_eq!(decoded, commit);
        assert_eq!(decoded.subject(), "subject line");
        assert_eq!(hash_bytes(&bytes), commit.hash());
    }

    #[test]
    fn test_tag_round_trip() {
        let tag = Tag {
            object: hash_bytes(b"commit"),
            object_kind: ObjectKind::Commit,
            name: "v1.0.0".to_owned(),
            tagger: signature("Releaser"),
            content: "release notes\n".to_owned(),
        };
        let bytes = tag.canonical_bytes();
        let decoded = match decode_object(&bytes).unwrap() {
            Object::Tag(tag) => tag,
            other => panic!("unexpected object: {other:?}"),
        };
        assert_eq!(decoded, tag);
    }

    #[test]
    fn test_fragments_round_trip() {
        let fragments = Fragments {
            origin: hash_bytes(b"whole file"),
            size: 3 << 30,
            entries: (0..4)
                .map(|index| FragmentEntry {
                    index,
                    hash: hash_bytes(&index.to_le_bytes()),
                    size: 3 << 28,
                })
                .collect(),
        };
        let bytes = fragments.canonical_bytes();
        let decoded = match decode_object(&bytes).unwrap() {
            Object::Fragments(fragments) => fragments,
            other => panic!("unexpected object: {other:?}"),
        };
        assert_eq!(decoded, fragments);
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let make = || {
            Tree::from_entries(vec![
                TreeEntry {
                    name: component("b"),
                    mode: EntryMode::Regular,
                    hash: hash_bytes(b"b"),
                    size: 1,
                    payload: None,
                },
                TreeEntry {
                    name: component("a"),
                    mode: EntryMode::Executable,
                    hash: hash_bytes(b"a"),
                    size: 1,
                    payload: None,
                },
            ])
        };
        assert_eq!(make().canonical_bytes(), make().canonical_bytes());
        assert_eq!(make().hash(), make().hash());
    }

    #[test]
    fn test_decode_rejects_corrupt_input() {
        assert_matches!(
            decode_object(b"no header here"),
            Err(CodecError::TruncatedHeader)
        );
        assert_matches!(
            decode_object(b"widget 3\0abc"),
            Err(CodecError::UnknownKind { .. })
        );
        assert_matches!(
            decode_object(b"blob 5\0abc"),
            Err(CodecError::LengthMismatch {
                expected: 5,
                actual: 3
            })
        );
        assert_matches!(
            decode_object(b"commit 4\0tree"),
            Err(CodecError::Malformed { .. })
        );
    }

    #[test]
    fn test_tree_decode_rejects_unsorted_entries() {
        let tree = Tree::from_entries(vec![
            TreeEntry {
                name: component("a"),
                mode: EntryMode::Regular,
                hash: hash_bytes(b"a"),
                size: 1,
                payload: None,
            },
            TreeEntry {
                name: component("b"),
                mode: EntryMode::Regular,
                hash: hash_bytes(b"b"),
                size: 1,
                payload: None,
            },
        ]);
        // Swap the two entries by re-encoding them in reverse order.
        let reversed = Tree {
            entries: tree.entries().iter().rev().cloned().collect(),
        };
        let mut swapped = Vec::new();
        reversed.encode_body(&mut swapped);
        assert_matches!(
            decode_tree_body(&swapped),
            Err(CodecError::Malformed { reason, .. }) if reason.contains("order")
        );
    }

    #[test]
    fn test_empty_blob_hash_matches_codec() {
        let bytes = [encode_header(ObjectKind::Blob, 0), vec![]].concat();
        assert_eq!(&hash_bytes(&bytes), HashID::empty_blob());
    }
}
