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

use std::io;
use std::io::Read;
use std::io::Write;
use std::path::PathBuf;

use serde_json::json;
use zeta_lib::files;
use zeta_lib::hash_id::HashID;
use zeta_lib::hash_id::Hasher;
use zeta_lib::object::Encode as _;
use zeta_lib::object::Fragments;
use zeta_lib::object::Object;
use zeta_lib::object::ObjectKind;
use zeta_lib::object::encode_header;
use zeta_lib::odb::ObjectDatabase;
use zeta_lib::repo::Repository;
use zeta_lib::repo::Resolved;

use crate::cli_util::open_repo;
use crate::command_error::CommandError;
use crate::ui::Ui;

/// Cap on bytes shown when routing binary content through the hex viewer.
const BINARY_CAP: u64 = 10 * (1 << 20) - 8;

const TRUNCATED_MARKER: &[u8] = b"*** Binary truncated ***";

/// Print an object's content or metadata
#[derive(clap::Args, Clone, Debug)]
pub struct CatArgs {
    /// Object to print: a revision, `rev:path`, or an object hash
    spec: String,
    /// Print the object's kind instead of its content
    #[arg(long = "type", short = 't')]
    kind: bool,
    /// Print the object's size instead of its content
    #[arg(long, short = 's')]
    size: bool,
    /// Print kind-tagged metadata as JSON
    #[arg(long)]
    json: bool,
    /// Stream the content and print the hash it verifies to
    #[arg(long)]
    verify: bool,
    /// Normalize line endings and strip the BOM before printing
    #[arg(long)]
    textconv: bool,
    /// Print a fragments manifest itself instead of reassembling it
    #[arg(long)]
    direct: bool,
    /// Print at most this many content bytes
    #[arg(long)]
    limit: Option<u64>,
    /// Write content to this file instead of stdout
    #[arg(long, short = 'o')]
    output: Option<PathBuf>,
}

pub fn cmd_cat(ui: &mut Ui, args: &CatArgs) -> Result<(), CommandError> {
    let repo = open_repo()?;
    let hash = match repo.resolve_spec(&args.spec)? {
        Resolved::Object(hash) => hash,
        Resolved::Entry { hash, .. } => hash,
    };
    let object = repo.odb().object(&hash)?;

    if args.kind {
        writeln!(ui.stdout_writer(), "{}", object.kind().name())?;
        return Ok(());
    }
    if args.size {
        writeln!(ui.stdout_writer(), "{}", object_size(&object))?;
        return Ok(());
    }
    if args.json {
        let value = match &object {
            Object::Blob(blob) => json!({"kind": "blob", "size": blob.size()}),
            Object::Tree(tree) => json!({"kind": "tree", "entries": tree.entries()}),
            Object::Commit(commit) => json!({"kind": "commit", "commit": commit}),
            Object::Tag(tag) => json!({"kind": "tag", "tag": tag}),
            Object::Fragments(fragments) => json!({"kind": "fragments", "fragments": fragments}),
        };
        writeln!(ui.stdout_writer(), "{}", serde_json::to_string_pretty(&value)?)?;
        return Ok(());
    }
    if args.verify {
        let computed = verify_content(&repo, object)?;
        writeln!(ui.stdout_writer(), "{computed}")?;
        return Ok(());
    }

    let mut file_out;
    let out: &mut dyn Write;
    let terminal;
    match &args.output {
        Some(path) => {
            file_out = std::fs::File::create(path)?;
            out = &mut file_out;
            terminal = false;
        }
        None => {
            terminal = ui.is_terminal();
            out = ui.stdout_writer();
        }
    }

    match object {
        Object::Blob(blob) => {
            if args.textconv {
                let bytes = files::textconv(blob.read_to_bytes()?);
                write_limited(out, &bytes, args.limit)?;
            } else {
                write_content(blob.into_reader(), out, args.limit, terminal)?;
            }
        }
        Object::Fragments(fragments) => {
            if args.direct {
                write_fragments_manifest(out, &hash, &fragments)?;
            } else {
                let reader = FragmentsReader::new(repo.odb(), fragments);
                write_content(reader, out, args.limit, terminal)?;
            }
        }
        Object::Tree(tree) => {
            for entry in tree.entries() {
                writeln!(
                    out,
                    "{:>6} {} {}\t{}",
                    entry.mode.as_octal(),
                    entry.hash,
                    entry.size,
                    entry.name.as_internal_str(),
                )?;
            }
        }
        Object::Commit(commit) => out.write_all(&body_of(&commit))?,
        Object::Tag(tag) => out.write_all(&body_of(&tag))?,
    }
    Ok(())
}

fn object_size(object: &Object) -> u64 {
    match object {
        Object::Blob(blob) => blob.size(),
        // A fragments object's interesting size is the logical content.
        Object::Fragments(fragments) => fragments.size,
        Object::Tree(tree) => tree.body_len(),
        Object::Commit(commit) => commit.body_len(),
        Object::Tag(tag) => tag.body_len(),
        // Every stored kind has a canonical encoding; an object reaching
        // this point without one would be an invariant violation, and the
        // decode layer would have failed loudly long before.
    }
}

/// Streams the content through the hasher and returns the canonical blob
/// hash it verifies to.
fn verify_content(repo: &Repository, object: Object) -> Result<HashID, CommandError> {
    match object {
        Object::Blob(blob) => {
            let size = blob.size();
            hash_reader(blob.into_reader(), size)
        }
        Object::Fragments(fragments) => {
            let size = fragments.size;
            hash_reader(FragmentsReader::new(repo.odb(), fragments), size)
        }
        other => {
            let bytes = other_body(&other);
            let size = bytes.len() as u64;
            hash_reader(io::Cursor::new(bytes), size)
        }
    }
}

fn hash_reader(mut reader: impl Read, size: u64) -> Result<HashID, CommandError> {
    let mut hasher = Hasher::new();
    hasher.update(encode_header(ObjectKind::Blob, size));
    let mut buf = vec![0; 1 << 14];
    loop {
        let read = reader.read(&mut buf)?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }
    Ok(hasher.finalize())
}

fn other_body(object: &Object) -> Vec<u8> {
    match object {
        Object::Tree(tree) => body_of(tree),
        Object::Commit(commit) => body_of(commit),
        Object::Tag(tag) => body_of(tag),
        Object::Blob(_) | Object::Fragments(_) => unreachable!(),
    }
}

fn body_of(object: &impl zeta_lib::object::Encode) -> Vec<u8> {
    let mut body = Vec::new();
    object.encode_body(&mut body);
    body
}

fn write_fragments_manifest(
    out: &mut dyn Write,
    hash: &HashID,
    fragments: &Fragments,
) -> io::Result<()> {
    writeln!(out, "fragments {hash}")?;
    writeln!(out, "origin {}", fragments.origin)?;
    writeln!(out, "size {}", fragments.size)?;
    for entry in &fragments.entries {
        writeln!(out, "{:>4} {} {}", entry.index, entry.hash, entry.size)?;
    }
    Ok(())
}

fn write_limited(out: &mut dyn Write, bytes: &[u8], limit: Option<u64>) -> io::Result<()> {
    let end = limit
        .map(|limit| (limit as usize).min(bytes.len()))
        .unwrap_or(bytes.len());
    out.write_all(&bytes[..end])
}

/// Writes content, honoring the byte limit. When the destination is a
/// terminal and the content sniffs as binary, it is routed through the hex
/// viewer instead, capped with the truncation marker.
fn write_content(
    reader: impl Read,
    out: &mut dyn Write,
    limit: Option<u64>,
    terminal: bool,
) -> Result<(), CommandError> {
    let mut reader: Box<dyn Read + '_> = match limit {
        Some(limit) => Box::new(reader.take(limit)),
        None => Box::new(reader),
    };
    let mut head = vec![0; 8000];
    let filled = read_full(&mut reader, &mut head)?;
    head.truncate(filled);

    if terminal && files::is_binary(&head) {
        let chained = io::Cursor::new(head).chain(reader);
        hexdump(out, chained)?;
    } else {
        out.write_all(&head)?;
        io::copy(&mut reader, out)?;
    }
    Ok(())
}

fn read_full(reader: &mut dyn Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let read = reader.read(&mut buf[filled..])?;
        if read == 0 {
            break;
        }
        filled += read;
    }
    Ok(filled)
}

fn hexdump(out: &mut dyn Write, mut reader: impl Read) -> io::Result<()> {
    let mut offset: u64 = 0;
    let mut row = [0u8; 16];
    while offset < BINARY_CAP {
        let want = row.len().min((BINARY_CAP - offset) as usize);
        let filled = read_full(&mut reader, &mut row[..want])?;
        if filled == 0 {
            return Ok(());
        }
        write!(out, "{offset:08x} ")?;
        for (i, byte) in row[..filled].iter().enumerate() {
            if i == 8 {
                write!(out, " ")?;
            }
            write!(out, " {byte:02x}")?;
        }
        for i in filled..row.len() {
            if i == 8 {
                write!(out, " ")?;
            }
            write!(out, "   ")?;
        }
        write!(out, "  |")?;
        for byte in &row[..filled] {
            let ch = if byte.is_ascii_graphic() || *byte == b' ' {
                *byte as char
            } else {
                '.'
            };
            write!(out, "{ch}")?;
        }
        writeln!(out, "|")?;
        offset += filled as u64;
        if filled < want {
            return Ok(());
        }
    }
    // The cap was reached; if anything remains, say so. The marker is
    // bit-exact and carries no trailing newline.
    let mut probe = [0u8; 1];
    if reader.read(&mut probe)? > 0 {
        out.write_all(TRUNCATED_MARKER)?;
    }
    Ok(())
}

/// Streams the ordered concatenation of a fragments manifest's blobs.
struct FragmentsReader<'a> {
    odb: &'a ObjectDatabase,
    entries: std::vec::IntoIter<zeta_lib::object::FragmentEntry>,
    current: Option<Box<dyn Read + Send>>,
}

impl<'a> FragmentsReader<'a> {
    fn new(odb: &'a ObjectDatabase, fragments: Fragments) -> Self {
        Self {
            odb,
            entries: fragments.entries.into_iter(),
            current: None,
        }
    }
}

impl Read for FragmentsReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            if let Some(current) = &mut self.current {
                let read = current.read(buf)?;
                if read > 0 {
                    return Ok(read);
                }
                self.current = None;
            }
            match self.entries.next() {
                Some(entry) => {
                    let blob = self.odb.blob(&entry.hash).map_err(io::Error::other)?;
                    self.current = Some(blob.into_reader());
                }
                None => return Ok(0),
            }
        }
    }
}
