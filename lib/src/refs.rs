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

//! Named pointers into the object graph.
//!
//! Three reference forms exist: hash-direct, symbolic (points at another
//! reference name), and packed (consolidated file form). Updates are
//! compare-and-swap per reference: the caller supplies the expected old value
//! and the new value, and a concurrent mismatch surfaces as a recoverable
//! error. Every successful update appends a reflog record.

use std::fs;
use std::fs::OpenOptions;
use std::io;
use std::io::Write as _;
use std::path::Path;
use std::path::PathBuf;

use thiserror::Error;

use crate::file_util::persist_temp_file;
use crate::hash_id::HashID;
use crate::object::Signature;
use crate::object::Timestamp;

/// Maximum symbolic hops when resolving a reference.
const MAX_SYMBOLIC_DEPTH: usize = 10;

pub const HEAD: &str = "HEAD";
pub const BRANCH_PREFIX: &str = "refs/heads/";
pub const TAG_PREFIX: &str = "refs/tags/";

/// Full reference name of a branch.
pub fn branch_ref(short: &str) -> String {
    format!("{BRANCH_PREFIX}{short}")
}

/// Full reference name of a tag.
pub fn tag_ref(short: &str) -> String {
    format!("{TAG_PREFIX}{short}")
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RefTarget {
    Direct(HashID),
    Symbolic(String),
}

/// One record of a reference's history.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReflogEntry {
    pub old: HashID,
    pub new: HashID,
    pub name: String,
    pub email: String,
    pub timestamp: Timestamp,
    pub message: String,
}

/// State of the distinguished `HEAD` reference.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HeadState {
    /// Symbolic to a branch that has no commits yet.
    Unborn(String),
    Detached(HashID),
    OnBranch(String),
}

#[derive(Debug, Error)]
pub enum RefError {
    #[error("Reference {0} not found")]
    NotFound(String),
    #[error("Reference {name} changed concurrently")]
    CasMismatch {
        name: String,
        expected: Option<HashID>,
        actual: Option<HashID>,
    },
    #[error("Reference {0} is locked by another process")]
    Locked(String),
    #[error("Invalid reference name {0:?}")]
    InvalidName(String),
    #[error("Malformed reference {name}")]
    Malformed { name: String },
    #[error("Error accessing reference {name}")]
    Io {
        name: String,
        source: io::Error,
    },
}

pub type RefResult<T> = Result<T, RefError>;

#[derive(Debug)]
pub struct RefStore {
    zeta_dir: PathBuf,
}

impl RefStore {
    pub fn new(zeta_dir: PathBuf) -> Self {
        Self { zeta_dir }
    }

    fn ref_path(&self, name: &str) -> PathBuf {
        let mut path = self.zeta_dir.clone();
        path.extend(name.split('/'));
        path
    }

    fn reflog_path(&self, name: &str) -> PathBuf {
        let mut path = self.zeta_dir.join("reflog");
        path.extend(name.split('/'));
        path
    }

    fn io_err(name: &str) -> impl Fn(io::Error) -> RefError + '_ {
        move |source| RefError::Io {
            name: name.to_owned(),
            source,
        }
    }

    /// Reads a reference without following symbolic links. Loose form wins
    /// over the packed form.
    pub fn read(&self, name: &str) -> RefResult<RefTarget> {
        self.read_opt(name)?
            .ok_or_else(|| RefError::NotFound(name.to_owned()))
    }

    fn read_opt(&self, name: &str) -> RefResult<Option<RefTarget>> {
        check_ref_name(name)?;
        match fs::read_to_string(self.ref_path(name)) {
            Ok(contents) => {
                let contents = contents.trim_end();
                if let Some(target) = contents.strip_prefix("ref: ") {
                    return Ok(Some(RefTarget::Symbolic(target.to_owned())));
                }
                let hash = HashID::try_from_hex(contents).map_err(|_| RefError::Malformed {
                    name: name.to_owned(),
                })?;
                Ok(Some(RefTarget::Direct(hash)))
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                let packed = self.packed_refs()?;
                Ok(packed
                    .iter()
                    .find(|(packed_name, _)| packed_name == name)
                    .map(|&(_, hash)| RefTarget::Direct(hash)))
            }
            Err(err) => Err(Self::io_err(name)(err)),
        }
    }

    /// Resolves a reference through any chain of symbolic references to a
    /// hash.
    pub fn resolve(&self, name: &str) -> RefResult<HashID> {
        let mut current = name.to_owned();
        for _ in 0..MAX_SYMBOLIC_DEPTH {
            match self.read(&current)? {
                RefTarget::Direct(hash) => return Ok(hash),
                RefTarget::Symbolic(target) => current = target,
            }
        }
        Err(RefError::Malformed {
            name: name.to_owned(),
        })
    }

    /// Compare-and-swap update of a direct reference. `expected == None`
    /// means the reference must not exist yet. Appends a reflog record on
    /// success.
    pub fn update(
        &self,
        name: &str,
        expected: Option<HashID>,
        new: HashID,
        committer: &Signature,
        message: &str,
    ) -> RefResult<()> {
        check_ref_name(name)?;
        let _lock = RefLock::acquire(self, name)?;
        let actual = match self.read_opt(name)? {
            Some(RefTarget::Direct(hash)) => Some(hash),
            Some(RefTarget::Symbolic(_)) => {
                return Err(RefError::Malformed {
                    name: name.to_owned(),
                });
            }
            None => None,
        };
        if actual != expected {
            return Err(RefError::CasMismatch {
                name: name.to_owned(),
                expected,
                actual,
            });
        }
        self.write_ref_file(name, &format!("{}\n", new.hex()))?;
        self.append_reflog(name, expected.unwrap_or(HashID::ZERO), new, committer, message)?;
        Ok(())
    }

    /// Deletes a reference, consolidating the packed file if the reference
    /// was packed. `expected == None` skips the CAS check.
    pub fn delete(&self, name: &str, expected: Option<HashID>) -> RefResult<()> {
        check_ref_name(name)?;
        let _lock = RefLock::acquire(self, name)?;
        let actual = match self.read_opt(name)? {
            Some(RefTarget::Direct(hash)) => Some(hash),
            Some(RefTarget::Symbolic(_)) => None,
            None => {
                return Err(RefError::NotFound(name.to_owned()));
            }
        };
        if let Some(expected) = expected
            && actual != Some(expected)
        {
            return Err(RefError::CasMismatch {
                name: name.to_owned(),
                expected: Some(expected),
                actual,
            });
        }
        match fs::remove_file(self.ref_path(name)) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => return Err(Self::io_err(name)(err)),
        }
        let packed = self.packed_refs()?;
        if packed.iter().any(|(packed_name, _)| packed_name == name) {
            self.write_packed_refs(
                packed
                    .into_iter()
                    .filter(|(packed_name, _)| packed_name != name),
            )?;
        }
        match fs::remove_file(self.reflog_path(name)) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => return Err(Self::io_err(name)(err)),
        }
        Ok(())
    }

    /// Consolidates all loose branch and tag references into the packed file.
    pub fn pack_refs(&self) -> RefResult<usize> {
        let mut all = self.packed_refs()?;
        let loose = self.list(BRANCH_PREFIX)?;
        let tags = self.list(TAG_PREFIX)?;
        let mut packed_count = 0;
        for (name, hash) in loose.into_iter().chain(tags) {
            all.retain(|(packed_name, _)| packed_name != &name);
            all.push((name.clone(), hash));
            let path = self.ref_path(&name);
            if path.is_file() {
                // Write the packed entry before dropping the loose file so a
                // crash between the two steps cannot lose the reference.
                self.write_packed_refs(all.iter().cloned())?;
                fs::remove_file(&path).map_err(Self::io_err(&name))?;
                packed_count += 1;
            }
        }
        all.sort_by(|(a, _), (b, _)| a.cmp(b));
        self.write_packed_refs(all.into_iter())?;
        Ok(packed_count)
    }

    /// Lists direct references under `prefix` ("refs/heads/" etc.), loose
    /// form winning over packed, sorted by name.
    pub fn list(&self, prefix: &str) -> RefResult<Vec<(String, HashID)>> {
        let mut found = Vec::new();
        let root = self.ref_path(prefix.trim_end_matches('/'));
        self.walk_loose(&root, prefix.trim_end_matches('/'), &mut found)?;
        for (name, hash) in self.packed_refs()? {
            if name.starts_with(prefix) && !found.iter().any(|(loose, _)| loose == &name) {
                found.push((name, hash));
            }
        }
        found.sort_by(|(a, _), (b, _)| a.cmp(b));
        Ok(found)
    }

    fn walk_loose(
        &self,
        dir: &Path,
        prefix: &str,
        found: &mut Vec<(String, HashID)>,
    ) -> RefResult<()> {
        let entries = match dir.read_dir() {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(Self::io_err(prefix)(err)),
        };
        for entry in entries {
            let entry = entry.map_err(Self::io_err(prefix))?;
            let file_name = entry.file_name();
            let Some(file_name) = file_name.to_str() else {
                continue;
            };
            if file_name.ends_with(".lock") {
                continue;
            }
            let name = format!("{prefix}/{file_name}");
            let path = entry.path();
            if path.is_dir() {
                self.walk_loose(&path, &name, found)?;
            } else if let Some(RefTarget::Direct(hash)) = self.read_opt(&name)? {
                found.push((name, hash));
            }
        }
        Ok(())
    }

    // HEAD state machine. Transitions happen only through the methods below,
    // each of which writes a reflog record for HEAD.

    pub fn head_state(&self) -> RefResult<HeadState> {
        match self.read(HEAD)? {
            RefTarget::Direct(hash) => Ok(HeadState::Detached(hash)),
            RefTarget::Symbolic(target) => {
                let short = target
                    .strip_prefix(BRANCH_PREFIX)
                    .unwrap_or(&target)
                    .to_owned();
                match self.read_opt(&target)? {
                    Some(_) => Ok(HeadState::OnBranch(short)),
                    None => Ok(HeadState::Unborn(short)),
                }
            }
        }
    }

    /// Resolves HEAD to a commit hash, or `None` when unborn.
    pub fn head_commit(&self) -> RefResult<Option<HashID>> {
        match self.head_state()? {
            HeadState::Unborn(_) => Ok(None),
            HeadState::Detached(hash) => Ok(Some(hash)),
            HeadState::OnBranch(short) => Ok(Some(self.resolve(&branch_ref(&short))?)),
        }
    }

    pub fn set_head_to_branch(
        &self,
        short: &str,
        committer: &Signature,
        message: &str,
    ) -> RefResult<()> {
        let full = branch_ref(short);
        check_ref_name(&full)?;
        let old = self.head_commit().unwrap_or(None).unwrap_or(HashID::ZERO);
        let new = match self.read_opt(&full)? {
            Some(RefTarget::Direct(hash)) => hash,
            _ => HashID::ZERO,
        };
        let _lock = RefLock::acquire(self, HEAD)?;
        self.write_ref_file(HEAD, &format!("ref: {full}\n"))?;
        self.append_reflog(HEAD, old, new, committer, message)?;
        Ok(())
    }

    pub fn set_head_to_commit(
        &self,
        new: HashID,
        committer: &Signature,
        message: &str,
    ) -> RefResult<()> {
        let old = self.head_commit().unwrap_or(None).unwrap_or(HashID::ZERO);
        let _lock = RefLock::acquire(self, HEAD)?;
        self.write_ref_file(HEAD, &format!("{}\n", new.hex()))?;
        self.append_reflog(HEAD, old, new, committer, message)?;
        Ok(())
    }

    /// Moves the current branch tip (or the detached HEAD) to `new` with a
    /// CAS against the current position. Committing on an unborn HEAD
    /// creates the target branch.
    pub fn reset_head(
        &self,
        new: HashID,
        committer: &Signature,
        message: &str,
    ) -> RefResult<()> {
        match self.head_state()? {
            HeadState::Unborn(short) => {
                self.update(&branch_ref(&short), None, new, committer, message)
            }
            HeadState::OnBranch(short) => {
                let full = branch_ref(&short);
                let current = self.resolve(&full)?;
                self.update(&full, Some(current), new, committer, message)
            }
            HeadState::Detached(_) => self.set_head_to_commit(new, committer, message),
        }
    }

    pub fn read_reflog(&self, name: &str) -> RefResult<Vec<ReflogEntry>> {
        let contents = match fs::read_to_string(self.reflog_path(name)) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(vec![]),
            Err(err) => return Err(Self::io_err(name)(err)),
        };
        let mut entries = vec![];
        for line in contents.lines() {
            let entry = parse_reflog_line(line).ok_or_else(|| RefError::Malformed {
                name: name.to_owned(),
            })?;
            entries.push(entry);
        }
        Ok(entries)
    }

    fn append_reflog(
        &self,
        ref_name: &str,
        old: HashID,
        new: HashID,
        committer: &Signature,
        message: &str,
    ) -> RefResult<()> {
        let path = self.reflog_path(ref_name);
        fs::create_dir_all(path.parent().unwrap()).map_err(Self::io_err(ref_name))?;
        let record = format!(
            "{} {} {} <{}> {} {}\t{}\n",
            old.hex(),
            new.hex(),
            committer.name,
            committer.email,
            committer.timestamp.millis,
            committer.timestamp.tz_offset_minutes,
            message.replace('\n', " "),
        );
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(Self::io_err(ref_name))?;
        file.write_all(record.as_bytes())
            .map_err(Self::io_err(ref_name))?;
        Ok(())
    }

    fn write_ref_file(&self, name: &str, contents: &str) -> RefResult<()> {
        let path = self.ref_path(name);
        fs::create_dir_all(path.parent().unwrap()).map_err(Self::io_err(name))?;
        let mut temp_file =
            tempfile::NamedTempFile::new_in(path.parent().unwrap()).map_err(Self::io_err(name))?;
        temp_file
            .write_all(contents.as_bytes())
            .map_err(Self::io_err(name))?;
        persist_temp_file(temp_file, &path).map_err(Self::io_err(name))?;
        Ok(())
    }

    fn packed_refs(&self) -> RefResult<Vec<(String, HashID)>> {
        let path = self.zeta_dir.join("packed-refs");
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(vec![]),
            Err(err) => return Err(Self::io_err("packed-refs")(err)),
        };
        let mut refs = vec![];
        for line in contents.lines() {
            if line.starts_with('#') || line.is_empty() {
                continue;
            }
            let parsed = line
                .split_once(' ')
                .and_then(|(hex, name)| Some((name.to_owned(), HashID::try_from_hex(hex).ok()?)));
            match parsed {
                Some(entry) => refs.push(entry),
                None => {
                    return Err(RefError::Malformed {
                        name: "packed-refs".to_owned(),
                    });
                }
            }
        }
        Ok(refs)
    }

    fn write_packed_refs(
        &self,
        refs: impl Iterator<Item = (String, HashID)>,
    ) -> RefResult<()> {
        let path = self.zeta_dir.join("packed-refs");
        let mut contents = String::from("# packed-refs\n");
        for (name, hash) in refs {
            contents.push_str(&format!("{} {}\n", hash.hex(), name));
        }
        let mut temp_file =
            tempfile::NamedTempFile::new_in(&self.zeta_dir).map_err(Self::io_err("packed-refs"))?;
        temp_file
            .write_all(contents.as_bytes())
            .map_err(Self::io_err("packed-refs"))?;
        persist_temp_file(temp_file, &path).map_err(Self::io_err("packed-refs"))?;
        Ok(())
    }
}

/// Exclusive lock file guarding a single reference. Removed on drop, so the
/// lock is released on every exit path.
struct RefLock {
    path: PathBuf,
}

impl RefLock {
    fn acquire(store: &RefStore, name: &str) -> RefResult<Self> {
        let mut path = store.ref_path(name).into_os_string();
        path.push(".lock");
        let path = PathBuf::from(path);
        fs::create_dir_all(path.parent().unwrap()).map_err(RefStore::io_err(name))?;
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(_) => Ok(Self { path }),
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                Err(RefError::Locked(name.to_owned()))
            }
            Err(err) => Err(RefStore::io_err(name)(err)),
        }
    }
}

impl Drop for RefLock {
    fn drop(&mut self) {
        if let Err(err) = fs::remove_file(&self.path) {
            tracing::warn!(path = ?self.path, ?err, "failed to remove ref lock");
        }
    }
}

fn check_ref_name(name: &str) -> RefResult<()> {
    let bad = || RefError::InvalidName(name.to_owned());
    if name.is_empty()
        || name.starts_with('/')
        || name.ends_with('/')
        || name.ends_with(".lock")
        || name.contains("..")
        || name.contains("//")
        || name.bytes().any(|b| b.is_ascii_control() || b == b'\\')
    {
        return Err(bad());
    }
    if name != HEAD && !name.starts_with("refs/") {
        return Err(bad());
    }
    Ok(())
}

fn parse_reflog_line(line: &str) -> Option<ReflogEntry> {
    let (meta, message) = line.split_once('\t')?;
    let mut fields = meta.splitn(3, ' ');
    let old = HashID::try_from_hex(fields.next()?).ok()?;
    let new = HashID::try_from_hex(fields.next()?).ok()?;
    let identity = fields.next()?;
    // "<name> <<email>> <millis> <tz>"
    let (rest, tz) = identity.rsplit_once(' ')?;
    let (rest, millis) = rest.rsplit_once(' ')?;
    let rest = rest.strip_suffix('>')?;
    let (name, email) = rest.rsplit_once(" <")?;
    Some(ReflogEntry {
        old,
        new,
        name: name.to_owned(),
        email: email.to_owned(),
        timestamp: Timestamp {
            millis: millis.parse().ok()?,
            tz_offset_minutes: tz.parse().ok()?,
        },
        message: message.to_owned(),
    })
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::hash_id::hash_bytes;

    fn signature() -> Signature {
        Signature {
            name: "Someone".to_owned(),
            email: "someone@example.com".to_owned(),
            timestamp: Timestamp {
                millis: 1700000000000,
                tz_offset_minutes: 60,
            },
        }
    }

    fn new_store() -> (tempfile::TempDir, RefStore) {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = RefStore::new(temp_dir.path().to_path_buf());
        store
            .write_ref_file(HEAD, "ref: refs/heads/mainline\n")
            .unwrap();
        (temp_dir, store)
    }

    #[test]
    fn test_cas_create_and_advance() {
        let (_temp_dir, store) = new_store();
        let name = branch_ref("mainline");
        let first = hash_bytes(b"first");
        let second = hash_bytes(b"second");

        store
            .update(&name, None, first, &signature(), "commit: initial")
            .unwrap();
        assert_eq!(store.resolve(&name).unwrap(), first);

        // Stale expectation is a recoverable CAS error.
        assert_matches!(
            store.update(&name, None, second, &signature(), "commit: again"),
            Err(RefError::CasMismatch { actual: Some(actual), .. }) if actual == first
        );
        store
            .update(&name, Some(first), second, &signature(), "commit: again")
            .unwrap();
        assert_eq!(store.resolve(&name).unwrap(), second);

        let reflog = store.read_reflog(&name).unwrap();
        assert_eq!(reflog.len(), 2);
        assert_eq!(reflog[0].old, HashID::ZERO);
        assert_eq!(reflog[0].new, first);
        assert_eq!(reflog[0].message, "commit: initial");
        assert_eq!(reflog[1].old, first);
        assert_eq!(reflog[1].new, second);
    }

    #[test]
    fn test_head_states() {
        let (_temp_dir, store) = new_store();
        assert_eq!(
            store.head_state().unwrap(),
            HeadState::Unborn("mainline".to_owned())
        );
        assert_eq!(store.head_commit().unwrap(), None);

        let first = hash_bytes(b"first");
        store
            .reset_head(first, &signature(), "commit: initial")
            .unwrap();
        assert_eq!(
            store.head_state().unwrap(),
            HeadState::OnBranch("mainline".to_owned())
        );
        assert_eq!(store.head_commit().unwrap(), Some(first));

        store
            .set_head_to_commit(first, &signature(), "checkout: detach")
            .unwrap();
        assert_eq!(store.head_state().unwrap(), HeadState::Detached(first));

        store
            .set_head_to_branch("mainline", &signature(), "checkout: mainline")
            .unwrap();
        assert_eq!(
            store.head_state().unwrap(),
            HeadState::OnBranch("mainline".to_owned())
        );
    }

    #[test]
    fn test_symbolic_resolution() {
        let (_temp_dir, store) = new_store();
        let first = hash_bytes(b"first");
        store
            .update(&branch_ref("mainline"), None, first, &signature(), "init")
            .unwrap();
        assert_eq!(store.resolve(HEAD).unwrap(), first);
    }

    #[test]
    fn test_packed_refs_and_consolidation() {
        let (_temp_dir, store) = new_store();
        let a = hash_bytes(b"a");
        let b = hash_bytes(b"b");
        store
            .update(&branch_ref("a"), None, a, &signature(), "init a")
            .unwrap();
        store
            .update(&branch_ref("b"), None, b, &signature(), "init b")
            .unwrap();

        let packed = store.pack_refs().unwrap();
        assert_eq!(packed, 2);
        assert!(!store.ref_path(&branch_ref("a")).is_file());
        assert_eq!(store.resolve(&branch_ref("a")).unwrap(), a);

        // A loose update shadows the packed form.
        let a2 = hash_bytes(b"a2");
        store
            .update(&branch_ref("a"), Some(a), a2, &signature(), "advance a")
            .unwrap();
        assert_eq!(store.resolve(&branch_ref("a")).unwrap(), a2);

        // Deletion drops both forms.
        store.delete(&branch_ref("a"), Some(a2)).unwrap();
        assert_matches!(store.read(&branch_ref("a")), Err(RefError::NotFound(_)));
        assert_eq!(
            store.list(BRANCH_PREFIX).unwrap(),
            vec![(branch_ref("b"), b)]
        );
    }

    #[test]
    fn test_list_mixes_loose_and_packed() {
        let (_temp_dir, store) = new_store();
        let a = hash_bytes(b"a");
        let b = hash_bytes(b"b");
        store
            .update(&branch_ref("a"), None, a, &signature(), "init a")
            .unwrap();
        store.pack_refs().unwrap();
        store
            .update(&branch_ref("b"), None, b, &signature(), "init b")
            .unwrap();
        assert_eq!(
            store.list(BRANCH_PREFIX).unwrap(),
            vec![(branch_ref("a"), a), (branch_ref("b"), b)]
        );
    }

    #[test]
    fn test_lock_contention() {
        let (_temp_dir, store) = new_store();
        let name = branch_ref("mainline");
        let _held = RefLock::acquire(&store, &name).unwrap();
        assert_matches!(
            store.update(&name, None, hash_bytes(b"x"), &signature(), "init"),
            Err(RefError::Locked(_))
        );
    }

    #[test]
    fn test_invalid_names_rejected() {
        let (_temp_dir, store) = new_store();
        for name in ["", "refs/heads/../escape", "not-refs/x", "refs/heads/a.lock"] {
            assert_matches!(store.read(name), Err(RefError::InvalidName(_)));
        }
    }
}
