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

//! Change-set computation between trees, the index, and the working tree.
//!
//! All three diff primitives produce the same [`Change`] shape: `from` and
//! `to` are the two sides of a path, and exactly one of them may be absent,
//! encoding insert/delete/modify.

use std::collections::BTreeMap;
use std::fs::Metadata;
use std::path::Path;

use thiserror::Error;

use crate::file_util::PathError;
use crate::hash_id::HashID;
use crate::hash_id::Hasher;
use crate::index::Index;
use crate::index::IndexEntry;
use crate::object::EntryMode;
use crate::object::EntryValue;
use crate::object::ObjectKind;
use crate::object::Tree;
use crate::object::encode_header;
use crate::odb::ObjectDatabase;
use crate::odb::OdbError;
use crate::repo_path::RepoPath;
use crate::repo_path::RepoPathBuf;

/// One side of a [`Change`].
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct ChangeItem {
    pub path: RepoPathBuf,
    pub mode: EntryMode,
    pub hash: HashID,
    pub size: u64,
    /// Inline content carried over from a tree entry, if any.
    #[serde(skip)]
    pub payload: Option<Vec<u8>>,
}

impl ChangeItem {
    pub fn from_value(path: RepoPathBuf, value: EntryValue) -> Self {
        Self {
            path,
            mode: value.mode,
            hash: value.hash,
            size: value.size,
            payload: value.payload,
        }
    }

    pub fn from_index_entry(entry: &IndexEntry) -> Self {
        Self {
            path: entry.path.clone(),
            mode: entry.mode,
            hash: entry.hash,
            size: entry.size,
            payload: None,
        }
    }

    pub fn value(&self) -> EntryValue {
        EntryValue {
            mode: self.mode,
            hash: self.hash,
            size: self.size,
            payload: self.payload.clone(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeKind {
    Insert,
    Delete,
    Modify,
}

/// A difference at one path. At least one side is present.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct Change {
    pub from: Option<ChangeItem>,
    pub to: Option<ChangeItem>,
}

impl Change {
    pub fn insert(to: ChangeItem) -> Self {
        Self {
            from: None,
            to: Some(to),
        }
    }

    pub fn delete(from: ChangeItem) -> Self {
        Self {
            from: Some(from),
            to: None,
        }
    }

    pub fn modify(from: ChangeItem, to: ChangeItem) -> Self {
        Self {
            from: Some(from),
            to: Some(to),
        }
    }

    pub fn kind(&self) -> ChangeKind {
        match (&self.from, &self.to) {
            (None, Some(_)) => ChangeKind::Insert,
            (Some(_), None) => ChangeKind::Delete,
            (Some(_), Some(_)) => ChangeKind::Modify,
            (None, None) => unreachable!("change with no sides"),
        }
    }

    pub fn path(&self) -> &RepoPath {
        self.to
            .as_ref()
            .or(self.from.as_ref())
            .map(|item| item.path.as_ref())
            .expect("change with no sides")
    }
}

/// Sparse-path matcher restricting a structural walk.
#[derive(Clone, Debug, Default)]
pub struct PathMatcher {
    // Empty means "match everything".
    prefixes: Vec<RepoPathBuf>,
}

impl PathMatcher {
    pub fn everything() -> Self {
        Self::default()
    }

    pub fn prefixes(prefixes: Vec<RepoPathBuf>) -> Self {
        Self { prefixes }
    }

    pub fn matches(&self, path: &RepoPath) -> bool {
        self.prefixes.is_empty() || self.prefixes.iter().any(|prefix| path.starts_with(prefix))
    }

    /// Whether the walk needs to descend into `dir` at all.
    pub fn visit_dir(&self, dir: &RepoPath) -> bool {
        self.prefixes.is_empty()
            || self
                .prefixes
                .iter()
                .any(|prefix| dir.starts_with(prefix) || prefix.starts_with(dir))
    }
}

#[derive(Debug, Error)]
pub enum DiffError {
    #[error(transparent)]
    Odb(#[from] OdbError),
    #[error("Failed to walk the working tree")]
    Walk { source: ignore::Error },
    #[error(transparent)]
    Path(#[from] PathError),
}

/// Structural diff between two trees. Directory entries are recursed into;
/// only file-level changes are reported.
pub fn diff_trees(
    odb: &ObjectDatabase,
    from: &HashID,
    to: &HashID,
    matcher: &PathMatcher,
) -> Result<Vec<Change>, DiffError> {
    let mut changes = vec![];
    if from != to {
        let from_tree = odb.tree(from)?;
        let to_tree = odb.tree(to)?;
        diff_tree_dirs(
            odb,
            RepoPath::root(),
            &from_tree,
            &to_tree,
            matcher,
            &mut changes,
        )?;
    }
    Ok(changes)
}

fn diff_tree_dirs(
    odb: &ObjectDatabase,
    dir: &RepoPath,
    from_tree: &Tree,
    to_tree: &Tree,
    matcher: &PathMatcher,
    changes: &mut Vec<Change>,
) -> Result<(), DiffError> {
    // Both sides are in canonical entry order; merge-join by name.
    let mut from_entries = from_tree.entries().iter().peekable();
    let mut to_entries = to_tree.entries().iter().peekable();
    loop {
        let (from_entry, to_entry) = match (from_entries.peek(), to_entries.peek()) {
            (None, None) => break,
            (Some(_), None) => (from_entries.next(), None),
            (None, Some(_)) => (None, to_entries.next()),
            (Some(from_entry), Some(to_entry)) => match from_entry.name.cmp(&to_entry.name) {
                std::cmp::Ordering::Less => (from_entries.next(), None),
                std::cmp::Ordering::Greater => (None, to_entries.next()),
                std::cmp::Ordering::Equal => (from_entries.next(), to_entries.next()),
            },
        };
        match (from_entry, to_entry) {
            (Some(from_entry), None) => {
                let path = dir.join(&from_entry.name);
                side_of_tree(odb, path, from_entry.value(), matcher, &mut |item| {
                    changes.push(Change::delete(item));
                })?;
            }
            (None, Some(to_entry)) => {
                let path = dir.join(&to_entry.name);
                side_of_tree(odb, path, to_entry.value(), matcher, &mut |item| {
                    changes.push(Change::insert(item));
                })?;
            }
            (Some(from_entry), Some(to_entry)) => {
                if from_entry.hash == to_entry.hash && from_entry.mode == to_entry.mode {
                    continue;
                }
                let path = dir.join(&from_entry.name);
                match (from_entry.mode.is_dir(), to_entry.mode.is_dir()) {
                    (true, true) => {
                        if !matcher.visit_dir(&path) {
                            continue;
                        }
                        let from_subtree = odb.tree(&from_entry.hash)?;
                        let to_subtree = odb.tree(&to_entry.hash)?;
                        diff_tree_dirs(odb, &path, &from_subtree, &to_subtree, matcher, changes)?;
                    }
                    (true, false) => {
                        // A directory was replaced by a file: every file
                        // under it is deleted, then the file appears.
                        side_of_tree(odb, path.clone(), from_entry.value(), matcher, &mut |item| {
                            changes.push(Change::delete(item));
                        })?;
                        if matcher.matches(&path) {
                            changes
                                .push(Change::insert(ChangeItem::from_value(path, to_entry.value())));
                        }
                    }
                    (false, true) => {
                        if matcher.matches(&path) {
                            changes.push(Change::delete(ChangeItem::from_value(
                                path.clone(),
                                from_entry.value(),
                            )));
                        }
                        side_of_tree(odb, path, to_entry.value(), matcher, &mut |item| {
                            changes.push(Change::insert(item));
                        })?;
                    }
                    (false, false) => {
                        if matcher.matches(&path) {
                            changes.push(Change::modify(
                                ChangeItem::from_value(path.clone(), from_entry.value()),
                                ChangeItem::from_value(path, to_entry.value()),
                            ));
                        }
                    }
                }
            }
            (None, None) => unreachable!(),
        }
    }
    Ok(())
}

/// Emits every file reachable from `value` at `path`: the value itself for a
/// file entry, or the recursively flattened subtree for a directory.
fn side_of_tree(
    odb: &ObjectDatabase,
    path: RepoPathBuf,
    value: EntryValue,
    matcher: &PathMatcher,
    emit: &mut dyn FnMut(ChangeItem),
) -> Result<(), DiffError> {
    if value.mode.is_dir() {
        if !matcher.visit_dir(&path) {
            return Ok(());
        }
        let subtree = odb.tree(&value.hash)?;
        for entry in subtree.entries() {
            side_of_tree(odb, path.join(&entry.name), entry.value(), matcher, emit)?;
        }
    } else if matcher.matches(&path) {
        emit(ChangeItem::from_value(path, value));
    }
    Ok(())
}

/// Flattens a tree into a sorted path → value map of its file entries.
pub fn flatten_tree(
    odb: &ObjectDatabase,
    tree_id: &HashID,
) -> Result<BTreeMap<RepoPathBuf, EntryValue>, DiffError> {
    let mut files = BTreeMap::new();
    let tree = odb.tree(tree_id)?;
    flatten_into(odb, RepoPath::root(), &tree, &mut files)?;
    Ok(files)
}

fn flatten_into(
    odb: &ObjectDatabase,
    dir: &RepoPath,
    tree: &Tree,
    files: &mut BTreeMap<RepoPathBuf, EntryValue>,
) -> Result<(), DiffError> {
    for entry in tree.entries() {
        let path = dir.join(&entry.name);
        if entry.mode.is_dir() {
            let subtree = odb.tree(&entry.hash)?;
            flatten_into(odb, &path, &subtree, files)?;
        } else {
            files.insert(path, entry.value());
        }
    }
    Ok(())
}

/// Diff of a tree against the index, by materializing the pseudo-tree the
/// index describes. `from` is the tree state, `to` the index state.
pub fn diff_tree_index(
    odb: &ObjectDatabase,
    tree_id: &HashID,
    index: &Index,
) -> Result<Vec<Change>, DiffError> {
    let tree_files = flatten_tree(odb, tree_id)?;
    enum Took {
        Tree((RepoPathBuf, EntryValue)),
        Index(ChangeItem),
        Both((RepoPathBuf, EntryValue), ChangeItem),
    }
    let mut changes = vec![];
    let mut tree_iter = tree_files.into_iter().peekable();
    let mut index_iter = index.entries().iter().peekable();
    loop {
        let took = match (tree_iter.peek(), index_iter.peek()) {
            (None, None) => break,
            (Some(_), None) => Took::Tree(tree_iter.next().unwrap()),
            (None, Some(_)) => Took::Index(ChangeItem::from_index_entry(index_iter.next().unwrap())),
            (Some((tree_path, _)), Some(entry)) => match tree_path.cmp(&entry.path) {
                std::cmp::Ordering::Less => Took::Tree(tree_iter.next().unwrap()),
                std::cmp::Ordering::Greater => {
                    Took::Index(ChangeItem::from_index_entry(index_iter.next().unwrap()))
                }
                std::cmp::Ordering::Equal => Took::Both(
                    tree_iter.next().unwrap(),
                    ChangeItem::from_index_entry(index_iter.next().unwrap()),
                ),
            },
        };
        match took {
            Took::Tree((path, value)) => {
                changes.push(Change::delete(ChangeItem::from_value(path, value)));
            }
            Took::Index(item) => changes.push(Change::insert(item)),
            Took::Both((path, value), item) => {
                if value.hash != item.hash || value.mode != item.mode {
                    changes.push(Change::modify(ChangeItem::from_value(path, value), item));
                }
            }
        }
    }
    Ok(changes)
}

/// State of one file found on disk.
#[derive(Clone, Debug)]
struct WorktreeFile {
    mode: EntryMode,
    size: u64,
    mtime_millis: i64,
}

/// Diff of the index against the working tree, honoring `.zetaignore`.
///
/// `from` is the index state, `to` the on-disk state. Untracked (non-ignored)
/// files appear as inserts, missing tracked files as deletes.
pub fn diff_index_worktree(
    index: &Index,
    worktree_root: &Path,
) -> Result<Vec<Change>, DiffError> {
    let mut on_disk = BTreeMap::new();
    let mut walk = ignore::WalkBuilder::new(worktree_root);
    walk.hidden(false)
        .follow_links(false)
        .git_ignore(false)
        .git_global(false)
        .git_exclude(false)
        .ignore(false)
        .parents(false)
        .filter_entry(|entry| entry.file_name() != std::ffi::OsStr::new(".zeta"));
    walk.add_custom_ignore_filename(".zetaignore");
    for entry in walk.build() {
        let entry = entry.map_err(|source| DiffError::Walk { source })?;
        let Some(file_type) = entry.file_type() else {
            continue;
        };
        if file_type.is_dir() {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(worktree_root) else {
            continue;
        };
        let Ok(path) = RepoPathBuf::from_relative_path(relative) else {
            continue;
        };
        let metadata = entry
            .path()
            .symlink_metadata()
            .map_err(|source| PathError {
                path: entry.path().to_path_buf(),
                source,
            })?;
        on_disk.insert(path, file_state(&metadata));
    }

    let mut changes = vec![];
    let mut disk_iter = on_disk.into_iter().peekable();
    let mut index_iter = index.entries().iter().peekable();
    loop {
        let (index_entry, disk_entry) = match (index_iter.peek(), disk_iter.peek()) {
            (None, None) => break,
            (Some(_), None) => (index_iter.next(), None),
            (None, Some(_)) => (None, disk_iter.next()),
            (Some(entry), Some((path, _))) => match entry.path.cmp(path) {
                std::cmp::Ordering::Less => (index_iter.next(), None),
                std::cmp::Ordering::Greater => (None, disk_iter.next()),
                std::cmp::Ordering::Equal => (index_iter.next(), disk_iter.next()),
            },
        };
        match (index_entry, disk_entry) {
            (Some(entry), None) => {
                changes.push(Change::delete(ChangeItem::from_index_entry(entry)));
            }
            (None, Some((path, state))) => {
                let (hash, size) = hash_worktree_file(worktree_root, &path, state.mode)?;
                changes.push(Change::insert(ChangeItem {
                    path,
                    mode: state.mode,
                    hash,
                    size,
                    payload: None,
                }));
            }
            (Some(entry), Some((path, state))) => {
                // Fast path: stat data matches what the index recorded.
                if entry.mtime_millis != 0
                    && entry.mtime_millis == state.mtime_millis
                    && entry.size == state.size
                    && modes_agree(entry.mode, state.mode)
                {
                    continue;
                }
                // Fragments manifests have no single on-disk hash; compare
                // the materialized length instead.
                if entry.mode == EntryMode::Fragments {
                    if entry.size != state.size {
                        changes.push(Change::modify(
                            ChangeItem::from_index_entry(entry),
                            ChangeItem {
                                path,
                                mode: state.mode,
                                hash: HashID::ZERO,
                                size: state.size,
                                payload: None,
                            },
                        ));
                    }
                    continue;
                }
                let (hash, size) = hash_worktree_file(worktree_root, &path, state.mode)?;
                if hash != entry.hash || !modes_agree(entry.mode, state.mode) {
                    changes.push(Change::modify(
                        ChangeItem::from_index_entry(entry),
                        ChangeItem {
                            path,
                            mode: state.mode,
                            hash,
                            size,
                            payload: None,
                        },
                    ));
                }
            }
            (None, None) => unreachable!(),
        }
    }
    Ok(changes)
}

fn file_state(metadata: &Metadata) -> WorktreeFile {
    let mode = if metadata.file_type().is_symlink() {
        EntryMode::Symlink
    } else if is_executable(metadata) {
        EntryMode::Executable
    } else {
        EntryMode::Regular
    };
    WorktreeFile {
        mode,
        size: metadata.len(),
        mtime_millis: mtime_millis(metadata),
    }
}

pub(crate) fn mtime_millis(metadata: &Metadata) -> i64 {
    metadata
        .modified()
        .ok()
        .and_then(|mtime| {
            mtime
                .duration_since(std::time::UNIX_EPOCH)
                .ok()
                .map(|duration| duration.as_millis() as i64)
        })
        .unwrap_or(0)
}

#[cfg(unix)]
fn is_executable(metadata: &Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt as _;
    metadata.permissions().mode() & 0o111 != 0
}

#[cfg(windows)]
fn is_executable(_metadata: &Metadata) -> bool {
    false
}

/// The filesystem cannot represent every mode; only disagreements it could
/// express are significant. On Windows the executable bit is invisible, so
/// regular and executable agree with everything regular.
fn modes_agree(index_mode: EntryMode, fs_mode: EntryMode) -> bool {
    if index_mode == fs_mode {
        return true;
    }
    match (index_mode, fs_mode) {
        // Fragments materialize as a plain file.
        (EntryMode::Fragments, EntryMode::Regular | EntryMode::Executable) => true,
        (EntryMode::Regular, EntryMode::Executable) | (EntryMode::Executable, EntryMode::Regular) => {
            cfg!(windows)
        }
        _ => false,
    }
}

/// Hashes an on-disk file through the canonical blob codec.
pub(crate) fn hash_worktree_file(
    worktree_root: &Path,
    path: &RepoPath,
    mode: EntryMode,
) -> Result<(HashID, u64), DiffError> {
    use crate::file_util::IoResultExt as _;

    let disk_path = path.to_fs_path_unchecked(worktree_root);
    let contents: Vec<u8> = if mode == EntryMode::Symlink {
        let target = disk_path.read_link().context(&disk_path)?;
        target.to_string_lossy().into_owned().into_bytes()
    } else {
        std::fs::read(&disk_path).context(&disk_path)?
    };
    let mut hasher = Hasher::new();
    hasher.update(encode_header(ObjectKind::Blob, contents.len() as u64));
    hasher.update(&contents);
    Ok((hasher.finalize(), contents.len() as u64))
}

/// Orders deletions before insertions and modifications, so a
/// case-insensitive filesystem sees a rename (`A` → `a`) as "delete A, create
/// a" rather than the reverse. The relative order within each group is kept.
pub fn rearrange_changes(changes: Vec<Change>) -> Vec<Change> {
    let (deletes, rest): (Vec<_>, Vec<_>) = changes
        .into_iter()
        .partition(|change| change.kind() == ChangeKind::Delete);
    deletes.into_iter().chain(rest).collect()
}

/// Post-processes a change set for host filesystem quirks. Must run after
/// diff generation and before application.
///
/// On case-insensitive hosts, a delete+insert pair differing only in case is
/// merged into a rename-with-modification (hashes differ) or suppressed
/// (hashes equal). On Windows, a mode-only change between regular-file modes
/// is suppressed, and remaining same-content changes keep the old mode so the
/// mode difference is not applied as a content change. On Linux both steps
/// are no-ops.
pub fn exclude_ignored_changes(
    changes: Vec<Change>,
    case_insensitive: bool,
    windows: bool,
) -> Vec<Change> {
    let mut changes = changes;
    if case_insensitive {
        let mut deleted: BTreeMap<String, usize> = BTreeMap::new();
        for (i, change) in changes.iter().enumerate() {
            if change.kind() == ChangeKind::Delete {
                deleted.insert(change.path().as_internal_str().to_lowercase(), i);
            }
        }
        let mut drop = vec![false; changes.len()];
        let mut merged: Vec<(usize, usize)> = vec![];
        for (i, change) in changes.iter().enumerate() {
            if change.kind() != ChangeKind::Insert {
                continue;
            }
            let lower = change.path().as_internal_str().to_lowercase();
            let Some(&delete_index) = deleted.get(&lower) else {
                continue;
            };
            let delete = &changes[delete_index];
            if delete.from.as_ref().unwrap().hash == change.to.as_ref().unwrap().hash {
                // Pure case rename of identical content: nothing to do on a
                // case-insensitive filesystem.
                drop[delete_index] = true;
                drop[i] = true;
            } else {
                merged.push((delete_index, i));
            }
        }
        for (delete_index, insert_index) in merged {
            let from = changes[delete_index].from.take();
            changes[insert_index].from = from;
            drop[delete_index] = true;
        }
        let mut kept = Vec::with_capacity(changes.len());
        for (i, change) in changes.into_iter().enumerate() {
            if !drop[i] {
                kept.push(change);
            }
        }
        changes = kept;
    }
    if windows {
        changes.retain_mut(|change| {
            let (Some(from), Some(to)) = (&change.from, &mut change.to) else {
                return true;
            };
            if from.hash != to.hash {
                return true;
            }
            if from.mode.is_regular_file() && to.mode.is_regular_file() {
                // Executable bits don't exist on this host.
                return false;
            }
            // Hijack: keep the recorded mode so application doesn't treat
            // the mode difference as a content change.
            to.mode = from.mode;
            true
        });
    }
    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::IndexBuilder;
    use crate::testing::TestOdb;

    fn path(value: &str) -> RepoPathBuf {
        RepoPathBuf::from_internal_string(value).unwrap()
    }

    #[test]
    fn test_diff_trees_insert_delete_modify() {
        let fixture = TestOdb::new();
        let odb = fixture.odb();
        let from = fixture.tree(&[("a.txt", "a"), ("dir/b.txt", "b"), ("dir/c.txt", "c")]);
        let to = fixture.tree(&[("a.txt", "A"), ("dir/b.txt", "b"), ("new.txt", "n")]);

        let changes = diff_trees(odb, &from, &to, &PathMatcher::everything()).unwrap();
        let summary: Vec<_> = changes
            .iter()
            .map(|change| (change.path().as_internal_str().to_owned(), change.kind()))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("a.txt".to_owned(), ChangeKind::Modify),
                ("dir/c.txt".to_owned(), ChangeKind::Delete),
                ("new.txt".to_owned(), ChangeKind::Insert),
            ]
        );
    }

    #[test]
    fn test_diff_trees_identical_is_empty() {
        let fixture = TestOdb::new();
        let tree = fixture.tree(&[("a.txt", "a")]);
        let changes =
            diff_trees(fixture.odb(), &tree, &tree, &PathMatcher::everything()).unwrap();
        assert!(changes.is_empty());
    }

    #[test]
    fn test_diff_trees_dir_file_replacement() {
        let fixture = TestOdb::new();
        let from = fixture.tree(&[("x/inner.txt", "i"), ("x/other.txt", "o")]);
        let to = fixture.tree(&[("x", "now a file")]);

        let changes = diff_trees(fixture.odb(), &from, &to, &PathMatcher::everything()).unwrap();
        let summary: Vec<_> = changes
            .iter()
            .map(|change| (change.path().as_internal_str().to_owned(), change.kind()))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("x/inner.txt".to_owned(), ChangeKind::Delete),
                ("x/other.txt".to_owned(), ChangeKind::Delete),
                ("x".to_owned(), ChangeKind::Insert),
            ]
        );
    }

    #[test]
    fn test_diff_trees_with_matcher() {
        let fixture = TestOdb::new();
        let from = fixture.tree(&[("dir/a.txt", "a"), ("other/b.txt", "b")]);
        let to = fixture.tree(&[("dir/a.txt", "A"), ("other/b.txt", "B")]);

        let matcher = PathMatcher::prefixes(vec![path("dir")]);
        let changes = diff_trees(fixture.odb(), &from, &to, &matcher).unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].path().as_internal_str(), "dir/a.txt");
    }

    #[test]
    fn test_diff_tree_index() {
        let fixture = TestOdb::new();
        let tree = fixture.tree(&[("a.txt", "a"), ("b.txt", "b")]);

        let mut builder = IndexBuilder::new();
        // a.txt unchanged, b.txt gone, c.txt staged new.
        builder.set(fixture.index_entry("a.txt", "a"));
        builder.set(fixture.index_entry("c.txt", "c"));
        let index = builder.build();

        let changes = diff_tree_index(fixture.odb(), &tree, &index).unwrap();
        let summary: Vec<_> = changes
            .iter()
            .map(|change| (change.path().as_internal_str().to_owned(), change.kind()))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("b.txt".to_owned(), ChangeKind::Delete),
                ("c.txt".to_owned(), ChangeKind::Insert),
            ]
        );
    }

    #[test]
    fn test_diff_index_worktree() {
        let fixture = TestOdb::new();
        let worktree = tempfile::tempdir().unwrap();
        std::fs::write(worktree.path().join("tracked.txt"), b"tracked").unwrap();
        std::fs::write(worktree.path().join("modified.txt"), b"new contents").unwrap();
        std::fs::write(worktree.path().join("untracked.txt"), b"untracked").unwrap();
        std::fs::write(worktree.path().join("ignored.log"), b"noise").unwrap();
        std::fs::write(worktree.path().join(".zetaignore"), b"*.log\n").unwrap();

        let mut builder = IndexBuilder::new();
        builder.set(fixture.index_entry("tracked.txt", "tracked"));
        builder.set(fixture.index_entry("modified.txt", "old contents"));
        builder.set(fixture.index_entry("deleted.txt", "gone"));
        let index = builder.build();

        let mut changes = diff_index_worktree(&index, worktree.path()).unwrap();
        changes.retain(|change| change.path().as_internal_str() != ".zetaignore");
        let summary: Vec<_> = changes
            .iter()
            .map(|change| (change.path().as_internal_str().to_owned(), change.kind()))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("deleted.txt".to_owned(), ChangeKind::Delete),
                ("modified.txt".to_owned(), ChangeKind::Modify),
                ("untracked.txt".to_owned(), ChangeKind::Insert),
            ]
        );
    }

    #[test]
    fn test_rearrange_orders_deletes_first() {
        let fixture = TestOdb::new();
        let changes = vec![
            Change::insert(fixture.change_item("a", "1")),
            Change::delete(fixture.change_item("B", "2")),
            Change::modify(
                fixture.change_item("c", "3"),
                fixture.change_item("c", "4"),
            ),
            Change::delete(fixture.change_item("d", "5")),
        ];
        let rearranged = rearrange_changes(changes);
        let kinds: Vec<_> = rearranged.iter().map(Change::kind).collect();
        assert_eq!(
            kinds,
            vec![
                ChangeKind::Delete,
                ChangeKind::Delete,
                ChangeKind::Insert,
                ChangeKind::Modify,
            ]
        );
    }

    #[test]
    fn test_exclude_ignored_case_rename_same_content() {
        let fixture = TestOdb::new();
        let changes = vec![
            Change::delete(fixture.change_item("README", "same")),
            Change::insert(fixture.change_item("readme", "same")),
        ];
        let excluded = exclude_ignored_changes(changes, true, false);
        assert!(excluded.is_empty());
    }

    #[test]
    fn test_exclude_ignored_case_rename_with_modification() {
        let fixture = TestOdb::new();
        let changes = vec![
            Change::delete(fixture.change_item("README", "old")),
            Change::insert(fixture.change_item("readme", "new")),
        ];
        let excluded = exclude_ignored_changes(changes, true, false);
        assert_eq!(excluded.len(), 1);
        let change = &excluded[0];
        assert_eq!(change.kind(), ChangeKind::Modify);
        assert_eq!(change.from.as_ref().unwrap().path.as_internal_str(), "README");
        assert_eq!(change.to.as_ref().unwrap().path.as_internal_str(), "readme");
    }

    #[test]
    fn test_exclude_ignored_is_noop_on_linux() {
        let fixture = TestOdb::new();
        let changes = vec![
            Change::delete(fixture.change_item("README", "old")),
            Change::insert(fixture.change_item("readme", "new")),
        ];
        let excluded = exclude_ignored_changes(changes.clone(), false, false);
        assert_eq!(excluded, changes);
    }

    #[test]
    fn test_exclude_ignored_windows_mode_only_change() {
        let fixture = TestOdb::new();
        let mut exec = fixture.change_item("tool.sh", "content");
        exec.mode = EntryMode::Executable;
        let plain = fixture.change_item("tool.sh", "content");
        let changes = vec![Change::modify(plain.clone(), exec.clone())];
        assert!(exclude_ignored_changes(changes, false, true).is_empty());

        // Symlink/file mode flips of identical content survive, but keep the
        // recorded mode.
        let mut link = fixture.change_item("tool.sh", "content");
        link.mode = EntryMode::Symlink;
        let changes = vec![Change::modify(link.clone(), plain)];
        let excluded = exclude_ignored_changes(changes, false, true);
        assert_eq!(excluded.len(), 1);
        assert_eq!(excluded[0].to.as_ref().unwrap().mode, EntryMode::Symlink);
    }
}
