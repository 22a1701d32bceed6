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

//! Working-tree operations: checkout, reset, clean, rename, commit, grep.
//!
//! Checkout runs in two phases: reconcile the index to the target tree, then
//! reconcile the worktree to the index. File materialization fans out over a
//! bounded worker pool; the pool always joins before the index is persisted,
//! so the final index is a deterministic function of the target tree.

use std::fs;
use std::io;
use std::io::Read as _;
use std::io::Write as _;
use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::mpsc;
use std::thread;

use regex::Regex;
use thiserror::Error;

use crate::cancel::CancellationToken;
use crate::diff::Change;
use crate::diff::ChangeItem;
use crate::diff::ChangeKind;
use crate::diff::DiffError;
use crate::diff::PathMatcher;
use crate::diff::diff_index_worktree;
use crate::diff::diff_tree_index;
use crate::diff::diff_trees;
use crate::diff::exclude_ignored_changes;
use crate::diff::flatten_tree;
use crate::diff::mtime_millis;
use crate::diff::rearrange_changes;
use crate::file_util::IoResultExt as _;
use crate::file_util::PathError;
use crate::file_util::try_symlink;
use crate::hash_id::HashID;
use crate::index::IndexBuilder;
use crate::index::IndexEntry;
use crate::index::IndexError;
use crate::object::Commit;
use crate::object::EntryMode;
use crate::object::EntryValue;
use crate::odb::OdbError;
use crate::refs::RefError;
use crate::repo::RepoError;
use crate::repo::Repository;
use crate::repo_path::RepoPath;
use crate::repo_path::RepoPathBuf;
use crate::repo_path::UnsafePathError;
use crate::tree_builder::TreeBuilder;

/// Size of the checkout worker pool.
const CHECKOUT_WORKERS: usize = 8;

/// Depth of the bounded channel feeding the pool.
const CHECKOUT_QUEUE_DEPTH: usize = 20;

/// Longest symlink target read from a blob.
const SYMLINK_TARGET_MAX: u64 = 32 << 10;

/// Whether the host filesystem is (assumed) case-insensitive.
const CASE_INSENSITIVE_FS: bool = cfg!(any(windows, target_os = "macos"));

#[derive(Debug, Error)]
pub enum WorktreeError {
    #[error("{}", overwrite_message(paths))]
    Aborting { paths: Vec<RepoPathBuf> },
    #[error("You have unstaged changes. Please commit or discard them first.")]
    UnstagedChanges,
    #[error("Nothing to commit (use --allow-empty to override)")]
    NothingToCommit,
    #[error("Path {0:?} is not tracked")]
    NotTracked(String),
    #[error("Destination {0:?} already exists")]
    DestinationExists(String),
    #[error("Operation cancelled")]
    Cancelled,
    #[error(transparent)]
    InvalidPath(#[from] UnsafePathError),
    #[error(transparent)]
    Path(#[from] PathError),
    #[error(transparent)]
    Odb(#[from] OdbError),
    #[error(transparent)]
    Diff(#[from] DiffError),
    #[error(transparent)]
    Index(#[from] IndexError),
    #[error(transparent)]
    Ref(#[from] RefError),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

fn overwrite_message(paths: &[RepoPathBuf]) -> String {
    let mut message =
        String::from("Your local changes to the following files would be overwritten by checkout:");
    for path in paths {
        message.push_str("\n    ");
        message.push_str(path.as_internal_str());
    }
    message.push_str("\nPlease commit your changes or discard them before you switch branches.");
    message
}

#[derive(Clone, Debug, Default)]
pub struct CheckoutOptions {
    /// Skip the overwrite safety check.
    pub force: bool,
    /// The worktree is known to be empty (fresh clone); skip the safety
    /// check and the deletion pass.
    pub first_time: bool,
    pub cancel: CancellationToken,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CheckoutStats {
    pub updated_files: u32,
    pub added_files: u32,
    pub removed_files: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResetMode {
    /// Move HEAD only.
    Soft,
    /// Move HEAD and reset the index, unless unstaged changes exist.
    Mixed,
    /// Like hard, but refuse when unstaged changes exist.
    Merge,
    /// Reset index and worktree unconditionally.
    Hard,
}

/// What `reset` observed. `unstaged` is only populated in mixed mode when
/// the index was left untouched.
#[derive(Clone, Debug, Default)]
pub struct ResetOutcome {
    pub unstaged: Vec<RepoPathBuf>,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct CleanOptions {
    pub dry_run: bool,
    /// Also remove now-empty parent directories.
    pub directories: bool,
}

/// Staging and worktree changes, as shown by `status`.
#[derive(Clone, Debug)]
pub struct StatusReport {
    /// HEAD tree vs. index.
    pub staged: Vec<Change>,
    /// Index vs. worktree.
    pub unstaged: Vec<Change>,
}

#[derive(Clone, Debug)]
pub struct CommitOptions {
    pub message: String,
    pub allow_empty: bool,
    pub amend: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GrepMatch {
    pub path: RepoPathBuf,
    pub line_number: usize,
    pub line: String,
}

impl Repository {
    /// Computes the two diff unions `status` and the checkout safety check
    /// share: HEAD-vs-index and index-vs-worktree.
    pub fn status(&self) -> Result<StatusReport, WorktreeError> {
        let head_tree = self.head_tree()?;
        let index = self.index()?;
        let staged = diff_tree_index(self.odb(), &head_tree, &index)?;
        let unstaged = diff_index_worktree(&index, self.root())?;
        Ok(StatusReport { staged, unstaged })
    }

    /// Checks out the tree of `target` (a commit or annotated tag).
    ///
    /// The default mode refuses to overwrite local modifications; `force`
    /// and `first_time` skip the safety check. HEAD is not moved here; the
    /// caller updates references.
    pub fn checkout(
        &self,
        target: &HashID,
        options: &CheckoutOptions,
    ) -> Result<CheckoutStats, WorktreeError> {
        let commit = self.odb().parse_rev_exhaustive(target)?;
        let target_tree = commit.tree;
        if !(options.force || options.first_time) {
            let head_tree = self.head_tree()?;
            self.check_overwrite_safety(&head_tree, &target_tree)?;
        }
        let stats = self.reset_index_and_worktree(&target_tree, &options.cancel)?;
        tracing::debug!(
            updated = stats.updated_files,
            added = stats.added_files,
            removed = stats.removed_files,
            "checkout complete"
        );
        Ok(stats)
    }

    /// The safety check behind the default checkout: the set of paths that
    /// differ between the current and target trees must not overlap the set
    /// of paths with local modifications.
    fn check_overwrite_safety(
        &self,
        head_tree: &HashID,
        target_tree: &HashID,
    ) -> Result<(), WorktreeError> {
        let status = self.status()?;
        let mut local: Vec<&RepoPath> = status
            .staged
            .iter()
            .chain(status.unstaged.iter())
            .map(Change::path)
            .collect();
        local.sort();
        local.dedup();
        if local.is_empty() {
            return Ok(());
        }

        let changed = diff_trees(self.odb(), head_tree, target_tree, &PathMatcher::everything())?;
        let mut overwritten: Vec<RepoPathBuf> = changed
            .iter()
            .map(Change::path)
            .filter(|path| local.binary_search(path).is_ok())
            .map(|path| path.to_owned())
            .collect();
        if overwritten.is_empty() {
            return Ok(());
        }
        overwritten.sort();
        overwritten.dedup();
        Err(WorktreeError::Aborting { paths: overwritten })
    }

    /// Reconciles the index to `target_tree`, then the worktree to the
    /// index. Deletions apply first; insertions and modifications fan out
    /// over the worker pool.
    fn reset_index_and_worktree(
        &self,
        target_tree: &HashID,
        cancel: &CancellationToken,
    ) -> Result<CheckoutStats, WorktreeError> {
        let target_files = flatten_tree(self.odb(), target_tree)?;
        let index = self.index()?;

        // Index state vs. target tree, keeping the target entry's inline
        // payload for materialization.
        let mut changes: Vec<Change> = vec![];
        let mut target_iter = target_files.into_iter().peekable();
        let mut index_iter = index.entries().iter().peekable();
        loop {
            let (index_entry, target_entry) = match (index_iter.peek(), target_iter.peek()) {
                (None, None) => break,
                (Some(_), None) => (index_iter.next(), None),
                (None, Some(_)) => (None, target_iter.next()),
                (Some(entry), Some((path, _))) => match entry.path.cmp(path) {
                    std::cmp::Ordering::Less => (index_iter.next(), None),
                    std::cmp::Ordering::Greater => (None, target_iter.next()),
                    std::cmp::Ordering::Equal => (index_iter.next(), target_iter.next()),
                },
            };
            match (index_entry, target_entry) {
                (Some(entry), None) => {
                    changes.push(Change::delete(ChangeItem::from_index_entry(entry)));
                }
                (None, Some((path, value))) => {
                    changes.push(Change::insert(ChangeItem::from_value(path, value)));
                }
                (Some(entry), Some((path, value))) => {
                    if entry.hash != value.hash || entry.mode != value.mode {
                        changes.push(Change::modify(
                            ChangeItem::from_index_entry(entry),
                            ChangeItem::from_value(path, value),
                        ));
                    }
                }
                (None, None) => unreachable!(),
            }
        }
        let changes = rearrange_changes(changes);
        let changes = exclude_ignored_changes(changes, CASE_INSENSITIVE_FS, cfg!(windows));

        let mut stats = CheckoutStats::default();
        let mut builder = index.into_builder();
        let mut to_materialize = vec![];
        for change in changes {
            if cancel.is_cancelled() {
                return Err(WorktreeError::Cancelled);
            }
            match change.kind() {
                ChangeKind::Delete => {
                    let item = change.from.unwrap();
                    self.remove_worktree_file(&item.path)?;
                    builder.remove(&item.path);
                    stats.removed_files += 1;
                }
                ChangeKind::Insert => {
                    stats.added_files += 1;
                    to_materialize.push(change.to.unwrap());
                }
                ChangeKind::Modify => {
                    stats.updated_files += 1;
                    to_materialize.push(change.to.unwrap());
                }
            }
        }

        let entries = self.materialize_parallel(to_materialize, cancel)?;
        for entry in entries {
            builder.set(entry);
        }
        self.set_index(&builder.build())?;
        Ok(stats)
    }

    fn remove_worktree_file(&self, path: &RepoPath) -> Result<(), WorktreeError> {
        let disk_path = path.to_fs_path(self.root())?;
        match fs::remove_file(&disk_path) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(source) => {
                return Err(PathError {
                    path: disk_path,
                    source,
                }
                .into());
            }
        }
        // Prune now-empty parent directories up to the worktree root.
        let mut parent = disk_path.parent();
        while let Some(dir) = parent {
            if dir == self.root() || fs::remove_dir(dir).is_err() {
                break;
            }
            parent = dir.parent();
        }
        Ok(())
    }

    /// Fans `items` out to a bounded pool of worker threads, each consuming
    /// from a bounded channel. Workers report completed index entries via a
    /// mutex-protected sink and errors via a dedicated channel that the
    /// producer polls before every enqueue, so it fails fast. All workers
    /// have returned before this function does.
    fn materialize_parallel(
        &self,
        items: Vec<ChangeItem>,
        cancel: &CancellationToken,
    ) -> Result<Vec<IndexEntry>, WorktreeError> {
        if items.is_empty() {
            return Ok(vec![]);
        }
        let (err_tx, err_rx) = mpsc::channel::<WorktreeError>();
        let results = Mutex::new(Vec::with_capacity(items.len()));

        let submit_error = thread::scope(|scope| {
            let (work_tx, work_rx) = mpsc::sync_channel::<ChangeItem>(CHECKOUT_QUEUE_DEPTH);
            let work_rx = Arc::new(Mutex::new(work_rx));
            for _ in 0..CHECKOUT_WORKERS {
                let work_rx = Arc::clone(&work_rx);
                let err_tx = err_tx.clone();
                let cancel = cancel.clone();
                let results = &results;
                scope.spawn(move || {
                    loop {
                        let item = {
                            let rx = work_rx.lock().unwrap();
                            match rx.recv() {
                                Ok(item) => item,
                                Err(_) => break,
                            }
                        };
                        if cancel.is_cancelled() {
                            let _ = err_tx.send(WorktreeError::Cancelled);
                            break;
                        }
                        match self.materialize_entry(&item) {
                            Ok(entry) => results.lock().unwrap().push(entry),
                            Err(err) => {
                                let _ = err_tx.send(err);
                                break;
                            }
                        }
                    }
                });
            }
            drop(err_tx);
            // Workers hold their own receiver handles; dropping ours makes a
            // send fail (instead of block) once every worker has exited.
            drop(work_rx);

            let mut submit_error = None;
            for item in items {
                if cancel.is_cancelled() {
                    submit_error = Some(WorktreeError::Cancelled);
                    break;
                }
                // Preselect the error channel: stop enqueuing as soon as any
                // worker has failed.
                if let Ok(err) = err_rx.try_recv() {
                    submit_error = Some(err);
                    break;
                }
                if work_tx.send(item).is_err() {
                    // Every worker exited; the error is in the channel.
                    break;
                }
            }
            drop(work_tx);
            submit_error
        });

        if let Some(err) = submit_error {
            return Err(err);
        }
        if let Ok(err) = err_rx.try_recv() {
            return Err(err);
        }
        if cancel.is_cancelled() {
            return Err(WorktreeError::Cancelled);
        }
        Ok(results.into_inner().unwrap())
    }

    /// Writes one worktree file from its tree entry and returns the index
    /// entry recording it. On failure the partially written file is removed.
    /// A missing object in missing-not-failure mode yields a pseudo entry
    /// with no file, so future commands still see the tracked path.
    fn materialize_entry(&self, item: &ChangeItem) -> Result<IndexEntry, WorktreeError> {
        let disk_path = item.path.to_fs_path(self.root())?;
        if let Some(parent) = disk_path.parent() {
            fs::create_dir_all(parent).context(parent)?;
        }
        match fs::remove_file(&disk_path) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(source) => {
                return Err(PathError {
                    path: disk_path,
                    source,
                }
                .into());
            }
        }

        match self.write_entry_content(item, &disk_path) {
            Ok(entry) => Ok(entry),
            Err(err) => {
                let _ = fs::remove_file(&disk_path);
                if matches!(err, WorktreeError::Odb(OdbError::NoSuchObject(_)))
                    && self.config().missing_not_failure()
                {
                    return Ok(IndexEntry {
                        path: item.path.clone(),
                        hash: item.hash,
                        mode: item.mode,
                        size: item.size,
                        mtime_millis: 0,
                    });
                }
                Err(err)
            }
        }
    }

    fn write_entry_content(
        &self,
        item: &ChangeItem,
        disk_path: &Path,
    ) -> Result<IndexEntry, WorktreeError> {
        let metadata = match item.mode {
            EntryMode::Symlink => {
                let target = match &item.payload {
                    Some(payload) if !payload.is_empty() => {
                        String::from_utf8_lossy(payload).into_owned()
                    }
                    _ => {
                        let blob = self.odb().blob(&item.hash)?;
                        let mut text = String::new();
                        blob.into_reader()
                            .take(SYMLINK_TARGET_MAX)
                            .read_to_string(&mut text)
                            .context(disk_path)?;
                        text
                    }
                };
                match try_symlink(Path::new(&target), disk_path) {
                    Ok(()) => {}
                    Err(_) if !crate::file_util::check_symlink_support().unwrap_or(true) => {
                        // No symlink privilege; degrade to a regular file
                        // holding the target text.
                        fs::write(disk_path, target.as_bytes()).context(disk_path)?;
                    }
                    Err(source) => {
                        return Err(PathError {
                            path: disk_path.to_path_buf(),
                            source,
                        }
                        .into());
                    }
                }
                disk_path.symlink_metadata().context(disk_path)?
            }
            EntryMode::Regular | EntryMode::Executable => {
                let mut file = fs::OpenOptions::new()
                    .write(true)
                    .create_new(true) // Don't follow a racing symlink.
                    .open(disk_path)
                    .context(disk_path)?;
                match &item.payload {
                    Some(payload) => file.write_all(payload).context(disk_path)?,
                    None => {
                        let blob = self.odb().blob(&item.hash)?;
                        let mut reader = blob.into_reader();
                        io::copy(&mut reader, &mut file).context(disk_path)?;
                    }
                }
                file.flush().context(disk_path)?;
                set_executable(&file, item.mode == EntryMode::Executable, disk_path)?;
                file.metadata().context(disk_path)?
            }
            EntryMode::Fragments => {
                // Stream-concatenate the referenced blobs in manifest order.
                let fragments = self.odb().fragments(&item.hash)?;
                let mut file = fs::OpenOptions::new()
                    .write(true)
                    .create_new(true)
                    .open(disk_path)
                    .context(disk_path)?;
                for entry in &fragments.entries {
                    let blob = self.odb().blob(&entry.hash)?;
                    let mut reader = blob.into_reader();
                    io::copy(&mut reader, &mut file).context(disk_path)?;
                }
                file.flush().context(disk_path)?;
                file.metadata().context(disk_path)?
            }
            EntryMode::Dir => unreachable!("directories are never materialization items"),
        };

        Ok(IndexEntry {
            path: item.path.clone(),
            hash: item.hash,
            mode: item.mode,
            size: metadata.len(),
            mtime_millis: mtime_millis(&metadata),
        })
    }

    /// Moves HEAD (and, depending on the mode, the index and worktree) to
    /// `target`.
    pub fn reset(
        &self,
        target: &HashID,
        mode: ResetMode,
        cancel: &CancellationToken,
    ) -> Result<ResetOutcome, WorktreeError> {
        let target_commit_id = self.odb().peel_to_commit_id(target)?;
        let commit = self.odb().commit(&target_commit_id)?;
        let committer = self.committer_signature();
        let message = format!("reset: moving to {}", target.hex());

        match mode {
            ResetMode::Soft => {
                self.refs().reset_head(target_commit_id, &committer, &message)?;
                Ok(ResetOutcome::default())
            }
            ResetMode::Mixed => {
                self.refs().reset_head(target_commit_id, &committer, &message)?;
                let index = self.index()?;
                let unstaged = diff_index_worktree(&index, self.root())?;
                if !unstaged.is_empty() {
                    // Leave the index alone; report what was unstaged.
                    return Ok(ResetOutcome {
                        unstaged: unstaged
                            .iter()
                            .map(|change| change.path().to_owned())
                            .collect(),
                    });
                }
                self.reset_index_to_tree(&commit.tree)?;
                Ok(ResetOutcome::default())
            }
            ResetMode::Merge => {
                let index = self.index()?;
                let unstaged = diff_index_worktree(&index, self.root())?;
                if !unstaged.is_empty() {
                    return Err(WorktreeError::UnstagedChanges);
                }
                self.refs().reset_head(target_commit_id, &committer, &message)?;
                self.reset_index_and_worktree(&commit.tree, cancel)?;
                Ok(ResetOutcome::default())
            }
            ResetMode::Hard => {
                self.refs().reset_head(target_commit_id, &committer, &message)?;
                self.reset_index_and_worktree(&commit.tree, cancel)?;
                Ok(ResetOutcome::default())
            }
        }
    }

    /// Rebuilds the index from a tree without touching the worktree.
    fn reset_index_to_tree(&self, tree_id: &HashID) -> Result<(), WorktreeError> {
        let files = flatten_tree(self.odb(), tree_id)?;
        let mut builder = IndexBuilder::new();
        for (path, value) in files {
            builder.set(IndexEntry {
                path,
                hash: value.hash,
                mode: value.mode,
                size: value.size,
                mtime_millis: 0,
            });
        }
        self.set_index(&builder.build())?;
        Ok(())
    }

    /// Stages worktree changes into the index: modified and untracked files
    /// are hashed into the object store, deleted files drop out. `paths`
    /// restricts the operation; an empty slice stages everything. Returns
    /// the staged paths.
    pub fn stage(&self, paths: &[RepoPathBuf]) -> Result<Vec<RepoPathBuf>, WorktreeError> {
        let matcher = if paths.is_empty() {
            PathMatcher::everything()
        } else {
            PathMatcher::prefixes(paths.to_vec())
        };
        let index = self.index()?;
        let changes = diff_index_worktree(&index, self.root())?;
        let mut builder = index.into_builder();
        let mut staged = vec![];
        for change in changes {
            let path = change.path();
            if !matcher.matches(path) {
                continue;
            }
            match change.kind() {
                ChangeKind::Delete => builder.remove(path),
                ChangeKind::Insert | ChangeKind::Modify => {
                    let item = change.to.as_ref().unwrap();
                    let disk_path = path.to_fs_path(self.root())?;
                    let hash = if item.mode == EntryMode::Symlink {
                        let target = disk_path.read_link().context(&disk_path)?;
                        self.odb()
                            .write_blob_bytes(target.to_string_lossy().as_bytes())?
                    } else {
                        let mut file = fs::File::open(&disk_path).context(&disk_path)?;
                        let size = file.metadata().context(&disk_path)?.len();
                        self.odb().write_blob_stream(size, &mut file)?
                    };
                    let metadata = disk_path.symlink_metadata().context(&disk_path)?;
                    builder.set(IndexEntry {
                        path: path.to_owned(),
                        hash,
                        mode: item.mode,
                        size: metadata.len(),
                        mtime_millis: mtime_millis(&metadata),
                    });
                }
            }
            staged.push(path.to_owned());
        }
        self.set_index(&builder.build())?;
        staged.sort();
        Ok(staged)
    }

    /// Removes untracked files. Returns the removed (or, in dry-run mode,
    /// would-be-removed) paths.
    pub fn clean(&self, options: &CleanOptions) -> Result<Vec<RepoPathBuf>, WorktreeError> {
        let index = self.index()?;
        let changes = diff_index_worktree(&index, self.root())?;
        let mut removed = vec![];
        for change in changes {
            if change.kind() != ChangeKind::Insert {
                continue;
            }
            let path = change.path().to_owned();
            if !options.dry_run {
                let disk_path = path.to_fs_path(self.root())?;
                fs::remove_file(&disk_path).context(&disk_path)?;
                if options.directories {
                    let mut parent = disk_path.parent();
                    while let Some(dir) = parent {
                        if dir == self.root() || fs::remove_dir(dir).is_err() {
                            break;
                        }
                        parent = dir.parent();
                    }
                }
            }
            removed.push(path);
        }
        removed.sort();
        Ok(removed)
    }

    /// Renames a tracked file on disk and in the index.
    pub fn rename(
        &self,
        from: &RepoPath,
        to: &RepoPath,
        force: bool,
    ) -> Result<(), WorktreeError> {
        let index = self.index()?;
        let Some(entry) = index.get(from) else {
            return Err(WorktreeError::NotTracked(from.as_internal_str().to_owned()));
        };
        let entry = entry.clone();
        let to_disk = to.to_fs_path(self.root())?;
        if !force && (index.get(to).is_some() || to_disk.symlink_metadata().is_ok()) {
            return Err(WorktreeError::DestinationExists(
                to.as_internal_str().to_owned(),
            ));
        }
        let from_disk = from.to_fs_path(self.root())?;
        if let Some(parent) = to_disk.parent() {
            fs::create_dir_all(parent).context(parent)?;
        }
        fs::rename(&from_disk, &to_disk).context(&from_disk)?;

        let metadata = to_disk.symlink_metadata().context(&to_disk)?;
        let mut builder = index.into_builder();
        builder.remove(from);
        builder.set(IndexEntry {
            path: to.to_owned(),
            hash: entry.hash,
            mode: entry.mode,
            size: entry.size,
            mtime_millis: mtime_millis(&metadata),
        });
        self.set_index(&builder.build())?;
        Ok(())
    }

    /// Builds a commit from the index: requires at least one staged change
    /// (unless allowed empty), writes the tree, constructs the commit with
    /// the current HEAD as parent (or the amended commit's parents), appends
    /// a reflog record, and CAS-advances HEAD. Committing on an unborn HEAD
    /// creates the target branch.
    pub fn commit(&self, options: &CommitOptions) -> Result<(HashID, Commit), WorktreeError> {
        let head = self.refs().head_commit()?;
        let head_tree = self.head_tree()?;
        let index = self.index()?;
        let staged = diff_tree_index(self.odb(), &head_tree, &index)?;
        if staged.is_empty() && !options.allow_empty && !options.amend {
            return Err(WorktreeError::NothingToCommit);
        }

        let mut builder = TreeBuilder::new(self.odb(), *self.odb().empty_tree_id());
        for entry in index.entries() {
            builder.set(
                entry.path.clone(),
                EntryValue {
                    mode: entry.mode,
                    hash: entry.hash,
                    size: entry.size,
                    payload: None,
                },
            );
        }
        let tree = builder.write_tree()?;

        let parents = match (options.amend, head) {
            (true, Some(head_id)) => self.odb().commit(&head_id)?.parents,
            (false, Some(head_id)) => vec![head_id],
            (_, None) => vec![],
        };
        let commit = Commit {
            tree,
            parents,
            author: self.author_signature(),
            committer: self.committer_signature(),
            extra_headers: vec![],
            message: options.message.clone(),
        };
        let commit_id = self.odb().write_object(&commit)?;

        let reflog_message = if options.amend {
            format!("commit (amend): {}", commit.subject())
        } else {
            format!("commit: {}", commit.subject())
        };
        self.refs()
            .reset_head(commit_id, &commit.committer, &reflog_message)?;
        tracing::info!(commit = %commit_id, subject = commit.subject(), "created commit");
        Ok((commit_id, commit))
    }

    /// Searches tracked file contents for `pattern`: the worktree by
    /// default, or the tree of `rev` when given.
    pub fn grep(
        &self,
        pattern: &Regex,
        rev: Option<&HashID>,
    ) -> Result<Vec<GrepMatch>, WorktreeError> {
        use rayon::prelude::*;

        enum Source {
            Worktree(RepoPathBuf),
            Blob(RepoPathBuf, HashID),
        }

        let sources: Vec<Source> = match rev {
            Some(rev) => {
                let tree = self.odb().parse_rev_exhaustive(rev)?.tree;
                flatten_tree(self.odb(), &tree)?
                    .into_iter()
                    .filter(|(_, value)| value.mode.is_regular_file())
                    .map(|(path, value)| Source::Blob(path, value.hash))
                    .collect()
            }
            None => self
                .index()?
                .entries()
                .iter()
                .filter(|entry| entry.mode.is_regular_file())
                .map(|entry| Source::Worktree(entry.path.clone()))
                .collect(),
        };

        let mut matches: Vec<GrepMatch> = sources
            .into_par_iter()
            .map(|source| -> Result<Vec<GrepMatch>, WorktreeError> {
                let (path, bytes) = match source {
                    Source::Worktree(path) => {
                        let disk_path = path.to_fs_path(self.root())?;
                        let bytes = match fs::read(&disk_path) {
                            Ok(bytes) => bytes,
                            Err(err) if err.kind() == io::ErrorKind::NotFound => vec![],
                            Err(source) => {
                                return Err(PathError {
                                    path: disk_path,
                                    source,
                                }
                                .into());
                            }
                        };
                        (path, bytes)
                    }
                    Source::Blob(path, hash) => {
                        let blob = self.odb().blob(&hash)?;
                        let bytes = blob.read_to_bytes().map_err(|source| {
                            OdbError::ReadObject { hash, source }
                        })?;
                        (path, bytes)
                    }
                };
                if crate::files::is_binary(&bytes) {
                    return Ok(vec![]);
                }
                let text = String::from_utf8_lossy(&bytes);
                Ok(text
                    .lines()
                    .enumerate()
                    .filter(|(_, line)| pattern.is_match(line))
                    .map(|(i, line)| GrepMatch {
                        path: path.clone(),
                        line_number: i + 1,
                        line: line.to_owned(),
                    })
                    .collect())
            })
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .flatten()
            .collect();
        matches.sort_by(|a, b| (&a.path, a.line_number).cmp(&(&b.path, b.line_number)));
        Ok(matches)
    }
}

#[cfg(unix)]
fn set_executable(
    file: &fs::File,
    executable: bool,
    disk_path: &Path,
) -> Result<(), WorktreeError> {
    use std::os::unix::fs::PermissionsExt as _;
    let mode = if executable { 0o755 } else { 0o644 };
    file.set_permissions(fs::Permissions::from_mode(mode))
        .context(disk_path)?;
    Ok(())
}

#[cfg(windows)]
fn set_executable(
    _file: &fs::File,
    _executable: bool,
    _disk_path: &Path,
) -> Result<(), WorktreeError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::index::Index;
    use crate::refs::HeadState;
    use crate::testing::TestRepo;

    #[test]
    fn test_first_time_checkout_materializes_tree() {
        let fixture = TestRepo::new();
        let commit = fixture.commit_files(&[("a.txt", "alpha\n"), ("dir/b.txt", "beta\n")]);
        let stats = fixture
            .repo
            .checkout(
                &commit,
                &CheckoutOptions {
                    first_time: true,
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(stats.added_files, 2);
        assert_eq!(fixture.read_file("a.txt"), "alpha\n");
        assert_eq!(fixture.read_file("dir/b.txt"), "beta\n");
        let index = fixture.repo.index().unwrap();
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn test_checkout_is_idempotent() {
        let fixture = TestRepo::new();
        let commit = fixture.commit_files(&[("a.txt", "alpha\n")]);
        fixture.checkout_first(commit);
        let stats = fixture
            .repo
            .checkout(&commit, &CheckoutOptions::default())
            .unwrap();
        assert_eq!(stats, CheckoutStats::default());
    }

    #[test]
    fn test_checkout_swaps_content() {
        let fixture = TestRepo::new();
        let first = fixture.commit_files(&[("a.txt", "one\n"), ("gone.txt", "x\n")]);
        fixture.checkout_first(first);
        let second = fixture.commit_files(&[("a.txt", "two\n"), ("new.txt", "y\n")]);

        let stats = fixture
            .repo
            .checkout(&second, &CheckoutOptions::default())
            .unwrap();
        assert_eq!(stats.updated_files, 1);
        assert_eq!(stats.added_files, 1);
        assert_eq!(stats.removed_files, 1);
        assert_eq!(fixture.read_file("a.txt"), "two\n");
        assert_eq!(fixture.read_file("new.txt"), "y\n");
        assert!(!fixture.repo.root().join("gone.txt").exists());
    }

    #[test]
    fn test_safe_checkout_refuses_overwrite() {
        let fixture = TestRepo::new();
        let first = fixture.commit_files(&[("x.txt", "committed\n")]);
        fixture.checkout_first(first);
        let second = fixture.commit_files(&[("x.txt", "target\n")]);

        fixture.write_file("x.txt", "local edit\n");
        let err = fixture
            .repo
            .checkout(&second, &CheckoutOptions::default())
            .unwrap_err();
        assert_matches!(&err, WorktreeError::Aborting { paths } if paths.len() == 1);
        let message = err.to_string();
        assert!(message.contains(
            "Your local changes to the following files would be overwritten by checkout:"
        ));
        assert!(message.contains("\n    x.txt"));
        // Nothing was touched.
        assert_eq!(fixture.read_file("x.txt"), "local edit\n");

        // Force wins.
        fixture
            .repo
            .checkout(
                &second,
                &CheckoutOptions {
                    force: true,
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(fixture.read_file("x.txt"), "target\n");
    }

    #[test]
    fn test_checkout_pool_result_is_deterministic() {
        let fixture = TestRepo::new();
        let files: Vec<(String, String)> = (0..50)
            .map(|i| (format!("dir{}/file{i}.txt", i % 7), format!("contents {i}\n")))
            .collect();
        let files_ref: Vec<(&str, &str)> = files
            .iter()
            .map(|(path, contents)| (path.as_str(), contents.as_str()))
            .collect();
        let commit = fixture.commit_files(&files_ref);
        fixture.checkout_first(commit);
        let index_a = fixture.repo.index().unwrap();

        // A second repository checking out the same tree gets the same index
        // regardless of worker interleaving.
        let other = TestRepo::new();
        let commit_b = other.commit_files(&files_ref);
        other.checkout_first(commit_b);
        let index_b = other.repo.index().unwrap();

        let shape = |index: &Index| {
            index
                .entries()
                .iter()
                .map(|entry| (entry.path.clone(), entry.hash, entry.mode, entry.size))
                .collect::<Vec<_>>()
        };
        assert_eq!(shape(&index_a), shape(&index_b));
    }

    #[test]
    fn test_checkout_cancellation() {
        let fixture = TestRepo::new();
        let commit = fixture.commit_files(&[("a.txt", "alpha\n")]);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = fixture
            .repo
            .checkout(
                &commit,
                &CheckoutOptions {
                    first_time: true,
                    cancel,
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert_matches!(err, WorktreeError::Cancelled);
    }

    #[test]
    fn test_reset_soft_moves_head_only() {
        let fixture = TestRepo::new();
        let first = fixture.commit_files(&[("a.txt", "one\n")]);
        fixture.checkout_first(first);
        let second = fixture.commit_files(&[("a.txt", "two\n")]);
        fixture
            .repo
            .checkout(&second, &CheckoutOptions::default())
            .unwrap();

        fixture
            .repo
            .reset(&first, ResetMode::Soft, &CancellationToken::new())
            .unwrap();
        assert_eq!(fixture.repo.refs().head_commit().unwrap(), Some(first));
        // Worktree and index still at `second`.
        assert_eq!(fixture.read_file("a.txt"), "two\n");
        let staged = fixture.repo.status().unwrap().staged;
        assert_eq!(staged.len(), 1);
    }

    #[test]
    fn test_reset_mixed_reports_unstaged() {
        let fixture = TestRepo::new();
        let first = fixture.commit_files(&[("a.txt", "one\n")]);
        fixture.checkout_first(first);
        let second = fixture.commit_files(&[("a.txt", "two\n")]);
        fixture
            .repo
            .checkout(&second, &CheckoutOptions::default())
            .unwrap();

        // Dirty worktree: mixed reset moves HEAD but leaves the index.
        fixture.write_file("a.txt", "dirty\n");
        let index_before = fixture.repo.index().unwrap();
        let outcome = fixture
            .repo
            .reset(&first, ResetMode::Mixed, &CancellationToken::new())
            .unwrap();
        assert_eq!(outcome.unstaged.len(), 1);
        assert_eq!(outcome.unstaged[0].as_internal_str(), "a.txt");
        assert_eq!(fixture.repo.index().unwrap(), index_before);

        // Clean worktree: the index is rebuilt from the target tree.
        fixture.write_file("a.txt", "two\n");
        let outcome = fixture
            .repo
            .reset(&first, ResetMode::Mixed, &CancellationToken::new())
            .unwrap();
        assert!(outcome.unstaged.is_empty());
        let index = fixture.repo.index().unwrap();
        let path = crate::repo_path::RepoPath::from_internal_string("a.txt").unwrap();
        assert_eq!(index.get(path).unwrap().hash, fixture.blob("one\n"));
    }

    #[test]
    fn test_reset_merge_refuses_unstaged() {
        let fixture = TestRepo::new();
        let first = fixture.commit_files(&[("a.txt", "one\n")]);
        fixture.checkout_first(first);
        fixture.write_file("a.txt", "dirty\n");
        assert_matches!(
            fixture
                .repo
                .reset(&first, ResetMode::Merge, &CancellationToken::new()),
            Err(WorktreeError::UnstagedChanges)
        );
    }

    #[test]
    fn test_reset_hard_restores_everything() {
        let fixture = TestRepo::new();
        let first = fixture.commit_files(&[("a.txt", "one\n")]);
        fixture.checkout_first(first);
        let second = fixture.commit_files(&[("a.txt", "two\n")]);
        fixture
            .repo
            .checkout(&second, &CheckoutOptions::default())
            .unwrap();
        fixture.write_file("a.txt", "dirty\n");

        fixture
            .repo
            .reset(&first, ResetMode::Hard, &CancellationToken::new())
            .unwrap();
        assert_eq!(fixture.read_file("a.txt"), "one\n");
        assert_eq!(fixture.repo.refs().head_commit().unwrap(), Some(first));
        let status = fixture.repo.status().unwrap();
        assert!(status.staged.is_empty());
        assert!(status.unstaged.is_empty());
    }

    #[test]
    fn test_stage_tracks_and_untracks() {
        let fixture = TestRepo::new();
        let commit = fixture.commit_files(&[("keep.txt", "k\n"), ("gone.txt", "g\n")]);
        fixture.checkout_first(commit);
        fixture.write_file("new.txt", "n\n");
        fixture.write_file("keep.txt", "edited\n");
        fs::remove_file(fixture.repo.root().join("gone.txt")).unwrap();

        // Restricting by path stages only that file.
        let only_new = vec![crate::repo_path::RepoPathBuf::from_internal_string("new.txt").unwrap()];
        let staged = fixture.repo.stage(&only_new).unwrap();
        assert_eq!(staged, only_new);
        let status = fixture.repo.status().unwrap();
        assert_eq!(status.staged.len(), 1);

        // Staging everything picks up the edit and the deletion too.
        let staged = fixture.repo.stage(&[]).unwrap();
        assert_eq!(staged.len(), 2);
        let status = fixture.repo.status().unwrap();
        assert!(status.unstaged.is_empty());
        assert_eq!(status.staged.len(), 3);
        let index = fixture.repo.index().unwrap();
        let keep = crate::repo_path::RepoPath::from_internal_string("keep.txt").unwrap();
        assert_eq!(index.get(keep).unwrap().hash, fixture.blob("edited\n"));
        assert!(
            index
                .get(crate::repo_path::RepoPath::from_internal_string("gone.txt").unwrap())
                .is_none()
        );
    }

    #[test]
    fn test_clean_removes_untracked() {
        let fixture = TestRepo::new();
        let commit = fixture.commit_files(&[("tracked.txt", "t\n")]);
        fixture.checkout_first(commit);
        fixture.write_file("junk.txt", "j\n");
        fixture.write_file("build/out.o", "o\n");

        let removed = fixture
            .repo
            .clean(&CleanOptions {
                dry_run: true,
                directories: false,
            })
            .unwrap();
        assert_eq!(removed.len(), 2);
        assert!(fixture.repo.root().join("junk.txt").exists());

        let removed = fixture
            .repo
            .clean(&CleanOptions {
                dry_run: false,
                directories: true,
            })
            .unwrap();
        assert_eq!(removed.len(), 2);
        assert!(!fixture.repo.root().join("junk.txt").exists());
        assert!(!fixture.repo.root().join("build").exists());
        assert!(fixture.repo.root().join("tracked.txt").exists());
    }

    #[test]
    fn test_rename_updates_disk_and_index() {
        let fixture = TestRepo::new();
        let commit = fixture.commit_files(&[("old.txt", "contents\n")]);
        fixture.checkout_first(commit);

        let from = crate::repo_path::RepoPath::from_internal_string("old.txt").unwrap();
        let to = crate::repo_path::RepoPath::from_internal_string("sub/new.txt").unwrap();
        fixture.repo.rename(from, to, false).unwrap();
        assert!(!fixture.repo.root().join("old.txt").exists());
        assert_eq!(fixture.read_file("sub/new.txt"), "contents\n");
        let index = fixture.repo.index().unwrap();
        assert!(index.get(from).is_none());
        assert!(index.get(to).is_some());

        assert_matches!(
            fixture.repo.rename(to, to, false),
            Err(WorktreeError::DestinationExists(_))
        );
        assert_matches!(
            fixture.repo.rename(from, to, false),
            Err(WorktreeError::NotTracked(_))
        );
    }

    #[test]
    fn test_commit_on_unborn_head_creates_branch() {
        let fixture = TestRepo::new();
        assert_matches!(
            fixture.repo.refs().head_state().unwrap(),
            HeadState::Unborn(_)
        );
        fixture.stage_file("a.txt", "contents\n");

        let (commit_id, commit) = fixture
            .repo
            .commit(&CommitOptions {
                message: "initial commit\n".to_owned(),
                allow_empty: false,
                amend: false,
            })
            .unwrap();
        assert!(commit.parents.is_empty());
        assert_matches!(
            fixture.repo.refs().head_state().unwrap(),
            HeadState::OnBranch(name) if name == "mainline"
        );
        assert_eq!(fixture.repo.refs().head_commit().unwrap(), Some(commit_id));
        let reflog = fixture
            .repo
            .refs()
            .read_reflog("refs/heads/mainline")
            .unwrap();
        assert_eq!(reflog.len(), 1);
        assert_eq!(reflog[0].message, "commit: initial commit");
    }

    #[test]
    fn test_commit_requires_staged_changes() {
        let fixture = TestRepo::new();
        let first = fixture.commit_files(&[("a.txt", "one\n")]);
        fixture.checkout_first(first);

        assert_matches!(
            fixture.repo.commit(&CommitOptions {
                message: "empty\n".to_owned(),
                allow_empty: false,
                amend: false,
            }),
            Err(WorktreeError::NothingToCommit)
        );
        let (commit_id, commit) = fixture
            .repo
            .commit(&CommitOptions {
                message: "empty\n".to_owned(),
                allow_empty: true,
                amend: false,
            })
            .unwrap();
        assert_eq!(commit.parents.len(), 1);
        assert_eq!(fixture.repo.refs().head_commit().unwrap(), Some(commit_id));
    }

    #[test]
    fn test_commit_amend_replaces_tip() {
        let fixture = TestRepo::new();
        fixture.stage_file("a.txt", "one\n");
        let (first, _) = fixture
            .repo
            .commit(&CommitOptions {
                message: "first\n".to_owned(),
                allow_empty: false,
                amend: false,
            })
            .unwrap();

        fixture.stage_file("a.txt", "amended\n");
        let (amended, commit) = fixture
            .repo
            .commit(&CommitOptions {
                message: "first, amended\n".to_owned(),
                allow_empty: false,
                amend: true,
            })
            .unwrap();
        assert_ne!(amended, first);
        assert!(commit.parents.is_empty());
        assert_eq!(fixture.repo.refs().head_commit().unwrap(), Some(amended));
    }

    #[test]
    fn test_grep_worktree_and_tree() {
        let fixture = TestRepo::new();
        let commit = fixture.commit_files(&[
            ("src/main.rs", "fn main() {\n    run();\n}\n"),
            ("README.md", "run the tool\n"),
        ]);
        fixture.checkout_first(commit);

        let pattern = Regex::new(r"run").unwrap();
        let matches = fixture.repo.grep(&pattern, None).unwrap();
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].path.as_internal_str(), "README.md");
        assert_eq!(matches[1].path.as_internal_str(), "src/main.rs");
        assert_eq!(matches[1].line_number, 2);

        let matches = fixture.repo.grep(&pattern, Some(&commit)).unwrap();
        assert_eq!(matches.len(), 2);
    }

    #[test]
    fn test_missing_object_mode_records_pseudo_entry() {
        let mut fixture = TestRepo::new();
        let commit = fixture.commit_files(&[("present.txt", "here\n"), ("lazy.bin", "big\n")]);
        // Simulate a partial clone: drop the blob behind lazy.bin.
        let lazy_blob = fixture.blob("big\n");
        let hex = lazy_blob.hex();
        let loose = fixture
            .repo
            .zeta_dir()
            .join("objects")
            .join(&hex[..2])
            .join(&hex[2..]);
        fs::remove_file(loose).unwrap();

        // Eager mode propagates the miss.
        let err = fixture
            .repo
            .checkout(
                &commit,
                &CheckoutOptions {
                    first_time: true,
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert_matches!(err, WorktreeError::Odb(OdbError::NoSuchObject(_)));

        // Missing-not-failure mode records a pseudo entry with no file.
        let mut config = fixture.repo.config().clone();
        config.optimize_strategy = crate::config::OptimizeStrategy::OneAfterAnother;
        fixture.repo.set_config(config);
        fixture
            .repo
            .checkout(
                &commit,
                &CheckoutOptions {
                    first_time: true,
                    ..Default::default()
                },
            )
            .unwrap();
        let index = fixture.repo.index().unwrap();
        let lazy = crate::repo_path::RepoPath::from_internal_string("lazy.bin").unwrap();
        let entry = index.get(lazy).unwrap();
        assert_eq!(entry.hash, lazy_blob);
        assert_eq!(entry.mtime_millis, 0);
        assert!(!fixture.repo.root().join("lazy.bin").exists());
        assert_eq!(fixture.read_file("present.txt"), "here\n");
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_materialization() {
        let fixture = TestRepo::new();
        let target_blob = fixture.blob("a.txt");
        let commit = {
            let mut builder = TreeBuilder::new(
                fixture.repo.odb(),
                *fixture.repo.odb().empty_tree_id(),
            );
            builder.set(
                RepoPathBuf::from_internal_string("a.txt").unwrap(),
                EntryValue {
                    mode: EntryMode::Regular,
                    hash: fixture.blob("real contents\n"),
                    size: 14,
                    payload: None,
                },
            );
            builder.set(
                RepoPathBuf::from_internal_string("link").unwrap(),
                EntryValue {
                    mode: EntryMode::Symlink,
                    hash: target_blob,
                    size: 5,
                    payload: Some(b"a.txt".to_vec()),
                },
            );
            let tree = builder.write_tree().unwrap();
            fixture.commit_tree(tree)
        };
        fixture.checkout_first(commit);

        let link = fixture.repo.root().join("link");
        assert_eq!(fs::read_link(&link).unwrap(), Path::new("a.txt"));
        assert_eq!(fs::read_to_string(&link).unwrap(), "real contents\n");
    }

    #[test]
    fn test_fragments_materialization() {
        let fixture = TestRepo::new();
        let part1 = fixture.blob("part one, ");
        let part2 = fixture.blob("part two");
        let whole = b"part one, part two";
        let fragments = crate::object::Fragments {
            origin: crate::hash_id::hash_bytes(whole),
            size: whole.len() as u64,
            entries: vec![
                crate::object::FragmentEntry {
                    index: 0,
                    hash: part1,
                    size: 10,
                },
                crate::object::FragmentEntry {
                    index: 1,
                    hash: part2,
                    size: 8,
                },
            ],
        };
        let fragments_id = fixture.repo.odb().write_object(&fragments).unwrap();
        let commit = {
            let mut builder = TreeBuilder::new(
                fixture.repo.odb(),
                *fixture.repo.odb().empty_tree_id(),
            );
            builder.set(
                RepoPathBuf::from_internal_string("large.bin").unwrap(),
                EntryValue {
                    mode: EntryMode::Fragments,
                    hash: fragments_id,
                    size: whole.len() as u64,
                    payload: None,
                },
            );
            let tree = builder.write_tree().unwrap();
            fixture.commit_tree(tree)
        };
        fixture.checkout_first(commit);
        assert_eq!(fixture.read_file("large.bin"), "part one, part two");
    }
}
