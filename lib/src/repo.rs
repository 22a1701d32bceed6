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

//! Repository discovery, initialization, and component wiring.
//!
//! A repository root contains a `.zeta` directory with `HEAD`, `refs/`,
//! `packed-refs`, `index`, `reflog/`, `objects/`, and `COMMIT_EDITMSG`.
//! Discovery walks ancestor directories for a directory that is itself a
//! zeta dir or contains `.zeta/`.

use std::fs;
use std::io;
use std::path::Path;
use std::path::PathBuf;

use thiserror::Error;

use crate::config::CoreConfig;
use crate::config::IdentityKind;
use crate::config::signature_from_env;
use crate::gc::GcError;
use crate::gc::PackObjectsOptions;
use crate::gc::PackSummary;
use crate::hash_id::HashID;
use crate::index::Index;
use crate::index::IndexError;
use crate::object::EntryMode;
use crate::object::Signature;
use crate::odb::ObjectDatabase;
use crate::odb::OdbError;
use crate::promisor::Promisor;
use crate::promisor::PromisorTransport;
use crate::refs::RefError;
use crate::refs::RefStore;
use crate::repo_path::RepoPath;
use crate::repo_path::RepoPathBuf;

pub const ZETA_DIR: &str = ".zeta";
pub const DEFAULT_BRANCH: &str = "mainline";

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("Not a zeta repository (or any ancestor of {start})")]
    NotFound { start: PathBuf },
    #[error("A zeta repository already exists at {0}")]
    AlreadyExists(PathBuf),
    #[error("Unknown revision {0:?}")]
    RevisionNotFound(String),
    #[error("Path {path:?} does not exist in {rev}")]
    PathNotInTree { rev: HashID, path: String },
    #[error("Failed to access repository")]
    Io {
        #[from]
        source: io::Error,
    },
    #[error(transparent)]
    Odb(#[from] OdbError),
    #[error(transparent)]
    Ref(#[from] RefError),
    #[error(transparent)]
    Index(#[from] IndexError),
}

/// An open repository: object database, references, and worktree paths.
#[derive(Debug)]
pub struct Repository {
    root: PathBuf,
    zeta_dir: PathBuf,
    odb: ObjectDatabase,
    refs: RefStore,
    config: CoreConfig,
}

/// A revision spec resolved to something addressable.
#[derive(Debug)]
pub enum Resolved {
    /// A bare revision: commit, tag, or any object given by hash.
    Object(HashID),
    /// A `rev:path` spec resolved through the commit's tree.
    Entry {
        hash: HashID,
        mode: EntryMode,
        size: u64,
        path: RepoPathBuf,
    },
}

impl Repository {
    /// Creates the `.zeta` layout under `root`. The worktree may already
    /// contain files; the repository starts with an unborn HEAD.
    pub fn init(root: &Path) -> Result<Self, RepoError> {
        let zeta_dir = root.join(ZETA_DIR);
        if zeta_dir.exists() {
            return Err(RepoError::AlreadyExists(zeta_dir));
        }
        fs::create_dir_all(&zeta_dir)?;
        ObjectDatabase::init(&zeta_dir.join("objects"))?;
        fs::create_dir_all(zeta_dir.join("refs").join("heads"))?;
        fs::create_dir_all(zeta_dir.join("reflog"))?;
        fs::write(
            zeta_dir.join("HEAD"),
            format!("ref: refs/heads/{DEFAULT_BRANCH}\n"),
        )?;
        tracing::info!(root = ?root, "initialized empty repository");
        Self::open(root)
    }

    /// Opens the repository rooted at `root` (which must contain `.zeta`).
    pub fn open(root: &Path) -> Result<Self, RepoError> {
        Self::open_with_transport(root, None)
    }

    /// Opens with an injected promisor transport for lazy object fetching.
    /// The transport is only used when `ZETA_CORE_PROMISOR` is enabled.
    pub fn open_with_transport(
        root: &Path,
        transport: Option<Box<dyn PromisorTransport>>,
    ) -> Result<Self, RepoError> {
        let root = root.canonicalize()?;
        let zeta_dir = root.join(ZETA_DIR);
        if !zeta_dir.is_dir() {
            return Err(RepoError::NotFound { start: root });
        }
        let config = CoreConfig::from_env();
        let promisor = match transport {
            Some(transport) if config.promisor => Some(Promisor::new(transport)),
            _ => None,
        };
        let odb = ObjectDatabase::load(
            zeta_dir.join("objects"),
            config.sharing_root.clone(),
            promisor,
        );
        let refs = RefStore::new(zeta_dir.clone());
        Ok(Self {
            root,
            zeta_dir,
            odb,
            refs,
            config,
        })
    }

    /// Walks ancestor directories of `start` looking for a repository.
    pub fn discover(start: &Path) -> Result<Self, RepoError> {
        let start = start.canonicalize()?;
        for dir in start.ancestors() {
            if dir.join(ZETA_DIR).is_dir() {
                return Self::open(dir);
            }
            // A directory that is itself a zeta dir (HEAD plus objects/)
            // anchors the worktree at its parent.
            if dir.join("HEAD").is_file() && dir.join("objects").is_dir() {
                let root = dir.parent().unwrap_or(dir);
                return Self::open(root);
            }
        }
        Err(RepoError::NotFound {
            start: start.to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn zeta_dir(&self) -> &Path {
        &self.zeta_dir
    }

    pub fn odb(&self) -> &ObjectDatabase {
        &self.odb
    }

    pub fn refs(&self) -> &RefStore {
        &self.refs
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    /// Replaces the configuration, e.g. to override environment-derived
    /// settings programmatically.
    pub fn set_config(&mut self, config: CoreConfig) {
        self.config = config;
    }

    pub fn index_path(&self) -> PathBuf {
        self.zeta_dir.join("index")
    }

    /// Loads the index snapshot.
    pub fn index(&self) -> Result<Index, IndexError> {
        Index::load(&self.index_path())
    }

    /// Atomically replaces the index.
    pub fn set_index(&self, index: &Index) -> Result<(), IndexError> {
        index.save(&self.index_path())
    }

    pub fn author_signature(&self) -> Signature {
        signature_from_env(IdentityKind::Author)
    }

    pub fn committer_signature(&self) -> Signature {
        signature_from_env(IdentityKind::Committer)
    }

    /// The tree of the current HEAD commit, or the empty tree when HEAD is
    /// unborn.
    pub fn head_tree(&self) -> Result<HashID, RepoError> {
        match self.refs.head_commit()? {
            Some(commit_id) => Ok(self.odb.parse_rev_exhaustive(&commit_id)?.tree),
            None => Ok(*self.odb.empty_tree_id()),
        }
    }

    /// Resolves a revision string: a full hex identifier, `HEAD`, a full
    /// reference name, or a branch/tag short name.
    pub fn resolve_revision(&self, revision: &str) -> Result<HashID, RepoError> {
        if revision.len() == HashID::LEN * 2
            && let Ok(hash) = HashID::try_from_hex(revision)
        {
            return Ok(hash);
        }
        let candidates = [
            revision.to_owned(),
            crate::refs::branch_ref(revision),
            crate::refs::tag_ref(revision),
        ];
        for name in &candidates {
            match self.refs.resolve(name) {
                Ok(hash) => return Ok(hash),
                Err(RefError::NotFound(_) | RefError::InvalidName(_)) => continue,
                Err(err) => return Err(err.into()),
            }
        }
        Err(RepoError::RevisionNotFound(revision.to_owned()))
    }

    /// Resolves `rev` or `rev:path` to an object or a tree entry.
    pub fn resolve_spec(&self, spec: &str) -> Result<Resolved, RepoError> {
        let Some((revision, path)) = spec.split_once(':') else {
            return Ok(Resolved::Object(self.resolve_revision(spec)?));
        };
        let commit_id = self.resolve_revision(revision)?;
        let commit = self.odb.parse_rev_exhaustive(&commit_id)?;
        let path = RepoPathBuf::from_internal_string(path)
            .map_err(|_| RepoError::RevisionNotFound(spec.to_owned()))?;

        let mut tree = self.odb.tree(&commit.tree)?;
        let mut components = path.components().peekable();
        while let Some(component) = components.next() {
            let entry = tree.entry(component).ok_or_else(|| RepoError::PathNotInTree {
                rev: commit_id,
                path: path.as_internal_str().to_owned(),
            })?;
            if components.peek().is_none() {
                return Ok(Resolved::Entry {
                    hash: entry.hash,
                    mode: entry.mode,
                    size: entry.size,
                    path: path.clone(),
                });
            }
            if !entry.mode.is_dir() {
                break;
            }
            tree = self.odb.tree(&entry.hash)?;
        }
        Err(RepoError::PathNotInTree {
            rev: commit_id,
            path: path.as_internal_str().to_owned(),
        })
    }

    /// Resolves the entry at `path` in the tree `tree_id`, if present.
    pub fn tree_entry_at(
        &self,
        tree_id: &HashID,
        path: &RepoPath,
    ) -> Result<Option<(HashID, EntryMode, u64)>, RepoError> {
        let mut tree = self.odb.tree(tree_id)?;
        let mut components = path.components().peekable();
        while let Some(component) = components.next() {
            let Some(entry) = tree.entry(component) else {
                return Ok(None);
            };
            if components.peek().is_none() {
                return Ok(Some((entry.hash, entry.mode, entry.size)));
            }
            if !entry.mode.is_dir() {
                return Ok(None);
            }
            tree = self.odb.tree(&entry.hash)?;
        }
        Ok(None)
    }

    /// Delegates to the pack roll-up routine.
    pub fn gc(&self, options: &PackObjectsOptions) -> Result<PackSummary, GcError> {
        crate::gc::pack_objects(&self.odb, options)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::refs::HeadState;

    #[test]
    fn test_init_layout_and_unborn_head() {
        let temp_dir = tempfile::tempdir().unwrap();
        let repo = Repository::init(temp_dir.path()).unwrap();
        assert!(repo.zeta_dir().join("objects").is_dir());
        assert!(repo.zeta_dir().join("refs/heads").is_dir());
        assert_eq!(
            repo.refs().head_state().unwrap(),
            HeadState::Unborn(DEFAULT_BRANCH.to_owned())
        );
        assert!(repo.index().unwrap().is_empty());

        assert_matches!(
            Repository::init(temp_dir.path()),
            Err(RepoError::AlreadyExists(_))
        );
    }

    #[test]
    fn test_discover_from_subdirectory() {
        let temp_dir = tempfile::tempdir().unwrap();
        Repository::init(temp_dir.path()).unwrap();
        let nested = temp_dir.path().join("deep/nested/dir");
        fs::create_dir_all(&nested).unwrap();
        let repo = Repository::discover(&nested).unwrap();
        assert_eq!(
            repo.root().canonicalize().unwrap(),
            temp_dir.path().canonicalize().unwrap()
        );

        let outside = tempfile::tempdir().unwrap();
        assert_matches!(
            Repository::discover(outside.path()),
            Err(RepoError::NotFound { .. })
        );
    }

    #[test]
    fn test_resolve_revision() {
        let temp_dir = tempfile::tempdir().unwrap();
        let repo = Repository::init(temp_dir.path()).unwrap();
        let commit_id = {
            let commit = crate::object::Commit {
                tree: *repo.odb().empty_tree_id(),
                parents: vec![],
                author: crate::testing::test_signature(),
                committer: crate::testing::test_signature(),
                extra_headers: vec![],
                message: "initial\n".to_owned(),
            };
            repo.odb().write_object(&commit).unwrap()
        };
        repo.refs()
            .reset_head(commit_id, &crate::testing::test_signature(), "commit: initial")
            .unwrap();

        assert_eq!(repo.resolve_revision(&commit_id.hex()).unwrap(), commit_id);
        assert_eq!(repo.resolve_revision("HEAD").unwrap(), commit_id);
        assert_eq!(repo.resolve_revision(DEFAULT_BRANCH).unwrap(), commit_id);
        assert_eq!(
            repo.resolve_revision("refs/heads/mainline").unwrap(),
            commit_id
        );
        assert_matches!(
            repo.resolve_revision("no-such-branch"),
            Err(RepoError::RevisionNotFound(_))
        );
    }

    #[test]
    fn test_resolve_spec_with_path() {
        let temp_dir = tempfile::tempdir().unwrap();
        let repo = Repository::init(temp_dir.path()).unwrap();
        let blob = repo.odb().write_blob_bytes(b"hello\n").unwrap();
        let tree = {
            let mut builder =
                crate::tree_builder::TreeBuilder::new(repo.odb(), *repo.odb().empty_tree_id());
            builder.set(
                RepoPathBuf::from_internal_string("docs/README.md").unwrap(),
                crate::object::EntryValue {
                    mode: EntryMode::Regular,
                    hash: blob,
                    size: 6,
                    payload: None,
                },
            );
            builder.write_tree().unwrap()
        };
        let commit = crate::object::Commit {
            tree,
            parents: vec![],
            author: crate::testing::test_signature(),
            committer: crate::testing::test_signature(),
            extra_headers: vec![],
            message: "initial\n".to_owned(),
        };
        let commit_id = repo.odb().write_object(&commit).unwrap();

        let resolved = repo
            .resolve_spec(&format!("{}:docs/README.md", commit_id.hex()))
            .unwrap();
        assert_matches!(
            resolved,
            Resolved::Entry { hash, mode: EntryMode::Regular, size: 6, .. } if hash == blob
        );
        assert_matches!(
            repo.resolve_spec(&format!("{}:docs/missing.md", commit_id.hex())),
            Err(RepoError::PathNotInTree { .. })
        );
    }
}
