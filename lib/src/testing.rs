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

//! Shared fixtures for unit tests.

use tempfile::TempDir;

use crate::diff::ChangeItem;
use crate::hash_id::HashID;
use crate::index::IndexEntry;
use crate::object::Commit;
use crate::object::EntryMode;
use crate::object::EntryValue;
use crate::object::Signature;
use crate::object::Timestamp;
use crate::odb::ObjectDatabase;
use crate::repo::Repository;
use crate::repo_path::RepoPathBuf;
use crate::tree_builder::TreeBuilder;

pub fn test_signature() -> Signature {
    signature_at(1700000000000)
}

pub fn signature_at(millis: i64) -> Signature {
    Signature {
        name: "Test User".to_owned(),
        email: "test@example.com".to_owned(),
        timestamp: Timestamp {
            millis,
            tz_offset_minutes: 0,
        },
    }
}

/// Writes a tree of regular files from `(path, contents)` pairs.
pub fn build_tree(odb: &ObjectDatabase, files: &[(&str, &str)]) -> HashID {
    let mut builder = TreeBuilder::new(odb, *odb.empty_tree_id());
    for (path, contents) in files {
        let hash = odb.write_blob_bytes(contents.as_bytes()).unwrap();
        builder.set(
            RepoPathBuf::from_internal_string(*path).unwrap(),
            EntryValue {
                mode: EntryMode::Regular,
                hash,
                size: contents.len() as u64,
                payload: None,
            },
        );
    }
    builder.write_tree().unwrap()
}

/// An object database in a temp dir plus helpers to populate it tersely.
pub struct TestOdb {
    _temp_dir: TempDir,
    odb: ObjectDatabase,
}

impl TestOdb {
    pub fn new() -> Self {
        let temp_dir = tempfile::tempdir().unwrap();
        let odb = ObjectDatabase::init(&temp_dir.path().join("objects")).unwrap();
        Self {
            _temp_dir: temp_dir,
            odb,
        }
    }

    pub fn odb(&self) -> &ObjectDatabase {
        &self.odb
    }

    pub fn blob(&self, contents: &str) -> HashID {
        self.odb.write_blob_bytes(contents.as_bytes()).unwrap()
    }

    /// Writes a tree of regular files from `(path, contents)` pairs.
    pub fn tree(&self, files: &[(&str, &str)]) -> HashID {
        build_tree(&self.odb, files)
    }

    pub fn commit(&self, tree: HashID, parents: &[HashID], message: &str) -> HashID {
        self.commit_at(tree, parents, message, 1700000000000)
    }

    pub fn commit_at(
        &self,
        tree: HashID,
        parents: &[HashID],
        message: &str,
        millis: i64,
    ) -> HashID {
        let commit = Commit {
            tree,
            parents: parents.to_vec(),
            author: signature_at(millis),
            committer: signature_at(millis),
            extra_headers: vec![],
            message: message.to_owned(),
        };
        self.odb.write_object(&commit).unwrap()
    }

    /// Writes a tree and a commit on top of `parents` in one step.
    pub fn commit_files(&self, files: &[(&str, &str)], parents: &[HashID], message: &str) -> HashID {
        let tree = self.tree(files);
        self.commit(tree, parents, message)
    }

    pub fn index_entry(&self, path: &str, contents: &str) -> IndexEntry {
        IndexEntry {
            path: RepoPathBuf::from_internal_string(path).unwrap(),
            hash: self.blob(contents),
            mode: EntryMode::Regular,
            size: contents.len() as u64,
            mtime_millis: 0,
        }
    }

    pub fn change_item(&self, path: &str, contents: &str) -> ChangeItem {
        ChangeItem {
            path: RepoPathBuf::from_internal_string(path).unwrap(),
            mode: EntryMode::Regular,
            hash: self.blob(contents),
            size: contents.len() as u64,
            payload: None,
        }
    }
}

/// A full repository in a temp dir, for worktree-level tests.
pub struct TestRepo {
    pub temp_dir: TempDir,
    pub repo: Repository,
}

impl TestRepo {
    pub fn new() -> Self {
        let temp_dir = tempfile::tempdir().unwrap();
        let repo = Repository::init(temp_dir.path()).unwrap();
        Self { temp_dir, repo }
    }

    pub fn blob(&self, contents: &str) -> HashID {
        self.repo.odb().write_blob_bytes(contents.as_bytes()).unwrap()
    }

    /// Writes a commit whose parent is the current HEAD (if born). HEAD is
    /// not moved.
    pub fn commit_tree(&self, tree: HashID) -> HashID {
        let parents: Vec<HashID> = self
            .repo
            .refs()
            .head_commit()
            .unwrap()
            .into_iter()
            .collect();
        let commit = Commit {
            tree,
            parents,
            author: test_signature(),
            committer: test_signature(),
            extra_headers: vec![],
            message: "test commit\n".to_owned(),
        };
        self.repo.odb().write_object(&commit).unwrap()
    }

    pub fn commit_files(&self, files: &[(&str, &str)]) -> HashID {
        let tree = build_tree(self.repo.odb(), files);
        self.commit_tree(tree)
    }

    /// First-time checkout plus moving HEAD to the commit, like a clone.
    pub fn checkout_first(&self, commit: HashID) {
        let options = crate::worktree::CheckoutOptions {
            first_time: true,
            ..Default::default()
        };
        self.repo.checkout(&commit, &options).unwrap();
        self.repo
            .refs()
            .reset_head(commit, &test_signature(), "checkout: first time")
            .unwrap();
    }

    pub fn write_file(&self, path: &str, contents: &str) {
        let disk_path = self.repo.root().join(path);
        if let Some(parent) = disk_path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(disk_path, contents).unwrap();
    }

    pub fn read_file(&self, path: &str) -> String {
        std::fs::read_to_string(self.repo.root().join(path)).unwrap()
    }

    /// Writes a file into the worktree and stages it in the index.
    pub fn stage_file(&self, path: &str, contents: &str) {
        self.write_file(path, contents);
        let hash = self.blob(contents);
        let disk_path = self.repo.root().join(path);
        let metadata = disk_path.symlink_metadata().unwrap();
        let mut builder = self.repo.index().unwrap().into_builder();
        builder.set(IndexEntry {
            path: RepoPathBuf::from_internal_string(path).unwrap(),
            hash,
            mode: EntryMode::Regular,
            size: contents.len() as u64,
            mtime_millis: crate::diff::mtime_millis(&metadata),
        });
        self.repo.set_index(&builder.build()).unwrap();
    }
}
