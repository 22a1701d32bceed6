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

//! Writes nested trees from path-level overrides over a base tree.

use std::collections::BTreeMap;

use crate::hash_id::HashID;
use crate::object::EntryMode;
use crate::object::EntryValue;
use crate::object::Tree;
use crate::object::TreeEntry;
use crate::odb::ObjectDatabase;
use crate::odb::OdbResult;
use crate::repo_path::RepoPath;
use crate::repo_path::RepoPathBuf;
use crate::repo_path::RepoPathComponentBuf;

#[derive(Debug)]
enum Override {
    Tombstone,
    Replace(EntryValue),
}

#[derive(Debug)]
pub struct TreeBuilder<'a> {
    odb: &'a ObjectDatabase,
    base_tree_id: HashID,
    overrides: BTreeMap<RepoPathBuf, Override>,
}

impl<'a> TreeBuilder<'a> {
    pub fn new(odb: &'a ObjectDatabase, base_tree_id: HashID) -> Self {
        let overrides = BTreeMap::new();
        Self {
            odb,
            base_tree_id,
            overrides,
        }
    }

    pub fn set(&mut self, path: RepoPathBuf, value: EntryValue) {
        assert!(!path.is_root());
        self.overrides.insert(path, Override::Replace(value));
    }

    pub fn remove(&mut self, path: RepoPathBuf) {
        assert!(!path.is_root());
        self.overrides.insert(path, Override::Tombstone);
    }

    pub fn set_or_remove(&mut self, path: RepoPathBuf, value: Option<EntryValue>) {
        assert!(!path.is_root());
        if let Some(value) = value {
            self.overrides.insert(path, Override::Replace(value));
        } else {
            self.overrides.insert(path, Override::Tombstone);
        }
    }

    pub fn write_tree(self) -> OdbResult<HashID> {
        if self.overrides.is_empty() {
            return Ok(self.base_tree_id);
        }

        let mut trees_to_write = self.get_base_trees()?;

        // Update entries in parent trees for file overrides
        for (path, file_override) in self.overrides {
            let (dir, basename) = path.split().unwrap();
            let tree_entries = trees_to_write.get_mut(dir).unwrap();
            match file_override {
                Override::Replace(value) => {
                    tree_entries.insert(basename.to_owned(), value);
                }
                Override::Tombstone => {
                    tree_entries.remove(basename);
                }
            }
        }

        // Write trees in reverse lexicographical order, starting with trees
        // without children.
        let odb = self.odb;
        while let Some((dir, cur_entries)) = trees_to_write.pop_last() {
            if let Some((parent, basename)) = dir.split() {
                let parent_entries = trees_to_write.get_mut(parent).unwrap();
                if cur_entries.is_empty() {
                    if let Some(value) = parent_entries.get(basename)
                        && value.mode == EntryMode::Dir
                    {
                        parent_entries.remove(basename);
                    } else {
                        // Entry would have been replaced with file (see above)
                    }
                } else {
                    let tree_id = odb.write_object(&tree_from_entries(cur_entries))?;
                    parent_entries.insert(
                        basename.to_owned(),
                        EntryValue {
                            mode: EntryMode::Dir,
                            hash: tree_id,
                            size: 0,
                            payload: None,
                        },
                    );
                }
            } else {
                // We're writing the root tree. Write it even if empty. Return
                // its id.
                assert!(trees_to_write.is_empty());
                return odb.write_object(&tree_from_entries(cur_entries));
            }
        }

        unreachable!("trees_to_write must contain the root tree");
    }

    fn get_base_trees(
        &self,
    ) -> OdbResult<BTreeMap<RepoPathBuf, BTreeMap<RepoPathComponentBuf, EntryValue>>> {
        let odb = self.odb;
        let mut tree_cache = {
            let dir = RepoPathBuf::root();
            let tree = odb.tree(&self.base_tree_id)?;
            BTreeMap::from([(dir, tree)])
        };

        fn populate_trees<'a>(
            tree_cache: &'a mut BTreeMap<RepoPathBuf, Tree>,
            odb: &ObjectDatabase,
            dir: &RepoPath,
        ) -> OdbResult<&'a Tree> {
            if tree_cache.contains_key(dir) {
                return Ok(tree_cache.get(dir).unwrap());
            }
            let (parent, basename) = dir.split().expect("root must be populated");
            let parent_tree = populate_trees(tree_cache, odb, parent)?;
            let tree = match parent_tree.entry(basename) {
                Some(entry) if entry.mode == EntryMode::Dir => odb.tree(&entry.hash)?,
                _ => Tree::default(),
            };
            Ok(tree_cache.entry(dir.to_owned()).or_insert(tree))
        }

        for path in self.overrides.keys() {
            let parent = path.parent().unwrap();
            populate_trees(&mut tree_cache, odb, parent)?;
        }

        Ok(tree_cache
            .into_iter()
            .map(|(dir, tree)| {
                let entries = tree
                    .entries()
                    .iter()
                    .map(|entry| (entry.name.clone(), entry.value()))
                    .collect();
                (dir, entries)
            })
            .collect())
    }
}

fn tree_from_entries(entries: BTreeMap<RepoPathComponentBuf, EntryValue>) -> Tree {
    Tree::from_sorted_entries(
        entries
            .into_iter()
            .map(|(name, value)| TreeEntry::from_value(name, value))
            .collect(),
    )
}
