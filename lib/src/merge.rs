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

//! Three-way tree merge with rename detection and recursive virtual
//! ancestors.
//!
//! The merge walks the union of paths in the ancestor, ours, and theirs
//! trees. Trivial cases (one side unchanged, both sides identical) resolve
//! without reading file contents; divergent regular files go through the
//! text merge driver, and the resulting tree is written even when conflicts
//! remain, with conflicted files stored as marker content.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::collections::HashSet;
use std::collections::VecDeque;
use std::io;

use itertools::Itertools as _;
use thiserror::Error;

use crate::diff::DiffError;
use crate::diff::flatten_tree;
use crate::files;
use crate::files::FileMergeResult;
use crate::files::MergeLabels;
use crate::hash_id::HashID;
use crate::object::Commit;
use crate::object::EntryMode;
use crate::object::EntryValue;
use crate::object::Signature;
use crate::object::Timestamp;
use crate::odb::ObjectDatabase;
use crate::odb::OdbError;
use crate::repo_path::RepoPath;
use crate::repo_path::RepoPathBuf;
use crate::tree_builder::TreeBuilder;

/// Similarity floor for pairing a deleted and an added file as a rename.
const RENAME_SIMILARITY_MIN: f64 = 0.5;

/// Upper bound on delete/add pairs examined for content similarity.
const RENAME_CANDIDATE_LIMIT: usize = 100;

/// Hard backstop for virtual-ancestor recursion. Each level strictly reduces
/// the number of merge bases, so hitting this means a cycle in the graph.
const MAX_ANCESTOR_DEPTH: usize = 64;

#[derive(Clone, Debug)]
pub struct MergeOptions {
    pub branch1_label: String,
    pub branch2_label: String,
    pub detect_renames: bool,
    pub textconv: bool,
    /// External text merge driver command; `None` uses the built-in merge.
    pub text_driver: Option<String>,
    pub allow_unrelated_histories: bool,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            branch1_label: "ours".to_owned(),
            branch2_label: "theirs".to_owned(),
            detect_renames: true,
            textconv: false,
            text_driver: None,
            allow_unrelated_histories: false,
        }
    }
}

/// One side of a [`Conflict`]. `mode`, `hash`, and `path` are empty for a
/// side where the file is absent.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct ConflictSide {
    pub mode: String,
    pub hash: String,
    pub path: String,
}

impl ConflictSide {
    fn present(path: &RepoPath, value: &EntryValue) -> Self {
        Self {
            mode: value.mode.as_octal().to_owned(),
            hash: value.hash.hex(),
            path: path.as_internal_str().to_owned(),
        }
    }

    fn of(path: &RepoPath, value: Option<&EntryValue>) -> Self {
        value.map_or_else(Self::default, |value| Self::present(path, value))
    }

    pub fn is_absent(&self) -> bool {
        self.path.is_empty()
    }
}

/// A path that could not be merged cleanly.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct Conflict {
    pub ancestor: ConflictSide,
    pub our: ConflictSide,
    pub their: ConflictSide,
}

/// Output of a tree merge. `new_tree` is valid even when `conflicts` is
/// non-empty.
#[derive(Clone, Debug, serde::Serialize)]
pub struct MergeResult {
    pub new_tree: HashID,
    pub conflicts: Vec<Conflict>,
    pub messages: Vec<String>,
}

#[derive(Debug, Error)]
pub enum MergeError {
    #[error("Refusing to merge unrelated histories")]
    UnrelatedHistories,
    #[error("Recursive merge of the ancestors produced conflicts")]
    AncestorConflicts,
    #[error("Merge base recursion too deep")]
    RecursionLimit,
    #[error("Merge driver failed")]
    Driver { source: io::Error },
    #[error(transparent)]
    Odb(#[from] OdbError),
    #[error(transparent)]
    Diff(#[from] DiffError),
}

/// Merges commits `ours` and `theirs`, resolving their common ancestor
/// (recursively synthesizing a virtual one when the merge bases are
/// ambiguous) and then merging trees.
pub fn merge_commits(
    odb: &ObjectDatabase,
    ours: &HashID,
    theirs: &HashID,
    options: &MergeOptions,
) -> Result<MergeResult, MergeError> {
    let ours = odb.peel_to_commit_id(ours)?;
    let theirs = odb.peel_to_commit_id(theirs)?;
    merge_commits_inner(odb, &ours, &theirs, options, 0)
}

fn merge_commits_inner(
    odb: &ObjectDatabase,
    ours: &HashID,
    theirs: &HashID,
    options: &MergeOptions,
    depth: usize,
) -> Result<MergeResult, MergeError> {
    let ancestor_tree = resolve_ancestor_tree(odb, ours, theirs, options, depth)?;
    let ours_tree = odb.commit(ours)?.tree;
    let theirs_tree = odb.commit(theirs)?.tree;
    merge_trees(odb, &ancestor_tree, &ours_tree, &theirs_tree, options)
}

/// Finds all merge bases of `a` and `b`: common ancestors that are not
/// strict ancestors of any other common ancestor. Ordered by committer date
/// (newest first) for deterministic recursive merging.
pub fn merge_bases(
    odb: &ObjectDatabase,
    a: &HashID,
    b: &HashID,
) -> Result<Vec<HashID>, MergeError> {
    let ancestors_a = ancestor_graph(odb, a)?;
    let ancestors_b = ancestor_graph(odb, b)?;
    let common: HashSet<HashID> = ancestors_a
        .keys()
        .filter(|hash| ancestors_b.contains_key(*hash))
        .copied()
        .collect();
    if common.is_empty() {
        return Ok(vec![]);
    }

    // Drop every common commit that is a strict ancestor of another common
    // commit.
    let mut dominated = HashSet::new();
    let mut queue: VecDeque<HashID> = common
        .iter()
        .flat_map(|hash| ancestors_a[hash].parents.iter().copied())
        .collect();
    while let Some(hash) = queue.pop_front() {
        if !dominated.insert(hash) {
            continue;
        }
        if let Some(node) = ancestors_a.get(&hash) {
            queue.extend(node.parents.iter().copied());
        }
    }

    let bases = common
        .into_iter()
        .filter(|hash| !dominated.contains(hash))
        .sorted_by_key(|hash| {
            let date = ancestors_a[hash].committer_millis;
            (std::cmp::Reverse(date), *hash)
        })
        .collect();
    Ok(bases)
}

struct AncestorNode {
    parents: Vec<HashID>,
    committer_millis: i64,
}

fn ancestor_graph(
    odb: &ObjectDatabase,
    head: &HashID,
) -> Result<HashMap<HashID, AncestorNode>, MergeError> {
    let mut graph = HashMap::new();
    let mut queue = VecDeque::from([*head]);
    while let Some(hash) = queue.pop_front() {
        if graph.contains_key(&hash) {
            continue;
        }
        let commit = odb.commit(&hash)?;
        queue.extend(commit.parents.iter().copied());
        graph.insert(
            hash,
            AncestorNode {
                parents: commit.parents,
                committer_millis: commit.committer.timestamp.millis,
            },
        );
    }
    Ok(graph)
}

/// Resolves the ancestor tree for a commit-level merge.
///
/// Zero bases fails (or yields the empty tree when unrelated histories are
/// allowed); one base uses its tree directly; multiple bases are merged
/// recursively into a virtual ancestor, which must itself merge cleanly.
fn resolve_ancestor_tree(
    odb: &ObjectDatabase,
    ours: &HashID,
    theirs: &HashID,
    options: &MergeOptions,
    depth: usize,
) -> Result<HashID, MergeError> {
    if depth > MAX_ANCESTOR_DEPTH {
        return Err(MergeError::RecursionLimit);
    }
    let bases = merge_bases(odb, ours, theirs)?;
    match bases.as_slice() {
        [] => {
            if options.allow_unrelated_histories {
                Ok(*odb.empty_tree_id())
            } else {
                Err(MergeError::UnrelatedHistories)
            }
        }
        [base] => Ok(odb.commit(base)?.tree),
        bases => {
            let mut virtual_id = bases[0];
            for next in &bases[1..] {
                let result = merge_commits_inner(odb, &virtual_id, next, options, depth + 1)?;
                if !result.conflicts.is_empty() {
                    return Err(MergeError::AncestorConflicts);
                }
                let commit = Commit {
                    tree: result.new_tree,
                    parents: vec![virtual_id, *next],
                    author: virtual_signature(),
                    committer: virtual_signature(),
                    extra_headers: vec![],
                    message: "virtual ancestor\n".to_owned(),
                };
                virtual_id = odb.write_object(&commit)?;
            }
            Ok(odb.commit(&virtual_id)?.tree)
        }
    }
}

fn virtual_signature() -> Signature {
    // Fixed identity and time keep virtual ancestors content-addressed
    // identically on every machine.
    Signature {
        name: "virtual ancestor".to_owned(),
        email: "merge@zeta".to_owned(),
        timestamp: Timestamp {
            millis: 0,
            tz_offset_minutes: 0,
        },
    }
}

/// Merges trees `ours` and `theirs` over the ancestor `base`.
pub fn merge_trees(
    odb: &ObjectDatabase,
    base: &HashID,
    ours: &HashID,
    theirs: &HashID,
    options: &MergeOptions,
) -> Result<MergeResult, MergeError> {
    let mut base_files = flatten_tree(odb, base)?;
    let mut our_files = flatten_tree(odb, ours)?;
    let mut their_files = flatten_tree(odb, theirs)?;

    let mut messages = vec![];
    if options.detect_renames {
        // Rebase the base and counterpart entries of renamed paths onto the
        // new name, so the per-path merge below sees them as one file.
        let ours_renames = detect_renames(odb, &base_files, &our_files, options)?;
        apply_renames(
            &ours_renames,
            &mut base_files,
            &mut their_files,
            &options.branch1_label,
            &mut messages,
        );
        let theirs_renames = detect_renames(odb, &base_files, &their_files, options)?;
        apply_renames(
            &theirs_renames,
            &mut base_files,
            &mut our_files,
            &options.branch2_label,
            &mut messages,
        );
    }
    merge_flattened(odb, base_files, our_files, their_files, options, messages)
}

fn merge_flattened(
    odb: &ObjectDatabase,
    base_files: BTreeMap<RepoPathBuf, EntryValue>,
    our_files: BTreeMap<RepoPathBuf, EntryValue>,
    their_files: BTreeMap<RepoPathBuf, EntryValue>,
    options: &MergeOptions,
    mut messages: Vec<String>,
) -> Result<MergeResult, MergeError> {
    let mut paths: Vec<&RepoPathBuf> = base_files
        .keys()
        .chain(our_files.keys())
        .chain(their_files.keys())
        .collect();
    paths.sort();
    paths.dedup();

    let mut result: BTreeMap<RepoPathBuf, EntryValue> = BTreeMap::new();
    let mut conflicts = vec![];
    for path in paths {
        let o = base_files.get(path);
        let a = our_files.get(path);
        let b = their_files.get(path);
        let decision = merge_entry(odb, path, o, a, b, options, &mut messages)?;
        if let Some(value) = decision.value {
            result.insert(path.clone(), value);
        }
        if let Some(conflict) = decision.conflict {
            conflicts.push(conflict);
        }
    }

    let mut builder = TreeBuilder::new(odb, *odb.empty_tree_id());
    for (path, value) in result {
        builder.set(path, value);
    }
    let new_tree = builder.write_tree()?;
    Ok(MergeResult {
        new_tree,
        conflicts,
        messages,
    })
}

struct EntryDecision {
    value: Option<EntryValue>,
    conflict: Option<Conflict>,
}

fn merge_entry(
    odb: &ObjectDatabase,
    path: &RepoPath,
    o: Option<&EntryValue>,
    a: Option<&EntryValue>,
    b: Option<&EntryValue>,
    options: &MergeOptions,
    messages: &mut Vec<String>,
) -> Result<EntryDecision, MergeError> {
    let clean = |value: Option<&EntryValue>| EntryDecision {
        value: value.cloned(),
        conflict: None,
    };
    // Both sides identical (including both absent): keep that state.
    if a == b {
        return Ok(clean(a));
    }
    // One side unchanged from the ancestor: take the changed side.
    if a == o {
        return Ok(clean(b));
    }
    if b == o {
        return Ok(clean(a));
    }

    // Stage 1/2/3 sides are the original ancestor/ours/theirs states, not
    // the marker blob written into the tree.
    let conflict = || Conflict {
        ancestor: ConflictSide::of(path, o),
        our: ConflictSide::of(path, a),
        their: ConflictSide::of(path, b),
    };
    match (a, b) {
        (Some(a_value), None) => {
            messages.push(format!(
                "CONFLICT (modify/delete): {} deleted in {} and modified in {}",
                path.as_internal_str(),
                options.branch2_label,
                options.branch1_label,
            ));
            Ok(EntryDecision {
                value: Some(a_value.clone()),
                conflict: Some(conflict()),
            })
        }
        (None, Some(b_value)) => {
            messages.push(format!(
                "CONFLICT (modify/delete): {} deleted in {} and modified in {}",
                path.as_internal_str(),
                options.branch1_label,
                options.branch2_label,
            ));
            Ok(EntryDecision {
                value: Some(b_value.clone()),
                conflict: Some(conflict()),
            })
        }
        (None, None) => unreachable!("both sides absent is handled as identical"),
        (Some(a_value), Some(b_value)) => {
            if !a_value.mode.is_regular_file() || !b_value.mode.is_regular_file() {
                // Symlinks, fragments, and type changes don't get a merged
                // blob; report the conflict and keep our side.
                messages.push(format!(
                    "CONFLICT (type): cannot merge {} ({} vs {})",
                    path.as_internal_str(),
                    a_value.mode.as_octal(),
                    b_value.mode.as_octal(),
                ));
                return Ok(EntryDecision {
                    value: Some(a_value.clone()),
                    conflict: Some(conflict()),
                });
            }

            let base_bytes = match o {
                Some(o_value) => read_file_bytes(odb, o_value, options.textconv)?,
                None => vec![],
            };
            let our_bytes = read_file_bytes(odb, a_value, options.textconv)?;
            let their_bytes = read_file_bytes(odb, b_value, options.textconv)?;
            if files::is_binary(&base_bytes)
                || files::is_binary(&our_bytes)
                || files::is_binary(&their_bytes)
            {
                messages.push(format!(
                    "CONFLICT (binary): cannot merge binary file {}",
                    path.as_internal_str(),
                ));
                return Ok(EntryDecision {
                    value: Some(a_value.clone()),
                    conflict: Some(conflict()),
                });
            }

            let merged = match &options.text_driver {
                Some(driver) => {
                    files::run_external_driver(driver, &base_bytes, &our_bytes, &their_bytes)
                        .map_err(|source| MergeError::Driver { source })?
                }
                None => files::merge3(
                    &base_bytes,
                    &our_bytes,
                    &their_bytes,
                    &MergeLabels {
                        ours: &options.branch1_label,
                        theirs: &options.branch2_label,
                    },
                ),
            };

            let mode = merge_modes(o.map(|o| o.mode), a_value.mode, b_value.mode);
            let conflicted = merged.is_conflicted();
            let bytes = merged.into_bytes();
            let hash = odb.write_blob_bytes(&bytes)?;
            let value = EntryValue {
                mode,
                hash,
                size: bytes.len() as u64,
                payload: None,
            };
            if conflicted {
                messages.push(format!(
                    "CONFLICT (content): Merge conflict in {}",
                    path.as_internal_str(),
                ));
                Ok(EntryDecision {
                    conflict: Some(conflict()),
                    value: Some(value),
                })
            } else {
                messages.push(format!("Auto-merging {}", path.as_internal_str()));
                Ok(EntryDecision {
                    value: Some(value),
                    conflict: None,
                })
            }
        }
    }
}

/// Resolves the executable bit three-way: the changed side wins; divergent
/// changes keep ours.
fn merge_modes(o: Option<EntryMode>, a: EntryMode, b: EntryMode) -> EntryMode {
    if a == b {
        return a;
    }
    match o {
        Some(o_mode) if a == o_mode => b,
        Some(o_mode) if b == o_mode => a,
        _ => a,
    }
}

fn read_file_bytes(
    odb: &ObjectDatabase,
    value: &EntryValue,
    textconv: bool,
) -> Result<Vec<u8>, MergeError> {
    let bytes = match &value.payload {
        Some(payload) => payload.clone(),
        None => {
            let blob = odb.blob(&value.hash)?;
            blob.read_to_bytes().map_err(|source| {
                MergeError::Odb(OdbError::ReadObject {
                    hash: value.hash,
                    source,
                })
            })?
        }
    };
    if textconv {
        Ok(files::textconv(bytes))
    } else {
        Ok(bytes)
    }
}

/// A rename of `from` to `to` on one side of the merge.
#[derive(Clone, Debug, PartialEq, Eq)]
struct Rename {
    from: RepoPathBuf,
    to: RepoPathBuf,
}

/// Pairs paths deleted on a side with paths it added: exact blob-hash
/// matches first, then content similarity above the threshold.
fn detect_renames(
    odb: &ObjectDatabase,
    base_files: &BTreeMap<RepoPathBuf, EntryValue>,
    side_files: &BTreeMap<RepoPathBuf, EntryValue>,
    options: &MergeOptions,
) -> Result<Vec<Rename>, MergeError> {
    let mut deleted: Vec<(&RepoPathBuf, &EntryValue)> = base_files
        .iter()
        .filter(|(path, _)| !side_files.contains_key(*path))
        .collect();
    let mut added: Vec<(&RepoPathBuf, &EntryValue)> = side_files
        .iter()
        .filter(|(path, _)| !base_files.contains_key(*path))
        .collect();
    if deleted.is_empty() || added.is_empty() {
        return Ok(vec![]);
    }

    let mut renames = vec![];
    // Exact renames: identical blob hash.
    let mut added_by_hash: HashMap<HashID, Vec<usize>> = HashMap::new();
    for (i, (_, value)) in added.iter().enumerate() {
        added_by_hash.entry(value.hash).or_default().push(i);
    }
    let mut used_added: HashSet<usize> = HashSet::new();
    let mut remaining_deleted = vec![];
    for (path, value) in deleted.drain(..) {
        let paired = added_by_hash
            .get(&value.hash)
            .and_then(|indexes| indexes.iter().find(|i| !used_added.contains(i)).copied());
        match paired {
            Some(i) => {
                used_added.insert(i);
                renames.push(Rename {
                    from: path.clone(),
                    to: added[i].0.clone(),
                });
            }
            None => remaining_deleted.push((path, value)),
        }
    }
    added = added
        .into_iter()
        .enumerate()
        .filter(|(i, _)| !used_added.contains(i))
        .map(|(_, pair)| pair)
        .collect();

    // Similarity renames over what's left, bounded to keep this from going
    // quadratic on large change sets.
    if remaining_deleted.len() * added.len() <= RENAME_CANDIDATE_LIMIT {
        let mut taken: HashSet<usize> = HashSet::new();
        for (path, value) in remaining_deleted {
            if !value.mode.is_regular_file() {
                continue;
            }
            let old_bytes = read_file_bytes(odb, value, options.textconv)?;
            if files::is_binary(&old_bytes) {
                continue;
            }
            let mut best: Option<(usize, f64)> = None;
            for (i, (_, added_value)) in added.iter().enumerate() {
                if taken.contains(&i) || !added_value.mode.is_regular_file() {
                    continue;
                }
                let new_bytes = read_file_bytes(odb, added_value, options.textconv)?;
                let score = line_similarity(&old_bytes, &new_bytes);
                if score >= RENAME_SIMILARITY_MIN
                    && best.is_none_or(|(_, best_score)| score > best_score)
                {
                    best = Some((i, score));
                }
            }
            if let Some((i, _)) = best {
                taken.insert(i);
                renames.push(Rename {
                    from: path.clone(),
                    to: added[i].0.clone(),
                });
            }
        }
    }
    Ok(renames)
}

/// Fraction of lines shared between the two texts.
fn line_similarity(old: &[u8], new: &[u8]) -> f64 {
    let old_lines = files::split_lines(old);
    let new_lines = files::split_lines(new);
    if old_lines.is_empty() && new_lines.is_empty() {
        return 1.0;
    }
    let changed: usize = files::diff_hunks(&old_lines, &new_lines)
        .iter()
        .map(|hunk| (hunk.base_end - hunk.base_start).max(hunk.side_end - hunk.side_start))
        .sum();
    let total = old_lines.len().max(new_lines.len());
    1.0 - changed.min(total) as f64 / total as f64
}

/// Rewrites the base and counterpart maps so a rename on `side` is merged at
/// its new path. The renaming side already has the entry at the new path.
fn apply_renames(
    renames: &[Rename],
    base_files: &mut BTreeMap<RepoPathBuf, EntryValue>,
    counterpart_files: &mut BTreeMap<RepoPathBuf, EntryValue>,
    side_label: &str,
    messages: &mut Vec<String>,
) {
    for rename in renames {
        // A base entry already at the target means an ambiguous pairing;
        // degrade to plain delete + add.
        if base_files.contains_key(&rename.to) {
            continue;
        }
        let Some(base_value) = base_files.remove(&rename.from) else {
            continue;
        };
        base_files.insert(rename.to.clone(), base_value);
        if let Some(counterpart_value) = counterpart_files.remove(&rename.from)
            && !counterpart_files.contains_key(&rename.to)
        {
            counterpart_files.insert(rename.to.clone(), counterpart_value);
        }
        messages.push(format!(
            "Renamed {} to {} in {}",
            rename.from.as_internal_str(),
            rename.to.as_internal_str(),
            side_label,
        ));
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::testing::TestOdb;

    #[test]
    fn test_merge_clean_disjoint_additions() {
        let fixture = TestOdb::new();
        let odb = fixture.odb();
        let base = fixture.tree(&[("a", "x")]);
        let ours = fixture.tree(&[("a", "x"), ("b", "y")]);
        let theirs = fixture.tree(&[("a", "x"), ("c", "z")]);

        let result =
            merge_trees(odb, &base, &ours, &theirs, &MergeOptions::default()).unwrap();
        assert!(result.conflicts.is_empty());
        let merged = crate::diff::flatten_tree(odb, &result.new_tree).unwrap();
        let names: Vec<_> = merged
            .keys()
            .map(|path| path.as_internal_str().to_owned())
            .collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_merge_identical_sides_is_ours() {
        let fixture = TestOdb::new();
        let base = fixture.tree(&[("a", "x")]);
        let ours = fixture.tree(&[("a", "y"), ("b", "n")]);

        let result = merge_trees(
            fixture.odb(),
            &base,
            &ours,
            &ours,
            &MergeOptions::default(),
        )
        .unwrap();
        assert!(result.conflicts.is_empty());
        assert_eq!(result.new_tree, ours);
    }

    #[test]
    fn test_merge_fast_forward_shape() {
        let fixture = TestOdb::new();
        let base = fixture.tree(&[("a", "x")]);
        let theirs = fixture.tree(&[("a", "x2"), ("b", "new")]);

        // base == ours: result is theirs.
        let result = merge_trees(
            fixture.odb(),
            &base,
            &base,
            &theirs,
            &MergeOptions::default(),
        )
        .unwrap();
        assert!(result.conflicts.is_empty());
        assert_eq!(result.new_tree, theirs);
    }

    #[test]
    fn test_merge_content_conflict_stages() {
        let fixture = TestOdb::new();
        let odb = fixture.odb();
        let base = fixture.tree(&[("a", "L1\nL2\n")]);
        let ours = fixture.tree(&[("a", "L1\nL2-ours\n")]);
        let theirs = fixture.tree(&[("a", "L1\nL2-theirs\n")]);

        let result =
            merge_trees(odb, &base, &ours, &theirs, &MergeOptions::default()).unwrap();
        assert_eq!(result.conflicts.len(), 1);
        let conflict = &result.conflicts[0];
        assert_eq!(conflict.ancestor.path, "a");
        assert_eq!(conflict.our.path, "a");
        assert_eq!(conflict.their.path, "a");
        assert_eq!(conflict.ancestor.hash, fixture.blob("L1\nL2\n").hex());
        assert_eq!(conflict.our.hash, fixture.blob("L1\nL2-ours\n").hex());
        assert_eq!(conflict.their.hash, fixture.blob("L1\nL2-theirs\n").hex());

        // The tree is still produced, with marker content at the path.
        let merged = crate::diff::flatten_tree(odb, &result.new_tree).unwrap();
        let value = &merged[&RepoPathBuf::from_internal_string("a").unwrap()];
        let contents = odb.blob(&value.hash).unwrap().read_to_bytes().unwrap();
        let text = String::from_utf8(contents).unwrap();
        assert!(text.contains("<<<<<<< ours"));
        assert!(text.contains(">>>>>>> theirs"));
        assert!(
            result
                .messages
                .iter()
                .any(|message| message.contains("Merge conflict in a"))
        );
    }

    #[test]
    fn test_merge_modify_delete_conflict() {
        let fixture = TestOdb::new();
        let base = fixture.tree(&[("a", "old\n"), ("keep", "k")]);
        let ours = fixture.tree(&[("a", "new\n"), ("keep", "k")]);
        let theirs = fixture.tree(&[("keep", "k")]);

        let result = merge_trees(
            fixture.odb(),
            &base,
            &ours,
            &theirs,
            &MergeOptions::default(),
        )
        .unwrap();
        assert_eq!(result.conflicts.len(), 1);
        let conflict = &result.conflicts[0];
        assert!(!conflict.ancestor.is_absent());
        assert!(!conflict.our.is_absent());
        assert!(conflict.their.is_absent());
        // The modified side stays in the tree.
        let merged = crate::diff::flatten_tree(fixture.odb(), &result.new_tree).unwrap();
        assert!(merged.contains_key(&RepoPathBuf::from_internal_string("a").unwrap()));
    }

    #[test]
    fn test_merge_commits_single_base() {
        let fixture = TestOdb::new();
        let odb = fixture.odb();
        let base_commit = fixture.commit_files(&[("f", "base\n")], &[], "base");
        let ours_commit = fixture.commit_files(&[("f", "base\n"), ("ours", "1")], &[base_commit], "ours");
        let theirs_commit =
            fixture.commit_files(&[("f", "base\n"), ("theirs", "2")], &[base_commit], "theirs");

        assert_eq!(
            merge_bases(odb, &ours_commit, &theirs_commit).unwrap(),
            vec![base_commit]
        );
        let result =
            merge_commits(odb, &ours_commit, &theirs_commit, &MergeOptions::default()).unwrap();
        assert!(result.conflicts.is_empty());
        let merged = crate::diff::flatten_tree(odb, &result.new_tree).unwrap();
        assert_eq!(merged.len(), 3);
    }

    #[test]
    fn test_merge_unrelated_histories() {
        let fixture = TestOdb::new();
        let odb = fixture.odb();
        let ours = fixture.commit_files(&[("a", "1")], &[], "ours root");
        let theirs = fixture.commit_files(&[("b", "2")], &[], "theirs root");

        assert_matches!(
            merge_commits(odb, &ours, &theirs, &MergeOptions::default()),
            Err(MergeError::UnrelatedHistories)
        );

        let options = MergeOptions {
            allow_unrelated_histories: true,
            ..Default::default()
        };
        let result = merge_commits(odb, &ours, &theirs, &options).unwrap();
        assert!(result.conflicts.is_empty());
        let merged = crate::diff::flatten_tree(odb, &result.new_tree).unwrap();
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn test_merge_multiple_bases_builds_virtual_ancestor() {
        let fixture = TestOdb::new();
        let odb = fixture.odb();
        // Criss-cross: two roots-of-divergence that are both merge bases.
        let root = fixture.commit_files(&[("f", "0\n")], &[], "root");
        let left = fixture.commit_files(&[("f", "0\n"), ("l", "l")], &[root], "left");
        let right = fixture.commit_files(&[("f", "0\n"), ("r", "r")], &[root], "right");
        let merge_lr = fixture.commit_files(
            &[("f", "0\n"), ("l", "l"), ("r", "r")],
            &[left, right],
            "merge lr",
        );
        let merge_rl = fixture.commit_files(
            &[("f", "0\n"), ("l", "l"), ("r", "r")],
            &[right, left],
            "merge rl",
        );
        let ours = fixture.commit_files(
            &[("f", "0\n"), ("l", "l"), ("r", "r"), ("x", "1")],
            &[merge_lr],
            "ours",
        );
        let theirs = fixture.commit_files(
            &[("f", "0\n"), ("l", "l"), ("r", "r"), ("y", "2")],
            &[merge_rl],
            "theirs",
        );

        let bases = merge_bases(odb, &ours, &theirs).unwrap();
        assert_eq!(bases.len(), 2);
        let result =
            merge_commits(odb, &ours, &theirs, &MergeOptions::default()).unwrap();
        assert!(result.conflicts.is_empty());
        let merged = crate::diff::flatten_tree(odb, &result.new_tree).unwrap();
        assert_eq!(merged.len(), 5);
    }

    #[test]
    fn test_exact_rename_rebases_edits() {
        let fixture = TestOdb::new();
        let odb = fixture.odb();
        let contents = "line1\nline2\nline3\n";
        let base = fixture.tree(&[("old.txt", contents)]);
        // Ours renames the file; theirs edits it in place.
        let ours = fixture.tree(&[("new.txt", contents)]);
        let theirs = fixture.tree(&[("old.txt", "line1\nline2 edited\nline3\n")]);

        let result =
            merge_trees(odb, &base, &ours, &theirs, &MergeOptions::default()).unwrap();
        assert!(result.conflicts.is_empty(), "{:?}", result.conflicts);
        let merged = crate::diff::flatten_tree(odb, &result.new_tree).unwrap();
        let new_path = RepoPathBuf::from_internal_string("new.txt").unwrap();
        assert_eq!(merged.len(), 1);
        let contents = odb
            .blob(&merged[&new_path].hash)
            .unwrap()
            .read_to_bytes()
            .unwrap();
        assert_eq!(contents, b"line1\nline2 edited\nline3\n");
        assert!(
            result
                .messages
                .iter()
                .any(|message| message.contains("Renamed old.txt to new.txt"))
        );
    }

    #[test]
    fn test_similarity_rename_detection() {
        let fixture = TestOdb::new();
        let base = fixture.tree(&[("old.txt", "a\nb\nc\nd\ne\nf\ng\nh\n")]);
        let side = fixture.tree(&[("new.txt", "a\nb\nc\nd\ne\nf\nzz\nh\n")]);
        let base_files = crate::diff::flatten_tree(fixture.odb(), &base).unwrap();
        let side_files = crate::diff::flatten_tree(fixture.odb(), &side).unwrap();
        let renames =
            detect_renames(fixture.odb(), &base_files, &side_files, &MergeOptions::default())
                .unwrap();
        assert_eq!(renames.len(), 1);
        assert_eq!(renames[0].from.as_internal_str(), "old.txt");
        assert_eq!(renames[0].to.as_internal_str(), "new.txt");
    }

    #[test]
    fn test_rename_disabled_reports_delete() {
        let fixture = TestOdb::new();
        let contents = "same contents\n";
        let base = fixture.tree(&[("old.txt", contents)]);
        let ours = fixture.tree(&[("new.txt", contents)]);
        let theirs = fixture.tree(&[("old.txt", "edited\n")]);

        let options = MergeOptions {
            detect_renames: false,
            ..Default::default()
        };
        let result = merge_trees(fixture.odb(), &base, &ours, &theirs, &options).unwrap();
        // Without rename detection this is a modify/delete conflict.
        assert_eq!(result.conflicts.len(), 1);
    }
}
