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

//! Commit graph walks for `log`/`rev-list`: positives minus the ancestors of
//! negatives, emitted in one of three orders.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::collections::HashMap;
use std::collections::HashSet;
use std::collections::VecDeque;

use crate::hash_id::HashID;
use crate::object::Commit;
use crate::odb::ObjectDatabase;
use crate::odb::OdbResult;

/// Commit emission order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WalkOrder {
    /// First-parent ordered breadth-first.
    Bfs,
    /// Topological; a commit always appears before its parents.
    Topo,
    /// Committer-date descending with topological tie-break.
    Date,
}

/// Walks the graph from `positives`, hiding everything reachable from
/// `negatives`, and returns up to `limit` commits in the requested order.
pub fn rev_list(
    odb: &ObjectDatabase,
    positives: &[HashID],
    negatives: &[HashID],
    order: WalkOrder,
    limit: Option<usize>,
) -> OdbResult<Vec<HashID>> {
    let mut hidden = HashSet::new();
    for negative in negatives {
        let mut queue = VecDeque::from([*negative]);
        while let Some(hash) = queue.pop_front() {
            if !hidden.insert(hash) {
                continue;
            }
            let commit = odb.parse_rev_exhaustive(&hash)?;
            queue.extend(commit.parents.iter().copied());
        }
    }

    let limit = limit.unwrap_or(usize::MAX);
    let walked = match order {
        WalkOrder::Bfs => walk_bfs(odb, positives, &hidden, limit)?,
        WalkOrder::Topo => walk_topo(odb, positives, &hidden, limit)?,
        WalkOrder::Date => walk_date(odb, positives, &hidden, limit)?,
    };
    Ok(walked)
}

fn load(
    odb: &ObjectDatabase,
    cache: &mut HashMap<HashID, Commit>,
    hash: &HashID,
) -> OdbResult<Commit> {
    if let Some(commit) = cache.get(hash) {
        return Ok(commit.clone());
    }
    let commit = odb.parse_rev_exhaustive(hash)?;
    cache.insert(*hash, commit.clone());
    Ok(commit)
}

fn walk_bfs(
    odb: &ObjectDatabase,
    positives: &[HashID],
    hidden: &HashSet<HashID>,
    limit: usize,
) -> OdbResult<Vec<HashID>> {
    let mut out = vec![];
    let mut seen: HashSet<HashID> = HashSet::new();
    let mut queue: VecDeque<HashID> = positives
        .iter()
        .filter(|hash| !hidden.contains(hash))
        .copied()
        .collect();
    while let Some(hash) = queue.pop_front() {
        if !seen.insert(hash) {
            continue;
        }
        let commit = odb.parse_rev_exhaustive(&hash)?;
        out.push(hash);
        if out.len() >= limit {
            break;
        }
        // First parent first keeps the mainline ahead of merged-in history.
        for parent in &commit.parents {
            if !hidden.contains(parent) && !seen.contains(parent) {
                queue.push_back(*parent);
            }
        }
    }
    Ok(out)
}

fn walk_topo(
    odb: &ObjectDatabase,
    positives: &[HashID],
    hidden: &HashSet<HashID>,
    limit: usize,
) -> OdbResult<Vec<HashID>> {
    // Collect the visible subgraph, counting visible children per commit.
    let mut commits: HashMap<HashID, Commit> = HashMap::new();
    let mut child_count: HashMap<HashID, usize> = HashMap::new();
    let mut queue: VecDeque<HashID> = positives
        .iter()
        .filter(|hash| !hidden.contains(hash))
        .copied()
        .collect();
    let roots: Vec<HashID> = queue.iter().copied().collect();
    while let Some(hash) = queue.pop_front() {
        if commits.contains_key(&hash) {
            continue;
        }
        let commit = load(odb, &mut commits, &hash)?;
        for parent in &commit.parents {
            if hidden.contains(parent) {
                continue;
            }
            *child_count.entry(*parent).or_default() += 1;
            queue.push_back(*parent);
        }
    }

    // Kahn's algorithm from the childless heads down.
    let mut ready: VecDeque<HashID> = roots
        .iter()
        .filter(|hash| child_count.get(*hash).copied().unwrap_or(0) == 0)
        .copied()
        .collect();
    let mut out = vec![];
    let mut emitted: HashSet<HashID> = HashSet::new();
    while let Some(hash) = ready.pop_front() {
        if !emitted.insert(hash) {
            continue;
        }
        out.push(hash);
        if out.len() >= limit {
            break;
        }
        let commit = &commits[&hash];
        for parent in &commit.parents {
            if hidden.contains(parent) {
                continue;
            }
            let count = child_count.get_mut(parent).unwrap();
            *count -= 1;
            if *count == 0 {
                ready.push_back(*parent);
            }
        }
    }
    Ok(out)
}

struct DateEntry {
    millis: i64,
    seq: usize,
    hash: HashID,
}

impl PartialEq for DateEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for DateEntry {}

impl PartialOrd for DateEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DateEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Newest first; on equal dates the earlier-inserted commit (a child)
        // pops first, preserving the topological shape.
        self.millis
            .cmp(&other.millis)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

fn walk_date(
    odb: &ObjectDatabase,
    positives: &[HashID],
    hidden: &HashSet<HashID>,
    limit: usize,
) -> OdbResult<Vec<HashID>> {
    let mut cache = HashMap::new();
    let mut heap = BinaryHeap::new();
    let mut pushed: HashSet<HashID> = HashSet::new();
    let mut seq = 0;
    for positive in positives {
        if hidden.contains(positive) || !pushed.insert(*positive) {
            continue;
        }
        let commit = load(odb, &mut cache, positive)?;
        heap.push(DateEntry {
            millis: commit.committer.timestamp.millis,
            seq,
            hash: *positive,
        });
        seq += 1;
    }

    let mut out = vec![];
    while let Some(entry) = heap.pop() {
        out.push(entry.hash);
        if out.len() >= limit {
            break;
        }
        let commit = cache[&entry.hash].clone();
        for parent in &commit.parents {
            if hidden.contains(parent) || !pushed.insert(*parent) {
                continue;
            }
            let parent_commit = load(odb, &mut cache, parent)?;
            heap.push(DateEntry {
                millis: parent_commit.committer.timestamp.millis,
                seq,
                hash: *parent,
            });
            seq += 1;
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestOdb;

    /// root <- a <- b <- c, with a side branch root <- a <- d merged at c.
    fn diamond(fixture: &TestOdb) -> (HashID, HashID, HashID, HashID, HashID) {
        let root = fixture.commit_at(fixture.tree(&[("f", "0")]), &[], "root", 1000);
        let a = fixture.commit_at(fixture.tree(&[("f", "a")]), &[root], "a", 2000);
        let b = fixture.commit_at(fixture.tree(&[("f", "b")]), &[a], "b", 3000);
        let d = fixture.commit_at(fixture.tree(&[("f", "d")]), &[a], "d", 4000);
        let c = fixture.commit_at(fixture.tree(&[("f", "c")]), &[b, d], "c", 5000);
        (root, a, b, d, c)
    }

    #[test]
    fn test_bfs_is_first_parent_ordered() {
        let fixture = TestOdb::new();
        let (root, a, b, d, c) = diamond(&fixture);
        let out = rev_list(fixture.odb(), &[c], &[], WalkOrder::Bfs, None).unwrap();
        assert_eq!(out, vec![c, b, d, a, root]);
    }

    #[test]
    fn test_topo_emits_children_first() {
        let fixture = TestOdb::new();
        let (root, a, b, d, c) = diamond(&fixture);
        let out = rev_list(fixture.odb(), &[c], &[], WalkOrder::Topo, None).unwrap();
        let position = |hash: &HashID| out.iter().position(|h| h == hash).unwrap();
        assert_eq!(out.len(), 5);
        assert_eq!(out[0], c);
        assert!(position(&b) < position(&a));
        assert!(position(&d) < position(&a));
        assert!(position(&a) < position(&root));
    }

    #[test]
    fn test_date_orders_by_committer_date() {
        let fixture = TestOdb::new();
        let (root, a, b, d, c) = diamond(&fixture);
        let out = rev_list(fixture.odb(), &[c], &[], WalkOrder::Date, None).unwrap();
        // d (4000) is newer than b (3000), so it comes out first.
        assert_eq!(out, vec![c, d, b, a, root]);
    }

    #[test]
    fn test_negatives_hide_ancestors() {
        let fixture = TestOdb::new();
        let (_root, a, b, d, c) = diamond(&fixture);
        let out = rev_list(fixture.odb(), &[c], &[a], WalkOrder::Bfs, None).unwrap();
        assert_eq!(out, vec![c, b, d]);
    }

    #[test]
    fn test_limit() {
        let fixture = TestOdb::new();
        let (_root, _a, b, _d, c) = diamond(&fixture);
        let out = rev_list(fixture.odb(), &[c], &[], WalkOrder::Bfs, Some(2)).unwrap();
        assert_eq!(out, vec![c, b]);
    }
}
