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

//! Line-level file content utilities: binary detection, textconv, diff
//! hunks, the three-way text merge driver, and unified-diff rendering.

use std::io;
use std::io::Write as _;
use std::process::Command;

use bstr::ByteSlice as _;

/// How many leading bytes to scan when sniffing for binary content.
const BINARY_SNIFF_LEN: usize = 8000;

/// Cap on the LCS table; beyond this the changed region merges as one hunk.
const MAX_LCS_CELLS: usize = 4_000_000;

const CONFLICT_MARKER_LEN: usize = 7;

/// A file is treated as binary if a NUL byte appears near the start.
pub fn is_binary(bytes: &[u8]) -> bool {
    bytes[..bytes.len().min(BINARY_SNIFF_LEN)].contains(&0)
}

/// Normalizes text content before diff/merge: strips a UTF-8 BOM and
/// converts CRLF line endings to LF.
pub fn textconv(bytes: Vec<u8>) -> Vec<u8> {
    let without_bom = match bytes.strip_prefix(b"\xef\xbb\xbf") {
        Some(rest) => rest,
        None => &bytes,
    };
    if !without_bom.contains(&b'\r') {
        if without_bom.len() == bytes.len() {
            return bytes;
        }
        return without_bom.to_vec();
    }
    let mut out = Vec::with_capacity(without_bom.len());
    let mut rest = without_bom;
    while let Some(pos) = rest.find(b"\r\n") {
        out.extend_from_slice(&rest[..pos]);
        out.push(b'\n');
        rest = &rest[pos + 2..];
    }
    out.extend_from_slice(rest);
    out
}

/// Splits into lines, keeping terminators attached.
pub fn split_lines(bytes: &[u8]) -> Vec<&[u8]> {
    let mut lines = vec![];
    let mut rest = bytes;
    while !rest.is_empty() {
        match rest.find_byte(b'\n') {
            Some(pos) => {
                lines.push(&rest[..=pos]);
                rest = &rest[pos + 1..];
            }
            None => {
                lines.push(rest);
                break;
            }
        }
    }
    lines
}

/// One contiguous edit: base lines `base_start..base_end` are replaced by
/// side lines `side_start..side_end`. Either range may be empty.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Hunk {
    pub base_start: usize,
    pub base_end: usize,
    pub side_start: usize,
    pub side_end: usize,
}

/// Computes the edit script from `base` to `side` as a list of hunks over
/// line indexes. Lines are matched with an LCS after trimming the common
/// prefix and suffix; oversized middles degrade to a single replacement.
pub fn diff_hunks(base: &[&[u8]], side: &[&[u8]]) -> Vec<Hunk> {
    // Common prefix
    let mut start = 0;
    while start < base.len() && start < side.len() && base[start] == side[start] {
        start += 1;
    }
    // Common suffix (not overlapping the prefix)
    let mut base_end = base.len();
    let mut side_end = side.len();
    while base_end > start && side_end > start && base[base_end - 1] == side[side_end - 1] {
        base_end -= 1;
        side_end -= 1;
    }
    if start == base_end && start == side_end {
        return vec![];
    }

    let base_mid = &base[start..base_end];
    let side_mid = &side[start..side_end];
    if base_mid.len().saturating_mul(side_mid.len()) > MAX_LCS_CELLS {
        return vec![Hunk {
            base_start: start,
            base_end,
            side_start: start,
            side_end,
        }];
    }

    let matched = lcs_pairs(base_mid, side_mid);
    let mut hunks = vec![];
    let mut base_pos = 0;
    let mut side_pos = 0;
    for (base_match, side_match) in matched.into_iter().chain([(base_mid.len(), side_mid.len())])
    {
        if base_pos != base_match || side_pos != side_match {
            hunks.push(Hunk {
                base_start: start + base_pos,
                base_end: start + base_match,
                side_start: start + side_pos,
                side_end: start + side_match,
            });
        }
        base_pos = base_match + 1;
        side_pos = side_match + 1;
    }
    hunks
}

/// Longest common subsequence as matched `(base_index, side_index)` pairs.
fn lcs_pairs(base: &[&[u8]], side: &[&[u8]]) -> Vec<(usize, usize)> {
    let n = base.len();
    let m = side.len();
    if n == 0 || m == 0 {
        return vec![];
    }
    let mut table = vec![0u32; (n + 1) * (m + 1)];
    let at = |i: usize, j: usize| i * (m + 1) + j;
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            table[at(i, j)] = if base[i] == side[j] {
                table[at(i + 1, j + 1)] + 1
            } else {
                table[at(i + 1, j)].max(table[at(i, j + 1)])
            };
        }
    }
    let mut pairs = vec![];
    let (mut i, mut j) = (0, 0);
    while i < n && j < m {
        if base[i] == side[j] {
            pairs.push((i, j));
            i += 1;
            j += 1;
        } else if table[at(i + 1, j)] >= table[at(i, j + 1)] {
            i += 1;
        } else {
            j += 1;
        }
    }
    pairs
}

/// Outcome of a file-level three-way merge.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FileMergeResult {
    /// Every hunk merged; the content is clean.
    Resolved(Vec<u8>),
    /// At least one overlapping change; the content carries conflict markers.
    Conflicted(Vec<u8>),
}

impl FileMergeResult {
    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Self::Resolved(bytes) | Self::Conflicted(bytes) => bytes,
        }
    }

    pub fn is_conflicted(&self) -> bool {
        matches!(self, Self::Conflicted(_))
    }
}

/// Labels written into conflict markers.
#[derive(Clone, Copy, Debug)]
pub struct MergeLabels<'a> {
    pub ours: &'a str,
    pub theirs: &'a str,
}

/// Three-way text merge of `ours` and `theirs` over `base`.
///
/// Non-overlapping changes from both sides are combined; overlapping but
/// identical changes resolve to that change; genuinely divergent regions are
/// emitted between conflict markers.
pub fn merge3(base: &[u8], ours: &[u8], theirs: &[u8], labels: &MergeLabels) -> FileMergeResult {
    let base_lines = split_lines(base);
    let our_lines = split_lines(ours);
    let their_lines = split_lines(theirs);
    let our_hunks = diff_hunks(&base_lines, &our_lines);
    let their_hunks = diff_hunks(&base_lines, &their_lines);

    let mut out: Vec<u8> = vec![];
    let mut conflicted = false;
    let mut pos = 0;
    let mut ia = 0;
    let mut ib = 0;
    loop {
        let next_a = our_hunks.get(ia);
        let next_b = their_hunks.get(ib);
        let start = match (next_a, next_b) {
            (None, None) => {
                for line in &base_lines[pos..] {
                    out.extend_from_slice(line);
                }
                break;
            }
            (Some(a), None) => a.base_start,
            (None, Some(b)) => b.base_start,
            (Some(a), Some(b)) => a.base_start.min(b.base_start),
        };
        for line in &base_lines[pos..start] {
            out.extend_from_slice(line);
        }

        // Grow the cluster until no hunk on either side still overlaps it.
        // A hunk starting exactly at the cluster end stays outside (adjacent
        // edits merge cleanly), except zero-width inserts at the start point.
        let mut end = start;
        let mut ours_in = vec![];
        let mut theirs_in = vec![];
        loop {
            let mut progressed = false;
            while let Some(hunk) = our_hunks.get(ia)
                && (hunk.base_start < end || (end == start && hunk.base_start == start))
            {
                end = end.max(hunk.base_end);
                ours_in.push(*hunk);
                ia += 1;
                progressed = true;
            }
            while let Some(hunk) = their_hunks.get(ib)
                && (hunk.base_start < end || (end == start && hunk.base_start == start))
            {
                end = end.max(hunk.base_end);
                theirs_in.push(*hunk);
                ib += 1;
                progressed = true;
            }
            if !progressed {
                break;
            }
        }

        let base_region: Vec<&[u8]> = base_lines[start..end].to_vec();
        let ours_region = apply_hunks(&base_lines, &our_lines, &ours_in, start, end);
        let theirs_region = apply_hunks(&base_lines, &their_lines, &theirs_in, start, end);

        if ours_region == theirs_region {
            extend_lines(&mut out, &ours_region);
        } else if ours_region == base_region {
            extend_lines(&mut out, &theirs_region);
        } else if theirs_region == base_region {
            extend_lines(&mut out, &ours_region);
        } else {
            conflicted = true;
            out.extend_from_slice("<".repeat(CONFLICT_MARKER_LEN).as_bytes());
            out.push(b' ');
            out.extend_from_slice(labels.ours.as_bytes());
            out.push(b'\n');
            extend_lines(&mut out, &ours_region);
            ensure_trailing_newline(&mut out);
            out.extend_from_slice("=".repeat(CONFLICT_MARKER_LEN).as_bytes());
            out.push(b'\n');
            extend_lines(&mut out, &theirs_region);
            ensure_trailing_newline(&mut out);
            out.extend_from_slice(">".repeat(CONFLICT_MARKER_LEN).as_bytes());
            out.push(b' ');
            out.extend_from_slice(labels.theirs.as_bytes());
            out.push(b'\n');
        }
        pos = end;
    }

    if conflicted {
        FileMergeResult::Conflicted(out)
    } else {
        FileMergeResult::Resolved(out)
    }
}

/// Applies the side's hunks falling inside `[start, end)` to that base
/// region, producing the side's version of the region.
fn apply_hunks<'a>(
    base_lines: &[&'a [u8]],
    side_lines: &[&'a [u8]],
    hunks: &[Hunk],
    start: usize,
    end: usize,
) -> Vec<&'a [u8]> {
    let mut region = vec![];
    let mut pos = start;
    for hunk in hunks {
        region.extend_from_slice(&base_lines[pos..hunk.base_start]);
        region.extend_from_slice(&side_lines[hunk.side_start..hunk.side_end]);
        pos = hunk.base_end;
    }
    region.extend_from_slice(&base_lines[pos..end]);
    region
}

fn extend_lines(out: &mut Vec<u8>, lines: &[&[u8]]) {
    for line in lines {
        out.extend_from_slice(line);
    }
}

fn ensure_trailing_newline(out: &mut Vec<u8>) {
    if !out.ends_with(b"\n") {
        out.push(b'\n');
    }
}

/// Runs an external merge driver command with the three inputs as files.
///
/// The merged content is read from stdout. Exit status 0 means clean, 1
/// means conflicted; anything else is an error.
pub fn run_external_driver(
    driver: &str,
    base: &[u8],
    ours: &[u8],
    theirs: &[u8],
) -> io::Result<FileMergeResult> {
    let dir = tempfile::tempdir()?;
    let mut write_input = |name: &str, contents: &[u8]| -> io::Result<std::path::PathBuf> {
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path)?;
        file.write_all(contents)?;
        Ok(path)
    };
    let base_path = write_input("base", base)?;
    let ours_path = write_input("ours", ours)?;
    let theirs_path = write_input("theirs", theirs)?;

    let mut words = driver.split_whitespace();
    let program = words.next().ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidInput, "empty merge driver command")
    })?;
    let output = Command::new(program)
        .args(words)
        .arg(&base_path)
        .arg(&ours_path)
        .arg(&theirs_path)
        .output()?;
    match output.status.code() {
        Some(0) => Ok(FileMergeResult::Resolved(output.stdout)),
        Some(1) => Ok(FileMergeResult::Conflicted(output.stdout)),
        _ => Err(io::Error::other(format!(
            "merge driver {program} failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        ))),
    }
}

/// Renders a unified diff between two texts with three lines of context.
pub fn unified_diff(old: &[u8], new: &[u8], old_label: &str, new_label: &str) -> String {
    const CONTEXT: usize = 3;
    let old_lines = split_lines(old);
    let new_lines = split_lines(new);
    let hunks = diff_hunks(&old_lines, &new_lines);
    if hunks.is_empty() {
        return String::new();
    }

    let mut out = format!("--- {old_label}\n+++ {new_label}\n");
    // Group hunks whose context windows touch.
    let mut groups: Vec<Vec<&Hunk>> = vec![];
    for hunk in &hunks {
        match groups.last_mut() {
            Some(group)
                if hunk.base_start.saturating_sub(CONTEXT)
                    <= group.last().unwrap().base_end + CONTEXT =>
            {
                group.push(hunk);
            }
            _ => groups.push(vec![hunk]),
        }
    }
    for group in groups {
        let first = group.first().unwrap();
        let last = group.last().unwrap();
        let old_from = first.base_start.saturating_sub(CONTEXT);
        let old_to = (last.base_end + CONTEXT).min(old_lines.len());
        let shift = first.side_start as isize - first.base_start as isize;
        let new_from = (old_from as isize + shift) as usize;
        let delta: isize = group
            .iter()
            .map(|hunk| {
                (hunk.side_end - hunk.side_start) as isize
                    - (hunk.base_end - hunk.base_start) as isize
            })
            .sum();
        let new_to = ((new_from + old_to - old_from) as isize + delta) as usize;
        out.push_str(&format!(
            "@@ -{},{} +{},{} @@\n",
            old_from + 1,
            old_to - old_from,
            new_from + 1,
            new_to - new_from,
        ));
        let mut pos = old_from;
        for hunk in group {
            for line in &old_lines[pos..hunk.base_start] {
                push_diff_line(&mut out, ' ', line);
            }
            for line in &old_lines[hunk.base_start..hunk.base_end] {
                push_diff_line(&mut out, '-', line);
            }
            for line in &new_lines[hunk.side_start..hunk.side_end] {
                push_diff_line(&mut out, '+', line);
            }
            pos = hunk.base_end;
        }
        for line in &old_lines[pos..old_to] {
            push_diff_line(&mut out, ' ', line);
        }
    }
    out
}

fn push_diff_line(out: &mut String, prefix: char, line: &[u8]) {
    out.push(prefix);
    out.push_str(&String::from_utf8_lossy(line));
    if !line.ends_with(b"\n") {
        out.push_str("\n\\ No newline at end of file\n");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LABELS: MergeLabels<'_> = MergeLabels {
        ours: "ours",
        theirs: "theirs",
    };

    #[test]
    fn test_is_binary() {
        assert!(!is_binary(b"plain text\n"));
        assert!(is_binary(b"ELF\0\x01\x02"));
        assert!(!is_binary(b""));
    }

    #[test]
    fn test_textconv() {
        assert_eq!(textconv(b"a\r\nb\r\n".to_vec()), b"a\nb\n");
        assert_eq!(textconv(b"\xef\xbb\xbfhi\n".to_vec()), b"hi\n");
        assert_eq!(textconv(b"unchanged\n".to_vec()), b"unchanged\n");
    }

    #[test]
    fn test_split_lines_keeps_terminators() {
        assert_eq!(split_lines(b"a\nb"), vec![&b"a\n"[..], &b"b"[..]]);
        assert_eq!(split_lines(b""), Vec::<&[u8]>::new());
    }

    #[test]
    fn test_diff_hunks_simple() {
        let base = split_lines(b"a\nb\nc\n");
        let side = split_lines(b"a\nB\nc\n");
        assert_eq!(
            diff_hunks(&base, &side),
            vec![Hunk {
                base_start: 1,
                base_end: 2,
                side_start: 1,
                side_end: 2,
            }]
        );
    }

    #[test]
    fn test_merge3_combines_disjoint_changes() {
        let base = b"one\ntwo\nthree\nfour\nfive\n";
        let ours = b"ONE\ntwo\nthree\nfour\nfive\n";
        let theirs = b"one\ntwo\nthree\nfour\nFIVE\n";
        assert_eq!(
            merge3(base, ours, theirs, &LABELS),
            FileMergeResult::Resolved(b"ONE\ntwo\nthree\nfour\nFIVE\n".to_vec())
        );
    }

    #[test]
    fn test_merge3_adjacent_line_changes_are_clean() {
        let base = b"one\ntwo\nthree\n";
        let ours = b"ONE\ntwo\nthree\n";
        let theirs = b"one\nTWO\nthree\n";
        assert_eq!(
            merge3(base, ours, theirs, &LABELS),
            FileMergeResult::Resolved(b"ONE\nTWO\nthree\n".to_vec())
        );
    }

    #[test]
    fn test_merge3_same_change_resolves() {
        let base = b"one\ntwo\n";
        let both = b"one\nTWO\n";
        assert_eq!(
            merge3(base, both, both, &LABELS),
            FileMergeResult::Resolved(both.to_vec())
        );
    }

    #[test]
    fn test_merge3_overlap_conflicts() {
        let base = b"L1\nL2\n";
        let ours = b"L1\nL2-ours\n";
        let theirs = b"L1\nL2-theirs\n";
        let result = merge3(base, ours, theirs, &LABELS);
        let FileMergeResult::Conflicted(bytes) = result else {
            panic!("expected conflict");
        };
        let text = String::from_utf8(bytes).unwrap();
        assert_eq!(
            text,
            "L1\n<<<<<<< ours\nL2-ours\n=======\nL2-theirs\n>>>>>>> theirs\n"
        );
    }

    #[test]
    fn test_merge3_one_side_unchanged() {
        let base = b"a\nb\n";
        let theirs = b"a\nb\nc\n";
        assert_eq!(
            merge3(base, base, theirs, &LABELS),
            FileMergeResult::Resolved(theirs.to_vec())
        );
    }

    #[test]
    fn test_merge3_delete_vs_keep() {
        let base = b"a\nb\nc\n";
        let ours = b"a\nc\n";
        assert_eq!(
            merge3(base, ours, base, &LABELS),
            FileMergeResult::Resolved(ours.to_vec())
        );
    }

    #[test]
    fn test_unified_diff_shape() {
        let old = b"one\ntwo\nthree\nfour\nfive\nsix\nseven\n";
        let new = b"one\ntwo\nthree\nFOUR\nfive\nsix\nseven\n";
        let diff = unified_diff(old, new, "a/f", "b/f");
        assert!(diff.starts_with("--- a/f\n+++ b/f\n@@ -1,7 +1,7 @@\n"));
        assert!(diff.contains("-four\n"));
        assert!(diff.contains("+FOUR\n"));
        assert_eq!(unified_diff(old, old, "a", "b"), "");
    }
}
