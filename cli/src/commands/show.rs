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

use std::io::Write;

use zeta_lib::diff::PathMatcher;
use zeta_lib::diff::diff_trees;
use zeta_lib::files;
use zeta_lib::hash_id::HashID;
use zeta_lib::object::Commit;
use zeta_lib::object::EntryValue;
use zeta_lib::object::Object;
use zeta_lib::repo::Repository;
use zeta_lib::repo::Resolved;

use crate::cli_util::open_repo;
use crate::cli_util::format_signature;
use crate::cli_util::format_timestamp;
use crate::cli_util::write_commit_header;
use crate::command_error::CommandError;
use crate::ui::Ui;

/// Show commits, tags, trees, fragments, or blobs
#[derive(clap::Args, Clone, Debug)]
pub struct ShowArgs {
    /// Revisions or `rev:path` specs to show
    #[arg(required = true)]
    specs: Vec<String>,
    /// Normalize line endings and strip the BOM before diffing
    #[arg(long)]
    textconv: bool,
    /// Diff algorithm to use
    #[arg(long, default_value = "histogram")]
    algorithm: String,
    /// Print at most this many bytes of blob content
    #[arg(long)]
    limit: Option<u64>,
}

pub fn cmd_show(ui: &mut Ui, args: &ShowArgs) -> Result<(), CommandError> {
    let repo = open_repo()?;
    if !matches!(args.algorithm.as_str(), "histogram" | "myers" | "minimal") {
        return Err(CommandError::new(format!(
            "unknown diff algorithm {:?}",
            args.algorithm
        )));
    }
    ui.request_pager();
    for spec in &args.specs {
        let hash = match repo.resolve_spec(spec)? {
            Resolved::Object(hash) => hash,
            Resolved::Entry { hash, .. } => hash,
        };
        match repo.odb().object(&hash)? {
            Object::Commit(commit) => show_commit(ui, &repo, &hash, &commit, args)?,
            Object::Tag(tag) => {
                {
                    let out = ui.stdout_writer();
                    writeln!(out, "tag {}", tag.name)?;
                    writeln!(out, "Tagger: {}", format_signature(&tag.tagger))?;
                    writeln!(out, "Date:   {}", format_timestamp(&tag.tagger.timestamp))?;
                    if !tag.content.is_empty() {
                        writeln!(out)?;
                        write!(out, "{}", tag.content)?;
                    }
                    writeln!(out)?;
                }
                let commit = repo.odb().parse_rev_exhaustive(&tag.object)?;
                let commit_id = repo.odb().peel_to_commit_id(&tag.object)?;
                show_commit(ui, &repo, &commit_id, &commit, args)?;
            }
            Object::Tree(tree) => {
                let out = ui.stdout_writer();
                writeln!(out, "tree {hash}")?;
                writeln!(out)?;
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
            Object::Fragments(fragments) => {
                let out = ui.stdout_writer();
                writeln!(out, "fragments {hash}")?;
                writeln!(out, "origin {}", fragments.origin)?;
                writeln!(out, "size {}", fragments.size)?;
                for entry in &fragments.entries {
                    writeln!(out, "{:>4} {} {}", entry.index, entry.hash, entry.size)?;
                }
            }
            Object::Blob(blob) => {
                let bytes = blob.read_to_bytes()?;
                let bytes = if args.textconv {
                    files::textconv(bytes)
                } else {
                    bytes
                };
                let end = args
                    .limit
                    .map(|limit| (limit as usize).min(bytes.len()))
                    .unwrap_or(bytes.len());
                ui.stdout_writer().write_all(&bytes[..end])?;
            }
        }
    }
    Ok(())
}

fn show_commit(
    ui: &mut Ui,
    repo: &Repository,
    hash: &HashID,
    commit: &Commit,
    args: &ShowArgs,
) -> Result<(), CommandError> {
    write_commit_header(ui.stdout_writer(), hash, commit)?;
    // Merges print no diff.
    if commit.parents.len() > 1 {
        return Ok(());
    }
    let parent_tree = match commit.parents.first() {
        Some(parent) => repo.odb().parse_rev_exhaustive(parent)?.tree,
        None => *repo.odb().empty_tree_id(),
    };
    let changes = diff_trees(
        repo.odb(),
        &parent_tree,
        &commit.tree,
        &PathMatcher::everything(),
    )?;
    for change in changes {
        let path = change.path().as_internal_str().to_owned();
        let out = ui.stdout_writer();
        writeln!(out, "diff --zeta a/{path} b/{path}")?;
        let old = read_side(repo, change.from.as_ref().map(|item| item.value()), args)?;
        let new = read_side(repo, change.to.as_ref().map(|item| item.value()), args)?;
        if files::is_binary(&old) || files::is_binary(&new) {
            writeln!(out, "Binary files a/{path} and b/{path} differ")?;
            continue;
        }
        let rendered = files::unified_diff(&old, &new, &format!("a/{path}"), &format!("b/{path}"));
        write!(out, "{rendered}")?;
    }
    Ok(())
}

fn read_side(
    repo: &Repository,
    value: Option<EntryValue>,
    args: &ShowArgs,
) -> Result<Vec<u8>, CommandError> {
    let Some(value) = value else {
        return Ok(vec![]);
    };
    let bytes = match value.payload {
        Some(payload) => payload,
        None => repo.odb().blob(&value.hash)?.read_to_bytes()?,
    };
    if args.textconv {
        Ok(files::textconv(bytes))
    } else {
        Ok(bytes)
    }
}
