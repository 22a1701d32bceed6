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

use zeta_lib::merge::Conflict;
use zeta_lib::merge::ConflictSide;
use zeta_lib::merge::MergeOptions;
use zeta_lib::merge::MergeResult;
use zeta_lib::merge::merge_commits;
use zeta_lib::merge::merge_trees;

use crate::cli_util::open_repo;
use crate::cli_util::resolve_commit;
use crate::command_error::CommandError;
use crate::ui::Ui;

/// Merge two branches into a new tree without touching the worktree
#[derive(clap::Args, Clone, Debug)]
pub struct MergeTreeArgs {
    /// The side whose label is "ours"
    branch1: String,
    /// The side whose label is "theirs"
    branch2: String,
    /// Merge even when the branches share no common ancestor
    #[arg(long)]
    allow_unrelated_histories: bool,
    /// Print only the names of conflicted files
    #[arg(long)]
    name_only: bool,
    /// Separate output records with NUL instead of newline
    #[arg(short = 'z')]
    nul_terminated: bool,
    /// Normalize line endings and strip the BOM before merging
    #[arg(long)]
    textconv: bool,
    /// Print the full merge result as JSON
    #[arg(long)]
    json: bool,
    /// Use this commit as the merge base instead of computing one
    #[arg(long)]
    merge_base: Option<String>,
}

pub fn cmd_merge_tree(ui: &mut Ui, args: &MergeTreeArgs) -> Result<(), CommandError> {
    let repo = open_repo()?;
    let ours = resolve_commit(&repo, &args.branch1)?;
    let theirs = resolve_commit(&repo, &args.branch2)?;
    let options = MergeOptions {
        branch1_label: args.branch1.clone(),
        branch2_label: args.branch2.clone(),
        textconv: args.textconv,
        text_driver: repo.config().merge_text_driver.clone(),
        allow_unrelated_histories: args.allow_unrelated_histories,
        ..Default::default()
    };

    let result = match &args.merge_base {
        Some(base) => {
            let base_tree = repo
                .odb()
                .parse_rev_exhaustive(&resolve_commit(&repo, base)?)?
                .tree;
            let ours_tree = repo.odb().parse_rev_exhaustive(&ours)?.tree;
            let theirs_tree = repo.odb().parse_rev_exhaustive(&theirs)?.tree;
            merge_trees(repo.odb(), &base_tree, &ours_tree, &theirs_tree, &options)?
        }
        None => merge_commits(repo.odb(), &ours, &theirs, &options)?,
    };

    if args.json {
        writeln!(
            ui.stdout_writer(),
            "{}",
            serde_json::to_string_pretty(&result)?
        )?;
    } else {
        let eol = if args.nul_terminated { "\0" } else { "\n" };
        let out = ui.stdout_writer();
        write!(out, "{}{eol}", result.new_tree)?;
        if args.name_only {
            for conflict in &result.conflicts {
                write!(out, "{}{eol}", conflict_path(conflict))?;
            }
        } else {
            for conflict in &result.conflicts {
                for (stage, side) in stages(conflict) {
                    if side.is_absent() {
                        continue;
                    }
                    write!(out, "{} {} {stage} {}{eol}", side.mode, side.hash, side.path)?;
                }
            }
        }
        write!(out, "{eol}")?;
        for message in &result.messages {
            write!(out, "{message}{eol}")?;
        }
    }

    if has_conflicts(&result) {
        return Err(CommandError::with_code(1, ""));
    }
    Ok(())
}

fn stages(conflict: &Conflict) -> [(u8, &ConflictSide); 3] {
    [
        (1, &conflict.ancestor),
        (2, &conflict.our),
        (3, &conflict.their),
    ]
}

fn conflict_path(conflict: &Conflict) -> &str {
    for side in [&conflict.our, &conflict.their, &conflict.ancestor] {
        if !side.is_absent() {
            return &side.path;
        }
    }
    ""
}

fn has_conflicts(result: &MergeResult) -> bool {
    !result.conflicts.is_empty()
}
