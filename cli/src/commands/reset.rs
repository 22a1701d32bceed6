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

use zeta_lib::cancel::CancellationToken;
use zeta_lib::worktree::ResetMode;

use crate::cli_util::open_repo;
use crate::cli_util::resolve_commit;
use crate::command_error::CommandError;
use crate::ui::Ui;

/// Reset HEAD, and optionally the index and worktree, to a revision
#[derive(clap::Args, Clone, Debug)]
pub struct ResetArgs {
    /// Revision to reset to [default: HEAD]
    target: Option<String>,
    /// Move HEAD only
    #[arg(long, group = "mode")]
    soft: bool,
    /// Move HEAD and reset the index (the default)
    #[arg(long, group = "mode")]
    mixed: bool,
    /// Refuse when unstaged changes exist, otherwise like --hard
    #[arg(long, group = "mode")]
    merge: bool,
    /// Reset index and worktree unconditionally
    #[arg(long, group = "mode")]
    hard: bool,
}

pub fn cmd_reset(ui: &mut Ui, args: &ResetArgs) -> Result<(), CommandError> {
    let repo = open_repo()?;
    let target = args.target.as_deref().unwrap_or("HEAD");
    let commit_id = resolve_commit(&repo, target)?;
    let mode = if args.soft {
        ResetMode::Soft
    } else if args.merge {
        ResetMode::Merge
    } else if args.hard {
        ResetMode::Hard
    } else {
        ResetMode::Mixed
    };

    let outcome = repo.reset(&commit_id, mode, &CancellationToken::new())?;
    if !outcome.unstaged.is_empty() {
        let out = ui.stdout_writer();
        writeln!(out, "Unstaged changes after reset:")?;
        for path in &outcome.unstaged {
            writeln!(out, "M\t{}", path.as_internal_str())?;
        }
        return Ok(());
    }
    if mode == ResetMode::Hard {
        let commit = repo.odb().commit(&commit_id)?;
        writeln!(
            ui.stdout_writer(),
            "HEAD is now at {:.12} {}",
            commit_id,
            commit.subject()
        )?;
    }
    Ok(())
}
