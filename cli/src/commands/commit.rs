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
use std::path::PathBuf;

use zeta_lib::diff::diff_tree_index;
use zeta_lib::refs::HeadState;
use zeta_lib::worktree::CommitOptions;
use zeta_lib::worktree::WorktreeError;

use crate::cli_util::acquire_commit_message;
use crate::cli_util::open_repo;
use crate::command_error::CommandError;
use crate::ui::Ui;

/// Record staged changes as a new commit
#[derive(clap::Args, Clone, Debug)]
pub struct CommitArgs {
    /// Commit message
    #[arg(long, short = 'm')]
    message: Option<String>,
    /// Read the commit message from this file (`-` for stdin)
    #[arg(long = "file", short = 'F')]
    file: Option<PathBuf>,
    /// Allow recording a commit with no staged changes
    #[arg(long)]
    allow_empty: bool,
    /// Replace the tip commit instead of appending to it
    #[arg(long)]
    amend: bool,
}

pub fn cmd_commit(ui: &mut Ui, args: &CommitArgs) -> Result<(), CommandError> {
    let repo = open_repo()?;
    let head_tree = repo.head_tree()?;
    let index = repo.index()?;
    let staged = diff_tree_index(repo.odb(), &head_tree, &index)?;
    if staged.is_empty() && !args.allow_empty && !args.amend {
        return Err(WorktreeError::NothingToCommit.into());
    }

    let message = acquire_commit_message(&repo, args.message.clone(), args.file.clone(), &staged)?;
    let (commit_id, commit) = repo.commit(&CommitOptions {
        message,
        allow_empty: args.allow_empty,
        amend: args.amend,
    })?;

    let head = match repo.refs().head_state()? {
        HeadState::OnBranch(name) | HeadState::Unborn(name) => name,
        HeadState::Detached(_) => "detached HEAD".to_owned(),
    };
    writeln!(
        ui.stdout_writer(),
        "[{head} {:.12}] {}",
        commit_id,
        commit.subject()
    )?;
    Ok(())
}
