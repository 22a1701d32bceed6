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

use zeta_lib::refs;
use zeta_lib::worktree::CheckoutOptions;

use crate::cli_util::open_repo;
use crate::cli_util::resolve_commit;
use crate::command_error::CommandError;
use crate::ui::Ui;

/// Switch to a branch or commit, updating index and worktree
#[derive(clap::Args, Clone, Debug)]
pub struct CheckoutArgs {
    /// Branch, tag, or revision to check out [default: HEAD]
    target: Option<String>,
    /// Create a branch at the target and switch to it
    #[arg(long, short = 'b')]
    branch: Option<String>,
    /// Throw away local modifications
    #[arg(long, short = 'f')]
    force: bool,
}

pub fn cmd_checkout(ui: &mut Ui, args: &CheckoutArgs) -> Result<(), CommandError> {
    let repo = open_repo()?;
    let committer = repo.committer_signature();
    let target_name = args.target.as_deref().unwrap_or("HEAD");
    let commit_id = resolve_commit(&repo, target_name)?;

    repo.checkout(
        &commit_id,
        &CheckoutOptions {
            force: args.force,
            ..Default::default()
        },
    )?;

    if args.target.is_none() && args.branch.is_none() {
        // Restoring the current HEAD; references stay put.
        return Ok(());
    }
    if let Some(branch) = &args.branch {
        repo.refs().update(
            &refs::branch_ref(branch),
            None,
            commit_id,
            &committer,
            &format!("branch: created from {target_name}"),
        )?;
        repo.refs().set_head_to_branch(
            branch,
            &committer,
            &format!("checkout: moving to {branch}"),
        )?;
        writeln!(ui.stdout_writer(), "Switched to a new branch '{branch}'")?;
    } else if repo
        .refs()
        .read(&refs::branch_ref(target_name))
        .is_ok()
    {
        repo.refs().set_head_to_branch(
            target_name,
            &committer,
            &format!("checkout: moving to {target_name}"),
        )?;
        writeln!(ui.stdout_writer(), "Switched to branch '{target_name}'")?;
    } else {
        let commit = repo.odb().commit(&commit_id)?;
        repo.refs().set_head_to_commit(
            commit_id,
            &committer,
            &format!("checkout: moving to {}", commit_id.hex()),
        )?;
        writeln!(
            ui.stdout_writer(),
            "HEAD is now at {:.12} {}",
            commit_id,
            commit.subject()
        )?;
    }
    Ok(())
}
