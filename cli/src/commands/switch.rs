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

/// Switch branches
#[derive(clap::Args, Clone, Debug)]
pub struct SwitchArgs {
    /// Branch to switch to
    #[arg(required_unless_present = "detach")]
    branch: Option<String>,
    /// Create the branch at HEAD first
    #[arg(long, short = 'c')]
    create: bool,
    /// Detach HEAD at the given revision
    #[arg(long, value_name = "REV")]
    detach: Option<String>,
    /// Throw away local modifications
    #[arg(long, short = 'f')]
    force: bool,
}

pub fn cmd_switch(ui: &mut Ui, args: &SwitchArgs) -> Result<(), CommandError> {
    let repo = open_repo()?;
    let committer = repo.committer_signature();
    let options = CheckoutOptions {
        force: args.force,
        ..Default::default()
    };

    if let Some(revision) = &args.detach {
        let commit_id = resolve_commit(&repo, revision)?;
        repo.checkout(&commit_id, &options)?;
        let commit = repo.odb().commit(&commit_id)?;
        repo.refs().set_head_to_commit(
            commit_id,
            &committer,
            &format!("switch: detaching at {}", commit_id.hex()),
        )?;
        writeln!(
            ui.stdout_writer(),
            "HEAD is now at {:.12} {}",
            commit_id,
            commit.subject()
        )?;
        return Ok(());
    }

    let branch = args.branch.as_deref().expect("clap enforces the branch");
    if args.create {
        let head = repo
            .refs()
            .head_commit()?
            .ok_or_else(|| CommandError::new("cannot create a branch from an unborn HEAD"))?;
        repo.refs().update(
            &refs::branch_ref(branch),
            None,
            head,
            &committer,
            "branch: created from HEAD",
        )?;
    }
    let commit_id = resolve_commit(&repo, &refs::branch_ref(branch))?;
    repo.checkout(&commit_id, &options)?;
    repo.refs()
        .set_head_to_branch(branch, &committer, &format!("switch: moving to {branch}"))?;
    writeln!(ui.stdout_writer(), "Switched to branch '{branch}'")?;
    Ok(())
}
