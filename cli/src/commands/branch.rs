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
use zeta_lib::refs::HeadState;

use crate::cli_util::open_repo;
use crate::cli_util::resolve_commit;
use crate::command_error::CommandError;
use crate::ui::Ui;

/// Manage branches
#[derive(clap::Subcommand, Clone, Debug)]
pub enum BranchCommand {
    /// List branches
    List,
    /// Create a branch
    New {
        /// Branch name
        name: String,
        /// Revision the branch points at [default: HEAD]
        revision: Option<String>,
    },
    /// Delete a branch
    Delete {
        /// Branch name
        name: String,
    },
}

pub fn cmd_branch(ui: &mut Ui, command: &BranchCommand) -> Result<(), CommandError> {
    let repo = open_repo()?;
    match command {
        BranchCommand::List => {
            let current = match repo.refs().head_state()? {
                HeadState::OnBranch(name) | HeadState::Unborn(name) => Some(name),
                HeadState::Detached(_) => None,
            };
            let out = ui.stdout_writer();
            for (name, hash) in repo.refs().list(refs::BRANCH_PREFIX)? {
                let short = name.strip_prefix(refs::BRANCH_PREFIX).unwrap_or(&name);
                let marker = if Some(short) == current.as_deref() {
                    "*"
                } else {
                    " "
                };
                writeln!(out, "{marker} {short} {hash:.12}")?;
            }
        }
        BranchCommand::New { name, revision } => {
            let target = resolve_commit(&repo, revision.as_deref().unwrap_or("HEAD"))?;
            repo.refs().update(
                &refs::branch_ref(name),
                None,
                target,
                &repo.committer_signature(),
                &format!("branch: created at {}", target.hex()),
            )?;
        }
        BranchCommand::Delete { name } => {
            if let HeadState::OnBranch(current) = repo.refs().head_state()?
                && &current == name
            {
                return Err(CommandError::new(format!(
                    "cannot delete the current branch {name:?}"
                )));
            }
            repo.refs().delete(&refs::branch_ref(name), None)?;
        }
    }
    Ok(())
}
