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

use zeta_lib::diff::Change;
use zeta_lib::diff::ChangeKind;
use zeta_lib::refs::HeadState;

use crate::cli_util::open_repo;
use crate::command_error::CommandError;
use crate::ui::Ui;

/// Summarize staged and unstaged changes
#[derive(clap::Args, Clone, Debug)]
pub struct StatusArgs {}

pub fn cmd_status(ui: &mut Ui, _args: &StatusArgs) -> Result<(), CommandError> {
    let repo = open_repo()?;
    let report = repo.status()?;
    let out = ui.stdout_writer();

    match repo.refs().head_state()? {
        HeadState::Unborn(branch) => {
            writeln!(out, "On branch {branch}")?;
            writeln!(out, "No commits yet")?;
        }
        HeadState::OnBranch(branch) => writeln!(out, "On branch {branch}")?,
        HeadState::Detached(hash) => writeln!(out, "HEAD detached at {hash:.12}")?,
    }

    if !report.staged.is_empty() {
        writeln!(out)?;
        writeln!(out, "Changes to be committed:")?;
        for change in &report.staged {
            writeln!(out, "\t{}:   {}", verb(change), change.path().as_internal_str())?;
        }
    }

    let (untracked, modified): (Vec<&Change>, Vec<&Change>) = report
        .unstaged
        .iter()
        .partition(|change| change.kind() == ChangeKind::Insert);
    if !modified.is_empty() {
        writeln!(out)?;
        writeln!(out, "Changes not staged for commit:")?;
        for change in modified {
            writeln!(out, "\t{}:   {}", verb(change), change.path().as_internal_str())?;
        }
    }
    if !untracked.is_empty() {
        writeln!(out)?;
        writeln!(out, "Untracked files:")?;
        for change in untracked {
            writeln!(out, "\t{}", change.path().as_internal_str())?;
        }
    }
    if report.staged.is_empty() && report.unstaged.is_empty() {
        writeln!(out, "nothing to commit, working tree clean")?;
    }
    Ok(())
}

fn verb(change: &Change) -> &'static str {
    match change.kind() {
        ChangeKind::Insert => "new file",
        ChangeKind::Delete => "deleted",
        ChangeKind::Modify => "modified",
    }
}
