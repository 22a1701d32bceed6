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

use regex::RegexBuilder;

use crate::cli_util::open_repo;
use crate::cli_util::resolve_commit;
use crate::command_error::CommandError;
use crate::ui::Ui;

/// Search tracked file contents
#[derive(clap::Args, Clone, Debug)]
pub struct GrepArgs {
    /// Regular expression to search for
    pattern: String,
    /// Search the tree of this revision instead of the worktree
    revision: Option<String>,
    /// Case-insensitive matching
    #[arg(long, short = 'i')]
    ignore_case: bool,
    /// Print line numbers
    #[arg(long, short = 'n')]
    line_number: bool,
}

pub fn cmd_grep(ui: &mut Ui, args: &GrepArgs) -> Result<(), CommandError> {
    let repo = open_repo()?;
    let pattern = RegexBuilder::new(&args.pattern)
        .case_insensitive(args.ignore_case)
        .build()?;
    let rev = match &args.revision {
        Some(revision) => Some(resolve_commit(&repo, revision)?),
        None => None,
    };
    let matches = repo.grep(&pattern, rev.as_ref())?;

    ui.request_pager();
    let out = ui.stdout_writer();
    for found in &matches {
        if args.line_number {
            writeln!(
                out,
                "{}:{}:{}",
                found.path.as_internal_str(),
                found.line_number,
                found.line
            )?;
        } else {
            writeln!(out, "{}:{}", found.path.as_internal_str(), found.line)?;
        }
    }
    if matches.is_empty() {
        return Err(CommandError::with_code(1, ""));
    }
    Ok(())
}
