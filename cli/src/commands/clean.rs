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

use zeta_lib::worktree::CleanOptions;

use crate::cli_util::open_repo;
use crate::command_error::CommandError;
use crate::ui::Ui;

/// Remove untracked files from the worktree
#[derive(clap::Args, Clone, Debug)]
pub struct CleanArgs {
    /// Actually remove files (required unless --dry-run)
    #[arg(long, short = 'f')]
    force: bool,
    /// Show what would be removed without removing anything
    #[arg(long, short = 'n')]
    dry_run: bool,
    /// Also remove directories left empty
    #[arg(short = 'd')]
    directories: bool,
}

pub fn cmd_clean(ui: &mut Ui, args: &CleanArgs) -> Result<(), CommandError> {
    if !args.force && !args.dry_run {
        return Err(CommandError::new(
            "refusing to clean; use -f to remove files or -n to preview",
        ));
    }
    let repo = open_repo()?;
    let removed = repo.clean(&CleanOptions {
        dry_run: args.dry_run,
        directories: args.directories,
    })?;
    let out = ui.stdout_writer();
    let verb = if args.dry_run {
        "Would remove"
    } else {
        "Removing"
    };
    for path in &removed {
        writeln!(out, "{verb} {}", path.as_internal_str())?;
    }
    Ok(())
}
