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

use zeta_lib::repo_path::RepoPathBuf;

use crate::cli_util::open_repo;
use crate::command_error::CommandError;
use crate::ui::Ui;

/// Rename a tracked file
#[derive(clap::Args, Clone, Debug)]
pub struct RenameArgs {
    /// Current path
    from: String,
    /// New path
    to: String,
    /// Overwrite an existing destination
    #[arg(long, short = 'f')]
    force: bool,
}

pub fn cmd_rename(_ui: &mut Ui, args: &RenameArgs) -> Result<(), CommandError> {
    let repo = open_repo()?;
    let from = RepoPathBuf::from_internal_string(args.from.as_str())
        .map_err(|err| CommandError::new(err.to_string()))?;
    let to = RepoPathBuf::from_internal_string(args.to.as_str())
        .map_err(|err| CommandError::new(err.to_string()))?;
    repo.rename(&from, &to, args.force)?;
    Ok(())
}
