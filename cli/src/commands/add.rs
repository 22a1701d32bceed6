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

/// Stage worktree changes into the index
#[derive(clap::Args, Clone, Debug)]
pub struct AddArgs {
    /// Paths (files or directory prefixes) to stage
    #[arg(required_unless_present = "all")]
    paths: Vec<String>,
    /// Stage every change in the worktree
    #[arg(long, short = 'A')]
    all: bool,
}

pub fn cmd_add(_ui: &mut Ui, args: &AddArgs) -> Result<(), CommandError> {
    let repo = open_repo()?;
    let mut paths = vec![];
    if !args.all {
        for path in &args.paths {
            paths.push(
                RepoPathBuf::from_internal_string(path.as_str())
                    .map_err(|err| CommandError::new(err.to_string()))?,
            );
        }
    }
    repo.stage(&paths)?;
    Ok(())
}
