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

use zeta_lib::repo::Repository;

use crate::command_error::CommandError;
use crate::ui::Ui;

/// Create an empty repository
#[derive(clap::Args, Clone, Debug)]
pub struct InitArgs {
    /// Where to create the repository [default: current directory]
    path: Option<PathBuf>,
}

pub fn cmd_init(ui: &mut Ui, args: &InitArgs) -> Result<(), CommandError> {
    let root = match &args.path {
        Some(path) => {
            std::fs::create_dir_all(path)?;
            path.clone()
        }
        None => std::env::current_dir()?,
    };
    let repo = Repository::init(&root)?;
    writeln!(
        ui.stdout_writer(),
        "Initialized empty Zeta repository in {}",
        repo.zeta_dir().display()
    )?;
    Ok(())
}
