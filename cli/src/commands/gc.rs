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

use zeta_lib::gc::PackObjectsOptions;
use zeta_lib::gc::parse_duration;

use crate::cli_util::open_repo;
use crate::command_error::CommandError;
use crate::ui::Ui;

/// Roll loose objects up into packs
#[derive(clap::Args, Clone, Debug)]
pub struct GcArgs {
    /// Only pack loose objects older than this (e.g. `14d`, `2h`, `now`)
    #[arg(long, value_name = "DURATION")]
    prune: Option<String>,
}

pub fn cmd_gc(ui: &mut Ui, args: &GcArgs) -> Result<(), CommandError> {
    let repo = open_repo()?;
    let pack_older_than = match &args.prune {
        Some(input) => Some(parse_duration(input).ok_or_else(|| {
            CommandError::new(format!("invalid duration {input:?} (try 14d, 2h, or now)"))
        })?),
        None => None,
    };
    let summary = repo.gc(&PackObjectsOptions { pack_older_than })?;
    // Also consolidate loose references while we're here.
    let packed_refs = repo.refs().pack_refs()?;
    writeln!(
        ui.stdout_writer(),
        "Packed {} objects ({} bytes) and {packed_refs} references",
        summary.packed,
        summary.bytes
    )?;
    Ok(())
}
