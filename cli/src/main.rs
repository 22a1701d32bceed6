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

use std::process::ExitCode;

use clap::Parser as _;

mod cli_util;
mod command_error;
mod commands;
mod ui;

use crate::command_error::die_error;
use crate::ui::Ui;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("ZETA_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let args = commands::Args::parse();
    let mut ui = Ui::new();
    let result = commands::dispatch(&mut ui, args.command);
    ui.finalize();
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            die_error(&err);
            ExitCode::from(err.code.clamp(0, 255) as u8)
        }
    }
}
