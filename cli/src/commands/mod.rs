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

mod add;
mod branch;
mod cat;
mod checkout;
mod clean;
mod commit;
mod gc;
mod grep;
mod init;
mod log;
mod merge_tree;
mod rename;
mod reset;
mod show;
mod status;
mod switch;

use crate::command_error::CommandError;
use crate::ui::Ui;

#[derive(clap::Parser, Debug)]
#[command(name = "zeta", version, about = "A source-control engine for very large repositories")]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(clap::Subcommand, Debug)]
pub enum Command {
    Add(add::AddArgs),
    #[command(subcommand)]
    Branch(branch::BranchCommand),
    Cat(cat::CatArgs),
    Checkout(checkout::CheckoutArgs),
    Clean(clean::CleanArgs),
    Commit(commit::CommitArgs),
    Gc(gc::GcArgs),
    Grep(grep::GrepArgs),
    Init(init::InitArgs),
    Log(log::LogArgs),
    MergeTree(merge_tree::MergeTreeArgs),
    Rename(rename::RenameArgs),
    Reset(reset::ResetArgs),
    Show(show::ShowArgs),
    Status(status::StatusArgs),
    Switch(switch::SwitchArgs),
}

pub fn dispatch(ui: &mut Ui, command: Command) -> Result<(), CommandError> {
    match command {
        Command::Add(args) => add::cmd_add(ui, &args),
        Command::Branch(command) => branch::cmd_branch(ui, &command),
        Command::Cat(args) => cat::cmd_cat(ui, &args),
        Command::Checkout(args) => checkout::cmd_checkout(ui, &args),
        Command::Clean(args) => clean::cmd_clean(ui, &args),
        Command::Commit(args) => commit::cmd_commit(ui, &args),
        Command::Gc(args) => gc::cmd_gc(ui, &args),
        Command::Grep(args) => grep::cmd_grep(ui, &args),
        Command::Init(args) => init::cmd_init(ui, &args),
        Command::Log(args) => log::cmd_log(ui, &args),
        Command::MergeTree(args) => merge_tree::cmd_merge_tree(ui, &args),
        Command::Rename(args) => rename::cmd_rename(ui, &args),
        Command::Reset(args) => reset::cmd_reset(ui, &args),
        Command::Show(args) => show::cmd_show(ui, &args),
        Command::Status(args) => status::cmd_status(ui, &args),
        Command::Switch(args) => switch::cmd_switch(ui, &args),
    }
}
