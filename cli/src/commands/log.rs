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

use zeta_lib::revwalk::WalkOrder;
use zeta_lib::revwalk::rev_list;

use crate::cli_util::open_repo;
use crate::cli_util::resolve_commit;
use crate::cli_util::write_commit_header;
use crate::command_error::CommandError;
use crate::ui::Ui;

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
enum OrderArg {
    Bfs,
    Topo,
    Date,
}

impl From<OrderArg> for WalkOrder {
    fn from(order: OrderArg) -> Self {
        match order {
            OrderArg::Bfs => Self::Bfs,
            OrderArg::Topo => Self::Topo,
            OrderArg::Date => Self::Date,
        }
    }
}

/// Show commit history
#[derive(clap::Args, Clone, Debug)]
pub struct LogArgs {
    /// Revisions to walk from; prefix with `^` to exclude a revision's
    /// ancestors [default: HEAD]
    revisions: Vec<String>,
    /// Exclude these revisions and their ancestors
    #[arg(long)]
    not: Vec<String>,
    /// Commit emission order
    #[arg(long, value_enum, default_value = "date")]
    order: OrderArg,
    /// Limit the number of commits shown
    #[arg(long, short = 'n')]
    max_count: Option<usize>,
}

pub fn cmd_log(ui: &mut Ui, args: &LogArgs) -> Result<(), CommandError> {
    let repo = open_repo()?;
    let mut positives = vec![];
    let mut negatives = vec![];
    for revision in &args.revisions {
        match revision.strip_prefix('^') {
            Some(revision) => negatives.push(resolve_commit(&repo, revision)?),
            None => positives.push(resolve_commit(&repo, revision)?),
        }
    }
    for revision in &args.not {
        negatives.push(resolve_commit(&repo, revision)?);
    }
    if positives.is_empty() {
        positives.push(resolve_commit(&repo, "HEAD")?);
    }

    let commits = rev_list(
        repo.odb(),
        &positives,
        &negatives,
        args.order.into(),
        args.max_count,
    )?;
    ui.request_pager();
    for hash in commits {
        let commit = repo.odb().commit(&hash)?;
        write_commit_header(ui.stdout_writer(), &hash, &commit)?;
    }
    Ok(())
}
