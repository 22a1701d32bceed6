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

//! Error type carried out of subcommands, with its process exit code.

use std::io;

use thiserror::Error;
use zeta_lib::diff::DiffError;
use zeta_lib::gc::GcError;
use zeta_lib::index::IndexError;
use zeta_lib::merge::MergeError;
use zeta_lib::odb::OdbError;
use zeta_lib::refs::RefError;
use zeta_lib::repo::RepoError;
use zeta_lib::worktree::WorktreeError;

/// Terminal failure of a subcommand. `code` becomes the process exit code;
/// an empty message suppresses the diagnostic line.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct CommandError {
    pub code: i32,
    pub message: String,
}

impl CommandError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: 1,
            message: message.into(),
        }
    }

    /// An explicit exit signal, e.g. `merge-tree` reporting conflicts.
    pub fn with_code(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Prints the shared one-line diagnostic for a fatal error.
pub fn die_error(err: &CommandError) {
    if !err.message.is_empty() {
        eprintln!("zeta: {}", err.message);
    }
}

/// Prints a non-fatal warning.
pub fn warn(message: impl AsRef<str>) {
    eprintln!("warning: {}", message.as_ref());
}

impl From<io::Error> for CommandError {
    fn from(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::BrokenPipe {
            // The pager was closed; nothing is wrong.
            Self::with_code(0, "")
        } else {
            Self::new(err.to_string())
        }
    }
}

macro_rules! from_error {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for CommandError {
                fn from(err: $ty) -> Self {
                    Self::new(err.to_string())
                }
            }
        )*
    };
}

from_error!(
    RepoError,
    WorktreeError,
    OdbError,
    RefError,
    MergeError,
    IndexError,
    DiffError,
    GcError,
    serde_json::Error,
    regex::Error,
);
