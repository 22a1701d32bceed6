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

//! Writer abstraction over stdout or a spawned pager child.

use std::io;
use std::io::Write;
use std::process::Child;
use std::process::ChildStdin;
use std::process::Command;
use std::process::Stdio;

use crossterm::tty::IsTty as _;

enum UiOutput {
    Terminal { stdout: io::Stdout },
    Paged { child: Child, child_stdin: ChildStdin },
}

impl UiOutput {
    fn new_terminal() -> Self {
        Self::Terminal {
            stdout: io::stdout(),
        }
    }

    fn new_paged(pager_cmd: &str) -> io::Result<Self> {
        let mut words = pager_cmd.split_whitespace();
        let program = words.next().ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "empty pager command")
        })?;
        let mut cmd = Command::new(program);
        cmd.args(words);
        // The pager child gets a scrubbed environment: our settings win over
        // whatever the user exported for other tools.
        cmd.env_remove("PAGER");
        cmd.env_remove("LESS");
        cmd.env_remove("LV");
        cmd.env("LESS", "FRX");
        cmd.env("LV", "-c");
        tracing::info!(?cmd, "spawning pager");
        let mut child = cmd.stdin(Stdio::piped()).spawn()?;
        let child_stdin = child.stdin.take().unwrap();
        Ok(Self::Paged { child, child_stdin })
    }
}

/// Owns process output. At most one pager child exists; closing is
/// idempotent and happens on drop at the latest.
pub struct Ui {
    pager_cmd: String,
    color: bool,
    is_tty: bool,
    output: Option<UiOutput>,
}

impl Ui {
    pub fn new() -> Self {
        let pager_cmd = std::env::var("ZETA_PAGER")
            .or_else(|_| std::env::var("PAGER"))
            .unwrap_or_else(|_| "less".to_owned());
        let is_tty = io::stdout().is_tty();
        Self {
            pager_cmd,
            color: is_tty && std::env::var_os("NO_COLOR").is_none(),
            is_tty,
            output: Some(UiOutput::new_terminal()),
        }
    }

    /// Whether stdout is a terminal (pager aside).
    pub fn is_terminal(&self) -> bool {
        self.is_tty
    }

    /// Whether color output is appropriate.
    pub fn color(&self) -> bool {
        self.color
    }

    /// Routes subsequent output through the pager. A no-op when stdout is
    /// not a terminal, when paging is already active, or when the pager
    /// cannot be spawned.
    pub fn request_pager(&mut self) {
        if !self.is_tty || matches!(self.output, Some(UiOutput::Paged { .. })) {
            return;
        }
        match UiOutput::new_paged(&self.pager_cmd) {
            Ok(output) => self.output = Some(output),
            Err(err) => {
                tracing::warn!(?err, "failed to spawn pager; falling back to stdout");
            }
        }
    }

    pub fn stdout_writer(&mut self) -> &mut dyn Write {
        match self.output.as_mut().expect("output is finalized") {
            UiOutput::Terminal { stdout } => stdout,
            UiOutput::Paged { child_stdin, .. } => child_stdin,
        }
    }

    /// Closes the pager (if any) and waits for it to exit. Idempotent.
    pub fn finalize(&mut self) {
        let Some(output) = self.output.take() else {
            return;
        };
        match output {
            UiOutput::Terminal { mut stdout } => {
                let _ = stdout.flush();
                self.output = Some(UiOutput::new_terminal());
            }
            UiOutput::Paged {
                mut child,
                child_stdin,
            } => {
                drop(child_stdin);
                if let Err(err) = child.wait() {
                    // It's possible the pager died or was killed; not fatal.
                    tracing::warn!(?err, "failed to wait on pager");
                }
                self.output = Some(UiOutput::new_terminal());
            }
        }
    }
}

impl Default for Ui {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Ui {
    fn drop(&mut self) {
        self.finalize();
    }
}
