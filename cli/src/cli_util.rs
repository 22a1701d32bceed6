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

//! Shared plumbing for subcommands: repository discovery, revision
//! resolution, commit-message acquisition, and header formatting.

use std::io::IsTerminal as _;
use std::io::Read as _;
use std::path::PathBuf;
use std::process::Command;

use zeta_lib::diff::Change;
use zeta_lib::diff::ChangeKind;
use zeta_lib::hash_id::HashID;
use zeta_lib::object::Commit;
use zeta_lib::object::Signature;
use zeta_lib::object::Timestamp;
use zeta_lib::repo::Repository;

use crate::command_error::CommandError;

/// Opens the repository containing the current directory.
pub fn open_repo() -> Result<Repository, CommandError> {
    let cwd = std::env::current_dir()?;
    Ok(Repository::discover(&cwd)?)
}

/// Resolves a revision argument to a commit id (following tags).
pub fn resolve_commit(repo: &Repository, revision: &str) -> Result<HashID, CommandError> {
    let hash = repo.resolve_revision(revision)?;
    Ok(repo.odb().peel_to_commit_id(&hash)?)
}

pub fn format_timestamp(timestamp: &Timestamp) -> String {
    match timestamp.to_datetime() {
        Ok(datetime) => datetime.format("%a %b %-d %H:%M:%S %Y %z").to_string(),
        Err(_) => "<out of range>".to_owned(),
    }
}

pub fn format_signature(signature: &Signature) -> String {
    format!("{} <{}>", signature.name, signature.email)
}

/// The `log`/`show` commit header.
pub fn write_commit_header(
    out: &mut dyn std::io::Write,
    hash: &HashID,
    commit: &Commit,
) -> std::io::Result<()> {
    writeln!(out, "commit {hash}")?;
    if commit.parents.len() > 1 {
        let parents: Vec<String> = commit
            .parents
            .iter()
            .map(|parent| parent.hex()[..12].to_owned())
            .collect();
        writeln!(out, "Merge: {}", parents.join(" "))?;
    }
    writeln!(out, "Author: {}", format_signature(&commit.author))?;
    writeln!(out, "Date:   {}", format_timestamp(&commit.author.timestamp))?;
    writeln!(out)?;
    for line in commit.message.lines() {
        writeln!(out, "    {line}")?;
    }
    writeln!(out)?;
    Ok(())
}

/// Obtains the commit message: `-m` flag, then `-F` file (`-` for stdin),
/// then piped stdin, then the editor on `COMMIT_EDITMSG` populated with a
/// commented template listing the staged paths.
pub fn acquire_commit_message(
    repo: &Repository,
    message: Option<String>,
    file: Option<PathBuf>,
    staged: &[Change],
) -> Result<String, CommandError> {
    if let Some(message) = message {
        return Ok(normalize_message(&message));
    }
    if let Some(file) = file {
        let raw = if file.as_os_str() == "-" {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        } else {
            std::fs::read_to_string(&file)?
        };
        return Ok(normalize_message(&raw));
    }
    if !std::io::stdin().is_terminal() {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        let message = normalize_message(&buf);
        if message.is_empty() {
            return Err(CommandError::new(
                "Aborting commit due to empty commit message.",
            ));
        }
        return Ok(message);
    }

    // Editor prompt with a template listing the staged paths.
    let editmsg_path = repo.zeta_dir().join("COMMIT_EDITMSG");
    let mut template = String::from(
        "\n# Please enter the commit message for your changes. Lines starting\n# with '#' will be ignored, and an empty message aborts the commit.\n#\n# Changes to be committed:\n",
    );
    for change in staged {
        let verb = match change.kind() {
            ChangeKind::Insert => "new file",
            ChangeKind::Delete => "deleted",
            ChangeKind::Modify => "modified",
        };
        template.push_str(&format!(
            "#\t{}:   {}\n",
            verb,
            change.path().as_internal_str()
        ));
    }
    std::fs::write(&editmsg_path, &template)?;

    let editor = repo
        .config()
        .editor
        .clone()
        .unwrap_or_else(|| "vi".to_owned());
    let mut words = editor.split_whitespace();
    let program = words
        .next()
        .ok_or_else(|| CommandError::new("empty editor command"))?;
    let status = Command::new(program)
        .args(words)
        .arg(&editmsg_path)
        .status()
        .map_err(|err| CommandError::new(format!("failed to launch editor {editor}: {err}")))?;
    if !status.success() {
        return Err(CommandError::new("editor exited with an error"));
    }

    let edited = std::fs::read_to_string(&editmsg_path)?;
    let message = normalize_message(&edited);
    if message.is_empty() {
        return Err(CommandError::new(
            "Aborting commit due to empty commit message.",
        ));
    }
    Ok(message)
}

/// Strips comment lines and trailing blank lines; guarantees a trailing
/// newline on a non-empty message.
fn normalize_message(raw: &str) -> String {
    let mut message = String::new();
    for line in raw.lines() {
        if line.starts_with('#') {
            continue;
        }
        message.push_str(line);
        message.push('\n');
    }
    while message.ends_with("\n\n") {
        message.pop();
    }
    if message == "\n" {
        message.clear();
    }
    message
}
