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

//! Environment-driven configuration.
//!
//! There are no configuration files; everything is read from `ZETA_*`
//! variables once at repository open and injected into the components that
//! need it, so no process-global state remains.

use std::path::PathBuf;

use crate::object::Signature;
use crate::object::Timestamp;

/// How aggressively checkout tolerates objects missing from a partial clone.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OptimizeStrategy {
    /// Missing objects fail the operation (after a promisor fetch attempt).
    #[default]
    Eager,
    /// Missing objects become pseudo index entries with no file on disk, to
    /// be materialized one after another by later commands.
    OneAfterAnother,
}

/// Core engine settings from `ZETA_CORE_*` and transport knobs.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    pub accelerator: Option<String>,
    pub optimize_strategy: OptimizeStrategy,
    pub concurrent_transfers: usize,
    pub sharing_root: Option<PathBuf>,
    pub promisor: bool,
    pub merge_text_driver: Option<String>,
    pub editor: Option<String>,
    pub ssl_no_verify: bool,
    pub transport_max_entries: Option<usize>,
    pub transport_large_size: Option<u64>,
    pub transport_external_proxy: Option<String>,
    pub terminal_prompt: bool,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            accelerator: None,
            optimize_strategy: OptimizeStrategy::default(),
            concurrent_transfers: 8,
            sharing_root: None,
            promisor: true,
            merge_text_driver: None,
            editor: None,
            ssl_no_verify: false,
            transport_max_entries: None,
            transport_large_size: None,
            transport_external_proxy: None,
            terminal_prompt: true,
        }
    }
}

impl CoreConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            accelerator: lookup("ZETA_CORE_ACCELERATOR").filter(|value| !value.is_empty()),
            optimize_strategy: match lookup("ZETA_CORE_OPTIMIZE_STRATEGY").as_deref() {
                Some("one-after-another") => OptimizeStrategy::OneAfterAnother,
                _ => OptimizeStrategy::Eager,
            },
            concurrent_transfers: lookup("ZETA_CORE_CONCURRENT_TRANSFERS")
                .and_then(|value| value.parse().ok())
                .filter(|&count| count > 0)
                .unwrap_or(defaults.concurrent_transfers),
            sharing_root: lookup("ZETA_CORE_SHARING_ROOT")
                .filter(|value| !value.is_empty())
                .map(PathBuf::from),
            promisor: lookup("ZETA_CORE_PROMISOR")
                .map(|value| parse_bool(&value))
                .unwrap_or(defaults.promisor),
            merge_text_driver: lookup("ZETA_MERGE_TEXT_DRIVER").filter(|value| !value.is_empty()),
            editor: lookup("ZETA_EDITOR")
                .or_else(|| lookup("EDITOR"))
                .filter(|value| !value.is_empty()),
            ssl_no_verify: lookup("ZETA_SSL_NO_VERIFY")
                .map(|value| parse_bool(&value))
                .unwrap_or(defaults.ssl_no_verify),
            transport_max_entries: lookup("ZETA_TRANSPORT_MAX_ENTRIES")
                .and_then(|value| value.parse().ok()),
            transport_large_size: lookup("ZETA_TRANSPORT_LARGE_SIZE")
                .and_then(|value| value.parse().ok()),
            transport_external_proxy: lookup("ZETA_TRANSPORT_EXTERNAL_PROXY")
                .filter(|value| !value.is_empty()),
            terminal_prompt: lookup("ZETA_TERMINAL_PROMPT")
                .map(|value| parse_bool(&value))
                .unwrap_or(defaults.terminal_prompt),
        }
    }

    /// Whether checkout records missing objects as pseudo index entries
    /// instead of failing.
    pub fn missing_not_failure(&self) -> bool {
        self.optimize_strategy == OptimizeStrategy::OneAfterAnother
    }
}

fn parse_bool(value: &str) -> bool {
    !matches!(value, "" | "0" | "false" | "off" | "no")
}

/// Which signature of a commit an identity describes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IdentityKind {
    Author,
    Committer,
}

impl IdentityKind {
    fn env_prefix(self) -> &'static str {
        match self {
            Self::Author => "ZETA_AUTHOR",
            Self::Committer => "ZETA_COMMITTER",
        }
    }
}

/// Resolves the author/committer signature: `ZETA_*_{NAME,EMAIL,DATE}` with
/// a fallback to the OS account identity.
pub fn signature_from_env(kind: IdentityKind) -> Signature {
    signature_from_lookup(kind, |key| std::env::var(key).ok())
}

pub fn signature_from_lookup(
    kind: IdentityKind,
    lookup: impl Fn(&str) -> Option<String>,
) -> Signature {
    let prefix = kind.env_prefix();
    let name = lookup(&format!("{prefix}_NAME"))
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| {
            let realname = whoami::realname();
            if realname.is_empty() {
                whoami::username()
            } else {
                realname
            }
        });
    let email = lookup(&format!("{prefix}_EMAIL"))
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| {
            format!(
                "{}@{}",
                whoami::username(),
                whoami::fallible::hostname().unwrap_or_else(|_| "localhost".to_owned())
            )
        });
    let timestamp = lookup(&format!("{prefix}_DATE"))
        .and_then(|value| chrono::DateTime::parse_from_rfc3339(&value).ok())
        .map(Timestamp::from_datetime)
        .unwrap_or_else(Timestamp::now);
    Signature {
        name,
        email,
        timestamp,
    }
}
