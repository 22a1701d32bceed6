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

//! Engine crate for Zeta, a content-addressed, commit-based source-control
//! system designed for very large repositories.
//!
//! The crate is organized leaves-to-root: object identifiers and codecs at the
//! bottom (`hash_id`, `object`), the object database and its partial-fetch
//! promisor above them (`odb`, `promisor`), then references, the index, diff
//! and merge machinery, and finally the working-tree operations (`worktree`)
//! and repository wiring (`repo`).

#![deny(unused_must_use)]

pub mod cancel;
pub mod config;
pub mod diff;
pub mod file_util;
pub mod files;
pub mod gc;
pub mod hash_id;
pub mod index;
pub mod merge;
pub mod object;
pub mod odb;
pub mod promisor;
pub mod refs;
pub mod repo;
pub mod repo_path;
pub mod revwalk;
pub mod tree_builder;
pub mod worktree;

#[cfg(test)]
mod testing;
