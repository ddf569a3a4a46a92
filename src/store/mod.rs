// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Persistence: two stores backing the hashtable's rows and the
//! identifier multimap, both `rusqlite`-backed (see [`sqlite`]).
//!
//! [`crate::engine::Engine`] depends only on the [`HashtableStore`] and
//! [`IdentifierStore`] traits, never on `rusqlite` directly, so unit tests
//! can swap in [`memory::MemoryStores`] and never touch the filesystem.

pub mod memory;
pub mod sqlite;

use crate::error::Result;

/// Row-blob persistence for the hashtable: one row id maps to its
/// insertion-ordered, 12-byte-slot-concatenated blob.
pub trait HashtableStore: Send + Sync {
    fn load_row(&self, row_index: u32) -> Result<Option<Vec<u8>>>;
    fn save_row(&self, row_index: u32, bytes: &[u8]) -> Result<()>;
    /// All row ids with a persisted blob, for startup load.
    fn row_ids(&self) -> Result<Vec<u32>>;
}

/// The identifiers multimap: many identifier strings per `meta_id`.
pub trait IdentifierStore: Send + Sync {
    fn insert(&self, meta_id: u32, identifier: &str) -> Result<()>;
    fn identifiers(&self, meta_id: u32) -> Result<Vec<String>>;
    /// The highest `meta_id` already persisted, for resuming numbering on
    /// restart. `0` if the store is empty.
    fn max_meta_id(&self) -> Result<u32>;
}
