// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! In-memory stand-ins for [`super::HashtableStore`] and
//! [`super::IdentifierStore`], used by [`crate::engine`]'s unit tests so
//! they never touch the filesystem.

use super::{HashtableStore, IdentifierStore};
use crate::error::Result;
use parking_lot::RwLock;
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct MemoryHashtableStore {
    rows: RwLock<HashMap<u32, Vec<u8>>>,
}

impl HashtableStore for MemoryHashtableStore {
    fn load_row(&self, row_index: u32) -> Result<Option<Vec<u8>>> {
        Ok(self.rows.read().get(&row_index).cloned())
    }

    fn save_row(&self, row_index: u32, bytes: &[u8]) -> Result<()> {
        self.rows.write().insert(row_index, bytes.to_vec());
        Ok(())
    }

    fn row_ids(&self) -> Result<Vec<u32>> {
        Ok(self.rows.read().keys().copied().collect())
    }
}

#[derive(Debug, Default)]
pub struct MemoryIdentifierStore {
    by_meta_id: RwLock<HashMap<u32, Vec<String>>>,
}

impl IdentifierStore for MemoryIdentifierStore {
    fn insert(&self, meta_id: u32, identifier: &str) -> Result<()> {
        self.by_meta_id
            .write()
            .entry(meta_id)
            .or_default()
            .push(identifier.to_string());
        Ok(())
    }

    fn identifiers(&self, meta_id: u32) -> Result<Vec<String>> {
        Ok(self
            .by_meta_id
            .read()
            .get(&meta_id)
            .cloned()
            .unwrap_or_default())
    }

    fn max_meta_id(&self) -> Result<u32> {
        Ok(self.by_meta_id.read().keys().copied().max().unwrap_or(0))
    }
}
