// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! `rusqlite`-backed implementations of [`super::HashtableStore`] and
//! [`super::IdentifierStore`], one file each, mirroring the split between
//! `hashtable.sqlite` and `identifiers.sqlite`.

use super::{HashtableStore, IdentifierStore};
use crate::error::Result;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

/// Row-blob store backing the hashtable. One row per dirty table row,
/// `INSERT OR REPLACE`d on every saver pass.
pub struct SqliteHashtableStore {
    conn: Mutex<Connection>,
}

impl SqliteHashtableStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS hashtable (id INTEGER PRIMARY KEY, data BLOB)",
            [],
        )?;
        Ok(SqliteHashtableStore {
            conn: Mutex::new(conn),
        })
    }
}

impl HashtableStore for SqliteHashtableStore {
    fn load_row(&self, row_index: u32) -> Result<Option<Vec<u8>>> {
        let conn = self.conn.lock();
        let data = conn
            .query_row(
                "SELECT data FROM hashtable WHERE id = ?1",
                params![row_index],
                |row| row.get::<_, Vec<u8>>(0),
            )
            .optional()?;
        Ok(data)
    }

    fn save_row(&self, row_index: u32, bytes: &[u8]) -> Result<()> {
        self.conn.lock().execute(
            "INSERT OR REPLACE INTO hashtable (id, data) VALUES (?1, ?2)",
            params![row_index, bytes],
        )?;
        Ok(())
    }

    fn row_ids(&self) -> Result<Vec<u32>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT id FROM hashtable")?;
        let ids = stmt
            .query_map([], |row| row.get::<_, u32>(0))?
            .collect::<std::result::Result<Vec<u32>, _>>()?;
        Ok(ids)
    }
}

/// Identifier multimap store. `(meta_id, identifier)` is unique, so a
/// re-indexed title can't duplicate an identifier it already carries.
pub struct SqliteIdentifierStore {
    conn: Mutex<Connection>,
}

impl SqliteIdentifierStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS identifiers (meta_id INTEGER, identifier TEXT)",
            [],
        )?;
        conn.execute(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_meta_id_identifier \
             ON identifiers (meta_id, identifier)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_meta_id ON identifiers (meta_id)",
            [],
        )?;
        Ok(SqliteIdentifierStore {
            conn: Mutex::new(conn),
        })
    }
}

impl IdentifierStore for SqliteIdentifierStore {
    fn insert(&self, meta_id: u32, identifier: &str) -> Result<()> {
        self.conn.lock().execute(
            "INSERT OR IGNORE INTO identifiers (meta_id, identifier) VALUES (?1, ?2)",
            params![meta_id, identifier],
        )?;
        Ok(())
    }

    fn identifiers(&self, meta_id: u32) -> Result<Vec<String>> {
        let conn = self.conn.lock();
        let mut stmt =
            conn.prepare("SELECT identifier FROM identifiers WHERE meta_id = ?1 LIMIT 50")?;
        let ids = stmt
            .query_map(params![meta_id], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(ids)
    }

    fn max_meta_id(&self) -> Result<u32> {
        let conn = self.conn.lock();
        let max: Option<u32> =
            conn.query_row("SELECT MAX(meta_id) FROM identifiers", [], |row| row.get(0))?;
        Ok(max.unwrap_or(0))
    }
}
