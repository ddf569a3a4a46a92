// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! The in-memory hashtable: a fixed-size array of row headers, each owning
//! a small, dynamically-sized slot buffer.
//!
//! Concurrency is deliberately *not* handled here — [`crate::engine::Engine`]
//! wraps the whole [`Table`] in a single `parking_lot::RwLock`, matching the
//! teacher's `Arc<RwLock<...>>`-wrapped [`crate::error`]-returning stores.

use crate::error::{Error, Result};
use crate::slot::{Slot, SLOT_BYTES};
use std::sync::atomic::{AtomicBool, Ordering};

/// Row count of a production table: 2^24.
pub const HASHTABLE_SIZE: usize = 1 << 24;
/// Maximum slots a single row may ever hold.
pub const ROW_SLOTS_MAX: usize = 256;
/// Maximum slots sharing the same `(row, hash32)` pair — the per-title cap.
pub const MAX_SLOTS_PER_TITLE: usize = 5;

/// One row: an insertion-ordered slot list plus a dirty flag for the saver.
///
/// `dirty` is an `AtomicBool`, not a plain `bool`: the saver clears it while
/// holding only the table's *read* lock (see [`crate::engine::Engine`]), so
/// the flag must be mutable through a shared `&Row`.
#[derive(Debug, Default)]
pub struct Row {
    slots: Vec<Slot>,
    dirty: AtomicBool,
}

impl Clone for Row {
    fn clone(&self) -> Self {
        Row {
            slots: self.slots.clone(),
            dirty: AtomicBool::new(self.dirty.load(Ordering::Relaxed)),
        }
    }
}

impl Row {
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Relaxed)
    }

    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }
}

/// A reference to one matching slot: its index within the row (needed by
/// [`Table::update`]) and a copy of its current value.
#[derive(Debug, Clone, Copy)]
pub struct SlotRef {
    pub row: u32,
    pub index: usize,
    pub slot: Slot,
}

/// Aggregate counts, exposed through the `GET /stats` route.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    pub used_hashes: u32,
    pub used_slots: u64,
    pub max_slots: u8,
}

/// The fixed-size row array.
///
/// `row_bits` generalizes the spec's "top 24 bits of the 56-bit hash"
/// partition to any power-of-two row count, so unit tests can exercise the
/// same logic against a table far smaller than the 2^24-row production
/// table. `Table::new()` always uses `row_bits = 24`, matching
/// `HASHTABLE_SIZE` exactly.
pub struct Table {
    rows: Vec<Row>,
    row_bits: u32,
}

impl Table {
    /// The production table: exactly `HASHTABLE_SIZE` rows.
    pub fn new() -> Self {
        Self::with_row_bits(24)
    }

    /// A table with `2^row_bits` rows. `row_bits` must be in `1..=24`.
    pub fn with_row_bits(row_bits: u32) -> Self {
        assert!((1..=24).contains(&row_bits));
        let size = 1usize << row_bits;
        Table {
            rows: vec![Row::default(); size],
            row_bits,
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Splits a `hash56` digest into `(row_index, hash32)` for this table's
    /// row count.
    pub fn split(&self, hash56: u64) -> (u32, u32) {
        let shift = 56 - self.row_bits;
        let row_index = (hash56 >> shift) as u32;
        let hash32 = (hash56 & 0xFFFF_FFFF) as u32;
        (row_index, hash32)
    }

    fn row(&self, row_index: u32) -> &Row {
        &self.rows[row_index as usize]
    }

    /// Slots in `row_index` whose `hash32` matches, in insertion order.
    /// Returns at most `MAX_SLOTS_PER_TITLE` entries (the invariant the
    /// table maintains on insert).
    pub fn lookup(&self, row_index: u32, hash32: u32) -> Vec<SlotRef> {
        self.row(row_index)
            .slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.hash32 == hash32)
            .map(|(index, &slot)| SlotRef {
                row: row_index,
                index,
                slot,
            })
            .collect()
    }

    /// Appends a new slot to `row_index`. Fails with [`Error::RowFull`] if
    /// the row is already at [`ROW_SLOTS_MAX`].
    pub fn insert(&mut self, row_index: u32, hash32: u32, data: u64) -> Result<()> {
        let row = &mut self.rows[row_index as usize];
        if row.slots.len() >= ROW_SLOTS_MAX {
            return Err(Error::RowFull { row: row_index });
        }
        row.slots.push(Slot::new(hash32, data));
        row.dirty.store(true, Ordering::Relaxed);
        Ok(())
    }

    /// Overwrites the `data` field of an existing slot in place.
    pub fn update(&mut self, row_index: u32, slot_index: usize, data: u64) {
        let row = &mut self.rows[row_index as usize];
        row.slots[slot_index].data = data;
        row.dirty.store(true, Ordering::Relaxed);
    }

    /// How many slots in `row_index` already share `hash32` (used to
    /// enforce [`MAX_SLOTS_PER_TITLE`] before an unconditional insert).
    pub fn slots_with_hash32(&self, row_index: u32, hash32: u32) -> usize {
        self.row(row_index)
            .slots
            .iter()
            .filter(|s| s.hash32 == hash32)
            .count()
    }

    pub fn is_dirty(&self, row_index: u32) -> bool {
        self.row(row_index).is_dirty()
    }

    /// Clears a row's dirty flag. Callable through a shared reference: the
    /// saver holds only a read lock on the table while it commits rows.
    pub fn clear_dirty(&self, row_index: u32) {
        self.rows[row_index as usize]
            .dirty
            .store(false, Ordering::Relaxed);
    }

    /// Row ids with `dirty == true`, in ascending order.
    pub fn dirty_row_ids(&self) -> Vec<u32> {
        self.rows
            .iter()
            .enumerate()
            .filter(|(_, r)| r.is_dirty())
            .map(|(i, _)| i as u32)
            .collect()
    }

    /// Serializes one row's slots as the on-disk byte-concatenation:
    /// insertion-ordered 12-byte little-endian slots.
    pub fn row_bytes(&self, row_index: u32) -> Vec<u8> {
        let row = self.row(row_index);
        let mut buf = Vec::with_capacity(row.slots.len() * SLOT_BYTES);
        for slot in &row.slots {
            buf.extend_from_slice(&slot.to_bytes());
        }
        buf
    }

    /// Loads a row's slots from a persisted byte blob (the inverse of
    /// [`Table::row_bytes`]). The freshly loaded row's dirty flag is clear.
    pub fn load_row(&mut self, row_index: u32, bytes: &[u8]) {
        let count = bytes.len() / SLOT_BYTES;
        let mut slots = Vec::with_capacity(count);
        for chunk in bytes.chunks_exact(SLOT_BYTES) {
            let arr: [u8; SLOT_BYTES] = chunk.try_into().unwrap();
            slots.push(Slot::from_bytes(&arr));
        }
        self.rows[row_index as usize] = Row {
            slots,
            dirty: AtomicBool::new(false),
        };
    }

    pub fn stats(&self) -> Stats {
        let mut stats = Stats::default();
        for row in &self.rows {
            if !row.is_empty() {
                stats.used_hashes += 1;
            }
            stats.used_slots += row.len() as u64;
            stats.max_slots = stats.max_slots.max(row.len() as u8);
        }
        stats
    }
}

impl Default for Table {
    fn default() -> Self {
        Self::new()
    }
}
