// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! The single owning value replacing the original service's module-level
//! globals: the hashtable, the two side-stores, `last_meta_id`, and the
//! "last updated" clock the saver polls. Wrapped in `Arc` by the service
//! entry point and shared with request handlers and the saver thread.

use crate::error::{Error, Result};
use crate::hash;
use crate::slot::{self, Slot};
use crate::store::{HashtableStore, IdentifierStore};
use crate::table::{Stats, Table, MAX_SLOTS_PER_TITLE};
use crate::text;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::warn;

const MIN_TITLE_LEN: usize = 10;
const MIN_NAME_LEN: usize = 2;
const MAX_PROBED_SPANS: usize = 1000;
const MIN_SPAN_LEN: usize = 20;
const MAX_SPAN_LEN: usize = 500;
const TITLE_ONLY_FALLBACK_LEN: usize = 40;
const SPAN_WINDOW_LINES: usize = 5;

/// Tunable knobs that would otherwise be hardcoded constants in the
/// original; kept as `Engine` fields so `src/config.rs`'s CLI flags can
/// drive them.
#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    pub name_lookup_distance: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            name_lookup_distance: 1000,
        }
    }
}

struct State {
    table: Table,
    last_meta_id: u32,
}

/// Outcome of a single `index` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexOutcome {
    pub meta_id: u32,
    pub row: u32,
    pub hash32: u32,
}

/// A located bibliographic reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentifyMatch {
    pub title: String,
    pub name: String,
    pub identifiers: Vec<String>,
}

pub struct Engine {
    state: RwLock<State>,
    identifiers: Arc<dyn IdentifierStore>,
    hashtable_store: Arc<dyn HashtableStore>,
    config: EngineConfig,
    updated_at_millis: AtomicU64,
    identifiers_since_save: AtomicU64,
}

impl Engine {
    /// Builds an `Engine`, loading any previously-persisted rows and
    /// resuming `last_meta_id` from the identifier store's high-water mark.
    pub fn open(
        hashtable_store: Arc<dyn HashtableStore>,
        identifiers: Arc<dyn IdentifierStore>,
        config: EngineConfig,
    ) -> Result<Self> {
        let mut table = Table::new();
        for row_index in hashtable_store.row_ids()? {
            if let Some(bytes) = hashtable_store.load_row(row_index)? {
                table.load_row(row_index, &bytes);
            }
        }
        let last_meta_id = identifiers.max_meta_id()?;

        Ok(Engine {
            state: RwLock::new(State { table, last_meta_id }),
            identifiers,
            hashtable_store,
            config,
            updated_at_millis: AtomicU64::new(0),
            identifiers_since_save: AtomicU64::new(0),
        })
    }

    /// Indexes one `(title, name, identifiers)` triple.
    ///
    /// Input-shape errors (`TitleLengthOutOfRange`, `NameTooShort`,
    /// `NormalizationOverflow`) and capacity errors (`RowFull`,
    /// `TitleSlotsExhausted`) are returned to the caller, who — per the
    /// service layer's contract — logs and swallows them rather than
    /// surfacing a 5xx.
    pub fn index(&self, title: &str, name: &str, identifiers: Option<&str>) -> Result<IndexOutcome> {
        let span = tracing::info_span!("index");
        let _enter = span.enter();

        let processed_title = text::process(title, text::MAX_TITLE_LEN);
        let norm_title = processed_title.out;
        if norm_title.len() < MIN_TITLE_LEN || norm_title.len() > text::MAX_TITLE_LEN {
            return Err(Error::TitleLengthOutOfRange {
                len: norm_title.len(),
                min: MIN_TITLE_LEN,
                max: text::MAX_TITLE_LEN,
            });
        }

        let norm_name = text::process_name(name)?;
        if norm_name.len() < MIN_NAME_LEN {
            return Err(Error::NameTooShort {
                len: norm_name.len(),
                min: MIN_NAME_LEN,
            });
        }

        let title_hash56 = hash::hash56(&norm_title);
        let name_hash28 = hash::hash28(&norm_name);
        let name_fp = slot::name_fingerprint(name_hash28, norm_name.len());

        let mut state = self.state.write();
        let (row_index, hash32) = state.table.split(title_hash56);
        let candidates = state.table.lookup(row_index, hash32);
        let existing = candidates.iter().find(|c| c.slot.fingerprint() == name_fp).copied();

        let mut meta_id = existing.map(|c| c.slot.meta_id()).unwrap_or(0);
        let had_nonzero_meta_id = meta_id != 0;

        if !had_nonzero_meta_id {
            if existing.is_none() && candidates.len() >= MAX_SLOTS_PER_TITLE {
                warn!(row = row_index, hash32, "MAX_SLOTS_PER_TITLE reached, dropping record");
                return Err(Error::TitleSlotsExhausted { row: row_index, hash32 });
            }
            state.last_meta_id += 1;
            meta_id = state.last_meta_id;
        }

        let mut inserted = 0u32;
        if let Some(raw) = identifiers {
            for token in split_identifiers(raw) {
                self.identifiers.insert(meta_id, token)?;
                inserted += 1;
            }
        }

        if !had_nonzero_meta_id {
            if inserted == 0 {
                state.last_meta_id -= 1;
                meta_id = 0;
            }
            let data = Slot::pack(meta_id, name_hash28, norm_name.len() as u8);
            match existing {
                None => {
                    state.table.insert(row_index, hash32, data)?;
                }
                Some(c) if meta_id != 0 => {
                    state.table.update(row_index, c.index, data);
                }
                Some(_) => {}
            }
        }

        drop(state);
        self.mark_updated(inserted as u64);

        Ok(IndexOutcome { meta_id, row: row_index, hash32 })
    }

    /// Scans `text` for the first bibliographic reference it can locate.
    pub fn identify(&self, text_in: &str) -> Result<Option<IdentifyMatch>> {
        let span = tracing::info_span!("identify");
        let _enter = span.enter();

        let original = truncate_at_char_boundary(text_in, text::MAX_LOOKUP_TEXT_LEN);
        let processed = text::process(original, text::MAX_LOOKUP_TEXT_LEN);
        let original_bytes = original.as_bytes();

        let state = self.state.read();

        let mut probed = 0usize;
        'spans: for i in 0..processed.lines.len() {
            let j_hi = (i + SPAN_WINDOW_LINES).min(processed.lines.len());
            for j in i..j_hi {
                if probed >= MAX_PROBED_SPANS {
                    break 'spans;
                }

                let span_start = processed.lines[i].start;
                let span_end = processed.lines[j].end;
                let span_len = span_end + 1 - span_start;
                if !(MIN_SPAN_LEN..=MAX_SPAN_LEN).contains(&span_len) {
                    continue;
                }
                probed += 1;

                let title_hash56 = hash::hash56(&processed.out[span_start..=span_end]);
                let (row_index, hash32) = state.table.split(title_hash56);
                let candidates = state.table.lookup(row_index, hash32);
                if candidates.is_empty() {
                    continue;
                }

                let orig_start = processed.map[span_start] as usize;
                let orig_end = processed.map[span_end] as usize;

                let mut located: Option<(usize, u8, u32)> = None;
                let mut last_meta_id = 0u32;
                for c in &candidates {
                    let name_hash28 = c.slot.name_hash28();
                    let name_len = c.slot.name_len();
                    last_meta_id = c.slot.meta_id();
                    tracing::debug!(row_index, hash32, name_len, "probing slot");
                    if name_len == 0 {
                        continue;
                    }
                    if let Some(pos) = locate_name_in_original(
                        original_bytes,
                        orig_start,
                        orig_end,
                        name_hash28,
                        name_len as usize,
                        self.config.name_lookup_distance,
                    ) {
                        located = Some((pos, name_len, last_meta_id));
                        break;
                    }
                }

                let (name_info, meta_id) = match located {
                    Some((pos, len, id)) => (Some((pos, len)), id),
                    None => (None, last_meta_id),
                };

                if name_info.is_none() && span_len < TITLE_ONLY_FALLBACK_LEN {
                    continue;
                }

                let title = extract_title(original, orig_start, orig_end);
                let name = name_info
                    .map(|(pos, len)| extract_name(original_bytes, pos, len as usize))
                    .unwrap_or_default();
                let identifiers = if meta_id != 0 {
                    self.identifiers.identifiers(meta_id)?
                } else {
                    Vec::new()
                };

                return Ok(Some(IdentifyMatch { title, name, identifiers }));
            }
        }

        Ok(None)
    }

    pub fn stats(&self) -> Stats {
        self.state.read().table.stats()
    }

    fn mark_updated(&self, identifiers_inserted: u64) {
        self.updated_at_millis.store(now_millis(), Ordering::Relaxed);
        self.identifiers_since_save
            .fetch_add(identifiers_inserted, Ordering::Relaxed);
    }

    /// Milliseconds since the last successful `index`, or `None` if nothing
    /// has been indexed since the process started.
    pub fn millis_since_update(&self) -> Option<u64> {
        let at = self.updated_at_millis.load(Ordering::Relaxed);
        if at == 0 {
            None
        } else {
            Some(now_millis().saturating_sub(at))
        }
    }

    pub fn identifiers_since_save(&self) -> u64 {
        self.identifiers_since_save.load(Ordering::Relaxed)
    }

    /// Called by the saver after a completed flush: resets the identifier
    /// batch counter.
    pub fn reset_identifiers_since_save(&self) {
        self.identifiers_since_save.store(0, Ordering::Relaxed);
    }

    /// Zeroes the "last updated" clock, putting the saver's time-based
    /// trigger back to sleep until the next `index` call. Must be called
    /// whenever a save fires off that trigger, or `millis_since_update()`
    /// stays past the threshold forever and every poll tick re-triggers a
    /// save.
    pub fn reset_updated(&self) {
        self.updated_at_millis.store(0, Ordering::Relaxed);
    }

    /// Flushes every dirty row to the hashtable store under a read lock —
    /// sound because only `index` sets `dirty = true`, under the write
    /// lock, and `index` cannot run concurrently with this.
    pub fn flush_dirty_rows(&self) -> Result<usize> {
        let state = self.state.read();
        let dirty = state.table.dirty_row_ids();
        for &row_index in &dirty {
            let bytes = state.table.row_bytes(row_index);
            self.hashtable_store.save_row(row_index, &bytes)?;
            state.table.clear_dirty(row_index);
        }
        Ok(dirty.len())
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Splits on runs of `,`/` `, dropping empty tokens.
fn split_identifiers(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(|c| c == ',' || c == ' ').filter(|s| !s.is_empty())
}

fn truncate_at_char_boundary(input: &str, max_len: usize) -> &str {
    if input.len() <= max_len {
        return input;
    }
    let mut end = max_len;
    while !input.is_char_boundary(end) {
        end -= 1;
    }
    &input[..end]
}

/// Searches the *original* (un-normalized) text for a byte window whose
/// `hash28` matches `name_hash28`. Scans forward from just past the title
/// span first, then backward; bounded by `distance` bytes either way.
///
/// Matches only succeed when the surname appears in the original text
/// already byte-identical to its normalized form (lowercase, unaccented,
/// unpunctuated) — a known, accepted limitation carried over unchanged.
fn locate_name_in_original(
    original: &[u8],
    orig_start: usize,
    orig_end: usize,
    name_hash28: u32,
    name_len: usize,
    distance: usize,
) -> Option<usize> {
    if name_len == 0 || name_len > original.len() {
        return None;
    }
    let max_start = original.len() - name_len;

    let fwd_start = orig_end + 1;
    let fwd_limit = (orig_end + distance).min(max_start);
    let mut pos = fwd_start;
    while pos <= fwd_limit {
        if hash::hash28(&original[pos..pos + name_len]) == name_hash28 {
            return Some(pos);
        }
        pos += 1;
    }

    if orig_start >= name_len {
        let back_start = orig_start - name_len;
        let back_limit = orig_start.saturating_sub(distance);
        let mut pos = back_start;
        loop {
            if hash::hash28(&original[pos..pos + name_len]) == name_hash28 {
                return Some(pos);
            }
            if pos <= back_limit {
                break;
            }
            pos -= 1;
        }
    }

    None
}

/// Re-extracts the original substring spanning `[orig_start, orig_end]`
/// (inclusive, `orig_end` being the start byte of the last included
/// character), collapsing runs of whitespace to a single space.
fn extract_title(original: &str, orig_start: usize, orig_end: usize) -> String {
    let end_char_len = original[orig_end..]
        .chars()
        .next()
        .map(|c| c.len_utf8())
        .unwrap_or(0);
    let slice = &original[orig_start.min(original.len())..(orig_end + end_char_len).min(original.len())];

    let mut out = String::with_capacity(slice.len());
    let mut prev_ws = false;
    for c in slice.chars() {
        if c.is_whitespace() {
            if !prev_ws && !out.is_empty() {
                out.push(' ');
            }
            prev_ws = true;
        } else {
            out.push(c);
            prev_ws = false;
        }
    }
    if out.ends_with(' ') {
        out.pop();
    }
    out
}

fn extract_name(original: &[u8], pos: usize, len: usize) -> String {
    let end = (pos + len).min(original.len());
    String::from_utf8_lossy(&original[pos.min(original.len())..end])
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::{MemoryHashtableStore, MemoryIdentifierStore};

    fn test_engine() -> Engine {
        Engine::open(
            Arc::new(MemoryHashtableStore::default()),
            Arc::new(MemoryIdentifierStore::default()),
            EngineConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn index_requires_minimum_title_length() {
        let e = test_engine();
        let err = e.index("short", "Smith", Some("id1")).unwrap_err();
        assert!(matches!(err, Error::TitleLengthOutOfRange { .. }));
    }

    #[test]
    fn index_requires_minimum_name_length() {
        let e = test_engine();
        let err = e
            .index("A sufficiently long title here", "A", Some("id1"))
            .unwrap_err();
        assert!(matches!(err, Error::NameTooShort { .. }));
    }

    #[test]
    fn index_without_identifiers_rolls_back_meta_id() {
        // Property 7 setup: a title indexed with no identifiers never
        // consumes a meta_id.
        let e = test_engine();
        let out = e
            .index("A distinctive algorithms paper title", "Smith", None)
            .unwrap();
        assert_eq!(out.meta_id, 0);
        assert_eq!(e.state.read().last_meta_id, 0);
    }

    #[test]
    fn index_with_identifiers_allocates_meta_id() {
        let e = test_engine();
        let out = e
            .index("A distinctive algorithms paper title", "Smith", Some("doi:1"))
            .unwrap();
        assert_ne!(out.meta_id, 0);
    }

    #[test]
    fn meta_ids_increase_monotonically() {
        // Property 7.
        let e = test_engine();
        let a = e
            .index("First distinctive paper title here", "Alpha", Some("id-a"))
            .unwrap();
        let b = e
            .index("Second distinctive paper title here", "Beta", Some("id-b"))
            .unwrap();
        assert!(b.meta_id > a.meta_id);
    }

    #[test]
    fn reindexing_same_title_name_merges_identifiers() {
        let e = test_engine();
        let first = e
            .index("A distinctive algorithms paper title", "Smith", Some("id1"))
            .unwrap();
        let second = e
            .index("A distinctive algorithms paper title", "Smith", Some("id2"))
            .unwrap();
        assert_eq!(first.meta_id, second.meta_id);
        let ids = e.identifiers.identifiers(second.meta_id).unwrap();
        assert_eq!(ids.len(), 2);
    }

    #[test]
    fn sixth_distinct_name_for_same_title_is_dropped() {
        // Property 2 / scenario S5.
        let e = test_engine();
        let names = ["Aaa", "Bbb", "Ccc", "Ddd", "Eee"];
        for n in names {
            e.index("A title shared across many distinct authors", n, Some("id"))
                .unwrap();
        }
        let err = e
            .index("A title shared across many distinct authors", "Fff", Some("id"))
            .unwrap_err();
        assert!(matches!(err, Error::TitleSlotsExhausted { .. }));
    }

    #[test]
    fn identify_recovers_indexed_identifiers() {
        // Property 8.
        let e = test_engine();
        e.index(
            "A remarkably distinctive title about sorting networks",
            "quickauthor",
            Some("doi:99"),
        )
        .unwrap();

        let text = "a remarkably distinctive title about sorting networks\nby quickauthor";
        let found = e.identify(text).unwrap().expect("expected a match");
        assert_eq!(found.identifiers, vec!["doi:99".to_string()]);
        assert_eq!(found.name, "quickauthor");
    }

    #[test]
    fn identify_returns_none_on_unrelated_text() {
        let e = test_engine();
        e.index("A remarkably distinctive sorting networks title", "quickauthor", Some("id"))
            .unwrap();
        assert!(e
            .identify("Completely unrelated text with no indexed title at all")
            .unwrap()
            .is_none());
    }

    #[test]
    fn split_identifiers_collapses_separators() {
        let v: Vec<&str> = split_identifiers("id1, id2,  id3").collect();
        assert_eq!(v, vec!["id1", "id2", "id3"]);
    }
}
