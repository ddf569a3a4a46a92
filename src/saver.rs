// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! The background saver: a dedicated OS thread (not a `tokio` task) that
//! periodically commits dirty hashtable rows to the blob store.
//!
//! Unlike the original, identifier inserts are not held open inside one
//! long-running transaction — `rusqlite`'s default autocommit durably
//! persists each one as it lands, so the saver's job narrows to flushing
//! the hashtable and reporting on the identifier batch size it polls.

use crate::engine::Engine;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

pub struct SaverConfig {
    pub save_interval_secs: u64,
    pub save_batch_rows: u64,
}

/// Spawns the saver loop, returning a handle plus a flag the caller flips
/// to request a clean stop (used by graceful shutdown, which then performs
/// one final synchronous save itself).
pub fn spawn(engine: Arc<Engine>, config: SaverConfig) -> (std::thread::JoinHandle<()>, Arc<AtomicBool>) {
    let stop = Arc::new(AtomicBool::new(false));
    let stop_flag = stop.clone();

    let handle = std::thread::spawn(move || {
        let interval_millis = config.save_interval_secs.saturating_mul(1000);
        while !stop_flag.load(Ordering::Relaxed) {
            std::thread::sleep(POLL_INTERVAL);

            let time_due = engine
                .millis_since_update()
                .map(|elapsed| elapsed >= interval_millis)
                .unwrap_or(false);
            let batch_due = engine.identifiers_since_save() >= config.save_batch_rows;

            if time_due || batch_due {
                save_once(&engine, time_due);
            }
        }
    });

    (handle, stop)
}

/// Performs one save pass; used both by the periodic loop and by the
/// final shutdown flush. `reset_clock` zeroes the "last updated" clock
/// afterwards, matching the original's unconditional reset after every
/// `save()` so the time-based trigger doesn't fire on every subsequent
/// poll tick. The final shutdown flush passes `false`: the process is
/// exiting, so there's no next poll to guard against.
pub fn save_once(engine: &Engine, reset_clock: bool) {
    match engine.flush_dirty_rows() {
        Ok(rows) => {
            let identifiers = engine.identifiers_since_save();
            engine.reset_identifiers_since_save();
            if reset_clock {
                engine.reset_updated();
            }
            if rows > 0 || identifiers > 0 {
                info!(rows, identifiers, "saving done");
            }
        }
        Err(err) => error!(%err, "hashtable save failed, retrying next cycle"),
    }
}
