// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Command-line surface, `clap`-derived.

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "titlefp-server", about = env!("CARGO_PKG_DESCRIPTION"))]
pub struct Cli {
    /// Directory holding `hashtable.sqlite` and `identifiers.sqlite`; created if missing.
    #[arg(short, long)]
    pub db_dir: PathBuf,

    /// HTTP listen port.
    #[arg(short, long)]
    pub port: u16,

    /// Bounded worker-pool / concurrency-limit size.
    #[arg(long, default_value_t = 16)]
    pub workers: usize,

    /// Saver's "now - last_update" flush threshold, in seconds.
    #[arg(long, default_value_t = 10)]
    pub save_interval_secs: u64,

    /// Identifier-batch flush threshold (row count).
    #[arg(long, default_value_t = 50_000_000)]
    pub save_batch_rows: u64,

    /// Surname search window, in bytes, on either side of a candidate title span.
    #[arg(long, default_value_t = 1000)]
    pub name_lookup_distance: usize,

    /// Raises the log level; repeatable (`-v`, `-vv`, ...).
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}
