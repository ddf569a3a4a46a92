// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Tracing setup. One call, made once, at the very top of `main`.

use tracing_subscriber::{filter::LevelFilter, fmt::format::FmtSpan, EnvFilter};

/// Installs the global `tracing` subscriber.
///
/// `RUST_LOG` overrides `verbosity` when set. `FmtSpan::CLOSE` logs the
/// duration of each `index`/`identify`/`save` span on completion.
pub fn init(verbosity: LevelFilter) -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(verbosity.into())
                .from_env()?,
        )
        .with_span_events(FmtSpan::CLOSE)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

/// Maps `clap`'s repeated `-v` count onto a `tracing` level, `info` by
/// default.
pub fn verbosity_from_count(count: u8) -> LevelFilter {
    match count {
        0 => LevelFilter::INFO,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}
