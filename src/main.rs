// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use anyhow::{Context, Result};
use clap::Parser;
use std::process::ExitCode;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use titlefp::config::Cli;
use titlefp::engine::{Engine, EngineConfig};
use titlefp::logging;
use titlefp::saver::{self, SaverConfig};
use titlefp::service;
use titlefp::store::sqlite::{SqliteHashtableStore, SqliteIdentifierStore};

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    logging::init(logging::verbosity_from_count(cli.verbose))?;

    std::fs::create_dir_all(&cli.db_dir)
        .with_context(|| format!("creating db directory {}", cli.db_dir.display()))?;

    let hashtable_store = Arc::new(
        SqliteHashtableStore::open(cli.db_dir.join("hashtable.sqlite"))
            .context("opening hashtable store")?,
    );
    let identifier_store = Arc::new(
        SqliteIdentifierStore::open(cli.db_dir.join("identifiers.sqlite"))
            .context("opening identifier store")?,
    );

    let engine = Arc::new(
        Engine::open(
            hashtable_store,
            identifier_store,
            EngineConfig {
                name_lookup_distance: cli.name_lookup_distance,
            },
        )
        .context("loading engine state")?,
    );

    let (saver_handle, saver_stop) = saver::spawn(
        engine.clone(),
        SaverConfig {
            save_interval_secs: cli.save_interval_secs,
            save_batch_rows: cli.save_batch_rows,
        },
    );

    let runtime = tokio::runtime::Runtime::new().context("building tokio runtime")?;
    let result = runtime.block_on(run_server(engine.clone(), cli.port, cli.workers));

    saver_stop.store(true, Ordering::Relaxed);
    let _ = saver_handle.join();
    saver::save_once(&engine, false);

    result?;
    Ok(ExitCode::SUCCESS)
}

async fn run_server(engine: Arc<Engine>, port: u16, workers: usize) -> Result<()> {
    let app = service::router(engine, workers);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("binding port {port}"))?;
    tracing::info!(port, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        if let Ok(mut sig) =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        {
            sig.recv().await;
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}
