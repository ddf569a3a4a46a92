// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! The HTTP surface: `POST /index`, `POST /identify`, `GET /stats`.

use crate::engine::Engine;
use axum::{
    extract::{DefaultBodyLimit, State},
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::warn;

/// Reproduces the original's `onion_set_max_post_size(50_000_000)`.
const MAX_BODY_BYTES: usize = 50_000_000;

#[derive(Debug, Deserialize)]
pub struct IndexRequestItem {
    pub title: String,
    pub name: String,
    pub identifiers: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct IndexResponse {
    pub indexed: u32,
}

#[derive(Debug, Deserialize)]
pub struct IdentifyRequest {
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub used_hashes: u32,
    pub used_slots: u64,
    pub max_slots: u8,
}

/// Builds the router. `worker_limit` bounds the number of requests
/// in-flight concurrently, standing in for the original's fixed-size
/// worker-thread pool.
pub fn router(engine: Arc<Engine>, worker_limit: usize) -> Router {
    Router::new()
        .route("/index", post(index))
        .route("/identify", post(identify))
        .route("/stats", get(stats))
        .with_state(engine)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(ConcurrencyLimitLayer::new(worker_limit))
        .layer(TraceLayer::new_for_http())
}

async fn index(
    State(engine): State<Arc<Engine>>,
    Json(items): Json<Vec<IndexRequestItem>>,
) -> Json<IndexResponse> {
    let mut indexed = 0u32;
    for item in items {
        match engine.index(&item.title, &item.name, item.identifiers.as_deref()) {
            Ok(_) => indexed += 1,
            Err(err) => warn!(%err, title = %item.title, "index request item dropped"),
        }
    }
    Json(IndexResponse { indexed })
}

async fn identify(State(engine): State<Arc<Engine>>, Json(req): Json<IdentifyRequest>) -> Json<Value> {
    let start = Instant::now();
    match engine.identify(&req.text) {
        Ok(Some(found)) => Json(json!({
            "time": start.elapsed().as_micros() as u64,
            "title": found.title,
            "name": found.name,
            "identifiers": found.identifiers.join(","),
        })),
        Ok(None) => Json(json!({})),
        Err(err) => {
            warn!(%err, "identify request failed");
            Json(json!({}))
        }
    }
}

async fn stats(State(engine): State<Arc<Engine>>) -> Json<StatsResponse> {
    let stats = engine.stats();
    Json(StatsResponse {
        used_hashes: stats.used_hashes,
        used_slots: stats.used_slots,
        max_slots: stats.max_slots,
    })
}
