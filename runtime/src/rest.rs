// Copyright 2026 Streamprobe Contributors
// SPDX-License-Identifier: Apache-2.0

//! HTTP REST API for streamprobe.
//!
//! Status requests double as the trigger: the first request for a search
//! result id starts its extraction job, later requests poll it.

use crate::events::{self, JobEvent};
use crate::poller::PollResult;
use crate::registry::SearchResultEntry;
use crate::scheduler::Trigger;
use crate::server::AppState;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use std::convert::Infallible;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, info};

/// Build the axum Router with all REST endpoints.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/input", get(input_query).post(input_form))
        .route("/api/v1/status", get(handle_status))
        .route("/api/v1/events", get(events_sse))
        .route("/api/v1/search", post(handle_search))
        .route("/api/v1/videos/:id", get(handle_video))
        .layer(cors)
        .with_state(state)
}

// ── Handlers ────────────────────────────────────────────────────

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn handle_status(State(state): State<Arc<AppState>>) -> Json<Value> {
    let stats = state.registry.stats();
    Json(json!({
        "running": true,
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_seconds": state.started_at.elapsed().as_secs_f64(),
        "live_browsers": state.scheduler.session().live_browsers(),
        "jobs": stats,
    }))
}

#[derive(Deserialize)]
struct SearchBody {
    results: Vec<SearchResultEntry>,
}

/// Replace the search table. Invalidates every job of the previous search.
async fn handle_search(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SearchBody>,
) -> Response {
    if let Some(bad) = body.results.iter().find(|e| !is_page_url(&e.source_url)) {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({
                "error": "invalid_url",
                "message": format!("id {}: not an http(s) URL: {}", bad.id, bad.source_url),
            })),
        )
            .into_response();
    }

    let generation = state.registry.install_search_results(body.results);
    let entries = state.registry.search_results().len();
    info!(generation, entries, "search results installed");
    state
        .events
        .emit(JobEvent::SearchReset { generation, entries });
    Json(json!({ "generation": generation, "count": entries })).into_response()
}

fn is_page_url(raw: &str) -> bool {
    url::Url::parse(raw)
        .map(|u| matches!(u.scheme(), "http" | "https"))
        .unwrap_or(false)
}

/// Implicit trigger plus poll for one item.
async fn handle_video(State(state): State<Arc<AppState>>, Path(id): Path<u64>) -> Response {
    if state.scheduler.ensure_started(id) == Trigger::Started {
        debug!(id, "job triggered by status request");
    }
    video_response(id, state.poller.poll(id))
}

fn video_response(id: u64, result: PollResult) -> Response {
    match result {
        PollResult::Unknown => (
            StatusCode::NOT_FOUND,
            Json(json!({ "id": id, "status": "not_found", "message": "not found" })),
        )
            .into_response(),
        PollResult::InProgress => (
            StatusCode::ACCEPTED,
            Json(json!({
                "id": id,
                "status": "in_progress",
                "message": "in progress, retry later",
            })),
        )
            .into_response(),
        PollResult::Failed => (
            StatusCode::BAD_GATEWAY,
            Json(json!({ "id": id, "status": "failed", "message": "extraction failed" })),
        )
            .into_response(),
        PollResult::Ready { title, links } => (
            StatusCode::OK,
            Json(json!({ "id": id, "status": "ready", "title": title, "items": links })),
        )
            .into_response(),
    }
}

/// SSE query parameters.
#[derive(Deserialize, Default)]
struct EventsParams {
    id: Option<u64>,
}

/// Server-Sent Events endpoint streaming job events.
///
/// Optionally filters by item via `?id=7`.
async fn events_sse(
    Query(params): Query<EventsParams>,
    State(state): State<Arc<AppState>>,
) -> Sse<impl futures::Stream<Item = Result<Event, Infallible>>> {
    let mut rx = state.events.subscribe();
    let id_filter = params.id;

    let stream = async_stream::stream! {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if let Some(id) = id_filter {
                        if !events::event_matches_id(&event, id) {
                            continue;
                        }
                    }
                    if let Ok(json) = serde_json::to_string(&event) {
                        yield Ok(Event::default().data(json));
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}

#[derive(Deserialize, Default)]
struct InputParams {
    #[serde(default)]
    input: String,
}

async fn input_query(
    State(state): State<Arc<AppState>>,
    Query(params): Query<InputParams>,
) -> Json<Value> {
    Json(input_list(&state, &params.input))
}

async fn input_form(
    State(state): State<Arc<AppState>>,
    Form(params): Form<InputParams>,
) -> Json<Value> {
    Json(input_list(&state, &params.input))
}

/// MSX list template listing the current search results.
fn input_list(state: &AppState, input: &str) -> Value {
    info!(input, "input received");
    let items: Vec<Value> = state
        .registry
        .search_results()
        .into_iter()
        .map(|entry| {
            json!({
                "id": entry.id,
                "title": format!("Item {}", entry.id),
                "titleFooter": entry.source_url,
            })
        })
        .collect();

    json!({
        "type": "list",
        "headline": "Template",
        "template": {
            "type": "separate",
            "layout": "0,0,2,4",
            "color": "msx-glass",
            "icon": "msx-white-soft:movie",
            "iconSize": "medium",
            "title": "Title",
            "titleFooter": "Title Footer"
        },
        "items": items,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::poller::label_links;

    #[test]
    fn test_video_response_status_codes() {
        let status = |result| video_response(1, result).status();
        assert_eq!(status(PollResult::Unknown), StatusCode::NOT_FOUND);
        assert_eq!(status(PollResult::InProgress), StatusCode::ACCEPTED);
        assert_eq!(status(PollResult::Failed), StatusCode::BAD_GATEWAY);

        let ready = PollResult::Ready {
            title: "T".into(),
            links: label_links("T", &["https://a/master.m3u8".to_string()]),
        };
        assert_eq!(video_response(1, ready).status(), StatusCode::OK);
    }

    #[test]
    fn test_is_page_url() {
        assert!(is_page_url("https://example.com/watch/1"));
        assert!(is_page_url("http://example.com"));
        assert!(!is_page_url("ftp://example.com/file"));
        assert!(!is_page_url("example.com/watch"));
    }
}
