//! Task event stream (SSE) and the repository file tree.
//!
//! The stream endpoint replays the durable log up to the subscriber's
//! cursor, then switches to live delivery from the broadcast channel.
//! The live subscription is opened before the replay query so no event
//! can fall between the two; duplicates across the seam are dropped by
//! sequence number, and clients key idempotence on `(task_id, seq)`.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        Json,
    },
};
use futures::stream::{self, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::services::event_bus::TaskEvent;

use super::api::{ApiState, ErrorResponse};

#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    /// Resume after this sequence number.
    #[serde(default)]
    pub since_seq: Option<u64>,
}

/// SSE stream of one task's events.
pub async fn stream_task(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<Uuid>,
    Query(query): Query<StreamQuery>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, (StatusCode, Json<ErrorResponse>)> {
    // Subscribe first so nothing can slip between replay and live.
    let receiver = state.bus.subscribe();

    let replayed = state.bus.replay(id, query.since_seq).await.map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse { error: e.to_string(), code: "replay_failed".to_string() }),
        )
    })?;

    let last_replayed = replayed.last().map(|e| e.seq);
    let resume_floor = last_replayed.or(query.since_seq);

    let replay_stream = stream::iter(replayed.into_iter().map(|e| Ok(sse_event(&e))));
    let live_stream = live_task_stream(receiver, id, resume_floor);

    let keepalive = Duration::from_millis(state.config.sse_keepalive_ms);
    Ok(Sse::new(replay_stream.chain(live_stream))
        .keep_alive(KeepAlive::new().interval(keepalive)))
}

fn sse_event(event: &TaskEvent) -> Event {
    Event::default()
        .event(event.kind.as_str())
        .id(event.seq.to_string())
        .data(serde_json::to_string(event).unwrap_or_default())
}

/// Live delivery from the broadcast receiver, filtered to one task and
/// deduplicated against the replay by sequence number.
fn live_task_stream(
    receiver: broadcast::Receiver<TaskEvent>,
    task_id: Uuid,
    resume_floor: Option<u64>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    stream::unfold(receiver, move |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if event.task_id != task_id {
                        continue;
                    }
                    if resume_floor.is_some_and(|floor| event.seq <= floor) {
                        continue;
                    }
                    return Some((Ok(sse_event(&event)), rx));
                }
                Err(broadcast::error::RecvError::Closed) => return None,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    // Subscribers reconcile lost events via replay.
                    let warning = Event::default()
                        .event("warning")
                        .data(format!("{{\"type\":\"lagged\",\"missed_events\":{n}}}"));
                    return Some((Ok(warning), rx));
                }
            }
        }
    })
}

// =========================================================================
// File tree
// =========================================================================

#[derive(Debug, Deserialize)]
pub struct FileTreeQuery {
    pub repo_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct FileNode {
    pub name: String,
    pub path: String,
    pub is_dir: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<FileNode>,
}

const MAX_TREE_DEPTH: usize = 8;
const MAX_TREE_ENTRIES: usize = 2000;

/// Nested file-node tree of a registered repository.
pub async fn file_tree(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<FileTreeQuery>,
) -> Result<Json<FileNode>, (StatusCode, Json<ErrorResponse>)> {
    let repo = state
        .repos
        .get(query.repo_id)
        .await
        .map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse { error: e.to_string(), code: "internal".to_string() }),
            )
        })?
        .ok_or_else(|| {
            (
                StatusCode::NOT_FOUND,
                Json(ErrorResponse {
                    error: "repository not found".to_string(),
                    code: "repo_not_found".to_string(),
                }),
            )
        })?;

    let root = std::path::PathBuf::from(&repo.path);
    let name = repo.name.clone();
    let tree = tokio::task::spawn_blocking(move || {
        let mut budget = MAX_TREE_ENTRIES;
        build_tree(&root, &name, "", 0, &mut budget)
    })
    .await
    .map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse { error: e.to_string(), code: "internal".to_string() }),
        )
    })?;

    Ok(Json(tree))
}

fn build_tree(
    dir: &std::path::Path,
    name: &str,
    rel: &str,
    depth: usize,
    budget: &mut usize,
) -> FileNode {
    let mut node = FileNode {
        name: name.to_string(),
        path: rel.to_string(),
        is_dir: true,
        children: Vec::new(),
    };

    if depth >= MAX_TREE_DEPTH || *budget == 0 {
        return node;
    }

    let Ok(entries) = std::fs::read_dir(dir) else {
        return node;
    };

    let mut entries: Vec<_> = entries.flatten().collect();
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        if *budget == 0 {
            break;
        }
        let entry_name = entry.file_name().to_string_lossy().into_owned();
        if entry_name.starts_with('.')
            || matches!(entry_name.as_str(), "node_modules" | "target" | "__pycache__" | "venv")
        {
            continue;
        }

        let child_rel = if rel.is_empty() {
            entry_name.clone()
        } else {
            format!("{rel}/{entry_name}")
        };

        let file_type = entry.file_type();
        if file_type.as_ref().map(|t| t.is_dir()).unwrap_or(false) {
            *budget = budget.saturating_sub(1);
            node.children
                .push(build_tree(&entry.path(), &entry_name, &child_rel, depth + 1, budget));
        } else if file_type.map(|t| t.is_file()).unwrap_or(false) {
            *budget = budget.saturating_sub(1);
            node.children.push(FileNode {
                name: entry_name,
                path: child_rel,
                is_dir: false,
                children: Vec::new(),
            });
        }
    }

    node
}
