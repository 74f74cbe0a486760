//! Scenario server used as a live target by the pipeline's integration tests.
//!
//! # Design
//! Every route models one behaviour the client has to cope with: a note
//! store for ordinary JSON round-trips, an endpoint that fails a configurable
//! number of times before succeeding, one that demands a bearer token, echo
//! endpoints for form and query payloads, and one that answers with any
//! requested status code. State lives behind async locks so concurrent
//! requests never interfere.

use std::{collections::HashMap, sync::Arc};

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::{net::TcpListener, sync::RwLock};
use tracing::debug;
use uuid::Uuid;

/// Token accepted by `/protected`.
pub const SECRET_TOKEN: &str = "let-me-in";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub id: Uuid,
    pub title: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Deserialize)]
pub struct CreateNote {
    pub title: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Body returned by `/flaky/{key}` once it stops failing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FlakyReport {
    pub key: String,
    pub attempts: u32,
}

#[derive(Deserialize)]
pub struct FlakyParams {
    #[serde(default)]
    pub failures: u32,
}

#[derive(Default)]
pub struct AppState {
    notes: RwLock<HashMap<Uuid, Note>>,
    hits: RwLock<HashMap<String, u32>>,
}

pub type Shared = Arc<AppState>;

pub fn app() -> Router {
    let state: Shared = Arc::new(AppState::default());
    Router::new()
        .route("/notes", get(list_notes).post(create_note))
        .route("/notes/{id}", get(get_note).delete(delete_note))
        .route("/flaky/{key}", get(flaky))
        .route("/protected", get(protected))
        .route("/echo", post(echo))
        .route("/form", post(form))
        .route("/search", get(search))
        .route("/status/{code}", get(status))
        .with_state(state)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

async fn list_notes(State(state): State<Shared>) -> Json<Vec<Note>> {
    let notes = state.notes.read().await;
    Json(notes.values().cloned().collect())
}

async fn create_note(
    State(state): State<Shared>,
    Json(input): Json<CreateNote>,
) -> (StatusCode, Json<Note>) {
    let note = Note {
        id: Uuid::new_v4(),
        title: input.title,
        tags: input.tags,
    };
    state.notes.write().await.insert(note.id, note.clone());
    (StatusCode::CREATED, Json(note))
}

async fn get_note(
    State(state): State<Shared>,
    Path(id): Path<Uuid>,
) -> Result<Json<Note>, StatusCode> {
    let notes = state.notes.read().await;
    notes.get(&id).cloned().map(Json).ok_or(StatusCode::NOT_FOUND)
}

async fn delete_note(
    State(state): State<Shared>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, StatusCode> {
    let mut notes = state.notes.write().await;
    notes.remove(&id).map(|_| StatusCode::NO_CONTENT).ok_or(StatusCode::NOT_FOUND)
}

/// Fails with 503 for the first `failures` hits on `key`, then succeeds.
async fn flaky(
    State(state): State<Shared>,
    Path(key): Path<String>,
    Query(params): Query<FlakyParams>,
) -> Response {
    let attempts = {
        let mut hits = state.hits.write().await;
        let count = hits.entry(key.clone()).or_insert(0);
        *count += 1;
        *count
    };
    debug!(%key, attempts, failures = params.failures, "flaky hit");
    if attempts <= params.failures {
        return (StatusCode::SERVICE_UNAVAILABLE, "warming up").into_response();
    }
    Json(FlakyReport { key, attempts }).into_response()
}

async fn protected(headers: HeaderMap) -> Response {
    let expected = format!("Bearer {SECRET_TOKEN}");
    let authorized = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value == expected);
    if authorized {
        Json(serde_json::json!({ "access": "granted" })).into_response()
    } else {
        (StatusCode::UNAUTHORIZED, "missing or invalid token").into_response()
    }
}

/// Returns the request body and content type unchanged.
async fn echo(headers: HeaderMap, body: Bytes) -> Response {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("application/octet-stream")
        .to_string();
    ([(header::CONTENT_TYPE, content_type)], body).into_response()
}

async fn form(Form(fields): Form<HashMap<String, String>>) -> Json<HashMap<String, String>> {
    Json(fields)
}

async fn search(Query(params): Query<HashMap<String, String>>) -> Json<HashMap<String, String>> {
    Json(params)
}

async fn status(Path(code): Path<u16>) -> Response {
    match StatusCode::from_u16(code) {
        Ok(status) => (status, format!("status {code}")).into_response(),
        Err(_) => (StatusCode::BAD_REQUEST, "unsupported status").into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn note_serializes_to_json() {
        let note = Note {
            id: Uuid::nil(),
            title: "Test".to_string(),
            tags: vec!["a".to_string()],
        };
        let json = serde_json::to_value(&note).unwrap();
        assert_eq!(json["id"], "00000000-0000-0000-0000-000000000000");
        assert_eq!(json["title"], "Test");
        assert_eq!(json["tags"][0], "a");
    }

    #[test]
    fn create_note_defaults_tags_to_empty() {
        let input: CreateNote = serde_json::from_str(r#"{"title":"No tags"}"#).unwrap();
        assert_eq!(input.title, "No tags");
        assert!(input.tags.is_empty());
    }

    #[test]
    fn create_note_rejects_missing_title() {
        let result: Result<CreateNote, _> = serde_json::from_str(r#"{"tags":[]}"#);
        assert!(result.is_err());
    }

    #[test]
    fn flaky_params_default_to_no_failures() {
        let params: FlakyParams = serde_json::from_str("{}").unwrap();
        assert_eq!(params.failures, 0);
    }
}
