//! Liveness and readiness for `files serve`.
//!
//! Readiness means the metadata schema is migrated and the payload
//! directory accepts writes. Anything else surfaces as 503 with the failing
//! check named in the body.

use std::path::Path;

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use sqlx::SqlitePool;
use tokio::fs;
use uuid::Uuid;

use crate::state::AppState;

/// Tables the object routes read from.
const REQUIRED_TABLES: [&str; 2] = ["buckets", "objects"];

#[derive(Serialize)]
struct Status {
    status: &'static str,
}

#[derive(Serialize)]
struct Readiness {
    status: &'static str,
    checks: Vec<Check>,
}

#[derive(Serialize)]
struct Check {
    name: &'static str,
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl Check {
    fn from_result(name: &'static str, result: Result<(), String>) -> Self {
        Check {
            name,
            ok: result.is_ok(),
            error: result.err(),
        }
    }
}

/// `GET /healthz`: the process is up. No I/O.
pub async fn healthz() -> impl IntoResponse {
    Json(Status { status: "ok" })
}

/// `GET /readyz`
pub async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    let checks = vec![
        Check::from_result("schema", schema_migrated(&state.storage.db).await),
        Check::from_result("storage", payload_dir_writable(&state.storage.base_path).await),
    ];

    let ready = checks.iter().all(|check| check.ok);
    let (code, status) = if ready {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "unavailable")
    };
    (code, Json(Readiness { status, checks }))
}

async fn schema_migrated(db: &SqlitePool) -> Result<(), String> {
    let present: Vec<String> = sqlx::query_scalar(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name IN ('buckets', 'objects')",
    )
    .fetch_all(db)
    .await
    .map_err(|err| err.to_string())?;

    let missing: Vec<&str> = REQUIRED_TABLES
        .iter()
        .copied()
        .filter(|table| !present.iter().any(|name| name.as_str() == *table))
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(format!("missing tables: {}", missing.join(", ")))
    }
}

async fn payload_dir_writable(base_path: &Path) -> Result<(), String> {
    let marker = base_path.join(format!(".readyz-{}", Uuid::new_v4()));
    fs::write(&marker, b"").await.map_err(|err| {
        format!("cannot write under {}: {}", base_path.display(), err)
    })?;
    // A stale marker does not make the store unready.
    let _ = fs::remove_file(&marker).await;
    Ok(())
}
