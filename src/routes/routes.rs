//! Routes served by `files serve`.
//!
//! - `GET  /healthz`, `GET /readyz`: probes
//! - `GET  /{bucket}/{*key}`: download a public object or a signed URL
//! - `HEAD /{bucket}/{*key}`: headers only
//!
//! The wildcard `*key` allows nested keys like `photos/2025/img.jpg`.

use crate::{
    handlers::{
        health_handlers::{healthz, readyz},
        object_handlers::{get_object, head_object},
    },
    state::AppState,
};
use axum::{Router, routing::get};

/// Build the router. State is attached by the caller.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/{bucket}/{*key}", get(get_object).head(head_object))
}
