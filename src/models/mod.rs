//! Core data models for buckets and objects.
//!
//! These map to database tables via `sqlx::FromRow` and serialize as JSON
//! via `serde`.

pub mod bucket;
pub mod object;
