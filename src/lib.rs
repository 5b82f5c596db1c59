//! Object storage sample operations and the harness that verifies them.
//!
//! The `files` binary exposes upload, download, move, copy, list,
//! make-public, signed URL, metadata and delete operations on top of
//! [`services::storage_service::StorageService`]. The [`harness`] module
//! drives that binary as a subprocess against a throwaway bucket.

pub mod cli;
pub mod commands;
pub mod config;
pub mod db;
pub mod errors;
pub mod handlers;
pub mod harness;
pub mod logging;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
