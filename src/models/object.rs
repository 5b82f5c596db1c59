//! Represents an object (file) stored in a bucket.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Metadata for a single object (blob) within a bucket.
///
/// The struct stores metadata only; payload bytes live on disk.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct Object {
    /// Internal UUID for DB indexing.
    pub id: Uuid,

    /// Foreign key linking to the parent bucket.
    pub bucket_id: Uuid,

    /// Object key (path-like identifier within the bucket).
    pub key: String,

    /// Content type (MIME type).
    pub content_type: Option<String>,

    /// Size in bytes.
    pub size_bytes: i64,

    /// Hex MD5 of the payload.
    pub etag: String,

    /// Base64 MD5 of the payload.
    pub md5_hash: String,

    /// Storage class (e.g., STANDARD, NEARLINE).
    pub storage_class: String,

    /// Content generation. Changes every time the payload is written.
    pub generation: i64,

    /// Metadata generation. Starts at 1 and is bumped on metadata updates.
    pub metageneration: i64,

    /// Customer-managed encryption key the object was written with.
    pub kms_key_name: Option<String>,

    /// Whether the object can be read without credentials.
    pub is_public: bool,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    /// Whether the object is marked as deleted (soft delete).
    pub is_deleted: bool,
}
