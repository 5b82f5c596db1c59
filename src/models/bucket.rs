//! Represents a logical bucket: a top-level container for objects.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A storage bucket.
///
/// Buckets act as namespaces for objects. Names are globally unique and
/// follow DNS naming rules.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct Bucket {
    /// Unique identifier for this bucket (UUID for internal DB use).
    pub id: Uuid,

    /// Globally unique bucket name.
    pub name: String,

    /// Location the bucket was created in (e.g. "us-central1").
    pub location: String,

    /// Default storage class applied to new objects.
    pub storage_class: String,

    /// When this bucket was created.
    pub created_at: DateTime<Utc>,
}
