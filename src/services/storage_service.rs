//! src/services/storage_service.rs
//!
//! StorageService: bucket and object operations backed by SQLite for
//! metadata and local disk for object payloads. Payloads are sharded beneath
//! `base_path/{bucket}/{shard}/{shard}/{key}`.

use crate::models::{bucket::Bucket, object::Object};
use base64::{Engine as _, engine::general_purpose};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::{Stream, StreamExt, pin_mut};
use md5::Context;
use sqlx::{QueryBuilder, SqlitePool, sqlite::Sqlite};
use std::{
    collections::BTreeSet,
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    sync::Arc,
};
use thiserror::Error;
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tokio_util::io::ReaderStream;
use tracing::debug;
use uuid::Uuid;

#[derive(Clone, Debug, Default)]
pub struct ListObjectsParams {
    pub prefix: Option<String>,
    pub delimiter: Option<String>,
    pub continuation_token: Option<String>,
    pub max_keys: usize,
}

#[derive(Debug)]
pub struct ListObjectsResult {
    pub objects: Vec<Object>,
    pub common_prefixes: Vec<String>,
    pub is_truncated: bool,
    pub next_continuation_token: Option<String>,
}

/// Options applied when writing a new object payload.
#[derive(Clone, Debug, Default)]
pub struct UploadOptions {
    pub content_type: Option<String>,
    pub kms_key_name: Option<String>,
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("bucket `{0}` not found")]
    BucketNotFound(String),
    #[error("bucket `{0}` already exists")]
    BucketAlreadyExists(String),
    #[error("bucket `{0}` is not empty")]
    BucketNotEmpty(String),
    #[error("bucket `{name}` invalid: {reason}")]
    InvalidBucketName { name: String, reason: String },
    #[error("location `{0}` is not supported")]
    UnsupportedLocation(String),
    #[error("object `{key}` not found in bucket `{bucket}`")]
    ObjectNotFound { bucket: String, key: String },
    #[error("invalid object key")]
    InvalidObjectKey,
    #[error("source and destination are both `{0}`")]
    SameSourceAndDestination(String),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// StorageService provides the bucket and object operations used by the
/// `files` CLI, the HTTP surface and the test harness:
/// - create / delete buckets
/// - upload, download, copy, move, delete objects
/// - list objects by prefix and delimiter
/// - flip the public flag on an object
#[derive(Clone)]
pub struct StorageService {
    /// Shared SQLite connection pool used for metadata operations.
    pub db: Arc<SqlitePool>,

    /// Base directory on disk where object payloads are stored.
    pub base_path: PathBuf,
}

const MAX_OBJECT_KEY_LEN: usize = 1024;
const BUCKET_NAME_MIN_LEN: usize = 3;
const BUCKET_NAME_MAX_LEN: usize = 63;
const DEFAULT_STORAGE_CLASS: &str = "STANDARD";
const SUPPORTED_LOCATIONS: [&str; 12] = [
    "local",
    "us",
    "eu",
    "asia",
    "us-central1",
    "us-east1",
    "us-west1",
    "europe-west1",
    "europe-north1",
    "asia-east1",
    "asia-northeast1",
    "australia-southeast1",
];

const OBJECT_COLUMNS: &str = "id, bucket_id, key, content_type, size_bytes, etag, md5_hash, \
     storage_class, generation, metageneration, kms_key_name, is_public, created_at, \
     updated_at, is_deleted";

/// Payload facts for a metadata upsert.
struct ObjectWrite<'a> {
    key: &'a str,
    content_type: Option<String>,
    size_bytes: i64,
    etag: String,
    md5_hash: String,
    kms_key_name: Option<String>,
}

impl StorageService {
    /// Create a new StorageService backed by the provided SQLite pool and
    /// using `base_path` as the root directory for object payloads.
    pub fn new(db: Arc<SqlitePool>, base_path: impl Into<PathBuf>) -> Self {
        Self {
            db,
            base_path: base_path.into(),
        }
    }

    /// Connect to `database_url`, apply migrations and make sure
    /// `base_path` exists.
    pub async fn open(database_url: &str, base_path: impl Into<PathBuf>) -> StorageResult<Self> {
        let base_path = base_path.into();
        if !base_path.exists() {
            fs::create_dir_all(&base_path).await?;
            debug!("created storage directory at {}", base_path.display());
        }
        let pool = crate::db::connect(database_url).await?;
        Ok(Self::new(Arc::new(pool), base_path))
    }

    /// Basic key validation to avoid trivial path traversal vectors.
    ///
    /// Rejects keys that begin with `/` or contain `..`.
    fn ensure_key_safe(&self, key: &str) -> StorageResult<()> {
        if key.is_empty() {
            return Err(StorageError::InvalidObjectKey);
        }
        if key.len() > MAX_OBJECT_KEY_LEN {
            return Err(StorageError::InvalidObjectKey);
        }
        if key.starts_with('/') || key.contains("..") {
            return Err(StorageError::InvalidObjectKey);
        }
        if key
            .bytes()
            .any(|b| b.is_ascii_control() || b == b'\\' || b == b'\0')
        {
            return Err(StorageError::InvalidObjectKey);
        }
        Ok(())
    }

    /// Validate bucket name format.
    ///
    /// - 3–63 characters
    /// - lowercase letters, digits, dots, hyphens only
    /// - cannot start/end with dot or hyphen
    /// - cannot contain consecutive dots or dot-hyphen patterns
    /// - cannot look like an IPv4 address
    fn ensure_bucket_name_safe(&self, name: &str) -> StorageResult<()> {
        let trimmed = name.trim();
        if trimmed != name {
            return Err(StorageError::InvalidBucketName {
                name: name.to_string(),
                reason: "cannot begin or end with whitespace".into(),
            });
        }

        let len = name.len();
        if !(BUCKET_NAME_MIN_LEN..=BUCKET_NAME_MAX_LEN).contains(&len) {
            return Err(StorageError::InvalidBucketName {
                name: name.to_string(),
                reason: "must be between 3 and 63 characters".into(),
            });
        }

        if !name
            .chars()
            .all(|c| matches!(c, 'a'..='z' | '0'..='9' | '.' | '-'))
        {
            return Err(StorageError::InvalidBucketName {
                name: name.to_string(),
                reason: "allowed characters are lowercase letters, digits, dots, and hyphens"
                    .into(),
            });
        }

        if name.starts_with('.')
            || name.ends_with('.')
            || name.starts_with('-')
            || name.ends_with('-')
        {
            return Err(StorageError::InvalidBucketName {
                name: name.to_string(),
                reason: "must start and end with a lowercase letter or digit".into(),
            });
        }

        if name.contains("..") || name.contains("-.") || name.contains(".-") {
            return Err(StorageError::InvalidBucketName {
                name: name.to_string(),
                reason: "cannot contain consecutive dots or dot-hyphen combinations".into(),
            });
        }

        if is_ipv4_like(name) {
            return Err(StorageError::InvalidBucketName {
                name: name.to_string(),
                reason: "must not be formatted like an IP address".into(),
            });
        }

        Ok(())
    }

    fn ensure_location_valid(&self, location: &str) -> StorageResult<()> {
        if SUPPORTED_LOCATIONS
            .iter()
            .any(|candidate| candidate.eq_ignore_ascii_case(location))
        {
            Ok(())
        } else {
            Err(StorageError::UnsupportedLocation(location.to_string()))
        }
    }

    fn bucket_root(&self, bucket_name: &str) -> PathBuf {
        let mut path = self.base_path.clone();
        path.push(bucket_name);
        path
    }

    /// Two-level shard identifiers for an object key: the first two bytes of
    /// MD5(bucket/key) as lowercase hex.
    fn object_shards(bucket_name: &str, key: &str) -> (String, String) {
        let digest = md5::compute(format!("{}/{}", bucket_name, key));
        (format!("{:02x}", digest[0]), format!("{:02x}", digest[1]))
    }

    /// Fully-qualified payload path: base_path/bucket/{shard}/{shard}/{key}.
    /// Parent directories may not exist yet.
    fn object_path(&self, bucket_name: &str, key: &str) -> PathBuf {
        let (shard_a, shard_b) = Self::object_shards(bucket_name, key);
        let mut path = self.bucket_root(bucket_name);
        path.push(shard_a);
        path.push(shard_b);
        path.push(key);
        path
    }

    /// Create the payload's parent directory and return a fresh temp path
    /// beside it.
    async fn staging_path(&self, file_path: &Path) -> StorageResult<PathBuf> {
        let parent = file_path.parent().map(Path::to_path_buf).ok_or_else(|| {
            StorageError::Io(io::Error::new(
                ErrorKind::Other,
                "object path missing parent directory",
            ))
        })?;
        fs::create_dir_all(&parent).await?;
        Ok(parent.join(format!(".tmp-{}", Uuid::new_v4())))
    }

    /// Move a fully written temp file into its final location.
    async fn commit_staged(&self, tmp_path: &Path, file_path: &Path) -> StorageResult<()> {
        if let Err(err) = fs::rename(tmp_path, file_path).await {
            if err.kind() == ErrorKind::AlreadyExists {
                fs::remove_file(file_path).await?;
                fs::rename(tmp_path, file_path).await?;
            } else {
                let _ = fs::remove_file(tmp_path).await;
                return Err(StorageError::Io(err));
            }
        }
        Ok(())
    }

    async fn fetch_bucket(&self, bucket: &str) -> StorageResult<Bucket> {
        self.ensure_bucket_name_safe(bucket)?;
        sqlx::query_as::<Sqlite, Bucket>(
            "SELECT id, name, location, storage_class, created_at
             FROM buckets WHERE name = ?",
        )
        .bind(bucket)
        .fetch_one(&*self.db)
        .await
        .map_err(|err| match err {
            sqlx::Error::RowNotFound => StorageError::BucketNotFound(bucket.to_string()),
            other => StorageError::Sqlx(other),
        })
    }

    /// Fetch a non-deleted object metadata record.
    async fn fetch_object(&self, bucket: &Bucket, key: &str) -> StorageResult<Object> {
        let sql = format!(
            "SELECT {OBJECT_COLUMNS} FROM objects
             WHERE key = ? AND bucket_id = ? AND is_deleted = 0"
        );
        sqlx::query_as::<_, Object>(&sql)
            .bind(key)
            .bind(bucket.id)
            .fetch_one(&*self.db)
            .await
            .map_err(|err| match err {
                sqlx::Error::RowNotFound => StorageError::ObjectNotFound {
                    bucket: bucket.name.clone(),
                    key: key.to_string(),
                },
                other => StorageError::Sqlx(other),
            })
    }

    /// Insert or overwrite the metadata row for `write.key`.
    ///
    /// Overwrites start a new generation, reset the metageneration and the
    /// public flag, and revive soft-deleted rows.
    async fn upsert_object(
        &self,
        bucket: &Bucket,
        write: ObjectWrite<'_>,
    ) -> Result<Object, sqlx::Error> {
        let now = Utc::now();
        let sql = format!(
            r#"
            INSERT INTO objects (
                id, bucket_id, key, content_type, size_bytes, etag, md5_hash,
                storage_class, generation, metageneration, kms_key_name, is_public,
                created_at, updated_at, is_deleted
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 1, ?, 0, ?, ?, 0)
            ON CONFLICT(bucket_id, key) DO UPDATE SET
                content_type = excluded.content_type,
                size_bytes = excluded.size_bytes,
                etag = excluded.etag,
                md5_hash = excluded.md5_hash,
                storage_class = excluded.storage_class,
                generation = excluded.generation,
                metageneration = 1,
                kms_key_name = excluded.kms_key_name,
                is_public = 0,
                created_at = excluded.created_at,
                updated_at = excluded.updated_at,
                is_deleted = 0
            RETURNING {OBJECT_COLUMNS}
            "#
        );

        sqlx::query_as::<_, Object>(&sql)
            .bind(Uuid::new_v4())
            .bind(bucket.id)
            .bind(write.key)
            .bind(write.content_type)
            .bind(write.size_bytes)
            .bind(write.etag)
            .bind(write.md5_hash)
            .bind(&bucket.storage_class)
            .bind(generation_at(now))
            .bind(write.kms_key_name)
            .bind(now)
            .bind(now)
            .fetch_one(&*self.db)
            .await
    }

    /// Stream-upload an object to disk and update metadata.
    ///
    /// - Writes bytes incrementally to a temporary file.
    /// - Computes MD5 and size while streaming.
    /// - Atomically renames into final location.
    /// - Upserts the metadata row (overwrite semantics).
    pub async fn upload_object_stream<S>(
        &self,
        bucket: &str,
        key: &str,
        options: UploadOptions,
        stream: S,
    ) -> StorageResult<Object>
    where
        S: Stream<Item = io::Result<Bytes>> + Send + 'static,
    {
        self.ensure_key_safe(key)?;
        let bucket_rec = self.fetch_bucket(bucket).await?;

        let file_path = self.object_path(&bucket_rec.name, key);
        let tmp_path = self.staging_path(&file_path).await?;
        let mut file = File::create(&tmp_path).await?;

        let mut size_bytes: i64 = 0;
        let mut digest = Context::new();
        pin_mut!(stream);
        while let Some(chunk_res) = stream.next().await {
            let chunk = match chunk_res {
                Ok(chunk) => chunk,
                Err(err) => {
                    let _ = fs::remove_file(&tmp_path).await;
                    return Err(StorageError::Io(err));
                }
            };
            size_bytes += chunk.len() as i64;
            digest.consume(&chunk);
            if let Err(err) = file.write_all(&chunk).await {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(StorageError::Io(err));
            }
        }
        if let Err(err) = file.flush().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StorageError::Io(err));
        }
        if let Err(err) = file.sync_all().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StorageError::Io(err));
        }
        drop(file);

        self.commit_staged(&tmp_path, &file_path).await?;

        let digest = digest.compute();
        let write = ObjectWrite {
            key,
            content_type: options.content_type,
            size_bytes,
            etag: format!("{:x}", digest),
            md5_hash: general_purpose::STANDARD.encode(digest.0),
            kms_key_name: options.kms_key_name,
        };

        match self.upsert_object(&bucket_rec, write).await {
            Ok(obj) => Ok(obj),
            Err(err) => {
                let _ = fs::remove_file(&file_path).await;
                Err(StorageError::Sqlx(err))
            }
        }
    }

    /// Upload a local file under `key`.
    ///
    /// The content type is guessed from the file extension unless
    /// `options.content_type` is set.
    pub async fn upload_file(
        &self,
        bucket: &str,
        key: &str,
        path: &Path,
        mut options: UploadOptions,
    ) -> StorageResult<Object> {
        let file = File::open(path).await?;
        if options.content_type.is_none() {
            options.content_type = guess_content_type(path).map(str::to_string);
        }
        self.upload_object_stream(bucket, key, options, ReaderStream::new(file))
            .await
    }

    /// Fetch an object for reading.
    ///
    /// Returns metadata and an opened File handle ready for streaming out.
    /// Returns ObjectNotFound if metadata exists but physical file is missing.
    pub async fn get_object_reader(
        &self,
        bucket: &str,
        key: &str,
    ) -> StorageResult<(Object, File)> {
        self.ensure_key_safe(key)?;
        let bucket_rec = self.fetch_bucket(bucket).await?;
        let object = self.fetch_object(&bucket_rec, key).await?;

        let file_path = self.object_path(&bucket_rec.name, key);
        let file = File::open(&file_path).await.map_err(|err| {
            if err.kind() == io::ErrorKind::NotFound {
                StorageError::ObjectNotFound {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                }
            } else {
                StorageError::Io(err)
            }
        })?;

        Ok((object, file))
    }

    /// Copy an object's payload into a local file at `dest`.
    pub async fn download_to_path(
        &self,
        bucket: &str,
        key: &str,
        dest: &Path,
    ) -> StorageResult<Object> {
        let (object, mut source) = self.get_object_reader(bucket, key).await?;
        if let Some(parent) = dest.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        let mut out = File::create(dest).await?;
        tokio::io::copy(&mut source, &mut out).await?;
        out.flush().await?;
        Ok(object)
    }

    /// Fetch only object metadata.
    pub async fn get_object_metadata(&self, bucket: &str, key: &str) -> StorageResult<Object> {
        self.ensure_key_safe(key)?;
        let bucket_rec = self.fetch_bucket(bucket).await?;
        self.fetch_object(&bucket_rec, key).await
    }

    /// Whether a live object exists under `key`.
    ///
    /// A missing bucket is an error, a missing object is `false`.
    pub async fn object_exists(&self, bucket: &str, key: &str) -> StorageResult<bool> {
        match self.get_object_metadata(bucket, key).await {
            Ok(_) => Ok(true),
            Err(StorageError::ObjectNotFound { .. }) => Ok(false),
            Err(err) => Err(err),
        }
    }

    pub async fn bucket_exists(&self, name: &str) -> StorageResult<bool> {
        match self.fetch_bucket(name).await {
            Ok(_) => Ok(true),
            Err(StorageError::BucketNotFound(_)) => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// List objects in lexicographical key order.
    ///
    /// Supports prefix filtering, delimiter grouping and continuation
    /// tokens. Soft-deleted objects are never returned.
    pub async fn list_objects(
        &self,
        bucket: &str,
        params: ListObjectsParams,
    ) -> StorageResult<ListObjectsResult> {
        let bucket_rec = self.fetch_bucket(bucket).await?;
        let max_keys = params.max_keys.clamp(1, 1000);
        let fetch_limit = max_keys + 1;

        let mut builder = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {OBJECT_COLUMNS} FROM objects WHERE bucket_id = "
        ));
        builder.push_bind(bucket_rec.id);
        builder.push(" AND is_deleted = 0");

        // LIKE is case-insensitive in SQLite, so compare the leading
        // characters directly.
        if let Some(prefix) = params.prefix.as_deref().filter(|p| !p.is_empty()) {
            builder.push(" AND substr(key, 1, ");
            builder.push_bind(prefix.chars().count() as i64);
            builder.push(") = ");
            builder.push_bind(prefix.to_string());
        }

        if let Some(token) = &params.continuation_token {
            builder.push(" AND key > ");
            builder.push_bind(token.clone());
        }

        builder.push(" ORDER BY key ASC LIMIT ");
        builder.push_bind(fetch_limit as i64);

        let mut rows: Vec<Object> = builder.build_query_as().fetch_all(&*self.db).await?;

        let mut is_truncated = false;
        let mut next_continuation_token = None;
        if rows.len() == fetch_limit {
            rows.pop();
            next_continuation_token = rows.last().map(|last| last.key.clone());
            is_truncated = true;
        }

        let mut contents = Vec::new();
        let mut common_prefixes = BTreeSet::new();
        for obj in rows.into_iter() {
            if let Some(delim) = params.delimiter.as_deref().filter(|d| !d.is_empty()) {
                if let Some(prefix) = compute_common_prefix(&obj.key, params.prefix.as_deref(), delim)
                {
                    common_prefixes.insert(prefix);
                    continue;
                }
            }
            contents.push(obj);
        }

        Ok(ListObjectsResult {
            objects: contents,
            common_prefixes: common_prefixes.into_iter().collect(),
            is_truncated,
            next_continuation_token,
        })
    }

    /// Copy an object, possibly across buckets.
    ///
    /// The destination gets a new generation and inherits content type,
    /// checksums and KMS key name. It is private regardless of the source.
    pub async fn copy_object(
        &self,
        src_bucket: &str,
        src_key: &str,
        dest_bucket: &str,
        dest_key: &str,
    ) -> StorageResult<Object> {
        self.ensure_key_safe(src_key)?;
        self.ensure_key_safe(dest_key)?;
        let src_bucket_rec = self.fetch_bucket(src_bucket).await?;
        let dest_bucket_rec = if dest_bucket == src_bucket {
            src_bucket_rec.clone()
        } else {
            self.fetch_bucket(dest_bucket).await?
        };
        let source = self.fetch_object(&src_bucket_rec, src_key).await?;

        let src_path = self.object_path(&src_bucket_rec.name, src_key);
        let dest_path = self.object_path(&dest_bucket_rec.name, dest_key);
        let tmp_path = self.staging_path(&dest_path).await?;
        if let Err(err) = fs::copy(&src_path, &tmp_path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(if err.kind() == ErrorKind::NotFound {
                StorageError::ObjectNotFound {
                    bucket: src_bucket.to_string(),
                    key: src_key.to_string(),
                }
            } else {
                StorageError::Io(err)
            });
        }
        self.commit_staged(&tmp_path, &dest_path).await?;

        let write = ObjectWrite {
            key: dest_key,
            content_type: source.content_type,
            size_bytes: source.size_bytes,
            etag: source.etag,
            md5_hash: source.md5_hash,
            kms_key_name: source.kms_key_name,
        };

        match self.upsert_object(&dest_bucket_rec, write).await {
            Ok(obj) => Ok(obj),
            Err(err) => {
                let _ = fs::remove_file(&dest_path).await;
                Err(StorageError::Sqlx(err))
            }
        }
    }

    /// Rename an object within a bucket: copy to `dest_key`, then delete
    /// `src_key`.
    pub async fn move_object(
        &self,
        bucket: &str,
        src_key: &str,
        dest_key: &str,
    ) -> StorageResult<Object> {
        if src_key == dest_key {
            return Err(StorageError::SameSourceAndDestination(format!(
                "{}/{}",
                bucket, src_key
            )));
        }
        let moved = self.copy_object(bucket, src_key, bucket, dest_key).await?;
        self.delete_object(bucket, src_key).await?;
        Ok(moved)
    }

    /// Mark an object as publicly readable and bump its metageneration.
    pub async fn make_public(&self, bucket: &str, key: &str) -> StorageResult<Object> {
        self.ensure_key_safe(key)?;
        let bucket_rec = self.fetch_bucket(bucket).await?;
        let sql = format!(
            "UPDATE objects
             SET is_public = 1, metageneration = metageneration + 1, updated_at = ?
             WHERE key = ? AND bucket_id = ? AND is_deleted = 0
             RETURNING {OBJECT_COLUMNS}"
        );

        sqlx::query_as::<_, Object>(&sql)
            .bind(Utc::now())
            .bind(key)
            .bind(bucket_rec.id)
            .fetch_optional(&*self.db)
            .await?
            .ok_or_else(|| StorageError::ObjectNotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            })
    }

    /// Soft-delete an object and attempt to remove its payload.
    ///
    /// - Sets `is_deleted = 1`
    /// - Deletes physical file best-effort
    /// - Prunes empty bucket directories
    ///
    /// Repeated calls return ObjectNotFound.
    pub async fn delete_object(&self, bucket: &str, key: &str) -> StorageResult<Object> {
        self.ensure_key_safe(key)?;
        let bucket_rec = self.fetch_bucket(bucket).await?;
        let object = self.fetch_object(&bucket_rec, key).await?;

        let result = sqlx::query(
            "UPDATE objects SET is_deleted = 1 WHERE key = ? AND bucket_id = ? AND is_deleted = 0",
        )
        .bind(key)
        .bind(bucket_rec.id)
        .execute(&*self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::ObjectNotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            });
        }

        let file_path = self.object_path(&bucket_rec.name, key);
        match fs::remove_file(&file_path).await {
            Ok(_) => debug!("removed physical file {}", file_path.display()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!("file {} already missing", file_path.display());
            }
            Err(err) => return Err(StorageError::Io(err)),
        }

        if let Some(parent) = file_path.parent() {
            let bucket_root = self.bucket_root(&bucket_rec.name);
            self.prune_empty_dirs(parent, &bucket_root).await;
        }

        Ok(object)
    }

    /// Delete every live object in a bucket. Returns how many were removed.
    ///
    /// Objects that disappear between listing and deletion are skipped.
    pub async fn delete_all_objects(&self, bucket: &str) -> StorageResult<usize> {
        let bucket_rec = self.fetch_bucket(bucket).await?;
        let keys: Vec<String> = sqlx::query_scalar(
            "SELECT key FROM objects WHERE bucket_id = ? AND is_deleted = 0 ORDER BY key ASC",
        )
        .bind(bucket_rec.id)
        .fetch_all(&*self.db)
        .await?;

        let mut deleted = 0;
        for key in keys {
            match self.delete_object(bucket, &key).await {
                Ok(_) => deleted += 1,
                Err(StorageError::ObjectNotFound { .. }) => {
                    debug!("object {}/{} vanished before deletion", bucket, key);
                }
                Err(err) => return Err(err),
            }
        }
        Ok(deleted)
    }

    /// Create a bucket and initialize its directory.
    ///
    /// Validates name and location. Returns BucketAlreadyExists if the name
    /// is taken.
    pub async fn create_bucket(&self, name: &str, location: &str) -> StorageResult<Bucket> {
        self.ensure_bucket_name_safe(name)?;
        let normalized_location = location.to_lowercase();
        self.ensure_location_valid(&normalized_location)?;

        let bucket = Bucket {
            id: Uuid::new_v4(),
            name: name.to_string(),
            location: normalized_location,
            storage_class: DEFAULT_STORAGE_CLASS.to_string(),
            created_at: Utc::now(),
        };

        match sqlx::query(
            "INSERT INTO buckets (id, name, location, storage_class, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(bucket.id)
        .bind(&bucket.name)
        .bind(&bucket.location)
        .bind(&bucket.storage_class)
        .bind(bucket.created_at)
        .execute(&*self.db)
        .await
        {
            Ok(_) => {}
            Err(err) if is_unique_violation(&err) => {
                return Err(StorageError::BucketAlreadyExists(name.to_string()));
            }
            Err(err) => return Err(StorageError::Sqlx(err)),
        }

        fs::create_dir_all(self.bucket_root(name)).await?;
        Ok(bucket)
    }

    /// Delete an empty bucket from metadata and filesystem.
    ///
    /// Returns BucketNotEmpty while live objects remain. Soft-deleted rows
    /// go with the bucket.
    pub async fn delete_bucket(&self, name: &str) -> StorageResult<()> {
        let bucket_rec = self.fetch_bucket(name).await?;

        let live: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM objects WHERE bucket_id = ? AND is_deleted = 0",
        )
        .bind(bucket_rec.id)
        .fetch_one(&*self.db)
        .await?;
        if live > 0 {
            return Err(StorageError::BucketNotEmpty(name.to_string()));
        }

        let result = sqlx::query("DELETE FROM buckets WHERE id = ?")
            .bind(bucket_rec.id)
            .execute(&*self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::BucketNotFound(name.to_string()));
        }

        let bucket_path = self.bucket_root(name);
        if let Err(err) = fs::remove_dir_all(&bucket_path).await {
            if err.kind() != io::ErrorKind::NotFound {
                debug!(
                    "failed to remove bucket directory {} after delete: {}",
                    bucket_path.display(),
                    err
                );
            }
        }

        Ok(())
    }

    /// Recursively remove empty directories up to bucket root.
    async fn prune_empty_dirs(&self, start: &Path, stop: &Path) {
        let mut current = start.to_path_buf();
        while current.starts_with(stop) && current != stop {
            match fs::remove_dir(&current).await {
                Ok(_) => {
                    if let Some(parent) = current.parent() {
                        current = parent.to_path_buf();
                    } else {
                        break;
                    }
                }
                Err(err) if err.kind() == ErrorKind::NotFound => break,
                Err(err) if err.kind() == ErrorKind::DirectoryNotEmpty => break,
                Err(err) => {
                    debug!("failed to prune directory {}: {}", current.display(), err);
                    break;
                }
            }
        }
    }
}

/// Return true if SQLx error indicates a unique constraint violation.
fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db_err) if db_err.message().to_ascii_lowercase().contains("unique")
    )
}

/// Compute a synthetic "common prefix" for delimiter listings.
///
/// Returns Some(prefix) if the key belongs to a grouped prefix, otherwise
/// None.
fn compute_common_prefix(
    key: &str,
    requested_prefix: Option<&str>,
    delimiter: &str,
) -> Option<String> {
    let after_prefix = if let Some(prefix) = requested_prefix {
        key.strip_prefix(prefix)?
    } else {
        key
    };

    after_prefix.find(delimiter).map(|pos| {
        let mut combined = String::new();
        if let Some(prefix) = requested_prefix {
            combined.push_str(prefix);
        }
        combined.push_str(&after_prefix[..pos + delimiter.len()]);
        combined
    })
}

/// Check if a string matches IPv4-like dotted decimal form.
fn is_ipv4_like(name: &str) -> bool {
    let parts: Vec<&str> = name.split('.').collect();
    if parts.len() != 4 {
        return false;
    }
    for segment in parts {
        if segment.is_empty() || segment.len() > 3 {
            return false;
        }
        if segment.chars().any(|c| !c.is_ascii_digit()) {
            return false;
        }
        if segment.parse::<u8>().is_err() {
            return false;
        }
    }
    true
}

/// Best-effort content type from a file extension.
fn guess_content_type(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    let mime = match ext.as_str() {
        "txt" => "text/plain",
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "csv" => "text/csv",
        "json" => "application/json",
        "js" => "application/javascript",
        "pdf" => "application/pdf",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        _ => "application/octet-stream",
    };
    Some(mime)
}

/// Object generations are the write time in microseconds since the epoch.
fn generation_at(now: DateTime<Utc>) -> i64 {
    now.timestamp_micros()
}
