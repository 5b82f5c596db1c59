//! Per-run bucket lifecycle: create a uniquely named bucket up front, purge
//! and delete it afterwards.

use bytes::Bytes;
use tokio::fs;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::{CliInvoker, HarnessConfig, HarnessError};
use crate::{
    models::object::Object,
    services::storage_service::{StorageError, StorageResult, StorageService, UploadOptions},
};

const CONTROL_KEY: &str = "other.txt";

/// Object keys the scenarios move through.
#[derive(Debug, Clone)]
pub struct ObjectKeys {
    /// Name the source file is uploaded under.
    pub uploaded: String,
    pub moved: String,
    pub copied: String,
    /// Seeded at setup outside the `test` prefix; listings filtered by that
    /// prefix must leave it out.
    pub control: String,
}

/// How teardown went. Teardown never fails, this is for reporting only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CleanupOutcome {
    Removed { attempts: u32 },
    AlreadyGone,
    Failed { attempts: u32 },
}

/// State shared by every scenario of one run.
pub struct TestContext {
    pub config: HarnessConfig,
    pub bucket: String,
    pub storage: StorageService,
    pub keys: ObjectKeys,
}

/// `prefix` followed by a random UUID.
pub fn unique_bucket_name(prefix: &str) -> String {
    format!("{}{}", prefix, Uuid::new_v4())
}

impl TestContext {
    /// Open storage and create the run's bucket. Any failure is fatal; there
    /// is no retry.
    pub async fn setup(config: HarnessConfig) -> Result<Self, HarnessError> {
        let storage = StorageService::open(&config.database_url, config.storage_dir.clone())
            .await
            .map_err(HarnessError::Setup)?;

        let bucket = unique_bucket_name(&config.bucket_prefix);
        storage
            .create_bucket(&bucket, "local")
            .await
            .map_err(HarnessError::Setup)?;
        info!(bucket = %bucket, "created test bucket");

        let body = futures::stream::iter(vec![Ok::<_, std::io::Error>(Bytes::from_static(
            b"control object\n",
        ))]);
        storage
            .upload_object_stream(&bucket, CONTROL_KEY, UploadOptions::default(), body)
            .await
            .map_err(HarnessError::Setup)?;

        let uploaded = config
            .source_file
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "test.txt".to_string());

        Ok(Self {
            config,
            bucket,
            storage,
            keys: ObjectKeys {
                uploaded,
                moved: "test2.txt".to_string(),
                copied: "test3.txt".to_string(),
                control: CONTROL_KEY.to_string(),
            },
        })
    }

    pub fn invoker(&self) -> CliInvoker {
        CliInvoker::from_config(&self.config)
    }

    /// `gs://<bucket>/<key>`
    pub fn object_uri(&self, key: &str) -> String {
        format!("gs://{}/{}", self.bucket, key)
    }

    /// Ask storage directly whether `key` exists in the run's bucket.
    pub async fn exists(&self, key: &str) -> Result<bool, HarnessError> {
        Ok(self.storage.object_exists(&self.bucket, key).await?)
    }

    /// Stored metadata of a live object, `None` when it does not exist.
    pub async fn metadata(&self, key: &str) -> Result<Option<Object>, HarnessError> {
        match self.storage.get_object_metadata(&self.bucket, key).await {
            Ok(object) => Ok(Some(object)),
            Err(StorageError::ObjectNotFound { .. }) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Remove the downloaded file, then purge and delete the bucket with
    /// bounded exponential backoff. Never returns an error.
    pub async fn teardown(self) -> CleanupOutcome {
        if let Err(err) = fs::remove_file(&self.config.download_path).await {
            debug!(
                "could not remove {}: {}",
                self.config.download_path.display(),
                err
            );
        }

        let policy = &self.config.cleanup;
        let attempts = policy.max_attempts.max(1);
        for attempt in 0..attempts {
            match purge_bucket(&self.storage, &self.bucket).await {
                Ok(()) => {
                    info!(bucket = %self.bucket, attempt = attempt + 1, "removed test bucket");
                    return CleanupOutcome::Removed {
                        attempts: attempt + 1,
                    };
                }
                Err(StorageError::BucketNotFound(_)) => {
                    debug!(bucket = %self.bucket, "test bucket already gone");
                    return CleanupOutcome::AlreadyGone;
                }
                Err(err) => {
                    warn!(
                        bucket = %self.bucket,
                        attempt = attempt + 1,
                        "bucket cleanup attempt failed: {}",
                        err
                    );
                    if attempt + 1 < attempts {
                        tokio::time::sleep(policy.delay_for(attempt)).await;
                    }
                }
            }
        }

        error!(
            bucket = %self.bucket,
            attempts,
            "cleanup failed, manual intervention required"
        );
        CleanupOutcome::Failed { attempts }
    }
}

/// Delete every object, then the bucket.
async fn purge_bucket(storage: &StorageService, bucket: &str) -> StorageResult<()> {
    let deleted = storage.delete_all_objects(bucket).await?;
    debug!(bucket, deleted, "purged objects");
    storage.delete_bucket(bucket).await
}
