//! Bucket-scoped verification harness for the `files` CLI.
//!
//! A run is: [`TestContext::setup`] creates a throwaway bucket, a
//! [`Pipeline`] invokes the CLI once per [`Scenario`] in a fixed order and
//! checks its output plus the resulting bucket state, and
//! [`TestContext::teardown`] removes everything again.

pub mod invoker;
pub mod lifecycle;
pub mod pipeline;
pub mod scenario;

use std::{
    env, io,
    path::{Path, PathBuf},
    time::Duration,
};

use thiserror::Error;

use crate::services::storage_service::StorageError;

pub use invoker::{CliInvoker, CliOutput};
pub use lifecycle::{CleanupOutcome, ObjectKeys, TestContext};
pub use pipeline::{Pipeline, PipelineReport, ScenarioReport};
pub use scenario::{ObjectCheck, OutputCheck, Scenario, ScenarioOutcome};

pub const KMS_KEY_ENV: &str = "FILES_KMS_KEY_NAME";
pub const DEFAULT_KMS_KEY_NAME: &str =
    "projects/local/locations/us/keyRings/samples/cryptoKeys/files-test";
pub const DEFAULT_BUCKET_PREFIX: &str = "files-samples-";
pub const DEFAULT_SIGNING_KEY: &str = "files-harness-signing-key";

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("suite setup failed: {0}")]
    Setup(#[source] StorageError),
    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("`{program}` did not exit within {timeout:?}")]
    Timeout { program: String, timeout: Duration },
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Bounded exponential backoff.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(100),
            multiplier: 2,
        }
    }
}

impl RetryPolicy {
    /// Delay after the zero-based `attempt` failed.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.saturating_pow(attempt);
        self.initial_backoff.saturating_mul(factor)
    }
}

/// Everything a run needs to know about the CLI and its storage.
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    /// The `files` executable.
    pub program: PathBuf,
    /// Working directory the CLI runs in.
    pub working_dir: PathBuf,
    pub storage_dir: PathBuf,
    pub database_url: String,
    pub base_url: String,
    pub signing_key: String,
    pub bucket_prefix: String,
    /// Local file uploaded by the first scenarios.
    pub source_file: PathBuf,
    /// Where the download scenario writes; removed at teardown.
    pub download_path: PathBuf,
    pub kms_key_name: String,
    pub timeout: Option<Duration>,
    pub cleanup: RetryPolicy,
}

impl HarnessConfig {
    /// Defaults rooted at `working_dir`: storage under `data/`, the
    /// checked-in `resources/test.txt` as upload source, `downloaded.txt` as
    /// download target.
    pub fn new(program: impl Into<PathBuf>, working_dir: impl AsRef<Path>) -> Self {
        let working_dir = working_dir.as_ref().to_path_buf();
        let database_url = format!(
            "sqlite://{}",
            working_dir.join("data").join("meta").join("files.db").display()
        );
        Self {
            program: program.into(),
            storage_dir: working_dir.join("data").join("objects"),
            database_url,
            base_url: crate::config::DEFAULT_BASE_URL.to_string(),
            signing_key: DEFAULT_SIGNING_KEY.to_string(),
            bucket_prefix: DEFAULT_BUCKET_PREFIX.to_string(),
            source_file: Path::new(env!("CARGO_MANIFEST_DIR"))
                .join("resources")
                .join("test.txt"),
            download_path: working_dir.join("downloaded.txt"),
            kms_key_name: kms_key_name_from_env(),
            timeout: Some(Duration::from_secs(60)),
            cleanup: RetryPolicy::default(),
            working_dir,
        }
    }

    /// Environment handed to every CLI invocation so it shares this run's
    /// storage and signing settings.
    pub fn cli_env(&self) -> Vec<(&'static str, String)> {
        vec![
            ("FILES_STORAGE_DIR", self.storage_dir.display().to_string()),
            ("FILES_DATABASE_URL", self.database_url.clone()),
            ("FILES_BASE_URL", self.base_url.clone()),
            ("FILES_SIGNING_KEY", self.signing_key.clone()),
        ]
    }
}

/// KMS key for the kms-upload scenario, from `FILES_KMS_KEY_NAME`.
pub fn kms_key_name_from_env() -> String {
    env::var(KMS_KEY_ENV)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_KMS_KEY_NAME.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn backoff_doubles_per_attempt() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(2), Duration::from_millis(400));
    }

    #[test]
    fn backoff_saturates() {
        let policy = RetryPolicy {
            max_attempts: 100,
            initial_backoff: Duration::from_secs(1),
            multiplier: 10,
        };
        assert_eq!(policy.delay_for(64), Duration::from_secs(u64::from(u32::MAX)));
    }

    #[test]
    #[serial]
    fn kms_key_comes_from_environment() {
        unsafe {
            env::set_var(KMS_KEY_ENV, "projects/p/locations/eu/keyRings/r/cryptoKeys/k");
        }
        assert_eq!(
            kms_key_name_from_env(),
            "projects/p/locations/eu/keyRings/r/cryptoKeys/k"
        );

        unsafe {
            env::set_var(KMS_KEY_ENV, "  ");
        }
        assert_eq!(kms_key_name_from_env(), DEFAULT_KMS_KEY_NAME);

        unsafe {
            env::remove_var(KMS_KEY_ENV);
        }
        assert_eq!(kms_key_name_from_env(), DEFAULT_KMS_KEY_NAME);
    }

    #[test]
    #[serial]
    fn config_roots_paths_in_working_dir() {
        let cfg = HarnessConfig::new("/bin/files", "/tmp/run");
        assert_eq!(cfg.download_path, PathBuf::from("/tmp/run/downloaded.txt"));
        assert_eq!(cfg.database_url, "sqlite:///tmp/run/data/meta/files.db");
        assert!(cfg.source_file.ends_with("resources/test.txt"));
        assert!(
            cfg.cli_env()
                .iter()
                .any(|(name, value)| *name == "FILES_STORAGE_DIR" && value == "/tmp/run/data/objects")
        );
    }
}
