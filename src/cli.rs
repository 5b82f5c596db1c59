//! CLI argument parsing using clap derive API.
//!
//! Purely declarative; see `commands` for what each subcommand does.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Basic object storage operations against a bucket.
#[derive(Parser, Debug)]
#[command(name = "files", version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// Storage and signing overrides shared by every subcommand.
#[derive(Args, Debug, Default, Clone)]
pub struct GlobalArgs {
    /// Directory where object payloads are stored (overrides FILES_STORAGE_DIR)
    #[arg(long, global = true)]
    pub storage_dir: Option<PathBuf>,

    /// Metadata database URL (overrides FILES_DATABASE_URL)
    #[arg(long, global = true)]
    pub database_url: Option<String>,

    /// Public base URL used in signed URLs (overrides FILES_BASE_URL)
    #[arg(long, global = true)]
    pub base_url: Option<String>,

    /// Secret used to sign URLs (overrides FILES_SIGNING_KEY)
    #[arg(long, global = true)]
    pub signing_key: Option<String>,

    /// Signed URL lifetime in seconds (overrides FILES_SIGNED_URL_TTL)
    #[arg(long, global = true)]
    pub signed_url_ttl: Option<u64>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Upload a local file; the object is named after the file.
    Upload { bucket: String, file_path: PathBuf },

    /// Upload a local file encrypted with a customer-managed key.
    UploadWithKmsKey {
        bucket: String,
        file_path: PathBuf,
        kms_key_name: String,
    },

    /// Download an object to a local path.
    Download {
        bucket: String,
        file_name: String,
        dest_path: PathBuf,
    },

    /// Rename an object within a bucket.
    Move {
        bucket: String,
        file_name: String,
        new_file_name: String,
    },

    /// Copy an object, possibly to another bucket.
    Copy {
        src_bucket: String,
        src_file: String,
        dest_bucket: String,
        dest_file: String,
    },

    /// List objects, optionally filtered by prefix and grouped by delimiter.
    List {
        bucket: String,
        prefix: Option<String>,
        delimiter: Option<String>,
    },

    /// Make an object publicly readable.
    MakePublic { bucket: String, file_name: String },

    /// Print a time-limited download URL for an object.
    GenerateSignedUrl { bucket: String, file_name: String },

    /// Print an object's metadata.
    GetMetadata { bucket: String, file_name: String },

    /// Delete an object.
    Delete { bucket: String, file_name: String },

    /// Create a bucket.
    CreateBucket {
        bucket: String,
        #[arg(long, default_value = "local")]
        location: String,
    },

    /// Delete an empty bucket.
    DeleteBucket { bucket: String },

    /// Serve public and signed object downloads over HTTP.
    Serve(ServeArgs),
}

#[derive(Args, Debug, Default, Clone)]
pub struct ServeArgs {
    /// Host to bind to (overrides FILES_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides FILES_PORT)
    #[arg(long)]
    pub port: Option<u16>,
}
