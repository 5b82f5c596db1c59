//! Subcommand implementations for the `files` binary.
//!
//! Commands write their user-facing messages to the supplied writer; logs go
//! through `tracing`.

pub mod buckets;
pub mod objects;
pub mod serve;

use std::io::Write;

use anyhow::Result;

use crate::{cli::Command, state::AppState};

/// Run one storage subcommand. `serve` is dispatched by the binary itself.
pub async fn execute<W: Write>(command: Command, state: &AppState, out: &mut W) -> Result<()> {
    match command {
        Command::Upload { bucket, file_path } => {
            objects::upload(state, &bucket, &file_path, None, out).await
        }
        Command::UploadWithKmsKey {
            bucket,
            file_path,
            kms_key_name,
        } => objects::upload(state, &bucket, &file_path, Some(kms_key_name), out).await,
        Command::Download {
            bucket,
            file_name,
            dest_path,
        } => objects::download(state, &bucket, &file_name, &dest_path, out).await,
        Command::Move {
            bucket,
            file_name,
            new_file_name,
        } => objects::move_file(state, &bucket, &file_name, &new_file_name, out).await,
        Command::Copy {
            src_bucket,
            src_file,
            dest_bucket,
            dest_file,
        } => objects::copy(state, &src_bucket, &src_file, &dest_bucket, &dest_file, out).await,
        Command::List {
            bucket,
            prefix,
            delimiter,
        } => objects::list(state, &bucket, prefix, delimiter, out).await,
        Command::MakePublic { bucket, file_name } => {
            objects::make_public(state, &bucket, &file_name, out).await
        }
        Command::GenerateSignedUrl { bucket, file_name } => {
            objects::generate_signed_url(state, &bucket, &file_name, out).await
        }
        Command::GetMetadata { bucket, file_name } => {
            objects::get_metadata(state, &bucket, &file_name, out).await
        }
        Command::Delete { bucket, file_name } => {
            objects::delete(state, &bucket, &file_name, out).await
        }
        Command::CreateBucket { bucket, location } => {
            buckets::create(state, &bucket, &location, out).await
        }
        Command::DeleteBucket { bucket } => buckets::delete(state, &bucket, out).await,
        Command::Serve(_) => anyhow::bail!("`serve` is not a storage operation"),
    }
}
