//! Object-level subcommands: upload, download, move, copy, list,
//! make-public, generate-signed-url, get-metadata and delete.

use std::{io::Write, path::Path};

use anyhow::{Context, Result, anyhow};
use chrono::{SecondsFormat, Utc};
use tracing::info;

use crate::{
    services::storage_service::{ListObjectsParams, UploadOptions},
    state::AppState,
};

const LIST_PAGE_SIZE: usize = 1000;

fn gs_uri(bucket: &str, key: &str) -> String {
    format!("gs://{}/{}", bucket, key)
}

/// Upload `file_path` under its file name, optionally recording a KMS key.
pub async fn upload<W: Write>(
    state: &AppState,
    bucket: &str,
    file_path: &Path,
    kms_key_name: Option<String>,
    out: &mut W,
) -> Result<()> {
    let key = file_path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| anyhow!("{} does not name a file", file_path.display()))?;

    let options = UploadOptions {
        kms_key_name: kms_key_name.clone(),
        ..Default::default()
    };
    let object = state
        .storage
        .upload_file(bucket, &key, file_path, options)
        .await
        .with_context(|| format!("uploading {} to {}", file_path.display(), bucket))?;
    info!(bucket, key = %object.key, generation = object.generation, "uploaded object");

    match kms_key_name {
        Some(kms) => writeln!(
            out,
            "{} uploaded to {} using {}.",
            file_path.display(),
            bucket,
            kms
        )?,
        None => writeln!(out, "{} uploaded to {}.", file_path.display(), bucket)?,
    }
    Ok(())
}

pub async fn download<W: Write>(
    state: &AppState,
    bucket: &str,
    file_name: &str,
    dest_path: &Path,
    out: &mut W,
) -> Result<()> {
    state
        .storage
        .download_to_path(bucket, file_name, dest_path)
        .await
        .with_context(|| format!("downloading {}", gs_uri(bucket, file_name)))?;
    writeln!(
        out,
        "{} downloaded to {}.",
        gs_uri(bucket, file_name),
        dest_path.display()
    )?;
    Ok(())
}

pub async fn move_file<W: Write>(
    state: &AppState,
    bucket: &str,
    file_name: &str,
    new_file_name: &str,
    out: &mut W,
) -> Result<()> {
    state
        .storage
        .move_object(bucket, file_name, new_file_name)
        .await
        .with_context(|| format!("moving {}", gs_uri(bucket, file_name)))?;
    writeln!(
        out,
        "{} moved to {}.",
        gs_uri(bucket, file_name),
        gs_uri(bucket, new_file_name)
    )?;
    Ok(())
}

pub async fn copy<W: Write>(
    state: &AppState,
    src_bucket: &str,
    src_file: &str,
    dest_bucket: &str,
    dest_file: &str,
    out: &mut W,
) -> Result<()> {
    state
        .storage
        .copy_object(src_bucket, src_file, dest_bucket, dest_file)
        .await
        .with_context(|| format!("copying {}", gs_uri(src_bucket, src_file)))?;
    writeln!(
        out,
        "{} copied to {}.",
        gs_uri(src_bucket, src_file),
        gs_uri(dest_bucket, dest_file)
    )?;
    Ok(())
}

/// Print every matching key, paging through the listing. Common prefixes
/// follow under `Prefixes:` when a delimiter groups any keys.
pub async fn list<W: Write>(
    state: &AppState,
    bucket: &str,
    prefix: Option<String>,
    delimiter: Option<String>,
    out: &mut W,
) -> Result<()> {
    let mut keys = Vec::new();
    let mut prefixes = Vec::new();
    let mut continuation_token = None;

    loop {
        let page = state
            .storage
            .list_objects(
                bucket,
                ListObjectsParams {
                    prefix: prefix.clone(),
                    delimiter: delimiter.clone(),
                    continuation_token: continuation_token.take(),
                    max_keys: LIST_PAGE_SIZE,
                },
            )
            .await
            .with_context(|| format!("listing gs://{}", bucket))?;

        keys.extend(page.objects.into_iter().map(|object| object.key));
        for common in page.common_prefixes {
            if !prefixes.contains(&common) {
                prefixes.push(common);
            }
        }

        if !page.is_truncated {
            break;
        }
        continuation_token = page.next_continuation_token;
    }

    writeln!(out, "Files:")?;
    for key in &keys {
        writeln!(out, "{}", key)?;
    }
    if !prefixes.is_empty() {
        writeln!(out, "Prefixes:")?;
        for common in &prefixes {
            writeln!(out, "{}", common)?;
        }
    }
    Ok(())
}

pub async fn make_public<W: Write>(
    state: &AppState,
    bucket: &str,
    file_name: &str,
    out: &mut W,
) -> Result<()> {
    state
        .storage
        .make_public(bucket, file_name)
        .await
        .with_context(|| format!("making {} public", gs_uri(bucket, file_name)))?;
    writeln!(out, "{} is now public.", gs_uri(bucket, file_name))?;
    Ok(())
}

/// Print a read URL valid for the configured signed-URL lifetime.
pub async fn generate_signed_url<W: Write>(
    state: &AppState,
    bucket: &str,
    file_name: &str,
    out: &mut W,
) -> Result<()> {
    // Only sign URLs for live objects.
    state
        .storage
        .get_object_metadata(bucket, file_name)
        .await
        .with_context(|| format!("signing {}", gs_uri(bucket, file_name)))?;

    let signed = state.signer.sign(bucket, file_name, Utc::now());
    info!(bucket, key = file_name, expires_at = %signed.expires_at, "issued signed url");
    writeln!(out, "The signed url for {} is {}.", file_name, signed.url)?;
    Ok(())
}

pub async fn get_metadata<W: Write>(
    state: &AppState,
    bucket: &str,
    file_name: &str,
    out: &mut W,
) -> Result<()> {
    let meta = state
        .storage
        .get_object_metadata(bucket, file_name)
        .await
        .with_context(|| format!("reading metadata of {}", gs_uri(bucket, file_name)))?;

    writeln!(out, "File: {}", meta.key)?;
    writeln!(out, "Bucket: {}", bucket)?;
    writeln!(out, "Storage class: {}", meta.storage_class)?;
    writeln!(out, "ID: {}/{}/{}", bucket, meta.key, meta.generation)?;
    writeln!(out, "Size: {}", meta.size_bytes)?;
    writeln!(
        out,
        "Updated: {}",
        meta.updated_at.to_rfc3339_opts(SecondsFormat::Millis, true)
    )?;
    writeln!(out, "Generation: {}", meta.generation)?;
    writeln!(out, "Metageneration: {}", meta.metageneration)?;
    writeln!(out, "Etag: {}", meta.etag)?;
    writeln!(out, "MD5 Hash: {}", meta.md5_hash)?;
    writeln!(
        out,
        "Content-type: {}",
        meta.content_type.as_deref().unwrap_or("application/octet-stream")
    )?;
    writeln!(
        out,
        "KMS key name: {}",
        meta.kms_key_name.as_deref().unwrap_or("none")
    )?;
    writeln!(out, "Public: {}", meta.is_public)?;
    Ok(())
}

pub async fn delete<W: Write>(
    state: &AppState,
    bucket: &str,
    file_name: &str,
    out: &mut W,
) -> Result<()> {
    state
        .storage
        .delete_object(bucket, file_name)
        .await
        .with_context(|| format!("deleting {}", gs_uri(bucket, file_name)))?;
    writeln!(out, "{} deleted.", gs_uri(bucket, file_name))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::SigningConfig,
        services::{signing::UrlSigner, storage_service::StorageService},
    };
    use tempfile::TempDir;

    async fn state(dir: &TempDir) -> AppState {
        let db_url = format!("sqlite://{}", dir.path().join("files.db").display());
        let storage = StorageService::open(&db_url, dir.path().join("objects"))
            .await
            .unwrap();
        storage.create_bucket("cmd-bucket", "local").await.unwrap();
        let signer = UrlSigner::new(&SigningConfig {
            base_url: "http://127.0.0.1:3000".into(),
            key: "k".into(),
            ttl_secs: 900,
        });
        AppState::new(storage, signer)
    }

    fn local_file(dir: &TempDir, name: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, b"Hello World!\n").unwrap();
        path
    }

    fn text(out: Vec<u8>) -> String {
        String::from_utf8(out).unwrap()
    }

    #[tokio::test]
    async fn upload_prints_path_and_bucket() {
        let dir = TempDir::new().unwrap();
        let state = state(&dir).await;
        let path = local_file(&dir, "test.txt");

        let mut out = Vec::new();
        upload(&state, "cmd-bucket", &path, None, &mut out).await.unwrap();
        assert_eq!(
            text(out),
            format!("{} uploaded to cmd-bucket.\n", path.display())
        );

        let mut out = Vec::new();
        upload(&state, "cmd-bucket", &path, Some("kms/key".into()), &mut out)
            .await
            .unwrap();
        assert_eq!(
            text(out),
            format!("{} uploaded to cmd-bucket using kms/key.\n", path.display())
        );
    }

    #[tokio::test]
    async fn move_and_copy_print_gs_uris() {
        let dir = TempDir::new().unwrap();
        let state = state(&dir).await;
        let path = local_file(&dir, "test.txt");
        upload(&state, "cmd-bucket", &path, None, &mut Vec::new())
            .await
            .unwrap();

        let mut out = Vec::new();
        move_file(&state, "cmd-bucket", "test.txt", "test2.txt", &mut out)
            .await
            .unwrap();
        assert_eq!(
            text(out),
            "gs://cmd-bucket/test.txt moved to gs://cmd-bucket/test2.txt.\n"
        );

        let mut out = Vec::new();
        copy(
            &state,
            "cmd-bucket",
            "test2.txt",
            "cmd-bucket",
            "test3.txt",
            &mut out,
        )
        .await
        .unwrap();
        assert_eq!(
            text(out),
            "gs://cmd-bucket/test2.txt copied to gs://cmd-bucket/test3.txt.\n"
        );
    }

    #[tokio::test]
    async fn list_prints_header_keys_and_prefixes() {
        let dir = TempDir::new().unwrap();
        let state = state(&dir).await;
        for name in ["test2.txt", "test3.txt"] {
            let path = local_file(&dir, name);
            upload(&state, "cmd-bucket", &path, None, &mut Vec::new())
                .await
                .unwrap();
        }

        let mut out = Vec::new();
        list(&state, "cmd-bucket", Some("test".into()), Some("/".into()), &mut out)
            .await
            .unwrap();
        assert_eq!(text(out), "Files:\ntest2.txt\ntest3.txt\n");

        let mut out = Vec::new();
        list(&state, "cmd-bucket", Some("foo".into()), None, &mut out)
            .await
            .unwrap();
        assert_eq!(text(out), "Files:\n");
    }

    #[tokio::test]
    async fn signed_url_and_metadata_describe_object() {
        let dir = TempDir::new().unwrap();
        let state = state(&dir).await;
        let path = local_file(&dir, "test3.txt");
        upload(&state, "cmd-bucket", &path, None, &mut Vec::new())
            .await
            .unwrap();

        let mut out = Vec::new();
        generate_signed_url(&state, "cmd-bucket", "test3.txt", &mut out)
            .await
            .unwrap();
        let line = text(out);
        assert!(line.starts_with(
            "The signed url for test3.txt is http://127.0.0.1:3000/cmd-bucket/test3.txt?Expires="
        ));

        make_public(&state, "cmd-bucket", "test3.txt", &mut Vec::new())
            .await
            .unwrap();
        let mut out = Vec::new();
        get_metadata(&state, "cmd-bucket", "test3.txt", &mut out)
            .await
            .unwrap();
        let meta = text(out);
        assert!(meta.contains("File: test3.txt\n"));
        assert!(meta.contains("Bucket: cmd-bucket\n"));
        assert!(meta.contains("Size: 13\n"));
        assert!(meta.contains("Metageneration: 2\n"));
        assert!(meta.contains("Content-type: text/plain\n"));
        assert!(meta.contains("Public: true\n"));
    }

    #[tokio::test]
    async fn delete_of_missing_object_reports_context() {
        let dir = TempDir::new().unwrap();
        let state = state(&dir).await;

        let err = delete(&state, "cmd-bucket", "nope.txt", &mut Vec::new())
            .await
            .unwrap_err();
        let message = format!("{err:#}");
        assert!(message.contains("deleting gs://cmd-bucket/nope.txt"));
        assert!(message.contains("not found"));
    }

    #[tokio::test]
    async fn download_writes_local_file() {
        let dir = TempDir::new().unwrap();
        let state = state(&dir).await;
        let path = local_file(&dir, "test.txt");
        upload(&state, "cmd-bucket", &path, None, &mut Vec::new())
            .await
            .unwrap();

        let dest = dir.path().join("downloaded.txt");
        let mut out = Vec::new();
        download(&state, "cmd-bucket", "test.txt", &dest, &mut out)
            .await
            .unwrap();
        assert_eq!(
            text(out),
            format!("gs://cmd-bucket/test.txt downloaded to {}.\n", dest.display())
        );
        assert_eq!(std::fs::read(&dest).unwrap(), b"Hello World!\n");
    }
}
