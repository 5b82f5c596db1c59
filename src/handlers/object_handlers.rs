//! HTTP handlers for object downloads.
//! An object is served when it is public or when the request carries a valid
//! `Expires` + `Signature` pair. Bodies are streamed from disk.

use crate::{errors::AppError, models::object::Object, state::AppState};
use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header},
    response::Response,
};
use chrono::Utc;
use serde::Deserialize;
use tokio_util::io::ReaderStream;

/// Signed URL query parameters.
#[derive(Debug, Default, Deserialize)]
pub struct SignedQuery {
    #[serde(rename = "Expires")]
    pub expires: Option<i64>,
    #[serde(rename = "Signature")]
    pub signature: Option<String>,
}

/// GET `/{bucket}/{*key}`: stream the object body.
pub async fn get_object(
    State(state): State<AppState>,
    Path((bucket, key)): Path<(String, String)>,
    Query(q): Query<SignedQuery>,
) -> Result<Response, AppError> {
    let (meta, file) = state.storage.get_object_reader(&bucket, &key).await?;
    authorize(&state, &meta, &bucket, &key, &q)?;

    let body = Body::from_stream(ReaderStream::new(file));
    let mut response = Response::new(body);
    *response.status_mut() = StatusCode::OK;
    set_object_headers(response.headers_mut(), &meta);

    Ok(response)
}

/// HEAD `/{bucket}/{*key}`: same headers as GET but no body.
pub async fn head_object(
    State(state): State<AppState>,
    Path((bucket, key)): Path<(String, String)>,
    Query(q): Query<SignedQuery>,
) -> Result<Response, AppError> {
    let meta = state.storage.get_object_metadata(&bucket, &key).await?;
    authorize(&state, &meta, &bucket, &key, &q)?;

    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::OK;
    set_object_headers(response.headers_mut(), &meta);

    Ok(response)
}

fn authorize(
    state: &AppState,
    meta: &Object,
    bucket: &str,
    key: &str,
    q: &SignedQuery,
) -> Result<(), AppError> {
    if meta.is_public {
        return Ok(());
    }
    match (q.expires, q.signature.as_deref()) {
        (Some(expires), Some(signature)) => {
            state
                .signer
                .verify(bucket, key, expires, signature, Utc::now())?;
            Ok(())
        }
        _ => Err(AppError::forbidden(format!(
            "anonymous access to gs://{}/{} is not allowed",
            bucket, key
        ))),
    }
}

fn set_object_headers(headers: &mut HeaderMap, meta: &Object) {
    let content_type = meta
        .content_type
        .clone()
        .unwrap_or_else(|| "application/octet-stream".into());
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );

    headers.insert(
        header::CONTENT_LENGTH,
        HeaderValue::from(meta.size_bytes.max(0) as u64),
    );

    if let Ok(value) = HeaderValue::from_str(&format!("\"{}\"", meta.etag)) {
        headers.insert(header::ETAG, value);
    }

    if let Ok(value) = HeaderValue::from_str(&meta.updated_at.to_rfc2822()) {
        headers.insert(header::LAST_MODIFIED, value);
    }

    headers.insert(
        HeaderName::from_static("x-goog-generation"),
        HeaderValue::from(meta.generation),
    );
    headers.insert(
        HeaderName::from_static("x-goog-metageneration"),
        HeaderValue::from(meta.metageneration),
    );
    if let Ok(value) = HeaderValue::from_str(&format!("md5={}", meta.md5_hash)) {
        headers.insert(HeaderName::from_static("x-goog-hash"), value);
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        config::SigningConfig,
        routes::routes::routes,
        services::{
            signing::UrlSigner,
            storage_service::{StorageService, UploadOptions},
        },
        state::AppState,
    };
    use axum::{
        body::{Body, to_bytes},
        http::{Method, Request, StatusCode},
    };
    use bytes::Bytes;
    use chrono::Utc;
    use tempfile::TempDir;
    use tower::ServiceExt;

    async fn state_with_object(dir: &TempDir) -> AppState {
        let db_url = format!("sqlite://{}", dir.path().join("files.db").display());
        let storage = StorageService::open(&db_url, dir.path().join("objects"))
            .await
            .unwrap();
        storage.create_bucket("served", "local").await.unwrap();
        let body = futures::stream::iter(vec![Ok(Bytes::from_static(b"Hello World!\n"))]);
        storage
            .upload_object_stream(
                "served",
                "test3.txt",
                UploadOptions {
                    content_type: Some("text/plain".into()),
                    ..Default::default()
                },
                body,
            )
            .await
            .unwrap();
        let signer = UrlSigner::new(&SigningConfig {
            base_url: "http://localhost".into(),
            key: "handler-test-key".into(),
            ttl_secs: 300,
        });
        AppState::new(storage, signer)
    }

    async fn send(state: &AppState, method: Method, uri: &str) -> (StatusCode, Bytes) {
        let response = routes()
            .with_state(state.clone())
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, body)
    }

    #[tokio::test]
    async fn private_object_requires_signature() {
        let dir = TempDir::new().unwrap();
        let state = state_with_object(&dir).await;

        let (status, _) = send(&state, Method::GET, "/served/test3.txt").await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn signed_url_grants_access() {
        let dir = TempDir::new().unwrap();
        let state = state_with_object(&dir).await;

        let signed = state.signer.sign("served", "test3.txt", Utc::now());
        let path = signed.url.trim_start_matches("http://localhost");
        let (status, body) = send(&state, Method::GET, path).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(&body[..], b"Hello World!\n");

        let tampered = path.replace("test3.txt", "test4.txt");
        let (status, _) = send(&state, Method::GET, &tampered).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let flipped = if path.ends_with('0') { '1' } else { '0' };
        let wrong_sig = format!("{}{}", &path[..path.len() - 1], flipped);
        let (status, _) = send(&state, Method::HEAD, &wrong_sig).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn public_object_is_served_anonymously() {
        let dir = TempDir::new().unwrap();
        let state = state_with_object(&dir).await;
        state.storage.make_public("served", "test3.txt").await.unwrap();

        let (status, body) = send(&state, Method::GET, "/served/test3.txt").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(&body[..], b"Hello World!\n");

        let (status, body) = send(&state, Method::HEAD, "/served/test3.txt").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn missing_bucket_is_not_found() {
        let dir = TempDir::new().unwrap();
        let state = state_with_object(&dir).await;

        let (status, body) = send(&state, Method::GET, "/absent-bucket/test3.txt").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], 404);
    }
}
