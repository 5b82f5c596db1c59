//! Time-limited signed URLs for object downloads.
//!
//! A signed URL has the form
//! `<base-url>/<bucket>/<key>?Expires=<unix-seconds>&Signature=<hex>` where
//! the signature is HMAC-SHA256 over `GET\n<bucket>\n<key>\n<expires>`.

use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use sha2::Sha256;
use thiserror::Error;

use crate::config::SigningConfig;

type HmacSha256 = Hmac<Sha256>;

/// RFC 3986 unreserved characters plus `/`, so nested keys keep their path.
const KEY_PATH_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'/');

/// Maximum lifetime of a signed URL (7 days in seconds).
pub const MAX_SIGNED_URL_TTL_SECS: i64 = 604_800;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("signed url has expired")]
    Expired,
    #[error("signature does not match")]
    Mismatch,
    #[error("signature is not valid hex")]
    Malformed,
    #[error("expiry is too far in the future")]
    ExpiryTooFar,
}

#[derive(Debug, Clone)]
pub struct SignedUrl {
    pub url: String,
    pub expires_at: DateTime<Utc>,
}

/// Issues and verifies signed URLs with a shared secret.
#[derive(Clone)]
pub struct UrlSigner {
    key: Vec<u8>,
    base_url: String,
    ttl: Duration,
}

impl UrlSigner {
    pub fn new(config: &SigningConfig) -> Self {
        let ttl_secs = i64::try_from(config.ttl_secs)
            .unwrap_or(MAX_SIGNED_URL_TTL_SECS)
            .clamp(1, MAX_SIGNED_URL_TTL_SECS);
        Self {
            key: config.key.as_bytes().to_vec(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            ttl: Duration::seconds(ttl_secs),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Sign a GET for `bucket/key`, valid for the configured TTL from `now`.
    pub fn sign(&self, bucket: &str, key: &str, now: DateTime<Utc>) -> SignedUrl {
        let expires_at = now + self.ttl;
        let expires = expires_at.timestamp();
        let signature = hex::encode(self.mac(bucket, key, expires).finalize().into_bytes());
        let url = format!(
            "{}/{}/{}?Expires={}&Signature={}",
            self.base_url,
            bucket,
            encode_key_path(key),
            expires,
            signature
        );
        SignedUrl { url, expires_at }
    }

    /// Check an `Expires`/`Signature` pair presented for `bucket/key`.
    pub fn verify(
        &self,
        bucket: &str,
        key: &str,
        expires: i64,
        signature: &str,
        now: DateTime<Utc>,
    ) -> Result<(), SignatureError> {
        let presented = hex::decode(signature).map_err(|_| SignatureError::Malformed)?;
        self.mac(bucket, key, expires)
            .verify_slice(&presented)
            .map_err(|_| SignatureError::Mismatch)?;

        let now_secs = now.timestamp();
        if expires < now_secs {
            return Err(SignatureError::Expired);
        }
        if expires - now_secs > MAX_SIGNED_URL_TTL_SECS {
            return Err(SignatureError::ExpiryTooFar);
        }
        Ok(())
    }

    fn mac(&self, bucket: &str, key: &str, expires: i64) -> HmacSha256 {
        // HMAC accepts keys of any length, new_from_slice cannot fail.
        let mut mac = HmacSha256::new_from_slice(&self.key)
            .unwrap_or_else(|_| unreachable!("HMAC can take key of any size"));
        mac.update(format!("GET\n{}\n{}\n{}", bucket, key, expires).as_bytes());
        mac
    }
}

/// Percent-encode an object key for use in a URL path, keeping `/`.
fn encode_key_path(key: &str) -> String {
    utf8_percent_encode(key, KEY_PATH_ENCODE_SET).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer(ttl_secs: u64) -> UrlSigner {
        UrlSigner::new(&SigningConfig {
            base_url: "http://127.0.0.1:3000/".into(),
            key: "test-signing-key".into(),
            ttl_secs,
        })
    }

    fn query_param<'a>(url: &'a str, name: &str) -> &'a str {
        let query = url.split_once('?').map(|(_, q)| q).unwrap();
        query
            .split('&')
            .find_map(|pair| pair.strip_prefix(&format!("{name}=")))
            .unwrap()
    }

    #[test]
    fn signed_url_verifies_until_expiry() {
        let signer = signer(900);
        let now = Utc::now();
        let signed = signer.sign("bucket", "test3.txt", now);

        assert!(
            signed
                .url
                .starts_with("http://127.0.0.1:3000/bucket/test3.txt?Expires=")
        );
        let expires: i64 = query_param(&signed.url, "Expires").parse().unwrap();
        let signature = query_param(&signed.url, "Signature");
        assert_eq!(signature.len(), 64);

        assert_eq!(
            signer.verify("bucket", "test3.txt", expires, signature, now),
            Ok(())
        );
        assert_eq!(
            signer.verify(
                "bucket",
                "test3.txt",
                expires,
                signature,
                now + Duration::seconds(901)
            ),
            Err(SignatureError::Expired)
        );
    }

    #[test]
    fn tampering_is_detected() {
        let signer = signer(60);
        let now = Utc::now();
        let signed = signer.sign("bucket", "a.txt", now);
        let expires: i64 = query_param(&signed.url, "Expires").parse().unwrap();
        let signature = query_param(&signed.url, "Signature");

        assert_eq!(
            signer.verify("bucket", "b.txt", expires, signature, now),
            Err(SignatureError::Mismatch)
        );
        assert_eq!(
            signer.verify("bucket", "a.txt", expires + 1, signature, now),
            Err(SignatureError::Mismatch)
        );
        assert_eq!(
            signer.verify("bucket", "a.txt", expires, "zz", now),
            Err(SignatureError::Malformed)
        );
    }

    #[test]
    fn ttl_is_clamped_to_seven_days() {
        assert_eq!(signer(10_000_000).ttl(), Duration::seconds(604_800));
        assert_eq!(signer(0).ttl(), Duration::seconds(1));
    }

    #[test]
    fn oversized_ttl_saturates_instead_of_wrapping() {
        assert_eq!(signer(u64::MAX).ttl(), Duration::seconds(604_800));
        assert_eq!(signer(i64::MAX as u64 + 1).ttl(), Duration::seconds(604_800));
    }

    #[test]
    fn keys_are_percent_encoded_except_slashes() {
        assert_eq!(encode_key_path("dir/my file+1.txt"), "dir/my%20file%2B1.txt");
        assert_eq!(encode_key_path("a-b_c.d~e"), "a-b_c.d~e");
        assert_eq!(encode_key_path("caf\u{e9}?.txt"), "caf%C3%A9%3F.txt");
    }
}
