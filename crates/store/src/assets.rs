//! Image asset upload with inline fallback.
//!
//! Tenants may carry an asset-hosting profile next to their store
//! credentials. When present, images attached to a request are uploaded
//! there and the durable URL is stored. Without a profile the image is
//! embedded as an inline data URL instead — bounded by a hard ceiling so
//! oversized payloads fail loudly rather than bloating the store.

use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Hard ceiling for inline data-URL fallback payloads (512 KiB).
pub const MAX_INLINE_BYTES: usize = 512 * 1024;

/// HTTP timeout for a single upload attempt.
const UPLOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// Asset-hosting credentials from the tenant profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadProfile {
    /// Upload endpoint accepting a POSTed image payload.
    pub endpoint: String,
    /// Bearer token identifying the tenant's upload bucket.
    pub token: String,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    url: String,
}

/// Uploads image payloads, falling back to inline data URLs.
pub struct AssetUploader {
    profile: Option<UploadProfile>,
    client: reqwest::Client,
}

impl AssetUploader {
    /// Create an uploader; `profile` is `None` when the tenant has no
    /// asset hosting configured.
    pub fn new(profile: Option<UploadProfile>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(UPLOAD_TIMEOUT)
            .build()
            .expect("Failed to build reqwest HTTP client");
        Self { profile, client }
    }

    /// Upload an image payload and return the URL to store.
    ///
    /// With a profile: POSTs the bytes and returns the durable URL the
    /// endpoint reports. Without one: returns a `data:` URL, provided the
    /// payload fits under [`MAX_INLINE_BYTES`]; larger payloads fail with
    /// [`StoreError::AssetTooLarge`] instead of degrading silently.
    pub async fn upload(&self, mime: &str, bytes: Vec<u8>) -> Result<String, StoreError> {
        match &self.profile {
            Some(profile) => self.upload_remote(profile, mime, bytes).await,
            None => inline_data_url(mime, &bytes),
        }
    }

    async fn upload_remote(
        &self,
        profile: &UploadProfile,
        mime: &str,
        bytes: Vec<u8>,
    ) -> Result<String, StoreError> {
        let response = self
            .client
            .post(&profile.endpoint)
            .bearer_auth(&profile.token)
            .header(reqwest::header::CONTENT_TYPE, mime)
            .body(bytes)
            .send()
            .await
            .map_err(|e| StoreError::Upload(e.to_string()))?;

        if !response.status().is_success() {
            return Err(StoreError::Upload(format!(
                "upload endpoint returned HTTP {}",
                response.status().as_u16()
            )));
        }

        let parsed: UploadResponse = response
            .json()
            .await
            .map_err(|e| StoreError::Upload(format!("malformed upload response: {e}")))?;
        Ok(parsed.url)
    }
}

/// Encode a payload as an inline `data:` URL, enforcing the size ceiling.
fn inline_data_url(mime: &str, bytes: &[u8]) -> Result<String, StoreError> {
    if bytes.len() > MAX_INLINE_BYTES {
        return Err(StoreError::AssetTooLarge {
            size: bytes.len(),
            max: MAX_INLINE_BYTES,
        });
    }
    Ok(format!("data:{mime};base64,{}", BASE64.encode(bytes)))
}
