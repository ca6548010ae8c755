//! Image upload and reply retrieval
//!
//! Posts a captured JPEG as a single multipart field and returns the audio
//! bytes the endpoint answers with. Transport failures, non-success
//! statuses, and empty bodies all come back as errors; nothing is retried.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;

use crate::codec::EncodedImage;
use crate::{Error, Result};

/// Raw reply from the transport
#[derive(Debug, Clone)]
pub struct TransportResponse {
    /// HTTP status
    pub status: StatusCode,
    /// Response body
    pub body: Vec<u8>,
}

/// External transport capability
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send the image, consuming it
    async fn post_image(&self, image: EncodedImage) -> Result<TransportResponse>;
}

/// Multipart form layout for the upload
#[derive(Debug, Clone)]
pub struct UploadForm {
    /// Form field carrying the JPEG
    pub field_name: String,
    /// File name attached to the part
    pub file_name: String,
}

impl Default for UploadForm {
    fn default() -> Self {
        Self {
            field_name: "file".to_string(),
            file_name: "photo.jpg".to_string(),
        }
    }
}

/// reqwest-backed transport posting to a fixed endpoint
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
    form: UploadForm,
}

impl HttpTransport {
    /// Create a transport for an endpoint
    ///
    /// # Errors
    ///
    /// Returns error if the endpoint is not a valid URL or the client cannot be built
    pub fn new(endpoint: &str, timeout: Duration, form: UploadForm) -> Result<Self> {
        reqwest::Url::parse(endpoint)
            .map_err(|e| Error::Config(format!("invalid upload endpoint {endpoint}: {e}")))?;

        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
            form,
        })
    }

    /// Endpoint URL
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post_image(&self, image: EncodedImage) -> Result<TransportResponse> {
        tracing::debug!(
            endpoint = %self.endpoint,
            image_bytes = image.len(),
            "uploading capture"
        );

        let part = reqwest::multipart::Part::bytes(image.into_bytes())
            .file_name(self.form.file_name.clone())
            .mime_str("image/jpeg")
            .map_err(|e| Error::Upload(e.to_string()))?;
        let form = reqwest::multipart::Form::new().part(self.form.field_name.clone(), part);

        let response = self
            .client
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "upload request failed");
                e
            })?;

        let status = response.status();
        tracing::debug!(status = %status, "received response");

        let body = response.bytes().await?.to_vec();
        Ok(TransportResponse { status, body })
    }
}

/// Sends captures and interprets the endpoint's reply
#[derive(Clone)]
pub struct UploadCoordinator {
    transport: Arc<dyn Transport>,
}

impl UploadCoordinator {
    /// Create a coordinator over a transport
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Upload an image and return the reply audio
    ///
    /// # Errors
    ///
    /// Returns `Upload`/`Http` on transport failure, `Server` on a
    /// non-success status, and `EmptyResponse` when the body is empty
    pub async fn upload(&self, image: EncodedImage) -> Result<Vec<u8>> {
        let response = self.transport.post_image(image).await?;

        if !response.status.is_success() {
            let body = String::from_utf8_lossy(&response.body).into_owned();
            tracing::error!(status = %response.status, body = %body, "endpoint rejected capture");
            return Err(Error::Server {
                status: response.status,
                body,
            });
        }

        if response.body.is_empty() {
            tracing::warn!(status = %response.status, "endpoint returned no audio");
            return Err(Error::EmptyResponse);
        }

        tracing::info!(audio_bytes = response.body.len(), "reply received");
        Ok(response.body)
    }
}

impl std::fmt::Debug for UploadCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadCoordinator").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Canned(StatusCode, Vec<u8>);

    #[async_trait]
    impl Transport for Canned {
        async fn post_image(&self, _image: EncodedImage) -> Result<TransportResponse> {
            Ok(TransportResponse {
                status: self.0,
                body: self.1.clone(),
            })
        }
    }

    struct Unreachable;

    #[async_trait]
    impl Transport for Unreachable {
        async fn post_image(&self, _image: EncodedImage) -> Result<TransportResponse> {
            Err(Error::Upload("connection refused".to_string()))
        }
    }

    fn image() -> EncodedImage {
        EncodedImage::from_jpeg(vec![0xFF, 0xD8, 0xFF, 0xD9], 2, 2)
    }

    #[tokio::test]
    async fn test_success_returns_body() {
        let coordinator = UploadCoordinator::new(Arc::new(Canned(StatusCode::OK, vec![7; 4000])));
        let audio = coordinator.upload(image()).await.unwrap();
        assert_eq!(audio.len(), 4000);
    }

    #[tokio::test]
    async fn test_error_status() {
        let coordinator = UploadCoordinator::new(Arc::new(Canned(
            StatusCode::INTERNAL_SERVER_ERROR,
            b"no match".to_vec(),
        )));
        match coordinator.upload(image()).await {
            Err(Error::Server { status, body }) => {
                assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
                assert_eq!(body, "no match");
            }
            other => panic!("expected server error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_empty_body_is_failure() {
        let coordinator = UploadCoordinator::new(Arc::new(Canned(StatusCode::OK, Vec::new())));
        let err = coordinator.upload(image()).await.unwrap_err();
        assert!(matches!(err, Error::EmptyResponse));
        assert!(err.is_upload_failure());
    }

    #[tokio::test]
    async fn test_transport_failure() {
        let coordinator = UploadCoordinator::new(Arc::new(Unreachable));
        let err = coordinator.upload(image()).await.unwrap_err();
        assert!(err.is_upload_failure());
    }

    #[test]
    fn test_invalid_endpoint_rejected() {
        let err = HttpTransport::new("not a url", Duration::from_secs(1), UploadForm::default())
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
