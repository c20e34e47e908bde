/// Object store reached over plain HTTP
///
/// Objects live at `{base_url}/{bucket}/{key}` (path-style addressing, as
/// served by MinIO, Supabase Storage and most S3-compatible gateways).
/// An optional bearer token is sent with every request.
use reqwest::{Client as HttpClient, RequestBuilder, StatusCode};

use super::{BlobStore, StorageError};

#[derive(Clone)]
pub struct HttpBlobStore {
    http_client: HttpClient,
    base_url: String,
    bucket: String,
    token: Option<String>,
}

impl HttpBlobStore {
    pub fn new(
        base_url: impl Into<String>,
        bucket: impl Into<String>,
        token: Option<String>,
    ) -> Self {
        Self {
            http_client: HttpClient::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            bucket: bucket.into(),
            token,
        }
    }

    pub fn object_url(&self, key: &str) -> String {
        format!(
            "{}/{}/{}",
            self.base_url,
            self.bucket,
            key.trim_start_matches('/')
        )
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[async_trait::async_trait]
impl BlobStore for HttpBlobStore {
    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let url = self.object_url(key);
        let response = self.authorize(self.http_client.get(&url)).send().await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(StorageError::NotFound(key.to_string()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StorageError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await?;
        tracing::debug!(url = %url, bytes = bytes.len(), "Fetched object");
        Ok(bytes.to_vec())
    }

    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), StorageError> {
        let url = self.object_url(key);
        let response = self
            .authorize(self.http_client.put(&url))
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(bytes)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StorageError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
