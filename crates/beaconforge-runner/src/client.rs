//! Transform service client.
//!
//! The runner only sees [`TransformClient`]; [`HttpTransformClient`] is the
//! production adapter that streams a file to the service and hands back the
//! response body as a byte stream.

use std::path::Path;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{Stream, TryStreamExt};
use reqwest::header::{CONTENT_TYPE, HeaderValue};
use reqwest::{Body, Client, StatusCode, Url};
use tracing::debug;

use beaconforge_config::{Configuration, TransformOptions};

use crate::error::TransformError;

/// Streamed response body of a successful transform request.
pub type ResponseStream = Pin<Box<dyn Stream<Item = Result<Bytes, TransformError>> + Send>>;

const OCTET_STREAM: &str = "application/octet-stream";

/// Boundary to the remote transform service.
#[async_trait]
pub trait TransformClient: Send + Sync {
    /// Upload `source` with `options` and return the response body stream.
    async fn send(
        &self,
        options: &TransformOptions,
        source: &Path,
    ) -> Result<ResponseStream, TransformError>;
}

/// [`TransformClient`] speaking HTTP via `reqwest`.
#[derive(Clone)]
pub struct HttpTransformClient {
    http: Client,
    endpoint: Url,
}

impl HttpTransformClient {
    /// Build a client posting to `endpoint`, with an optional per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`TransformError::Network`] if the HTTP client cannot be built
    /// (for example, when the TLS backend fails to initialise).
    pub fn new(endpoint: Url, timeout: Option<Duration>) -> Result<Self, TransformError> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().map_err(TransformError::network)?;
        Ok(Self { http, endpoint })
    }

    /// Build a client for the endpoint and timeout of `config`.
    ///
    /// # Errors
    ///
    /// See [`HttpTransformClient::new`].
    pub fn from_config(config: &Configuration) -> Result<Self, TransformError> {
        Self::new(config.endpoint(), config.request_timeout)
    }

    /// Request URL, without query.
    #[must_use]
    pub const fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl TransformClient for HttpTransformClient {
    async fn send(
        &self,
        options: &TransformOptions,
        source: &Path,
    ) -> Result<ResponseStream, TransformError> {
        let file = tokio::fs::File::open(source)
            .await
            .map_err(|err| TransformError::Io {
                operation: "upload.open",
                path: source.to_path_buf(),
                source: err,
            })?;

        let response = self
            .http
            .post(self.endpoint.clone())
            .query(options)
            .header(CONTENT_TYPE, HeaderValue::from_static(OCTET_STREAM))
            .body(Body::from(file))
            .send()
            .await
            .map_err(TransformError::network)?;

        let status = response.status();
        debug!(path = %source.display(), status = status.as_u16(), "transform response");
        if status != StatusCode::OK {
            let body = response.text().await.map_err(TransformError::network)?;
            return Err(TransformError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        Ok(Box::pin(
            response.bytes_stream().map_err(TransformError::network),
        ))
    }
}
