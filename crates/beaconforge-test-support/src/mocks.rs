//! Scripted [`TransformClient`] for driving the runner without a service.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream;

use beaconforge_config::TransformOptions;
use beaconforge_runner::{ResponseStream, TransformClient, TransformError};

/// Scripted reaction to one upload.
#[derive(Debug, Clone)]
pub enum Reply {
    /// Success with this body.
    Body(Bytes),
    /// Non-success status with this body.
    Reject {
        /// HTTP status.
        status: u16,
        /// Response body text.
        body: String,
    },
    /// Connection failure before any response.
    Unreachable,
    /// Success status whose body stream breaks after `partial`.
    BrokenStream {
        /// Bytes delivered before the break.
        partial: Bytes,
    },
}

impl Reply {
    /// Success with a static body.
    #[must_use]
    pub const fn body(bytes: &'static [u8]) -> Self {
        Self::Body(Bytes::from_static(bytes))
    }

    /// Rejection with `status` and `body`.
    #[must_use]
    pub fn reject(status: u16, body: &str) -> Self {
        Self::Reject {
            status,
            body: body.to_string(),
        }
    }
}

/// Client replying per source file name, recording every call.
#[derive(Debug)]
pub struct ScriptedTransformClient {
    default: Reply,
    by_name: HashMap<String, Reply>,
    calls: Mutex<Vec<(PathBuf, TransformOptions)>>,
}

impl ScriptedTransformClient {
    /// Client answering every upload with `default`.
    #[must_use]
    pub fn new(default: Reply) -> Self {
        Self {
            default,
            by_name: HashMap::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Override the reply for sources whose file name is `name`.
    #[must_use]
    pub fn with_reply(mut self, name: &str, reply: Reply) -> Self {
        self.by_name.insert(name.to_string(), reply);
        self
    }

    /// Sources uploaded so far, in call order.
    #[must_use]
    pub fn calls(&self) -> Vec<PathBuf> {
        self.recorded().into_iter().map(|(path, _)| path).collect()
    }

    /// Options passed with each upload, in call order.
    #[must_use]
    pub fn options_seen(&self) -> Vec<TransformOptions> {
        self.recorded()
            .into_iter()
            .map(|(_, options)| options)
            .collect()
    }

    /// Number of uploads so far.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.recorded().len()
    }

    fn recorded(&self) -> Vec<(PathBuf, TransformOptions)> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    fn reply_for(&self, source: &Path) -> &Reply {
        source
            .file_name()
            .and_then(|name| self.by_name.get(name.to_string_lossy().as_ref()))
            .unwrap_or(&self.default)
    }
}

#[async_trait]
impl TransformClient for ScriptedTransformClient {
    async fn send(
        &self,
        options: &TransformOptions,
        source: &Path,
    ) -> Result<ResponseStream, TransformError> {
        match self.calls.lock() {
            Ok(mut calls) => calls.push((source.to_path_buf(), options.clone())),
            Err(poisoned) => poisoned
                .into_inner()
                .push((source.to_path_buf(), options.clone())),
        }

        match self.reply_for(source).clone() {
            Reply::Body(body) => Ok(Box::pin(stream::iter(vec![Ok(body)]))),
            Reply::Reject { status, body } => Err(TransformError::Rejected { status, body }),
            Reply::Unreachable => Err(TransformError::network(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "connection refused",
            ))),
            Reply::BrokenStream { partial } => Ok(Box::pin(stream::iter(vec![
                Ok(partial),
                Err(TransformError::network(io::Error::new(
                    io::ErrorKind::ConnectionReset,
                    "connection reset",
                ))),
            ]))),
        }
    }
}
