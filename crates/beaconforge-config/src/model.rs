//! Typed configuration models.
//!
//! # Design
//! - Pure data carriers consumed by the runner and the CLI.
//! - [`TransformOptions`] serialises directly into the service query string.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

use crate::defaults;
use crate::error::ConfigError;

/// Channel the generated beacon uses to report back.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    /// Plain HTTP callbacks.
    #[default]
    Http,
    /// DNS tunnelling.
    Dns,
    /// Raw TCP connection.
    Tcp,
}

impl Transport {
    #[must_use]
    /// Render the transport as its wire representation.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Dns => "dns",
            Self::Tcp => "tcp",
        }
    }
}

impl FromStr for Transport {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "http" => Ok(Self::Http),
            "dns" => Ok(Self::Dns),
            "tcp" => Ok(Self::Tcp),
            _ => Err(ConfigError::invalid(
                "transport",
                s,
                "must be one of http, dns, tcp",
            )),
        }
    }
}

/// How a run reacts to per-file failures.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Any failure aborts the run before a single destination is written.
    #[default]
    Strict,
    /// Finalize whatever staged and report failures as warnings.
    Continue,
    /// Like [`FailurePolicy::Continue`], but a run that finalizes nothing fails.
    ContinueUnlessAllFail,
}

impl FailurePolicy {
    /// Whether failures in the upload wave still let the rest finalize.
    #[must_use]
    pub const fn continues_on_failure(self) -> bool {
        !matches!(self, Self::Strict)
    }
}

/// Parameters forwarded verbatim to the transform service as query pairs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransformOptions {
    /// Build the beacon with debug output.
    pub debug: bool,
    /// Request a statically linked binary.
    #[serde(rename = "static")]
    pub static_binary: bool,
    /// Compress the result with upx.
    pub upx: bool,
    /// upx compression level.
    pub upx_level: u8,
    /// Gzip the response body.
    pub gzip: bool,
    /// Address the beacon reports to.
    pub connection_string: String,
    /// Target operating system in Go naming.
    pub os: String,
    /// Target architecture in Go naming.
    pub arch: String,
    /// Reporting transport.
    pub transport: Transport,
    /// Grouping identifier for beacons created together.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<Uuid>,
    /// Extra linker flags.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ldflags: Option<String>,
}

impl Default for TransformOptions {
    fn default() -> Self {
        Self {
            debug: false,
            static_binary: false,
            upx: false,
            upx_level: 1,
            gzip: false,
            connection_string: defaults::CONNECTION_STRING.to_string(),
            os: defaults::host_os(),
            arch: defaults::host_arch(),
            transport: Transport::Http,
            group_id: None,
            ldflags: None,
        }
    }
}

/// Fully resolved and validated settings for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Configuration {
    /// Source files to transform, in input order.
    pub files: Vec<PathBuf>,
    /// Base address of the transform service.
    pub service_url: Url,
    /// Request path appended to the base address.
    pub upload_path: String,
    /// Directory receiving results instead of overwriting sources.
    pub output_folder: Option<PathBuf>,
    /// Reaction to per-file failures.
    pub failure_policy: FailurePolicy,
    /// Directory for staged artifacts; platform temp dir when unset.
    pub temp_dir: Option<PathBuf>,
    /// Per-request timeout applied by the HTTP client.
    pub request_timeout: Option<Duration>,
    /// Cap on simultaneous tasks per wave; unbounded when unset.
    pub max_concurrency: Option<usize>,
    /// Option bag forwarded to the service.
    pub options: TransformOptions,
}

impl Configuration {
    /// Configuration with built-in defaults for everything but the inputs.
    #[must_use]
    pub fn new(files: Vec<PathBuf>, service_url: Url) -> Self {
        Self {
            files,
            service_url,
            upload_path: defaults::UPLOAD_PATH.to_string(),
            output_folder: None,
            failure_policy: FailurePolicy::Strict,
            temp_dir: None,
            request_timeout: None,
            max_concurrency: None,
            options: TransformOptions::default(),
        }
    }

    /// Full request URL: the service address with the upload path appended to
    /// any path it already carries.
    #[must_use]
    pub fn endpoint(&self) -> Url {
        let mut url = self.service_url.clone();
        let joined = format!(
            "{}{}",
            url.path().trim_end_matches('/'),
            self.upload_path
        );
        url.set_path(&joined);
        url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base(url: &str) -> Url {
        Url::parse(url).expect("valid url")
    }

    #[test]
    fn endpoint_appends_upload_path() {
        let config = Configuration::new(Vec::new(), base("http://127.0.0.1:8080"));
        assert_eq!(config.endpoint().as_str(), "http://127.0.0.1:8080/creator");

        let mut nested = Configuration::new(Vec::new(), base("https://svc.example/api/"));
        nested.upload_path = "/v1/upload".into();
        assert_eq!(nested.endpoint().as_str(), "https://svc.example/api/v1/upload");
    }

    #[test]
    fn transport_parses_case_insensitively() {
        assert_eq!("DNS".parse::<Transport>().ok(), Some(Transport::Dns));
        assert_eq!(Transport::Tcp.as_str(), "tcp");
        let err = "smtp".parse::<Transport>().expect_err("smtp is not a transport");
        assert!(matches!(
            err,
            ConfigError::InvalidField {
                field: "transport",
                ..
            }
        ));
    }

    #[test]
    fn options_serialise_with_wire_keys() {
        let options = TransformOptions {
            static_binary: true,
            os: "linux".into(),
            arch: "amd64".into(),
            ..TransformOptions::default()
        };
        let value = serde_json::to_value(&options).expect("serialise options");
        assert_eq!(value["static"], true);
        assert_eq!(value["transport"], "http");
        assert_eq!(value["upx_level"], 1);
        assert!(value.get("group_id").is_none());
        assert!(value.get("ldflags").is_none());
    }

    #[test]
    fn only_strict_policy_stops_on_failure() {
        assert!(!FailurePolicy::Strict.continues_on_failure());
        assert!(FailurePolicy::Continue.continues_on_failure());
        assert!(FailurePolicy::ContinueUnlessAllFail.continues_on_failure());
    }
}
