//! Validation that turns a merged [`ConfigLayer`] into a [`Configuration`].

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use crate::defaults;
use crate::error::{ConfigError, ConfigResult};
use crate::loader::ConfigLayer;
use crate::model::{Configuration, TransformOptions, Transport};

/// Fill defaults into `layer` and validate every field.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidField`] for the first field that fails
/// validation.
pub fn build(layer: ConfigLayer) -> ConfigResult<Configuration> {
    let files = validate_files(layer.files.unwrap_or_default())?;
    let service_url =
        parse_service_url(layer.addr.as_deref().unwrap_or(defaults::SERVICE_URL))?;
    let upload_path = validate_upload_path(
        layer
            .upload_path
            .unwrap_or_else(|| defaults::UPLOAD_PATH.to_string()),
    )?;
    let upx_level = validate_upx_level(layer.upx_level.unwrap_or(defaults::UPX_LEVEL))?;
    let transport: Transport = layer
        .transport
        .as_deref()
        .unwrap_or(defaults::TRANSPORT)
        .parse()?;
    let max_concurrency = positive("max_concurrency", layer.max_concurrency)?;
    let request_timeout =
        positive("timeout_secs", layer.timeout_secs)?.map(Duration::from_secs);

    let options = TransformOptions {
        debug: layer.debug.unwrap_or(false),
        static_binary: layer.static_binary.unwrap_or(false),
        upx: layer.upx.unwrap_or(false),
        upx_level,
        gzip: layer.gzip.unwrap_or(false),
        connection_string: layer
            .connection_string
            .unwrap_or_else(|| defaults::CONNECTION_STRING.to_string()),
        os: layer.os.unwrap_or_else(defaults::host_os),
        arch: layer.arch.unwrap_or_else(defaults::host_arch),
        transport,
        group_id: layer.group_id,
        ldflags: layer.ldflags.filter(|flags| !flags.trim().is_empty()),
    };

    Ok(Configuration {
        files,
        service_url,
        upload_path,
        output_folder: layer.output,
        failure_policy: layer.failure_policy.unwrap_or_default(),
        temp_dir: layer.temp_dir,
        request_timeout,
        max_concurrency,
        options,
    })
}

/// Ensure the file list is non-empty and names existing regular files.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidField`] for an empty list or the first
/// unusable path.
pub fn validate_files(files: Vec<PathBuf>) -> ConfigResult<Vec<PathBuf>> {
    if files.is_empty() {
        return Err(ConfigError::InvalidField {
            field: "files",
            value: None,
            reason: "at least one file is required",
        });
    }
    for file in &files {
        let display = file.display().to_string();
        let metadata = fs::metadata(file)
            .map_err(|_| ConfigError::invalid("files", display.as_str(), "file does not exist"))?;
        if !metadata.is_file() {
            return Err(ConfigError::invalid("files", display, "not a regular file"));
        }
    }
    Ok(files)
}

/// Parse the service base address.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidField`] unless `raw` is an absolute
/// `http`/`https` URL with a host.
pub fn parse_service_url(raw: &str) -> ConfigResult<Url> {
    let url = Url::parse(raw.trim())
        .map_err(|_| ConfigError::invalid("addr", raw, "must be an absolute URL"))?;
    if !matches!(url.scheme(), "http" | "https") || !url.has_host() {
        return Err(ConfigError::invalid(
            "addr",
            raw,
            "must use the http or https scheme",
        ));
    }
    Ok(url)
}

fn validate_upload_path(path: String) -> ConfigResult<String> {
    if path.starts_with('/') {
        Ok(path)
    } else {
        Err(ConfigError::invalid(
            "upload_path",
            path,
            "must start with '/'",
        ))
    }
}

fn validate_upx_level(level: i64) -> ConfigResult<u8> {
    if !defaults::UPX_LEVEL_RANGE.contains(&level) {
        return Err(ConfigError::invalid(
            "upx_level",
            level.to_string(),
            "must be between 1 and 10",
        ));
    }
    u8::try_from(level)
        .map_err(|_| ConfigError::invalid("upx_level", level.to_string(), "out of range"))
}

fn positive<T>(field: &'static str, value: Option<T>) -> ConfigResult<Option<T>>
where
    T: Copy + Default + PartialEq + ToString,
{
    match value {
        Some(inner) if inner == T::default() => Err(ConfigError::invalid(
            field,
            inner.to_string(),
            "must be positive",
        )),
        other => Ok(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn layer_with_file(dir: &TempDir) -> ConfigLayer {
        let path = dir.path().join("agent.bin");
        fs::write(&path, b"bin").expect("write source");
        ConfigLayer {
            files: Some(vec![path]),
            ..ConfigLayer::default()
        }
    }

    fn invalid_field(err: &ConfigError) -> Option<&'static str> {
        match err {
            ConfigError::InvalidField { field, .. } => Some(*field),
            _ => None,
        }
    }

    #[test]
    fn defaults_fill_unset_fields() {
        let dir = TempDir::new().expect("tempdir");
        let config = build(layer_with_file(&dir)).expect("valid layer");
        assert_eq!(config.service_url.as_str(), "http://127.0.0.1:8080/");
        assert_eq!(config.upload_path, "/creator");
        assert_eq!(config.options.connection_string, "127.0.0.1:5353");
        assert_eq!(config.options.upx_level, 1);
        assert_eq!(config.options.transport, Transport::Http);
        assert_eq!(config.options.os, defaults::host_os());
        assert!(config.request_timeout.is_none());
        assert!(config.max_concurrency.is_none());
        assert!(config.output_folder.is_none());
    }

    #[test]
    fn empty_file_list_is_rejected() {
        let err = build(ConfigLayer::default()).expect_err("no files");
        assert_eq!(invalid_field(&err), Some("files"));
    }

    #[test]
    fn missing_and_directory_paths_are_rejected() {
        let dir = TempDir::new().expect("tempdir");
        let missing = validate_files(vec![dir.path().join("nope")]).expect_err("missing");
        assert!(matches!(
            missing,
            ConfigError::InvalidField {
                reason: "file does not exist",
                ..
            }
        ));
        let directory = validate_files(vec![dir.path().to_path_buf()]).expect_err("dir");
        assert!(matches!(
            directory,
            ConfigError::InvalidField {
                reason: "not a regular file",
                ..
            }
        ));
    }

    #[test]
    fn field_rules_are_enforced() {
        let dir = TempDir::new().expect("tempdir");
        let cases = [
            (
                ConfigLayer {
                    addr: Some("ftp://host".into()),
                    ..layer_with_file(&dir)
                },
                "addr",
            ),
            (
                ConfigLayer {
                    addr: Some("not a url".into()),
                    ..layer_with_file(&dir)
                },
                "addr",
            ),
            (
                ConfigLayer {
                    upload_path: Some("creator".into()),
                    ..layer_with_file(&dir)
                },
                "upload_path",
            ),
            (
                ConfigLayer {
                    upx_level: Some(11),
                    ..layer_with_file(&dir)
                },
                "upx_level",
            ),
            (
                ConfigLayer {
                    upx_level: Some(0),
                    ..layer_with_file(&dir)
                },
                "upx_level",
            ),
            (
                ConfigLayer {
                    transport: Some("icmp".into()),
                    ..layer_with_file(&dir)
                },
                "transport",
            ),
            (
                ConfigLayer {
                    max_concurrency: Some(0),
                    ..layer_with_file(&dir)
                },
                "max_concurrency",
            ),
            (
                ConfigLayer {
                    timeout_secs: Some(0),
                    ..layer_with_file(&dir)
                },
                "timeout_secs",
            ),
        ];
        for (layer, field) in cases {
            let err = build(layer).expect_err("invalid layer");
            assert_eq!(invalid_field(&err), Some(field));
        }
    }

    #[test]
    fn optional_settings_carry_through() {
        let dir = TempDir::new().expect("tempdir");
        let group = uuid::Uuid::new_v4();
        let config = build(ConfigLayer {
            timeout_secs: Some(30),
            max_concurrency: Some(4),
            group_id: Some(group),
            ldflags: Some("-s -w".into()),
            output: Some(dir.path().join("out")),
            ..layer_with_file(&dir)
        })
        .expect("valid layer");
        assert_eq!(config.request_timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.max_concurrency, Some(4));
        assert_eq!(config.options.group_id, Some(group));
        assert_eq!(config.options.ldflags.as_deref(), Some("-s -w"));
        assert_eq!(config.output_folder, Some(dir.path().join("out")));
    }
}
