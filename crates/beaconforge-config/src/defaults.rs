//! Built-in configuration values.
//!
//! # Design
//! - Every default the loader falls back to lives here.
//! - Host platform names follow the Go toolchain naming the transform service
//!   expects (`darwin`, `amd64`, ...).

use std::env::consts;

/// Default address of the beacon creator service.
pub const SERVICE_URL: &str = "http://127.0.0.1:8080";
/// Default request path appended to the service address.
pub const UPLOAD_PATH: &str = "/creator";
/// Default connection string embedded into generated beacons.
pub const CONNECTION_STRING: &str = "127.0.0.1:5353";
/// Default beacon transport.
pub const TRANSPORT: &str = "http";
/// Default upx compression level.
pub const UPX_LEVEL: i64 = 1;
/// Inclusive range accepted for the upx compression level.
pub const UPX_LEVEL_RANGE: std::ops::RangeInclusive<i64> = 1..=10;

/// Host operating system in Go naming.
#[must_use]
pub fn host_os() -> String {
    go_os(consts::OS).to_string()
}

/// Host architecture in Go naming.
#[must_use]
pub fn host_arch() -> String {
    go_arch(consts::ARCH).to_string()
}

fn go_os(os: &str) -> &str {
    match os {
        "macos" => "darwin",
        other => other,
    }
}

fn go_arch(arch: &str) -> &str {
    match arch {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        "x86" => "386",
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rust_platform_names_map_to_go_names() {
        assert_eq!(go_os("macos"), "darwin");
        assert_eq!(go_os("linux"), "linux");
        assert_eq!(go_os("windows"), "windows");
        assert_eq!(go_arch("x86_64"), "amd64");
        assert_eq!(go_arch("aarch64"), "arm64");
        assert_eq!(go_arch("x86"), "386");
        assert_eq!(go_arch("riscv64"), "riscv64");
    }

    #[test]
    fn host_values_are_never_rust_names() {
        assert_ne!(host_os(), "macos");
        assert_ne!(host_arch(), "x86_64");
        assert_ne!(host_arch(), "aarch64");
    }
}
