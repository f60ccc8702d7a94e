#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
#![allow(clippy::module_name_repetitions)]

//! Configuration for beaconforge runs.
//!
//! Layout: `model.rs` (resolved configuration and the transform option bag),
//! `loader.rs` (YAML file, command-line and environment layers),
//! `validate.rs` (turns a merged layer into a [`Configuration`]),
//! `defaults.rs` (built-in values and host platform naming).

pub mod defaults;
pub mod error;
pub mod loader;
pub mod model;
pub mod validate;

pub use error::{ConfigError, ConfigResult};
pub use loader::{
    ConfigLayer, ENV_CONNECTION_STRING, ENV_SERVICE_ADDR, apply_env_overrides, load_file, resolve,
};
pub use model::{Configuration, FailurePolicy, TransformOptions, Transport};
