// src/config/mod.rs

//! Composite description loading.
//!
//! - [`model`] holds the `serde` types mirroring the TOML layout and the
//!   validated [`CompositeConfig`].
//! - [`validate`] turns a raw description into a validated one.
//! - [`loader`] reads descriptions from disk.

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path, parse_and_validate};
pub use model::{
    BuildConfig, CompositeConfig, EngineSection, RawCompositeConfig, TaskConfig, parse_duration,
    split_task_ref,
};
