// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::model::{CompositeConfig, RawCompositeConfig};
use crate::errors::Result;

/// Load a composite description from a given path and return the raw
/// `RawCompositeConfig`.
///
/// This only performs TOML deserialization; it does **not** perform semantic
/// validation (root build, task references, cycles). Use
/// [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawCompositeConfig> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let config: RawCompositeConfig = toml::from_str(&contents)?;

    Ok(config)
}

/// Parse a composite description held in memory, with validation.
pub fn parse_and_validate(contents: &str) -> Result<CompositeConfig> {
    let raw: RawCompositeConfig = toml::from_str(contents)?;
    CompositeConfig::try_from(raw)
}

/// Load a composite description from path and validate it.
///
/// - Reads TOML.
/// - Applies defaults (handled by `serde` + `Default` impls).
/// - Checks for:
///   - a single root build,
///   - a usable poll interval,
///   - unknown `requested` / `after` references,
///   - cycles across the whole composite.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<CompositeConfig> {
    let raw_config = load_from_path(&path)?;
    let config = CompositeConfig::try_from(raw_config)?;
    Ok(config)
}

/// Default location of the composite description: `Composite.toml` in the
/// current working directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("Composite.toml")
}
