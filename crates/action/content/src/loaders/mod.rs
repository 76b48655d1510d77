//! Content loaders for reading action data from files.

pub mod actions;
pub mod builtin;
pub mod config;
pub mod effects;
pub mod factory;
pub mod tags;

pub use actions::ActionLoader;
pub use builtin::{builtin_config, builtin_library};
pub use config::ConfigLoader;
pub use effects::EffectLoader;
pub use factory::ContentFactory;
pub use tags::TagMappingLoader;

use std::path::Path;

use anyhow::Context;

/// Common result type for loaders.
pub type LoadResult<T> = anyhow::Result<T>;

pub(crate) fn read_file(path: &Path) -> LoadResult<String> {
    std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

/// Parses a RON document, naming `origin` in the error.
pub(crate) fn parse_ron<T: serde::de::DeserializeOwned>(text: &str, origin: &str) -> LoadResult<T> {
    ron::from_str(text).with_context(|| format!("failed to parse RON in {origin}"))
}
