//! Data-driven action content and loaders.
//!
//! This crate reads the static data an action world runs on:
//! - Action templates (RON, one or more files under `actions/`)
//! - Effect templates (RON)
//! - The tag relationship mapping (RON)
//! - Engine configuration (TOML)
//!
//! A copy of the sample data in `data/` is embedded at compile time and
//! available through [`builtin_library`] without touching the filesystem.
//! Everything ends up in an [`action_core::ContentLibrary`], which is
//! validated before it is handed to a world.

#[cfg(feature = "loaders")]
pub mod loaders;

#[cfg(feature = "loaders")]
pub use loaders::{
    ActionLoader, ConfigLoader, ContentFactory, EffectLoader, LoadResult, TagMappingLoader,
    builtin_config, builtin_library,
};
