//! Effect template loader.

use std::path::Path;

use action_core::EffectTemplate;

use crate::loaders::{LoadResult, parse_ron, read_file};

/// Loads a list of effect templates from a RON file.
pub struct EffectLoader;

impl EffectLoader {
    pub fn load(path: &Path) -> LoadResult<Vec<EffectTemplate>> {
        let content = read_file(path)?;
        parse_ron(&content, &path.display().to_string())
    }
}
