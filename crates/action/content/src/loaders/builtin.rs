//! Sample content embedded at compile time.

use action_core::{ActionConfig, ActionTemplate, ContentLibrary};

use crate::loaders::{ConfigLoader, LoadResult, factory::assemble, parse_ron};

const ACTION_FILES: [(&str, &str); 2] = [
    ("actions/primary.ron", include_str!("../../data/actions/primary.ron")),
    ("actions/abilities.ron", include_str!("../../data/actions/abilities.ron")),
];
const EFFECTS: &str = include_str!("../../data/effects.ron");
const TAGS: &str = include_str!("../../data/tags.ron");
const CONFIG: &str = include_str!("../../data/config.toml");

/// The sample library shipped under `data/`.
pub fn builtin_library() -> LoadResult<ContentLibrary> {
    let mut actions: Vec<ActionTemplate> = Vec::new();
    for (origin, text) in ACTION_FILES {
        actions.extend(parse_ron::<Vec<ActionTemplate>>(text, origin)?);
    }
    assemble(
        actions,
        parse_ron(EFFECTS, "effects.ron")?,
        parse_ron(TAGS, "tags.ron")?,
    )
}

pub fn builtin_config() -> LoadResult<ActionConfig> {
    ConfigLoader::parse(CONFIG)
}
