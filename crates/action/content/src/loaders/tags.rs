//! Tag relationship mapping loader.

use std::path::Path;

use action_core::TagRelationshipMapping;

use crate::loaders::{LoadResult, parse_ron, read_file};

pub struct TagMappingLoader;

impl TagMappingLoader {
    /// Loads a mapping stored as a RON list of relationship rows.
    pub fn load(path: &Path) -> LoadResult<TagRelationshipMapping> {
        let content = read_file(path)?;
        parse_ron(&content, &path.display().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use action_core::{Tag, TagSet};

    #[test]
    fn rows_feed_the_mapping_queries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tags.ron");
        std::fs::write(
            &path,
            r#"[(action_tag: "Action.Type.Channel", activation_blocked_tags: ["State.Debuff.Silenced"])]"#,
        )
        .unwrap();

        let mapping = TagMappingLoader::load(&path).unwrap();
        let blocked = mapping.blocked_tags(&TagSet::single(Tag::new("Action.Type.Channel")));
        assert!(blocked.has_tag_exact(&Tag::new("State.Debuff.Silenced")));
        assert!(mapping.required_tags(&TagSet::single(Tag::new("Action.Type.Channel"))).is_empty());
    }
}
