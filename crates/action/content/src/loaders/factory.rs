//! Content factory for building a content library from a data directory.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use action_core::{
    ActionConfig, ActionTemplate, ContentLibrary, EffectTemplate, TagRelationshipMapping,
};

use crate::loaders::{ActionLoader, ConfigLoader, EffectLoader, LoadResult, TagMappingLoader};

/// Loads all action content from a data directory.
///
/// # Directory Structure
///
/// ```text
/// data_dir/
/// ├── config.toml
/// ├── effects.ron
/// ├── tags.ron        (optional)
/// └── actions/
///     ├── primary.ron
///     └── abilities.ron
/// ```
pub struct ContentFactory {
    data_dir: PathBuf,
}

impl ContentFactory {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    /// Load engine configuration from `config.toml`.
    pub fn load_config(&self) -> LoadResult<ActionConfig> {
        ConfigLoader::load(&self.data_dir.join("config.toml"))
    }

    /// Load action templates from every file in `actions/`.
    pub fn load_actions(&self) -> LoadResult<Vec<ActionTemplate>> {
        ActionLoader::load_dir(&self.data_dir.join("actions"))
    }

    pub fn load_effects(&self) -> LoadResult<Vec<EffectTemplate>> {
        EffectLoader::load(&self.data_dir.join("effects.ron"))
    }

    /// Load the relationship mapping from `tags.ron`, or an empty one when
    /// the file is absent.
    pub fn load_mapping(&self) -> LoadResult<TagRelationshipMapping> {
        let path = self.data_dir.join("tags.ron");
        if !path.exists() {
            return Ok(TagRelationshipMapping::default());
        }
        TagMappingLoader::load(&path)
    }

    /// Loads every template and the mapping, then validates the result.
    pub fn load_library(&self) -> LoadResult<ContentLibrary> {
        assemble(self.load_actions()?, self.load_effects()?, self.load_mapping()?)
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }
}

/// Builds and validates a library; duplicate ids are rejected.
pub(crate) fn assemble(
    actions: Vec<ActionTemplate>,
    effects: Vec<EffectTemplate>,
    mapping: TagRelationshipMapping,
) -> LoadResult<ContentLibrary> {
    let mut seen = BTreeSet::new();
    for action in &actions {
        if !seen.insert(action.id.as_str()) {
            anyhow::bail!("action template '{}' is defined twice", action.id);
        }
    }
    let mut seen = BTreeSet::new();
    for effect in &effects {
        if !seen.insert(effect.id.as_str()) {
            anyhow::bail!("effect template '{}' is defined twice", effect.id);
        }
    }

    let mut builder = ContentLibrary::builder().mapping(mapping);
    for effect in effects {
        builder = builder.effect(effect);
    }
    for action in actions {
        builder = builder.action(action);
    }
    let library = builder.build();

    if let Err(errors) = library.validate() {
        let details: Vec<String> = errors.iter().map(ToString::to_string).collect();
        anyhow::bail!("invalid content: {}", details.join("; "));
    }
    tracing::info!(
        target: "action::registry",
        actions = library.actions().count(),
        effects = library.effects().count(),
        "content library loaded"
    );
    Ok(library)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_minimal(dir: &Path, actions: &str) {
        fs::create_dir_all(dir.join("actions")).unwrap();
        fs::write(dir.join("config.toml"), "world_seed = 1\n").unwrap();
        fs::write(
            dir.join("effects.ron"),
            r#"[(id: "Haste", duration_policy: Infinite)]"#,
        )
        .unwrap();
        fs::write(dir.join("actions").join("all.ron"), actions).unwrap();
    }

    #[test]
    fn loads_a_data_directory_without_mapping() {
        let dir = tempfile::tempdir().unwrap();
        write_minimal(
            dir.path(),
            r#"[(id: "Sprint", phases: [(phase_tag: "Phase.Action.Begin", on_enter: [(kind: ApplyEffectToSelf("Haste"))])])]"#,
        );

        let factory = ContentFactory::new(dir.path());
        let library = factory.load_library().unwrap();
        assert!(library.action(&"Sprint".into()).is_some());
        assert!(library.mapping().relationships().is_empty());
        assert_eq!(factory.load_config().unwrap().world_seed, 1);
    }

    #[test]
    fn dangling_effect_reference_fails_validation() {
        let dir = tempfile::tempdir().unwrap();
        write_minimal(
            dir.path(),
            r#"[(id: "Sprint", cooldown_effect: Some("Cooldown.Sprint"), phases: [(phase_tag: "Phase.Action.Begin")])]"#,
        );

        let err = ContentFactory::new(dir.path()).load_library().unwrap_err();
        assert!(err.to_string().contains("Cooldown.Sprint"));
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let err = assemble(
            vec![ActionTemplate::new("Twice"), ActionTemplate::new("Twice")],
            Vec::new(),
            TagRelationshipMapping::default(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("Twice"));
    }
}
