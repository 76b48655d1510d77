//! Action template loader.

use std::path::{Path, PathBuf};

use action_core::ActionTemplate;
use anyhow::Context;

use crate::loaders::{LoadResult, parse_ron, read_file};

/// Loads action templates from RON files.
///
/// Each file holds a list of templates:
///
/// ```ron
/// [
///     (
///         id: "Dash",
///         identifier_tag: Some("Action.Id.Dash"),
///         phases: [(phase_tag: "Phase.Action.Begin")],
///     ),
/// ]
/// ```
pub struct ActionLoader;

impl ActionLoader {
    pub fn load(path: &Path) -> LoadResult<Vec<ActionTemplate>> {
        let content = read_file(path)?;
        parse_ron(&content, &path.display().to_string())
    }

    /// Loads every `*.ron` file in `dir`, in file-name order.
    pub fn load_dir(dir: &Path) -> LoadResult<Vec<ActionTemplate>> {
        let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
            .with_context(|| format!("failed to list {}", dir.display()))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.extension().is_some_and(|ext| ext == "ron"))
            .collect();
        files.sort();

        let mut templates = Vec::new();
        for file in files {
            let loaded = Self::load(&file)?;
            tracing::debug!(target: "action::registry", file = %file.display(), count = loaded.len(), "loaded action templates");
            templates.extend(loaded);
        }
        Ok(templates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn loads_every_file_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("b.ron"),
            r#"[(id: "Second", phases: [(phase_tag: "Phase.Action.Begin")])]"#,
        )
        .unwrap();
        fs::write(
            dir.path().join("a.ron"),
            r#"[(id: "First", instancing: NonInstanced, trigger_tags: ["Event.Hit"])]"#,
        )
        .unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let templates = ActionLoader::load_dir(dir.path()).unwrap();
        let ids: Vec<&str> = templates.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, ["First", "Second"]);
        assert!(templates[0].apply_cooldown_on_start);
        assert_eq!(templates[1].phases.len(), 1);
    }

    #[test]
    fn parse_errors_name_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.ron");
        fs::write(&path, "[(id: ").unwrap();

        let err = ActionLoader::load(&path).unwrap_err();
        assert!(format!("{err:#}").contains("broken.ron"));
    }
}
