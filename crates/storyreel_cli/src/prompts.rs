use std::fs;
use std::path::Path;

use reel_logging::reel_info;
use serde::Deserialize;
use storyreel_core::GenerationPrompt;

use crate::config::ConfigError;

#[derive(Debug, Clone, Deserialize)]
struct PersistedPrompt {
    id: String,
    prompt: String,
}

/// Reads a RON prompt list such as `[(id: "1", prompt: "harbor at dawn")]`.
pub fn load_prompts(path: &Path) -> Result<Vec<GenerationPrompt>, ConfigError> {
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let persisted: Vec<PersistedPrompt> =
        ron::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

    let prompts: Vec<GenerationPrompt> = persisted
        .into_iter()
        .map(|entry| GenerationPrompt::new(entry.id, entry.prompt))
        .collect();
    reel_info!("Loaded {} prompts from {:?}", prompts.len(), path);
    Ok(prompts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_prompts_in_file_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shots.ron");
        fs::write(
            &path,
            r#"[
                (id: "2", prompt: "lighthouse in fog"),
                (id: "1", prompt: "harbor at dawn"),
            ]"#,
        )
        .unwrap();

        let prompts = load_prompts(&path).unwrap();
        assert_eq!(
            prompts,
            vec![
                GenerationPrompt::new("2", "lighthouse in fog"),
                GenerationPrompt::new("1", "harbor at dawn"),
            ]
        );
    }

    #[test]
    fn empty_list_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("none.ron");
        fs::write(&path, "[]").unwrap();
        assert!(load_prompts(&path).unwrap().is_empty());
    }

    #[test]
    fn entries_without_prompt_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.ron");
        fs::write(&path, r#"[(id: "1")]"#).unwrap();
        assert!(matches!(
            load_prompts(&path).unwrap_err(),
            ConfigError::Parse { .. }
        ));
    }
}
