use crate::config::{normalize_extension, RulesConfig};
use crate::error::{Result, RpfSortError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Component, Path};

/// Which bucket a file belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Classification {
    Stream,
    Data,
    Skip,
}

/// Static extension and folder tables. Immutable once built.
#[derive(Debug, Clone)]
pub struct ClassificationRules {
    stream_extensions: HashSet<String>,
    data_extensions: HashSet<String>,
    important_folders: Vec<String>,
    ignored_folders: Vec<String>,
    container_extension: String,
}

impl ClassificationRules {
    pub fn new(config: &RulesConfig) -> Result<Self> {
        let stream_extensions: HashSet<String> = config
            .stream_extensions
            .iter()
            .map(|e| normalize_extension(e))
            .filter(|e| !e.is_empty())
            .collect();
        let data_extensions: HashSet<String> = config
            .data_extensions
            .iter()
            .map(|e| normalize_extension(e))
            .filter(|e| !e.is_empty())
            .collect();

        if let Some(shared) = stream_extensions.intersection(&data_extensions).next() {
            return Err(RpfSortError::Config {
                message: format!("Extension '{}' is listed as both stream and data", shared),
            });
        }

        let container_extension = normalize_extension(&config.container_extension);
        if container_extension.is_empty() {
            return Err(RpfSortError::Config {
                message: "Container extension must not be empty".to_string(),
            });
        }

        Ok(Self {
            stream_extensions,
            data_extensions,
            important_folders: lowercase_names(&config.important_folders),
            ignored_folders: lowercase_names(&config.ignored_folders),
            container_extension,
        })
    }

    /// Classify `file_name` found in `containing_folder`, a path relative to
    /// the tree being consolidated.
    pub fn classify(&self, file_name: &Path, containing_folder: &Path) -> Classification {
        if self.is_ignored_folder(containing_folder) {
            return Classification::Skip;
        }

        let extension = file_extension(file_name);

        if extension == self.container_extension {
            return Classification::Skip;
        }

        if self.is_important_folder(containing_folder)
            || self.stream_extensions.contains(&extension)
        {
            return Classification::Stream;
        }

        if self.data_extensions.contains(&extension) {
            return Classification::Data;
        }

        Classification::Skip
    }

    pub fn is_ignored_folder(&self, folder: &Path) -> bool {
        any_segment_matches(folder, &self.ignored_folders)
    }

    pub fn is_important_folder(&self, folder: &Path) -> bool {
        any_segment_matches(folder, &self.important_folders)
    }

    pub fn is_container(&self, path: &Path) -> bool {
        file_extension(path) == self.container_extension
    }

    pub fn container_extension(&self) -> &str {
        &self.container_extension
    }

    pub fn ignored_folders(&self) -> &[String] {
        &self.ignored_folders
    }
}

impl Default for ClassificationRules {
    fn default() -> Self {
        let config = RulesConfig::default();
        Self {
            stream_extensions: config
                .stream_extensions
                .iter()
                .map(|e| normalize_extension(e))
                .collect(),
            data_extensions: config
                .data_extensions
                .iter()
                .map(|e| normalize_extension(e))
                .collect(),
            important_folders: lowercase_names(&config.important_folders),
            ignored_folders: lowercase_names(&config.ignored_folders),
            container_extension: normalize_extension(&config.container_extension),
        }
    }
}

fn lowercase_names(names: &[String]) -> Vec<String> {
    names
        .iter()
        .map(|n| n.trim().to_lowercase())
        .filter(|n| !n.is_empty())
        .collect()
}

fn file_extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default()
}

fn any_segment_matches(path: &Path, names: &[String]) -> bool {
    if names.is_empty() {
        return false;
    }

    path.components().any(|component| match component {
        Component::Normal(segment) => {
            let segment = segment.to_string_lossy().to_lowercase();
            names.iter().any(|name| segment.contains(name.as_str()))
        }
        _ => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_config() -> RulesConfig {
        RulesConfig {
            stream_extensions: vec!["ydr".to_string(), "yft".to_string(), "YTD".to_string()],
            data_extensions: vec!["meta".to_string(), ".xml".to_string()],
            important_folders: vec!["vehicles".to_string()],
            ignored_folders: vec!["audio".to_string(), "common.rpf".to_string()],
            container_extension: "rpf".to_string(),
            max_depth: 4,
        }
    }

    fn classify(rules: &ClassificationRules, file: &str, folder: &str) -> Classification {
        rules.classify(Path::new(file), Path::new(folder))
    }

    #[test]
    fn test_extension_classification() {
        let rules = ClassificationRules::new(&create_test_config()).unwrap();

        assert_eq!(classify(&rules, "car.ydr", "models"), Classification::Stream);
        assert_eq!(classify(&rules, "car.YFT", ""), Classification::Stream);
        assert_eq!(classify(&rules, "tex.ytd", "x"), Classification::Stream);
        assert_eq!(classify(&rules, "handling.meta", ""), Classification::Data);
        assert_eq!(classify(&rules, "list.XML", "data"), Classification::Data);
        assert_eq!(classify(&rules, "readme.txt", ""), Classification::Skip);
        assert_eq!(classify(&rules, "Makefile", ""), Classification::Skip);
    }

    #[test]
    fn test_ignored_folder_wins_over_everything() {
        let rules = ClassificationRules::new(&create_test_config()).unwrap();

        assert_eq!(
            classify(&rules, "siren.ydr", "sfx/AUDIO/cars"),
            Classification::Skip
        );
        assert_eq!(
            classify(&rules, "handling.meta", "vehicles/audio"),
            Classification::Skip
        );
        // Substring match inside a segment
        assert_eq!(
            classify(&rules, "car.yft", "x/my_audio_pack"),
            Classification::Skip
        );
        assert_eq!(
            classify(&rules, "car.yft", "common.rpf/data"),
            Classification::Skip
        );
    }

    #[test]
    fn test_important_folder_forces_stream() {
        let rules = ClassificationRules::new(&create_test_config()).unwrap();

        assert_eq!(
            classify(&rules, "handling.meta", "content/Vehicles/sport"),
            Classification::Stream
        );
        assert_eq!(
            classify(&rules, "notes.txt", "vehicles"),
            Classification::Stream
        );
    }

    #[test]
    fn test_containers_are_skipped() {
        let rules = ClassificationRules::new(&create_test_config()).unwrap();

        assert_eq!(classify(&rules, "inner.rpf", ""), Classification::Skip);
        assert_eq!(
            classify(&rules, "inner.RPF", "vehicles"),
            Classification::Skip
        );
        assert!(rules.is_container(Path::new("a/b/inner.Rpf")));
        assert!(!rules.is_container(Path::new("a/b/inner.ydr")));
    }

    #[test]
    fn test_folder_match_uses_segments_not_file_name() {
        let rules = ClassificationRules::new(&create_test_config()).unwrap();

        // The file name itself is not part of the containing folder
        assert_eq!(classify(&rules, "audio.ydr", "models"), Classification::Stream);
        assert!(!rules.is_ignored_folder(Path::new("")));
    }

    #[test]
    fn test_classification_is_repeatable() {
        let rules = ClassificationRules::new(&create_test_config()).unwrap();

        let cases = [
            ("a.ydr", "x"),
            ("b.meta", "vehicles"),
            ("c.rpf", ""),
            ("d.txt", "audio"),
        ];
        for (file, folder) in cases {
            let first = classify(&rules, file, folder);
            for _ in 0..5 {
                assert_eq!(classify(&rules, file, folder), first);
            }
        }
    }

    #[test]
    fn test_overlapping_tables_rejected() {
        let mut config = create_test_config();
        config.data_extensions.push("ydr".to_string());

        assert!(ClassificationRules::new(&config).is_err());
    }

    #[test]
    fn test_default_rules_match_default_config() {
        let rules = ClassificationRules::default();

        assert_eq!(rules.container_extension(), "rpf");
        assert_eq!(classify(&rules, "a.ymap", ""), Classification::Stream);
        assert_eq!(classify(&rules, "b.dat", ""), Classification::Data);
        assert_eq!(
            classify(&rules, "c.ydr", "update/x64"),
            Classification::Skip
        );
        assert!(rules.ignored_folders().contains(&"platform".to_string()));
    }
}
