//! Configuration types deserialized from `weave.toml`.

use serde::Deserialize;
use std::path::PathBuf;

/// The top-level configuration parsed from `weave.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WeaveConfig {
    /// Code generation settings.
    #[serde(default)]
    pub generation: GenerationConfig,
}

/// Settings for the generation loop and the generated-file cache.
///
/// Relative paths are interpreted against the project directory by
/// [`resolve_generation`](crate::resolve_generation).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Root directory that generated artifacts are written under.
    pub output_dir: PathBuf,
    /// Directory holding the cache file and cached artifact bytes.
    pub cache_dir: PathBuf,
    /// When `false`, the cache is disabled and the output directory is wiped
    /// and fully regenerated on every pass.
    pub track_source_files: bool,
    /// When `true`, an unreadable cache file is reported as an error instead
    /// of being silently replaced with an empty cache.
    pub strict_cache: bool,
    /// Module name exposed to generators through the module view.
    pub module_name: String,
    /// Upper bound on generation rounds per pass. `None` means unbounded.
    pub max_rounds: Option<u32>,
    /// Generator ids that are never run.
    pub disabled: Vec<String>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("build/generated"),
            cache_dir: PathBuf::from("build/weave-cache"),
            track_source_files: true,
            strict_cache: false,
            module_name: "main".to_string(),
            max_rounds: None,
            disabled: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = GenerationConfig::default();
        assert!(config.track_source_files);
        assert!(!config.strict_cache);
        assert_eq!(config.module_name, "main");
        assert!(config.max_rounds.is_none());
        assert!(config.disabled.is_empty());
    }

    #[test]
    fn partial_table_fills_defaults() {
        let config: WeaveConfig = toml::from_str(
            r#"
[generation]
track_source_files = false
"#,
        )
        .unwrap();
        assert!(!config.generation.track_source_files);
        assert_eq!(config.generation.output_dir, PathBuf::from("build/generated"));
    }
}
