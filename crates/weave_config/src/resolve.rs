//! Resolution of generation settings against a project directory.

use crate::types::GenerationConfig;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Generation settings with every path made absolute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedGeneration {
    /// Absolute generation root.
    pub output_dir: PathBuf,
    /// Absolute cache directory.
    pub cache_dir: PathBuf,
    /// Whether incremental tracking is enabled.
    pub track_source_files: bool,
    /// Whether a corrupt cache file is a hard error.
    pub strict_cache: bool,
    /// Module name exposed to generators.
    pub module_name: String,
    /// Optional round ceiling.
    pub max_rounds: Option<u32>,
    /// Generator ids that are never run.
    pub disabled: BTreeSet<String>,
}

/// Resolves relative paths in `config` against `project_dir`.
///
/// Absolute paths are kept as-is.
pub fn resolve_generation(config: &GenerationConfig, project_dir: &Path) -> ResolvedGeneration {
    ResolvedGeneration {
        output_dir: absolutize(project_dir, &config.output_dir),
        cache_dir: absolutize(project_dir, &config.cache_dir),
        track_source_files: config.track_source_files,
        strict_cache: config.strict_cache,
        module_name: config.module_name.clone(),
        max_rounds: config.max_rounds,
        disabled: config.disabled.iter().cloned().collect(),
    }
}

fn absolutize(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::load_config_from_str;

    #[test]
    fn relative_paths_joined_to_project_dir() {
        let config = GenerationConfig::default();
        let resolved = resolve_generation(&config, Path::new("/work/app"));
        assert_eq!(
            resolved.output_dir,
            PathBuf::from("/work/app/build/generated")
        );
        assert_eq!(resolved.cache_dir, PathBuf::from("/work/app/build/weave-cache"));
    }

    #[test]
    fn absolute_paths_kept() {
        let config = load_config_from_str(
            r#"
[generation]
output_dir = "/tmp/gen"
cache_dir = "/tmp/cache"
"#,
        )
        .unwrap()
        .generation;
        let resolved = resolve_generation(&config, Path::new("/work/app"));
        assert_eq!(resolved.output_dir, PathBuf::from("/tmp/gen"));
        assert_eq!(resolved.cache_dir, PathBuf::from("/tmp/cache"));
    }

    #[test]
    fn disabled_ids_deduplicated() {
        let config = GenerationConfig {
            disabled: vec!["a".to_string(), "a".to_string(), "b".to_string()],
            ..GenerationConfig::default()
        };
        let resolved = resolve_generation(&config, Path::new("/p"));
        assert_eq!(resolved.disabled.len(), 2);
        assert!(resolved.disabled.contains("a"));
    }

    #[test]
    fn flags_carried_through() {
        let config = GenerationConfig {
            track_source_files: false,
            strict_cache: true,
            max_rounds: Some(3),
            module_name: "lib".to_string(),
            ..GenerationConfig::default()
        };
        let resolved = resolve_generation(&config, Path::new("/p"));
        assert!(!resolved.track_source_files);
        assert!(resolved.strict_cache);
        assert_eq!(resolved.max_rounds, Some(3));
        assert_eq!(resolved.module_name, "lib");
    }
}
