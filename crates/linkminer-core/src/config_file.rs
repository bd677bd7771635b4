use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// On-disk TOML configuration structure.
/// All fields are optional so partial configs work (merge with defaults).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    pub api: Option<ApiConfig>,
    pub pipeline: Option<PipelineFileConfig>,
    pub search: Option<SearchFileConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiConfig {
    pub host: Option<String>,
    pub username: Option<String>,
    pub api_key: Option<String>,
    pub project_key: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineFileConfig {
    pub num_workers: Option<usize>,
    pub table_name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchFileConfig {
    pub index: Option<String>,
    pub chunk_size: Option<usize>,
    pub download_workers: Option<usize>,
}

/// Platform config directory path: `<config_dir>/linkminer/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("linkminer").join("config.toml"))
}

/// Load config by cascading CWD `.linkminer.toml` over platform config.
/// CWD values override platform values.
pub fn load_config() -> ConfigFile {
    let platform = config_path().and_then(|p| load_from_path(&p));
    let cwd = load_from_path(&PathBuf::from(".linkminer.toml"));

    match (platform, cwd) {
        (None, None) => ConfigFile::default(),
        (Some(p), None) => p,
        (None, Some(c)) => c,
        (Some(p), Some(c)) => merge(p, c),
    }
}

/// Load a config from a specific path. Returns `None` if the file doesn't
/// exist or can't be parsed.
pub fn load_from_path(path: &PathBuf) -> Option<ConfigFile> {
    let content = std::fs::read_to_string(path).ok()?;
    toml::from_str(&content).ok()
}

/// Merge two configs: `overlay` values take precedence over `base`.
pub fn merge(base: ConfigFile, overlay: ConfigFile) -> ConfigFile {
    ConfigFile {
        api: Some(ApiConfig {
            host: overlay
                .api
                .as_ref()
                .and_then(|a| a.host.clone())
                .or_else(|| base.api.as_ref().and_then(|a| a.host.clone())),
            username: overlay
                .api
                .as_ref()
                .and_then(|a| a.username.clone())
                .or_else(|| base.api.as_ref().and_then(|a| a.username.clone())),
            api_key: overlay
                .api
                .as_ref()
                .and_then(|a| a.api_key.clone())
                .or_else(|| base.api.as_ref().and_then(|a| a.api_key.clone())),
            project_key: overlay
                .api
                .as_ref()
                .and_then(|a| a.project_key.clone())
                .or_else(|| base.api.as_ref().and_then(|a| a.project_key.clone())),
        }),
        pipeline: Some(PipelineFileConfig {
            num_workers: overlay
                .pipeline
                .as_ref()
                .and_then(|p| p.num_workers)
                .or_else(|| base.pipeline.as_ref().and_then(|p| p.num_workers)),
            table_name: overlay
                .pipeline
                .as_ref()
                .and_then(|p| p.table_name.clone())
                .or_else(|| base.pipeline.as_ref().and_then(|p| p.table_name.clone())),
        }),
        search: Some(SearchFileConfig {
            index: overlay
                .search
                .as_ref()
                .and_then(|s| s.index.clone())
                .or_else(|| base.search.as_ref().and_then(|s| s.index.clone())),
            chunk_size: overlay
                .search
                .as_ref()
                .and_then(|s| s.chunk_size)
                .or_else(|| base.search.as_ref().and_then(|s| s.chunk_size)),
            download_workers: overlay
                .search
                .as_ref()
                .and_then(|s| s.download_workers)
                .or_else(|| base.search.as_ref().and_then(|s| s.download_workers)),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_partial_config() {
        let config: ConfigFile = toml::from_str(
            r#"
            [pipeline]
            num_workers = 8
            "#,
        )
        .unwrap();
        assert_eq!(config.pipeline.as_ref().unwrap().num_workers, Some(8));
        assert!(config.api.is_none());
    }

    #[test]
    fn overlay_wins_on_conflict() {
        let base: ConfigFile = toml::from_str(
            r#"
            [api]
            host = "https://base.example"
            username = "base-user"

            [pipeline]
            num_workers = 2
            "#,
        )
        .unwrap();
        let overlay: ConfigFile = toml::from_str(
            r#"
            [api]
            host = "https://overlay.example"
            "#,
        )
        .unwrap();

        let merged = merge(base, overlay);
        let api = merged.api.unwrap();
        assert_eq!(api.host.as_deref(), Some("https://overlay.example"));
        // Untouched base values survive.
        assert_eq!(api.username.as_deref(), Some("base-user"));
        assert_eq!(merged.pipeline.unwrap().num_workers, Some(2));
    }

    #[test]
    fn missing_file_loads_as_none() {
        assert!(load_from_path(&PathBuf::from("/definitely/not/here.toml")).is_none());
    }

    #[test]
    fn garbage_file_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "not [valid toml").unwrap();
        assert!(load_from_path(&path).is_none());
    }
}
