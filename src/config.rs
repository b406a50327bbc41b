use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::backend::ExecutionLimits;

/// Environment variable that overrides the configured backend.
pub const BACKEND_ENV: &str = "PHOTOFILTER_BACKEND";

#[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
/// Persisted settings for photofilter.
pub struct AppConfig {
    pub backend: Option<String>,
    pub execution_width: Option<u32>,
    pub view_width: Option<u32>,
    pub view_height: Option<u32>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendChoice {
    /// GPU when an adapter is available, CPU otherwise.
    Auto,
    Gpu,
    Cpu,
}

impl BackendChoice {
    pub fn label(self) -> &'static str {
        match self {
            BackendChoice::Auto => "auto",
            BackendChoice::Gpu => "gpu",
            BackendChoice::Cpu => "cpu",
        }
    }
}

pub fn parse_backend(value: &str) -> BackendChoice {
    match value.trim().to_ascii_lowercase().as_str() {
        "cpu" | "rayon" => BackendChoice::Cpu,
        "gpu" | "wgpu" => BackendChoice::Gpu,
        _ => BackendChoice::Auto,
    }
}

impl AppConfig {
    /// Returns the user config file path, if a config directory is available.
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("photofilter").join("config.toml"))
    }

    /// Loads config from disk, falling back to defaults on any error.
    pub fn load() -> Self {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    pub fn load_from(path: &Path) -> Self {
        let Ok(contents) = std::fs::read_to_string(path) else {
            return Self::default();
        };
        toml::from_str(&contents).unwrap_or_else(|err| {
            tracing::warn!(%err, path = %path.display(), "ignoring malformed config");
            Self::default()
        })
    }

    /// CPU execution limits, honoring a configured `execution_width`.
    pub fn execution_limits(&self) -> ExecutionLimits {
        let mut limits = ExecutionLimits::default();
        if let Some(width) = self.execution_width {
            limits.preferred_width = width.max(1);
        }
        limits
    }

    /// Backend to use: `env_override` (the value of [`BACKEND_ENV`]) wins
    /// over the config file.
    pub fn resolve_backend(&self, env_override: Option<&str>) -> BackendChoice {
        if let Some(raw) = env_override {
            return parse_backend(raw);
        }
        self.backend
            .as_deref()
            .map(parse_backend)
            .unwrap_or(BackendChoice::Auto)
    }
}

#[cfg(test)]
mod tests {
    use super::{AppConfig, BackendChoice, parse_backend};
    use crate::backend::ExecutionLimits;

    #[test]
    fn parse_backend_handles_supported_values() {
        assert_eq!(parse_backend("cpu"), BackendChoice::Cpu);
        assert_eq!(parse_backend(" GPU "), BackendChoice::Gpu);
        assert_eq!(parse_backend("wgpu"), BackendChoice::Gpu);
        assert_eq!(parse_backend("auto"), BackendChoice::Auto);
    }

    #[test]
    fn parse_backend_defaults_to_auto_for_unknown_values() {
        assert_eq!(parse_backend("metal"), BackendChoice::Auto);
        assert_eq!(parse_backend(""), BackendChoice::Auto);
    }

    #[test]
    fn env_override_beats_config_file() {
        let config = AppConfig {
            backend: Some("cpu".into()),
            ..Default::default()
        };
        assert_eq!(config.resolve_backend(None), BackendChoice::Cpu);
        assert_eq!(config.resolve_backend(Some("gpu")), BackendChoice::Gpu);
        assert_eq!(AppConfig::default().resolve_backend(None), BackendChoice::Auto);
    }

    #[test]
    fn partial_config_parses() {
        let config: AppConfig = toml::from_str("execution_width = 32\nview_width = 800")
            .expect("valid toml");
        assert_eq!(config.execution_width, Some(32));
        assert_eq!(config.view_width, Some(800));
        assert_eq!(config.backend, None);
    }

    #[test]
    fn config_round_trips_through_disk() {
        let dir = std::env::temp_dir().join(format!("photofilter-config-{}", std::process::id()));
        let path = dir.join("config.toml");
        let config = AppConfig {
            backend: Some("gpu".into()),
            execution_width: Some(8),
            view_width: Some(640),
            view_height: Some(480),
        };
        std::fs::create_dir_all(&dir).expect("temp dir");
        let text = toml::to_string_pretty(&config).expect("serialize");
        std::fs::write(&path, text).expect("write");
        assert_eq!(AppConfig::load_from(&path), config);

        std::fs::write(&path, "view_width = \"wide\"").expect("write");
        assert_eq!(AppConfig::load_from(&path), AppConfig::default());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn execution_limits_follow_configured_width() {
        assert_eq!(AppConfig::default().execution_limits(), ExecutionLimits::default());
        let config = AppConfig {
            execution_width: Some(8),
            ..Default::default()
        };
        assert_eq!(config.execution_limits().workgroup_size(), (8, 32));
        let zero = AppConfig {
            execution_width: Some(0),
            ..Default::default()
        };
        assert_eq!(zero.execution_limits().preferred_width, 1);
    }

    #[test]
    fn backend_labels_parse_back() {
        for choice in [BackendChoice::Auto, BackendChoice::Gpu, BackendChoice::Cpu] {
            assert_eq!(parse_backend(choice.label()), choice);
        }
    }

    #[test]
    fn missing_file_gives_defaults() {
        let path = std::env::temp_dir().join("photofilter-no-such-dir/config.toml");
        assert_eq!(AppConfig::load_from(&path), AppConfig::default());
    }
}
