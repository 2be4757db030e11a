//! Configuration file and presets support.

use furrow_core::{Settings, TypeGroup};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;

/// Main configuration structure.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Default CLI options.
    pub defaults: Defaults,
    /// Tables and services behind the external types.
    pub lookups: Lookups,
    /// Named pipeline settings, selected with `--preset`.
    pub presets: HashMap<String, Settings>,
}

/// Default CLI options.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Defaults {
    /// Enable verbose output by default.
    pub verbose: bool,
    /// Enable quiet output by default.
    pub quiet: bool,
    /// Log filter used when `RUST_LOG` is unset.
    pub log_level: Option<String>,
    /// Worker threads when neither flags nor settings choose.
    pub threads: Option<usize>,
    pub max_open_handles: Option<usize>,
    /// Type groups switched off, e.g. `["external"]`.
    pub disabled_groups: Vec<TypeGroup>,
}

/// Sources for external lookups.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Lookups {
    /// CSV table `ip,country`.
    pub country: Option<PathBuf>,
    /// CSV table `ip,asn`.
    pub asn: Option<PathBuf>,
    /// Resolve hostnames with the system resolver.
    pub dns: bool,
    /// Seconds a single name may take to resolve.
    pub dns_timeout: Option<u64>,
}

impl Config {
    /// Load config from the default location (~/.config/furrow/config.toml).
    pub fn load() -> Self {
        Self::load_from_path(Self::default_path())
    }

    /// Load config from a specific path.
    ///
    /// A missing file gives the defaults; an unreadable one warns first.
    pub fn load_from_path(path: Option<PathBuf>) -> Self {
        let Some(path) = path.filter(|p| p.exists()) else {
            return Self::default();
        };

        std::fs::read_to_string(&path)
            .map_err(|e| format!("Failed to read config file {}: {e}", path.display()))
            .and_then(|contents| {
                toml::from_str(&contents)
                    .map_err(|e| format!("Failed to parse config file {}: {e}", path.display()))
            })
            .unwrap_or_else(|msg| {
                eprintln!("Warning: {msg}");
                Self::default()
            })
    }

    /// Get the default config file path.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("furrow").join("config.toml"))
    }

    /// Get a preset by name.
    pub fn get_preset(&self, name: &str) -> Option<Settings> {
        self.presets.get(name).cloned()
    }

    /// Preset names, sorted.
    pub fn preset_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.presets.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use furrow_core::ColumnRef;

    #[test]
    fn test_parse_config() {
        let config: Config = toml::from_str(
            r#"
            [defaults]
            threads = 4
            disabled_groups = ["external"]

            [lookups]
            country = "/data/countries.csv"
            dns_timeout = 2

            [presets.flows]
            split = "country"
            unique = ["ip"]

            [[presets.flows.fields]]
            target = "country"
            "#,
        )
        .unwrap();

        assert_eq!(config.defaults.threads, Some(4));
        assert_eq!(config.defaults.disabled_groups, vec![TypeGroup::External]);
        assert!(!config.lookups.dns);
        assert_eq!(config.lookups.dns_timeout, Some(2));

        let preset = config.get_preset("flows").unwrap();
        assert_eq!(preset.split, Some(ColumnRef::Name("country".into())));
        assert_eq!(preset.fields[0].target, "country");
        assert_eq!(config.preset_names(), vec!["flows"]);
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from_path(Some(dir.path().join("absent.toml")));
        assert!(config.presets.is_empty());
        assert!(config.defaults.threads.is_none());
    }

    #[test]
    fn test_invalid_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "defaults = 3").unwrap();
        let config = Config::load_from_path(Some(path));
        assert!(!config.defaults.verbose);
    }
}
