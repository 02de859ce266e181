use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_SOURCE_DIR: &str = "htdocs";
pub const DEFAULT_LEGACY_DOMAIN: &str = "http://www.example.co.jp/";
pub const DEFAULT_AUTHOR: &str = "migration";

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct SiteConfig {
    #[serde(default)]
    pub site: SiteSection,
    #[serde(default)]
    pub migration: MigrationSection,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct SiteSection {
    pub source_dir: Option<String>,
    pub legacy_domain: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct MigrationSection {
    pub author: Option<String>,
}

impl SiteConfig {
    /// Resolve the source tree directory: env SITEMIGRATE_SOURCE_DIR > config > DEFAULT_SOURCE_DIR.
    pub fn source_dir(&self) -> String {
        self.source_dir_with_lookup(|key| env::var(key).ok())
    }

    fn source_dir_with_lookup<F>(&self, lookup_env: F) -> String
    where
        F: Fn(&str) -> Option<String>,
    {
        resolve_setting(
            lookup_env("SITEMIGRATE_SOURCE_DIR"),
            self.site.source_dir.as_deref(),
            DEFAULT_SOURCE_DIR,
        )
    }

    /// Resolve the legacy origin: env SITEMIGRATE_LEGACY_DOMAIN > config > DEFAULT_LEGACY_DOMAIN.
    pub fn legacy_domain(&self) -> String {
        self.legacy_domain_with_lookup(|key| env::var(key).ok())
    }

    fn legacy_domain_with_lookup<F>(&self, lookup_env: F) -> String
    where
        F: Fn(&str) -> Option<String>,
    {
        resolve_setting(
            lookup_env("SITEMIGRATE_LEGACY_DOMAIN"),
            self.site.legacy_domain.as_deref(),
            DEFAULT_LEGACY_DOMAIN,
        )
    }

    /// Resolve the author handle stamped on records: env SITEMIGRATE_AUTHOR > config > DEFAULT_AUTHOR.
    pub fn author(&self) -> String {
        self.author_with_lookup(|key| env::var(key).ok())
    }

    fn author_with_lookup<F>(&self, lookup_env: F) -> String
    where
        F: Fn(&str) -> Option<String>,
    {
        resolve_setting(
            lookup_env("SITEMIGRATE_AUTHOR"),
            self.migration.author.as_deref(),
            DEFAULT_AUTHOR,
        )
    }

    /// Absolute path of the source tree; a relative `source_dir` is anchored
    /// at the project root.
    pub fn source_root(&self, project_root: &Path) -> PathBuf {
        let dir = self.source_dir();
        let path = Path::new(&dir);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            project_root.join(path)
        }
    }

    /// Join the legacy domain and a relative path into the original URI
    /// recorded on every emitted record.
    pub fn legacy_uri(&self, relative_path: &str) -> String {
        format!(
            "{}/{}",
            self.legacy_domain().trim_end_matches('/'),
            relative_path.trim_start_matches('/')
        )
    }
}

/// One setting's precedence chain: a non-blank environment value wins, then
/// the config file value, then the built-in default.
fn resolve_setting(env_value: Option<String>, file_value: Option<&str>, default: &str) -> String {
    if let Some(value) = env_value {
        let trimmed = value.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }
    file_value.unwrap_or(default).to_string()
}

/// Load and parse a SiteConfig from a TOML file. Returns default if the file doesn't exist.
pub fn load_config(config_path: &Path) -> Result<SiteConfig> {
    if !config_path.exists() {
        return Ok(SiteConfig::default());
    }
    let content = fs::read_to_string(config_path)
        .with_context(|| format!("failed to read {}", config_path.display()))?;
    let parsed: SiteConfig = toml::from_str(&content)
        .with_context(|| format!("failed to parse {}", config_path.display()))?;
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use tempfile::tempdir;

    #[test]
    fn default_config_uses_builtin_values() {
        let config = SiteConfig::default();
        assert_eq!(config.source_dir(), "htdocs");
        assert_eq!(config.legacy_domain(), "http://www.example.co.jp/");
        assert_eq!(config.author(), "migration");
    }

    #[test]
    fn accessors_prefer_env_over_file_over_default() {
        let mut config = SiteConfig::default();
        config.site.source_dir = Some("www".to_string());
        config.site.legacy_domain = Some("http://www.example.ne.jp/".to_string());

        let env = HashMap::from([
            ("SITEMIGRATE_SOURCE_DIR".to_string(), "srv/htdocs".to_string()),
            ("SITEMIGRATE_AUTHOR".to_string(), "editor".to_string()),
        ]);

        assert_eq!(
            config.source_dir_with_lookup(|key| env.get(key).cloned()),
            "srv/htdocs"
        );
        assert_eq!(
            config.legacy_domain_with_lookup(|key| env.get(key).cloned()),
            "http://www.example.ne.jp/"
        );
        assert_eq!(
            config.author_with_lookup(|key| env.get(key).cloned()),
            "editor"
        );
    }

    #[test]
    fn blank_env_override_falls_through_to_file_value() {
        let mut config = SiteConfig::default();
        config.site.source_dir = Some("www".to_string());

        let env = HashMap::from([("SITEMIGRATE_SOURCE_DIR".to_string(), "  ".to_string())]);
        assert_eq!(
            config.source_dir_with_lookup(|key| env.get(key).cloned()),
            "www"
        );
        assert_eq!(config.author_with_lookup(|key| env.get(key).cloned()), "migration");
    }

    #[test]
    fn load_config_returns_default_for_missing_file() {
        let config = load_config(Path::new("/nonexistent/config.toml")).expect("load config");
        assert!(config.site.source_dir.is_none());
        assert!(config.site.legacy_domain.is_none());
    }

    #[test]
    fn load_config_parses_site_section() {
        let temp = tempdir().expect("tempdir");
        let config_path = temp.path().join("config.toml");
        fs::write(
            &config_path,
            r#"
[site]
source_dir = "legacy/htdocs"
legacy_domain = "http://www.example.ne.jp"

[migration]
author = "importer"
"#,
        )
        .expect("write config");

        let config = load_config(&config_path).expect("load config");
        assert_eq!(config.source_dir(), "legacy/htdocs");
        assert_eq!(config.legacy_domain(), "http://www.example.ne.jp");
        assert_eq!(config.author(), "importer");
    }

    #[test]
    fn load_config_tolerates_partial_toml() {
        let temp = tempdir().expect("tempdir");
        let config_path = temp.path().join("config.toml");
        fs::write(&config_path, "[site]\nsource_dir = \"www\"\n").expect("write config");

        let config = load_config(&config_path).expect("load config");
        assert_eq!(config.source_dir(), "www");
        assert!(config.site.legacy_domain.is_none());
        assert_eq!(config.author(), "migration");
    }

    #[test]
    fn load_config_returns_error_for_invalid_toml() {
        let temp = tempdir().expect("tempdir");
        let config_path = temp.path().join("config.toml");
        fs::write(&config_path, "[site\nsource_dir = \"oops\"").expect("write config");
        let error = load_config(&config_path).expect_err("must fail");
        assert!(error.to_string().contains("failed to parse"));
    }

    #[test]
    fn legacy_uri_joins_with_single_slash() {
        let mut config = SiteConfig::default();
        config.site.legacy_domain = Some("http://www.example.co.jp/".to_string());
        assert_eq!(
            config.legacy_uri("info/uk/pm7205.html"),
            "http://www.example.co.jp/info/uk/pm7205.html"
        );

        config.site.legacy_domain = Some("http://www.example.co.jp".to_string());
        assert_eq!(
            config.legacy_uri("/info/uk/pm7205.html"),
            "http://www.example.co.jp/info/uk/pm7205.html"
        );
    }

    #[test]
    fn source_root_anchors_relative_dirs_at_project_root() {
        let mut config = SiteConfig::default();
        config.site.source_dir = Some("www".to_string());
        assert_eq!(
            config.source_root(Path::new("/repo")),
            PathBuf::from("/repo/www")
        );

        config.site.source_dir = Some("/srv/htdocs".to_string());
        assert_eq!(
            config.source_root(Path::new("/repo")),
            PathBuf::from("/srv/htdocs")
        );
    }
}
