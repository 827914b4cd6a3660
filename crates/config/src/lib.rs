//! Layered configuration for quire.
//!
//! Sources, lowest precedence first:
//! 1. Built-in defaults.
//! 2. A configuration file (TOML, YAML or JSON, chosen by extension). When
//!    no path is given, `config.toml` in the platform config directory is
//!    used if it exists.
//! 3. `QUIRE_` environment variables, with `__` separating nested keys
//!    (`QUIRE_SITE__BASE_URL`).

pub mod error;

use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const ENV_PREFIX: &str = "QUIRE_";
const DEFAULT_DATABASE_FILE: &str = "content.db";
const DEFAULT_CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub site: SiteConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    /// Pool size; `None` leaves it to the database layer.
    pub max_connections: Option<u32>,
}
impl Default for DatabaseConfig {
    fn default() -> Self {
        let path = project_dirs()
            .map(|dirs| dirs.data_dir().join(DEFAULT_DATABASE_FILE))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE_FILE));
        Self { path, max_connections: None }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    /// Prefix for every content URL.
    pub base_url: String,
}
impl Default for SiteConfig {
    fn default() -> Self {
        Self { base_url: "/".to_string() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Default filter directive, used when `RUST_LOG` is unset.
    pub level: String,
}
impl Default for LogConfig {
    fn default() -> Self {
        Self { level: "info".to_string() }
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", "quire")
}

/// Where the configuration file is looked for when none is given.
pub fn default_config_path() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().join(DEFAULT_CONFIG_FILE))
}

impl Config {
    /// Load configuration from defaults, an optional file and the
    /// environment, then validate it.
    ///
    /// An explicitly given file must exist; the default one is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(path) => {
                if !path.is_file() {
                    exn::bail!(ErrorKind::Load);
                }
                Some(path.to_path_buf())
            },
            None => default_config_path().filter(|p| p.is_file()),
        };
        let config: Self = Self::figment(file.as_deref())?
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .or_raise(|| ErrorKind::Load)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults merged with `file`, without the environment layer.
    fn figment(file: Option<&Path>) -> Result<Figment> {
        let figment = Figment::from(Serialized::defaults(Self::default()));
        let Some(file) = file else {
            return Ok(figment);
        };
        let extension = file.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase);
        Ok(match extension.as_deref() {
            Some("toml") => figment.merge(Toml::file_exact(file)),
            Some("yaml" | "yml") => figment.merge(Yaml::file_exact(file)),
            Some("json") => figment.merge(Json::file_exact(file)),
            _ => exn::bail!(ErrorKind::Invalid("config file extension")),
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.site.base_url.trim().is_empty() {
            exn::bail!(ErrorKind::Invalid("site.base_url"));
        }
        if self.database.max_connections == Some(0) {
            exn::bail!(ErrorKind::Invalid("database.max_connections"));
        }
        if self.database.path.as_os_str().is_empty() {
            exn::bail!(ErrorKind::Invalid("database.path"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::io::Write;

    fn write_config(extension: &str, contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(&format!(".{extension}")).tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    fn extract(file: &Path) -> Result<Config> {
        Config::figment(Some(file))?.extract().or_raise(|| ErrorKind::Load)
    }

    #[test]
    fn test_defaults() {
        let config: Config = Config::figment(None).unwrap().extract().unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.site.base_url, "/");
        assert_eq!(config.log.level, "info");
        assert!(config.database.path.ends_with(DEFAULT_DATABASE_FILE));
        config.validate().unwrap();
    }

    #[rstest]
    #[case("toml", "[site]\nbase_url = \"https://example.com\"\n[database]\nmax_connections = 3\n")]
    #[case("yaml", "site:\n  base_url: https://example.com\ndatabase:\n  max_connections: 3\n")]
    #[case("json", r#"{"site": {"base_url": "https://example.com"}, "database": {"max_connections": 3}}"#)]
    fn test_file_overrides_defaults(#[case] extension: &str, #[case] contents: &str) {
        let file = write_config(extension, contents);
        let config = extract(file.path()).unwrap();
        assert_eq!(config.site.base_url, "https://example.com");
        assert_eq!(config.database.max_connections, Some(3));
        // Untouched keys keep their defaults.
        assert_eq!(config.log, LogConfig::default());
        assert_eq!(config.database.path, DatabaseConfig::default().path);
    }

    #[test]
    fn test_unknown_extension() {
        let file = write_config("ini", "base_url = /");
        let err = Config::figment(Some(file.path())).unwrap_err();
        assert_eq!(*err, ErrorKind::Invalid("config file extension"));
    }

    #[test]
    fn test_malformed_file() {
        let file = write_config("toml", "[site]\nbase_url = [1, 2]\n");
        assert_eq!(*extract(file.path()).unwrap_err(), ErrorKind::Load);
    }

    #[test]
    fn test_missing_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load(Some(&dir.path().join("missing.toml"))).unwrap_err();
        assert_eq!(*err, ErrorKind::Load);
    }

    #[rstest]
    #[case("[site]\nbase_url = \"  \"\n", "site.base_url")]
    #[case("[database]\nmax_connections = 0\n", "database.max_connections")]
    #[case("[database]\npath = \"\"\n", "database.path")]
    fn test_validation(#[case] contents: &str, #[case] key: &'static str) {
        let file = write_config("toml", contents);
        let err = extract(file.path()).unwrap().validate().unwrap_err();
        assert_eq!(*err, ErrorKind::Invalid(key));
    }
}
