//! core::config
//!
//! Configuration schema and loading.
//!
//! # Overview
//!
//! Two configuration scopes share one schema ([`FileConfig`]):
//! - **Global**: user-level settings
//! - **Repo**: `<repo>/config.toml`
//!
//! # Precedence
//!
//! Configuration values are resolved in this order (later overrides earlier):
//! 1. Default values
//! 2. Global config file
//! 3. Repo config file
//! 4. Explicit option structs built by the caller (not handled here)
//!
//! # Global Config Locations
//!
//! Searched in order:
//! 1. `$GROVE_CONFIG` if set
//! 2. `$XDG_CONFIG_HOME/grove/config.toml`
//! 3. `~/.grove/config.toml`
//!
//! # Example
//!
//! ```no_run
//! use grove::core::config::Config;
//! use std::path::Path;
//!
//! let result = Config::load(Some(Path::new("/work/.grove/config.toml"))).unwrap();
//! let config = result.config;
//! println!("abbrev: {}", config.abbrev());
//! println!("context lines: {}", config.diff_context_lines());
//! ```

pub mod schema;

pub use schema::{CoreSection, DiffSection, FileConfig, MergeSection, UserSection};

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::core::types::HashAlgorithm;
use crate::diff::DiffAlgorithm;
use crate::merge::{ConflictStyle, MergeFavor};

/// Errors from configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}': {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("failed to write config file '{path}': {source}")]
    WriteError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config value: {0}")]
    InvalidValue(String),
}

/// Warnings generated during config loading.
#[derive(Debug, Clone)]
pub struct ConfigWarning {
    /// The warning message.
    pub message: String,
    /// The path that triggered the warning.
    pub path: PathBuf,
}

/// Result of loading configuration.
#[derive(Debug)]
pub struct ConfigLoadResult {
    /// The loaded configuration.
    pub config: Config,
    /// Any warnings generated during loading.
    pub warnings: Vec<ConfigWarning>,
}

/// Merged configuration from all sources.
///
/// Accessor methods apply precedence rules automatically: the repository
/// file overrides the global file, which overrides built-in defaults.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub global: FileConfig,
    pub repo: Option<FileConfig>,
    global_path: Option<PathBuf>,
    repo_path: Option<PathBuf>,
}

/// Pick the first value set in the repo file, then the global file.
macro_rules! layered {
    ($self:ident, $section:ident, $field:ident) => {
        $self
            .repo
            .as_ref()
            .and_then(|r| r.$section.as_ref())
            .and_then(|s| s.$field.clone())
            .or_else(|| {
                $self
                    .global
                    .$section
                    .as_ref()
                    .and_then(|s| s.$field.clone())
            })
    };
}

impl Config {
    pub const DEFAULT_ABBREV: usize = 7;
    pub const DEFAULT_COMPRESSION: u32 = 6;
    pub const DEFAULT_CACHE_OBJECTS: usize = 1024;
    pub const DEFAULT_SYMREF_DEPTH: usize = 5;
    pub const DEFAULT_CONTEXT_LINES: u32 = 3;
    pub const DEFAULT_RENAME_THRESHOLD: u8 = 50;
    pub const DEFAULT_RENAME_LIMIT: usize = 1000;
    pub const DEFAULT_NOTES_REF: &'static str = "refs/notes/commits";

    /// Load configuration from the default global locations plus an
    /// optional repository config file.
    ///
    /// # Errors
    ///
    /// Returns an error if config files exist but cannot be parsed.
    /// Missing config files are not an error (defaults are used).
    pub fn load(repo_config: Option<&Path>) -> Result<ConfigLoadResult, ConfigError> {
        let global_path = Self::find_global();
        Self::load_from(global_path.as_deref(), repo_config)
    }

    /// Load configuration from explicit file locations.
    pub fn load_from(
        global_path: Option<&Path>,
        repo_path: Option<&Path>,
    ) -> Result<ConfigLoadResult, ConfigError> {
        let mut warnings = Vec::new();

        let (global, global_loaded) = match global_path {
            Some(path) if path.exists() => (Self::read_file(path)?, Some(path.to_path_buf())),
            _ => (FileConfig::default(), None),
        };
        let (repo, repo_loaded) = match repo_path {
            Some(path) if path.exists() => (Some(Self::read_file(path)?), Some(path.to_path_buf())),
            _ => (None, None),
        };

        global.validate()?;
        if let Some(ref r) = repo {
            r.validate()?;

            let global_hash = global.core.as_ref().and_then(|c| c.hash);
            let repo_hash = r.core.as_ref().and_then(|c| c.hash);
            if let (Some(g), Some(rh), Some(path)) = (global_hash, repo_hash, &repo_loaded) {
                if g != rh {
                    warnings.push(ConfigWarning {
                        message: format!(
                            "global core.hash = {g} ignored; repository uses {rh}"
                        ),
                        path: path.clone(),
                    });
                }
            }
        }

        Ok(ConfigLoadResult {
            config: Config {
                global,
                repo,
                global_path: global_loaded,
                repo_path: repo_loaded,
            },
            warnings,
        })
    }

    fn find_global() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("GROVE_CONFIG") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        if let Ok(xdg_home) = std::env::var("XDG_CONFIG_HOME") {
            let path = PathBuf::from(xdg_home).join("grove/config.toml");
            if path.exists() {
                return Some(path);
            }
        }

        dirs::home_dir()
            .map(|home| home.join(".grove/config.toml"))
            .filter(|path| path.exists())
    }

    fn read_file(path: &Path) -> Result<FileConfig, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&contents).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Write a config file atomically.
    ///
    /// Creates parent directories if needed, writes to a temp file in the
    /// same directory and renames it into place.
    pub fn write_file(path: &Path, config: &FileConfig) -> Result<(), ConfigError> {
        config.validate()?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::WriteError {
                path: path.to_path_buf(),
                source: e,
            })?;
        }

        let contents =
            toml::to_string_pretty(config).map_err(|e| ConfigError::InvalidValue(e.to_string()))?;

        let temp_path = path.with_extension("toml.tmp");
        let mut file = fs::File::create(&temp_path).map_err(|e| ConfigError::WriteError {
            path: temp_path.clone(),
            source: e,
        })?;
        file.write_all(contents.as_bytes())
            .and_then(|_| file.sync_all())
            .map_err(|e| ConfigError::WriteError {
                path: temp_path.clone(),
                source: e,
            })?;

        fs::rename(&temp_path, path).map_err(|e| ConfigError::WriteError {
            path: path.to_path_buf(),
            source: e,
        })?;

        Ok(())
    }

    /// Configuration with one repository layer and no global file.
    pub fn with_repo(repo: FileConfig) -> Self {
        Self {
            repo: Some(repo),
            ..Default::default()
        }
    }

    // =========================================================================
    // Accessor methods with precedence
    // =========================================================================

    /// Hash algorithm for new repositories (defaults to SHA-1).
    pub fn hash_algorithm(&self) -> HashAlgorithm {
        layered!(self, core, hash).unwrap_or_default()
    }

    pub fn abbrev(&self) -> usize {
        layered!(self, core, abbrev).unwrap_or(Self::DEFAULT_ABBREV)
    }

    pub fn compression(&self) -> u32 {
        layered!(self, core, compression).unwrap_or(Self::DEFAULT_COMPRESSION)
    }

    pub fn cache_objects(&self) -> usize {
        layered!(self, core, cache_objects).unwrap_or(Self::DEFAULT_CACHE_OBJECTS)
    }

    pub fn symref_depth(&self) -> usize {
        layered!(self, core, symref_depth).unwrap_or(Self::DEFAULT_SYMREF_DEPTH)
    }

    pub fn notes_ref(&self) -> String {
        layered!(self, core, notes_ref).unwrap_or_else(|| Self::DEFAULT_NOTES_REF.to_string())
    }

    pub fn diff_context_lines(&self) -> u32 {
        layered!(self, diff, context_lines).unwrap_or(Self::DEFAULT_CONTEXT_LINES)
    }

    pub fn diff_renames(&self) -> bool {
        layered!(self, diff, renames).unwrap_or(true)
    }

    pub fn rename_threshold(&self) -> u8 {
        layered!(self, diff, rename_threshold).unwrap_or(Self::DEFAULT_RENAME_THRESHOLD)
    }

    pub fn rename_limit(&self) -> usize {
        layered!(self, diff, rename_limit).unwrap_or(Self::DEFAULT_RENAME_LIMIT)
    }

    pub fn diff_algorithm(&self) -> DiffAlgorithm {
        layered!(self, diff, algorithm).unwrap_or_default()
    }

    pub fn merge_favor(&self) -> MergeFavor {
        layered!(self, merge, favor).unwrap_or_default()
    }

    pub fn conflict_style(&self) -> ConflictStyle {
        layered!(self, merge, conflict_style).unwrap_or_default()
    }

    pub fn merge_renames(&self) -> bool {
        layered!(self, merge, renames).unwrap_or(true)
    }

    pub fn user_name(&self) -> Option<String> {
        layered!(self, user, name)
    }

    pub fn user_email(&self) -> Option<String> {
        layered!(self, user, email)
    }

    /// Get the path to the loaded global config file.
    pub fn global_config_loaded_from(&self) -> Option<&Path> {
        self.global_path.as_deref()
    }

    /// Get the path to the loaded repo config file.
    pub fn repo_config_loaded_from(&self) -> Option<&Path> {
        self.repo_path.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_without_files() {
        let result = Config::load_from(None, None).unwrap();
        let config = result.config;

        assert_eq!(config.hash_algorithm(), HashAlgorithm::Sha1);
        assert_eq!(config.abbrev(), 7);
        assert_eq!(config.diff_context_lines(), 3);
        assert_eq!(config.rename_threshold(), 50);
        assert!(config.diff_renames());
        assert_eq!(config.merge_favor(), MergeFavor::Normal);
        assert!(config.user_name().is_none());
    }

    #[test]
    fn repo_overrides_global() {
        let temp = TempDir::new().unwrap();
        let global = temp.path().join("global.toml");
        let repo = temp.path().join("repo.toml");
        fs::write(&global, "[core]\nabbrev = 12\n[user]\nname = \"Global\"\n").unwrap();
        fs::write(&repo, "[core]\nabbrev = 9\n").unwrap();

        let config = Config::load_from(Some(&global), Some(&repo)).unwrap().config;
        assert_eq!(config.abbrev(), 9);
        assert_eq!(config.user_name().as_deref(), Some("Global"));
        assert_eq!(config.repo_config_loaded_from(), Some(repo.as_path()));
    }

    #[test]
    fn conflicting_hash_warns() {
        let temp = TempDir::new().unwrap();
        let global = temp.path().join("global.toml");
        let repo = temp.path().join("repo.toml");
        fs::write(&global, "[core]\nhash = \"sha256\"\n").unwrap();
        fs::write(&repo, "[core]\nhash = \"sha1\"\n").unwrap();

        let result = Config::load_from(Some(&global), Some(&repo)).unwrap();
        assert_eq!(result.config.hash_algorithm(), HashAlgorithm::Sha1);
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn invalid_values_rejected() {
        let temp = TempDir::new().unwrap();
        let repo = temp.path().join("repo.toml");
        fs::write(&repo, "[core]\nabbrev = 2\n").unwrap();
        assert!(Config::load_from(None, Some(&repo)).is_err());
    }

    #[test]
    fn write_then_load_round_trip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested/config.toml");
        let file = FileConfig {
            core: Some(CoreSection {
                hash: Some(HashAlgorithm::Sha256),
                ..Default::default()
            }),
            ..Default::default()
        };

        Config::write_file(&path, &file).unwrap();
        let loaded = Config::load_from(None, Some(&path)).unwrap().config;
        assert_eq!(loaded.hash_algorithm(), HashAlgorithm::Sha256);
    }
}
