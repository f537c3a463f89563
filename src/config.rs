//! Host configuration file parsing.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{HostError, Result};
use crate::import::filesystem::DEFAULT_SCRIPT_EXTENSION;

/// Engine limits.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Maximum guest call depth.
    pub max_call_levels: usize,
    /// Maximum operations per run, 0 for unlimited.
    pub max_operations: u64,
    /// Maximum expression nesting depth.
    pub max_expr_depth: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            max_call_levels: 64,
            max_operations: 0,
            max_expr_depth: 64,
        }
    }
}

/// Native import settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    /// Directories searched by the native import mechanism.
    pub search_paths: Vec<String>,
    /// Module names always delegated to native import.
    pub builtin_modules: Vec<String>,
    /// Extension of script files on disk.
    pub script_extension: String,
}

impl Default for ImportConfig {
    fn default() -> Self {
        ImportConfig {
            search_paths: Vec::new(),
            builtin_modules: Vec::new(),
            script_extension: DEFAULT_SCRIPT_EXTENSION.to_string(),
        }
    }
}

/// A filesystem resolver registered at startup.
#[derive(Debug, Clone, Deserialize)]
pub struct ResolverConfig {
    pub root: PathBuf,
    /// Overrides `imports.script_extension` for this resolver.
    #[serde(default)]
    pub extension: Option<String>,
}

/// Complete host configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    pub runtime: RuntimeConfig,
    pub imports: ImportConfig,
    pub resolvers: Vec<ResolverConfig>,
}

impl HostConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a TOML file.
    ///
    /// Expected format:
    /// ```toml
    /// [runtime]
    /// max_call_levels = 64
    ///
    /// [imports]
    /// search_paths = ["./lib"]
    /// builtin_modules = ["sys"]
    ///
    /// [[resolvers]]
    /// root = "./scripts"
    /// ```
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|source| HostError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        toml::from_str(&content).map_err(|source| HostError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|source| HostError::ConfigParse {
            path: PathBuf::from("<string>"),
            source,
        })
    }
}
