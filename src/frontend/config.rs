use crate::access::scope::ScopePolicy;
use crate::errors::{ProxyError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = ".proxykit.toml";

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ProxyConfig {
    #[serde(default)]
    pub scope: ScopeConfig,

    #[serde(default)]
    pub ghost: GhostConfig,

    #[serde(default)]
    pub naming: NamingConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScopeConfig {
    /// Caller classes allowed to read private slots they did not declare
    #[serde(default = "default_trusted")]
    pub trusted_introspectors: Vec<String>,

    #[serde(default = "default_true")]
    pub allow_dynamic_properties: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GhostConfig {
    #[serde(default = "default_false")]
    pub initialize_on_method_call: bool,

    /// Class name -> properties that never trigger initialization.
    /// `name` for public/protected, `Class::name` for private.
    #[serde(default)]
    pub skipped_properties: HashMap<String, Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamingConfig {
    #[serde(default = "default_namespace")]
    pub namespace: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormatConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormatConfig {
    #[default]
    Pretty,
    Json,
    Compact,
}

impl Default for ScopeConfig {
    fn default() -> Self {
        Self {
            trusted_introspectors: default_trusted(),
            allow_dynamic_properties: true,
        }
    }
}

impl Default for NamingConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: LogFormatConfig::Pretty,
        }
    }
}

fn default_true() -> bool { true }
fn default_false() -> bool { false }
fn default_trusted() -> Vec<String> { vec!["ReflectionProperty".to_string()] }
fn default_namespace() -> String { "ProxyKitGenerated".to_string() }
fn default_level() -> String { "info".to_string() }

impl ProxyConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| ProxyError::Config(format!("failed to read {}: {}", path.display(), e)))?;

        Self::parse(&content)
    }

    /// Parse configuration from TOML string
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| ProxyError::Config(format!("failed to parse config: {}", e)))
    }

    /// Find and load `.proxykit.toml` from the current directory or its parents
    pub fn discover() -> Self {
        std::env::current_dir()
            .ok()
            .and_then(|dir| Self::discover_from(&dir))
            .map(|(_, config)| config)
            .unwrap_or_default()
    }

    /// Walks up from `start`; returns the first config that loads, with its path
    pub fn discover_from(start: &Path) -> Option<(PathBuf, Self)> {
        let mut current = Some(start.to_path_buf());

        while let Some(dir) = current {
            let config_path = dir.join(CONFIG_FILE_NAME);
            if config_path.exists() {
                if let Ok(config) = Self::load(&config_path) {
                    return Some((config_path, config));
                }
            }
            current = dir.parent().map(|p| p.to_path_buf());
        }

        None
    }

    pub fn scope_policy(&self) -> ScopePolicy {
        ScopePolicy {
            trusted_introspectors: self.scope.trusted_introspectors.iter().cloned().collect(),
            allow_dynamic_properties: self.scope.allow_dynamic_properties,
        }
    }

    pub fn skipped_for(&self, class: &str) -> &[String] {
        self.ghost
            .skipped_properties
            .get(class)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| ProxyError::Config(e.to_string()))
    }
}
