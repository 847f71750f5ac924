//! Configuration for the tree store and the preview runtime.
//!
//! Every field has a default, so an empty TOML document is a valid config:
//!
//! ```toml
//! [preview]
//! report_dangling_references = true
//! strict_variable_types = false
//! max_actions_per_flow = 64
//!
//! [tree]
//! max_depth = 32
//! ```

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {field} must be greater than zero")]
    ZeroLimit { field: &'static str },
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub preview: PreviewConfig,
    pub tree: TreeConfig,
}

impl Config {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.preview.max_actions_per_flow == 0 {
            return Err(ConfigError::ZeroLimit {
                field: "preview.max_actions_per_flow",
            });
        }
        if self.tree.max_depth == 0 {
            return Err(ConfigError::ZeroLimit {
                field: "tree.max_depth",
            });
        }
        Ok(())
    }
}

/// Preview (flow runtime) settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PreviewConfig {
    /// Also send dangling event→flow references to the diagnostic sink.
    pub report_dangling_references: bool,
    /// Reject `set-variable` values that do not fit the variable's type.
    pub strict_variable_types: bool,
    /// Flows longer than this are refused before they start.
    pub max_actions_per_flow: usize,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            report_dangling_references: false,
            strict_variable_types: true,
            max_actions_per_flow: 256,
        }
    }
}

/// Component tree settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TreeConfig {
    /// Maximum nesting depth; a root block has depth 1.
    pub max_depth: usize,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self { max_depth: 64 }
    }
}
