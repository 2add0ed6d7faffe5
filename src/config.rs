//! Manager configuration.
//!
//! Values come from [`EvalConfig::default`], overridden by environment
//! variables through [`EvalConfig::from_env`], or, with the `toml-config`
//! feature, from a TOML document.

use serde::Deserialize;

use crate::eval::BindingKind;

/// Binding convention for handles created without an explicit one.
pub const ENV_BINDING: &str = "EVALNET_BINDING";
/// Keep delegate entries alive after their last handle is disposed.
pub const ENV_RETAIN_ON_DISPOSE: &str = "EVALNET_RETAIN_ON_DISPOSE";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EvalConfig {
    /// Convention used by [`EvalManager::create`](crate::EvalManager::create).
    pub default_binding: BindingKind,
    /// When set, disposing the last handle that references a delegate leaves
    /// the delegate cached until the next [`expire_cache`](crate::EvalManager::expire_cache).
    pub retain_on_dispose: bool,
}

impl EvalConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(val) = std::env::var(ENV_BINDING) {
            config.default_binding = val.parse().unwrap_or(config.default_binding);
        }
        if let Ok(val) = std::env::var(ENV_RETAIN_ON_DISPOSE) {
            config.retain_on_dispose = parse_flag(&val).unwrap_or(config.retain_on_dispose);
        }
        config
    }

    pub fn with_default_binding(mut self, binding: BindingKind) -> Self {
        self.default_binding = binding;
        self
    }

    pub fn with_retain_on_dispose(mut self, retain: bool) -> Self {
        self.retain_on_dispose = retain;
        self
    }
}

fn parse_flag(val: &str) -> Option<bool> {
    match val.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(feature = "toml-config")]
pub use self::file::ConfigError;

#[cfg(feature = "toml-config")]
mod file {
    use std::path::{Path, PathBuf};

    use thiserror::Error;

    use super::EvalConfig;

    #[derive(Debug, Error)]
    pub enum ConfigError {
        #[error("failed to read {path}: {source}")]
        Io {
            path: PathBuf,
            #[source]
            source: std::io::Error,
        },
        #[error("invalid configuration: {0}")]
        Parse(#[from] toml::de::Error),
    }

    impl EvalConfig {
        pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
            Ok(toml::from_str(text)?)
        }

        pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
            let path = path.as_ref();
            let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            Self::from_toml_str(&text)
        }
    }
}
