//! Configuration module for the clustering engine.
//!
//! This module provides a layered configuration system that supports:
//! - Default values
//! - TOML configuration file
//! - Environment variable overrides
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `LC_` and use double underscores
//! to separate nested levels:
//! - `LC_CLUSTERING__STORE_VECTORS=true` sets `clustering.store_vectors`
//! - `LC_CLUSTERING__CONVERSATION_THRESHOLD=45` sets `clustering.conversation_threshold`
//! - `LC_DEBUG=true` sets `debug`

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{ClusterError, ConfigError};

/// Default maximum gap, in seconds, between two activity bursts that still
/// count as one conversation.
pub const DEFAULT_CONVERSATION_THRESHOLD: f64 = 30.0;

/// Directory searched for in the current directory and its ancestors.
const CONFIG_DIR: &str = ".links-cluster";

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    /// Global debug mode
    #[serde(default = "default_false")]
    pub debug: bool,

    /// Clustering engine settings
    #[serde(default)]
    pub clustering: ClusteringConfig,
}

/// Construction-time engine parameters. Immutable once an engine is built.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ClusteringConfig {
    /// Minimum cosine similarity for a vector to join an existing cluster
    #[serde(default = "default_cluster_similarity_threshold")]
    pub cluster_similarity_threshold: f64,

    /// Minimum cosine similarity for a vector to join an existing subcluster
    #[serde(default = "default_subcluster_similarity_threshold")]
    pub subcluster_similarity_threshold: f64,

    /// Upper bound the edge threshold approaches as evidence accumulates
    #[serde(default = "default_pair_similarity_maximum")]
    pub pair_similarity_maximum: f64,

    /// Keep every raw vector inside its subcluster
    #[serde(default = "default_false")]
    pub store_vectors: bool,

    /// Gap (seconds) under which two activity intervals are one conversation
    #[serde(default = "default_conversation_threshold")]
    pub conversation_threshold: f64,
}

// Default value functions
fn default_version() -> u32 {
    1
}
fn default_false() -> bool {
    false
}
fn default_cluster_similarity_threshold() -> f64 {
    0.7
}
fn default_subcluster_similarity_threshold() -> f64 {
    0.85
}
fn default_pair_similarity_maximum() -> f64 {
    1.0
}
fn default_conversation_threshold() -> f64 {
    DEFAULT_CONVERSATION_THRESHOLD
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            debug: false,
            clustering: ClusteringConfig::default(),
        }
    }
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            cluster_similarity_threshold: default_cluster_similarity_threshold(),
            subcluster_similarity_threshold: default_subcluster_similarity_threshold(),
            pair_similarity_maximum: default_pair_similarity_maximum(),
            store_vectors: false,
            conversation_threshold: default_conversation_threshold(),
        }
    }
}

impl ClusteringConfig {
    /// Create a configuration with the three similarity parameters set.
    pub fn new(
        cluster_similarity_threshold: f64,
        subcluster_similarity_threshold: f64,
        pair_similarity_maximum: f64,
    ) -> Self {
        Self {
            cluster_similarity_threshold,
            subcluster_similarity_threshold,
            pair_similarity_maximum,
            ..Self::default()
        }
    }

    /// Enable or disable raw vector storage.
    pub fn with_store_vectors(mut self, store_vectors: bool) -> Self {
        self.store_vectors = store_vectors;
        self
    }

    /// Override the conversation gap.
    pub fn with_conversation_threshold(mut self, seconds: f64) -> Self {
        self.conversation_threshold = seconds;
        self
    }

    /// Check that the parameters describe a usable engine.
    pub fn validate(&self) -> Result<(), ClusterError> {
        let invalid = |reason: String| Err(ClusterError::InvalidConfig { reason });

        let values = [
            ("cluster_similarity_threshold", self.cluster_similarity_threshold),
            (
                "subcluster_similarity_threshold",
                self.subcluster_similarity_threshold,
            ),
            ("pair_similarity_maximum", self.pair_similarity_maximum),
            ("conversation_threshold", self.conversation_threshold),
        ];
        if let Some((name, value)) = values.iter().find(|(_, v)| !v.is_finite()) {
            return invalid(format!("{name} must be finite, got {value}"));
        }

        let cluster = self.cluster_similarity_threshold;
        if !(cluster > 0.0 && cluster < 1.0) {
            return invalid(format!(
                "cluster_similarity_threshold must be in (0, 1), got {cluster}"
            ));
        }
        if !(-1.0..=1.0).contains(&self.subcluster_similarity_threshold) {
            return invalid(format!(
                "subcluster_similarity_threshold must be in [-1, 1], got {}",
                self.subcluster_similarity_threshold
            ));
        }
        let floor = cluster * cluster;
        if !(self.pair_similarity_maximum > floor && self.pair_similarity_maximum <= 1.0) {
            return invalid(format!(
                "pair_similarity_maximum must be in ({floor}, 1], got {}",
                self.pair_similarity_maximum
            ));
        }
        if self.conversation_threshold < 0.0 {
            return invalid(format!(
                "conversation_threshold cannot be negative, got {}",
                self.conversation_threshold
            ));
        }

        Ok(())
    }
}

impl Settings {
    /// Load configuration from all sources
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::find_workspace_config()
            .unwrap_or_else(|| PathBuf::from(CONFIG_DIR).join("settings.toml"));
        Self::load_from(config_path)
    }

    /// Load configuration from a specific file, still honouring `LC_` overrides
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let settings: Settings = Figment::new()
            // Start with defaults
            .merge(Serialized::defaults(Settings::default()))
            // Layer in config file if it exists
            .merge(Toml::file(path.as_ref()))
            // Double underscore (__) separates nested levels
            .merge(Env::prefixed("LC_").map(|key| {
                key.as_str()
                    .to_lowercase()
                    .replace("__", ".")
                    .into()
            }))
            .extract()
            .map_err(Box::new)?;

        settings.clustering.validate()?;
        Ok(settings)
    }

    /// Find the settings file by looking for the config directory
    /// from the current directory up to root
    fn find_workspace_config() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;

        current
            .ancestors()
            .map(|ancestor| ancestor.join(CONFIG_DIR))
            .find(|dir| dir.is_dir())
            .map(|dir| dir.join("settings.toml"))
    }

    /// Save current configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let toml_string = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        std::fs::write(path, toml_string).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Render the settings the way they would be saved.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}
