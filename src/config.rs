//! Enhancer configuration helpers.
//!
//! The configuration is owned by the project (`.penhance/config.json`) and is
//! read-only to discovery and orchestration. This module loads, validates, and
//! normalizes it so the rest of the pipeline can stay free of defaulting logic.
use anyhow::{anyhow, Context, Result};
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::ConfigError;

/// Current schema version for `.penhance/config.json`.
pub const CONFIG_SCHEMA_VERSION: u32 = 1;

/// Backend identifier used when the configuration names none.
pub const DEFAULT_BACKEND_ID: &str = "OPENJPA";

/// Per-project directory holding the enhancer config and project manifest.
pub const CONFIG_DIR_REL: &str = ".penhance";
const CONFIG_FILE_NAME: &str = "config.json";
const USER_CONFIG_DIR: &str = "penhance";

const JAVAX_ENTITY: &str = "javax.persistence.Entity";
const JAVAX_MAPPED_SUPERCLASS: &str = "javax.persistence.MappedSuperclass";
const JAVAX_EMBEDDABLE: &str = "javax.persistence.Embeddable";
const JAKARTA_ENTITY: &str = "jakarta.persistence.Entity";
const JAKARTA_MAPPED_SUPERCLASS: &str = "jakarta.persistence.MappedSuperclass";
const JAKARTA_EMBEDDABLE: &str = "jakarta.persistence.Embeddable";

/// Supported persistence APIs and the annotations that mark their classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum PersistenceApi {
    #[default]
    Jpa,
    /// Descriptor-only API; no annotation scan is performed.
    Hibernate,
}

impl PersistenceApi {
    /// Fully qualified annotation names recognized for this API.
    pub fn annotation_names(self) -> &'static [&'static str] {
        match self {
            PersistenceApi::Jpa => &[
                JAVAX_ENTITY,
                JAVAX_MAPPED_SUPERCLASS,
                JAVAX_EMBEDDABLE,
                JAKARTA_ENTITY,
                JAKARTA_MAPPED_SUPERCLASS,
                JAKARTA_EMBEDDABLE,
            ],
            PersistenceApi::Hibernate => &[],
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PersistenceApi::Jpa => "JPA",
            PersistenceApi::Hibernate => "HIBERNATE",
        }
    }
}

impl fmt::Display for PersistenceApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PersistenceApi {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "JPA" => Ok(PersistenceApi::Jpa),
            "HIBERNATE" => Ok(PersistenceApi::Hibernate),
            other => Err(ConfigError::UnknownApi(other.to_string())),
        }
    }
}

/// Declaration of an additional command-driven enhancer backend.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct BackendDeclaration {
    pub id: String,
    /// Human-readable name used as the prefix of every build message.
    pub name: String,
    /// Launcher command line; the first word is resolved on `PATH`.
    pub command: String,
    #[serde(default = "default_supported_apis")]
    pub apis: Vec<PersistenceApi>,
    /// File-name prefix of the archive that must be reachable from a unit
    /// for the backend to run there.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marker_archive: Option<String>,
}

fn default_supported_apis() -> Vec<PersistenceApi> {
    vec![PersistenceApi::Jpa]
}

/// Enhancer configuration as persisted in the project.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct EnhancerConfig {
    pub schema_version: u32,
    pub enabled: bool,
    /// Descriptor file extensions, without the leading dot.
    pub metadata_extensions: IndexSet<String>,
    pub include_test_outputs: bool,
    pub add_default_constructor: bool,
    pub enforce_property_restrictions: bool,
    pub enabled_units: IndexSet<String>,
    /// Qualified class names honored when discovery runs on a restricted scope.
    pub enabled_classes: IndexSet<String>,
    /// Ignore `enabled_classes` even for restricted scopes.
    pub enhance_all_persistent_classes: bool,
    pub api: PersistenceApi,
    pub backend: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub backends: Vec<BackendDeclaration>,
}

impl Default for EnhancerConfig {
    fn default() -> Self {
        Self {
            schema_version: CONFIG_SCHEMA_VERSION,
            enabled: true,
            metadata_extensions: ["jdo", "orm"].into_iter().map(String::from).collect(),
            include_test_outputs: true,
            add_default_constructor: true,
            enforce_property_restrictions: true,
            enabled_units: IndexSet::new(),
            enabled_classes: IndexSet::new(),
            enhance_all_persistent_classes: false,
            api: PersistenceApi::Jpa,
            backend: DEFAULT_BACKEND_ID.to_string(),
            backends: Vec::new(),
        }
    }
}

impl EnhancerConfig {
    /// True when the enhancer should run at all for this configuration.
    pub fn is_active(&self) -> bool {
        self.enabled && !self.enabled_units.is_empty()
    }

    pub fn is_unit_enabled(&self, unit_name: &str) -> bool {
        self.enabled_units.contains(unit_name)
    }

    /// Extensions normalized to lower case without a leading dot.
    pub fn normalized_extensions(&self) -> IndexSet<String> {
        self.metadata_extensions
            .iter()
            .map(|ext| ext.trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|ext| !ext.is_empty())
            .collect()
    }

    /// Class restriction to apply for a restricted discovery scope.
    pub fn class_restriction(&self) -> Option<&IndexSet<String>> {
        if self.enhance_all_persistent_classes {
            None
        } else {
            Some(&self.enabled_classes)
        }
    }
}

/// Return the default config path under a project root.
pub fn default_config_path(project_root: &Path) -> PathBuf {
    project_root.join(CONFIG_DIR_REL).join(CONFIG_FILE_NAME)
}

/// Return the per-user fallback config path, when the platform has one.
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(USER_CONFIG_DIR).join(CONFIG_FILE_NAME))
}

/// Load a config from `path`.
pub fn load_config(path: &Path) -> Result<EnhancerConfig> {
    let bytes = fs::read(path).with_context(|| format!("read config {}", path.display()))?;
    let config: EnhancerConfig = serde_json::from_slice(&bytes)
        .with_context(|| format!("parse enhancer config JSON {}", path.display()))?;
    validate_config(&config)?;
    Ok(config)
}

/// Load the project config, falling back to the user config and then to defaults.
pub fn load_config_or_default(project_root: &Path) -> Result<EnhancerConfig> {
    let project_path = default_config_path(project_root);
    if project_path.is_file() {
        return load_config(&project_path);
    }
    if let Some(user_path) = user_config_path().filter(|path| path.is_file()) {
        tracing::debug!(path = %user_path.display(), "using user enhancer config");
        return load_config(&user_path);
    }
    Ok(EnhancerConfig::default())
}

/// Persist a config to disk in a stable JSON format.
pub fn write_config(path: &Path, config: &EnhancerConfig) -> Result<()> {
    validate_config(config)?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create config dir {}", parent.display()))?;
    }
    let text = serde_json::to_string_pretty(config).context("serialize enhancer config")?;
    fs::write(path, text.as_bytes()).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

/// Validate schema version and user-provided values.
pub fn validate_config(config: &EnhancerConfig) -> Result<()> {
    if config.schema_version != CONFIG_SCHEMA_VERSION {
        return Err(ConfigError::SchemaVersion(config.schema_version).into());
    }
    for ext in &config.metadata_extensions {
        if ext.contains('/') || ext.contains('\\') {
            return Err(ConfigError::InvalidExtension(ext.clone()).into());
        }
    }
    let mut seen = IndexSet::new();
    for declaration in &config.backends {
        if declaration.id.trim().is_empty() {
            return Err(anyhow!("backend declaration id must be non-empty"));
        }
        if declaration.command.trim().is_empty() {
            return Err(ConfigError::EmptyCommand(declaration.id.clone()).into());
        }
        if !seen.insert(declaration.id.as_str()) {
            return Err(ConfigError::DuplicateBackend(declaration.id.clone()).into());
        }
    }
    Ok(())
}
