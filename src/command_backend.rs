//! Enhancer backend that drives an external enhancer command.
//!
//! The command runs once per unit with the unit's isolated environment as its
//! classpath. Arguments follow the OpenJPA `PCEnhancer` conventions:
//! `-cp <entries> <rest of command> -addDefaultConstructor <bool>
//! -enforcePropertyRestrictions <bool> <metadata files> <class files>`.
use anyhow::{anyhow, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::time::{Instant, SystemTime};

use crate::backend::{BackendRegistry, EnhancerBackend, EnhancerProxy, ProxyRequest};
use crate::config::{BackendDeclaration, EnhancerConfig, PersistenceApi, DEFAULT_BACKEND_ID};
use crate::environment::{self, IsolatedEnvironment};
use crate::error::UnitError;

pub const OPENJPA_NAME: &str = "OpenJpa";
pub const OPENJPA_COMMAND: &str = "java org.apache.openjpa.enhance.PCEnhancer";
pub const OPENJPA_MARKER_ARCHIVE: &str = "openjpa";

/// Declaration of the built-in OpenJPA backend.
pub fn openjpa_declaration() -> BackendDeclaration {
    BackendDeclaration {
        id: DEFAULT_BACKEND_ID.to_string(),
        name: OPENJPA_NAME.to_string(),
        command: OPENJPA_COMMAND.to_string(),
        apis: vec![PersistenceApi::Jpa],
        marker_archive: Some(OPENJPA_MARKER_ARCHIVE.to_string()),
    }
}

/// Registry holding the built-in backend first, then every backend declared
/// in `config`. A declaration reusing a registered id is ignored.
pub fn registry_from_config(config: &EnhancerConfig) -> BackendRegistry {
    let registry = BackendRegistry::new(Arc::new(CommandBackend::openjpa()));
    for declaration in &config.backends {
        let id = declaration.id.clone();
        if !registry.register(Arc::new(CommandBackend::new(declaration.clone()))) {
            tracing::warn!(id = %id, "backend id already registered, declaration ignored");
        }
    }
    registry
}

/// A backend that shells out to a configured enhancer command.
#[derive(Debug, Clone)]
pub struct CommandBackend {
    declaration: BackendDeclaration,
}

impl CommandBackend {
    pub fn new(declaration: BackendDeclaration) -> Self {
        Self { declaration }
    }

    pub fn openjpa() -> Self {
        Self::new(openjpa_declaration())
    }
}

impl EnhancerBackend for CommandBackend {
    fn id(&self) -> &str {
        &self.declaration.id
    }

    fn name(&self) -> &str {
        &self.declaration.name
    }

    fn new_proxy(&self, request: ProxyRequest<'_>) -> Result<Box<dyn EnhancerProxy>, UnitError> {
        let unit = &request.unit.name;
        if !self.declaration.apis.contains(&request.api) {
            return Err(UnitError::Binding(format!(
                "{} has no enhance entry point for api {}",
                self.declaration.name, request.api
            )));
        }

        let words = shell_words::split(&self.declaration.command)
            .with_context(|| format!("parse enhancer command: {}", self.declaration.command))?;
        let Some((launcher, args)) = words.split_first() else {
            return Err(UnitError::Binding(format!(
                "{} declares an empty command",
                self.declaration.name
            )));
        };
        let launcher = which::which(launcher).map_err(|err| {
            UnitError::BackendUnavailable(format!("{launcher} for unit {unit}: {err}"))
        })?;

        let environment = environment::current()
            .ok_or_else(|| anyhow!("no isolated environment installed for unit {unit}"))?;
        if let Some(marker) = &self.declaration.marker_archive {
            if !environment.contains_archive(marker) {
                return Err(UnitError::BackendUnavailable(format!(
                    "no {marker} archive reachable from unit {unit}"
                )));
            }
        }

        Ok(Box::new(CommandProxy {
            launcher,
            args: args.to_vec(),
            environment,
            working_dir: request.output_dir.to_path_buf(),
            add_default_constructor: true,
            enforce_property_restrictions: true,
            metadata_files: Vec::new(),
            classes: Vec::new(),
        }))
    }
}

type Stamp = Option<(SystemTime, u64)>;

fn stamp(path: &Path) -> Stamp {
    let meta = fs::metadata(path).ok()?;
    Some((meta.modified().ok()?, meta.len()))
}

struct CommandProxy {
    launcher: PathBuf,
    args: Vec<String>,
    environment: Arc<IsolatedEnvironment>,
    working_dir: PathBuf,
    add_default_constructor: bool,
    enforce_property_restrictions: bool,
    metadata_files: Vec<PathBuf>,
    classes: Vec<PathBuf>,
}

impl EnhancerProxy for CommandProxy {
    fn set_add_default_constructor(&mut self, enabled: bool) {
        self.add_default_constructor = enabled;
    }

    fn set_enforce_property_restrictions(&mut self, enabled: bool) {
        self.enforce_property_restrictions = enabled;
    }

    fn add_metadata_files(&mut self, paths: &[PathBuf]) {
        self.metadata_files.extend_from_slice(paths);
    }

    fn add_classes(&mut self, paths: &[PathBuf]) {
        self.classes.extend_from_slice(paths);
    }

    fn enhance(&mut self) -> Result<usize, UnitError> {
        if self.metadata_files.is_empty() && self.classes.is_empty() {
            return Ok(0);
        }
        let classpath = self
            .environment
            .search_path()
            .map_err(|source| UnitError::Environment {
                unit: self.environment.unit().to_string(),
                source,
            })?;
        let before: Vec<Stamp> = self.classes.iter().map(|path| stamp(path)).collect();

        let started = Instant::now();
        let output = Command::new(&self.launcher)
            .arg("-cp")
            .arg(&classpath)
            .args(&self.args)
            .arg("-addDefaultConstructor")
            .arg(self.add_default_constructor.to_string())
            .arg("-enforcePropertyRestrictions")
            .arg(self.enforce_property_restrictions.to_string())
            .args(&self.metadata_files)
            .args(&self.classes)
            .current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .output()
            .with_context(|| format!("spawn enhancer {}", self.launcher.display()))?;
        tracing::info!(
            unit = %self.environment.unit(),
            elapsed_ms = started.elapsed().as_millis(),
            metadata = self.metadata_files.len(),
            classes = self.classes.len(),
            "enhancer command complete"
        );

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!(
                "enhancer command failed with status {}: {}",
                output.status,
                stderr.trim()
            )
            .into());
        }

        let changed = self
            .classes
            .iter()
            .zip(before)
            .filter(|(path, before)| stamp(path) != *before)
            .count();
        Ok(changed)
    }
}
