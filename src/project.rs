//! Build units and the project manifest that declares them.
//!
//! A build unit is an independently compiled partition with its own output
//! directories and dependencies. The core only reads units; the manifest is
//! how the command line surface learns about them.
use anyhow::{anyhow, Context, Result};
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::CONFIG_DIR_REL;

/// One build partition of a project.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BuildUnit {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_output_dir: Option<PathBuf>,
    /// Roots used to shorten artifact paths for display.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub content_roots: Vec<PathBuf>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub source_roots: Vec<PathBuf>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub test_source_roots: Vec<PathBuf>,
    /// Library archives the unit links against directly.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub libraries: Vec<PathBuf>,
    /// Names of units this one depends on.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
}

impl BuildUnit {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Output directories searched during discovery, main first.
    pub fn output_dirs(&self, include_tests: bool) -> Vec<&Path> {
        let mut dirs = Vec::with_capacity(2);
        if let Some(dir) = self.output_dir.as_deref() {
            dirs.push(dir);
        }
        if include_tests {
            if let Some(dir) = self.test_output_dir.as_deref() {
                dirs.push(dir);
            }
        }
        dirs
    }

    /// Source roots searched by annotation queries, main first.
    pub fn source_dirs(&self, include_tests: bool) -> Vec<&Path> {
        let mut dirs: Vec<&Path> = self.source_roots.iter().map(PathBuf::as_path).collect();
        if include_tests {
            dirs.extend(self.test_source_roots.iter().map(PathBuf::as_path));
        }
        dirs
    }
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
struct ProjectManifest {
    #[serde(default)]
    root: Option<PathBuf>,
    units: Vec<BuildUnit>,
}

/// The set of build units known to a build, in build order.
#[derive(Debug, Clone, Default)]
pub struct Project {
    root: PathBuf,
    units: IndexMap<String, Arc<BuildUnit>>,
}

impl Project {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            units: IndexMap::new(),
        }
    }

    /// Add a unit, replacing any earlier unit with the same name.
    pub fn with_unit(mut self, unit: BuildUnit) -> Self {
        self.units.insert(unit.name.clone(), Arc::new(unit));
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn unit(&self, name: &str) -> Option<&Arc<BuildUnit>> {
        self.units.get(name)
    }

    pub fn units(&self) -> impl Iterator<Item = &Arc<BuildUnit>> {
        self.units.values()
    }

    /// Library archives reachable from `unit`, its own first, then those of
    /// each transitively depended-upon unit in first-visit order.
    pub fn library_closure(&self, unit: &BuildUnit) -> Vec<PathBuf> {
        let mut visited = IndexSet::new();
        let mut libraries = IndexSet::new();
        self.collect_libraries(unit, &mut visited, &mut libraries);
        libraries.into_iter().collect()
    }

    fn collect_libraries(
        &self,
        unit: &BuildUnit,
        visited: &mut IndexSet<String>,
        libraries: &mut IndexSet<PathBuf>,
    ) {
        if !visited.insert(unit.name.clone()) {
            return;
        }
        libraries.extend(unit.libraries.iter().cloned());
        for dependency in &unit.dependencies {
            match self.units.get(dependency) {
                Some(dep) => self.collect_libraries(dep, visited, libraries),
                None => tracing::debug!(
                    unit = %unit.name,
                    dependency = %dependency,
                    "dependency not declared in project"
                ),
            }
        }
    }
}

/// Load a project manifest. The root resolves against the manifest's
/// directory and unit paths resolve against the root.
pub fn load_project(manifest_path: &Path) -> Result<Project> {
    let bytes = fs::read(manifest_path)
        .with_context(|| format!("read project manifest {}", manifest_path.display()))?;
    let manifest: ProjectManifest =
        serde_json::from_slice(&bytes).context("parse project manifest JSON")?;
    let base = manifest_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();
    let root = match manifest.root {
        Some(root) => resolve(&base, &root),
        None => default_root(&base),
    };
    let mut project = Project::new(root.clone());
    for unit in manifest.units {
        if unit.name.trim().is_empty() {
            return Err(anyhow!("unit name must be non-empty"));
        }
        if project.unit(&unit.name).is_some() {
            return Err(anyhow!("duplicate unit {}", unit.name));
        }
        project = project.with_unit(resolve_unit(&root, unit));
    }
    Ok(project)
}

/// A manifest kept under `<project>/.penhance/` belongs to `<project>`.
fn default_root(manifest_dir: &Path) -> PathBuf {
    match manifest_dir.parent() {
        Some(parent) if manifest_dir.ends_with(CONFIG_DIR_REL) => parent.to_path_buf(),
        _ => manifest_dir.to_path_buf(),
    }
}

fn resolve_unit(base: &Path, unit: BuildUnit) -> BuildUnit {
    let resolve_all = |paths: Vec<PathBuf>| -> Vec<PathBuf> {
        paths.iter().map(|path| resolve(base, path)).collect()
    };
    BuildUnit {
        output_dir: unit.output_dir.map(|dir| resolve(base, &dir)),
        test_output_dir: unit.test_output_dir.map(|dir| resolve(base, &dir)),
        content_roots: resolve_all(unit.content_roots),
        source_roots: resolve_all(unit.source_roots),
        test_source_roots: resolve_all(unit.test_source_roots),
        libraries: resolve_all(unit.libraries),
        ..unit
    }
}

fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(name: &str, libraries: &[&str], dependencies: &[&str]) -> BuildUnit {
        BuildUnit {
            libraries: libraries.iter().map(PathBuf::from).collect(),
            dependencies: dependencies.iter().map(|d| d.to_string()).collect(),
            ..BuildUnit::new(name)
        }
    }

    #[test]
    fn library_closure_is_transitive_ordered_and_cycle_safe() {
        let project = Project::new(PathBuf::from("/p"))
            .with_unit(unit("app", &["/lib/a.jar"], &["model", "missing"]))
            .with_unit(unit("model", &["/lib/b.jar", "/lib/a.jar"], &["base"]))
            .with_unit(unit("base", &["/lib/c.jar"], &["app"]));
        let app = project.unit("app").expect("app unit");
        assert_eq!(
            project.library_closure(app),
            vec![
                PathBuf::from("/lib/a.jar"),
                PathBuf::from("/lib/b.jar"),
                PathBuf::from("/lib/c.jar"),
            ]
        );
    }

    #[test]
    fn output_dirs_include_tests_only_on_request() {
        let unit = BuildUnit {
            output_dir: Some(PathBuf::from("/p/out")),
            test_output_dir: Some(PathBuf::from("/p/test-out")),
            ..BuildUnit::new("core")
        };
        assert_eq!(unit.output_dirs(false), vec![Path::new("/p/out")]);
        assert_eq!(unit.output_dirs(true).len(), 2);
    }

    #[test]
    fn load_project_resolves_relative_paths() {
        let dir = tempfile::tempdir().expect("tempdir");
        let manifest = dir.path().join("project.json");
        fs::write(
            &manifest,
            r#"{"units": [{"name": "core", "output_dir": "core/out", "libraries": ["/abs/x.jar"]}]}"#,
        )
        .expect("write manifest");
        let project = load_project(&manifest).expect("load project");
        assert_eq!(project.root(), dir.path());
        let core = project.unit("core").expect("core unit");
        assert_eq!(core.output_dir.as_deref(), Some(dir.path().join("core/out").as_path()));
        assert_eq!(core.libraries, vec![PathBuf::from("/abs/x.jar")]);
    }

    #[test]
    fn manifest_in_config_dir_belongs_to_the_project() {
        let dir = tempfile::tempdir().expect("tempdir");
        let manifest = dir.path().join(".penhance/project.json");
        fs::create_dir_all(manifest.parent().expect("parent")).expect("create dir");
        fs::write(&manifest, r#"{"units": [{"name": "core", "output_dir": "core/out"}]}"#)
            .expect("write manifest");
        let project = load_project(&manifest).expect("load project");
        assert_eq!(project.root(), dir.path());
        let core = project.unit("core").expect("core unit");
        assert_eq!(core.output_dir.as_deref(), Some(dir.path().join("core/out").as_path()));
    }

    #[test]
    fn load_project_rejects_duplicate_units() {
        let dir = tempfile::tempdir().expect("tempdir");
        let manifest = dir.path().join("project.json");
        fs::write(&manifest, r#"{"units": [{"name": "a"}, {"name": "a"}]}"#)
            .expect("write manifest");
        let err = load_project(&manifest).expect_err("duplicate unit");
        assert!(err.to_string().contains("duplicate unit a"));
    }
}
