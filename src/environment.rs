//! Isolated per-unit execution environments.
//!
//! Each unit is enhanced with an environment that holds only the host's own
//! entries, that unit's outputs, and the libraries of its dependency closure.
//! The environment is installed as the current one for the calling thread
//! while the unit runs and the previous value is restored when the guard drops.
use std::cell::RefCell;
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::project::{BuildUnit, Project};

const ARCHIVE_EXTENSIONS: [&str; 2] = [".jar", ".zip"];

thread_local! {
    static CURRENT: RefCell<Option<Arc<IsolatedEnvironment>>> = const { RefCell::new(None) };
}

/// Resolution scope for one unit's enhancer invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IsolatedEnvironment {
    unit: String,
    entries: Vec<PathBuf>,
}

impl IsolatedEnvironment {
    pub fn new(unit: impl Into<String>, entries: Vec<PathBuf>) -> Self {
        Self {
            unit: unit.into(),
            entries,
        }
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    /// Entries in lookup order: host, outputs, libraries.
    pub fn entries(&self) -> &[PathBuf] {
        &self.entries
    }

    /// Entries joined with the platform path separator.
    pub fn search_path(&self) -> io::Result<OsString> {
        std::env::join_paths(&self.entries)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err))
    }

    /// True when an entry's file name starts with `prefix`.
    pub fn contains_archive(&self, prefix: &str) -> bool {
        self.entries.iter().any(|entry| {
            entry
                .file_name()
                .is_some_and(|name| name.to_string_lossy().starts_with(prefix))
        })
    }
}

/// The environment installed for the calling thread, if any.
pub fn current() -> Option<Arc<IsolatedEnvironment>> {
    CURRENT.with(|slot| slot.borrow().clone())
}

/// Installs an environment for the calling thread and restores the previous
/// one on drop, including during unwinding.
#[must_use = "the previous environment is restored when the guard drops"]
pub struct EnvironmentGuard {
    previous: Option<Arc<IsolatedEnvironment>>,
}

impl EnvironmentGuard {
    pub fn enter(environment: Arc<IsolatedEnvironment>) -> Self {
        let previous = CURRENT.with(|slot| slot.replace(Some(environment)));
        Self { previous }
    }
}

impl Drop for EnvironmentGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();
        CURRENT.with(|slot| {
            slot.replace(previous);
        });
    }
}

/// Builds fresh isolated environments, one per unit.
pub struct EnvironmentFactory<'a> {
    project: &'a Project,
    host_entries: Vec<PathBuf>,
    include_test_outputs: bool,
}

impl<'a> EnvironmentFactory<'a> {
    pub fn new(
        project: &'a Project,
        host_entries: Vec<PathBuf>,
        include_test_outputs: bool,
    ) -> Self {
        Self {
            project,
            host_entries,
            include_test_outputs,
        }
    }

    /// Build the environment for `unit` given the output directories the
    /// build resolved for it.
    pub fn create(
        &self,
        unit: &BuildUnit,
        output_dir: Option<&Path>,
        test_output_dir: Option<&Path>,
    ) -> io::Result<IsolatedEnvironment> {
        let mut entries = self.host_entries.clone();
        if let Some(dir) = output_dir {
            entries.push(dir.canonicalize()?);
        }
        if self.include_test_outputs {
            if let Some(dir) = test_output_dir.filter(|dir| dir.is_dir()) {
                entries.push(dir.canonicalize()?);
            }
        }
        for library in self.project.library_closure(unit) {
            let library = normalize_archive_path(&library);
            if !entries.contains(&library) {
                entries.push(library);
            }
        }
        tracing::debug!(unit = %unit.name, entries = entries.len(), "isolated environment");
        Ok(IsolatedEnvironment::new(unit.name.clone(), entries))
    }
}

/// Entries that keep the running tool itself resolvable: the directory of
/// the current executable.
pub fn host_entries() -> io::Result<Vec<PathBuf>> {
    let exe = std::env::current_exe()?;
    Ok(exe.parent().map(Path::to_path_buf).into_iter().collect())
}

/// Drop an inner-archive marker (`lib.jar!/sub`) so the archive is addressed
/// as a plain file.
pub fn normalize_archive_path(path: &Path) -> PathBuf {
    let text = path.to_string_lossy();
    for extension in ARCHIVE_EXTENSIONS {
        let marker = format!("{extension}!");
        if let Some(index) = text.find(&marker) {
            return PathBuf::from(&text[..index + extension.len()]);
        }
    }
    path.to_path_buf()
}
