//! Build-facing surfaces: messages, progress, and the build context.
//!
//! Every message the enhancer emits goes through [`Reporter`], which prefixes
//! it with the active backend's display name.
use parking_lot::Mutex;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::project::{BuildUnit, Project};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        })
    }
}

/// Status stack shown while the build runs.
pub trait ProgressIndicator {
    fn push_state(&self);
    fn pop_state(&self);
    fn set_text(&self, text: &str);
}

/// Everything the enhancer needs from the build system for one build.
pub trait BuildContext {
    fn project(&self) -> &Project;

    /// Units affected by this build, in build order.
    fn affected_units(&self) -> Vec<Arc<BuildUnit>>;

    fn output_directory(&self, unit: &BuildUnit) -> Option<PathBuf> {
        unit.output_dir.clone()
    }

    fn test_output_directory(&self, unit: &BuildUnit) -> Option<PathBuf> {
        unit.test_output_dir.clone()
    }

    fn progress(&self) -> &dyn ProgressIndicator;

    /// Record a build message. Messages carry no source position.
    fn add_message(&self, severity: Severity, text: &str);
}

/// Formats and emits enhancer messages with the backend prefix.
pub struct Reporter<'a> {
    context: &'a dyn BuildContext,
    backend_name: &'a str,
}

impl<'a> Reporter<'a> {
    pub fn new(context: &'a dyn BuildContext, backend_name: &'a str) -> Self {
        Self {
            context,
            backend_name,
        }
    }

    pub fn message(&self, severity: Severity, text: &str) {
        let text = format!("{} {}", self.backend_name, text);
        match severity {
            Severity::Info => tracing::info!(text = %text, "enhancer message"),
            Severity::Warning => tracing::warn!(text = %text, "enhancer message"),
            Severity::Error => tracing::error!(text = %text, "enhancer message"),
        }
        self.context.add_message(severity, &text);
    }

    pub fn info(&self, text: &str) {
        self.message(Severity::Info, text);
    }

    pub fn warn(&self, text: &str) {
        self.message(Severity::Warning, text);
    }

    pub fn error(&self, text: &str) {
        self.message(Severity::Error, text);
    }

    pub fn nothing_found_in_discovery(&self) {
        self.warn("Enhancer: no metadata- or annotated class-files found");
    }

    pub fn nothing_found_in_run(&self) {
        self.warn("Enhancer: no persistence metadata or annotated class files found");
    }

    pub fn success(&self, count: usize) {
        self.info(&format!("Enhancer: Successfully enhanced {count} classes"));
    }

    /// Report a run abort with the units that had completed and the full
    /// cause chain.
    pub fn aborted(&self, completed: &[(String, usize)], err: &anyhow::Error) {
        let mut text = String::from("Enhancer: an unexpected error occurred.");
        if completed.is_empty() {
            text.push_str(" No unit had completed.");
        } else {
            text.push_str(" Units already enhanced before the failure (not rolled back):");
            for (unit, count) in completed {
                text.push_str(&format!("\n  {unit}: {count} classes"));
            }
        }
        text.push_str(&format!("\n\n{err:?}"));
        self.error(&text);
    }
}

/// A progress indicator that only logs.
#[derive(Debug, Default)]
pub struct LogProgress {
    depth: Mutex<usize>,
}

impl ProgressIndicator for LogProgress {
    fn push_state(&self) {
        *self.depth.lock() += 1;
    }

    fn pop_state(&self) {
        let mut depth = self.depth.lock();
        *depth = depth.saturating_sub(1);
    }

    fn set_text(&self, text: &str) {
        tracing::info!(depth = *self.depth.lock(), "{text}");
    }
}

/// Build context for a standalone run over a whole project.
pub struct ProjectBuildContext {
    project: Project,
    units: Vec<Arc<BuildUnit>>,
    progress: LogProgress,
    messages: Mutex<Vec<(Severity, String)>>,
}

impl ProjectBuildContext {
    /// Every unit of the project is affected.
    pub fn new(project: Project) -> Self {
        let units = project.units().cloned().collect();
        Self {
            project,
            units,
            progress: LogProgress::default(),
            messages: Mutex::new(Vec::new()),
        }
    }

    /// Only the named units are affected, in the order given.
    pub fn with_units(project: Project, names: &[String]) -> anyhow::Result<Self> {
        let mut units = Vec::with_capacity(names.len());
        for name in names {
            let unit = project
                .unit(name)
                .ok_or_else(|| anyhow::anyhow!("unknown unit {name}"))?;
            units.push(Arc::clone(unit));
        }
        Ok(Self {
            units,
            ..Self::new(project)
        })
    }

    pub fn messages(&self) -> Vec<(Severity, String)> {
        self.messages.lock().clone()
    }

    pub fn has_errors(&self) -> bool {
        self.messages
            .lock()
            .iter()
            .any(|(severity, _)| *severity == Severity::Error)
    }
}

impl BuildContext for ProjectBuildContext {
    fn project(&self) -> &Project {
        &self.project
    }

    fn affected_units(&self) -> Vec<Arc<BuildUnit>> {
        self.units.clone()
    }

    fn progress(&self) -> &dyn ProgressIndicator {
        &self.progress
    }

    fn add_message(&self, severity: Severity, text: &str) {
        self.messages.lock().push((severity, text.to_string()));
    }
}
