//! Per-unit enhancer invocation.
//!
//! Units run strictly one after another in build order. Each unit gets a fresh
//! isolated environment, one proxy, and one `enhance` call for its whole batch.
//! Recoverable unit failures become messages; anything else aborts the run.
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use crate::backend::{EnhancerBackend, ProxyRequest};
use crate::config::EnhancerConfig;
use crate::environment::{EnvironmentFactory, EnvironmentGuard};
use crate::error::UnitError;
use crate::group::ExecutionBuckets;
use crate::project::BuildUnit;
use crate::record::MetadataRecord;
use crate::report::{BuildContext, Reporter};

/// Why a unit did not reach the enhancer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NoOutputDirectory,
    NoRecords,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    BackendUnavailable,
    BindingError,
    Environment,
    Unexpected,
}

/// Result of enhancing one unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnhancementOutcome {
    Enhanced(usize),
    Skipped(SkipReason),
    Failed { kind: FailureKind, detail: String },
}

impl EnhancementOutcome {
    pub fn count(&self) -> usize {
        match self {
            EnhancementOutcome::Enhanced(count) => *count,
            _ => 0,
        }
    }
}

/// Outcomes of a completed run, in unit order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub outcomes: Vec<(String, EnhancementOutcome)>,
}

impl RunSummary {
    pub fn total(&self) -> usize {
        self.outcomes.iter().map(|(_, outcome)| outcome.count()).sum()
    }

    fn completed(&self) -> Vec<(String, usize)> {
        self.outcomes
            .iter()
            .filter_map(|(unit, outcome)| match outcome {
                EnhancementOutcome::Enhanced(count) => Some((unit.clone(), *count)),
                _ => None,
            })
            .collect()
    }
}

/// A run stopped by an unexpected failure.
#[derive(Debug)]
pub struct RunAborted {
    /// Units that finished before the failure. Their artifacts stay rewritten.
    pub completed: Vec<(String, usize)>,
    pub error: anyhow::Error,
}

/// Drives the enhancer across the affected units of one build.
pub struct EnhancementOrchestrator<'a> {
    config: &'a EnhancerConfig,
    backend: &'a dyn EnhancerBackend,
    environments: EnvironmentFactory<'a>,
}

impl<'a> EnhancementOrchestrator<'a> {
    pub fn new(
        config: &'a EnhancerConfig,
        backend: &'a dyn EnhancerBackend,
        environments: EnvironmentFactory<'a>,
    ) -> Self {
        Self {
            config,
            backend,
            environments,
        }
    }

    pub fn run(
        &self,
        context: &dyn BuildContext,
        reporter: &Reporter<'_>,
        units: &[Arc<BuildUnit>],
        buckets: &ExecutionBuckets,
    ) -> Result<RunSummary, RunAborted> {
        let mut summary = RunSummary::default();
        for unit in units {
            if !self.config.is_unit_enabled(&unit.name) {
                continue;
            }
            let Some(output_dir) = context.output_directory(unit) else {
                reporter.warn(&format!(
                    "Enhancer: no output directory for module: {}",
                    unit.name
                ));
                summary.outcomes.push((
                    unit.name.clone(),
                    EnhancementOutcome::Skipped(SkipReason::NoOutputDirectory),
                ));
                continue;
            };

            context.progress().set_text(&format!(
                "{} Enhancer enhancing in {}",
                self.backend.name(),
                unit.name
            ));
            let started = Instant::now();
            let outcome = match self.enhance_unit(context, unit, &output_dir, buckets) {
                Ok(Some(count)) => EnhancementOutcome::Enhanced(count),
                Ok(None) => EnhancementOutcome::Skipped(SkipReason::NoRecords),
                Err(err) if err.is_recoverable() => self.downgrade(reporter, unit, err),
                Err(err) => {
                    return Err(RunAborted {
                        completed: summary.completed(),
                        error: anyhow::Error::new(err)
                            .context(format!("enhance unit {}", unit.name)),
                    });
                }
            };
            tracing::info!(
                unit = %unit.name,
                count = outcome.count(),
                elapsed_ms = started.elapsed().as_millis(),
                "unit enhanced"
            );
            summary.outcomes.push((unit.name.clone(), outcome));
        }
        Ok(summary)
    }

    /// Enhance one unit. `None` means the unit had nothing to submit.
    fn enhance_unit(
        &self,
        context: &dyn BuildContext,
        unit: &BuildUnit,
        output_dir: &Path,
        buckets: &ExecutionBuckets,
    ) -> Result<Option<usize>, UnitError> {
        let descriptors = buckets.descriptors_for(&unit.name);
        let annotated = buckets.annotated_for(&unit.name);
        if descriptors.is_empty() && annotated.is_empty() {
            return Ok(None);
        }

        let test_output_dir = context.test_output_directory(unit);
        let environment = self
            .environments
            .create(unit, Some(output_dir), test_output_dir.as_deref())
            .map_err(|source| UnitError::Environment {
                unit: unit.name.clone(),
                source,
            })?;
        let _guard = EnvironmentGuard::enter(Arc::new(environment));

        let mut proxy = self.backend.new_proxy(ProxyRequest {
            api: self.config.api,
            unit,
            output_dir,
            extra: None,
        })?;
        proxy.set_add_default_constructor(self.config.add_default_constructor);
        proxy.set_enforce_property_restrictions(self.config.enforce_property_restrictions);

        for record in descriptors {
            proxy.add_metadata_files(&[record.location().to_path_buf()]);
            proxy.add_classes(&existing_class_files(record));
        }
        let annotated_classes: Vec<PathBuf> = annotated
            .iter()
            .flat_map(|record| existing_class_files(record.as_ref()))
            .collect();
        if !annotated_classes.is_empty() {
            proxy.add_classes(&annotated_classes);
        }

        let count = proxy.enhance()?;
        Ok(Some(count))
    }

    fn downgrade(
        &self,
        reporter: &Reporter<'_>,
        unit: &BuildUnit,
        err: UnitError,
    ) -> EnhancementOutcome {
        let detail = format!("{err:#}");
        let kind = match err {
            UnitError::BackendUnavailable(_) => {
                reporter.warn(&format!(
                    "Enhancer: enhancer not found in classpath for module: {}",
                    unit.name
                ));
                FailureKind::BackendUnavailable
            }
            UnitError::Binding(_) => {
                reporter.error(&format!(
                    "Enhancer: enhancer method not found for module: {}",
                    unit.name
                ));
                FailureKind::BindingError
            }
            UnitError::Environment { source, .. } => {
                reporter.error(&format!(
                    "Enhancer: could not build isolated environment for module: {}: {source}",
                    unit.name
                ));
                FailureKind::Environment
            }
            // not recoverable; `run` aborts before downgrading
            UnitError::Unexpected(_) => FailureKind::Unexpected,
        };
        tracing::debug!(unit = %unit.name, ?kind, %detail, "unit downgraded");
        EnhancementOutcome::Failed { kind, detail }
    }
}

fn existing_class_files(record: &MetadataRecord) -> Vec<PathBuf> {
    record
        .class_files()
        .into_iter()
        .flatten()
        .map(Path::to_path_buf)
        .collect()
}
