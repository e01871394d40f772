//! The build hook and the enhancer service.
//!
//! A build calls [`EnhancerTask::processing_items`] to learn what needs
//! revalidation, then [`EnhancerTask::process`] to run the enhancer over those
//! items. [`EnhancerService`] runs the same discovery over the whole project
//! for configuration listings.
use indexmap::IndexSet;
use std::path::PathBuf;

use crate::backend::BackendRegistry;
use crate::config::EnhancerConfig;
use crate::environment::EnvironmentFactory;
use crate::error::DiscoveryError;
use crate::group::{processing_items, record_counts, ExecutionBuckets};
use crate::locate::{
    AnnotationQuery, DescriptorParser, DiscoveryScope, IndexLock, MetadataLocator, UnitRecords,
};
use crate::orchestrator::EnhancementOrchestrator;
use crate::project::Project;
use crate::record::ProcessingItem;
use crate::report::{BuildContext, ProgressIndicator, Reporter};

/// Discovery collaborators shared by the task and the service.
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub parser: &'a dyn DescriptorParser,
    pub annotations: &'a dyn AnnotationQuery,
    pub index: &'a dyn IndexLock,
}

/// Items seen and processed by one build pass.
#[derive(Debug, Default)]
pub struct BuildOutcome {
    pub discovered: usize,
    /// Empty when the run was disabled or aborted.
    pub processed: Vec<ProcessingItem>,
}

/// Pops the progress state when dropped.
struct ProgressScope<'a> {
    progress: &'a dyn ProgressIndicator,
}

impl<'a> ProgressScope<'a> {
    fn push(progress: &'a dyn ProgressIndicator) -> Self {
        progress.push_state();
        Self { progress }
    }
}

impl Drop for ProgressScope<'_> {
    fn drop(&mut self) {
        self.progress.pop_state();
    }
}

/// Post-compile enhancer hook.
pub struct EnhancerTask<'a> {
    config: &'a EnhancerConfig,
    registry: &'a BackendRegistry,
    collaborators: Collaborators<'a>,
    host_entries: Vec<PathBuf>,
}

impl<'a> EnhancerTask<'a> {
    pub fn new(
        config: &'a EnhancerConfig,
        registry: &'a BackendRegistry,
        collaborators: Collaborators<'a>,
    ) -> Self {
        Self {
            config,
            registry,
            collaborators,
            host_entries: Vec::new(),
        }
    }

    /// Entries that keep the enhancer's own classes resolvable in every unit.
    pub fn with_host_entries(mut self, entries: Vec<PathBuf>) -> Self {
        self.host_entries = entries;
        self
    }

    /// Discover the artifacts of the affected units that need revalidation.
    pub fn processing_items(
        &self,
        context: &dyn BuildContext,
    ) -> Result<IndexSet<ProcessingItem>, DiscoveryError> {
        if !self.config.enabled {
            return Ok(IndexSet::new());
        }
        let backend = self.registry.resolve(self.config);
        let reporter = Reporter::new(context, backend.name());

        let units = context.affected_units();
        let locator = MetadataLocator::new(
            self.config,
            self.collaborators.parser,
            self.collaborators.annotations,
            self.collaborators.index,
        )
        .with_project_root(context.project().root());
        let scope = match self.config.class_restriction() {
            Some(allowed) => DiscoveryScope::Restricted(allowed),
            None => DiscoveryScope::Full,
        };
        let descriptors = locator.descriptor_records(&units)?;
        let annotated = locator.annotated_records(&units, scope)?;

        let items = processing_items(&descriptors, &annotated);
        tracing::info!(
            units = units.len(),
            descriptors = descriptors.values().map(Vec::len).sum::<usize>(),
            annotated = annotated.values().map(Vec::len).sum::<usize>(),
            items = items.len(),
            "discovery complete"
        );
        if items.is_empty() {
            reporter.nothing_found_in_discovery();
        }
        Ok(items)
    }

    /// Run the enhancer over `items`. Returns the processed items, or nothing
    /// when the run is disabled or aborts.
    pub fn process(
        &self,
        context: &dyn BuildContext,
        items: &IndexSet<ProcessingItem>,
    ) -> Vec<ProcessingItem> {
        if !self.config.enabled {
            return Vec::new();
        }
        let backend = self.registry.resolve(self.config);
        let reporter = Reporter::new(context, backend.name());
        let _progress = ProgressScope::push(context.progress());
        context
            .progress()
            .set_text(&format!("{} Enhancer running", backend.name()));

        let buckets = ExecutionBuckets::from_items(items);
        tracing::debug!(records = ?record_counts(&buckets), "execution buckets");
        let units: Vec<_> = context
            .affected_units()
            .into_iter()
            .filter(|unit| buckets.has_unit(&unit.name))
            .collect();
        if units.is_empty() {
            reporter.nothing_found_in_run();
            return items.iter().cloned().collect();
        }

        let environments = EnvironmentFactory::new(
            context.project(),
            self.host_entries.clone(),
            self.config.include_test_outputs,
        );
        let orchestrator =
            EnhancementOrchestrator::new(self.config, backend.as_ref(), environments);
        match orchestrator.run(context, &reporter, &units, &buckets) {
            Ok(summary) => {
                reporter.success(summary.total());
                items.iter().cloned().collect()
            }
            Err(aborted) => {
                tracing::error!(
                    error = ?aborted.error,
                    completed = aborted.completed.len(),
                    "enhancer run aborted"
                );
                reporter.aborted(&aborted.completed, &aborted.error);
                Vec::new()
            }
        }
    }

    /// Discovery followed by invocation, as one build pass.
    pub fn execute(&self, context: &dyn BuildContext) -> Result<BuildOutcome, DiscoveryError> {
        let items = self.processing_items(context)?;
        if items.is_empty() {
            return Ok(BuildOutcome::default());
        }
        let processed = self.process(context, &items);
        Ok(BuildOutcome {
            discovered: items.len(),
            processed,
        })
    }
}

/// Unrestricted discovery over a whole project, for configuration listings.
pub struct EnhancerService<'a> {
    config: &'a EnhancerConfig,
    collaborators: Collaborators<'a>,
}

impl<'a> EnhancerService<'a> {
    pub fn new(config: &'a EnhancerConfig, collaborators: Collaborators<'a>) -> Self {
        Self {
            config,
            collaborators,
        }
    }

    fn locator(&self, project: &'a Project) -> MetadataLocator<'a> {
        MetadataLocator::new(
            self.config,
            self.collaborators.parser,
            self.collaborators.annotations,
            self.collaborators.index,
        )
        .with_project_root(project.root())
    }

    pub fn metadata_files(&self, project: &'a Project) -> Result<UnitRecords, DiscoveryError> {
        let units: Vec<_> = project.units().cloned().collect();
        self.locator(project).descriptor_records(&units)
    }

    pub fn annotated_class_files(
        &self,
        project: &'a Project,
    ) -> Result<UnitRecords, DiscoveryError> {
        let units: Vec<_> = project.units().cloned().collect();
        self.locator(project).annotated_records(&units, DiscoveryScope::Full)
    }
}
