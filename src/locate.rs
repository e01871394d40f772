//! Discovery of descriptor files and annotated classes per build unit.
//!
//! Both sources are read under the index read scope. Descriptor parsing is
//! strict: a malformed descriptor fails the whole pass.
use anyhow::Result;
use indexmap::{IndexMap, IndexSet};
use parking_lot::{RwLock, RwLockReadGuard};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::EnhancerConfig;
use crate::error::DiscoveryError;
use crate::project::BuildUnit;
use crate::record::{class_file_rel_path, MetadataRecord};

/// Records found per unit, in build order.
pub type UnitRecords = IndexMap<String, Vec<Arc<MetadataRecord>>>;

/// Extracts qualified class names from a descriptor file.
pub trait DescriptorParser {
    fn parse(&self, path: &Path) -> Result<IndexSet<String>>;
}

/// A class found by an annotation query. Anonymous and local classes carry
/// no qualified name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotatedClass {
    pub qualified_name: Option<String>,
}

impl AnnotatedClass {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            qualified_name: Some(name.into()),
        }
    }
}

/// Finds source classes carrying any of the given annotations.
pub trait AnnotationQuery {
    fn find_annotated_classes(
        &self,
        annotations: &[&str],
        unit: &BuildUnit,
        include_tests: bool,
    ) -> Result<Vec<AnnotatedClass>>;
}

/// Read side of the shared project index lock.
pub trait IndexLock {
    fn read_scope(&self) -> IndexReadGuard<'_>;
}

/// Held for the duration of a discovery pass.
pub struct IndexReadGuard<'a> {
    _guard: Option<RwLockReadGuard<'a, ()>>,
}

impl IndexReadGuard<'_> {
    /// A guard that holds nothing, for collaborators without a shared index.
    pub fn unlocked() -> Self {
        Self { _guard: None }
    }
}

/// Index lock backed by a reader/writer lock.
#[derive(Debug, Default)]
pub struct SharedIndexLock {
    lock: RwLock<()>,
}

impl SharedIndexLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exclusive access for index mutation.
    pub fn write(&self) -> parking_lot::RwLockWriteGuard<'_, ()> {
        self.lock.write()
    }
}

impl IndexLock for SharedIndexLock {
    fn read_scope(&self) -> IndexReadGuard<'_> {
        IndexReadGuard {
            _guard: Some(self.lock.read()),
        }
    }
}

/// Which classes an annotation scan may return.
#[derive(Debug, Clone, Copy)]
pub enum DiscoveryScope<'a> {
    /// Every annotated class of every enabled unit.
    Full,
    /// Only classes whose qualified name is in the set.
    Restricted(&'a IndexSet<String>),
}

/// Locates persistence metadata for a set of build units.
pub struct MetadataLocator<'a> {
    config: &'a EnhancerConfig,
    parser: &'a dyn DescriptorParser,
    annotations: &'a dyn AnnotationQuery,
    index: &'a dyn IndexLock,
    project_root: Option<&'a Path>,
}

impl<'a> MetadataLocator<'a> {
    pub fn new(
        config: &'a EnhancerConfig,
        parser: &'a dyn DescriptorParser,
        annotations: &'a dyn AnnotationQuery,
        index: &'a dyn IndexLock,
    ) -> Self {
        Self {
            config,
            parser,
            annotations,
            index,
            project_root: None,
        }
    }

    /// Project root used to shorten display paths.
    pub fn with_project_root(mut self, root: &'a Path) -> Self {
        self.project_root = Some(root);
        self
    }

    /// Descriptor-based records per enabled unit.
    pub fn descriptor_records(
        &self,
        units: &[Arc<BuildUnit>],
    ) -> Result<UnitRecords, DiscoveryError> {
        let mut found = UnitRecords::new();
        if !self.config.enabled {
            return Ok(found);
        }
        let extensions = self.config.normalized_extensions();
        if extensions.is_empty() {
            return Ok(found);
        }

        let _scope = self.index.read_scope();
        for unit in units.iter().filter(|u| self.config.is_unit_enabled(&u.name)) {
            let mut unit_records: Vec<Arc<MetadataRecord>> = Vec::new();
            for output_dir in unit.output_dirs(self.config.include_test_outputs) {
                if !output_dir.is_dir() {
                    continue;
                }
                for extension in &extensions {
                    for descriptor in find_files_by_extension(output_dir, extension)? {
                        let record = self.descriptor_record(unit, output_dir, descriptor)?;
                        let Some(record) = record else {
                            continue;
                        };
                        if unit_records.iter().any(|r| r.same_artifact(&record)) {
                            continue;
                        }
                        unit_records.push(Arc::new(record));
                    }
                }
            }
            if !unit_records.is_empty() {
                tracing::debug!(
                    unit = %unit.name,
                    count = unit_records.len(),
                    "descriptor records"
                );
                found.insert(unit.name.clone(), unit_records);
            }
        }
        Ok(found)
    }

    fn descriptor_record(
        &self,
        unit: &Arc<BuildUnit>,
        output_dir: &Path,
        descriptor: PathBuf,
    ) -> Result<Option<MetadataRecord>, DiscoveryError> {
        let class_names =
            self.parser
                .parse(&descriptor)
                .map_err(|source| DiscoveryError::DescriptorParse {
                    path: descriptor.clone(),
                    source,
                })?;
        let class_files = class_names
            .iter()
            .map(|name| {
                let candidate = output_dir.join(class_file_rel_path(name));
                candidate.is_file().then_some(candidate)
            })
            .collect();
        Ok(MetadataRecord::descriptor(
            Arc::clone(unit),
            descriptor,
            class_names,
            class_files,
            self.project_root,
        ))
    }

    /// Annotation-based records per enabled unit.
    pub fn annotated_records(
        &self,
        units: &[Arc<BuildUnit>],
        scope: DiscoveryScope<'_>,
    ) -> Result<UnitRecords, DiscoveryError> {
        let mut found = UnitRecords::new();
        if !self.config.enabled {
            return Ok(found);
        }
        let annotation_names = self.config.api.annotation_names();
        if annotation_names.is_empty() {
            return Ok(found);
        }

        let _scope = self.index.read_scope();
        for unit in units.iter().filter(|u| self.config.is_unit_enabled(&u.name)) {
            let classes = self
                .annotations
                .find_annotated_classes(annotation_names, unit, self.config.include_test_outputs)
                .map_err(|source| DiscoveryError::AnnotationQuery {
                    unit: unit.name.clone(),
                    source,
                })?;
            if classes.is_empty() {
                continue;
            }

            let mut unit_records = Vec::new();
            for output_dir in unit.output_dirs(self.config.include_test_outputs) {
                for class in &classes {
                    let Some(name) = class.qualified_name.as_deref() else {
                        continue;
                    };
                    if let DiscoveryScope::Restricted(allowed) = scope {
                        if !allowed.contains(name) {
                            continue;
                        }
                    }
                    let class_file = output_dir.join(class_file_rel_path(name));
                    if !class_file.is_file() {
                        continue;
                    }
                    unit_records.push(Arc::new(MetadataRecord::annotated_class(
                        Arc::clone(unit),
                        name.to_string(),
                        class_file,
                        self.project_root,
                    )));
                }
            }
            if !unit_records.is_empty() {
                tracing::debug!(unit = %unit.name, count = unit_records.len(), "annotated records");
                found.insert(unit.name.clone(), unit_records);
            }
        }
        Ok(found)
    }
}

/// Recursively collect files under `root` whose extension matches, sorted
/// for a stable discovery order.
pub fn find_files_by_extension(
    root: &Path,
    extension: &str,
) -> Result<Vec<PathBuf>, DiscoveryError> {
    let mut found = Vec::new();
    collect_by_extension(root, extension, &mut found)?;
    found.sort();
    Ok(found)
}

fn collect_by_extension(
    dir: &Path,
    extension: &str,
    found: &mut Vec<PathBuf>,
) -> Result<(), DiscoveryError> {
    let io_err = |source| DiscoveryError::Io {
        path: dir.to_path_buf(),
        source,
    };
    for entry in fs::read_dir(dir).map_err(io_err)? {
        let entry = entry.map_err(io_err)?;
        let file_type = entry.file_type().map_err(io_err)?;
        let path = entry.path();
        if file_type.is_dir() {
            collect_by_extension(&path, extension, found)?;
        } else if path
            .extension()
            .is_some_and(|ext| ext.to_string_lossy().eq_ignore_ascii_case(extension))
        {
            found.push(path);
        }
    }
    Ok(())
}
