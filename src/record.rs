//! Persistence metadata records and the processing items derived from them.
//!
//! A record is either descriptor-based (an external file naming many classes)
//! or annotation-based (exactly one annotated class). Processing items are the
//! individual artifacts whose validity a build has to check.
use indexmap::IndexSet;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::display::{DisplayPath, DisplayPathResolver};
use crate::project::BuildUnit;

/// Compiled artifact extension for a qualified class name.
pub const CLASS_FILE_EXTENSION: &str = "class";

/// Convert `com.acme.Foo` into `com/acme/Foo.class`.
pub fn class_file_rel_path(qualified_name: &str) -> PathBuf {
    let mut rel: PathBuf = qualified_name.split('.').collect();
    rel.set_extension(CLASS_FILE_EXTENSION);
    rel
}

/// Metadata read from a descriptor file.
#[derive(Debug, Clone)]
pub struct DescriptorRecord {
    unit: Arc<BuildUnit>,
    location: PathBuf,
    class_names: IndexSet<String>,
    /// One entry per class name, `None` when the compiled class is missing.
    class_files: Vec<Option<PathBuf>>,
    display: DisplayPath,
}

/// Metadata for a single annotated class.
#[derive(Debug, Clone)]
pub struct AnnotatedClassRecord {
    unit: Arc<BuildUnit>,
    location: PathBuf,
    class_name: String,
    class_file: Option<PathBuf>,
    display: DisplayPath,
}

/// One unit of persistence metadata found in a build unit.
#[derive(Debug, Clone)]
pub enum MetadataRecord {
    Descriptor(DescriptorRecord),
    Annotation(AnnotatedClassRecord),
}

impl MetadataRecord {
    /// Build a descriptor record. Returns `None` for an empty class set, which
    /// is not valid metadata.
    ///
    /// `class_files` must follow the iteration order of `class_names`.
    pub fn descriptor(
        unit: Arc<BuildUnit>,
        location: PathBuf,
        class_names: IndexSet<String>,
        class_files: Vec<Option<PathBuf>>,
        project_root: Option<&Path>,
    ) -> Option<Self> {
        if class_names.is_empty() {
            return None;
        }
        debug_assert_eq!(class_names.len(), class_files.len());
        let display = display_for(&unit, &location, project_root);
        Some(MetadataRecord::Descriptor(DescriptorRecord {
            unit,
            location,
            class_names,
            class_files,
            display,
        }))
    }

    /// Build an annotation record for one class.
    pub fn annotated_class(
        unit: Arc<BuildUnit>,
        class_name: String,
        class_file: PathBuf,
        project_root: Option<&Path>,
    ) -> Self {
        let display = display_for(&unit, &class_file, project_root);
        MetadataRecord::Annotation(AnnotatedClassRecord {
            unit,
            location: class_file.clone(),
            class_name,
            class_file: Some(class_file),
            display,
        })
    }

    pub fn unit(&self) -> &Arc<BuildUnit> {
        match self {
            MetadataRecord::Descriptor(record) => &record.unit,
            MetadataRecord::Annotation(record) => &record.unit,
        }
    }

    /// Descriptor file or annotated class artifact this record came from.
    pub fn location(&self) -> &Path {
        match self {
            MetadataRecord::Descriptor(record) => &record.location,
            MetadataRecord::Annotation(record) => &record.location,
        }
    }

    pub fn is_descriptor_based(&self) -> bool {
        matches!(self, MetadataRecord::Descriptor(_))
    }

    pub fn class_names(&self) -> Vec<&str> {
        match self {
            MetadataRecord::Descriptor(record) => {
                record.class_names.iter().map(String::as_str).collect()
            }
            MetadataRecord::Annotation(record) => vec![record.class_name.as_str()],
        }
    }

    /// Compiled class artifacts, `None` where the artifact was not found.
    pub fn class_files(&self) -> Vec<Option<&Path>> {
        match self {
            MetadataRecord::Descriptor(record) => {
                record.class_files.iter().map(Option::as_deref).collect()
            }
            MetadataRecord::Annotation(record) => vec![record.class_file.as_deref()],
        }
    }

    pub fn display(&self) -> &DisplayPath {
        match self {
            MetadataRecord::Descriptor(record) => &record.display,
            MetadataRecord::Annotation(record) => &record.display,
        }
    }

    pub fn display_filename(&self) -> &str {
        &self.display().filename
    }

    pub fn display_path(&self) -> &str {
        &self.display().path
    }

    /// True when both records point at the same artifact.
    pub fn same_artifact(&self, other: &MetadataRecord) -> bool {
        self.is_descriptor_based() == other.is_descriptor_based()
            && self.location() == other.location()
    }
}

fn display_for(unit: &BuildUnit, location: &Path, project_root: Option<&Path>) -> DisplayPath {
    DisplayPathResolver::new(unit.content_roots.iter().map(PathBuf::as_path), project_root)
        .resolve(location)
}

/// An artifact that needs a validity check, tied back to its record.
///
/// Identity is the artifact path alone.
#[derive(Debug, Clone)]
pub struct ProcessingItem {
    artifact: PathBuf,
    record: Arc<MetadataRecord>,
}

impl ProcessingItem {
    pub fn new(artifact: PathBuf, record: Arc<MetadataRecord>) -> Self {
        Self { artifact, record }
    }

    pub fn artifact(&self) -> &Path {
        &self.artifact
    }

    pub fn record(&self) -> &Arc<MetadataRecord> {
        &self.record
    }
}

impl PartialEq for ProcessingItem {
    fn eq(&self, other: &Self) -> bool {
        self.artifact == other.artifact
    }
}

impl Eq for ProcessingItem {}

impl Hash for ProcessingItem {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.artifact.hash(state);
    }
}

/// Expand a record into its processing items: the descriptor itself (for
/// descriptor records) followed by every class artifact that exists.
pub fn to_processing_items(record: &Arc<MetadataRecord>) -> Vec<ProcessingItem> {
    let mut items = Vec::with_capacity(record.class_names().len() + 1);
    if record.is_descriptor_based() {
        items.push(ProcessingItem::new(
            record.location().to_path_buf(),
            Arc::clone(record),
        ));
    }
    for class_file in record.class_files().into_iter().flatten() {
        items.push(ProcessingItem::new(class_file.to_path_buf(), Arc::clone(record)));
    }
    items
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit() -> Arc<BuildUnit> {
        Arc::new(BuildUnit {
            content_roots: vec![PathBuf::from("/proj/core")],
            ..BuildUnit::new("core")
        })
    }

    fn names(names: &[&str]) -> IndexSet<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    #[test]
    fn class_file_rel_path_maps_packages_to_dirs() {
        assert_eq!(
            class_file_rel_path("com.acme.Foo"),
            PathBuf::from("com/acme/Foo.class")
        );
        assert_eq!(class_file_rel_path("Bare"), PathBuf::from("Bare.class"));
    }

    #[test]
    fn empty_descriptor_yields_no_record() {
        let record = MetadataRecord::descriptor(
            unit(),
            PathBuf::from("/proj/core/out/orm.xml"),
            IndexSet::new(),
            Vec::new(),
            None,
        );
        assert!(record.is_none());
    }

    #[test]
    fn descriptor_items_skip_missing_classes() {
        let record = Arc::new(
            MetadataRecord::descriptor(
                unit(),
                PathBuf::from("/proj/core/out/META-INF/orm.xml"),
                names(&["a.A", "a.B", "a.C"]),
                vec![
                    Some(PathBuf::from("/proj/core/out/a/A.class")),
                    None,
                    Some(PathBuf::from("/proj/core/out/a/C.class")),
                ],
                Some(Path::new("/proj")),
            )
            .expect("descriptor record"),
        );
        let items = to_processing_items(&record);
        let artifacts: Vec<_> = items.iter().map(ProcessingItem::artifact).collect();
        assert_eq!(
            artifacts,
            vec![
                Path::new("/proj/core/out/META-INF/orm.xml"),
                Path::new("/proj/core/out/a/A.class"),
                Path::new("/proj/core/out/a/C.class"),
            ]
        );
        assert_eq!(record.display_path(), "out/META-INF");
        assert_eq!(record.display_filename(), "orm.xml");
        assert_eq!(record.class_names()[1], "a.B");
        assert_eq!(record.class_files()[1], None);
    }

    #[test]
    fn annotated_record_has_one_class_and_one_item() {
        let record = Arc::new(MetadataRecord::annotated_class(
            unit(),
            "a.Entity".to_string(),
            PathBuf::from("/proj/core/out/a/Entity.class"),
            None,
        ));
        assert!(!record.is_descriptor_based());
        assert_eq!(record.class_names(), vec!["a.Entity"]);
        assert_eq!(record.class_files().len(), 1);
        assert_eq!(to_processing_items(&record).len(), 1);
    }

    #[test]
    fn items_compare_by_artifact_only() {
        let first = Arc::new(MetadataRecord::annotated_class(
            unit(),
            "a.A".to_string(),
            PathBuf::from("/proj/core/out/a/A.class"),
            None,
        ));
        let second = Arc::new(
            MetadataRecord::descriptor(
                unit(),
                PathBuf::from("/proj/core/out/orm.xml"),
                names(&["a.A"]),
                vec![Some(PathBuf::from("/proj/core/out/a/A.class"))],
                None,
            )
            .expect("descriptor record"),
        );
        let mut items = IndexSet::new();
        items.extend(to_processing_items(&first));
        items.extend(to_processing_items(&second));
        assert_eq!(items.len(), 2);
        let class_item = items
            .iter()
            .find(|item| item.artifact().ends_with("A.class"))
            .expect("class item");
        assert!(!class_item.record().is_descriptor_based(), "first insert wins");
    }
}
