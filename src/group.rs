//! Classification of discovered records into processing items and per-unit
//! execution buckets.
use indexmap::{IndexMap, IndexSet};
use std::sync::Arc;

use crate::locate::UnitRecords;
use crate::record::{to_processing_items, MetadataRecord, ProcessingItem};

/// Flatten both record maps into processing items, descriptor records first.
///
/// Items are keyed by artifact; when two records yield the same artifact the
/// first one inserted keeps ownership.
pub fn processing_items(
    descriptors: &UnitRecords,
    annotated: &UnitRecords,
) -> IndexSet<ProcessingItem> {
    let mut items = IndexSet::new();
    for records in descriptors.values().chain(annotated.values()) {
        for record in records {
            items.extend(to_processing_items(record));
        }
    }
    items
}

/// Records to submit to the enhancer, split by source kind per unit.
#[derive(Debug, Clone, Default)]
pub struct ExecutionBuckets {
    pub descriptors: UnitRecords,
    pub annotated: UnitRecords,
}

impl ExecutionBuckets {
    /// Group processing items back into their owning records.
    ///
    /// Descriptor records are deduplicated by artifact within each unit since
    /// a descriptor yields one item per class it names.
    pub fn from_items<'a>(items: impl IntoIterator<Item = &'a ProcessingItem>) -> Self {
        let mut buckets = Self::default();
        for item in items {
            let record = item.record();
            let unit = record.unit().name.clone();
            match record.as_ref() {
                MetadataRecord::Annotation(_) => {
                    buckets
                        .annotated
                        .entry(unit)
                        .or_default()
                        .push(Arc::clone(record));
                }
                MetadataRecord::Descriptor(_) => {
                    let list = buckets.descriptors.entry(unit).or_default();
                    if !list.iter().any(|existing| existing.same_artifact(record)) {
                        list.push(Arc::clone(record));
                    }
                }
            }
        }
        buckets
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.values().all(Vec::is_empty) && self.annotated.values().all(Vec::is_empty)
    }

    /// True when `unit` has records of either kind.
    pub fn has_unit(&self, unit: &str) -> bool {
        self.descriptors.get(unit).is_some_and(|r| !r.is_empty())
            || self.annotated.get(unit).is_some_and(|r| !r.is_empty())
    }

    pub fn descriptors_for(&self, unit: &str) -> &[Arc<MetadataRecord>] {
        self.descriptors.get(unit).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn annotated_for(&self, unit: &str) -> &[Arc<MetadataRecord>] {
        self.annotated.get(unit).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Unit names with records, in first-seen order.
    pub fn unit_names(&self) -> IndexSet<&str> {
        self.descriptors
            .keys()
            .chain(self.annotated.keys())
            .map(String::as_str)
            .filter(|unit| self.has_unit(unit))
            .collect()
    }
}

/// Record counts per unit, for listings and logs.
pub fn record_counts(buckets: &ExecutionBuckets) -> IndexMap<String, (usize, usize)> {
    buckets
        .unit_names()
        .into_iter()
        .map(|unit| {
            (
                unit.to_string(),
                (
                    buckets.descriptors_for(unit).len(),
                    buckets.annotated_for(unit).len(),
                ),
            )
        })
        .collect()
}
