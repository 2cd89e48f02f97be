//! Reconciliation outcome and edge diff planning

use crate::graph::{RecordId, VertexId};
use std::collections::BTreeSet;

/// What one reconciliation wrote
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    pub record_id: RecordId,
    pub nodes_created: usize,
    pub edges_created: usize,
    pub edges_deleted: usize,
    pub hierarchy_edges_created: usize,
    /// Department names with no matching node; their edges were skipped
    pub unresolved_departments: Vec<String>,
}

impl ReconcileReport {
    pub fn new(record_id: RecordId) -> Self {
        Self {
            record_id,
            nodes_created: 0,
            edges_created: 0,
            edges_deleted: 0,
            hierarchy_edges_created: 0,
            unresolved_departments: Vec::new(),
        }
    }

    /// Node and edge writes, excluding the record status upsert
    pub fn graph_writes(&self) -> usize {
        self.nodes_created + self.edges_created + self.edges_deleted + self.hierarchy_edges_created
    }
}

/// Edge targets to create and delete for one `(record, edge collection)`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EdgeDiff {
    /// `desired \ existing`
    pub create: Vec<VertexId>,
    /// `existing \ desired`
    pub delete: Vec<VertexId>,
}

impl EdgeDiff {
    pub fn plan(existing: &BTreeSet<VertexId>, desired: &BTreeSet<VertexId>) -> Self {
        Self {
            create: desired.difference(existing).cloned().collect(),
            delete: existing.difference(desired).cloned().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.create.is_empty() && self.delete.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(ids: &[&str]) -> BTreeSet<VertexId> {
        ids.iter().map(|id| VertexId::from_string(*id)).collect()
    }

    #[test]
    fn equal_sets_produce_empty_diff() {
        let diff = EdgeDiff::plan(&set(&["topics/a", "topics/b"]), &set(&["topics/b", "topics/a"]));
        assert!(diff.is_empty());
    }

    #[test]
    fn diff_splits_additions_and_removals() {
        let diff = EdgeDiff::plan(&set(&["topics/a", "topics/b"]), &set(&["topics/b", "topics/c"]));
        assert_eq!(diff.create, vec![VertexId::from_string("topics/c")]);
        assert_eq!(diff.delete, vec![VertexId::from_string("topics/a")]);
    }

    #[test]
    fn empty_desired_deletes_everything() {
        let diff = EdgeDiff::plan(&set(&["departments/legal", "departments/finance"]), &BTreeSet::new());
        assert!(diff.create.is_empty());
        assert_eq!(diff.delete.len(), 2);
    }

    #[test]
    fn graph_writes_excludes_unresolved_names() {
        let mut report = ReconcileReport::new(RecordId::from("r1"));
        report.unresolved_departments.push("Ghost".into());
        assert_eq!(report.graph_writes(), 0);
        report.edges_created = 2;
        report.hierarchy_edges_created = 1;
        assert_eq!(report.graph_writes(), 3);
    }
}
