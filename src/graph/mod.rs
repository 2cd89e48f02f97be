//! Core data model: records, classifications, taxonomy nodes and edges
//!
//! The taxonomy is kept flat: nodes are addressed by stable identifiers and
//! the category hierarchy is just another edge collection.

mod classification;
mod edge;
mod node;
mod record;

pub use classification::Classification;
pub use edge::{Edge, EdgeCollection, VertexId};
pub use node::{NodeCollection, NodeId, TaxonomyNode};
pub use record::{IndexingStatus, Record, RecordId};

/// Any collection a transaction can be scoped to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Collection {
    Records,
    Nodes(NodeCollection),
    Edges(EdgeCollection),
}

impl Collection {
    /// Every collection, in the global lock order
    pub fn all() -> Vec<Collection> {
        let mut all = vec![Collection::Records];
        all.extend(NodeCollection::ALL.into_iter().map(Collection::Nodes));
        all.extend(EdgeCollection::ALL.into_iter().map(Collection::Edges));
        all
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Records => "records",
            Self::Nodes(c) => c.as_str(),
            Self::Edges(c) => c.as_str(),
        }
    }
}

impl From<NodeCollection> for Collection {
    fn from(c: NodeCollection) -> Self {
        Self::Nodes(c)
    }
}

impl From<EdgeCollection> for Collection {
    fn from(c: EdgeCollection) -> Self {
        Self::Edges(c)
    }
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
