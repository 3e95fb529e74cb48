use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::{info, warn};

use crate::record::{CommunityId, EdgeAttributes, EntityRecord};

/// Undirected entity graph with attributed edges, in entity insertion order.
#[derive(Debug, Clone, Default)]
pub struct EntityGraph {
    pub entities: Vec<String>,
    pub entity_to_idx: HashMap<String, usize>,
    neighbors: Vec<IndexMap<usize, EdgeAttributes>>,
}

/// An edge as stored in graph export files
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub source: String,
    pub target: String,
    #[serde(flatten)]
    pub attributes: EdgeAttributes,
}

impl EntityGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_edges(edges: impl IntoIterator<Item = EdgeRecord>) -> Self {
        let mut graph = Self::new();
        for edge in edges {
            let source = graph.add_entity(edge.source);
            let target = graph.add_entity(edge.target);
            graph.add_edge(source, target, edge.attributes);
        }
        graph
    }

    pub fn add_entity(&mut self, entity_id: String) -> usize {
        if let Some(&idx) = self.entity_to_idx.get(&entity_id) {
            return idx;
        }

        let idx = self.entities.len();
        self.entities.push(entity_id.clone());
        self.entity_to_idx.insert(entity_id, idx);
        self.neighbors.push(IndexMap::new());
        idx
    }

    /// A repeated edge replaces the attributes of the earlier one and keeps its position
    pub fn add_edge(&mut self, source: usize, target: usize, attributes: EdgeAttributes) {
        self.neighbors[source].insert(target, attributes.clone());
        self.neighbors[target].insert(source, attributes);
    }

    pub fn edge_count(&self) -> usize {
        let endpoints: usize = self.neighbors.iter().map(IndexMap::len).sum();
        let self_loops = self
            .neighbors
            .iter()
            .enumerate()
            .filter(|(idx, adj)| adj.contains_key(idx))
            .count();
        (endpoints + self_loops) / 2
    }

    /// The entity with its relations and claims, neighbors in the order their edges were added
    pub fn record(&self, entity_id: &str) -> Option<EntityRecord> {
        let idx = *self.entity_to_idx.get(entity_id)?;
        let relations_claims = self.neighbors[idx]
            .iter()
            .map(|(&neighbor, attributes)| (self.entities[neighbor].clone(), attributes.clone()))
            .collect();

        Some(EntityRecord {
            entity: entity_id.to_string(),
            relations_claims,
        })
    }
}

/// Collect the records of every community from an entity → community
/// assignment. Records follow the assignment order; entities missing from
/// the graph are skipped.
pub fn group_by_community<I>(graph: &EntityGraph, membership: I) -> BTreeMap<CommunityId, Vec<EntityRecord>>
where
    I: IntoIterator<Item = (String, CommunityId)>,
{
    let mut communities: BTreeMap<CommunityId, Vec<EntityRecord>> = BTreeMap::new();
    let mut missing = 0;

    for (entity_id, community_id) in membership {
        match graph.record(&entity_id) {
            Some(record) => communities.entry(community_id).or_default().push(record),
            None => {
                missing += 1;
                warn!(entity = %entity_id, community_id = %community_id, "Entity not in graph");
            }
        }
    }

    info!(
        communities = communities.len(),
        entities = graph.entities.len(),
        missing,
        "Grouped community data"
    );

    communities
}
