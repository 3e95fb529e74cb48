use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use indexmap::IndexMap;
use std::fmt;

/// Attributes stored on a graph edge (relation type, evidence, claims...)
pub type EdgeAttributes = serde_json::Map<String, serde_json::Value>;

/// Identifier of a detected community.
///
/// Detectors hand out either integers or strings, so the id is kept as text.
/// Numeric ids order numerically and sort before non-numeric ones.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommunityId(String);

impl CommunityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn numeric(&self) -> Option<u64> {
        self.0.parse().ok()
    }
}

impl Ord for CommunityId {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.numeric(), other.numeric()) {
            (Some(a), Some(b)) => a.cmp(&b).then_with(|| self.0.cmp(&other.0)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => self.0.cmp(&other.0),
        }
    }
}

impl PartialOrd for CommunityId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for CommunityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<u64> for CommunityId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

impl From<usize> for CommunityId {
    fn from(id: usize) -> Self {
        Self(id.to_string())
    }
}

impl From<&str> for CommunityId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for CommunityId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// One entity of a community together with its outgoing relations and claims,
/// keyed by neighbor in graph adjacency order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub entity: String,
    #[serde(rename = "relations-claims", default)]
    pub relations_claims: IndexMap<String, EdgeAttributes>,
}

impl EntityRecord {
    pub fn new(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            relations_claims: IndexMap::new(),
        }
    }

    pub fn with_relation(mut self, neighbor: impl Into<String>, attributes: EdgeAttributes) -> Self {
        self.relations_claims.insert(neighbor.into(), attributes);
        self
    }

    /// Text form sent to the tokenizer and embedded into prompts
    pub fn to_text(&self) -> String {
        // Map keys are strings and values are JSON already, serialization cannot fail
        serde_json::to_string(self).unwrap_or_else(|_| self.entity.clone())
    }
}

/// A contiguous run of community records sized for a single request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub records: Vec<EntityRecord>,
    pub token_count: usize,
}

impl Chunk {
    pub(crate) fn new() -> Self {
        Self {
            records: Vec::new(),
            token_count: 0,
        }
    }

    pub(crate) fn push(&mut self, record: EntityRecord, tokens: usize) {
        self.records.push(record);
        self.token_count += tokens;
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records rendered one per line for prompt building
    pub fn to_text(&self) -> String {
        self.records
            .iter()
            .map(EntityRecord::to_text)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Concatenate chunks back into the ordered record sequence they were cut from
pub fn flatten(chunks: &[Chunk]) -> Vec<EntityRecord> {
    chunks
        .iter()
        .flat_map(|chunk| chunk.records.iter().cloned())
        .collect()
}
