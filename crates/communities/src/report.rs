use serde::{Deserialize, Serialize};

use crate::record::{CommunityId, EntityRecord};

/// Structured report produced by the generation service for a community
/// (or for one chunk of it before combination).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommunityReport {
    /// Stamped by the summarizer once the report is final
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub community_id: Option<CommunityId>,
    pub title: String,
    pub summary: String,
    #[serde(default)]
    pub rating: f32,
    #[serde(default)]
    pub rating_explanation: String,
    #[serde(default)]
    pub findings: Vec<Finding>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub summary: String,
    #[serde(default)]
    pub explanation: String,
}

impl CommunityReport {
    pub fn stamp(&mut self, community_id: &CommunityId) {
        self.community_id = Some(community_id.clone());
    }
}

/// Final output for a successfully summarized community.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommunityResult {
    pub community_id: CommunityId,
    /// Every record that went into the report, in input order
    pub data: Vec<EntityRecord>,
    pub report: CommunityReport,
}
