use crate::report::CommunityReport;

const REPORT_SCHEMA: &str = r#"{
  "title": "short name of the community",
  "summary": "executive summary of the community's structure and key entities",
  "rating": 0.0,
  "rating_explanation": "one sentence explaining the impact rating (0-10)",
  "findings": [
    {"summary": "insight headline", "explanation": "grounded explanation"}
  ]
}"#;

pub fn build_community_report_prompt(community_data: &str) -> String {
    format!(
        r#"You are analyzing a community of related entities from a knowledge graph.
Each line below is one entity with its relations and claims, as JSON.

INSTRUCTIONS:
1. Describe the main theme of this community
2. Name the key entities and their roles
3. Report important relationships, claims and patterns as findings
4. Rate the community's overall impact from 0 to 10
5. Output ONLY valid JSON matching the schema, nothing else

SCHEMA:
{}

COMMUNITY DATA:
{}

JSON OUTPUT:"#,
        REPORT_SCHEMA, community_data
    )
}

/// Prompt merging partial reports written for separate parts of one community
pub fn build_combine_prompt(reports: &[CommunityReport]) -> String {
    let partials = reports
        .iter()
        .enumerate()
        .map(|(i, report)| {
            let json = serde_json::to_string_pretty(report).unwrap_or_else(|_| report.summary.clone());
            format!("PART {}:\n{}", i + 1, json)
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        r#"The following reports each describe one part of the same community of entities.
Combine them into a single report covering the whole community.

INSTRUCTIONS:
- Merge overlapping findings, keep distinct ones
- Write one summary and one title for the whole community
- Re-assess the impact rating for the combined community
- Output ONLY valid JSON matching the schema, nothing else

SCHEMA:
{}

PARTIAL REPORTS:
{}

JSON OUTPUT:"#,
        REPORT_SCHEMA, partials
    )
}

pub fn build_retry_prompt(invalid_json: &str) -> String {
    format!(
        r#"The following JSON is invalid or does not match the schema:

{}

SCHEMA:
{}

Fix this JSON. Output only valid JSON with no markdown formatting, no code blocks, no explanations. Just the raw JSON object."#,
        invalid_json, REPORT_SCHEMA
    )
}
