// SPDX-FileCopyrightText: 2026 Ambry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Proposal generation from scored candidates.
//!
//! Titles, rationales, and artifact bodies are templated deterministically
//! from candidate attributes. The daemon never calls a model: `proposed_content`
//! is a prompt-ready artifact body, not a completion.

use ambry_core::time;

use crate::models::{
    HeuristicId, PatternCandidate, Proposal, ProposalStatus, ProposalType,
};

/// Map a heuristic to the artifact type its proposals produce.
///
/// A new module that looks like a service entry updates the project graph
/// instead of getting a template.
pub fn proposal_type_for(candidate: &PatternCandidate) -> ProposalType {
    match candidate.heuristic_id {
        HeuristicId::H1 | HeuristicId::H3 | HeuristicId::H4 | HeuristicId::H5 => {
            ProposalType::Rule
        }
        HeuristicId::H2 => ProposalType::Adr,
        HeuristicId::H6 => ProposalType::Skill,
        HeuristicId::H7 => {
            if is_service_module(candidate) {
                ProposalType::ProjectGraph
            } else {
                ProposalType::Template
            }
        }
    }
}

fn is_service_module(candidate: &PatternCandidate) -> bool {
    candidate
        .raw_evidence
        .get("directory")
        .and_then(|d| d.as_str())
        .is_some_and(|dir| {
            let lower = dir.to_lowercase();
            lower.contains("service") || lower.starts_with("svc")
        })
}

fn title_prefix(candidate: &PatternCandidate) -> &'static str {
    match candidate.heuristic_id {
        HeuristicId::H1 | HeuristicId::H3 => "Add rule",
        HeuristicId::H2 => "Record decision",
        HeuristicId::H4 => "Add security rule",
        HeuristicId::H5 => "Add performance rule",
        HeuristicId::H6 => "Add skill",
        HeuristicId::H7 => "Add template",
    }
}

/// Deterministic proposal title.
pub fn proposal_title(candidate: &PatternCandidate) -> String {
    let prefix = if proposal_type_for(candidate) == ProposalType::ProjectGraph {
        "Update project graph"
    } else {
        title_prefix(candidate)
    };
    let mut description = candidate.description.clone();
    if description.len() > 50 {
        let mut cut = 47;
        while !description.is_char_boundary(cut) {
            cut -= 1;
        }
        description.truncate(cut);
        description.push_str("...");
    }
    format!("{prefix}: {description}")
}

/// Deterministic rationale from candidate attributes.
pub fn proposal_rationale(candidate: &PatternCandidate) -> String {
    format!(
        "{} occurrence(s) across {} file(s); confidence {:.2}. {}",
        candidate.occurrence_count,
        candidate.distinct_files,
        candidate.confidence,
        candidate.description,
    )
}

/// Full artifact body with its frontmatter block.
pub fn proposal_content(candidate: &PatternCandidate, proposal_id: &str, title: &str) -> String {
    let proposal_type = proposal_type_for(candidate);
    if proposal_type == ProposalType::ProjectGraph {
        return project_graph_content(candidate);
    }

    let slug = crate::artifacts::slug_from_title(title);
    let tags = format!(
        "[learning, {}, {}]",
        candidate.heuristic_id.to_string().to_lowercase(),
        proposal_type,
    );
    let locations: String = candidate
        .locations
        .iter()
        .take(10)
        .map(|l| match l.line_start {
            Some(line) => format!("- `{}:{line}`\n", l.file),
            None => format!("- `{}`\n", l.file),
        })
        .collect();

    let body = match proposal_type {
        ProposalType::Rule => format!(
            "## Observed pattern\n\n{}\n\n## Where\n\n{locations}\n## Guidance\n\n\
             1. Is this a genuine, intentional pattern that should be codified?\n\
             2. What rule formalizes it, and what are the exceptions?\n\
             3. Which of the locations above should be updated to follow it?\n",
            candidate.description,
        ),
        ProposalType::Adr => format!(
            "## Status\n\nProposed (generated from repository history)\n\n\
             ## Context\n\n{}\n\n## Decision\n\nAdopt the majority pattern and bring the \
             outliers in line:\n\n{locations}\n## Consequences\n\nPeers stay consistent; \
             new files in this area follow the standard from day one.\n",
            candidate.description,
        ),
        ProposalType::Skill => format!(
            "## When to use\n\n{}\n\n## Instructions\n\nAdd a sibling test alongside each \
             of these files before the next change lands:\n\n{locations}",
            candidate.description,
        ),
        ProposalType::Template => format!(
            "## Purpose\n\n{}\n\n## Checklist\n\n- Add a descriptor file (README.md) \
             naming the module's purpose\n- Link it from the project overview\n\n\
             ## Affected\n\n{locations}",
            candidate.description,
        ),
        ProposalType::ProjectGraph => unreachable!(),
    };

    format!(
        "---\nname: {slug}\ndescription: {}\ntags: {tags}\nsource: learning\n\
         proposal_id: {proposal_id}\nfingerprint: {}\n---\n\n# {title}\n\n{body}",
        candidate.description.replace('\n', " "),
        candidate.fingerprint,
    )
}

fn project_graph_content(candidate: &PatternCandidate) -> String {
    let directory = candidate
        .raw_evidence
        .get("directory")
        .and_then(|d| d.as_str())
        .unwrap_or("unknown");
    serde_json::to_string_pretty(&serde_json::json!({
        "services": {
            directory: {
                "path": format!("{directory}/"),
                "discovered": "learning",
                "fingerprint": candidate.fingerprint,
            }
        }
    }))
    .unwrap_or_else(|_| "{}".to_string())
}

/// Generate at most `max_proposals` proposals from scored candidates.
///
/// Candidates below `min_confidence`, already proposed, or duplicated within
/// the batch are skipped.
pub fn generate(
    candidates: &[PatternCandidate],
    min_confidence: f64,
    max_proposals: usize,
    session_id: Option<&str>,
) -> Vec<Proposal> {
    let mut proposals = Vec::new();
    let mut seen = std::collections::HashSet::new();

    for candidate in candidates {
        if proposals.len() >= max_proposals {
            break;
        }
        if candidate.confidence < min_confidence {
            continue;
        }
        if candidate.status != crate::models::CandidateStatus::New {
            continue;
        }
        if !seen.insert(candidate.fingerprint.clone()) {
            continue;
        }

        let proposal_id = uuid::Uuid::new_v4().to_string();
        let title = proposal_title(candidate);
        proposals.push(Proposal {
            proposal_id: proposal_id.clone(),
            candidate_fingerprint: candidate.fingerprint.clone(),
            proposal_type: proposal_type_for(candidate),
            title: title.clone(),
            rationale: proposal_rationale(candidate),
            proposed_content: proposal_content(candidate, &proposal_id, &title),
            confidence: candidate.confidence,
            status: ProposalStatus::Pending,
            created_at: time::now_iso(),
            decided_at: None,
            decision: None,
            edited_content: None,
            session_id: session_id.map(String::from),
        });
    }
    proposals
}
