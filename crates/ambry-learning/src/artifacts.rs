// SPDX-FileCopyrightText: 2026 Ambry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Artifact paths and writers for accepted proposals.
//!
//! Every artifact lands via temp-file + atomic rename. The project graph is
//! the one read-modify-write target, so its update runs under an advisory
//! file lock to avoid lost updates between daemon and CLI.

use std::collections::HashSet;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use fs2::FileExt;

use ambry_core::{fsutil, AmbryError};

use crate::models::{Proposal, ProposalType};

/// Convert a proposal title to a filesystem-safe slug.
pub fn slug_from_title(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    for c in title.to_lowercase().chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c);
        } else if c.is_whitespace() || c == '-' || c == '_' {
            if !slug.ends_with('-') {
                slug.push('-');
            }
        }
    }
    let slug = slug.trim_matches('-').to_string();
    if slug.len() > 60 {
        slug[..60].trim_end_matches('-').to_string()
    } else {
        slug
    }
}

/// Canonical artifact destination for a proposal.
pub fn artifact_path(proposal: &Proposal, project_root: &Path) -> PathBuf {
    let slug = slug_from_title(&proposal.title);
    match proposal.proposal_type {
        ProposalType::Rule => project_root
            .join(".claude/rules")
            .join(format!("learning-{slug}.md")),
        ProposalType::Adr => project_root.join("docs/decisions").join(format!("{slug}.md")),
        ProposalType::Template => project_root
            .join(".claude/templates")
            .join(format!("{slug}.md")),
        ProposalType::Skill => project_root.join(".claude/skills").join(&slug).join("prompt.md"),
        ProposalType::ProjectGraph => project_root.join(".ai-framework/project-graph.json"),
    }
}

/// Write an accepted proposal's artifact. Returns the path written.
///
/// `edited_content` substitutes the proposed body when the user amended it.
pub fn write_artifact(
    proposal: &Proposal,
    project_root: &Path,
    edited_content: Option<&str>,
) -> Result<PathBuf, AmbryError> {
    let path = artifact_path(proposal, project_root);
    let content = edited_content.unwrap_or(&proposal.proposed_content);

    if proposal.proposal_type == ProposalType::ProjectGraph {
        merge_project_graph(&path, content)?;
    } else {
        fsutil::atomic_write(&path, content.as_bytes())?;
    }
    Ok(path)
}

/// Read-modify-write of project-graph.json under an advisory lock.
///
/// Top-level keys from the new content win; sibling keys survive.
fn merge_project_graph(path: &Path, new_content: &str) -> Result<(), AmbryError> {
    let parent = path
        .parent()
        .ok_or_else(|| AmbryError::Validation("project graph path has no parent".into()))?;
    std::fs::create_dir_all(parent)?;

    let lock_path = parent.join(".project-graph.lock");
    let lock_file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(&lock_path)?;
    lock_file
        .lock_exclusive()
        .map_err(|e| AmbryError::Conflict(format!("project graph lock: {e}")))?;

    let result = (|| {
        let mut merged: serde_json::Map<String, serde_json::Value> = std::fs::read_to_string(path)
            .ok()
            .and_then(|text| serde_json::from_str(&text).ok())
            .unwrap_or_default();

        let new_data: serde_json::Map<String, serde_json::Value> =
            serde_json::from_str(new_content)?;
        for (key, value) in new_data {
            merge_value(&mut merged, key, value);
        }

        fsutil::atomic_write_json(path, &merged)
    })();

    let _ = fs2::FileExt::unlock(&lock_file);
    result
}

/// Merge one top-level entry; objects merge shallowly, scalars replace.
fn merge_value(
    target: &mut serde_json::Map<String, serde_json::Value>,
    key: String,
    value: serde_json::Value,
) {
    match (target.get_mut(&key), value) {
        (Some(serde_json::Value::Object(existing)), serde_json::Value::Object(incoming)) => {
            for (k, v) in incoming {
                existing.insert(k, v);
            }
        }
        (_, value) => {
            target.insert(key, value);
        }
    }
}

/// Fingerprints carried by existing rule files' frontmatter.
///
/// Candidates whose fingerprint already backs a rule are filtered out of
/// generation; this is the cross-run dedup against accepted artifacts.
pub fn existing_rule_fingerprints(project_root: &Path) -> HashSet<String> {
    let mut fingerprints = HashSet::new();
    let rules_dir = project_root.join(".claude/rules");
    let Ok(entries) = std::fs::read_dir(&rules_dir) else {
        return fingerprints;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().is_none_or(|e| e != "md") {
            continue;
        }
        let Ok(content) = std::fs::read_to_string(&path) else {
            continue;
        };
        if let Some(fingerprint) = frontmatter_field(&content, "fingerprint") {
            fingerprints.insert(fingerprint);
        }
    }
    fingerprints
}

/// Extract one `key: value` field from a leading frontmatter block.
pub fn frontmatter_field(content: &str, key: &str) -> Option<String> {
    let rest = content.strip_prefix("---\n")?;
    let (frontmatter, _) = rest.split_once("\n---")?;
    for line in frontmatter.lines() {
        if let Some((k, v)) = line.split_once(':') {
            if k.trim() == key {
                return Some(v.trim().to_string());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ProposalStatus;
    use tempfile::tempdir;

    fn proposal(proposal_type: ProposalType, title: &str, content: &str) -> Proposal {
        Proposal {
            proposal_id: "p1".into(),
            candidate_fingerprint: "fp".into(),
            proposal_type,
            title: title.into(),
            rationale: "because".into(),
            proposed_content: content.into(),
            confidence: 0.8,
            status: ProposalStatus::Pending,
            created_at: ambry_core::time::now_iso(),
            decided_at: None,
            decision: None,
            edited_content: None,
            session_id: None,
        }
    }

    #[test]
    fn slugs_are_clean_and_bounded() {
        assert_eq!(slug_from_title("Add rule: Repeated handler!"), "add-rule-repeated-handler");
        assert_eq!(slug_from_title("  spaces   and---dashes "), "spaces-and-dashes");
        assert!(slug_from_title(&"long ".repeat(40)).len() <= 60);
    }

    #[test]
    fn artifact_paths_follow_conventions() {
        let root = Path::new("/repo");
        let rule = proposal(ProposalType::Rule, "Add rule: X", "");
        assert_eq!(
            artifact_path(&rule, root),
            root.join(".claude/rules/learning-add-rule-x.md")
        );
        let adr = proposal(ProposalType::Adr, "Record decision: Y", "");
        assert_eq!(
            artifact_path(&adr, root),
            root.join("docs/decisions/record-decision-y.md")
        );
        let skill = proposal(ProposalType::Skill, "Add skill: Z", "");
        assert_eq!(
            artifact_path(&skill, root),
            root.join(".claude/skills/add-skill-z/prompt.md")
        );
        let graph = proposal(ProposalType::ProjectGraph, "Update project graph", "");
        assert_eq!(
            artifact_path(&graph, root),
            root.join(".ai-framework/project-graph.json")
        );
    }

    #[test]
    fn write_rule_artifact_creates_file() {
        let dir = tempdir().unwrap();
        let p = proposal(ProposalType::Rule, "Add rule: sql", "# rule body\n");
        let path = write_artifact(&p, dir.path(), None).unwrap();
        assert!(path.exists());
        assert_eq!(std::fs::read_to_string(path).unwrap(), "# rule body\n");
    }

    #[test]
    fn edited_content_substitutes_proposed() {
        let dir = tempdir().unwrap();
        let p = proposal(ProposalType::Rule, "Add rule: sql", "original\n");
        let path = write_artifact(&p, dir.path(), Some("amended\n")).unwrap();
        assert_eq!(std::fs::read_to_string(path).unwrap(), "amended\n");
    }

    #[test]
    fn project_graph_merges_preserving_siblings() {
        let dir = tempdir().unwrap();
        let graph_path = dir.path().join(".ai-framework/project-graph.json");
        std::fs::create_dir_all(graph_path.parent().unwrap()).unwrap();
        std::fs::write(
            &graph_path,
            r#"{"services": {"billing": {"path": "billing/"}}, "version": 1}"#,
        )
        .unwrap();

        let p = proposal(
            ProposalType::ProjectGraph,
            "Update project graph",
            r#"{"services": {"payments": {"path": "payments/"}}}"#,
        );
        write_artifact(&p, dir.path(), None).unwrap();

        let merged: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&graph_path).unwrap()).unwrap();
        assert!(merged["services"]["billing"].is_object(), "sibling service kept");
        assert!(merged["services"]["payments"].is_object(), "new service added");
        assert_eq!(merged["version"], 1);
    }

    #[test]
    fn corrupt_project_graph_is_replaced_not_fatal() {
        let dir = tempdir().unwrap();
        let graph_path = dir.path().join(".ai-framework/project-graph.json");
        std::fs::create_dir_all(graph_path.parent().unwrap()).unwrap();
        std::fs::write(&graph_path, "{not json").unwrap();

        let p = proposal(
            ProposalType::ProjectGraph,
            "Update project graph",
            r#"{"services": {}}"#,
        );
        write_artifact(&p, dir.path(), None).unwrap();
        let merged: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&graph_path).unwrap()).unwrap();
        assert!(merged["services"].is_object());
    }

    #[test]
    fn rule_fingerprints_are_harvested_from_frontmatter() {
        let dir = tempdir().unwrap();
        let rules = dir.path().join(".claude/rules");
        std::fs::create_dir_all(&rules).unwrap();
        std::fs::write(
            rules.join("learning-a.md"),
            "---\nname: a\nfingerprint: abc123def4567890\n---\n\n# A\n",
        )
        .unwrap();
        std::fs::write(rules.join("handwritten.md"), "# No frontmatter here\n").unwrap();

        let fingerprints = existing_rule_fingerprints(dir.path());
        assert_eq!(fingerprints.len(), 1);
        assert!(fingerprints.contains("abc123def4567890"));
    }

    #[test]
    fn frontmatter_field_handles_missing_block() {
        assert_eq!(frontmatter_field("# Just a doc\n", "fingerprint"), None);
        assert_eq!(
            frontmatter_field("---\nkey: value\n---\nbody", "key").as_deref(),
            Some("value")
        );
    }
}
