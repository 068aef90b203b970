// SPDX-FileCopyrightText: 2026 Ambry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reviewer output parsing and verdict aggregation.
//!
//! The contract with reviewers is strict: a `Verdict: PASS` or
//! `Verdict: FAIL` line (case-insensitive) plus findings rows of the form
//! `- <severity>: <location> — <message>`. Anything else is ignored.
//! Output with no verdict line fails closed with a synthetic must_fix
//! finding, and a FAIL always carries at least one must_fix so the
//! verdict ⇔ must_fix invariant holds after parsing.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// PASS/FAIL decision of one reviewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Verdict {
    Pass,
    Fail,
}

/// Severity of a single finding.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Severity {
    MustFix,
    ShouldFix,
    Suggestion,
}

/// One structured finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewFinding {
    pub severity: Severity,
    /// `path` or `path:line`; empty when the reviewer gave none.
    pub location: String,
    pub message: String,
}

/// Parsed output of one reviewer for one iteration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewVerdict {
    pub reviewer_id: String,
    pub verdict: Verdict,
    pub findings: Vec<ReviewFinding>,
    pub iteration: u32,
}

impl ReviewVerdict {
    pub fn has_must_fix(&self) -> bool {
        self.findings.iter().any(|f| f.severity == Severity::MustFix)
    }
}

/// The reviewer capability set: each variant knows how to parse its own
/// output and what findings shape it is expected to emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewerKind {
    CodeQuality,
    SpecCompliance,
}

impl ReviewerKind {
    pub fn id(&self) -> &'static str {
        match self {
            ReviewerKind::CodeQuality => "code-quality",
            ReviewerKind::SpecCompliance => "spec-compliance",
        }
    }

    /// Findings shape this reviewer is expected to produce.
    pub fn expected_findings_shape(&self) -> &'static str {
        match self {
            ReviewerKind::CodeQuality => "- <severity>: <file>:<line> — <defect>",
            ReviewerKind::SpecCompliance => "- <severity>: <requirement> — <gap>",
        }
    }

    pub fn parse_verdict(&self, output: &str, iteration: u32) -> ReviewVerdict {
        parse_verdict(output, self.id(), iteration)
    }
}

fn verdict_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)verdict\s*:\s*(pass|fail)").unwrap())
}

fn finding_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?im)^\s*-\s*(must_fix|should_fix|suggestion)\s*:\s*(.+)$").unwrap()
    })
}

fn location_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^([\w./\\-]+\.\w+(?::\d+)?)\s*(?:—|--)?\s*(.*)$").unwrap()
    })
}

/// Parse raw reviewer output into a verdict.
pub fn parse_verdict(output: &str, reviewer_id: &str, iteration: u32) -> ReviewVerdict {
    let mut findings: Vec<ReviewFinding> = finding_re()
        .captures_iter(output)
        .map(|caps| {
            let severity = caps[1].to_lowercase().parse().unwrap_or(Severity::Suggestion);
            let body = caps[2].trim();
            let (location, message) = match location_re().captures(body) {
                Some(loc) => {
                    let message = loc[2].trim();
                    (
                        loc[1].to_string(),
                        if message.is_empty() {
                            body.to_string()
                        } else {
                            message.to_string()
                        },
                    )
                }
                None => (String::new(), body.to_string()),
            };
            ReviewFinding {
                severity,
                location,
                message,
            }
        })
        .collect();

    let verdict = match verdict_re().captures(output) {
        Some(caps) => {
            if caps[1].eq_ignore_ascii_case("pass") {
                Verdict::Pass
            } else {
                Verdict::Fail
            }
        }
        None => {
            findings.push(ReviewFinding {
                severity: Severity::MustFix,
                location: String::new(),
                message: "reviewer_output_malformed".to_string(),
            });
            Verdict::Fail
        }
    };

    // A FAIL without a must_fix would break the verdict invariant.
    if verdict == Verdict::Fail && !findings.iter().any(|f| f.severity == Severity::MustFix) {
        findings.push(ReviewFinding {
            severity: Severity::MustFix,
            location: String::new(),
            message: "reviewer reported FAIL without a must_fix finding".to_string(),
        });
    }

    ReviewVerdict {
        reviewer_id: reviewer_id.to_string(),
        verdict,
        findings,
        iteration,
    }
}

/// PASS iff every verdict is PASS and no verdict carries a must_fix.
pub fn aggregate(verdicts: &[ReviewVerdict]) -> bool {
    !verdicts.is_empty()
        && verdicts
            .iter()
            .all(|v| v.verdict == Verdict::Pass && !v.has_must_fix())
}

/// True when another fix-loop iteration should run.
pub fn needs_fix_loop(verdicts: &[ReviewVerdict], iteration: u32, max_iterations: u32) -> bool {
    !aggregate(verdicts) && iteration < max_iterations
}

/// Render findings as markdown grouped by location for the fix loop.
pub fn build_fix_instructions(verdicts: &[ReviewVerdict]) -> String {
    let mut grouped: BTreeMap<&str, Vec<&ReviewFinding>> = BTreeMap::new();
    for verdict in verdicts {
        for finding in &verdict.findings {
            grouped.entry(finding.location.as_str()).or_default().push(finding);
        }
    }
    if grouped.is_empty() {
        return String::new();
    }

    let mut lines = Vec::new();
    for (location, findings) in grouped {
        let heading = if location.is_empty() { "(general)" } else { location };
        lines.push(format!("## {heading}"));
        for finding in findings {
            lines.push(format!("- [{}] {}", finding.severity, finding.message));
        }
        lines.push(String::new());
    }
    lines.join("\n").trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pass_verdict_parses_case_insensitively() {
        for output in ["Verdict: PASS", "verdict: pass", "VERDICT:  Pass"] {
            let v = parse_verdict(output, "r1", 0);
            assert_eq!(v.verdict, Verdict::Pass);
            assert!(v.findings.is_empty());
        }
    }

    #[test]
    fn fail_verdict_collects_findings() {
        let output = "\
Some preamble the parser ignores.\n\
Verdict: FAIL\n\
- must_fix: src/auth.rs:42 — token not validated\n\
- should_fix: src/lib.rs — missing doc comment\n\
- suggestion: rename helper\n\
Unrelated trailing text.\n";
        let v = parse_verdict(output, "code-quality", 1);
        assert_eq!(v.verdict, Verdict::Fail);
        assert_eq!(v.findings.len(), 3);
        assert_eq!(v.findings[0].severity, Severity::MustFix);
        assert_eq!(v.findings[0].location, "src/auth.rs:42");
        assert_eq!(v.findings[0].message, "token not validated");
        assert_eq!(v.findings[1].location, "src/lib.rs");
        assert_eq!(v.findings[2].location, "");
        assert_eq!(v.findings[2].message, "rename helper");
        assert_eq!(v.iteration, 1);
    }

    #[test]
    fn missing_verdict_line_fails_closed() {
        let v = parse_verdict("I think it looks fine?", "r1", 0);
        assert_eq!(v.verdict, Verdict::Fail);
        assert_eq!(v.findings.len(), 1);
        assert_eq!(v.findings[0].severity, Severity::MustFix);
        assert_eq!(v.findings[0].message, "reviewer_output_malformed");
    }

    #[test]
    fn fail_without_must_fix_gains_synthetic_finding() {
        let output = "Verdict: FAIL\n- suggestion: could be tidier\n";
        let v = parse_verdict(output, "r1", 0);
        assert!(v.has_must_fix(), "FAIL must imply at least one must_fix");
    }

    #[test]
    fn aggregate_requires_all_pass_and_no_must_fix() {
        let pass = parse_verdict("Verdict: PASS", "a", 0);
        let fail = parse_verdict("Verdict: FAIL\n- must_fix: src/x.rs — broken", "b", 0);
        assert!(aggregate(&[pass.clone()]));
        assert!(!aggregate(&[pass.clone(), fail]));
        assert!(!aggregate(&[]), "no verdicts is not a pass");

        // PASS verdict carrying a must_fix still fails aggregation.
        let sneaky = parse_verdict(
            "Verdict: PASS\n- must_fix: src/y.rs — actually broken",
            "c",
            0,
        );
        assert!(!aggregate(&[pass, sneaky]));
    }

    #[test]
    fn fix_loop_respects_iteration_bound() {
        let fail = parse_verdict("Verdict: FAIL\n- must_fix: src/x.rs — broken", "a", 0);
        assert!(needs_fix_loop(&[fail.clone()], 0, 3));
        assert!(needs_fix_loop(&[fail.clone()], 2, 3));
        assert!(!needs_fix_loop(&[fail], 3, 3));

        let pass = parse_verdict("Verdict: PASS", "a", 0);
        assert!(!needs_fix_loop(&[pass], 0, 3));
    }

    #[test]
    fn fix_instructions_group_by_location() {
        let a = parse_verdict(
            "Verdict: FAIL\n- must_fix: src/x.rs:1 — first\n- should_fix: src/x.rs:1 — second",
            "a",
            0,
        );
        let b = parse_verdict("Verdict: FAIL\n- must_fix: src/y.rs — third", "b", 0);
        let instructions = build_fix_instructions(&[a, b]);
        assert!(instructions.contains("## src/x.rs:1"));
        assert!(instructions.contains("## src/y.rs"));
        assert!(instructions.contains("- [must_fix] first"));
        assert!(instructions.contains("- [should_fix] second"));
    }

    #[test]
    fn fix_instructions_empty_without_findings() {
        let pass = parse_verdict("Verdict: PASS", "a", 0);
        assert_eq!(build_fix_instructions(&[pass]), "");
    }

    #[test]
    fn reviewer_kinds_parse_with_their_id() {
        let v = ReviewerKind::SpecCompliance.parse_verdict("Verdict: PASS", 2);
        assert_eq!(v.reviewer_id, "spec-compliance");
        assert_eq!(v.iteration, 2);
        assert!(!ReviewerKind::CodeQuality.expected_findings_shape().is_empty());
    }
}
