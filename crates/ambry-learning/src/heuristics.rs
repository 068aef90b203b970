// SPDX-FileCopyrightText: 2026 Ambry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The seven heuristics (H1–H7), confidence scoring, and candidate
//! filtering.
//!
//! Detection functions are pure over the change window and per-file shapes;
//! only the filtering step consults the database (cooldowns, prior decision
//! history) and the rules directory (existing fingerprints).

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

use ambry_core::AmbryError;

use crate::database::LearningDatabase;
use crate::git_scan::ChangeSet;
use crate::models::{Detection, HeuristicId, Location, PatternCandidate};
use crate::syntactic::{is_test_path, SourceShapes};

/// Half-life in days for the recency decay factor.
const RECENCY_HALF_LIFE_DAYS: f64 = 14.0;

/// Peer share a pattern needs before its absence is notable (H2).
const H2_PEER_SHARE: f64 = 0.75;

/// Minimum group size for peer comparison (H2).
const H2_MIN_PEERS: usize = 4;

/// Minimum minority share before naming styles count as competing (H3).
const H3_MINORITY_SHARE: f64 = 0.25;

fn min_occurrences(heuristic: HeuristicId) -> usize {
    match heuristic {
        HeuristicId::H1 => 3,
        HeuristicId::H2 => 2,
        HeuristicId::H3 => 4,
        HeuristicId::H4 => 1,
        HeuristicId::H5 => 1,
        HeuristicId::H6 => 1,
        HeuristicId::H7 => 1,
    }
}

/// Heuristics allowed to fire on a single file.
fn single_file_allowed(heuristic: HeuristicId) -> bool {
    matches!(
        heuristic,
        HeuristicId::H4 | HeuristicId::H6 | HeuristicId::H7
    )
}

fn base_score(heuristic: HeuristicId) -> f64 {
    match heuristic {
        HeuristicId::H1 => 0.6,
        HeuristicId::H2 => 0.55,
        HeuristicId::H3 => 0.5,
        HeuristicId::H4 => 0.8,
        HeuristicId::H5 => 0.7,
        HeuristicId::H6 => 0.6,
        HeuristicId::H7 => 0.5,
    }
}

/// Run every heuristic over one change window.
pub fn run_heuristics(
    window: &ChangeSet,
    shapes_by_file: &BTreeMap<String, SourceShapes>,
    project_root: &Path,
) -> Vec<Detection> {
    let mut detections = Vec::new();
    detections.extend(h1_repeated_blocks(shapes_by_file));
    detections.extend(h2_missing_standard(shapes_by_file));
    detections.extend(h3_inconsistent_naming(shapes_by_file));
    detections.extend(h4_security_shapes(shapes_by_file));
    detections.extend(h5_performance_shapes(shapes_by_file));
    detections.extend(h6_test_gaps(&window.added, project_root));
    detections.extend(h7_doc_gaps(&window.added, project_root));

    for detection in &mut detections {
        detection.newest_commit_age_days = window.newest_commit_age_days;
    }
    detections
}

/// Confidence = base × consistency × recency × scope × prior, clamped.
pub fn compute_confidence(detection: &Detection, prior_factor: f64) -> f64 {
    let base = base_score(detection.heuristic_id);
    let consistency = detection.peer_share.clamp(0.0, 1.0);
    let recency = 0.5_f64.powf(detection.newest_commit_age_days / RECENCY_HALF_LIFE_DAYS);
    let scope = scope_factor(detection);
    (base * consistency * recency * scope * prior_factor).clamp(0.0, 1.0)
}

/// Cross-directory spread reward.
fn scope_factor(detection: &Detection) -> f64 {
    let mut dirs: HashSet<&str> = HashSet::new();
    for location in &detection.locations {
        let dir = location.file.rsplit_once('/').map(|(d, _)| d).unwrap_or("");
        dirs.insert(dir);
    }
    match dirs.len() {
        0 | 1 => 0.8,
        2 => 1.0,
        n => (1.0 + 0.1 * (n as f64 - 2.0)).min(1.2),
    }
}

/// Filter detections into scored candidates.
///
/// Drops: occurrence counts below the per-heuristic threshold, single-file
/// scope (except H4/H6/H7), fingerprints in cooldown, and fingerprints an
/// existing rule file already carries.
pub async fn score_and_filter(
    detections: Vec<Detection>,
    db: &LearningDatabase,
    existing_rule_fingerprints: &HashSet<String>,
    now: &str,
) -> Result<Vec<PatternCandidate>, AmbryError> {
    let mut candidates = Vec::new();
    for detection in detections {
        if detection.occurrences < min_occurrences(detection.heuristic_id) {
            continue;
        }
        if detection.distinct_files() <= 1 && !single_file_allowed(detection.heuristic_id) {
            continue;
        }
        if existing_rule_fingerprints.contains(&detection.fingerprint) {
            continue;
        }
        if db.is_in_cooldown(&detection.fingerprint, now).await? {
            continue;
        }

        let prior = db.prior_decision_factor(&detection.fingerprint).await?;
        let confidence = compute_confidence(&detection, prior);
        candidates.push(PatternCandidate::from_detection(&detection, confidence));
    }
    Ok(candidates)
}

// --- H1: repeated block ---

fn h1_repeated_blocks(shapes_by_file: &BTreeMap<String, SourceShapes>) -> Vec<Detection> {
    let mut detections = Vec::new();

    let mut function_files: HashMap<String, Vec<&str>> = HashMap::new();
    let mut base_files: HashMap<String, Vec<&str>> = HashMap::new();
    let mut handler_files: HashMap<String, Vec<&str>> = HashMap::new();

    for (file, shapes) in shapes_by_file {
        for function in &shapes.functions {
            function_files
                .entry(function.key())
                .or_default()
                .push(file);
        }
        for class in &shapes.classes {
            for class_base in &class.bases {
                base_files
                    .entry(format!("extends {class_base}"))
                    .or_default()
                    .push(file);
            }
        }
        for handler in &shapes.handlers {
            handler_files.entry(handler.key()).or_default().push(file);
        }
    }

    for (group, label) in [
        (function_files, "function signature"),
        (base_files, "class hierarchy"),
        (handler_files, "error handler"),
    ] {
        for (key, files) in group {
            let distinct: HashSet<&&str> = files.iter().collect();
            if distinct.len() < 3 {
                continue;
            }
            let locations = files.iter().map(|f| Location::file(*f)).collect();
            detections.push(Detection::new(
                HeuristicId::H1,
                &key,
                locations,
                format!("Repeated {label}: {key} in {} files", distinct.len()),
                serde_json::json!({ "shape": key, "kind": label }),
            ));
        }
    }
    detections
}

// --- H2: missing standard pattern ---

fn h2_missing_standard(shapes_by_file: &BTreeMap<String, SourceShapes>) -> Vec<Detection> {
    let mut by_dir: BTreeMap<&str, Vec<(&String, &SourceShapes)>> = BTreeMap::new();
    for (file, shapes) in shapes_by_file {
        let dir = file.rsplit_once('/').map(|(d, _)| d).unwrap_or("");
        by_dir.entry(dir).or_default().push((file, shapes));
    }

    let mut detections = Vec::new();
    for (dir, peers) in by_dir {
        if peers.len() < H2_MIN_PEERS {
            continue;
        }
        let mut import_counts: HashMap<&str, usize> = HashMap::new();
        for (_, shapes) in &peers {
            let unique: HashSet<&str> = shapes.imports.iter().map(String::as_str).collect();
            for import in unique {
                *import_counts.entry(import).or_default() += 1;
            }
        }

        for (import, count) in import_counts {
            let share = count as f64 / peers.len() as f64;
            if share < H2_PEER_SHARE || count == peers.len() {
                continue;
            }
            let missing: Vec<Location> = peers
                .iter()
                .filter(|(_, shapes)| !shapes.imports.iter().any(|i| i == import))
                .map(|(file, _)| Location::file(file.as_str()))
                .collect();
            if missing.is_empty() {
                continue;
            }
            let mut detection = Detection::new(
                HeuristicId::H2,
                &format!("missing:{dir}:{import}"),
                missing,
                format!("Files in {dir}/ missing the standard `{import}` their peers carry"),
                serde_json::json!({ "directory": dir, "import": import, "peer_share": share }),
            );
            detection.peer_share = share;
            // Occurrences for H2 means peers carrying the pattern.
            detection.occurrences = count;
            detections.push(detection);
        }
    }
    detections
}

// --- H3: inconsistent pattern ---

fn h3_inconsistent_naming(shapes_by_file: &BTreeMap<String, SourceShapes>) -> Vec<Detection> {
    let mut snake_files: Vec<&str> = Vec::new();
    let mut camel_files: Vec<&str> = Vec::new();
    let mut snake = 0usize;
    let mut camel = 0usize;

    for (file, shapes) in shapes_by_file {
        for function in &shapes.functions {
            match function.naming_style() {
                Some("snake_case") => {
                    snake += 1;
                    snake_files.push(file);
                }
                Some("camelCase") => {
                    camel += 1;
                    camel_files.push(file);
                }
                _ => {}
            }
        }
    }

    let total = snake + camel;
    if total == 0 || snake == 0 || camel == 0 {
        return vec![];
    }
    let minority_share = snake.min(camel) as f64 / total as f64;
    if minority_share < H3_MINORITY_SHARE {
        return vec![];
    }

    let minority_files = if snake < camel { snake_files } else { camel_files };
    let mut locations: Vec<Location> = minority_files
        .into_iter()
        .map(Location::file)
        .collect();
    locations.dedup();

    let mut detection = Detection::new(
        HeuristicId::H3,
        "naming:snake_case-vs-camelCase",
        locations,
        format!(
            "Competing function naming styles: {snake} snake_case vs {camel} camelCase"
        ),
        serde_json::json!({ "snake_case": snake, "camelCase": camel }),
    );
    detection.occurrences = total;
    detection.peer_share = 1.0 - minority_share;
    vec![detection]
}

// --- H4: security shape ---

fn h4_security_shapes(shapes_by_file: &BTreeMap<String, SourceShapes>) -> Vec<Detection> {
    let mut by_kind: BTreeMap<&'static str, Vec<(String, i64, String)>> = BTreeMap::new();
    for (file, shapes) in shapes_by_file {
        for site in &shapes.security_sites {
            by_kind
                .entry(site.kind)
                .or_default()
                .push((file.clone(), site.line, site.snippet.clone()));
        }
    }

    by_kind
        .into_iter()
        .map(|(kind, sites)| {
            let locations = sites
                .iter()
                .map(|(file, line, _)| Location::span(file.clone(), *line, *line))
                .collect();
            let example = sites[0].2.clone();
            Detection::new(
                HeuristicId::H4,
                &format!("security:{kind}"),
                locations,
                format!("Security anti-pattern ({kind}): {example}"),
                serde_json::json!({ "kind": kind, "sites": sites.len() }),
            )
        })
        .collect()
}

// --- H5: performance shape ---

fn h5_performance_shapes(shapes_by_file: &BTreeMap<String, SourceShapes>) -> Vec<Detection> {
    let mut by_kind: BTreeMap<&'static str, Vec<(String, i64, String)>> = BTreeMap::new();
    for (file, shapes) in shapes_by_file {
        for site in &shapes.perf_sites {
            by_kind
                .entry(site.kind)
                .or_default()
                .push((file.clone(), site.line, site.snippet.clone()));
        }
    }

    by_kind
        .into_iter()
        .map(|(kind, sites)| {
            let locations = sites
                .iter()
                .map(|(file, line, _)| Location::span(file.clone(), *line, *line))
                .collect();
            let example = sites[0].2.clone();
            Detection::new(
                HeuristicId::H5,
                &format!("performance:{kind}"),
                locations,
                format!("Performance anti-pattern ({kind}): {example}"),
                serde_json::json!({ "kind": kind, "sites": sites.len() }),
            )
        })
        .collect()
}

// --- H6: test gap ---

fn h6_test_gaps(added: &[String], project_root: &Path) -> Vec<Detection> {
    added
        .iter()
        .filter(|path| crate::syntactic::is_source_path(path) && !is_test_path(path))
        .filter(|path| !has_sibling_test(path, project_root))
        .map(|path| {
            Detection::new(
                HeuristicId::H6,
                &format!("test_gap:{path}"),
                vec![Location::file(path.as_str())],
                format!("New file {path} has no sibling test"),
                serde_json::json!({ "file": path }),
            )
        })
        .collect()
}

fn has_sibling_test(rel_path: &str, project_root: &Path) -> bool {
    let (dir, name) = rel_path.rsplit_once('/').unwrap_or(("", rel_path));
    let (stem, ext) = name.rsplit_once('.').unwrap_or((name, ""));

    let candidates = [
        format!("{dir}/test_{name}"),
        format!("{dir}/{stem}_test.{ext}"),
        format!("{dir}/{stem}.test.{ext}"),
        format!("{dir}/{stem}.spec.{ext}"),
        format!("{dir}/tests/test_{name}"),
        format!("tests/test_{name}"),
        format!("tests/{stem}_test.{ext}"),
    ];
    candidates
        .iter()
        .map(|c| c.trim_start_matches('/'))
        .any(|candidate| project_root.join(candidate).exists())
}

// --- H7: doc gap ---

const DESCRIPTOR_NAMES: &[&str] = &["README.md", "CLAUDE.md", "index.md"];

fn h7_doc_gaps(added: &[String], project_root: &Path) -> Vec<Detection> {
    // Top-level directories that received new files this window.
    let mut top_dirs: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for path in added {
        if let Some((top, _rest)) = path.split_once('/') {
            if !top.starts_with('.') {
                top_dirs.entry(top).or_default().push(path);
            }
        }
    }

    top_dirs
        .into_iter()
        .filter(|(dir, _)| {
            let base = project_root.join(dir);
            base.is_dir()
                && !DESCRIPTOR_NAMES
                    .iter()
                    .any(|descriptor| base.join(descriptor).exists())
        })
        .map(|(dir, files)| {
            Detection::new(
                HeuristicId::H7,
                &format!("doc_gap:{dir}"),
                files.iter().map(|f| Location::file(*f)).collect(),
                format!("New module {dir}/ has no descriptor file"),
                serde_json::json!({ "directory": dir }),
            )
        })
        .collect()
}
