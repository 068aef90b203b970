// SPDX-FileCopyrightText: 2026 Ambry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Spec state: phases, the transition graph, and atomic JSON persistence.
//!
//! One SpecState per slug per git root, stored at
//! `.ai-framework/specs/<slug>.json` and rewritten atomically on every
//! transition.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tracing::warn;

use ambry_core::{fsutil, time, AmbryError};

/// Lifecycle phase of a spec.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SpecPhase {
    Planning,
    Implementing,
    Verifying,
    Fixing,
    Learning,
    Done,
    Aborted,
}

impl SpecPhase {
    /// Terminal phases accept no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SpecPhase::Done | SpecPhase::Aborted)
    }

    /// Phases that count as busy for the session-exit stop guard.
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            SpecPhase::Implementing | SpecPhase::Verifying | SpecPhase::Fixing
        )
    }
}

/// The allowed edges of the phase graph. Abort is reachable from every
/// non-terminal phase.
pub fn allowed_transitions(phase: SpecPhase) -> &'static [SpecPhase] {
    match phase {
        SpecPhase::Planning => &[SpecPhase::Implementing, SpecPhase::Aborted],
        SpecPhase::Implementing => &[SpecPhase::Verifying, SpecPhase::Aborted],
        SpecPhase::Verifying => &[SpecPhase::Learning, SpecPhase::Fixing, SpecPhase::Aborted],
        SpecPhase::Fixing => &[SpecPhase::Implementing, SpecPhase::Aborted],
        SpecPhase::Learning => &[SpecPhase::Done, SpecPhase::Aborted],
        SpecPhase::Done | SpecPhase::Aborted => &[],
    }
}

/// Persistent state of one in-flight spec.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpecState {
    pub slug: String,
    pub phase: SpecPhase,
    #[serde(default)]
    pub total_tasks: u32,
    #[serde(default)]
    pub completed_tasks: u32,
    #[serde(default)]
    pub current_task: u32,
    #[serde(default)]
    pub review_iteration: u32,
    /// Hex sha-256 of the plan file contents (or the slug when no plan).
    pub plan_fingerprint: String,
    #[serde(default)]
    pub plan_path: Option<String>,
    pub started_at: String,
    pub updated_at: String,
    #[serde(default)]
    pub worktree_sha8: Option<String>,
    #[serde(default)]
    pub abort_reason: Option<String>,
    /// Every phase this spec has passed through, in order.
    #[serde(default)]
    pub phase_history: Vec<SpecPhase>,
}

impl SpecState {
    pub fn new(slug: &str, plan_fingerprint: String, plan_path: Option<String>) -> Self {
        let now = time::now_iso();
        Self {
            slug: slug.to_string(),
            phase: SpecPhase::Planning,
            total_tasks: 0,
            completed_tasks: 0,
            current_task: 0,
            review_iteration: 0,
            plan_fingerprint,
            plan_path,
            started_at: now.clone(),
            updated_at: now,
            worktree_sha8: None,
            abort_reason: None,
            phase_history: vec![SpecPhase::Planning],
        }
    }

    /// Move to `new_phase`, validating the edge and stamping updated_at.
    pub fn transition(&mut self, new_phase: SpecPhase) -> Result<(), AmbryError> {
        if !allowed_transitions(self.phase).contains(&new_phase) {
            return Err(AmbryError::State(format!(
                "invalid phase transition for '{}': {} -> {new_phase}",
                self.slug, self.phase
            )));
        }
        self.phase = new_phase;
        self.phase_history.push(new_phase);
        self.touch();
        Ok(())
    }

    pub fn touch(&mut self) {
        self.updated_at = time::now_iso();
    }
}

/// Hex sha-256 over plan-file contents, falling back to the slug.
pub fn plan_fingerprint(git_root: &Path, slug: &str, plan_path: Option<&str>) -> String {
    if let Some(plan_path) = plan_path {
        let full = git_root.join(plan_path);
        if let Ok(bytes) = std::fs::read(&full) {
            return fsutil::sha256_hex(&bytes);
        }
    }
    fsutil::sha256_hex(slug.as_bytes())
}

/// Location of a spec's state file.
pub fn spec_state_path(git_root: &Path, slug: &str) -> PathBuf {
    git_root.join(".ai-framework/specs").join(format!("{slug}.json"))
}

/// Read a spec state; missing or corrupt files read as absent.
pub fn read_spec_state(git_root: &Path, slug: &str) -> Option<SpecState> {
    let path = spec_state_path(git_root, slug);
    let text = std::fs::read_to_string(&path).ok()?;
    match serde_json::from_str(&text) {
        Ok(state) => Some(state),
        Err(e) => {
            warn!(slug, error = %e, "corrupt spec state file ignored");
            None
        }
    }
}

/// List every persisted spec state under a git root.
pub fn list_spec_states(git_root: &Path) -> Vec<SpecState> {
    let dir = git_root.join(".ai-framework/specs");
    let Ok(entries) = std::fs::read_dir(&dir) else {
        return vec![];
    };
    let mut states: Vec<SpecState> = entries
        .flatten()
        .filter(|e| e.path().extension().is_some_and(|ext| ext == "json"))
        .filter_map(|e| {
            let text = std::fs::read_to_string(e.path()).ok()?;
            serde_json::from_str(&text).ok()
        })
        .collect();
    states.sort_by(|a: &SpecState, b: &SpecState| a.slug.cmp(&b.slug));
    states
}

/// Persist a spec state atomically.
pub fn write_spec_state(git_root: &Path, state: &SpecState) -> Result<(), AmbryError> {
    fsutil::atomic_write_json(&spec_state_path(git_root, &state.slug), state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn new_state_starts_in_planning() {
        let state = SpecState::new("add-logging", "fp".into(), None);
        assert_eq!(state.phase, SpecPhase::Planning);
        assert_eq!(state.phase_history, vec![SpecPhase::Planning]);
        assert_eq!(state.review_iteration, 0);
    }

    #[test]
    fn valid_edges_are_accepted() {
        let mut state = SpecState::new("s", "fp".into(), None);
        state.transition(SpecPhase::Implementing).unwrap();
        state.transition(SpecPhase::Verifying).unwrap();
        state.transition(SpecPhase::Fixing).unwrap();
        state.transition(SpecPhase::Implementing).unwrap();
        state.transition(SpecPhase::Verifying).unwrap();
        state.transition(SpecPhase::Learning).unwrap();
        state.transition(SpecPhase::Done).unwrap();
        assert_eq!(state.phase_history.len(), 8);
    }

    #[test]
    fn invalid_edges_are_state_errors() {
        let mut state = SpecState::new("s", "fp".into(), None);
        let err = state.transition(SpecPhase::Verifying).unwrap_err();
        assert!(matches!(err, AmbryError::State(_)));
        // Phase unchanged after a refused transition.
        assert_eq!(state.phase, SpecPhase::Planning);
    }

    #[test]
    fn abort_is_reachable_from_every_non_terminal_phase() {
        for phase in [
            SpecPhase::Planning,
            SpecPhase::Implementing,
            SpecPhase::Verifying,
            SpecPhase::Fixing,
            SpecPhase::Learning,
        ] {
            assert!(allowed_transitions(phase).contains(&SpecPhase::Aborted));
        }
        assert!(allowed_transitions(SpecPhase::Done).is_empty());
        assert!(allowed_transitions(SpecPhase::Aborted).is_empty());
    }

    #[test]
    fn transition_updates_timestamp() {
        let mut state = SpecState::new("s", "fp".into(), None);
        let before = state.updated_at.clone();
        std::thread::sleep(std::time::Duration::from_millis(5));
        state.transition(SpecPhase::Implementing).unwrap();
        assert!(state.updated_at > before);
    }

    #[test]
    fn fingerprint_uses_plan_contents_when_present() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("plan.md"), "task one\ntask two\n").unwrap();

        let with_plan = plan_fingerprint(dir.path(), "slug", Some("plan.md"));
        let again = plan_fingerprint(dir.path(), "slug", Some("plan.md"));
        assert_eq!(with_plan, again, "fingerprint stable for identical contents");

        std::fs::write(dir.path().join("plan.md"), "task one\nCHANGED\n").unwrap();
        assert_ne!(plan_fingerprint(dir.path(), "slug", Some("plan.md")), with_plan);
    }

    #[test]
    fn fingerprint_falls_back_to_slug() {
        let dir = tempdir().unwrap();
        let no_plan = plan_fingerprint(dir.path(), "my-slug", None);
        let missing = plan_fingerprint(dir.path(), "my-slug", Some("does-not-exist.md"));
        assert_eq!(no_plan, missing);
        assert_eq!(no_plan, ambry_core::fsutil::sha256_hex(b"my-slug"));
    }

    #[test]
    fn state_round_trips_through_disk() {
        let dir = tempdir().unwrap();
        let mut state = SpecState::new("round-trip", "fp".into(), Some("plan.md".into()));
        state.transition(SpecPhase::Implementing).unwrap();
        state.total_tasks = 3;
        write_spec_state(dir.path(), &state).unwrap();

        let back = read_spec_state(dir.path(), "round-trip").unwrap();
        assert_eq!(back.phase, SpecPhase::Implementing);
        assert_eq!(back.total_tasks, 3);
        assert_eq!(back.phase_history, state.phase_history);
    }

    #[test]
    fn corrupt_state_reads_as_absent() {
        let dir = tempdir().unwrap();
        let path = spec_state_path(dir.path(), "bad");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{truncated").unwrap();
        assert!(read_spec_state(dir.path(), "bad").is_none());
    }

    #[test]
    fn list_returns_states_sorted_by_slug() {
        let dir = tempdir().unwrap();
        for slug in ["bravo", "alpha"] {
            write_spec_state(dir.path(), &SpecState::new(slug, "fp".into(), None)).unwrap();
        }
        let states = list_spec_states(dir.path());
        assert_eq!(states.len(), 2);
        assert_eq!(states[0].slug, "alpha");
    }
}
