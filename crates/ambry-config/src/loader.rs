// SPDX-FileCopyrightText: 2026 Ambry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Merge order (later overrides earlier): compiled defaults, the project's
//! `.ai-framework.json`, then `AI_FRAMEWORK_*` environment variables.

use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Json, Serialized},
    Figment,
};

use ambry_core::{fsutil, AmbryError};

use crate::model::AmbryConfig;

/// File name of the project configuration, resolved against the git root.
pub const CONFIG_FILE_NAME: &str = ".ai-framework.json";

/// Load configuration for a project root with env var overrides.
pub fn load_config(project_root: &Path) -> Result<AmbryConfig, AmbryError> {
    let path = project_root.join(CONFIG_FILE_NAME);
    Figment::new()
        .merge(Serialized::defaults(AmbryConfig::default()))
        .merge(Json::file(path))
        .merge(env_provider())
        .extract()
        .map_err(|e| AmbryError::Validation(format!("config error: {e}")))
}

/// Load configuration from a JSON string only (tests and diagnostics).
pub fn load_config_from_str(json: &str) -> Result<AmbryConfig, AmbryError> {
    Figment::new()
        .merge(Serialized::defaults(AmbryConfig::default()))
        .merge(Json::string(json))
        .extract()
        .map_err(|e| AmbryError::Validation(format!("config error: {e}")))
}

/// Write configuration back to `.ai-framework.json` atomically.
///
/// Unknown keys captured in the flatten maps are serialized back out, so a
/// load → mutate → save cycle preserves settings ambry does not own.
pub fn save_config(project_root: &Path, config: &AmbryConfig) -> Result<PathBuf, AmbryError> {
    let path = project_root.join(CONFIG_FILE_NAME);
    fsutil::atomic_write_json(&path, config)?;
    Ok(path)
}

/// Environment variable provider with explicit section mapping.
///
/// Uses `Env::map()` rather than `Env::split("_")` so underscore-bearing key
/// names stay unambiguous: `AI_FRAMEWORK_LEARNING_COOLDOWN_DAYS` maps to
/// `learning.cooldown_days`, not `learning.cooldown.days`.
fn env_provider() -> Env {
    Env::prefixed("AI_FRAMEWORK_").map(|key| {
        let key_str = key.as_str();
        let mapped = key_str
            .replacen("project_", "project.", 1)
            .replacen("learning_", "learning.", 1)
            .replacen("retrieval_", "retrieval.", 1)
            .replacen("orchestration_", "orchestration.", 1)
            .replacen("agent_teams_", "agent_teams.", 1);
        mapped.into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Sensitivity;
    use tempfile::tempdir;

    #[test]
    fn defaults_match_contract() {
        let config = load_config_from_str("{}").unwrap();
        assert!(!config.learning.global_enabled);
        assert_eq!(config.learning.sensitivity, Sensitivity::Moderate);
        assert_eq!(config.learning.max_proposals_per_session, 3);
        assert_eq!(config.learning.cooldown_days, 7);
        assert_eq!(config.learning.warmup_hours, 24);
        assert_eq!(config.learning.commits_per_trigger, 5);
        assert_eq!(config.orchestration.max_review_iterations, 3);
        assert_eq!(config.orchestration.stale_busy_hours, 4);
        assert!(!config.agent_teams.enabled);
    }

    #[test]
    fn sensitivity_maps_to_min_confidence() {
        assert_eq!(Sensitivity::Conservative.min_confidence(), 0.7);
        assert_eq!(Sensitivity::Moderate.min_confidence(), 0.5);
        assert_eq!(Sensitivity::Aggressive.min_confidence(), 0.3);
    }

    #[test]
    fn explicit_values_override_defaults() {
        let config = load_config_from_str(
            r#"{
                "project": {"name": "demo"},
                "learning": {"global_enabled": true, "sensitivity": "aggressive"},
                "orchestration": {"max_review_iterations": 2}
            }"#,
        )
        .unwrap();
        assert_eq!(config.project.name.as_deref(), Some("demo"));
        assert!(config.learning.global_enabled);
        assert_eq!(config.learning.min_confidence(), 0.3);
        assert_eq!(config.orchestration.max_review_iterations, 2);
    }

    #[test]
    fn unknown_keys_survive_round_trip() {
        let dir = tempdir().unwrap();
        let raw = r#"{
            "learning": {"global_enabled": true, "experimental_knob": 42},
            "dashboard": {"theme": "dark"}
        }"#;
        std::fs::write(dir.path().join(CONFIG_FILE_NAME), raw).unwrap();

        let mut config = load_config(dir.path()).unwrap();
        config.learning.cooldown_days = 14;
        save_config(dir.path(), &config).unwrap();

        let reread: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(dir.path().join(CONFIG_FILE_NAME)).unwrap(),
        )
        .unwrap();
        assert_eq!(reread["dashboard"]["theme"], "dark");
        assert_eq!(reread["learning"]["experimental_knob"], 42);
        assert_eq!(reread["learning"]["cooldown_days"], 14);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempdir().unwrap();
        let config = load_config(dir.path()).unwrap();
        assert!(!config.learning.global_enabled);
        assert_eq!(config.retrieval.code_binary, "vexor");
    }
}
