// SPDX-FileCopyrightText: 2026 Ambry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration for the ambry daemon.
//!
//! Loads `.ai-framework.json` from the project root with environment
//! variable overrides, layered over compiled defaults via Figment. Unknown
//! keys are preserved verbatim so a read-modify-write cycle never loses
//! settings that belong to other tools.

pub mod loader;
pub mod model;

pub use loader::{load_config, load_config_from_str, save_config, CONFIG_FILE_NAME};
pub use model::{
    AgentTeamsConfig, AmbryConfig, LearningConfig, OrchestrationConfig, ProjectConfig,
    RetrievalConfig, Sensitivity,
};
