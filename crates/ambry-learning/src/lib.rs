// SPDX-FileCopyrightText: 2026 Ambry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adaptive learning pipeline for the ambry daemon.
//!
//! Mines repeated patterns from version-control history: git analysis feeds
//! per-file syntactic shapes into seven heuristics (H1–H7), surviving
//! candidates become decision-ready proposals, and accepted proposals are
//! written as governance artifacts with an effectiveness baseline. The
//! pipeline produces prompt templates only; it never calls a model.

pub mod analytics;
pub mod artifacts;
pub mod database;
pub mod git_scan;
pub mod heuristics;
pub mod models;
pub mod pipeline;
pub mod proposals;
pub mod syntactic;

pub use database::LearningDatabase;
pub use models::{
    Decision, Detection, FailureCategory, FailureEvent, HeuristicId, PatternCandidate, Proposal,
    ProposalStatus, ProposalType, RuleBaseline,
};
pub use pipeline::{AnalysisOutcome, DecisionOutcome, LearningPipeline};
