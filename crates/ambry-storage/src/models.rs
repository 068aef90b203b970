// SPDX-FileCopyrightText: 2026 Ambry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Memory event and session models.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use ambry_core::time;

/// Who produced an observation.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ActorType {
    User,
    #[default]
    Agent,
    Hook,
    System,
}

/// Kind of durable observation.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EventType {
    Decision,
    Discovery,
    Lesson,
    RejectedPattern,
    PatternCandidate,
    #[default]
    Event,
}

/// A durable observation. Created by hooks or the coordinator; never
/// mutated, never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEvent {
    /// Row id; None until saved.
    pub id: Option<i64>,
    /// RFC 3339 UTC timestamp.
    pub ts: String,
    pub actor: ActorType,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub text: String,
    /// Lowercased tag set.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Cross references, e.g. artifact_path or proposal_id.
    #[serde(default)]
    pub refs: BTreeMap<String, String>,
    /// Relevance weight in [0, 1].
    pub importance: f64,
    /// Optional upsert key for hooks that re-fire.
    #[serde(default)]
    pub dedupe_key: Option<String>,
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    pub created_at_epoch: i64,
}

impl MemoryEvent {
    /// New event with defaults: actor=agent, importance=0.5, now timestamps.
    pub fn new(event_type: EventType, text: impl Into<String>) -> Self {
        Self {
            id: None,
            ts: time::now_iso(),
            actor: ActorType::Agent,
            event_type,
            text: text.into(),
            tags: Vec::new(),
            refs: BTreeMap::new(),
            importance: 0.5,
            dedupe_key: None,
            project: None,
            session_id: None,
            created_at_epoch: time::now_epoch_ms(),
        }
    }

    pub fn with_importance(mut self, importance: f64) -> Self {
        self.importance = importance.clamp(0.0, 1.0);
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(|t| t.into().to_lowercase()).collect();
        self
    }

    pub fn with_ref(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.refs.insert(key.into(), value.into());
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_actor(mut self, actor: ActorType) -> Self {
        self.actor = actor;
        self
    }
}

/// A contiguous assistant conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: i64,
    /// Caller-supplied identifier, or "default".
    pub session_id: String,
    pub project: Option<String>,
    pub initial_prompt: Option<String>,
    pub started_at: String,
    pub ended_at: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_lowercases_tags_and_clamps_importance() {
        let event = MemoryEvent::new(EventType::Decision, "chose sqlite")
            .with_tags(["Learning", "ACCEPT"])
            .with_importance(1.7);
        assert_eq!(event.tags, vec!["learning", "accept"]);
        assert_eq!(event.importance, 1.0);
    }

    #[test]
    fn event_type_serializes_snake_case() {
        let json = serde_json::to_string(&EventType::RejectedPattern).unwrap();
        assert_eq!(json, "\"rejected_pattern\"");
        let back: EventType = serde_json::from_str(&json).unwrap();
        assert_eq!(back, EventType::RejectedPattern);
    }

    #[test]
    fn event_type_display_round_trips() {
        use std::str::FromStr;
        for t in [
            EventType::Decision,
            EventType::Discovery,
            EventType::Lesson,
            EventType::RejectedPattern,
            EventType::PatternCandidate,
            EventType::Event,
        ] {
            let s = t.to_string();
            assert_eq!(EventType::from_str(&s).unwrap(), t);
        }
    }
}
