//! Session state: the single mutable record everything reads and writes.
//!
//! The whole record serializes as one JSON object and is persisted as a
//! whole, never per field. Two concurrent writers are last-write-wins; that
//! limitation is accepted, not worked around here.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::bloom::BloomLevel;
use crate::error::StoaResult;
use crate::feedback::FeedbackEntry;
use crate::gateway::{ChatMessage, WireRole};
use crate::language::Language;
use crate::log::UnifiedLog;
use crate::prompts::Role;

/// One turn of a per-role transcript (user or assistant view of it).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: WireRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: WireRole::User,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: WireRole::Assistant,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn to_chat_message(&self) -> ChatMessage {
        ChatMessage {
            role: self.role,
            content: self.content.clone(),
        }
    }
}

/// Per-role classroom transcripts. Only the two conversational roles keep a
/// dedicated transcript; everything else lives in the unified log alone.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Conversations {
    pub teacher: Vec<ChatTurn>,
    pub peer: Vec<ChatTurn>,
}

impl Conversations {
    /// The transcript for a conversational role, `None` for the rest.
    pub fn for_role_mut(&mut self, role: Role) -> Option<&mut Vec<ChatTurn>> {
        match role {
            Role::Teacher => Some(&mut self.teacher),
            Role::Peer => Some(&mut self.peer),
            _ => None,
        }
    }

    pub fn for_role(&self, role: Role) -> Option<&[ChatTurn]> {
        match role {
            Role::Teacher => Some(&self.teacher),
            Role::Peer => Some(&self.peer),
            _ => None,
        }
    }

    /// Completed classroom rounds: one user message answered by one reply.
    pub fn completed_rounds(&self) -> usize {
        let rounds = |turns: &[ChatTurn]| {
            turns.iter().filter(|t| t.role == WireRole::Assistant).count()
        };
        rounds(&self.teacher) + rounds(&self.peer)
    }
}

/// Score for one Bloom-level task. `completed` is derived from points.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TaskScore {
    pub points: f64,
    pub completed: bool,
}

impl TaskScore {
    pub fn award(points: f64) -> Self {
        Self {
            points,
            completed: points >= BloomLevel::MAX_POINTS,
        }
    }
}

/// Session-scoped metadata carried into every export.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionMeta {
    pub username: String,
    pub language: Language,
    pub session_id: String,
    pub exam_topic: Option<String>,
    /// Classroom turns completed, used to gate entry into testing.
    pub turn_count: u32,
    /// Unified-log cursor of the last incremental classroom upload.
    pub last_upload_cursor: usize,
}

impl Default for SessionMeta {
    fn default() -> Self {
        Self {
            username: "anonymous".into(),
            language: Language::default(),
            session_id: ulid::Ulid::new().to_string(),
            exam_topic: None,
            turn_count: 0,
            last_upload_cursor: 0,
        }
    }
}

/// The whole persisted session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionState {
    pub conversations: Conversations,
    pub unified_log: UnifiedLog,
    /// Transcript of the examiner chat, kept separately so the examiner can
    /// be replayed its own thread on top of the classroom context.
    pub test_conversation: Vec<ChatTurn>,
    pub task_scores: BTreeMap<BloomLevel, TaskScore>,
    pub feedback_history: Vec<FeedbackEntry>,
    /// Questions successfully issued by the examiner so far.
    pub test_count: u32,
    pub current_test_level: BloomLevel,
    pub selected_topic: Option<String>,
    pub test_goal: Option<String>,
    pub meta: SessionMeta,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            conversations: Conversations::default(),
            unified_log: UnifiedLog::default(),
            test_conversation: Vec::new(),
            task_scores: BTreeMap::new(),
            feedback_history: Vec::new(),
            test_count: 0,
            current_test_level: BloomLevel::Remember,
            selected_topic: None,
            test_goal: None,
            meta: SessionMeta::default(),
        }
    }
}

impl SessionState {
    pub fn new(username: impl Into<String>, language: Language) -> Self {
        Self {
            meta: SessionMeta {
                username: username.into(),
                language,
                ..SessionMeta::default()
            },
            ..Self::default()
        }
    }

    pub fn language(&self) -> Language {
        self.meta.language
    }

    /// Record the awarded points for a level. Completion is derived, never
    /// set directly.
    pub fn record_task_score(&mut self, level: BloomLevel, points: f64) {
        self.task_scores.insert(level, TaskScore::award(points));
    }

    pub fn task_score(&self, level: BloomLevel) -> TaskScore {
        self.task_scores.get(&level).copied().unwrap_or_default()
    }

    /// Mean points across all six levels (missing levels count as zero).
    pub fn average_score(&self) -> f64 {
        let total: f64 = BloomLevel::ORDER
            .iter()
            .map(|level| self.task_score(*level).points)
            .sum();
        total / BloomLevel::ORDER.len() as f64
    }

    /// The terminal condition: every level's task is completed.
    pub fn all_levels_completed(&self) -> bool {
        BloomLevel::ORDER
            .iter()
            .all(|level| self.task_score(*level).completed)
    }

    /// The first not-yet-completed level that matches the given text's
    /// question verbs; falls back to the current test level.
    pub fn detect_question_level(&self, text: &str) -> BloomLevel {
        let language = self.language();
        let haystack = text.to_lowercase();
        for level in BloomLevel::ORDER {
            if self.task_score(level).completed {
                continue;
            }
            let hit = level
                .keywords(language)
                .iter()
                .any(|kw| haystack.contains(&kw.to_lowercase()));
            if hit {
                return level;
            }
        }
        self.current_test_level
    }
}

/// Storage seam for the session record. Whole-object load/save only.
pub trait SessionStore {
    fn load(&self) -> StoaResult<Option<SessionState>>;
    fn save(&self, state: &SessionState) -> StoaResult<()>;
    fn clear(&self) -> StoaResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completion_is_derived_from_points() {
        let mut state = SessionState::default();
        state.record_task_score(BloomLevel::Remember, 9.9);
        assert!(!state.task_score(BloomLevel::Remember).completed);

        state.record_task_score(BloomLevel::Remember, 10.0);
        assert!(state.task_score(BloomLevel::Remember).completed);

        for level in BloomLevel::ORDER {
            state.record_task_score(level, 10.0);
        }
        assert!(state.all_levels_completed());
    }

    #[test]
    fn test_average_counts_missing_levels_as_zero() {
        let mut state = SessionState::default();
        state.record_task_score(BloomLevel::Remember, 6.0);
        assert_eq!(state.average_score(), 1.0);
    }

    #[test]
    fn test_detect_question_level_prefers_incomplete_match() {
        let mut state = SessionState::default();
        state.current_test_level = BloomLevel::Understand;

        // "list" marks Remember; once Remember is complete the same text
        // falls back to the current level.
        assert_eq!(
            state.detect_question_level("Please list the concepts"),
            BloomLevel::Remember
        );
        state.record_task_score(BloomLevel::Remember, 10.0);
        assert_eq!(
            state.detect_question_level("Please list the concepts"),
            BloomLevel::Understand
        );
    }

    #[test]
    fn test_detect_question_level_without_keywords_uses_current() {
        let mut state = SessionState::default();
        state.current_test_level = BloomLevel::Analyze;
        assert_eq!(
            state.detect_question_level("Something entirely unrelated"),
            BloomLevel::Analyze
        );
    }

    #[test]
    fn test_completed_rounds_counts_replies() {
        let mut state = SessionState::default();
        state.conversations.teacher.push(ChatTurn::user("hi"));
        state.conversations.teacher.push(ChatTurn::assistant("hello"));
        state.conversations.peer.push(ChatTurn::user("hey"));
        assert_eq!(state.conversations.completed_rounds(), 1);
    }

    #[test]
    fn test_state_roundtrips_through_json() {
        let mut state = SessionState::new("alice", Language::En);
        state.record_task_score(BloomLevel::Apply, 7.5);
        state.test_count = 2;

        let json = serde_json::to_string(&state).unwrap();
        let back: SessionState = serde_json::from_str(&json).unwrap();
        assert_eq!(back.meta.username, "alice");
        assert_eq!(back.task_score(BloomLevel::Apply).points, 7.5);
        assert_eq!(back.test_count, 2);
    }
}
