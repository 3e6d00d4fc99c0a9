//! Research-log export payloads and the outbound sink seam.
//!
//! Exports are a research-logging side effect: best-effort, never a
//! correctness requirement. Builders here produce the JSON payloads; the
//! sink implementation decides where they go.

use chrono::Utc;
use serde_json::{json, Value};

use crate::error::StoaResult;
use crate::log::LogEntry;
use crate::session::{SessionMeta, SessionState};

/// Outbound sink for research logs. Implementations post one payload under a
/// filename with the session's metadata attached.
pub trait LogSink {
    fn post_log(&self, payload: &Value, filename: &str, meta: &SessionMeta) -> StoaResult<()>;
}

fn entry_value(entry: &LogEntry) -> Value {
    json!({
        "role": entry.agent.to_string(),
        "content": entry.content,
        "timestamp": entry.timestamp.to_rfc3339(),
        "speaker": entry.speaker,
        "agentType": entry.agent.to_string(),
    })
}

fn history_values(entries: &[&LogEntry]) -> Vec<Value> {
    entries.iter().map(|e| entry_value(e)).collect()
}

/// Full session export: the complete time-ordered history plus the feedback
/// records, written when a session ends.
pub fn full_export(state: &SessionState) -> Value {
    let all: Vec<&LogEntry> = state.unified_log.read_all().iter().collect();
    json!({
        "generatedAt": Utc::now().to_rfc3339(),
        "totalTurns": all.len(),
        "conversationHistory": history_values(&all),
        "feedbackHistory": state.feedback_history,
        "taskScores": state.task_scores,
    })
}

/// Classroom segment export: teacher/peer/user traffic only.
pub fn classroom_export(state: &SessionState) -> Value {
    let classroom = state.unified_log.classroom_history();
    json!({
        "generatedAt": Utc::now().to_rfc3339(),
        "segment": "classroom",
        "totalTurns": classroom.len(),
        "conversation": history_values(&classroom),
    })
}

/// Incremental classroom export: only entries past the given upload cursor.
/// `None` when nothing new has accumulated.
pub fn classroom_export_since(state: &SessionState, cursor: usize) -> Option<Value> {
    let classroom = state.unified_log.classroom_history();
    if classroom.len() <= cursor {
        return None;
    }
    let fresh = &classroom[cursor..];
    Some(json!({
        "generatedAt": Utc::now().to_rfc3339(),
        "segment": "classroom",
        "totalTurns": fresh.len(),
        "cursor": cursor,
        "conversation": history_values(fresh),
    }))
}

/// Test segment export: the examiner transcript and feedback records.
pub fn test_export(state: &SessionState) -> Value {
    json!({
        "generatedAt": Utc::now().to_rfc3339(),
        "segment": "test",
        "totalTurns": state.test_conversation.len(),
        "testConversation": state.test_conversation,
        "feedbackHistory": state.feedback_history,
        "taskScores": state.task_scores,
    })
}

/// Teardown flush payload, posted fire-and-forget when the process exits.
pub fn unload_export(state: &SessionState) -> Value {
    let all: Vec<&LogEntry> = state.unified_log.read_all().iter().collect();
    json!({
        "generatedAt": Utc::now().to_rfc3339(),
        "segment": "unload",
        "totalTurns": all.len(),
        "conversationHistory": history_values(&all),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::{AgentType, LogEntry};

    #[test]
    fn test_full_export_carries_every_entry() {
        let mut state = SessionState::default();
        state
            .unified_log
            .append(LogEntry::new(AgentType::User, "hi", "alice"));
        state
            .unified_log
            .append(LogEntry::new(AgentType::Librarian, "books", "Librarian"));

        let payload = full_export(&state);
        assert_eq!(payload["totalTurns"], 2);
        assert_eq!(payload["conversationHistory"][1]["agentType"], "librarian");
    }

    #[test]
    fn test_classroom_export_filters_to_classroom_agents() {
        let mut state = SessionState::default();
        state
            .unified_log
            .append(LogEntry::new(AgentType::User, "hi", "alice"));
        state
            .unified_log
            .append(LogEntry::new(AgentType::Examiner, "q1", "Examiner"));

        let payload = classroom_export(&state);
        assert_eq!(payload["totalTurns"], 1);
        assert_eq!(payload["segment"], "classroom");
    }

    #[test]
    fn test_incremental_classroom_export_respects_cursor() {
        let mut state = SessionState::default();
        state
            .unified_log
            .append(LogEntry::new(AgentType::User, "one", "alice"));
        state
            .unified_log
            .append(LogEntry::new(AgentType::Teacher, "two", "Teacher"));

        assert!(classroom_export_since(&state, 2).is_none());
        let payload = classroom_export_since(&state, 1).unwrap();
        assert_eq!(payload["totalTurns"], 1);
        assert_eq!(payload["conversation"][0]["content"], "two");
    }
}
