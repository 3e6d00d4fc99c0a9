//! Unified conversation log.
//!
//! Every message from every agent and from the learner lands here, tagged
//! with the agent type that produced it. The log backs two reads: the full
//! export (everything, time-sorted) and the context history handed to
//! role-playing agents, which hides librarian, mind-map, and evaluator
//! traffic so those agents never see internal chatter as conversation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

use crate::gateway::{ChatMessage, WireRole};

/// Who produced a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentType {
    User,
    Teacher,
    Peer,
    Examiner,
    Feedback,
    Librarian,
    Mindmap,
    Evaluator,
}

impl AgentType {
    /// Whether entries from this agent are part of the conversational memory
    /// handed to role-playing agents.
    pub fn in_context(self) -> bool {
        matches!(
            self,
            Self::User | Self::Teacher | Self::Peer | Self::Examiner | Self::Feedback
        )
    }

    /// The wire role this agent's messages take when replayed to the model.
    pub fn wire_role(self) -> WireRole {
        match self {
            Self::User => WireRole::User,
            _ => WireRole::Assistant,
        }
    }
}

impl fmt::Display for AgentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Teacher => write!(f, "teacher"),
            Self::Peer => write!(f, "peer"),
            Self::Examiner => write!(f, "examiner"),
            Self::Feedback => write!(f, "feedback"),
            Self::Librarian => write!(f, "librarian"),
            Self::Mindmap => write!(f, "mindmap"),
            Self::Evaluator => write!(f, "evaluator"),
        }
    }
}

/// One immutable message record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub agent: AgentType,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    /// Display name of whoever spoke, e.g. the username or "Examiner".
    pub speaker: String,
}

impl LogEntry {
    pub fn new(agent: AgentType, content: impl Into<String>, speaker: impl Into<String>) -> Self {
        Self {
            agent,
            content: content.into(),
            timestamp: Utc::now(),
            speaker: speaker.into(),
        }
    }

    pub fn to_chat_message(&self) -> ChatMessage {
        ChatMessage {
            role: self.agent.wire_role(),
            content: self.content.clone(),
        }
    }
}

/// Time-ordered record of the whole session. Appends re-sort by timestamp so
/// entries stamped out of arrival order still read back chronologically.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnifiedLog {
    entries: Vec<LogEntry>,
}

impl UnifiedLog {
    /// Append one entry and restore timestamp order. Entries with empty
    /// content are dropped; the log only ever holds real messages.
    pub fn append(&mut self, entry: LogEntry) {
        if entry.content.is_empty() {
            warn!(agent = %entry.agent, "dropping empty log entry");
            return;
        }
        self.entries.push(entry);
        // Stable sort keeps same-timestamp entries in insertion order.
        self.entries.sort_by_key(|e| e.timestamp);
    }

    /// Every entry, timestamp ascending.
    pub fn read_all(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The filtered view role-playing agents see as conversational memory:
    /// teacher, peer, examiner, feedback, and the learner. Librarian,
    /// mind-map, and evaluator entries never appear here.
    pub fn context_history(&self) -> Vec<&LogEntry> {
        self.entries.iter().filter(|e| e.agent.in_context()).collect()
    }

    /// Context history narrowed to classroom traffic only (teacher, peer,
    /// learner). The examiner gets this view when composing a new question so
    /// it cannot restate old questions or feedback summaries.
    pub fn classroom_history(&self) -> Vec<&LogEntry> {
        self.entries
            .iter()
            .filter(|e| {
                matches!(
                    e.agent,
                    AgentType::User | AgentType::Teacher | AgentType::Peer
                )
            })
            .collect()
    }

    /// Replay a filtered view as wire messages.
    pub fn to_chat_messages(entries: &[&LogEntry]) -> Vec<ChatMessage> {
        entries.iter().map(|e| e.to_chat_message()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn entry_at(agent: AgentType, content: &str, secs: i64) -> LogEntry {
        LogEntry {
            agent,
            content: content.into(),
            timestamp: Utc.timestamp_opt(secs, 0).unwrap(),
            speaker: agent.to_string(),
        }
    }

    #[test]
    fn test_append_sorts_by_timestamp() {
        let mut log = UnifiedLog::default();
        log.append(entry_at(AgentType::User, "t3", 3));
        log.append(entry_at(AgentType::Teacher, "t1", 1));
        log.append(entry_at(AgentType::Peer, "t2", 2));

        let contents: Vec<&str> = log.read_all().iter().map(|e| e.content.as_str()).collect();
        assert_eq!(contents, vec!["t1", "t2", "t3"]);
        assert_eq!(log.len(), 3);
    }

    #[test]
    fn test_empty_content_is_dropped() {
        let mut log = UnifiedLog::default();
        log.append(LogEntry::new(AgentType::User, "", "alice"));
        assert!(log.is_empty());
    }

    #[test]
    fn test_context_excludes_internal_agents() {
        let mut log = UnifiedLog::default();
        for (agent, content) in [
            (AgentType::User, "hello"),
            (AgentType::Teacher, "welcome"),
            (AgentType::Peer, "hey"),
            (AgentType::Examiner, "question"),
            (AgentType::Feedback, "well done"),
            (AgentType::Librarian, "book list"),
            (AgentType::Mindmap, "digraph {}"),
            (AgentType::Evaluator, "score 7"),
        ] {
            log.append(LogEntry::new(agent, content, "x"));
        }

        let context = log.context_history();
        assert_eq!(context.len(), 5);
        assert!(context.iter().all(|e| {
            !matches!(
                e.agent,
                AgentType::Librarian | AgentType::Mindmap | AgentType::Evaluator
            )
        }));

        let classroom = log.classroom_history();
        assert_eq!(classroom.len(), 3);
    }

    #[test]
    fn test_wire_role_coercion() {
        assert_eq!(AgentType::User.wire_role(), WireRole::User);
        for agent in [
            AgentType::Teacher,
            AgentType::Peer,
            AgentType::Examiner,
            AgentType::Feedback,
            AgentType::Librarian,
            AgentType::Mindmap,
            AgentType::Evaluator,
        ] {
            assert_eq!(agent.wire_role(), WireRole::Assistant);
        }
    }
}
