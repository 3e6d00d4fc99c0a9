//! Examiner-driven test session.
//!
//! The session walks the six Bloom levels: the examiner issues a question at
//! the current level, the learner's next message is scored by the evaluator
//! panel and merged into feedback, then the learner chooses to stay on the
//! level or advance. The pending question is a synchronous shadow set the
//! instant an examiner reply is recorded, so routing never races the rest of
//! the state.

use tracing::warn;

use crate::bloom::BloomLevel;
use crate::error::StoaResult;
use crate::evaluate::{evaluate_answer, EvaluationConfig};
use crate::export::{full_export, LogSink};
use crate::extract::parse_examiner_output;
use crate::feedback::{synthesize_feedback, FeedbackEntry};
use crate::gateway::{invoke_role, ChatMessage, LlmClient};
use crate::language::Language;
use crate::log::{AgentType, LogEntry, UnifiedLog};
use crate::prompts::Role;
use crate::session::{ChatTurn, SessionState, SessionStore};

/// The question currently awaiting an answer, with the hidden reference
/// answer the examiner produced for the evaluators.
#[derive(Debug, Clone)]
struct PendingQuestion {
    text: String,
    level: BloomLevel,
    standard_answer: Option<String>,
}

/// What one learner message turned into.
#[derive(Debug)]
pub enum TestTurn {
    /// The message was a greeting or request; the examiner issued a question.
    QuestionIssued(String),
    /// The message answered the pending question and was scored.
    Evaluated(FeedbackEntry),
    /// Feedback is on the table; the learner must pick the next action first.
    ChooseNextAction,
    /// Every level is complete; nothing more to answer.
    SessionComplete,
}

/// How the learner leaves the post-feedback pause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextAction {
    AnotherQuestion,
    NextLevel,
}

/// Drives one test session over a mutable [`SessionState`].
pub struct TestSession {
    pub state: SessionState,
    config: EvaluationConfig,
    pending: Option<PendingQuestion>,
    awaiting_next_action: bool,
}

impl TestSession {
    /// Wrap a session state. A question left pending when the previous
    /// process ended is dropped on re-entry; the learner asks for a fresh
    /// one instead.
    pub fn new(state: SessionState, config: EvaluationConfig) -> Self {
        Self {
            state,
            config,
            pending: None,
            awaiting_next_action: false,
        }
    }

    pub fn into_state(self) -> SessionState {
        self.state
    }

    pub fn is_complete(&self) -> bool {
        self.state.all_levels_completed()
    }

    pub fn awaiting_next_action(&self) -> bool {
        self.awaiting_next_action
    }

    pub fn current_level(&self) -> BloomLevel {
        self.state.current_test_level
    }

    /// Route one learner message: answer to the pending question, or a
    /// request for a fresh question at the current level.
    pub fn handle_user_message(
        &mut self,
        client: &dyn LlmClient,
        text: &str,
    ) -> StoaResult<TestTurn> {
        if self.is_complete() {
            return Ok(TestTurn::SessionComplete);
        }
        if self.awaiting_next_action {
            return Ok(TestTurn::ChooseNextAction);
        }

        let text = text.trim();
        let username = self.state.meta.username.clone();
        self.state
            .unified_log
            .append(LogEntry::new(AgentType::User, text, username));
        self.state.test_conversation.push(ChatTurn::user(text));

        // Prefer the shadow; fall back to the last examiner reply in the
        // transcript when resuming a session whose shadow is gone.
        let pending = self.pending.clone().or_else(|| {
            self.state
                .test_conversation
                .iter()
                .rev()
                .find(|t| t.role == crate::gateway::WireRole::Assistant)
                .map(|t| PendingQuestion {
                    level: self.state.detect_question_level(&t.content),
                    text: t.content.clone(),
                    standard_answer: None,
                })
        });

        match pending {
            Some(question) => self.evaluate_pending(client, &question, text),
            None => {
                let display = self.request_question(client, self.state.current_test_level)?;
                Ok(TestTurn::QuestionIssued(display))
            }
        }
    }

    /// Leave the post-feedback pause: another question at the same level, or
    /// advance. Advancing past the last level is a no-op.
    pub fn resolve_next_action(
        &mut self,
        client: &dyn LlmClient,
        action: NextAction,
    ) -> StoaResult<Option<String>> {
        if self.is_complete() {
            return Ok(None);
        }
        let level = match action {
            NextAction::AnotherQuestion => self.state.current_test_level,
            NextAction::NextLevel => match self.state.current_test_level.next() {
                Some(next) => next,
                None => return Ok(None),
            },
        };
        if action == NextAction::NextLevel {
            self.state.current_test_level = level;
        }
        self.request_question(client, level).map(Some)
    }

    /// End of session: export the full log (best-effort, a failed export
    /// never blocks completion), then clear the persisted state.
    pub fn finish(&self, sink: &dyn LogSink, store: &dyn SessionStore) -> bool {
        let language = self.state.language();
        let filename = match language {
            Language::En => "conversation-history.json",
            Language::Zh => "学习对话记录.json",
        };
        let exported = match sink.post_log(&full_export(&self.state), filename, &self.state.meta) {
            Ok(()) => true,
            Err(err) => {
                warn!(error = %err, "final export failed; completing anyway");
                false
            }
        };
        if let Err(err) = store.clear() {
            warn!(error = %err, "failed to clear session state");
        }
        exported
    }

    fn evaluate_pending(
        &mut self,
        client: &dyn LlmClient,
        question: &PendingQuestion,
        answer: &str,
    ) -> StoaResult<TestTurn> {
        let language = self.state.language();
        // Scores always count toward the level currently under test, even
        // when the question's verbs matched another level.
        let level = self.state.current_test_level;
        if question.level != level {
            tracing::debug!(
                detected = %question.level,
                current = %level,
                "question keywords matched a different level"
            );
        }

        let outcome = evaluate_answer(
            client,
            &self.config,
            &question.text,
            answer,
            question.standard_answer.as_deref(),
            level,
            language,
        );

        let context =
            UnifiedLog::to_chat_messages(&self.state.unified_log.context_history());
        let synthesized =
            synthesize_feedback(client, &outcome.results, language, level, context)?;

        // Panel verdicts go to the log for export; the context filter keeps
        // them away from every role-playing agent.
        self.state.unified_log.append(LogEntry::new(
            AgentType::Evaluator,
            outcome.combined_feedback.clone(),
            match language {
                Language::En => "Evaluators",
                Language::Zh => "评估者",
            },
        ));

        self.state.record_task_score(level, synthesized.score);
        let entry = FeedbackEntry::new(level, language, &outcome, &synthesized);
        self.state.feedback_history.push(entry.clone());
        self.state.unified_log.append(LogEntry::new(
            AgentType::Feedback,
            synthesized.feedback.clone(),
            Role::Feedback.speaker_name(language),
        ));

        self.pending = None;
        self.awaiting_next_action = true;
        Ok(TestTurn::Evaluated(entry))
    }

    fn request_question(
        &mut self,
        client: &dyn LlmClient,
        level: BloomLevel,
    ) -> StoaResult<String> {
        let language = self.state.language();

        // Classroom context only: the examiner must not see prior feedback
        // summaries or its own earlier questions through the log, or it
        // starts restating them.
        let mut messages =
            UnifiedLog::to_chat_messages(&self.state.unified_log.classroom_history());
        messages.extend(self.state.test_conversation.iter().map(ChatTurn::to_chat_message));
        messages.push(ChatMessage::user(question_instruction(language)));

        let reply = invoke_role(client, Role::Examiner, language, level, messages)?;
        let parsed = parse_examiner_output(&reply);
        let display = parsed.display(&reply).to_string();
        let question_text = parsed.question_text(&reply).to_string();

        // The full raw reply (reference answer included) goes to the log for
        // research export; the learner only sees the stripped text.
        self.state.unified_log.append(LogEntry::new(
            AgentType::Examiner,
            reply.clone(),
            Role::Examiner.speaker_name(language),
        ));
        self.state
            .test_conversation
            .push(ChatTurn::assistant(display.clone()));

        // Shadow is set synchronously, before anything else can observe the
        // session, so the next learner message always routes to scoring.
        self.pending = Some(PendingQuestion {
            level: self.state.detect_question_level(&question_text),
            text: question_text,
            standard_answer: parsed.standard_answer,
        });
        self.state.test_count += 1;
        self.awaiting_next_action = false;
        Ok(display)
    }
}

fn question_instruction(language: Language) -> &'static str {
    match language {
        Language::En => {
            "Based on the conversation above, please do exactly one thing now: ask ONE new test question at the current Bloom test level.\n\nRequirements:\n1. Do NOT repeat, summarize, or restate any previous feedback;\n2. Do NOT reuse questions that were already asked before;\n3. Directly output a single new question at this level (optionally with a one-sentence explanation), and nothing else."
        }
        Language::Zh => {
            "基于上面的对话，请你现在只做一件事：在当前 Bloom 测试层级下，提出一条新的测试题目。\n\n要求：\n1. 不要复述、总结或评价之前的反馈内容；\n2. 不要重复之前已经问过的题目；\n3. 直接给出本层级的一道新题目（可以附一句话以内的简短说明），不要输出其他内容。"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::testing::ScriptedClient;
    use crate::session::SessionMeta;
    use serde_json::Value;
    use std::cell::RefCell;

    const QUESTION_REPLY: &str = "Here is your task. [Ref](https://example.com)\n```json\n{\"question\": \"List two data structures you discussed.\", \"standard_answer\": \"Array and linked list.\"}\n```";

    fn evaluation_replies(score: f64) -> Vec<String> {
        let mut replies: Vec<String> = (0..3)
            .map(|_| format!(r#"{{"score": {score}, "feedback": "noted"}}"#))
            .collect();
        replies.push(format!(
            r#"{{"score": {score}, "feedback": "Synthesized: solid recall."}}"#
        ));
        replies
    }

    fn session() -> TestSession {
        TestSession::new(
            SessionState::new("alice", Language::En),
            EvaluationConfig::default(),
        )
    }

    struct RecordingSink {
        posts: RefCell<Vec<(Value, String)>>,
    }

    impl RecordingSink {
        fn new() -> Self {
            Self {
                posts: RefCell::new(Vec::new()),
            }
        }
    }

    impl LogSink for RecordingSink {
        fn post_log(&self, payload: &Value, filename: &str, _meta: &SessionMeta) -> StoaResult<()> {
            self.posts.borrow_mut().push((payload.clone(), filename.into()));
            Ok(())
        }
    }

    struct FailingSink;

    impl LogSink for FailingSink {
        fn post_log(&self, _: &Value, _: &str, _: &SessionMeta) -> StoaResult<()> {
            Err(crate::StoaError::Transport("sink down".into()))
        }
    }

    struct NullStore;

    impl SessionStore for NullStore {
        fn load(&self) -> StoaResult<Option<SessionState>> {
            Ok(None)
        }
        fn save(&self, _: &SessionState) -> StoaResult<()> {
            Ok(())
        }
        fn clear(&self) -> StoaResult<()> {
            Ok(())
        }
    }

    #[test]
    fn test_greeting_requests_a_question() {
        let client = ScriptedClient::new([QUESTION_REPLY]);
        let mut session = session();

        let turn = session.handle_user_message(&client, "hello!").unwrap();
        match turn {
            TestTurn::QuestionIssued(display) => {
                assert!(display.contains("Here is your task"));
                assert!(!display.contains("standard_answer"));
            }
            other => panic!("expected a question, got {other:?}"),
        }

        assert_eq!(session.state.test_count, 1);
        assert!(session.pending.is_some());
        // The log keeps the raw reply, reference answer included.
        let examiner_entries: Vec<_> = session
            .state
            .unified_log
            .read_all()
            .iter()
            .filter(|e| e.agent == AgentType::Examiner)
            .collect();
        assert_eq!(examiner_entries.len(), 1);
        assert!(examiner_entries[0].content.contains("standard_answer"));
    }

    #[test]
    fn test_answer_is_scored_and_awaits_choice() {
        let mut replies = vec![QUESTION_REPLY.to_string()];
        replies.extend(evaluation_replies(7.0));
        let client = ScriptedClient::new(replies);
        let mut session = session();

        session.handle_user_message(&client, "hi").unwrap();
        let turn = session
            .handle_user_message(&client, "Array and linked list")
            .unwrap();

        let entry = match turn {
            TestTurn::Evaluated(entry) => entry,
            other => panic!("expected evaluation, got {other:?}"),
        };
        assert_eq!(entry.task_level, BloomLevel::Remember);
        assert_eq!(entry.score, 7.0);
        assert_eq!(entry.evaluators.len(), 3);
        assert!(!entry.summary.is_empty());

        assert_eq!(session.state.task_score(BloomLevel::Remember).points, 7.0);
        assert!(!session.state.task_score(BloomLevel::Remember).completed);
        assert!(session.awaiting_next_action());
        assert!(session.pending.is_none());

        // 1 question + 3 evaluators + 1 synthesis.
        assert_eq!(client.call_count(), 5);

        // Messages sent while awaiting are bounced back to the choice.
        let turn = session.handle_user_message(&client, "so what now").unwrap();
        assert!(matches!(turn, TestTurn::ChooseNextAction));
    }

    #[test]
    fn test_next_level_advances_in_order_and_stops_at_create() {
        let client = ScriptedClient::new([QUESTION_REPLY]);
        let mut session = session();

        let mut seen = vec![session.current_level()];
        loop {
            match session
                .resolve_next_action(&client, NextAction::NextLevel)
                .unwrap()
            {
                Some(_) => seen.push(session.current_level()),
                None => break,
            }
        }
        assert_eq!(seen, BloomLevel::ORDER);

        // Advancing past Create is a no-op.
        assert_eq!(session.current_level(), BloomLevel::Create);
        let result = session
            .resolve_next_action(&client, NextAction::NextLevel)
            .unwrap();
        assert!(result.is_none());
        assert_eq!(session.current_level(), BloomLevel::Create);
    }

    #[test]
    fn test_another_question_keeps_the_level() {
        let client = ScriptedClient::new([QUESTION_REPLY]);
        let mut session = session();
        session
            .resolve_next_action(&client, NextAction::AnotherQuestion)
            .unwrap()
            .unwrap();
        assert_eq!(session.current_level(), BloomLevel::Remember);
        assert!(!session.awaiting_next_action());
    }

    #[test]
    fn test_full_marks_complete_the_session() {
        let mut session = session();
        for level in BloomLevel::ORDER {
            session.state.record_task_score(level, 10.0);
        }
        assert!(session.is_complete());

        let client = ScriptedClient::new([QUESTION_REPLY]);
        let turn = session.handle_user_message(&client, "another?").unwrap();
        assert!(matches!(turn, TestTurn::SessionComplete));
        assert_eq!(client.call_count(), 0);
    }

    #[test]
    fn test_finish_exports_then_clears() {
        let mut session = session();
        session
            .state
            .unified_log
            .append(LogEntry::new(AgentType::User, "hi", "alice"));

        let sink = RecordingSink::new();
        assert!(session.finish(&sink, &NullStore));
        let posts = sink.posts.borrow();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].1, "conversation-history.json");
        assert_eq!(posts[0].0["totalTurns"], 1);
    }

    #[test]
    fn test_finish_survives_sink_failure() {
        let session = session();
        // Export fails, completion still proceeds.
        assert!(!session.finish(&FailingSink, &NullStore));
    }

    #[test]
    fn test_examiner_context_excludes_feedback_entries() {
        let mut session = session();
        session.state.unified_log.append(LogEntry::new(
            AgentType::Feedback,
            "earlier summary",
            "Feedback Agent",
        ));
        session.state.unified_log.append(LogEntry::new(
            AgentType::Teacher,
            "we covered arrays",
            "Teacher",
        ));

        let client = ScriptedClient::new([QUESTION_REPLY]);
        session.handle_user_message(&client, "quiz me").unwrap();

        let requests = client.requests.borrow();
        let contents: Vec<&str> = requests[0]
            .messages
            .iter()
            .map(|m| m.content.as_str())
            .collect();
        assert!(contents.iter().any(|c| c.contains("we covered arrays")));
        assert!(!contents.iter().any(|c| c.contains("earlier summary")));
    }
}
