pub mod bloom;
pub mod error;
pub mod evaluate;
pub mod export;
pub mod extract;
pub mod feedback;
pub mod gateway;
pub mod language;
pub mod log;
pub mod prompts;
pub mod session;
pub mod test_session;

pub use bloom::BloomLevel;
pub use error::{StoaError, StoaResult};
pub use evaluate::{EvaluationConfig, EvaluationOutcome, EvaluatorResult};
pub use export::LogSink;
pub use feedback::{FeedbackEntry, SynthesizedFeedback};
pub use gateway::{invoke_role, ChatMessage, CompletionRequest, LlmClient, WireRole};
pub use language::Language;
pub use log::{AgentType, LogEntry, UnifiedLog};
pub use prompts::Role;
pub use session::{ChatTurn, SessionMeta, SessionState, SessionStore, TaskScore};
pub use test_session::{NextAction, TestSession, TestTurn};
