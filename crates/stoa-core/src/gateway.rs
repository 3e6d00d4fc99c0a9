//! Wire types and the client seam for the LLM proxy.
//!
//! The proxy accepts an OpenAI-style chat body and only understands the
//! `system`/`user`/`assistant` roles, so everything role-flavored (teacher,
//! peer, examiner...) is coerced to `assistant` before it leaves the process.

use serde::{Deserialize, Serialize};

use crate::bloom::BloomLevel;
use crate::error::StoaResult;
use crate::language::Language;
use crate::prompts::{self, Role};

/// Message roles the upstream chat API accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: WireRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: WireRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: WireRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: WireRole::Assistant,
            content: content.into(),
        }
    }
}

/// One completion call. The concrete client supplies endpoint and model.
#[derive(Debug, Clone, Serialize)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub temperature: f64,
    pub max_tokens: u32,
}

impl CompletionRequest {
    /// Defaults used for conversational turns.
    pub fn chat(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            temperature: 0.7,
            max_tokens: 1000,
        }
    }

    /// Low-temperature, short-budget call used by the evaluator panel.
    pub fn scoring(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            temperature: 0.3,
            max_tokens: 300,
        }
    }
}

/// The single seam to the model. Implementations block until the reply text
/// is available; there is no retry at this layer.
pub trait LlmClient {
    fn complete(&self, request: &CompletionRequest) -> StoaResult<String>;
}

/// Run one role-driven call: prepend the role's system prompt for the given
/// language and level, then forward the history as-is.
pub fn invoke_role(
    client: &dyn LlmClient,
    role: Role,
    language: Language,
    level: BloomLevel,
    history: Vec<ChatMessage>,
) -> StoaResult<String> {
    let mut messages = Vec::with_capacity(history.len() + 1);
    messages.push(ChatMessage::system(prompts::role_prompt(
        role, language, level,
    )));
    messages.extend(history);
    client.complete(&CompletionRequest::chat(messages))
}

#[cfg(test)]
pub mod testing {
    //! Scripted client used across the crate's tests.

    use std::cell::RefCell;

    use super::{CompletionRequest, LlmClient};
    use crate::error::{StoaError, StoaResult};

    /// Replays canned replies in order; once the script runs out it keeps
    /// returning the last reply. Records every request it saw.
    pub struct ScriptedClient {
        replies: Vec<String>,
        pub requests: RefCell<Vec<CompletionRequest>>,
        cursor: RefCell<usize>,
    }

    impl ScriptedClient {
        pub fn new<I, S>(replies: I) -> Self
        where
            I: IntoIterator<Item = S>,
            S: Into<String>,
        {
            Self {
                replies: replies.into_iter().map(Into::into).collect(),
                requests: RefCell::new(Vec::new()),
                cursor: RefCell::new(0),
            }
        }

        pub fn call_count(&self) -> usize {
            self.requests.borrow().len()
        }
    }

    impl LlmClient for ScriptedClient {
        fn complete(&self, request: &CompletionRequest) -> StoaResult<String> {
            self.requests.borrow_mut().push(request.clone());
            let mut cursor = self.cursor.borrow_mut();
            let reply = self
                .replies
                .get(*cursor)
                .or_else(|| self.replies.last())
                .cloned()
                .ok_or_else(|| StoaError::Transport("script is empty".into()))?;
            *cursor += 1;
            Ok(reply)
        }
    }

    /// Always fails with a gateway error, for error-path tests.
    pub struct FailingClient;

    impl LlmClient for FailingClient {
        fn complete(&self, _request: &CompletionRequest) -> StoaResult<String> {
            Err(StoaError::Gateway {
                status: 502,
                body: "upstream unavailable".into(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::ScriptedClient;
    use super::*;

    #[test]
    fn test_invoke_role_prepends_system_prompt() {
        let client = ScriptedClient::new(["ok"]);
        let history = vec![ChatMessage::user("hello")];
        let reply =
            invoke_role(&client, Role::Teacher, Language::En, BloomLevel::Remember, history)
                .unwrap();
        assert_eq!(reply, "ok");

        let requests = client.requests.borrow();
        let messages = &requests[0].messages;
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, WireRole::System);
        assert_eq!(messages[1].role, WireRole::User);
    }

    #[test]
    fn test_wire_role_serializes_lowercase() {
        let msg = ChatMessage::assistant("hi");
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"assistant\""));
    }
}
