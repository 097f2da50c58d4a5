use std::sync::Mutex;

use async_trait::async_trait;

use nlsql_core::{ChatMessage, Completer, NlSqlError, Result};

/// Scripted completer for tests.
///
/// Replies are returned in order; the last one repeats once the script runs
/// out. Every conversation received is recorded.
pub struct MockCompleter {
    replies: Vec<String>,
    failure: Option<String>,
    calls: Mutex<Vec<Vec<ChatMessage>>>,
}

impl MockCompleter {
    pub fn new(replies: Vec<String>) -> Self {
        Self {
            replies,
            failure: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn replying(reply: &str) -> Self {
        Self::new(vec![reply.to_string()])
    }

    /// A completer whose every call fails with an `Llm` error.
    pub fn failing(message: &str) -> Self {
        Self {
            replies: Vec::new(),
            failure: Some(message.to_string()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Conversations received so far.
    pub fn calls(&self) -> Vec<Vec<ChatMessage>> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Completer for MockCompleter {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let index = {
            let mut calls = self
                .calls
                .lock()
                .map_err(|e| NlSqlError::internal(e.to_string()))?;
            calls.push(messages.to_vec());
            calls.len() - 1
        };

        if let Some(message) = &self.failure {
            return Err(NlSqlError::llm(message.clone()));
        }

        self.replies
            .get(index)
            .or_else(|| self.replies.last())
            .cloned()
            .ok_or_else(|| NlSqlError::llm("no scripted reply"))
    }

    fn model(&self) -> &str {
        "mock"
    }
}
