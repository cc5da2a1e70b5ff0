//! Scripted model for tests.
//!
//! Replays canned responses in order and records every request it receives.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{EngineError, Result};

use super::{GenerativeModel, ModelRequest, ModelResponse, TokenUsage};

/// One scripted reply.
pub(crate) enum Reply {
    Text(String, TokenUsage),
    Fail(String),
}

pub(crate) struct ScriptedModel {
    name: String,
    replies: Mutex<VecDeque<Reply>>,
    requests: Mutex<Vec<ModelRequest>>,
}

impl ScriptedModel {
    pub(crate) fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            replies: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queue a successful reply.
    pub(crate) fn reply(self, text: impl Into<String>, input_tokens: u64, output_tokens: u64) -> Self {
        self.push(Reply::Text(
            text.into(),
            TokenUsage { input_tokens, output_tokens },
        ))
    }

    /// Queue a failing reply.
    pub(crate) fn fail(self, message: &str) -> Self {
        self.push(Reply::Fail(message.to_string()))
    }

    fn push(self, reply: Reply) -> Self {
        self.replies.lock().unwrap().push_back(reply);
        self
    }

    pub(crate) fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub(crate) fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl GenerativeModel for ScriptedModel {
    async fn generate(&self, request: &ModelRequest) -> Result<ModelResponse> {
        self.requests.lock().unwrap().push(request.clone());

        match self.replies.lock().unwrap().pop_front() {
            Some(Reply::Text(text, usage)) => Ok(ModelResponse { text, usage }),
            Some(Reply::Fail(message)) => Err(EngineError::Model(message).into()),
            None => Err(EngineError::Model("script exhausted".to_string()).into()),
        }
    }

    fn display_name(&self) -> &str {
        &self.name
    }
}
