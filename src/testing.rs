//! In-memory doubles for unit tests

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::completion::ChatCompletion;
use crate::decision::ResponseSchema;
use crate::error::{CouncilError, Result};
use crate::retrieval::SearchBackend;
use crate::transcript::ChatMessage;

/// A recorded call to [`ScriptedCompletion`]
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub messages: Vec<ChatMessage>,
    pub schema: Option<ResponseSchema>,
}

/// Completion backend that replays queued replies in order
pub struct ScriptedCompletion {
    replies: Mutex<VecDeque<Result<String>>>,
    calls: Mutex<Vec<RecordedCall>>,
    delay: Option<Duration>,
}

impl ScriptedCompletion {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(|r| Ok(r.into())).collect()),
            calls: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    /// Sleep before every reply
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Queue an upstream failure after the current replies
    pub fn then_fail(self, message: &str) -> Self {
        self.replies
            .lock()
            .push_back(Err(CouncilError::upstream("scripted", message)));
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl ChatCompletion for ScriptedCompletion {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        schema: Option<ResponseSchema>,
    ) -> Result<String> {
        self.calls.lock().push(RecordedCall {
            messages: messages.to_vec(),
            schema,
        });
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.replies
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(CouncilError::upstream("scripted", "no reply queued")))
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

/// Search backend returning fixed snippets and recording queries
pub struct FixedSearch {
    hits: Vec<String>,
    queries: Mutex<Vec<(String, usize)>>,
}

impl FixedSearch {
    pub fn new<I, S>(hits: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            hits: hits.into_iter().map(Into::into).collect(),
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn queries(&self) -> Vec<(String, usize)> {
        self.queries.lock().clone()
    }
}

#[async_trait]
impl SearchBackend for FixedSearch {
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<String>> {
        self.queries.lock().push((query.to_string(), top_k));
        Ok(self.hits.iter().take(top_k).cloned().collect())
    }

    fn source_name(&self) -> &str {
        "fixed"
    }
}
