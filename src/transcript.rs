//! Conversation transcript and per-decision prompt contexts

use serde::{Deserialize, Serialize};

/// Author role of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single message in a conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    /// Author name (agent name, user name); None for synthesized messages
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            name: None,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            name: None,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            name: None,
            content: content.into(),
        }
    }

    /// Attach an author name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Durable record of a conversation.
///
/// Only real turns (user input and agent replies) are ever appended; manager
/// scaffolding lives in [`PromptContext`] and never reaches the transcript.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transcript {
    messages: Vec<ChatMessage>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a transcript with the user's question
    /// Start a conversation with the user's task; an empty user name is left off
    pub fn with_task(user: impl Into<String>, task: impl Into<String>) -> Self {
        let user = user.into();
        let mut message = ChatMessage::user(task);
        if !user.is_empty() {
            message = message.with_name(user);
        }
        let mut transcript = Self::new();
        transcript.push(message);
        transcript
    }

    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }

    /// Most recent user message, used as the retrieval query
    pub fn last_user_message(&self) -> Option<&ChatMessage> {
        self.messages.iter().rev().find(|m| m.role == Role::User)
    }

    /// Number of agent turns taken so far
    pub fn agent_turns(&self) -> usize {
        self.messages
            .iter()
            .filter(|m| m.role == Role::Assistant)
            .count()
    }
}

/// Ephemeral message list built for a single model call.
///
/// Borrows the transcript, so building one cannot alter the durable record.
#[derive(Debug, Clone)]
pub struct PromptContext {
    messages: Vec<ChatMessage>,
}

impl PromptContext {
    /// `system` first, then a copy of every transcript message
    pub fn new(system: impl Into<String>, transcript: &Transcript) -> Self {
        let mut messages = Vec::with_capacity(transcript.len() + 2);
        messages.push(ChatMessage::system(system));
        messages.extend(transcript.messages().iter().cloned());
        Self { messages }
    }

    /// Append a trailing user-role instruction
    pub fn with_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.messages.push(ChatMessage::user(instruction));
        self
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }
}
