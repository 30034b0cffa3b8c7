//! # Council
//!
//! Group-chat orchestration of retrieval-augmented LLM agents.
//!
//! A user's question is routed to a small team of agents, each optionally
//! grounded in a knowledge source, and their answers are combined into a
//! single response.
//!
//! ## Architecture
//!
//! ```text
//!   POST /chat ──► Orchestrator ──────────────► GroupChatManager
//!                    │  (turn loop)               terminate? / select next / filter
//!                    │                                   │
//!                    ▼                                   ▼
//!              ┌───────────┐ ┌───────────┐        ChatCompletion
//!              │  Agent A  │ │  Agent B  │ ...    (structured output)
//!              └─────┬─────┘ └─────┬─────┘
//!                    ▼             ▼
//!             RetrievalPlugin  RetrievalPlugin
//!           (vector index)    (static table)
//! ```
//!
//! ## Key Concepts
//!
//! - **Agent**: a named LLM participant with instructions and an optional plugin
//! - **Manager**: decides, after every turn, whether to stop and who speaks next
//! - **Session**: one conversation and its append-only transcript
//! - **Decision**: a structured `{result, reason}` reply from the model

pub mod agent;
pub mod channel;
pub mod completion;
pub mod config;
pub mod decision;
pub mod error;
pub mod manager;
pub mod orchestrator;
pub mod participants;
pub mod retrieval;
pub mod server;
pub mod session;
pub mod template;
pub mod transcript;

#[cfg(test)]
pub(crate) mod testing;

pub use agent::{default_roster, Agent, AgentHandle, AgentSpec, KnowledgeSource};
pub use channel::{event_channel, ChatEvent, EventSink, EventStream};
pub use completion::{AzureOpenAiClient, ChatCompletion};
pub use config::{OrchestrationMode, Settings};
pub use decision::{BooleanResult, Decision, MessageResult, ResponseSchema, StringResult};
pub use error::{CouncilError, Result};
pub use manager::{
    ChatCompletionGroupChatManager, GroupChatManager, RoundLimit, RoundRobinGroupChatManager,
};
pub use orchestrator::{AgentAnswer, FairnessPolicy, Orchestrator, OrchestratorOptions};
pub use participants::Participants;
pub use retrieval::{RetrievalPlugin, SearchBackend};
pub use session::{Session, SessionHandle};
pub use template::PromptTemplate;
pub use transcript::{ChatMessage, Role, Transcript};
