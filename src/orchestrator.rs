//! Orchestration driver - runs a conversation across the agent team

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::agent::{participants_of, AgentHandle};
use crate::channel::{ChatEvent, EventSink};
use crate::completion::ChatCompletion;
use crate::config::{OrchestrationMode, Settings};
use crate::decision::MessageResult;
use crate::error::{CouncilError, Result};
use crate::manager::{
    ChatCompletionGroupChatManager, GroupChatManager, RoundLimit, RoundRobinGroupChatManager,
};
use crate::session::{Session, SessionHandle};
use crate::transcript::ChatMessage;

/// One agent's contribution to a `/chat` reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentAnswer {
    pub agent: String,
    pub answer: String,
}

impl From<ChatMessage> for AgentAnswer {
    fn from(message: ChatMessage) -> Self {
        Self {
            agent: message.name.unwrap_or_default(),
            answer: message.content,
        }
    }
}

/// How the "everyone speaks before anyone repeats" rule is applied
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FairnessPolicy {
    /// Stated in the selection prompt only; the model may ignore it
    #[default]
    Advisory,
    /// A repeat selection while someone is still silent fails the request
    Enforce,
}

/// Driver tuning
#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    pub mode: OrchestrationMode,
    pub max_rounds: usize,
    pub agent_timeout: Duration,
    pub fairness: FairnessPolicy,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            mode: OrchestrationMode::GroupChat,
            max_rounds: 10,
            agent_timeout: Duration::from_secs(20),
            fairness: FairnessPolicy::Advisory,
        }
    }
}

impl OrchestratorOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            mode: settings.mode,
            max_rounds: settings.max_rounds,
            agent_timeout: settings.agent_timeout,
            fairness: FairnessPolicy::Advisory,
        }
    }
}

/// Runs conversations over a fixed agent team.
///
/// Each conversation is strictly sequential; independent conversations may
/// run concurrently on the same orchestrator.
pub struct Orchestrator {
    agents: Vec<AgentHandle>,
    /// Backs model-driven managers
    service: Arc<dyn ChatCompletion>,
    options: OrchestratorOptions,
    /// Conversations currently in flight
    sessions: RwLock<HashMap<Uuid, SessionHandle>>,
    events: Option<EventSink>,
}

impl Orchestrator {
    pub fn new(
        agents: Vec<AgentHandle>,
        service: Arc<dyn ChatCompletion>,
        options: OrchestratorOptions,
    ) -> Self {
        Self {
            agents,
            service,
            options,
            sessions: RwLock::new(HashMap::new()),
            events: None,
        }
    }

    /// Publish conversation events to `sink`
    pub fn with_events(mut self, sink: EventSink) -> Self {
        self.events = Some(sink);
        self
    }

    pub fn agents(&self) -> &[AgentHandle] {
        &self.agents
    }

    pub fn options(&self) -> &OrchestratorOptions {
        &self.options
    }

    pub fn session_ids(&self) -> Vec<Uuid> {
        self.sessions.read().keys().copied().collect()
    }

    /// Answer a user's message using the configured orchestration mode
    #[instrument(skip(self, message), fields(mode = ?self.options.mode))]
    pub async fn run(&self, user: &str, message: &str) -> Result<Vec<AgentAnswer>> {
        let session = SessionHandle::new(Session::new(user, message));
        let session_id = session.id();
        let _registered = SessionGuard::register(&self.sessions, &session);
        self.emit(ChatEvent::SessionStarted {
            session_id,
            user: user.to_string(),
            task: message.to_string(),
        });

        let result = match self.options.mode {
            OrchestrationMode::GroupChat => {
                let manager =
                    ChatCompletionGroupChatManager::new(message, Arc::clone(&self.service))
                        .with_round_limit(RoundLimit::new(self.options.max_rounds));
                self.group_chat(&session, &manager)
                    .await
                    .map(|filtered| vec![AgentAnswer::from(filtered.result)])
            }
            OrchestrationMode::RoundRobin => {
                let manager = RoundRobinGroupChatManager::new(self.options.max_rounds);
                self.group_chat(&session, &manager)
                    .await
                    .map(|filtered| vec![AgentAnswer::from(filtered.result)])
            }
            OrchestrationMode::Concurrent => self.concurrent(&session).await,
            OrchestrationMode::Sequential => self.sequential(&session).await,
        };

        if let Err(e) = &result {
            error!(session_id = %session_id, error = %e, "Conversation failed");
            self.emit(ChatEvent::SessionFailed {
                session_id,
                error: e.to_string(),
            });
        }
        result
    }

    /// Drive a group chat until the manager terminates it, then filter the result
    pub async fn group_chat(
        &self,
        session: &SessionHandle,
        manager: &dyn GroupChatManager,
    ) -> Result<MessageResult> {
        let participants = participants_of(&self.agents);
        info!(
            session_id = %session.id,
            manager = manager.name(),
            participants = participants.len(),
            "Starting group chat"
        );

        loop {
            let transcript = session.transcript();

            let input = manager.should_request_user_input(&transcript).await?;
            if input.result {
                warn!(
                    reason = %input.reason,
                    "Manager requested user input; no human channel, continuing"
                );
            }

            let termination = manager.should_terminate(&transcript).await?;
            let terminate = termination.result;
            self.emit(ChatEvent::decided(session.id, termination.into()));
            if terminate {
                break;
            }

            let selection = manager.select_next_agent(&transcript, &participants).await?;
            if self.options.fairness == FairnessPolicy::Enforce {
                session.check_fairness(&selection.result, &participants)?;
            }
            let agent = self.agent(&selection.result)?;
            self.emit(ChatEvent::decided(session.id, selection.into()));

            let reply = agent.invoke(&transcript).await?;
            self.emit(ChatEvent::AgentResponded {
                session_id: session.id,
                agent: agent.name().to_string(),
                content: reply.content.clone(),
            });
            session.record(reply);
        }

        let filtered = manager.filter_results(&session.transcript()).await?;
        self.emit(ChatEvent::decided(session.id, filtered.clone().into()));
        info!(session_id = %session.id, turns = session.turn_count(), "Group chat finished");
        Ok(filtered)
    }

    /// Ask every agent in parallel; all must answer within the timeout.
    ///
    /// Answers come back in roster order.
    pub async fn concurrent(&self, session: &SessionHandle) -> Result<Vec<AgentAnswer>> {
        let timeout = self.options.agent_timeout;
        let mut tasks = JoinSet::new();
        for (index, agent) in self.agents.iter().enumerate() {
            let agent = agent.clone();
            let user = session.user.clone();
            let task = session.task.clone();
            tasks.spawn(async move { (index, agent.answer(&user, &task).await) });
        }

        let mut replies: Vec<Option<ChatMessage>> = vec![None; self.agents.len()];
        let collect = async {
            while let Some(joined) = tasks.join_next().await {
                let (index, reply) = joined.map_err(|e| CouncilError::AgentTask(e.to_string()))?;
                replies[index] = Some(reply?);
            }
            Ok::<(), CouncilError>(())
        };

        match tokio::time::timeout(timeout, collect).await {
            Ok(outcome) => outcome?,
            Err(_) => {
                warn!(session_id = %session.id, ?timeout, "Agents did not answer in time");
                return Err(CouncilError::Timeout(timeout));
            }
        }

        let mut answers = Vec::with_capacity(replies.len());
        for reply in replies.into_iter().flatten() {
            self.emit(ChatEvent::AgentResponded {
                session_id: session.id,
                agent: reply.name.clone().unwrap_or_default(),
                content: reply.content.clone(),
            });
            session.record(reply.clone());
            answers.push(AgentAnswer::from(reply));
        }
        debug!(session_id = %session.id, answers = answers.len(), "Concurrent round complete");
        Ok(answers)
    }

    /// Run agents in roster order, each taking the previous answer as its task
    pub async fn sequential(&self, session: &SessionHandle) -> Result<Vec<AgentAnswer>> {
        let mut task = session.task.clone();
        let mut answers = Vec::with_capacity(self.agents.len());

        for agent in &self.agents {
            let reply = agent.answer(&session.user, &task).await?;
            self.emit(ChatEvent::AgentResponded {
                session_id: session.id,
                agent: agent.name().to_string(),
                content: reply.content.clone(),
            });
            task = reply.content.clone();
            session.record(reply.clone());
            answers.push(AgentAnswer::from(reply));
        }

        Ok(answers)
    }

    fn agent(&self, name: &str) -> Result<&AgentHandle> {
        self.agents
            .iter()
            .find(|a| a.name() == name)
            .ok_or_else(|| CouncilError::UnknownParticipant(name.to_string()))
    }

    fn emit(&self, event: ChatEvent) {
        if let Some(sink) = &self.events {
            sink.emit(event);
        }
    }
}

/// Keeps a session in the in-flight map until dropped, including when the
/// request future is cancelled mid-conversation.
struct SessionGuard<'a> {
    sessions: &'a RwLock<HashMap<Uuid, SessionHandle>>,
    id: Uuid,
}

impl<'a> SessionGuard<'a> {
    fn register(
        sessions: &'a RwLock<HashMap<Uuid, SessionHandle>>,
        session: &SessionHandle,
    ) -> Self {
        let id = session.id();
        sessions.write().insert(id, session.clone());
        Self { sessions, id }
    }
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        if self.sessions.write().remove(&self.id).is_some() {
            debug!(session_id = %self.id, "Session released");
        }
    }
}
