//! Agent implementation - a single LLM participant

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info, instrument, warn};

use crate::completion::ChatCompletion;
use crate::config::SearchSettings;
use crate::error::Result;
use crate::participants::Participants;
use crate::retrieval::{AzureSearchBackend, RetrievalPlugin, StaticTable};
use crate::transcript::{ChatMessage, PromptContext, Transcript};

/// Where an agent's plugin gets its knowledge
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KnowledgeSource {
    /// Azure AI Search index by name
    Index(String),
    /// Built-in threshold table
    StaticThresholds,
}

/// Declarative description of an agent
#[derive(Debug, Clone)]
pub struct AgentSpec {
    pub name: String,
    pub description: String,
    pub instructions: String,
    pub knowledge: Option<KnowledgeSource>,
}

impl AgentSpec {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        instructions: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            instructions: instructions.into(),
            knowledge: None,
        }
    }

    pub fn with_knowledge(mut self, knowledge: KnowledgeSource) -> Self {
        self.knowledge = Some(knowledge);
        self
    }
}

/// Order-velocity playbook the NBA reviewer applies to a customer's holds
pub const ORDER_VELOCITY_RULES: &str = "\
1. C2 CREDIT HOLDS: Improve Order Velocity
   a. If a C2 hold has not been released, reach out to Credit Team for support releasing the hold or next steps required
   b. Identify the bill-to account numbers placed on credit hold
   c. Review the bill-to accounts placed on credit hold: do any accounts have negative available credit limit?
      i. If yes, review the account's open AR and past due AR
      ii. Do the accounts with credit holds have significant past due AR?
          1. If yes, reach out to Collections Team for update on status of account
          2. If no, reach out to Credit Team and request credit limit realignment
   d. Note: it is important to review credit holds even if all holds are released, there is still opportunity for action

2. RR (REVENUE RECOGNITION) HOLDS: Improve Order Velocity
   a. Has the RR hold been released?
      i. If yes, then check:
          1. Has the order been shipped?
          2. If the order has not been shipped, when is the order release date?
          3. If the order release date is in the past, use E1 to check TN for update on order then reach out to appropriate internal team for update/action
      ii. If no, then check:
          1. Is the order requested date well in the future?
          2. Are there any additional holds on the order? Can any actions be taken on other hold codes?
          3. If the order requested date is not in the future, need to reach out to Finance for status update/action plan

3. LENGTHY HOLD DURATIONS (i.e. CF, PM, S2, etc Holds): Improve Order Velocity
   a. Has the hold been released?
      i. If yes:
          1. Has the order shipped? If yes, no action
          2. Is the order release date in the past? If yes, check order in E1 for updates and reach out to appropriate internal team for update/action
          3. If order release date in future, monitor to ensure order releases and ships as expected
      ii. If no:
          1. When is the order release date?
              a. If in the future, no action
          2. If in the past, check order in E1 for updates and reach out to appropriate internal team for update/action";

fn action_review_instructions() -> String {
    format!(
        "You are an analyst specializing in determining the Next Best Action (NBA) for customer.
You will get a customer name, and then determine the next best action to take based on the data provided by the plugins.

ROLE AND RESPONSIBILITIES:
- Analyze the provided data and recommend the most appropriate next steps for the customer
- Use the plugins to gather specific information about the customer's situation

RULES FOR IMPROVING ORDER VELOCITY:
{ORDER_VELOCITY_RULES}

Provide your answer as a numbered list of clear, concise action items to be taken.
Each action item should be specific, actionable, and directly address the customer's situation based on your analysis. \
Avoid general statements; focus on concrete steps.
Also provide SPECIFIC data from the plugins about the question. For each action item, cite the relevant plugin \
and include any specific data or values retrieved from the plugin that support your recommendation.
Example format:
1. Review the customer's account for outstanding credit holds.
2. Contact the Credit Team to request release of any unresolved C2 holds.
3. If past due AR is identified, coordinate with the Collections Team for an update.
4. Follow up with the Finance Team if RR holds remain unreleased and the order requested date is not in the future.

Ensure each action item is tailored to the scenario and leverages available plugin data."
    )
}

/// The next-best-action agent team
pub fn default_roster() -> Vec<AgentSpec> {
    vec![
        AgentSpec::new(
            "AccountOwner",
            "Account owner finder",
            "You can get access to the employee account owner and customers that they manage data. \
             Answer only questions found in the account-owner index.",
        )
        .with_knowledge(KnowledgeSource::Index("account-owner".into())),
        AgentSpec::new(
            "NBA_Threshold",
            "NBA threshold analysis agent",
            "You are an analyst that will examine the data to determine the next best action or NBA \
             for the customer. Retrieve information from the threshold index.",
        )
        .with_knowledge(KnowledgeSource::StaticThresholds),
        AgentSpec::new(
            "InvoiceAging",
            "Invoice aging analyst",
            "You examine the customer's open invoices and how long they have been outstanding. \
             Answer only with information found in the invoice-aging index.",
        )
        .with_knowledge(KnowledgeSource::Index("invoice-aging-index".into())),
        AgentSpec::new(
            "CreditLimit",
            "Credit limit increase advisor",
            "You find guidance on increasing a customer's credit limit. \
             Answer only with information found in the increase-credit-limit index.",
        )
        .with_knowledge(KnowledgeSource::Index("increase-credit-limit".into())),
        AgentSpec::new(
            "ActionReview",
            "Next best action recommender for order velocity",
            action_review_instructions(),
        )
        .with_knowledge(KnowledgeSource::Index("improve-order-velocity".into())),
        AgentSpec::new(
            "ActionReviewer",
            "Action review agent",
            "You are a reviewer that will examine the information provided by the other agents and \
             determine if it answers the query. The response should be a bulleted list of information \
             that is relevant to the query.",
        ),
    ]
}

/// Per-agent counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AgentStats {
    pub turns: u64,
    pub failures: u64,
}

/// A single agent
pub struct Agent {
    pub name: String,
    /// One-line description shown to the manager
    pub description: String,
    pub instructions: String,
    plugin: Option<RetrievalPlugin>,
    service: Arc<dyn ChatCompletion>,
    top_k: usize,
    stats: RwLock<AgentStats>,
}

impl Agent {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        instructions: impl Into<String>,
        service: Arc<dyn ChatCompletion>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            instructions: instructions.into(),
            plugin: None,
            service,
            top_k: 3,
            stats: RwLock::new(AgentStats::default()),
        }
    }

    pub fn with_plugin(mut self, plugin: RetrievalPlugin) -> Self {
        self.plugin = Some(plugin);
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn plugin(&self) -> Option<&RetrievalPlugin> {
        self.plugin.as_ref()
    }

    pub fn stats(&self) -> AgentStats {
        *self.stats.read()
    }

    /// Take a turn: ground on the latest user question, then answer the transcript
    #[instrument(skip(self, transcript), fields(agent = %self.name))]
    pub async fn invoke(&self, transcript: &Transcript) -> Result<ChatMessage> {
        let result = self.respond(transcript).await;

        let mut stats = self.stats.write();
        match &result {
            Ok(_) => stats.turns += 1,
            Err(e) => {
                stats.failures += 1;
                warn!(agent = %self.name, error = %e, "Agent turn failed");
            }
        }
        result
    }

    /// Answer a standalone task
    pub async fn answer(&self, user: &str, task: &str) -> Result<ChatMessage> {
        self.invoke(&Transcript::with_task(user, task)).await
    }

    async fn respond(&self, transcript: &Transcript) -> Result<ChatMessage> {
        let system = self.system_prompt(transcript).await?;
        let context = PromptContext::new(system, transcript);

        let reply = self.service.complete(context.messages(), None).await?;
        debug!(agent = %self.name, chars = reply.len(), "Agent replied");

        Ok(ChatMessage::assistant(reply).with_name(self.name.clone()))
    }

    async fn system_prompt(&self, transcript: &Transcript) -> Result<String> {
        let Some(plugin) = &self.plugin else {
            return Ok(self.instructions.clone());
        };

        let query = transcript
            .last_user_message()
            .map(|m| m.content.as_str())
            .unwrap_or_default();
        let context = plugin.search(query, self.top_k).await?;

        Ok(format!(
            "{}\n\nContext from {} ({}):\n{}",
            self.instructions, plugin.name, plugin.description, context
        ))
    }
}

/// Cheap shared handle to an agent
#[derive(Clone)]
pub struct AgentHandle {
    inner: Arc<Agent>,
}

impl AgentHandle {
    pub fn new(agent: Agent) -> Self {
        Self {
            inner: Arc::new(agent),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }
}

impl std::ops::Deref for AgentHandle {
    type Target = Agent;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

/// Registry view of a set of agents
pub fn participants_of(agents: &[AgentHandle]) -> Participants {
    agents
        .iter()
        .map(|a| (a.name.clone(), a.description.clone()))
        .collect()
}

/// Instantiate agents from specs.
///
/// Index-backed agents are built without a plugin when no search service is
/// configured.
pub fn build_agents(
    specs: &[AgentSpec],
    service: Arc<dyn ChatCompletion>,
    http: &reqwest::Client,
    search: Option<&SearchSettings>,
    top_k: usize,
) -> Vec<AgentHandle> {
    specs
        .iter()
        .map(|spec| {
            let mut agent = Agent::new(
                spec.name.clone(),
                spec.description.clone(),
                spec.instructions.clone(),
                Arc::clone(&service),
            )
            .with_top_k(top_k);

            match (&spec.knowledge, search) {
                (Some(KnowledgeSource::Index(index)), Some(settings)) => {
                    let backend = AzureSearchBackend::new(http.clone(), settings, index.clone());
                    agent = agent.with_plugin(RetrievalPlugin::new(
                        format!("{}Search", spec.name),
                        format!("Search the {index} index for relevant information"),
                        Arc::new(backend),
                    ));
                }
                (Some(KnowledgeSource::Index(index)), None) => {
                    warn!(
                        agent = %spec.name,
                        index = %index,
                        "No search service configured; agent has no plugin"
                    );
                }
                (Some(KnowledgeSource::StaticThresholds), _) => {
                    agent = agent.with_plugin(RetrievalPlugin::new(
                        "ThresholdTable",
                        "Order velocity threshold metrics",
                        Arc::new(StaticTable::thresholds()),
                    ));
                }
                (None, _) => {}
            }

            info!(
                agent = %spec.name,
                plugin = agent.plugin().map(|p| p.name.as_str()).unwrap_or("none"),
                "Created agent"
            );
            AgentHandle::new(agent)
        })
        .collect()
}
