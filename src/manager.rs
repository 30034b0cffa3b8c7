//! Group chat managers
//!
//! A manager answers the driver's questions at each decision point of a group
//! conversation: pause for a human, stop, who speaks next, and what the final
//! answer is. [`ChatCompletionGroupChatManager`] asks the model for each
//! decision using structured output; [`RoundRobinGroupChatManager`] needs no
//! model at all.
//!
//! Managers never write to the transcript. Each model-backed decision gets a
//! fresh [`PromptContext`] that is discarded after the call.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::completion::ChatCompletion;
use crate::decision::{parse_reply, BooleanResult, MessageResult, ResponseSchema, StringResult};
use crate::error::{CouncilError, Result};
use crate::participants::Participants;
use crate::template::{PromptTemplate, TemplateArgs};
use crate::transcript::{ChatMessage, PromptContext, Role, Transcript};

/// Reason given when the manager declines to ask the user for input
pub const NO_USER_INPUT_REASON: &str = "This group chat manager does not require user input.";

const TERMINATION_INSTRUCTION: &str = "Determine if the discussion should end.";
const SELECTION_INSTRUCTION: &str = "Now select the next participant to speak.";
const FILTER_INSTRUCTION: &str = "Please summarize the discussion.";

const TERMINATION_PROMPT: &str = "\
You are a reviewer that will examine the information provided by the other agents and determine if it answers the query. \
The query under discussion is: {{$topic}}\n\
You need to determine if the discussion has reached a conclusion. \
Answers should be provided from each participant, and the discussion should be complete. \
If you would like to end the discussion, please respond with True. Otherwise, respond with False.";

const SELECTION_PROMPT: &str = "\
You are a reviewer that will examine the information provided by the other agents and determine if it answers the query. \
The query under discussion is: {{$topic}}\n\
You need to select the next participant to speak. \
Here are the names and descriptions of the participants:\n\
{{$participants}}\n\
Please respond with only the name of the participant you would like to select. \
Make sure that each participant speaks at least once before selecting the same participant again.";

const RESULT_FILTER_PROMPT: &str = "\
You are a reviewer that will examine the information provided by the other agents and determine if it answers the query. \
The query under discussion is: {{$topic}}\n\
You have just concluded the discussion. \
Provide the information requested by the user in a concise and clear manner. \
Do not include any additional information or context. \
Use bullet points to summarize the key points if applicable.";

/// Decision hooks the orchestration driver calls during a group chat
#[async_trait]
pub trait GroupChatManager: Send + Sync {
    /// Name used as the author of the filtered result
    fn name(&self) -> &str;

    /// Whether to pause for human input after the latest turn
    async fn should_request_user_input(&self, transcript: &Transcript) -> Result<BooleanResult>;

    /// Whether the discussion is over
    async fn should_terminate(&self, transcript: &Transcript) -> Result<BooleanResult>;

    /// Name of the participant who speaks next; always a key of `participants`
    async fn select_next_agent(
        &self,
        transcript: &Transcript,
        participants: &Participants,
    ) -> Result<StringResult>;

    /// Final answer once the discussion has terminated
    async fn filter_results(&self, transcript: &Transcript) -> Result<MessageResult>;
}

/// Built-in termination check that runs before any model-driven one
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoundLimit {
    pub max_rounds: Option<usize>,
}

impl RoundLimit {
    pub fn new(max_rounds: usize) -> Self {
        Self {
            max_rounds: Some(max_rounds),
        }
    }

    pub fn unlimited() -> Self {
        Self { max_rounds: None }
    }

    /// `Some` when the limit alone decides that the chat is over
    pub fn check(&self, transcript: &Transcript) -> Option<BooleanResult> {
        let max = self.max_rounds?;
        let rounds = transcript.agent_turns();
        (rounds >= max).then(|| {
            BooleanResult::new(true, format!("Maximum number of rounds reached ({rounds}/{max})."))
        })
    }
}

/// Manager that asks the chat-completion service for every decision.
///
/// The service must support structured output.
pub struct ChatCompletionGroupChatManager {
    name: String,
    topic: String,
    service: Arc<dyn ChatCompletion>,
    round_limit: RoundLimit,
    termination_prompt: PromptTemplate,
    selection_prompt: PromptTemplate,
    result_filter_prompt: PromptTemplate,
}

impl ChatCompletionGroupChatManager {
    pub fn new(topic: impl Into<String>, service: Arc<dyn ChatCompletion>) -> Self {
        Self {
            name: "GroupChatManager".to_string(),
            topic: topic.into(),
            service,
            round_limit: RoundLimit::unlimited(),
            termination_prompt: PromptTemplate::new(TERMINATION_PROMPT),
            selection_prompt: PromptTemplate::new(SELECTION_PROMPT),
            result_filter_prompt: PromptTemplate::new(RESULT_FILTER_PROMPT),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_round_limit(mut self, round_limit: RoundLimit) -> Self {
        self.round_limit = round_limit;
        self
    }

    pub fn with_termination_prompt(mut self, prompt: impl Into<PromptTemplate>) -> Self {
        self.termination_prompt = prompt.into();
        self
    }

    pub fn with_selection_prompt(mut self, prompt: impl Into<PromptTemplate>) -> Self {
        self.selection_prompt = prompt.into();
        self
    }

    pub fn with_result_filter_prompt(mut self, prompt: impl Into<PromptTemplate>) -> Self {
        self.result_filter_prompt = prompt.into();
        self
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    fn topic_args(&self) -> TemplateArgs<'static> {
        TemplateArgs::from([("topic", self.topic.clone())])
    }

    /// One structured model call over an ephemeral copy of the transcript
    async fn ask(
        &self,
        system: String,
        transcript: &Transcript,
        instruction: &str,
        schema: ResponseSchema,
    ) -> Result<String> {
        let context = PromptContext::new(system, transcript).with_instruction(instruction);
        debug!(
            manager = %self.name,
            schema = schema.name(),
            messages = context.messages().len(),
            "Requesting decision"
        );
        self.service.complete(context.messages(), Some(schema)).await
    }
}

#[async_trait]
impl GroupChatManager for ChatCompletionGroupChatManager {
    fn name(&self) -> &str {
        &self.name
    }

    async fn should_request_user_input(&self, _transcript: &Transcript) -> Result<BooleanResult> {
        Ok(BooleanResult::new(false, NO_USER_INPUT_REASON))
    }

    async fn should_terminate(&self, transcript: &Transcript) -> Result<BooleanResult> {
        if let Some(decision) = self.round_limit.check(transcript) {
            info!(manager = %self.name, reason = %decision.reason, "Terminating on round limit");
            return Ok(decision);
        }

        let system = self.termination_prompt.render(&self.topic_args());
        let raw = self
            .ask(system, transcript, TERMINATION_INSTRUCTION, ResponseSchema::Boolean)
            .await?;
        let decision: BooleanResult = parse_reply(&raw)?;

        info!(
            manager = %self.name,
            terminate = decision.result,
            reason = %decision.reason,
            "Should terminate"
        );
        Ok(decision)
    }

    async fn select_next_agent(
        &self,
        transcript: &Transcript,
        participants: &Participants,
    ) -> Result<StringResult> {
        if participants.is_empty() {
            return Err(CouncilError::NoParticipants);
        }

        let mut args = self.topic_args();
        args.insert("participants", participants.listing());
        let system = self.selection_prompt.render(&args);

        let raw = self
            .ask(system, transcript, SELECTION_INSTRUCTION, ResponseSchema::String)
            .await?;
        let selection: StringResult = parse_reply(&raw)?;

        info!(
            manager = %self.name,
            next = %selection.result,
            reason = %selection.reason,
            "Next participant"
        );

        if participants.contains(&selection.result) {
            Ok(selection)
        } else {
            Err(CouncilError::UnknownParticipant(raw))
        }
    }

    async fn filter_results(&self, transcript: &Transcript) -> Result<MessageResult> {
        if transcript.is_empty() {
            return Err(CouncilError::EmptyTranscript);
        }

        let system = self.result_filter_prompt.render(&self.topic_args());
        let raw = self
            .ask(system, transcript, FILTER_INSTRUCTION, ResponseSchema::String)
            .await?;
        let summary: StringResult = parse_reply(&raw)?;

        info!(manager = %self.name, reason = %summary.reason, "Filtered result");
        Ok(MessageResult {
            result: ChatMessage::assistant(summary.result).with_name(self.name.clone()),
            reason: summary.reason,
        })
    }
}

/// Manager that lets participants speak in registry order for a fixed number of rounds
pub struct RoundRobinGroupChatManager {
    name: String,
    round_limit: RoundLimit,
}

impl RoundRobinGroupChatManager {
    pub fn new(max_rounds: usize) -> Self {
        Self {
            name: "RoundRobinManager".to_string(),
            round_limit: RoundLimit::new(max_rounds),
        }
    }
}

#[async_trait]
impl GroupChatManager for RoundRobinGroupChatManager {
    fn name(&self) -> &str {
        &self.name
    }

    async fn should_request_user_input(&self, _transcript: &Transcript) -> Result<BooleanResult> {
        Ok(BooleanResult::new(false, NO_USER_INPUT_REASON))
    }

    async fn should_terminate(&self, transcript: &Transcript) -> Result<BooleanResult> {
        Ok(self
            .round_limit
            .check(transcript)
            .unwrap_or_else(|| BooleanResult::new(false, "Round limit not reached.")))
    }

    async fn select_next_agent(
        &self,
        transcript: &Transcript,
        participants: &Participants,
    ) -> Result<StringResult> {
        let index = transcript.agent_turns() % participants.len().max(1);
        let name = participants.nth(index).ok_or(CouncilError::NoParticipants)?;
        Ok(StringResult {
            result: name.to_string(),
            reason: format!("Round-robin turn {}.", transcript.agent_turns() + 1),
        })
    }

    async fn filter_results(&self, transcript: &Transcript) -> Result<MessageResult> {
        let last = transcript.last().ok_or(CouncilError::EmptyTranscript)?;
        let content = transcript
            .messages()
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant)
            .unwrap_or(last)
            .content
            .clone();
        Ok(MessageResult {
            result: ChatMessage::assistant(content).with_name(self.name.clone()),
            reason: "Last agent message of the discussion.".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedCompletion;

    fn nba_participants() -> Participants {
        [
            ("Threshold", "Order velocity threshold analysis"),
            ("AccountOwner", "Account owner finder"),
        ]
        .into_iter()
        .collect()
    }

    fn nba_transcript() -> Transcript {
        Transcript::with_task("user", "What is the NBA for Acme?")
    }

    fn manager(service: &Arc<ScriptedCompletion>) -> ChatCompletionGroupChatManager {
        ChatCompletionGroupChatManager::new("What is the NBA for Acme?", service.clone())
    }

    // === User Input Tests ===

    #[tokio::test]
    async fn test_never_requests_user_input() {
        let service = Arc::new(ScriptedCompletion::new(Vec::<String>::new()));
        let manager = manager(&service);

        for transcript in [Transcript::new(), nba_transcript()] {
            let decision = manager.should_request_user_input(&transcript).await.unwrap();
            assert!(!decision.result);
            assert_eq!(decision.reason, NO_USER_INPUT_REASON);
        }
        assert_eq!(service.call_count(), 0);
    }

    // === Selection Tests ===

    #[tokio::test]
    async fn test_select_returns_model_choice() {
        let service = Arc::new(ScriptedCompletion::new([
            r#"{"result":"Threshold","reason":"has relevant data"}"#,
        ]));
        let manager = manager(&service);

        let selection = manager
            .select_next_agent(&nba_transcript(), &nba_participants())
            .await
            .unwrap();

        assert_eq!(selection.result, "Threshold");
        assert_eq!(selection.reason, "has relevant data");
    }

    #[tokio::test]
    async fn test_select_accepts_every_registered_name() {
        let participants = nba_participants();
        for name in participants.names() {
            let reply = format!(r#"{{"result":"{name}","reason":"r"}}"#);
            let service = Arc::new(ScriptedCompletion::new([reply]));
            let selection = manager(&service)
                .select_next_agent(&nba_transcript(), &participants)
                .await
                .unwrap();
            assert_eq!(selection.result, name);
        }
    }

    #[tokio::test]
    async fn test_select_unknown_participant_fails_with_raw_reply() {
        let raw = r#"{"result":"Marketing","reason":"seems helpful"}"#;
        let service = Arc::new(ScriptedCompletion::new([raw]));

        let err = manager(&service)
            .select_next_agent(&nba_transcript(), &nba_participants())
            .await
            .unwrap_err();

        match err {
            CouncilError::UnknownParticipant(value) => assert_eq!(value, raw),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(service.call_count(), 1);
    }

    #[tokio::test]
    async fn test_select_prompt_lists_participants_and_fairness_rule() {
        let service = Arc::new(ScriptedCompletion::new([
            r#"{"result":"AccountOwner","reason":"r"}"#,
        ]));
        manager(&service)
            .select_next_agent(&nba_transcript(), &nba_participants())
            .await
            .unwrap();

        let call = &service.calls()[0];
        assert_eq!(call.schema, Some(ResponseSchema::String));
        let system = &call.messages[0];
        assert_eq!(system.role, Role::System);
        assert!(system.content.contains(
            "Threshold: Order velocity threshold analysis\nAccountOwner: Account owner finder"
        ));
        assert!(system.content.contains("What is the NBA for Acme?"));
        assert!(system.content.contains("speaks at least once"));
        assert!(!system.content.contains("{{"));

        let last = call.messages.last().unwrap();
        assert_eq!(*last, ChatMessage::user(SELECTION_INSTRUCTION));
    }

    #[tokio::test]
    async fn test_select_with_no_participants() {
        let service = Arc::new(ScriptedCompletion::new(Vec::<String>::new()));
        let err = manager(&service)
            .select_next_agent(&nba_transcript(), &Participants::new())
            .await
            .unwrap_err();
        assert!(matches!(err, CouncilError::NoParticipants));
        assert_eq!(service.call_count(), 0);
    }

    // === Termination Tests ===

    #[tokio::test]
    async fn test_terminate_asks_model() {
        let service = Arc::new(ScriptedCompletion::new([
            r#"{"result":false,"reason":"AccountOwner has not answered"}"#,
        ]));
        let decision = manager(&service)
            .should_terminate(&nba_transcript())
            .await
            .unwrap();

        assert!(!decision.result);
        assert_eq!(decision.reason, "AccountOwner has not answered");
        let call = &service.calls()[0];
        assert_eq!(call.schema, Some(ResponseSchema::Boolean));
        assert_eq!(*call.messages.last().unwrap(), ChatMessage::user(TERMINATION_INSTRUCTION));

        let system = &call.messages[0];
        assert_eq!(system.role, Role::System);
        assert!(system.content.contains("What is the NBA for Acme?"));
        assert!(!system.content.contains("{{"));
    }

    #[tokio::test]
    async fn test_round_limit_short_circuits_model() {
        let service = Arc::new(ScriptedCompletion::new(Vec::<String>::new()));
        let manager = manager(&service).with_round_limit(RoundLimit::new(1));

        let mut transcript = nba_transcript();
        transcript.push(ChatMessage::assistant("done").with_name("Threshold"));

        let decision = manager.should_terminate(&transcript).await.unwrap();
        assert!(decision.result);
        assert!(decision.reason.contains("Maximum number of rounds"));
        assert_eq!(service.call_count(), 0);
    }

    #[tokio::test]
    async fn test_terminate_schema_violation() {
        let service = Arc::new(ScriptedCompletion::new(["True"]));
        let err = manager(&service)
            .should_terminate(&nba_transcript())
            .await
            .unwrap_err();
        assert!(matches!(err, CouncilError::SchemaViolation { .. }));
    }

    #[tokio::test]
    async fn test_decisions_leave_transcript_untouched() {
        let service = Arc::new(ScriptedCompletion::new([
            r#"{"result":false,"reason":"r"}"#,
            r#"{"result":"Threshold","reason":"r"}"#,
            r#"{"result":"summary","reason":"r"}"#,
        ]));
        let manager = manager(&service);
        let transcript = nba_transcript();
        let before = transcript.clone();

        manager.should_terminate(&transcript).await.unwrap();
        manager
            .select_next_agent(&transcript, &nba_participants())
            .await
            .unwrap();
        manager.filter_results(&transcript).await.unwrap();

        assert_eq!(transcript, before);
        // every call sees exactly one system prompt, the transcript, and one instruction
        for call in service.calls() {
            assert_eq!(call.messages.len(), transcript.len() + 2);
            assert_eq!(
                call.messages.iter().filter(|m| m.role == Role::System).count(),
                1
            );
        }
    }

    // === Filter Tests ===

    #[tokio::test]
    async fn test_filter_empty_transcript() {
        let service = Arc::new(ScriptedCompletion::new(Vec::<String>::new()));
        let err = manager(&service)
            .filter_results(&Transcript::new())
            .await
            .unwrap_err();
        assert!(matches!(err, CouncilError::EmptyTranscript));
        assert!(err.is_invariant_violation());
    }

    #[tokio::test]
    async fn test_filter_returns_result_verbatim() {
        let service = Arc::new(ScriptedCompletion::new([
            r#"{"result":"- Contact Credit Team\n- Review AR","reason":"covers both holds"}"#,
        ]));
        let filtered = manager(&service)
            .filter_results(&nba_transcript())
            .await
            .unwrap();

        assert_eq!(filtered.result.role, Role::Assistant);
        assert_eq!(filtered.result.content, "- Contact Credit Team\n- Review AR");
        assert_eq!(filtered.result.name.as_deref(), Some("GroupChatManager"));
        assert_eq!(filtered.reason, "covers both holds");
        let call = &service.calls()[0];
        assert_eq!(*call.messages.last().unwrap(), ChatMessage::user(FILTER_INSTRUCTION));

        let system = &call.messages[0];
        assert_eq!(system.role, Role::System);
        assert!(system.content.contains("What is the NBA for Acme?"));
        assert!(!system.content.contains("{{"));
    }

    #[tokio::test]
    async fn test_upstream_failure_propagates() {
        let service = Arc::new(ScriptedCompletion::new(Vec::<String>::new()).then_fail("401"));
        let err = manager(&service)
            .filter_results(&nba_transcript())
            .await
            .unwrap_err();
        assert!(matches!(err, CouncilError::Upstream { .. }));
    }

    // === Round Robin Tests ===

    #[tokio::test]
    async fn test_round_robin_cycles_in_order() {
        let manager = RoundRobinGroupChatManager::new(3);
        let participants = nba_participants();
        let mut transcript = nba_transcript();
        let mut spoken = Vec::new();

        while !manager.should_terminate(&transcript).await.unwrap().result {
            let next = manager
                .select_next_agent(&transcript, &participants)
                .await
                .unwrap();
            transcript.push(
                ChatMessage::assistant(format!("{} says hi", next.result))
                    .with_name(next.result.clone()),
            );
            spoken.push(next.result);
        }

        assert_eq!(spoken, vec!["Threshold", "AccountOwner", "Threshold"]);
        let filtered = manager.filter_results(&transcript).await.unwrap();
        assert_eq!(filtered.result.content, "Threshold says hi");
    }

    #[tokio::test]
    async fn test_round_robin_no_participants() {
        let manager = RoundRobinGroupChatManager::new(3);
        let err = manager
            .select_next_agent(&nba_transcript(), &Participants::new())
            .await
            .unwrap_err();
        assert!(matches!(err, CouncilError::NoParticipants));
    }

    #[test]
    fn test_round_limit_unlimited() {
        let mut transcript = nba_transcript();
        for _ in 0..50 {
            transcript.push(ChatMessage::assistant("x"));
        }
        assert!(RoundLimit::unlimited().check(&transcript).is_none());
        assert!(RoundLimit::new(50).check(&transcript).is_some());
        assert!(RoundLimit::new(51).check(&transcript).is_none());
    }
}
