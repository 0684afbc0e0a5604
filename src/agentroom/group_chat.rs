//! Group chat orchestration.
//!
//! A [`GroupChatManager`] runs one conversation at a time among a fixed roster of
//! [`Participant`]s: LLM-backed [`Agent`]s and [`HumanProxy`] seats whose replies come from a
//! [`HumanInputProvider`]. Each turn the manager
//!
//! 1. asks its [`SpeakerSelector`] who speaks next,
//! 2. routes every message the speaker has not seen yet into the speaker's session (agents)
//!    or asks the input provider for a reply (humans),
//! 3. appends the reply to the transcript and hands it to every registered
//!    [`DispatchHook`],
//! 4. stops when the [`TerminationCondition`] matches, `max_round` messages were produced, or
//!    a human typed `exit`.
//!
//! ```text
//!           ┌──────────────┐ next_speaker ┌─────────────────┐
//!           │ GroupChat-   │─────────────▶│ SpeakerSelector │
//!           │ Manager      │◀─────────────└─────────────────┘
//!           │              │  send / get_human_input
//!           │              │────────────▶ Agent | HumanProxy
//!           │              │  on_dispatch(record)
//!           └──────────────┘────────────▶ DispatchHook (e.g. the websocket relay)
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use agentroom::Agent;
//! use agentroom::clients::openai::OpenAIClient;
//! use agentroom::group_chat::{
//!     GroupChatManager, HumanInputMode, HumanProxy, Participant, RoundRobinSelector,
//!     TerminationCondition,
//! };
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//! let llm = Arc::new(OpenAIClient::new_with_model_string("key", "gpt-4-1106-preview"));
//! let mut chat = GroupChatManager::new("demo")
//!     .with_selector(Arc::new(RoundRobinSelector))
//!     .with_termination(TerminationCondition::contains("TERMINATE"))
//!     .with_max_round(6);
//! chat.add_participant(Participant::human(
//!     HumanProxy::new("user_proxy").with_mode(HumanInputMode::Never),
//! ))?;
//! chat.add_participant(Participant::agent(Agent::new("writer", "writer", llm)))?;
//!
//! let outcome = chat.initiate_chat("user_proxy", "Write a haiku about Rust", true).await?;
//! println!("ended: {}", outcome.termination);
//! # Ok(())
//! # }
//! ```

use std::error::Error;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::agentroom::agent::Agent;
use crate::agentroom::client_wrapper::{ClientWrapper, Message, Role};
use crate::agentroom::event::{ChatEvent, EventHandler};

/// Default number of messages a conversation may produce, initial message included.
pub const DEFAULT_MAX_ROUND: usize = 10;

/// Reply a human can type to end the conversation early.
pub const EXIT_COMMAND: &str = "exit";

/// One contribution to a conversation. Immutable once created.
#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub sender_name: String,
    pub content: Arc<str>,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(sender_name: impl Into<String>, content: impl AsRef<str>) -> Self {
        Self {
            sender_name: sender_name.into(),
            content: Arc::from(content.as_ref()),
            timestamp: Utc::now(),
        }
    }
}

/// What the manager hands to its hooks.
#[derive(Debug, Clone)]
pub enum Dispatch {
    /// A message that joined the transcript.
    Record(ChatMessage),
    /// A scheduling notice (e.g. which participant speaks next); never part of the transcript.
    Signal(String),
}

/// Observer called for every dispatch, in registration order. An error aborts the
/// conversation.
#[async_trait]
pub trait DispatchHook: Send + Sync {
    async fn on_dispatch(&self, dispatch: &Dispatch) -> Result<(), Box<dyn Error + Send + Sync>>;
}

/// Source of replies for human participants.
#[async_trait]
pub trait HumanInputProvider: Send + Sync {
    /// Show `prompt` to the human and wait for the reply.
    async fn get_human_input(&self, prompt: &str) -> Result<String, Box<dyn Error + Send + Sync>>;
}

/// Predicate over the latest message deciding whether the conversation is over.
#[derive(Clone)]
pub struct TerminationCondition {
    description: String,
    predicate: Arc<dyn Fn(&ChatMessage) -> bool + Send + Sync>,
}

impl TerminationCondition {
    pub fn new(
        description: impl Into<String>,
        predicate: impl Fn(&ChatMessage) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            description: description.into(),
            predicate: Arc::new(predicate),
        }
    }

    /// Terminate once a message contains `needle`.
    pub fn contains(needle: impl Into<String>) -> Self {
        let needle = needle.into();
        let description = format!("message contains '{}'", needle);
        Self::new(description, move |message| message.content.contains(needle.as_str()))
    }

    /// Never terminate early; only `max_round` ends the conversation.
    pub fn never() -> Self {
        Self::new("never", |_| false)
    }

    pub fn is_met(&self, message: &ChatMessage) -> bool {
        (self.predicate)(message)
    }
}

impl Default for TerminationCondition {
    fn default() -> Self {
        Self::contains("TERMINATE")
    }
}

impl fmt::Debug for TerminationCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TerminationCondition")
            .field("description", &self.description)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HumanInputMode {
    /// Ask the input provider every time this participant is selected.
    Always,
    /// Never ask; answer with the default reply.
    Never,
}

/// A roster seat filled by a person.
pub struct HumanProxy {
    pub name: String,
    pub description: String,
    mode: HumanInputMode,
    default_reply: String,
    input: Option<Arc<dyn HumanInputProvider>>,
}

impl HumanProxy {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: "The human user who asked the question and approves the results."
                .to_string(),
            mode: HumanInputMode::Always,
            default_reply: String::new(),
            input: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_mode(mut self, mode: HumanInputMode) -> Self {
        self.mode = mode;
        self
    }

    /// Reply used when the mode is `Never` or the human submits an empty message.
    pub fn with_default_reply(mut self, reply: impl Into<String>) -> Self {
        self.default_reply = reply.into();
        self
    }

    pub fn with_input_provider(mut self, provider: Arc<dyn HumanInputProvider>) -> Self {
        self.input = Some(provider);
        self
    }

    pub fn set_input_provider(&mut self, provider: Arc<dyn HumanInputProvider>) {
        self.input = Some(provider);
    }

    pub fn mode(&self) -> HumanInputMode {
        self.mode
    }
}

/// A seat on the group chat roster.
pub enum Participant {
    /// An LLM backed agent with its own system prompt and tools.
    Agent(Box<Agent>),
    /// The seat that speaks for the connected human.
    Human(HumanProxy),
}

impl Participant {
    pub fn agent(agent: Agent) -> Self {
        Participant::Agent(Box::new(agent))
    }

    pub fn human(proxy: HumanProxy) -> Self {
        Participant::Human(proxy)
    }

    pub fn name(&self) -> &str {
        match self {
            Participant::Agent(agent) => &agent.name,
            Participant::Human(human) => &human.name,
        }
    }

    fn info(&self) -> ParticipantInfo {
        match self {
            Participant::Agent(agent) => ParticipantInfo {
                name: agent.name.clone(),
                description: agent
                    .expertise
                    .clone()
                    .unwrap_or_else(|| format!("The {} assistant.", agent.name)),
                is_human: false,
            },
            Participant::Human(human) => ParticipantInfo {
                name: human.name.clone(),
                description: human.description.clone(),
                is_human: true,
            },
        }
    }
}

/// What a [`SpeakerSelector`] knows about each roster seat.
#[derive(Debug, Clone)]
pub struct ParticipantInfo {
    pub name: String,
    pub description: String,
    pub is_human: bool,
}

/// Decides who speaks next. Returns an index into `roster`.
#[async_trait]
pub trait SpeakerSelector: Send + Sync {
    async fn next_speaker(
        &self,
        roster: &[ParticipantInfo],
        transcript: &[ChatMessage],
    ) -> Result<usize, Box<dyn Error + Send + Sync>>;
}

/// Cycles through the roster starting after the author of the latest message.
pub struct RoundRobinSelector;

impl RoundRobinSelector {
    fn pick(roster: &[ParticipantInfo], transcript: &[ChatMessage]) -> usize {
        let last = transcript
            .last()
            .and_then(|m| roster.iter().position(|p| p.name == m.sender_name));
        match last {
            Some(idx) => (idx + 1) % roster.len(),
            None => 0,
        }
    }
}

#[async_trait]
impl SpeakerSelector for RoundRobinSelector {
    async fn next_speaker(
        &self,
        roster: &[ParticipantInfo],
        transcript: &[ChatMessage],
    ) -> Result<usize, Box<dyn Error + Send + Sync>> {
        if roster.is_empty() {
            return Err(Box::new(ChatError::NoParticipants));
        }
        Ok(Self::pick(roster, transcript))
    }
}

/// Asks an LLM to pick the next role from the conversation so far, falling back to round
/// robin when the answer names no single participant or the call fails.
pub struct LlmSpeakerSelector {
    client: Arc<dyn ClientWrapper>,
}

impl LlmSpeakerSelector {
    pub fn new(client: Arc<dyn ClientWrapper>) -> Self {
        Self { client }
    }

    fn build_prompt(roster: &[ParticipantInfo], transcript: &[ChatMessage]) -> Vec<Message> {
        let roles = roster
            .iter()
            .map(|p| format!("{}: {}", p.name, p.description))
            .collect::<Vec<_>>()
            .join("\n");
        let names = roster
            .iter()
            .map(|p| p.name.as_str())
            .collect::<Vec<_>>()
            .join(", ");

        let mut messages = Vec::with_capacity(transcript.len() + 2);
        messages.push(Message::new(
            Role::System,
            format!(
                "You are in a role play game. The following roles are available:\n{}.\n\n\
                 Read the following conversation.\n\
                 Then select the next role from [{}] to play. Only return the role.",
                roles, names
            ),
        ));
        for message in transcript {
            messages.push(Message::new(
                Role::User,
                format!("{}: {}", message.sender_name, message.content),
            ));
        }
        messages.push(Message::new(
            Role::User,
            format!(
                "Read the above conversation. Then select the next role from [{}] to play. \
                 Only return the role.",
                names
            ),
        ));
        messages
    }
}

/// Map a free-form model answer onto exactly one roster entry.
pub fn match_speaker(reply: &str, roster: &[ParticipantInfo]) -> Option<usize> {
    let reply = reply.trim().trim_matches(|c: char| c == '"' || c == '\'' || c == '.');
    if let Some(idx) = roster.iter().position(|p| p.name.eq_ignore_ascii_case(reply)) {
        return Some(idx);
    }
    let lowered = reply.to_lowercase();
    let mentioned: Vec<usize> = roster
        .iter()
        .enumerate()
        .filter(|(_, p)| lowered.contains(&p.name.to_lowercase()))
        .map(|(i, _)| i)
        .collect();
    match mentioned.as_slice() {
        [only] => Some(*only),
        _ => None,
    }
}

#[async_trait]
impl SpeakerSelector for LlmSpeakerSelector {
    async fn next_speaker(
        &self,
        roster: &[ParticipantInfo],
        transcript: &[ChatMessage],
    ) -> Result<usize, Box<dyn Error + Send + Sync>> {
        if roster.is_empty() {
            return Err(Box::new(ChatError::NoParticipants));
        }
        let prompt = Self::build_prompt(roster, transcript);
        match self.client.send_message(&prompt).await {
            Ok(reply) => match match_speaker(&reply.content, roster) {
                Some(idx) => Ok(idx),
                None => {
                    log::warn!(
                        "speaker selection answer '{}' names no single participant, using round robin",
                        reply.content
                    );
                    Ok(RoundRobinSelector::pick(roster, transcript))
                }
            },
            Err(e) => {
                log::warn!("speaker selection failed ({}), using round robin", e);
                Ok(RoundRobinSelector::pick(roster, transcript))
            }
        }
    }
}

/// Errors that end a group chat run.
#[derive(Debug)]
pub enum ChatError {
    NoParticipants,
    DuplicateParticipant(String),
    /// The initiator is not on the roster.
    UnknownParticipant(String),
    /// A human seat in `Always` mode has no input provider attached.
    MissingHumanInput(String),
    /// The selector failed or named a speaker that is not on the roster.
    SpeakerSelection(String),
    /// An agent turn failed. `message` carries the underlying client or tool error.
    Agent {
        name: String,
        message: String,
    },
    /// The human input provider failed, for example on timeout or disconnect.
    HumanInput(Box<dyn Error + Send + Sync>),
    /// A dispatch hook rejected a message.
    Dispatch(Box<dyn Error + Send + Sync>),
}

impl fmt::Display for ChatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatError::NoParticipants => write!(f, "group chat has no participants"),
            ChatError::DuplicateParticipant(name) => {
                write!(f, "participant '{}' is already on the roster", name)
            }
            ChatError::UnknownParticipant(name) => {
                write!(f, "participant '{}' is not on the roster", name)
            }
            ChatError::MissingHumanInput(name) => {
                write!(f, "no human input provider attached for '{}'", name)
            }
            ChatError::SpeakerSelection(msg) => write!(f, "speaker selection failed: {}", msg),
            ChatError::Agent { name, message } => write!(f, "agent '{}' failed: {}", name, message),
            ChatError::HumanInput(e) => write!(f, "human input failed: {}", e),
            ChatError::Dispatch(e) => write!(f, "dispatch failed: {}", e),
        }
    }
}

impl Error for ChatError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ChatError::HumanInput(e) | ChatError::Dispatch(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminationReason {
    /// The termination condition matched a message from this participant.
    ConditionMet { sender: String },
    MaxRoundReached,
    /// A human replied with the exit command.
    HumanExit,
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminationReason::ConditionMet { sender } => {
                write!(f, "termination condition met by {}", sender)
            }
            TerminationReason::MaxRoundReached => write!(f, "max round reached"),
            TerminationReason::HumanExit => write!(f, "human exited"),
        }
    }
}

/// Result of one [`GroupChatManager::initiate_chat`] call.
#[derive(Debug, Clone)]
pub struct ChatOutcome {
    /// Messages produced by this conversation, initial message included.
    pub messages: Vec<ChatMessage>,
    pub termination: TerminationReason,
}

/// Runs a multi-party conversation over a roster of [`Participant`]s.
///
/// Each round the manager asks its [`SpeakerSelector`] who talks next, routes the unseen part
/// of the transcript to that participant, appends the reply and hands it to every
/// [`DispatchHook`]. A run ends on the termination condition, on `max_round`, or when the
/// human exits.
///
/// ```rust,ignore
/// let mut room = GroupChatManager::new("room").with_max_round(6);
/// room.add_participant(Participant::human(HumanProxy::new("user_proxy")))?;
/// room.add_participant(Participant::agent(director))?;
/// room.attach_relay(Arc::new(Relay::new(session)));
/// let outcome = room.initiate_chat("user_proxy", "find rust jobs", true).await?;
/// ```
pub struct GroupChatManager {
    name: String,
    participants: Vec<Participant>,
    /// Per participant: index of the first transcript message not yet routed to it.
    cursors: Vec<usize>,
    transcript: Vec<ChatMessage>,
    max_round: usize,
    termination: TerminationCondition,
    selector: Arc<dyn SpeakerSelector>,
    hooks: Vec<Arc<dyn DispatchHook>>,
    event_handler: Option<Arc<dyn EventHandler>>,
}

impl GroupChatManager {
    /// Empty roster, round robin selection, `TERMINATE` condition, max round 10.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            participants: Vec::new(),
            cursors: Vec::new(),
            transcript: Vec::new(),
            max_round: DEFAULT_MAX_ROUND,
            termination: TerminationCondition::default(),
            selector: Arc::new(RoundRobinSelector),
            hooks: Vec::new(),
            event_handler: None,
        }
    }

    pub fn with_max_round(mut self, max_round: usize) -> Self {
        self.max_round = max_round.max(1);
        self
    }

    pub fn with_termination(mut self, termination: TerminationCondition) -> Self {
        self.termination = termination;
        self
    }

    pub fn with_selector(mut self, selector: Arc<dyn SpeakerSelector>) -> Self {
        self.selector = selector;
        self
    }

    pub fn with_hook(mut self, hook: Arc<dyn DispatchHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    /// Register the handler on the manager and every agent already on the roster; agents
    /// added later pick it up in [`add_participant`](Self::add_participant).
    pub fn with_event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        for participant in &mut self.participants {
            if let Participant::Agent(agent) = participant {
                agent.set_event_handler(Arc::clone(&handler));
            }
        }
        self.event_handler = Some(handler);
        self
    }

    pub fn add_hook(&mut self, hook: Arc<dyn DispatchHook>) {
        self.hooks.push(hook);
    }

    /// Give every human seat the same input provider.
    pub fn set_human_input(&mut self, provider: Arc<dyn HumanInputProvider>) {
        for participant in &mut self.participants {
            if let Participant::Human(human) = participant {
                human.set_input_provider(Arc::clone(&provider));
            }
        }
    }

    /// Register an object that both observes dispatches and answers for the humans.
    pub fn attach_relay<R>(&mut self, relay: Arc<R>)
    where
        R: DispatchHook + HumanInputProvider + 'static,
    {
        self.add_hook(relay.clone());
        self.set_human_input(relay);
    }

    pub fn add_participant(&mut self, mut participant: Participant) -> Result<(), ChatError> {
        if self.participants.iter().any(|p| p.name() == participant.name()) {
            return Err(ChatError::DuplicateParticipant(
                participant.name().to_string(),
            ));
        }
        if let (Participant::Agent(agent), Some(handler)) = (&mut participant, &self.event_handler)
        {
            agent.set_event_handler(Arc::clone(handler));
        }
        self.participants.push(participant);
        self.cursors.push(self.transcript.len());
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn participant_names(&self) -> Vec<&str> {
        self.participants.iter().map(|p| p.name()).collect()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.transcript
    }

    pub fn max_round(&self) -> usize {
        self.max_round
    }

    /// Forget the transcript and every agent's session history.
    pub fn clear_history(&mut self) {
        self.transcript.clear();
        for cursor in &mut self.cursors {
            *cursor = 0;
        }
        for participant in &mut self.participants {
            if let Participant::Agent(agent) = participant {
                agent.clear_history();
            }
        }
    }

    async fn emit(&self, event: ChatEvent) {
        if let Some(handler) = &self.event_handler {
            handler.on_chat_event(&event).await;
        }
    }

    async fn dispatch(&self, dispatch: Dispatch) -> Result<(), ChatError> {
        for hook in &self.hooks {
            hook.on_dispatch(&dispatch).await.map_err(ChatError::Dispatch)?;
        }
        Ok(())
    }

    /// Append a message, hand it to the hooks and report whether it ends the conversation.
    async fn append(&mut self, message: ChatMessage) -> Result<bool, ChatError> {
        self.transcript.push(message.clone());
        self.emit(ChatEvent::MessageAppended {
            chat_name: self.name.clone(),
            sender: message.sender_name.clone(),
            content_length: message.content.len(),
        })
        .await;
        let terminated = self.termination.is_met(&message);
        self.dispatch(Dispatch::Record(message)).await?;
        Ok(terminated)
    }

    /// Run one conversation started by `initiator` saying `message`.
    ///
    /// With `clear_history` the previous transcript and all agent memories are dropped first.
    /// Returns once the termination condition matches, `max_round` messages were produced
    /// in this conversation, or a human replied `exit`.
    pub async fn initiate_chat(
        &mut self,
        initiator: &str,
        message: &str,
        clear_history: bool,
    ) -> Result<ChatOutcome, ChatError> {
        if self.participants.is_empty() {
            return Err(ChatError::NoParticipants);
        }
        if !self.participants.iter().any(|p| p.name() == initiator) {
            return Err(ChatError::UnknownParticipant(initiator.to_string()));
        }
        if clear_history {
            self.clear_history();
        }
        let start = self.transcript.len();

        self.emit(ChatEvent::ConversationStarted {
            chat_name: self.name.clone(),
            initiator: initiator.to_string(),
            participant_count: self.participants.len(),
            history_cleared: clear_history,
        })
        .await;

        let termination = self.run(initiator, message, start).await?;

        let messages = self.transcript[start..].to_vec();
        self.emit(ChatEvent::ConversationTerminated {
            chat_name: self.name.clone(),
            reason: termination.to_string(),
            messages: messages.len(),
        })
        .await;

        Ok(ChatOutcome {
            messages,
            termination,
        })
    }

    async fn run(
        &mut self,
        initiator: &str,
        message: &str,
        start: usize,
    ) -> Result<TerminationReason, ChatError> {
        if self.append(ChatMessage::new(initiator, message)).await? {
            return Ok(TerminationReason::ConditionMet {
                sender: initiator.to_string(),
            });
        }

        let roster: Vec<ParticipantInfo> = self.participants.iter().map(|p| p.info()).collect();
        while self.transcript.len() - start < self.max_round {
            let round = self.transcript.len() - start;
            let speaker = self
                .selector
                .next_speaker(&roster, &self.transcript)
                .await
                .map_err(|e| ChatError::SpeakerSelection(e.to_string()))?;
            if speaker >= self.participants.len() {
                return Err(ChatError::SpeakerSelection(format!(
                    "selector returned index {} for a roster of {}",
                    speaker,
                    self.participants.len()
                )));
            }
            let speaker_name = roster[speaker].name.clone();
            self.emit(ChatEvent::SpeakerSelected {
                chat_name: self.name.clone(),
                round,
                speaker: speaker_name.clone(),
            })
            .await;
            self.dispatch(Dispatch::Signal(format!("next speaker: {}", speaker_name)))
                .await?;

            let reply = match self.take_turn(speaker).await? {
                Some(reply) => reply,
                None => return Ok(TerminationReason::HumanExit),
            };

            if self.append(ChatMessage::new(&speaker_name, reply)).await? {
                return Ok(TerminationReason::ConditionMet {
                    sender: speaker_name,
                });
            }
        }
        Ok(TerminationReason::MaxRoundReached)
    }

    /// Produce the selected participant's reply; `None` means a human asked to exit.
    async fn take_turn(&mut self, speaker: usize) -> Result<Option<String>, ChatError> {
        let unseen_from = self.cursors[speaker];
        self.cursors[speaker] = self.transcript.len();

        match &mut self.participants[speaker] {
            Participant::Agent(agent) => {
                let context = self.transcript[unseen_from..]
                    .iter()
                    .filter(|m| m.sender_name != agent.name)
                    .map(|m| format!("{}: {}", m.sender_name, m.content))
                    .collect::<Vec<_>>()
                    .join("\n\n");
                let prompt = if context.is_empty() {
                    "Continue the conversation.".to_string()
                } else {
                    context
                };
                let response = agent.send(&prompt).await.map_err(|e| ChatError::Agent {
                    name: agent.name.clone(),
                    message: e.to_string(),
                })?;
                Ok(Some(response.content))
            }
            Participant::Human(human) => {
                if human.mode == HumanInputMode::Never {
                    return Ok(Some(human.default_reply.clone()));
                }
                let provider = human
                    .input
                    .clone()
                    .ok_or_else(|| ChatError::MissingHumanInput(human.name.clone()))?;
                let participant = human.name.clone();
                let default_reply = human.default_reply.clone();

                self.emit(ChatEvent::HumanInputRequested {
                    chat_name: self.name.clone(),
                    participant,
                })
                .await;
                let prompt = format!(
                    "Provide feedback to {}. Press enter to skip and use auto-reply, \
                     or type '{}' to end the conversation: ",
                    self.name, EXIT_COMMAND
                );
                let reply = provider
                    .get_human_input(&prompt)
                    .await
                    .map_err(ChatError::HumanInput)?;

                if reply.trim() == EXIT_COMMAND {
                    return Ok(None);
                }
                if reply.is_empty() {
                    return Ok(Some(default_reply));
                }
                Ok(Some(reply))
            }
        }
    }
}
