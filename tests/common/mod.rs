#![allow(dead_code)]

use std::collections::VecDeque;
use std::error::Error;
use std::sync::{Arc, Mutex};

use agentroom::client_wrapper::{ClientWrapper, Message, Role};
use agentroom::group_chat::{
    GroupChatManager, HumanInputMode, HumanProxy, Participant, RoundRobinSelector,
    TerminationCondition,
};
use agentroom::Agent;
use async_trait::async_trait;

/// Always answers with the same text and remembers the last user turn it saw.
pub struct FixedClient {
    reply: String,
    pub last_user_turn: Mutex<Option<String>>,
    pub calls: Mutex<usize>,
}

impl FixedClient {
    pub fn new(reply: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            reply: reply.into(),
            last_user_turn: Mutex::new(None),
            calls: Mutex::new(0),
        })
    }

    pub fn last_user_turn(&self) -> Option<String> {
        self.last_user_turn.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl ClientWrapper for FixedClient {
    async fn send_message(
        &self,
        messages: &[Message],
    ) -> Result<Message, Box<dyn Error + Send + Sync>> {
        *self.calls.lock().unwrap() += 1;
        let last_user = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.to_string());
        *self.last_user_turn.lock().unwrap() = last_user;
        Ok(Message::new(Role::Assistant, &self.reply))
    }

    fn model_name(&self) -> &str {
        "fixed"
    }
}

/// Answers with queued replies in order, repeating the last one when the queue runs dry.
pub struct ScriptedClient {
    replies: Mutex<VecDeque<String>>,
    last: Mutex<String>,
}

impl ScriptedClient {
    pub fn new(replies: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
            last: Mutex::new(String::new()),
        })
    }
}

#[async_trait]
impl ClientWrapper for ScriptedClient {
    async fn send_message(
        &self,
        _messages: &[Message],
    ) -> Result<Message, Box<dyn Error + Send + Sync>> {
        let mut replies = self.replies.lock().unwrap();
        let mut last = self.last.lock().unwrap();
        if let Some(next) = replies.pop_front() {
            *last = next;
        }
        Ok(Message::new(Role::Assistant, last.as_str()))
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

pub struct FailingClient;

#[async_trait]
impl ClientWrapper for FailingClient {
    async fn send_message(
        &self,
        _messages: &[Message],
    ) -> Result<Message, Box<dyn Error + Send + Sync>> {
        Err("upstream model unavailable".into())
    }

    fn model_name(&self) -> &str {
        "failing"
    }
}

pub fn agent(name: &str, client: Arc<dyn ClientWrapper>) -> Participant {
    Participant::agent(Agent::new(name, name, client))
}

pub fn fixed_agent(name: &str) -> Participant {
    agent(name, FixedClient::new(format!("reply from {}", name)))
}

/// `user_proxy` (asks every time) followed by the given fixed-reply agents, round robin,
/// never terminating early.
pub fn room_with_human(agents: &[&str], max_round: usize) -> GroupChatManager {
    let mut room = GroupChatManager::new("room")
        .with_selector(Arc::new(RoundRobinSelector))
        .with_termination(TerminationCondition::never())
        .with_max_round(max_round);
    room.add_participant(Participant::human(
        HumanProxy::new("user_proxy").with_mode(HumanInputMode::Always),
    ))
    .unwrap();
    for name in agents {
        room.add_participant(fixed_agent(name)).unwrap();
    }
    room
}

/// Prompt frame sent by the relay when the manager named `room` asks the human.
pub fn prompt_frame(manager: &str) -> String {
    format!(
        "system: Provide feedback to {}. Press enter to skip and use auto-reply, \
         or type 'exit' to end the conversation: ",
        manager
    )
}
