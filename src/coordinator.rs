use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use tracing::debug;

use crate::agent::{Agent, AgentResponse, TaskContext};
use crate::error::{Phase, Result, SwarmError};
use crate::message::{Message, MessageType, SYSTEM_SENDER};
use crate::swarm::Swarm;

/// What `Swarm::run` hands a coordinator.
#[derive(Debug, Clone)]
pub enum CoordinationInput {
    Task(String),
    Message(Message),
}

impl CoordinationInput {
    pub fn kind(&self) -> &'static str {
        match self {
            CoordinationInput::Task(_) => "task",
            CoordinationInput::Message(_) => "message",
        }
    }
}

impl From<&str> for CoordinationInput {
    fn from(task: &str) -> Self {
        CoordinationInput::Task(task.to_string())
    }
}

impl From<String> for CoordinationInput {
    fn from(task: String) -> Self {
        CoordinationInput::Task(task)
    }
}

impl From<Message> for CoordinationInput {
    fn from(message: Message) -> Self {
        CoordinationInput::Message(message)
    }
}

/// What a coordinator returns: an agent's answer for tasks, or the logical
/// recipients for routed messages.
#[derive(Debug, Clone, PartialEq)]
pub enum CoordinationResult {
    Response(AgentResponse),
    Routed(Vec<String>),
}

impl CoordinationResult {
    pub fn final_answer(&self) -> Option<&str> {
        match self {
            CoordinationResult::Response(r) => Some(r.final_answer()),
            CoordinationResult::Routed(_) => None,
        }
    }

    pub fn into_response(self) -> Option<AgentResponse> {
        match self {
            CoordinationResult::Response(r) => Some(r),
            CoordinationResult::Routed(_) => None,
        }
    }

    pub fn recipients(&self) -> Option<&[String]> {
        match self {
            CoordinationResult::Routed(r) => Some(r),
            CoordinationResult::Response(_) => None,
        }
    }
}

/// An agent handle or a registry id to resolve one from.
#[derive(Clone)]
pub enum AgentTarget {
    Id(String),
    Agent(Arc<dyn Agent>),
}

impl AgentTarget {
    pub fn resolve(self, swarm: &Swarm) -> Result<Arc<dyn Agent>> {
        match self {
            AgentTarget::Agent(agent) => Ok(agent),
            AgentTarget::Id(id) => swarm.agent(&id).ok_or(SwarmError::AgentNotFound(id)),
        }
    }
}

impl fmt::Debug for AgentTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentTarget::Id(id) => f.debug_tuple("Id").field(id).finish(),
            AgentTarget::Agent(a) => f.debug_tuple("Agent").field(&a.name()).finish(),
        }
    }
}

impl From<&str> for AgentTarget {
    fn from(id: &str) -> Self {
        AgentTarget::Id(id.to_string())
    }
}

impl From<String> for AgentTarget {
    fn from(id: String) -> Self {
        AgentTarget::Id(id)
    }
}

impl From<Arc<dyn Agent>> for AgentTarget {
    fn from(agent: Arc<dyn Agent>) -> Self {
        AgentTarget::Agent(agent)
    }
}

impl From<&Arc<dyn Agent>> for AgentTarget {
    fn from(agent: &Arc<dyn Agent>) -> Self {
        AgentTarget::Agent(Arc::clone(agent))
    }
}

/// A pluggable coordination strategy.
///
/// The provided `assign_task`, `route_message`, and `broadcast_message`
/// implement the plain contract: tasks are recorded then run synchronously,
/// messages are recorded exactly once and never delivered. Strategies
/// override what they need.
pub trait Coordinator: Send + Sync {
    fn name(&self) -> &str;

    fn coordinate(&self, swarm: &Swarm, input: CoordinationInput) -> Result<CoordinationResult>;

    fn assign_task(&self, swarm: &Swarm, target: AgentTarget, task: &str) -> Result<AgentResponse> {
        dispatch_task(swarm, SYSTEM_SENDER, target, task)
    }

    /// Record `message` and work out who it is for.
    ///
    /// An explicit `recipient` wins; otherwise an empty recipient list makes
    /// this a broadcast from the message's sender.
    fn route_message(
        &self,
        swarm: &Swarm,
        message: Message,
        recipient: Option<&str>,
    ) -> Result<Vec<String>> {
        if let Some(recipient) = recipient {
            swarm.add_message(message);
            ensure_registered(swarm, recipient)?;
            return Ok(vec![recipient.to_string()]);
        }

        if message.is_broadcast() {
            let sender = message.sender_id().to_string();
            return self.broadcast_message(swarm, message, Some(&sender));
        }

        let recipients = message.recipient_ids().to_vec();
        swarm.add_message(message);
        for id in &recipients {
            ensure_registered(swarm, id)?;
        }
        debug!(recipients = ?recipients, "routed message");
        Ok(recipients)
    }

    /// Record `message` and list every agent except `sender`.
    fn broadcast_message(
        &self,
        swarm: &Swarm,
        message: Message,
        sender: Option<&str>,
    ) -> Result<Vec<String>> {
        swarm.add_message(message);
        let recipients: Vec<String> = swarm
            .agent_names()
            .into_iter()
            .filter(|name| Some(name.as_str()) != sender)
            .collect();
        debug!(sender = ?sender, recipients = recipients.len(), "broadcast message");
        Ok(recipients)
    }
}

/// Record a `task` message from `sender` to the resolved agent, then run it.
///
/// The agent's response is returned as-is; its error is wrapped with
/// [`Phase::Dispatch`] and otherwise untouched.
pub fn dispatch_task(
    swarm: &Swarm,
    sender: &str,
    target: AgentTarget,
    task: &str,
) -> Result<AgentResponse> {
    let agent = target.resolve(swarm)?;
    let message = Message::builder(sender, task)
        .to(agent.name())
        .kind(MessageType::Task)
        .metadata("assigned_at", Utc::now().to_rfc3339())
        .build();
    debug!(
        sender,
        agent = agent.name(),
        message_id = message.id(),
        "dispatching task"
    );
    swarm.add_message(message);

    agent
        .run(task, &TaskContext::new())
        .map_err(|source| SwarmError::agent(agent.name(), Phase::Dispatch, source))
}

fn ensure_registered(swarm: &Swarm, id: &str) -> Result<()> {
    match swarm.agent(id) {
        Some(_) => Ok(()),
        None => Err(SwarmError::AgentNotFound(id.to_string())),
    }
}

/// Flat dispatch: tasks go to the first registered agent, messages are only
/// recorded.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultCoordinator;

impl Coordinator for DefaultCoordinator {
    fn name(&self) -> &str {
        "default"
    }

    fn coordinate(&self, swarm: &Swarm, input: CoordinationInput) -> Result<CoordinationResult> {
        match input {
            CoordinationInput::Message(message) => self
                .route_message(swarm, message, None)
                .map(CoordinationResult::Routed),
            CoordinationInput::Task(task) => {
                let first = swarm
                    .first_agent()
                    .ok_or_else(|| SwarmError::configuration("swarm has no registered agents"))?;
                self.assign_task(swarm, first.into(), &task)
                    .map(CoordinationResult::Response)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::ScriptedAgent;

    #[test]
    fn dispatch_task_records_then_runs() {
        let swarm = Swarm::new();
        let bob = Arc::new(ScriptedAgent::new("bob").with_responses(["done"]));
        swarm.add_agent(bob.clone());

        let resp = dispatch_task(&swarm, "planner", "bob".into(), "write tests").unwrap();
        assert_eq!(resp.final_answer(), "done");

        let ledger = swarm.messages();
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger[0].sender_id(), "planner");
        assert_eq!(ledger[0].recipient_ids(), ["bob".to_string()]);
        assert_eq!(ledger[0].kind(), MessageType::Task);
        assert!(ledger[0].metadata().contains_key("assigned_at"));
        assert_eq!(bob.calls(), vec!["write tests".to_string()]);
    }

    #[test]
    fn unknown_target_is_a_lookup_error_and_records_nothing() {
        let swarm = Swarm::new();
        let err = dispatch_task(&swarm, SYSTEM_SENDER, "ghost".into(), "x").unwrap_err();
        assert!(matches!(err, SwarmError::AgentNotFound(ref id) if id == "ghost"));
        assert_eq!(swarm.message_count(), 0);
    }

    #[test]
    fn coordination_result_accessors() {
        let r = CoordinationResult::Response(AgentResponse::new("ok"));
        assert_eq!(r.final_answer(), Some("ok"));
        assert!(r.recipients().is_none());

        let r = CoordinationResult::Routed(vec!["bob".into()]);
        assert_eq!(r.final_answer(), None);
        assert_eq!(r.recipients(), Some(&["bob".to_string()][..]));
    }
}
