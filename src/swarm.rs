use std::collections::VecDeque;
use std::fmt;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::agent::Agent;
use crate::coordinator::{CoordinationInput, CoordinationResult, Coordinator};
use crate::error::{Result, SwarmError};
use crate::message::Message;

/// Observer for ledger appends.
///
/// Sinks see messages in ledger order and run with no swarm lock held, so a
/// sink may read the swarm, subscribe, or append. A message appended from
/// inside a sink is delivered once the current delivery round returns.
pub trait LedgerSink: Send + Sync {
    fn on_message(&self, message: &Message);
}

impl<F> LedgerSink for F
where
    F: Fn(&Message) + Send + Sync,
{
    fn on_message(&self, message: &Message) {
        self(message)
    }
}

/// Writes every appended message as one JSON line.
pub struct JsonLinesSink<W> {
    out: Mutex<W>,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner()
    }
}

impl<W: Write + Send> LedgerSink for JsonLinesSink<W> {
    fn on_message(&self, message: &Message) {
        let mut out = self.out.lock();
        let written = serde_json::to_writer(&mut *out, message)
            .map_err(std::io::Error::from)
            .and_then(|()| out.write_all(b"\n"));
        if let Err(err) = written {
            warn!(message_id = message.id(), error = %err, "ledger sink write failed");
        }
    }
}

/// Agent registry, append-only message ledger, and the active coordinator.
///
/// Registry order is registration order; re-registering a name replaces the
/// agent in place. All state sits behind locks so a swarm can be shared
/// across threads while the ledger keeps a single append order.
#[derive(Default)]
pub struct Swarm {
    agents: RwLock<Vec<(String, Arc<dyn Agent>)>>,
    messages: Mutex<Vec<Message>>,
    coordinator: RwLock<Option<Arc<dyn Coordinator>>>,
    sinks: RwLock<Vec<Arc<dyn LedgerSink>>>,
    /// Appended messages not yet handed to sinks, in ledger order.
    pending: Mutex<VecDeque<Message>>,
    delivering: AtomicBool,
}

/// Clears the delivery flag even if a sink panics.
struct DeliveryGuard<'a>(&'a AtomicBool);

impl Drop for DeliveryGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Swarm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_coordinator(coordinator: impl Coordinator + 'static) -> Self {
        let swarm = Self::new();
        swarm.set_coordinator(coordinator);
        swarm
    }

    /// Register `agent` under its own name. An existing agent with the same
    /// name is replaced (last write wins).
    pub fn add_agent(&self, agent: Arc<dyn Agent>) {
        let name = agent.name().to_string();
        let mut agents = self.agents.write();
        if let Some(slot) = agents.iter_mut().find(|(n, _)| *n == name) {
            warn!(agent = %name, "replacing agent registered under the same name");
            slot.1 = agent;
        } else {
            debug!(agent = %name, "registered agent");
            agents.push((name, agent));
        }
    }

    pub fn remove_agent(&self, id: &str) -> bool {
        let mut agents = self.agents.write();
        let Some(pos) = agents.iter().position(|(n, _)| n == id) else {
            return false;
        };
        agents.remove(pos);
        debug!(agent = %id, "removed agent");
        true
    }

    pub fn agent(&self, id: &str) -> Option<Arc<dyn Agent>> {
        self.agents
            .read()
            .iter()
            .find(|(n, _)| n == id)
            .map(|(_, a)| Arc::clone(a))
    }

    /// Snapshot of the registry in registration order.
    pub fn agents(&self) -> Vec<Arc<dyn Agent>> {
        self.agents
            .read()
            .iter()
            .map(|(_, a)| Arc::clone(a))
            .collect()
    }

    pub fn agent_names(&self) -> Vec<String> {
        self.agents.read().iter().map(|(n, _)| n.clone()).collect()
    }

    pub fn first_agent(&self) -> Option<Arc<dyn Agent>> {
        self.agents.read().first().map(|(_, a)| Arc::clone(a))
    }

    pub fn len(&self) -> usize {
        self.agents.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.read().is_empty()
    }

    /// Append to the ledger. No deduplication.
    pub fn add_message(&self, message: Message) {
        {
            let mut messages = self.messages.lock();
            debug!(
                message_id = message.id(),
                sender = message.sender_id(),
                kind = %message.kind(),
                recipients = message.recipient_ids().len(),
                "ledger append"
            );
            if !self.sinks.read().is_empty() {
                // Queued under the ledger lock so delivery order is ledger order.
                self.pending.lock().push_back(message.clone());
            }
            messages.push(message);
        }
        self.deliver_pending();
    }

    /// Drain queued messages to the sinks. Only one thread delivers at a time;
    /// anyone else who finds delivery in progress leaves their message queued
    /// for the active deliverer.
    fn deliver_pending(&self) {
        loop {
            if self.delivering.swap(true, Ordering::AcqRel) {
                return;
            }
            {
                let _guard = DeliveryGuard(&self.delivering);
                while let Some(message) = self.next_pending() {
                    let sinks: Vec<Arc<dyn LedgerSink>> = self.sinks.read().clone();
                    for sink in &sinks {
                        sink.on_message(&message);
                    }
                }
            }
            // A message queued between the last pop and the flag reset is ours.
            if self.pending.lock().is_empty() {
                return;
            }
        }
    }

    fn next_pending(&self) -> Option<Message> {
        self.pending.lock().pop_front()
    }

    /// Full ledger in append order.
    pub fn messages(&self) -> Vec<Message> {
        self.messages.lock().clone()
    }

    pub fn message_count(&self) -> usize {
        self.messages.lock().len()
    }

    pub fn subscribe(&self, sink: impl LedgerSink + 'static) {
        self.sinks.write().push(Arc::new(sink));
    }

    pub fn set_coordinator(&self, coordinator: impl Coordinator + 'static) {
        self.set_shared_coordinator(Arc::new(coordinator));
    }

    pub fn set_shared_coordinator(&self, coordinator: Arc<dyn Coordinator>) {
        debug!(coordinator = coordinator.name(), "coordinator set");
        *self.coordinator.write() = Some(coordinator);
    }

    pub fn coordinator(&self) -> Option<Arc<dyn Coordinator>> {
        self.coordinator.read().clone()
    }

    /// Hand `input` to the active coordinator and return whatever it returns.
    pub fn run(&self, input: impl Into<CoordinationInput>) -> Result<CoordinationResult> {
        if self.is_empty() {
            return Err(SwarmError::configuration("swarm has no registered agents"));
        }
        let coordinator = self
            .coordinator()
            .ok_or_else(|| SwarmError::configuration("swarm has no active coordinator"))?;

        let input = input.into();
        info!(
            coordinator = coordinator.name(),
            input = input.kind(),
            agents = self.len(),
            "swarm run"
        );
        coordinator.coordinate(self, input)
    }
}

impl fmt::Debug for Swarm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Swarm")
            .field("agents", &self.agent_names())
            .field("messages", &self.message_count())
            .field(
                "coordinator",
                &self.coordinator.read().as_ref().map(|c| c.name().to_string()),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::ScriptedAgent;
    use crate::coordinator::DefaultCoordinator;

    fn agent(name: &str) -> Arc<dyn Agent> {
        Arc::new(ScriptedAgent::new(name))
    }

    #[test]
    fn duplicate_name_replaces_in_place() {
        let swarm = Swarm::new();
        swarm.add_agent(agent("alice"));
        swarm.add_agent(agent("bob"));
        let replacement: Arc<dyn Agent> =
            Arc::new(ScriptedAgent::new("alice").with_responses(["v2"]));
        swarm.add_agent(Arc::clone(&replacement));

        assert_eq!(swarm.agent_names(), vec!["alice", "bob"]);
        let got = swarm.agent("alice").unwrap();
        assert!(Arc::ptr_eq(&got, &replacement));
    }

    #[test]
    fn remove_reports_presence() {
        let swarm = Swarm::new();
        swarm.add_agent(agent("alice"));
        assert!(swarm.remove_agent("alice"));
        assert!(!swarm.remove_agent("alice"));
        assert!(swarm.is_empty());
    }

    #[test]
    fn run_requires_agents_and_coordinator() {
        let swarm = Swarm::new();
        swarm.set_coordinator(DefaultCoordinator);
        let err = swarm.run("x").unwrap_err();
        assert!(err.is_configuration(), "{err}");

        let swarm = Swarm::new();
        swarm.add_agent(agent("alice"));
        let err = swarm.run("x").unwrap_err();
        assert!(err.to_string().contains("no active coordinator"), "{err}");
    }

    #[test]
    fn json_lines_sink_writes_one_line_per_message() {
        let sink = Arc::new(JsonLinesSink::new(Vec::<u8>::new()));
        let swarm = Swarm::new();
        let shared = Arc::clone(&sink);
        swarm.subscribe(move |m: &Message| shared.on_message(m));

        swarm.add_message(Message::broadcast("alice", "one"));
        swarm.add_message(Message::new("bob", ["alice"], "two"));
        drop(swarm);

        let sink = Arc::try_unwrap(sink).ok().expect("sink still shared");
        let text = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let second: Message = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second.content(), "two");
    }
}
