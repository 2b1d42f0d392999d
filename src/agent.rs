use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;

use anyhow::{anyhow, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Extra inputs handed to an agent alongside its task text.
pub type TaskContext = HashMap<String, Value>;

/// What an agent hands back from `run`.
///
/// Coordinators only ever read `final_answer`; metadata is carried through
/// untouched for the caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentResponse {
    final_answer: String,
    #[serde(default)]
    metadata: BTreeMap<String, Value>,
}

impl AgentResponse {
    pub fn new(final_answer: impl Into<String>) -> Self {
        Self {
            final_answer: final_answer.into(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn final_answer(&self) -> &str {
        &self.final_answer
    }

    pub fn metadata(&self) -> &BTreeMap<String, Value> {
        &self.metadata
    }

    pub fn into_final_answer(self) -> String {
        self.final_answer
    }
}

impl From<String> for AgentResponse {
    fn from(final_answer: String) -> Self {
        Self::new(final_answer)
    }
}

impl From<&str> for AgentResponse {
    fn from(final_answer: &str) -> Self {
        Self::new(final_answer)
    }
}

/// A named, blocking task executor.
///
/// How an agent reaches its answer is its own business; the swarm only needs
/// a stable name and a synchronous `run`.
pub trait Agent: Send + Sync {
    fn name(&self) -> &str;

    fn run(&self, task: &str, context: &TaskContext) -> Result<AgentResponse>;
}

/// Adapts a closure into an [`Agent`].
pub struct FnAgent<F> {
    name: String,
    f: F,
}

impl<F> FnAgent<F>
where
    F: Fn(&str, &TaskContext) -> Result<AgentResponse> + Send + Sync,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

impl<F> fmt::Debug for FnAgent<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnAgent").field("name", &self.name).finish()
    }
}

impl<F> Agent for FnAgent<F>
where
    F: Fn(&str, &TaskContext) -> Result<AgentResponse> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, task: &str, context: &TaskContext) -> Result<AgentResponse> {
        (self.f)(task, context)
    }
}

/// Deterministic agent for demos and tests.
///
/// Replays `responses` in order, then echoes `"<name>: <task>"` once they run
/// out. Every task received is kept in the call log.
#[derive(Debug)]
pub struct ScriptedAgent {
    name: String,
    responses: Mutex<VecDeque<String>>,
    fail_on_call: Option<usize>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedAgent {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            responses: Mutex::new(VecDeque::new()),
            fail_on_call: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_responses<I, S>(self, responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.responses
            .lock()
            .extend(responses.into_iter().map(Into::into));
        self
    }

    /// Make the zero-based `index`th call return an error.
    pub fn failing_on_call(mut self, index: usize) -> Self {
        self.fail_on_call = Some(index);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

impl Agent for ScriptedAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, task: &str, _context: &TaskContext) -> Result<AgentResponse> {
        let index = {
            let mut calls = self.calls.lock();
            calls.push(task.to_string());
            calls.len() - 1
        };

        if self.fail_on_call == Some(index) {
            return Err(anyhow!(
                "scripted agent '{}' failed on call {index}",
                self.name
            ));
        }

        let answer = self
            .responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| format!("{}: {task}", self.name));
        Ok(AgentResponse::new(answer))
    }
}
