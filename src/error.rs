use std::fmt;

use thiserror::Error;

/// Where in a coordination call an agent error surfaced.
///
/// Master-worker callers use this to decide whether re-running only the
/// decomposition is worthwhile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Plain task assignment (`assign_task` outside of a strategy phase).
    Dispatch,
    /// Master breaking the task into subtasks.
    Decompose,
    /// Master running the original task after no subtasks were parsed.
    Fallback,
    /// Subtask execution by workers (or by the master when alone).
    Distribute,
    /// Master combining collected answers.
    Aggregate,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Dispatch => "dispatch",
            Phase::Decompose => "decompose",
            Phase::Fallback => "fallback",
            Phase::Distribute => "distribute",
            Phase::Aggregate => "aggregate",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum SwarmError {
    /// The swarm or strategy is not set up to do the requested work.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// An agent id did not resolve against the registry.
    #[error("no agent registered under '{0}'")]
    AgentNotFound(String),

    /// An agent's own `run` failed; `source` is its error, untouched.
    #[error("agent '{agent}' failed during {phase}")]
    Agent {
        agent: String,
        phase: Phase,
        #[source]
        source: anyhow::Error,
    },

    /// A thread in the bounded parallel executor died before reporting back.
    #[error("parallel dispatch failed")]
    ParallelDispatch(#[source] anyhow::Error),
}

pub type Result<T, E = SwarmError> = std::result::Result<T, E>;

impl SwarmError {
    pub fn configuration(message: impl Into<String>) -> Self {
        SwarmError::Configuration(message.into())
    }

    pub fn agent(agent: impl Into<String>, phase: Phase, source: anyhow::Error) -> Self {
        SwarmError::Agent {
            agent: agent.into(),
            phase,
            source,
        }
    }

    /// Re-tag an agent error with the phase it belongs to; other errors pass through.
    pub fn in_phase(self, phase: Phase) -> Self {
        match self {
            SwarmError::Agent { agent, source, .. } => SwarmError::Agent {
                agent,
                phase,
                source,
            },
            other => other,
        }
    }

    pub fn phase(&self) -> Option<Phase> {
        match self {
            SwarmError::Agent { phase, .. } => Some(*phase),
            SwarmError::ParallelDispatch(_) => Some(Phase::Distribute),
            _ => None,
        }
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, SwarmError::Configuration(_))
    }

    /// The error the failing agent returned, if this is a propagated agent error.
    pub fn agent_error(&self) -> Option<&anyhow::Error> {
        match self {
            SwarmError::Agent { source, .. } => Some(source),
            _ => None,
        }
    }
}
