//! In-process agent swarm runtime.
//!
//! A [`Swarm`] holds named agents, an append-only ledger of [`Message`]s, and
//! one active [`Coordinator`]. `Swarm::run` hands a task or message to the
//! coordinator, which decides which agents do the work.
//!
//! Strategies shipped here:
//! - [`DefaultCoordinator`]: the first registered agent takes every task;
//!   messages are recorded, never delivered
//! - [`MasterWorkerCoordinator`]: a master agent decomposes the task, workers
//!   take subtasks round-robin, the master aggregates
//!
//! Everything is synchronous. Agent calls block the caller; there is no
//! timeout, retry, or cancellation at this layer.

pub mod agent;
pub mod bounded_executor;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod ledger;
pub mod master_worker;
pub mod message;
pub mod swarm;

pub use agent::{Agent, AgentResponse, FnAgent, ScriptedAgent, TaskContext};
pub use coordinator::{
    AgentTarget, CoordinationInput, CoordinationResult, Coordinator, DefaultCoordinator,
};
pub use error::{Phase, SwarmError};
pub use master_worker::MasterWorkerCoordinator;
pub use message::{Message, MessageType, SYSTEM_SENDER};
pub use swarm::{JsonLinesSink, LedgerSink, Swarm};
