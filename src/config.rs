use std::collections::HashSet;
use std::env;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::agent::ScriptedAgent;
use crate::coordinator::DefaultCoordinator;
use crate::master_worker::MasterWorkerCoordinator;
use crate::swarm::Swarm;

pub const MAX_PARALLEL_ENV: &str = "SWARM_MAX_PARALLEL";

/// A swarm described in YAML: scripted agents plus the coordinator to use.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct SwarmSpec {
    pub version: String,

    #[serde(default)]
    pub coordinator: CoordinatorSpec,

    #[serde(default)]
    pub agents: Vec<AgentSpec>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct CoordinatorSpec {
    #[serde(default)]
    pub kind: CoordinatorKind,

    #[serde(default)]
    pub master: Option<String>,

    #[serde(default)]
    pub max_parallel: Option<usize>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CoordinatorKind {
    #[default]
    Default,
    MasterWorker,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct AgentSpec {
    pub name: String,

    /// Canned answers, replayed in order before the agent starts echoing.
    #[serde(default)]
    pub responses: Vec<String>,

    /// Zero-based call index on which the agent returns an error.
    #[serde(default)]
    pub fail_on_call: Option<usize>,
}

/// A constructed swarm plus typed handles to its scripted agents, in
/// document order.
#[derive(Debug)]
pub struct BuiltSwarm {
    pub swarm: Swarm,
    pub agents: Vec<Arc<ScriptedAgent>>,
    /// Distribution bound the coordinator was built with, after the
    /// `SWARM_MAX_PARALLEL` override. Always 1 for the default coordinator.
    pub max_parallel: usize,
}

impl SwarmSpec {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read swarm spec '{}'", path.display()))?;
        Self::from_yaml_str(&text)
            .with_context(|| format!("while loading swarm spec '{}'", path.display()))
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let spec: SwarmSpec =
            serde_yaml::from_str(text).map_err(|e| anyhow!("YAML parse error: {e}"))?;
        spec.validate().context("validate swarm spec")?;
        Ok(spec)
    }

    /// Fail fast on documents that could never run.
    pub fn validate(&self) -> Result<()> {
        if self.agents.is_empty() {
            return Err(anyhow!("swarm spec defines no agents"));
        }

        let mut seen = HashSet::new();
        for (idx, agent) in self.agents.iter().enumerate() {
            if agent.name.trim().is_empty() {
                return Err(anyhow!("agents[{idx}] has an empty name"));
            }
            if !seen.insert(agent.name.as_str()) {
                return Err(anyhow!("agents[{idx}] duplicates agent name '{}'", agent.name));
            }
        }

        if self.coordinator.max_parallel == Some(0) {
            return Err(anyhow!("coordinator.max_parallel must be >= 1"));
        }

        match (self.coordinator.kind, self.coordinator.master.as_deref()) {
            (CoordinatorKind::MasterWorker, None) => Err(anyhow!(
                "coordinator kind 'master_worker' requires coordinator.master"
            )),
            (CoordinatorKind::MasterWorker, Some(master)) if !seen.contains(master) => Err(
                anyhow!("coordinator.master '{master}' is not one of the defined agents"),
            ),
            _ => Ok(()),
        }
    }

    /// Construct the swarm: agents registered in document order, coordinator
    /// installed. `SWARM_MAX_PARALLEL` overrides `coordinator.max_parallel`.
    pub fn build(&self) -> Result<BuiltSwarm> {
        let swarm = Swarm::new();
        let mut agents = Vec::with_capacity(self.agents.len());
        for spec in &self.agents {
            let mut agent =
                ScriptedAgent::new(spec.name.clone()).with_responses(spec.responses.clone());
            if let Some(idx) = spec.fail_on_call {
                agent = agent.failing_on_call(idx);
            }
            let agent = Arc::new(agent);
            swarm.add_agent(agent.clone());
            agents.push(agent);
        }

        let mut max_parallel = 1;
        match self.coordinator.kind {
            CoordinatorKind::Default => swarm.set_coordinator(DefaultCoordinator),
            CoordinatorKind::MasterWorker => {
                let master = self
                    .coordinator
                    .master
                    .clone()
                    .ok_or_else(|| anyhow!("master_worker coordinator requires a master"))?;
                max_parallel = match max_parallel_override()? {
                    Some(n) => n,
                    None => self.coordinator.max_parallel.unwrap_or(1),
                };
                swarm.set_coordinator(
                    MasterWorkerCoordinator::new(master).with_max_parallel(max_parallel),
                );
            }
        }

        info!(
            agents = agents.len(),
            coordinator = ?self.coordinator.kind,
            max_parallel,
            "built swarm from spec"
        );
        Ok(BuiltSwarm {
            swarm,
            agents,
            max_parallel,
        })
    }
}

/// Read `SWARM_MAX_PARALLEL`, if set.
pub fn max_parallel_override() -> Result<Option<usize>> {
    let Some(raw) = env::var(MAX_PARALLEL_ENV).ok() else {
        return Ok(None);
    };
    let parsed: usize = raw.trim().parse().map_err(|_| {
        anyhow!("invalid {MAX_PARALLEL_ENV}: '{raw}' (must be a positive integer)")
    })?;
    if parsed == 0 {
        return Err(anyhow!(
            "invalid {MAX_PARALLEL_ENV}: '{raw}' (must be a positive integer)"
        ));
    }
    Ok(Some(parsed))
}
