//! Master-worker coordination.
//!
//! One designated agent (the master) breaks a task into subtasks, the other
//! registered agents (workers) execute them round-robin, and the master folds
//! the collected answers into a final response:
//!
//! 1. decompose: the master is asked for a plan
//! 2. distribute: subtask `i` goes to worker `i % workers.len()`
//! 3. aggregate: answers are joined with `" | "` and handed back to the master
//!
//! A plan that yields no subtasks makes the master answer the original task
//! directly. With no workers the master runs every subtask itself.

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::agent::{Agent, AgentResponse, TaskContext};
use crate::bounded_executor::{run_bounded, ScopedJob};
use crate::coordinator::{
    dispatch_task, AgentTarget, CoordinationInput, CoordinationResult, Coordinator,
};
use crate::error::{Phase, Result, SwarmError};
use crate::swarm::Swarm;

pub const DECOMPOSE_PROMPT: &str = "Analyze this task and break it down into subtasks: ";
pub const AGGREGATE_PROMPT: &str = "Aggregate these results into a final answer: ";
pub const RESULT_SEPARATOR: &str = " | ";

static NUMBERED_SUBTASK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d+\.\s+(.+)").expect("numbered subtask pattern is valid"));

pub fn decomposition_prompt(task: &str) -> String {
    format!("{DECOMPOSE_PROMPT}{task}")
}

pub fn aggregation_prompt(joined_results: &str) -> String {
    format!("{AGGREGATE_PROMPT}{joined_results}")
}

/// Pull subtasks out of a free-text plan.
///
/// Numbered items (`"<digits>. <text>"`) win; when a plan has any, unnumbered
/// lines are dropped. Without numbered items every non-blank line is a
/// subtask. Order is preserved either way.
pub fn parse_subtasks(plan: &str) -> Vec<String> {
    let numbered: Vec<String> = NUMBERED_SUBTASK
        .captures_iter(plan)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    if !numbered.is_empty() {
        return numbered;
    }

    plan.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Clone)]
pub struct MasterWorkerCoordinator {
    master_id: String,
    max_parallel: usize,
}

impl MasterWorkerCoordinator {
    pub fn new(master_id: impl Into<String>) -> Self {
        Self {
            master_id: master_id.into(),
            max_parallel: 1,
        }
    }

    /// Allow up to `n` worker calls in flight during distribution. `1` (the
    /// default) keeps distribution strictly sequential.
    pub fn with_max_parallel(mut self, n: usize) -> Self {
        self.max_parallel = n.max(1);
        self
    }

    pub fn master_id(&self) -> &str {
        &self.master_id
    }

    pub fn max_parallel(&self) -> usize {
        self.max_parallel
    }

    fn run_task(&self, swarm: &Swarm, task: &str) -> Result<AgentResponse> {
        let master = swarm.agent(&self.master_id).ok_or_else(|| {
            SwarmError::configuration(format!(
                "master agent '{}' is not registered in the swarm",
                self.master_id
            ))
        })?;
        let ctx = TaskContext::new();

        info!(master = %self.master_id, "decomposing task");
        let plan = master
            .run(&decomposition_prompt(task), &ctx)
            .map_err(|e| SwarmError::agent(&self.master_id, Phase::Decompose, e))?;

        let subtasks = parse_subtasks(plan.final_answer());
        if subtasks.is_empty() {
            warn!(master = %self.master_id, "plan has no subtasks; master runs the task directly");
            return master
                .run(task, &ctx)
                .map_err(|e| SwarmError::agent(&self.master_id, Phase::Fallback, e));
        }

        let workers: Vec<Arc<dyn Agent>> = swarm
            .agents()
            .into_iter()
            .filter(|a| a.name() != self.master_id)
            .collect();
        info!(
            subtasks = subtasks.len(),
            workers = workers.len(),
            "distributing subtasks"
        );

        let answers = if workers.is_empty() {
            self.run_on_master(master.as_ref(), &subtasks, &ctx)?
        } else {
            self.distribute(swarm, &workers, &subtasks)?
        };

        info!(master = %self.master_id, answers = answers.len(), "aggregating results");
        master
            .run(&aggregation_prompt(&answers.join(RESULT_SEPARATOR)), &ctx)
            .map_err(|e| SwarmError::agent(&self.master_id, Phase::Aggregate, e))
    }

    fn run_on_master(
        &self,
        master: &dyn Agent,
        subtasks: &[String],
        ctx: &TaskContext,
    ) -> Result<Vec<String>> {
        subtasks
            .iter()
            .map(|subtask| {
                master
                    .run(subtask, ctx)
                    .map(AgentResponse::into_final_answer)
                    .map_err(|e| SwarmError::agent(&self.master_id, Phase::Distribute, e))
            })
            .collect()
    }

    fn distribute(
        &self,
        swarm: &Swarm,
        workers: &[Arc<dyn Agent>],
        subtasks: &[String],
    ) -> Result<Vec<String>> {
        let assignments: Vec<(Arc<dyn Agent>, &str)> = subtasks
            .iter()
            .enumerate()
            .map(|(i, subtask)| (Arc::clone(&workers[i % workers.len()]), subtask.as_str()))
            .collect();

        if self.max_parallel <= 1 {
            return assignments
                .into_iter()
                .map(|(worker, subtask)| self.run_assignment(swarm, worker, subtask))
                .collect();
        }

        let jobs: Vec<ScopedJob<'_, Result<String>>> = assignments
            .into_iter()
            .map(|(worker, subtask)| {
                Box::new(move || self.run_assignment(swarm, worker, subtask))
                    as ScopedJob<'_, Result<String>>
            })
            .collect();
        run_bounded(self.max_parallel, jobs)
            .map_err(SwarmError::ParallelDispatch)?
            .into_iter()
            .collect()
    }

    fn run_assignment(
        &self,
        swarm: &Swarm,
        worker: Arc<dyn Agent>,
        subtask: &str,
    ) -> Result<String> {
        debug!(worker = worker.name(), subtask, "assigning subtask");
        self.assign_task(swarm, worker.into(), subtask)
            .map(AgentResponse::into_final_answer)
            .map_err(|e| e.in_phase(Phase::Distribute))
    }
}

impl Coordinator for MasterWorkerCoordinator {
    fn name(&self) -> &str {
        "master_worker"
    }

    fn coordinate(&self, swarm: &Swarm, input: CoordinationInput) -> Result<CoordinationResult> {
        match input {
            CoordinationInput::Message(message) => self
                .route_message(swarm, message, None)
                .map(CoordinationResult::Routed),
            CoordinationInput::Task(task) => {
                self.run_task(swarm, &task).map(CoordinationResult::Response)
            }
        }
    }

    /// Assignments made by this strategy are sent on behalf of the master.
    fn assign_task(&self, swarm: &Swarm, target: AgentTarget, task: &str) -> Result<AgentResponse> {
        dispatch_task(swarm, &self.master_id, target, task)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbered_items_are_extracted_in_order() {
        let plan = "Plan:\n1. gather data\n2. analyze it\n10. write report\n";
        assert_eq!(
            parse_subtasks(plan),
            vec!["gather data", "analyze it", "write report"]
        );
    }

    #[test]
    fn mixed_plan_keeps_only_numbered_items() {
        let plan = "Intro line\n1. first\nsome note\n2. second";
        assert_eq!(parse_subtasks(plan), vec!["first", "second"]);
    }

    #[test]
    fn unnumbered_plan_falls_back_to_non_blank_lines() {
        let plan = "  research\n\n   \nsummarize  \r\nreview";
        assert_eq!(parse_subtasks(plan), vec!["research", "summarize", "review"]);
    }

    #[test]
    fn blank_plan_has_no_subtasks() {
        assert!(parse_subtasks("").is_empty());
        assert!(parse_subtasks(" \n\t\n").is_empty());
    }

    #[test]
    fn number_without_space_is_not_a_list_item() {
        assert_eq!(parse_subtasks("3.14 is pi"), vec!["3.14 is pi"]);
    }

    #[test]
    fn prompts_use_fixed_prefixes() {
        assert_eq!(
            decomposition_prompt("ship it"),
            "Analyze this task and break it down into subtasks: ship it"
        );
        assert_eq!(
            aggregation_prompt("a | b"),
            "Aggregate these results into a final answer: a | b"
        );
    }

    #[test]
    fn max_parallel_is_at_least_one() {
        let c = MasterWorkerCoordinator::new("boss").with_max_parallel(0);
        assert_eq!(c.max_parallel(), 1);
        assert_eq!(c.master_id(), "boss");
    }
}
