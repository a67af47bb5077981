//! Backtracking chain planner and the generation budget.
//!
//! The planner drives chains in decomposition order, keeping a stack of
//! layout prefixes. Each prefix may be expanded a bounded number of
//! times; when its budget is spent without reaching the final chain, the
//! prefix is discarded and planning resumes one level up. An empty stack
//! means the whole search space within the branching bound was explored.

use std::time::Instant;

use crate::annealing::{ChainEvolver, EvolveOutcome};
use crate::chains::Chain;
use crate::errors::GenerationError;
use crate::events::{CancellationToken, GenerationObserver};
use crate::layout::{Layout, LayoutOps};
use crate::prng::Pcg32;
use crate::types::{GeneratorConfig, MapLayout};

/// Why a run was cut short.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Cancelled,
    Iterations(u64),
    Time(u64),
}

/// Counts perturbations and polls the stop conditions. The iteration
/// bound is checked on every tick, the wall-clock bound every 100 ticks,
/// and the cancellation flag on every tick.
pub struct RunBudget<'a> {
    iterations: u64,
    max_iterations: Option<u64>,
    time_limit_ms: Option<u64>,
    started: Instant,
    cancel: Option<&'a CancellationToken>,
    stop: Option<StopReason>,
}

impl<'a> RunBudget<'a> {
    pub fn new(
        max_iterations: Option<u64>,
        time_limit_ms: Option<u64>,
        cancel: Option<&'a CancellationToken>,
    ) -> Self {
        RunBudget {
            iterations: 0,
            max_iterations,
            time_limit_ms,
            started: Instant::now(),
            cancel,
            stop: None,
        }
    }

    pub fn unbounded() -> RunBudget<'static> {
        RunBudget::new(None, None, None)
    }

    pub fn iterations(&self) -> u64 {
        self.iterations
    }

    pub fn stop_reason(&self) -> Option<StopReason> {
        self.stop
    }

    /// Account for one upcoming perturbation. `false` means stop now;
    /// the perturbation must not run.
    pub fn tick(&mut self) -> bool {
        if self.stop.is_some() {
            return false;
        }
        if let Some(cancel) = self.cancel {
            if cancel.is_cancelled() {
                self.stop = Some(StopReason::Cancelled);
                return false;
            }
        }
        if let Some(max) = self.max_iterations {
            if self.iterations >= max {
                self.stop = Some(StopReason::Iterations(max));
                return false;
            }
        }
        self.iterations += 1;
        if let Some(limit) = self.time_limit_ms {
            if self.iterations % 100 == 0
                && self.started.elapsed().as_millis() as u64 >= limit
            {
                self.stop = Some(StopReason::Time(limit));
                return false;
            }
        }
        true
    }
}

struct PlannerNode {
    layout: Layout,
    chain_index: usize,
    expansions: u32,
}

pub struct Planner<'a> {
    pub ops: &'a LayoutOps<'a>,
    pub chains: &'a [Chain],
    pub config: &'a GeneratorConfig,
    pub initial_temperature: f64,
    pub node_count: usize,
}

impl Planner<'_> {
    /// Place every chain; returns the full valid layout.
    pub fn run(
        &self,
        rng: &mut Pcg32,
        budget: &mut RunBudget,
        observer: &mut dyn GenerationObserver,
        convert: &dyn Fn(&Layout) -> MapLayout,
    ) -> Result<Layout, GenerationError> {
        let mut stack = vec![PlannerNode {
            layout: Layout::new(self.node_count),
            chain_index: 0,
            expansions: 0,
        }];

        loop {
            let Some(top) = stack.last_mut() else {
                return Err(GenerationError::PlannerExhausted);
            };
            if top.chain_index == self.chains.len() {
                let layout = top.layout.clone();
                assert!(
                    layout.is_valid(),
                    "planner finished with energy {}",
                    layout.total_energy()
                );
                return Ok(layout);
            }
            if top.expansions >= self.config.max_branching {
                log::debug!(
                    "prefix before chain {} spent its {} expansions, backtracking",
                    top.chain_index,
                    top.expansions,
                );
                stack.pop();
                continue;
            }
            top.expansions += 1;

            let chain = &self.chains[top.chain_index];
            let greedy = self.config.chains.greedy_trees && !chain.from_face;
            let extended = if greedy {
                let placed = self.ops.greedy_place(&top.layout, &chain.nodes)?;
                if placed.is_none() {
                    // Greedy placement is deterministic; retrying the
                    // same prefix cannot change the outcome.
                    top.expansions = self.config.max_branching;
                }
                placed
            } else {
                let chain_config = self.config.annealing_for_chain(chain.index);
                let evolver = ChainEvolver {
                    ops: self.ops,
                    config: chain_config,
                    initial_temperature: chain_config
                        .initial_temperature
                        .unwrap_or(self.initial_temperature),
                };
                let mut emit = |layout: &Layout| {
                    if observer.wants_perturbed() {
                        observer.on_perturbed(&convert(layout));
                    }
                };
                match evolver.evolve(&top.layout, chain, rng, budget, &mut emit)? {
                    EvolveOutcome::Valid(layout) => Some(layout),
                    EvolveOutcome::Failed(_) => None,
                    EvolveOutcome::Stopped(best) => {
                        return Err(budget_stop_error(budget, &best, convert));
                    }
                }
            };

            match extended {
                Some(layout) => {
                    log::debug!(
                        "chain {} placed ({} nodes, {} total)",
                        chain.index,
                        chain.nodes.len(),
                        layout.placed_count(),
                    );
                    observer.on_partial_valid(&convert(&layout));
                    let chain_index = top.chain_index + 1;
                    stack.push(PlannerNode { layout, chain_index, expansions: 0 });
                }
                None => {
                    log::debug!("chain {} attempt failed", chain.index);
                }
            }
        }
    }
}

fn budget_stop_error(
    budget: &RunBudget,
    best: &Layout,
    convert: &dyn Fn(&Layout) -> MapLayout,
) -> GenerationError {
    match budget.stop_reason() {
        Some(StopReason::Cancelled) => GenerationError::Cancelled {
            partial: Some(Box::new(convert(best))),
        },
        Some(StopReason::Iterations(max)) => {
            GenerationError::IterationBudgetExceeded(max)
        }
        Some(StopReason::Time(limit)) => GenerationError::TimeBudgetExceeded(limit),
        None => GenerationError::PlannerExhausted,
    }
}
