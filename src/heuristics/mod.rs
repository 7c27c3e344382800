//! Routing strategies.
//!
//! The three planners are interchangeable: each takes a problem instance and
//! returns a complete [`Solution`] scored by the shared evaluator.

pub mod aco;
pub mod construction;
pub mod tabu_search;

pub use aco::*;
pub use construction::*;
pub use tabu_search::*;

use crate::instance::ProblemInstance;
use crate::solution::Solution;

pub trait RoutingStrategy {
    fn solve(&self, instance: &ProblemInstance) -> anyhow::Result<Solution>;
    fn name(&self) -> &str;
}

/// Names the three planners so callers can build one from a seed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum StrategyKind {
    Savings,
    Tabu,
    Swarm,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 3] = [StrategyKind::Savings, StrategyKind::Tabu, StrategyKind::Swarm];

    /// Whether repeated runs with different seeds can differ.
    pub fn is_stochastic(&self) -> bool {
        !matches!(self, StrategyKind::Savings)
    }

    /// Build the planner; `iterations` overrides the round/iteration budget.
    pub fn build(&self, seed: u64, iterations: Option<usize>) -> Box<dyn RoutingStrategy + Send + Sync> {
        match self {
            StrategyKind::Savings => Box::new(SavingsHeuristic::new()),
            StrategyKind::Tabu => {
                let mut config = TabuConfig { seed, ..Default::default() };
                if let Some(n) = iterations {
                    config.max_iterations = n;
                }
                Box::new(TabuSearch::new(config))
            }
            StrategyKind::Swarm => {
                let mut config = ACOConfig { seed, ..Default::default() };
                if let Some(n) = iterations {
                    config.max_iterations = n;
                }
                Box::new(AntColony::new(config))
            }
        }
    }
}
