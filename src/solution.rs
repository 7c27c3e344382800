//! Solution representation shared by every routing strategy.
//!
//! A solution holds one route per vehicle plus the evaluator's verdict on
//! it, and can be turned into a serializable report for downstream tools.

use crate::evaluator::{Evaluation, Evaluator};
use serde::{Deserialize, Serialize};

/// A multi-vehicle route set and its evaluated cost.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Solution {
    /// One node sequence per vehicle, each starting and ending at the depot
    pub routes: Vec<Vec<usize>>,
    /// Total distance plus penalties
    pub cost: f64,
    pub distance: f64,
    pub penalty: f64,
    /// Whether the route set incurs no penalty at all
    pub feasible: bool,
    /// Required points visited / required points
    pub coverage: f64,
    /// Algorithm that generated this solution
    pub algorithm: String,
    /// Computation time in seconds
    pub computation_time: f64,
    /// Number of iterations (if applicable)
    pub iterations: Option<usize>,
    /// Non-fatal anomalies hit while building the routes
    pub warnings: Vec<String>,
}

impl Solution {
    /// Evaluate `routes` and wrap them in a solution.
    pub fn from_routes(evaluator: &Evaluator, routes: Vec<Vec<usize>>, algorithm: &str) -> Self {
        let evaluation = evaluator.evaluate(&routes);
        let mut solution = Solution {
            routes,
            cost: f64::INFINITY,
            distance: 0.0,
            penalty: 0.0,
            feasible: false,
            coverage: 0.0,
            algorithm: algorithm.to_string(),
            computation_time: 0.0,
            iterations: None,
            warnings: Vec::new(),
        };
        solution.apply(&evaluation);
        solution
    }

    /// Re-evaluate after the routes have been edited.
    pub fn validate(&mut self, evaluator: &Evaluator) -> Evaluation {
        let evaluation = evaluator.evaluate(&self.routes);
        self.apply(&evaluation);
        evaluation
    }

    fn apply(&mut self, evaluation: &Evaluation) {
        self.cost = evaluation.cost;
        self.distance = evaluation.distance;
        self.penalty = evaluation.penalty;
        self.feasible = evaluation.is_feasible();
        self.coverage = evaluation.coverage;
    }

    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings.extend(warnings);
        self
    }

    pub fn num_routes(&self) -> usize {
        self.routes.len()
    }

    /// Build the per-vehicle report consumed by downstream tools.
    pub fn report(&self, evaluator: &Evaluator) -> SolutionReport {
        let evaluation = evaluator.evaluate(&self.routes);
        let routes = self
            .routes
            .iter()
            .zip(&evaluation.routes)
            .enumerate()
            .map(|(vehicle, (nodes, eval))| RouteReport {
                vehicle,
                nodes: nodes.clone(),
                distance: eval.distance,
                penalty: eval.penalty,
                final_load: eval.final_load,
                final_fuel: eval.final_fuel,
                collected: eval.collected,
            })
            .collect();

        SolutionReport {
            instance: evaluator.instance().name.clone(),
            strategy: self.algorithm.clone(),
            routes,
            coverage: evaluation.coverage,
            missing: evaluation.missing,
            total_distance: evaluation.distance,
            total_penalty: evaluation.penalty,
            total_cost: evaluation.cost,
            elapsed_secs: self.computation_time,
            iterations: self.iterations,
            warnings: self.warnings.clone(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// One vehicle's line of a [`SolutionReport`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteReport {
    pub vehicle: usize,
    pub nodes: Vec<usize>,
    pub distance: f64,
    pub penalty: f64,
    pub final_load: f64,
    /// Fuel left on arrival back at the depot
    pub final_fuel: f64,
    pub collected: usize,
}

/// Serializable summary of a solved instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolutionReport {
    pub instance: String,
    pub strategy: String,
    pub routes: Vec<RouteReport>,
    pub coverage: f64,
    pub missing: Vec<usize>,
    pub total_distance: f64,
    pub total_penalty: f64,
    pub total_cost: f64,
    pub elapsed_secs: f64,
    pub iterations: Option<usize>,
    pub warnings: Vec<String>,
    pub timestamp: String,
}

impl std::fmt::Display for SolutionReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{} on {}", self.strategy, self.instance)?;
        for route in &self.routes {
            let path: Vec<String> = route.nodes.iter().map(|n| n.to_string()).collect();
            writeln!(
                f,
                "  Vehicle {}: {} (distance {:.2}, penalty {:.2}, {} collected, fuel left {:.2})",
                route.vehicle,
                path.join(" -> "),
                route.distance,
                route.penalty,
                route.collected,
                route.final_fuel
            )?;
        }
        writeln!(f, "  Coverage: {:.1}%", self.coverage * 100.0)?;
        if !self.missing.is_empty() {
            writeln!(f, "  Missing points: {:?}", self.missing)?;
        }
        writeln!(f, "  Distance: {:.2}", self.total_distance)?;
        writeln!(f, "  Penalty: {:.2}", self.total_penalty)?;
        writeln!(f, "  Cost: {:.2}", self.total_cost)?;
        writeln!(f, "  Time: {:.3}s", self.elapsed_secs)?;
        for warning in &self.warnings {
            writeln!(f, "  Warning: {}", warning)?;
        }
        Ok(())
    }
}
