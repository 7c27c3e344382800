//! Feasibility and cost evaluation of multi-vehicle route sets.
//!
//! Every strategy ranks candidates with [`Evaluator::evaluate`], so the
//! penalty weights here define what "better" means across the crate.

use crate::instance::{NodeRole, ProblemInstance};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Weights applied to constraint violations.
///
/// Any single violation must outweigh any realistic distance so that
/// feasible solutions always rank ahead of infeasible ones.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PenaltyWeights {
    /// Per repeated visit of a collection point
    pub duplicate_visit: f64,
    /// Per required collection point never visited
    pub missing_point: f64,
    /// Per unit of load above capacity
    pub capacity_excess: f64,
    /// Per unit of distance above fuel range
    pub fuel_excess: f64,
    /// Per route that leaves a disposal site and never refuels afterwards
    pub disposal_without_refuel: f64,
    /// Per hop between nodes with no path
    pub unreachable_hop: f64,
    /// Per route end (first or last node) that is not the depot
    pub off_depot_endpoint: f64,
    /// Per route above or below the fleet size
    pub fleet_size_mismatch: f64,
}

impl Default for PenaltyWeights {
    fn default() -> Self {
        PenaltyWeights {
            duplicate_visit: 100_000.0,
            missing_point: 1_000_000.0,
            capacity_excess: 100.0,
            fuel_excess: 50.0,
            disposal_without_refuel: 50_000.0,
            unreachable_hop: 1_000_000.0,
            off_depot_endpoint: 1_000_000.0,
            fleet_size_mismatch: 1_000_000.0,
        }
    }
}

/// Per-route breakdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteEvaluation {
    pub distance: f64,
    pub penalty: f64,
    /// Load carried when the route ends
    pub final_load: f64,
    /// Fuel left in the tank when the route ends, negative after an overrun
    pub final_fuel: f64,
    /// Collection points first visited on this route
    pub collected: usize,
    pub unreachable_hops: usize,
}

/// Result of evaluating a whole route set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub distance: f64,
    pub penalty: f64,
    /// `distance + penalty`
    pub cost: f64,
    pub routes: Vec<RouteEvaluation>,
    /// Required collection points absent from every route
    pub missing: Vec<usize>,
    /// Collection points visited more than once, one entry per extra visit
    pub duplicates: Vec<usize>,
    /// Fraction of required points visited, 1.0 when nothing is required
    pub coverage: f64,
}

impl Evaluation {
    pub fn is_feasible(&self) -> bool {
        self.penalty == 0.0
    }
}

/// Scores route sets against one instance. Pure: never mutates its input.
#[derive(Debug, Clone, Copy)]
pub struct Evaluator<'a> {
    instance: &'a ProblemInstance,
    weights: PenaltyWeights,
}

impl<'a> Evaluator<'a> {
    pub fn new(instance: &'a ProblemInstance) -> Self {
        Self::with_weights(instance, PenaltyWeights::default())
    }

    pub fn with_weights(instance: &'a ProblemInstance, weights: PenaltyWeights) -> Self {
        Evaluator { instance, weights }
    }

    pub fn instance(&self) -> &'a ProblemInstance {
        self.instance
    }

    pub fn weights(&self) -> &PenaltyWeights {
        &self.weights
    }

    /// Convenience wrapper returning only `distance + penalty`.
    pub fn cost(&self, routes: &[Vec<usize>]) -> f64 {
        self.evaluate(routes).cost
    }

    pub fn evaluate(&self, routes: &[Vec<usize>]) -> Evaluation {
        let mut seen: HashSet<usize> = HashSet::new();
        let mut duplicates = Vec::new();
        let mut route_evals = Vec::with_capacity(routes.len());

        for route in routes {
            route_evals.push(self.evaluate_route(route, &mut seen, &mut duplicates));
        }

        let missing: Vec<usize> = self
            .instance
            .required_points()
            .filter(|p| !seen.contains(p))
            .collect();

        let required = self.instance.num_required_points();
        let coverage = if required == 0 {
            1.0
        } else {
            (required - missing.len()) as f64 / required as f64
        };

        let fleet_gap = routes.len().abs_diff(self.instance.vehicle.count);

        let distance: f64 = route_evals.iter().map(|r| r.distance).sum();
        let penalty: f64 = route_evals.iter().map(|r| r.penalty).sum::<f64>()
            + missing.len() as f64 * self.weights.missing_point
            + fleet_gap as f64 * self.weights.fleet_size_mismatch;

        Evaluation {
            distance,
            penalty,
            cost: distance + penalty,
            routes: route_evals,
            missing,
            duplicates,
            coverage,
        }
    }

    fn evaluate_route(
        &self,
        route: &[usize],
        seen: &mut HashSet<usize>,
        duplicates: &mut Vec<usize>,
    ) -> RouteEvaluation {
        let capacity = self.instance.vehicle.capacity_mass;
        let range = self.instance.vehicle.fuel_range;
        let has_stations = !self.instance.fuel_stations.is_empty();

        let mut eval = RouteEvaluation {
            distance: 0.0,
            penalty: 0.0,
            final_load: 0.0,
            final_fuel: 0.0,
            collected: 0,
            unreachable_hops: 0,
        };
        let depot = Some(&self.instance.depot);
        for end in [route.first(), route.last()] {
            if end != depot {
                eval.penalty += self.weights.off_depot_endpoint;
            }
        }

        let mut load = 0.0;
        let mut fuel_used = 0.0;
        let mut pending_refuel = false;

        for (idx, &node) in route.iter().enumerate() {
            if idx > 0 {
                let hop = self.instance.distance(route[idx - 1], node);
                if hop.is_finite() {
                    eval.distance += hop;
                    fuel_used += hop;
                } else {
                    eval.unreachable_hops += 1;
                    eval.penalty += self.weights.unreachable_hop;
                }
            }

            match self.instance.role(node) {
                Some(NodeRole::CollectionPoint) => {
                    if seen.insert(node) {
                        load += self.instance.demand(node);
                        eval.collected += 1;
                    } else {
                        duplicates.push(node);
                        eval.penalty += self.weights.duplicate_visit;
                    }
                }
                Some(NodeRole::DisposalSite) => {
                    if load > capacity {
                        eval.penalty += (load - capacity) * self.weights.capacity_excess;
                    }
                    load = 0.0;
                    pending_refuel = true;
                }
                Some(NodeRole::FuelStation) => {
                    if fuel_used > range {
                        eval.penalty += (fuel_used - range) * self.weights.fuel_excess;
                    }
                    fuel_used = 0.0;
                    pending_refuel = false;
                }
                Some(NodeRole::Depot) | None => {}
            }
        }

        if load > capacity {
            eval.penalty += (load - capacity) * self.weights.capacity_excess;
        }
        if fuel_used > range {
            eval.penalty += (fuel_used - range) * self.weights.fuel_excess;
        }
        if pending_refuel && has_stations {
            eval.penalty += self.weights.disposal_without_refuel;
        }

        eval.final_load = load;
        eval.final_fuel = range - fuel_used;
        eval
    }
}
