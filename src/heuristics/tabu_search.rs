use crate::evaluator::Evaluator;
use crate::heuristics::{RoutingStrategy, SavingsHeuristic};
use crate::instance::ProblemInstance;
use crate::solution::Solution;
use anyhow::{bail, Result};
use rand::prelude::*;
use rand::seq::index::sample;
use rand_chacha::ChaCha8Rng;
use std::collections::VecDeque;

/// Swap of two collection-point visits between distinct routes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Move {
    pub node1: usize,
    pub route1: usize,
    pub node2: usize,
    pub route2: usize,
}

impl Move {
    /// Same swap with its endpoints in canonical order.
    fn normalized(self) -> Self {
        if (self.route1, self.node1) <= (self.route2, self.node2) {
            self
        } else {
            Move {
                node1: self.node2,
                route1: self.route2,
                node2: self.node1,
                route2: self.route1,
            }
        }
    }
}

/// Fixed-capacity record of recently applied moves; the oldest is evicted first.
#[derive(Debug, Clone)]
pub struct TabuMemory {
    moves: VecDeque<Move>,
    capacity: usize,
}

impl TabuMemory {
    pub fn new(capacity: usize) -> Self {
        TabuMemory {
            moves: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, mv: Move) {
        if self.capacity == 0 {
            return;
        }
        if self.moves.len() == self.capacity {
            self.moves.pop_front();
        }
        self.moves.push_back(mv.normalized());
    }

    pub fn contains(&self, mv: &Move) -> bool {
        let mv = mv.normalized();
        self.moves.contains(&mv)
    }

    pub fn len(&self) -> usize {
        self.moves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.moves.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Move> {
        self.moves.iter()
    }
}

#[derive(Debug, Clone)]
pub struct TabuConfig {
    /// Round budget
    pub max_iterations: usize,
    /// Capacity of the tabu memory
    pub tabu_tenure: usize,
    /// Neighbors generated per round
    pub num_neighbors: usize,
    /// Generation attempts allowed per requested neighbor
    pub attempts_per_neighbor: usize,
    pub seed: u64,
}

impl Default for TabuConfig {
    fn default() -> Self {
        TabuConfig {
            max_iterations: 100,
            tabu_tenure: 7,
            num_neighbors: 10,
            attempts_per_neighbor: 3,
            seed: 42,
        }
    }
}

impl TabuConfig {
    pub fn validate(&self) -> Result<()> {
        if self.num_neighbors == 0 {
            bail!("tabu search needs at least one neighbor per round");
        }
        if self.attempts_per_neighbor == 0 {
            bail!("tabu search needs at least one attempt per neighbor");
        }
        Ok(())
    }
}

/// Outcome of one tabu run.
#[derive(Debug, Clone)]
pub struct TabuResult {
    /// Best route set seen
    pub routes: Vec<Vec<usize>>,
    pub best_cost: f64,
    pub initial_cost: f64,
    /// Rounds actually executed
    pub rounds: usize,
    /// Best-known cost after each round
    pub cost_history: Vec<f64>,
    /// Tabu neighbors admitted through aspiration
    pub tabu_overrides: usize,
}

/// Tabu search over inter-route point swaps.
///
/// Depot, disposal and fuel legs stay fixed; only collection-point
/// positions are swapped. The chosen neighbor always replaces the current
/// solution, even when it is worse, so the search can climb out of local
/// minima while the tabu memory prevents immediate cycling.
pub struct TabuSearch {
    pub config: TabuConfig,
}

impl TabuSearch {
    pub fn new(config: TabuConfig) -> Self {
        TabuSearch { config }
    }

    /// Starting routes from the first-fit assignment, each closed by
    /// disposal, the fuel station nearest the disposal site, and the depot.
    pub fn initial_routes(&self, instance: &ProblemInstance) -> (Vec<Vec<usize>>, Vec<String>) {
        let (assigned, warnings) = SavingsHeuristic::new().assign_to_fleet(instance);
        let depot = instance.depot;
        let disposal = instance.disposal_site;
        let station = instance.nearest_fuel_station(disposal);

        let routes = assigned
            .into_iter()
            .map(|points| {
                let mut route = vec![depot];
                if !points.is_empty() {
                    route.extend(points);
                    route.push(disposal);
                    route.extend(station);
                }
                route.push(depot);
                route
            })
            .collect();

        (routes, warnings)
    }

    pub fn improve(&self, instance: &ProblemInstance, routes: Vec<Vec<usize>>) -> TabuResult {
        let mut rng = ChaCha8Rng::seed_from_u64(self.config.seed);
        self.improve_with_rng(instance, routes, &mut rng)
    }

    pub fn improve_with_rng<R: Rng>(
        &self,
        instance: &ProblemInstance,
        routes: Vec<Vec<usize>>,
        rng: &mut R,
    ) -> TabuResult {
        let evaluator = Evaluator::new(instance);
        let mut memory = TabuMemory::new(self.config.tabu_tenure);

        let initial_cost = evaluator.cost(&routes);
        let mut current = routes;
        let mut best = current.clone();
        let mut best_cost = initial_cost;
        let mut cost_history = Vec::with_capacity(self.config.max_iterations);
        let mut tabu_overrides = 0;
        let mut rounds = 0;

        for round in 0..self.config.max_iterations {
            let neighbors = self.generate_neighbors(instance, &current, rng);
            if neighbors.is_empty() {
                log::debug!("tabu round {}: no neighbors, stopping", round);
                break;
            }
            rounds += 1;

            match self.select_neighbor(&evaluator, &neighbors, &memory, best_cost) {
                Some(choice) => {
                    tabu_overrides += choice.overrides;
                    let (mv, routes) = &neighbors[choice.index];
                    current = routes.clone();
                    if choice.cost < best_cost {
                        best = current.clone();
                        best_cost = choice.cost;
                    }
                    memory.push(*mv);
                }
                None => {
                    log::debug!("tabu round {}: every neighbor is tabu", round);
                }
            }

            cost_history.push(best_cost);
            log::debug!("tabu round {}: best {:.2}", round, best_cost);
        }

        TabuResult {
            routes: best,
            best_cost,
            initial_cost,
            rounds,
            cost_history,
            tabu_overrides,
        }
    }

    /// Positions holding a collection point strictly inside the route.
    fn swappable(instance: &ProblemInstance, route: &[usize]) -> Vec<usize> {
        (1..route.len().saturating_sub(1))
            .filter(|&i| instance.is_collection_point(route[i]))
            .collect()
    }

    fn generate_neighbors<R: Rng>(
        &self,
        instance: &ProblemInstance,
        routes: &[Vec<usize>],
        rng: &mut R,
    ) -> Vec<(Move, Vec<Vec<usize>>)> {
        let positions: Vec<Vec<usize>> = routes
            .iter()
            .map(|route| Self::swappable(instance, route))
            .collect();
        let candidates: Vec<usize> = (0..routes.len())
            .filter(|&r| !positions[r].is_empty())
            .collect();
        if candidates.len() < 2 {
            return Vec::new();
        }

        let mut neighbors = Vec::with_capacity(self.config.num_neighbors);
        let mut attempts = self.config.num_neighbors * self.config.attempts_per_neighbor;

        while neighbors.len() < self.config.num_neighbors && attempts > 0 {
            attempts -= 1;

            let pair = sample(rng, candidates.len(), 2);
            let (r1, r2) = (candidates[pair.index(0)], candidates[pair.index(1)]);
            let (Some(&i), Some(&j)) = (positions[r1].choose(rng), positions[r2].choose(rng)) else {
                continue;
            };

            let (node1, node2) = (routes[r1][i], routes[r2][j]);
            if node1 == node2 || routes[r2].contains(&node1) || routes[r1].contains(&node2) {
                continue;
            }

            let mut neighbor = routes.to_vec();
            neighbor[r1][i] = node2;
            neighbor[r2][j] = node1;
            neighbors.push((Move { node1, route1: r1, node2, route2: r2 }, neighbor));
        }

        neighbors
    }

    /// Lowest-cost admissible neighbor; ties keep generation order.
    fn select_neighbor(
        &self,
        evaluator: &Evaluator,
        neighbors: &[(Move, Vec<Vec<usize>>)],
        memory: &TabuMemory,
        best_cost: f64,
    ) -> Option<Selection> {
        let mut chosen: Option<Selection> = None;
        let mut overrides = 0;

        for (index, (mv, routes)) in neighbors.iter().enumerate() {
            let cost = evaluator.cost(routes);
            if memory.contains(mv) {
                if cost < best_cost {
                    overrides += 1;
                } else {
                    continue;
                }
            }
            if chosen.as_ref().map_or(true, |c| cost < c.cost) {
                chosen = Some(Selection { index, cost, overrides: 0 });
            }
        }

        chosen.map(|c| Selection { overrides, ..c })
    }
}

impl Default for TabuSearch {
    fn default() -> Self {
        Self::new(TabuConfig::default())
    }
}

struct Selection {
    index: usize,
    cost: f64,
    overrides: usize,
}

impl RoutingStrategy for TabuSearch {
    fn solve(&self, instance: &ProblemInstance) -> Result<Solution> {
        self.config.validate()?;
        let start = std::time::Instant::now();

        let (initial, warnings) = self.initial_routes(instance);
        let result = self.improve(instance, initial);

        let evaluator = Evaluator::new(instance);
        let mut solution =
            Solution::from_routes(&evaluator, result.routes, self.name()).with_warnings(warnings);
        solution.iterations = Some(result.rounds);
        solution.computation_time = start.elapsed().as_secs_f64();

        log::info!(
            "{}: {} rounds, cost {:.2} -> {:.2}, {} aspiration overrides",
            self.name(),
            result.rounds,
            result.initial_cost,
            result.best_cost,
            result.tabu_overrides
        );
        Ok(solution)
    }

    fn name(&self) -> &str {
        "TabuSearch"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::fixtures::*;
    use crate::instance::VehicleSpec;

    fn two_route_instance() -> ProblemInstance {
        scenario_instance(VehicleSpec { capacity_mass: 600.0, ..scenario_vehicle() })
    }

    #[test]
    fn test_memory_evicts_oldest() {
        let mut memory = TabuMemory::new(2);
        let a = Move { node1: 1, route1: 0, node2: 3, route2: 1 };
        let b = Move { node1: 2, route1: 0, node2: 4, route2: 1 };
        let c = Move { node1: 1, route1: 0, node2: 4, route2: 1 };
        memory.push(a);
        memory.push(b);
        memory.push(c);
        assert_eq!(memory.len(), 2);
        assert!(!memory.contains(&a));
        assert!(memory.contains(&b));
        assert!(memory.contains(&c));
    }

    #[test]
    fn test_memory_matches_either_orientation() {
        let mut memory = TabuMemory::new(3);
        memory.push(Move { node1: 1, route1: 0, node2: 3, route2: 1 });
        assert!(memory.contains(&Move { node1: 3, route1: 1, node2: 1, route2: 0 }));
    }

    #[test]
    fn test_initial_routes_layout() {
        let instance = two_route_instance();
        let search = TabuSearch::default();
        let (routes, warnings) = search.initial_routes(&instance);
        assert_eq!(routes, vec![vec![0, 1, 2, 5, 6, 0], vec![0, 3, 4, 5, 6, 0]]);
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_best_cost_non_increasing() {
        let instance = two_route_instance();
        let search = TabuSearch::new(TabuConfig { max_iterations: 30, ..Default::default() });
        let (initial, _) = search.initial_routes(&instance);
        let result = search.improve(&instance, initial);

        assert!(result.rounds > 0);
        assert!(result.best_cost <= result.initial_cost);
        assert!(result.cost_history.windows(2).all(|w| w[1] <= w[0]));

        let evaluation = Evaluator::new(&instance).evaluate(&result.routes);
        assert!(evaluation.missing.is_empty());
        assert!(evaluation.duplicates.is_empty());
        assert_eq!(evaluation.cost, result.best_cost);
    }

    #[test]
    fn test_no_neighbors_stops_early() {
        let instance = scenario_instance(VehicleSpec {
            capacity_mass: 5000.0,
            ..scenario_vehicle()
        });
        let search = TabuSearch::default();
        let (initial, _) = search.initial_routes(&instance);
        assert_eq!(initial[1], vec![0, 0]);

        let result = search.improve(&instance, initial.clone());
        assert_eq!(result.rounds, 0);
        assert_eq!(result.routes, initial);
        assert!(result.cost_history.is_empty());
    }

    #[test]
    fn test_aspiration_and_tabu_skip() {
        let instance = two_route_instance();
        let evaluator = Evaluator::new(&instance);
        let search = TabuSearch::default();

        let good = vec![vec![0, 1, 2, 5, 6, 0], vec![0, 3, 4, 5, 6, 0]];
        let worse = vec![vec![0, 1, 3, 5, 6, 0], vec![0, 2, 4, 5, 6, 0]];
        let good_cost = evaluator.cost(&good);
        let worse_cost = evaluator.cost(&worse);
        assert!(good_cost < worse_cost);

        let tabu_move = Move { node1: 3, route1: 0, node2: 2, route2: 1 };
        let free_move = Move { node1: 4, route1: 0, node2: 1, route2: 1 };
        let mut memory = TabuMemory::new(5);
        memory.push(tabu_move);

        let neighbors = vec![(tabu_move, good.clone()), (free_move, worse.clone())];

        // Tabu neighbor beats the best known cost: admitted by aspiration.
        let choice = search
            .select_neighbor(&evaluator, &neighbors, &memory, good_cost + 1.0)
            .unwrap();
        assert_eq!(choice.index, 0);
        assert_eq!(choice.overrides, 1);

        // Otherwise it is skipped even though it is the cheapest.
        let choice = search
            .select_neighbor(&evaluator, &neighbors, &memory, good_cost)
            .unwrap();
        assert_eq!(choice.index, 1);
        assert_eq!(choice.overrides, 0);

        // All tabu and no aspiration: nothing selected.
        let only_tabu = vec![(tabu_move, good)];
        assert!(search
            .select_neighbor(&evaluator, &only_tabu, &memory, good_cost)
            .is_none());
    }

    #[test]
    fn test_same_seed_same_result() {
        let instance = two_route_instance();
        let search = TabuSearch::new(TabuConfig { max_iterations: 20, seed: 7, ..Default::default() });
        let a = search.solve(&instance).unwrap();
        let b = search.solve(&instance).unwrap();
        assert_eq!(a.routes, b.routes);
        assert_eq!(a.iterations, b.iterations);
    }

    #[test]
    fn test_unreachable_point_reported_missing() {
        let instance = isolated_point_instance();
        let solution = TabuSearch::default().solve(&instance).unwrap();
        let evaluation = Evaluator::new(&instance).evaluate(&solution.routes);
        assert_eq!(evaluation.missing, vec![4]);
        assert!(!solution.warnings.is_empty());
    }

    #[test]
    fn test_out_of_range_node_is_priced_not_fatal() {
        let instance = two_route_instance();
        let routes = vec![vec![0, 1, 99, 2, 5, 6, 0], vec![0, 3, 4, 5, 6, 0]];
        let search = TabuSearch::new(TabuConfig { max_iterations: 5, ..Default::default() });
        let result = search.improve(&instance, routes);

        let weights = crate::evaluator::PenaltyWeights::default();
        assert!(result.initial_cost >= 2.0 * weights.unreachable_hop);
        assert!(result.best_cost <= result.initial_cost);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let search = TabuSearch::new(TabuConfig { num_neighbors: 0, ..Default::default() });
        assert!(search.solve(&two_route_instance()).is_err());
    }
}
