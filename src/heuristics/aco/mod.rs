//! Pheromone-guided swarm for fleet collection routing.
//!
//! One agent per vehicle walks the network, first inside its own zone and
//! then collaboratively over whatever is left. A single visited set shared
//! by all agents within an iteration keeps two agents from claiming the
//! same point, which is why agents are processed strictly one after the
//! other. Pheromones are updated only once every agent has moved.

mod agent;
mod pheromone;

pub use agent::{Agent, AgentState, MoveError};
pub use pheromone::PheromoneTable;

use crate::evaluator::Evaluator;
use crate::heuristics::RoutingStrategy;
use crate::instance::ProblemInstance;
use crate::solution::Solution;
use anyhow::{bail, Result};
use ordered_float::OrderedFloat;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use std::collections::HashSet;

/// Swarm configuration parameters
#[derive(Debug, Clone)]
pub struct ACOConfig {
    /// Iteration budget before any extension
    pub max_iterations: usize,
    /// Pheromone importance (alpha)
    pub alpha: f64,
    /// Heuristic importance (beta)
    pub beta: f64,
    /// Evaporation rate (rho), strictly between 0 and 1
    pub evaporation_rate: f64,
    /// Reinforcement added to edges ending at a collection point
    pub deposit: f64,
    /// Weight multiplier for in-zone candidates during the personal phase
    pub zone_bonus: f64,
    /// Fuel kept in reserve for reaching a station
    pub fuel_margin: f64,
    /// Step budget of an agent's personal phase
    pub max_steps: usize,
    pub collaborative_passes: usize,
    /// Step budget per agent in one collaborative pass
    pub collaborative_steps: usize,
    /// Coverage from which the budget is extended once
    pub near_complete_coverage: f64,
    pub near_complete_extension: usize,
    /// Outstanding points at or below which the budget is extended once
    pub few_outstanding: usize,
    pub few_outstanding_extension: usize,
    /// Points each agent may still try after the last iteration
    pub recovery_attempts: usize,
    /// Random seed
    pub seed: u64,
}

impl Default for ACOConfig {
    fn default() -> Self {
        ACOConfig {
            max_iterations: 80,
            alpha: 1.0,
            beta: 2.0,
            evaporation_rate: 0.1,
            deposit: 1.0,
            zone_bonus: 1.5,
            fuel_margin: 300.0,
            max_steps: 200,
            collaborative_passes: 3,
            collaborative_steps: 150,
            near_complete_coverage: 0.95,
            near_complete_extension: 10,
            few_outstanding: 10,
            few_outstanding_extension: 20,
            recovery_attempts: 5,
            seed: 42,
        }
    }
}

impl ACOConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.evaporation_rate > 0.0 && self.evaporation_rate < 1.0) {
            bail!("evaporation rate must lie in (0, 1), got {}", self.evaporation_rate);
        }
        if self.alpha < 0.0 || self.beta < 0.0 {
            bail!("alpha and beta must be non-negative, got {} and {}", self.alpha, self.beta);
        }
        if !(self.zone_bonus > 0.0) {
            bail!("zone bonus must be positive, got {}", self.zone_bonus);
        }
        if self.deposit < 0.0 {
            bail!("pheromone deposit must be non-negative, got {}", self.deposit);
        }
        if self.fuel_margin < 0.0 {
            bail!("fuel margin must be non-negative, got {}", self.fuel_margin);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Personal,
    Collaborative,
}

/// Agents and claimed points at the end of one iteration.
#[derive(Debug, Clone)]
struct Snapshot {
    agents: Vec<Agent>,
    visited: HashSet<usize>,
    warnings: Vec<String>,
}

impl Snapshot {
    fn total_distance(&self) -> f64 {
        self.agents.iter().map(|a| a.distance).sum()
    }

    /// More points first, then shorter total distance.
    fn beats(&self, other: &Snapshot) -> bool {
        self.visited.len() > other.visited.len()
            || (self.visited.len() == other.visited.len()
                && self.total_distance() < other.total_distance())
    }
}

fn record(warnings: &mut Vec<String>, msg: String) {
    log::warn!("{}", msg);
    warnings.push(msg);
}

/// Pheromone-guided swarm solver
pub struct AntColonyOptimization<'a> {
    config: ACOConfig,
    instance: &'a ProblemInstance,
    pheromone: PheromoneTable,
    zones: Vec<Vec<usize>>,
    required: Vec<usize>,
    agents: Vec<Agent>,
}

impl<'a> AntColonyOptimization<'a> {
    pub fn new(instance: &'a ProblemInstance, config: ACOConfig) -> Result<Self> {
        config.validate()?;
        let required: Vec<usize> = instance.required_points().collect();
        let zones = Self::build_zones(instance, &required);

        Ok(AntColonyOptimization {
            config,
            instance,
            pheromone: PheromoneTable::default(),
            zones,
            required,
            agents: Self::fresh_agents(instance),
        })
    }

    /// Points sorted by distance from the depot, dealt round-robin.
    fn build_zones(instance: &ProblemInstance, required: &[usize]) -> Vec<Vec<usize>> {
        let mut points = required.to_vec();
        points.sort_by_key(|&p| OrderedFloat(instance.distance(instance.depot, p)));

        let mut zones = vec![Vec::new(); instance.vehicle.count];
        for (k, p) in points.into_iter().enumerate() {
            zones[k % instance.vehicle.count].push(p);
        }
        zones
    }

    pub fn zones(&self) -> &[Vec<usize>] {
        &self.zones
    }

    pub fn pheromone(&self) -> &PheromoneTable {
        &self.pheromone
    }

    pub fn run(&mut self) -> Solution {
        let mut rng = ChaCha8Rng::seed_from_u64(self.config.seed);
        self.run_with_rng(&mut rng)
    }

    pub fn run_with_rng<R: Rng>(&mut self, rng: &mut R) -> Solution {
        let start = std::time::Instant::now();
        let required = self.required.len();

        let mut best: Option<Snapshot> = None;
        let mut budget = self.config.max_iterations;
        let mut extended = false;
        let mut iteration = 0;

        while iteration < budget {
            let snapshot = self.run_iteration(rng);
            iteration += 1;

            let claimed = snapshot.visited.len();
            let coverage = if required == 0 { 1.0 } else { claimed as f64 / required as f64 };
            log::debug!(
                "swarm iteration {}: {}/{} points, distance {:.2}",
                iteration,
                claimed,
                required,
                snapshot.total_distance()
            );

            if best.as_ref().map_or(true, |b| snapshot.beats(b)) {
                best = Some(snapshot);
            }

            if coverage >= 1.0 {
                break;
            }

            if iteration == budget && !extended {
                extended = true;
                if required - claimed <= self.config.few_outstanding {
                    budget += self.config.few_outstanding_extension;
                } else if coverage >= self.config.near_complete_coverage {
                    budget += self.config.near_complete_extension;
                }
                if budget > iteration {
                    log::debug!("swarm budget extended to {} iterations", budget);
                }
            }
        }

        let Snapshot { mut agents, mut visited, mut warnings } = best.unwrap_or_else(|| Snapshot {
            agents: Self::fresh_agents(self.instance),
            visited: HashSet::new(),
            warnings: Vec::new(),
        });

        self.recover(&mut agents, &mut visited);
        for agent in agents.iter_mut() {
            self.close(agent, &mut warnings);
        }

        let routes: Vec<Vec<usize>> = agents.into_iter().map(|a| a.route).collect();
        let evaluator = Evaluator::new(self.instance);
        let mut solution = Solution::from_routes(&evaluator, routes, "AntColony").with_warnings(warnings);
        solution.iterations = Some(iteration);
        solution.computation_time = start.elapsed().as_secs_f64();

        log::info!(
            "AntColony: {} iterations, coverage {:.1}%, cost {:.2}",
            iteration,
            solution.coverage * 100.0,
            solution.cost
        );
        solution
    }

    fn fresh_agents(instance: &ProblemInstance) -> Vec<Agent> {
        (0..instance.vehicle.count)
            .map(|id| Agent::new(id, instance))
            .collect()
    }

    fn run_iteration<R: Rng>(&mut self, rng: &mut R) -> Snapshot {
        let mut agents = std::mem::take(&mut self.agents);
        for agent in agents.iter_mut() {
            agent.reset(self.instance);
        }
        let mut visited = HashSet::new();
        let mut warnings = Vec::new();

        for agent in agents.iter_mut() {
            for _ in 0..self.config.max_steps {
                if !self.step(agent, &mut visited, Phase::Personal, rng) {
                    break;
                }
            }
        }

        for pass in 0..self.config.collaborative_passes {
            if visited.len() == self.required.len() {
                break;
            }
            let before = visited.len();

            for agent in agents.iter_mut() {
                for _ in 0..self.config.collaborative_steps {
                    if !self.step(agent, &mut visited, Phase::Collaborative, rng)
                        && !self.detour(agent, &mut visited)
                    {
                        break;
                    }
                }
            }

            if visited.len() == before {
                for agent in agents.iter_mut().filter(|a| a.load > 0.0) {
                    record(
                        &mut warnings,
                        format!(
                            "agent {}: emergency dump of {:.1} at node {} after stalled pass {}",
                            agent.id, agent.load, agent.position, pass
                        ),
                    );
                    agent.load = 0.0;
                }
            }
        }

        self.pheromone.update(
            self.instance,
            agents.iter().map(|a| a.route.as_slice()),
            self.config.evaporation_rate,
            self.config.deposit,
        );

        self.agents = agents.clone();
        Snapshot { agents, visited, warnings }
    }

    /// One decision of the agent loop. Returns false when the agent stops.
    fn step<R: Rng>(
        &self,
        agent: &mut Agent,
        visited: &mut HashSet<usize>,
        phase: Phase,
        rng: &mut R,
    ) -> bool {
        let instance = self.instance;

        if phase == Phase::Personal && !self.zone_open(agent.id, visited) {
            return false;
        }

        if let Some(station) = instance.nearest_fuel_station(agent.position) {
            let reserve = instance.distance(agent.position, station) + self.config.fuel_margin;
            if agent.fuel <= reserve {
                if station == agent.position {
                    return false;
                }
                return match agent.move_to(instance, station) {
                    Ok(()) => true,
                    Err(e) => {
                        log::debug!("agent {} cannot refuel: {}", agent.id, e);
                        false
                    }
                };
            }
        }

        let capacity = instance.vehicle.capacity_mass;
        if agent.load > 0.0 && agent.load + instance.max_demand() > capacity {
            return match self.dispose(agent) {
                Ok(()) => true,
                Err(e) => {
                    log::debug!("agent {} cannot reach disposal: {}", agent.id, e);
                    false
                }
            };
        }

        let Some(next) = self.select_next(agent, visited, phase, rng) else {
            return false;
        };

        match agent.move_to(instance, next) {
            Ok(()) => {
                visited.insert(next);
                true
            }
            Err(e) => {
                log::debug!("agent {} move to {} refused: {}", agent.id, next, e);
                false
            }
        }
    }

    fn zone_open(&self, id: usize, visited: &HashSet<usize>) -> bool {
        self.zones
            .get(id)
            .map_or(false, |zone| zone.iter().any(|p| !visited.contains(p)))
    }

    /// Fuel needed to drive from `from` to the disposal site and on to the
    /// nearest station, or to the depot when there are no stations.
    fn disposal_leg(&self, from: usize) -> f64 {
        let instance = self.instance;
        let disposal = instance.disposal_site;
        let onward = if instance.fuel_stations.is_empty() {
            instance.distance(disposal, instance.depot)
        } else {
            instance.distance_to_nearest_fuel(disposal)
        };
        let onward = if onward.is_finite() { onward } else { 0.0 };
        instance.distance(from, disposal) + onward
    }

    /// Unload at the disposal site, refuelling first when the tank would
    /// not cover the trip there and on to fuel.
    fn dispose(&self, agent: &mut Agent) -> std::result::Result<(), MoveError> {
        let instance = self.instance;
        let needed = self.disposal_leg(agent.position) + self.config.fuel_margin;
        if needed > agent.fuel && !instance.is_fuel_station(agent.position) {
            if let Some(station) = instance.nearest_fuel_station(agent.position) {
                agent.move_to(instance, station)?;
            }
        }
        agent.move_to(instance, instance.disposal_site)
    }

    /// Whether `agent` can take `point` and still reach fuel afterwards.
    fn is_safe(&self, agent: &Agent, point: usize) -> bool {
        let instance = self.instance;
        let hop = instance.distance(agent.position, point);
        if !hop.is_finite() {
            return false;
        }
        if agent.load + instance.demand(point) > instance.vehicle.capacity_mass {
            return false;
        }
        let onward = if instance.fuel_stations.is_empty() {
            instance.distance(point, instance.depot)
        } else {
            instance.distance_to_nearest_fuel(point)
        };
        hop + onward + self.config.fuel_margin <= agent.fuel
    }

    /// Weighted roulette over safe remaining points.
    fn select_next<R: Rng>(
        &self,
        agent: &Agent,
        visited: &HashSet<usize>,
        phase: Phase,
        rng: &mut R,
    ) -> Option<usize> {
        let personal = phase == Phase::Personal;
        let pool: &[usize] = if personal {
            self.zones.get(agent.id).map(|z| z.as_slice()).unwrap_or(&[])
        } else {
            &self.required
        };

        let candidates: Vec<(usize, f64)> = pool
            .iter()
            .copied()
            .filter(|p| !visited.contains(p) && self.is_safe(agent, *p))
            .map(|p| {
                let d = self.instance.distance(agent.position, p);
                let eta = if d > 0.0 { 1.0 / d } else { 1e6 };
                let mut weight = self.pheromone.get(agent.position, p).powf(self.config.alpha)
                    * eta.powf(self.config.beta);
                if personal {
                    weight *= self.config.zone_bonus;
                }
                (p, weight)
            })
            .collect();

        Self::roulette(&candidates, rng)
    }

    fn roulette<R: Rng>(candidates: &[(usize, f64)], rng: &mut R) -> Option<usize> {
        if candidates.is_empty() {
            return None;
        }

        let total: f64 = candidates.iter().map(|&(_, w)| w).sum();
        if !total.is_finite() || total <= 0.0 {
            return candidates
                .iter()
                .max_by_key(|&&(_, w)| OrderedFloat(w))
                .map(|&(p, _)| p);
        }

        let draw = rng.gen_range(0.0..total);
        let mut cumulative = 0.0;
        for &(p, w) in candidates {
            cumulative += w;
            if draw < cumulative {
                return Some(p);
            }
        }
        candidates.last().map(|&(p, _)| p)
    }

    /// Refuel at the station that brings some stranded point in safe reach,
    /// then take that point.
    fn detour(&self, agent: &mut Agent, visited: &mut HashSet<usize>) -> bool {
        let instance = self.instance;
        let range = instance.vehicle.fuel_range;
        let capacity = instance.vehicle.capacity_mass;

        let mut best: Option<(usize, usize, f64)> = None;
        for &point in self.required.iter().filter(|p| !visited.contains(p)) {
            if agent.load + instance.demand(point) > capacity {
                continue;
            }
            let onward = instance.distance_to_nearest_fuel(point);
            for &station in &instance.fuel_stations {
                if station == agent.position {
                    continue;
                }
                let to_station = instance.distance(agent.position, station);
                let to_point = instance.distance(station, point);
                if !(to_station <= agent.fuel)
                    || !(to_point + onward + self.config.fuel_margin <= range)
                {
                    continue;
                }
                let total = to_station + to_point;
                if best.map_or(true, |(_, _, t)| total < t) {
                    best = Some((station, point, total));
                }
            }
        }

        let Some((station, point, _)) = best else {
            return false;
        };
        if agent.move_to(instance, station).is_err() {
            return false;
        }
        match agent.move_to(instance, point) {
            Ok(()) => {
                visited.insert(point);
                true
            }
            Err(e) => {
                log::debug!("agent {} detour to {} failed: {}", agent.id, point, e);
                false
            }
        }
    }

    /// Last chance for points still outstanding after the final iteration.
    fn recover(&self, agents: &mut [Agent], visited: &mut HashSet<usize>) {
        let instance = self.instance;

        for agent in agents.iter_mut() {
            let reachable = self.required.iter().any(|&p| {
                !visited.contains(&p)
                    && (instance.distances().is_reachable(agent.position, p)
                        || instance
                            .fuel_stations
                            .iter()
                            .any(|&s| instance.distances().is_reachable(s, p)))
            });
            if !reachable {
                continue;
            }

            if agent.load > 0.0 {
                if let Err(e) = self.dispose(agent) {
                    log::debug!("agent {} cannot unload before recovery: {}", agent.id, e);
                    continue;
                }
            }
            if !instance.is_fuel_station(agent.position) {
                if let Some(station) = instance.nearest_fuel_station(agent.position) {
                    if let Err(e) = agent.move_to(instance, station) {
                        log::debug!("agent {} cannot refuel before recovery: {}", agent.id, e);
                    }
                }
            }

            for _ in 0..self.config.recovery_attempts {
                if agent.load > 0.0
                    && agent.load + instance.max_demand() > instance.vehicle.capacity_mass
                    && self.dispose(agent).is_err()
                {
                    break;
                }
                let nearest = self
                    .required
                    .iter()
                    .copied()
                    .filter(|p| !visited.contains(p) && self.is_safe(agent, *p))
                    .min_by_key(|&p| OrderedFloat(instance.distance(agent.position, p)));
                let Some(point) = nearest else {
                    break;
                };
                if agent.move_to(instance, point).is_err() {
                    break;
                }
                visited.insert(point);
            }
        }
    }

    /// Disposal, refuel and depot legs for one agent.
    fn close(&self, agent: &mut Agent, warnings: &mut Vec<String>) {
        let instance = self.instance;
        let depot = instance.depot;
        let disposal = instance.disposal_site;

        if !agent.is_idle() && agent.position != disposal {
            let needed = self.disposal_leg(agent.position);
            let mut stranded = false;

            if needed > agent.fuel && !instance.is_fuel_station(agent.position) {
                let refuelled = instance
                    .nearest_fuel_station(agent.position)
                    .map_or(false, |s| agent.move_to(instance, s).is_ok());
                if !refuelled {
                    record(
                        warnings,
                        format!(
                            "agent {}: cannot reach a fuel station from {}, load of {:.1} cleared",
                            agent.id, agent.position, agent.load
                        ),
                    );
                    agent.load = 0.0;
                    stranded = true;
                }
            }

            if !stranded {
                if let Err(e) = agent.move_to(instance, disposal) {
                    record(
                        warnings,
                        format!(
                            "agent {}: disposal unreachable ({}), load of {:.1} cleared",
                            agent.id, e, agent.load
                        ),
                    );
                    agent.load = 0.0;
                }
            }
        }

        if agent.position == disposal {
            if let Some(station) = instance.nearest_fuel_station(disposal) {
                if let Err(e) = agent.move_to(instance, station) {
                    log::debug!("agent {} cannot refuel after disposal: {}", agent.id, e);
                }
            }
        }

        if agent.position != depot {
            if instance.distance(agent.position, depot) > agent.fuel
                && !instance.is_fuel_station(agent.position)
            {
                if let Some(station) = instance.nearest_fuel_station(agent.position) {
                    if let Err(e) = agent.move_to(instance, station) {
                        log::debug!("agent {} cannot refuel before the depot: {}", agent.id, e);
                    }
                }
            }
            if let Err(e) = agent.move_to(instance, depot) {
                record(
                    warnings,
                    format!("agent {}: cannot return to depot ({}), route closed anyway", agent.id, e),
                );
                agent.route.push(depot);
                agent.position = depot;
            }
        }

        if agent.route.len() == 1 {
            agent.route.push(depot);
        }
        agent.state = AgentState::Done;
    }
}

/// Swarm engine as a [`RoutingStrategy`].
#[derive(Debug, Clone, Default)]
pub struct AntColony {
    pub config: ACOConfig,
}

impl AntColony {
    pub fn new(config: ACOConfig) -> Self {
        AntColony { config }
    }
}

impl RoutingStrategy for AntColony {
    fn solve(&self, instance: &ProblemInstance) -> Result<Solution> {
        let mut colony = AntColonyOptimization::new(instance, self.config.clone())?;
        Ok(colony.run())
    }

    fn name(&self) -> &str {
        "AntColony"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::fixtures::*;
    use crate::instance::VehicleSpec;

    #[test]
    fn test_zones_partition_by_depot_distance() {
        let instance = scenario_instance(scenario_vehicle());
        let colony = AntColonyOptimization::new(&instance, ACOConfig::default()).unwrap();
        assert_eq!(colony.zones(), &[vec![1, 2], vec![3, 4]]);
    }

    #[test]
    fn test_scenario_full_coverage() {
        let instance = scenario_instance(scenario_vehicle());
        let solution = AntColony::default().solve(&instance).unwrap();

        assert_eq!(solution.coverage, 1.0);
        assert_eq!(solution.penalty, 0.0);
        assert_eq!(solution.iterations, Some(1));

        // each vehicle serves exactly its own zone
        for (route, zone) in solution.routes.iter().zip([vec![1, 2], vec![3, 4]]) {
            assert_eq!(route.first(), Some(&0));
            assert_eq!(&route[route.len() - 3..], &[5, 6, 0]);
            let mut points: Vec<usize> = route.iter().copied().filter(|&n| (1..=4).contains(&n)).collect();
            points.sort();
            assert_eq!(points, zone);
        }
    }

    #[test]
    fn test_personal_phase_stops_at_zone_end() {
        let instance = scenario_instance(VehicleSpec { capacity_mass: 5000.0, ..scenario_vehicle() });
        let colony = AntColonyOptimization::new(&instance, ACOConfig::default()).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let mut agent = Agent::new(0, &instance);
        let mut visited = HashSet::new();

        while colony.step(&mut agent, &mut visited, Phase::Personal, &mut rng) {}
        assert_eq!(visited, HashSet::from([1, 2]));
        assert!(colony.step(&mut agent, &mut visited, Phase::Collaborative, &mut rng));
        assert!(visited.contains(&3) || visited.contains(&4));
    }

    fn tight_config() -> ACOConfig {
        ACOConfig { fuel_margin: 0.0, ..Default::default() }
    }

    #[test]
    fn test_fuel_limited_refuels_before_every_disposal() {
        let instance = fuel_limited_instance(500.0);
        let solution = AntColony::new(tight_config()).solve(&instance).unwrap();

        assert_eq!(solution.coverage, 1.0);
        assert_eq!(solution.penalty, 0.0);
        assert!(solution.warnings.is_empty());
        assert_eq!(solution.iterations, Some(1));
        for route in &solution.routes {
            assert_eq!(route.first(), Some(&0));
            assert_eq!(route.last(), Some(&0));
            for (i, &node) in route.iter().enumerate() {
                if node == instance.disposal_site {
                    assert_eq!(route[i - 1], 6, "no refuel before disposal in {:?}", route);
                }
            }
        }
    }

    #[test]
    fn test_low_fuel_forces_refuel() {
        let instance = fuel_limited_instance(500.0);
        let config = ACOConfig { fuel_margin: 10.0, ..Default::default() };
        let colony = AntColonyOptimization::new(&instance, config).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(1);

        let mut agent = Agent::new(0, &instance);
        agent.move_to(&instance, 1).unwrap();
        agent.fuel = 50.0;
        let mut visited = HashSet::from([1]);

        assert!(colony.step(&mut agent, &mut visited, Phase::Collaborative, &mut rng));
        assert_eq!(agent.position, 6);
        assert_eq!(agent.fuel, 130.0);
        assert_eq!(agent.load, 300.0);
    }

    #[test]
    fn test_disposal_trip_refuels_first() {
        let instance = fuel_limited_instance(500.0);
        let colony = AntColonyOptimization::new(&instance, tight_config()).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(1);

        let mut agent = Agent::new(0, &instance);
        agent.move_to(&instance, 1).unwrap();
        let mut visited = HashSet::from([1]);

        assert!(colony.step(&mut agent, &mut visited, Phase::Collaborative, &mut rng));
        assert_eq!(agent.route, vec![0, 1, 6, 5]);
        assert_eq!(agent.load, 0.0);
        assert!((agent.fuel - 80.0).abs() < 1e-9);
    }

    #[test]
    fn test_detour_reaches_point_out_of_safe_range() {
        let instance = fuel_limited_instance(500.0);
        let colony = AntColonyOptimization::new(&instance, tight_config()).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(1);

        let mut agent = Agent::new(0, &instance);
        agent.move_to(&instance, 6).unwrap();
        agent.move_to(&instance, 5).unwrap();
        let mut visited = HashSet::from([1, 2, 3]);

        assert_eq!(colony.select_next(&agent, &visited, Phase::Collaborative, &mut rng), None);
        assert!(colony.detour(&mut agent, &mut visited));
        assert_eq!(agent.route, vec![0, 6, 5, 6, 4]);
        assert!(visited.contains(&4));
    }

    #[test]
    fn test_recover_unloads_and_refuels() {
        let instance = fuel_limited_instance(500.0);
        let colony = AntColonyOptimization::new(&instance, tight_config()).unwrap();

        let mut agent = Agent::new(0, &instance);
        agent.move_to(&instance, 1).unwrap();
        let mut agents = vec![agent];
        let mut visited = HashSet::from([1, 2, 3]);

        colony.recover(&mut agents, &mut visited);
        assert_eq!(agents[0].route, vec![0, 1, 6, 5, 6, 4]);
        assert!(visited.contains(&4));
    }

    #[test]
    fn test_stalled_pass_dumps_loads() {
        let base = isolated_point_instance();
        let instance = ProblemInstance::new(
            "isolated-roomy",
            base.distances().clone(),
            scenario_classification(),
            VehicleSpec { capacity_mass: 5000.0, ..scenario_vehicle() },
        )
        .unwrap();
        let mut colony = AntColonyOptimization::new(&instance, ACOConfig::default()).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(5);

        let snapshot = colony.run_iteration(&mut rng);
        assert_eq!(snapshot.visited, HashSet::from([1, 2, 3]));
        let dumps = snapshot.warnings.iter().filter(|w| w.contains("emergency dump")).count();
        assert_eq!(dumps, 2);
        assert!(snapshot.agents.iter().all(|a| a.load == 0.0));

        // the next iteration starts every agent over from the depot
        let again = colony.run_iteration(&mut rng);
        for (first, second) in snapshot.agents.iter().zip(&again.agents) {
            assert_eq!(second.route[0], 0);
            assert_eq!(second.route.len(), first.route.len());
            assert_eq!(second.collected(), first.collected());
        }
    }

    #[test]
    fn test_close_inserts_refuel_leg() {
        let instance = fuel_limited_instance(500.0);
        let colony = AntColonyOptimization::new(&instance, tight_config()).unwrap();
        let mut agent = Agent::new(0, &instance);
        agent.move_to(&instance, 1).unwrap();

        let mut warnings = Vec::new();
        colony.close(&mut agent, &mut warnings);
        assert_eq!(agent.route, vec![0, 1, 6, 5, 6, 0]);
        assert_eq!(agent.state, AgentState::Done);
        assert!(warnings.is_empty());
        let evaluation = Evaluator::new(&instance).evaluate(&[agent.route.clone(), vec![0, 0]]);
        assert_eq!(evaluation.routes[0].penalty, 0.0);
    }

    #[test]
    fn test_close_stranded_agent_warns() {
        let instance = fuel_limited_instance(500.0);
        let colony = AntColonyOptimization::new(&instance, tight_config()).unwrap();
        let mut agent = Agent::new(0, &instance);
        agent.move_to(&instance, 1).unwrap();
        agent.fuel = 5.0;

        let mut warnings = Vec::new();
        colony.close(&mut agent, &mut warnings);
        assert_eq!(agent.route, vec![0, 1, 0]);
        assert_eq!(agent.load, 0.0);
        assert_eq!(warnings.len(), 2);
        assert!(warnings[0].contains("load of 300.0 cleared"));
        assert!(warnings[1].contains("cannot return to depot"));
    }

    #[test]
    fn test_near_complete_coverage_extends_budget() {
        let instance = isolated_point_instance();
        let config = ACOConfig {
            max_iterations: 2,
            few_outstanding: 0,
            near_complete_coverage: 0.7,
            near_complete_extension: 3,
            ..Default::default()
        };
        let solution = AntColony::new(config.clone()).solve(&instance).unwrap();
        assert_eq!(solution.iterations, Some(5));

        let config = ACOConfig { near_complete_coverage: 0.8, ..config };
        let solution = AntColony::new(config).solve(&instance).unwrap();
        assert_eq!(solution.iterations, Some(2));
    }

    #[test]
    fn test_tiny_fuel_collects_nothing() {
        let instance = scenario_instance(VehicleSpec { fuel_range: 1.0, ..scenario_vehicle() });
        let config = ACOConfig { fuel_margin: 0.0, max_iterations: 3, ..Default::default() };
        let solution = AntColony::new(config).solve(&instance).unwrap();

        assert!(solution.routes.iter().all(|r| r == &vec![0, 0]));
        assert_eq!(solution.coverage, 0.0);
        assert!(solution.warnings.is_empty());
    }

    #[test]
    fn test_unreachable_point_reported_missing() {
        let instance = isolated_point_instance();
        let solution = AntColony::default().solve(&instance).unwrap();
        let evaluation = Evaluator::new(&instance).evaluate(&solution.routes);
        assert_eq!(evaluation.missing, vec![4]);
        assert!(evaluation.duplicates.is_empty());
        // budget of 80 extended once because a single point is outstanding
        assert_eq!(solution.iterations, Some(100));
    }

    #[test]
    fn test_same_seed_same_routes() {
        let instance = scenario_instance(VehicleSpec { capacity_mass: 700.0, ..scenario_vehicle() });
        let config = ACOConfig { seed: 11, ..Default::default() };
        let a = AntColony::new(config.clone()).solve(&instance).unwrap();
        let b = AntColony::new(config).solve(&instance).unwrap();
        assert_eq!(a.routes, b.routes);
        assert_eq!(a.cost, b.cost);
    }

    #[test]
    fn test_pheromone_positive_after_run() {
        let instance = isolated_point_instance();
        let config = ACOConfig { evaporation_rate: 0.5, ..Default::default() };
        let mut colony = AntColonyOptimization::new(&instance, config).unwrap();
        colony.run();
        assert!(!colony.pheromone().is_empty());
        assert!(colony.pheromone().iter().all(|(_, &w)| w > 0.0));
    }

    #[test]
    fn test_roulette_picks_only_candidate() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        assert_eq!(AntColonyOptimization::roulette(&[(7, 0.3)], &mut rng), Some(7));
        assert_eq!(AntColonyOptimization::roulette(&[], &mut rng), None);
        let inf = [(1, 1.0), (2, f64::INFINITY)];
        assert_eq!(AntColonyOptimization::roulette(&inf, &mut rng), Some(2));
    }

    #[test]
    fn test_invalid_evaporation_rejected() {
        let instance = scenario_instance(scenario_vehicle());
        for rho in [0.0, 1.0, -0.2] {
            let config = ACOConfig { evaporation_rate: rho, ..Default::default() };
            assert!(AntColonyOptimization::new(&instance, config).is_err());
        }
    }
}
