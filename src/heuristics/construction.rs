use crate::evaluator::Evaluator;
use crate::heuristics::RoutingStrategy;
use crate::instance::{NodeRole, ProblemInstance};
use crate::solution::Solution;
use ordered_float::OrderedFloat;
use std::collections::HashSet;

/// Clarke-Wright savings construction for the collection fleet.
///
/// Pairs collection points by the distance saved when serving both on one
/// trip instead of two depot round-trips, then deals the resulting trips
/// across the fleet while inserting disposal and refuel stops.
#[derive(Debug, Clone, Default)]
pub struct SavingsHeuristic;

impl SavingsHeuristic {
    pub fn new() -> Self {
        SavingsHeuristic
    }

    /// Savings for every unordered pair of collection points, best first.
    ///
    /// Pairs involving an unreachable leg are left out. Ties keep pair
    /// enumeration order.
    pub fn compute_savings(&self, instance: &ProblemInstance) -> Vec<(usize, usize, f64)> {
        let depot = instance.depot;
        let points = &instance.collection_points;
        let mut savings = Vec::new();

        for (a, &i) in points.iter().enumerate() {
            for &j in &points[a + 1..] {
                let s = instance.distance(depot, i) + instance.distance(depot, j)
                    - instance.distance(i, j);
                if s.is_finite() {
                    savings.push((i, j, s));
                }
            }
        }

        savings.sort_by(|a, b| OrderedFloat(b.2).cmp(&OrderedFloat(a.2)));
        savings
    }

    /// Raw trip topology: merged pairs first, then leftover singletons.
    ///
    /// Each entry lists only the collection points of a trip; depot legs are
    /// implied.
    pub fn raw_routes(&self, instance: &ProblemInstance) -> Vec<Vec<usize>> {
        let mut used: HashSet<usize> = HashSet::new();
        let mut routes = Vec::new();

        for (i, j, _) in self.compute_savings(instance) {
            if used.contains(&i) || used.contains(&j) {
                continue;
            }
            used.insert(i);
            used.insert(j);
            routes.push(vec![i, j]);
        }

        for &p in &instance.collection_points {
            if used.insert(p) {
                routes.push(vec![p]);
            }
        }

        routes
    }

    /// Deal raw trips round-robin over the fleet and turn each vehicle's
    /// share into a full route with disposal and refuel stops.
    pub fn distribute(
        &self,
        instance: &ProblemInstance,
        raw: &[Vec<usize>],
    ) -> (Vec<Vec<usize>>, Vec<String>) {
        let count = instance.vehicle.count;
        let mut shares: Vec<Vec<usize>> = vec![Vec::new(); count];
        for (k, trip) in raw.iter().enumerate() {
            shares[k % count].extend(trip.iter().copied());
        }

        let mut warnings = Vec::new();
        let routes = shares
            .iter()
            .enumerate()
            .map(|(vehicle, points)| {
                let mut trip = TripBuilder::new(instance, vehicle);
                for &p in points {
                    trip.collect(p);
                }
                let (route, mut trip_warnings) = trip.close();
                warnings.append(&mut trip_warnings);
                route
            })
            .collect();

        (routes, warnings)
    }

    /// Capacity first-fit assignment of points to vehicles in savings order.
    ///
    /// Returns the collection points of each vehicle, without depot or
    /// service legs. A point that fits nowhere goes to the least-loaded
    /// vehicle.
    pub fn assign_to_fleet(&self, instance: &ProblemInstance) -> (Vec<Vec<usize>>, Vec<String>) {
        let count = instance.vehicle.count;
        let capacity = instance.vehicle.capacity_mass;
        let mut assigned: Vec<Vec<usize>> = vec![Vec::new(); count];
        let mut loads = vec![0.0; count];
        let mut warnings = Vec::new();

        for p in self.raw_routes(instance).into_iter().flatten() {
            if !instance.distances().is_reachable(instance.depot, p) {
                let msg = format!("point {} is unreachable from the depot, left unassigned", p);
                log::warn!("{}", msg);
                warnings.push(msg);
                continue;
            }

            let demand = instance.demand(p);
            let vehicle = match (0..count).find(|&v| loads[v] + demand <= capacity) {
                Some(v) => v,
                None => {
                    let v = (0..count)
                        .min_by_key(|&v| OrderedFloat(loads[v]))
                        .unwrap_or(0);
                    let msg = format!(
                        "point {} exceeds every vehicle's remaining capacity, forced onto vehicle {}",
                        p, v
                    );
                    log::warn!("{}", msg);
                    warnings.push(msg);
                    v
                }
            };

            loads[vehicle] += demand;
            assigned[vehicle].push(p);
        }

        (assigned, warnings)
    }
}

impl RoutingStrategy for SavingsHeuristic {
    fn solve(&self, instance: &ProblemInstance) -> anyhow::Result<Solution> {
        let start = std::time::Instant::now();

        let raw = self.raw_routes(instance);
        let (routes, warnings) = self.distribute(instance, &raw);

        let evaluator = Evaluator::new(instance);
        let mut solution =
            Solution::from_routes(&evaluator, routes, self.name()).with_warnings(warnings);
        solution.computation_time = start.elapsed().as_secs_f64();

        log::info!(
            "{}: {} trips over {} vehicles, cost {:.2}, coverage {:.1}%",
            self.name(),
            raw.len(),
            instance.vehicle.count,
            solution.cost,
            solution.coverage * 100.0
        );
        Ok(solution)
    }

    fn name(&self) -> &str {
        "Savings"
    }
}

/// Simulates one vehicle driving its share of points.
struct TripBuilder<'a> {
    instance: &'a ProblemInstance,
    vehicle: usize,
    route: Vec<usize>,
    position: usize,
    fuel: f64,
    load: f64,
    collected: bool,
    warnings: Vec<String>,
}

impl<'a> TripBuilder<'a> {
    fn new(instance: &'a ProblemInstance, vehicle: usize) -> Self {
        TripBuilder {
            instance,
            vehicle,
            route: vec![instance.depot],
            position: instance.depot,
            fuel: instance.vehicle.fuel_range,
            load: 0.0,
            collected: false,
            warnings: Vec::new(),
        }
    }

    fn warn(&mut self, msg: String) {
        log::warn!("vehicle {}: {}", self.vehicle, msg);
        self.warnings.push(format!("vehicle {}: {}", self.vehicle, msg));
    }

    fn collect(&mut self, point: usize) {
        let demand = self.instance.demand(point);
        if self.load > 0.0 && self.load + demand > self.instance.vehicle.capacity_mass {
            self.travel(self.instance.disposal_site);
        }
        if self.travel(point) {
            self.load += demand;
            self.collected = true;
        }
    }

    /// Drive to `to`, refuelling first when the hop exceeds remaining fuel.
    /// Returns false if the hop is unreachable and was skipped.
    fn travel(&mut self, to: usize) -> bool {
        let mut hop = self.instance.distance(self.position, to);
        if !hop.is_finite() {
            self.warn(format!("no path from {} to {}, hop skipped", self.position, to));
            return false;
        }

        if hop > self.fuel && !self.instance.is_fuel_station(self.position) {
            if let Some(station) = self.instance.nearest_fuel_station(self.position) {
                if station != to {
                    self.step(station);
                    hop = self.instance.distance(self.position, to);
                    if !hop.is_finite() {
                        self.warn(format!("no path from {} to {}, hop skipped", self.position, to));
                        return false;
                    }
                }
            }
        }

        self.step(to);
        true
    }

    fn step(&mut self, to: usize) {
        self.fuel -= self.instance.distance(self.position, to);
        self.position = to;
        self.route.push(to);
        match self.instance.role(to) {
            Some(NodeRole::FuelStation) => self.fuel = self.instance.vehicle.fuel_range,
            Some(NodeRole::DisposalSite) => self.load = 0.0,
            _ => {}
        }
    }

    /// Disposal, refuel and depot legs; returns the finished route.
    fn close(mut self) -> (Vec<usize>, Vec<String>) {
        let depot = self.instance.depot;
        let disposal = self.instance.disposal_site;

        if self.collected {
            if self.position != disposal {
                self.travel(disposal);
            }
            if let Some(station) = self.instance.nearest_fuel_station(self.position) {
                self.travel(station);
            }
        }

        if !self.travel(depot) {
            self.route.push(depot);
        }
        if self.route.len() == 1 {
            self.route.push(depot);
        }
        (self.route, self.warnings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::fixtures::*;
    use crate::instance::{DistanceMatrix, NodeClassification, VehicleSpec};

    #[test]
    fn test_savings_order_and_ties() {
        let instance = scenario_instance(scenario_vehicle());
        let savings = SavingsHeuristic::new().compute_savings(&instance);
        assert_eq!(savings.len(), 6);
        assert_eq!((savings[0].0, savings[0].1), (1, 2));
        assert_eq!((savings[1].0, savings[1].1), (3, 4));
        assert!(savings.windows(2).all(|w| w[0].2 >= w[1].2));
    }

    #[test]
    fn test_raw_routes_pair_points_once() {
        let instance = scenario_instance(scenario_vehicle());
        let raw = SavingsHeuristic::new().raw_routes(&instance);
        assert_eq!(raw, vec![vec![1, 2], vec![3, 4]]);
    }

    #[test]
    fn test_scenario_disposal_between_points() {
        let instance = scenario_instance(scenario_vehicle());
        let solution = SavingsHeuristic::new().solve(&instance).unwrap();

        assert_eq!(solution.routes.len(), 2);
        assert_eq!(solution.routes[0], vec![0, 1, 5, 2, 5, 6, 0]);
        assert_eq!(solution.penalty, 0.0);

        let mut seen = Vec::new();
        for route in &solution.routes {
            let mut since_disposal = 0;
            for &n in route {
                if instance.is_collection_point(n) {
                    seen.push(n);
                    since_disposal += 1;
                    assert!(since_disposal <= 2);
                } else if n == instance.disposal_site {
                    since_disposal = 0;
                }
            }
        }
        seen.sort();
        assert_eq!(seen, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_idempotent() {
        let instance = scenario_instance(scenario_vehicle());
        let heuristic = SavingsHeuristic::new();
        let a = heuristic.solve(&instance).unwrap();
        let b = heuristic.solve(&instance).unwrap();
        assert_eq!(a.routes, b.routes);
        assert_eq!(a.cost, b.cost);
    }

    #[test]
    fn test_unreachable_point_reported_missing() {
        let instance = isolated_point_instance();
        let solution = SavingsHeuristic::new().solve(&instance).unwrap();
        let evaluation = Evaluator::new(&instance).evaluate(&solution.routes);
        assert_eq!(evaluation.missing, vec![4]);
        assert!(!solution.warnings.is_empty());
        assert!(solution.routes.iter().all(|r| !r.contains(&4)));
    }

    #[test]
    fn test_refuel_inserted_when_hop_exceeds_fuel() {
        // depot 0, point 1 at x=35, station 2 at x=20, disposal 3 at x=30
        let coords = vec![(0.0, 0.0), (35.0, 0.0), (20.0, 0.0), (30.0, 0.0)];
        let classification = NodeClassification {
            depot: 0,
            disposal_site: 3,
            fuel_stations: vec![2],
            collection_points: vec![1],
            demands: [(1, 10.0)].into_iter().collect(),
        };
        let instance = ProblemInstance::new(
            "fuel",
            DistanceMatrix::euclidean(&coords),
            classification,
            VehicleSpec { capacity_mass: 100.0, fuel_range: 30.0, count: 1 },
        )
        .unwrap();

        let solution = SavingsHeuristic::new().solve(&instance).unwrap();
        assert_eq!(solution.routes[0], vec![0, 2, 1, 3, 2, 0]);
        assert_eq!(solution.penalty, 0.0);
    }

    #[test]
    fn test_assign_to_fleet_first_fit() {
        let instance = scenario_instance(scenario_vehicle());
        let (assigned, warnings) = SavingsHeuristic::new().assign_to_fleet(&instance);
        // 3 and 4 fit nowhere on a 500 capacity: least-loaded fallback
        assert_eq!(assigned, vec![vec![1, 3], vec![2, 4]]);
        assert_eq!(warnings.len(), 2);

        let roomy = scenario_instance(VehicleSpec { capacity_mass: 700.0, ..scenario_vehicle() });
        let (assigned, warnings) = SavingsHeuristic::new().assign_to_fleet(&roomy);
        assert_eq!(assigned, vec![vec![1, 2], vec![3, 4]]);
        assert!(warnings.is_empty());
    }
}
