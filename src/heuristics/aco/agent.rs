use crate::instance::{NodeRole, ProblemInstance};
use std::collections::HashSet;
use std::fmt;

/// Where an agent currently is in its trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentState {
    AtDepot,
    AtCollectionPoint,
    AtFuelStation,
    AtDisposalSite,
    /// En route, passing a node with no role
    Traveling,
    /// Closed and back at the depot
    Done,
}

/// Reasons a single agent move is refused. The agent is left untouched.
#[derive(Debug, Clone, PartialEq)]
pub enum MoveError {
    Unreachable { from: usize, to: usize },
    InsufficientFuel { needed: f64, available: f64 },
    CapacityExceeded { load: f64, demand: f64, capacity: f64 },
}

impl fmt::Display for MoveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MoveError::Unreachable { from, to } => write!(f, "no path from {} to {}", from, to),
            MoveError::InsufficientFuel { needed, available } => {
                write!(f, "hop needs {:.2} fuel, {:.2} left", needed, available)
            }
            MoveError::CapacityExceeded { load, demand, capacity } => write!(
                f,
                "load {:.1} plus demand {:.1} exceeds capacity {:.1}",
                load, demand, capacity
            ),
        }
    }
}

impl std::error::Error for MoveError {}

/// Simulated vehicle walking the network.
#[derive(Debug, Clone)]
pub struct Agent {
    pub id: usize,
    pub position: usize,
    /// Remaining range
    pub fuel: f64,
    pub load: f64,
    /// Collection points picked up by this agent
    pub visited: HashSet<usize>,
    pub route: Vec<usize>,
    pub state: AgentState,
    /// Distance driven so far
    pub distance: f64,
}

impl Agent {
    pub fn new(id: usize, instance: &ProblemInstance) -> Self {
        Agent {
            id,
            position: instance.depot,
            fuel: instance.vehicle.fuel_range,
            load: 0.0,
            visited: HashSet::new(),
            route: vec![instance.depot],
            state: AgentState::AtDepot,
            distance: 0.0,
        }
    }

    /// Back to the depot with full fuel and an empty truck.
    pub fn reset(&mut self, instance: &ProblemInstance) {
        *self = Agent::new(self.id, instance);
    }

    /// Drive to `dest` and apply its role on arrival.
    ///
    /// All checks run before any field is touched, so an error leaves the
    /// agent exactly as it was.
    pub fn move_to(&mut self, instance: &ProblemInstance, dest: usize) -> Result<(), MoveError> {
        let hop = instance.distance(self.position, dest);
        if !hop.is_finite() {
            return Err(MoveError::Unreachable { from: self.position, to: dest });
        }
        if hop > self.fuel {
            return Err(MoveError::InsufficientFuel { needed: hop, available: self.fuel });
        }

        let role = instance.role(dest);
        let pickup = role == Some(NodeRole::CollectionPoint) && !self.visited.contains(&dest);
        if pickup {
            let demand = instance.demand(dest);
            let capacity = instance.vehicle.capacity_mass;
            if self.load + demand > capacity {
                return Err(MoveError::CapacityExceeded { load: self.load, demand, capacity });
            }
        }

        self.fuel -= hop;
        self.distance += hop;
        self.position = dest;
        self.route.push(dest);

        self.state = match role {
            Some(NodeRole::CollectionPoint) => {
                if pickup {
                    self.load += instance.demand(dest);
                    self.visited.insert(dest);
                }
                AgentState::AtCollectionPoint
            }
            Some(NodeRole::FuelStation) => {
                self.fuel = instance.vehicle.fuel_range;
                AgentState::AtFuelStation
            }
            Some(NodeRole::DisposalSite) => {
                self.load = 0.0;
                AgentState::AtDisposalSite
            }
            Some(NodeRole::Depot) => AgentState::AtDepot,
            None => AgentState::Traveling,
        };
        Ok(())
    }

    pub fn collected(&self) -> usize {
        self.visited.len()
    }

    pub fn is_idle(&self) -> bool {
        self.load == 0.0 && self.visited.is_empty()
    }
}
