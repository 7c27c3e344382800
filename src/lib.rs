//! Waste Route Solver Library
//!
//! Plans collection routes for a fleet of vehicles limited by load capacity
//! and fuel range, which must periodically unload at a disposal site and
//! refuel at fuel stations.
//!
//! # Features
//!
//! - Shared problem model and penalty-based feasibility evaluator
//! - Savings construction (Clarke-Wright) with disposal and refuel insertion
//! - Tabu search over inter-route point swaps
//! - Pheromone-guided swarm with zoned agents
//! - Multi-seed comparison with CSV export
//!
//! # Example
//!
//! ```no_run
//! use waste_route_solver::instance::ProblemInstance;
//! use waste_route_solver::heuristics::{RoutingStrategy, TabuConfig, TabuSearch};
//!
//! let instance = ProblemInstance::from_file("sector.json").unwrap();
//!
//! let tabu = TabuSearch::new(TabuConfig { max_iterations: 50, ..Default::default() });
//! let solution = tabu.solve(&instance).unwrap();
//!
//! println!("Solution cost: {:.2} (coverage {:.1}%)", solution.cost, solution.coverage * 100.0);
//! ```

pub mod benchmark;
pub mod evaluator;
pub mod heuristics;
pub mod instance;
pub mod solution;

pub use evaluator::Evaluator;
pub use instance::ProblemInstance;
pub use solution::Solution;
