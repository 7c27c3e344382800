//! Waste Route Solver - Command Line Interface
//!
//! Plans collection routes for a capacity- and fuel-limited fleet.

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use waste_route_solver::benchmark::{Benchmark, BenchmarkConfig};
use waste_route_solver::evaluator::Evaluator;
use waste_route_solver::heuristics::{RoutingStrategy, SavingsHeuristic, StrategyKind};
use waste_route_solver::instance::ProblemInstance;

use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "waste-route-solver")]
#[command(version = "1.0")]
#[command(about = "Fleet routing for waste collection with capacity, fuel and disposal constraints")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Solve an instance with one strategy
    Solve {
        /// Path to the JSON instance file
        #[arg(short, long)]
        instance: PathBuf,

        /// Strategy to use
        #[arg(short, long, value_enum, default_value = "swarm")]
        strategy: Strategy,

        /// Random seed
        #[arg(long, default_value = "42")]
        seed: u64,

        /// Round/iteration budget for tabu and swarm
        #[arg(long)]
        iterations: Option<usize>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Compare all strategies on an instance
    Compare {
        /// Path to the JSON instance file
        #[arg(short, long)]
        instance: PathBuf,

        /// Number of runs per stochastic strategy
        #[arg(short, long, default_value = "5")]
        runs: usize,

        /// Seed of the first run
        #[arg(long, default_value = "42")]
        seed: u64,

        /// Round/iteration budget for tabu and swarm
        #[arg(long)]
        iterations: Option<usize>,

        /// Stream per-run rows as CSV to stdout
        #[arg(long)]
        csv: bool,
    },

    /// Analyze an instance
    Analyze {
        /// Path to the JSON instance file
        #[arg(short, long)]
        instance: PathBuf,
    },
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
enum Strategy {
    /// Clarke-Wright savings construction
    Savings,
    /// Tabu search over inter-route swaps
    Tabu,
    /// Pheromone-guided swarm
    Swarm,
}

impl From<Strategy> for StrategyKind {
    fn from(strategy: Strategy) -> Self {
        match strategy {
            Strategy::Savings => StrategyKind::Savings,
            Strategy::Tabu => StrategyKind::Tabu,
            Strategy::Swarm => StrategyKind::Swarm,
        }
    }
}

fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Solve { instance, strategy, seed, iterations, json, verbose } => {
            solve_instance(&instance, strategy, seed, iterations, json, verbose)
        }
        Commands::Compare { instance, runs, seed, iterations, csv } => {
            compare_strategies(&instance, runs, seed, iterations, csv)
        }
        Commands::Analyze { instance } => analyze_instance(&instance),
    }
}

fn solve_instance(
    path: &Path,
    strategy: Strategy,
    seed: u64,
    iterations: Option<usize>,
    json: bool,
    verbose: bool,
) -> Result<()> {
    let instance = ProblemInstance::from_file(path)?;
    if verbose {
        eprintln!("{}", instance.statistics());
    }

    let solver = StrategyKind::from(strategy).build(seed, iterations);
    if verbose {
        eprintln!("Running {} (seed {})...", solver.name(), seed);
    }
    let solution = solver.solve(&instance)?;
    let report = solution.report(&Evaluator::new(&instance));

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", report);
        println!("  Generated: {}", report.timestamp);
    }
    Ok(())
}

fn compare_strategies(
    path: &Path,
    runs: usize,
    seed: u64,
    iterations: Option<usize>,
    csv: bool,
) -> Result<()> {
    let instance = ProblemInstance::from_file(path)?;
    eprintln!(
        "Comparing strategies on {} ({} points, {} vehicles)...",
        instance.name,
        instance.collection_points.len(),
        instance.vehicle.count
    );

    let mut benchmark = Benchmark::new(BenchmarkConfig {
        num_runs: runs,
        base_seed: seed,
        iterations,
        ..Default::default()
    });

    let progress = ProgressBar::new(benchmark.planned_runs() as u64);
    progress.set_style(ProgressStyle::with_template(
        "{spinner} [{elapsed_precise}] {bar:40} {pos}/{len} runs",
    )?);
    benchmark.run_with_progress(&instance, || progress.inc(1))?;
    progress.finish_and_clear();

    eprintln!("{}", benchmark.generate_report());
    eprintln!("Generated: {}", chrono::Utc::now().to_rfc3339());

    if csv {
        benchmark.export_csv(std::io::stdout().lock())?;
    }
    Ok(())
}

fn analyze_instance(path: &Path) -> Result<()> {
    let instance = ProblemInstance::from_file(path)?;
    println!("{}", instance.statistics());

    let demands: Vec<f64> = instance.required_points().map(|p| instance.demand(p)).collect();
    if !demands.is_empty() {
        let max = demands.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let min = demands.iter().copied().fold(f64::INFINITY, f64::min);
        println!("Demand per point: min {:.1}, max {:.1}", min, max);
        let trips = demands.iter().sum::<f64>() / instance.vehicle.capacity_mass;
        println!("Disposal cycles needed (lower bound): {:.0}", trips.ceil());
    }

    let stranded: Vec<usize> = instance
        .required_points()
        .filter(|&p| instance.nearest_fuel_station(p).is_none() && !instance.fuel_stations.is_empty())
        .collect();
    if !stranded.is_empty() {
        println!("Points with no reachable fuel station: {:?}", stranded);
    }

    let estimate = SavingsHeuristic::new().solve(&instance)?;
    println!("\nQuick Solution Estimate:");
    println!(
        "  Savings: cost {:.2}, distance {:.2}, coverage {:.1}% (feasible: {})",
        estimate.cost,
        estimate.distance,
        estimate.coverage * 100.0,
        estimate.feasible
    );
    Ok(())
}
