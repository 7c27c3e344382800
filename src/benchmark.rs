//! Side-by-side comparison of routing strategies.
//!
//! Runs each strategy over several seeds, collects one row per run and
//! aggregates them per strategy. Independent runs share no mutable state,
//! so they are spread over the rayon pool.

use crate::heuristics::StrategyKind;
use crate::instance::ProblemInstance;
use crate::solution::Solution;

use anyhow::Result;
use ordered_float::OrderedFloat;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::collections::BTreeMap;
use std::io::Write;

/// Result of running a single strategy once on an instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlgorithmResult {
    pub algorithm: String,
    pub instance: String,
    pub seed: u64,
    /// Distance plus penalty
    pub cost: f64,
    pub distance: f64,
    pub penalty: f64,
    pub coverage: f64,
    pub feasible: bool,
    /// Computation time in seconds
    pub time: f64,
    pub iterations: Option<usize>,
}

/// Aggregated statistics for a strategy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlgorithmStatistics {
    pub algorithm: String,
    pub runs: usize,
    pub num_feasible: usize,
    pub avg_cost: f64,
    pub best_cost: f64,
    pub worst_cost: f64,
    /// Population standard deviation of cost
    pub std_cost: f64,
    pub avg_coverage: f64,
    pub avg_time: f64,
    pub total_time: f64,
}

/// Benchmark configuration
#[derive(Debug, Clone)]
pub struct BenchmarkConfig {
    /// Runs per stochastic strategy; deterministic ones run once
    pub num_runs: usize,
    /// Seed of the first run, incremented per run
    pub base_seed: u64,
    /// Overrides the round/iteration budget of the stochastic strategies
    pub iterations: Option<usize>,
    pub strategies: Vec<StrategyKind>,
    /// Run in parallel
    pub parallel: bool,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        BenchmarkConfig {
            num_runs: 5,
            base_seed: 42,
            iterations: None,
            strategies: StrategyKind::ALL.to_vec(),
            parallel: true,
        }
    }
}

/// Benchmarking engine
pub struct Benchmark {
    config: BenchmarkConfig,
    results: Vec<AlgorithmResult>,
}

impl Benchmark {
    pub fn new(config: BenchmarkConfig) -> Self {
        Benchmark {
            config,
            results: Vec::new(),
        }
    }

    /// Number of runs [`Benchmark::run`] will perform.
    pub fn planned_runs(&self) -> usize {
        self.jobs().len()
    }

    fn jobs(&self) -> Vec<(StrategyKind, u64)> {
        let mut jobs = Vec::new();
        for &kind in &self.config.strategies {
            let runs = if kind.is_stochastic() { self.config.num_runs } else { 1 };
            for k in 0..runs {
                jobs.push((kind, self.config.base_seed + k as u64));
            }
        }
        jobs
    }

    pub fn run(&mut self, instance: &ProblemInstance) -> Result<()> {
        self.run_with_progress(instance, || {})
    }

    /// Run every configured strategy/seed pair, calling `on_done` after each run.
    pub fn run_with_progress<F>(&mut self, instance: &ProblemInstance, on_done: F) -> Result<()>
    where
        F: Fn() + Sync,
    {
        log::info!("Running benchmark on instance: {}", instance.name);
        let iterations = self.config.iterations;

        let solve = |&(kind, seed): &(StrategyKind, u64)| -> Result<(u64, Solution)> {
            let solution = kind.build(seed, iterations).solve(instance)?;
            on_done();
            Ok((seed, solution))
        };

        let jobs = self.jobs();
        let solutions: Vec<(u64, Solution)> = if self.config.parallel {
            jobs.par_iter().map(solve).collect::<Result<_>>()?
        } else {
            jobs.iter().map(solve).collect::<Result<_>>()?
        };

        for (seed, solution) in &solutions {
            self.record_result(instance, *seed, solution);
        }
        Ok(())
    }

    fn record_result(&mut self, instance: &ProblemInstance, seed: u64, solution: &Solution) {
        self.results.push(AlgorithmResult {
            algorithm: solution.algorithm.clone(),
            instance: instance.name.clone(),
            seed,
            cost: solution.cost,
            distance: solution.distance,
            penalty: solution.penalty,
            coverage: solution.coverage,
            feasible: solution.feasible,
            time: solution.computation_time,
            iterations: solution.iterations,
        });
    }

    /// Compute statistics for each strategy, cheapest average first
    pub fn compute_statistics(&self) -> Vec<AlgorithmStatistics> {
        let mut grouped: BTreeMap<&str, Vec<&AlgorithmResult>> = BTreeMap::new();
        for result in &self.results {
            grouped.entry(result.algorithm.as_str()).or_default().push(result);
        }

        let mut statistics: Vec<AlgorithmStatistics> = grouped
            .into_iter()
            .map(|(algorithm, results)| {
                let costs: Vec<f64> = results.iter().map(|r| r.cost).collect();
                let times: Vec<f64> = results.iter().map(|r| r.time).collect();
                let coverages: Vec<f64> = results.iter().map(|r| r.coverage).collect();

                AlgorithmStatistics {
                    algorithm: algorithm.to_string(),
                    runs: results.len(),
                    num_feasible: results.iter().filter(|r| r.feasible).count(),
                    avg_cost: costs.iter().mean(),
                    best_cost: costs.iter().copied().fold(f64::INFINITY, f64::min),
                    worst_cost: costs.iter().copied().fold(f64::NEG_INFINITY, f64::max),
                    std_cost: costs.iter().population_std_dev(),
                    avg_coverage: coverages.iter().mean(),
                    avg_time: times.iter().mean(),
                    total_time: times.iter().sum(),
                }
            })
            .collect();

        statistics.sort_by_key(|s| OrderedFloat(s.avg_cost));
        statistics
    }

    /// Write one CSV row per run
    pub fn export_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut writer = csv::Writer::from_writer(writer);
        for result in &self.results {
            writer.serialize(result)?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Generate summary report
    pub fn generate_report(&self) -> String {
        let mut report = String::new();

        report.push_str("========================================\n");
        report.push_str("     Collection Routing Comparison\n");
        report.push_str("========================================\n\n");

        report.push_str(&format!(
            "{:<12} {:>9} {:>14} {:>14} {:>12} {:>10} {:>10}\n",
            "Strategy", "Feasible", "Avg Cost", "Best Cost", "Std Cost", "Coverage", "Avg Time"
        ));
        report.push_str(&"-".repeat(87));
        report.push('\n');

        for stat in self.compute_statistics() {
            report.push_str(&format!(
                "{:<12} {:>9} {:>14.2} {:>14.2} {:>12.2} {:>9.1}% {:>10.4}\n",
                stat.algorithm,
                format!("{}/{}", stat.num_feasible, stat.runs),
                stat.avg_cost,
                stat.best_cost,
                stat.std_cost,
                stat.avg_coverage * 100.0,
                stat.avg_time
            ));
        }

        report.push_str(&"-".repeat(87));
        report.push('\n');

        if let Some(best) = self.results.iter().min_by_key(|r| OrderedFloat(r.cost)) {
            report.push_str(&format!(
                "\nBest run: {} (seed {}) with cost {:.2}\n",
                best.algorithm, best.seed, best.cost
            ));
        }

        report
    }

    pub fn results(&self) -> &[AlgorithmResult] {
        &self.results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::fixtures::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn small_benchmark(parallel: bool) -> Benchmark {
        Benchmark::new(BenchmarkConfig {
            num_runs: 2,
            iterations: Some(10),
            parallel,
            ..Default::default()
        })
    }

    #[test]
    fn test_benchmark_config() {
        let config = BenchmarkConfig::default();
        assert_eq!(config.num_runs, 5);
        assert_eq!(config.strategies.len(), 3);
    }

    #[test]
    fn test_runs_and_statistics() {
        let instance = scenario_instance(scenario_vehicle());
        let mut benchmark = small_benchmark(true);
        assert_eq!(benchmark.planned_runs(), 5);

        let done = AtomicUsize::new(0);
        benchmark
            .run_with_progress(&instance, || {
                done.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        assert_eq!(done.load(Ordering::SeqCst), 5);
        assert_eq!(benchmark.results().len(), 5);

        let stats = benchmark.compute_statistics();
        assert_eq!(stats.len(), 3);
        assert!(stats.windows(2).all(|w| w[0].avg_cost <= w[1].avg_cost));
        let savings = stats.iter().find(|s| s.algorithm == "Savings").unwrap();
        assert_eq!(savings.runs, 1);
        assert_eq!(savings.std_cost, 0.0);
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let instance = scenario_instance(scenario_vehicle());
        let mut parallel = small_benchmark(true);
        let mut sequential = small_benchmark(false);
        parallel.run(&instance).unwrap();
        sequential.run(&instance).unwrap();

        let costs = |b: &Benchmark| b.results().iter().map(|r| (r.algorithm.clone(), r.seed, r.cost)).collect::<Vec<_>>();
        assert_eq!(costs(&parallel), costs(&sequential));
    }

    #[test]
    fn test_csv_and_report() {
        let instance = scenario_instance(scenario_vehicle());
        let mut benchmark = small_benchmark(false);
        benchmark.run(&instance).unwrap();

        let mut buffer = Vec::new();
        benchmark.export_csv(&mut buffer).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        assert_eq!(text.lines().count(), 6);
        assert!(text.starts_with("algorithm,instance,seed,cost"));

        let report = benchmark.generate_report();
        assert!(report.contains("Savings"));
        assert!(report.contains("TabuSearch"));
        assert!(report.contains("AntColony"));
    }
}
