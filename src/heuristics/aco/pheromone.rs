use crate::instance::ProblemInstance;
use std::collections::HashMap;

/// Weights never decay below this, so every entry stays strictly positive.
const MIN_WEIGHT: f64 = 1e-12;

/// Sparse pheromone weights on directed edges.
///
/// Entries are created on first use with the initial weight.
#[derive(Debug, Clone)]
pub struct PheromoneTable {
    weights: HashMap<(usize, usize), f64>,
    initial: f64,
}

impl PheromoneTable {
    pub fn new(initial: f64) -> Self {
        PheromoneTable {
            weights: HashMap::new(),
            initial,
        }
    }

    pub fn get(&self, from: usize, to: usize) -> f64 {
        self.weights.get(&(from, to)).copied().unwrap_or(self.initial)
    }

    /// Evaporate then reinforce every edge occurrence of `routes`.
    ///
    /// Edges ending at a collection point receive `deposit`; edges not in
    /// any route keep their weight.
    pub fn update<'r, I>(&mut self, instance: &ProblemInstance, routes: I, evaporation: f64, deposit: f64)
    where
        I: IntoIterator<Item = &'r [usize]>,
    {
        for route in routes {
            for edge in route.windows(2) {
                let (from, to) = (edge[0], edge[1]);
                let weight = self.weights.entry((from, to)).or_insert(self.initial);
                *weight *= 1.0 - evaporation;
                if instance.is_collection_point(to) {
                    *weight += deposit;
                }
                *weight = weight.max(MIN_WEIGHT);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&(usize, usize), &f64)> {
        self.weights.iter()
    }
}

impl Default for PheromoneTable {
    fn default() -> Self {
        Self::new(1.0)
    }
}
