//! Problem model for fleet waste-collection routing.
//!
//! This module holds the read-only data every strategy works from: the
//! all-pairs distance matrix, the role of each node (depot, disposal site,
//! fuel station, collection point), per-point demand and the vehicle limits.
//! It also loads instances from JSON files.

use anyhow::{anyhow, bail, Context, Result};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Role of a node in the collection network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeRole {
    Depot,
    DisposalSite,
    FuelStation,
    CollectionPoint,
}

impl std::fmt::Display for NodeRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            NodeRole::Depot => "depot",
            NodeRole::DisposalSite => "disposal",
            NodeRole::FuelStation => "fuel",
            NodeRole::CollectionPoint => "point",
        };
        write!(f, "{}", label)
    }
}

/// Square matrix of shortest-path distances.
///
/// `f64::INFINITY` marks an unreachable pair. The matrix need not be symmetric.
#[derive(Debug, Clone, PartialEq)]
pub struct DistanceMatrix {
    rows: Vec<Vec<f64>>,
}

impl DistanceMatrix {
    /// Build a matrix from explicit rows, checking shape and values.
    pub fn from_rows(rows: Vec<Vec<f64>>) -> Result<Self> {
        let n = rows.len();
        for (i, row) in rows.iter().enumerate() {
            if row.len() != n {
                bail!("distance matrix row {} has {} entries, expected {}", i, row.len(), n);
            }
            for (j, &d) in row.iter().enumerate() {
                if d.is_nan() || d < 0.0 {
                    bail!("distance ({}, {}) must be non-negative, got {}", i, j, d);
                }
                if i == j && d != 0.0 {
                    bail!("distance ({}, {}) on the diagonal must be zero, got {}", i, j, d);
                }
            }
        }
        Ok(DistanceMatrix { rows })
    }

    /// Euclidean distances between planar coordinates.
    pub fn euclidean(coordinates: &[(f64, f64)]) -> Self {
        let rows = coordinates
            .iter()
            .map(|&(xi, yi)| {
                coordinates
                    .iter()
                    .map(|&(xj, yj)| ((xi - xj).powi(2) + (yi - yj).powi(2)).sqrt())
                    .collect()
            })
            .collect();
        DistanceMatrix { rows }
    }

    /// Distance from `i` to `j`, `INFINITY` when either index is outside the matrix.
    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.rows
            .get(i)
            .and_then(|row| row.get(j))
            .copied()
            .unwrap_or(f64::INFINITY)
    }

    pub fn is_reachable(&self, i: usize, j: usize) -> bool {
        self.get(i, j).is_finite()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn into_rows(self) -> Vec<Vec<f64>> {
        self.rows
    }
}

/// Vehicle configuration shared by the whole fleet.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VehicleSpec {
    /// Hard load ceiling per disposal cycle
    pub capacity_mass: f64,
    /// Hard distance ceiling per refuel cycle
    pub fuel_range: f64,
    /// Number of vehicles, i.e. routes in a solution
    pub count: usize,
}

impl Default for VehicleSpec {
    fn default() -> Self {
        VehicleSpec {
            capacity_mass: 5000.0,
            fuel_range: 5000.0,
            count: 3,
        }
    }
}

impl VehicleSpec {
    pub fn validate(&self) -> Result<()> {
        if !(self.capacity_mass > 0.0) {
            bail!("vehicle capacity must be positive, got {}", self.capacity_mass);
        }
        if !(self.fuel_range > 0.0) {
            bail!("vehicle fuel range must be positive, got {}", self.fuel_range);
        }
        if self.count == 0 {
            bail!("fleet must contain at least one vehicle");
        }
        Ok(())
    }
}

/// Node roles as produced by the upstream classifier.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeClassification {
    pub depot: usize,
    pub disposal_site: usize,
    pub fuel_stations: Vec<usize>,
    pub collection_points: Vec<usize>,
    /// Demand mass per collection point
    pub demands: BTreeMap<usize, f64>,
}

/// A complete, validated routing problem.
#[derive(Debug, Clone)]
pub struct ProblemInstance {
    /// Name of the instance (sector, file stem, ...)
    pub name: String,
    pub depot: usize,
    pub disposal_site: usize,
    pub fuel_stations: Vec<usize>,
    /// Collection points in classification order
    pub collection_points: Vec<usize>,
    pub vehicle: VehicleSpec,
    distances: DistanceMatrix,
    roles: Vec<Option<NodeRole>>,
    demand: Vec<f64>,
}

impl ProblemInstance {
    pub fn new(
        name: &str,
        distances: DistanceMatrix,
        classification: NodeClassification,
        vehicle: VehicleSpec,
    ) -> Result<Self> {
        vehicle.validate()?;

        let n = distances.len();
        let mut roles: Vec<Option<NodeRole>> = vec![None; n];
        let mut demand = vec![0.0; n];

        let mut assign = |node: usize, role: NodeRole| -> Result<()> {
            let slot = roles
                .get_mut(node)
                .ok_or_else(|| anyhow!("{} node {} is outside the {}x{} matrix", role, node, n, n))?;
            if let Some(existing) = *slot {
                bail!("node {} classified both as {} and {}", node, existing, role);
            }
            *slot = Some(role);
            Ok(())
        };

        assign(classification.depot, NodeRole::Depot)?;
        assign(classification.disposal_site, NodeRole::DisposalSite)?;
        for &station in &classification.fuel_stations {
            assign(station, NodeRole::FuelStation)?;
        }
        for &point in &classification.collection_points {
            assign(point, NodeRole::CollectionPoint)?;
        }

        for &point in &classification.collection_points {
            let mass = *classification
                .demands
                .get(&point)
                .ok_or_else(|| anyhow!("collection point {} has no demand", point))?;
            if !mass.is_finite() || mass < 0.0 {
                bail!("demand of collection point {} must be non-negative, got {}", point, mass);
            }
            demand[point] = mass;
        }
        for node in classification.demands.keys() {
            if roles.get(*node).copied().flatten() != Some(NodeRole::CollectionPoint) {
                bail!("demand given for node {} which is not a collection point", node);
            }
        }

        Ok(ProblemInstance {
            name: name.to_string(),
            depot: classification.depot,
            disposal_site: classification.disposal_site,
            fuel_stations: classification.fuel_stations,
            collection_points: classification.collection_points,
            vehicle,
            distances,
            roles,
            demand,
        })
    }

    /// Load an instance from a JSON file; the instance name defaults to the file stem.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read instance file {}", path.display()))?;
        let mut file: InstanceFile = serde_json::from_str(&text)
            .with_context(|| format!("failed to parse instance file {}", path.display()))?;
        if file.name.is_empty() {
            file.name = path
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default();
        }
        file.into_instance()
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let file: InstanceFile = serde_json::from_str(text).context("failed to parse instance JSON")?;
        file.into_instance()
    }

    pub fn distance(&self, i: usize, j: usize) -> f64 {
        self.distances.get(i, j)
    }

    pub fn distances(&self) -> &DistanceMatrix {
        &self.distances
    }

    pub fn dimension(&self) -> usize {
        self.distances.len()
    }

    /// Role of a node, `None` for plain transit nodes.
    pub fn role(&self, node: usize) -> Option<NodeRole> {
        self.roles.get(node).copied().flatten()
    }

    pub fn is_collection_point(&self, node: usize) -> bool {
        self.role(node) == Some(NodeRole::CollectionPoint)
    }

    pub fn is_fuel_station(&self, node: usize) -> bool {
        self.role(node) == Some(NodeRole::FuelStation)
    }

    /// Demand mass of a node (zero for anything but a collection point).
    pub fn demand(&self, node: usize) -> f64 {
        self.demand.get(node).copied().unwrap_or(0.0)
    }

    /// Largest single demand among collection points.
    pub fn max_demand(&self) -> f64 {
        self.collection_points
            .iter()
            .map(|&p| self.demand[p])
            .fold(0.0, f64::max)
    }

    /// Collection points that must be visited (non-zero demand).
    pub fn required_points(&self) -> impl Iterator<Item = usize> + '_ {
        self.collection_points
            .iter()
            .copied()
            .filter(move |&p| self.demand[p] > 0.0)
    }

    pub fn num_required_points(&self) -> usize {
        self.required_points().count()
    }

    /// Fuel station closest to `from` by direct distance, ignoring unreachable ones.
    pub fn nearest_fuel_station(&self, from: usize) -> Option<usize> {
        self.fuel_stations
            .iter()
            .copied()
            .filter(|&s| self.distances.is_reachable(from, s))
            .min_by_key(|&s| OrderedFloat(self.distance(from, s)))
    }

    /// Distance to the nearest fuel station, `INFINITY` if none is reachable.
    pub fn distance_to_nearest_fuel(&self, from: usize) -> f64 {
        self.nearest_fuel_station(from)
            .map(|s| self.distance(from, s))
            .unwrap_or(f64::INFINITY)
    }

    /// Total length of a node sequence; unreachable hops make it infinite.
    pub fn path_length(&self, path: &[usize]) -> f64 {
        path.windows(2).map(|w| self.distance(w[0], w[1])).sum()
    }

    pub fn statistics(&self) -> InstanceStatistics {
        let total_demand: f64 = self.collection_points.iter().map(|&p| self.demand[p]).sum();
        let unreachable_points = self
            .collection_points
            .iter()
            .filter(|&&p| !self.distances.is_reachable(self.depot, p))
            .count();

        let mut sum = 0.0;
        let mut count = 0usize;
        let mut max_distance: f64 = 0.0;
        for i in 0..self.dimension() {
            for j in 0..self.dimension() {
                let d = self.distance(i, j);
                if i != j && d.is_finite() {
                    sum += d;
                    count += 1;
                    max_distance = max_distance.max(d);
                }
            }
        }
        let avg_distance = if count > 0 { sum / count as f64 } else { 0.0 };

        InstanceStatistics {
            name: self.name.clone(),
            dimension: self.dimension(),
            num_collection_points: self.collection_points.len(),
            num_fuel_stations: self.fuel_stations.len(),
            unreachable_points,
            total_demand,
            fleet_capacity: self.vehicle.capacity_mass * self.vehicle.count as f64,
            vehicle: self.vehicle,
            avg_distance,
            max_distance,
        }
    }
}

/// On-disk instance format.
///
/// Exactly one of `distances` (rows, `null` for unreachable) or `coordinates`
/// must be present.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceFile {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub vehicle: VehicleSpec,
    pub classification: NodeClassification,
    #[serde(default)]
    pub distances: Option<Vec<Vec<Option<f64>>>>,
    #[serde(default)]
    pub coordinates: Option<Vec<(f64, f64)>>,
}

impl InstanceFile {
    pub fn into_instance(self) -> Result<ProblemInstance> {
        let matrix = match (self.distances, self.coordinates) {
            (Some(rows), None) => DistanceMatrix::from_rows(
                rows.into_iter()
                    .map(|row| row.into_iter().map(|d| d.unwrap_or(f64::INFINITY)).collect())
                    .collect(),
            )?,
            (None, Some(coords)) => DistanceMatrix::euclidean(&coords),
            (Some(_), Some(_)) => bail!("instance must give either distances or coordinates, not both"),
            (None, None) => bail!("instance must give distances or coordinates"),
        };
        ProblemInstance::new(&self.name, matrix, self.classification, self.vehicle)
    }
}

/// Statistics about a routing instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceStatistics {
    pub name: String,
    pub dimension: usize,
    pub num_collection_points: usize,
    pub num_fuel_stations: usize,
    pub unreachable_points: usize,
    pub total_demand: f64,
    pub fleet_capacity: f64,
    pub vehicle: VehicleSpec,
    pub avg_distance: f64,
    pub max_distance: f64,
}

impl std::fmt::Display for InstanceStatistics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Instance: {}", self.name)?;
        writeln!(f, "  Nodes: {}", self.dimension)?;
        writeln!(f, "  Collection points: {} ({} unreachable from depot)",
            self.num_collection_points, self.unreachable_points)?;
        writeln!(f, "  Fuel stations: {}", self.num_fuel_stations)?;
        writeln!(f, "  Total demand: {:.1}", self.total_demand)?;
        writeln!(f, "  Fleet: {} x {:.1} capacity, {:.1} range",
            self.vehicle.count, self.vehicle.capacity_mass, self.vehicle.fuel_range)?;
        writeln!(f, "  Fleet capacity per cycle: {:.1}", self.fleet_capacity)?;
        writeln!(f, "  Avg distance: {:.2}", self.avg_distance)?;
        writeln!(f, "  Max distance: {:.2}", self.max_distance)
    }
}
