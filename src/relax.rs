//! Force-directed relaxation
//!
//! A slow, local drift applied to the demo graph only. Each step sums three
//! forces per node and applies them all at once from the positions at the
//! start of the step:
//!
//! 1. attraction toward the weight²-weighted centroid of synapse neighbours
//! 2. anchoring toward the node's region centroid
//! 3. short-range repulsion from nearby nodes
//!
//! Weights and `active` flags are never touched.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::model::{GraphSnapshot, Region, Vec3};

/// Drift below this is not worth logging
const DRIFT_LOG_THRESHOLD: f32 = 0.01;

/// Relaxation force constants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelaxationConfig {
    pub attraction: f32,
    pub anchoring: f32,
    pub repulsion: f32,
    /// Nodes closer than this repel each other
    pub repulsion_radius: f32,
    /// Nodes closer than this are treated as coincident and ignored
    pub min_distance: f32,
}

impl Default for RelaxationConfig {
    fn default() -> Self {
        Self {
            attraction: 0.008,
            anchoring: 0.025,
            repulsion: 0.003,
            repulsion_radius: 0.25,
            min_distance: 0.001,
        }
    }
}

type Cell = (i32, i32, i32);

/// Uniform grid over node positions with one repulsion radius per cell
struct SpatialGrid {
    cell: f32,
    cells: HashMap<Cell, Vec<usize>>,
}

impl SpatialGrid {
    fn build(positions: &[Vec3], cell: f32) -> Self {
        let mut cells: HashMap<Cell, Vec<usize>> = HashMap::new();
        for (i, &p) in positions.iter().enumerate() {
            cells.entry(Self::key(p, cell)).or_default().push(i);
        }
        Self { cell, cells }
    }

    fn key(p: Vec3, cell: f32) -> Cell {
        (
            (p.x / cell).floor() as i32,
            (p.y / cell).floor() as i32,
            (p.z / cell).floor() as i32,
        )
    }

    /// Indices in the 27 cells around `p`
    fn around(&self, p: Vec3) -> impl Iterator<Item = usize> + '_ {
        let (cx, cy, cz) = Self::key(p, self.cell);
        (-1..=1)
            .flat_map(move |dx| (-1..=1).flat_map(move |dy| (-1..=1).map(move |dz| (cx + dx, cy + dy, cz + dz))))
            .filter_map(|key| self.cells.get(&key))
            .flatten()
            .copied()
    }
}

pub struct Relaxation {
    config: RelaxationConfig,
    bounding_radius: f32,
}

impl Relaxation {
    pub fn new(config: RelaxationConfig, bounding_radius: f32) -> Self {
        Self {
            config,
            bounding_radius,
        }
    }

    /// Run one step in place. Returns the total drift
    /// (sum of |dx| + |dy| + |dz| over all nodes).
    pub fn step(&self, graph: &mut GraphSnapshot, regions: &[Region]) -> f32 {
        let n = graph.neurons.len();
        if n == 0 {
            return 0.0;
        }

        let positions: Vec<Vec3> = graph.neurons.iter().map(|node| node.position).collect();
        let index = graph.index();
        let centers: HashMap<&str, Vec3> = regions.iter().map(|r| (r.id.as_str(), r.center)).collect();

        // Weighted neighbour sums: (Σ w²·p, Σ w²)
        let mut neighbours = vec![(Vec3::ZERO, 0.0f32); n];
        for synapse in &graph.synapses {
            let (Some(&s), Some(&t)) = (
                index.get(synapse.source.as_str()),
                index.get(synapse.target.as_str()),
            ) else {
                continue;
            };
            let w2 = synapse.weight * synapse.weight;
            neighbours[s].0 += positions[t] * w2;
            neighbours[s].1 += w2;
            neighbours[t].0 += positions[s] * w2;
            neighbours[t].1 += w2;
        }

        let grid = SpatialGrid::build(&positions, self.config.repulsion_radius);
        let mut deltas = vec![Vec3::ZERO; n];

        for (i, node) in graph.neurons.iter().enumerate() {
            let p = positions[i];
            let mut delta = Vec3::ZERO;

            let (sum, total) = neighbours[i];
            if total > 0.0 {
                let centroid = sum * (1.0 / total);
                delta += (centroid - p) * self.config.attraction;
            }

            if let Some(&center) = centers.get(node.region.as_str()) {
                delta += (center - p) * self.config.anchoring;
            }

            for j in grid.around(p) {
                if j == i {
                    continue;
                }
                let away = p - positions[j];
                let d = away.length();
                if d > self.config.min_distance && d < self.config.repulsion_radius {
                    delta += away * (self.config.repulsion / (d * d) / d);
                }
            }

            deltas[i] = delta;
        }

        let mut drift = 0.0;
        for (node, delta) in graph.neurons.iter_mut().zip(deltas) {
            let before = node.position;
            node.position = (before + delta).clamp_to_radius(self.bounding_radius);
            drift += (node.position - before).manhattan();
        }

        if drift > DRIFT_LOG_THRESHOLD {
            debug!(drift, nodes = n, "relaxation step");
        }
        drift
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Neuron, Synapse};

    fn region(id: &str, center: Vec3) -> Region {
        Region {
            id: id.to_string(),
            name: id.to_string(),
            center,
            radius: 0.5,
            description: String::new(),
        }
    }

    #[test]
    fn empty_graph_does_not_move() {
        let relax = Relaxation::new(RelaxationConfig::default(), 2.7);
        assert_eq!(relax.step(&mut GraphSnapshot::default(), &[]), 0.0);
    }

    #[test]
    fn nodes_drift_toward_their_region() {
        let relax = Relaxation::new(RelaxationConfig::default(), 2.7);
        let mut g = GraphSnapshot::new(vec![Neuron::new("a", Vec3::new(1.0, 0.0, 0.0), "r")], vec![]);
        let drift = relax.step(&mut g, &[region("r", Vec3::ZERO)]);

        assert!((g.neurons[0].position.x - 0.975).abs() < 1e-6);
        assert!((drift - 0.025).abs() < 1e-6);
    }

    #[test]
    fn close_nodes_push_apart_symmetrically() {
        let relax = Relaxation::new(RelaxationConfig::default(), 2.7);
        let mut g = GraphSnapshot::new(
            vec![
                Neuron::new("a", Vec3::new(-0.05, 0.0, 0.0), "none"),
                Neuron::new("b", Vec3::new(0.05, 0.0, 0.0), "none"),
            ],
            vec![],
        );
        relax.step(&mut g, &[]);
        let (a, b) = (g.neurons[0].position, g.neurons[1].position);
        assert!(a.x < -0.05 && b.x > 0.05);
        assert!((a.x + b.x).abs() < 1e-6);
    }

    #[test]
    fn weights_and_flags_are_untouched_and_bound_holds() {
        let relax = Relaxation::new(RelaxationConfig::default(), 2.7);
        let mut g = GraphSnapshot::new(
            vec![
                Neuron::new("a", Vec3::new(2.69, 0.0, 0.0), "far"),
                Neuron::new("b", Vec3::new(2.6999, 0.0005, 0.0), "far"),
            ],
            vec![Synapse::new("a", "b", -0.7).with_active(true), Synapse::new("a", "zzz", 0.4)],
        );
        let synapses = g.synapses.clone();
        for _ in 0..50 {
            relax.step(&mut g, &[region("far", Vec3::new(9.0, 0.0, 0.0))]);
        }
        assert_eq!(g.synapses, synapses);
        assert!(g.neurons.iter().all(|n| n.position.length() <= 2.7 + 1e-5));
    }

    #[test]
    fn attraction_pulls_toward_weighted_centroid() {
        let cfg = RelaxationConfig {
            anchoring: 0.0,
            repulsion: 0.0,
            ..RelaxationConfig::default()
        };
        let relax = Relaxation::new(cfg, 2.7);
        let mut g = GraphSnapshot::new(
            vec![
                Neuron::new("a", Vec3::ZERO, "r"),
                Neuron::new("b", Vec3::new(1.0, 0.0, 0.0), "r"),
            ],
            vec![Synapse::new("a", "b", 0.5)],
        );
        relax.step(&mut g, &[]);
        assert!((g.neurons[0].position.x - 0.008).abs() < 1e-6);
        assert!((g.neurons[1].position.x - 0.992).abs() < 1e-6);
    }
}
