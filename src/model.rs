//! Graph snapshot model
//!
//! Nodes ("neurons"), edges ("synapses"), static regions and display metrics.
//! A [`GraphSnapshot`] is the authoritative description of the graph at one
//! instant; renderable sets are derived from it and never the other way round.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::ops::{Add, AddAssign, Mul, Sub};

use serde::{Deserialize, Serialize};

/// Stable node identifier (unique within a snapshot, stable across snapshots)
pub type NodeId = String;

/// Display metrics: last write wins, no other invariants
pub type Metrics = BTreeMap<String, f64>;

/// A point or direction in 3D space
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn length(self) -> f32 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    pub fn distance(self, other: Vec3) -> f32 {
        (self - other).length()
    }

    /// Linear interpolation toward `target` by factor `t`
    pub fn lerp(self, target: Vec3, t: f32) -> Vec3 {
        self + (target - self) * t
    }

    /// Sum of absolute components (used for drift accounting)
    pub fn manhattan(self) -> f32 {
        self.x.abs() + self.y.abs() + self.z.abs()
    }

    pub fn to_array(self) -> [f32; 3] {
        [self.x, self.y, self.z]
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }

    /// Clamp to a sphere of `radius` around the origin.
    ///
    /// Vectors farther than `radius` are scaled by `radius / distance`;
    /// everything else is returned unchanged. A vector with a NaN or
    /// infinite component maps to the origin.
    pub fn clamp_to_radius(self, radius: f32) -> Vec3 {
        if !self.is_finite() {
            return Vec3::ZERO;
        }
        let d = self.length();
        if d <= radius {
            return self;
        }
        if d.is_finite() {
            self * (radius / d)
        } else {
            // Squared components overflow; shrink before measuring
            let largest = self.x.abs().max(self.y.abs()).max(self.z.abs());
            (self * (1.0 / largest)).clamp_to_radius(radius)
        }
    }
}

impl From<[f32; 3]> for Vec3 {
    fn from(v: [f32; 3]) -> Self {
        Self::new(v[0], v[1], v[2])
    }
}

impl Add for Vec3 {
    type Output = Vec3;
    fn add(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl AddAssign for Vec3 {
    fn add_assign(&mut self, rhs: Vec3) {
        self.x += rhs.x;
        self.y += rhs.y;
        self.z += rhs.z;
    }
}

impl Sub for Vec3 {
    type Output = Vec3;
    fn sub(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f32> for Vec3 {
    type Output = Vec3;
    fn mul(self, s: f32) -> Vec3 {
        Vec3::new(self.x * s, self.y * s, self.z * s)
    }
}

/// A graph vertex
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Neuron {
    /// Unique identifier
    pub id: NodeId,

    /// Position in scene space
    pub position: Vec3,

    /// Region this node belongs to
    pub region: String,

    /// Activation in [0, 1], drives brightness and scale
    #[serde(default)]
    pub heat: f32,

    /// Optional human-readable label
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl Neuron {
    pub fn new(id: impl Into<NodeId>, position: Vec3, region: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            position,
            region: region.into(),
            heat: 0.0,
            label: None,
        }
    }

    pub fn with_heat(mut self, heat: f32) -> Self {
        self.heat = sanitize_unit(heat);
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// A weighted, directed relation between two nodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Synapse {
    pub source: NodeId,
    pub target: NodeId,

    /// Connection strength, signed; magnitude roughly in [0, 1]
    pub weight: f32,

    /// Transient firing state
    #[serde(default)]
    pub active: bool,
}

impl Synapse {
    pub fn new(source: impl Into<NodeId>, target: impl Into<NodeId>, weight: f32) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            weight,
            active: false,
        }
    }

    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    /// Weight magnitude
    pub fn strength(&self) -> f32 {
        self.weight.abs()
    }

    pub fn touches(&self, node: &str) -> bool {
        self.source == node || self.target == node
    }

    /// The endpoint opposite `node`, if the synapse touches it
    pub fn other(&self, node: &str) -> Option<&str> {
        if self.source == node {
            Some(&self.target)
        } else if self.target == node {
            Some(&self.source)
        } else {
            None
        }
    }
}

/// A static named cluster with a centroid
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub id: String,
    pub name: String,
    pub center: Vec3,
    pub radius: f32,
    #[serde(default)]
    pub description: String,
}

/// Complete graph state at one instant
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub neurons: Vec<Neuron>,
    pub synapses: Vec<Synapse>,
    #[serde(default)]
    pub metrics: Metrics,
}

impl GraphSnapshot {
    pub fn new(neurons: Vec<Neuron>, synapses: Vec<Synapse>) -> Self {
        Self {
            neurons,
            synapses,
            metrics: Metrics::new(),
        }
    }

    pub fn node_count(&self) -> usize {
        self.neurons.len()
    }

    pub fn edge_count(&self) -> usize {
        self.synapses.len()
    }

    /// Number of distinct regions referenced by nodes
    pub fn region_count(&self) -> usize {
        self.neurons
            .iter()
            .map(|n| n.region.as_str())
            .collect::<HashSet<_>>()
            .len()
    }

    pub fn neuron(&self, id: &str) -> Option<&Neuron> {
        self.neurons.iter().find(|n| n.id == id)
    }

    /// Neurons in snapshot order, skipping repeated IDs
    pub fn unique_neurons(&self) -> impl Iterator<Item = &Neuron> {
        let mut seen = HashSet::new();
        self.neurons.iter().filter(move |n| seen.insert(n.id.as_str()))
    }

    /// Map from node ID to its index in `neurons`, first occurrence wins
    pub fn index(&self) -> HashMap<&str, usize> {
        let mut index = HashMap::with_capacity(self.neurons.len());
        for (i, n) in self.neurons.iter().enumerate() {
            index.entry(n.id.as_str()).or_insert(i);
        }
        index
    }

    /// Clamp every node position in place
    pub fn clamp_positions(&mut self, radius: f32) {
        for n in &mut self.neurons {
            n.position = n.position.clamp_to_radius(radius);
        }
    }

    /// Average synapse weight, 0 for an edgeless graph
    pub fn connectivity(&self) -> f32 {
        if self.synapses.is_empty() {
            return 0.0;
        }
        self.synapses.iter().map(|s| s.weight).sum::<f32>() / self.synapses.len() as f32
    }
}

/// Clamp to [0, 1], mapping NaN to 0
pub fn sanitize_unit(v: f32) -> f32 {
    if v.is_nan() { 0.0 } else { v.clamp(0.0, 1.0) }
}

/// Map NaN and infinities to 0
pub fn finite_or_zero(v: f32) -> f32 {
    if v.is_finite() { v } else { 0.0 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_leaves_inside_points_alone() {
        let p = Vec3::new(1.0, 0.5, -0.5);
        assert_eq!(p.clamp_to_radius(2.7), p);
    }

    #[test]
    fn clamp_scales_outside_points_onto_the_sphere() {
        let p = Vec3::new(10.0, 0.0, 0.0).clamp_to_radius(2.7);
        assert!((p.x - 2.7).abs() < 1e-6);

        let q = Vec3::new(3.0, 4.0, 12.0).clamp_to_radius(2.7);
        assert!((q.length() - 2.7).abs() < 1e-5);
        // Direction is preserved
        assert!((q.x / q.z - 3.0 / 12.0).abs() < 1e-5);
    }

    #[test]
    fn clamp_maps_non_finite_points_to_the_origin() {
        assert_eq!(Vec3::new(f32::INFINITY, 0.0, 0.0).clamp_to_radius(2.7), Vec3::ZERO);
        assert_eq!(Vec3::new(0.0, f32::NAN, 1.0).clamp_to_radius(2.7), Vec3::ZERO);

        // Finite, but the squared length overflows
        let p = Vec3::new(3e38, -3e38, 0.0).clamp_to_radius(2.7);
        assert!((p.length() - 2.7).abs() < 1e-5);
        assert!((p.x + p.y).abs() < 1e-5);
    }

    #[test]
    fn lerp_moves_fraction_of_the_way() {
        let a = Vec3::ZERO;
        let b = Vec3::new(1.0, 2.0, 3.0);
        let c = a.lerp(b, 0.2);
        assert!((c.x - 0.2).abs() < 1e-6);
        assert!((c.z - 0.6).abs() < 1e-6);
    }

    #[test]
    fn synapse_other_endpoint() {
        let s = Synapse::new("a", "b", 0.5);
        assert_eq!(s.other("a"), Some("b"));
        assert_eq!(s.other("b"), Some("a"));
        assert_eq!(s.other("c"), None);
        assert!(s.touches("b"));
    }

    #[test]
    fn connectivity_is_average_weight() {
        let g = GraphSnapshot::new(
            vec![],
            vec![Synapse::new("a", "b", 0.2), Synapse::new("b", "c", 0.4)],
        );
        assert!((g.connectivity() - 0.3).abs() < 1e-6);
        assert_eq!(GraphSnapshot::default().connectivity(), 0.0);
    }

    #[test]
    fn region_count_counts_distinct_regions() {
        let g = GraphSnapshot::new(
            vec![
                Neuron::new("a", Vec3::ZERO, "r1"),
                Neuron::new("b", Vec3::ZERO, "r1"),
                Neuron::new("c", Vec3::ZERO, "r2"),
            ],
            vec![],
        );
        assert_eq!(g.region_count(), 2);
    }

    #[test]
    fn heat_is_sanitized() {
        assert_eq!(Neuron::new("a", Vec3::ZERO, "r").with_heat(3.0).heat, 1.0);
        assert_eq!(Neuron::new("a", Vec3::ZERO, "r").with_heat(f32::NAN).heat, 0.0);
    }
}
