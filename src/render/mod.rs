//! Scale-adaptive renderable sets
//!
//! A graph snapshot is turned into exactly one of two visual layouts:
//!
//! - **Discrete**: one object per node and per displayed edge, with glow and
//!   particle decorations. Cheap to inspect, expensive at scale.
//! - **Batched**: one shared instanced object whose per-instance transforms
//!   and colors live in flat buffers, plus one shared line-segment buffer
//!   with a draw range.
//!
//! The [`Builder`] picks the layout once per mode activation; the
//! [`Reconciler`] then updates it in place for every later snapshot.
//!
//! Rendering itself is out of scope: these types are the data a renderer
//! would upload (see [`BatchedSet::transform_bytes`]).

mod batched;
mod builder;
mod discrete;
mod reconcile;
pub mod style;

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::model::Vec3;

pub use batched::{BatchedSet, DirtyFlag, InstanceTransform};
pub use builder::Builder;
pub use discrete::{DiscreteSet, EdgeVisual, Glow, NodeVisual, Particle};
pub use reconcile::{ApplyReport, Reconciler};

/// Default node count at which the batched layout takes over
pub const DEFAULT_BATCHED_THRESHOLD: usize = 512;

/// Default bounding radius of the scene
pub const DEFAULT_BOUNDING_RADIUS: f32 = 2.7;

/// Visual layout of a renderable set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Discrete,
    Batched,
}

impl Strategy {
    /// `count >= threshold` is batched, anything smaller is discrete
    pub fn for_node_count(count: usize, threshold: usize) -> Self {
        if count >= threshold {
            Strategy::Batched
        } else {
            Strategy::Discrete
        }
    }
}

/// Limits and smoothing factors for building and reconciling sets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderLimits {
    /// Node count at which the batched layout is used
    pub batched_threshold: usize,
    /// Every position is clamped to this distance from the origin
    pub bounding_radius: f32,
    /// Maximum line objects in the discrete layout
    pub max_discrete_edges: usize,
    /// Segment capacity of the batched line buffer
    pub max_batched_edges: usize,
    /// Interpolation factor per apply, discrete layout
    pub discrete_smoothing: f32,
    /// Interpolation factor per apply, batched layout
    pub batched_smoothing: f32,
    /// Edges stronger than this get a glow decoration
    pub glow_threshold: f32,
    /// Edges stronger than this may get a particle decoration
    pub particle_threshold: f32,
    /// Chance of a particle on an eligible edge
    pub particle_chance: f64,
}

impl Default for RenderLimits {
    fn default() -> Self {
        Self {
            batched_threshold: DEFAULT_BATCHED_THRESHOLD,
            bounding_radius: DEFAULT_BOUNDING_RADIUS,
            max_discrete_edges: 500,
            max_batched_edges: 2000,
            discrete_smoothing: 0.2,
            batched_smoothing: 0.15,
            glow_threshold: 0.2,
            particle_threshold: 0.3,
            particle_chance: 0.5,
        }
    }
}

/// Resources freed when a set is released
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReleaseReport {
    pub strategy: Strategy,
    pub objects: usize,
    pub buffers: usize,
}

/// The live visual representation of a node/edge collection
#[derive(Debug)]
pub enum RenderableSet {
    Discrete(DiscreteSet),
    Batched(BatchedSet),
}

impl RenderableSet {
    pub fn strategy(&self) -> Strategy {
        match self {
            RenderableSet::Discrete(_) => Strategy::Discrete,
            RenderableSet::Batched(_) => Strategy::Batched,
        }
    }

    /// Whether `id` has a registered visual
    pub fn contains(&self, id: &str) -> bool {
        match self {
            RenderableSet::Discrete(set) => set.node(id).is_some(),
            RenderableSet::Batched(set) => set.instance_of(id).is_some(),
        }
    }

    /// Rendered position of a node
    pub fn position_of(&self, id: &str) -> Option<Vec3> {
        match self {
            RenderableSet::Discrete(set) => set.node(id).map(|n| n.position),
            RenderableSet::Batched(set) => set
                .instance_of(id)
                .map(|i| Vec3::from(set.transform(i).position)),
        }
    }

    pub fn node_count(&self) -> usize {
        match self {
            RenderableSet::Discrete(set) => set.nodes().len(),
            RenderableSet::Batched(set) => set.instance_count(),
        }
    }

    /// Number of edges currently drawn
    pub fn emitted_edges(&self) -> usize {
        match self {
            RenderableSet::Discrete(set) => set.emitted_edges(),
            RenderableSet::Batched(set) => set.emitted_edges(),
        }
    }

    /// Visual objects owned by this set
    pub fn object_count(&self) -> usize {
        match self {
            RenderableSet::Discrete(set) => set.object_count(),
            RenderableSet::Batched(set) => set.object_count(),
        }
    }

    /// Flat numeric buffers owned by this set
    pub fn buffer_count(&self) -> usize {
        match self {
            RenderableSet::Discrete(_) => 0,
            RenderableSet::Batched(set) => set.buffer_count(),
        }
    }

    pub fn is_visible(&self) -> bool {
        match self {
            RenderableSet::Discrete(set) => set.is_visible(),
            RenderableSet::Batched(set) => set.is_visible(),
        }
    }

    /// Hide or show every object without releasing anything
    pub fn set_visible(&mut self, visible: bool) {
        match self {
            RenderableSet::Discrete(set) => set.set_visible(visible),
            RenderableSet::Batched(set) => set.set_visible(visible),
        }
    }

    /// Move particle decorations along their edges
    pub fn advance_particles<R: Rng>(&mut self, dt: Duration, rng: &mut R) {
        if let RenderableSet::Discrete(set) = self {
            set.advance_particles(dt, rng);
        }
    }

    /// Bytes of buffer data changed since the last call. Discrete sets own
    /// no flat buffers.
    pub fn take_upload_bytes(&mut self) -> usize {
        match self {
            RenderableSet::Discrete(_) => 0,
            RenderableSet::Batched(set) => set.take_upload_bytes(),
        }
    }

    /// Consume the set, releasing every object and buffer it owns
    pub fn release(self) -> ReleaseReport {
        ReleaseReport {
            strategy: self.strategy(),
            objects: self.object_count(),
            buffers: self.buffer_count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_is_batched_one_below_is_discrete() {
        assert_eq!(Strategy::for_node_count(512, 512), Strategy::Batched);
        assert_eq!(Strategy::for_node_count(511, 512), Strategy::Discrete);
        assert_eq!(Strategy::for_node_count(10_000, 512), Strategy::Batched);
        assert_eq!(Strategy::for_node_count(0, 512), Strategy::Discrete);
    }
}
