use rand::Rng;
use tracing::info;

use super::batched::{BatchedSet, InstanceTransform};
use super::discrete::{DiscreteSet, EdgeVisual, NodeVisual};
use super::reconcile::{EdgeOrder, endpoints, select_edges};
use super::style;
use super::{Reconciler, RenderLimits, RenderableSet, Strategy};
use crate::model::{GraphSnapshot, Neuron};
use crate::palette::Palette;

/// Builds a fresh renderable set from a snapshot.
///
/// Called once per mode activation. Later snapshots go through the
/// [`Reconciler`] instead.
pub struct Builder<'a> {
    limits: &'a RenderLimits,
    palette: &'a Palette,
}

impl<'a> Builder<'a> {
    pub fn new(limits: &'a RenderLimits, palette: &'a Palette) -> Self {
        Self { limits, palette }
    }

    pub fn strategy_for(&self, snapshot: &GraphSnapshot) -> Strategy {
        Strategy::for_node_count(snapshot.node_count(), self.limits.batched_threshold)
    }

    pub fn build<R: Rng>(&self, snapshot: &GraphSnapshot, rng: &mut R) -> RenderableSet {
        let mut set = match self.strategy_for(snapshot) {
            Strategy::Discrete => RenderableSet::Discrete(self.build_discrete(snapshot, rng)),
            Strategy::Batched => RenderableSet::Batched(self.build_batched(snapshot)),
        };
        let edges = Reconciler::new(self.limits, self.palette).rebuild_edges(&mut set, snapshot);

        info!(
            strategy = ?set.strategy(),
            nodes = set.node_count(),
            edges,
            "built renderable set"
        );
        set
    }

    fn build_discrete<R: Rng>(&self, snapshot: &GraphSnapshot, rng: &mut R) -> DiscreteSet {
        let radius = self.limits.bounding_radius;
        let nodes = snapshot
            .unique_neurons()
            .map(|n| {
                NodeVisual::new(
                    n.id.clone(),
                    n.region.clone(),
                    n.position.clamp_to_radius(radius),
                    self.palette.hue(&n.region),
                    n.heat,
                )
            })
            .collect();

        // One slot per edge the first rebuild draws. The particle chance is
        // rolled per slot; decorations follow whichever edge the slot holds.
        let ep = endpoints(snapshot, radius);
        let capacity =
            select_edges(snapshot, &ep, self.limits.max_discrete_edges, EdgeOrder::Strongest).len();
        let chance = self.limits.particle_chance.clamp(0.0, 1.0);
        let edges = (0..capacity)
            .map(|_| {
                let slot = EdgeVisual::empty();
                if rng.gen_bool(chance) {
                    slot.with_particle_start(rng.gen_range(0.0..1.0))
                } else {
                    slot
                }
            })
            .collect();

        DiscreteSet::new(nodes, edges)
    }

    fn build_batched(&self, snapshot: &GraphSnapshot) -> BatchedSet {
        let radius = self.limits.bounding_radius;
        let unique: Vec<&Neuron> = snapshot.unique_neurons().collect();

        let mut transforms = Vec::with_capacity(unique.len());
        let mut colors = Vec::with_capacity(unique.len() * 3);
        for n in &unique {
            let (color, scale) = style::batched_node(self.palette.hue(&n.region), n.heat);
            transforms.push(InstanceTransform {
                position: n.position.clamp_to_radius(radius).to_array(),
                scale,
            });
            colors.extend_from_slice(&color);
        }

        let mut set = BatchedSet::new(
            unique.iter().map(|n| n.id.clone()).collect(),
            unique.iter().map(|n| n.region.clone()).collect(),
            transforms,
            colors,
            self.limits.max_batched_edges,
        );
        set.mark_instances_dirty();
        set
    }
}
