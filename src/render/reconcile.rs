//! In-place application of snapshots to an existing renderable set
//!
//! Nothing here allocates visual resources: node objects and instances are
//! looked up and restyled, edge slots are refilled, and anything referring to
//! a node the set does not know is skipped.

use std::collections::HashMap;

use tracing::debug;

use super::batched::{BatchedSet, InstanceTransform};
use super::discrete::DiscreteSet;
use super::style;
use super::{RenderLimits, RenderableSet};
use crate::error::FailureClass;
use crate::model::{GraphSnapshot, Synapse, Vec3};
use crate::palette::Palette;

/// Counts from one [`Reconciler::apply`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyReport {
    /// Node objects or instances updated
    pub updated: usize,
    /// Nodes present on only one side
    pub skipped: usize,
    /// Edges drawn after the rebuild
    pub edges: usize,
}

#[derive(Debug, Clone, Copy)]
pub(super) struct Endpoint<'a> {
    pub position: Vec3,
    pub region: &'a str,
}

/// An edge whose endpoints both resolved
#[derive(Debug, Clone, Copy)]
pub(super) struct JoinedEdge<'a> {
    pub synapse: &'a Synapse,
    pub start: Vec3,
    pub end: Vec3,
    /// Region of the source node, which colors the edge
    pub region: &'a str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum EdgeOrder {
    /// Highest |weight| first, ties in snapshot order
    Strongest,
    Snapshot,
}

/// Clamped position and region per node ID. The first occurrence of a
/// duplicated ID wins.
pub(super) fn endpoints(snapshot: &GraphSnapshot, radius: f32) -> HashMap<&str, Endpoint<'_>> {
    let mut map = HashMap::with_capacity(snapshot.neurons.len());
    for n in &snapshot.neurons {
        map.entry(n.id.as_str()).or_insert(Endpoint {
            position: n.position.clamp_to_radius(radius),
            region: n.region.as_str(),
        });
    }
    map
}

/// Like [`endpoints`], but positioned where the discrete set currently
/// draws each node. Nodes without a visual are left out.
fn rendered_endpoints<'a>(
    set: &DiscreteSet,
    snapshot: &'a GraphSnapshot,
) -> HashMap<&'a str, Endpoint<'a>> {
    let mut map = HashMap::with_capacity(snapshot.neurons.len());
    for n in snapshot.unique_neurons() {
        if let Some(visual) = set.node(&n.id) {
            let endpoint = Endpoint {
                position: visual.position,
                region: n.region.as_str(),
            };
            map.insert(n.id.as_str(), endpoint);
        }
    }
    map
}

/// Join edges to their endpoints, drop dangling ones, then apply the bound
pub(super) fn select_edges<'a>(
    snapshot: &'a GraphSnapshot,
    endpoints: &HashMap<&str, Endpoint<'a>>,
    bound: usize,
    order: EdgeOrder,
) -> Vec<JoinedEdge<'a>> {
    let joined = snapshot.synapses.iter().filter_map(|synapse| {
        let from = endpoints.get(synapse.source.as_str())?;
        let to = endpoints.get(synapse.target.as_str())?;
        Some(JoinedEdge {
            synapse,
            start: from.position,
            end: to.position,
            region: from.region,
        })
    });

    match order {
        EdgeOrder::Snapshot => joined.take(bound).collect(),
        EdgeOrder::Strongest => {
            let mut all: Vec<_> = joined.collect();
            all.sort_by(|a, b| b.synapse.strength().total_cmp(&a.synapse.strength()));
            all.truncate(bound);
            all
        }
    }
}

/// Applies snapshots to sets built by [`super::Builder`]
pub struct Reconciler<'a> {
    limits: &'a RenderLimits,
    palette: &'a Palette,
}

impl<'a> Reconciler<'a> {
    pub fn new(limits: &'a RenderLimits, palette: &'a Palette) -> Self {
        Self { limits, palette }
    }

    /// Move every known node toward its snapshot position, restyle it from
    /// its heat, then rebuild edge geometry
    pub fn apply(&self, set: &mut RenderableSet, snapshot: &GraphSnapshot) -> ApplyReport {
        let (updated, skipped) = match set {
            RenderableSet::Discrete(s) => self.apply_discrete(s, snapshot),
            RenderableSet::Batched(s) => self.apply_batched(s, snapshot),
        };
        let edges = self.rebuild_edges(set, snapshot);

        if skipped > 0 {
            let recovery = FailureClass::MissingReference.recovery();
            debug!(updated, skipped, ?recovery, "snapshot nodes without a visual were skipped");
        }
        ApplyReport {
            updated,
            skipped,
            edges,
        }
    }

    /// Rewrite edge geometry and return the number of edges drawn.
    ///
    /// Discrete edges join the rendered node positions, so they stay
    /// attached while nodes ease toward their targets. Batched segments
    /// join the clamped snapshot positions.
    pub fn rebuild_edges(&self, set: &mut RenderableSet, snapshot: &GraphSnapshot) -> usize {
        match set {
            RenderableSet::Discrete(s) => self.rebuild_discrete_edges(s, snapshot),
            RenderableSet::Batched(s) => self.rebuild_batched_edges(s, snapshot),
        }
    }

    fn apply_discrete(&self, set: &mut DiscreteSet, snapshot: &GraphSnapshot) -> (usize, usize) {
        let radius = self.limits.bounding_radius;
        let factor = self.limits.discrete_smoothing;
        let (mut updated, mut skipped) = (0, 0);

        for neuron in snapshot.unique_neurons() {
            let Some(visual) = set.node_mut(&neuron.id) else {
                skipped += 1;
                continue;
            };
            let target = neuron.position.clamp_to_radius(radius);
            visual.position = visual.position.lerp(target, factor).clamp_to_radius(radius);
            visual.restyle(style::discrete_node(self.palette.hue(&neuron.region), neuron.heat));
            updated += 1;
        }
        (updated, skipped)
    }

    fn apply_batched(&self, set: &mut BatchedSet, snapshot: &GraphSnapshot) -> (usize, usize) {
        let radius = self.limits.bounding_radius;
        let factor = self.limits.batched_smoothing;
        let (mut updated, mut skipped) = (0, 0);
        // Built only once the snapshot order stops matching instance order
        let mut by_id: Option<HashMap<&str, usize>> = None;

        for i in 0..set.instance_count() {
            let neuron = match snapshot.neurons.get(i) {
                Some(n) if n.id == set.id(i) => Some(n),
                _ => by_id
                    .get_or_insert_with(|| snapshot.index())
                    .get(set.id(i))
                    .map(|&j| &snapshot.neurons[j]),
            };
            let Some(neuron) = neuron else {
                skipped += 1;
                continue;
            };

            let current = Vec3::from(set.transform(i).position);
            let target = neuron.position.clamp_to_radius(radius);
            let position = current.lerp(target, factor).clamp_to_radius(radius);
            let (color, scale) = style::batched_node(self.palette.hue(&neuron.region), neuron.heat);
            set.write_instance(
                i,
                InstanceTransform {
                    position: position.to_array(),
                    scale,
                },
                color,
            );
            updated += 1;
        }

        set.mark_instances_dirty();
        (updated, skipped)
    }

    fn rebuild_discrete_edges(&self, set: &mut DiscreteSet, snapshot: &GraphSnapshot) -> usize {
        let endpoints = rendered_endpoints(set, snapshot);
        let chosen = select_edges(snapshot, &endpoints, set.edge_capacity(), EdgeOrder::Strongest);
        for (slot, edge) in set.edges_mut().iter_mut().zip(&chosen) {
            let hue = self.palette.hue(edge.region);
            slot.fill(edge.synapse, edge.start, edge.end, hue, self.limits);
        }
        set.set_emitted(chosen.len());
        chosen.len()
    }

    fn rebuild_batched_edges(&self, set: &mut BatchedSet, snapshot: &GraphSnapshot) -> usize {
        let endpoints = endpoints(snapshot, self.limits.bounding_radius);
        let chosen = select_edges(snapshot, &endpoints, set.edge_capacity(), EdgeOrder::Snapshot);
        for (slot, edge) in chosen.iter().enumerate() {
            let color = style::batched_edge(
                self.palette.hue(edge.region),
                edge.synapse.weight,
                edge.synapse.active,
            );
            set.write_segment(slot, edge.start.to_array(), edge.end.to_array(), color);
        }
        set.set_emitted(chosen.len());
        chosen.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Neuron;

    fn graph() -> GraphSnapshot {
        GraphSnapshot::new(
            vec![
                Neuron::new("a", Vec3::new(0.0, 0.0, 0.0), "r"),
                Neuron::new("b", Vec3::new(1.0, 0.0, 0.0), "r"),
                Neuron::new("c", Vec3::new(0.0, 9.0, 0.0), "r"),
            ],
            vec![
                Synapse::new("a", "b", 0.1),
                Synapse::new("a", "ghost", 0.9),
                Synapse::new("b", "c", -0.8),
                Synapse::new("c", "a", 0.5),
            ],
        )
    }

    #[test]
    fn dangling_edges_are_dropped_before_the_bound() {
        let g = graph();
        let ep = endpoints(&g, 2.7);
        let chosen = select_edges(&g, &ep, 2, EdgeOrder::Strongest);
        let weights: Vec<f32> = chosen.iter().map(|e| e.synapse.weight).collect();
        assert_eq!(weights, vec![-0.8, 0.5]);

        let chosen = select_edges(&g, &ep, 10, EdgeOrder::Snapshot);
        assert_eq!(chosen.len(), 3);
    }

    #[test]
    fn joined_edges_use_clamped_positions() {
        let g = graph();
        let ep = endpoints(&g, 2.7);
        let chosen = select_edges(&g, &ep, 10, EdgeOrder::Snapshot);
        let bc = chosen.iter().find(|e| e.synapse.source == "b").unwrap();
        assert!((bc.end.length() - 2.7).abs() < 1e-5);
    }

    fn build(g: &GraphSnapshot, limits: &RenderLimits, palette: &Palette) -> RenderableSet {
        use rand::SeedableRng;
        let mut rng = rand::rngs::StdRng::seed_from_u64(3);
        super::super::Builder::new(limits, palette).build(g, &mut rng)
    }

    #[test]
    fn discrete_apply_lerps_and_skips_unknown_nodes() {
        let limits = RenderLimits::default();
        let palette = Palette::default();
        let mut set = build(&graph(), &limits, &palette);

        let mut next = graph();
        next.neurons[1].position = Vec3::new(2.0, 0.0, 0.0);
        next.neurons.push(Neuron::new("stranger", Vec3::ZERO, "r"));

        let report = Reconciler::new(&limits, &palette).apply(&mut set, &next);
        assert_eq!(report.updated, 3);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.edges, 3);
        let b = set.position_of("b").unwrap();
        assert!((b.x - 1.2).abs() < 1e-5);
        assert!(!set.contains("stranger"));
    }

    #[test]
    fn batched_apply_marks_dirty_once_and_resolves_reordered_nodes() {
        let limits = RenderLimits {
            batched_threshold: 2,
            ..RenderLimits::default()
        };
        let palette = Palette::default();
        let mut set = build(&graph(), &limits, &palette);
        let RenderableSet::Batched(b) = &set else {
            panic!("expected batched");
        };
        let before = b.instances_dirty().marks();

        let mut next = graph();
        next.neurons.reverse();
        next.neurons.retain(|n| n.id != "a");
        next.neurons[0].position = Vec3::new(0.0, 1.0, 0.0);

        let report = Reconciler::new(&limits, &palette).apply(&mut set, &next);
        assert_eq!(report.updated, 2);
        assert_eq!(report.skipped, 1);

        let RenderableSet::Batched(b) = &set else {
            panic!("expected batched");
        };
        assert_eq!(b.instances_dirty().marks(), before + 1);
        // Only b -> c survives once a is gone
        assert_eq!(b.emitted_edges(), 1);
        let c = Vec3::from(b.transform(b.instance_of("c").unwrap()).position);
        assert!(c.length() <= 2.7 + 1e-5);
    }

    #[test]
    fn applying_twice_keeps_membership() {
        let limits = RenderLimits::default();
        let palette = Palette::default();
        let g = graph();
        let mut set = build(&g, &limits, &palette);
        let reconciler = Reconciler::new(&limits, &palette);

        let first = reconciler.apply(&mut set, &g);
        let objects = set.object_count();
        let second = reconciler.apply(&mut set, &g);
        assert_eq!(first, second);
        assert_eq!(set.object_count(), objects);
    }

    #[test]
    fn discrete_edges_stay_attached_to_rendered_nodes() {
        let limits = RenderLimits::default();
        let palette = Palette::default();
        let g = GraphSnapshot::new(
            vec![
                Neuron::new("a", Vec3::ZERO, "r"),
                Neuron::new("b", Vec3::new(0.5, 0.0, 0.0), "r"),
            ],
            vec![Synapse::new("a", "b", 0.5)],
        );
        let mut set = build(&g, &limits, &palette);

        let mut next = g.clone();
        next.neurons[1].position = Vec3::new(2.5, 0.0, 0.0);
        Reconciler::new(&limits, &palette).apply(&mut set, &next);

        let RenderableSet::Discrete(d) = &set else {
            panic!("expected discrete");
        };
        let b = d.node("b").unwrap().position;
        assert!((b.x - 0.9).abs() < 1e-5);
        assert_eq!(d.edges()[0].end, b);
        let glow = d.edges()[0].glow.as_ref().unwrap();
        assert!((glow.position.x - 0.45).abs() < 1e-5);
    }

    #[test]
    fn weakened_edges_lose_their_decorations() {
        let limits = RenderLimits {
            particle_chance: 1.0,
            ..RenderLimits::default()
        };
        let palette = Palette::default();
        let strong = GraphSnapshot::new(
            vec![
                Neuron::new("a", Vec3::ZERO, "r"),
                Neuron::new("b", Vec3::new(1.0, 0.0, 0.0), "r"),
            ],
            vec![Synapse::new("a", "b", 0.9)],
        );
        let mut weak = strong.clone();
        weak.synapses[0].weight = 0.05;

        let mut set = build(&strong, &limits, &palette);
        let reconciler = Reconciler::new(&limits, &palette);
        let edge = |set: &RenderableSet| match set {
            RenderableSet::Discrete(d) => d.edges()[0].clone(),
            RenderableSet::Batched(_) => panic!("expected discrete"),
        };
        assert!(edge(&set).glow.is_some() && edge(&set).particle.is_some());

        reconciler.apply(&mut set, &weak);
        let e = edge(&set);
        assert!(e.visible);
        assert!(e.glow.is_none());
        assert!(e.particle.is_none());

        reconciler.apply(&mut set, &strong);
        assert!(edge(&set).glow.is_some() && edge(&set).particle.is_some());
    }

    #[test]
    fn non_finite_positions_never_reach_the_scene() {
        for batched_threshold in [512, 1] {
            let limits = RenderLimits {
                batched_threshold,
                ..RenderLimits::default()
            };
            let palette = Palette::default();
            let mut set = build(&graph(), &limits, &palette);
            let reconciler = Reconciler::new(&limits, &palette);

            let mut bad = graph();
            bad.neurons[1].position = Vec3::new(f32::INFINITY, f32::NAN, 0.0);
            reconciler.apply(&mut set, &bad);
            for _ in 0..20 {
                reconciler.apply(&mut set, &graph());
            }

            for id in ["a", "b", "c"] {
                let p = set.position_of(id).unwrap();
                assert!(p.is_finite(), "{id} at {p:?}");
                assert!(p.length() <= 2.7 + 1e-5);
            }
        }
    }

    #[test]
    fn duplicated_ids_are_applied_once_per_snapshot() {
        let limits = RenderLimits::default();
        let palette = Palette::default();
        let g = GraphSnapshot::new(vec![Neuron::new("a", Vec3::new(1.0, 0.0, 0.0), "r")], vec![]);
        let mut set = build(&g, &limits, &palette);

        let next = GraphSnapshot::new(
            vec![
                Neuron::new("a", Vec3::new(2.0, 0.0, 0.0), "r"),
                Neuron::new("a", Vec3::ZERO, "r"),
            ],
            vec![],
        );
        let report = Reconciler::new(&limits, &palette).apply(&mut set, &next);
        assert_eq!(report.updated, 1);
        assert_eq!(report.skipped, 0);
        assert!((set.position_of("a").unwrap().x - 1.2).abs() < 1e-5);
    }

    #[test]
    fn duplicate_ids_keep_the_first_occurrence() {
        let g = GraphSnapshot::new(
            vec![
                Neuron::new("a", Vec3::new(1.0, 0.0, 0.0), "first"),
                Neuron::new("a", Vec3::new(2.0, 0.0, 0.0), "second"),
            ],
            vec![],
        );
        assert_eq!(endpoints(&g, 2.7)["a"].region, "first");
    }
}
