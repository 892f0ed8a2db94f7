//! One visual object per node and per displayed edge

use std::collections::HashMap;
use std::time::Duration;

use rand::Rng;

use super::RenderLimits;
use super::style::{self, EdgeLook, NodeLook};
use crate::model::{NodeId, Synapse, Vec3};
use crate::palette::Hsl;

/// Particle travel speed multiplier, edge lengths per second per unit speed
const PARTICLE_RATE: f32 = 0.36;

/// Chance a particle reverses when it wraps around
const PARTICLE_REVERSE_CHANCE: f64 = 0.3;

/// Additive sprite drawn around a node or along an edge
#[derive(Debug, Clone, PartialEq)]
pub struct Glow {
    pub position: Vec3,
    pub color: [f32; 3],
    pub opacity: f32,
    pub scale: [f32; 2],
}

#[derive(Debug, Clone, PartialEq)]
pub struct NodeVisual {
    pub id: NodeId,
    pub region: String,
    pub position: Vec3,
    pub color: [f32; 3],
    pub opacity: f32,
    pub scale: f32,
    pub glow: Glow,
    pub visible: bool,
}

impl NodeVisual {
    pub(super) fn new(id: NodeId, region: String, position: Vec3, hue: Hsl, heat: f32) -> Self {
        let mut visual = Self {
            id,
            region,
            position,
            color: [0.0; 3],
            opacity: 0.0,
            scale: 0.0,
            glow: Glow {
                position,
                color: [0.0; 3],
                opacity: 0.0,
                scale: [0.0; 2],
            },
            visible: true,
        };
        visual.restyle(style::discrete_node(hue, heat));
        visual
    }

    pub(super) fn restyle(&mut self, look: NodeLook) {
        self.color = look.color;
        self.opacity = look.opacity;
        self.scale = look.scale;
        self.glow.position = self.position;
        self.glow.color = look.color;
        self.glow.opacity = look.glow_opacity;
        self.glow.scale = [look.glow_scale, look.glow_scale];
    }
}

/// A point travelling along its edge
#[derive(Debug, Clone, PartialEq)]
pub struct Particle {
    /// Fraction of the edge travelled, in [0, 1)
    pub progress: f32,
    pub speed: f32,
    pub reversed: bool,
    pub position: Vec3,
}

/// One line object; slots past the emitted count are hidden and reused
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeVisual {
    pub source: NodeId,
    pub target: NodeId,
    pub start: Vec3,
    pub end: Vec3,
    pub weight: f32,
    pub active: bool,
    pub color: [f32; 3],
    pub opacity: f32,
    pub glow: Option<Glow>,
    pub particle: Option<Particle>,
    pub visible: bool,
    /// Starting progress of this slot's particle, rolled when the slot was
    /// created. `None` if the slot never carries one.
    particle_start: Option<f32>,
}

impl EdgeVisual {
    pub(super) fn empty() -> Self {
        Self {
            source: NodeId::new(),
            target: NodeId::new(),
            start: Vec3::ZERO,
            end: Vec3::ZERO,
            weight: 0.0,
            active: false,
            color: [0.0; 3],
            opacity: 0.0,
            glow: None,
            particle: None,
            visible: false,
            particle_start: None,
        }
    }

    /// Let this slot carry a particle starting at `progress` whenever its
    /// edge is strong enough
    pub(super) fn with_particle_start(mut self, progress: f32) -> Self {
        self.particle_start = Some(progress);
        self
    }

    /// Point this slot at `synapse` and restyle it. Glow and particle exist
    /// only while the edge is above their strength thresholds.
    pub(super) fn fill(
        &mut self,
        synapse: &Synapse,
        start: Vec3,
        end: Vec3,
        hue: Hsl,
        limits: &RenderLimits,
    ) {
        if self.source != synapse.source || self.target != synapse.target {
            self.source.clone_from(&synapse.source);
            self.target.clone_from(&synapse.target);
        }
        self.start = start;
        self.end = end;
        self.weight = synapse.weight;
        self.active = synapse.active;

        let EdgeLook { color, opacity } = style::discrete_edge(hue, synapse.weight, synapse.active);
        self.color = color;
        self.opacity = opacity;

        let strength = synapse.strength();
        self.glow = (strength > limits.glow_threshold).then(|| {
            let (opacity, scale) = style::edge_glow(synapse.weight, synapse.active, start.distance(end));
            Glow {
                position: start.lerp(end, 0.5),
                color,
                opacity,
                scale,
            }
        });

        match self.particle_start {
            Some(progress) if strength > limits.particle_threshold => {
                let particle = self.particle.get_or_insert(Particle {
                    progress,
                    speed: 0.0,
                    reversed: false,
                    position: Vec3::ZERO,
                });
                particle.speed = 0.15 + strength * 0.4;
                particle.position = point_along(start, end, particle.progress, particle.reversed);
            }
            _ => self.particle = None,
        }
    }
}

fn point_along(start: Vec3, end: Vec3, progress: f32, reversed: bool) -> Vec3 {
    let t = if reversed { 1.0 - progress } else { progress };
    start.lerp(end, t)
}

/// Renderable set with individually addressable objects
#[derive(Debug, Default)]
pub struct DiscreteSet {
    nodes: Vec<NodeVisual>,
    index: HashMap<NodeId, usize>,
    edges: Vec<EdgeVisual>,
    emitted: usize,
    hidden: bool,
}

impl DiscreteSet {
    pub(super) fn new(nodes: Vec<NodeVisual>, edges: Vec<EdgeVisual>) -> Self {
        let index = nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.id.clone(), i))
            .collect();
        Self {
            nodes,
            index,
            edges,
            emitted: 0,
            hidden: false,
        }
    }

    pub fn node(&self, id: &str) -> Option<&NodeVisual> {
        self.index.get(id).map(|&i| &self.nodes[i])
    }

    pub(super) fn node_mut(&mut self, id: &str) -> Option<&mut NodeVisual> {
        let i = *self.index.get(id)?;
        self.nodes.get_mut(i)
    }

    pub fn nodes(&self) -> &[NodeVisual] {
        &self.nodes
    }

    /// Every edge slot, including hidden ones past the emitted count
    pub fn edges(&self) -> &[EdgeVisual] {
        &self.edges
    }

    pub(super) fn edges_mut(&mut self) -> &mut [EdgeVisual] {
        &mut self.edges
    }

    pub fn edge_capacity(&self) -> usize {
        self.edges.len()
    }

    pub fn emitted_edges(&self) -> usize {
        self.emitted
    }

    /// Mark the first `count` slots as drawn and hide the rest
    pub(super) fn set_emitted(&mut self, count: usize) {
        self.emitted = count.min(self.edges.len());
        let shown = !self.hidden;
        for (i, edge) in self.edges.iter_mut().enumerate() {
            edge.visible = shown && i < self.emitted;
        }
    }

    /// Nodes, their glows, and every edge slot with its decorations
    pub fn object_count(&self) -> usize {
        let decorations: usize = self
            .edges
            .iter()
            .map(|e| usize::from(e.glow.is_some()) + usize::from(e.particle.is_some()))
            .sum();
        self.nodes.len() * 2 + self.edges.len() + decorations
    }

    pub fn is_visible(&self) -> bool {
        !self.hidden
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.hidden = !visible;
        for node in &mut self.nodes {
            node.visible = visible;
        }
        let emitted = self.emitted;
        self.set_emitted(emitted);
    }

    pub fn advance_particles<R: Rng>(&mut self, dt: Duration, rng: &mut R) {
        let dt = dt.as_secs_f32();
        for edge in self.edges.iter_mut().take(self.emitted) {
            let Some(particle) = &mut edge.particle else {
                continue;
            };
            particle.progress += particle.speed * PARTICLE_RATE * dt;
            if particle.progress >= 1.0 {
                particle.progress = particle.progress.fract();
                if rng.gen_bool(PARTICLE_REVERSE_CHANCE) {
                    particle.reversed = !particle.reversed;
                }
            }
            particle.position = point_along(edge.start, edge.end, particle.progress, particle.reversed);
        }
    }
}
