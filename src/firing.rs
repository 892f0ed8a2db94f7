//! Spreading activation
//!
//! Firing a node flashes it, lights up every synapse touching it and, for
//! propagating fires, schedules probabilistic one-hop firings of its
//! neighbours. Propagated firings never propagate further.
//!
//! All state here is local and ephemeral: heat accumulators, rest timers,
//! pulses and the fire-rate window. The simulator writes heat and `active`
//! flags into the local graph; the reconciler turns those into visuals.

use std::collections::HashMap;
use std::time::Duration;

use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::model::{GraphSnapshot, NodeId, Vec3};
use crate::render::RenderableSet;
use crate::scheduler::{Scheduler, TimerId, TimerTask};

/// Spreading-activation constants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FiringConfig {
    /// How long a fired node stays at peak heat
    pub flash_ms: u64,
    /// How long touched synapses stay active
    pub edge_rest_ms: u64,
    /// Accumulated fires that saturate displayed heat
    pub heat_saturation: f32,
    /// Accumulator decay, units per second
    pub heat_decay_per_sec: f32,
    pub max_pulses: usize,
    pub pulse_lifetime_ms: u64,
    /// Propagation delay is `base + distance * per_unit`
    pub propagation_base_ms: u64,
    pub propagation_per_unit_ms: f32,
    /// Distance assumed when a neighbour has no position
    pub missing_distance: f32,
    /// Propagation chance per synapse is `|weight| * factor`
    pub propagation_factor: f32,
    /// Ambient fires per tick, inclusive range
    pub ambient_min: usize,
    pub ambient_max: usize,
    /// Region ambient picks are biased toward
    pub router_region: String,
    pub router_bias: f64,
    pub cascade_stagger_ms: u64,
    pub activity_stagger_ms: u64,
}

impl Default for FiringConfig {
    fn default() -> Self {
        Self {
            flash_ms: 250,
            edge_rest_ms: 600,
            heat_saturation: 12.0,
            heat_decay_per_sec: 1.2,
            max_pulses: 5,
            pulse_lifetime_ms: 1200,
            propagation_base_ms: 40,
            propagation_per_unit_ms: 80.0,
            missing_distance: 2.0,
            propagation_factor: 0.35,
            ambient_min: 2,
            ambient_max: 4,
            router_region: "thalamus".to_string(),
            router_bias: 0.2,
            cascade_stagger_ms: 100,
            activity_stagger_ms: 60,
        }
    }
}

/// An expanding ring emitted by a propagating fire
#[derive(Debug, Clone, PartialEq)]
pub struct Pulse {
    pub origin: Vec3,
    pub age: Duration,
}

impl Pulse {
    /// Fraction of the lifetime elapsed, in [0, 1]
    pub fn progress(&self, lifetime: Duration) -> f32 {
        if lifetime.is_zero() {
            return 1.0;
        }
        (self.age.as_secs_f32() / lifetime.as_secs_f32()).min(1.0)
    }
}

/// Outcome of a successful fire
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FireEvent {
    pub node: NodeId,
    pub propagate: bool,
    /// Neighbour firings scheduled by this fire
    pub scheduled: usize,
}

#[derive(Debug, Default)]
pub struct FiringSimulator {
    config: FiringConfig,
    accumulators: HashMap<NodeId, f32>,
    flashing: HashMap<NodeId, TimerId>,
    edge_rest: HashMap<usize, TimerId>,
    pulses: Vec<Pulse>,
    total_fires: u64,
    window_start: Duration,
    window_fires: u32,
    rate: f32,
}

impl FiringSimulator {
    pub fn new(config: FiringConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn config(&self) -> &FiringConfig {
        &self.config
    }

    pub fn total_fires(&self) -> u64 {
        self.total_fires
    }

    /// Fires per second over the last completed window
    pub fn fire_rate(&self) -> f32 {
        self.rate
    }

    pub fn pulses(&self) -> &[Pulse] {
        &self.pulses
    }

    /// Displayed heat of a node: peak while flashing, otherwise the
    /// normalized accumulator
    pub fn heat(&self, node: &str) -> f32 {
        if self.flashing.contains_key(node) {
            return 1.0;
        }
        let acc = self.accumulators.get(node).copied().unwrap_or(0.0);
        (acc / self.config.heat_saturation).min(1.0)
    }

    pub fn is_flashing(&self, node: &str) -> bool {
        self.flashing.contains_key(node)
    }

    /// Fire `node`. Returns `None` when the node has no visual in `set`.
    #[allow(clippy::too_many_arguments)]
    pub fn fire<R: Rng>(
        &mut self,
        node: &str,
        propagate: bool,
        graph: &mut GraphSnapshot,
        set: &RenderableSet,
        now: Duration,
        scheduler: &mut Scheduler<TimerTask>,
        rng: &mut R,
    ) -> Option<FireEvent> {
        if !set.contains(node) {
            debug!(node, "fire ignored, no visual");
            return None;
        }

        // Peak flash, restarted if already flashing
        if let Some(timer) = self.flashing.remove(node) {
            scheduler.cancel(timer);
        }
        let timer = scheduler.schedule_after(
            now,
            Duration::from_millis(self.config.flash_ms),
            TimerTask::NeuronRest {
                node: node.to_string(),
            },
        );
        self.flashing.insert(node.to_string(), timer);

        self.total_fires += 1;
        self.window_fires += 1;
        *self.accumulators.entry(node.to_string()).or_insert(0.0) += 1.0;

        let origin = set.position_of(node).unwrap_or(Vec3::ZERO);
        if propagate && self.pulses.len() < self.config.max_pulses {
            self.pulses.push(Pulse {
                origin,
                age: Duration::ZERO,
            });
        }

        let mut scheduled = 0;
        for (index, synapse) in graph.synapses.iter_mut().enumerate() {
            let Some(other) = synapse.other(node) else {
                continue;
            };
            let other = other.to_string();

            synapse.active = true;
            if let Some(timer) = self.edge_rest.remove(&index) {
                scheduler.cancel(timer);
            }
            let timer = scheduler.schedule_after(
                now,
                Duration::from_millis(self.config.edge_rest_ms),
                TimerTask::SynapseRest { index },
            );
            self.edge_rest.insert(index, timer);

            if !propagate {
                continue;
            }
            let chance = f64::from(synapse.strength() * self.config.propagation_factor).clamp(0.0, 1.0);
            if !rng.gen_bool(chance) {
                continue;
            }
            let distance = set
                .position_of(&other)
                .map_or(self.config.missing_distance, |p| p.distance(origin));
            let delay = self.config.propagation_base_ms as f32
                + distance * self.config.propagation_per_unit_ms;
            scheduler.schedule_after(
                now,
                Duration::from_millis(delay.max(0.0).round() as u64),
                TimerTask::Fire {
                    node: other,
                    propagate: false,
                },
            );
            scheduled += 1;
        }

        Some(FireEvent {
            node: node.to_string(),
            propagate,
            scheduled,
        })
    }

    /// One ambient tick: fire a few random nodes, biased toward the router
    /// region when it has any nodes
    pub fn ambient<R: Rng>(
        &mut self,
        graph: &mut GraphSnapshot,
        set: &RenderableSet,
        now: Duration,
        scheduler: &mut Scheduler<TimerTask>,
        rng: &mut R,
    ) -> Vec<FireEvent> {
        if graph.neurons.is_empty() {
            return Vec::new();
        }
        let all: Vec<NodeId> = graph.neurons.iter().map(|n| n.id.clone()).collect();
        let router: Vec<NodeId> = graph
            .neurons
            .iter()
            .filter(|n| n.region == self.config.router_region)
            .map(|n| n.id.clone())
            .collect();

        let (lo, hi) = (
            self.config.ambient_min,
            self.config.ambient_max.max(self.config.ambient_min),
        );
        let count = rng.gen_range(lo..=hi);
        let bias = self.config.router_bias.clamp(0.0, 1.0);

        let mut events = Vec::with_capacity(count);
        for _ in 0..count {
            let pool = if !router.is_empty() && rng.gen_bool(bias) {
                &router
            } else {
                &all
            };
            let Some(node) = pool.choose(rng).cloned() else {
                continue;
            };
            if let Some(event) = self.fire(&node, true, graph, set, now, scheduler, rng) {
                events.push(event);
            }
        }
        events
    }

    /// Schedule a propagating fire for every node of `region`, one per
    /// `stagger`. Returns the number scheduled.
    pub fn schedule_region(
        &self,
        graph: &GraphSnapshot,
        region: &str,
        stagger: Duration,
        now: Duration,
        scheduler: &mut Scheduler<TimerTask>,
    ) -> usize {
        let mut count = 0;
        for neuron in graph.neurons.iter().filter(|n| n.region == region) {
            scheduler.schedule_after(
                now,
                stagger * count as u32,
                TimerTask::Fire {
                    node: neuron.id.clone(),
                    propagate: true,
                },
            );
            count += 1;
        }
        count
    }

    /// A synapse rest timer fired
    pub fn on_synapse_rest(&mut self, index: usize, timer: TimerId, graph: &mut GraphSnapshot) {
        if self.edge_rest.get(&index) != Some(&timer) {
            return;
        }
        self.edge_rest.remove(&index);
        if let Some(synapse) = graph.synapses.get_mut(index) {
            synapse.active = false;
        }
    }

    /// A peak flash ended
    pub fn on_neuron_rest(&mut self, node: &str, timer: TimerId) {
        if self.flashing.get(node) == Some(&timer) {
            self.flashing.remove(node);
        }
    }

    /// Decay accumulators, age pulses and roll the fire-rate window
    pub fn advance(&mut self, now: Duration, dt: Duration) {
        let decay = self.config.heat_decay_per_sec * dt.as_secs_f32();
        self.accumulators.retain(|_, acc| {
            *acc = (*acc - decay).max(0.0);
            *acc > 0.0
        });

        let lifetime = Duration::from_millis(self.config.pulse_lifetime_ms);
        for pulse in &mut self.pulses {
            pulse.age += dt;
        }
        self.pulses.retain(|p| p.progress(lifetime) < 1.0);

        let elapsed = now.saturating_sub(self.window_start);
        if elapsed >= Duration::from_secs(1) {
            self.rate = self.window_fires as f32 / elapsed.as_secs_f32();
            self.window_fires = 0;
            self.window_start = now;
        }
    }

    /// Write displayed heat into the local graph
    pub fn write_heat(&self, graph: &mut GraphSnapshot) {
        for neuron in &mut graph.neurons {
            neuron.heat = self.heat(&neuron.id);
        }
    }

    /// Cancel every rest timer and forget all activation state, leaving
    /// `graph` cold with no active synapses
    pub fn reset(&mut self, graph: &mut GraphSnapshot, scheduler: &mut Scheduler<TimerTask>) {
        for (_, timer) in self.flashing.drain() {
            scheduler.cancel(timer);
        }
        for (index, timer) in self.edge_rest.drain() {
            scheduler.cancel(timer);
            if let Some(synapse) = graph.synapses.get_mut(index) {
                synapse.active = false;
            }
        }
        self.accumulators.clear();
        self.pulses.clear();
        self.write_heat(graph);
    }
}
