//! Cascade behavior of the firing simulator on explicit graphs

use std::time::Duration;

use brainview::firing::{FiringConfig, FiringSimulator};
use brainview::model::{GraphSnapshot, Neuron, Synapse, Vec3};
use brainview::palette::Palette;
use brainview::render::{Builder, RenderLimits, RenderableSet, Strategy};
use brainview::scheduler::{Scheduler, TimerTask};
use rand::SeedableRng;
use rand::rngs::StdRng;

struct Bench {
    sim: FiringSimulator,
    graph: GraphSnapshot,
    set: RenderableSet,
    scheduler: Scheduler<TimerTask>,
    rng: StdRng,
}

impl Bench {
    fn new(graph: GraphSnapshot, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let set = Builder::new(&RenderLimits::default(), &Palette::default()).build(&graph, &mut rng);
        Self {
            sim: FiringSimulator::new(FiringConfig::default()),
            graph,
            set,
            scheduler: Scheduler::new(),
            rng,
        }
    }

    fn fire(&mut self, node: &str, propagate: bool) -> Option<usize> {
        self.sim
            .fire(
                node,
                propagate,
                &mut self.graph,
                &self.set,
                Duration::ZERO,
                &mut self.scheduler,
                &mut self.rng,
            )
            .map(|e| e.scheduled)
    }

    /// Run every pending task in due order. Returns the deferred fires as
    /// `(node, propagate)`.
    fn drain(&mut self) -> Vec<(String, bool)> {
        let mut fired = Vec::new();
        while let Some(due) = self.scheduler.next_due() {
            while let Some((id, task)) = self.scheduler.pop_due(due) {
                match task {
                    TimerTask::Fire { node, propagate } => {
                        self.sim.fire(
                            &node,
                            propagate,
                            &mut self.graph,
                            &self.set,
                            due,
                            &mut self.scheduler,
                            &mut self.rng,
                        );
                        fired.push((node, propagate));
                    }
                    TimerTask::SynapseRest { index } => {
                        self.sim.on_synapse_rest(index, id, &mut self.graph)
                    }
                    TimerTask::NeuronRest { node } => self.sim.on_neuron_rest(&node, id),
                    other => panic!("unexpected task {other:?}"),
                }
            }
        }
        fired
    }
}

fn node(id: &str, x: f32) -> Neuron {
    Neuron::new(id, Vec3::new(x, 0.0, 0.0), "cortex")
}

fn abc() -> GraphSnapshot {
    GraphSnapshot::new(
        vec![node("A", 0.0), node("B", 0.5), node("C", 1.0)],
        vec![Synapse::new("A", "B", 0.9), Synapse::new("B", "C", 0.1)],
    )
}

#[test]
fn a_b_c_cascade_stops_after_one_hop() {
    let trials = 1000;
    let (mut reached_b, mut reached_c) = (0, 0);

    for seed in 0..trials {
        let mut bench = Bench::new(abc(), seed);
        assert_eq!(bench.set.strategy(), Strategy::Discrete);

        bench.fire("A", true).unwrap();
        assert!(bench.graph.synapses[0].active);
        assert!(!bench.graph.synapses[1].active);

        for (node, propagate) in bench.drain() {
            assert!(!propagate, "hop fired with propagate=true");
            match node.as_str() {
                "B" => reached_b += 1,
                "C" => reached_c += 1,
                other => panic!("unexpected fire of {other}"),
            }
        }
        // Every activation has returned to rest
        assert!(bench.graph.synapses.iter().all(|s| !s.active));
        assert!(!bench.sim.is_flashing("A"));
    }

    // 0.9 × 0.35 per trial
    assert!((250..=380).contains(&reached_b), "B fired {reached_b} times");
    assert_eq!(reached_c, 0);
}

#[test]
fn hop_delay_grows_with_distance() {
    let graph = GraphSnapshot::new(
        vec![node("A", 0.0), node("near", 0.5), node("far", 2.5)],
        vec![Synapse::new("A", "near", 1.0), Synapse::new("A", "far", 1.0)],
    );

    // Find a seed where both hops are scheduled
    let mut bench = (0..500)
        .map(|seed| {
            let mut bench = Bench::new(graph.clone(), seed);
            let scheduled = bench.fire("A", true);
            (bench, scheduled)
        })
        .find(|(_, scheduled)| *scheduled == Some(2))
        .map(|(bench, _)| bench)
        .unwrap();

    let due = |bench: &Bench, target: &str| {
        bench
            .scheduler
            .pending_tasks()
            .find_map(|(due, task)| match task {
                TimerTask::Fire { node, .. } if node == target => Some(due),
                _ => None,
            })
            .unwrap()
    };
    // 40 + d × 80 ms
    assert_eq!(due(&bench, "near"), Duration::from_millis(80));
    assert_eq!(due(&bench, "far"), Duration::from_millis(240));
    bench.drain();
}

#[test]
fn fully_connected_graph_is_bounded_to_one_hop() {
    let n = 150;
    let neurons = (0..n)
        .map(|i| node(&format!("n{i}"), (i as f32 / n as f32) * 2.0))
        .collect();
    let mut synapses = Vec::new();
    for i in 0..n {
        for j in (i + 1)..n {
            synapses.push(Synapse::new(format!("n{i}"), format!("n{j}"), 1.0));
        }
    }
    let mut bench = Bench::new(GraphSnapshot::new(neurons, synapses), 21);

    let scheduled = bench.fire("n0", true).unwrap();
    assert!(scheduled > 0);
    let fired = bench.drain();

    assert_eq!(fired.len(), scheduled);
    assert!(fired.iter().all(|(_, propagate)| !propagate));
    assert!(bench.scheduler.is_empty());
    assert_eq!(bench.sim.total_fires(), 1 + scheduled as u64);
}

#[test]
fn ten_thousand_node_hub_is_bounded_to_one_hop() {
    let n = 10_000;
    let neurons = (0..n)
        .map(|i| node(&format!("n{i}"), (i % 100) as f32 * 0.02))
        .collect();
    let synapses = (1..n)
        .map(|i| Synapse::new("n0", format!("n{i}"), 1.0))
        .collect();
    let mut bench = Bench::new(GraphSnapshot::new(neurons, synapses), 8);
    assert_eq!(bench.set.strategy(), Strategy::Batched);

    let scheduled = bench.fire("n0", true).unwrap();
    // 0.35 per edge
    assert!((3000..=4000).contains(&scheduled), "scheduled {scheduled}");

    let fired = bench.drain();
    assert_eq!(fired.len(), scheduled);
    assert!(fired.iter().all(|(node, propagate)| node != "n0" && !propagate));
    assert_eq!(bench.sim.total_fires(), 1 + scheduled as u64);
}

#[test]
fn fire_without_propagation_schedules_nothing() {
    let mut bench = Bench::new(abc(), 1);
    assert_eq!(bench.fire("B", false), Some(0));
    // Both edges of B light up regardless
    assert!(bench.graph.synapses.iter().all(|s| s.active));
    assert!(bench.drain().is_empty());
}

#[test]
fn dangling_edges_never_fire_missing_nodes() {
    let graph = GraphSnapshot::new(
        vec![node("A", 0.0)],
        vec![Synapse::new("A", "ghost", 1.0)],
    );
    for seed in 0..50 {
        let mut bench = Bench::new(graph.clone(), seed);
        bench.fire("A", true).unwrap();
        // A hop toward a missing node may be scheduled but fires nothing
        bench.drain();
        assert_eq!(bench.sim.total_fires(), 1);
        assert_eq!(bench.fire("ghost", true), None);
    }
}
