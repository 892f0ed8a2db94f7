//! Session: the composition root of the synchronization core
//!
//! A `Session` owns every component and is driven entirely from outside:
//! events are queued with [`Session::enqueue`], commands are applied with
//! [`Session::handle_command`], and time advances through
//! [`Session::frame`] and [`Session::run_due`]. It never awaits and never
//! performs I/O; work for the outside world is collected as [`Effect`]s.

use std::collections::VecDeque;
use std::time::Duration;

use rand::SeedableRng;
use rand::rngs::StdRng;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::connection::{ConnectionManager, ConnectionState, DiscardReason, MessageOutcome, TransportCommand};
use crate::firing::FiringSimulator;
use crate::mode::{Authority, LiveScene, Mode, ModeArbitrator, SnapshotOutcome};
use crate::model::{GraphSnapshot, Metrics, NodeId, Region, Vec3};
use crate::relax::Relaxation;
use crate::render::{Builder, Reconciler, RenderableSet};
use crate::scheduler::{Scheduler, TimerTask};
use crate::sink::SinkAction;
use crate::source::{ActivityRecord, LoadedGraph};
use crate::stats::Stats;

/// Events produced by the live transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Opened { generation: u64 },
    Message { generation: u64, text: String },
    Closed { generation: u64 },
}

/// Inbound events, processed in arrival order at the next frame
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Transport(TransportEvent),
    /// Result of a [`Effect::RefreshPositions`]
    PositionsRefreshed(Vec<(NodeId, Vec3)>),
    /// Result of a [`Effect::PollActivity`]
    Activity(Vec<ActivityRecord>),
}

/// Requests from the display surface
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    ToggleMode,
    RequestLive,
    RequestDemo,
    /// Fire one node, propagating
    Fire(NodeId),
    /// Fire a whole region, staggered; `None` is the router region
    Cascade(Option<String>),
}

/// Work for the runtime
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Transport(TransportCommand),
    Notify { action: SinkAction, body: Value },
    RefreshPositions,
    PollActivity { cursor: Option<String> },
}

/// Local graph driven by the simulators
#[derive(Debug)]
pub struct DemoScene {
    pub regions: Vec<Region>,
    pub graph: GraphSnapshot,
    pub set: RenderableSet,
}

pub struct Session {
    config: Config,
    has_source: bool,
    now: Duration,
    last_frame: Option<Duration>,

    scheduler: Scheduler<TimerTask>,
    connection: ConnectionManager,
    arbitrator: ModeArbitrator,
    demo: DemoScene,
    firing: FiringSimulator,
    relaxation: Relaxation,
    rng: StdRng,

    inbox: VecDeque<SessionEvent>,
    effects: Vec<Effect>,

    activity_cursor: Option<String>,
    /// Set by the first poll, even an empty one. Records seen after it fire.
    activity_primed: bool,
    activity_events: u64,
    uploaded_bytes: u64,
    metrics: Metrics,
    live_clients: Option<u64>,
    discarded: u64,
}

impl Session {
    /// Build a session over `loaded`. `has_source` enables position
    /// refreshes and activity polling.
    pub fn new(mut config: Config, loaded: LoadedGraph, has_source: bool) -> Self {
        let LoadedGraph { regions, mut graph } = loaded;
        let radius = config.render.bounding_radius;
        graph.clamp_positions(radius);

        let unknown = config.palette.unknown_keys(&regions);
        if !unknown.is_empty() {
            warn!(keys = ?unknown, "palette names regions that do not exist");
        }
        let dropped = config.agents.retain_known(&regions);
        if !dropped.is_empty() {
            warn!(agents = ?dropped, "agents routed to unknown regions were dropped");
        }

        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let set = Builder::new(&config.render, &config.palette).build(&graph, &mut rng);

        Self {
            connection: ConnectionManager::new(
                config.live.endpoint.clone(),
                Duration::from_millis(config.live.reconnect_delay_ms),
            ),
            firing: FiringSimulator::new(config.firing.clone()),
            relaxation: Relaxation::new(config.relaxation.clone(), radius),
            has_source,
            now: Duration::ZERO,
            last_frame: None,
            scheduler: Scheduler::new(),
            arbitrator: ModeArbitrator::new(),
            demo: DemoScene { regions, graph, set },
            rng,
            inbox: VecDeque::new(),
            effects: Vec::new(),
            activity_cursor: None,
            activity_primed: false,
            uploaded_bytes: 0,
            activity_events: 0,
            metrics: Metrics::new(),
            live_clients: None,
            discarded: 0,
            config,
        }
    }

    /// Schedule the recurring tasks and, if configured, request live mode
    pub fn start(&mut self, now: Duration) {
        self.now = now;
        let sim = self.config.simulation.clone();
        self.scheduler
            .schedule_after(now, Duration::from_millis(sim.ambient_ms), TimerTask::AmbientFire);
        self.scheduler
            .schedule_after(now, Duration::from_millis(sim.relax_ms), TimerTask::Relax);
        self.scheduler
            .schedule_after(now, Duration::from_millis(sim.maintenance_ms), TimerTask::Maintenance);
        if self.has_source {
            // Establish the activity cursor right away
            self.effects.push(Effect::PollActivity { cursor: None });
            self.scheduler.schedule_after(
                now,
                Duration::from_millis(sim.activity_poll_ms),
                TimerTask::PollActivity,
            );
        }

        info!(
            nodes = self.demo.graph.node_count(),
            edges = self.demo.graph.edge_count(),
            regions = self.demo.regions.len(),
            strategy = ?self.demo.set.strategy(),
            "session started"
        );

        if self.config.live.start_live {
            self.handle_command(Command::RequestLive, now);
        }
    }

    pub fn enqueue(&mut self, event: SessionEvent) {
        self.inbox.push_back(event);
    }

    pub fn handle_command(&mut self, command: Command, now: Duration) {
        self.advance_clock(now);
        match command {
            Command::ToggleMode => {
                let next = if self.arbitrator.live_wanted() {
                    Command::RequestDemo
                } else {
                    Command::RequestLive
                };
                self.handle_command(next, now);
            }
            Command::RequestLive => {
                if let Some(cmd) = self
                    .arbitrator
                    .request_live(&mut self.connection, &mut self.scheduler)
                {
                    self.effects.push(Effect::Transport(cmd));
                }
            }
            Command::RequestDemo => {
                let (cmd, _) = self.arbitrator.request_demo(
                    &mut self.connection,
                    &mut self.scheduler,
                    &mut self.demo.set,
                );
                if let Some(cmd) = cmd {
                    self.effects.push(Effect::Transport(cmd));
                }
            }
            Command::Fire(node) => self.fire_node(&node, true),
            Command::Cascade(region) => {
                let region = region.unwrap_or_else(|| self.config.firing.router_region.clone());
                let count = self.firing.schedule_region(
                    &self.demo.graph,
                    &region,
                    Duration::from_millis(self.config.firing.cascade_stagger_ms),
                    self.now,
                    &mut self.scheduler,
                );
                debug!(region = %region, count, "region cascade scheduled");
            }
        }
    }

    /// One frame: queued events first, then due timers, then the local
    /// animation step
    pub fn frame(&mut self, now: Duration) {
        self.advance_clock(now);
        while let Some(event) = self.inbox.pop_front() {
            self.handle_event(event);
        }
        self.run_due(now);

        let dt = self
            .last_frame
            .map_or(Duration::ZERO, |last| now.saturating_sub(last));
        self.last_frame = Some(now);

        self.firing.advance(now, dt);
        let uploaded = match self.arbitrator.authority() {
            Authority::Local => {
                self.firing.write_heat(&mut self.demo.graph);
                Reconciler::new(&self.config.render, &self.config.palette)
                    .apply(&mut self.demo.set, &self.demo.graph);
                self.demo.set.advance_particles(dt, &mut self.rng);
                self.demo.set.take_upload_bytes()
            }
            Authority::Live => match self.arbitrator.live_set_mut() {
                Some(set) => {
                    set.advance_particles(dt, &mut self.rng);
                    set.take_upload_bytes()
                }
                None => 0,
            },
        };
        self.uploaded_bytes += uploaded as u64;
    }

    /// Run every timer task due at `now`
    pub fn run_due(&mut self, now: Duration) {
        self.advance_clock(now);
        while let Some((id, task)) = self.scheduler.pop_due(now) {
            match task {
                TimerTask::Reconnect => {
                    if let Some(cmd) = self.connection.on_reconnect_due(id, &mut self.scheduler) {
                        self.effects.push(Effect::Transport(cmd));
                    }
                }
                TimerTask::AmbientFire => {
                    if self.arbitrator.authority() == Authority::Local {
                        let events = self.firing.ambient(
                            &mut self.demo.graph,
                            &self.demo.set,
                            now,
                            &mut self.scheduler,
                            &mut self.rng,
                        );
                        for event in events {
                            self.notify_fire(&event.node, event.propagate);
                        }
                    }
                    self.reschedule(now, self.config.simulation.ambient_ms, TimerTask::AmbientFire);
                }
                TimerTask::Relax => {
                    if self.arbitrator.authority() == Authority::Local {
                        self.relaxation.step(&mut self.demo.graph, &self.demo.regions);
                        Reconciler::new(&self.config.render, &self.config.palette)
                            .rebuild_edges(&mut self.demo.set, &self.demo.graph);
                    }
                    self.reschedule(now, self.config.simulation.relax_ms, TimerTask::Relax);
                }
                TimerTask::Maintenance => {
                    self.effects.push(Effect::Notify {
                        action: SinkAction::Decay,
                        body: json!({}),
                    });
                    if self.has_source {
                        self.effects.push(Effect::RefreshPositions);
                    }
                    self.reschedule(now, self.config.simulation.maintenance_ms, TimerTask::Maintenance);
                }
                TimerTask::PollActivity => {
                    self.effects.push(Effect::PollActivity {
                        cursor: self.activity_cursor.clone(),
                    });
                    self.reschedule(now, self.config.simulation.activity_poll_ms, TimerTask::PollActivity);
                }
                TimerTask::Fire { node, propagate } => self.fire_node(&node, propagate),
                TimerTask::SynapseRest { index } => {
                    self.firing.on_synapse_rest(index, id, &mut self.demo.graph);
                }
                TimerTask::NeuronRest { node } => self.firing.on_neuron_rest(&node, id),
            }
        }
    }

    /// Earliest pending timer
    pub fn next_deadline(&mut self) -> Option<Duration> {
        self.scheduler.next_due()
    }

    pub fn drain_effects(&mut self) -> Vec<Effect> {
        std::mem::take(&mut self.effects)
    }

    pub fn stats(&self) -> Stats {
        let (graph, regions, strategy) = match self.arbitrator.live() {
            Some(live) => (&live.snapshot, live.snapshot.region_count(), live.strategy()),
            None => (&self.demo.graph, self.demo.regions.len(), self.demo.set.strategy()),
        };
        Stats {
            mode: self.arbitrator.mode(),
            authority: self.arbitrator.authority(),
            connection: self.connection.state(),
            strategy,
            nodes: graph.node_count(),
            edges: graph.edge_count(),
            regions,
            fire_rate: self.firing.fire_rate(),
            total_fires: self.firing.total_fires(),
            connectivity: graph.connectivity() * 100.0,
            live_clients: self.live_clients,
            activity_events: self.activity_events,
            uploaded_bytes: self.uploaded_bytes,
            metrics: self.metrics.clone(),
        }
    }

    pub fn mode(&self) -> Mode {
        self.arbitrator.mode()
    }

    pub fn authority(&self) -> Authority {
        self.arbitrator.authority()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    pub fn demo(&self) -> &DemoScene {
        &self.demo
    }

    pub fn live(&self) -> Option<&LiveScene> {
        self.arbitrator.live()
    }

    pub fn live_object_count(&self) -> usize {
        self.arbitrator.live_object_count()
    }

    pub fn firing(&self) -> &FiringSimulator {
        &self.firing
    }

    pub fn scheduler(&self) -> &Scheduler<TimerTask> {
        &self.scheduler
    }

    /// Messages dropped as stale, premature or malformed
    pub fn discarded(&self) -> u64 {
        self.discarded
    }

    pub fn activity_cursor(&self) -> Option<&str> {
        self.activity_cursor.as_deref()
    }

    fn advance_clock(&mut self, now: Duration) {
        self.now = self.now.max(now);
    }

    fn reschedule(&mut self, now: Duration, period_ms: u64, task: TimerTask) {
        self.scheduler
            .schedule_after(now, Duration::from_millis(period_ms), task);
    }

    fn handle_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Transport(event) => self.handle_transport(event),
            SessionEvent::PositionsRefreshed(positions) => self.apply_positions(positions),
            SessionEvent::Activity(records) => self.apply_activity(records),
        }
    }

    fn handle_transport(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Opened { generation } => {
                self.connection.on_open(generation);
            }
            TransportEvent::Message { generation, text } => {
                match self.connection.on_message(generation, &text) {
                    MessageOutcome::Snapshot(snapshot) => self.apply_snapshot(snapshot),
                    MessageOutcome::Heartbeat { clients } => self.live_clients = Some(clients),
                    MessageOutcome::Discarded(reason) => {
                        if let DiscardReason::Stale = reason {
                            debug!(generation, "stale message dropped");
                        }
                        self.discarded += 1;
                    }
                }
            }
            TransportEvent::Closed { generation } => {
                if self
                    .connection
                    .on_close(generation, self.now, &mut self.scheduler)
                {
                    self.live_clients = None;
                    self.arbitrator.on_disconnect(&mut self.demo.set);
                }
            }
        }
    }

    fn apply_snapshot(&mut self, snapshot: GraphSnapshot) {
        // Last write wins per metric
        self.metrics
            .extend(snapshot.metrics.iter().map(|(k, v)| (k.clone(), *v)));

        let builder = Builder::new(&self.config.render, &self.config.palette);
        let reconciler = Reconciler::new(&self.config.render, &self.config.palette);
        let outcome = self.arbitrator.on_snapshot(
            snapshot,
            &mut self.demo.set,
            &builder,
            &reconciler,
            &mut self.rng,
        );
        if let SnapshotOutcome::Built { strategy, nodes } = outcome {
            info!(?strategy, nodes, "live baseline received");
            // The hidden demo stops animating until local authority returns
            self.firing.reset(&mut self.demo.graph, &mut self.scheduler);
        }
    }

    fn apply_positions(&mut self, positions: Vec<(NodeId, Vec3)>) {
        let radius = self.config.render.bounding_radius;
        let index: std::collections::HashMap<NodeId, usize> = self
            .demo
            .graph
            .neurons
            .iter()
            .enumerate()
            .map(|(i, n)| (n.id.clone(), i))
            .collect();

        let mut moved = 0;
        for (id, position) in positions {
            if let Some(&i) = index.get(&id) {
                self.demo.graph.neurons[i].position = position.clamp_to_radius(radius);
                moved += 1;
            }
        }
        Reconciler::new(&self.config.render, &self.config.palette)
            .rebuild_edges(&mut self.demo.set, &self.demo.graph);
        debug!(moved, "node positions refreshed");
    }

    fn apply_activity(&mut self, records: Vec<ActivityRecord>) {
        let first_poll = !self.activity_primed;
        self.activity_primed = true;
        let Some(newest) = records.first() else {
            if first_poll {
                debug!("activity log empty, cursor established");
            }
            return;
        };
        self.activity_cursor = Some(newest.created_at.clone());
        if first_poll {
            debug!(cursor = %newest.created_at, "activity cursor established");
            return;
        }

        self.activity_events += records.len() as u64;
        let stagger = Duration::from_millis(self.config.firing.activity_stagger_ms);
        for record in &records {
            let Some(region) = self.config.agents.region_for(&record.agent_name) else {
                debug!(agent = %record.agent_name, "activity from unmapped agent skipped");
                continue;
            };
            let count = self.firing.schedule_region(
                &self.demo.graph,
                region,
                stagger,
                self.now,
                &mut self.scheduler,
            );
            debug!(agent = %record.agent_name, region, count, "agent activity");
        }
    }

    fn fire_node(&mut self, node: &str, propagate: bool) {
        if self.arbitrator.authority() == Authority::Live {
            debug!(node, "fire ignored under live authority");
            return;
        }
        let fired = self.firing.fire(
            node,
            propagate,
            &mut self.demo.graph,
            &self.demo.set,
            self.now,
            &mut self.scheduler,
            &mut self.rng,
        );
        if fired.is_some() {
            self.notify_fire(node, propagate);
        }
    }

    fn notify_fire(&mut self, node: &str, propagate: bool) {
        self.effects.push(Effect::Notify {
            action: SinkAction::Fire,
            body: json!({ "neuron_id": node, "propagate": propagate }),
        });
    }
}
