//! Demo/Live authority
//!
//! Exactly one authority drives the visible scene. Under local authority the
//! demo graph and its simulators do; under live authority the live set,
//! built from the first live snapshot, does. The demo set is hidden while
//! live, never destroyed, so falling back is instant.

use rand::Rng;
use serde::Serialize;
use tracing::{debug, info};

use crate::connection::{ConnectionManager, TransportCommand};
use crate::model::GraphSnapshot;
use crate::render::{ApplyReport, Builder, Reconciler, ReleaseReport, RenderableSet, Strategy};
use crate::scheduler::{Scheduler, TimerTask};

/// What the user asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Demo,
    Live,
}

/// Who currently drives the visible scene
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Authority {
    Local,
    Live,
}

/// Live renderable set and bookkeeping, alive between the first live
/// snapshot and the next disconnect or switch to demo
#[derive(Debug)]
pub struct LiveScene {
    pub set: RenderableSet,
    pub snapshot: GraphSnapshot,
    pub applied: u64,
}

impl LiveScene {
    pub fn strategy(&self) -> Strategy {
        self.set.strategy()
    }
}

/// What happened to a snapshot handed to the arbitrator
#[derive(Debug, Clone, PartialEq)]
pub enum SnapshotOutcome {
    /// Live not wanted; nothing changed
    Discarded,
    /// First snapshot of a live session: demo hidden, live set built
    Built { strategy: Strategy, nodes: usize },
    /// Applied to the existing live set
    Applied(ApplyReport),
}

#[derive(Debug, Default)]
pub struct ModeArbitrator {
    live_wanted: bool,
    live: Option<LiveScene>,
}

impl ModeArbitrator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> Mode {
        if self.live_wanted { Mode::Live } else { Mode::Demo }
    }

    pub fn authority(&self) -> Authority {
        if self.live.is_some() {
            Authority::Live
        } else {
            Authority::Local
        }
    }

    pub fn live_wanted(&self) -> bool {
        self.live_wanted
    }

    pub fn live(&self) -> Option<&LiveScene> {
        self.live.as_ref()
    }

    pub fn live_set_mut(&mut self) -> Option<&mut RenderableSet> {
        self.live.as_mut().map(|l| &mut l.set)
    }

    /// Objects owned by the live set, 0 when there is none
    pub fn live_object_count(&self) -> usize {
        self.live.as_ref().map_or(0, |l| l.set.object_count())
    }

    /// Demo → Live. The live set is only built once a snapshot arrives.
    pub fn request_live(
        &mut self,
        connection: &mut ConnectionManager,
        scheduler: &mut Scheduler<TimerTask>,
    ) -> Option<TransportCommand> {
        if !self.live_wanted {
            info!("switching to live mode");
        }
        self.live_wanted = true;
        connection.connect(scheduler)
    }

    /// Live → Demo: close the connection, release the live set and show the
    /// demo set again
    pub fn request_demo(
        &mut self,
        connection: &mut ConnectionManager,
        scheduler: &mut Scheduler<TimerTask>,
        demo: &mut RenderableSet,
    ) -> (Option<TransportCommand>, Option<ReleaseReport>) {
        if self.live_wanted {
            info!("switching to demo mode");
        }
        self.live_wanted = false;
        let command = connection.close(scheduler);
        let released = self.release_live(demo);
        (command, released)
    }

    /// The live connection dropped. Live stays wanted so the reconnect
    /// resumes with a fresh baseline.
    pub fn on_disconnect(&mut self, demo: &mut RenderableSet) -> Option<ReleaseReport> {
        let released = self.release_live(demo);
        if released.is_some() {
            info!("live source lost, demo scene restored");
        }
        released
    }

    pub fn on_snapshot<R: Rng>(
        &mut self,
        snapshot: GraphSnapshot,
        demo: &mut RenderableSet,
        builder: &Builder<'_>,
        reconciler: &Reconciler<'_>,
        rng: &mut R,
    ) -> SnapshotOutcome {
        if !self.live_wanted {
            debug!("snapshot discarded, live mode not requested");
            return SnapshotOutcome::Discarded;
        }

        match &mut self.live {
            Some(live) => {
                let report = reconciler.apply(&mut live.set, &snapshot);
                live.snapshot = snapshot;
                live.applied += 1;
                SnapshotOutcome::Applied(report)
            }
            None => {
                demo.set_visible(false);
                let set = builder.build(&snapshot, rng);
                let outcome = SnapshotOutcome::Built {
                    strategy: set.strategy(),
                    nodes: set.node_count(),
                };
                self.live = Some(LiveScene {
                    set,
                    snapshot,
                    applied: 0,
                });
                outcome
            }
        }
    }

    fn release_live(&mut self, demo: &mut RenderableSet) -> Option<ReleaseReport> {
        let released = self.live.take().map(|live| live.set.release());
        if let Some(report) = &released {
            debug!(
                objects = report.objects,
                buffers = report.buffers,
                "live set released"
            );
        }
        demo.set_visible(true);
        released
    }
}
