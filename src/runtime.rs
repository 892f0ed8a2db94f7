//! Composition root and event loop
//!
//! Builds the collaborators, hands them to a [`Session`], then multiplexes
//! the frame tick, the session's next timer deadline, transport and source
//! events, and display commands on a single task. Effects are executed on
//! spawned tasks whose results come back through the event channel.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::FailureClass;
use crate::server::{self, AppState};
use crate::session::{Command, Effect, Session, SessionEvent};
use crate::sink::{EventSink, NullSink, RestSink};
use crate::source::{GraphSource, RestSource, load_or_synthetic};
use crate::transport::Transport;

/// Runs effects against the outside world
pub struct Executor {
    transport: Transport,
    sink: Arc<dyn EventSink>,
    source: Option<Arc<dyn GraphSource>>,
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl Executor {
    pub fn new(
        sink: Arc<dyn EventSink>,
        source: Option<Arc<dyn GraphSource>>,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> Self {
        Self {
            transport: Transport::new(events.clone()),
            sink,
            source,
            events,
        }
    }

    pub fn execute(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Transport(command) => self.transport.execute(command),
                Effect::Notify { action, body } => {
                    let sink = Arc::clone(&self.sink);
                    tokio::spawn(async move {
                        if let Err(e) = sink.notify(action, &body).await {
                            debug!(action = action.as_str(), error = %e, "sink notification failed");
                        }
                    });
                }
                Effect::RefreshPositions => {
                    let Some(source) = self.source.clone() else { continue };
                    let events = self.events.clone();
                    tokio::spawn(async move {
                        match source.positions().await {
                            Ok(positions) => {
                                let _ = events.send(SessionEvent::PositionsRefreshed(positions));
                            }
                            Err(e) => warn!(error = %e, "position refresh failed, keeping current layout"),
                        }
                    });
                }
                Effect::PollActivity { cursor } => {
                    let Some(source) = self.source.clone() else { continue };
                    let events = self.events.clone();
                    tokio::spawn(async move {
                        match source.activity_since(cursor.as_deref()).await {
                            Ok(records) => {
                                let _ = events.send(SessionEvent::Activity(records));
                            }
                            Err(e) => debug!(error = %e, "activity poll failed"),
                        }
                    });
                }
            }
        }
    }

    pub fn shutdown(&mut self) {
        self.transport.shutdown();
    }
}

/// Run until Ctrl-C
pub async fn run(config: Config) -> anyhow::Result<()> {
    run_until(config, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    })
    .await
}

/// Run until `shutdown` completes
pub async fn run_until(config: Config, shutdown: impl Future<Output = ()>) -> anyhow::Result<()> {
    config.validate()?;

    let source: Option<Arc<dyn GraphSource>> = match config.source.url {
        Some(_) => match RestSource::new(&config.source) {
            Ok(source) => Some(Arc::new(source)),
            Err(e) => {
                warn!(error = %e, recovery = ?e.recovery(), "graph source unavailable");
                None
            }
        },
        None => None,
    };
    let sink = build_sink(&config);

    let seed = config.seed.unwrap_or_else(rand::random);
    let loaded = load_or_synthetic(source.clone(), seed, config.render.bounding_radius).await;
    let mut session = Session::new(config.clone(), loaded, source.is_some());

    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    let (command_tx, mut command_rx) = mpsc::channel::<Command>(64);
    let (stats_tx, stats_rx) = watch::channel(session.stats());

    if config.server.enabled {
        let state = AppState {
            commands: command_tx.clone(),
            stats: stats_rx,
        };
        let port = config.server.port;
        tokio::spawn(async move {
            if let Err(e) = server::serve(port, state).await {
                let class = FailureClass::Initialization;
                warn!(port, error = %e, recovery = ?class.recovery(), "display surface unavailable, continuing without it");
            }
        });
    }
    // Keep the channel open when the surface is disabled
    let _commands = command_tx;

    let mut executor = Executor::new(sink, source, event_tx);
    let clock = Instant::now();
    session.start(Duration::ZERO);
    executor.execute(session.drain_effects());

    let period = Duration::from_secs_f64(1.0 / f64::from(config.simulation.frame_hz));
    let mut frames = tokio::time::interval(period);
    frames.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tokio::pin!(shutdown);
    loop {
        let deadline = session.next_deadline();
        let timer = async move {
            match deadline {
                Some(due) => tokio::time::sleep_until(clock + due).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            _ = frames.tick() => {
                session.frame(clock.elapsed());
                stats_tx.send_replace(session.stats());
            }
            _ = timer => session.run_due(clock.elapsed()),
            Some(event) = event_rx.recv() => session.enqueue(event),
            Some(command) = command_rx.recv() => session.handle_command(command, clock.elapsed()),
            _ = &mut shutdown => break,
        }
        executor.execute(session.drain_effects());
    }

    info!(total_fires = session.firing().total_fires(), "shutting down");
    executor.shutdown();
    Ok(())
}

fn build_sink(config: &Config) -> Arc<dyn EventSink> {
    let Some(url) = &config.source.sink_url else {
        return Arc::new(NullSink);
    };
    match RestSink::new(url.clone(), Duration::from_millis(config.source.timeout_ms)) {
        Ok(sink) => Arc::new(sink),
        Err(e) => {
            warn!(error = %e, "event sink unavailable, notifications disabled");
            Arc::new(NullSink)
        }
    }
}
