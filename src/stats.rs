//! Aggregate counts for the display surface

use std::fmt;

use serde::Serialize;

use crate::connection::ConnectionState;
use crate::mode::{Authority, Mode};
use crate::model::Metrics;
use crate::render::Strategy;

/// Read-only view of the session, published once per frame
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Stats {
    pub mode: Mode,
    pub authority: Authority,
    pub connection: ConnectionState,
    /// Layout of the visible set
    pub strategy: Strategy,
    pub nodes: usize,
    pub edges: usize,
    pub regions: usize,
    /// Fires per second, local simulation only
    pub fire_rate: f32,
    pub total_fires: u64,
    /// Average edge weight as a percentage
    pub connectivity: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub live_clients: Option<u64>,
    pub activity_events: u64,
    /// Buffer bytes handed to the renderer so far
    pub uploaded_bytes: u64,
    pub metrics: Metrics,
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "mode: {:?} ({:?}, {:?})",
            self.mode, self.authority, self.connection
        )?;
        writeln!(
            f,
            "graph: {} nodes, {} edges, {} regions [{:?}]",
            self.nodes, self.edges, self.regions, self.strategy
        )?;
        write!(
            f,
            "activity: {:.1} fires/s, {} total, {:.0}% connectivity",
            self.fire_rate, self.total_fires, self.connectivity
        )?;
        for (name, value) in &self.metrics {
            write!(f, "\n{name}: {value}")?;
        }
        Ok(())
    }
}
