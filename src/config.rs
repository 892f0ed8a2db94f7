//! Runtime configuration
//!
//! Every field has a default, so an empty YAML file (or none at all) is a
//! valid configuration. CLI flags override individual fields after loading.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};
use crate::firing::FiringConfig;
use crate::palette::{AgentRegions, Palette};
use crate::relax::RelaxationConfig;
use crate::render::RenderLimits;

pub const DEFAULT_ENDPOINT: &str = "ws://localhost:8765/ws/brain";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveConfig {
    /// WebSocket URL of the live source
    pub endpoint: String,
    pub reconnect_delay_ms: u64,
    /// Request live mode at startup
    pub start_live: bool,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            reconnect_delay_ms: 3000,
            start_live: true,
        }
    }
}

/// Periods of the session's recurring tasks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub frame_hz: u32,
    pub ambient_ms: u64,
    pub relax_ms: u64,
    pub maintenance_ms: u64,
    pub activity_poll_ms: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            frame_hz: 60,
            ambient_ms: 150,
            relax_ms: 3000,
            maintenance_ms: 30_000,
            activity_poll_ms: 5000,
        }
    }
}

/// REST graph source and event sink
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Base URL of the REST tables; `None` means synthetic graph only
    pub url: Option<String>,
    pub api_key: Option<String>,
    /// Event sink endpoint; `None` disables notifications
    pub sink_url: Option<String>,
    pub timeout_ms: u64,
    /// Row limit for the neuron and synapse tables
    pub row_limit: usize,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            url: None,
            api_key: None,
            sink_url: None,
            timeout_ms: 3000,
            row_limit: 2000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 3000,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub live: LiveConfig,
    pub render: RenderLimits,
    pub simulation: SimulationConfig,
    pub firing: FiringConfig,
    pub relaxation: RelaxationConfig,
    pub source: SourceConfig,
    pub server: ServerConfig,
    pub palette: Palette,
    pub agents: AgentRegions,
    /// Seed for every random choice; `None` seeds from entropy
    pub seed: Option<u64>,
}

impl Config {
    pub fn from_yaml_str(text: &str) -> ConfigResult<Self> {
        // An empty document deserializes to null, not to an empty map
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Config = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> ConfigResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }

    /// Reject values that would stall or break the session
    pub fn validate(&self) -> ConfigResult<()> {
        let render = &self.render;
        if !(render.bounding_radius > 0.0) {
            return Err(invalid("render.bounding_radius must be positive"));
        }
        if render.batched_threshold == 0 {
            return Err(invalid("render.batched_threshold must be positive"));
        }
        if !(0.0..=1.0).contains(&render.particle_chance) {
            return Err(invalid("render.particle_chance must be within 0..=1"));
        }
        for (name, factor) in [
            ("render.discrete_smoothing", render.discrete_smoothing),
            ("render.batched_smoothing", render.batched_smoothing),
        ] {
            if !(factor > 0.0 && factor <= 1.0) {
                return Err(invalid(format!("{name} must be within (0, 1]")));
            }
        }

        let sim = &self.simulation;
        for (name, value) in [
            ("simulation.ambient_ms", sim.ambient_ms),
            ("simulation.relax_ms", sim.relax_ms),
            ("simulation.maintenance_ms", sim.maintenance_ms),
            ("simulation.activity_poll_ms", sim.activity_poll_ms),
            ("live.reconnect_delay_ms", self.live.reconnect_delay_ms),
        ] {
            if value == 0 {
                return Err(invalid(format!("{name} must be positive")));
            }
        }
        if sim.frame_hz == 0 {
            return Err(invalid("simulation.frame_hz must be positive"));
        }

        if self.firing.ambient_min > self.firing.ambient_max {
            return Err(invalid("firing.ambient_min exceeds firing.ambient_max"));
        }
        if !(self.firing.heat_saturation > 0.0) {
            return Err(invalid("firing.heat_saturation must be positive"));
        }
        if !(0.0..=1.0).contains(&self.firing.router_bias) {
            return Err(invalid("firing.router_bias must be within 0..=1"));
        }
        if !(self.relaxation.repulsion_radius > 0.0) {
            return Err(invalid("relaxation.repulsion_radius must be positive"));
        }
        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid(message.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_document_is_the_default() {
        assert_eq!(Config::from_yaml_str("").unwrap(), Config::default());
        assert_eq!(Config::from_yaml_str("{}").unwrap(), Config::default());
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let yaml = r#"
live:
  endpoint: ws://brain.example/ws
render:
  batched_threshold: 64
palette:
  cortex: { h: 0.1, s: 0.5, l: 0.5 }
agents:
  Scout: cortex
seed: 9
"#;
        let config = Config::from_yaml_str(yaml).unwrap();
        assert_eq!(config.live.endpoint, "ws://brain.example/ws");
        assert_eq!(config.live.reconnect_delay_ms, 3000);
        assert_eq!(config.render.batched_threshold, 64);
        assert_eq!(config.render.max_discrete_edges, 500);
        assert_eq!(config.palette.len(), 1);
        assert_eq!(config.agents.region_for("Scout"), Some("cortex"));
        assert_eq!(config.seed, Some(9));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let err = Config::from_yaml_str("render:\n  bounding_radius: 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
        assert!(err.to_string().contains("bounding_radius"));

        let err = Config::from_yaml_str("simulation:\n  relax_ms: 0\n").unwrap_err();
        assert!(err.to_string().contains("relax_ms"));

        let err = Config::from_yaml_str("firing:\n  ambient_min: 5\n").unwrap_err();
        assert!(err.to_string().contains("ambient_min"));
    }

    #[test]
    fn malformed_yaml_is_a_yaml_error() {
        assert!(matches!(
            Config::from_yaml_str("live: [unclosed"),
            Err(ConfigError::Yaml(_))
        ));
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "server:\n  port: 8081").unwrap();
        let config = Config::from_path(file.path()).unwrap();
        assert_eq!(config.server.port, 8081);
        assert!(config.server.enabled);
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            Config::from_path(&dir.path().join("absent.yaml")),
            Err(ConfigError::Io(_))
        ));
    }
}
