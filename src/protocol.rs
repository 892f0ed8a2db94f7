//! Live wire protocol
//!
//! Inbound messages are JSON objects tagged by `type`:
//!
//! ```json
//! {"type": "state", "neurons": [...], "synapses": [...], "metrics": {...}}
//! {"type": "heartbeat", "clients": 3}
//! ```
//!
//! Node IDs may arrive as strings or numbers. Synapse endpoints are accepted
//! under `source`/`target` or `from`/`to`.

use serde::{Deserialize, Deserializer};

use crate::error::ProtocolError;
use crate::model::{
    GraphSnapshot, Metrics, Neuron, NodeId, Synapse, Vec3, finite_or_zero, sanitize_unit,
};

/// A decoded inbound message
#[derive(Debug, Clone, PartialEq)]
pub enum LiveMessage {
    /// Full graph state
    State(GraphSnapshot),
    /// Diagnostic keep-alive, carries no graph state
    Heartbeat { clients: u64 },
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Deserialize)]
struct StatePayload {
    neurons: Vec<WireNeuron>,
    #[serde(default)]
    synapses: Vec<WireSynapse>,
    #[serde(default, deserialize_with = "numeric_metrics")]
    metrics: Metrics,
}

#[derive(Deserialize)]
struct HeartbeatPayload {
    #[serde(default)]
    clients: u64,
}

#[derive(Deserialize)]
struct WireNeuron {
    #[serde(deserialize_with = "node_id")]
    id: NodeId,
    #[serde(default)]
    x: f32,
    #[serde(default)]
    y: f32,
    #[serde(default)]
    z: f32,
    #[serde(default)]
    region: String,
    #[serde(default)]
    heat: Option<f32>,
    #[serde(default)]
    label: Option<String>,
}

#[derive(Deserialize)]
struct WireSynapse {
    #[serde(alias = "from", deserialize_with = "node_id")]
    source: NodeId,
    #[serde(alias = "to", deserialize_with = "node_id")]
    target: NodeId,
    #[serde(default)]
    weight: f32,
    #[serde(default)]
    active: bool,
}

impl From<WireNeuron> for Neuron {
    fn from(w: WireNeuron) -> Self {
        Neuron {
            id: w.id,
            position: Vec3::new(
                finite_or_zero(w.x),
                finite_or_zero(w.y),
                finite_or_zero(w.z),
            ),
            region: w.region,
            heat: sanitize_unit(w.heat.unwrap_or(0.0)),
            label: w.label,
        }
    }
}

impl From<WireSynapse> for Synapse {
    fn from(w: WireSynapse) -> Self {
        Synapse {
            source: w.source,
            target: w.target,
            weight: finite_or_zero(w.weight),
            active: w.active,
        }
    }
}

/// Decode one text frame
pub fn parse_message(text: &str) -> Result<LiveMessage, ProtocolError> {
    let value: serde_json::Value = serde_json::from_str(text)?;
    let envelope = Envelope::deserialize(&value)?;

    match envelope.kind.as_str() {
        "state" => {
            let payload = StatePayload::deserialize(&value)?;
            Ok(LiveMessage::State(GraphSnapshot {
                neurons: payload.neurons.into_iter().map(Neuron::from).collect(),
                synapses: payload.synapses.into_iter().map(Synapse::from).collect(),
                metrics: payload.metrics,
            }))
        }
        "heartbeat" => {
            let payload = HeartbeatPayload::deserialize(&value)?;
            Ok(LiveMessage::Heartbeat {
                clients: payload.clients,
            })
        }
        other => Err(ProtocolError::UnknownType(other.to_string())),
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Integer(i64),
    Float(f64),
}

fn node_id<'de, D>(deserializer: D) -> Result<NodeId, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(s) => s,
        RawId::Integer(i) => i.to_string(),
        RawId::Float(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => (f as i64).to_string(),
        RawId::Float(f) => f.to_string(),
    })
}

/// Keep numeric metrics, silently dropping anything else
fn numeric_metrics<'de, D>(deserializer: D) -> Result<Metrics, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<serde_json::Map<String, serde_json::Value>>::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .filter_map(|(k, v)| v.as_f64().map(|n| (k, n)))
        .collect())
}
