//! Graph data source
//!
//! A read-only REST store exposing `brain_regions`, `neurons`, `synapses`
//! and `agent_activity_log` tables. Every query has a short timeout; any
//! failure, or a store with no regions, falls back to the synthetic graph.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::SeedableRng;
use rand::rngs::StdRng;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::config::SourceConfig;
use crate::error::{SourceError, SourceResult};
use crate::model::{
    GraphSnapshot, Neuron, NodeId, Region, Synapse, Vec3, finite_or_zero, sanitize_unit,
};
use crate::synthetic;

/// Static regions plus the initial graph
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadedGraph {
    pub regions: Vec<Region>,
    pub graph: GraphSnapshot,
}

/// One row of the agent activity log
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ActivityRecord {
    pub agent_name: String,
    /// Opaque ordering cursor (an ISO timestamp in practice)
    pub created_at: String,
    #[serde(default)]
    pub event: Option<String>,
}

#[async_trait]
pub trait GraphSource: Send + Sync {
    /// Regions, nodes and synapses
    async fn load(&self) -> SourceResult<LoadedGraph>;

    /// Current node positions
    async fn positions(&self) -> SourceResult<Vec<(NodeId, Vec3)>>;

    /// Activity newer than `cursor`, newest first. Without a cursor only the
    /// newest record is returned, to establish one.
    async fn activity_since(&self, cursor: Option<&str>) -> SourceResult<Vec<ActivityRecord>>;
}

#[derive(Deserialize)]
struct RegionRow {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    center_x: f32,
    #[serde(default)]
    center_y: f32,
    #[serde(default)]
    center_z: f32,
    #[serde(default = "default_region_radius")]
    radius: f32,
    #[serde(default)]
    description: Option<String>,
}

fn default_region_radius() -> f32 {
    1.0
}

#[derive(Deserialize)]
struct NeuronRow {
    id: String,
    #[serde(default)]
    region_id: String,
    #[serde(default)]
    label: Option<String>,
    #[serde(default)]
    pos_x: f32,
    #[serde(default)]
    pos_y: f32,
    #[serde(default)]
    pos_z: f32,
    #[serde(default)]
    activation: Option<f32>,
}

#[derive(Deserialize)]
struct SynapseRow {
    source_neuron_id: String,
    target_neuron_id: String,
    #[serde(default)]
    weight: Option<f32>,
}

#[derive(Deserialize)]
struct PositionRow {
    id: String,
    #[serde(default)]
    pos_x: f32,
    #[serde(default)]
    pos_y: f32,
    #[serde(default)]
    pos_z: f32,
}

impl From<RegionRow> for Region {
    fn from(row: RegionRow) -> Self {
        let name = if row.name.is_empty() { row.id.clone() } else { row.name };
        Region {
            id: row.id,
            name,
            center: Vec3::new(row.center_x, row.center_y, row.center_z),
            radius: row.radius,
            description: row.description.unwrap_or_default(),
        }
    }
}

impl From<NeuronRow> for Neuron {
    fn from(row: NeuronRow) -> Self {
        Neuron {
            id: row.id,
            position: Vec3::new(
                finite_or_zero(row.pos_x),
                finite_or_zero(row.pos_y),
                finite_or_zero(row.pos_z),
            ),
            region: row.region_id,
            heat: sanitize_unit(row.activation.unwrap_or(0.0)),
            label: row.label,
        }
    }
}

impl From<SynapseRow> for Synapse {
    fn from(row: SynapseRow) -> Self {
        Synapse::new(row.source_neuron_id, row.target_neuron_id, row.weight.unwrap_or(0.0))
    }
}

/// REST-backed source
pub struct RestSource {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    row_limit: usize,
}

impl RestSource {
    pub fn new(config: &SourceConfig) -> SourceResult<Self> {
        let base_url = config.url.clone().ok_or(SourceError::Unconfigured)?;
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            row_limit: config.row_limit,
        })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{table}", self.base_url)
    }

    async fn query<T: DeserializeOwned>(&self, table: &str, params: &[(&str, String)]) -> SourceResult<Vec<T>> {
        let mut request = self.client.get(self.table_url(table)).query(params);
        if let Some(key) = &self.api_key {
            request = request
                .header("apikey", key)
                .header("Authorization", format!("Bearer {key}"));
        }
        let rows = request.send().await?.error_for_status()?.json::<Vec<T>>().await?;
        debug!(table, rows = rows.len(), "source query");
        Ok(rows)
    }
}

#[async_trait]
impl GraphSource for RestSource {
    async fn load(&self) -> SourceResult<LoadedGraph> {
        let all = [("select", "*".to_string())];
        let limited = [("select", "*".to_string()), ("limit", self.row_limit.to_string())];

        let (regions, neurons, synapses) = tokio::try_join!(
            self.query::<RegionRow>("brain_regions", &all),
            self.query::<NeuronRow>("neurons", &limited),
            self.query::<SynapseRow>("synapses", &limited),
        )?;
        if regions.is_empty() {
            return Err(SourceError::Empty("regions"));
        }

        Ok(LoadedGraph {
            regions: regions.into_iter().map(Region::from).collect(),
            graph: GraphSnapshot::new(
                neurons.into_iter().map(Neuron::from).collect(),
                synapses.into_iter().map(Synapse::from).collect(),
            ),
        })
    }

    async fn positions(&self) -> SourceResult<Vec<(NodeId, Vec3)>> {
        let rows: Vec<PositionRow> = self
            .query("neurons", &[("select", "id,pos_x,pos_y,pos_z".to_string())])
            .await?;
        Ok(rows
            .into_iter()
            .map(|r| {
                let position = Vec3::new(
                    finite_or_zero(r.pos_x),
                    finite_or_zero(r.pos_y),
                    finite_or_zero(r.pos_z),
                );
                (r.id, position)
            })
            .collect())
    }

    async fn activity_since(&self, cursor: Option<&str>) -> SourceResult<Vec<ActivityRecord>> {
        let mut params = vec![
            ("select", "*".to_string()),
            ("order", "created_at.desc".to_string()),
        ];
        match cursor {
            Some(cursor) => {
                params.push(("created_at", format!("gt.{cursor}")));
                params.push(("limit", "10".to_string()));
            }
            None => params.push(("limit", "1".to_string())),
        }
        self.query("agent_activity_log", &params).await
    }
}

/// Load from `source`, falling back to the synthetic graph on any failure
pub async fn load_or_synthetic(
    source: Option<Arc<dyn GraphSource>>,
    seed: u64,
    bounding_radius: f32,
) -> LoadedGraph {
    if let Some(source) = source {
        match source.load().await {
            Ok(loaded) => {
                info!(
                    regions = loaded.regions.len(),
                    nodes = loaded.graph.node_count(),
                    edges = loaded.graph.edge_count(),
                    "graph loaded from source"
                );
                return loaded;
            }
            Err(e) => warn!(error = %e, recovery = ?e.recovery(), "graph source failed, using synthetic graph"),
        }
    }
    let mut rng = StdRng::seed_from_u64(seed);
    synthetic::generate(&mut rng, bounding_radius)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Failing;

    #[async_trait]
    impl GraphSource for Failing {
        async fn load(&self) -> SourceResult<LoadedGraph> {
            Err(SourceError::Empty("regions"))
        }
        async fn positions(&self) -> SourceResult<Vec<(NodeId, Vec3)>> {
            Err(SourceError::Unconfigured)
        }
        async fn activity_since(&self, _: Option<&str>) -> SourceResult<Vec<ActivityRecord>> {
            Ok(vec![])
        }
    }

    #[tokio::test]
    async fn failing_source_falls_back_to_synthetic() {
        let loaded = load_or_synthetic(Some(Arc::new(Failing)), 1, 2.7).await;
        assert_eq!(loaded.regions.len(), 12);
        assert_eq!(loaded.graph.node_count(), 48);
    }

    #[tokio::test]
    async fn no_source_is_synthetic() {
        let loaded = load_or_synthetic(None, 1, 2.7).await;
        assert_eq!(loaded.graph.node_count(), 48);
    }

    #[test]
    fn rest_source_requires_a_url() {
        assert!(matches!(
            RestSource::new(&SourceConfig::default()),
            Err(SourceError::Unconfigured)
        ));
    }

    #[tokio::test]
    async fn unreachable_store_is_a_source_error() {
        let config = SourceConfig {
            url: Some("http://127.0.0.1:9/".to_string()),
            timeout_ms: 500,
            ..SourceConfig::default()
        };
        let source = RestSource::new(&config).unwrap();
        assert_eq!(source.table_url("neurons"), "http://127.0.0.1:9/rest/v1/neurons");
        assert!(matches!(source.load().await, Err(SourceError::Http(_))));
    }

    #[test]
    fn rows_decode_into_the_model() {
        let region: RegionRow =
            serde_json::from_str(r#"{"id":"thalamus","center_x":0.5,"radius":0.6}"#).unwrap();
        let region = Region::from(region);
        assert_eq!(region.name, "thalamus");
        assert_eq!(region.center, Vec3::new(0.5, 0.0, 0.0));

        let neuron: NeuronRow = serde_json::from_str(
            r#"{"id":"n1","region_id":"thalamus","pos_x":1,"pos_y":2,"pos_z":3,"activation":2.5,"label":"Router"}"#,
        )
        .unwrap();
        let neuron = Neuron::from(neuron);
        assert_eq!(neuron.heat, 1.0);
        assert_eq!(neuron.label.as_deref(), Some("Router"));

        let synapse: SynapseRow =
            serde_json::from_str(r#"{"source_neuron_id":"a","target_neuron_id":"b","weight":null}"#).unwrap();
        assert_eq!(Synapse::from(synapse).weight, 0.0);
    }
}
