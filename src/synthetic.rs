//! Synthetic fallback graph
//!
//! Used whenever the graph source is unconfigured, unreachable or empty:
//! twelve fixed regions with four nodes each, placed around the region
//! centroid and fully connected within their region.

use rand::Rng;

use crate::model::{GraphSnapshot, Neuron, Region, Synapse, Vec3};
use crate::source::LoadedGraph;

struct RegionDef {
    id: &'static str,
    name: &'static str,
    center: [f32; 3],
    radius: f32,
    description: &'static str,
    labels: [&'static str; 4],
}

const REGIONS: [RegionDef; 12] = [
    RegionDef {
        id: "prefrontal",
        name: "Prefrontal Cortex",
        center: [0.0, 1.8, 2.2],
        radius: 1.2,
        description: "Planning, strategy",
        labels: ["Quarterly strategy", "Resource allocation", "Risk assessment", "Product priorities"],
    },
    RegionDef {
        id: "frontal",
        name: "Frontal Lobe",
        center: [0.0, 1.5, 1.0],
        radius: 1.4,
        description: "Execution, language",
        labels: ["Task delegation", "Agent coordination", "Workflow tuning", "Sprint planning"],
    },
    RegionDef {
        id: "temporal_left",
        name: "Left Temporal",
        center: [-2.0, -0.5, 0.0],
        radius: 1.1,
        description: "Language, communication",
        labels: ["Mail patterns", "Social content", "Technical docs", "Market messaging"],
    },
    RegionDef {
        id: "temporal_right",
        name: "Right Temporal",
        center: [2.0, -0.5, 0.0],
        radius: 1.1,
        description: "Patterns, analysis",
        labels: ["Revenue patterns", "Lead sources", "Churn signal", "Upsell timing"],
    },
    RegionDef {
        id: "parietal",
        name: "Parietal Lobe",
        center: [0.0, 1.6, -0.8],
        radius: 1.3,
        description: "Integration",
        labels: ["Cross-agent sync", "API map", "Event pipeline", "Data consistency"],
    },
    RegionDef {
        id: "occipital",
        name: "Occipital Lobe",
        center: [0.0, 0.5, -2.2],
        radius: 1.0,
        description: "Visualization",
        labels: ["Scene rendering", "Dashboard KPIs", "Graph view", "Report generator"],
    },
    RegionDef {
        id: "thalamus",
        name: "Thalamus",
        center: [0.0, 0.0, 0.0],
        radius: 0.6,
        description: "Signal router",
        labels: ["Task router", "Capability matcher", "Message bus", "Load balancer"],
    },
    RegionDef {
        id: "hippocampus",
        name: "Hippocampus",
        center: [0.0, -0.3, -0.3],
        radius: 0.5,
        description: "Memory",
        labels: ["Interaction history", "Deal patterns", "Performance log", "Knowledge index"],
    },
    RegionDef {
        id: "amygdala",
        name: "Amygdala",
        center: [0.0, -0.5, 0.3],
        radius: 0.4,
        description: "Risk assessment",
        labels: ["Deadline alerts", "Budget overrun", "Security threat", "Churn risk"],
    },
    RegionDef {
        id: "cerebellum",
        name: "Cerebellum",
        center: [0.0, -1.5, -2.0],
        radius: 1.2,
        description: "Optimization",
        labels: ["Query performance", "Cache tuning", "Token costs", "Prompt efficiency"],
    },
    RegionDef {
        id: "brainstem",
        name: "Brainstem",
        center: [0.0, -2.0, -1.0],
        radius: 0.5,
        description: "Infrastructure",
        labels: ["Database link", "CI runner", "DNS health", "Certificate monitor"],
    },
    RegionDef {
        id: "motor_cortex",
        name: "Motor Cortex",
        center: [0.0, 2.0, 0.0],
        radius: 1.0,
        description: "Actions",
        labels: ["API executor", "File deploy", "Migration runner", "Webhook dispatcher"],
    },
];

/// The twelve fixed regions
pub fn regions() -> Vec<Region> {
    REGIONS
        .iter()
        .map(|def| Region {
            id: def.id.to_string(),
            name: def.name.to_string(),
            center: Vec3::from(def.center),
            radius: def.radius,
            description: def.description.to_string(),
        })
        .collect()
}

/// Generate the fallback graph, every node clamped to `bounding_radius`
pub fn generate<R: Rng>(rng: &mut R, bounding_radius: f32) -> LoadedGraph {
    let mut neurons = Vec::with_capacity(REGIONS.len() * 4);

    for def in &REGIONS {
        let center = Vec3::from(def.center);
        let count = def.labels.len();
        for (i, label) in def.labels.iter().enumerate() {
            let azimuth = i as f32 / count as f32 * std::f32::consts::TAU + rng.gen_range(0.0..0.5);
            let elevation = rng.gen_range(-0.4..0.4f32);
            let d = 0.3 + rng.gen_range(0.0..1.0f32) * def.radius * 0.5;
            let offset = Vec3::new(
                d * azimuth.cos() * elevation.cos(),
                d * elevation.sin(),
                d * azimuth.sin() * elevation.cos(),
            );
            neurons.push(
                Neuron::new(format!("{}_{i}", def.id), (center + offset).clamp_to_radius(bounding_radius), def.id)
                    .with_label(*label),
            );
        }
    }

    let mut synapses = Vec::new();
    for (i, a) in neurons.iter().enumerate() {
        for b in &neurons[i + 1..] {
            if a.region == b.region {
                synapses.push(Synapse::new(a.id.clone(), b.id.clone(), rng.gen_range(0.2..0.5)));
            }
        }
    }

    LoadedGraph {
        regions: regions(),
        graph: GraphSnapshot::new(neurons, synapses),
    }
}
