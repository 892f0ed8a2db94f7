//! Region colors and agent → region routing
//!
//! Both maps are plain configuration: they are injected at startup and
//! validated against the region set once it is known. Unknown regions fall
//! back to [`FALLBACK_HUE`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::Region;

/// A color in HSL space, each component normalized to 0.0-1.0
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Hsl {
    pub h: f32,
    pub s: f32,
    pub l: f32,
}

impl Hsl {
    pub const fn new(h: f32, s: f32, l: f32) -> Self {
        Self { h, s, l }
    }
}

/// Hue used for regions missing from the palette
pub const FALLBACK_HUE: Hsl = Hsl::new(0.6, 0.8, 0.5);

/// Convert HSL to linear RGB (0.0-1.0 per channel).
///
/// Hue wraps around; saturation and lightness are clamped.
pub fn hsl_to_rgb(h: f32, s: f32, l: f32) -> [f32; 3] {
    let h = h.rem_euclid(1.0);
    let s = s.clamp(0.0, 1.0);
    let l = l.clamp(0.0, 1.0);

    if s == 0.0 {
        return [l, l, l];
    }

    let q = if l <= 0.5 { l * (1.0 + s) } else { l + s - l * s };
    let p = 2.0 * l - q;

    [
        hue_to_channel(p, q, h + 1.0 / 3.0),
        hue_to_channel(p, q, h),
        hue_to_channel(p, q, h - 1.0 / 3.0),
    ]
}

fn hue_to_channel(p: f32, q: f32, mut t: f32) -> f32 {
    if t < 0.0 {
        t += 1.0;
    }
    if t > 1.0 {
        t -= 1.0;
    }
    if t < 1.0 / 6.0 {
        return p + (q - p) * 6.0 * t;
    }
    if t < 0.5 {
        return q;
    }
    if t < 2.0 / 3.0 {
        return p + (q - p) * 6.0 * (2.0 / 3.0 - t);
    }
    p
}

/// Region ID → hue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Palette {
    hues: BTreeMap<String, Hsl>,
}

impl Default for Palette {
    fn default() -> Self {
        let hues = [
            ("prefrontal", Hsl::new(0.82, 0.90, 0.58)),
            ("frontal", Hsl::new(0.60, 0.95, 0.52)),
            ("temporal_left", Hsl::new(0.48, 0.85, 0.50)),
            ("temporal_right", Hsl::new(0.44, 0.80, 0.48)),
            ("parietal", Hsl::new(0.72, 0.85, 0.55)),
            ("occipital", Hsl::new(0.78, 0.75, 0.52)),
            ("thalamus", Hsl::new(0.12, 1.00, 0.55)),
            ("hippocampus", Hsl::new(0.36, 0.80, 0.48)),
            ("amygdala", Hsl::new(0.02, 0.85, 0.55)),
            ("cerebellum", Hsl::new(0.30, 0.75, 0.45)),
            ("brainstem", Hsl::new(0.58, 0.35, 0.38)),
            ("motor_cortex", Hsl::new(0.55, 1.00, 0.55)),
        ];
        Self {
            hues: hues
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        }
    }
}

impl Palette {
    pub fn empty() -> Self {
        Self {
            hues: BTreeMap::new(),
        }
    }

    pub fn with_hue(mut self, region: impl Into<String>, hue: Hsl) -> Self {
        self.hues.insert(region.into(), hue);
        self
    }

    /// Hue for a region, or [`FALLBACK_HUE`] when unknown
    pub fn hue(&self, region: &str) -> Hsl {
        self.hues.get(region).copied().unwrap_or(FALLBACK_HUE)
    }

    pub fn len(&self) -> usize {
        self.hues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hues.is_empty()
    }

    /// Palette keys that name no known region
    pub fn unknown_keys(&self, regions: &[Region]) -> Vec<String> {
        self.hues
            .keys()
            .filter(|k| !regions.iter().any(|r| &r.id == *k))
            .cloned()
            .collect()
    }
}

/// Agent name → region ID
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentRegions {
    agents: BTreeMap<String, String>,
}

impl Default for AgentRegions {
    fn default() -> Self {
        let pairs = [
            ("Atlas", "prefrontal"),
            ("Nike", "prefrontal"),
            ("Eirene", "prefrontal"),
            ("Arete", "prefrontal"),
            ("Hermes", "frontal"),
            ("Harmonia", "frontal"),
            ("Automatos", "frontal"),
            ("Eupraxia", "frontal"),
            ("Apollo", "temporal_left"),
            ("Peitho", "temporal_left"),
            ("Kalliope", "temporal_left"),
            ("Plutus", "temporal_right"),
            ("Chrysos", "temporal_right"),
            ("Eunomia", "temporal_right"),
            ("Ploutos", "temporal_right"),
            ("Prometheus", "parietal"),
            ("Metis", "parietal"),
            ("Kairos", "parietal"),
            ("Athena", "occipital"),
            ("Hera", "thalamus"),
            ("Homonoia", "thalamus"),
            ("Pheme", "hippocampus"),
            ("Philotes", "hippocampus"),
            ("Tyche", "amygdala"),
            ("Themis", "amygdala"),
            ("Morpheus", "cerebellum"),
            ("Hephaestus", "motor_cortex"),
            ("Techne", "motor_cortex"),
            ("Daedalus", "motor_cortex"),
        ];
        Self {
            agents: pairs
                .into_iter()
                .map(|(a, r)| (a.to_string(), r.to_string()))
                .collect(),
        }
    }
}

impl AgentRegions {
    pub fn empty() -> Self {
        Self {
            agents: BTreeMap::new(),
        }
    }

    pub fn with_agent(mut self, agent: impl Into<String>, region: impl Into<String>) -> Self {
        self.agents.insert(agent.into(), region.into());
        self
    }

    pub fn region_for(&self, agent: &str) -> Option<&str> {
        self.agents.get(agent).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Drop agents that route to unknown regions; returns the dropped names
    pub fn retain_known(&mut self, regions: &[Region]) -> Vec<String> {
        let mut dropped = Vec::new();
        self.agents.retain(|agent, region| {
            let known = regions.iter().any(|r| &r.id == region);
            if !known {
                dropped.push(agent.clone());
            }
            known
        });
        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Vec3;

    fn region(id: &str) -> Region {
        Region {
            id: id.to_string(),
            name: id.to_string(),
            center: Vec3::ZERO,
            radius: 1.0,
            description: String::new(),
        }
    }

    fn approx(a: [f32; 3], b: [f32; 3]) -> bool {
        a.iter().zip(b.iter()).all(|(x, y)| (x - y).abs() < 1e-4)
    }

    #[test]
    fn hsl_primaries() {
        assert!(approx(hsl_to_rgb(0.0, 1.0, 0.5), [1.0, 0.0, 0.0]));
        assert!(approx(hsl_to_rgb(1.0 / 3.0, 1.0, 0.5), [0.0, 1.0, 0.0]));
        assert!(approx(hsl_to_rgb(2.0 / 3.0, 1.0, 0.5), [0.0, 0.0, 1.0]));
    }

    #[test]
    fn hsl_muted_colors() {
        // Dark and light halves of the lightness range
        assert!(approx(hsl_to_rgb(0.0, 0.5, 0.25), [0.375, 0.125, 0.125]));
        assert!(approx(hsl_to_rgb(0.5, 0.5, 0.75), [0.625, 0.875, 0.875]));
    }

    #[test]
    fn hsl_grey_and_wraparound() {
        assert!(approx(hsl_to_rgb(0.3, 0.0, 0.4), [0.4, 0.4, 0.4]));
        assert!(approx(hsl_to_rgb(1.25, 1.0, 0.5), hsl_to_rgb(0.25, 1.0, 0.5)));
        assert!(approx(hsl_to_rgb(0.5, 1.0, 1.5), [1.0, 1.0, 1.0]));
    }

    #[test]
    fn unknown_region_uses_fallback_hue() {
        let palette = Palette::default();
        assert_eq!(palette.hue("nowhere"), FALLBACK_HUE);
        assert_eq!(palette.hue("thalamus"), Hsl::new(0.12, 1.0, 0.55));
    }

    #[test]
    fn palette_reports_keys_without_region() {
        let palette = Palette::empty()
            .with_hue("a", Hsl::new(0.1, 0.1, 0.1))
            .with_hue("ghost", Hsl::new(0.2, 0.2, 0.2));
        assert_eq!(palette.unknown_keys(&[region("a")]), vec!["ghost"]);
    }

    #[test]
    fn agents_to_unknown_regions_are_dropped() {
        let mut agents = AgentRegions::empty()
            .with_agent("Scout", "a")
            .with_agent("Lost", "missing");
        let dropped = agents.retain_known(&[region("a")]);
        assert_eq!(dropped, vec!["Lost"]);
        assert_eq!(agents.region_for("Scout"), Some("a"));
        assert_eq!(agents.region_for("Lost"), None);
    }

    #[test]
    fn default_agent_map_covers_every_default_palette_region() {
        let palette = Palette::default();
        let regions: Vec<Region> = palette.hues.keys().map(|k| region(k)).collect();
        let mut agents = AgentRegions::default();
        assert!(agents.retain_known(&regions).is_empty());
    }
}
