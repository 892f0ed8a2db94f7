//! Heat- and weight-driven styling
//!
//! Pure functions from (region hue, heat or weight) to colors, opacities and
//! scales. The discrete and batched layouts use slightly different curves:
//! batched nodes have no glow, so heat also shifts their hue toward amber.

use crate::palette::{Hsl, hsl_to_rgb};

/// Hue that hot batched nodes drift toward
const HOT_HUE: f32 = 0.12;

/// Appearance of a discrete node object and its glow
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NodeLook {
    pub color: [f32; 3],
    pub opacity: f32,
    pub scale: f32,
    pub glow_opacity: f32,
    pub glow_scale: f32,
}

/// Appearance of a discrete line object
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgeLook {
    pub color: [f32; 3],
    pub opacity: f32,
}

pub fn discrete_node(hue: Hsl, heat: f32) -> NodeLook {
    NodeLook {
        color: hsl_to_rgb(hue.h, hue.s, 0.25 + heat * 0.55),
        opacity: 0.4 + heat * 0.6,
        scale: 0.6 + heat * 0.8,
        glow_opacity: heat * 0.45,
        glow_scale: 0.06 + heat * 0.15,
    }
}

/// Color and uniform scale of one batched instance
pub fn batched_node(hue: Hsl, heat: f32) -> ([f32; 3], f32) {
    let h = hue.h + heat * (HOT_HUE - hue.h) * 0.3;
    let s = hue.s * (1.0 - heat * 0.5);
    let l = 0.2 + heat * 0.65;
    (hsl_to_rgb(h, s, l), 0.5 + heat)
}

pub fn discrete_edge(hue: Hsl, weight: f32, active: bool) -> EdgeLook {
    let w = weight.abs();
    if active {
        EdgeLook {
            color: hsl_to_rgb(hue.h, 1.0, 0.5 + w * 0.3),
            opacity: 0.3 + w * 0.5,
        }
    } else {
        EdgeLook {
            color: hsl_to_rgb(hue.h, hue.s * 0.6, 0.15 + w * 0.25),
            opacity: 0.03 + w * 0.15,
        }
    }
}

/// Per-vertex color of a batched segment, premultiplied by its opacity
/// since the shared line buffer has a single material.
pub fn batched_edge(hue: Hsl, weight: f32, active: bool) -> [f32; 3] {
    let w = weight.abs();
    let (opacity, s, l) = if active {
        (0.15 + w * 0.6, 1.0, 0.5)
    } else {
        (0.02 + w * 0.12, hue.s * 0.5, 0.15 + w * 0.2)
    };
    let [r, g, b] = hsl_to_rgb(hue.h, s, l);
    [r * opacity, g * opacity, b * opacity]
}

/// Opacity and (length, width) scale of an edge glow sprite
pub fn edge_glow(weight: f32, active: bool, length: f32) -> (f32, [f32; 2]) {
    let w = weight.abs();
    if active {
        (0.4 + w * 0.4, [length * 0.3, length * 0.1])
    } else {
        (w * 0.3, [length * 0.4, length * 0.15])
    }
}
