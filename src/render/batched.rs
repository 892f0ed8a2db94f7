//! Instanced layout for large graphs
//!
//! All nodes share one instanced object whose per-instance data lives in
//! two flat buffers (transforms and colors). All edges share one segment
//! buffer sized to a fixed capacity; only the leading draw range is drawn.

use std::collections::HashMap;
use std::ops::Range;

use bytemuck::{Pod, Zeroable};

use crate::model::NodeId;

/// Vertices per line segment
pub const VERTICES_PER_SEGMENT: usize = 2;

/// Floats per segment in the position and color buffers
const FLOATS_PER_SEGMENT: usize = VERTICES_PER_SEGMENT * 3;

/// Per-instance transform, uploaded as-is.
///
/// Translation plus uniform scale; a renderer expands this to a matrix.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct InstanceTransform {
    pub position: [f32; 3],
    pub scale: f32,
}

/// Pending-upload marker for one buffer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DirtyFlag {
    pending: bool,
    marks: u64,
}

impl DirtyFlag {
    pub fn mark(&mut self) {
        self.pending = true;
        self.marks += 1;
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    /// Total marks since creation
    pub fn marks(&self) -> u64 {
        self.marks
    }

    /// Clear the pending mark, returning whether an upload was needed
    pub fn take(&mut self) -> bool {
        std::mem::take(&mut self.pending)
    }
}

#[derive(Debug)]
pub struct BatchedSet {
    ids: Vec<NodeId>,
    regions: Vec<String>,
    index: HashMap<NodeId, usize>,

    transforms: Vec<InstanceTransform>,
    /// RGB triples, one per instance
    colors: Vec<f32>,
    instances_dirty: DirtyFlag,

    edge_positions: Vec<f32>,
    edge_colors: Vec<f32>,
    edge_capacity: usize,
    /// Drawn vertex count
    draw_count: usize,
    edges_dirty: DirtyFlag,

    visible: bool,
}

impl BatchedSet {
    pub(super) fn new(
        ids: Vec<NodeId>,
        regions: Vec<String>,
        transforms: Vec<InstanceTransform>,
        colors: Vec<f32>,
        edge_capacity: usize,
    ) -> Self {
        let index = ids.iter().enumerate().map(|(i, id)| (id.clone(), i)).collect();
        Self {
            ids,
            regions,
            index,
            transforms,
            colors,
            instances_dirty: DirtyFlag::default(),
            edge_positions: vec![0.0; edge_capacity * FLOATS_PER_SEGMENT],
            edge_colors: vec![0.0; edge_capacity * FLOATS_PER_SEGMENT],
            edge_capacity,
            draw_count: 0,
            edges_dirty: DirtyFlag::default(),
            visible: true,
        }
    }

    pub fn instance_count(&self) -> usize {
        self.ids.len()
    }

    pub fn instance_of(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn id(&self, instance: usize) -> &str {
        &self.ids[instance]
    }

    pub fn region(&self, instance: usize) -> &str {
        &self.regions[instance]
    }

    pub fn transform(&self, instance: usize) -> InstanceTransform {
        self.transforms[instance]
    }

    pub fn color(&self, instance: usize) -> [f32; 3] {
        let c = &self.colors[instance * 3..instance * 3 + 3];
        [c[0], c[1], c[2]]
    }

    pub(super) fn write_instance(&mut self, instance: usize, transform: InstanceTransform, color: [f32; 3]) {
        self.transforms[instance] = transform;
        self.colors[instance * 3..instance * 3 + 3].copy_from_slice(&color);
    }

    pub fn transforms(&self) -> &[InstanceTransform] {
        &self.transforms
    }

    /// Transform buffer as raw bytes for upload
    pub fn transform_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.transforms)
    }

    pub fn colors(&self) -> &[f32] {
        &self.colors
    }

    pub fn instances_dirty(&self) -> DirtyFlag {
        self.instances_dirty
    }

    pub(super) fn mark_instances_dirty(&mut self) {
        self.instances_dirty.mark();
    }

    pub fn edge_capacity(&self) -> usize {
        self.edge_capacity
    }

    pub fn edge_positions(&self) -> &[f32] {
        &self.edge_positions
    }

    pub fn edge_colors(&self) -> &[f32] {
        &self.edge_colors
    }

    /// Write segment `slot`. Slots past capacity are ignored.
    pub(super) fn write_segment(&mut self, slot: usize, start: [f32; 3], end: [f32; 3], color: [f32; 3]) {
        if slot >= self.edge_capacity {
            return;
        }
        let base = slot * FLOATS_PER_SEGMENT;
        self.edge_positions[base..base + 3].copy_from_slice(&start);
        self.edge_positions[base + 3..base + 6].copy_from_slice(&end);
        self.edge_colors[base..base + 3].copy_from_slice(&color);
        self.edge_colors[base + 3..base + 6].copy_from_slice(&color);
    }

    /// Vertex range a renderer should draw
    pub fn draw_range(&self) -> Range<usize> {
        0..self.draw_count
    }

    pub fn emitted_edges(&self) -> usize {
        self.draw_count / VERTICES_PER_SEGMENT
    }

    pub(super) fn set_emitted(&mut self, segments: usize) {
        self.draw_count = segments.min(self.edge_capacity) * VERTICES_PER_SEGMENT;
        self.edges_dirty.mark();
    }

    pub fn edges_dirty(&self) -> DirtyFlag {
        self.edges_dirty
    }

    /// Hand pending uploads to a renderer: (instances, edges)
    pub fn take_uploads(&mut self) -> (bool, bool) {
        (self.instances_dirty.take(), self.edges_dirty.take())
    }

    /// Take pending uploads and return the bytes they cover
    pub fn take_upload_bytes(&mut self) -> usize {
        let (instances, edges) = self.take_uploads();
        let mut bytes = 0;
        if instances {
            bytes += self.transform_bytes().len();
            bytes += bytemuck::cast_slice::<f32, u8>(&self.colors).len();
        }
        if edges {
            let drawn = self.draw_count * 3;
            bytes += bytemuck::cast_slice::<f32, u8>(&self.edge_positions[..drawn]).len();
            bytes += bytemuck::cast_slice::<f32, u8>(&self.edge_colors[..drawn]).len();
        }
        bytes
    }

    /// The instanced object and the line object
    pub fn object_count(&self) -> usize {
        2
    }

    /// Transforms, colors, edge positions, edge colors
    pub fn buffer_count(&self) -> usize {
        4
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }
}
