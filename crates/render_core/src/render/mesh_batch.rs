//! Mesh batches and per-frame instances
//!
//! A [`MeshBatch`] is the immutable description of one draw (index buffer, topology,
//! ranges) plus the instances gathered for it during the current frame.

use bytemuck::{Pod, Zeroable};

use crate::foundation::hash::fast_hash;
use crate::foundation::math::{to_cols_array, Mat4};
use crate::render::buffers::IndexBuffer;
use crate::render::resource::ResourceHandle;
use crate::render::rhi::PrimitiveTopology;

/// Editor hit-test id written by the hit-proxy pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HitProxyId(pub u32);

impl HitProxyId {
    /// Encode the id as an RGBA color for the hit-proxy render target
    pub fn to_color(self) -> [f32; 4] {
        let [r, g, b, a] = self.0.to_le_bytes();
        [
            f32::from(r) / 255.0,
            f32::from(g) / 255.0,
            f32::from(b) / 255.0,
            f32::from(a) / 255.0,
        ]
    }
}

/// One drawn copy of a mesh batch
#[derive(Debug, Clone, PartialEq)]
pub struct MeshInstance {
    /// Local-to-world transform
    pub transform: Mat4,
    /// Hit-test id, editor only
    pub hit_proxy_id: Option<HitProxyId>,
    /// Drawn with the editor selection highlight
    pub selected: bool,
}

impl MeshInstance {
    /// Instance with a transform and no editor data
    pub fn new(transform: Mat4) -> Self {
        Self {
            transform,
            hit_proxy_id: None,
            selected: false,
        }
    }

    /// Set the hit-test id
    pub fn with_hit_proxy(mut self, id: Option<HitProxyId>) -> Self {
        self.hit_proxy_id = id;
        self
    }

    /// Set the selection flag
    pub fn with_selected(mut self, selected: bool) -> Self {
        self.selected = selected;
        self
    }

    /// GPU layout of the instance
    pub fn to_instance_data(&self) -> InstanceData {
        InstanceData {
            transform: to_cols_array(&self.transform),
            hit_proxy_color: self.hit_proxy_id.map_or([0.0; 4], HitProxyId::to_color),
            selected: u32::from(self.selected),
            _padding: [0; 3],
        }
    }
}

/// Per-instance data as uploaded to shaders
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct InstanceData {
    /// Column-major local-to-world transform
    pub transform: [[f32; 4]; 4],
    /// Encoded hit-proxy id
    pub hit_proxy_color: [f32; 4],
    /// 1 when selected
    pub selected: u32,
    _padding: [u32; 3],
}

/// Geometry of one draw plus this frame's instances
#[derive(Debug, Clone)]
pub struct MeshBatch {
    index_buffer: Option<ResourceHandle<IndexBuffer>>,
    topology: PrimitiveTopology,
    base_vertex_index: u32,
    first_index: u32,
    num_primitives: u32,
    instances: Vec<MeshInstance>,
}

impl MeshBatch {
    /// Indexed draw
    pub fn indexed(
        index_buffer: ResourceHandle<IndexBuffer>,
        topology: PrimitiveTopology,
        base_vertex_index: u32,
        first_index: u32,
        num_primitives: u32,
    ) -> Self {
        Self {
            index_buffer: Some(index_buffer),
            topology,
            base_vertex_index,
            first_index,
            num_primitives,
            instances: Vec::new(),
        }
    }

    /// Non-indexed draw
    pub fn non_indexed(topology: PrimitiveTopology, base_vertex_index: u32, num_primitives: u32) -> Self {
        Self {
            index_buffer: None,
            topology,
            base_vertex_index,
            first_index: 0,
            num_primitives,
            instances: Vec::new(),
        }
    }

    /// Reserve room for instances
    pub fn with_instance_capacity(mut self, capacity: usize) -> Self {
        self.instances.reserve(capacity);
        self
    }

    /// Index buffer, if indexed
    pub fn index_buffer(&self) -> Option<&ResourceHandle<IndexBuffer>> {
        self.index_buffer.as_ref()
    }

    /// Topology
    pub fn topology(&self) -> PrimitiveTopology {
        self.topology
    }

    /// Vertex offset added to every index
    pub fn base_vertex_index(&self) -> u32 {
        self.base_vertex_index
    }

    /// First index read
    pub fn first_index(&self) -> u32 {
        self.first_index
    }

    /// Primitive count per instance
    pub fn num_primitives(&self) -> u32 {
        self.num_primitives
    }

    /// Structural hash of the immutable fields
    pub fn type_hash(&self) -> u64 {
        fast_hash(
            &(
                self.index_buffer.as_ref().map(ResourceHandle::id),
                self.topology,
                self.base_vertex_index,
                self.first_index,
                self.num_primitives,
            ),
            0,
        )
    }

    /// True when both batches draw the same geometry
    pub fn matches(&self, other: &Self) -> bool {
        let same_buffer = match (&self.index_buffer, &other.index_buffer) {
            (Some(a), Some(b)) => a.ptr_eq(b),
            (None, None) => true,
            _ => false,
        };
        same_buffer
            && self.topology == other.topology
            && self.base_vertex_index == other.base_vertex_index
            && self.first_index == other.first_index
            && self.num_primitives == other.num_primitives
    }

    /// Instances gathered this frame
    pub fn instances(&self) -> &[MeshInstance] {
        &self.instances
    }

    /// Number of instances gathered this frame
    pub fn num_instances(&self) -> usize {
        self.instances.len()
    }

    /// Add an instance for this frame
    pub fn add_instance(&mut self, instance: MeshInstance) {
        self.instances.push(instance);
    }

    /// Drop this frame's instances, keeping the allocation
    pub fn clear_instances(&mut self) {
        self.instances.clear();
    }
}
