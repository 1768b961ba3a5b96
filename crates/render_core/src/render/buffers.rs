//! Vertex and index buffer resources
//!
//! CPU-side data is kept so the buffer can be recreated by `update_resource` or
//! after device loss.

use crate::render::context::RenderContext;
use crate::render::resource::RenderResource;
use crate::render::rhi::{IndexBufferRhi, ResourceUsage, RhiResource, VertexBufferRhi};
use crate::render::RenderResult;

/// Vertex buffer resource
#[derive(Debug)]
pub struct VertexBuffer {
    debug_name: String,
    data: Vec<u8>,
    stride: u32,
    usage: ResourceUsage,
    rhi: Option<VertexBufferRhi>,
}

impl VertexBuffer {
    /// Create a vertex buffer from any plain-old-data vertex slice
    pub fn from_vertices<V: bytemuck::Pod>(debug_name: impl Into<String>, vertices: &[V], usage: ResourceUsage) -> Self {
        Self {
            debug_name: debug_name.into(),
            data: bytemuck::cast_slice(vertices).to_vec(),
            stride: u32::try_from(std::mem::size_of::<V>()).unwrap_or(u32::MAX),
            usage,
            rhi: None,
        }
    }

    /// Replace the CPU-side data. Takes effect on the next init or update.
    pub fn set_vertices<V: bytemuck::Pod>(&mut self, vertices: &[V]) {
        self.data = bytemuck::cast_slice(vertices).to_vec();
        self.stride = u32::try_from(std::mem::size_of::<V>()).unwrap_or(u32::MAX);
    }

    /// Vertex stride in bytes
    pub fn stride(&self) -> u32 {
        self.stride
    }

    /// Number of vertices in the CPU-side data
    pub fn num_vertices(&self) -> usize {
        if self.stride == 0 {
            0
        } else {
            self.data.len() / self.stride as usize
        }
    }

    /// The RHI buffer, present while initialized
    pub fn rhi(&self) -> Option<VertexBufferRhi> {
        self.rhi
    }
}

impl RenderResource for VertexBuffer {
    fn init_rhi(&mut self, context: &mut RenderContext) -> RenderResult<()> {
        let buffer = context
            .device_mut()
            .rhi_mut()
            .create_vertex_buffer(&self.debug_name, &self.data, self.usage)?;
        self.rhi = Some(buffer);
        Ok(())
    }

    fn release_rhi(&mut self, context: &mut RenderContext) {
        if let Some(buffer) = self.rhi.take() {
            context.device_mut().rhi_mut().release(RhiResource::VertexBuffer(buffer));
        }
    }
}

/// Index buffer resource with 32-bit indices
#[derive(Debug)]
pub struct IndexBuffer {
    debug_name: String,
    indices: Vec<u32>,
    usage: ResourceUsage,
    rhi: Option<IndexBufferRhi>,
}

impl IndexBuffer {
    /// Size of one index in bytes
    pub const STRIDE: u32 = 4;

    /// Create an index buffer
    pub fn new(debug_name: impl Into<String>, indices: Vec<u32>, usage: ResourceUsage) -> Self {
        Self {
            debug_name: debug_name.into(),
            indices,
            usage,
            rhi: None,
        }
    }

    /// Replace the CPU-side indices. Takes effect on the next init or update.
    pub fn set_indices(&mut self, indices: Vec<u32>) {
        self.indices = indices;
    }

    /// Number of indices
    pub fn num_indices(&self) -> usize {
        self.indices.len()
    }

    /// The RHI buffer, present while initialized
    pub fn rhi(&self) -> Option<IndexBufferRhi> {
        self.rhi
    }
}

impl RenderResource for IndexBuffer {
    fn init_rhi(&mut self, context: &mut RenderContext) -> RenderResult<()> {
        let buffer = context.device_mut().rhi_mut().create_index_buffer(
            &self.debug_name,
            Self::STRIDE,
            bytemuck::cast_slice(&self.indices),
            self.usage,
        )?;
        self.rhi = Some(buffer);
        Ok(())
    }

    fn release_rhi(&mut self, context: &mut RenderContext) {
        if let Some(buffer) = self.rhi.take() {
            context.device_mut().rhi_mut().release(RhiResource::IndexBuffer(buffer));
        }
    }
}
