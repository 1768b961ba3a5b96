//! # Render Hardware Interface
//!
//! Backend abstraction consumed by the render core. Everything the core needs from
//! a graphics API goes through the [`Rhi`] trait: object creation, pipeline state
//! binding and draw submission. Objects are referred to by opaque handles.
//!
//! ## Architecture
//!
//! - **Handles**: `u64` newtypes, one per object kind, meaningful only to the backend
//! - **Descriptors**: plain enums/structs describing vertex layouts and rasterizer state
//! - **Null backend**: [`NullRhi`] records calls so the core can run headless

pub mod null;

use std::any::Any;

use crate::render::bound_shader_state::BoundShaderStateKey;
use crate::render::RenderResult;

pub use null::{NullRhi, RhiCall, RhiCounters, RhiStats};

/// Handle to a GPU vertex buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexBufferRhi(pub u64);

/// Handle to a GPU index buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IndexBufferRhi(pub u64);

/// Handle to a vertex declaration (input layout)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexDeclarationRhi(pub u64);

/// Handle to a compiled shader of any stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShaderRhi(pub u64);

/// Handle to a bound shader state (declaration + stage shaders pipeline object)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BoundShaderStateRhi(pub u64);

/// Handle to a texture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureRhi(pub u64);

/// Any releasable RHI object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RhiResource {
    /// Vertex buffer
    VertexBuffer(VertexBufferRhi),
    /// Index buffer
    IndexBuffer(IndexBufferRhi),
    /// Vertex declaration
    VertexDeclaration(VertexDeclarationRhi),
    /// Bound shader state
    BoundShaderState(BoundShaderStateRhi),
}

/// Shader pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ShaderFrequency {
    /// Vertex shader
    Vertex,
    /// Hull (tessellation control) shader
    Hull,
    /// Domain (tessellation evaluation) shader
    Domain,
    /// Geometry shader
    Geometry,
    /// Pixel shader
    Pixel,
}

/// Primitive assembly mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveTopology {
    /// Independent triangles
    TriangleList,
    /// Triangle strip
    TriangleStrip,
    /// Independent lines
    LineList,
    /// Points
    PointList,
}

impl PrimitiveTopology {
    /// Number of vertices/indices consumed by `num_primitives` primitives
    pub fn element_count(self, num_primitives: u32) -> u32 {
        match self {
            Self::TriangleList => num_primitives * 3,
            Self::TriangleStrip => num_primitives + 2,
            Self::LineList => num_primitives * 2,
            Self::PointList => num_primitives,
        }
    }
}

/// Buffer update frequency hint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceUsage {
    /// Written once
    Static,
    /// Rewritten regularly
    Dynamic,
}

/// Triangle fill mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FillMode {
    /// Filled triangles
    Solid,
    /// Triangle edges only
    Wireframe,
}

/// Face culling mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CullMode {
    /// Draw both faces
    None,
    /// Cull clockwise faces
    Clockwise,
    /// Cull counter-clockwise faces
    CounterClockwise,
}

/// Fixed-function rasterizer state
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterizerStateDesc {
    /// Fill mode
    pub fill_mode: FillMode,
    /// Cull mode
    pub cull_mode: CullMode,
    /// Constant depth bias
    pub depth_bias: f32,
    /// Slope-scaled depth bias
    pub slope_scale_depth_bias: f32,
}

impl Default for RasterizerStateDesc {
    fn default() -> Self {
        Self {
            fill_mode: FillMode::Solid,
            cull_mode: CullMode::CounterClockwise,
            depth_bias: 0.0,
            slope_scale_depth_bias: 0.0,
        }
    }
}

/// Vertex element data type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexElementType {
    /// One float
    Float1,
    /// Two floats
    Float2,
    /// Three floats
    Float3,
    /// Four floats
    Float4,
    /// Four unsigned bytes
    UByte4,
    /// Packed RGBA8 color
    Color,
}

impl VertexElementType {
    /// Size of the element in bytes
    pub fn size(self) -> u32 {
        match self {
            Self::Float1 | Self::UByte4 | Self::Color => 4,
            Self::Float2 => 8,
            Self::Float3 => 12,
            Self::Float4 => 16,
        }
    }
}

/// Semantic of a vertex element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexElementUsage {
    /// Position
    Position,
    /// Normal
    Normal,
    /// Tangent
    Tangent,
    /// Texture coordinate
    TexCoord,
    /// Vertex color
    Color,
}

/// One element of a vertex declaration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexElement {
    /// Vertex stream the element is read from
    pub stream_index: u32,
    /// Byte offset inside the stream's vertex
    pub offset: u32,
    /// Data type
    pub element_type: VertexElementType,
    /// Semantic
    pub usage: VertexElementUsage,
    /// Semantic index (e.g. texcoord set)
    pub usage_index: u32,
}

impl VertexElement {
    /// Create a vertex element
    pub fn new(
        stream_index: u32,
        offset: u32,
        element_type: VertexElementType,
        usage: VertexElementUsage,
        usage_index: u32,
    ) -> Self {
        Self {
            stream_index,
            offset,
            element_type,
            usage,
            usage_index,
        }
    }
}

/// Graphics backend consumed by the render core
///
/// Only ever called from the rendering thread, through the
/// [`crate::render::RenderDevice`] owned by the render context.
pub trait Rhi: Send {
    /// Backend name for logging
    fn name(&self) -> &str;

    /// Create a vertex buffer initialized with `data`
    fn create_vertex_buffer(&mut self, debug_name: &str, data: &[u8], usage: ResourceUsage) -> RenderResult<VertexBufferRhi>;

    /// Create an index buffer with `stride`-byte indices initialized with `data`
    fn create_index_buffer(
        &mut self,
        debug_name: &str,
        stride: u32,
        data: &[u8],
        usage: ResourceUsage,
    ) -> RenderResult<IndexBufferRhi>;

    /// Create a vertex declaration
    fn create_vertex_declaration(&mut self, elements: &[VertexElement]) -> RenderResult<VertexDeclarationRhi>;

    /// Create the pipeline object for a declaration + stage shader combination
    fn create_bound_shader_state(&mut self, debug_name: &str, key: &BoundShaderStateKey) -> RenderResult<BoundShaderStateRhi>;

    /// Release an object created by this backend
    fn release(&mut self, resource: RhiResource);

    /// Set fixed-function rasterizer state
    fn set_rasterizer_state(&mut self, state: &RasterizerStateDesc);

    /// Bind a pipeline object
    fn set_bound_shader_state(&mut self, state: BoundShaderStateRhi);

    /// Bind a vertex buffer to a stream
    fn set_stream_source(&mut self, stream_index: u32, buffer: VertexBufferRhi, stride: u32, offset: u32);

    /// Upload shader constants for a stage
    fn set_shader_constants(&mut self, frequency: ShaderFrequency, slot: u32, data: &[u8]);

    /// Bind a texture for a stage
    fn set_texture_parameter(&mut self, frequency: ShaderFrequency, slot: u32, texture: TextureRhi);

    /// Flush pending constant uploads before a draw
    fn commit_constants(&mut self);

    /// Draw indexed primitives
    fn draw_indexed_primitive(
        &mut self,
        index_buffer: IndexBufferRhi,
        topology: PrimitiveTopology,
        base_vertex_index: u32,
        first_index: u32,
        num_primitives: u32,
        num_instances: u32,
    );

    /// Draw non-indexed primitives
    fn draw_primitive(&mut self, topology: PrimitiveTopology, base_vertex_index: u32, num_primitives: u32, num_instances: u32);

    /// Downcast to the concrete backend
    fn as_any(&self) -> &dyn Any;

    /// Downcast to the concrete backend (mutable)
    fn as_any_mut(&mut self) -> &mut dyn Any;
}
