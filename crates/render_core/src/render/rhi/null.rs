//! Null RHI backend
//!
//! Creates opaque handles and records every call instead of talking to a GPU.
//! Counters are shared through an `Arc` so a producer thread can watch a rendering
//! thread that owns the backend.

use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::foundation::hash::FxHashSet;
use crate::render::bound_shader_state::BoundShaderStateKey;
use crate::render::{RenderError, RenderResult};

use super::{
    BoundShaderStateRhi, IndexBufferRhi, PrimitiveTopology, RasterizerStateDesc, ResourceUsage, Rhi, RhiResource,
    ShaderFrequency, TextureRhi, VertexBufferRhi, VertexDeclarationRhi, VertexElement,
};

/// Live counters updated by [`NullRhi`]
#[derive(Debug, Default)]
pub struct RhiCounters {
    vertex_buffers_created: AtomicU64,
    index_buffers_created: AtomicU64,
    vertex_declarations_created: AtomicU64,
    bound_shader_states_created: AtomicU64,
    resources_released: AtomicU64,
    bound_shader_state_changes: AtomicU64,
    draw_calls: AtomicU64,
    instances_drawn: AtomicU64,
}

impl RhiCounters {
    /// Copy the current counter values
    pub fn snapshot(&self) -> RhiStats {
        RhiStats {
            vertex_buffers_created: self.vertex_buffers_created.load(Ordering::Acquire),
            index_buffers_created: self.index_buffers_created.load(Ordering::Acquire),
            vertex_declarations_created: self.vertex_declarations_created.load(Ordering::Acquire),
            bound_shader_states_created: self.bound_shader_states_created.load(Ordering::Acquire),
            resources_released: self.resources_released.load(Ordering::Acquire),
            bound_shader_state_changes: self.bound_shader_state_changes.load(Ordering::Acquire),
            draw_calls: self.draw_calls.load(Ordering::Acquire),
            instances_drawn: self.instances_drawn.load(Ordering::Acquire),
        }
    }

    fn bump(counter: &AtomicU64, amount: u64) {
        counter.fetch_add(amount, Ordering::AcqRel);
    }
}

/// Point-in-time copy of [`RhiCounters`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RhiStats {
    /// Vertex buffers created
    pub vertex_buffers_created: u64,
    /// Index buffers created
    pub index_buffers_created: u64,
    /// Vertex declarations created
    pub vertex_declarations_created: u64,
    /// Bound shader states created
    pub bound_shader_states_created: u64,
    /// Objects released
    pub resources_released: u64,
    /// `set_bound_shader_state` calls
    pub bound_shader_state_changes: u64,
    /// Draw calls of either kind
    pub draw_calls: u64,
    /// Instances summed over all draw calls
    pub instances_drawn: u64,
}

/// One recorded state or draw call
#[derive(Debug, Clone, PartialEq)]
pub enum RhiCall {
    /// `set_rasterizer_state`
    SetRasterizerState(RasterizerStateDesc),
    /// `set_bound_shader_state`
    SetBoundShaderState(BoundShaderStateRhi),
    /// `set_stream_source`
    SetStreamSource {
        /// Stream slot
        stream_index: u32,
        /// Bound buffer
        buffer: VertexBufferRhi,
        /// Vertex stride
        stride: u32,
    },
    /// `set_shader_constants`
    SetShaderConstants {
        /// Stage
        frequency: ShaderFrequency,
        /// Constant slot
        slot: u32,
        /// Uploaded byte count
        len: usize,
    },
    /// `set_texture_parameter`
    SetTexture {
        /// Stage
        frequency: ShaderFrequency,
        /// Texture slot
        slot: u32,
        /// Bound texture
        texture: TextureRhi,
    },
    /// `commit_constants`
    CommitConstants,
    /// `draw_indexed_primitive`
    DrawIndexed {
        /// Index buffer
        index_buffer: IndexBufferRhi,
        /// Topology
        topology: PrimitiveTopology,
        /// First index
        first_index: u32,
        /// Primitive count
        num_primitives: u32,
        /// Instance count
        num_instances: u32,
    },
    /// `draw_primitive`
    Draw {
        /// Topology
        topology: PrimitiveTopology,
        /// Primitive count
        num_primitives: u32,
        /// Instance count
        num_instances: u32,
    },
}

/// Headless RHI backend
#[derive(Debug, Default)]
pub struct NullRhi {
    next_handle: u64,
    live: FxHashSet<RhiResource>,
    counters: Arc<RhiCounters>,
    calls: Option<Vec<RhiCall>>,
    fail_creations: bool,
}

impl NullRhi {
    /// Create a backend that only counts
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a backend that also records every state and draw call
    pub fn with_call_recording() -> Self {
        Self {
            calls: Some(Vec::new()),
            ..Self::default()
        }
    }

    /// Shared handle to the live counters
    pub fn counters(&self) -> Arc<RhiCounters> {
        Arc::clone(&self.counters)
    }

    /// Current counter values
    pub fn stats(&self) -> RhiStats {
        self.counters.snapshot()
    }

    /// Recorded calls (empty unless created with [`NullRhi::with_call_recording`])
    pub fn calls(&self) -> &[RhiCall] {
        self.calls.as_deref().unwrap_or(&[])
    }

    /// Drain recorded calls
    pub fn take_calls(&mut self) -> Vec<RhiCall> {
        self.calls.as_mut().map(std::mem::take).unwrap_or_default()
    }

    /// Make every subsequent creation call fail
    pub fn set_fail_creations(&mut self, fail: bool) {
        self.fail_creations = fail;
    }

    /// Number of objects created and not yet released
    pub fn live_resource_count(&self) -> usize {
        self.live.len()
    }

    fn allocate(&mut self, debug_name: &str) -> RenderResult<u64> {
        if self.fail_creations {
            return Err(RenderError::ResourceCreation {
                name: debug_name.to_string(),
                reason: "null backend configured to fail".to_string(),
            });
        }
        self.next_handle += 1;
        Ok(self.next_handle)
    }

    fn record(&mut self, call: RhiCall) {
        if let Some(calls) = self.calls.as_mut() {
            calls.push(call);
        }
    }
}

impl Rhi for NullRhi {
    fn name(&self) -> &str {
        "Null"
    }

    fn create_vertex_buffer(&mut self, debug_name: &str, data: &[u8], _usage: ResourceUsage) -> RenderResult<VertexBufferRhi> {
        let handle = VertexBufferRhi(self.allocate(debug_name)?);
        log::trace!("[NULL_RHI] vertex buffer '{}' {:?} ({} bytes)", debug_name, handle, data.len());
        self.live.insert(RhiResource::VertexBuffer(handle));
        RhiCounters::bump(&self.counters.vertex_buffers_created, 1);
        Ok(handle)
    }

    fn create_index_buffer(
        &mut self,
        debug_name: &str,
        stride: u32,
        data: &[u8],
        _usage: ResourceUsage,
    ) -> RenderResult<IndexBufferRhi> {
        let handle = IndexBufferRhi(self.allocate(debug_name)?);
        log::trace!(
            "[NULL_RHI] index buffer '{}' {:?} ({} bytes, stride {})",
            debug_name,
            handle,
            data.len(),
            stride
        );
        self.live.insert(RhiResource::IndexBuffer(handle));
        RhiCounters::bump(&self.counters.index_buffers_created, 1);
        Ok(handle)
    }

    fn create_vertex_declaration(&mut self, elements: &[VertexElement]) -> RenderResult<VertexDeclarationRhi> {
        let handle = VertexDeclarationRhi(self.allocate("VertexDeclaration")?);
        log::trace!("[NULL_RHI] vertex declaration {:?} ({} elements)", handle, elements.len());
        self.live.insert(RhiResource::VertexDeclaration(handle));
        RhiCounters::bump(&self.counters.vertex_declarations_created, 1);
        Ok(handle)
    }

    fn create_bound_shader_state(&mut self, debug_name: &str, key: &BoundShaderStateKey) -> RenderResult<BoundShaderStateRhi> {
        let handle = BoundShaderStateRhi(self.allocate(debug_name)?);
        log::trace!("[NULL_RHI] bound shader state '{}' {:?} for {:?}", debug_name, handle, key);
        self.live.insert(RhiResource::BoundShaderState(handle));
        RhiCounters::bump(&self.counters.bound_shader_states_created, 1);
        Ok(handle)
    }

    fn release(&mut self, resource: RhiResource) {
        if self.live.remove(&resource) {
            RhiCounters::bump(&self.counters.resources_released, 1);
        } else {
            log::warn!("[NULL_RHI] release of unknown object {:?}", resource);
        }
    }

    fn set_rasterizer_state(&mut self, state: &RasterizerStateDesc) {
        self.record(RhiCall::SetRasterizerState(*state));
    }

    fn set_bound_shader_state(&mut self, state: BoundShaderStateRhi) {
        RhiCounters::bump(&self.counters.bound_shader_state_changes, 1);
        self.record(RhiCall::SetBoundShaderState(state));
    }

    fn set_stream_source(&mut self, stream_index: u32, buffer: VertexBufferRhi, stride: u32, _offset: u32) {
        self.record(RhiCall::SetStreamSource {
            stream_index,
            buffer,
            stride,
        });
    }

    fn set_shader_constants(&mut self, frequency: ShaderFrequency, slot: u32, data: &[u8]) {
        self.record(RhiCall::SetShaderConstants {
            frequency,
            slot,
            len: data.len(),
        });
    }

    fn set_texture_parameter(&mut self, frequency: ShaderFrequency, slot: u32, texture: TextureRhi) {
        self.record(RhiCall::SetTexture { frequency, slot, texture });
    }

    fn commit_constants(&mut self) {
        self.record(RhiCall::CommitConstants);
    }

    fn draw_indexed_primitive(
        &mut self,
        index_buffer: IndexBufferRhi,
        topology: PrimitiveTopology,
        _base_vertex_index: u32,
        first_index: u32,
        num_primitives: u32,
        num_instances: u32,
    ) {
        RhiCounters::bump(&self.counters.draw_calls, 1);
        RhiCounters::bump(&self.counters.instances_drawn, u64::from(num_instances));
        self.record(RhiCall::DrawIndexed {
            index_buffer,
            topology,
            first_index,
            num_primitives,
            num_instances,
        });
    }

    fn draw_primitive(&mut self, topology: PrimitiveTopology, _base_vertex_index: u32, num_primitives: u32, num_instances: u32) {
        RhiCounters::bump(&self.counters.draw_calls, 1);
        RhiCounters::bump(&self.counters.instances_drawn, u64::from(num_instances));
        self.record(RhiCall::Draw {
            topology,
            num_primitives,
            num_instances,
        });
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
