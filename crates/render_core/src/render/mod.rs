//! # Rendering System
//!
//! Render-resource lifecycle and draw submission.
//!
//! ## Architecture
//!
//! - **Command queue / rendering thread**: producers enqueue named closures, one
//!   consumer executes them with exclusive access to the [`RenderContext`]
//! - **Render resources**: GPU-backed objects whose lifecycle hooks run only on the
//!   rendering thread
//! - **Bound shader state cache**: one pipeline object per declaration + shader set
//! - **Drawing policies / mesh draw lists**: meshes grouped by render state and
//!   drawn instanced, one state change per distinct policy
//! - **RHI**: backend boundary, with a null backend for headless use

pub mod bound_shader_state;
pub mod buffers;
pub mod command_queue;
pub mod context;
pub mod draw_list;
pub mod drawing_policy;
pub mod dynamic_mesh;
pub mod material;
pub mod mesh_batch;
pub mod rendering_thread;
pub mod resource;
pub mod rhi;
pub mod vertex_factory;

pub use bound_shader_state::{BoundShaderStateCache, BoundShaderStateKey};
pub use buffers::{IndexBuffer, VertexBuffer};
pub use command_queue::{RenderCommandFn, RenderCommandQueue, RenderCommandSink};
pub use context::{RenderContext, RenderDevice};
pub use draw_list::{DrawListStats, DrawingPolicyLink, DrawingPolicyLinkRef, MeshDrawList};
pub use drawing_policy::{DrawingPolicy, DrawingPolicyKind, MeshDrawingPolicy};
pub use dynamic_mesh::{DynamicMeshBuilder, DynamicMeshVertex};
pub use material::{BasicMaterial, BasicShader, Material, MaterialRef, MeshShader, ShaderRef};
pub use mesh_batch::{HitProxyId, InstanceData, MeshBatch, MeshInstance};
pub use rendering_thread::RenderingThread;
pub use resource::{GlobalResourceList, RenderResource, ResourceHandle, ResourceId};
pub use rhi::{NullRhi, Rhi};
pub use vertex_factory::{GeneralVertexFactory, VertexFactory, VertexFactoryRef, VertexFactoryType, VertexStream};

use crate::config::ConfigError;

/// Render errors
#[derive(thiserror::Error, Debug)]
pub enum RenderError {
    /// The RHI failed to create an object
    #[error("RHI failed to create '{name}': {reason}")]
    ResourceCreation {
        /// Debug name of the object
        name: String,
        /// Backend-specific reason
        reason: String,
    },

    /// A material has no shader for a drawing policy kind
    #[error("Material '{material}' has no shaders for {kind:?} drawing")]
    MissingShader {
        /// Material name
        material: String,
        /// Policy kind
        kind: DrawingPolicyKind,
    },

    /// Every receiver of the command queue is gone
    #[error("Render command queue disconnected")]
    QueueDisconnected,

    /// `flush` called while no thread consumes the queue
    #[error("No rendering thread is consuming the command queue")]
    NoRenderThread,

    /// `flush` called on the rendering thread, which would wait on itself
    #[error("flush() called from the rendering thread")]
    FlushFromRenderThread,

    /// A rendering-thread-only call was made from another thread
    #[error("Operation must run on the rendering thread")]
    NotRenderingThread,

    /// The rendering thread stopped while a caller was waiting on it
    #[error("Rendering thread stopped")]
    RenderThreadStopped,

    /// The rendering thread panicked
    #[error("Rendering thread panicked")]
    RenderThreadPanicked,

    /// The rendering thread could not be spawned
    #[error("Failed to spawn rendering thread: {0}")]
    ThreadSpawn(#[from] std::io::Error),

    /// Invalid configuration
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Result type for render operations
pub type RenderResult<T> = Result<T, RenderError>;
