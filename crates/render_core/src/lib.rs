//! # Render Core
//!
//! Render-resource lifecycle and frame assembly for a real-time 3D renderer.
//!
//! ## Features
//!
//! - **Rendering Thread**: producers enqueue named commands, one consumer owns the device
//! - **Render Resources**: GPU objects initialized, updated and released only on the rendering thread
//! - **Draw Lists**: meshes grouped by drawing policy and drawn instanced
//! - **Scenes**: primitives gathered into ordered depth groups every frame
//! - **Null Backend**: headless RHI that records calls, for tests and tools
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use render_core::prelude::*;
//! use std::sync::Arc;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut rendering = RenderingThread::start(RenderCoreConfig::default(), Box::new(NullRhi::new()))?;
//!
//!     let material: MaterialRef = Arc::new(BasicMaterial::new("Gray"));
//!     let cube = Arc::new(StaticMesh::cube("Cube", material));
//!     cube.init_resources(&mut rendering);
//!
//!     let scene = SceneId::next();
//!     let primitive = primitive_ref(StaticMeshPrimitive::new("Cube", cube.clone()));
//!     rendering.enqueue("CreateScene", move |context| {
//!         context.create_scene(scene);
//!         context.add_primitive(scene, primitive);
//!     });
//!     rendering.flush()?;
//!
//!     cube.release_resources(&mut rendering);
//!     rendering.stop()?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod config;
pub mod core;
pub mod foundation;
pub mod render;
pub mod scene;

#[cfg(test)]
mod test_support;

/// Common imports for render core users
pub mod prelude {
    pub use crate::{
        config::{Config, ConfigError},
        core::{DrawListConfig, EditorConfig, RenderCoreConfig},
        foundation::math::{Mat4, Transform, Vec3},
        render::{
            BasicMaterial, BasicShader, DrawingPolicyKind, DynamicMeshBuilder, DynamicMeshVertex, HitProxyId, Material,
            MaterialRef, MeshDrawList, NullRhi, RenderCommandQueue, RenderCommandSink, RenderContext, RenderError,
            RenderResource, RenderResult, RenderingThread, ResourceHandle, Rhi,
        },
        scene::{
            primitive_ref, DepthGroup, FrameStats, Primitive, PrimitiveRef, Scene, SceneId, SceneView, ShowFlags,
            SpritePrimitive, StaticMesh, StaticMeshElement, StaticMeshPrimitive,
        },
    };
}
