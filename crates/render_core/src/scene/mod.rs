//! # Scene System
//!
//! Per-frame assembly of drawable geometry.
//!
//! ## Architecture
//!
//! - **Primitives**: shared handles the scene calls back to link, gather and unlink
//! - **Depth groups**: ordered passes, each owning its draw lists
//! - **Scene**: registered primitives plus depth groups, built and cleared per frame
//! - **Renderer**: build, draw every group in order, clear
//! - **Bounds / view**: frustum culling and per-view settings

pub mod bounds;
pub mod depth_group;
pub mod primitive;
pub mod renderer;
#[allow(clippy::module_inception)]
pub mod scene;
pub mod sprite;
pub mod static_mesh;
pub mod view;

pub use bounds::{Frustum, Plane, AABB};
#[cfg(feature = "editor")]
pub use depth_group::DynamicMeshElement;
pub use depth_group::{DepthGroup, DrawListKind, SceneDepthGroup, SceneDepthGroups};
pub use primitive::{primitive_ref, Primitive, PrimitiveRef};
pub use renderer::{FrameStats, SceneRenderer};
pub use scene::{BuildStats, Scene, SceneId, SceneState};
pub use sprite::SpritePrimitive;
pub use static_mesh::{StaticMesh, StaticMeshElement, StaticMeshPrimitive, StaticMeshVertex};
pub use view::{SceneView, ShowFlags};
