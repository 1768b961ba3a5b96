//! # Drawing Policies
//!
//! A drawing policy is the "how to draw" half of a draw call: vertex factory,
//! material, depth bias and pass kind. Two policies with equal hashes that
//! [`DrawingPolicy::matches`] set identical render state, so everything drawn with
//! them can share one state change and be instanced together.
//!
//! ## Architecture
//!
//! - [`DrawingPolicy`]: capability interface used by [`crate::render::MeshDrawList`]
//! - [`MeshDrawingPolicy`]: the mesh policy, tagged by [`DrawingPolicyKind`]

use crate::foundation::hash::{fast_hash, ptr_eq, ptr_hash};
use crate::render::bound_shader_state::BoundShaderStateKey;
use crate::render::context::RenderDevice;
use crate::render::material::{MaterialRef, ShaderRef};
use crate::render::mesh_batch::MeshBatch;
use crate::render::rhi::{CullMode, FillMode, IndexBufferRhi, RasterizerStateDesc, ShaderFrequency};
use crate::render::vertex_factory::VertexFactoryRef;
use crate::render::{RenderError, RenderResult};
use crate::scene::SceneView;

/// Interface every policy stored in a mesh draw list implements
pub trait DrawingPolicy: Clone {
    /// Debug name for logging
    fn debug_name(&self) -> &str;

    /// Structural hash; equal for policies that match
    fn type_hash(&self) -> u64;

    /// Exact identity check used to resolve hash collisions
    fn matches(&self, other: &Self) -> bool;

    /// False when an input (material, vertex factory, shader) is unavailable.
    /// Invalid policies are skipped at draw time.
    fn is_valid(&self) -> bool;

    /// Bind vertex streams, rasterizer state and the bound shader state
    fn set_render_state(&self, device: &mut RenderDevice) -> RenderResult<()>;

    /// Upload parameters shared by every batch drawn with this policy
    fn set_shader_parameters(&self, device: &mut RenderDevice);

    /// Draw the batch's instances. Returns the number of draw calls issued.
    fn draw(&self, device: &mut RenderDevice, batch: &MeshBatch, view: &SceneView) -> u32;

    /// Policy to draw with instead when the view is in wireframe mode
    fn wireframe_variant(&self) -> Option<Self> {
        None
    }

    /// Policy to draw with in a depth prepass, if the link takes part in one
    fn depth_only_variant(&self) -> Option<Self> {
        None
    }
}

/// Pass a mesh drawing policy renders for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DrawingPolicyKind {
    /// Lit/unlit base pass
    Base,
    /// Depth prepass
    DepthOnly,
    /// Editor hit-proxy ids
    HitProxy,
    /// Editor wireframe
    Wireframe,
}

/// Drawing policy for meshes
#[derive(Clone)]
pub struct MeshDrawingPolicy {
    kind: DrawingPolicyKind,
    vertex_factory: VertexFactoryRef,
    material: MaterialRef,
    vertex_shader: Option<ShaderRef>,
    pixel_shader: Option<ShaderRef>,
    depth_bias: f32,
    hash: u64,
}

impl MeshDrawingPolicy {
    /// Create a policy, resolving its shaders from the material.
    ///
    /// Wireframe policies fall back to the material's base shaders when it has no
    /// dedicated wireframe shaders.
    pub fn new(kind: DrawingPolicyKind, vertex_factory: VertexFactoryRef, material: MaterialRef, depth_bias: f32) -> Self {
        let meta_type = vertex_factory.meta_type_hash();
        let resolve = |frequency| {
            material.shader(meta_type, frequency, kind).or_else(|| {
                if kind == DrawingPolicyKind::Wireframe {
                    material.shader(meta_type, frequency, DrawingPolicyKind::Base)
                } else {
                    None
                }
            })
        };
        let vertex_shader = resolve(ShaderFrequency::Vertex);
        let pixel_shader = resolve(ShaderFrequency::Pixel);

        let hash = fast_hash(
            &(vertex_factory.type_hash(), kind, depth_bias.to_bits()),
            ptr_hash(&material, 0),
        );

        Self {
            kind,
            vertex_factory,
            material,
            vertex_shader,
            pixel_shader,
            depth_bias,
            hash,
        }
    }

    /// Pass kind
    pub fn kind(&self) -> DrawingPolicyKind {
        self.kind
    }

    /// Material
    pub fn material(&self) -> &MaterialRef {
        &self.material
    }

    /// Vertex factory
    pub fn vertex_factory(&self) -> &VertexFactoryRef {
        &self.vertex_factory
    }

    /// Depth bias
    pub fn depth_bias(&self) -> f32 {
        self.depth_bias
    }

    /// Rasterizer state derived from the material and kind
    pub fn rasterizer_state(&self) -> RasterizerStateDesc {
        let fill_mode = if self.kind == DrawingPolicyKind::Wireframe || self.material.is_wireframe() {
            FillMode::Wireframe
        } else {
            FillMode::Solid
        };
        let cull_mode = if self.material.is_two_sided() {
            CullMode::None
        } else {
            CullMode::CounterClockwise
        };
        RasterizerStateDesc {
            fill_mode,
            cull_mode,
            depth_bias: self.depth_bias,
            slope_scale_depth_bias: 0.0,
        }
    }

    /// Key of the bound shader state this policy binds
    pub fn bound_shader_state_key(&self) -> RenderResult<BoundShaderStateKey> {
        match (&self.vertex_shader, &self.pixel_shader) {
            (Some(vertex_shader), Some(pixel_shader)) => Ok(BoundShaderStateKey::new(
                self.vertex_factory.vertex_declaration(),
                vertex_shader.rhi(),
                pixel_shader.rhi(),
            )),
            _ => Err(RenderError::MissingShader {
                material: self.material.name().to_string(),
                kind: self.kind,
            }),
        }
    }

    fn shaders(&self) -> impl Iterator<Item = &ShaderRef> {
        self.vertex_shader.iter().chain(self.pixel_shader.iter())
    }

    fn set_mesh(&self, device: &mut RenderDevice, batch: &MeshBatch, view: &SceneView, first_instance: usize, num_instances: usize) {
        for shader in self.shaders() {
            shader.set_mesh(device, batch, view, first_instance, num_instances);
        }
        device.rhi_mut().commit_constants();
    }

    fn submit(device: &mut RenderDevice, batch: &MeshBatch, index_buffer: Option<IndexBufferRhi>, num_instances: u32) {
        match index_buffer {
            Some(index_buffer) => device.rhi_mut().draw_indexed_primitive(
                index_buffer,
                batch.topology(),
                batch.base_vertex_index(),
                batch.first_index(),
                batch.num_primitives(),
                num_instances,
            ),
            None => device.rhi_mut().draw_primitive(
                batch.topology(),
                batch.base_vertex_index(),
                batch.num_primitives(),
                num_instances,
            ),
        }
    }
}

impl DrawingPolicy for MeshDrawingPolicy {
    fn debug_name(&self) -> &str {
        self.material.name()
    }

    fn type_hash(&self) -> u64 {
        self.hash
    }

    fn matches(&self, other: &Self) -> bool {
        self.kind == other.kind
            && ptr_eq(&self.material, &other.material)
            && self.vertex_factory.type_hash() == other.vertex_factory.type_hash()
            && self.depth_bias.to_bits() == other.depth_bias.to_bits()
    }

    fn is_valid(&self) -> bool {
        self.material.is_loaded()
            && self.vertex_factory.is_valid()
            && self.vertex_shader.is_some()
            && self.pixel_shader.is_some()
    }

    fn set_render_state(&self, device: &mut RenderDevice) -> RenderResult<()> {
        self.vertex_factory.set(device);
        device.rhi_mut().set_rasterizer_state(&self.rasterizer_state());

        let key = self.bound_shader_state_key()?;
        let state = device.bound_shader_state(self.material.name(), &key)?;
        device.rhi_mut().set_bound_shader_state(state);
        Ok(())
    }

    fn set_shader_parameters(&self, device: &mut RenderDevice) {
        for shader in self.shaders() {
            shader.set_constant_parameters(device, self.vertex_factory.as_ref(), self.material.as_ref());
        }
    }

    fn draw(&self, device: &mut RenderDevice, batch: &MeshBatch, view: &SceneView) -> u32 {
        let num_instances = batch.num_instances();
        if num_instances == 0 {
            return 0;
        }

        let index_buffer = batch.index_buffer().and_then(|buffer| buffer.get().rhi());

        if self.vertex_factory.supports_instancing() {
            self.set_mesh(device, batch, view, 0, num_instances);
            Self::submit(device, batch, index_buffer, u32::try_from(num_instances).unwrap_or(u32::MAX));
            1
        } else {
            for instance in 0..num_instances {
                self.set_mesh(device, batch, view, instance, 1);
                Self::submit(device, batch, index_buffer, 1);
            }
            u32::try_from(num_instances).unwrap_or(u32::MAX)
        }
    }

    fn wireframe_variant(&self) -> Option<Self> {
        if self.kind == DrawingPolicyKind::Wireframe {
            return None;
        }
        Some(Self::new(
            DrawingPolicyKind::Wireframe,
            self.vertex_factory.clone(),
            self.material.clone(),
            self.depth_bias,
        ))
    }

    fn depth_only_variant(&self) -> Option<Self> {
        if self.kind != DrawingPolicyKind::Base {
            return None;
        }
        Some(Self::new(
            DrawingPolicyKind::DepthOnly,
            self.vertex_factory.clone(),
            self.material.clone(),
            self.depth_bias,
        ))
    }
}

impl std::fmt::Debug for MeshDrawingPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MeshDrawingPolicy")
            .field("kind", &self.kind)
            .field("material", &self.material.name())
            .field("vertex_factory", &self.vertex_factory.name())
            .field("depth_bias", &self.depth_bias)
            .field("hash", &format_args!("{:#018x}", self.hash))
            .finish()
    }
}
