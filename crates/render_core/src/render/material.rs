//! # Materials and Mesh Shaders
//!
//! The render core does not compile shaders. A [`Material`] hands out already
//! created [`MeshShader`]s per vertex factory type, stage and drawing policy kind;
//! the drawing policy binds them and lets them upload their parameters.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::foundation::hash::FxHashMap;
use crate::render::context::RenderDevice;
use crate::render::drawing_policy::DrawingPolicyKind;
use crate::render::mesh_batch::{InstanceData, MeshBatch};
use crate::render::rhi::{ShaderFrequency, ShaderRhi, TextureRhi};
use crate::render::vertex_factory::VertexFactory;
use crate::scene::SceneView;

/// Constant slot receiving the view-projection matrix
pub const VIEW_CONSTANTS_SLOT: u32 = 0;

/// Constant slot receiving per-instance data
pub const INSTANCE_CONSTANTS_SLOT: u32 = 1;

/// Texture slot the base color texture is bound to
pub const DIFFUSE_TEXTURE_SLOT: u32 = 0;

/// Name of the material texture parameter bound by [`MeshShader::set_constant_parameters`]
pub const DIFFUSE_TEXTURE_PARAMETER: &str = "diffuse";

/// A compiled shader of one stage, usable with mesh drawing policies
pub trait MeshShader: Send + Sync {
    /// Debug name
    fn name(&self) -> &str;

    /// Pipeline stage
    fn frequency(&self) -> ShaderFrequency;

    /// RHI handle
    fn rhi(&self) -> ShaderRhi;

    /// Upload parameters that are constant for every mesh drawn with one policy
    fn set_constant_parameters(&self, device: &mut RenderDevice, _vertex_factory: &dyn VertexFactory, material: &dyn Material) {
        if let Some(texture) = material.texture_parameter(DIFFUSE_TEXTURE_PARAMETER) {
            device
                .rhi_mut()
                .set_texture_parameter(self.frequency(), DIFFUSE_TEXTURE_SLOT, texture);
        }
    }

    /// Upload per-draw parameters for `num_instances` instances of `batch` starting at
    /// `first_instance`
    fn set_mesh(
        &self,
        device: &mut RenderDevice,
        batch: &MeshBatch,
        view: &SceneView,
        first_instance: usize,
        num_instances: usize,
    ) {
        if self.frequency() != ShaderFrequency::Vertex {
            return;
        }

        let view_projection = crate::foundation::math::to_cols_array(view.view_projection());
        device
            .rhi_mut()
            .set_shader_constants(self.frequency(), VIEW_CONSTANTS_SLOT, bytemuck::cast_slice(&view_projection));

        let instances: Vec<InstanceData> = batch
            .instances()
            .iter()
            .skip(first_instance)
            .take(num_instances)
            .map(|instance| instance.to_instance_data())
            .collect();
        device
            .rhi_mut()
            .set_shader_constants(self.frequency(), INSTANCE_CONSTANTS_SLOT, bytemuck::cast_slice(&instances));
    }
}

/// Shared shader reference
pub type ShaderRef = Arc<dyn MeshShader>;

/// Surface description consumed by drawing policies
pub trait Material: Send + Sync {
    /// Debug name
    fn name(&self) -> &str;

    /// False while the material's shaders or textures are unavailable
    fn is_loaded(&self) -> bool {
        true
    }

    /// Shader for a vertex factory meta-type, stage and policy kind
    fn shader(&self, vertex_factory_type: u64, frequency: ShaderFrequency, kind: DrawingPolicyKind) -> Option<ShaderRef>;

    /// Draw both faces
    fn is_two_sided(&self) -> bool {
        false
    }

    /// Draw as wireframe
    fn is_wireframe(&self) -> bool {
        false
    }

    /// Scalar parameter lookup
    fn scalar_parameter(&self, _name: &str) -> Option<f32> {
        None
    }

    /// Texture parameter lookup
    fn texture_parameter(&self, _name: &str) -> Option<TextureRhi> {
        None
    }
}

/// Shared material reference. Identity (pointer) equality is material equality.
pub type MaterialRef = Arc<dyn Material>;

/// Shader wrapping an RHI handle created elsewhere
#[derive(Debug, Clone)]
pub struct BasicShader {
    name: String,
    frequency: ShaderFrequency,
    rhi: ShaderRhi,
}

impl BasicShader {
    /// Create a shader
    pub fn new(name: impl Into<String>, frequency: ShaderFrequency, rhi: ShaderRhi) -> Self {
        Self {
            name: name.into(),
            frequency,
            rhi,
        }
    }

    /// Create a shared shader
    pub fn shared(name: impl Into<String>, frequency: ShaderFrequency, rhi: ShaderRhi) -> ShaderRef {
        Arc::new(Self::new(name, frequency, rhi))
    }
}

impl MeshShader for BasicShader {
    fn name(&self) -> &str {
        &self.name
    }

    fn frequency(&self) -> ShaderFrequency {
        self.frequency
    }

    fn rhi(&self) -> ShaderRhi {
        self.rhi
    }
}

/// Table-driven material.
///
/// Shaders are registered per policy kind and stage and shared across vertex
/// factory types unless a type-specific shader is registered.
#[derive(Default)]
pub struct BasicMaterial {
    name: String,
    shaders: FxHashMap<(DrawingPolicyKind, ShaderFrequency), ShaderRef>,
    typed_shaders: FxHashMap<(u64, DrawingPolicyKind, ShaderFrequency), ShaderRef>,
    two_sided: bool,
    wireframe: bool,
    loaded: AtomicBool,
    scalars: FxHashMap<String, f32>,
    textures: FxHashMap<String, TextureRhi>,
}

impl BasicMaterial {
    /// Create a loaded material with no shaders
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            loaded: AtomicBool::new(true),
            ..Self::default()
        }
    }

    /// Register a shader for a policy kind, shared by every vertex factory type
    pub fn with_shader(mut self, kind: DrawingPolicyKind, shader: ShaderRef) -> Self {
        self.shaders.insert((kind, shader.frequency()), shader);
        self
    }

    /// Register a shader for one vertex factory meta-type
    pub fn with_typed_shader(mut self, vertex_factory_type: u64, kind: DrawingPolicyKind, shader: ShaderRef) -> Self {
        self.typed_shaders
            .insert((vertex_factory_type, kind, shader.frequency()), shader);
        self
    }

    /// Draw both faces
    pub fn with_two_sided(mut self, two_sided: bool) -> Self {
        self.two_sided = two_sided;
        self
    }

    /// Draw as wireframe
    pub fn with_wireframe(mut self, wireframe: bool) -> Self {
        self.wireframe = wireframe;
        self
    }

    /// Add a scalar parameter
    pub fn with_scalar(mut self, name: impl Into<String>, value: f32) -> Self {
        self.scalars.insert(name.into(), value);
        self
    }

    /// Add a texture parameter
    pub fn with_texture(mut self, name: impl Into<String>, texture: TextureRhi) -> Self {
        self.textures.insert(name.into(), texture);
        self
    }

    /// Mark the material loaded or unloaded (e.g. while reloading its package)
    pub fn set_loaded(&self, loaded: bool) {
        self.loaded.store(loaded, Ordering::Release);
    }
}

impl Material for BasicMaterial {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::Acquire)
    }

    fn shader(&self, vertex_factory_type: u64, frequency: ShaderFrequency, kind: DrawingPolicyKind) -> Option<ShaderRef> {
        self.typed_shaders
            .get(&(vertex_factory_type, kind, frequency))
            .or_else(|| self.shaders.get(&(kind, frequency)))
            .cloned()
    }

    fn is_two_sided(&self) -> bool {
        self.two_sided
    }

    fn is_wireframe(&self) -> bool {
        self.wireframe
    }

    fn scalar_parameter(&self, name: &str) -> Option<f32> {
        self.scalars.get(name).copied()
    }

    fn texture_parameter(&self, name: &str) -> Option<TextureRhi> {
        self.textures.get(name).copied()
    }
}

impl std::fmt::Debug for BasicMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BasicMaterial")
            .field("name", &self.name)
            .field("shaders", &(self.shaders.len() + self.typed_shaders.len()))
            .field("loaded", &self.is_loaded())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_shader_overrides_shared_shader() {
        let shared = BasicShader::shared("SharedVS", ShaderFrequency::Vertex, ShaderRhi(1));
        let typed = BasicShader::shared("TypedVS", ShaderFrequency::Vertex, ShaderRhi(2));
        let material = BasicMaterial::new("M")
            .with_shader(DrawingPolicyKind::Base, shared)
            .with_typed_shader(77, DrawingPolicyKind::Base, typed);

        let for_typed = material.shader(77, ShaderFrequency::Vertex, DrawingPolicyKind::Base).unwrap();
        let for_other = material.shader(5, ShaderFrequency::Vertex, DrawingPolicyKind::Base).unwrap();
        assert_eq!(for_typed.rhi(), ShaderRhi(2));
        assert_eq!(for_other.rhi(), ShaderRhi(1));
        assert!(material.shader(5, ShaderFrequency::Pixel, DrawingPolicyKind::Base).is_none());
        assert!(material.shader(5, ShaderFrequency::Vertex, DrawingPolicyKind::DepthOnly).is_none());
    }

    #[test]
    fn test_parameters_and_flags() {
        let material = BasicMaterial::new("Glass")
            .with_two_sided(true)
            .with_scalar("opacity", 0.25)
            .with_texture(DIFFUSE_TEXTURE_PARAMETER, TextureRhi(9));
        assert!(material.is_two_sided());
        assert!(!material.is_wireframe());
        assert_eq!(material.scalar_parameter("opacity"), Some(0.25));
        assert_eq!(material.texture_parameter("diffuse"), Some(TextureRhi(9)));

        assert!(material.is_loaded());
        material.set_loaded(false);
        assert!(!material.is_loaded());
    }
}
