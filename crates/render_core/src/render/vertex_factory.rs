//! # Vertex Factories
//!
//! A vertex factory binds vertex streams and a vertex declaration for drawing. Its
//! *type* (meta-type) selects shader permutations; its *instance* hash identifies the
//! concrete declaration and streams and takes part in drawing policy identity.

use std::sync::Arc;

use crate::foundation::hash::fast_hash;
use crate::render::buffers::VertexBuffer;
use crate::render::context::{RenderContext, RenderDevice};
use crate::render::resource::{RenderResource, ResourceHandle};
use crate::render::rhi::{RhiResource, VertexDeclarationRhi, VertexElement};
use crate::render::RenderResult;

/// Vertex factory meta-type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexFactoryType {
    name: &'static str,
    supports_instancing: bool,
}

impl VertexFactoryType {
    /// Static meshes: position/tangent basis/texcoord, instanced
    pub const LOCAL: Self = Self::new("LocalVertexFactory", true);

    /// Camera-facing sprite quads, instanced
    pub const SPRITE: Self = Self::new("SpriteVertexFactory", true);

    /// Immediate-mode dynamic meshes, one draw per instance
    pub const DYNAMIC_MESH: Self = Self::new("DynamicMeshVertexFactory", false);

    /// Declare a vertex factory type
    pub const fn new(name: &'static str, supports_instancing: bool) -> Self {
        Self {
            name,
            supports_instancing,
        }
    }

    /// Type name
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Whether shaders of this type read per-instance data
    pub fn supports_instancing(&self) -> bool {
        self.supports_instancing
    }

    /// Hash used to look up shaders for this type
    pub fn hash(&self) -> u64 {
        fast_hash(self.name, 0)
    }
}

/// Vertex factory interface consumed by drawing policies
pub trait VertexFactory: Send + Sync {
    /// Debug name
    fn name(&self) -> &str;

    /// Meta-type of the factory
    fn factory_type(&self) -> VertexFactoryType;

    /// Hash of the meta-type, used to select shaders
    fn meta_type_hash(&self) -> u64 {
        self.factory_type().hash()
    }

    /// Whether instanced draws are supported; otherwise each instance is drawn alone
    fn supports_instancing(&self) -> bool {
        self.factory_type().supports_instancing()
    }

    /// Hash of this instance: meta-type, declaration and streams
    fn type_hash(&self) -> u64;

    /// True when the factory and every stream it binds are initialized
    fn is_valid(&self) -> bool;

    /// Declaration used to build bound shader states. Panics if uninitialized.
    fn vertex_declaration(&self) -> VertexDeclarationRhi;

    /// Bind the vertex streams. Panics if uninitialized.
    fn set(&self, device: &mut RenderDevice);
}

/// Shared vertex factory reference
pub type VertexFactoryRef = Arc<dyn VertexFactory>;

/// One vertex stream bound by a [`GeneralVertexFactory`]
#[derive(Debug, Clone)]
pub struct VertexStream {
    /// Source buffer
    pub buffer: ResourceHandle<VertexBuffer>,
    /// Vertex stride in bytes
    pub stride: u32,
}

impl VertexStream {
    /// Stream over a whole vertex buffer using its own stride
    pub fn new(buffer: ResourceHandle<VertexBuffer>) -> Self {
        let stride = buffer.lock().stride();
        Self { buffer, stride }
    }
}

/// Vertex factory described by a list of elements over a list of streams
#[derive(Debug)]
pub struct GeneralVertexFactory {
    factory_type: VertexFactoryType,
    elements: Vec<VertexElement>,
    streams: Vec<VertexStream>,
    declaration: Option<VertexDeclarationRhi>,
}

impl GeneralVertexFactory {
    /// Create a vertex factory
    pub fn new(factory_type: VertexFactoryType, elements: Vec<VertexElement>, streams: Vec<VertexStream>) -> Self {
        Self {
            factory_type,
            elements,
            streams,
            declaration: None,
        }
    }

    /// Declaration elements
    pub fn elements(&self) -> &[VertexElement] {
        &self.elements
    }

    /// Bound streams
    pub fn streams(&self) -> &[VertexStream] {
        &self.streams
    }

    /// Replace the streams. The factory must be updated to pick them up.
    pub fn set_streams(&mut self, streams: Vec<VertexStream>) {
        self.streams = streams;
    }
}

impl RenderResource for GeneralVertexFactory {
    fn init_rhi(&mut self, context: &mut RenderContext) -> RenderResult<()> {
        let declaration = context.device_mut().rhi_mut().create_vertex_declaration(&self.elements)?;
        self.declaration = Some(declaration);
        Ok(())
    }

    fn release_rhi(&mut self, context: &mut RenderContext) {
        if let Some(declaration) = self.declaration.take() {
            context
                .device_mut()
                .rhi_mut()
                .release(RhiResource::VertexDeclaration(declaration));
        }
    }
}

impl VertexFactory for ResourceHandle<GeneralVertexFactory> {
    fn name(&self) -> &str {
        ResourceHandle::name(self)
    }

    fn factory_type(&self) -> VertexFactoryType {
        self.lock().factory_type
    }

    fn type_hash(&self) -> u64 {
        let factory = self.lock();
        let mut hash = fast_hash(&factory.elements, factory.factory_type.hash());
        for stream in &factory.streams {
            hash = fast_hash(&(stream.buffer.id(), stream.stride), hash);
        }
        hash
    }

    fn is_valid(&self) -> bool {
        self.is_initialized() && self.lock().streams.iter().all(|stream| stream.buffer.is_initialized())
    }

    fn vertex_declaration(&self) -> VertexDeclarationRhi {
        match self.get().declaration {
            Some(declaration) => declaration,
            None => panic!("vertex factory '{}' has no vertex declaration", ResourceHandle::name(self)),
        }
    }

    fn set(&self, device: &mut RenderDevice) {
        let factory = self.get();
        for (index, stream) in factory.streams.iter().enumerate() {
            if let Some(buffer) = stream.buffer.get().rhi() {
                device
                    .rhi_mut()
                    .set_stream_source(u32::try_from(index).unwrap_or(u32::MAX), buffer, stream.stride, 0);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::RenderCoreConfig;
    use crate::render::rhi::{NullRhi, ResourceUsage, RhiCall, VertexElementType, VertexElementUsage};

    fn position_elements() -> Vec<VertexElement> {
        vec![VertexElement::new(0, 0, VertexElementType::Float4, VertexElementUsage::Position, 0)]
    }

    fn buffer(name: &str) -> ResourceHandle<VertexBuffer> {
        let vertices = [[0.0_f32; 4]; 3];
        ResourceHandle::new(name, VertexBuffer::from_vertices(name, &vertices, ResourceUsage::Static))
    }

    #[test]
    fn test_meta_type_hash_depends_on_name_only() {
        assert_eq!(VertexFactoryType::LOCAL.hash(), VertexFactoryType::new("LocalVertexFactory", false).hash());
        assert_ne!(VertexFactoryType::LOCAL.hash(), VertexFactoryType::SPRITE.hash());
    }

    #[test]
    fn test_type_hash_tracks_streams() {
        let shared = buffer("shared");
        let a = ResourceHandle::new(
            "a",
            GeneralVertexFactory::new(VertexFactoryType::LOCAL, position_elements(), vec![VertexStream::new(shared.clone())]),
        );
        let b = ResourceHandle::new(
            "b",
            GeneralVertexFactory::new(VertexFactoryType::LOCAL, position_elements(), vec![VertexStream::new(shared)]),
        );
        let c = ResourceHandle::new(
            "c",
            GeneralVertexFactory::new(VertexFactoryType::LOCAL, position_elements(), vec![VertexStream::new(buffer("other"))]),
        );
        assert_eq!(a.type_hash(), b.type_hash());
        assert_ne!(a.type_hash(), c.type_hash());
        assert_eq!(VertexStream::new(buffer("stride")).stride, 16);
    }

    #[test]
    fn test_valid_only_after_streams_and_factory_init() {
        let mut ctx = RenderContext::new(RenderCoreConfig::default(), Box::new(NullRhi::with_call_recording()));
        let vertices = buffer("vb");
        let factory = ResourceHandle::new(
            "vf",
            GeneralVertexFactory::new(VertexFactoryType::LOCAL, position_elements(), vec![VertexStream::new(vertices.clone())]),
        );

        factory.init_resource(&mut ctx);
        assert!(!factory.is_valid());

        vertices.init_resource(&mut ctx);
        assert!(factory.is_valid());

        factory.set(ctx.device_mut());
        let rhi = ctx.device().backend::<NullRhi>().unwrap();
        assert!(matches!(
            rhi.calls(),
            [RhiCall::SetStreamSource { stream_index: 0, stride: 16, .. }]
        ));
    }

    #[test]
    #[should_panic(expected = "used before it was initialized")]
    fn test_set_before_init_panics() {
        let mut ctx = RenderContext::new(RenderCoreConfig::default(), Box::new(NullRhi::new()));
        let factory = ResourceHandle::new(
            "uninit",
            GeneralVertexFactory::new(VertexFactoryType::LOCAL, position_elements(), Vec::new()),
        );
        factory.set(ctx.device_mut());
    }
}
