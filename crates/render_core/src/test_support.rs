//! Fixtures shared by the unit tests

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::core::RenderCoreConfig;
use crate::foundation::math::{Mat4, Point3, Vec3};
use crate::render::buffers::{IndexBuffer, VertexBuffer};
use crate::render::drawing_policy::DrawingPolicyKind;
use crate::render::material::{BasicMaterial, BasicShader, MaterialRef};
use crate::render::resource::ResourceHandle;
use crate::render::rhi::{
    NullRhi, ResourceUsage, ShaderFrequency, ShaderRhi, VertexElement, VertexElementType, VertexElementUsage,
};
use crate::render::vertex_factory::{GeneralVertexFactory, VertexFactoryType, VertexStream};
use crate::render::RenderContext;
use crate::scene::SceneView;

static NEXT_SHADER: AtomicU64 = AtomicU64::new(1);

/// Context over a call-recording null backend
pub(crate) fn context() -> RenderContext {
    RenderContext::new(RenderCoreConfig::default(), Box::new(NullRhi::with_call_recording()))
}

/// The null backend behind `context`
pub(crate) fn null_rhi(context: &RenderContext) -> &NullRhi {
    context
        .device()
        .backend::<NullRhi>()
        .expect("test context uses the null backend")
}

/// Loaded material with distinct vertex and pixel shaders for every kind except
/// wireframe
pub(crate) fn material(name: &str) -> MaterialRef {
    let mut material = BasicMaterial::new(name);
    for kind in [DrawingPolicyKind::Base, DrawingPolicyKind::DepthOnly, DrawingPolicyKind::HitProxy] {
        for frequency in [ShaderFrequency::Vertex, ShaderFrequency::Pixel] {
            let rhi = ShaderRhi(NEXT_SHADER.fetch_add(1, Ordering::Relaxed));
            material = material.with_shader(kind, BasicShader::shared(format!("{name}.{kind:?}.{frequency:?}"), frequency, rhi));
        }
    }
    Arc::new(material)
}

/// Initialized vertex factory over one initialized three-vertex stream
pub(crate) fn vertex_factory(
    context: &mut RenderContext,
    name: &str,
    factory_type: VertexFactoryType,
) -> ResourceHandle<GeneralVertexFactory> {
    let vertices = [[0.0_f32; 4]; 3];
    let buffer = ResourceHandle::new(
        format!("{name}.VertexBuffer"),
        VertexBuffer::from_vertices(format!("{name}.VertexBuffer"), &vertices, ResourceUsage::Static),
    );
    buffer.init_now(context);

    let factory = ResourceHandle::new(
        name,
        GeneralVertexFactory::new(
            factory_type,
            vec![VertexElement::new(0, 0, VertexElementType::Float4, VertexElementUsage::Position, 0)],
            vec![VertexStream::new(buffer)],
        ),
    );
    factory.init_now(context);
    factory
}

/// Initialized index buffer with `num_indices` sequential indices
pub(crate) fn index_buffer(context: &mut RenderContext, name: &str, num_indices: u32) -> ResourceHandle<IndexBuffer> {
    let buffer = ResourceHandle::new(name, IndexBuffer::new(name, (0..num_indices).collect(), ResourceUsage::Static));
    buffer.init_now(context);
    buffer
}

/// Camera at (0, 0, 10) looking at the origin
pub(crate) fn view() -> SceneView {
    let view = Mat4::look_at_rh(&Point3::new(0.0, 0.0, 10.0), &Point3::origin(), &Vec3::y());
    let projection = Mat4::new_perspective(16.0 / 9.0, std::f32::consts::FRAC_PI_3, 0.1, 100.0);
    SceneView::new(view, projection, (1280, 720))
}
