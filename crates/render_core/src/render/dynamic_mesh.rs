//! # Dynamic Mesh Builder
//!
//! Immediate-mode mesh accumulator used by editor helpers (gizmos, selection
//! boxes, debug shapes). Any thread may append vertices and triangles; the
//! accumulator is guarded by its own mutex, held only for the append or for the
//! hand-off to the GPU buffers. `build` moves the accumulated geometry into vertex
//! and index buffers on the rendering thread and frees the CPU copy.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytemuck::{Pod, Zeroable};

use crate::foundation::math::{Mat4, Vec3};
use crate::render::buffers::{IndexBuffer, VertexBuffer};
use crate::render::command_queue::RenderCommandSink;
use crate::render::context::{RenderContext, RenderDevice};
use crate::render::draw_list::DrawListStats;
use crate::render::drawing_policy::{DrawingPolicy, DrawingPolicyKind, MeshDrawingPolicy};
use crate::render::material::MaterialRef;
use crate::render::mesh_batch::{MeshBatch, MeshInstance};
use crate::render::resource::{RenderResource, ResourceHandle};
use crate::render::rhi::{PrimitiveTopology, ResourceUsage, VertexElement, VertexElementType, VertexElementUsage};
use crate::render::vertex_factory::{GeneralVertexFactory, VertexFactoryRef, VertexFactoryType, VertexStream};
use crate::render::{RenderError, RenderResult};
use crate::scene::SceneView;

/// Vertex layout of dynamic meshes
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct DynamicMeshVertex {
    /// Position (w = 1)
    pub position: [f32; 4],
    /// Texture coordinate
    pub tex_coord: [f32; 2],
    /// Normal (w = 0)
    pub normal: [f32; 4],
    /// Linear RGBA color
    pub color: [f32; 4],
}

impl DynamicMeshVertex {
    /// Create a vertex
    pub fn new(position: Vec3, tex_coord: [f32; 2], normal: Vec3, color: [f32; 4]) -> Self {
        Self {
            position: [position.x, position.y, position.z, 1.0],
            tex_coord,
            normal: [normal.x, normal.y, normal.z, 0.0],
            color,
        }
    }

    /// Declaration elements for this layout on stream 0
    pub fn elements() -> Vec<VertexElement> {
        vec![
            VertexElement::new(0, 0, VertexElementType::Float4, VertexElementUsage::Position, 0),
            VertexElement::new(0, 16, VertexElementType::Float2, VertexElementUsage::TexCoord, 0),
            VertexElement::new(0, 24, VertexElementType::Float4, VertexElementUsage::Normal, 0),
            VertexElement::new(0, 40, VertexElementType::Float4, VertexElementUsage::Color, 0),
        ]
    }
}

#[derive(Debug, Default)]
struct Accumulator {
    vertices: Vec<DynamicMeshVertex>,
    indices: Vec<u32>,
}

/// GPU side of a dynamic mesh
#[derive(Debug)]
pub struct DynamicMesh {
    name: String,
    accumulator: Arc<Mutex<Accumulator>>,
    vertex_buffer: ResourceHandle<VertexBuffer>,
    index_buffer: ResourceHandle<IndexBuffer>,
    vertex_factory: ResourceHandle<GeneralVertexFactory>,
    num_primitives: u32,
}

impl DynamicMesh {
    /// Triangles uploaded by the last build
    pub fn num_primitives(&self) -> u32 {
        self.num_primitives
    }
}

impl RenderResource for DynamicMesh {
    fn init_rhi(&mut self, context: &mut RenderContext) -> RenderResult<()> {
        let (vertices, indices) = {
            let mut accumulator = self.accumulator.lock().unwrap_or_else(PoisonError::into_inner);
            (
                std::mem::take(&mut accumulator.vertices),
                std::mem::take(&mut accumulator.indices),
            )
        };

        if let Some(index) = indices.iter().find(|index| **index as usize >= vertices.len()) {
            return Err(RenderError::ResourceCreation {
                name: self.name.clone(),
                reason: format!("index {} out of range for {} vertices", index, vertices.len()),
            });
        }

        self.num_primitives = u32::try_from(indices.len() / 3).unwrap_or(u32::MAX);
        self.vertex_buffer.lock().set_vertices(&vertices);
        self.index_buffer.lock().set_indices(indices);

        self.vertex_buffer.init_now(context);
        self.index_buffer.init_now(context);
        self.vertex_factory.init_now(context);

        if self.vertex_buffer.is_initialized() && self.index_buffer.is_initialized() && self.vertex_factory.is_initialized() {
            Ok(())
        } else {
            Err(RenderError::ResourceCreation {
                name: self.name.clone(),
                reason: "vertex or index buffer creation failed".to_string(),
            })
        }
    }

    fn release_rhi(&mut self, context: &mut RenderContext) {
        if self.vertex_factory.is_in_global_list() {
            self.vertex_factory.release_now(context);
        }
        if self.index_buffer.is_in_global_list() {
            self.index_buffer.release_now(context);
        }
        if self.vertex_buffer.is_in_global_list() {
            self.vertex_buffer.release_now(context);
        }
        self.num_primitives = 0;
    }
}

/// Thread-safe immediate-mode mesh builder
pub struct DynamicMeshBuilder {
    accumulator: Arc<Mutex<Accumulator>>,
    mesh: ResourceHandle<DynamicMesh>,
    vertex_factory: VertexFactoryRef,
}

impl DynamicMeshBuilder {
    /// Create an empty builder
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let accumulator = Arc::new(Mutex::new(Accumulator::default()));

        let vertex_buffer = ResourceHandle::new(
            format!("{name}.VertexBuffer"),
            VertexBuffer::from_vertices(format!("{name}.VertexBuffer"), &[] as &[DynamicMeshVertex], ResourceUsage::Dynamic),
        );
        let index_buffer = ResourceHandle::new(
            format!("{name}.IndexBuffer"),
            IndexBuffer::new(format!("{name}.IndexBuffer"), Vec::new(), ResourceUsage::Dynamic),
        );
        let vertex_factory = ResourceHandle::new(
            format!("{name}.VertexFactory"),
            GeneralVertexFactory::new(
                VertexFactoryType::DYNAMIC_MESH,
                DynamicMeshVertex::elements(),
                vec![VertexStream::new(vertex_buffer.clone())],
            ),
        );

        let mesh = ResourceHandle::new(
            name.clone(),
            DynamicMesh {
                name,
                accumulator: Arc::clone(&accumulator),
                vertex_buffer,
                index_buffer,
                vertex_factory: vertex_factory.clone(),
                num_primitives: 0,
            },
        );

        Self {
            accumulator,
            mesh,
            vertex_factory: Arc::new(vertex_factory),
        }
    }

    fn accumulator(&self) -> MutexGuard<'_, Accumulator> {
        self.accumulator.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append one vertex, returning its index
    pub fn add_vertex(&self, vertex: DynamicMeshVertex) -> u32 {
        let mut accumulator = self.accumulator();
        accumulator.vertices.push(vertex);
        u32::try_from(accumulator.vertices.len() - 1).unwrap_or(u32::MAX)
    }

    /// Append one triangle of previously added vertices
    pub fn add_triangle(&self, v0: u32, v1: u32, v2: u32) {
        self.accumulator().indices.extend_from_slice(&[v0, v1, v2]);
    }

    /// Append vertices and triangles in one step. `indices` are relative to the
    /// first vertex of `vertices`.
    pub fn add_mesh(&self, vertices: &[DynamicMeshVertex], indices: &[u32]) {
        let mut accumulator = self.accumulator();
        let base = u32::try_from(accumulator.vertices.len()).unwrap_or(u32::MAX);
        accumulator.vertices.extend_from_slice(vertices);
        accumulator.indices.extend(indices.iter().map(|index| base + index));
    }

    /// Append an axis-aligned box given its corners
    pub fn add_box(&self, min: Vec3, max: Vec3, color: [f32; 4]) {
        let corner = |x: f32, y: f32, z: f32| DynamicMeshVertex::new(Vec3::new(x, y, z), [0.0, 0.0], Vec3::zeros(), color);
        let vertices = [
            corner(min.x, min.y, min.z),
            corner(max.x, min.y, min.z),
            corner(max.x, max.y, min.z),
            corner(min.x, max.y, min.z),
            corner(min.x, min.y, max.z),
            corner(max.x, min.y, max.z),
            corner(max.x, max.y, max.z),
            corner(min.x, max.y, max.z),
        ];
        let indices = [
            0, 2, 1, 0, 3, 2, // -z
            4, 5, 6, 4, 6, 7, // +z
            0, 1, 5, 0, 5, 4, // -y
            3, 7, 6, 3, 6, 2, // +y
            0, 4, 7, 0, 7, 3, // -x
            1, 2, 6, 1, 6, 5, // +x
        ];
        self.add_mesh(&vertices, &indices);
    }

    /// Vertices waiting for the next build
    pub fn pending_vertices(&self) -> usize {
        self.accumulator().vertices.len()
    }

    /// Indices waiting for the next build
    pub fn pending_indices(&self) -> usize {
        self.accumulator().indices.len()
    }

    /// Upload the accumulated geometry on the rendering thread
    pub fn build(&self, sink: &mut impl RenderCommandSink) {
        let mesh = self.mesh.clone();
        sink.submit("BuildDynamicMesh", move |context| {
            if mesh.is_initialized() {
                mesh.update_now(context);
            } else {
                mesh.init_now(context);
            }
        });
    }

    /// Release the GPU buffers on the rendering thread
    pub fn release(&self, sink: &mut impl RenderCommandSink) {
        self.mesh.release_resource(sink);
    }

    /// True once a build has completed
    pub fn is_built(&self) -> bool {
        self.mesh.is_initialized()
    }

    /// Triangles uploaded by the last build
    pub fn num_primitives(&self) -> u32 {
        self.mesh.lock().num_primitives
    }

    /// Name
    pub fn name(&self) -> &str {
        self.mesh.name()
    }

    /// Draw the built mesh once with `material`.
    ///
    /// # Panics
    ///
    /// Panics if called before a build completed.
    pub fn draw(
        &self,
        device: &mut RenderDevice,
        local_to_world: &Mat4,
        material: &MaterialRef,
        kind: DrawingPolicyKind,
        view: &SceneView,
    ) -> DrawListStats {
        self.draw_instance(device, &MeshInstance::new(*local_to_world), material, kind, view)
    }

    /// Draw the built mesh once as `instance`, which carries the transform and
    /// the hit proxy id written by hit proxy policies.
    ///
    /// # Panics
    ///
    /// Panics if called before a build completed.
    pub fn draw_instance(
        &self,
        device: &mut RenderDevice,
        instance: &MeshInstance,
        material: &MaterialRef,
        kind: DrawingPolicyKind,
        view: &SceneView,
    ) -> DrawListStats {
        assert!(self.is_built(), "dynamic mesh '{}' drawn before build() completed", self.name());

        let mut stats = DrawListStats::default();
        let policy = MeshDrawingPolicy::new(kind, Arc::clone(&self.vertex_factory), Arc::clone(material), 0.0);
        if !policy.is_valid() {
            stats.links_skipped += 1;
            return stats;
        }

        let mut batch = {
            let mesh = self.mesh.get();
            MeshBatch::indexed(
                mesh.index_buffer.clone(),
                PrimitiveTopology::TriangleList,
                0,
                0,
                mesh.num_primitives,
            )
        };
        batch.add_instance(instance.clone());

        if let Err(err) = policy.set_render_state(device) {
            log::warn!("[DYNAMIC_MESH] skipping '{}': {}", self.name(), err);
            stats.links_skipped += 1;
            return stats;
        }
        policy.set_shader_parameters(device);
        stats.links_drawn = 1;
        stats.state_changes = 1;
        stats.draw_calls = policy.draw(device, &batch, view) as usize;
        stats.instances = 1;
        stats
    }
}

impl std::fmt::Debug for DynamicMeshBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamicMeshBuilder")
            .field("name", &self.name())
            .field("built", &self.is_built())
            .field("pending_vertices", &self.pending_vertices())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::rhi::NullRhi;
    use crate::test_support;

    fn vertex(x: f32) -> DynamicMeshVertex {
        DynamicMeshVertex::new(Vec3::new(x, 0.0, 0.0), [0.0, 0.0], Vec3::z(), [1.0; 4])
    }

    #[test]
    fn test_vertex_layout_matches_elements() {
        assert_eq!(std::mem::size_of::<DynamicMeshVertex>(), 56);
        let last = DynamicMeshVertex::elements().last().copied().unwrap();
        assert_eq!(last.offset + last.element_type.size(), 56);
    }

    #[test]
    fn test_concurrent_appends() {
        let builder = Arc::new(DynamicMeshBuilder::new("Concurrent"));
        let workers: Vec<_> = (0..4)
            .map(|worker| {
                let builder = Arc::clone(&builder);
                std::thread::spawn(move || {
                    for i in 0..50 {
                        let x = (worker * 100 + i) as f32;
                        builder.add_mesh(&[vertex(x), vertex(x + 0.5), vertex(x + 0.75)], &[0, 1, 2]);
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        assert_eq!(builder.pending_vertices(), 600);
        assert_eq!(builder.pending_indices(), 600);

        let mut ctx = test_support::context();
        builder.build(&mut ctx);
        assert!(builder.is_built());
        assert_eq!(builder.num_primitives(), 200);
        assert_eq!(builder.pending_vertices(), 0);
    }

    #[test]
    fn test_rebuild_replaces_geometry() {
        let mut ctx = test_support::context();
        let builder = DynamicMeshBuilder::new("Rebuild");
        builder.add_box(Vec3::new(-1.0, -1.0, -1.0), Vec3::new(1.0, 1.0, 1.0), [1.0; 4]);
        builder.build(&mut ctx);
        assert_eq!(builder.num_primitives(), 12);

        let a = builder.add_vertex(vertex(0.0));
        let b = builder.add_vertex(vertex(1.0));
        let c = builder.add_vertex(vertex(2.0));
        builder.add_triangle(a, b, c);
        builder.build(&mut ctx);
        assert_eq!(builder.num_primitives(), 1);

        builder.release(&mut ctx);
        assert!(!builder.is_built());
        assert!(ctx.global_resources().is_empty());
        assert_eq!(ctx.device().backend::<NullRhi>().unwrap().live_resource_count(), 0);
    }

    #[test]
    fn test_out_of_range_index_fails_build() {
        let mut ctx = test_support::context();
        let builder = DynamicMeshBuilder::new("Broken");
        builder.add_vertex(vertex(0.0));
        builder.add_triangle(0, 1, 2);
        builder.build(&mut ctx);
        assert!(!builder.is_built());
    }

    #[test]
    fn test_draw_issues_one_call() {
        let mut ctx = test_support::context();
        let builder = DynamicMeshBuilder::new("Gizmo");
        builder.add_box(Vec3::zeros(), Vec3::new(1.0, 1.0, 1.0), [0.0, 1.0, 0.0, 1.0]);
        builder.build(&mut ctx);

        let material: MaterialRef = test_support::material("Gizmo");
        let stats = builder.draw(
            ctx.device_mut(),
            &Mat4::identity(),
            &material,
            DrawingPolicyKind::Base,
            &test_support::view(),
        );
        assert_eq!(stats.draw_calls, 1);
        assert_eq!(test_support::null_rhi(&ctx).stats().draw_calls, 1);
    }

    #[test]
    #[should_panic(expected = "drawn before build")]
    fn test_draw_before_build_panics() {
        let mut ctx = test_support::context();
        let builder = DynamicMeshBuilder::new("Unbuilt");
        let material: MaterialRef = test_support::material("Unbuilt");
        builder.draw(ctx.device_mut(), &Mat4::identity(), &material, DrawingPolicyKind::Base, &test_support::view());
    }
}
