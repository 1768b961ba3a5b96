//! # Static Meshes
//!
//! [`StaticMesh`] is the GPU geometry (vertex buffer, index buffer, vertex factory)
//! plus one element per material section. [`StaticMeshPrimitive`] places a shared
//! mesh in a scene and links one drawing policy per element.

use std::sync::Arc;

use bytemuck::{Pod, Zeroable};

use crate::foundation::math::{Mat4, Vec3};
use crate::render::buffers::{IndexBuffer, VertexBuffer};
use crate::render::command_queue::RenderCommandSink;
use crate::render::drawing_policy::{DrawingPolicyKind, MeshDrawingPolicy};
use crate::render::material::MaterialRef;
use crate::render::mesh_batch::{HitProxyId, MeshBatch, MeshInstance};
use crate::render::resource::ResourceHandle;
use crate::render::rhi::{PrimitiveTopology, ResourceUsage, VertexElement, VertexElementType, VertexElementUsage};
use crate::render::vertex_factory::{GeneralVertexFactory, VertexFactoryRef, VertexFactoryType, VertexStream};
use crate::scene::bounds::AABB;
use crate::scene::depth_group::{DepthGroup, DrawListKind, SceneDepthGroups};
use crate::scene::primitive::{LinkRequest, MeshLinks, Primitive};
use crate::scene::view::SceneView;

/// Vertex layout of static meshes
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct StaticMeshVertex {
    /// Position
    pub position: [f32; 3],
    /// Normal
    pub normal: [f32; 3],
    /// Texture coordinate
    pub tex_coord: [f32; 2],
}

impl StaticMeshVertex {
    /// Create a vertex
    pub fn new(position: Vec3, normal: Vec3, tex_coord: [f32; 2]) -> Self {
        Self {
            position: position.into(),
            normal: normal.into(),
            tex_coord,
        }
    }

    /// Declaration elements for this layout on stream 0
    pub fn elements() -> Vec<VertexElement> {
        vec![
            VertexElement::new(0, 0, VertexElementType::Float3, VertexElementUsage::Position, 0),
            VertexElement::new(0, 12, VertexElementType::Float3, VertexElementUsage::Normal, 0),
            VertexElement::new(0, 24, VertexElementType::Float2, VertexElementUsage::TexCoord, 0),
        ]
    }
}

/// One material section of a static mesh
#[derive(Clone)]
pub struct StaticMeshElement {
    /// Material the section is drawn with unless overridden
    pub material: MaterialRef,
    /// First index of the section
    pub first_index: u32,
    /// Triangles in the section
    pub num_primitives: u32,
}

impl StaticMeshElement {
    /// Create a section
    pub fn new(material: MaterialRef, first_index: u32, num_primitives: u32) -> Self {
        Self {
            material,
            first_index,
            num_primitives,
        }
    }
}

impl std::fmt::Debug for StaticMeshElement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticMeshElement")
            .field("material", &self.material.name())
            .field("first_index", &self.first_index)
            .field("num_primitives", &self.num_primitives)
            .finish()
    }
}

/// Shareable mesh geometry
pub struct StaticMesh {
    name: String,
    vertex_buffer: ResourceHandle<VertexBuffer>,
    index_buffer: ResourceHandle<IndexBuffer>,
    vertex_factory: ResourceHandle<GeneralVertexFactory>,
    vertex_factory_ref: VertexFactoryRef,
    elements: Vec<StaticMeshElement>,
    bounds: AABB,
}

impl StaticMesh {
    /// Create a mesh drawn with the local vertex factory
    pub fn new(
        name: impl Into<String>,
        vertices: &[StaticMeshVertex],
        indices: Vec<u32>,
        elements: Vec<StaticMeshElement>,
    ) -> Self {
        Self::with_factory_type(name, VertexFactoryType::LOCAL, vertices, indices, elements)
    }

    /// Create a mesh drawn with a specific vertex factory type
    pub fn with_factory_type(
        name: impl Into<String>,
        factory_type: VertexFactoryType,
        vertices: &[StaticMeshVertex],
        indices: Vec<u32>,
        elements: Vec<StaticMeshElement>,
    ) -> Self {
        let name = name.into();
        let positions: Vec<Vec3> = vertices.iter().map(|vertex| Vec3::from(vertex.position)).collect();
        let bounds = AABB::from_points(&positions).unwrap_or_else(|| AABB::new(Vec3::zeros(), Vec3::zeros()));

        let vertex_buffer = ResourceHandle::new(
            format!("{name}.VertexBuffer"),
            VertexBuffer::from_vertices(format!("{name}.VertexBuffer"), vertices, ResourceUsage::Static),
        );
        let index_buffer = ResourceHandle::new(
            format!("{name}.IndexBuffer"),
            IndexBuffer::new(format!("{name}.IndexBuffer"), indices, ResourceUsage::Static),
        );
        let vertex_factory = ResourceHandle::new(
            format!("{name}.VertexFactory"),
            GeneralVertexFactory::new(
                factory_type,
                StaticMeshVertex::elements(),
                vec![VertexStream::new(vertex_buffer.clone())],
            ),
        );

        Self {
            name,
            vertex_buffer,
            index_buffer,
            vertex_factory_ref: Arc::new(vertex_factory.clone()),
            vertex_factory,
            elements,
            bounds,
        }
    }

    /// Unit quad in the XY plane facing +Z, drawn with the sprite vertex factory
    pub fn sprite_quad(name: impl Into<String>, material: MaterialRef) -> Self {
        let normal = Vec3::z();
        let vertices = [
            StaticMeshVertex::new(Vec3::new(-0.5, -0.5, 0.0), normal, [0.0, 1.0]),
            StaticMeshVertex::new(Vec3::new(0.5, -0.5, 0.0), normal, [1.0, 1.0]),
            StaticMeshVertex::new(Vec3::new(0.5, 0.5, 0.0), normal, [1.0, 0.0]),
            StaticMeshVertex::new(Vec3::new(-0.5, 0.5, 0.0), normal, [0.0, 0.0]),
        ];
        Self::with_factory_type(
            name,
            VertexFactoryType::SPRITE,
            &vertices,
            vec![0, 1, 2, 0, 2, 3],
            vec![StaticMeshElement::new(material, 0, 2)],
        )
    }

    /// Unit cube centered on the origin, one section
    pub fn cube(name: impl Into<String>, material: MaterialRef) -> Self {
        let faces = [
            (Vec3::x(), Vec3::y(), Vec3::z()),
            (-Vec3::x(), Vec3::y(), -Vec3::z()),
            (Vec3::y(), Vec3::z(), Vec3::x()),
            (-Vec3::y(), Vec3::z(), -Vec3::x()),
            (Vec3::z(), Vec3::x(), Vec3::y()),
            (-Vec3::z(), Vec3::x(), -Vec3::y()),
        ];
        let mut vertices = Vec::with_capacity(24);
        let mut indices = Vec::with_capacity(36);
        for (normal, up, right) in faces {
            let base = u32::try_from(vertices.len()).unwrap_or(u32::MAX);
            let center = normal * 0.5;
            for (u, v) in [(-0.5, -0.5), (0.5, -0.5), (0.5, 0.5), (-0.5, 0.5)] {
                let position = center + right * u + up * v;
                vertices.push(StaticMeshVertex::new(position, normal, [u + 0.5, 0.5 - v]));
            }
            indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        }
        Self::new(name, &vertices, indices, vec![StaticMeshElement::new(material, 0, 12)])
    }

    /// Name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Material sections
    pub fn elements(&self) -> &[StaticMeshElement] {
        &self.elements
    }

    /// Local-space bounds
    pub fn bounds(&self) -> AABB {
        self.bounds
    }

    /// Vertex factory
    pub fn vertex_factory(&self) -> &VertexFactoryRef {
        &self.vertex_factory_ref
    }

    /// Index buffer
    pub fn index_buffer(&self) -> &ResourceHandle<IndexBuffer> {
        &self.index_buffer
    }

    /// True once every GPU resource is initialized
    pub fn is_initialized(&self) -> bool {
        self.vertex_factory_ref.is_valid() && self.index_buffer.is_initialized()
    }

    /// Mesh batch of one section
    pub fn batch(&self, element_index: usize) -> Option<MeshBatch> {
        self.elements.get(element_index).map(|element| {
            MeshBatch::indexed(
                self.index_buffer.clone(),
                PrimitiveTopology::TriangleList,
                0,
                element.first_index,
                element.num_primitives,
            )
        })
    }

    /// Initialize the GPU resources on the rendering thread
    pub fn init_resources(&self, sink: &mut impl RenderCommandSink) {
        self.vertex_buffer.init_resource(sink);
        self.index_buffer.init_resource(sink);
        self.vertex_factory.init_resource(sink);
    }

    /// Release the GPU resources on the rendering thread
    pub fn release_resources(&self, sink: &mut impl RenderCommandSink) {
        self.vertex_factory.release_resource(sink);
        self.index_buffer.release_resource(sink);
        self.vertex_buffer.release_resource(sink);
    }
}

impl std::fmt::Debug for StaticMesh {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticMesh")
            .field("name", &self.name)
            .field("elements", &self.elements)
            .field("bounds", &self.bounds)
            .finish()
    }
}

/// A static mesh placed in a scene
pub struct StaticMeshPrimitive {
    name: String,
    mesh: Arc<StaticMesh>,
    local_to_world: Mat4,
    override_materials: Vec<Option<MaterialRef>>,
    depth_group: DepthGroup,
    depth_bias: f32,
    visible: bool,
    selected: bool,
    hit_proxy_id: Option<HitProxyId>,
    links: MeshLinks,
}

impl StaticMeshPrimitive {
    /// Place `mesh` at the origin of the world depth group
    pub fn new(name: impl Into<String>, mesh: Arc<StaticMesh>) -> Self {
        Self {
            name: name.into(),
            mesh,
            local_to_world: Mat4::identity(),
            override_materials: Vec::new(),
            depth_group: DepthGroup::World,
            depth_bias: 0.0,
            visible: true,
            selected: false,
            hit_proxy_id: None,
            links: MeshLinks::default(),
        }
    }

    /// Set the local-to-world transform
    pub fn with_transform(mut self, local_to_world: Mat4) -> Self {
        self.local_to_world = local_to_world;
        self
    }

    /// Set the depth group
    pub fn with_depth_group(mut self, depth_group: DepthGroup) -> Self {
        self.depth_group = depth_group;
        self
    }

    /// Set the depth bias
    pub fn with_depth_bias(mut self, depth_bias: f32) -> Self {
        self.depth_bias = depth_bias;
        self
    }

    /// Set the hit proxy id
    pub fn with_hit_proxy(mut self, id: HitProxyId) -> Self {
        self.hit_proxy_id = Some(id);
        self
    }

    /// Replace the material of one section
    pub fn with_override_material(mut self, element_index: usize, material: MaterialRef) -> Self {
        self.set_override_material(element_index, Some(material));
        self
    }

    /// The mesh
    pub fn mesh(&self) -> &Arc<StaticMesh> {
        &self.mesh
    }

    /// Local-to-world transform
    pub fn local_to_world(&self) -> &Mat4 {
        &self.local_to_world
    }

    /// Move the primitive. Links are kept.
    pub fn set_local_to_world(&mut self, local_to_world: Mat4) {
        self.local_to_world = local_to_world;
    }

    /// Replace (or restore, with `None`) the material of one section
    pub fn set_override_material(&mut self, element_index: usize, material: Option<MaterialRef>) {
        if self.override_materials.len() <= element_index {
            self.override_materials.resize(element_index + 1, None);
        }
        self.override_materials[element_index] = material;
        self.links.mark_dirty();
    }

    /// Material a section is drawn with
    pub fn material(&self, element_index: usize) -> Option<MaterialRef> {
        self.override_materials
            .get(element_index)
            .cloned()
            .flatten()
            .or_else(|| self.mesh.elements().get(element_index).map(|element| element.material.clone()))
    }

    /// Move the primitive to another depth group
    pub fn set_depth_group(&mut self, depth_group: DepthGroup) {
        if self.depth_group != depth_group {
            self.depth_group = depth_group;
            self.links.mark_dirty();
        }
    }

    /// Depth group
    pub fn depth_group(&self) -> DepthGroup {
        self.depth_group
    }

    /// Show or hide the primitive
    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    /// Editor selection state
    pub fn set_selected(&mut self, selected: bool) {
        self.selected = selected;
    }

    /// Whether the primitive is selected
    pub fn is_selected(&self) -> bool {
        self.selected
    }

    /// Set or clear the hit proxy id
    pub fn set_hit_proxy(&mut self, id: Option<HitProxyId>) {
        if self.hit_proxy_id.is_some() != id.is_some() {
            self.links.mark_dirty();
        }
        self.hit_proxy_id = id;
    }

    /// True while the primitive holds draw list links
    pub fn is_linked(&self) -> bool {
        self.links.is_linked()
    }

    /// Number of scenes the primitive holds links in
    pub fn num_linked_scenes(&self) -> usize {
        self.links.num_scenes()
    }

    #[cfg(test)]
    pub(crate) fn links_in(&self, scene: crate::scene::SceneId) -> &[crate::render::draw_list::DrawingPolicyLinkRef] {
        self.links.links_in(scene)
    }

    fn link_requests(&self) -> Vec<LinkRequest> {
        let vertex_factory = self.mesh.vertex_factory();
        (0..self.mesh.elements().len())
            .filter_map(|index| {
                let material = self.material(index)?;
                let batch = self.mesh.batch(index)?;
                let hit_proxy_policy = self.hit_proxy_id.map(|_| {
                    MeshDrawingPolicy::new(
                        DrawingPolicyKind::HitProxy,
                        vertex_factory.clone(),
                        material.clone(),
                        self.depth_bias,
                    )
                });
                Some(LinkRequest {
                    policy: MeshDrawingPolicy::new(DrawingPolicyKind::Base, vertex_factory.clone(), material, self.depth_bias),
                    hit_proxy_policy,
                    batch,
                })
            })
            .collect()
    }
}

impl Primitive for StaticMeshPrimitive {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_visible(&self) -> bool {
        self.visible
    }

    fn bounds(&self) -> Option<AABB> {
        Some(self.mesh.bounds().transformed(&self.local_to_world))
    }

    fn link_draw_list(&mut self, depth_groups: &mut SceneDepthGroups) {
        let requests = self.link_requests();
        self.links
            .link(depth_groups, self.depth_group, DrawListKind::StaticMesh, requests);
    }

    fn unlink_draw_list(&mut self, depth_groups: &mut SceneDepthGroups) {
        self.links.unlink(depth_groups);
    }

    fn add_to_draw_list(&mut self, depth_groups: &mut SceneDepthGroups, _view: &SceneView) {
        if self.links.needs_relink(depth_groups) {
            log::trace!("[STATIC_MESH] relinking '{}'", self.name);
            self.link_draw_list(depth_groups);
        }
        let instance = MeshInstance::new(self.local_to_world)
            .with_hit_proxy(self.hit_proxy_id)
            .with_selected(self.selected);
        self.links.add_instance(depth_groups, &instance);
    }
}

impl std::fmt::Debug for StaticMeshPrimitive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticMeshPrimitive")
            .field("name", &self.name)
            .field("mesh", &self.mesh.name())
            .field("depth_group", &self.depth_group)
            .field("linked", &self.links.is_linked())
            .finish()
    }
}
