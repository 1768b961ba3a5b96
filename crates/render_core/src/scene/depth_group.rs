//! # Scene Depth Groups
//!
//! A depth group is one ordered pass over the scene. Each group owns the draw lists
//! primitives link into, so primitives in different groups never share links and
//! groups can be drawn (and depth-cleared) independently.
//!
//! ## Architecture
//!
//! - **Static mesh list**: lit meshes
//! - **Sprite list**: camera-facing quads
//! - **Hit proxy list**: editor picking pass, linked only when hit proxies are enabled
//! - **Dynamic elements**: editor immediate-mode meshes gathered each frame

use std::ops::{Index, IndexMut};
#[cfg(feature = "editor")]
use std::sync::Arc;

use crate::core::DrawListConfig;
#[cfg(feature = "editor")]
use crate::foundation::math::Mat4;
use crate::render::context::RenderDevice;
use crate::render::draw_list::{DrawListStats, DrawPass, MeshDrawList};
use crate::render::drawing_policy::MeshDrawingPolicy;
#[cfg(feature = "editor")]
use crate::render::drawing_policy::DrawingPolicyKind;
#[cfg(feature = "editor")]
use crate::render::dynamic_mesh::DynamicMeshBuilder;
#[cfg(feature = "editor")]
use crate::render::material::MaterialRef;
#[cfg(feature = "editor")]
use crate::render::mesh_batch::{HitProxyId, MeshInstance};
use crate::scene::scene::SceneId;
use crate::scene::view::{SceneView, ShowFlags};

/// Fixed draw order of the scene's passes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DepthGroup {
    /// Sky and other backdrops
    Background,
    /// Editor grid and helpers behind the world
    WorldEdBackground,
    /// The world
    #[default]
    World,
    /// Editor gizmos in front of the world
    WorldEdForeground,
    /// First-person weapons and other foreground geometry
    Foreground,
    /// Overlays
    Ui,
}

impl DepthGroup {
    /// Every group, in draw order
    pub const ALL: [Self; 6] = [
        Self::Background,
        Self::WorldEdBackground,
        Self::World,
        Self::WorldEdForeground,
        Self::Foreground,
        Self::Ui,
    ];

    /// Number of groups
    pub const COUNT: usize = Self::ALL.len();

    /// Position in draw order
    pub fn index(self) -> usize {
        self as usize
    }

    /// Display name
    pub fn name(self) -> &'static str {
        match self {
            Self::Background => "Background",
            Self::WorldEdBackground => "WorldEdBackground",
            Self::World => "World",
            Self::WorldEdForeground => "WorldEdForeground",
            Self::Foreground => "Foreground",
            Self::Ui => "Ui",
        }
    }

    /// Groups drawn only with editor depth groups enabled
    pub fn is_editor_only(self) -> bool {
        matches!(self, Self::WorldEdBackground | Self::WorldEdForeground)
    }
}

/// Which of a depth group's mesh lists a primitive links into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DrawListKind {
    /// Static meshes
    StaticMesh,
    /// Sprites
    Sprite,
}

/// Editor immediate-mode mesh drawn once this frame
#[cfg(feature = "editor")]
#[derive(Clone)]
pub struct DynamicMeshElement {
    /// Built mesh
    pub mesh: Arc<DynamicMeshBuilder>,
    /// Local-to-world transform
    pub local_to_world: Mat4,
    /// Material
    pub material: MaterialRef,
    /// Picking id; elements without one are left out of the hit proxy pass
    pub hit_proxy_id: Option<HitProxyId>,
}

#[cfg(feature = "editor")]
impl DynamicMeshElement {
    /// Element drawn with `material` at `local_to_world`, not pickable
    pub fn new(mesh: Arc<DynamicMeshBuilder>, local_to_world: Mat4, material: MaterialRef) -> Self {
        Self {
            mesh,
            local_to_world,
            material,
            hit_proxy_id: None,
        }
    }

    /// Make the element pickable
    pub fn with_hit_proxy(mut self, id: HitProxyId) -> Self {
        self.hit_proxy_id = Some(id);
        self
    }
}

#[cfg(feature = "editor")]
impl std::fmt::Debug for DynamicMeshElement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamicMeshElement")
            .field("mesh", &self.mesh.name())
            .field("material", &self.material.name())
            .field("hit_proxy_id", &self.hit_proxy_id)
            .finish()
    }
}

/// Draw lists of one pass
#[derive(Debug)]
pub struct SceneDepthGroup {
    group: DepthGroup,
    static_mesh_draw_list: MeshDrawList<MeshDrawingPolicy>,
    sprite_draw_list: MeshDrawList<MeshDrawingPolicy>,
    hit_proxy_draw_list: MeshDrawList<MeshDrawingPolicy>,
    #[cfg(feature = "editor")]
    dynamic_elements: Vec<DynamicMeshElement>,
}

impl SceneDepthGroup {
    /// Create empty draw lists for `group`
    pub fn new(group: DepthGroup, config: &DrawListConfig) -> Self {
        let list = || MeshDrawList::with_capacity(config.initial_link_capacity, config.initial_instance_capacity);
        Self {
            group,
            static_mesh_draw_list: list(),
            sprite_draw_list: list(),
            hit_proxy_draw_list: list(),
            #[cfg(feature = "editor")]
            dynamic_elements: Vec::new(),
        }
    }

    /// The group this is
    pub fn group(&self) -> DepthGroup {
        self.group
    }

    /// Static mesh draw list
    pub fn static_mesh_draw_list(&self) -> &MeshDrawList<MeshDrawingPolicy> {
        &self.static_mesh_draw_list
    }

    /// Sprite draw list
    pub fn sprite_draw_list(&self) -> &MeshDrawList<MeshDrawingPolicy> {
        &self.sprite_draw_list
    }

    /// Hit proxy draw list
    pub fn hit_proxy_draw_list(&self) -> &MeshDrawList<MeshDrawingPolicy> {
        &self.hit_proxy_draw_list
    }

    /// The mesh list of `kind`
    pub fn draw_list(&self, kind: DrawListKind) -> &MeshDrawList<MeshDrawingPolicy> {
        match kind {
            DrawListKind::StaticMesh => &self.static_mesh_draw_list,
            DrawListKind::Sprite => &self.sprite_draw_list,
        }
    }

    /// The mesh list of `kind` (mutable)
    pub fn draw_list_mut(&mut self, kind: DrawListKind) -> &mut MeshDrawList<MeshDrawingPolicy> {
        match kind {
            DrawListKind::StaticMesh => &mut self.static_mesh_draw_list,
            DrawListKind::Sprite => &mut self.sprite_draw_list,
        }
    }

    /// Hit proxy draw list (mutable)
    pub fn hit_proxy_draw_list_mut(&mut self) -> &mut MeshDrawList<MeshDrawingPolicy> {
        &mut self.hit_proxy_draw_list
    }

    /// Queue an immediate-mode mesh for this frame
    #[cfg(feature = "editor")]
    pub fn add_dynamic_element(&mut self, element: DynamicMeshElement) {
        self.dynamic_elements.push(element);
    }

    /// Immediate-mode meshes queued this frame
    #[cfg(feature = "editor")]
    pub fn dynamic_elements(&self) -> &[DynamicMeshElement] {
        &self.dynamic_elements
    }

    /// Instances gathered this frame over every list
    pub fn num_instances(&self) -> usize {
        self.static_mesh_draw_list.num_instances()
            + self.sprite_draw_list.num_instances()
            + self.hit_proxy_draw_list.num_instances()
    }

    /// Drop this frame's instances and dynamic elements, keeping links
    pub fn clear(&mut self) {
        self.static_mesh_draw_list.clear();
        self.sprite_draw_list.clear();
        self.hit_proxy_draw_list.clear();
        #[cfg(feature = "editor")]
        self.dynamic_elements.clear();
    }

    /// Mark dirty every link whose policy satisfies `predicate`
    pub fn mark_dirty_where(&mut self, predicate: impl Fn(&MeshDrawingPolicy) -> bool) -> usize {
        self.static_mesh_draw_list.mark_dirty_where(&predicate)
            + self.sprite_draw_list.mark_dirty_where(&predicate)
            + self.hit_proxy_draw_list.mark_dirty_where(&predicate)
    }

    /// Draw the group's visible lists
    pub fn draw(&self, device: &mut RenderDevice, view: &SceneView) -> DrawListStats {
        let flags = view.show_flags();
        let mut stats = DrawListStats::default();
        if flags.contains(ShowFlags::STATIC_MESH) {
            stats += self.static_mesh_draw_list.draw(device, view, DrawPass::Scene);
        }
        if flags.contains(ShowFlags::SPRITE) {
            stats += self.sprite_draw_list.draw(device, view, DrawPass::Scene);
        }
        #[cfg(feature = "editor")]
        if flags.contains(ShowFlags::DYNAMIC_ELEMENTS) {
            stats += self.draw_dynamic_elements(device, view);
        }
        stats
    }

    /// Draw the static mesh list's depth-only variants
    pub fn draw_depth_only(&self, device: &mut RenderDevice, view: &SceneView) -> DrawListStats {
        if view.show_flags().contains(ShowFlags::STATIC_MESH) {
            self.static_mesh_draw_list.draw(device, view, DrawPass::DepthOnly)
        } else {
            DrawListStats::default()
        }
    }

    /// Draw the hit proxy list, and pickable dynamic elements, with their hit
    /// proxy policies. Wireframe views do not change this pass.
    pub fn draw_hit_proxies(&self, device: &mut RenderDevice, view: &SceneView) -> DrawListStats {
        #[allow(unused_mut)]
        let mut stats = self.hit_proxy_draw_list.draw(device, view, DrawPass::Linked);
        #[cfg(feature = "editor")]
        if view.show_flags().contains(ShowFlags::DYNAMIC_ELEMENTS) {
            stats += self.draw_dynamic_hit_proxies(device, view);
        }
        stats
    }

    #[cfg(feature = "editor")]
    fn built_dynamic_elements(&self) -> impl Iterator<Item = &DynamicMeshElement> {
        self.dynamic_elements.iter().filter(|element| {
            let built = element.mesh.is_built();
            if !built {
                log::warn!("[DEPTH_GROUP] dynamic mesh '{}' queued before it was built", element.mesh.name());
            }
            built
        })
    }

    #[cfg(feature = "editor")]
    fn draw_dynamic_elements(&self, device: &mut RenderDevice, view: &SceneView) -> DrawListStats {
        let mut stats = DrawListStats::default();
        for element in self.built_dynamic_elements() {
            stats += element
                .mesh
                .draw(device, &element.local_to_world, &element.material, DrawingPolicyKind::Base, view);
        }
        stats
    }

    #[cfg(feature = "editor")]
    fn draw_dynamic_hit_proxies(&self, device: &mut RenderDevice, view: &SceneView) -> DrawListStats {
        let mut stats = DrawListStats::default();
        for element in self.built_dynamic_elements() {
            let Some(id) = element.hit_proxy_id else {
                continue;
            };
            let instance = MeshInstance::new(element.local_to_world).with_hit_proxy(Some(id));
            stats += element
                .mesh
                .draw_instance(device, &instance, &element.material, DrawingPolicyKind::HitProxy, view);
        }
        stats
    }
}

/// Every depth group of a scene, indexed by [`DepthGroup`]
#[derive(Debug)]
pub struct SceneDepthGroups {
    scene: SceneId,
    groups: [SceneDepthGroup; DepthGroup::COUNT],
    hit_proxies: bool,
    dynamic_elements: bool,
}

impl SceneDepthGroups {
    /// Create every group, owned by a fresh scene id
    pub fn new(config: &DrawListConfig) -> Self {
        Self {
            scene: SceneId::next(),
            groups: DepthGroup::ALL.map(|group| SceneDepthGroup::new(group, config)),
            hit_proxies: false,
            dynamic_elements: false,
        }
    }

    /// Set the owning scene
    pub fn with_scene(mut self, scene: SceneId) -> Self {
        self.scene = scene;
        self
    }

    /// Scene whose primitives link into these lists
    pub fn scene(&self) -> SceneId {
        self.scene
    }

    /// Link hit proxies into the hit proxy lists
    pub fn with_hit_proxies(mut self, enabled: bool) -> Self {
        self.hit_proxies = enabled;
        self
    }

    /// Gather dynamic elements
    pub fn with_dynamic_elements(mut self, enabled: bool) -> Self {
        self.dynamic_elements = enabled;
        self
    }

    /// Whether primitives should link hit proxy policies
    pub fn hit_proxies_enabled(&self) -> bool {
        self.hit_proxies
    }

    /// Whether primitives should queue dynamic elements
    pub fn dynamic_elements_enabled(&self) -> bool {
        self.dynamic_elements
    }

    /// Groups in draw order
    pub fn iter(&self) -> impl Iterator<Item = &SceneDepthGroup> {
        self.groups.iter()
    }

    /// Instances gathered this frame over every group
    pub fn num_instances(&self) -> usize {
        self.groups.iter().map(SceneDepthGroup::num_instances).sum()
    }

    /// Links over every group and list
    pub fn num_links(&self) -> usize {
        self.groups
            .iter()
            .map(|group| {
                group.static_mesh_draw_list.num_links()
                    + group.sprite_draw_list.num_links()
                    + group.hit_proxy_draw_list.num_links()
            })
            .sum()
    }

    /// Drop this frame's data in every group
    pub fn clear(&mut self) {
        for group in &mut self.groups {
            group.clear();
        }
    }

    /// Mark dirty, in every group, every link whose policy satisfies `predicate`
    pub fn mark_dirty_where(&mut self, predicate: impl Fn(&MeshDrawingPolicy) -> bool) -> usize {
        self.groups.iter_mut().map(|group| group.mark_dirty_where(&predicate)).sum()
    }
}

impl Index<DepthGroup> for SceneDepthGroups {
    type Output = SceneDepthGroup;

    fn index(&self, group: DepthGroup) -> &SceneDepthGroup {
        &self.groups[group.index()]
    }
}

impl IndexMut<DepthGroup> for SceneDepthGroups {
    fn index_mut(&mut self, group: DepthGroup) -> &mut SceneDepthGroup {
        &mut self.groups[group.index()]
    }
}
