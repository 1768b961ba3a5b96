//! # Scene
//!
//! A scene holds shared handles to its primitives and the depth groups they link
//! into. Registration never touches draw lists: links are created and dropped at
//! the start of the next [`Scene::build_sdgs`], so producers can add and remove
//! primitives (through commands) while a frame is in flight.
//!
//! ## Frame cycle
//!
//! `Empty --build_sdgs--> Ready --clear_sdgs--> Empty`. `Building` is observable
//! only from inside a primitive callback.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{MutexGuard, PoisonError};

use crate::core::RenderCoreConfig;
use crate::foundation::hash::ptr_eq;
use crate::render::drawing_policy::MeshDrawingPolicy;
use crate::render::material::MaterialRef;
use crate::scene::depth_group::SceneDepthGroups;
use crate::scene::primitive::{Primitive, PrimitiveRef};
use crate::scene::view::{SceneView, ShowFlags};

/// Scene identifier, minted on any thread
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SceneId(u64);

impl SceneId {
    /// Allocate a new unique id
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw value
    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Per-frame state of a scene's depth groups
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceneState {
    /// No frame data
    Empty,
    /// Primitives are adding instances
    Building,
    /// Depth groups hold this frame's instances
    Ready,
}

/// Counts from one [`Scene::build_sdgs`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildStats {
    /// Primitives that added instances
    pub primitives_added: usize,
    /// Primitives outside the view frustum
    pub primitives_culled: usize,
    /// Primitives not visible
    pub primitives_hidden: usize,
    /// Primitives linked for the first time
    pub primitives_linked: usize,
    /// Removed primitives unlinked
    pub primitives_unlinked: usize,
}

fn lock(primitive: &PrimitiveRef) -> MutexGuard<'_, dyn Primitive + 'static> {
    primitive.lock().unwrap_or_else(PoisonError::into_inner)
}

fn position(list: &[PrimitiveRef], primitive: &PrimitiveRef) -> Option<usize> {
    list.iter().position(|candidate| ptr_eq(candidate, primitive))
}

/// Primitives and their depth groups
pub struct Scene {
    id: SceneId,
    depth_groups: SceneDepthGroups,
    primitives: Vec<PrimitiveRef>,
    pending_link: Vec<PrimitiveRef>,
    pending_unlink: Vec<PrimitiveRef>,
    state: SceneState,
}

impl Scene {
    /// Create an empty scene
    pub fn new(id: SceneId, config: &RenderCoreConfig) -> Self {
        Self {
            id,
            depth_groups: SceneDepthGroups::new(&config.draw_lists)
                .with_scene(id)
                .with_hit_proxies(config.hit_proxies_enabled())
                .with_dynamic_elements(config.dynamic_elements_enabled()),
            primitives: Vec::new(),
            pending_link: Vec::new(),
            pending_unlink: Vec::new(),
            state: SceneState::Empty,
        }
    }

    /// Id
    pub fn id(&self) -> SceneId {
        self.id
    }

    /// Frame state
    pub fn state(&self) -> SceneState {
        self.state
    }

    /// Depth groups
    pub fn depth_groups(&self) -> &SceneDepthGroups {
        &self.depth_groups
    }

    /// Depth groups (mutable)
    pub fn depth_groups_mut(&mut self) -> &mut SceneDepthGroups {
        &mut self.depth_groups
    }

    /// Registered primitives, including ones not linked yet
    pub fn num_primitives(&self) -> usize {
        self.primitives.len()
    }

    /// True when `primitive` is registered
    pub fn contains(&self, primitive: &PrimitiveRef) -> bool {
        position(&self.primitives, primitive).is_some()
    }

    /// Register a primitive. Linking happens on the next build. Re-adding a
    /// primitive removed since the last build cancels the removal. Returns false if
    /// it was already registered.
    pub fn add_primitive(&mut self, primitive: PrimitiveRef) -> bool {
        if let Some(index) = position(&self.pending_unlink, &primitive) {
            self.pending_unlink.swap_remove(index);
            self.primitives.push(primitive);
            return true;
        }
        if self.contains(&primitive) {
            log::warn!("[SCENE] primitive '{}' is already in scene {:?}", lock(&primitive).name(), self.id);
            return false;
        }
        self.pending_link.push(primitive.clone());
        self.primitives.push(primitive);
        true
    }

    /// Unregister a primitive. Its links are dropped on the next build. Returns
    /// false if it was not registered.
    pub fn remove_primitive(&mut self, primitive: &PrimitiveRef) -> bool {
        let Some(index) = position(&self.primitives, primitive) else {
            return false;
        };
        let primitive = self.primitives.swap_remove(index);
        match position(&self.pending_link, &primitive) {
            Some(pending) => {
                self.pending_link.swap_remove(pending);
            }
            None => self.pending_unlink.push(primitive),
        }
        true
    }

    /// Gather this frame's instances: clear the depth groups, apply pending
    /// removals and additions, then add every visible primitive inside the view
    /// frustum.
    pub fn build_sdgs(&mut self, view: &SceneView) -> BuildStats {
        if self.state == SceneState::Ready {
            log::debug!("[SCENE] {:?} rebuilt without clear_sdgs", self.id);
        }
        self.depth_groups.clear();
        self.state = SceneState::Building;

        let mut stats = BuildStats::default();
        for primitive in self.pending_unlink.drain(..) {
            lock(&primitive).unlink_draw_list(&mut self.depth_groups);
            stats.primitives_unlinked += 1;
        }
        for primitive in self.pending_link.drain(..) {
            lock(&primitive).link_draw_list(&mut self.depth_groups);
            stats.primitives_linked += 1;
        }

        let cull = !view.show_flags().contains(ShowFlags::NO_CULLING);
        for primitive in &self.primitives {
            let mut primitive = lock(primitive);
            if !primitive.is_visible() {
                stats.primitives_hidden += 1;
                continue;
            }
            if cull && primitive.bounds().is_some_and(|bounds| !view.frustum().intersects_aabb(&bounds)) {
                stats.primitives_culled += 1;
                continue;
            }
            primitive.add_to_draw_list(&mut self.depth_groups, view);
            stats.primitives_added += 1;
        }

        self.state = SceneState::Ready;
        log::trace!(
            "[SCENE] {:?} built: {} added, {} culled, {} hidden",
            self.id,
            stats.primitives_added,
            stats.primitives_culled,
            stats.primitives_hidden
        );
        stats
    }

    /// Drop this frame's instances, keeping every link
    pub fn clear_sdgs(&mut self) {
        self.depth_groups.clear();
        self.state = SceneState::Empty;
    }

    /// Unlink and unregister every primitive now
    pub fn clear(&mut self) {
        self.depth_groups.clear();
        for primitive in self.pending_unlink.drain(..) {
            lock(&primitive).unlink_draw_list(&mut self.depth_groups);
        }
        let pending_link = std::mem::take(&mut self.pending_link);
        for primitive in self.primitives.drain(..) {
            if position(&pending_link, &primitive).is_none() {
                lock(&primitive).unlink_draw_list(&mut self.depth_groups);
            }
        }
        self.state = SceneState::Empty;
    }

    /// Force every primitive drawn with `material` to relink on its next frame.
    /// Returns how many links were marked.
    pub fn invalidate_material(&mut self, material: &MaterialRef) -> usize {
        self.depth_groups
            .mark_dirty_where(|policy: &MeshDrawingPolicy| ptr_eq(policy.material(), material))
    }
}

impl std::fmt::Debug for Scene {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scene")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("primitives", &self.primitives.len())
            .field("pending_link", &self.pending_link.len())
            .field("pending_unlink", &self.pending_unlink.len())
            .field("links", &self.depth_groups.num_links())
            .finish()
    }
}

impl Drop for Scene {
    fn drop(&mut self) {
        if !self.primitives.is_empty() || !self.pending_unlink.is_empty() {
            self.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::{Mat4, Vec3};
    use crate::render::RenderContext;
    use crate::scene::depth_group::DepthGroup;
    use crate::scene::primitive::primitive_ref;
    use crate::scene::static_mesh::{StaticMesh, StaticMeshPrimitive};
    use crate::test_support;
    use std::sync::{Arc, Mutex};

    struct Fixture {
        ctx: RenderContext,
        rock: MaterialRef,
        cube: Arc<StaticMesh>,
        scene: Scene,
    }

    fn fixture() -> Fixture {
        let mut ctx = test_support::context();
        let rock = test_support::material("Rock");
        let cube = Arc::new(StaticMesh::cube("Cube", rock.clone()));
        cube.init_resources(&mut ctx);
        let scene = Scene::new(SceneId::next(), ctx.config());
        Fixture { ctx, rock, cube, scene }
    }

    fn cube_at(cube: &Arc<StaticMesh>, x: f32) -> StaticMeshPrimitive {
        StaticMeshPrimitive::new(format!("Cube@{x}"), cube.clone())
            .with_transform(Mat4::new_translation(&Vec3::new(x, 0.0, 0.0)))
    }

    fn world_links(scene: &Scene) -> usize {
        scene.depth_groups()[DepthGroup::World].static_mesh_draw_list().num_links()
    }

    fn world_instances(scene: &Scene) -> usize {
        scene.depth_groups()[DepthGroup::World].static_mesh_draw_list().num_instances()
    }

    #[test]
    fn test_same_material_and_vertex_factory_share_one_batch() {
        let mut f = fixture();
        for x in [-2.0, 0.0, 2.0] {
            assert!(f.scene.add_primitive(primitive_ref(cube_at(&f.cube, x))));
        }

        let stats = f.scene.build_sdgs(&test_support::view());
        assert_eq!(stats.primitives_added, 3);

        let list = f.scene.depth_groups()[DepthGroup::World].static_mesh_draw_list();
        assert_eq!(list.num_links(), 1);
        let link = list.links().next().unwrap();
        assert_eq!(link.num_mesh_batches(), 1);
        assert_eq!(link.mesh_batches().next().unwrap().num_instances(), 3);
    }

    #[test]
    fn test_different_materials_get_distinct_links() {
        let mut f = fixture();
        f.scene.add_primitive(primitive_ref(cube_at(&f.cube, -2.0)));
        f.scene.add_primitive(primitive_ref(
            cube_at(&f.cube, 2.0).with_override_material(0, test_support::material("Gold")),
        ));

        f.scene.build_sdgs(&test_support::view());
        assert_eq!(world_links(&f.scene), 2);
        assert_eq!(world_instances(&f.scene), 2);
    }

    #[test]
    fn test_build_and_clear_are_idempotent() {
        let mut f = fixture();
        for x in [-2.0, 0.0, 2.0] {
            f.scene.add_primitive(primitive_ref(cube_at(&f.cube, x)));
        }
        let view = test_support::view();

        f.scene.build_sdgs(&view);
        let links = world_links(&f.scene);
        f.scene.build_sdgs(&view);
        assert_eq!(world_links(&f.scene), links);
        assert_eq!(world_instances(&f.scene), 3);

        f.scene.clear_sdgs();
        f.scene.clear_sdgs();
        assert_eq!(world_links(&f.scene), links);
        assert_eq!(world_instances(&f.scene), 0);
    }

    #[test]
    fn test_state_machine() {
        let mut f = fixture();
        assert_eq!(f.scene.state(), SceneState::Empty);
        f.scene.build_sdgs(&test_support::view());
        assert_eq!(f.scene.state(), SceneState::Ready);
        f.scene.clear_sdgs();
        assert_eq!(f.scene.state(), SceneState::Empty);
        f.scene.build_sdgs(&test_support::view());
        f.scene.clear();
        assert_eq!(f.scene.state(), SceneState::Empty);
    }

    #[test]
    fn test_registration_is_deferred_to_build() {
        let mut f = fixture();
        let primitive = Arc::new(Mutex::new(cube_at(&f.cube, 0.0)));
        let handle: PrimitiveRef = primitive.clone();

        f.scene.add_primitive(handle.clone());
        assert!(!primitive.lock().unwrap().is_linked());
        assert_eq!(world_links(&f.scene), 0);

        f.scene.build_sdgs(&test_support::view());
        assert!(primitive.lock().unwrap().is_linked());

        f.scene.clear_sdgs();
        assert!(f.scene.remove_primitive(&handle));
        assert!(!f.scene.remove_primitive(&handle));
        assert_eq!(world_links(&f.scene), 1);

        let stats = f.scene.build_sdgs(&test_support::view());
        assert_eq!(stats.primitives_unlinked, 1);
        assert_eq!(world_links(&f.scene), 0);
        assert!(!primitive.lock().unwrap().is_linked());
    }

    #[test]
    fn test_remove_then_add_round_trip() {
        let mut f = fixture();
        let handle = primitive_ref(cube_at(&f.cube, 0.0));
        let view = test_support::view();

        f.scene.add_primitive(handle.clone());
        f.scene.build_sdgs(&view);
        f.scene.remove_primitive(&handle);
        f.scene.build_sdgs(&view);
        assert_eq!(world_links(&f.scene), 0);

        f.scene.add_primitive(handle);
        f.scene.build_sdgs(&view);
        assert_eq!(world_links(&f.scene), 1);
        assert_eq!(world_instances(&f.scene), 1);
    }

    #[test]
    fn test_re_add_cancels_pending_removal() {
        let mut f = fixture();
        let handle = primitive_ref(cube_at(&f.cube, 0.0));
        let view = test_support::view();

        f.scene.add_primitive(handle.clone());
        f.scene.build_sdgs(&view);
        f.scene.remove_primitive(&handle);
        assert!(f.scene.add_primitive(handle.clone()));
        assert!(!f.scene.add_primitive(handle));

        let stats = f.scene.build_sdgs(&view);
        assert_eq!(stats.primitives_unlinked, 0);
        assert_eq!(stats.primitives_linked, 0);
        assert_eq!(world_instances(&f.scene), 1);
        assert_eq!(f.scene.num_primitives(), 1);
    }

    #[test]
    fn test_add_then_remove_before_build_never_links() {
        let mut f = fixture();
        let handle = primitive_ref(cube_at(&f.cube, 0.0));
        f.scene.add_primitive(handle.clone());
        f.scene.remove_primitive(&handle);

        let stats = f.scene.build_sdgs(&test_support::view());
        assert_eq!(stats, BuildStats::default());
        assert_eq!(world_links(&f.scene), 0);
    }

    #[test]
    fn test_frustum_culling_and_visibility() {
        let mut f = fixture();
        let hidden = Arc::new(Mutex::new(cube_at(&f.cube, 2.0)));
        hidden.lock().unwrap().set_visible(false);
        f.scene.add_primitive(primitive_ref(cube_at(&f.cube, 0.0)));
        f.scene.add_primitive(primitive_ref(cube_at(&f.cube, 1000.0)));
        f.scene.add_primitive(hidden);

        let stats = f.scene.build_sdgs(&test_support::view());
        assert_eq!(stats.primitives_added, 1);
        assert_eq!(stats.primitives_culled, 1);
        assert_eq!(stats.primitives_hidden, 1);
        // culled primitives keep their links
        assert_eq!(world_links(&f.scene), 1);
        assert_eq!(world_instances(&f.scene), 1);

        f.scene.clear_sdgs();
        let view = test_support::view().with_show_flags(ShowFlags::default() | ShowFlags::NO_CULLING);
        let stats = f.scene.build_sdgs(&view);
        assert_eq!(stats.primitives_added, 2);
    }

    #[test]
    fn test_invalidated_material_relinks_everyone() {
        let mut f = fixture();
        for x in [-2.0, 0.0, 2.0] {
            f.scene.add_primitive(primitive_ref(cube_at(&f.cube, x)));
        }
        let view = test_support::view();
        f.scene.build_sdgs(&view);
        f.scene.clear_sdgs();

        assert_eq!(f.scene.invalidate_material(&f.rock), 1);
        f.scene.build_sdgs(&view);
        assert_eq!(world_links(&f.scene), 1);
        assert_eq!(world_instances(&f.scene), 3);
        let list = f.scene.depth_groups()[DepthGroup::World].static_mesh_draw_list();
        assert!(!list.links().next().unwrap().is_dirty());
    }

    #[test]
    fn test_clear_and_drop_unlink_immediately() {
        let mut f = fixture();
        let first = Arc::new(Mutex::new(cube_at(&f.cube, 0.0)));
        let second = Arc::new(Mutex::new(cube_at(&f.cube, 1.0)));
        f.scene.add_primitive(first.clone());
        f.scene.build_sdgs(&test_support::view());
        f.scene.clear();
        assert!(!first.lock().unwrap().is_linked());
        assert_eq!(f.scene.depth_groups().num_links(), 0);
        assert_eq!(f.scene.num_primitives(), 0);

        let mut scene = Scene::new(SceneId::next(), f.ctx.config());
        scene.add_primitive(second.clone());
        scene.build_sdgs(&test_support::view());
        assert!(second.lock().unwrap().is_linked());
        drop(scene);
        assert!(!second.lock().unwrap().is_linked());
    }

    #[test]
    fn test_scene_ids_are_unique() {
        assert_ne!(SceneId::next(), SceneId::next());
    }

    #[test]
    fn test_re_added_primitive_rejoins_shared_link() {
        let mut f = fixture();
        let resident = Arc::new(Mutex::new(cube_at(&f.cube, -1.0)));
        let moving = Arc::new(Mutex::new(cube_at(&f.cube, 1.0)));
        let moving_handle: PrimitiveRef = moving.clone();
        let view = test_support::view();
        let id = f.scene.id();

        f.scene.add_primitive(resident.clone());
        f.scene.add_primitive(moving_handle.clone());
        f.scene.build_sdgs(&view);
        f.scene.clear_sdgs();
        let original = resident.lock().unwrap().links_in(id)[0].clone();

        f.scene.remove_primitive(&moving_handle);
        f.scene.build_sdgs(&view);
        f.scene.clear_sdgs();
        assert_eq!(world_links(&f.scene), 1);
        assert!(moving.lock().unwrap().links_in(id).is_empty());

        f.scene.add_primitive(moving_handle);
        f.scene.build_sdgs(&view);
        assert_eq!(world_links(&f.scene), 1);
        assert_eq!(world_instances(&f.scene), 2);

        let resident_link = resident.lock().unwrap().links_in(id)[0].clone();
        let moving_link = moving.lock().unwrap().links_in(id)[0].clone();
        assert!(resident_link.same_link(&original));
        assert!(moving_link.same_link(&resident_link));
    }

    #[test]
    fn test_primitive_moves_between_scenes() {
        let mut f = fixture();
        let view = test_support::view();
        let mut other = Scene::new(SceneId::next(), f.ctx.config());
        other.add_primitive(primitive_ref(cube_at(&f.cube, -1.0)));
        other.build_sdgs(&view);
        other.clear_sdgs();

        let shared = Arc::new(Mutex::new(cube_at(&f.cube, 1.0)));
        let handle: PrimitiveRef = shared.clone();
        f.scene.add_primitive(handle.clone());
        f.scene.build_sdgs(&view);
        f.scene.clear_sdgs();

        f.scene.remove_primitive(&handle);
        other.add_primitive(handle);
        let stats = other.build_sdgs(&view);
        assert_eq!(stats.primitives_added, 2);
        assert_eq!(world_links(&other), 1);
        assert_eq!(world_instances(&other), 2);
        assert_eq!(shared.lock().unwrap().num_linked_scenes(), 2);

        let stats = f.scene.build_sdgs(&view);
        assert_eq!(stats.primitives_unlinked, 1);
        assert_eq!(world_links(&f.scene), 0);
        assert_eq!(world_links(&other), 1);
        assert_eq!(shared.lock().unwrap().num_linked_scenes(), 1);

        other.clear_sdgs();
        other.build_sdgs(&view);
        assert_eq!(world_instances(&other), 2);
    }

    #[test]
    fn test_primitive_shared_by_two_scenes_keeps_separate_links() {
        let mut f = fixture();
        let view = test_support::view();
        let mut other = Scene::new(SceneId::next(), f.ctx.config());
        let shared = Arc::new(Mutex::new(cube_at(&f.cube, 0.0)));

        f.scene.add_primitive(shared.clone());
        other.add_primitive(shared.clone());
        f.scene.build_sdgs(&view);
        other.build_sdgs(&view);
        assert_eq!(world_instances(&f.scene), 1);
        assert_eq!(world_instances(&other), 1);

        drop(other);
        assert_eq!(shared.lock().unwrap().num_linked_scenes(), 1);
        f.scene.clear_sdgs();
        f.scene.build_sdgs(&view);
        assert_eq!(world_instances(&f.scene), 1);
    }
}
