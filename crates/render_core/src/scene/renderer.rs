//! # Scene Renderer
//!
//! Drives one frame of a scene: build the depth groups, draw them in fixed order,
//! clear them. Editor-only groups are skipped unless editor depth groups are
//! enabled in the configuration and requested by the view.
//!
//! With [`ShowFlags::DEPTH_PREPASS`] each group's static meshes are first drawn
//! through their depth-only policies, right before the group's main pass.

use crate::core::RenderCoreConfig;
use crate::render::context::RenderDevice;
use crate::render::draw_list::DrawListStats;
use crate::scene::depth_group::DepthGroup;
use crate::scene::scene::{BuildStats, Scene};
use crate::scene::view::{SceneView, ShowFlags};

/// Statistics of one rendered frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Depth group construction
    pub build: BuildStats,
    /// Depth groups drawn
    pub depth_groups_drawn: usize,
    /// Depth prepass submission
    pub depth_prepass: DrawListStats,
    /// Draw submission
    pub draw: DrawListStats,
}

impl std::ops::AddAssign for FrameStats {
    fn add_assign(&mut self, other: Self) {
        self.build.primitives_added += other.build.primitives_added;
        self.build.primitives_culled += other.build.primitives_culled;
        self.build.primitives_hidden += other.build.primitives_hidden;
        self.build.primitives_linked += other.build.primitives_linked;
        self.build.primitives_unlinked += other.build.primitives_unlinked;
        self.depth_groups_drawn += other.depth_groups_drawn;
        self.depth_prepass += other.depth_prepass;
        self.draw += other.draw;
    }
}

/// Frame driver
#[derive(Debug, Clone)]
pub struct SceneRenderer {
    editor_depth_groups: bool,
    #[cfg_attr(not(feature = "editor"), allow(dead_code))]
    hit_proxies: bool,
}

impl SceneRenderer {
    /// Create a renderer for `config`
    pub fn new(config: &RenderCoreConfig) -> Self {
        Self {
            editor_depth_groups: config.editor_depth_groups_enabled(),
            hit_proxies: config.hit_proxies_enabled(),
        }
    }

    /// Groups `view` draws, in order
    pub fn visible_groups(&self, view: &SceneView) -> impl Iterator<Item = DepthGroup> {
        let editor = self.editor_depth_groups && view.show_flags().contains(ShowFlags::EDITOR);
        DepthGroup::ALL
            .into_iter()
            .filter(move |group| editor || !group.is_editor_only())
    }

    /// Build, draw and clear one frame
    pub fn render(&self, scene: &mut Scene, device: &mut RenderDevice, view: &SceneView) -> FrameStats {
        let mut stats = FrameStats {
            build: scene.build_sdgs(view),
            ..FrameStats::default()
        };

        let depth_prepass = view.show_flags().contains(ShowFlags::DEPTH_PREPASS);
        for group in self.visible_groups(view) {
            let depth_group = &scene.depth_groups()[group];
            if depth_prepass {
                stats.depth_prepass += depth_group.draw_depth_only(device, view);
            }
            stats.draw += depth_group.draw(device, view);
            stats.depth_groups_drawn += 1;
        }

        scene.clear_sdgs();
        log::trace!(
            "[SCENE_RENDERER] {:?}: {} draw calls, {} instances, {} state changes",
            scene.id(),
            stats.draw.draw_calls,
            stats.draw.instances,
            stats.draw.state_changes
        );
        stats
    }

    /// Build, draw only the depth-only policies and clear one frame
    pub fn render_depth_prepass(&self, scene: &mut Scene, device: &mut RenderDevice, view: &SceneView) -> FrameStats {
        let mut stats = FrameStats {
            build: scene.build_sdgs(view),
            ..FrameStats::default()
        };
        for group in self.visible_groups(view) {
            stats.depth_prepass += scene.depth_groups()[group].draw_depth_only(device, view);
            stats.depth_groups_drawn += 1;
        }
        scene.clear_sdgs();
        stats
    }

    /// Build, draw the hit proxy lists and clear one frame
    #[cfg(feature = "editor")]
    pub fn render_hit_proxies(&self, scene: &mut Scene, device: &mut RenderDevice, view: &SceneView) -> FrameStats {
        if !self.hit_proxies {
            log::warn!("[SCENE_RENDERER] hit proxy pass requested with hit proxies disabled");
            return FrameStats::default();
        }

        let mut stats = FrameStats {
            build: scene.build_sdgs(view),
            ..FrameStats::default()
        };
        for group in self.visible_groups(view) {
            stats.draw += scene.depth_groups()[group].draw_hit_proxies(device, view);
            stats.depth_groups_drawn += 1;
        }
        scene.clear_sdgs();
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{EditorConfig, RenderCoreConfig};
    use crate::foundation::math::{Mat4, Vec3};
    use crate::render::rhi::{FillMode, NullRhi, RhiCall};
    use crate::render::{RenderContext, Rhi};
    use crate::scene::primitive::primitive_ref;
    use crate::scene::scene::{SceneId, SceneState};
    use crate::scene::static_mesh::{StaticMesh, StaticMeshPrimitive};
    use crate::test_support;
    use std::sync::Arc;

    fn context_with(config: RenderCoreConfig) -> RenderContext {
        RenderContext::new(config, Box::new(NullRhi::with_call_recording()))
    }

    fn populate(ctx: &mut RenderContext, group: DepthGroup, count: usize) -> SceneId {
        let cube = Arc::new(StaticMesh::cube("Cube", test_support::material("Rock")));
        cube.init_resources(ctx);

        let id = SceneId::next();
        ctx.create_scene(id);
        for i in 0..count {
            let primitive = StaticMeshPrimitive::new(format!("Cube{i}"), cube.clone())
                .with_transform(Mat4::new_translation(&Vec3::new(i as f32, 0.0, 0.0)))
                .with_depth_group(group);
            assert!(ctx.add_primitive(id, primitive_ref(primitive)));
        }
        id
    }

    #[test]
    fn test_frame_draws_instanced_and_clears() {
        let mut ctx = test_support::context();
        let id = populate(&mut ctx, DepthGroup::World, 3);

        let stats = ctx.render_scene(id, &test_support::view()).unwrap();
        assert_eq!(stats.build.primitives_added, 3);
        assert_eq!(stats.draw.state_changes, 1);
        assert_eq!(stats.draw.draw_calls, 1);
        assert_eq!(stats.draw.instances, 3);
        assert_eq!(ctx.scene(id).unwrap().state(), SceneState::Empty);

        let rhi = test_support::null_rhi(&ctx);
        assert_eq!(rhi.stats().draw_calls, 1);
        assert_eq!(rhi.stats().instances_drawn, 3);
    }

    #[test]
    fn test_second_frame_reuses_bound_shader_state() {
        let mut ctx = test_support::context();
        let id = populate(&mut ctx, DepthGroup::World, 2);
        let view = test_support::view();

        let mut total = FrameStats::default();
        total += ctx.render_scene(id, &view).unwrap();
        total += ctx.render_scene(id, &view).unwrap();
        assert_eq!(total.draw.draw_calls, 2);
        assert_eq!(total.build.primitives_linked, 2);
        assert_eq!(test_support::null_rhi(&ctx).stats().bound_shader_states_created, 1);
    }

    #[test]
    fn test_unknown_scene_renders_nothing() {
        let mut ctx = test_support::context();
        assert!(ctx.render_scene(SceneId::next(), &test_support::view()).is_none());
    }

    #[test]
    fn test_editor_groups_skipped_when_disabled() {
        let config = RenderCoreConfig::default().with_editor(EditorConfig::disabled());
        let mut ctx = context_with(config);
        let id = populate(&mut ctx, DepthGroup::WorldEdForeground, 1);

        let stats = ctx.render_scene(id, &test_support::view()).unwrap();
        assert_eq!(stats.depth_groups_drawn, DepthGroup::COUNT - 2);
        assert_eq!(stats.draw.draw_calls, 0);
    }

    #[test]
    fn test_editor_groups_skipped_without_view_flag() {
        let mut ctx = test_support::context();
        let id = populate(&mut ctx, DepthGroup::WorldEdBackground, 1);
        let view = test_support::view().with_show_flags(ShowFlags::STATIC_MESH);

        let stats = ctx.render_scene(id, &view).unwrap();
        assert_eq!(stats.draw.draw_calls, 0);
    }

    #[cfg(feature = "editor")]
    #[test]
    fn test_editor_groups_drawn_in_editor_builds() {
        let mut ctx = test_support::context();
        let id = populate(&mut ctx, DepthGroup::WorldEdForeground, 1);

        let stats = ctx.render_scene(id, &test_support::view()).unwrap();
        assert_eq!(stats.depth_groups_drawn, DepthGroup::COUNT);
        assert_eq!(stats.draw.draw_calls, 1);
    }

    #[test]
    fn test_wireframe_frame_uses_wireframe_fill() {
        let mut ctx = test_support::context();
        let id = populate(&mut ctx, DepthGroup::World, 1);
        let view = test_support::view().with_show_flags(ShowFlags::default() | ShowFlags::WIREFRAME);

        let stats = ctx.render_scene(id, &view).unwrap();
        assert_eq!(stats.draw.draw_calls, 1);
        let calls = test_support::null_rhi(&ctx).calls();
        assert!(calls.iter().any(|call| matches!(
            call,
            RhiCall::SetRasterizerState(state) if state.fill_mode == FillMode::Wireframe
        )));
        assert!(!calls.iter().any(|call| matches!(
            call,
            RhiCall::SetRasterizerState(state) if state.fill_mode == FillMode::Solid
        )));
    }

    #[cfg(feature = "editor")]
    #[test]
    fn test_hit_proxy_pass_draws_pickable_primitives_only() {
        use crate::render::mesh_batch::HitProxyId;

        let mut ctx = test_support::context();
        let id = populate(&mut ctx, DepthGroup::World, 2);
        let cube = Arc::new(StaticMesh::cube("Pickable", test_support::material("Marker")));
        cube.init_resources(&mut ctx);
        ctx.add_primitive(id, primitive_ref(StaticMeshPrimitive::new("Pickable", cube).with_hit_proxy(HitProxyId(42))));

        let stats = ctx.render_hit_proxies(id, &test_support::view()).unwrap();
        assert_eq!(stats.draw.draw_calls, 1);
        assert_eq!(stats.draw.instances, 1);
    }

    #[test]
    fn test_depth_prepass_flag_draws_depth_only_first() {
        let mut ctx = test_support::context();
        let id = populate(&mut ctx, DepthGroup::World, 3);

        let stats = ctx.render_scene(id, &test_support::view()).unwrap();
        assert_eq!(stats.depth_prepass, DrawListStats::default());

        let view = test_support::view().with_show_flags(ShowFlags::default() | ShowFlags::DEPTH_PREPASS);
        let stats = ctx.render_scene(id, &view).unwrap();
        assert_eq!(stats.depth_prepass.draw_calls, 1);
        assert_eq!(stats.depth_prepass.instances, 3);
        assert_eq!(stats.draw.draw_calls, 1);
        // depth-only and base shaders bind different states
        assert_eq!(test_support::null_rhi(&ctx).stats().bound_shader_states_created, 2);
    }

    #[test]
    fn test_standalone_depth_prepass_skips_sprites() {
        use crate::scene::sprite::SpritePrimitive;

        let mut ctx = test_support::context();
        let id = populate(&mut ctx, DepthGroup::World, 2);
        let quad = Arc::new(StaticMesh::sprite_quad("Quad", test_support::material("Glow")));
        quad.init_resources(&mut ctx);
        ctx.add_primitive(id, primitive_ref(SpritePrimitive::new("Light", quad, Vec3::zeros(), 1.0)));

        let stats = ctx.render_depth_prepass(id, &test_support::view()).unwrap();
        assert_eq!(stats.build.primitives_added, 3);
        assert_eq!(stats.depth_prepass.draw_calls, 1);
        assert_eq!(stats.depth_prepass.instances, 2);
        assert_eq!(stats.draw, DrawListStats::default());
        assert_eq!(ctx.scene(id).unwrap().state(), SceneState::Empty);
    }

    #[cfg(feature = "editor")]
    #[test]
    fn test_hit_proxy_pass_ignores_wireframe_view() {
        use crate::render::drawing_policy::{DrawingPolicyKind, MeshDrawingPolicy};
        use crate::render::mesh_batch::HitProxyId;

        let mut ctx = test_support::context();
        let marker = test_support::material("Marker");
        let cube = Arc::new(StaticMesh::cube("Pickable", marker.clone()));
        cube.init_resources(&mut ctx);
        let id = SceneId::next();
        ctx.create_scene(id);
        ctx.add_primitive(
            id,
            primitive_ref(StaticMeshPrimitive::new("Pickable", cube.clone()).with_hit_proxy(HitProxyId(5))),
        );

        let view = test_support::view().with_show_flags(ShowFlags::default() | ShowFlags::WIREFRAME);
        let stats = ctx.render_hit_proxies(id, &view).unwrap();
        assert_eq!(stats.draw.draw_calls, 1);

        let key = |kind| {
            MeshDrawingPolicy::new(kind, cube.vertex_factory().clone(), marker.clone(), 0.0)
                .bound_shader_state_key()
                .unwrap()
        };
        let cache = ctx.device().bound_shader_states();
        assert!(cache.find(&key(DrawingPolicyKind::HitProxy)).is_some());
        assert!(cache.find(&key(DrawingPolicyKind::Base)).is_none());
        assert!(!test_support::null_rhi(&ctx).calls().iter().any(|call| matches!(
            call,
            RhiCall::SetRasterizerState(state) if state.fill_mode == FillMode::Wireframe
        )));
    }

    #[cfg(feature = "editor")]
    mod dynamic {
        use super::*;
        use crate::render::dynamic_mesh::DynamicMeshBuilder;
        use crate::render::material::MaterialRef;
        use crate::render::mesh_batch::HitProxyId;
        use crate::scene::depth_group::{DynamicMeshElement, SceneDepthGroups};
        use crate::scene::primitive::Primitive;

        struct Gizmo {
            mesh: Arc<DynamicMeshBuilder>,
            material: MaterialRef,
            hit_proxy_id: Option<HitProxyId>,
        }

        impl Primitive for Gizmo {
            fn name(&self) -> &str {
                "Gizmo"
            }

            fn link_draw_list(&mut self, _depth_groups: &mut SceneDepthGroups) {}

            fn unlink_draw_list(&mut self, _depth_groups: &mut SceneDepthGroups) {}

            fn add_to_draw_list(&mut self, depth_groups: &mut SceneDepthGroups, _view: &SceneView) {
                if depth_groups.dynamic_elements_enabled() {
                    let mut element = DynamicMeshElement::new(self.mesh.clone(), Mat4::identity(), self.material.clone());
                    element.hit_proxy_id = self.hit_proxy_id;
                    depth_groups[DepthGroup::WorldEdForeground].add_dynamic_element(element);
                }
            }
        }

        fn scene_with_gizmos(ctx: &mut RenderContext, hit_proxies: &[Option<HitProxyId>]) -> SceneId {
            let mesh = Arc::new(DynamicMeshBuilder::new("Gizmo"));
            mesh.add_box(Vec3::zeros(), Vec3::new(1.0, 1.0, 1.0), [1.0, 1.0, 0.0, 1.0]);
            mesh.build(ctx);

            let id = SceneId::next();
            ctx.create_scene(id);
            for hit_proxy_id in hit_proxies {
                ctx.add_primitive(
                    id,
                    primitive_ref(Gizmo {
                        mesh: mesh.clone(),
                        material: test_support::material("Gizmo"),
                        hit_proxy_id: *hit_proxy_id,
                    }),
                );
            }
            id
        }

        #[test]
        fn test_dynamic_elements_are_drawn_once() {
            let mut ctx = test_support::context();
            let id = scene_with_gizmos(&mut ctx, &[None]);

            let stats = ctx.render_scene(id, &test_support::view()).unwrap();
            assert_eq!(stats.draw.draw_calls, 1);
            assert_eq!(ctx.device().rhi().name(), "Null");
        }

        #[test]
        fn test_pickable_dynamic_elements_join_the_hit_proxy_pass() {
            let mut ctx = test_support::context();
            let id = scene_with_gizmos(&mut ctx, &[Some(HitProxyId(7)), None]);

            let stats = ctx.render_hit_proxies(id, &test_support::view()).unwrap();
            assert_eq!(stats.draw.draw_calls, 1);
            assert_eq!(stats.draw.instances, 1);
            assert_eq!(test_support::null_rhi(&ctx).stats().bound_shader_states_created, 1);

            let stats = ctx.render_scene(id, &test_support::view()).unwrap();
            assert_eq!(stats.draw.draw_calls, 2);
        }
    }
}
