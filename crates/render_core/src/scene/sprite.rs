//! Camera-facing sprites
//!
//! A sprite draws a shared quad mesh through the sprite draw list. Its transform
//! is rebuilt every frame from the view so the quad always faces the camera.

use std::sync::Arc;

use crate::foundation::math::{Mat4, Vec3};
use crate::render::drawing_policy::{DrawingPolicyKind, MeshDrawingPolicy};
use crate::render::material::MaterialRef;
use crate::render::mesh_batch::{HitProxyId, MeshInstance};
use crate::scene::bounds::AABB;
use crate::scene::depth_group::{DepthGroup, DrawListKind, SceneDepthGroups};
use crate::scene::primitive::{LinkRequest, MeshLinks, Primitive};
use crate::scene::static_mesh::StaticMesh;
use crate::scene::view::SceneView;

/// Billboard quad placed in a scene
pub struct SpritePrimitive {
    name: String,
    quad: Arc<StaticMesh>,
    material: MaterialRef,
    position: Vec3,
    size: f32,
    depth_group: DepthGroup,
    visible: bool,
    hit_proxy_id: Option<HitProxyId>,
    links: MeshLinks,
}

impl SpritePrimitive {
    /// Place a sprite of `size` world units at `position`, drawn with the quad's material
    ///
    /// # Panics
    ///
    /// Panics if `quad` has no sections.
    pub fn new(name: impl Into<String>, quad: Arc<StaticMesh>, position: Vec3, size: f32) -> Self {
        let material = quad
            .elements()
            .first()
            .map(|element| element.material.clone())
            .unwrap_or_else(|| panic!("sprite quad '{}' has no sections", quad.name()));
        Self {
            name: name.into(),
            quad,
            material,
            position,
            size,
            depth_group: DepthGroup::World,
            visible: true,
            hit_proxy_id: None,
            links: MeshLinks::default(),
        }
    }

    /// Draw with another material
    pub fn with_material(mut self, material: MaterialRef) -> Self {
        self.material = material;
        self
    }

    /// Set the depth group
    pub fn with_depth_group(mut self, depth_group: DepthGroup) -> Self {
        self.depth_group = depth_group;
        self
    }

    /// Set the hit proxy id
    pub fn with_hit_proxy(mut self, id: HitProxyId) -> Self {
        self.hit_proxy_id = Some(id);
        self
    }

    /// Move the sprite
    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
    }

    /// Position
    pub fn position(&self) -> Vec3 {
        self.position
    }

    /// Show or hide the sprite
    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    /// Replace the material
    pub fn set_material(&mut self, material: MaterialRef) {
        self.material = material;
        self.links.mark_dirty();
    }

    /// Transform facing the camera of `view`
    pub fn facing_transform(&self, view: &SceneView) -> Mat4 {
        // inverse view rotation without its translation
        let mut rotation = view.view().try_inverse().unwrap_or_else(Mat4::identity);
        rotation[(0, 3)] = 0.0;
        rotation[(1, 3)] = 0.0;
        rotation[(2, 3)] = 0.0;
        Mat4::new_translation(&self.position) * rotation * Mat4::new_scaling(self.size)
    }
}

impl Primitive for SpritePrimitive {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_visible(&self) -> bool {
        self.visible
    }

    fn bounds(&self) -> Option<AABB> {
        // any orientation of the quad fits in this box
        let half = self.size * std::f32::consts::FRAC_1_SQRT_2;
        Some(AABB::from_center_extents(self.position, Vec3::new(half, half, half)))
    }

    fn link_draw_list(&mut self, depth_groups: &mut SceneDepthGroups) {
        let Some(batch) = self.quad.batch(0) else {
            return;
        };
        let vertex_factory = self.quad.vertex_factory();
        let request = LinkRequest {
            policy: MeshDrawingPolicy::new(DrawingPolicyKind::Base, vertex_factory.clone(), self.material.clone(), 0.0),
            hit_proxy_policy: self.hit_proxy_id.map(|_| {
                MeshDrawingPolicy::new(DrawingPolicyKind::HitProxy, vertex_factory.clone(), self.material.clone(), 0.0)
            }),
            batch,
        };
        self.links
            .link(depth_groups, self.depth_group, DrawListKind::Sprite, vec![request]);
    }

    fn unlink_draw_list(&mut self, depth_groups: &mut SceneDepthGroups) {
        self.links.unlink(depth_groups);
    }

    fn add_to_draw_list(&mut self, depth_groups: &mut SceneDepthGroups, view: &SceneView) {
        if self.links.needs_relink(depth_groups) {
            self.link_draw_list(depth_groups);
        }
        let instance = MeshInstance::new(self.facing_transform(view)).with_hit_proxy(self.hit_proxy_id);
        self.links.add_instance(depth_groups, &instance);
    }
}

impl std::fmt::Debug for SpritePrimitive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpritePrimitive")
            .field("name", &self.name)
            .field("position", &self.position)
            .field("size", &self.size)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::DrawListConfig;
    use crate::foundation::math::{Point3, Vec4};
    use crate::test_support;
    use approx::assert_relative_eq;

    #[test]
    fn test_sprites_share_one_sprite_link() {
        let mut ctx = test_support::context();
        let quad = Arc::new(StaticMesh::sprite_quad("Quad", test_support::material("Light")));
        quad.init_resources(&mut ctx);

        let mut groups = SceneDepthGroups::new(&DrawListConfig::default());
        let view = test_support::view();
        for i in 0..4 {
            let mut sprite = SpritePrimitive::new(format!("Light{i}"), quad.clone(), Vec3::new(i as f32, 0.0, 0.0), 1.0);
            sprite.add_to_draw_list(&mut groups, &view);
        }

        let world = &groups[DepthGroup::World];
        assert!(world.static_mesh_draw_list().is_empty());
        assert_eq!(world.sprite_draw_list().num_links(), 1);
        assert_eq!(world.sprite_draw_list().num_instances(), 4);
    }

    #[test]
    fn test_quad_faces_the_camera() {
        let quad = Arc::new(StaticMesh::sprite_quad("Quad", test_support::material("Light")));
        let sprite = SpritePrimitive::new("Light", quad, Vec3::new(1.0, 2.0, 3.0), 2.0);

        let eye = Point3::new(10.0, 0.0, 0.0);
        let view_matrix = Mat4::look_at_rh(&eye, &Point3::origin(), &Vec3::y());
        let view = SceneView::new(view_matrix, Mat4::identity(), (64, 64));
        let transform = sprite.facing_transform(&view);

        // quad normal (+Z local) points at the camera (+X world)
        let normal = (transform * Vec4::new(0.0, 0.0, 1.0, 0.0)).xyz().normalize();
        assert_relative_eq!(normal, Vec3::x(), epsilon = 1e-5);
        let center = transform * Vec4::new(0.0, 0.0, 0.0, 1.0);
        assert_relative_eq!(center.xyz(), Vec3::new(1.0, 2.0, 3.0), epsilon = 1e-5);
    }
}
