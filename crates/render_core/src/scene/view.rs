//! Per-frame view description

use crate::foundation::math::{Mat4, Vec2, Vec3, Vec4};
use crate::scene::bounds::Frustum;

bitflags::bitflags! {
    /// What a view draws
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ShowFlags: u32 {
        /// Static mesh draw lists
        const STATIC_MESH = 1 << 0;
        /// Sprite draw lists
        const SPRITE = 1 << 1;
        /// Editor immediate-mode elements
        const DYNAMIC_ELEMENTS = 1 << 2;
        /// Editor depth groups (WorldEdBackground, WorldEdForeground)
        const EDITOR = 1 << 3;
        /// Replace every policy by its wireframe variant
        const WIREFRAME = 1 << 4;
        /// Skip frustum culling
        const NO_CULLING = 1 << 5;
        /// Lay down depth for the static mesh lists before the main pass
        const DEPTH_PREPASS = 1 << 6;
    }
}

impl Default for ShowFlags {
    fn default() -> Self {
        Self::STATIC_MESH | Self::SPRITE | Self::DYNAMIC_ELEMENTS | Self::EDITOR
    }
}

/// Camera and per-view settings for one frame
#[derive(Debug, Clone)]
pub struct SceneView {
    view: Mat4,
    projection: Mat4,
    view_projection: Mat4,
    frustum: Frustum,
    view_origin: Vec3,
    viewport_size: (u32, u32),
    show_flags: ShowFlags,
    background_color: [f32; 4],
}

impl SceneView {
    /// Create a view from view and projection matrices
    pub fn new(view: Mat4, projection: Mat4, viewport_size: (u32, u32)) -> Self {
        let view_projection = projection * view;
        let view_origin = view
            .try_inverse()
            .map_or_else(Vec3::zeros, |inverse| inverse.column(3).xyz());
        Self {
            view,
            projection,
            view_projection,
            frustum: Frustum::from_matrix(&view_projection),
            view_origin,
            viewport_size,
            show_flags: ShowFlags::default(),
            background_color: [0.0, 0.0, 0.0, 1.0],
        }
    }

    /// Set the show flags
    pub fn with_show_flags(mut self, show_flags: ShowFlags) -> Self {
        self.show_flags = show_flags;
        self
    }

    /// Set the clear color
    pub fn with_background_color(mut self, color: [f32; 4]) -> Self {
        self.background_color = color;
        self
    }

    /// World-to-view matrix
    pub fn view(&self) -> &Mat4 {
        &self.view
    }

    /// View-to-clip matrix
    pub fn projection(&self) -> &Mat4 {
        &self.projection
    }

    /// World-to-clip matrix
    pub fn view_projection(&self) -> &Mat4 {
        &self.view_projection
    }

    /// Culling frustum
    pub fn frustum(&self) -> &Frustum {
        &self.frustum
    }

    /// Camera position in world space
    pub fn view_origin(&self) -> Vec3 {
        self.view_origin
    }

    /// Viewport size in pixels
    pub fn viewport_size(&self) -> (u32, u32) {
        self.viewport_size
    }

    /// Show flags
    pub fn show_flags(&self) -> ShowFlags {
        self.show_flags
    }

    /// Clear color
    pub fn background_color(&self) -> [f32; 4] {
        self.background_color
    }

    /// World-space ray through a pixel, as `(origin, direction)`. The origin lies
    /// on the near plane and the direction is normalized.
    ///
    /// Unprojects in two steps (clip to view, then view to world) so a view with a
    /// large translation keeps its precision.
    pub fn screen_to_world(&self, point: Vec2) -> (Vec3, Vec3) {
        let inverse_projection = self.projection.try_inverse().unwrap_or_else(Mat4::identity);
        let inverse_view = self.view.try_inverse().unwrap_or_else(Mat4::identity);

        #[allow(clippy::cast_precision_loss)]
        let (half_width, half_height) = (self.viewport_size.0 as f32 / 2.0, self.viewport_size.1 as f32 / 2.0);
        let screen_x = (point.x.trunc() - half_width) / half_width;
        let screen_y = (point.y.trunc() - half_height) / -half_height;

        let unproject = |depth: f32| {
            let homogeneous = inverse_projection * Vec4::new(screen_x, screen_y, depth, 1.0);
            if homogeneous.w == 0.0 {
                homogeneous.xyz()
            } else {
                homogeneous.xyz() / homogeneous.w
            }
        };
        let start = unproject(-1.0);
        let direction = (unproject(0.0) - start).normalize();

        let origin = (inverse_view * start.push(1.0)).xyz();
        let direction = (inverse_view * direction.push(0.0)).xyz().normalize();
        (origin, direction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Point3;
    use approx::assert_relative_eq;

    #[test]
    fn test_view_origin_is_camera_position() {
        let eye = Point3::new(3.0, 4.0, 5.0);
        let view = Mat4::look_at_rh(&eye, &Point3::origin(), &Vec3::y());
        let scene_view = SceneView::new(view, Mat4::identity(), (640, 480));
        assert_relative_eq!(scene_view.view_origin(), eye.coords, epsilon = 1e-4);
    }

    #[test]
    fn test_screen_center_ray_looks_down_the_view_axis() {
        let view = crate::test_support::view();
        let (origin, direction) = view.screen_to_world(Vec2::new(640.0, 360.0));
        assert_relative_eq!(origin, Vec3::new(0.0, 0.0, 9.9), epsilon = 1e-3);
        assert_relative_eq!(direction, Vec3::new(0.0, 0.0, -1.0), epsilon = 1e-4);
    }

    #[test]
    fn test_screen_corner_rays_point_outward() {
        let view = crate::test_support::view();
        let (_, top_left) = view.screen_to_world(Vec2::new(0.0, 0.0));
        assert!(top_left.x < 0.0 && top_left.y > 0.0 && top_left.z < 0.0);
        let (_, bottom_right) = view.screen_to_world(Vec2::new(1280.0, 720.0));
        assert!(bottom_right.x > 0.0 && bottom_right.y < 0.0);
        assert_relative_eq!(bottom_right.norm(), 1.0, epsilon = 1e-5);

        // a point on the ray projects back onto the same pixel
        let (origin, direction) = view.screen_to_world(Vec2::new(960.0, 180.0));
        let clip = view.view_projection() * (origin + direction * 5.0).push(1.0);
        let ndc = clip.xyz() / clip.w;
        assert_relative_eq!(ndc.x, 0.5, epsilon = 1e-3);
        assert_relative_eq!(ndc.y, 0.5, epsilon = 1e-3);
    }

    #[test]
    fn test_default_show_flags() {
        let flags = ShowFlags::default();
        assert!(flags.contains(ShowFlags::STATIC_MESH | ShowFlags::SPRITE));
        assert!(!flags.contains(ShowFlags::WIREFRAME));
    }
}
