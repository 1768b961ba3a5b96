//! Bounding volumes for visibility culling
//!
//! Axis-aligned boxes, planes and view frustums. Frustum planes are extracted
//! from a view-projection matrix with the Gribb-Hartmann method and point inward.

use crate::foundation::math::{Mat4, Point3, Vec3, Vec4};

/// Axis-Aligned Bounding Box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AABB {
    /// Minimum corner of the bounding box
    pub min: Vec3,
    /// Maximum corner of the bounding box
    pub max: Vec3,
}

impl AABB {
    /// Create a new AABB from min and max points
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Create an AABB centered at a point with given extents
    pub fn from_center_extents(center: Vec3, extents: Vec3) -> Self {
        Self {
            min: center - extents,
            max: center + extents,
        }
    }

    /// Smallest box containing every point. `None` for an empty slice.
    pub fn from_points(points: &[Vec3]) -> Option<Self> {
        let (first, rest) = points.split_first()?;
        Some(rest.iter().fold(Self::new(*first, *first), |bounds, point| Self {
            min: bounds.min.inf(point),
            max: bounds.max.sup(point),
        }))
    }

    /// Get the center of the AABB
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Get the extents (half-size) of the AABB
    pub fn extents(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    /// Check if this AABB contains a point
    pub fn contains_point(&self, point: Vec3) -> bool {
        point.x >= self.min.x
            && point.x <= self.max.x
            && point.y >= self.min.y
            && point.y <= self.max.y
            && point.z >= self.min.z
            && point.z <= self.max.z
    }

    /// Check if this AABB intersects another AABB
    pub fn intersects(&self, other: &Self) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }

    /// Box enclosing this one after an affine transform
    pub fn transformed(&self, matrix: &Mat4) -> Self {
        let center = self.center();
        let extents = self.extents();
        let world_center = matrix.transform_point(&Point3::from(center)).coords;

        // Arvo: world extents are |M| applied to the local extents
        let mut world_extents = Vec3::zeros();
        for row in 0..3 {
            for col in 0..3 {
                world_extents[row] += matrix[(row, col)].abs() * extents[col];
            }
        }
        Self::from_center_extents(world_center, world_extents)
    }
}

/// Plane defined by normal and distance from origin
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    /// Normal vector (normalized)
    pub normal: Vec3,
    /// Distance from origin along the normal
    pub distance: f32,
}

impl Plane {
    /// Create a new plane from normal and distance
    pub fn new(normal: Vec3, distance: f32) -> Self {
        Self {
            normal: normal.normalize(),
            distance,
        }
    }

    /// Plane from `(a, b, c, d)` coefficients of `ax + by + cz + d = 0`, normalized
    pub fn from_coefficients(coefficients: Vec4) -> Self {
        let normal = coefficients.xyz();
        let length = normal.magnitude();
        if length <= f32::EPSILON {
            return Self {
                normal: Vec3::zeros(),
                distance: 0.0,
            };
        }
        Self {
            normal: normal / length,
            distance: coefficients.w / length,
        }
    }

    /// Calculate signed distance from plane to point
    pub fn distance_to_point(&self, point: Vec3) -> f32 {
        self.normal.dot(&point) + self.distance
    }
}

/// Frustum for visibility culling
#[derive(Debug, Clone, PartialEq)]
pub struct Frustum {
    /// Six inward-facing planes (left, right, bottom, top, near, far)
    pub planes: [Plane; 6],
}

impl Frustum {
    /// Create a frustum from six planes
    pub fn new(planes: [Plane; 6]) -> Self {
        Self { planes }
    }

    /// Extract frustum planes from a view-projection matrix (Gribb-Hartmann).
    ///
    /// Expects a 0..1 or -1..1 clip depth; the near plane uses row 3 + row 2, which
    /// is conservative for 0..1 depth.
    pub fn from_matrix(view_projection: &Mat4) -> Self {
        let row = |index: usize| -> Vec4 { view_projection.row(index).transpose() };
        let (r0, r1, r2, r3) = (row(0), row(1), row(2), row(3));

        Self {
            planes: [
                Plane::from_coefficients(r3 + r0),
                Plane::from_coefficients(r3 - r0),
                Plane::from_coefficients(r3 + r1),
                Plane::from_coefficients(r3 - r1),
                Plane::from_coefficients(r3 + r2),
                Plane::from_coefficients(r3 - r2),
            ],
        }
    }

    /// Check if an AABB is inside or intersects the frustum
    pub fn intersects_aabb(&self, aabb: &AABB) -> bool {
        self.planes.iter().all(|plane| {
            // corner furthest along the plane normal
            let mut p = aabb.min;
            if plane.normal.x >= 0.0 {
                p.x = aabb.max.x;
            }
            if plane.normal.y >= 0.0 {
                p.y = aabb.max.y;
            }
            if plane.normal.z >= 0.0 {
                p.z = aabb.max.z;
            }
            plane.distance_to_point(p) >= 0.0
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn camera() -> Mat4 {
        let view = Mat4::look_at_rh(&Point3::new(0.0, 0.0, 10.0), &Point3::origin(), &Vec3::y());
        let projection = Mat4::new_perspective(1.0, std::f32::consts::FRAC_PI_2, 1.0, 50.0);
        projection * view
    }

    #[test]
    fn test_frustum_contains_box_in_front_of_camera() {
        let frustum = Frustum::from_matrix(&camera());
        let unit = AABB::from_center_extents(Vec3::zeros(), Vec3::new(0.5, 0.5, 0.5));
        assert!(frustum.intersects_aabb(&unit));
    }

    #[test]
    fn test_frustum_rejects_boxes_outside() {
        let frustum = Frustum::from_matrix(&camera());
        let behind = AABB::from_center_extents(Vec3::new(0.0, 0.0, 20.0), Vec3::new(0.5, 0.5, 0.5));
        let far_left = AABB::from_center_extents(Vec3::new(-100.0, 0.0, 0.0), Vec3::new(0.5, 0.5, 0.5));
        let beyond_far = AABB::from_center_extents(Vec3::new(0.0, 0.0, -100.0), Vec3::new(0.5, 0.5, 0.5));
        assert!(!frustum.intersects_aabb(&behind));
        assert!(!frustum.intersects_aabb(&far_left));
        assert!(!frustum.intersects_aabb(&beyond_far));
    }

    #[test]
    fn test_frustum_keeps_box_straddling_a_plane() {
        let frustum = Frustum::from_matrix(&camera());
        // 90 degree fov: at distance 10 the left plane is at x = -10
        let straddling = AABB::from_center_extents(Vec3::new(-10.0, 0.0, 0.0), Vec3::new(1.0, 1.0, 1.0));
        assert!(frustum.intersects_aabb(&straddling));
    }

    #[test]
    fn test_plane_coefficients_are_normalized() {
        let plane = Plane::from_coefficients(Vec4::new(0.0, 2.0, 0.0, 4.0));
        assert_relative_eq!(plane.normal, Vec3::y());
        assert_relative_eq!(plane.distance, 2.0);
        assert_relative_eq!(plane.distance_to_point(Vec3::new(0.0, 1.0, 0.0)), 3.0);
    }

    #[test]
    fn test_transformed_bounds() {
        let unit = AABB::new(Vec3::new(-1.0, -1.0, -1.0), Vec3::new(1.0, 1.0, 1.0));
        let moved = unit.transformed(&Mat4::new_translation(&Vec3::new(5.0, 0.0, 0.0)));
        assert_relative_eq!(moved.min, Vec3::new(4.0, -1.0, -1.0));
        assert_relative_eq!(moved.max, Vec3::new(6.0, 1.0, 1.0));

        let rotated = unit.transformed(&Mat4::from_euler_angles(0.0, std::f32::consts::FRAC_PI_4, 0.0));
        let half_diagonal = std::f32::consts::SQRT_2;
        assert_relative_eq!(rotated.max.x, half_diagonal, epsilon = 1e-5);
        assert_relative_eq!(rotated.max.y, 1.0, epsilon = 1e-5);
    }

    #[test]
    fn test_from_points() {
        assert!(AABB::from_points(&[]).is_none());
        let bounds = AABB::from_points(&[Vec3::new(1.0, -2.0, 0.0), Vec3::new(-1.0, 3.0, 0.5)]).unwrap();
        assert_eq!(bounds.min, Vec3::new(-1.0, -2.0, 0.0));
        assert_eq!(bounds.max, Vec3::new(1.0, 3.0, 0.5));
        assert!(bounds.contains_point(Vec3::zeros()));
    }
}
