//! Primitive collision shapes and intersection algorithms
//!
//! Provides basic geometric primitives (rays, triangles) with
//! efficient intersection testing algorithms.

use crate::foundation::math::Vec3;
use crate::spatial::Aabb;

/// A ray for ray casting and picking
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    /// The origin point of the ray
    pub origin: Vec3,
    /// The direction of the ray (normalized on construction)
    pub direction: Vec3,
}

impl Ray {
    /// Creates a new ray with the given origin and direction
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self {
            origin,
            direction: direction.normalize(),
        }
    }

    /// Get a point along the ray at distance t
    pub fn point_at(&self, t: f64) -> Vec3 {
        self.origin + self.direction * t
    }

    /// Ray parameter of the projection of `point` onto the ray line
    pub fn parameter_of(&self, point: &Vec3) -> f64 {
        (point - self.origin).dot(&self.direction)
    }
}

/// A triangle for collision detection
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Triangle {
    /// First vertex
    pub v0: Vec3,
    /// Second vertex
    pub v1: Vec3,
    /// Third vertex
    pub v2: Vec3,
}

impl Triangle {
    /// Creates a new triangle
    pub fn new(v0: Vec3, v1: Vec3, v2: Vec3) -> Self {
        Self { v0, v1, v2 }
    }

    /// This triangle with every vertex mapped through `map`
    pub fn mapped<F>(&self, map: F) -> Self
    where
        F: Fn(&Vec3) -> Vec3,
    {
        Self::new(map(&self.v0), map(&self.v1), map(&self.v2))
    }

    /// Unnormalized face normal (right-hand rule), zero for degenerate triangles
    pub fn area_normal(&self) -> Vec3 {
        (self.v1 - self.v0).cross(&(self.v2 - self.v0))
    }

    /// Calculates the centroid (center point) of the triangle
    pub fn centroid(&self) -> Vec3 {
        (self.v0 + self.v1 + self.v2) / 3.0
    }

    /// Bounding box of the three vertices
    pub fn bounds(&self) -> Aabb {
        Aabb::from_points([self.v0, self.v1, self.v2])
    }

    /// Möller-Trumbore ray-triangle intersection algorithm
    /// Returns (t, u, v) barycentric coordinates if hit, None otherwise
    ///
    /// See: "Fast, Minimum Storage Ray/Triangle Intersection" by Möller & Trumbore
    pub fn intersect_ray(&self, ray: &Ray) -> Option<(f64, f64, f64)> {
        const EPSILON: f64 = 1.0e-12;

        // Calculate edges from v0
        let edge1 = self.v1 - self.v0;
        let edge2 = self.v2 - self.v0;

        // Calculate determinant
        let h = ray.direction.cross(&edge2);
        let a = edge1.dot(&h);

        // Ray parallel to triangle?
        if a.abs() < EPSILON {
            return None;
        }

        let f = 1.0 / a;
        let s = ray.origin - self.v0;
        let u = f * s.dot(&h);

        // Hit outside triangle on u axis?
        if !(0.0..=1.0).contains(&u) {
            return None;
        }

        let q = s.cross(&edge1);
        let v = f * ray.direction.dot(&q);

        // Hit outside triangle on v axis?
        if v < 0.0 || u + v > 1.0 {
            return None;
        }

        // Calculate t (distance along ray)
        let t = f * edge2.dot(&q);

        if t >= 0.0 {
            Some((t, u, v))
        } else {
            None // Behind ray origin
        }
    }

    /// Test if this triangle intersects another triangle (touching counts)
    ///
    /// Separating Axis Theorem over 17 candidate axes:
    /// - 2 face normals (one per triangle)
    /// - 9 edge-edge cross products
    /// - 6 in-plane edge normals, which separate coplanar pairs
    pub fn intersects_triangle(&self, other: &Triangle) -> bool {
        // Helper to project a triangle onto an axis and get min/max
        fn project_triangle(tri: &Triangle, axis: &Vec3) -> (f64, f64) {
            let p0 = axis.dot(&tri.v0);
            let p1 = axis.dot(&tri.v1);
            let p2 = axis.dot(&tri.v2);
            (p0.min(p1).min(p2), p0.max(p1).max(p2))
        }

        // Returns false if `axis` separates the triangles
        let test_axis = |axis: Vec3, degenerate_sq: f64| -> bool {
            let axis_len_sq = axis.norm_squared();
            if axis_len_sq <= degenerate_sq {
                return true; // Degenerate axis, skip
            }

            let (min1, max1) = project_triangle(self, &axis);
            let (min2, max2) = project_triangle(other, &axis);
            max1 >= min2 && max2 >= min1
        };

        // Get edges for both triangles
        let edges1 = [
            self.v1 - self.v0,
            self.v2 - self.v1,
            self.v0 - self.v2,
        ];

        let edges2 = [
            other.v1 - other.v0,
            other.v2 - other.v1,
            other.v0 - other.v2,
        ];

        // Cross products shorter than this, relative to the longest edges,
        // are treated as parallel
        let longest_sq = edges1
            .iter()
            .chain(edges2.iter())
            .map(|edge| edge.norm_squared())
            .fold(0.0, f64::max);
        let degenerate_sq = longest_sq * longest_sq * 1.0e-24;

        let n1 = self.area_normal();
        let n2 = other.area_normal();

        // Face normals
        if !test_axis(n1, degenerate_sq) || !test_axis(n2, degenerate_sq) {
            return false;
        }

        // Edge-edge cross products
        for edge1 in &edges1 {
            for edge2 in &edges2 {
                if !test_axis(edge1.cross(edge2), degenerate_sq) {
                    return false;
                }
            }
        }

        // In-plane edge normals (only matter when the triangles are coplanar)
        for edge in &edges1 {
            if !test_axis(n1.cross(edge), degenerate_sq * longest_sq) {
                return false;
            }
        }
        for edge in &edges2 {
            if !test_axis(n2.cross(edge), degenerate_sq * longest_sq) {
                return false;
            }
        }

        // No separating axis found = triangles intersect
        true
    }
}
