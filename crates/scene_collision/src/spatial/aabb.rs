//! Axis-aligned bounding boxes

use crate::foundation::math::Vec3;

/// Axis-Aligned Bounding Box for spatial queries
///
/// The empty box has `min = +MAX` and `max = -MAX`, so containing any point
/// into it yields that point's degenerate box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    /// Minimum corner of the bounding box
    pub min: Vec3,
    /// Maximum corner of the bounding box
    pub max: Vec3,
}

impl Default for Aabb {
    fn default() -> Self {
        Self::empty()
    }
}

impl Aabb {
    /// Create a new AABB from min and max points
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// The empty box, identity for [`Aabb::contain`]
    pub fn empty() -> Self {
        Self {
            min: Vec3::repeat(f64::MAX),
            max: Vec3::repeat(-f64::MAX),
        }
    }

    /// Create an AABB centered at a point with given extents
    pub fn from_center_extents(center: Vec3, extents: Vec3) -> Self {
        Self {
            min: center - extents,
            max: center + extents,
        }
    }

    /// Smallest box containing all the points
    pub fn from_points<I: IntoIterator<Item = Vec3>>(points: I) -> Self {
        let mut bounds = Self::empty();
        for point in points {
            bounds.contain_point(&point);
        }
        bounds
    }

    /// True if no point has been contained yet
    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    /// Grow this box to include a point
    pub fn contain_point(&mut self, point: &Vec3) {
        self.min = self.min.inf(point);
        self.max = self.max.sup(point);
    }

    /// Grow this box to include another box
    pub fn contain(&mut self, other: &Aabb) {
        if other.is_empty() {
            return;
        }
        self.min = self.min.inf(&other.min);
        self.max = self.max.sup(&other.max);
    }

    /// Union of two boxes
    pub fn union(&self, other: &Aabb) -> Aabb {
        let mut result = *self;
        result.contain(other);
        result
    }

    /// Get the center of the AABB
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Get the extents (half-size) of the AABB
    pub fn extents(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    /// Full size along each axis, zero for the empty box
    pub fn size(&self) -> Vec3 {
        if self.is_empty() {
            Vec3::zeros()
        } else {
            self.max - self.min
        }
    }

    /// Largest dimension of the box
    pub fn max_dim(&self) -> f64 {
        self.size().max()
    }

    /// Check if this AABB contains a point
    pub fn contains_point(&self, point: &Vec3) -> bool {
        point.x >= self.min.x && point.x <= self.max.x &&
        point.y >= self.min.y && point.y <= self.max.y &&
        point.z >= self.min.z && point.z <= self.max.z
    }

    /// Check if this AABB fully contains another AABB
    pub fn contains(&self, other: &Aabb) -> bool {
        !other.is_empty() && self.contains_point(&other.min) && self.contains_point(&other.max)
    }

    /// Check if this AABB intersects another AABB (touching counts)
    pub fn intersects(&self, other: &Aabb) -> bool {
        !self.is_empty() && !other.is_empty() &&
        self.min.x <= other.max.x && self.max.x >= other.min.x &&
        self.min.y <= other.max.y && self.max.y >= other.min.y &&
        self.min.z <= other.max.z && self.max.z >= other.min.z
    }

    /// This box shifted by `delta`
    pub fn translated(&self, delta: &Vec3) -> Aabb {
        if self.is_empty() {
            return *self;
        }
        Aabb::new(self.min + delta, self.max + delta)
    }

    /// This box grown by `amount` on every side
    pub fn expanded(&self, amount: f64) -> Aabb {
        if self.is_empty() {
            return *self;
        }
        let delta = Vec3::repeat(amount);
        Aabb::new(self.min - delta, self.max + delta)
    }

    /// The eight corners, bit `i` of the index selecting max on axis `i`
    pub fn corners(&self) -> [Vec3; 8] {
        std::array::from_fn(|i| {
            Vec3::new(
                if i & 1 != 0 { self.max.x } else { self.min.x },
                if i & 2 != 0 { self.max.y } else { self.min.y },
                if i & 4 != 0 { self.max.z } else { self.min.z },
            )
        })
    }

    /// Bounds of the eight corners after mapping them through `map`
    ///
    /// Conservative for any affine map.
    pub fn transformed<F>(&self, map: F) -> Aabb
    where
        F: Fn(&Vec3) -> Vec3,
    {
        if self.is_empty() {
            return *self;
        }
        Aabb::from_points(self.corners().iter().map(map))
    }

    /// Test ray intersection with this AABB using slab method
    /// Returns the distance to the entry point if the ray intersects, None otherwise
    /// Based on "An Efficient and Robust Ray–Box Intersection Algorithm"
    pub fn intersect_ray(&self, ray_origin: &Vec3, ray_dir: &Vec3) -> Option<f64> {
        if self.is_empty() {
            return None;
        }

        let inv_dir = ray_dir.map(|d| if d != 0.0 { 1.0 / d } else { f64::INFINITY });

        let mut tmin = f64::NEG_INFINITY;
        let mut tmax = f64::INFINITY;
        for axis in 0..3 {
            if ray_dir[axis] == 0.0 {
                // Parallel to the slab: inside or miss
                if ray_origin[axis] < self.min[axis] || ray_origin[axis] > self.max[axis] {
                    return None;
                }
                continue;
            }
            let t1 = (self.min[axis] - ray_origin[axis]) * inv_dir[axis];
            let t2 = (self.max[axis] - ray_origin[axis]) * inv_dir[axis];
            tmin = tmin.max(t1.min(t2));
            tmax = tmax.min(t1.max(t2));
        }

        // Ray intersects if tmax >= tmin and tmax >= 0
        if tmax >= tmin && tmax >= 0.0 {
            // Return entry point distance (or 0 if we're inside the box)
            Some(tmin.max(0.0))
        } else {
            None
        }
    }
}
