//! Bounding volume hierarchy over the triangles of a packed mesh
//!
//! Built once with binned SAH splits (median split when binning cannot
//! separate the triangles) and read-only afterwards, so a tree can be shared
//! by any number of concurrent queries.

use crate::foundation::math::Vec3;
use crate::physics::collision::mesh::PackedMesh;
use crate::physics::collision::primitives::{Ray, Triangle};
use super::Aabb;

/// Maximum triangles per leaf node before splitting
const MAX_LEAF_SIZE: usize = 4;

/// Number of SAH buckets for binned building
const SAH_BUCKETS: usize = 12;

/// Tree node, children and leaf ranges index into the tree's flat arrays
#[derive(Debug, Clone, Copy)]
enum AabbTreeNode {
    Leaf {
        bounds: Aabb,
        first: u32,
        count: u32,
    },
    Internal {
        bounds: Aabb,
        left: u32,
        right: u32,
    },
}

impl AabbTreeNode {
    fn bounds(&self) -> &Aabb {
        match self {
            Self::Leaf { bounds, .. } | Self::Internal { bounds, .. } => bounds,
        }
    }
}

/// Nearest triangle hit found by [`AabbTree::find_nearest_hit`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TreeRayHit {
    /// Distance along the ray in the ray's own units
    pub distance: f64,
    /// Triangle index in the packed mesh
    pub triangle: u32,
    /// Barycentric coordinates of the hit for (v0, v1, v2)
    pub barycentric: Vec3,
}

/// Per-triangle data used only while building
struct BuildPrimitive {
    bounds: Aabb,
    centroid: Vec3,
}

/// AABB tree over a [`PackedMesh`]
#[derive(Debug, Clone, Default)]
pub struct AabbTree {
    nodes: Vec<AabbTreeNode>,
    triangle_order: Vec<u32>,
}

impl AabbTree {
    /// Build a tree over every triangle of `mesh`
    pub fn build(mesh: &PackedMesh) -> Self {
        let primitives: Vec<BuildPrimitive> = (0..mesh.triangle_count())
            .map(|index| {
                let triangle = mesh.triangle(index);
                BuildPrimitive {
                    bounds: triangle.bounds(),
                    centroid: triangle.centroid(),
                }
            })
            .collect();

        let mut tree = Self {
            nodes: Vec::with_capacity(primitives.len().max(1) * 2 / MAX_LEAF_SIZE + 1),
            triangle_order: (0..primitives.len() as u32).collect(),
        };

        if !primitives.is_empty() {
            let count = tree.triangle_order.len();
            tree.build_recursive(&primitives, 0, count);
        }
        tree
    }

    /// True if the tree indexes no triangles
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of nodes
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Bounds of the root node, empty for an empty tree
    pub fn bounds(&self) -> Aabb {
        self.nodes.first().map_or_else(Aabb::empty, |node| *node.bounds())
    }

    /// Builds the subtree over `triangle_order[start..end]`, returns its node index
    fn build_recursive(&mut self, primitives: &[BuildPrimitive], start: usize, end: usize) -> u32 {
        let bounds = self.triangle_order[start..end]
            .iter()
            .fold(Aabb::empty(), |acc, &index| acc.union(&primitives[index as usize].bounds));

        let node_index = self.nodes.len() as u32;
        let count = end - start;
        if count <= MAX_LEAF_SIZE {
            self.nodes.push(AabbTreeNode::Leaf {
                bounds,
                first: start as u32,
                count: count as u32,
            });
            return node_index;
        }

        let centroid_bounds = Aabb::from_points(
            self.triangle_order[start..end]
                .iter()
                .map(|&index| primitives[index as usize].centroid),
        );

        let mid = match Self::find_best_split(primitives, &self.triangle_order[start..end], &centroid_bounds) {
            Some((axis, position)) => {
                let slice = &mut self.triangle_order[start..end];
                start + partition(slice, |&index| primitives[index as usize].centroid[axis] < position)
            }
            None => start,
        };

        // Binning could not separate the centroids, split at the median instead
        let mid = if mid == start || mid == end {
            let axis = centroid_bounds.size().imax();
            let half = count / 2;
            self.triangle_order[start..end].select_nth_unstable_by(half, |&a, &b| {
                primitives[a as usize].centroid[axis].total_cmp(&primitives[b as usize].centroid[axis])
            });
            start + half
        } else {
            mid
        };

        // Reserve this node's slot, children are pushed after it
        self.nodes.push(AabbTreeNode::Leaf {
            bounds,
            first: 0,
            count: 0,
        });
        let left = self.build_recursive(primitives, start, mid);
        let right = self.build_recursive(primitives, mid, end);
        self.nodes[node_index as usize] = AabbTreeNode::Internal { bounds, left, right };
        node_index
    }

    /// Find best (axis, split position) using binned SAH over centroids
    fn find_best_split(
        primitives: &[BuildPrimitive],
        indices: &[u32],
        centroid_bounds: &Aabb,
    ) -> Option<(usize, f64)> {
        let mut best: Option<(f64, usize, f64)> = None;

        for axis in 0..3 {
            let axis_min = centroid_bounds.min[axis];
            let axis_extent = centroid_bounds.max[axis] - axis_min;
            if axis_extent <= f64::EPSILON * axis_min.abs().max(1.0) {
                continue;
            }

            let mut bucket_bounds = [Aabb::empty(); SAH_BUCKETS];
            let mut bucket_counts = [0usize; SAH_BUCKETS];
            for &index in indices {
                let primitive = &primitives[index as usize];
                let offset = (primitive.centroid[axis] - axis_min) / axis_extent;
                let bucket = ((offset * SAH_BUCKETS as f64) as usize).min(SAH_BUCKETS - 1);
                bucket_counts[bucket] += 1;
                bucket_bounds[bucket].contain(&primitive.bounds);
            }

            for split in 1..SAH_BUCKETS {
                let (left_bounds, left_count) = accumulate(&bucket_bounds[..split], &bucket_counts[..split]);
                let (right_bounds, right_count) = accumulate(&bucket_bounds[split..], &bucket_counts[split..]);
                if left_count == 0 || right_count == 0 {
                    continue;
                }

                let cost = surface_area(&left_bounds) * left_count as f64
                    + surface_area(&right_bounds) * right_count as f64;
                if best.map_or(true, |(best_cost, _, _)| cost < best_cost) {
                    let position = axis_min + axis_extent * split as f64 / SAH_BUCKETS as f64;
                    best = Some((cost, axis, position));
                }
            }
        }

        best.map(|(_, axis, position)| (axis, position))
    }

    /// Nearest triangle hit along `ray`, in the space the mesh is stored in
    pub fn find_nearest_hit(&self, mesh: &PackedMesh, ray: &Ray) -> Option<TreeRayHit> {
        if self.nodes.is_empty() {
            return None;
        }

        let mut nearest: Option<TreeRayHit> = None;
        let mut stack = vec![0u32];

        while let Some(node_index) = stack.pop() {
            let node = &self.nodes[node_index as usize];
            let Some(entry) = node.bounds().intersect_ray(&ray.origin, &ray.direction) else {
                continue;
            };
            if nearest.is_some_and(|hit| entry > hit.distance) {
                continue;
            }

            match *node {
                AabbTreeNode::Leaf { first, count, .. } => {
                    for &triangle in &self.triangle_order[first as usize..(first + count) as usize] {
                        let Some((t, u, v)) = mesh.triangle(triangle as usize).intersect_ray(ray) else {
                            continue;
                        };
                        if nearest.map_or(true, |hit| t < hit.distance) {
                            nearest = Some(TreeRayHit {
                                distance: t,
                                triangle,
                                barycentric: Vec3::new(1.0 - u - v, u, v),
                            });
                        }
                    }
                }
                AabbTreeNode::Internal { left, right, .. } => {
                    stack.push(right);
                    stack.push(left);
                }
            }
        }

        nearest
    }

    /// Test whether any triangle of this tree intersects any triangle of `other`
    ///
    /// `other_to_self` maps points from the other mesh's space into this
    /// mesh's space; it must be affine for the node bounds test to be
    /// conservative.
    pub fn test_intersection<F>(
        &self,
        mesh: &PackedMesh,
        other: &AabbTree,
        other_mesh: &PackedMesh,
        other_to_self: F,
    ) -> bool
    where
        F: Fn(&Vec3) -> Vec3,
    {
        if self.nodes.is_empty() || other.nodes.is_empty() {
            return false;
        }

        let mut stack = vec![(0u32, 0u32)];
        while let Some((self_index, other_index)) = stack.pop() {
            let self_node = &self.nodes[self_index as usize];
            let other_node = &other.nodes[other_index as usize];
            let other_bounds = other_node.bounds().transformed(&other_to_self);
            if !self_node.bounds().intersects(&other_bounds) {
                continue;
            }

            match (*self_node, *other_node) {
                (
                    AabbTreeNode::Leaf { first, count, .. },
                    AabbTreeNode::Leaf { first: other_first, count: other_count, .. },
                ) => {
                    let self_triangles = &self.triangle_order[first as usize..(first + count) as usize];
                    let other_triangles =
                        &other.triangle_order[other_first as usize..(other_first + other_count) as usize];

                    for &other_triangle in other_triangles {
                        let mapped: Triangle = other_mesh.triangle(other_triangle as usize).mapped(&other_to_self);
                        let mapped_bounds = mapped.bounds();
                        if !self_node.bounds().intersects(&mapped_bounds) {
                            continue;
                        }
                        for &self_triangle in self_triangles {
                            let triangle = mesh.triangle(self_triangle as usize);
                            if triangle.bounds().intersects(&mapped_bounds) && triangle.intersects_triangle(&mapped) {
                                return true;
                            }
                        }
                    }
                }
                (AabbTreeNode::Leaf { .. }, AabbTreeNode::Internal { left, right, .. }) => {
                    stack.push((self_index, left));
                    stack.push((self_index, right));
                }
                (AabbTreeNode::Internal { left, right, .. }, AabbTreeNode::Leaf { .. }) => {
                    stack.push((left, other_index));
                    stack.push((right, other_index));
                }
                (
                    AabbTreeNode::Internal { bounds, left, right },
                    AabbTreeNode::Internal { left: other_left, right: other_right, .. },
                ) => {
                    // Descend the larger of the two boxes
                    if surface_area(&bounds) >= surface_area(&other_bounds) {
                        stack.push((left, other_index));
                        stack.push((right, other_index));
                    } else {
                        stack.push((self_index, other_left));
                        stack.push((self_index, other_right));
                    }
                }
            }
        }

        false
    }
}

fn surface_area(bounds: &Aabb) -> f64 {
    let size = bounds.size();
    2.0 * (size.x * size.y + size.y * size.z + size.z * size.x)
}

fn accumulate(bounds: &[Aabb], counts: &[usize]) -> (Aabb, usize) {
    bounds
        .iter()
        .zip(counts)
        .fold((Aabb::empty(), 0), |(acc, total), (b, &count)| (acc.union(b), total + count))
}

/// Reorders `slice` so every element matching `predicate` comes first,
/// returns the number of matching elements
fn partition<T, P>(slice: &mut [T], predicate: P) -> usize
where
    P: Fn(&T) -> bool,
{
    let mut split = 0;
    for index in 0..slice.len() {
        if predicate(&slice[index]) {
            slice.swap(split, index);
            split += 1;
        }
    }
    split
}
