//! Sparse loose octree over axis-aligned boxes
//!
//! Root cells tile space on an unbounded integer grid and are only allocated
//! when an object lands in them. Each level halves the cell size down to
//! `max_depth`. Cells are loose: an object is stored in the deepest cell
//! (selected by its center) whose bounds, grown by `max_expand_factor` of the
//! cell size, still contain the whole object box.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::foundation::math::Vec3;
use super::Aabb;

/// Configuration for octree behavior
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OctreeConfig {
    /// Maximum subdivision depth (0 = root cells only)
    pub max_depth: u32,

    /// Root cell size as a fraction of the scene's largest dimension
    pub root_dimension_fraction: f64,

    /// How far a cell reaches past its bounds, as a fraction of its size
    pub max_expand_factor: f64,

    /// Lower bound on the root cell size
    pub min_root_dimension: f64,
}

impl Default for OctreeConfig {
    fn default() -> Self {
        Self {
            max_depth: 5,
            root_dimension_fraction: 0.25,
            max_expand_factor: 0.25,
            min_root_dimension: 1.0,
        }
    }
}

impl OctreeConfig {
    /// Root cell size for a scene with the given bounds
    pub fn root_dimension_for(&self, scene_bounds: &Aabb) -> f64 {
        let dimension = scene_bounds.max_dim() * self.root_dimension_fraction;
        if dimension.is_finite() {
            dimension.max(self.min_root_dimension)
        } else {
            self.min_root_dimension
        }
    }
}

/// Integer coordinate of a root cell
type CellCoord = [i64; 3];

/// Object stored in the octree
#[derive(Debug, Clone, Copy)]
struct OctreeObject {
    id: u32,
    bounds: Aabb,
}

/// Single cell in the octree hierarchy
#[derive(Debug, Clone)]
struct OctreeNode {
    /// Tight bounds of this cell
    bounds: Aabb,

    /// Bounds of this cell grown by the loose margin
    loose_bounds: Aabb,

    /// Indices into the octree's object list
    objects: Vec<usize>,

    /// Child cells, allocated on first use
    children: [Option<Box<OctreeNode>>; 8],

    /// Depth in the tree (0 = root)
    depth: u32,
}

impl OctreeNode {
    fn new(bounds: Aabb, depth: u32, expand_factor: f64) -> Self {
        let margin = bounds.max_dim() * expand_factor;
        Self {
            bounds,
            loose_bounds: bounds.expanded(margin),
            objects: Vec::new(),
            children: Default::default(),
            depth,
        }
    }

    /// Get the octant index (0-7) for a position within this cell
    ///
    /// Bit 0 selects +X, bit 1 selects +Y, bit 2 selects +Z.
    fn octant_index(&self, position: &Vec3) -> usize {
        let center = self.bounds.center();
        let x_bit = usize::from(position.x >= center.x);
        let y_bit = usize::from(position.y >= center.y);
        let z_bit = usize::from(position.z >= center.z);
        (z_bit << 2) | (y_bit << 1) | x_bit
    }

    /// Tight bounds of child `octant`
    fn octant_bounds(&self, octant: usize) -> Aabb {
        let center = self.bounds.center();
        let min = Vec3::new(
            if octant & 1 != 0 { center.x } else { self.bounds.min.x },
            if octant & 2 != 0 { center.y } else { self.bounds.min.y },
            if octant & 4 != 0 { center.z } else { self.bounds.min.z },
        );
        let max = Vec3::new(
            if octant & 1 != 0 { self.bounds.max.x } else { center.x },
            if octant & 2 != 0 { self.bounds.max.y } else { center.y },
            if octant & 4 != 0 { self.bounds.max.z } else { center.z },
        );
        Aabb::new(min, max)
    }

    fn insert(&mut self, object: usize, bounds: &Aabb, config: &OctreeConfig) {
        if self.depth < config.max_depth {
            let octant = self.octant_index(&bounds.center());
            let child_bounds = self.octant_bounds(octant);
            let margin = child_bounds.max_dim() * config.max_expand_factor;

            if child_bounds.expanded(margin).contains(bounds) {
                let depth = self.depth + 1;
                let child = self.children[octant].get_or_insert_with(|| {
                    Box::new(OctreeNode::new(child_bounds, depth, config.max_expand_factor))
                });
                child.insert(object, bounds, config);
                return;
            }
        }

        self.objects.push(object);
    }

    fn range_query(&self, query: &Aabb, objects: &[OctreeObject], results: &mut Vec<u32>) {
        if !self.loose_bounds.intersects(query) {
            return;
        }

        results.extend(
            self.objects
                .iter()
                .map(|&index| &objects[index])
                .filter(|object| object.bounds.intersects(query))
                .map(|object| object.id),
        );

        for child in self.children.iter().flatten() {
            child.range_query(query, objects, results);
        }
    }

    fn max_depth(&self) -> u32 {
        self.children
            .iter()
            .flatten()
            .map(|child| child.max_depth())
            .fold(self.depth, u32::max)
    }
}

/// Sparse, depth-bounded loose octree over integer object ids
#[derive(Debug, Clone)]
pub struct SparseOctree {
    config: OctreeConfig,
    root_dimension: f64,
    roots: HashMap<CellCoord, OctreeNode>,
    /// Objects too large for any root cell
    spill: Vec<usize>,
    objects: Vec<OctreeObject>,
}

impl Default for SparseOctree {
    fn default() -> Self {
        let config = OctreeConfig::default();
        let root_dimension = config.min_root_dimension;
        Self::new(root_dimension, config)
    }
}

impl SparseOctree {
    /// Create an empty octree with the given root cell size
    pub fn new(root_dimension: f64, config: OctreeConfig) -> Self {
        let root_dimension = if root_dimension.is_finite() && root_dimension > 0.0 {
            root_dimension
        } else {
            config.min_root_dimension.max(f64::MIN_POSITIVE)
        };

        Self {
            config,
            root_dimension,
            roots: HashMap::new(),
            spill: Vec::new(),
            objects: Vec::new(),
        }
    }

    /// Create an empty octree sized for a scene with the given bounds
    pub fn for_scene_bounds(scene_bounds: &Aabb, config: OctreeConfig) -> Self {
        let root_dimension = config.root_dimension_for(scene_bounds);
        Self::new(root_dimension, config)
    }

    /// Size of a root cell
    pub fn root_dimension(&self) -> f64 {
        self.root_dimension
    }

    /// Number of stored objects
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// True if nothing has been inserted
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Number of allocated root cells
    pub fn root_cell_count(&self) -> usize {
        self.roots.len()
    }

    /// Number of objects that did not fit any root cell
    pub fn spilled_count(&self) -> usize {
        self.spill.len()
    }

    /// Deepest allocated cell depth, `None` when no cell exists
    pub fn deepest_cell(&self) -> Option<u32> {
        self.roots.values().map(OctreeNode::max_depth).max()
    }

    fn root_coord(&self, point: &Vec3) -> CellCoord {
        let cell = |value: f64| (value / self.root_dimension).floor() as i64;
        [cell(point.x), cell(point.y), cell(point.z)]
    }

    fn root_bounds(&self, coord: &CellCoord) -> Aabb {
        let min = Vec3::new(coord[0] as f64, coord[1] as f64, coord[2] as f64) * self.root_dimension;
        Aabb::new(min, min + Vec3::repeat(self.root_dimension))
    }

    /// Insert an object, returns false (and stores nothing) for an empty box
    pub fn insert(&mut self, id: u32, bounds: Aabb) -> bool {
        if bounds.is_empty() {
            return false;
        }

        let index = self.objects.len();
        self.objects.push(OctreeObject { id, bounds });

        let coord = self.root_coord(&bounds.center());
        let cell_bounds = self.root_bounds(&coord);
        let margin = self.root_dimension * self.config.max_expand_factor;
        if !cell_bounds.expanded(margin).contains(&bounds) {
            self.spill.push(index);
            return true;
        }

        let expand_factor = self.config.max_expand_factor;
        let root = self
            .roots
            .entry(coord)
            .or_insert_with(|| OctreeNode::new(cell_bounds, 0, expand_factor));
        root.insert(index, &bounds, &self.config);
        true
    }

    /// Ids of every object whose box intersects `query` (touching counts)
    ///
    /// Sorted ascending, without duplicates.
    pub fn range_query(&self, query: &Aabb) -> Vec<u32> {
        let mut results = Vec::new();
        if query.is_empty() {
            return results;
        }

        for root in self.roots.values() {
            root.range_query(query, &self.objects, &mut results);
        }

        results.extend(
            self.spill
                .iter()
                .map(|&index| &self.objects[index])
                .filter(|object| object.bounds.intersects(query))
                .map(|object| object.id),
        );

        results.sort_unstable();
        results.dedup();
        results
    }

    /// Remove every object and cell, keeping the root size
    pub fn clear(&mut self) {
        self.roots.clear();
        self.spill.clear();
        self.objects.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cube(center: Vec3, half: f64) -> Aabb {
        Aabb::from_center_extents(center, Vec3::repeat(half))
    }

    /// Small deterministic generator so the brute-force comparison is reproducible
    struct Lcg(u64);

    impl Lcg {
        fn next_f64(&mut self) -> f64 {
            self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            (self.0 >> 11) as f64 / (1u64 << 53) as f64
        }

        fn range(&mut self, min: f64, max: f64) -> f64 {
            min + (max - min) * self.next_f64()
        }
    }

    #[test]
    fn test_octree_basic_insertion() {
        let mut octree = SparseOctree::new(10.0, OctreeConfig::default());
        assert!(octree.insert(7, cube(Vec3::new(1.0, 2.0, 3.0), 0.5)));
        assert_eq!(octree.object_count(), 1);
        assert_eq!(octree.root_cell_count(), 1);
        assert_eq!(octree.range_query(&cube(Vec3::new(1.0, 2.0, 3.0), 0.1)), vec![7]);
    }

    #[test]
    fn test_empty_box_not_inserted() {
        let mut octree = SparseOctree::default();
        assert!(!octree.insert(1, Aabb::empty()));
        assert!(octree.is_empty());
        assert!(octree.range_query(&cube(Vec3::zeros(), 1000.0)).is_empty());
    }

    #[test]
    fn test_small_objects_descend_to_max_depth() {
        let config = OctreeConfig { max_depth: 3, ..Default::default() };
        let mut octree = SparseOctree::new(64.0, config);
        octree.insert(0, cube(Vec3::new(5.0, 5.0, 5.0), 0.01));
        assert_eq!(octree.deepest_cell(), Some(3));
    }

    #[test]
    fn test_oversized_object_spills() {
        let mut octree = SparseOctree::new(1.0, OctreeConfig::default());
        octree.insert(3, cube(Vec3::zeros(), 50.0));
        assert_eq!(octree.spilled_count(), 1);
        assert_eq!(octree.range_query(&cube(Vec3::new(40.0, 0.0, 0.0), 1.0)), vec![3]);
    }

    #[test]
    fn test_query_checks_stored_boxes() {
        let mut octree = SparseOctree::new(100.0, OctreeConfig::default());
        octree.insert(0, cube(Vec3::new(10.0, 10.0, 10.0), 1.0));
        octree.insert(1, cube(Vec3::new(12.5, 10.0, 10.0), 1.0));

        // Same cell neighborhood, but only object 0 overlaps
        assert_eq!(octree.range_query(&cube(Vec3::new(9.0, 10.0, 10.0), 0.5)), vec![0]);
        // Touching boxes count
        assert_eq!(octree.range_query(&cube(Vec3::new(11.25, 10.0, 10.0), 0.25)), vec![0, 1]);
    }

    #[test]
    fn test_negative_coordinates() {
        let mut octree = SparseOctree::new(4.0, OctreeConfig::default());
        octree.insert(9, cube(Vec3::new(-3.0, -7.5, -0.1), 0.2));
        assert_eq!(octree.range_query(&cube(Vec3::new(-3.0, -7.5, -0.1), 0.05)), vec![9]);
        assert!(octree.range_query(&cube(Vec3::new(3.0, 7.5, 0.1), 0.05)).is_empty());
    }

    #[test]
    fn test_range_query_matches_brute_force() {
        let mut rng = Lcg(0x5eed);
        let mut boxes = Vec::new();
        for _ in 0..400 {
            let center = Vec3::new(rng.range(-200.0, 200.0), rng.range(-200.0, 200.0), rng.range(-20.0, 20.0));
            let half = Vec3::new(rng.range(0.1, 15.0), rng.range(0.1, 15.0), rng.range(0.1, 40.0));
            boxes.push(Aabb::from_center_extents(center, half));
        }

        let scene = boxes.iter().fold(Aabb::empty(), |acc, b| acc.union(b));
        let mut octree = SparseOctree::for_scene_bounds(&scene, OctreeConfig::default());
        for (id, bounds) in boxes.iter().enumerate() {
            assert!(octree.insert(id as u32, *bounds));
        }

        for _ in 0..100 {
            let center = Vec3::new(rng.range(-220.0, 220.0), rng.range(-220.0, 220.0), rng.range(-30.0, 30.0));
            let query = cube(center, rng.range(0.5, 30.0));
            let expected: Vec<u32> = boxes
                .iter()
                .enumerate()
                .filter(|(_, b)| b.intersects(&query))
                .map(|(id, _)| id as u32)
                .collect();
            assert_eq!(octree.range_query(&query), expected);
        }
    }

    #[test]
    fn test_clear() {
        let mut octree = SparseOctree::new(2.0, OctreeConfig::default());
        octree.insert(0, cube(Vec3::zeros(), 0.5));
        octree.clear();
        assert!(octree.is_empty());
        assert_eq!(octree.root_cell_count(), 0);
        assert!(octree.range_query(&cube(Vec3::zeros(), 1.0)).is_empty());
    }

    #[test]
    fn test_root_dimension_from_scene() {
        let config = OctreeConfig::default();
        let scene = Aabb::new(Vec3::zeros(), Vec3::new(400.0, 20.0, 10.0));
        assert_eq!(config.root_dimension_for(&scene), 100.0);
        assert_eq!(config.root_dimension_for(&Aabb::empty()), 1.0);
    }
}
