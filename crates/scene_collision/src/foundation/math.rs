//! Math utilities and types
//!
//! Provides the double-precision math types used for scene placement and
//! collision. Editor scenes span large coordinate ranges, so everything here
//! is `f64`.

pub use nalgebra::{Matrix3, Matrix4, Quaternion, Unit, Vector3};

/// 3D vector type
pub type Vec3 = Vector3<f64>;

/// 4x4 matrix type
pub type Mat4 = Matrix4<f64>;

/// 3D point type
pub type Point3 = nalgebra::Point3<f64>;

/// Quaternion type for rotations
pub type Quat = Unit<Quaternion<f64>>;

/// Scale components smaller than this are treated as zero when inverting.
const SCALE_EPSILON: f64 = 1.0e-12;

/// Reciprocal of a scale vector, mapping near-zero components to zero
fn safe_scale_reciprocal(scale: &Vec3) -> Vec3 {
    scale.map(|s| if s.abs() <= SCALE_EPSILON { 0.0 } else { 1.0 / s })
}

/// Transform representing translation, rotation, and non-uniform scale
///
/// Points are mapped as `translation + rotation * (scale * p)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    /// Translation in 3D space
    pub translation: Vec3,

    /// Rotation quaternion
    pub rotation: Quat,

    /// Scale factors
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            translation: Vec3::zeros(),
            rotation: Quat::identity(),
            scale: Vec3::new(1.0, 1.0, 1.0),
        }
    }
}

impl Transform {
    /// Create a new identity transform
    pub fn identity() -> Self {
        Self::default()
    }

    /// Create a transform with only a translation
    pub fn from_translation(translation: Vec3) -> Self {
        Self {
            translation,
            ..Default::default()
        }
    }

    /// Create a transform with translation and rotation
    pub fn from_translation_rotation(translation: Vec3, rotation: Quat) -> Self {
        Self {
            translation,
            rotation,
            ..Default::default()
        }
    }

    /// Create a transform from all three components
    pub fn new(translation: Vec3, rotation: Quat, scale: Vec3) -> Self {
        Self {
            translation,
            rotation,
            scale,
        }
    }

    /// Convert to a transformation matrix
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::new_translation(&self.translation)
            * self.rotation.to_homogeneous()
            * Mat4::new_nonuniform_scaling(&self.scale)
    }

    /// Apply this transform to a point
    pub fn transform_point(&self, point: &Vec3) -> Vec3 {
        self.translation + self.rotation * self.scale.component_mul(point)
    }

    /// Map a point from the output space of this transform back to its input space
    pub fn inverse_transform_point(&self, point: &Vec3) -> Vec3 {
        let unrotated = self.rotation.inverse_transform_vector(&(point - self.translation));
        unrotated.component_mul(&safe_scale_reciprocal(&self.scale))
    }

    /// Map a vector from the output space of this transform back to its input space
    pub fn inverse_transform_vector(&self, vector: &Vec3) -> Vec3 {
        let unrotated = self.rotation.inverse_transform_vector(vector);
        unrotated.component_mul(&safe_scale_reciprocal(&self.scale))
    }
}

/// Ordered chain of transforms, applied first to last
///
/// Instance placements are a component transform optionally preceded by a
/// per-instance transform; keeping the chain instead of collapsing it keeps
/// non-uniform scale under rotation exact in both directions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransformSequence {
    transforms: Vec<Transform>,
}

impl TransformSequence {
    /// Create an empty (identity) sequence
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a sequence holding a single transform
    pub fn from_transform(transform: Transform) -> Self {
        Self {
            transforms: vec![transform],
        }
    }

    /// Append a transform, applied after all existing ones
    pub fn append(&mut self, transform: Transform) {
        self.transforms.push(transform);
    }

    /// Return a copy of this sequence with `transform` appended
    pub fn appended(&self, transform: Transform) -> Self {
        let mut sequence = self.clone();
        sequence.append(transform);
        sequence
    }

    /// Number of transforms in the chain
    pub fn len(&self) -> usize {
        self.transforms.len()
    }

    /// True if the sequence is the identity
    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }

    /// Map a point through every transform in order
    pub fn transform_position(&self, point: &Vec3) -> Vec3 {
        self.transforms
            .iter()
            .fold(*point, |p, transform| transform.transform_point(&p))
    }

    /// Map a point back through the inverse of every transform, last to first
    pub fn inverse_transform_position(&self, point: &Vec3) -> Vec3 {
        self.transforms
            .iter()
            .rev()
            .fold(*point, |p, transform| transform.inverse_transform_point(&p))
    }

    /// Map a vector back through the inverse of every transform, last to first
    pub fn inverse_transform_vector(&self, vector: &Vec3) -> Vec3 {
        self.transforms
            .iter()
            .rev()
            .fold(*vector, |v, transform| transform.inverse_transform_vector(&v))
    }
}
