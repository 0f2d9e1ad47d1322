//! Affine coordinate transformations.
//!
//! A [`Transformation`] maps local coordinates into the scene's global frame
//! by applying scale, then rotation, then translation. Forward and inverse
//! matrices for both points and directions are computed once at construction
//! and cached, so per-particle queries are a single matrix multiply.
//!
//! Directions (flow vectors) transform without the translation component;
//! they use a separate 4x4 matrix that only carries rotation and scale.

use nalgebra::{Matrix3, Matrix4, Vector3, Vector4};

use crate::error::{Result, SimulationError};

/// Order in which the per-axis Euler rotations are combined.
///
/// `Xyz` matches the convention of the scene-authoring tooling that produces
/// the input files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RotationOrder {
    #[default]
    Xyz,
    Yxz,
    Xzy,
    Zxy,
    Zyx,
    Yzx,
}

/// Affine mapping between an object's local frame and the global frame.
#[derive(Debug, Clone)]
pub struct Transformation {
    translation: Vector3<f64>,
    rotation: Vector3<f64>,
    scaling: Vector3<f64>,
    rotation_order: RotationOrder,

    matrix: Matrix4<f64>,
    inverse_matrix: Matrix4<f64>,
    direction_matrix: Matrix4<f64>,
    inverse_direction_matrix: Matrix4<f64>,

    was_set_from_matrix: bool,
}

impl Default for Transformation {
    fn default() -> Self {
        Self::identity()
    }
}

impl Transformation {
    pub fn identity() -> Self {
        Self::new(Vector3::zeros(), Vector3::zeros(), Vector3::new(1.0, 1.0, 1.0))
    }

    /// Build from translation, Euler rotation (radians) and per-axis scale.
    /// Scaling is applied first, then rotation, then translation.
    pub fn new(
        translation: Vector3<f64>,
        rotation: Vector3<f64>,
        scaling: Vector3<f64>,
    ) -> Self {
        Self::with_rotation_order(translation, rotation, scaling, RotationOrder::default())
    }

    pub fn with_rotation_order(
        translation: Vector3<f64>,
        rotation: Vector3<f64>,
        scaling: Vector3<f64>,
        rotation_order: RotationOrder,
    ) -> Self {
        let matrix = translation_matrix(&translation)
            * rotation_matrix(&rotation, rotation_order)
            * scaling_matrix(&scaling);
        let direction_matrix =
            rotation_matrix(&rotation, rotation_order) * scaling_matrix(&scaling);
        Self {
            translation,
            rotation,
            scaling,
            rotation_order,
            matrix,
            // The factor matrices are invertible for any non-zero scale, so
            // the unchecked fallback to identity only triggers on degenerate
            // input the caller is expected to have validated.
            inverse_matrix: matrix.try_inverse().unwrap_or_else(Matrix4::identity),
            direction_matrix,
            inverse_direction_matrix: direction_matrix
                .try_inverse()
                .unwrap_or_else(Matrix4::identity),
            was_set_from_matrix: false,
        }
    }

    /// Build directly from a combined point matrix and direction matrix,
    /// e.g. when composing transformations. Translation and scale are
    /// recovered by decomposition; the Euler rotation vector is not.
    pub fn from_matrices(
        matrix: Matrix4<f64>,
        direction_matrix: Matrix4<f64>,
    ) -> Result<Self> {
        let inverse_matrix = matrix.try_inverse().ok_or_else(|| {
            SimulationError::Configuration("transformation matrix is singular".into())
        })?;
        let inverse_direction_matrix = direction_matrix.try_inverse().ok_or_else(|| {
            SimulationError::Configuration("direction matrix is singular".into())
        })?;
        let (translation, _, scaling) = decompose_matrix(&matrix);
        Ok(Self {
            translation,
            rotation: Vector3::zeros(),
            scaling,
            rotation_order: RotationOrder::default(),
            matrix,
            inverse_matrix,
            direction_matrix,
            inverse_direction_matrix,
            was_set_from_matrix: true,
        })
    }

    /// Compose with another transformation, as if `other` were applied to a
    /// point first and `self` afterwards.
    pub fn then_after(&self, other: &Transformation) -> Result<Transformation> {
        Transformation::from_matrices(
            self.matrix * other.matrix,
            self.direction_matrix * other.direction_matrix,
        )
    }

    pub fn apply_to_point(&self, point: &Vector3<f64>) -> Vector3<f64> {
        apply(&self.matrix, point)
    }

    pub fn apply_inverse_to_point(&self, point: &Vector3<f64>) -> Vector3<f64> {
        apply(&self.inverse_matrix, point)
    }

    pub fn apply_to_direction(&self, direction: &Vector3<f64>) -> Vector3<f64> {
        apply(&self.direction_matrix, direction)
    }

    pub fn apply_inverse_to_direction(&self, direction: &Vector3<f64>) -> Vector3<f64> {
        apply(&self.inverse_direction_matrix, direction)
    }

    pub fn apply_to_points(&self, points: &[Vector3<f64>]) -> Vec<Vector3<f64>> {
        points.iter().map(|p| self.apply_to_point(p)).collect()
    }

    pub fn translation(&self) -> &Vector3<f64> {
        &self.translation
    }

    /// The Euler rotation vector this transformation was built from.
    ///
    /// Unavailable when the transformation was constructed from a raw
    /// matrix, since a matrix does not determine a unique Euler vector.
    pub fn rotation(&self) -> Option<&Vector3<f64>> {
        if self.was_set_from_matrix {
            None
        } else {
            Some(&self.rotation)
        }
    }

    pub fn scaling(&self) -> &Vector3<f64> {
        &self.scaling
    }

    pub fn rotation_order(&self) -> RotationOrder {
        self.rotation_order
    }

    /// True when this transformation was constructed via
    /// [`Transformation::from_matrices`]; translation and scale were then
    /// recovered by decomposition rather than given directly.
    pub fn was_set_from_matrix(&self) -> bool {
        self.was_set_from_matrix
    }

    pub fn matrix(&self) -> &Matrix4<f64> {
        &self.matrix
    }

    pub fn direction_matrix(&self) -> &Matrix4<f64> {
        &self.direction_matrix
    }
}

fn apply(matrix: &Matrix4<f64>, vec: &Vector3<f64>) -> Vector3<f64> {
    let homogeneous = matrix * Vector4::new(vec.x, vec.y, vec.z, 1.0);
    Vector3::new(homogeneous.x, homogeneous.y, homogeneous.z)
}

fn translation_matrix(t: &Vector3<f64>) -> Matrix4<f64> {
    Matrix4::new_translation(t)
}

fn scaling_matrix(s: &Vector3<f64>) -> Matrix4<f64> {
    Matrix4::new_nonuniform_scaling(s)
}

fn rotation_matrix(euler: &Vector3<f64>, order: RotationOrder) -> Matrix4<f64> {
    let (sx, cx) = euler.x.sin_cos();
    let (sy, cy) = euler.y.sin_cos();
    let (sz, cz) = euler.z.sin_cos();
    let rx = Matrix3::new(1.0, 0.0, 0.0, 0.0, cx, -sx, 0.0, sx, cx).to_homogeneous();
    let ry = Matrix3::new(cy, 0.0, sy, 0.0, 1.0, 0.0, -sy, 0.0, cy).to_homogeneous();
    let rz = Matrix3::new(cz, -sz, 0.0, sz, cz, 0.0, 0.0, 0.0, 1.0).to_homogeneous();
    // The matrices multiply in reverse listing order so that the first-named
    // axis rotation is applied to the point first.
    match order {
        RotationOrder::Xyz => rz * ry * rx,
        RotationOrder::Yxz => rz * rx * ry,
        RotationOrder::Xzy => ry * rz * rx,
        RotationOrder::Zxy => ry * rx * rz,
        RotationOrder::Zyx => rx * ry * rz,
        RotationOrder::Yzx => rx * rz * ry,
    }
}

/// Recover translation and per-axis scale from a combined point matrix.
/// The rotation comes back as a matrix; there is no unique Euler vector.
fn decompose_matrix(matrix: &Matrix4<f64>) -> (Vector3<f64>, Matrix3<f64>, Vector3<f64>) {
    let translation = Vector3::new(matrix[(0, 3)], matrix[(1, 3)], matrix[(2, 3)]);
    let linear = matrix.fixed_view::<3, 3>(0, 0).into_owned();
    let scale = Vector3::new(
        linear.column(0).norm(),
        linear.column(1).norm(),
        linear.column(2).norm(),
    );
    let mut rotation = linear;
    for i in 0..3 {
        if scale[i] > 0.0 {
            let scaled = rotation.column(i) / scale[i];
            rotation.set_column(i, &scaled);
        }
    }
    (translation, rotation, scale)
}
