//! Linear algebra core: [`Vector3`] and [`Matrix4`].
//!
//! All space transformations in the engine go through these two types. Vectors
//! are plain `glam` values; matrices are wrapped so that inversion is fallible
//! and construction helpers carry the engine's conventions.
//!
//! # Conventions
//!
//! - Column vectors. `a * b` applied to `v` is `a * (b * v)`, so
//!   [`Matrix4::multiply_matrices`] composes right-to-left: the rightmost
//!   matrix is applied to a vector first.
//! - Right-handed camera space looking down −Z.
//! - Clip-space depth in `[0, 1]` (the wgpu convention). A backend with a
//!   `[-1, 1]` depth range needs the Z rows of [`Matrix4::perspective`] and
//!   [`Matrix4::orthographic`] adjusted, and the shadow bias matrix with them.
//!
//! # Example
//!
//! ```
//! use umbra::math::{Matrix4, Vector3};
//!
//! let model = Matrix4::multiply_matrices(&[
//!     Matrix4::translation(Vector3::new(0.0, 1.0, 0.0)),
//!     Matrix4::rotation_y(0.5),
//!     Matrix4::scaling(Vector3::splat(2.0)),
//! ]);
//! let back = model.inverse().unwrap().inverse().unwrap();
//! assert!(back.abs_diff_eq(&model, 1e-5));
//! ```

use std::ops::Mul;

use glam::{Mat4, Vec3, Vec4};

use crate::error::MathError;

pub use glam::Vec3 as Vector3;

/// Eye/target distance under which [`Matrix4::look_at`] returns identity.
pub const LOOK_AT_EPSILON: f32 = 1e-4;

/// A 4×4 transformation matrix.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Matrix4(Mat4);

impl Default for Matrix4 {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Matrix4 {
    pub const IDENTITY: Self = Self(Mat4::IDENTITY);
    pub const ZERO: Self = Self(Mat4::ZERO);

    pub fn identity() -> Self {
        Self::IDENTITY
    }

    pub fn from_mat4(m: Mat4) -> Self {
        Self(m)
    }

    /// Builds a matrix from 16 column-major components.
    pub fn from_cols_array(cols: &[f32; 16]) -> Self {
        Self(Mat4::from_cols_array(cols))
    }

    pub fn to_cols_array(&self) -> [f32; 16] {
        self.0.to_cols_array()
    }

    pub fn to_cols_array_2d(&self) -> [[f32; 4]; 4] {
        self.0.to_cols_array_2d()
    }

    pub fn as_mat4(&self) -> Mat4 {
        self.0
    }

    pub fn translation(offset: Vector3) -> Self {
        Self(Mat4::from_translation(offset))
    }

    pub fn rotation_x(radians: f32) -> Self {
        Self(Mat4::from_rotation_x(radians))
    }

    pub fn rotation_y(radians: f32) -> Self {
        Self(Mat4::from_rotation_y(radians))
    }

    pub fn rotation_z(radians: f32) -> Self {
        Self(Mat4::from_rotation_z(radians))
    }

    pub fn scaling(scale: Vector3) -> Self {
        Self(Mat4::from_scale(scale))
    }

    /// Composes matrices right-to-left.
    ///
    /// `multiply_matrices(&[a, b, c])` equals `a * b * c`: applied to a vector,
    /// `c` acts first. An empty slice yields identity.
    pub fn multiply_matrices(matrices: &[Matrix4]) -> Self {
        matrices
            .iter()
            .fold(Self::IDENTITY, |acc, m| Self(acc.0 * m.0))
    }

    pub fn transpose(&self) -> Self {
        Self(self.0.transpose())
    }

    pub fn determinant(&self) -> f32 {
        self.0.determinant()
    }

    /// Inverts the matrix.
    ///
    /// Fails only when the determinant is exactly zero. Near-singular
    /// matrices are inverted as-is.
    pub fn inverse(&self) -> Result<Self, MathError> {
        if self.0.determinant() == 0.0 {
            return Err(MathError::SingularMatrix);
        }
        Ok(Self(self.0.inverse()))
    }

    /// Camera-to-world matrix for an eye at `eye` looking at `target`.
    ///
    /// The camera looks down its local −Z. The inverse of this matrix is the
    /// usual view matrix. When `eye` and `target` coincide (within
    /// [`LOOK_AT_EPSILON`]) the result is identity; when `up` is parallel to
    /// the viewing direction a substitute up axis is used.
    pub fn look_at(eye: Vector3, target: Vector3, up: Vector3) -> Self {
        let to_target = target - eye;
        if to_target.length() < LOOK_AT_EPSILON {
            return Self::IDENTITY;
        }
        let forward = to_target.normalize();

        let mut right = forward.cross(up);
        if right.length_squared() < LOOK_AT_EPSILON * LOOK_AT_EPSILON {
            let fallback = if forward.y.abs() > 0.999 {
                Vec3::Z
            } else {
                Vec3::Y
            };
            right = forward.cross(fallback);
        }
        let right = right.normalize();
        let true_up = right.cross(forward);

        Self(Mat4::from_cols(
            right.extend(0.0),
            true_up.extend(0.0),
            (-forward).extend(0.0),
            eye.extend(1.0),
        ))
    }

    /// Right-handed perspective projection with depth mapped to `[0, 1]`.
    pub fn perspective(fov_y_radians: f32, aspect: f32, near: f32, far: f32) -> Self {
        Self(Mat4::perspective_rh(fov_y_radians, aspect, near, far))
    }

    /// Right-handed orthographic projection with depth mapped to `[0, 1]`.
    pub fn orthographic(left: f32, right: f32, bottom: f32, top: f32, near: f32, far: f32) -> Self {
        Self(Mat4::orthographic_rh(left, right, bottom, top, near, far))
    }

    /// Transforms a point, dividing by the resulting `w`.
    pub fn transform_point(&self, point: Vector3) -> Vector3 {
        self.0.project_point3(point)
    }

    /// Transforms a point into homogeneous coordinates without dividing.
    pub fn transform_point4(&self, point: Vector3) -> Vec4 {
        self.0 * point.extend(1.0)
    }

    /// Transforms a direction (ignores translation).
    pub fn transform_vector(&self, vector: Vector3) -> Vector3 {
        self.0.transform_vector3(vector)
    }

    /// Translation column.
    pub fn position(&self) -> Vector3 {
        self.0.w_axis.truncate()
    }

    /// Component-wise comparison within `epsilon`.
    pub fn abs_diff_eq(&self, other: &Matrix4, epsilon: f32) -> bool {
        self.0.abs_diff_eq(other.0, epsilon)
    }
}

impl Mul for Matrix4 {
    type Output = Matrix4;

    fn mul(self, rhs: Matrix4) -> Matrix4 {
        Matrix4(self.0 * rhs.0)
    }
}

impl Mul<Vec4> for Matrix4 {
    type Output = Vec4;

    fn mul(self, rhs: Vec4) -> Vec4 {
        self.0 * rhs
    }
}

impl From<Mat4> for Matrix4 {
    fn from(m: Mat4) -> Self {
        Self(m)
    }
}

impl From<Matrix4> for Mat4 {
    fn from(m: Matrix4) -> Self {
        m.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn samples() -> Vec<Matrix4> {
        vec![
            Matrix4::identity(),
            Matrix4::translation(Vector3::new(1.0, -2.0, 3.5)),
            Matrix4::multiply_matrices(&[
                Matrix4::translation(Vector3::new(0.5, 2.0, -1.0)),
                Matrix4::rotation_z(0.3),
                Matrix4::rotation_x(-1.1),
                Matrix4::rotation_y(2.0),
                Matrix4::scaling(Vector3::new(2.0, 0.5, 3.0)),
            ]),
            Matrix4::perspective(1.0, 1.5, 0.1, 50.0),
            Matrix4::orthographic(-4.0, 4.0, -4.0, 4.0, 0.1, 20.0),
            Matrix4::look_at(Vector3::new(4.0, 4.0, 4.0), Vector3::ZERO, Vector3::Y),
        ]
    }

    #[test]
    fn inverse_of_inverse_is_original() {
        for m in samples() {
            let back = m.inverse().unwrap().inverse().unwrap();
            assert!(back.abs_diff_eq(&m, 1e-5), "{m:?} != {back:?}");
        }
    }

    #[test]
    fn identity_is_neutral() {
        for m in samples() {
            assert_eq!(Matrix4::multiply_matrices(&[m, Matrix4::identity()]), m);
            assert_eq!(Matrix4::multiply_matrices(&[Matrix4::identity(), m]), m);
        }
    }

    #[test]
    fn empty_product_is_identity() {
        assert_eq!(Matrix4::multiply_matrices(&[]), Matrix4::IDENTITY);
    }

    #[test]
    fn zero_scale_is_singular() {
        let m = Matrix4::scaling(Vector3::new(0.0, 1.0, 1.0));
        assert_eq!(m.inverse(), Err(MathError::SingularMatrix));
    }

    #[test]
    fn transpose_is_involution() {
        for m in samples() {
            assert_eq!(m.transpose().transpose(), m);
        }
    }

    #[test]
    fn composition_applies_rightmost_first() {
        let t = Matrix4::translation(Vector3::new(10.0, 0.0, 0.0));
        let s = Matrix4::scaling(Vector3::splat(2.0));
        let p = Matrix4::multiply_matrices(&[t, s]).transform_point(Vector3::ONE);
        assert_eq!(p, Vector3::new(12.0, 2.0, 2.0));
    }

    #[test]
    fn look_at_same_point_is_identity() {
        let eye = Vector3::new(1.0, 2.0, 3.0);
        assert_eq!(Matrix4::look_at(eye, eye, Vector3::Y), Matrix4::IDENTITY);
    }

    #[test]
    fn look_at_inverse_matches_view_matrix() {
        let eye = Vector3::new(4.0, 4.0, 4.0);
        let world = Matrix4::look_at(eye, Vector3::ZERO, Vector3::Y);
        let view = Mat4::look_at_rh(eye, Vec3::ZERO, Vec3::Y);
        assert!(world.inverse().unwrap().as_mat4().abs_diff_eq(view, 1e-5));
        assert!((world.position() - eye).length() < 1e-6);
    }

    #[test]
    fn look_at_straight_down_uses_fallback_up() {
        let world = Matrix4::look_at(Vector3::new(0.0, 5.0, 0.0), Vector3::ZERO, Vector3::Y);
        assert!(world.determinant().abs() > 0.5);
        let forward = world.transform_vector(Vector3::NEG_Z);
        assert!((forward - Vector3::NEG_Y).length() < 1e-5);
    }

    #[test]
    fn perspective_maps_near_and_far_to_unit_depth() {
        let p = Matrix4::perspective(1.0, 1.0, 0.5, 10.0);
        assert!(p.transform_point(Vector3::new(0.0, 0.0, -0.5)).z.abs() < 1e-5);
        assert!((p.transform_point(Vector3::new(0.0, 0.0, -10.0)).z - 1.0).abs() < 1e-5);
    }
}
