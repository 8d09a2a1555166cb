use crate::math::{Matrix4, Vector3};

/// Local position, Euler rotation and scale of an actor.
///
/// The model matrix is `T × Rz × Rx × Ry × S`: scale first, then the Y, X and
/// Z rotations, then translation. It is cached and only recomputed by
/// [`Transform::resolve`], which the scene calls once per frame after every
/// component has updated. Reads of [`Transform::matrix`] during an update
/// therefore see the previous frame's value.
#[derive(Clone, Debug, PartialEq)]
pub struct Transform {
    position: Vector3,
    rotation: Vector3,
    scale: Vector3,
    matrix: Matrix4,
    dirty: bool,
}

impl Default for Transform {
    fn default() -> Self {
        Self::new()
    }
}

impl Transform {
    pub fn new() -> Self {
        Self {
            position: Vector3::ZERO,
            rotation: Vector3::ZERO,
            scale: Vector3::ONE,
            matrix: Matrix4::IDENTITY,
            dirty: false,
        }
    }

    /// Builder-style position. The matrix is resolved immediately.
    pub fn with_position(mut self, position: Vector3) -> Self {
        self.position = position;
        self.matrix = self.compute_matrix();
        self
    }

    /// Builder-style Euler rotation in radians.
    pub fn with_rotation(mut self, rotation: Vector3) -> Self {
        self.rotation = rotation;
        self.matrix = self.compute_matrix();
        self
    }

    pub fn with_scale(mut self, scale: Vector3) -> Self {
        self.scale = scale;
        self.matrix = self.compute_matrix();
        self
    }

    pub fn position(&self) -> Vector3 {
        self.position
    }

    pub fn rotation(&self) -> Vector3 {
        self.rotation
    }

    pub fn scale(&self) -> Vector3 {
        self.scale
    }

    pub fn set_position(&mut self, position: Vector3) {
        self.position = position;
        self.dirty = true;
    }

    pub fn set_rotation(&mut self, rotation: Vector3) {
        self.rotation = rotation;
        self.dirty = true;
    }

    pub fn set_scale(&mut self, scale: Vector3) {
        self.scale = scale;
        self.dirty = true;
    }

    pub fn translate(&mut self, delta: Vector3) {
        self.position += delta;
        self.dirty = true;
    }

    pub fn rotate(&mut self, delta: Vector3) {
        self.rotation += delta;
        self.dirty = true;
    }

    /// Places the transform at `eye` and orients its −Z axis toward `target`.
    ///
    /// Only X and Y rotations are used, so the result has no roll. Does
    /// nothing to the rotation when `eye` and `target` coincide.
    pub fn look_at(&mut self, eye: Vector3, target: Vector3) {
        self.position = eye;
        let forward = (target - eye).normalize_or_zero();
        if forward != Vector3::ZERO {
            // R(-Z) = (-sin y, cos y sin x, -cos y cos x)
            let yaw = (-forward.x).clamp(-1.0, 1.0).asin();
            let pitch = forward.y.atan2(-forward.z);
            self.rotation = Vector3::new(pitch, yaw, 0.0);
        }
        self.dirty = true;
    }

    /// The cached model matrix as of the last [`resolve`](Self::resolve).
    pub fn matrix(&self) -> Matrix4 {
        self.matrix
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Recomputes the cached matrix if anything changed. Returns whether it did.
    pub fn resolve(&mut self) -> bool {
        if !self.dirty {
            return false;
        }
        self.matrix = self.compute_matrix();
        self.dirty = false;
        true
    }

    /// `T × Rz × Rx × Ry × S` from the current fields, ignoring the cache.
    pub fn compute_matrix(&self) -> Matrix4 {
        Matrix4::multiply_matrices(&[
            Matrix4::translation(self.position),
            Matrix4::rotation_z(self.rotation.z),
            Matrix4::rotation_x(self.rotation.x),
            Matrix4::rotation_y(self.rotation.y),
            Matrix4::scaling(self.scale),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matrix_is_stale_until_resolved() {
        let mut t = Transform::new();
        t.set_position(Vector3::new(1.0, 2.0, 3.0));
        assert_eq!(t.matrix(), Matrix4::IDENTITY);
        assert!(t.resolve());
        assert_eq!(t.matrix().position(), Vector3::new(1.0, 2.0, 3.0));
        assert!(!t.resolve());
    }

    #[test]
    fn applies_scale_then_rotation_then_translation() {
        let t = Transform::new()
            .with_position(Vector3::new(0.0, 0.0, 5.0))
            .with_rotation(Vector3::new(0.0, std::f32::consts::FRAC_PI_2, 0.0))
            .with_scale(Vector3::splat(2.0));
        let p = t.matrix().transform_point(Vector3::X);
        assert!((p - Vector3::new(0.0, 0.0, 3.0)).length() < 1e-5, "{p:?}");
    }

    #[test]
    fn look_at_points_negative_z_at_target() {
        let mut t = Transform::new();
        let eye = Vector3::new(3.0, 4.0, 5.0);
        t.look_at(eye, Vector3::ZERO);
        t.resolve();
        let forward = t.matrix().transform_vector(Vector3::NEG_Z);
        assert!((forward - (-eye).normalize()).length() < 1e-5, "{forward:?}");
    }
}
