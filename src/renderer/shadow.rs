//! Projective shadow mapping.
//!
//! A shadow-casting light renders scene depth from its own camera into a
//! depth texture. During the color pass each fragment is projected into that
//! texture with the light's texture matrix
//!
//! ```text
//! T = bias × P_light × inverse(lightWorld)
//! ```
//!
//! which maps a world position to `(u, v, depth)`: `u, v` in `[0, 1]` with
//! `v` growing downward like texture rows, depth unchanged from NDC. The
//! fragment is in shadow when `depth - bias >= storedDepth(u, v)`. Positions
//! outside the light's frustum are lit: behind the light (`w <= 0`), off the
//! map, or past the far plane.

use crate::backend::DepthImage;
use crate::error::MathError;
use crate::math::{Matrix4, Vector3};

/// Per-light uniform array holding texture matrices.
pub const SHADOW_MATRICES: &str = "uShadowMatrices";
/// Per-light uniform array holding depth textures.
pub const SHADOW_MAPS: &str = "uShadowMaps";

pub fn shadow_matrix_uniform(index: usize) -> String {
    format!("{SHADOW_MATRICES}[{index}]")
}

pub fn shadow_map_uniform(index: usize) -> String {
    format!("{SHADOW_MAPS}[{index}]")
}

/// Maps NDC `x, y` in `[-1, 1]` to texture `u, v` in `[0, 1]`, flipping `y`.
/// Depth is already in `[0, 1]` and passes through.
pub fn bias_matrix() -> Matrix4 {
    #[rustfmt::skip]
    let cols = [
        0.5,  0.0, 0.0, 0.0,
        0.0, -0.5, 0.0, 0.0,
        0.0,  0.0, 1.0, 0.0,
        0.5,  0.5, 0.0, 1.0,
    ];
    Matrix4::from_cols_array(&cols)
}

/// `bias × projection × inverse(light_world)`.
pub fn texture_matrix(projection: &Matrix4, light_world: &Matrix4) -> Result<Matrix4, MathError> {
    let view = light_world.inverse()?;
    Ok(Matrix4::multiply_matrices(&[bias_matrix(), *projection, view]))
}

/// 1.0 when `world` is shadowed in `depth`, otherwise 0.0.
///
/// This is the comparison shaders perform, evaluated on the CPU against a
/// depth snapshot.
pub fn is_shadow(texture_matrix: &Matrix4, depth: &DepthImage, world: Vector3, bias: f32) -> f32 {
    let clip = texture_matrix.transform_point4(world);
    if clip.w <= 0.0 {
        return 0.0;
    }
    let p = clip.truncate() / clip.w;
    if ![p.x, p.y, p.z].iter().all(|c| (0.0..=1.0).contains(c)) {
        return 0.0;
    }
    if p.z - bias >= depth.sample(p.x, p.y) {
        1.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bias_maps_ndc_corners_to_texture_corners() {
        let bias = bias_matrix();
        let top_left = bias.transform_point(Vector3::new(-1.0, 1.0, 0.25));
        let bottom_right = bias.transform_point(Vector3::new(1.0, -1.0, 0.75));
        assert!(top_left.abs_diff_eq(Vector3::new(0.0, 0.0, 0.25), 1e-6));
        assert!(bottom_right.abs_diff_eq(Vector3::new(1.0, 1.0, 0.75), 1e-6));
    }

    #[test]
    fn texture_matrix_centers_the_light_target() {
        let world = Matrix4::look_at(Vector3::new(0.0, 5.0, 5.0), Vector3::ZERO, Vector3::Y);
        let projection = Matrix4::orthographic(-2.0, 2.0, -2.0, 2.0, 0.1, 20.0);
        let t = texture_matrix(&projection, &world).unwrap();
        let p = t.transform_point(Vector3::ZERO);
        assert!((p.x - 0.5).abs() < 1e-5 && (p.y - 0.5).abs() < 1e-5);
        assert!(p.z > 0.0 && p.z < 1.0);
    }

    #[test]
    fn singular_light_world_fails() {
        let world = Matrix4::scaling(Vector3::new(0.0, 1.0, 1.0));
        assert_eq!(
            texture_matrix(&Matrix4::IDENTITY, &world),
            Err(MathError::SingularMatrix)
        );
    }

    #[test]
    fn comparison_respects_bias_and_bounds() {
        let depth = DepthImage {
            width: 2,
            height: 2,
            data: vec![0.5; 4],
        };
        let t = Matrix4::IDENTITY;
        assert_eq!(is_shadow(&t, &depth, Vector3::new(0.25, 0.25, 0.6), 0.005), 1.0);
        assert_eq!(is_shadow(&t, &depth, Vector3::new(0.25, 0.25, 0.503), 0.005), 0.0);
        assert_eq!(is_shadow(&t, &depth, Vector3::new(1.5, 0.25, 0.9), 0.005), 0.0);
        assert_eq!(is_shadow(&t, &depth, Vector3::new(0.25, -0.1, 0.9), 0.005), 0.0);
        assert_eq!(is_shadow(&t, &depth, Vector3::new(0.25, 0.25, 1.2), 0.005), 0.0);
    }

    #[test]
    fn points_behind_perspective_light_are_lit() {
        let empty = DepthImage {
            width: 16,
            height: 16,
            data: vec![1.0; 256],
        };
        let world = Matrix4::look_at(Vector3::new(0.0, 5.0, 0.0), Vector3::ZERO, Vector3::Y);
        let projection = Matrix4::perspective(std::f32::consts::FRAC_PI_2, 1.0, 0.1, 50.0);
        let t = texture_matrix(&projection, &world).unwrap();

        // Directly above the light: w < 0, but the divided point lands mid-map.
        let above = Vector3::new(0.0, 6.0, 0.0);
        let p = t.transform_point(above);
        assert!((0.0..=1.0).contains(&p.x) && (0.0..=1.0).contains(&p.y));
        assert!(t.transform_point4(above).w < 0.0);
        assert_eq!(is_shadow(&t, &empty, above, 0.005), 0.0);

        // Past the far plane along the view axis.
        assert_eq!(is_shadow(&t, &empty, Vector3::new(0.0, -60.0, 0.0), 0.005), 0.0);
        // Inside the frustum an empty map never shadows.
        assert_eq!(is_shadow(&t, &empty, Vector3::ZERO, 0.005), 0.0);
    }
}
