//! Skeletal skinning.
//!
//! A [`Skeleton`] is an ordered list of bones where every parent precedes its
//! children, so one forward sweep evaluates the whole hierarchy. Each frame a
//! pose function supplies a local matrix per bone; the skeleton derives
//!
//! ```text
//! skin[i] = world[i] × inverseBind[i]
//! ```
//!
//! and a vertex with up to four influences is deformed as
//! `Σ weight[k] × skin[index[k]] × rest`. Weights are expected to sum to 1;
//! this is not checked.

use crate::error::{ConfigError, Result};
use crate::material::Material;
use crate::math::{Matrix4, Vector3};

/// Influences per vertex.
pub const MAX_INFLUENCES: usize = 4;

pub fn bone_matrix_uniform(index: usize) -> String {
    format!("uBoneMatrices[{index}]")
}

/// One joint of a skeleton.
#[derive(Clone, Debug, PartialEq)]
pub struct Bone {
    pub name: String,
    /// Index of the parent bone. Must be smaller than this bone's index.
    pub parent: Option<usize>,
    /// Local matrix in the bind pose.
    pub rest: Matrix4,
}

impl Bone {
    pub fn new(name: impl Into<String>, parent: Option<usize>, rest: Matrix4) -> Self {
        Self {
            name: name.into(),
            parent,
            rest,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Skeleton {
    bones: Vec<Bone>,
    inverse_bind: Vec<Matrix4>,
    world: Vec<Matrix4>,
    skin: Vec<Matrix4>,
}

impl Skeleton {
    /// Validates the hierarchy and records the inverse bind matrices.
    pub fn new(bones: Vec<Bone>) -> Result<Self> {
        for (i, bone) in bones.iter().enumerate() {
            if let Some(parent) = bone.parent.filter(|&p| p >= i) {
                return Err(ConfigError::InvalidBoneParent { bone: i, parent }.into());
            }
        }

        let bind_world = hierarchy(&bones, |_, bone| bone.rest);
        let inverse_bind = bind_world
            .iter()
            .map(Matrix4::inverse)
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let count = bones.len();
        Ok(Self {
            bones,
            inverse_bind,
            world: bind_world,
            skin: vec![Matrix4::IDENTITY; count],
        })
    }

    pub fn bones(&self) -> &[Bone] {
        &self.bones
    }

    pub fn len(&self) -> usize {
        self.bones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bones.is_empty()
    }

    pub fn find(&self, name: &str) -> Option<usize> {
        self.bones.iter().position(|b| b.name == name)
    }

    /// Recomputes world and skin matrices from `pose(index, bone)`, which
    /// returns each bone's local matrix for this frame.
    pub fn evaluate(&mut self, pose: impl FnMut(usize, &Bone) -> Matrix4) {
        self.world = hierarchy(&self.bones, pose);
        for ((skin, world), inverse_bind) in self.skin.iter_mut().zip(&self.world).zip(&self.inverse_bind) {
            *skin = *world * *inverse_bind;
        }
    }

    /// Evaluates the bind pose, which yields identity skin matrices.
    pub fn reset(&mut self) {
        self.evaluate(|_, bone| bone.rest);
    }

    pub fn world_matrices(&self) -> &[Matrix4] {
        &self.world
    }

    pub fn skin_matrices(&self) -> &[Matrix4] {
        &self.skin
    }

    /// Deforms a rest-pose position. Indices past the last bone contribute
    /// nothing.
    pub fn skin_vertex(
        &self,
        position: Vector3,
        indices: [u32; MAX_INFLUENCES],
        weights: [f32; MAX_INFLUENCES],
    ) -> Vector3 {
        indices
            .iter()
            .zip(weights)
            .filter(|(_, w)| *w != 0.0)
            .filter_map(|(&i, w)| Some(self.skin.get(i as usize)?.transform_point(position) * w))
            .sum()
    }

    /// Writes `uBoneMatrices[i]` for every bone the material declares.
    pub fn apply(&self, material: &mut Material) -> std::result::Result<(), ConfigError> {
        for (i, skin) in self.skin.iter().enumerate() {
            let name = bone_matrix_uniform(i);
            if material.has_uniform(&name) {
                material.set_matrix4(&name, *skin)?;
            }
        }
        Ok(())
    }
}

fn hierarchy(bones: &[Bone], mut local: impl FnMut(usize, &Bone) -> Matrix4) -> Vec<Matrix4> {
    let mut world: Vec<Matrix4> = Vec::with_capacity(bones.len());
    for (i, bone) in bones.iter().enumerate() {
        let local = local(i, bone);
        let matrix = match bone.parent {
            Some(parent) => world[parent] * local,
            None => local,
        };
        world.push(matrix);
    }
    world
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::HeadlessBackend;
    use crate::error::Error;
    use crate::material::{MaterialDesc, UniformKind};

    fn arm() -> Skeleton {
        Skeleton::new(vec![
            Bone::new("shoulder", None, Matrix4::IDENTITY),
            Bone::new("elbow", Some(0), Matrix4::translation(Vector3::new(0.0, 1.0, 0.0))),
        ])
        .unwrap()
    }

    #[test]
    fn bind_pose_leaves_vertices_in_place() {
        let mut skeleton = arm();
        skeleton.reset();
        let v = Vector3::new(0.2, 1.5, 0.0);
        let skinned = skeleton.skin_vertex(v, [0, 1, 0, 0], [0.5, 0.5, 0.0, 0.0]);
        assert!(skinned.abs_diff_eq(v, 1e-5));
    }

    #[test]
    fn child_follows_parent_rotation() {
        let mut skeleton = arm();
        skeleton.evaluate(|i, bone| {
            if i == 0 {
                Matrix4::rotation_z(std::f32::consts::FRAC_PI_2)
            } else {
                bone.rest
            }
        });
        let elbow = skeleton.world_matrices()[1].position();
        assert!(elbow.abs_diff_eq(Vector3::new(-1.0, 0.0, 0.0), 1e-5));

        let tip = skeleton.skin_vertex(Vector3::new(0.0, 2.0, 0.0), [1, 0, 0, 0], [1.0, 0.0, 0.0, 0.0]);
        assert!(tip.abs_diff_eq(Vector3::new(-2.0, 0.0, 0.0), 1e-5));
    }

    #[test]
    fn parent_must_precede_child() {
        let err = Skeleton::new(vec![Bone::new("loop", Some(0), Matrix4::IDENTITY)]).unwrap_err();
        assert!(matches!(
            err,
            Error::Config(ConfigError::InvalidBoneParent { bone: 0, parent: 0 })
        ));
    }

    #[test]
    fn apply_sets_declared_bone_uniforms() {
        let mut backend = HeadlessBackend::new(1, 1);
        let desc = MaterialDesc::new("vs", "fs").uniform(bone_matrix_uniform(1), UniformKind::Matrix4);
        let mut material = Material::new(&mut backend, &desc).unwrap();
        let mut skeleton = arm();
        skeleton.evaluate(|_, bone| bone.rest * Matrix4::scaling(Vector3::splat(2.0)));

        skeleton.apply(&mut material).unwrap();
        assert_eq!(
            material.uniform("uBoneMatrices[1]"),
            Some(crate::material::UniformValue::Matrix4(skeleton.skin_matrices()[1]))
        );
    }
}
