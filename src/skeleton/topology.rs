use crate::error::{PoseError, PoseResult};
use crate::types::{Rotation, Vec3, DIRECTION_EPSILON};

use super::joints::{BoneId, Joint};

/// One bone of the target skeleton.
#[derive(Clone, Debug)]
pub struct Bone {
    pub name: String,
    /// Joint the bone starts from (shared with the parent's tail)
    pub head: usize,
    /// Joint the bone points at
    pub tail: usize,
    pub parent: Option<usize>,
    /// Target rest length
    pub length: f64,
    /// Unit direction of the bone in the canonical rest pose
    pub rest_direction: Vec3,
    /// World rotation of this bone when the target rig stands in T-pose
    pub tpose_rotation: Rotation,
}

/// Joints spanning the pelvis frame: lateral axis right -> left, up axis origin -> up.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PelvisFrame {
    pub origin: usize,
    pub left: usize,
    pub right: usize,
    pub up: usize,
}

/// Static bone hierarchy of the target skeleton.
///
/// Bones are stored parent-before-child so forward kinematics is a single
/// pass. Immutable once built, apart from the rig-supplied lengths and
/// T-pose rotations applied at startup.
#[derive(Clone, Debug)]
pub struct SkeletonTopology {
    bones: Vec<Bone>,
    joint_count: usize,
    root_joint: usize,
    foot_joints: Vec<usize>,
    pelvis_frame: Option<PelvisFrame>,
}

impl SkeletonTopology {
    pub fn new(
        joint_count: usize,
        root_joint: usize,
        bones: Vec<Bone>,
        foot_joints: Vec<usize>,
        pelvis_frame: Option<PelvisFrame>,
    ) -> PoseResult<Self> {
        let topology = Self { bones, joint_count, root_joint, foot_joints, pelvis_frame };
        topology.validate()?;
        Ok(topology)
    }

    /// Built-in 16-bone humanoid over the 17-joint layout, default lengths.
    pub fn humanoid() -> Self {
        let bones = BoneId::ALL
            .iter()
            .map(|&id| {
                let (head, tail) = id.endpoints();
                let [x, y, z] = id.rest_direction();
                Bone {
                    name: id.name().to_string(),
                    head: head.index(),
                    tail: tail.index(),
                    parent: id.parent().map(BoneId::index),
                    length: id.default_length(),
                    rest_direction: Vec3::new(x, y, z),
                    tpose_rotation: Rotation::identity(),
                }
            })
            .collect();
        Self {
            bones,
            joint_count: Joint::COUNT,
            root_joint: Joint::Pelvis.index(),
            foot_joints: vec![Joint::LeftAnkle.index(), Joint::RightAnkle.index()],
            pelvis_frame: Some(PelvisFrame {
                origin: Joint::Pelvis.index(),
                left: Joint::LeftHip.index(),
                right: Joint::RightHip.index(),
                up: Joint::Spine.index(),
            }),
        }
    }

    fn validate(&self) -> PoseResult<()> {
        if self.bones.is_empty() {
            return Err(PoseError::InvalidTopology("no bones".to_string()));
        }
        if self.root_joint >= self.joint_count {
            return Err(PoseError::InvalidTopology(format!(
                "root joint {} out of range",
                self.root_joint
            )));
        }
        let mut tail_owner: Vec<Option<usize>> = vec![None; self.joint_count];
        for (i, bone) in self.bones.iter().enumerate() {
            if bone.head >= self.joint_count || bone.tail >= self.joint_count {
                return Err(PoseError::InvalidTopology(format!(
                    "bone {} references a joint out of range",
                    bone.name
                )));
            }
            if bone.head == bone.tail {
                return Err(PoseError::InvalidTopology(format!(
                    "bone {} starts and ends at the same joint",
                    bone.name
                )));
            }
            match bone.parent {
                Some(p) if p >= i => {
                    return Err(PoseError::InvalidTopology(format!(
                        "bone {} appears before its parent",
                        bone.name
                    )));
                }
                Some(p) if self.bones[p].tail != bone.head => {
                    return Err(PoseError::InvalidTopology(format!(
                        "bone {} does not start at the tail of {}",
                        bone.name, self.bones[p].name
                    )));
                }
                None if bone.head != self.root_joint => {
                    return Err(PoseError::InvalidTopology(format!(
                        "parentless bone {} must start at the root joint",
                        bone.name
                    )));
                }
                _ => {}
            }
            if let Some(other) = tail_owner[bone.tail] {
                return Err(PoseError::InvalidTopology(format!(
                    "joint {} is the tail of both {} and {}",
                    bone.tail, self.bones[other].name, bone.name
                )));
            }
            tail_owner[bone.tail] = Some(i);
            if !(bone.length.is_finite() && bone.length > 0.0) {
                return Err(PoseError::InvalidTopology(format!(
                    "bone {} has non-positive length {}",
                    bone.name, bone.length
                )));
            }
            if (bone.rest_direction.norm() - 1.0).abs() > 1e-6
                || bone.rest_direction.norm() < DIRECTION_EPSILON
            {
                return Err(PoseError::InvalidTopology(format!(
                    "bone {} rest direction is not a unit vector",
                    bone.name
                )));
            }
        }
        if self.foot_joints.iter().any(|&j| j >= self.joint_count) {
            return Err(PoseError::InvalidTopology("foot joint out of range".to_string()));
        }
        if let Some(frame) = self.pelvis_frame {
            let joints = [frame.origin, frame.left, frame.right, frame.up];
            if joints.iter().any(|&j| j >= self.joint_count) {
                return Err(PoseError::InvalidTopology(
                    "pelvis frame joint out of range".to_string(),
                ));
            }
        }
        Ok(())
    }

    pub fn bones(&self) -> &[Bone] {
        &self.bones
    }

    pub fn bone(&self, index: usize) -> Option<&Bone> {
        self.bones.get(index)
    }

    pub fn len(&self) -> usize {
        self.bones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bones.is_empty()
    }

    pub fn joint_count(&self) -> usize {
        self.joint_count
    }

    pub fn root_joint(&self) -> usize {
        self.root_joint
    }

    pub fn foot_joints(&self) -> &[usize] {
        &self.foot_joints
    }

    pub fn pelvis_frame(&self) -> Option<PelvisFrame> {
        self.pelvis_frame
    }

    pub fn bone_index(&self, name: &str) -> Option<usize> {
        self.bones.iter().position(|b| b.name == name)
    }

    /// Bone whose tail is `joint`, i.e. the bone that places that joint.
    pub fn bone_for_joint(&self, joint: usize) -> Option<usize> {
        self.bones.iter().position(|b| b.tail == joint)
    }

    pub fn set_length(&mut self, name: &str, length: f64) -> PoseResult<()> {
        if !(length.is_finite() && length > 0.0) {
            return Err(PoseError::InvalidConfig(format!(
                "bone {name} length must be positive, got {length}"
            )));
        }
        let index = self
            .bone_index(name)
            .ok_or_else(|| PoseError::InvalidConfig(format!("unknown bone {name}")))?;
        self.bones[index].length = length;
        Ok(())
    }

    pub fn set_tpose_rotation(&mut self, name: &str, rotation: Rotation) -> PoseResult<()> {
        let index = self
            .bone_index(name)
            .ok_or_else(|| PoseError::InvalidConfig(format!("unknown bone {name}")))?;
        self.bones[index].tpose_rotation = rotation;
        Ok(())
    }
}
