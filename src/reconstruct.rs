// reconstruct.rs - source joints to target-skeleton pose
//
// Per frame: bone directions from the source joints, shortest-arc world
// rotations, transfer onto the target rig, optional parent-relative
// rotations and forward kinematics with the target's own bone lengths.

use log::{debug, warn};

use crate::calibration::CalibratedPose;
use crate::config::ReconstructionOptions;
use crate::error::{PoseError, PoseResult};
use crate::kinematics::{compose, rotation_between};
use crate::skeleton::{Bone, SkeletonTopology};
use crate::types::{Rotation, Vec3};

// ─── Output ──────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, Default)]
pub struct ReconstructedPose {
    /// Per bone, topology order
    pub world_rotations: Vec<Rotation>,
    /// Per bone; empty unless parent-relative rotation is enabled
    pub local_rotations: Vec<Rotation>,
    /// Per joint; empty unless forward kinematics is enabled
    pub positions: Vec<Vec3>,
    /// Bones whose direction was degenerate this frame and were held
    pub held_bones: Vec<usize>,
}

// ─── Rotation derivation ─────────────────────────────────────────────────────

/// World rotation of `bone` in the source frame: the shortest arc from its
/// rest direction to the head → tail direction in `positions`.
fn bone_rotation(bone: &Bone, positions: &[Vec3]) -> PoseResult<Rotation> {
    let direction = positions[bone.tail] - positions[bone.head];
    rotation_between(&bone.rest_direction, &direction)
        .ok_or_else(|| PoseError::DegenerateBoneDirection { bone: bone.name.clone() })
}

/// Source world rotations for every bone with identity transfer. Fails on
/// the first degenerate bone.
pub fn source_rotations(topology: &SkeletonTopology, positions: &[Vec3]) -> PoseResult<Vec<Rotation>> {
    check_joint_count(topology, positions)?;
    topology.bones().iter().map(|bone| bone_rotation(bone, positions)).collect()
}

fn check_joint_count(topology: &SkeletonTopology, positions: &[Vec3]) -> PoseResult<()> {
    if positions.len() != topology.joint_count() {
        return Err(PoseError::DimensionMismatch {
            op: "reconstruct",
            expected: (topology.joint_count(), 3),
            found: (positions.len(), 3),
        });
    }
    Ok(())
}

// ─── Reconstructor ───────────────────────────────────────────────────────────

pub struct PoseReconstructor {
    topology: SkeletonTopology,
    options: ReconstructionOptions,
    strict: bool,
    /// World rotations of the last frame, used to hold degenerate bones
    previous_world: Option<Vec<Rotation>>,
}

impl PoseReconstructor {
    pub fn new(topology: SkeletonTopology, options: ReconstructionOptions, strict: bool) -> Self {
        Self { topology, options, strict, previous_world: None }
    }

    pub fn topology(&self) -> &SkeletonTopology {
        &self.topology
    }

    pub fn options(&self) -> ReconstructionOptions {
        self.options
    }

    /// Forget the previous frame's rotations.
    pub fn reset(&mut self) {
        self.previous_world = None;
    }

    pub fn reconstruct(
        &mut self,
        positions: &[Vec3],
        calibration: &CalibratedPose,
    ) -> PoseResult<ReconstructedPose> {
        check_joint_count(&self.topology, positions)?;
        let bone_count = self.topology.len();
        calibration.check_bone_count(bone_count)?;

        let absolute = self.options.use_absolute_coordinate;
        let mut world_rotations = Vec::with_capacity(bone_count);
        let mut held_bones = Vec::new();

        for (b, bone) in self.topology.bones().iter().enumerate() {
            let world = match bone_rotation(bone, positions) {
                Ok(source) if absolute => source,
                Ok(source) => compose(&source, &calibration.transfer[b]),
                Err(e) if self.strict => return Err(e),
                Err(e) => {
                    warn!("{}, holding previous rotation", e);
                    held_bones.push(b);
                    match &self.previous_world {
                        Some(previous) => previous[b],
                        None => calibration.rest_rotation(b, absolute),
                    }
                }
            };
            world_rotations.push(world);
        }

        let local_rotations = if self.options.use_parent_relative_rotation {
            self.parent_relative(&world_rotations, calibration)
        } else {
            Vec::new()
        };

        let positions = if self.options.use_forward_kinematics {
            let mut fk = self.forward_kinematics(positions, &world_rotations, calibration);
            if self.options.pin_feet_to_ground {
                self.pin_feet(&mut fk);
            }
            fk
        } else {
            if self.options.pin_feet_to_ground {
                debug!("pin_feet_to_ground ignored without forward kinematics");
            }
            Vec::new()
        };

        self.previous_world = Some(world_rotations.clone());
        Ok(ReconstructedPose { world_rotations, local_rotations, positions, held_bones })
    }

    /// local = parent_world⁻¹ ∘ world; root bones are taken relative to the
    /// calibrated pelvis orientation.
    fn parent_relative(&self, world: &[Rotation], calibration: &CalibratedPose) -> Vec<Rotation> {
        self.topology
            .bones()
            .iter()
            .enumerate()
            .map(|(b, bone)| {
                let parent = bone.parent.map_or(calibration.root_orientation, |p| world[p]);
                compose(&parent.inverse(), &world[b])
            })
            .collect()
    }

    /// Walks parent-before-child: tail = head + world · (axis × length). The
    /// axis is the rest direction expressed in the target bone's own frame,
    /// so every segment has exactly the target length.
    fn forward_kinematics(
        &self,
        source: &[Vec3],
        world: &[Rotation],
        calibration: &CalibratedPose,
    ) -> Vec<Vec3> {
        let root = self.topology.root_joint();
        let mut out = vec![Vec3::zeros(); self.topology.joint_count()];
        out[root] = source[root];
        for (b, bone) in self.topology.bones().iter().enumerate() {
            let axis = if self.options.use_absolute_coordinate {
                bone.rest_direction
            } else {
                calibration.target_tpose[b].inverse() * bone.rest_direction
            };
            out[bone.tail] = out[bone.head] + world[b] * (axis * bone.length);
        }
        out
    }

    fn pin_feet(&self, positions: &mut [Vec3]) {
        let lowest = self
            .topology
            .foot_joints()
            .iter()
            .map(|&j| positions[j].y)
            .fold(f64::INFINITY, f64::min);
        if !lowest.is_finite() {
            return;
        }
        for p in positions.iter_mut() {
            p.y -= lowest;
        }
    }
}
