pub mod linalg;
pub mod matrix;

pub use linalg::*;
pub use matrix::Matrix;

use serde::{Deserialize, Serialize};

use crate::error::{PoseError, PoseResult};
use crate::skeleton::Joint;

/// One named keypoint as delivered by the keypoint decoder.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JointSample {
    pub name: String,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl JointSample {
    pub fn new(name: &str, x: f64, y: f64, z: f64) -> Self {
        Self { name: name.to_string(), x, y, z }
    }

    pub fn position(&self) -> Vec3 {
        Vec3::new(self.x, self.y, self.z)
    }
}

/// A recorded frame as stored on disk: timestamp plus named samples.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RecordedFrame {
    pub timestamp: f64,
    pub joints: Vec<JointSample>,
}

/// One frame of keypoints in [`Joint`] index order.
#[derive(Clone, Debug, PartialEq)]
pub struct JointFrame {
    pub timestamp: f64,
    pub positions: Vec<Vec3>,
}

impl JointFrame {
    pub fn new(timestamp: f64, positions: Vec<Vec3>) -> Self {
        Self { timestamp, positions }
    }

    /// Maps named samples onto the joint layout. Every joint must be present
    /// exactly once; names are matched with [`Joint::from_name`].
    pub fn from_samples(timestamp: f64, samples: &[JointSample]) -> PoseResult<Self> {
        let mut slots: Vec<Option<Vec3>> = vec![None; Joint::COUNT];
        for sample in samples {
            let joint = Joint::from_name(&sample.name)
                .ok_or_else(|| PoseError::UnknownJoint(sample.name.clone()))?;
            slots[joint.index()] = Some(sample.position());
        }
        let filled = slots.iter().filter(|s| s.is_some()).count();
        if filled != Joint::COUNT {
            return Err(PoseError::DimensionMismatch {
                op: "from_samples",
                expected: (Joint::COUNT, 3),
                found: (filled, 3),
            });
        }
        Ok(Self {
            timestamp,
            positions: slots.into_iter().flatten().collect(),
        })
    }

    /// `None` when the frame holds fewer joints than the humanoid layout.
    pub fn get(&self, joint: Joint) -> Option<Vec3> {
        self.positions.get(joint.index()).copied()
    }
}

impl TryFrom<&RecordedFrame> for JointFrame {
    type Error = PoseError;

    fn try_from(frame: &RecordedFrame) -> PoseResult<Self> {
        JointFrame::from_samples(frame.timestamp, &frame.joints)
    }
}

/// Serialisable per-frame output for the rig binder.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PoseRecord {
    pub timestamp: f64,
    /// `[w, x, y, z]` per bone
    pub world_rotations: Vec<[f64; 4]>,
    pub local_rotations: Vec<[f64; 4]>,
    pub positions: Vec<[f64; 3]>,
    pub held_bones: Vec<String>,
}
