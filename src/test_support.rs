//! Fixtures shared by the unit tests.

use crate::skeleton::Joint;
use crate::types::{JointFrame, Vec3};

/// Canonical T-pose: y up, +x towards the subject's left, feet 0.1 above ground.
pub fn tpose_positions() -> Vec<Vec3> {
    let mut p = vec![Vec3::zeros(); Joint::COUNT];
    let mut set = |joint: Joint, x: f64, y: f64| p[joint.index()] = Vec3::new(x, y, 0.0);
    set(Joint::Pelvis, 0.0, 1.0);
    set(Joint::RightHip, -0.1, 1.0);
    set(Joint::RightKnee, -0.1, 0.55);
    set(Joint::RightAnkle, -0.1, 0.1);
    set(Joint::LeftHip, 0.1, 1.0);
    set(Joint::LeftKnee, 0.1, 0.55);
    set(Joint::LeftAnkle, 0.1, 0.1);
    set(Joint::Spine, 0.0, 1.25);
    set(Joint::Neck, 0.0, 1.5);
    set(Joint::Nose, 0.0, 1.6);
    set(Joint::Head, 0.0, 1.7);
    set(Joint::LeftShoulder, 0.18, 1.5);
    set(Joint::LeftElbow, 0.45, 1.5);
    set(Joint::LeftWrist, 0.7, 1.5);
    set(Joint::RightShoulder, -0.18, 1.5);
    set(Joint::RightElbow, -0.45, 1.5);
    set(Joint::RightWrist, -0.7, 1.5);
    p
}

pub fn tpose_frame(timestamp: f64) -> JointFrame {
    JointFrame::new(timestamp, tpose_positions())
}

/// Arms hanging at the sides; divergence ≈ 1.27.
pub fn arms_down_frame(timestamp: f64) -> JointFrame {
    let mut p = tpose_positions();
    for (joint, x, y) in [
        (Joint::LeftElbow, 0.2, 1.2),
        (Joint::LeftWrist, 0.2, 0.9),
        (Joint::RightElbow, -0.2, 1.2),
        (Joint::RightWrist, -0.2, 0.9),
    ] {
        p[joint.index()] = Vec3::new(x, y, 0.0);
    }
    JointFrame::new(timestamp, p)
}
