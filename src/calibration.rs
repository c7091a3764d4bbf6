// calibration.rs - T-pose detection and the per-session reference frame
//
// Uncalibrated -> Calibrated, nothing else. Going back needs an explicit
// reset from the owner.

use log::{debug, info, warn};
use std::time::{Duration, Instant};

use crate::config::CalibrationConfig;
use crate::error::{PoseError, PoseResult};
use crate::kinematics::{compose, pelvis_orientation};
use crate::mailbox::{FrameSource, FrameWait};
use crate::reconstruct::source_rotations;
use crate::skeleton::{Joint, SkeletonTopology};
use crate::types::{JointFrame, Rotation, Vec3};

// ─── Calibrated reference ────────────────────────────────────────────────────

/// Per-bone T-pose rotations of source and target, fixed for the session.
#[derive(Clone, Debug)]
pub struct CalibratedPose {
    pub source_tpose: Vec<Rotation>,
    pub target_tpose: Vec<Rotation>,
    /// source_tpose⁻¹ ∘ target_tpose, or identity in absolute mode. Applied
    /// on the right, so source_tpose ∘ transfer = target_tpose.
    pub transfer: Vec<Rotation>,
    /// Parent reference for root bones
    pub root_orientation: Rotation,
    pub divergence: f64,
}

impl CalibratedPose {
    /// Derives the reference from a frame the subject holds in T-pose.
    pub fn from_tpose(
        topology: &SkeletonTopology,
        positions: &[Vec3],
        absolute: bool,
        divergence: f64,
    ) -> PoseResult<Self> {
        let source_tpose = source_rotations(topology, positions)?;
        let target_tpose: Vec<Rotation> = topology.bones().iter().map(|b| b.tpose_rotation).collect();
        let transfer = if absolute {
            vec![Rotation::identity(); source_tpose.len()]
        } else {
            target_tpose
                .iter()
                .zip(&source_tpose)
                .map(|(target, source)| compose(&source.inverse(), target))
                .collect()
        };
        let root_orientation = topology
            .pelvis_frame()
            .and_then(|frame| pelvis_orientation(positions, frame))
            .unwrap_or_else(Rotation::identity);
        Ok(Self { source_tpose, target_tpose, transfer, root_orientation, divergence })
    }

    /// Reference for a subject that already stands in the canonical rest pose.
    pub fn identity(topology: &SkeletonTopology) -> Self {
        let n = topology.len();
        let target_tpose: Vec<Rotation> = topology.bones().iter().map(|b| b.tpose_rotation).collect();
        Self {
            source_tpose: vec![Rotation::identity(); n],
            transfer: target_tpose.clone(),
            target_tpose,
            root_orientation: Rotation::identity(),
            divergence: 0.0,
        }
    }

    /// Every per-bone table must cover `bone_count` bones.
    pub fn check_bone_count(&self, bone_count: usize) -> PoseResult<()> {
        let tables = [
            ("calibration.source_tpose", self.source_tpose.len()),
            ("calibration.target_tpose", self.target_tpose.len()),
            ("calibration.transfer", self.transfer.len()),
        ];
        for (op, len) in tables {
            if len != bone_count {
                return Err(PoseError::DimensionMismatch {
                    op,
                    expected: (bone_count, 4),
                    found: (len, 4),
                });
            }
        }
        Ok(())
    }

    /// World rotation of bone `b` at rest in output space.
    pub fn rest_rotation(&self, b: usize, absolute: bool) -> Rotation {
        if absolute {
            self.source_tpose[b]
        } else {
            self.target_tpose[b]
        }
    }
}

// ─── Divergence ──────────────────────────────────────────────────────────────

/// How far a frame is from the reference T-pose: the Euclidean norm of five
/// partial sums of absolute deviations.
///
/// * torso: pelvis, spine and neck share x and z
/// * each arm: shoulder, elbow and wrist share the neck's y and z
/// * each leg: knee and ankle share the hip's x and the pelvis's z
///
/// Units are those of the input, so the threshold scales with the subject.
pub fn tpose_divergence(positions: &[Vec3]) -> PoseResult<f64> {
    if positions.len() < Joint::COUNT {
        return Err(PoseError::DimensionMismatch {
            op: "tpose_divergence",
            expected: (Joint::COUNT, 3),
            found: (positions.len(), 3),
        });
    }
    let p = |j: Joint| positions[j.index()];
    let (pelvis, spine, neck) = (p(Joint::Pelvis), p(Joint::Spine), p(Joint::Neck));

    let torso = (pelvis.x - spine.x).abs()
        + (pelvis.z - spine.z).abs()
        + (spine.x - neck.x).abs()
        + (spine.z - neck.z).abs();

    let arm = |joints: [Joint; 3]| -> f64 {
        joints
            .iter()
            .map(|&j| (p(j).y - neck.y).abs() + (p(j).z - neck.z).abs())
            .sum()
    };
    let left_arm = arm([Joint::LeftShoulder, Joint::LeftElbow, Joint::LeftWrist]);
    let right_arm = arm([Joint::RightShoulder, Joint::RightElbow, Joint::RightWrist]);

    let leg = |hip: Joint, joints: [Joint; 2]| -> f64 {
        let hip = p(hip);
        joints
            .iter()
            .map(|&j| (p(j).x - hip.x).abs() + (p(j).z - pelvis.z).abs())
            .sum()
    };
    let left_leg = leg(Joint::LeftHip, [Joint::LeftKnee, Joint::LeftAnkle]);
    let right_leg = leg(Joint::RightHip, [Joint::RightKnee, Joint::RightAnkle]);

    let parts = [torso, left_arm, right_arm, left_leg, right_leg];
    Ok(parts.iter().map(|s| s * s).sum::<f64>().sqrt())
}

// ─── State machine ───────────────────────────────────────────────────────────

#[derive(Clone, Debug)]
pub enum CalibrationState {
    Uncalibrated,
    Calibrated(CalibratedPose),
}

pub struct PoseCalibrator {
    config: CalibrationConfig,
    absolute: bool,
    state: CalibrationState,
    /// Frames evaluated since the last reset
    attempts: u32,
    best_divergence: f64,
}

impl PoseCalibrator {
    pub fn new(config: CalibrationConfig, absolute: bool) -> Self {
        Self {
            config,
            absolute,
            state: CalibrationState::Uncalibrated,
            attempts: 0,
            best_divergence: f64::INFINITY,
        }
    }

    pub fn state(&self) -> &CalibrationState {
        &self.state
    }

    pub fn is_calibrated(&self) -> bool {
        matches!(self.state, CalibrationState::Calibrated(_))
    }

    pub fn calibrated(&self) -> Option<&CalibratedPose> {
        match &self.state {
            CalibrationState::Calibrated(pose) => Some(pose),
            CalibrationState::Uncalibrated => None,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Lowest divergence seen since the last reset.
    pub fn best_divergence(&self) -> f64 {
        self.best_divergence
    }

    /// Back to Uncalibrated; the stored reference is dropped.
    pub fn reset(&mut self) {
        info!("Calibration reset");
        self.state = CalibrationState::Uncalibrated;
        self.attempts = 0;
        self.best_divergence = f64::INFINITY;
    }

    /// Evaluates one prepared frame and calibrates on it if it is close
    /// enough to a T-pose. Returns whether the calibrator is calibrated
    /// afterwards. A frame under the threshold with a degenerate bone is
    /// skipped rather than accepted.
    pub fn try_calibrate(&mut self, positions: &[Vec3], topology: &SkeletonTopology) -> PoseResult<bool> {
        if self.is_calibrated() {
            return Ok(true);
        }
        let divergence = tpose_divergence(positions)?;
        self.attempts += 1;
        self.best_divergence = self.best_divergence.min(divergence);
        debug!(
            "T-pose divergence {:.4} (threshold {:.4}, attempt {})",
            divergence, self.config.divergence_threshold, self.attempts
        );
        if divergence >= self.config.divergence_threshold {
            return Ok(false);
        }

        match CalibratedPose::from_tpose(topology, positions, self.absolute, divergence) {
            Ok(pose) => {
                info!("Calibrated after {} frame(s), divergence {:.4}", self.attempts, divergence);
                self.state = CalibrationState::Calibrated(pose);
                Ok(true)
            }
            Err(e) if e.is_recoverable() => {
                warn!("T-pose candidate rejected: {}", e);
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Pulls frames from `source` until one calibrates, the deadline passes
    /// or the attempt budget runs out. `prepare` turns a raw frame into
    /// the positions to evaluate (alignment and filtering).
    pub fn calibrate_from<S, F>(
        &mut self,
        source: &mut S,
        topology: &SkeletonTopology,
        mut prepare: F,
    ) -> PoseResult<&CalibratedPose>
    where
        S: FrameSource + ?Sized,
        F: FnMut(&JointFrame) -> PoseResult<Vec<Vec3>>,
    {
        let start = Instant::now();
        let deadline = Duration::from_secs_f64(self.config.timeout_secs);
        let poll = Duration::from_millis(self.config.poll_interval_ms);
        let mut evaluated = 0u32;

        while !self.is_calibrated() {
            let elapsed = start.elapsed();
            let out_of_attempts = self.config.max_attempts.is_some_and(|max| evaluated >= max);
            if elapsed >= deadline || out_of_attempts {
                warn!(
                    "Calibration gave up after {:.1}s, {} frame(s), best divergence {:.4}",
                    elapsed.as_secs_f64(),
                    evaluated,
                    self.best_divergence
                );
                return Err(PoseError::CalibrationTimeout {
                    waited_secs: elapsed.as_secs_f64(),
                    attempts: evaluated,
                });
            }

            match source.next_frame(poll.min(deadline - elapsed))? {
                FrameWait::Frame(frame) => {
                    evaluated += 1;
                    let positions = prepare(&frame)?;
                    self.try_calibrate(&positions, topology)?;
                }
                FrameWait::Timeout => {}
                FrameWait::Closed => return Err(PoseError::FrameSourceClosed),
            }
        }
        self.calibrated().ok_or(PoseError::NotCalibrated)
    }
}
