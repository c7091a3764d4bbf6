use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::{PoseError, PoseResult};
use crate::filters::kalman::{CovariancePropagation, NoiseCovariance};
use crate::filters::low_pass::FilterOrder;
use crate::skeleton::SkeletonTopology;
use crate::types::rotation_from_array;

// ─── Configuration ───────────────────────────────────────────────────────────

/// Everything the pipeline needs at startup. Every field has a default so a
/// config file only has to name what it changes.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub kalman: KalmanConfig,
    pub low_pass: LowPassConfig,
    pub calibration: CalibrationConfig,
    pub reconstruction: ReconstructionOptions,
    pub alignment: AlignmentConfig,
    pub skeleton: SkeletonConfig,
    /// Abort the frame on the first per-joint or per-bone failure
    pub strict: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct KalmanConfig {
    pub enabled: bool,
    /// Per-axis process noise vector w
    pub process_noise: [f64; 3],
    /// Per-axis measurement noise vector v
    pub measurement_noise: [f64; 3],
    /// Diagonal of the initial error covariance
    pub initial_uncertainty: f64,
    pub noise_covariance: NoiseCovariance,
    pub covariance_propagation: CovariancePropagation,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LowPassConfig {
    pub enabled: bool,
    pub order: FilterOrder,
    /// Smoothing factor per axis, each in [0, 1]
    pub alpha: [f64; 3],
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// T-pose divergence below which a frame is accepted. Same units as
    /// the positional input, so it scales with the subject.
    pub divergence_threshold: f64,
    /// Overall deadline for the blocking calibration wait
    pub timeout_secs: f64,
    /// Longest single wait for a new frame
    pub poll_interval_ms: u64,
    /// Give up after this many evaluated frames (None = deadline only)
    pub max_attempts: Option<u32>,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ReconstructionOptions {
    pub use_absolute_coordinate: bool,
    pub use_parent_relative_rotation: bool,
    pub use_forward_kinematics: bool,
    pub pin_feet_to_ground: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignmentConfig {
    /// Multiplied into each axis, e.g. [1, 1, -1] to flip handedness
    pub axis_signs: [f64; 3],
    pub scale: f64,
    pub offset: [f64; 3],
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SkeletonConfig {
    pub bones: Vec<BoneOverride>,
}

/// Rig-supplied values for one bone of the humanoid topology.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BoneOverride {
    pub name: String,
    pub length: Option<f64>,
    /// `[w, x, y, z]`
    pub tpose_rotation: Option<[f64; 4]>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            kalman: KalmanConfig::default(),
            low_pass: LowPassConfig::default(),
            calibration: CalibrationConfig::default(),
            reconstruction: ReconstructionOptions::default(),
            alignment: AlignmentConfig::default(),
            skeleton: SkeletonConfig::default(),
            strict: false,
        }
    }
}

impl Default for KalmanConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            process_noise: [0.01; 3],
            measurement_noise: [0.05; 3],
            initial_uncertainty: 1.0,
            noise_covariance: NoiseCovariance::Diagonal,
            covariance_propagation: CovariancePropagation::Transpose,
        }
    }
}

impl Default for LowPassConfig {
    fn default() -> Self {
        Self { enabled: true, order: FilterOrder::Second, alpha: [0.5; 3] }
    }
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            divergence_threshold: 1.5,
            timeout_secs: 30.0,
            poll_interval_ms: 100,
            max_attempts: None,
        }
    }
}

impl Default for ReconstructionOptions {
    fn default() -> Self {
        Self {
            use_absolute_coordinate: false,
            use_parent_relative_rotation: true,
            use_forward_kinematics: true,
            pin_feet_to_ground: false,
        }
    }
}

impl Default for AlignmentConfig {
    fn default() -> Self {
        Self { axis_signs: [1.0; 3], scale: 1.0, offset: [0.0; 3] }
    }
}

impl PipelineConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: PipelineConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> PoseResult<()> {
        let invalid = |msg: String| Err(PoseError::InvalidConfig(msg));

        if self.kalman.initial_uncertainty <= 0.0 || !self.kalman.initial_uncertainty.is_finite() {
            return invalid("kalman.initial_uncertainty must be positive".to_string());
        }
        let noise = self.kalman.process_noise.iter().chain(&self.kalman.measurement_noise);
        if noise.clone().any(|v| !v.is_finite()) {
            return invalid("kalman noise must be finite".to_string());
        }
        if self.low_pass.alpha.iter().any(|a| !(0.0..=1.0).contains(a)) {
            return invalid(format!("low_pass.alpha {:?} outside [0, 1]", self.low_pass.alpha));
        }
        if self.calibration.divergence_threshold <= 0.0 {
            return invalid("calibration.divergence_threshold must be positive".to_string());
        }
        if self.calibration.timeout_secs <= 0.0 || !self.calibration.timeout_secs.is_finite() {
            return invalid("calibration.timeout_secs must be positive".to_string());
        }
        if self.calibration.poll_interval_ms == 0 {
            return invalid("calibration.poll_interval_ms must be non-zero".to_string());
        }
        if self.alignment.scale == 0.0 || !self.alignment.scale.is_finite() {
            return invalid("alignment.scale must be non-zero".to_string());
        }
        if self.alignment.axis_signs.iter().any(|s| s.abs() != 1.0) {
            return invalid("alignment.axis_signs entries must be 1 or -1".to_string());
        }
        self.build_topology().map(|_| ())
    }

    /// Humanoid topology with the configured rig overrides applied.
    pub fn build_topology(&self) -> PoseResult<SkeletonTopology> {
        let mut topology = SkeletonTopology::humanoid();
        for bone in &self.skeleton.bones {
            if topology.bone_index(&bone.name).is_none() {
                return Err(PoseError::InvalidConfig(format!("unknown bone {}", bone.name)));
            }
            if let Some(length) = bone.length {
                topology.set_length(&bone.name, length)?;
            }
            if let Some(q) = bone.tpose_rotation {
                if q.iter().all(|c| *c == 0.0) {
                    return Err(PoseError::InvalidConfig(format!(
                        "bone {} has a zero T-pose quaternion",
                        bone.name
                    )));
                }
                topology.set_tpose_rotation(&bone.name, rotation_from_array(q))?;
            }
        }
        Ok(topology)
    }
}
