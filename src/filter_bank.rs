// filter_bank.rs - per-joint signal conditioning
//
// One Kalman estimator and one cascaded low-pass filter per tracked joint.
// Kalman runs first, low-pass second; either stage can be switched off.

use log::{debug, warn};

use crate::config::{KalmanConfig, LowPassConfig};
use crate::error::{PoseError, PoseResult};
use crate::filters::kalman::{CovariancePropagation, KalmanFilterF64};
use crate::filters::low_pass::CascadedExponentialFilter;
use crate::skeleton::Joint;
use crate::types::{Matrix, Vec3, JOINT_INPUT_DIM, JOINT_MEASURE_DIM, JOINT_STATE_DIM};

/// A joint whose filtered value was replaced by its raw measurement.
#[derive(Clone, Debug, PartialEq)]
pub struct JointFallback {
    pub joint: usize,
    pub error: PoseError,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct FilterReport {
    pub fallbacks: Vec<JointFallback>,
}

impl FilterReport {
    pub fn is_clean(&self) -> bool {
        self.fallbacks.is_empty()
    }
}

pub struct FilterBank {
    kalman: KalmanConfig,
    low_pass: LowPassConfig,
    strict: bool,
    /// Seeded lazily from the first sample of each joint
    estimators: Vec<Option<KalmanFilterF64>>,
    smoothers: Vec<CascadedExponentialFilter>,
    frames: u64,
}

impl FilterBank {
    pub fn new(joint_count: usize, kalman: KalmanConfig, low_pass: LowPassConfig, strict: bool) -> Self {
        if kalman.enabled && kalman.covariance_propagation == CovariancePropagation::InverseLegacy {
            warn!("Filter bank uses legacy F⁻¹ covariance propagation");
        }
        let smoothers = (0..joint_count)
            .map(|_| CascadedExponentialFilter::with_channels(low_pass.order, 3))
            .collect();
        Self {
            kalman,
            low_pass,
            strict,
            estimators: (0..joint_count).map(|_| None).collect(),
            smoothers,
            frames: 0,
        }
    }

    pub fn joint_count(&self) -> usize {
        self.smoothers.len()
    }

    pub fn frames_filtered(&self) -> u64 {
        self.frames
    }

    pub fn estimator(&self, joint: usize) -> Option<&KalmanFilterF64> {
        self.estimators.get(joint).and_then(Option::as_ref)
    }

    /// Filters one frame in place.
    ///
    /// In strict mode the first per-joint failure is returned and `positions`
    /// is left untouched. Otherwise the failing joint keeps its raw value
    /// and the failure is listed in the report.
    pub fn filter_frame(&mut self, positions: &mut [Vec3]) -> PoseResult<FilterReport> {
        if positions.len() != self.joint_count() {
            return Err(PoseError::DimensionMismatch {
                op: "filter_frame",
                expected: (self.joint_count(), 3),
                found: (positions.len(), 3),
            });
        }

        let mut report = FilterReport::default();
        let mut filtered = positions.to_vec();

        if self.kalman.enabled {
            for (joint, position) in filtered.iter_mut().enumerate() {
                match self.kalman_step(joint, position) {
                    Ok(estimate) => *position = estimate,
                    Err(e) if self.strict => return Err(e),
                    Err(e) => {
                        warn!("{}: Kalman stage failed, using raw position ({})", joint_name(joint), e);
                        report.fallbacks.push(JointFallback { joint, error: e });
                    }
                }
            }
        }

        if self.low_pass.enabled {
            let [ax, ay, az] = self.low_pass.alpha;
            let alphas = Vec3::new(ax, ay, az);
            for (position, smoother) in filtered.iter_mut().zip(self.smoothers.iter_mut()) {
                *position = smoother.filter_vec3_per_axis(*position, alphas);
            }
        }

        positions.copy_from_slice(&filtered);
        self.frames += 1;
        if !report.is_clean() {
            debug!("frame {}: {} joint(s) fell back to raw", self.frames, report.fallbacks.len());
        }
        Ok(report)
    }

    fn kalman_step(&mut self, joint: usize, measured: &Vec3) -> PoseResult<Vec3> {
        if self.estimators[joint].is_none() {
            self.estimators[joint] = Some(self.seed_estimator(measured)?);
        }
        let strict = self.strict;
        let Some(kf) = self.estimators[joint].as_mut() else {
            return Ok(*measured);
        };
        correct_then_predict(kf, measured, strict)
    }

    fn seed_estimator(&self, initial: &Vec3) -> PoseResult<KalmanFilterF64> {
        let n = JOINT_STATE_DIM;
        let mut kf = KalmanFilterF64::new(
            n,
            JOINT_MEASURE_DIM,
            JOINT_INPUT_DIM,
            Matrix::column(initial.as_slice()),
            Matrix::identity(n).scale(self.kalman.initial_uncertainty),
        )?;
        kf.set_propagation(self.kalman.covariance_propagation);
        kf.initialize_with(
            Matrix::identity(n),
            Matrix::zeros(n, JOINT_INPUT_DIM),
            Matrix::zeros(JOINT_INPUT_DIM, 1),
            &Matrix::column(&self.kalman.process_noise),
            Matrix::identity(JOINT_MEASURE_DIM),
            &Matrix::column(&self.kalman.measurement_noise),
            self.kalman.noise_covariance,
        )?;
        Ok(kf)
    }

    /// Drops every estimator and clears all low-pass memory.
    pub fn reset(&mut self) {
        for estimator in self.estimators.iter_mut() {
            *estimator = None;
        }
        for smoother in self.smoothers.iter_mut() {
            smoother.reset();
        }
        self.frames = 0;
    }
}

/// Correct with the measurement, then predict; returns the post-predict
/// state. Outside strict mode a recoverable predict failure is skipped and
/// the corrected estimate is returned in its place.
fn correct_then_predict(kf: &mut KalmanFilterF64, measured: &Vec3, strict: bool) -> PoseResult<Vec3> {
    kf.correct(&Matrix::column(measured.as_slice()))?;
    match kf.predict() {
        Ok(()) => {}
        Err(e) if strict || !e.is_recoverable() => return Err(e),
        Err(e) => warn!("Predict skipped, holding corrected estimate ({})", e),
    }
    Ok(Vec3::new(kf.state_at(0), kf.state_at(1), kf.state_at(2)))
}

fn joint_name(index: usize) -> String {
    Joint::from_index(index)
        .map(|j| j.name().to_string())
        .unwrap_or_else(|| format!("joint {index}"))
}
