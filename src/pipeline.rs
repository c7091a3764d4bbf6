// pipeline.rs - frame-in, pose-out orchestration
//
// Pure computation, no runtime or I/O: alignment, per-joint filtering,
// one-time calibration and per-frame reconstruction. The CLI feeds it from
// a mailbox; tests feed it from a VecDeque.

use log::{debug, info};

use crate::alignment::CoordinateAlignment;
use crate::calibration::{CalibratedPose, PoseCalibrator};
use crate::config::PipelineConfig;
use crate::error::{PoseError, PoseResult};
use crate::filter_bank::{FilterBank, FilterReport};
use crate::mailbox::FrameSource;
use crate::reconstruct::{PoseReconstructor, ReconstructedPose};
use crate::skeleton::{Joint, SkeletonTopology};
use crate::types::{rotation_to_array, vec3_to_array, JointFrame, PoseRecord, Vec3};

// ─── Events ──────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq)]
pub enum PipelineEvent {
    Calibrated { attempts: u32, divergence: f64 },
    CalibrationReset,
    JointFilterFallback { joint: String, error: PoseError },
    BoneHeld { bone: String },
}

// ─── Output ──────────────────────────────────────────────────────────────────

#[derive(Clone, Debug)]
pub struct FrameOutput {
    pub timestamp: f64,
    pub pose: ReconstructedPose,
    pub events: Vec<PipelineEvent>,
}

impl FrameOutput {
    pub fn to_record(&self, topology: &SkeletonTopology) -> PoseRecord {
        PoseRecord {
            timestamp: self.timestamp,
            world_rotations: self.pose.world_rotations.iter().map(rotation_to_array).collect(),
            local_rotations: self.pose.local_rotations.iter().map(rotation_to_array).collect(),
            positions: self.pose.positions.iter().map(vec3_to_array).collect(),
            held_bones: self
                .pose
                .held_bones
                .iter()
                .filter_map(|&b| topology.bone(b).map(|bone| bone.name.clone()))
                .collect(),
        }
    }
}

// ─── Pipeline ────────────────────────────────────────────────────────────────

pub struct PosePipeline {
    config: PipelineConfig,
    alignment: CoordinateAlignment,
    filter_bank: FilterBank,
    calibrator: PoseCalibrator,
    reconstructor: PoseReconstructor,
    frames_processed: u64,
}

impl PosePipeline {
    /// Validates the configuration and builds every stage.
    pub fn new(config: PipelineConfig) -> PoseResult<Self> {
        config.validate()?;
        let topology = config.build_topology()?;
        let absolute = config.reconstruction.use_absolute_coordinate;
        Ok(Self {
            alignment: CoordinateAlignment::new(&config.alignment),
            filter_bank: FilterBank::new(
                topology.joint_count(),
                config.kalman.clone(),
                config.low_pass.clone(),
                config.strict,
            ),
            calibrator: PoseCalibrator::new(config.calibration.clone(), absolute),
            reconstructor: PoseReconstructor::new(topology, config.reconstruction, config.strict),
            frames_processed: 0,
            config,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn topology(&self) -> &SkeletonTopology {
        self.reconstructor.topology()
    }

    pub fn is_calibrated(&self) -> bool {
        self.calibrator.is_calibrated()
    }

    pub fn calibration(&self) -> Option<&CalibratedPose> {
        self.calibrator.calibrated()
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }

    /// Alignment then filtering, as every stage downstream expects.
    pub fn prepare(&mut self, frame: &JointFrame) -> PoseResult<(Vec<Vec3>, Vec<PipelineEvent>)> {
        let (positions, report) = prepare_positions(&self.alignment, &mut self.filter_bank, frame)?;
        Ok((positions, fallback_events(&report)))
    }

    /// Blocks on `source` until a T-pose frame calibrates the session.
    pub fn calibrate<S: FrameSource + ?Sized>(&mut self, source: &mut S) -> PoseResult<PipelineEvent> {
        let Self { alignment, filter_bank, calibrator, reconstructor, .. } = self;
        let divergence = calibrator
            .calibrate_from(source, reconstructor.topology(), |frame| {
                prepare_positions(alignment, filter_bank, frame).map(|(positions, _)| positions)
            })?
            .divergence;
        let event = PipelineEvent::Calibrated { attempts: calibrator.attempts(), divergence };
        info!("Pipeline calibrated: {:?}", event);
        Ok(event)
    }

    /// Non-blocking variant for push-style callers: offers one frame to
    /// the calibrator.
    pub fn offer_calibration_frame(&mut self, frame: &JointFrame) -> PoseResult<Option<PipelineEvent>> {
        if self.is_calibrated() {
            return Ok(None);
        }
        let (positions, _) = prepare_positions(&self.alignment, &mut self.filter_bank, frame)?;
        if !self.calibrator.try_calibrate(&positions, self.reconstructor.topology())? {
            return Ok(None);
        }
        Ok(self.calibrator.calibrated().map(|pose| PipelineEvent::Calibrated {
            attempts: self.calibrator.attempts(),
            divergence: pose.divergence,
        }))
    }

    /// One steady-state frame. Fails with `NotCalibrated` before calibration.
    pub fn process(&mut self, frame: &JointFrame) -> PoseResult<FrameOutput> {
        if !self.calibrator.is_calibrated() {
            return Err(PoseError::NotCalibrated);
        }
        let (positions, report) = prepare_positions(&self.alignment, &mut self.filter_bank, frame)?;
        let calibration = self.calibrator.calibrated().ok_or(PoseError::NotCalibrated)?;
        let pose = self.reconstructor.reconstruct(&positions, calibration)?;

        let mut events = fallback_events(&report);
        for &b in &pose.held_bones {
            if let Some(bone) = self.reconstructor.topology().bone(b) {
                events.push(PipelineEvent::BoneHeld { bone: bone.name.clone() });
            }
        }
        self.frames_processed += 1;
        if !events.is_empty() {
            debug!("frame {:.3}: {} event(s)", frame.timestamp, events.len());
        }
        Ok(FrameOutput { timestamp: frame.timestamp, pose, events })
    }

    /// Explicit re-calibration: drops the reference and the held rotations.
    /// Filter state is kept.
    pub fn reset_calibration(&mut self) -> PipelineEvent {
        self.calibrator.reset();
        self.reconstructor.reset();
        PipelineEvent::CalibrationReset
    }
}

fn prepare_positions(
    alignment: &CoordinateAlignment,
    filter_bank: &mut FilterBank,
    frame: &JointFrame,
) -> PoseResult<(Vec<Vec3>, FilterReport)> {
    let mut positions = frame.positions.clone();
    alignment.apply_frame(&mut positions);
    let report = filter_bank.filter_frame(&mut positions)?;
    Ok((positions, report))
}

fn fallback_events(report: &FilterReport) -> Vec<PipelineEvent> {
    report
        .fallbacks
        .iter()
        .map(|f| PipelineEvent::JointFilterFallback {
            joint: Joint::from_index(f.joint)
                .map(|j| j.name().to_string())
                .unwrap_or_else(|| f.joint.to_string()),
            error: f.error.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mailbox::frame_mailbox;
    use crate::skeleton::BoneId;
    use crate::test_support::{arms_down_frame, tpose_frame, tpose_positions};
    use approx::assert_relative_eq;
    use std::collections::VecDeque;
    use std::thread;
    use std::time::Duration;

    fn config() -> PipelineConfig {
        let mut config = PipelineConfig::default();
        config.calibration.divergence_threshold = 0.5;
        config.calibration.timeout_secs = 2.0;
        config.calibration.poll_interval_ms = 5;
        config
    }

    fn unfiltered() -> PipelineConfig {
        let mut config = config();
        config.kalman.enabled = false;
        config.low_pass.enabled = false;
        config
    }

    #[test]
    fn test_rejects_invalid_config() {
        let mut config = config();
        config.calibration.divergence_threshold = 0.0;
        assert!(matches!(PosePipeline::new(config), Err(PoseError::InvalidConfig(_))));
    }

    #[test]
    fn test_process_before_calibration() {
        let mut pipeline = PosePipeline::new(config()).unwrap();
        assert_eq!(pipeline.process(&tpose_frame(0.0)).unwrap_err(), PoseError::NotCalibrated);
    }

    #[test]
    fn test_end_to_end_replay() {
        let mut pipeline = PosePipeline::new(config()).unwrap();
        let mut source: VecDeque<JointFrame> = (0..3).map(|i| tpose_frame(i as f64 / 30.0)).collect();
        let event = pipeline.calibrate(&mut source).unwrap();
        assert!(matches!(event, PipelineEvent::Calibrated { .. }));

        for i in 0..20 {
            let mut frame = tpose_frame(1.0 + i as f64 / 30.0);
            let swing = 0.02 * i as f64;
            frame.positions[Joint::RightKnee.index()].z += swing;
            frame.positions[Joint::RightAnkle.index()].z += 2.0 * swing;
            let output = pipeline.process(&frame).unwrap();
            assert!(output.events.is_empty());

            let topology = pipeline.topology();
            for bone in topology.bones() {
                let segment = output.pose.positions[bone.tail] - output.pose.positions[bone.head];
                assert_relative_eq!(segment.norm(), bone.length, epsilon = 1e-9);
            }
            let record = output.to_record(topology);
            assert_eq!(record.world_rotations.len(), BoneId::COUNT);
            assert_eq!(record.local_rotations.len(), BoneId::COUNT);
            assert_eq!(record.positions.len(), Joint::COUNT);
        }
        assert_eq!(pipeline.frames_processed(), 20);
    }

    #[test]
    fn test_held_bone_is_reported() {
        let mut pipeline = PosePipeline::new(unfiltered()).unwrap();
        assert!(pipeline.offer_calibration_frame(&tpose_frame(0.0)).unwrap().is_some());

        let mut frame = tpose_frame(0.1);
        frame.positions[Joint::Head.index()] = frame.positions[Joint::Nose.index()];
        let output = pipeline.process(&frame).unwrap();
        assert_eq!(output.events, vec![PipelineEvent::BoneHeld { bone: "head_bone".to_string() }]);
        assert_eq!(output.to_record(pipeline.topology()).held_bones, vec!["head_bone".to_string()]);
    }

    #[test]
    fn test_strict_pipeline_propagates_degenerate_bone() {
        let mut config = unfiltered();
        config.strict = true;
        let mut pipeline = PosePipeline::new(config).unwrap();
        pipeline.offer_calibration_frame(&tpose_frame(0.0)).unwrap();

        let mut frame = tpose_frame(0.1);
        frame.positions[Joint::Head.index()] = frame.positions[Joint::Nose.index()];
        assert!(matches!(
            pipeline.process(&frame),
            Err(PoseError::DegenerateBoneDirection { .. })
        ));
    }

    #[test]
    fn test_offer_rejects_non_tpose() {
        let mut pipeline = PosePipeline::new(unfiltered()).unwrap();
        assert!(pipeline.offer_calibration_frame(&arms_down_frame(0.0)).unwrap().is_none());
        assert!(!pipeline.is_calibrated());
    }

    #[test]
    fn test_filtered_non_tpose_is_rejected() {
        let mut config = config();
        config.kalman.enabled = false;
        let mut pipeline = PosePipeline::new(config).unwrap();
        let mut frame = tpose_frame(0.0);
        frame.positions[Joint::LeftWrist.index()].y -= 0.45;
        frame.positions[Joint::RightWrist.index()].y -= 0.45;
        let raw = crate::calibration::tpose_divergence(&frame.positions).unwrap();
        assert!(raw > 0.5);
        for i in 0..3 {
            frame.timestamp = i as f64 / 30.0;
            assert!(pipeline.offer_calibration_frame(&frame).unwrap().is_none());
        }
        assert!(!pipeline.is_calibrated());
    }

    #[test]
    fn test_both_filters_keep_first_calibration_frame_raw() {
        let mut pipeline = PosePipeline::new(config()).unwrap();
        let mut frame = tpose_frame(0.0);
        frame.positions[Joint::LeftWrist.index()].y -= 0.45;
        frame.positions[Joint::RightWrist.index()].y -= 0.45;
        assert!(pipeline.offer_calibration_frame(&frame).unwrap().is_none());
    }

    #[test]
    fn test_reset_calibration() {
        let mut pipeline = PosePipeline::new(unfiltered()).unwrap();
        pipeline.offer_calibration_frame(&tpose_frame(0.0)).unwrap();
        assert!(pipeline.process(&tpose_frame(0.1)).is_ok());
        assert_eq!(pipeline.reset_calibration(), PipelineEvent::CalibrationReset);
        assert_eq!(pipeline.process(&tpose_frame(0.2)).unwrap_err(), PoseError::NotCalibrated);
    }

    #[test]
    fn test_calibrate_from_mailbox_thread() {
        let mut pipeline = PosePipeline::new(unfiltered()).unwrap();
        let (publisher, mut mailbox) = frame_mailbox();
        let producer = thread::spawn(move || {
            for i in 0..50 {
                let frame = if i < 3 { arms_down_frame(i as f64) } else { tpose_frame(i as f64) };
                if publisher.publish(frame).is_err() {
                    break;
                }
                thread::sleep(Duration::from_millis(2));
            }
        });
        pipeline.calibrate(&mut mailbox).unwrap();
        drop(mailbox);
        producer.join().unwrap();
        assert!(pipeline.is_calibrated());
    }

    #[test]
    fn test_alignment_applies_before_calibration() {
        let mut config = unfiltered();
        config.alignment.axis_signs = [-1.0, 1.0, -1.0];
        let mut pipeline = PosePipeline::new(config).unwrap();
        // Subject recorded facing the other way: mirrored x and z
        let mirrored: Vec<Vec3> = tpose_positions().iter().map(|p| Vec3::new(-p.x, p.y, -p.z)).collect();
        let frame = JointFrame::new(0.0, mirrored);
        assert!(pipeline.offer_calibration_frame(&frame).unwrap().is_some());
        let calibration = pipeline.calibration().unwrap();
        assert!(calibration.source_tpose.iter().all(|r| r.angle() < 1e-9));
    }
}
