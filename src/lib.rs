//! Pose tracking core: per-joint signal conditioning and skeleton
//! retargeting for noisy 3D keypoint streams.
//!
//! Frames flow through [`pipeline::PosePipeline`]: coordinate alignment,
//! the per-joint [`filter_bank::FilterBank`], a one-time T-pose
//! calibration, then [`reconstruct::PoseReconstructor`] every frame.

pub mod alignment;
pub mod calibration;
pub mod config;
pub mod error;
pub mod filter_bank;
pub mod filters;
pub mod kinematics;
pub mod mailbox;
pub mod pipeline;
pub mod reconstruct;
pub mod skeleton;
pub mod types;

#[cfg(test)]
mod test_support;

pub use calibration::{CalibratedPose, PoseCalibrator};
pub use config::PipelineConfig;
pub use error::{PoseError, PoseResult};
pub use filter_bank::FilterBank;
pub use filters::{CascadedExponentialFilter, FilterOrder, LinearStateEstimator};
pub use mailbox::{frame_mailbox, FrameMailbox, FramePublisher, FrameSource, FrameWait};
pub use pipeline::{FrameOutput, PipelineEvent, PosePipeline};
pub use reconstruct::{PoseReconstructor, ReconstructedPose};
pub use skeleton::{BoneId, Joint, SkeletonTopology};
