use thiserror::Error;

/// Pose tracker error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PoseError {
    #[error("Dimension mismatch in {op}: expected {expected:?}, found {found:?}")]
    DimensionMismatch {
        op: &'static str,
        expected: (usize, usize),
        found: (usize, usize),
    },

    #[error("Singular matrix in {op}")]
    SingularMatrix { op: &'static str },

    #[error("Degenerate direction for bone {bone}: joints are coincident")]
    DegenerateBoneDirection { bone: String },

    #[error("No T-pose frame accepted after {waited_secs:.1}s ({attempts} frame(s) evaluated)")]
    CalibrationTimeout { waited_secs: f64, attempts: u32 },

    #[error("Frame source closed")]
    FrameSourceClosed,

    #[error("Pose is not calibrated")]
    NotCalibrated,

    #[error("Invalid topology: {0}")]
    InvalidTopology(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Unknown joint: {0}")]
    UnknownJoint(String),
}

impl PoseError {
    /// Geometry and numeric failures that a non-strict caller may absorb
    /// for a single joint or bone.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            PoseError::SingularMatrix { .. } | PoseError::DegenerateBoneDirection { .. }
        )
    }
}

/// Result type for pose operations
pub type PoseResult<T> = Result<T, PoseError>;
