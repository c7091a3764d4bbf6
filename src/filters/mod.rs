pub mod kalman;
pub mod low_pass;

pub use kalman::{
    CovariancePropagation, KalmanFilterF32, KalmanFilterF64, LinearStateEstimator, NoiseCovariance,
};
pub use low_pass::{CascadedExponentialFilter, FilterOrder};
