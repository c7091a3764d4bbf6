//! Linear Kalman filter over runtime-sized, dimension-checked matrices.
//!
//! State:        x (nx×1), P (nx×nx)
//! Process:      x' = F·x + G·u,  Q derived from a noise vector w
//! Observation:  z  = H·x,        R derived from a noise vector v

use log::debug;
use nalgebra::RealField;
use serde::{Deserialize, Serialize};

use crate::error::PoseResult;
use crate::types::Matrix;

/// How `predict` propagates the error covariance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CovariancePropagation {
    /// P ← F·P·Fᵗ + Q
    #[default]
    Transpose,
    /// P ← F·P·F⁻¹ + Q. Legacy parity mode; requires F to be invertible.
    InverseLegacy,
}

/// How a noise vector becomes a covariance matrix.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum NoiseCovariance {
    /// Q = w·wᵗ (rank one)
    OuterProduct,
    /// Q = diag(w∘w), axis-independent
    #[default]
    Diagonal,
}

pub struct LinearStateEstimator<T: RealField + Copy> {
    nx: usize,
    nz: usize,
    nu: usize,

    /// State vector [nx×1]
    x: Matrix<T>,
    /// Error covariance [nx×nx]
    p: Matrix<T>,
    /// Process model [nx×nx]
    f: Matrix<T>,
    /// Control model [nx×nu]
    g: Matrix<T>,
    /// Control vector [nu×1]
    u: Matrix<T>,
    /// Process noise covariance [nx×nx]
    q: Matrix<T>,
    /// Observation model [nz×nx]
    h: Matrix<T>,
    /// Measurement noise covariance [nz×nz]
    r: Matrix<T>,
    /// Kalman gain from the last correction [nx×nz]
    k: Matrix<T>,

    propagation: CovariancePropagation,
    corrections: u64,
    predictions: u64,
}

pub type KalmanFilterF32 = LinearStateEstimator<f32>;
pub type KalmanFilterF64 = LinearStateEstimator<f64>;

impl<T: RealField + Copy> LinearStateEstimator<T> {
    /// Allocates every matrix at its final shape. The models start as
    /// F = I and zero elsewhere until [`initialize`](Self::initialize).
    pub fn new(
        nx: usize,
        nz: usize,
        nu: usize,
        initial_state: Matrix<T>,
        initial_uncertainty: Matrix<T>,
    ) -> PoseResult<Self> {
        initial_state.expect_shape("initial_state", (nx, 1))?;
        initial_uncertainty.expect_shape("initial_uncertainty", (nx, nx))?;

        Ok(Self {
            nx,
            nz,
            nu,
            x: initial_state,
            p: initial_uncertainty,
            f: Matrix::identity(nx),
            g: Matrix::zeros(nx, nu),
            u: Matrix::zeros(nu, 1),
            q: Matrix::zeros(nx, nx),
            h: Matrix::zeros(nz, nx),
            r: Matrix::zeros(nz, nz),
            k: Matrix::zeros(nx, nz),
            propagation: CovariancePropagation::default(),
            corrections: 0,
            predictions: 0,
        })
    }

    /// Installs the models with Q = w·wᵗ and R = v·vᵗ, then predicts once
    /// to seed the first working estimate.
    pub fn initialize(
        &mut self,
        f: Matrix<T>,
        g: Matrix<T>,
        u: Matrix<T>,
        process_noise: &Matrix<T>,
        h: Matrix<T>,
        measurement_noise: &Matrix<T>,
    ) -> PoseResult<()> {
        self.initialize_with(
            f,
            g,
            u,
            process_noise,
            h,
            measurement_noise,
            NoiseCovariance::OuterProduct,
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub fn initialize_with(
        &mut self,
        f: Matrix<T>,
        g: Matrix<T>,
        u: Matrix<T>,
        process_noise: &Matrix<T>,
        h: Matrix<T>,
        measurement_noise: &Matrix<T>,
        noise: NoiseCovariance,
    ) -> PoseResult<()> {
        f.expect_shape("F", (self.nx, self.nx))?;
        g.expect_shape("G", (self.nx, self.nu))?;
        u.expect_shape("u", (self.nu, 1))?;
        process_noise.expect_shape("process_noise", (self.nx, 1))?;
        h.expect_shape("H", (self.nz, self.nx))?;
        measurement_noise.expect_shape("measurement_noise", (self.nz, 1))?;

        self.q = noise_covariance(process_noise, noise)?;
        self.r = noise_covariance(measurement_noise, noise)?;
        self.f = f;
        self.g = g;
        self.u = u;
        self.h = h;

        self.predict()
    }

    pub fn set_propagation(&mut self, propagation: CovariancePropagation) {
        if propagation == CovariancePropagation::InverseLegacy {
            debug!("Kalman covariance propagation uses F⁻¹ instead of Fᵗ");
        }
        self.propagation = propagation;
    }

    pub fn propagation(&self) -> CovariancePropagation {
        self.propagation
    }

    /// Measurement update with the Joseph-form covariance:
    /// P ← (I − K·H)·P·(I − K·H)ᵗ + K·R·Kᵗ
    ///
    /// Nothing is written back unless every step succeeds.
    pub fn correct(&mut self, z: &Matrix<T>) -> PoseResult<()> {
        z.expect_shape("measurement", (self.nz, 1))?;

        let h_t = self.h.transpose();
        let s = self.h.mul(&self.p)?.mul(&h_t)?.add(&self.r)?;
        let s_inv = s.inverse()?;
        let k = self.p.mul(&h_t)?.mul(&s_inv)?;

        let innovation = z.sub(&self.h.mul(&self.x)?)?;
        let x = self.x.add(&k.mul(&innovation)?)?;

        let i_kh = Matrix::identity(self.nx).sub(&k.mul(&self.h)?)?;
        let mut p = i_kh
            .mul(&self.p)?
            .mul(&i_kh.transpose())?
            .add(&k.mul(&self.r)?.mul(&k.transpose())?)?;
        p.symmetrize();

        self.x = x;
        self.p = p;
        self.k = k;
        self.corrections += 1;
        Ok(())
    }

    /// Time update: x ← F·x + G·u, P ← F·P·Fᵗ + Q (or F·P·F⁻¹ + Q in
    /// legacy mode). On `SingularMatrix` the prior state is kept.
    pub fn predict(&mut self) -> PoseResult<()> {
        let x = self.f.mul(&self.x)?.add(&self.g.mul(&self.u)?)?;
        let f_right = match self.propagation {
            CovariancePropagation::Transpose => self.f.transpose(),
            CovariancePropagation::InverseLegacy => self.f.inverse()?,
        };
        let p = self.f.mul(&self.p)?.mul(&f_right)?.add(&self.q)?;

        self.x = x;
        self.p = p;
        self.predictions += 1;
        Ok(())
    }

    /// Re-assigns state and covariance; models are left untouched.
    pub fn reset(&mut self, state: Matrix<T>, covariance: Matrix<T>) -> PoseResult<()> {
        state.expect_shape("state", (self.nx, 1))?;
        covariance.expect_shape("covariance", (self.nx, self.nx))?;
        self.x = state;
        self.p = covariance;
        self.k = Matrix::zeros(self.nx, self.nz);
        Ok(())
    }

    pub fn state(&self) -> &Matrix<T> {
        &self.x
    }

    /// State component `i`, zero if out of range.
    pub fn state_at(&self, i: usize) -> T {
        self.x.get(i, 0).unwrap_or_else(T::zero)
    }

    pub fn covariance(&self) -> &Matrix<T> {
        &self.p
    }

    pub fn gain(&self) -> &Matrix<T> {
        &self.k
    }

    pub fn process_covariance(&self) -> &Matrix<T> {
        &self.q
    }

    pub fn measurement_covariance(&self) -> &Matrix<T> {
        &self.r
    }

    pub fn dimensions(&self) -> (usize, usize, usize) {
        (self.nx, self.nz, self.nu)
    }

    pub fn covariance_trace(&self) -> T {
        (0..self.nx).fold(T::zero(), |acc, i| acc + self.p.get(i, i).unwrap_or_else(T::zero))
    }

    pub fn update_counts(&self) -> (u64, u64) {
        (self.corrections, self.predictions)
    }
}

fn noise_covariance<T: RealField + Copy>(
    noise: &Matrix<T>,
    form: NoiseCovariance,
) -> PoseResult<Matrix<T>> {
    match form {
        NoiseCovariance::OuterProduct => noise.mul(&noise.transpose()),
        NoiseCovariance::Diagonal => {
            let variances: Vec<T> = (0..noise.nrows())
                .map(|i| {
                    let v = noise.get(i, 0).unwrap_or_else(T::zero);
                    v * v
                })
                .collect();
            Ok(Matrix::from_diagonal(&variances))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PoseError;

    /// Bounded zero-mean disturbance without pulling in an RNG.
    fn noise(i: usize) -> f64 {
        0.4 * ((i as f64) * 1.7).sin() + 0.2 * ((i as f64) * 0.31).cos()
    }

    fn scalar_filter() -> KalmanFilterF64 {
        let mut kf = LinearStateEstimator::new(
            1,
            1,
            1,
            Matrix::column(&[0.0]),
            Matrix::column(&[1.0]),
        )
        .unwrap();
        kf.initialize(
            Matrix::identity(1),
            Matrix::zeros(1, 1),
            Matrix::zeros(1, 1),
            &Matrix::column(&[0.001]),
            Matrix::identity(1),
            &Matrix::column(&[0.5]),
        )
        .unwrap();
        kf
    }

    #[test]
    fn test_construct_dimension_mismatch() {
        let result = KalmanFilterF64::new(3, 3, 1, Matrix::column(&[0.0, 0.0]), Matrix::identity(3));
        assert!(matches!(result, Err(PoseError::DimensionMismatch { op: "initial_state", .. })));

        let result = KalmanFilterF64::new(3, 3, 1, Matrix::column(&[0.0; 3]), Matrix::identity(2));
        assert!(matches!(
            result,
            Err(PoseError::DimensionMismatch { op: "initial_uncertainty", .. })
        ));
    }

    #[test]
    fn test_initialize_validates_models() {
        let mut kf =
            KalmanFilterF64::new(3, 3, 1, Matrix::column(&[0.0; 3]), Matrix::identity(3)).unwrap();
        let result = kf.initialize(
            Matrix::identity(2),
            Matrix::zeros(3, 1),
            Matrix::zeros(1, 1),
            &Matrix::column(&[0.1; 3]),
            Matrix::identity(3),
            &Matrix::column(&[0.1; 3]),
        );
        assert!(matches!(result, Err(PoseError::DimensionMismatch { op: "F", .. })));
    }

    #[test]
    fn test_initialize_derives_outer_product_noise() {
        let mut kf =
            KalmanFilterF64::new(2, 2, 1, Matrix::column(&[0.0; 2]), Matrix::identity(2)).unwrap();
        kf.initialize(
            Matrix::identity(2),
            Matrix::zeros(2, 1),
            Matrix::zeros(1, 1),
            &Matrix::column(&[0.1, 0.2]),
            Matrix::identity(2),
            &Matrix::column(&[0.3, 0.4]),
        )
        .unwrap();
        assert!((kf.process_covariance().get(0, 1).unwrap() - 0.02).abs() < 1e-12);
        assert!((kf.measurement_covariance().get(1, 1).unwrap() - 0.16).abs() < 1e-12);
        // initialize runs one predict
        assert_eq!(kf.update_counts(), (0, 1));
    }

    #[test]
    fn test_correct_rejects_wrong_measurement() {
        let mut kf = scalar_filter();
        let err = kf.correct(&Matrix::column(&[1.0, 2.0])).unwrap_err();
        assert!(matches!(err, PoseError::DimensionMismatch { op: "measurement", .. }));
    }

    #[test]
    fn test_scalar_convergence() {
        let truth = 2.5;
        let mut kf = scalar_filter();
        for i in 0..400 {
            kf.correct(&Matrix::column(&[truth + noise(i)])).unwrap();
            kf.predict().unwrap();
        }
        assert!((kf.state_at(0) - truth).abs() < 0.1, "estimate {}", kf.state_at(0));
    }

    #[test]
    fn test_f32_instance_converges() {
        let truth = -1.25f32;
        let mut kf = KalmanFilterF32::new(1, 1, 1, Matrix::column(&[0.0]), Matrix::column(&[1.0]))
            .unwrap();
        kf.initialize(
            Matrix::identity(1),
            Matrix::zeros(1, 1),
            Matrix::zeros(1, 1),
            &Matrix::column(&[0.001]),
            Matrix::identity(1),
            &Matrix::column(&[0.5]),
        )
        .unwrap();
        for i in 0..400 {
            kf.correct(&Matrix::column(&[truth + noise(i) as f32])).unwrap();
            kf.predict().unwrap();
        }
        assert!((kf.state_at(0) - truth).abs() < 0.1);
    }

    #[test]
    fn test_three_axis_diagonal_convergence() {
        let truth = [0.3, 1.2, -0.7];
        let mut kf =
            KalmanFilterF64::new(3, 3, 1, Matrix::column(&[0.0; 3]), Matrix::identity(3)).unwrap();
        kf.initialize_with(
            Matrix::identity(3),
            Matrix::zeros(3, 1),
            Matrix::zeros(1, 1),
            &Matrix::column(&[0.01; 3]),
            Matrix::identity(3),
            &Matrix::column(&[0.3; 3]),
            NoiseCovariance::Diagonal,
        )
        .unwrap();
        for i in 0..300 {
            let z: Vec<f64> = truth.iter().enumerate().map(|(a, t)| t + noise(i + 97 * a)).collect();
            kf.correct(&Matrix::column(&z)).unwrap();
            kf.predict().unwrap();
        }
        for (axis, t) in truth.iter().enumerate() {
            assert!((kf.state_at(axis) - t).abs() < 0.15);
        }
        // Joseph form keeps P symmetric
        let p = kf.covariance();
        assert!((p.get(0, 1).unwrap() - p.get(1, 0).unwrap()).abs() < 1e-15);
    }

    #[test]
    fn test_legacy_predict_singular_holds_state() {
        let mut kf =
            KalmanFilterF64::new(2, 2, 1, Matrix::column(&[1.0, 2.0]), Matrix::identity(2)).unwrap();
        let singular_f = Matrix::from_row_slice(2, 2, &[1.0, 1.0, 1.0, 1.0]).unwrap();
        kf.set_propagation(CovariancePropagation::InverseLegacy);
        let err = kf
            .initialize_with(
                singular_f,
                Matrix::zeros(2, 1),
                Matrix::zeros(1, 1),
                &Matrix::column(&[0.1; 2]),
                Matrix::identity(2),
                &Matrix::column(&[0.1; 2]),
                NoiseCovariance::Diagonal,
            )
            .unwrap_err();
        assert_eq!(err, PoseError::SingularMatrix { op: "inverse" });
        assert_eq!(kf.state(), &Matrix::column(&[1.0, 2.0]));
        assert_eq!(kf.update_counts(), (0, 0));
    }

    #[test]
    fn test_legacy_matches_transpose_for_identity_model() {
        let build = |propagation| {
            let mut kf = KalmanFilterF64::new(2, 2, 1, Matrix::column(&[0.0; 2]), Matrix::identity(2))
                .unwrap();
            kf.set_propagation(propagation);
            kf.initialize_with(
                Matrix::identity(2),
                Matrix::zeros(2, 1),
                Matrix::zeros(1, 1),
                &Matrix::column(&[0.1; 2]),
                Matrix::identity(2),
                &Matrix::column(&[0.2; 2]),
                NoiseCovariance::Diagonal,
            )
            .unwrap();
            kf.correct(&Matrix::column(&[1.0, -1.0])).unwrap();
            kf.predict().unwrap();
            kf
        };
        let a = build(CovariancePropagation::Transpose);
        let b = build(CovariancePropagation::InverseLegacy);
        assert_eq!(a.state(), b.state());
        assert!((a.covariance_trace() - b.covariance_trace()).abs() < 1e-12);
    }

    #[test]
    fn test_reset_checks_shapes() {
        let mut kf = scalar_filter();
        assert!(kf.reset(Matrix::column(&[0.0, 1.0]), Matrix::identity(1)).is_err());
        kf.reset(Matrix::column(&[5.0]), Matrix::identity(1)).unwrap();
        assert_eq!(kf.state_at(0), 5.0);
    }
}
