//! Constant-velocity Kalman filter over the SORT box state using ndarray and a
//! nalgebra-based 4x4 inverse.
//!
//! State (7-dim): `[cx, cy, area, aspect_ratio, vcx, vcy, varea]`. The aspect
//! ratio is treated as constant, so it has no velocity term. Observation
//! (4-dim): `[cx, cy, area, aspect_ratio]`.

use ndarray::{Array1, Array2};

const STATE_DIM: usize = 7;
const MEASUREMENT_DIM: usize = 4;

#[derive(Debug, Clone)]
pub struct KalmanFilter {
    motion_mat: Array2<f64>,
    update_mat: Array2<f64>,
    initial_cov: Array2<f64>,
    process_noise: Array2<f64>,
    measurement_noise: Array2<f64>,
}

impl Default for KalmanFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl KalmanFilter {
    pub fn new() -> Self {
        let mut motion_mat = Array2::eye(STATE_DIM);
        for i in 0..3 {
            motion_mat[[i, MEASUREMENT_DIM + i]] = 1.0;
        }

        let mut update_mat = Array2::zeros((MEASUREMENT_DIM, STATE_DIM));
        for i in 0..MEASUREMENT_DIM {
            update_mat[[i, i]] = 1.0;
        }

        // Velocities are unknown at spawn.
        let initial_cov = Array2::from_diag(&Array1::from_vec(vec![
            10.0, 10.0, 10.0, 10.0, 10_000.0, 10_000.0, 10_000.0,
        ]));
        // Smooth motion: small velocity noise, smaller still on area velocity.
        let process_noise = Array2::from_diag(&Array1::from_vec(vec![
            1.0, 1.0, 1.0, 1.0, 0.01, 0.01, 0.0001,
        ]));
        // Detector boxes jitter more in size than in position.
        let measurement_noise =
            Array2::from_diag(&Array1::from_vec(vec![1.0, 1.0, 10.0, 10.0]));

        Self {
            motion_mat,
            update_mat,
            initial_cov,
            process_noise,
            measurement_noise,
        }
    }

    /// Create a fresh state from a single observation.
    pub fn initiate(&self, measurement: [f64; 4]) -> (Array1<f64>, Array2<f64>) {
        let mut mean = Array1::zeros(STATE_DIM);
        for i in 0..MEASUREMENT_DIM {
            mean[i] = measurement[i];
        }
        (mean, self.initial_cov.clone())
    }

    /// Advance the state one frame.
    pub fn predict(
        &self,
        mean: &Array1<f64>,
        covariance: &Array2<f64>,
    ) -> (Array1<f64>, Array2<f64>) {
        let mut mean_to_predict = mean.clone();
        // Area must not shrink through zero.
        if mean_to_predict[2] + mean_to_predict[6] <= 0.0 {
            mean_to_predict[6] = 0.0;
        }

        let new_mean = self.motion_mat.dot(&mean_to_predict);
        let new_covariance =
            self.motion_mat.dot(covariance).dot(&self.motion_mat.t()) + &self.process_noise;

        (new_mean, new_covariance)
    }

    /// Project the state into observation space.
    pub fn project(
        &self,
        mean: &Array1<f64>,
        covariance: &Array2<f64>,
    ) -> (Array1<f64>, Array2<f64>) {
        let mean_proj = self.update_mat.dot(mean);
        let covariance_proj =
            self.update_mat.dot(covariance).dot(&self.update_mat.t()) + &self.measurement_noise;

        (mean_proj, covariance_proj)
    }

    /// Correct the state with an observation.
    ///
    /// Returns `None` when the innovation covariance is singular; callers keep
    /// the predicted state in that case.
    pub fn update(
        &self,
        mean: &Array1<f64>,
        covariance: &Array2<f64>,
        measurement: [f64; 4],
    ) -> Option<(Array1<f64>, Array2<f64>)> {
        let (projected_mean, projected_cov) = self.project(mean, covariance);

        let measurement_arr = Array1::from_vec(measurement.to_vec());
        let innovation = measurement_arr - projected_mean;

        // K = P * H^T * S^-1
        // H is [I 0], so P * H^T is the first 4 columns of P (7x4).
        let s_inv = invert_4x4(&projected_cov)?;

        let pht = covariance.dot(&self.update_mat.t());
        let kalman_gain = pht.dot(&s_inv);

        let new_mean = mean + &kalman_gain.dot(&innovation);
        let new_covariance = covariance - &kalman_gain.dot(&projected_cov).dot(&kalman_gain.t());

        Some((new_mean, new_covariance))
    }
}

/// Invert a 4x4 matrix using nalgebra (pure Rust).
fn invert_4x4(m: &Array2<f64>) -> Option<Array2<f64>> {
    let mut nm = nalgebra::Matrix4::zeros();
    for i in 0..4 {
        for j in 0..4 {
            nm[(i, j)] = m[[i, j]];
        }
    }
    let inv = nm.try_inverse()?;
    let mut res = Array2::zeros((4, 4));
    for i in 0..4 {
        for j in 0..4 {
            res[[i, j]] = inv[(i, j)];
        }
    }
    Some(res)
}
