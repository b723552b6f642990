use config::NoiseParams;
use prelude::*;
use crate::{EstimatorError, Result, A, INITIAL_STD_DEV, NS, OMEGA, THETA, V, X, Y};

/// Extended Kalman filter over a unicycle model with linear acceleration.
///
/// ```text
/// x     += v * cos(theta) * dt
/// y     += v * sin(theta) * dt
/// theta += omega * dt
/// v     += a * dt
/// ```
///
/// Measurement models are supplied by the caller on every `update`.
#[derive(Clone, Debug)]
pub struct Ekf {
    noise: NoiseParams,
    // State estimate
    x: Vector<NS>,
    // State covariance
    P: Matrix<NS, NS>,
    // Time of the last prediction in seconds
    t: float,
}

impl Ekf {
    pub fn new(noise: NoiseParams, t: float) -> Ekf {
        Ekf {
            noise,
            x: Vector::zeros(),
            P: initial_covariance(),
            t,
        }
    }

    pub fn with_state(noise: NoiseParams, x: Vector<NS>, P: Matrix<NS, NS>, t: float) -> Ekf {
        Ekf { noise, x, P, t }
    }

    pub fn state(&self) -> &Vector<NS> {
        &self.x
    }

    pub fn covariance(&self) -> &Matrix<NS, NS> {
        &self.P
    }

    pub fn time(&self) -> float {
        self.t
    }

    pub fn noise(&self) -> &NoiseParams {
        &self.noise
    }

    pub fn set_noise(&mut self, noise: NoiseParams) {
        self.noise = noise;
    }

    /// Propagates the state to `now`. The interval is measured from the
    /// previous call, not from any timestamp carried by a measurement.
    pub fn predict(&mut self, now: float) {
        let _guard = flame::start_guard("ekf predict");

        let mut dt = now - self.t;
        self.t = now;
        if dt < 0.0 {
            debug!("clock went backwards by {} s, skipping prediction", -dt);
            dt = 0.0;
        }
        if dt == 0.0 || !dt.is_finite() {
            return;
        }

        let theta = self.x[THETA];
        let v = self.x[V];
        let omega = self.x[OMEGA];
        let a = self.x[A];
        let (sin_theta, cos_theta) = theta.sin_cos();

        let mut F = Matrix::<NS, NS>::identity();
        F[(X, THETA)] = -v * sin_theta * dt;
        F[(X, V)] = cos_theta * dt;
        F[(Y, THETA)] = v * cos_theta * dt;
        F[(Y, V)] = sin_theta * dt;
        F[(THETA, OMEGA)] = dt;
        F[(V, A)] = dt;

        let R = Matrix::from_diagonal(
            &Vector::<NS>::from_column_slice(&self.noise.process()).map(|r| (r * dt).powi(2)),
        );

        self.x[X] += v * cos_theta * dt;
        self.x[Y] += v * sin_theta * dt;
        self.x[THETA] += omega * dt;
        self.x[V] += a * dt;

        self.P = symmetrise(F * self.P * F.transpose() + R);
    }

    /// Corrects the state with measurement `z`, its prediction `h`, the
    /// measurement Jacobian `H` and measurement covariance `Q`.
    ///
    /// Nothing is modified if the innovation is not finite or the innovation
    /// covariance cannot be inverted.
    pub fn update<const NM: usize>(
        &mut self,
        z: &Vector<NM>,
        h: &Vector<NM>,
        H: &Matrix<NM, NS>,
        Q: &Matrix<NM, NM>,
    ) -> Result<()> {
        let _guard = flame::start_guard("ekf update");

        let innovation = z - h;
        if innovation.iter().any(|e| !e.is_finite()) {
            return Err(EstimatorError::NonFiniteMeasurement);
        }

        // Innovation covariance
        let S = H * self.P * H.transpose() + Q;
        let S_inv = S
            .try_inverse()
            .ok_or(EstimatorError::SingularCovariance)?;

        // Kalman gain
        let K = self.P * H.transpose() * S_inv;
        if K.iter().any(|k| !k.is_finite()) {
            return Err(EstimatorError::SingularCovariance);
        }

        self.x += K * innovation;

        // Joseph form keeps P positive-semi-definite
        let IKH = Matrix::<NS, NS>::identity() - K * H;
        self.P = symmetrise(IKH * self.P * IKH.transpose() + K * Q * K.transpose());

        Ok(())
    }

    pub fn reset(&mut self, x: float, y: float, yaw: float) {
        self.x = Vector::<NS>::from_column_slice(&[x, y, yaw, 0.0, 0.0, 0.0]);
        self.P = initial_covariance();
    }
}

fn initial_covariance() -> Matrix<NS, NS> {
    Matrix::from_diagonal_element(INITIAL_STD_DEV * INITIAL_STD_DEV)
}

fn symmetrise(P: Matrix<NS, NS>) -> Matrix<NS, NS> {
    (P + P.transpose()) * 0.5
}

#[cfg(test)]
mod tests {
    use super::*;
    use prelude::nalgebra::{Matrix2x6, Matrix3x6, Vector2, Vector3};

    fn velocity_H() -> Matrix2x6<float> {
        let mut H = Matrix2x6::zeros();
        H[(0, V)] = 1.0;
        H[(1, OMEGA)] = 1.0;
        H
    }

    fn pose_H() -> Matrix3x6<float> {
        Matrix3x6::identity()
    }

    fn moving() -> Ekf {
        let x = Vector::<NS>::from_column_slice(&[0.3, -0.2, 0.4, 0.8, 0.1, 0.05]);
        Ekf::with_state(NoiseParams::default(), x, initial_covariance(), 10.0)
    }

    fn max_asymmetry(P: &Matrix<NS, NS>) -> float {
        (P - P.transpose()).abs().max()
    }

    #[test]
    fn new_starts_at_rest() {
        let ekf = Ekf::new(NoiseParams::default(), 3.0);
        assert_eq!(*ekf.state(), Vector::<NS>::zeros());
        assert!((ekf.covariance()[(0, 0)] - 1e-4).abs() < 1e-15);
        assert_eq!(ekf.time(), 3.0);
    }

    #[test]
    fn zero_dt_predict_is_a_no_op() {
        let mut ekf = moving();
        let (x, P) = (*ekf.state(), *ekf.covariance());
        ekf.predict(10.0);
        assert_eq!(*ekf.state(), x);
        assert_eq!(*ekf.covariance(), P);
    }

    #[test]
    fn backwards_clock_only_moves_time() {
        let mut ekf = moving();
        let (x, P) = (*ekf.state(), *ekf.covariance());
        ekf.predict(9.0);
        assert_eq!(*ekf.state(), x);
        assert_eq!(*ekf.covariance(), P);
        assert_eq!(ekf.time(), 9.0);
    }

    #[test]
    fn predict_follows_motion_model() {
        let x = Vector::<NS>::from_column_slice(&[0.0, 0.0, PI / 2.0, 2.0, 0.5, 0.1]);
        let mut ekf = Ekf::with_state(NoiseParams::default(), x, initial_covariance(), 0.0);
        ekf.predict(0.5);

        let expected = Vector::<NS>::from_column_slice(&[0.0, 1.0, PI / 2.0 + 0.25, 2.05, 0.5, 0.1]);
        assert_relative_eq!(*ekf.state(), expected, epsilon = 1e-12);
    }

    #[test]
    fn predict_grows_uncertainty() {
        let mut ekf = moving();
        let before = ekf.covariance().trace();
        ekf.predict(11.0);
        assert!(ekf.covariance().trace() > before);
        // Omega and a only gain their own process noise
        let expected = 1e-4 + 1.0;
        assert!((ekf.covariance()[(OMEGA, OMEGA)] - expected).abs() < 1e-12);
        assert!((ekf.covariance()[(A, A)] - expected).abs() < 1e-12);
    }

    #[test]
    fn covariance_stays_symmetric() {
        let mut ekf = moving();
        let mut t = 10.0;
        for i in 0..200 {
            t += 0.013 * (i % 7) as float;
            ekf.predict(t);
            let s = i as float * 0.1;
            ekf.update(
                &Vector2::new(s.sin(), s.cos()),
                &Vector2::new(ekf.state()[V], ekf.state()[OMEGA]),
                &velocity_H(),
                &Matrix::from_diagonal(&Vector2::new(0.01, 0.01).map(|q| q * q)),
            )
            .unwrap();
            if i % 5 == 0 {
                let x = *ekf.state();
                ekf.update(
                    &Vector3::new(s, -s, 3.0 * s.cos()),
                    &Vector3::new(x[X], x[Y], x[THETA]),
                    &pose_H(),
                    &Matrix::from_diagonal_element(1e-6),
                )
                .unwrap();
            }
            let asym = max_asymmetry(ekf.covariance());
            if asym >= 1e-9 {
                panic!("step: {}. asymmetry: {}.", i, asym);
            }
        }
    }

    #[test]
    fn huge_measurement_noise_is_ignored() {
        let mut ekf = moving();
        let x = *ekf.state();
        ekf.update(
            &Vector3::new(100.0, 100.0, 3.0),
            &Vector3::new(x[X], x[Y], x[THETA]),
            &pose_H(),
            &Matrix::from_diagonal_element(1e20),
        )
        .unwrap();
        assert!((ekf.state() - x).abs().max() < 1e-12);
    }

    #[test]
    fn tiny_measurement_noise_is_trusted() {
        let mut ekf = moving();
        let x = *ekf.state();
        let z = Vector3::new(5.0, -4.0, 1.0);
        ekf.update(
            &z,
            &Vector3::new(x[X], x[Y], x[THETA]),
            &pose_H(),
            &Matrix::from_diagonal_element(1e-18),
        )
        .unwrap();
        let h = ekf.state().fixed_rows::<3>(0).into_owned();
        if (h - z).abs().max() > 1e-9 {
            panic!("expected: {}. actual: {}.", z, h);
        }
    }

    #[test]
    fn singular_update_changes_nothing() {
        let mut ekf = Ekf::with_state(
            NoiseParams::default(),
            Vector::<NS>::from_column_slice(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]),
            Matrix::zeros(),
            0.0,
        );
        let result = ekf.update(
            &Vector2::new(0.0, 0.0),
            &Vector2::new(4.0, 5.0),
            &velocity_H(),
            &Matrix::zeros(),
        );
        assert_eq!(result, Err(EstimatorError::SingularCovariance));
        assert_eq!(ekf.state()[V], 4.0);
        assert_eq!(*ekf.covariance(), Matrix::<NS, NS>::zeros());
    }

    #[test]
    fn non_finite_measurement_is_rejected() {
        let mut ekf = moving();
        let x = *ekf.state();
        let P = *ekf.covariance();
        for &bad in &[std::f64::NAN, std::f64::INFINITY, std::f64::NEG_INFINITY] {
            let result = ekf.update(
                &Vector2::new(bad, 0.0),
                &Vector2::new(x[V], x[OMEGA]),
                &velocity_H(),
                &Matrix::from_diagonal_element(1e-4),
            );
            assert_eq!(result, Err(EstimatorError::NonFiniteMeasurement));
            assert_eq!(*ekf.state(), x);
            assert_eq!(*ekf.covariance(), P);
        }

        ekf.update(
            &Vector3::new(1.0, 1.0, 0.5),
            &Vector3::new(x[X], x[Y], x[THETA]),
            &pose_H(),
            &Matrix::from_diagonal_element(1e-4),
        )
        .unwrap();
        assert!(ekf.state().iter().all(|v| v.is_finite()));
        assert!((ekf.state()[X] - 1.0).abs() < 0.1);
    }

    #[test]
    fn unit_velocity_scenario() {
        let x = Vector::<NS>::from_column_slice(&[0.0, 0.0, 0.0, 1.0, 0.0, 0.0]);
        let mut ekf = Ekf::with_state(NoiseParams::default(), x, initial_covariance(), 0.0);

        ekf.predict(1.0);
        let expected = Vector::<NS>::from_column_slice(&[1.0, 0.0, 0.0, 1.0, 0.0, 0.0]);
        assert_relative_eq!(*ekf.state(), expected, epsilon = 1e-12);

        ekf.update(
            &Vector2::new(1.0, 0.0),
            &Vector2::new(ekf.state()[V], ekf.state()[OMEGA]),
            &velocity_H(),
            &Matrix::from_diagonal_element(1e-4),
        )
        .unwrap();
        assert_relative_eq!(*ekf.state(), expected, epsilon = 1e-12);
    }

    #[test]
    fn reset_restores_initial_covariance() {
        let mut ekf = moving();
        ekf.predict(20.0);
        ekf.reset(1.0, 2.0, 0.5);
        let expected = Vector::<NS>::from_column_slice(&[1.0, 2.0, 0.5, 0.0, 0.0, 0.0]);
        assert_eq!(*ekf.state(), expected);
        assert_eq!(*ekf.covariance(), initial_covariance());
    }
}
