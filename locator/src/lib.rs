//! Robot pose estimation from wheel odometry and GNSS.
//!
//! `RobotLocator` owns an `Ekf` and translates the two measurement streams
//! into filter updates. Each incoming batch predicts once to the current
//! clock time and then corrects with every contained measurement.
//!
//! State: `[x, y, theta, v, omega, a]`.
//!
//! Odometry measurement model:
//!
//! ```text
//! z = [v, omega]
//! H = [0 0 0 1 0 0]
//!     [0 0 0 0 1 0]
//! ```
//!
//! GNSS measurement model:
//!
//! ```text
//! z = [x, y, theta]
//! H = [1 0 0 0 0 0]
//!     [0 1 0 0 0 0]
//!     [0 0 1 0 0 0]
//! ```

#![allow(non_snake_case)]

extern crate config;
extern crate estimator;
extern crate geodesy;
#[macro_use]
extern crate log;
extern crate prelude;
extern crate thiserror;

mod clock;
pub mod dispatch;

pub use clock::{Clock, ManualClock, SystemClock};

use prelude::nalgebra::{Matrix2x6, Matrix3x6, Vector2, Vector3};
use thiserror::Error;

use config::{AntennaOffset, GnssNoiseModel, LocatorConfig, NoiseParams};
use estimator::{Ekf, NS, OMEGA, THETA, V, X, Y};
use geodesy::{GeoPoint, GeodeticError};
use prelude::*;

/// Lower bound on GNSS measurement standard deviations. Receivers report
/// qualities above 4 which would otherwise give zero or negative noise.
pub const MIN_GNSS_NOISE: float = 1e-6;

#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum LocatorError {
    #[error("geodetic conversion failed: {0}")]
    Geodetic(#[from] GeodeticError),
}

pub type Result<T> = std::result::Result<T, LocatorError>;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct VelocitySample {
    pub linear: float,
    pub angular: float,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct GnssRecord {
    pub location: GeoPoint,
    /// Degrees clockwise from north.
    pub heading: float,
    pub quality: i32,
    /// Metres.
    pub latitude_accuracy: Option<float>,
    /// Metres.
    pub longitude_accuracy: Option<float>,
    /// Degrees.
    pub heading_accuracy: Option<float>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Pose {
    pub x: float,
    pub y: float,
    pub yaw: float,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Velocity {
    pub linear: float,
    pub angular: float,
    pub time: float,
}

pub struct RobotLocator<C: Clock = SystemClock> {
    ekf: Ekf,
    clock: C,
    reference: Option<GeoPoint>,
    antenna_offset: AntennaOffset,
    gnss_noise: GnssNoiseModel,
    ignore_odometry: bool,
    ignore_gnss: bool,
}

impl<C: Clock> RobotLocator<C> {
    pub fn new(config: &LocatorConfig, clock: C) -> RobotLocator<C> {
        let ekf = Ekf::new(config.noise, clock.now());
        RobotLocator {
            ekf,
            clock,
            reference: config.reference,
            antenna_offset: config.antenna_offset,
            gnss_noise: config.gnss_noise,
            ignore_odometry: config.ignore_odometry,
            ignore_gnss: config.ignore_gnss,
        }
    }

    /// Position and heading as of the last predict or update.
    pub fn pose(&self) -> Pose {
        let x = self.ekf.state();
        Pose {
            x: x[X],
            y: x[Y],
            yaw: x[THETA],
        }
    }

    pub fn velocity(&self) -> Velocity {
        let x = self.ekf.state();
        Velocity {
            linear: x[V],
            angular: x[OMEGA],
            time: self.ekf.time(),
        }
    }

    pub fn state(&self) -> &Vector<NS> {
        self.ekf.state()
    }

    pub fn covariance(&self) -> &Matrix<NS, NS> {
        self.ekf.covariance()
    }

    pub fn reset(&mut self, x: float, y: float, yaw: float) {
        info!("resetting pose to x={:.3} y={:.3} yaw={:.3}", x, y, yaw);
        self.ekf.reset(x, y, yaw);
    }

    pub fn noise(&self) -> &NoiseParams {
        self.ekf.noise()
    }

    /// Returns true if the parameters differ from the current ones, in which
    /// case the caller should persist them.
    pub fn set_noise(&mut self, noise: NoiseParams) -> bool {
        if *self.ekf.noise() == noise {
            return false;
        }
        self.ekf.set_noise(noise);
        true
    }

    pub fn reference(&self) -> Option<&GeoPoint> {
        self.reference.as_ref()
    }

    pub fn set_reference(&mut self, reference: GeoPoint) -> Result<()> {
        reference.validate()?;
        self.reference = Some(reference);
        Ok(())
    }

    pub fn set_ignore_odometry(&mut self, ignore: bool) {
        self.ignore_odometry = ignore;
    }

    pub fn set_ignore_gnss(&mut self, ignore: bool) {
        self.ignore_gnss = ignore;
    }

    pub fn on_velocity_batch(&mut self, samples: &[VelocitySample]) {
        self.ekf.predict(self.clock.now());
        if self.ignore_odometry {
            return;
        }

        let noise = self.ekf.noise();
        let Q = Matrix::from_diagonal(&Vector2::new(noise.q_odometry_v, noise.q_odometry_omega))
            .map(|q| q * q);

        let mut H = Matrix2x6::zeros();
        H[(0, V)] = 1.0;
        H[(1, OMEGA)] = 1.0;

        for sample in samples {
            let x = self.ekf.state();
            let z = Vector2::new(sample.linear, sample.angular);
            let h = Vector2::new(x[V], x[OMEGA]);
            if let Err(e) = self.ekf.update(&z, &h, &H, &Q) {
                warn!("skipping odometry update: {}", e);
            }
        }
    }

    pub fn on_gnss_fix(&mut self, record: &GnssRecord) -> Result<()> {
        self.ekf.predict(self.clock.now());
        if self.ignore_gnss {
            return Ok(());
        }

        let reference = self.reference.ok_or(GeodeticError::ReferenceUnset)?;
        let x = *self.ekf.state();

        let yaw = -record.heading.to_radians();
        let origin = self.antenna_to_origin(&record.location, x[THETA])?;
        let (x_meas, y_meas) = geodesy::to_local(&reference, &origin)?;
        let theta_meas = x[THETA] + angle(x[THETA], yaw);

        let z = Vector3::new(x_meas, y_meas, theta_meas);
        let h = Vector3::new(x[X], x[Y], x[THETA]);
        let H = Matrix3x6::identity();
        let (r_xy, r_theta) = self.gnss_noise(record);
        let Q = Matrix::from_diagonal(&Vector3::new(r_xy, r_xy, r_theta)).map(|r| r * r);

        if let Err(e) = self.ekf.update(&z, &h, &H, &Q) {
            warn!("skipping gnss update: {}", e);
        }
        Ok(())
    }

    // The antenna sits at `antenna_offset` in the robot frame, so the origin
    // is found by walking the offset backwards along the estimated heading.
    fn antenna_to_origin(&self, antenna: &GeoPoint, yaw: float) -> Result<GeoPoint> {
        let offset = self.antenna_offset;
        if offset.is_zero() {
            return Ok(*antenna);
        }
        let distance = offset.forward.hypot(offset.left);
        let direction = yaw + offset.left.atan2(offset.forward) + PI;
        Ok(geodesy::advance(antenna, distance, direction)?)
    }

    fn gnss_noise(&self, record: &GnssRecord) -> (float, float) {
        let (r_xy, r_theta) = match (
            self.gnss_noise,
            record.latitude_accuracy,
            record.longitude_accuracy,
            record.heading_accuracy,
        ) {
            (GnssNoiseModel::Accuracy, Some(lat), Some(lon), Some(heading)) => {
                ((lat + lon) / 2.0, heading.to_radians())
            }
            _ => {
                let r = 4.0 - record.quality as float;
                (r, r)
            }
        };
        (max(r_xy, MIN_GNSS_NOISE), max(r_theta, MIN_GNSS_NOISE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn locator(config: &LocatorConfig) -> (RobotLocator<ManualClock>, ManualClock) {
        let clock = ManualClock::new(100.0);
        (RobotLocator::new(config, clock.clone()), clock)
    }

    fn record(quality: i32) -> GnssRecord {
        GnssRecord {
            location: GeoPoint::new(51.98, 7.43),
            heading: 0.0,
            quality,
            ..Default::default()
        }
    }

    #[test]
    fn gnss_noise_from_quality_is_clamped() {
        let (l, _) = locator(&LocatorConfig::default());
        assert_eq!(l.gnss_noise(&record(1)), (3.0, 3.0));
        assert_eq!(l.gnss_noise(&record(4)), (MIN_GNSS_NOISE, MIN_GNSS_NOISE));
        assert_eq!(l.gnss_noise(&record(5)), (MIN_GNSS_NOISE, MIN_GNSS_NOISE));
        assert_eq!(l.gnss_noise(&record(i32::MAX)), (MIN_GNSS_NOISE, MIN_GNSS_NOISE));

        let worst = 4.0 - i32::MIN as float;
        assert_eq!(l.gnss_noise(&record(i32::MIN)), (worst, worst));
    }

    #[test]
    fn gnss_noise_from_accuracy() {
        let mut config = LocatorConfig::default();
        config.gnss_noise = GnssNoiseModel::Accuracy;
        let (l, _) = locator(&config);

        let mut r = record(2);
        r.latitude_accuracy = Some(0.02);
        r.longitude_accuracy = Some(0.04);
        r.heading_accuracy = Some(1.0);
        let (r_xy, r_theta) = l.gnss_noise(&r);
        assert!((r_xy - 0.03).abs() < 1e-12);
        assert!((r_theta - 1.0f64.to_radians()).abs() < 1e-12);

        // Falls back to quality when any accuracy is missing
        r.heading_accuracy = None;
        assert_eq!(l.gnss_noise(&r), (2.0, 2.0));
    }

    #[test]
    fn set_noise_reports_changes() {
        let (mut l, _) = locator(&LocatorConfig::default());
        assert!(!l.set_noise(NoiseParams::default()));

        let mut noise = NoiseParams::default();
        noise.r_theta = 0.2;
        assert!(l.set_noise(noise));
        assert_eq!(l.noise().r_theta, 0.2);
        assert!(!l.set_noise(noise));
    }

    #[test]
    fn invalid_reference_is_rejected() {
        let (mut l, _) = locator(&LocatorConfig::default());
        assert!(l.set_reference(GeoPoint::new(-95.0, 0.0)).is_err());
        assert!(l.reference().is_none());
    }

    #[test]
    fn antenna_offset_is_rotated_by_estimated_heading() {
        let reference = GeoPoint::new(51.98, 7.43);
        let mut config = LocatorConfig::default();
        config.reference = Some(reference);
        config.antenna_offset = AntennaOffset {
            forward: 0.0,
            left: 0.5,
        };
        let (l, _) = locator(&config);

        // Facing north the antenna is half a metre west of the origin
        let antenna = geodesy::to_wgs84(&reference, (0.0, 0.5)).unwrap();
        let origin = l.antenna_to_origin(&antenna, 0.0).unwrap();
        let (x, y) = geodesy::to_local(&reference, &origin).unwrap();
        assert!(x.abs() < 1e-6 && y.abs() < 1e-6, "x: {}. y: {}.", x, y);

        // Facing west it is half a metre south
        let antenna = geodesy::to_wgs84(&reference, (-0.5, 0.0)).unwrap();
        let origin = l.antenna_to_origin(&antenna, PI / 2.0).unwrap();
        let (x, y) = geodesy::to_local(&reference, &origin).unwrap();
        assert!(x.abs() < 1e-6 && y.abs() < 1e-6, "x: {}. y: {}.", x, y);
    }
}
