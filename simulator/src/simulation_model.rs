use rand::Rng;

use config::AntennaOffset;
use geodesy::{self, GeoPoint};
use locator::{GnssRecord, Pose, VelocitySample};
use prelude::*;

use crate::settings::SimulatorConfig;

/// Ground truth unicycle robot in the local frame.
pub struct SimulatedRobot {
    pub pose: Pose,
    pub linear: float,
    pub angular: float,
    t: float,
}

impl SimulatedRobot {
    pub fn new(pose: Pose) -> SimulatedRobot {
        SimulatedRobot {
            pose,
            linear: 0.0,
            angular: 0.0,
            t: 0.0,
        }
    }

    pub fn step(&mut self, dt: float, config: &SimulatorConfig) {
        self.t += dt;

        let robot = &config.robot;
        let reversals = (self.t / robot.turn_period).floor() as i64;
        self.linear = robot.linear;
        self.angular = if reversals % 2 == 0 {
            robot.angular
        } else {
            -robot.angular
        };

        let (sin_yaw, cos_yaw) = self.pose.yaw.sin_cos();
        self.pose.x += self.linear * cos_yaw * dt;
        self.pose.y += self.linear * sin_yaw * dt;
        self.pose.yaw += self.angular * dt;
    }

    pub fn odometry<R: Rng>(&self, rng: &mut R, config: &SimulatorConfig) -> Vec<VelocitySample> {
        let odometry = &config.odometry;
        (0..odometry.samples_per_batch)
            .map(|_| VelocitySample {
                linear: self.linear + randn(rng) * odometry.linear_noise,
                angular: self.angular + randn(rng) * odometry.angular_noise,
            })
            .collect()
    }

    /// Fix as reported by an antenna mounted at `offset`.
    pub fn gnss<R: Rng>(
        &self,
        rng: &mut R,
        reference: &GeoPoint,
        offset: &AntennaOffset,
        config: &SimulatorConfig,
    ) -> geodesy::Result<GnssRecord> {
        let gnss = &config.gnss;
        let (sin_yaw, cos_yaw) = self.pose.yaw.sin_cos();
        let antenna = (
            self.pose.x + offset.forward * cos_yaw - offset.left * sin_yaw + randn(rng) * gnss.position_noise,
            self.pose.y + offset.forward * sin_yaw + offset.left * cos_yaw + randn(rng) * gnss.position_noise,
        );
        let location = geodesy::to_wgs84(reference, antenna)?;

        let yaw = self.pose.yaw + (randn(rng) * gnss.heading_noise).to_radians();
        let heading = (-yaw).to_degrees().rem_euclid(360.0);

        Ok(GnssRecord {
            location,
            heading,
            quality: gnss.quality,
            latitude_accuracy: Some(gnss.position_noise),
            longitude_accuracy: Some(gnss.position_noise),
            heading_accuracy: Some(gnss.heading_noise),
        })
    }
}
