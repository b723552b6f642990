use std::fs;

use config::{ConfigError, NoiseParams};
use prelude::*;

pub static CONFIG_FILE: &'static str = "simulator.toml";

#[derive(Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    /// Simulated duration in seconds.
    pub t: float,
    pub dt: float,
    pub real_time: bool,
    pub seed: u64,
    pub locator_config: String,
    pub noise_file: String,
    /// Replaces the stored noise parameters, which are then saved back.
    pub noise_override: Option<NoiseParams>,
    pub robot: Robot,
    pub odometry: Odometry,
    pub gnss: Gnss,
}

#[derive(Deserialize)]
#[serde(default)]
pub struct Robot {
    pub linear: float,
    pub angular: float,
    /// Seconds between reversals of the turning direction.
    pub turn_period: float,
}

#[derive(Deserialize)]
#[serde(default)]
pub struct Odometry {
    pub period: float,
    pub samples_per_batch: usize,
    pub linear_noise: float,
    pub angular_noise: float,
}

#[derive(Deserialize)]
#[serde(default)]
pub struct Gnss {
    pub period: float,
    pub quality: i32,
    pub position_noise: float,
    /// Degrees.
    pub heading_noise: float,
}

impl Default for SimulatorConfig {
    fn default() -> SimulatorConfig {
        SimulatorConfig {
            t: 60.0,
            dt: 0.01,
            real_time: false,
            seed: 0,
            locator_config: config::LOCATOR_FILE.to_string(),
            noise_file: config::NOISE_FILE.to_string(),
            noise_override: None,
            robot: Robot::default(),
            odometry: Odometry::default(),
            gnss: Gnss::default(),
        }
    }
}

impl Default for Robot {
    fn default() -> Robot {
        Robot {
            linear: 0.3,
            angular: 0.1,
            turn_period: 20.0,
        }
    }
}

impl Default for Odometry {
    fn default() -> Odometry {
        Odometry {
            period: 0.05,
            samples_per_batch: 2,
            linear_noise: 0.01,
            angular_noise: 0.01,
        }
    }
}

impl Default for Gnss {
    fn default() -> Gnss {
        Gnss {
            period: 1.0,
            quality: 4,
            position_noise: 0.02,
            heading_noise: 0.5,
        }
    }
}

impl SimulatorConfig {
    pub fn load() -> Result<SimulatorConfig, ConfigError> {
        let config_str = fs::read_to_string(CONFIG_FILE)?;
        Ok(toml::from_str(&config_str)?)
    }
}
