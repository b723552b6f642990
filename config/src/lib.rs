extern crate geodesy;
extern crate prelude;
extern crate serde;
#[macro_use]
extern crate serde_derive;
extern crate thiserror;
extern crate toml;

use std::fs;
use std::io;
use std::path::Path;
use thiserror::Error;

use geodesy::GeoPoint;
use prelude::*;

pub static NOISE_FILE: &'static str = "noise.toml";
pub static LOCATOR_FILE: &'static str = "locator.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("unable to access config file: {0}")]
    Io(#[from] io::Error),

    #[error("unable to deserialise config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("unable to serialise config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Tunable filter noise, persisted as a flat table of named floats.
///
/// `q_odometry_*` are the standard deviations of the wheel odometry velocity
/// measurements. `r_*` are per-state process noise rates which are scaled by
/// the prediction interval before being squared.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoiseParams {
    pub q_odometry_v: float,
    pub q_odometry_omega: float,
    pub r_x: float,
    pub r_y: float,
    pub r_theta: float,
    pub r_v: float,
    pub r_omega: float,
    pub r_a: float,
}

impl Default for NoiseParams {
    fn default() -> NoiseParams {
        NoiseParams {
            q_odometry_v: 0.01,
            q_odometry_omega: 0.01,
            r_x: 0.01,
            r_y: 0.01,
            r_theta: 0.01,
            r_v: 0.01,
            r_omega: 1.0,
            r_a: 1.0,
        }
    }
}

impl NoiseParams {
    /// Process noise rates in state order.
    pub fn process(&self) -> [float; 6] {
        [
            self.r_x,
            self.r_y,
            self.r_theta,
            self.r_v,
            self.r_omega,
            self.r_a,
        ]
    }

    /// Loads noise parameters, falling back to the defaults if the file does
    /// not exist yet.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<NoiseParams> {
        match fs::read_to_string(path) {
            Ok(s) => NoiseParams::from_toml(&s),
            Err(ref e) if e.kind() == io::ErrorKind::NotFound => Ok(NoiseParams::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        fs::write(path, self.to_toml()?)?;
        Ok(())
    }

    pub fn from_toml(s: &str) -> Result<NoiseParams> {
        Ok(toml::from_str(s)?)
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string(self)?)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GnssNoiseModel {
    /// Noise derived from the receiver's fix quality indicator.
    Quality,
    /// Noise from the reported position/heading accuracies when available.
    Accuracy,
}

impl Default for GnssNoiseModel {
    fn default() -> GnssNoiseModel {
        GnssNoiseModel::Quality
    }
}

/// Position of the GNSS antenna relative to the robot's origin, in the robot frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AntennaOffset {
    pub forward: float,
    pub left: float,
}

impl AntennaOffset {
    pub fn is_zero(&self) -> bool {
        self.forward == 0.0 && self.left == 0.0
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocatorConfig {
    pub reference: Option<GeoPoint>,
    pub antenna_offset: AntennaOffset,
    pub gnss_noise: GnssNoiseModel,
    pub ignore_odometry: bool,
    pub ignore_gnss: bool,
    pub noise: NoiseParams,
}

impl LocatorConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<LocatorConfig> {
        let s = fs::read_to_string(path)?;
        Ok(toml::from_str(&s)?)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        fs::write(path, toml::to_string(self)?)?;
        Ok(())
    }
}
