#![allow(non_snake_case)]

#[cfg(test)]
#[macro_use]
extern crate approx;
extern crate config;
#[macro_use]
extern crate log;
extern crate prelude;
extern crate thiserror;

use thiserror::Error;

mod ekf;
pub use ekf::Ekf;

/// Number of states: x, y, theta, v, omega, a.
pub const NS: usize = 6;

pub const X: usize = 0;
pub const Y: usize = 1;
pub const THETA: usize = 2;
pub const V: usize = 3;
pub const OMEGA: usize = 4;
pub const A: usize = 5;

/// Standard deviation of every state after a reset.
pub const INITIAL_STD_DEV: prelude::float = 0.01;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EstimatorError {
    #[error("innovation covariance is not invertible")]
    SingularCovariance,
    #[error("measurement residual is not finite")]
    NonFiniteMeasurement,
}

pub type Result<T> = std::result::Result<T, EstimatorError>;
