pub extern crate flame;
pub extern crate nalgebra;
extern crate rand;
extern crate rand_distr;

use rand::Rng;
use rand_distr::StandardNormal;

#[allow(non_camel_case_types)]
pub type float = f64;
pub use std::f64::consts::PI;

pub type Matrix<const R: usize, const C: usize> = nalgebra::SMatrix<float, R, C>;
pub type Vector<const N: usize> = nalgebra::SVector<float, N>;

pub fn max<T: Copy + PartialOrd>(a: T, b: T) -> T {
    if b > a {
        b
    } else {
        a
    }
}

/// Returns `b` shifted by whole turns so that it lies within `PI` of `a`.
pub fn phase_unwrap(a: float, mut b: float) -> float {
    if !a.is_finite() || !b.is_finite() {
        return b;
    }
    while b > a + PI {
        b -= 2.0 * PI;
    }
    while b < a - PI {
        b += 2.0 * PI;
    }
    b
}

/// Smallest signed rotation taking heading `a` onto heading `b`, in `[-PI, PI]`.
pub fn angle(a: float, b: float) -> float {
    phase_unwrap(a, b) - a
}

pub fn randn<R: Rng>(rng: &mut R) -> float {
    rng.sample(StandardNormal)
}
