//! Example Environments
use std::f64;

use nes_core::matrix::Float;
use nes_core::optimizer::{Environment, ScoreLogger};

/// Two dimensional Matyas function.  Minimum of 0 at the origin; extra
/// coordinates are ignored.
pub struct MatyasEnv;

impl<T: Float> Environment<T> for MatyasEnv {
    type Aux = ();

    fn eval(&self, vector: &[T]) -> (f64, ()) {
        let x = vector.get(0).map(|v| v.to_f64()).unwrap_or(0.);
        let y = vector.get(1).map(|v| v.to_f64()).unwrap_or(0.);
        (0.26 * (x.powi(2) + y.powi(2)) - 0.48 * x * y, ())
    }
}

/// N dimensional Ackley function.  Minimum of 0 at the origin.
pub struct AckleyEnv;

impl<T: Float> Environment<T> for AckleyEnv {
    type Aux = ();

    fn eval(&self, vector: &[T]) -> (f64, ()) {
        if vector.is_empty() {
            return (0., ());
        }
        let n = vector.len() as f64;
        let tau = 2. * f64::consts::PI;
        let (sq, cos) = vector.iter().fold((0., 0.), |(sq, cos), v| {
            let v = v.to_f64();
            (sq + v * v, cos + (tau * v).cos())
        });
        let ack = -20. * (-0.2 * (sq / n).sqrt()).exp() - (cos / n).exp() + f64::consts::E + 20.;

        // Rounding can leave the optimum a hair below zero
        (ack.max(0.), ())
    }
}

/// Squared distance to a fixed target vector
pub struct TargetEnv {
    target: Vec<f64>,
}

impl TargetEnv {
    /// Create a new TargetEnv
    pub fn new(target: Vec<f64>) -> Self {
        TargetEnv { target }
    }

    /// Target of length `width` counting up from 1
    pub fn ascending(width: usize) -> Self {
        TargetEnv::new((1..=width).map(|i| i as f64).collect())
    }
}

impl<T: Float> Environment<T> for TargetEnv {
    type Aux = ScoreLogger;

    fn eval(&self, vector: &[T]) -> (f64, ScoreLogger) {
        let mut logger = ScoreLogger::new(None);
        let mut l2 = 0.;
        let mut max_error: f64 = 0.;
        for (v, t) in vector.iter().zip(self.target.iter()) {
            let d = (v.to_f64() - t).abs();
            l2 += d * d;
            max_error = max_error.max(d);
        }
        logger.insert("l2", l2.sqrt());
        logger.insert("max_error", max_error);
        (l2, logger)
    }
}
