//! Multivariate Gaussian fitting
//!
//! Estimates the empirical mean and covariance of a sample set, then finds a
//! sampling matrix `A` with `A * A^T ≈ Cov` by gradient descent.  Descent uses
//! adaptive first and second moment estimates with the gradient clipped to unit
//! norm.  Optionally a second matrix `AI` is trained against `A * AI^T ≈ I` so
//! observed vectors can be mapped back into noise space.
//!
//! Neither stage is exact: each stops at a loss cutoff or an iteration cap, and a
//! diverging step keeps the last finite estimate.

use rand::distributions::StandardNormal;
use rand::Rng;

use crate::matrix::{Float, Matrix};

/// Exponential decay rate of the first moment estimates
pub const B1: f64 = 0.8;

/// Exponential decay rate of the second moment estimates
pub const B2: f64 = 0.89;

/// Iteration cap when fitting `A`
pub const FACTOR_ITERATIONS: usize = 1024;

/// Iteration cap when fitting `AI`
pub const INVERSE_ITERATIONS: usize = 16 * 1024;

/// Passing this as the cutoff disables early stopping
pub const NO_CUTOFF: f64 = -1.0;

/// Step size of the `A` stage when fitting class densities
pub const FACTOR_ETA: f64 = 1e-3;

const EPSILON: f64 = 1e-8;

#[derive(Serialize, Deserialize, Clone, Debug)]
/// A fitted distribution: draws are `A * g + mean` for standard normal `g`
pub struct Factorization<T> {
    /// Sampling matrix, `size x size`
    pub a: Matrix<T>,
    /// Approximate inverse, present when requested
    pub ai: Option<Matrix<T>>,
    /// Empirical mean, `size x 1`
    pub mean: Matrix<T>,
}

#[derive(Clone, Debug, Default, PartialEq)]
/// How a single descent stage ended
pub struct Descent {
    /// Steps taken
    pub iterations: usize,
    /// Last finite loss observed
    pub loss: f64,
    /// Whether the stage stopped on a NaN or infinite loss
    pub diverged: bool,
}

#[derive(Clone, Debug, Default, PartialEq)]
/// Diagnostics for a call to `fit_report`
pub struct FitReport {
    /// The `A * A^T ≈ Cov` stage
    pub factor: Descent,
    /// The `A * AI^T ≈ I` stage, when run
    pub inverse: Option<Descent>,
}

impl<T: Float> Factorization<T> {
    #[inline]
    /// Dimension of the fitted distribution
    pub fn size(&self) -> usize {
        self.mean.rows
    }

    /// Projects a `1 x size` noise row into a `size x 1` draw
    pub fn project(&self, noise: &Matrix<T>) -> Matrix<T> {
        self.a.multiply_transpose(noise).add(&self.mean)
    }

    /// Draws a new vector from the fitted distribution
    pub fn sample<R: Rng>(&self, rng: &mut R) -> Matrix<T> {
        self.project(&standard_normal(self.size(), rng))
    }

    /// Maps an observed vector back into noise space, `AI^T * (x - mean)`.  None
    /// when the inverse was not fitted.
    pub fn whiten(&self, x: &[T]) -> Option<Matrix<T>> {
        self.ai.as_ref().map(|ai| {
            let centered = Matrix::row(x.to_vec()).subtract(&self.mean);
            ai.transpose().multiply_transpose(&centered)
        })
    }

    /// Largest deviation of `A * AI^T` from the identity
    pub fn inverse_residual(&self) -> Option<T> {
        self.ai.as_ref().map(|ai| {
            self.a
                .multiply_transpose(ai)
                .subtract(&Matrix::identity(self.size()))
                .max_abs()
        })
    }
}

/// Draws a `1 x size` row of independent standard normals
pub fn standard_normal<T: Float, R: Rng>(size: usize, rng: &mut R) -> Matrix<T> {
    let data = (0..size)
        .map(|_| T::from_f64(rng.sample(StandardNormal)))
        .collect();
    Matrix::row(data)
}

/// Computes the empirical mean (`size x 1`) and covariance (`size x size`) of the
/// samples, normalized by the sample count.  An empty set gives zeros.
pub fn moments<T: Float>(samples: &[Vec<T>], size: usize) -> (Matrix<T>, Matrix<T>) {
    let mut avg = vec![T::zero(); size];
    for s in samples {
        assert_eq!(s.len(), size, "sample of length {} in a set of size {}", s.len(), size);
        for (a, v) in avg.iter_mut().zip(s) {
            *a += *v;
        }
    }

    let mut cov = vec![T::zero(); size * size];
    if !samples.is_empty() {
        let n = T::from_f64(samples.len() as f64);
        for a in avg.iter_mut() {
            *a /= n;
        }

        for s in samples {
            for i in 0..size {
                let d1 = avg[i] - s[i];
                for j in 0..size {
                    cov[i * size + j] += d1 * (avg[j] - s[j]);
                }
            }
        }
        for c in cov.iter_mut() {
            *c /= n;
        }
    }

    (Matrix::column(avg), Matrix::new(size, size, cov))
}

// Variance preserving initialization
fn init_weights<T: Float, R: Rng>(size: usize, rng: &mut R) -> Matrix<T> {
    let factor = (2.0 / size as f64).sqrt();
    let data = (0..size * size)
        .map(|_| {
            let n: f64 = rng.sample(StandardNormal);
            T::from_f64(n * factor)
        })
        .collect();
    Matrix::new(size, size, data)
}

// Adaptive moment estimation over a single weight matrix
struct Adam<T> {
    m: Vec<T>,
    v: Vec<T>,
    eta: T,
    step: i32,
}

impl<T: Float> Adam<T> {
    fn new(n: usize, eta: f64) -> Self {
        Adam {
            m: vec![T::zero(); n],
            v: vec![T::zero(); n],
            eta: T::from_f64(eta),
            step: 0,
        }
    }

    fn update(&mut self, w: &mut Matrix<T>, grad: &Matrix<T>) -> () {
        self.step += 1;
        let pow = |x: f64| {
            let y = x.powi(self.step);
            if y.is_finite() {
                y
            } else {
                0.
            }
        };
        let (b1, b2) = (T::from_f64(pow(B1)), T::from_f64(pow(B2)));

        // Clip to unit norm
        let norm = grad.sum_squares().to_f64().sqrt();
        let scaling = T::from_f64(if norm > 1. { 1. / norm } else { 1. });

        let (beta1, beta2) = (T::from_f64(B1), T::from_f64(B2));
        let one = T::one();
        for (i, d) in grad.data.iter().enumerate() {
            let g = *d * scaling;
            let m = beta1 * self.m[i] + (one - beta1) * g;
            let v = beta2 * self.v[i] + (one - beta2) * g * g;
            self.m[i] = m;
            self.v[i] = v;
            let mhat = m / (one - b1);
            let mut vhat = v / (one - b2);
            if vhat < T::zero() {
                vhat = T::zero();
            }
            w.data[i] -= self.eta * mhat / (vhat.sqrt() + T::from_f64(EPSILON));
        }
    }
}

// Minimizes the loss returned by `objective` over `w`.  Stops at the iteration cap,
// when the loss drops below the cutoff, or on divergence, in which case `w` is
// restored to the last weights with a finite loss.
fn descend<T, F>(
    w: &mut Matrix<T>,
    eta: f64,
    cutoff: f64,
    max_iterations: usize,
    objective: F,
) -> Descent
where
    T: Float,
    F: Fn(&Matrix<T>) -> (T, Matrix<T>),
{
    let mut adam = Adam::new(w.data.len(), eta);
    let mut last_good = w.clone();
    let mut report = Descent::default();
    loop {
        let (cost, grad) = objective(w);
        let cost = cost.to_f64();
        if !cost.is_finite() {
            debug!(
                "Descent diverged at iteration {} with loss {}",
                report.iterations, cost
            );
            w.data.copy_from_slice(&last_good.data);
            report.diverged = true;
            break;
        }
        report.loss = cost;
        last_good.data.copy_from_slice(&w.data);

        adam.update(w, &grad);
        report.iterations += 1;
        if report.iterations >= max_iterations || (cutoff != NO_CUTOFF && cost < cutoff) {
            break;
        }
    }
    report
}

/// Fits a factorization to the samples.  See `fit_report`.
pub fn fit<T: Float, R: Rng>(
    samples: &[Vec<T>],
    size: usize,
    cutoff: f64,
    eta: f64,
    invert: bool,
    rng: &mut R,
) -> Factorization<T> {
    fit_report(samples, size, cutoff, eta, invert, rng).0
}

/// Fits `A` so that `A * A^T` approximates the sample covariance, and, when
/// `invert` is set, `AI` so that `A * AI^T` approximates the identity.  `cutoff`
/// stops either stage once its squared error loss falls below it; `NO_CUTOFF`
/// always runs to the iteration cap.  `eta` is the step size of both stages.
pub fn fit_report<T: Float, R: Rng>(
    samples: &[Vec<T>],
    size: usize,
    cutoff: f64,
    eta: f64,
    invert: bool,
    rng: &mut R,
) -> (Factorization<T>, FitReport) {
    fit_staged(samples, size, cutoff, eta, eta, invert, rng)
}

/// As `fit_report`, with separate step sizes for the `A` and `AI` stages.  A
/// size of zero gives empty matrices without descending.
pub fn fit_staged<T: Float, R: Rng>(
    samples: &[Vec<T>],
    size: usize,
    cutoff: f64,
    factor_eta: f64,
    inverse_eta: f64,
    invert: bool,
    rng: &mut R,
) -> (Factorization<T>, FitReport) {
    if size == 0 {
        let empty = Factorization {
            a: Matrix::zeros(0, 0),
            ai: if invert { Some(Matrix::zeros(0, 0)) } else { None },
            mean: Matrix::zeros(0, 1),
        };
        let report = FitReport {
            factor: Descent::default(),
            inverse: if invert { Some(Descent::default()) } else { None },
        };
        return (empty, report);
    }

    let (mean, cov) = moments(samples, size);
    trace!("u={:?}", mean.data);
    trace!("K={:?}", cov.data);

    let mut a = init_weights(size, rng);
    let mut ai = if invert {
        Some(init_weights(size, rng))
    } else {
        None
    };

    let factor = descend(&mut a, factor_eta, cutoff, FACTOR_ITERATIONS, |a: &Matrix<T>| {
        let r = a.multiply_transpose(a).subtract(&cov);
        let grad = r
            .add(&r.transpose())
            .multiply_transpose(&a.transpose())
            .scale(T::from_f64(2.));
        (r.sum_squares(), grad)
    });
    debug!(
        "Factor of size {} stopped after {} iterations at loss {}",
        size, factor.iterations, factor.loss
    );

    let inverse = ai.as_mut().map(|ai| {
        let identity = Matrix::identity(size);
        let at = a.transpose();
        let report = descend(ai, inverse_eta, cutoff, INVERSE_ITERATIONS, |ai: &Matrix<T>| {
            let r = a.multiply_transpose(ai).subtract(&identity);
            let grad = r
                .transpose()
                .multiply_transpose(&at)
                .scale(T::from_f64(2.));
            (r.sum_squares(), grad)
        });
        debug!(
            "Inverse of size {} stopped after {} iterations at loss {}",
            size, report.iterations, report.loss
        );
        report
    });

    (
        Factorization { a, ai, mean },
        FitReport { factor, inverse },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_xorshift::XorShiftRng;

    fn cross() -> Vec<Vec<f64>> {
        vec![
            vec![2., 0.],
            vec![0., 2.],
            vec![-2., 0.],
            vec![0., -2.],
        ]
    }

    #[test]
    fn test_moments() {
        let (u, k) = moments(&cross(), 2);
        assert_eq!(u.shape(), (2, 1));
        assert_eq!(u.data, vec![0., 0.]);
        assert_eq!(k.data, vec![2., 0., 0., 2.]);
    }

    #[test]
    fn test_identical_samples() {
        let v = vec![1.5f64, -2., 0.25];
        let samples = vec![v.clone(); 5];
        let (u, k) = moments(&samples, 3);
        assert_eq!(u.data, v);
        assert!(k.max_abs() < 1e-12);

        let mut rng = XorShiftRng::seed_from_u64(1234);
        let f = fit(&samples, 3, 1e-4, 0.1, false, &mut rng);
        // Zero noise reproduces the mean exactly
        let draw = f.project(&Matrix::zeros(1, 3));
        assert_eq!(draw.data, v);
    }

    #[test]
    fn test_empty_samples() {
        let mut rng = XorShiftRng::seed_from_u64(7);
        let (f, report) = fit_report::<f32, _>(&[], 4, 1e-4, 0.1, false, &mut rng);
        assert_eq!(f.mean.data, vec![0.; 4]);
        assert!(f.ai.is_none());
        assert!(report.inverse.is_none());
        assert!(f.a.data.iter().all(|x| x.is_finite()));
    }

    #[test]
    fn test_fit_cross() {
        let mut rng = XorShiftRng::seed_from_u64(11);
        let (f, report) = fit_report(&cross(), 2, NO_CUTOFF, 1e-2, false, &mut rng);
        assert_eq!(report.factor.iterations, FACTOR_ITERATIONS);
        let residual = f
            .a
            .multiply_transpose(&f.a)
            .subtract(&Matrix::identity(2).scale(2.))
            .max_abs();
        assert!(residual < 0.15, "residual {}", residual);
    }

    #[test]
    fn test_fit_inverse() {
        let mut rng = XorShiftRng::seed_from_u64(3);
        let (f, report) = fit_report(&cross(), 2, 1e-6, 1e-3, true, &mut rng);
        assert!(report.inverse.is_some());
        let residual = f.inverse_residual().unwrap();
        assert!(residual < 0.05, "residual {}", residual);

        // A draw maps back onto its noise
        let g = Matrix::row(vec![0.5, -1.]);
        let x = f.project(&g);
        let z = f.whiten(&x.data).unwrap();
        for (a, b) in z.data.iter().zip(&g.data) {
            assert!((a - b).abs() < 0.2, "{} != {}", a, b);
        }
    }

    #[test]
    fn test_divergence_keeps_finite() {
        let mut rng = XorShiftRng::seed_from_u64(5);
        let samples: Vec<Vec<f32>> = vec![vec![1., 2.], vec![2., 1.], vec![0., 0.]];
        let (f, report) = fit_report(&samples, 2, NO_CUTOFF, 1e20, false, &mut rng);
        assert!(report.factor.diverged);
        assert!(report.factor.iterations < FACTOR_ITERATIONS);
        assert!(f.a.data.iter().all(|x| x.is_finite()));

        // The first step blows up, so the initial weights come back
        assert_eq!(report.factor.iterations, 1);
        let mut rng = XorShiftRng::seed_from_u64(5);
        assert_eq!(f.a, init_weights::<f32, _>(2, &mut rng));
    }

    #[test]
    fn test_zero_size() {
        let mut rng = XorShiftRng::seed_from_u64(2);
        let (f, report) = fit_report::<f64, _>(&[], 0, 1e-4, 0.1, true, &mut rng);
        assert_eq!(f.size(), 0);
        assert_eq!(f.a.shape(), (0, 0));
        assert_eq!(f.inverse_residual(), Some(0.));
        assert_eq!(report.inverse, Some(Descent::default()));
        assert_eq!(f.sample(&mut rng).shape(), (0, 1));
    }

    #[test]
    fn test_staged_step_sizes() {
        // `A` only depends on the factor step; `AI` is drawn after it
        let mut rng = XorShiftRng::seed_from_u64(21);
        let (plain, _) = fit_report(&cross(), 2, NO_CUTOFF, 1e-2, false, &mut rng);
        let mut rng = XorShiftRng::seed_from_u64(21);
        let (staged, report) = fit_staged(&cross(), 2, NO_CUTOFF, 1e-2, 1e-3, true, &mut rng);
        assert_eq!(plain.a, staged.a);
        assert!(report.inverse.is_some());

        let mut rng = XorShiftRng::seed_from_u64(21);
        let (other, _) = fit_staged(&cross(), 2, NO_CUTOFF, FACTOR_ETA, 1e-2, false, &mut rng);
        assert!(other.a != plain.a);
    }

    #[test]
    fn test_sample_shape() {
        let mut rng = XorShiftRng::seed_from_u64(9);
        let f = fit(&cross(), 2, 1e-4, 0.1, false, &mut rng);
        let s = f.sample(&mut rng);
        assert_eq!(s.shape(), (2, 1));
        assert!(f.whiten(&s.data).is_none());
    }
}
