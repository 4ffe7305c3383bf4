//! One-shot density fits over class labeled data
//!
//! Each label gets its own factorization, fit with the inverse enabled.  A vector
//! is classified by stochastic reverse projection: it is mapped back into each
//! class's noise space, every noise coordinate is scaled by a fresh standard
//! normal, and the result is projected forward again.  The class whose
//! reconstruction lands closest wins the round; the most voted class wins.

use rand::Rng;

use crate::dispatch::Dispatcher;
use crate::gaussian::{self, standard_normal, Factorization, FACTOR_ETA};
use crate::matrix::{Float, Matrix};

#[derive(Serialize, Deserialize, Clone, Debug)]
/// A fitted distribution per label
pub struct DensityClassifier<T> {
    classes: Vec<Factorization<T>>,
}

fn squared_distance<T: Float>(x: &[T], y: &[T]) -> T {
    x.iter().zip(y).map(|(a, b)| (*a - *b) * (*a - *b)).sum()
}

impl<T: Float> DensityClassifier<T> {
    /// Fits one distribution per label.  `classes[label]` holds that label's
    /// samples, each `size` wide.  A label without samples gets a zero mean.
    /// `A` is always fit with `FACTOR_ETA`; `eta` steps the inverse.
    pub fn fit<R: Rng>(
        classes: &[Vec<Vec<T>>],
        size: usize,
        cutoff: f64,
        eta: f64,
        rng: &mut R,
    ) -> Self {
        let classes = classes
            .iter()
            .enumerate()
            .map(|(label, samples)| {
                let (f, report) =
                    gaussian::fit_staged(samples, size, cutoff, FACTOR_ETA, eta, true, rng);
                debug!("Label {}: {:?}", label, report);
                f
            })
            .collect();
        DensityClassifier { classes }
    }

    #[inline]
    /// Number of labels
    pub fn labels(&self) -> usize {
        self.classes.len()
    }

    #[inline]
    /// Fitted distribution of each label
    pub fn factorizations(&self) -> &[Factorization<T>] {
        &self.classes
    }

    /// Largest `A * AI^T` deviation from identity across labels
    pub fn calibration(&self) -> T {
        self.classes
            .iter()
            .filter_map(|f| f.inverse_residual())
            .fold(T::zero(), |acc, r| if r > acc { r } else { acc })
    }

    /// A single stochastic vote for `x`.  None when there are no labels.
    pub fn vote<R: Rng>(&self, x: &[T], rng: &mut R) -> Option<usize> {
        let mut best = (None, None);
        for (label, f) in self.classes.iter().enumerate() {
            let reverse = match f.whiten(x) {
                Some(z) => z,
                None => continue,
            };
            let noise = reverse.hadamard(&standard_normal(f.size(), rng));
            let forward = f.project(&Matrix::row(noise.into_vec()));
            let d = squared_distance(x, &forward.data);
            match best.1 {
                Some(min) if d >= min => (),
                _ => best = (Some(label), Some(d)),
            }
        }
        best.0
    }

    /// Votes on every vector over `rounds` independent rounds run in parallel,
    /// returning per vector counts indexed by label.
    pub fn votes<R: Rng>(
        &self,
        xs: &[Vec<T>],
        rounds: usize,
        dispatcher: &Dispatcher,
        rng: &mut R,
    ) -> Vec<Vec<u64>> {
        let histograms = dispatcher.map(rounds, rng, |_round, rng| {
            xs.iter().map(|x| self.vote(x, rng)).collect::<Vec<_>>()
        });

        let mut counts = vec![vec![0u64; self.labels()]; xs.len()];
        for h in histograms {
            for (c, label) in counts.iter_mut().zip(h) {
                if let Some(label) = label {
                    c[label] += 1;
                }
            }
        }
        counts
    }

    /// Most voted label of every vector; ties go to the lower label.  None for a
    /// vector that received no votes.
    pub fn classify<R: Rng>(
        &self,
        xs: &[Vec<T>],
        rounds: usize,
        dispatcher: &Dispatcher,
        rng: &mut R,
    ) -> Vec<Option<usize>> {
        self.votes(xs, rounds, dispatcher, rng)
            .into_iter()
            .map(|c| {
                let mut best: Option<usize> = None;
                for (label, n) in c.iter().enumerate() {
                    match best {
                        Some(b) if *n <= c[b] => (),
                        _ if *n == 0 => (),
                        _ => best = Some(label),
                    }
                }
                best
            })
            .collect()
    }
}
