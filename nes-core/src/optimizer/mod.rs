use std::fmt::Debug;

use hashbrown::HashMap;

use crate::matrix::{Float, Matrix};

#[derive(Clone, Default, PartialEq)]
/// Named scores a fitness function can hand back as its auxiliary output
pub struct ScoreLogger {
    /// Score name to score value
    counts: HashMap<String, f64>,
}

impl ScoreLogger {
    /// Returns a new ScoreLogger
    pub fn new(counts_opt: Option<HashMap<String, f64>>) -> ScoreLogger {
        ScoreLogger {
            counts: counts_opt.unwrap_or_else(HashMap::new),
        }
    }

    #[inline]
    /// Adds a score
    pub fn insert(&mut self, key: &str, value: f64) -> () {
        self.counts.insert(key.to_string(), value);
    }

    #[inline]
    /// Gets a score
    pub fn get(&self, key: &str) -> Option<f64> {
        self.counts.get(key).copied()
    }

    /// Adds all the scores from the source logger to this one
    pub fn update(&mut self, source_logger: &ScoreLogger, weight_opt: Option<f64>) -> () {
        let weight = weight_opt.unwrap_or(1.0);
        for (k, v) in source_logger.counts.iter() {
            let e = self.counts.entry(k.clone()).or_insert(0.);
            *e += weight * v;
        }
    }

    /// Iterates over the logged scores
    pub fn iter(&self) -> impl Iterator<Item = (&String, &f64)> {
        self.counts.iter()
    }
}

impl Debug for ScoreLogger {
    /// Prints the scores
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        // sort counts
        let mut data: Vec<(&String, &f64)> = self.counts.iter().collect();
        data.sort_by_key(|(k, _v)| *k);
        write!(f, "{:?}", data)
    }
}

/// Fitness function scoring candidate parameter vectors.  It is called
/// concurrently from many workers, so it must not rely on shared mutable state.
pub trait Environment<T: Float>: Send + Sync {
    /// Problem specific output returned alongside the fitness
    type Aux: Clone + Debug + Send + Sync;

    /// Scores a parameter vector.  Lower is better.
    fn eval(&self, vector: &[T]) -> (f64, Self::Aux);
}

#[derive(Clone, Debug)]
/// A candidate and its score
pub struct Individual<T, A> {
    /// Full width parameter vector, `width x 1`
    pub vector: Matrix<T>,
    /// Latest fitness computed; infinite until scored
    pub fitness: f64,
    /// Output of the last evaluation
    pub aux: Option<A>,
}

impl<T: Float, A> Individual<T, A> {
    /// An unscored individual of the given width
    pub fn unscored(width: usize) -> Self {
        Individual {
            vector: Matrix::zeros(width, 1),
            fitness: std::f64::INFINITY,
            aux: None,
        }
    }

    /// Evaluates the individual's vector, storing fitness and auxiliary output
    pub fn score<E>(&mut self, env: &E) -> ()
    where
        E: Environment<T, Aux = A>,
    {
        let (fitness, aux) = env.eval(&self.vector.data);
        self.fitness = fitness;
        self.aux = Some(aux);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Norm;

    impl Environment<f32> for Norm {
        type Aux = ScoreLogger;

        fn eval(&self, v: &[f32]) -> (f64, ScoreLogger) {
            let mut logger = ScoreLogger::new(None);
            logger.insert("len", v.len() as f64);
            (v.iter().map(|x| (x * x) as f64).sum(), logger)
        }
    }

    #[test]
    fn test_score() {
        let mut ind = Individual::unscored(3);
        assert!(ind.fitness.is_infinite());
        ind.vector = Matrix::column(vec![1f32, 2., 2.]);
        ind.score(&Norm);
        assert_eq!(ind.fitness, 9.);
        assert_eq!(ind.aux.unwrap().get("len"), Some(3.));
    }

    #[test]
    fn test_logger_update() {
        let mut a = ScoreLogger::new(None);
        a.insert("x", 1.);
        let mut b = ScoreLogger::new(None);
        b.insert("x", 2.);
        b.insert("y", 4.);
        a.update(&b, Some(0.5));
        assert_eq!(a.get("x"), Some(2.));
        assert_eq!(a.get("y"), Some(2.));
        assert_eq!(format!("{:?}", a), "[(\"x\", 2.0), (\"y\", 2.0)]");
    }
}
