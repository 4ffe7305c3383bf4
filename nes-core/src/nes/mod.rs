//! Optimizer for block factorized Natural Evolutionary Strategies
//!
//! Each generation the wide parameter vector is randomly partitioned into blocks.
//! A gaussian is fit per block to the survivors of the previous generation, new
//! candidates are drawn block by block and scored, and the population is ranked
//! with the best `cut` becoming the next sample set.

use std::f64;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::time::SystemTime;

use float_ord::FloatOrd;
use rand::distributions::StandardNormal;
use rand::{Rng, SeedableRng};
use rand_xorshift::XorShiftRng;

use crate::dispatch::Dispatcher;
use crate::error::{NesError, Result};
use crate::gaussian::{self, Factorization, NO_CUTOFF};
use crate::matrix::{Float, Matrix};
use crate::optimizer::{Environment, Individual};
use crate::partition::PartitionMap;

/// Settings for block factorized Natural ES
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct BlockNatural {
    /// Length of the parameter vector being optimized
    pub width: usize,

    /// Number of blocks the vector is split into each generation
    pub models: usize,

    /// Number of individuals kept in the population
    pub population: usize,

    /// Number of top individuals which survive and seed the next fit
    pub cut: usize,

    /// Loss below which a fit stops early.  -1 disables early stopping.
    pub cutoff: f64,

    /// Step size of the fit
    pub eta: f64,

    /// Maximum number of generations `run` will execute
    pub iterations: usize,

    /// Number of generations between reporting metrics
    pub report_iter: usize,

    /// Seed for the coordinator's random stream
    pub seed: u64,

    /// Worker threads; defaults to one per hardware thread
    pub workers: Option<usize>,

    /// Re-evaluates the surviving elite every generation instead of trusting the
    /// fitness computed when they were born.  Useful for noisy fitness functions.
    pub rescore_elite: bool,

    /// Standard deviation of the random initial state
    pub init_sd: f64,
}

impl Default for BlockNatural {
    fn default() -> Self {
        BlockNatural {
            width: 1,
            models: 1,
            population: 64,
            cut: 8,
            cutoff: 1e-4,
            eta: 1e-1,
            iterations: 1024,
            report_iter: 10,
            seed: 1,
            workers: None,
            rescore_elite: false,
            init_sd: 1.,
        }
    }
}

/// Early exit rules for `BlockNatural::run`
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StopRule {
    /// Runs every iteration
    Budget,

    /// Stops once the best fitness is at or below the target
    Target(f64),

    /// Stops once the best fitness has not changed for this many generations
    Stall(usize),
}

impl StopRule {
    /// Checks the rule can fire meaningfully.  `Stall(0)` is rejected.
    pub fn validate(&self) -> Result<()> {
        match *self {
            StopRule::Stall(0) => Err(NesError::InvalidSettings(
                "stall must be at least 1 generation".to_string(),
            )),
            StopRule::Target(t) if t.is_nan() => Err(NesError::InvalidSettings(
                "target fitness must be a number".to_string(),
            )),
            _ => Ok(()),
        }
    }
}

/// Survivors, ranked individuals, and the coordinator's random stream
pub struct Population<T, A> {
    state: Vec<Vec<T>>,
    individuals: Vec<Individual<T, A>>,
    generation: usize,
    rng: XorShiftRng,
}

impl<T: Float, A> Population<T, A> {
    /// Creates `cut` random survivors drawn from N(0, init_sd^2) and an unscored
    /// population.
    pub fn new(settings: &BlockNatural) -> Self {
        let mut rng = XorShiftRng::seed_from_u64(settings.seed);
        let state = (0..settings.cut)
            .map(|_| {
                (0..settings.width)
                    .map(|_| {
                        let n: f64 = rng.sample(StandardNormal);
                        T::from_f64(n * settings.init_sd)
                    })
                    .collect()
            })
            .collect();
        Population::with_rng(settings, state, rng)
    }

    /// Starts from the given vectors rather than random ones.  Any number may be
    /// given; after the first generation the state is always the top `cut`.
    pub fn from_state(settings: &BlockNatural, state: Vec<Vec<T>>) -> Self {
        let rng = XorShiftRng::seed_from_u64(settings.seed);
        Population::with_rng(settings, state, rng)
    }

    fn with_rng(settings: &BlockNatural, state: Vec<Vec<T>>, rng: XorShiftRng) -> Self {
        assert!(
            state.iter().all(|s| s.len() == settings.width),
            "state vectors must be {} wide",
            settings.width
        );
        Population {
            state,
            individuals: (0..settings.population)
                .map(|_| Individual::unscored(settings.width))
                .collect(),
            generation: 0,
            rng,
        }
    }

    #[inline]
    /// Number of generations run so far
    pub fn generation(&self) -> usize {
        self.generation
    }

    #[inline]
    /// Vectors the next generation's distributions are fit to
    pub fn state(&self) -> &[Vec<T>] {
        &self.state
    }

    #[inline]
    /// Individuals, ranked ascending by fitness once a generation has run
    pub fn individuals(&self) -> &[Individual<T, A>] {
        &self.individuals
    }

    /// Best individual, once a generation has run
    pub fn best(&self) -> Option<&Individual<T, A>> {
        if self.generation > 0 {
            self.individuals.first()
        } else {
            None
        }
    }

    /// Consumes the population, returning the ranked individuals
    pub fn into_individuals(self) -> Vec<Individual<T, A>> {
        self.individuals
    }
}

impl BlockNatural {
    /// Checks the settings for consistency
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: String| Err(NesError::InvalidSettings(msg));
        if self.width == 0 {
            return fail("width must be at least 1".to_string());
        }
        if self.models == 0 || self.models > self.width {
            return fail(format!(
                "models must be between 1 and width ({}), got {}",
                self.width, self.models
            ));
        }
        if self.cut == 0 || self.cut >= self.population {
            return fail(format!(
                "cut must be between 1 and population - 1 ({}), got {}",
                self.population.saturating_sub(1),
                self.cut
            ));
        }
        if !(self.eta > 0.) {
            return fail(format!("eta must be positive, got {}", self.eta));
        }
        if self.cutoff != NO_CUTOFF && !(self.cutoff >= 0.) {
            return fail(format!("cutoff must be -1 or non-negative, got {}", self.cutoff));
        }
        if self.report_iter == 0 {
            return fail("report_iter must be at least 1".to_string());
        }
        if self.workers == Some(0) {
            return fail("workers must be at least 1".to_string());
        }
        Ok(())
    }

    /// Reads settings from JSON; missing fields take their defaults
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let settings: BlockNatural = serde_json::from_reader(reader)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reads settings from a JSON file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let f = File::open(path)?;
        BlockNatural::from_reader(BufReader::new(f))
    }

    /// Runs a single generation: partition, fit each block, sample and score the
    /// regenerated individuals, then rank.  On the first generation every
    /// individual is sampled; afterwards only those past `cut`.  Returns the
    /// ranked population.
    pub fn run_generation<'a, T, E>(
        &self,
        pop: &'a mut Population<T, E::Aux>,
        env: &E,
        dispatcher: &Dispatcher,
    ) -> &'a [Individual<T, E::Aux>]
    where
        T: Float,
        E: Environment<T>,
    {
        let Population {
            ref mut state,
            ref mut individuals,
            ref mut generation,
            ref mut rng,
        } = *pop;
        let width = self.width;

        let partition = PartitionMap::new(width, self.models, rng);

        // Fit every block to the survivors
        let fits: Vec<Factorization<T>> = dispatcher.map(self.models, rng, |block, rng| {
            let samples: Vec<Vec<T>> = state.iter().map(|s| partition.gather(block, s)).collect();
            gaussian::fit(
                &samples,
                partition.coords(block).len(),
                self.cutoff,
                self.eta,
                false,
                rng,
            )
        });

        let split = if *generation == 0 { 0 } else { self.cut };
        let (elite, born) = individuals.split_at_mut(split);

        if self.rescore_elite && !elite.is_empty() {
            dispatcher.for_each(elite, rng, |_i, ind, _rng| ind.score(env));
        }

        // Sample new candidates block by block and score them
        dispatcher.for_each(born, rng, |_i, ind, rng| {
            let mut vector = vec![T::zero(); width];
            for (block, fit) in fits.iter().enumerate() {
                let draw = fit.sample(rng);
                partition.scatter(block, &draw.data, &mut vector);
            }
            ind.vector = Matrix::column(vector);
            ind.score(env);
        });

        // Stable, so ties keep their order
        individuals.sort_by_key(|ind| FloatOrd(ind.fitness));

        state.truncate(self.cut);
        for (i, ind) in individuals.iter().take(self.cut).enumerate() {
            match state.get_mut(i) {
                Some(s) => s.copy_from_slice(&ind.vector.data),
                None => state.push(ind.vector.data.clone()),
            }
        }
        *generation += 1;

        &pop.individuals
    }

    /// Runs generations until the iteration budget is spent or `stop` fires,
    /// returning the best individual found.
    pub fn run<T, E>(&self, env: &E, stop: StopRule) -> Result<Individual<T, E::Aux>>
    where
        T: Float,
        E: Environment<T>,
    {
        self.validate()?;
        stop.validate()?;
        if self.iterations == 0 {
            return Err(NesError::InvalidSettings(
                "iterations must be at least 1".to_string(),
            ));
        }
        let dispatcher = Dispatcher::new(self.workers)?;
        let mut pop = Population::new(self);

        let now = SystemTime::now();
        let mut last = f64::INFINITY;
        let mut stalled = 0;
        for pass in 0..self.iterations {
            let ranked = self.run_generation(&mut pop, env, &dispatcher);
            let best = &ranked[0];

            if pass % self.report_iter == 0 {
                let (s, m) = now
                    .elapsed()
                    .map(|e| (e.as_secs(), e.subsec_millis()))
                    .unwrap_or((0, 0));
                info!(
                    "Time: {}.{:03},\tGeneration: {},\tFitness: {},\t\
                     Worst Survivor: {},\tStats: {:?}",
                    s,
                    m,
                    pass,
                    best.fitness,
                    ranked[self.cut - 1].fitness,
                    best.aux
                );
            }

            let done = match stop {
                StopRule::Budget => false,
                StopRule::Target(target) => best.fitness <= target,
                StopRule::Stall(k) => {
                    if best.fitness == last {
                        stalled += 1;
                    } else {
                        stalled = 0;
                    }
                    stalled >= k
                }
            };
            last = best.fitness;
            if done {
                info!("Stopped at generation {} with fitness {}", pass, best.fitness);
                break;
            }
        }

        let mut ranked = pop.into_individuals();
        Ok(ranked.swap_remove(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Sphere;

    impl Environment<f64> for Sphere {
        type Aux = ();

        fn eval(&self, v: &[f64]) -> (f64, ()) {
            (v.iter().map(|x| (x - 1.).powi(2)).sum(), ())
        }
    }

    fn settings() -> BlockNatural {
        BlockNatural {
            width: 6,
            models: 2,
            population: 16,
            cut: 4,
            iterations: 30,
            seed: 77,
            workers: Some(2),
            ..BlockNatural::default()
        }
    }

    #[test]
    fn test_validate() {
        assert!(settings().validate().is_ok());
        let bad = vec![
            BlockNatural { width: 0, ..settings() },
            BlockNatural { models: 7, ..settings() },
            BlockNatural { cut: 0, ..settings() },
            BlockNatural { cut: 16, ..settings() },
            BlockNatural { eta: 0., ..settings() },
            BlockNatural { cutoff: -0.5, ..settings() },
            BlockNatural { report_iter: 0, ..settings() },
            BlockNatural { workers: Some(0), ..settings() },
        ];
        for b in bad {
            assert!(b.validate().is_err(), "{:?}", b);
        }
        assert!(BlockNatural { cutoff: NO_CUTOFF, ..settings() }.validate().is_ok());
    }

    #[test]
    fn test_from_reader_defaults() {
        let json = r#"{"width": 12, "models": 3, "population": 32, "cut": 4}"#;
        let s = BlockNatural::from_reader(json.as_bytes()).unwrap();
        assert_eq!(s.width, 12);
        assert_eq!(s.models, 3);
        assert_eq!(s.eta, 1e-1);
        assert_eq!(s.cutoff, 1e-4);
        assert!(!s.rescore_elite);

        let bad = r#"{"width": 2, "models": 3}"#;
        assert!(BlockNatural::from_reader(bad.as_bytes()).is_err());
    }

    #[test]
    fn test_generation_zero_scores_everyone() {
        let s = settings();
        let d = Dispatcher::new(s.workers).unwrap();
        let mut pop: Population<f64, ()> = Population::new(&s);
        assert!(pop.best().is_none());
        assert_eq!(pop.state().len(), 4);

        let ranked = s.run_generation(&mut pop, &Sphere, &d);
        assert_eq!(ranked.len(), 16);
        assert!(ranked.iter().all(|i| i.fitness.is_finite()));
        for w in ranked.windows(2) {
            assert!(w[0].fitness <= w[1].fitness);
        }
        assert_eq!(pop.generation(), 1);
        assert_eq!(pop.state()[0], pop.individuals()[0].vector.data);
    }

    #[test]
    fn test_elite_carried_over() {
        let s = settings();
        let d = Dispatcher::new(s.workers).unwrap();
        let mut pop: Population<f64, ()> = Population::new(&s);
        s.run_generation(&mut pop, &Sphere, &d);
        let elite: Vec<_> = pop.individuals()[..4]
            .iter()
            .map(|i| (i.vector.data.clone(), i.fitness))
            .collect();

        s.run_generation(&mut pop, &Sphere, &d);
        // Every old elite is still present with its old fitness
        for (v, f) in elite {
            assert!(pop
                .individuals()
                .iter()
                .any(|i| i.vector.data == v && i.fitness == f));
        }
    }

    #[test]
    fn test_head_monotone() {
        let s = settings();
        let d = Dispatcher::new(s.workers).unwrap();
        let mut pop: Population<f64, ()> = Population::new(&s);
        let mut last = f64::INFINITY;
        for _ in 0..20 {
            let head = s.run_generation(&mut pop, &Sphere, &d)[0].fitness;
            assert!(head <= last);
            last = head;
        }
    }

    #[test]
    fn test_run_target() {
        let s = BlockNatural {
            iterations: 200,
            ..settings()
        };
        let best: Individual<f64, ()> = s.run(&Sphere, StopRule::Target(0.5)).unwrap();
        assert!(best.fitness <= 0.5, "fitness {}", best.fitness);
    }

    #[test]
    fn test_run_stall() {
        struct Flat;
        impl Environment<f32> for Flat {
            type Aux = ();
            fn eval(&self, _v: &[f32]) -> (f64, ()) {
                (1., ())
            }
        }

        let best: Individual<f32, ()> = settings().run(&Flat, StopRule::Stall(3)).unwrap();
        assert_eq!(best.fitness, 1.);

        let res: Result<Individual<f32, ()>> = settings().run(&Flat, StopRule::Stall(0));
        assert!(res.is_err());
        assert!(StopRule::Target(f64::NAN).validate().is_err());
        assert!(StopRule::Budget.validate().is_ok());
    }

    #[test]
    fn test_state_is_top_cut() {
        let s = BlockNatural {
            width: 3,
            models: 1,
            population: 4,
            cut: 1,
            workers: Some(1),
            ..BlockNatural::default()
        };
        let d = Dispatcher::new(s.workers).unwrap();
        let mut pop: Population<f64, ()> = Population::from_state(&s, vec![vec![0.; 3]; 10]);
        assert_eq!(pop.state().len(), 10);

        s.run_generation(&mut pop, &Sphere, &d);
        assert_eq!(pop.state().len(), 1);
        s.run_generation(&mut pop, &Sphere, &d);
        assert_eq!(pop.state(), &[pop.individuals()[0].vector.data.clone()][..]);

        // Fewer vectors than `cut` are topped up from the ranking
        let s = BlockNatural { cut: 3, ..s };
        let mut pop: Population<f64, ()> = Population::from_state(&s, vec![vec![1.; 3]]);
        s.run_generation(&mut pop, &Sphere, &d);
        let top: Vec<_> = pop.individuals()[..3].iter().map(|i| i.vector.data.clone()).collect();
        assert_eq!(pop.state(), &top[..]);
    }

    // Sign of the first coordinate splits the population into two tied groups
    struct Halves;

    impl Environment<f64> for Halves {
        type Aux = ();

        fn eval(&self, v: &[f64]) -> (f64, ()) {
            (if v[0] > 0. { 1. } else { 0. }, ())
        }
    }

    struct Level;

    impl Environment<f64> for Level {
        type Aux = ();

        fn eval(&self, _v: &[f64]) -> (f64, ()) {
            (0., ())
        }
    }

    #[test]
    fn test_ties_keep_order() {
        let s = settings();
        let d = Dispatcher::new(s.workers).unwrap();

        // Sampling never depends on fitness, so both runs draw the same vectors
        // and an all tied ranking is the order they were drawn in
        let mut level: Population<f64, ()> = Population::new(&s);
        let drawn: Vec<Vec<f64>> = s.run_generation(&mut level, &Level, &d)
            .iter()
            .map(|i| i.vector.data.clone())
            .collect();

        let mut pop: Population<f64, ()> = Population::new(&s);
        let ranked: Vec<Vec<f64>> = s.run_generation(&mut pop, &Halves, &d)
            .iter()
            .map(|i| i.vector.data.clone())
            .collect();

        let (low, high): (Vec<_>, Vec<_>) = drawn.into_iter().partition(|v| v[0] <= 0.);
        let expected: Vec<_> = low.into_iter().chain(high).collect();
        assert_eq!(ranked, expected);
    }

    #[test]
    fn test_tied_elite_stays_ahead() {
        let s = settings();
        let d = Dispatcher::new(s.workers).unwrap();
        let mut pop: Population<f64, ()> = Population::new(&s);
        s.run_generation(&mut pop, &Level, &d);
        let elite: Vec<_> = pop.individuals()[..s.cut]
            .iter()
            .map(|i| i.vector.data.clone())
            .collect();

        s.run_generation(&mut pop, &Level, &d);
        let head: Vec<_> = pop.individuals()[..s.cut]
            .iter()
            .map(|i| i.vector.data.clone())
            .collect();
        assert_eq!(head, elite);
    }
}
