//! Bounded fan-out / fan-in over a worker pool
//!
//! Every task gets its own `XorShiftRng` seeded from the caller's stream before
//! any task starts.  Seeds are assigned by task index, so results depend only on
//! the parent seed and never on which worker ran what, or when.  Each call
//! returns once all of its tasks have finished; a panicking task is re-raised on
//! the calling thread.

use rand::{Rng, SeedableRng};
use rand_xorshift::XorShiftRng;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::error::{NesError, Result};

/// Draws one child seed per task from the parent stream
pub fn seeds<P: Rng>(tasks: usize, parent: &mut P) -> Vec<u64> {
    (0..tasks).map(|_| parent.gen()).collect()
}

/// Runs independent tasks on a fixed number of workers
pub struct Dispatcher {
    pool: ThreadPool,
}

impl Dispatcher {
    /// Creates a pool with `workers` threads, or one per hardware thread when None
    pub fn new(workers: Option<usize>) -> Result<Self> {
        let mut builder = ThreadPoolBuilder::new();
        if let Some(n) = workers {
            if n == 0 {
                return Err(NesError::InvalidSettings(
                    "workers must be at least 1".to_string(),
                ));
            }
            builder = builder.num_threads(n);
        }
        Ok(Dispatcher {
            pool: builder.build()?,
        })
    }

    #[inline]
    /// Number of worker threads
    pub fn workers(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Runs `f(index, rng)` for every index in `0..tasks` and collects the results
    /// in index order.
    pub fn map<O, P, F>(&self, tasks: usize, parent: &mut P, f: F) -> Vec<O>
    where
        O: Send,
        P: Rng,
        F: Fn(usize, &mut XorShiftRng) -> O + Sync + Send,
    {
        let seeds = seeds(tasks, parent);
        self.pool.install(|| {
            seeds
                .into_par_iter()
                .enumerate()
                .map(|(i, seed)| {
                    let mut rng = XorShiftRng::seed_from_u64(seed);
                    f(i, &mut rng)
                })
                .collect()
        })
    }

    /// Runs `f(index, slot, rng)` once per slot.  Each task only ever sees its own
    /// slot, so writes never overlap.
    pub fn for_each<S, P, F>(&self, slots: &mut [S], parent: &mut P, f: F) -> ()
    where
        S: Send,
        P: Rng,
        F: Fn(usize, &mut S, &mut XorShiftRng) + Sync + Send,
    {
        let seeds = seeds(slots.len(), parent);
        assert_eq!(seeds.len(), slots.len(), "one stream per slot");
        self.pool.install(|| {
            slots
                .par_iter_mut()
                .zip(seeds.into_par_iter())
                .enumerate()
                .for_each(|(i, (slot, seed))| {
                    let mut rng = XorShiftRng::seed_from_u64(seed);
                    f(i, slot, &mut rng)
                })
        })
    }
}
