//! NES-Core
//! ===
//!
//! This library contains a population based optimizer built on block factorized
//! Natural Evolutionary Strategies, along with the primitives it is made of.
//!
//! Matrices
//! ---
//! Dense row-major matrices generic over `f32` and `f64`.  The workhorse is
//! `multiply_transpose`, which computes `M * N^T`.
//!
//! Gaussian Fitting
//! ---
//! Given a set of sample vectors, estimates their mean and covariance and finds a
//! sampling matrix `A` with `A * A^T ≈ Cov` by gradient descent, optionally with
//! an approximate inverse.  Usable on its own, e.g. to fit class conditional
//! densities.
//!
//! Partitioning
//! ---
//! Wide parameter vectors are split into randomly reassigned blocks each
//! generation so every block can be fit and sampled independently.  Over many
//! generations this approximates learning the full covariance.
//!
//! Natural Evolutionary Strategies
//! ---
//! Each generation fits a distribution per block to the current survivors,
//! samples and scores new candidates in parallel, and keeps the best `cut`
//! individuals.  Fitness is always minimized.
//!

#![warn(missing_docs, unused)]

#[macro_use]
extern crate serde_derive;
#[macro_use]
extern crate log;

/// Error types
pub mod error;

/// Defines dense matrices and their element types
pub mod matrix;

/// Defines the gaussian fit
pub mod gaussian;

/// Defines the coordinate to block partitioning
pub mod partition;

/// Defines the bounded worker pool
pub mod dispatch;

/// Defines interfaces for Environments and Individuals
pub mod optimizer;

/// Defines the block factorized NES optimizer
pub mod nes;

/// Defines class conditional density fits
pub mod density;

pub use crate::error::{NesError, Result};
