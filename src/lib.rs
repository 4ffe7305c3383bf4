//! NES
//!
//! NES is a library and an executable to minimize black-box functions using block
//! factorized Natural Evolutionary Strategies.
#![warn(missing_docs, unused)]

#[macro_use]
extern crate clap;

/// Tools for binaries
pub mod bin_utils;
/// Example environments
pub mod example;
