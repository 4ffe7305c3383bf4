//! Defines methods shared by the NES binaries

/// Methods for reading arguments
pub mod args;
