//! # wordpump
//!
//! Bounded-concurrency job engine over line-oriented wordlists. Every line is
//! handed to a fixed pool of workers running a caller supplied function; every
//! positive result goes through a single result handler, and run statistics
//! can be persisted and resumed.

pub mod cli;
pub mod config;
pub mod constants;
pub mod logging;
pub mod output;
pub mod pipeline;
pub mod probe;
pub mod session;
pub mod source;
pub mod stats;

pub use pipeline::{Machine, MachineError, MachineState};
pub use stats::Statistics;
