//! Library crate for portprobe: a bounded, cancellable TCP connect probe engine.
//!
//! The pipeline is target expansion, the bounded worker pool, the TCP probe and
//! the result aggregator; [`scanner::scan`] wires them together for a [`ScanConfig`].
pub mod aggregate;
pub mod config;
pub mod error;
pub mod expand;
pub mod oshint;
pub mod output;
pub mod pool;
pub mod ports;
pub mod probe;
pub mod rdns;
pub mod scanner;
pub mod services;
pub mod targets;
pub mod types;

pub use aggregate::{aggregate, ScanWindow};
pub use config::ScanConfig;
pub use error::ScanError;
pub use expand::{expand, ProbePlan};
pub use scanner::scan;
pub use types::{HostHint, OsHint, ProbeOutcome, ProbeState, ProbeTask, ScanReport};
