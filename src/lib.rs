//! Stochastic gain-set tuning for joint feedback controllers.
//!
//! The live side ([`tuning`]) drives one or more independently controlled
//! joints through a perturbation search: candidate gain sets are tried on
//! the running system, scored by their squared tracking error over a
//! settling window, and the best ones are archived in a bounded elitist
//! pool that biases future candidates. The offline side ([`analysis`])
//! replays the persisted population stream and reduces it to per-generation
//! statistics for plotting.

pub mod analysis;
pub mod channel;
pub mod config;
pub mod export;
pub mod gains;
pub mod persist;
pub mod tuning;
