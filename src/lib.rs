//! openmonitor - configuration and observation store for monitored systems.
//!
//! Systems own components, components own polled metrics, and probe results
//! and operator comments are recorded against metrics. [`reconcile`] applies
//! a declarative [`db::Config`] to the store; [`ingest`] records observations.

pub mod config;
pub mod db;
pub mod ingest;
pub mod reconcile;
pub mod scheduler;
pub mod time;
pub mod web;

#[cfg(test)]
mod test_support;

pub use reconcile::{reconcile, reconcile_atomic, ReconcileSummary};
