//! Organizational digital twin: a day-stepped simulation of a company, its
//! market, its customers and the people running it.

pub mod agent;
pub mod analysis;
pub mod config;
pub mod crisis;
pub mod customers;
pub mod economy;
pub mod engine;
pub mod landscape;
pub mod manager;
pub mod market;
pub mod memory;
pub mod messaging;
pub mod negotiation;
pub mod payload;
pub mod responder;
pub mod snapshot;
pub mod stats;

/// Simulated timestamp, in days since the start of the run.
pub type Day = u64;
