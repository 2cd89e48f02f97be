//! Common test utilities for taxograph integration tests
//!
//! Provides a fault-injecting store wrapper, a scripted extractor, an
//! in-memory event source and seeding helpers.

#![allow(dead_code)]

pub mod faulty_store;
pub mod fixtures;

pub use faulty_store::{FaultAction, FaultPoint, FaultyStore};
pub use fixtures::{
    edge_snapshot, new_record_events, seed_departments, seed_records, status_of, vertex, ScriptedExtractor,
    VecEventSource,
};
