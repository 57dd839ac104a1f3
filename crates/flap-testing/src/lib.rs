//! Testing infrastructure for flap integration tests.
//!
//! This crate provides utilities for writing robust integration tests:
//! - `TestWorld`: isolated directory with fake tracer scripts and a config file
//! - `fixtures`: fake tracer scripts, sample trace lines, session directories
//! - `assertions`: checks over decoded NDJSON output

pub mod assertions;
pub mod fixtures;
pub mod world;

pub use world::TestWorld;
