//! Core

extern crate bitflags;
#[macro_use]
extern crate hexf;
#[macro_use]
extern crate log;

// Re-export.
pub mod film;
pub mod geometry;
pub mod memory;
pub mod pbrt;
pub mod rng;
pub mod sampling;
pub mod spectrum;
pub mod stats;
