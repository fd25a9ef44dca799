//! Shared test support (used by unit, functional, and proptest).

// Each test crate uses a different subset
#![allow(dead_code)]

pub mod fakes;
pub mod fixtures;

pub use fakes::*;
pub use fixtures::*;
