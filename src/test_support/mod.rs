//! Support code shared by unit tests across the crate. Not part of the
//! public API.

pub mod random;
