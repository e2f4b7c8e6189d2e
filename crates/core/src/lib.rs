//! Domain model of the programming submission tracker.

pub mod domain;

pub use domain::*;
