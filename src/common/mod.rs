//! Utilities shared across the package engine.

pub mod xml;
