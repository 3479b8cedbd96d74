//! Cross-crate scenarios over a shared in-memory bus.

pub mod codecs;
pub mod failure_modes;
pub mod self_suppression;
pub mod streaming;
