//! Cross-cutting utilities.

pub mod platform;
