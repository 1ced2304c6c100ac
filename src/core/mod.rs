//! Core types shared across the okctl codebase.
//!
//! Currently this is the error taxonomy: the strongly-typed
//! [`OkctlError`] enum and the [`ErrorContext`] wrapper used to render
//! operator-facing messages at the CLI boundary.

pub mod error;

pub use error::{ErrorContext, OkctlError, user_friendly_error};
