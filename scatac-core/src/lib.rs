//! Shared primitives for the scATAC analysis workspace.
//!
//! `scatac-core` provides the foundation the other crates build on:
//!
//! - **Error types** — [`ScatacError`] and [`Result`] for structured error handling
//! - **Traits** — [`Summarizable`] for stage outputs
//! - **Compression** — transparent gzip decoding of input tables

pub mod compress;
pub mod error;
pub mod traits;

pub use error::{Result, ScatacError};
pub use traits::*;
