//! # Virtual TA Core
//!
//! Shared building blocks for the retrieval stack:
//! - **config**: TOML configuration (`~/.vta/config.toml`)
//! - **error**: the error taxonomy every crate returns
//! - **traits**: seams for external collaborators (embedding providers)

pub mod config;
pub mod error;
pub mod traits;

pub use config::VtaConfig;
pub use error::{Result, VtaError};
pub use traits::Embedder;
