//! Reliable event streaming for the automation platform
//!
//! See [`streams`] for the client, the store backends and the worker loop.

pub mod config;
pub mod error;
pub mod streams;

pub use config::Config;
pub use error::{AppError, Result};
