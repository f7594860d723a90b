//! Shared foundation for the vkpbr renderer.
//!
//! - [`Error`] / [`Result`] for configuration, window and I/O failures
//! - [`init_logging`] to install the tracing subscriber
//! - [`RenderConfig`], the recognized renderer options
//! - [`Timer`] and [`FpsCounter`] for frame pacing diagnostics

mod config;
mod error;
mod logging;
mod timer;

pub use config::RenderConfig;
pub use error::{Error, Result};
pub use logging::{DEFAULT_DIRECTIVES, init_logging, init_logging_with};
pub use timer::{FpsCounter, Timer};
