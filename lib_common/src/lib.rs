//! # lib_common
//!
//! Shared library of the slide-sync workspace. Each module sits behind a cargo
//! feature of the same name; `full` enables all of them.

#[cfg(feature = "engine")]
pub mod engine;

#[cfg(feature = "configs")]
pub mod configs;

#[cfg(feature = "loggers")]
pub mod loggers;

#[cfg(feature = "assets")]
pub mod assets;

#[cfg(feature = "transport")]
pub mod transport;
