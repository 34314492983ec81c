//! Core of the build artifact notifier.
//!
//! This crate is framework-agnostic. The messaging backend (Telegram today)
//! lives behind the `ports` traits and is implemented in adapter crates.

pub mod batch;
pub mod caption;
pub mod config;
pub mod domain;
pub mod errors;
pub mod formatting;
pub mod logging;
pub mod notifier;
pub mod ports;
pub mod session;

pub use errors::{Error, Result};
