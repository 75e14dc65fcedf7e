//! `ember-domain` — types shared by every Ember crate.
//!
//! Holds the error taxonomy, the configuration tree, the media enums that
//! appear both on the wire and in caller-facing APIs, and the structured
//! trace events emitted by the engine.

pub mod config;
pub mod error;
pub mod media;
pub mod trace;

pub use error::{Error, Result};
pub use media::{LoadSource, Severity, Source};
