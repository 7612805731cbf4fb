//! prefstore - Typed Preferences Library
//!
//! Typed getters and setters, default-value fallback and JSON object storage
//! on top of named, file-backed key-value stores.

pub mod domain;
pub mod application;
pub mod infrastructure;

pub use domain::*;
pub use application::*;
pub use infrastructure::*;
