//! Infrastructure layer providing the stores preferences are kept in.
//!
//! This module contains the key-value store abstraction, its file-backed
//! implementation, edit transactions and the host context stores are
//! opened through.

pub mod context;
pub mod editor;
pub mod persistence;

pub use context::*;
pub use editor::*;
pub use persistence::*;
