//! Bactic Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, utilities, and error handling for the Bactic project.
//!
//! # Overview
//!
//! This crate provides common functionality used across all Bactic workspace members:
//!
//! - **Error Handling**: Custom error types and result types
//! - **Logging**: Centralised `tracing` subscriber setup
//! - **Types**: Athletes, schools, meets, heats, results and the enumerations
//!   (division, season, event type) they are classified by
//!
//! # Example
//!
//! ```no_run
//! use bactic_common::types::EventType;
//!
//! let event = EventType::T5000M;
//! assert!(event.family().is_track_distance());
//! println!("{}", event);
//! ```

pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{BacticError, Result};
