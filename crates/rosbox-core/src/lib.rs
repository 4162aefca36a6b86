//! Core logic for rosbox box lifecycle management
//!
//! This crate provides:
//! - Box naming (`BoxId`)
//! - Mount policy per host OS
//! - Image resolution (custom, locally built, registry with freshness check)
//! - The box manager (create, start, stop, enter, remove, update, list)
//! - Build recipe composition from templates

mod box_id;
mod error;
mod manager;
mod mounts;
mod resolver;
pub mod template;

pub use box_id::*;
pub use error::*;
pub use manager::*;
pub use mounts::*;
pub use resolver::*;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
