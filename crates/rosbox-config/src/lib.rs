//! Configuration for rosbox
//!
//! This crate handles:
//! - Global configuration (`~/.config/rosbox/config.toml`)
//! - The registry of logical images (template combinations plus their
//!   built/registry identities)

mod error;
mod global;
mod images;

pub use error::*;
pub use global::*;
pub use images::*;
