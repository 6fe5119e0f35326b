//! Patch schema types for the instrument JSON format.
//!
//! A [`Patch`] is the complete description of one instrument. A
//! [`PatchUpdate`] is any subset of it, merged field by field.

pub mod names;
pub mod types;
pub mod update;

pub use names::*;
pub use types::*;
pub use update::*;
