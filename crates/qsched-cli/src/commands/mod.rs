//! CLI command implementations.

pub mod algorithms;
pub mod common;
pub mod run;
pub mod validate;
pub mod version;
