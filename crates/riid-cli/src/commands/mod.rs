//! CLI command implementations

pub mod detect;
