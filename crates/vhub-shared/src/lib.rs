//! Types and wire formats shared by every vhub crate.

pub mod constants;
pub mod error;
pub mod protocol;
pub mod types;
