//! Shared utilities.

pub mod binary;

pub use binary::{command_path, resolve_binary_path, validate_binary, validate_binary_spec, BinaryError};
