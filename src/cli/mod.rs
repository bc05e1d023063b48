//! Command-line interface

pub mod commands;
pub mod k8s;

pub use self::commands::{CliArgs, Commands};
