//! Command-line interface: argument definitions and command execution.

pub mod args;
pub mod commands;
