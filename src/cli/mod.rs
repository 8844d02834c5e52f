//! CLI module for the apiman client.
//!
//! This module provides the command-line interface for deploying,
//! importing, exporting and managing backend entities.

mod commands;
mod output;

pub use commands::{Cli, Commands, OutputFormat};
pub use output::OutputFormatter;
