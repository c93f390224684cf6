//! CLI module for the white-bg library
//!
//! This module is only available when the "cli" feature is enabled.

mod config;
#[path = "main.rs"]
mod main_impl;

pub use main_impl::{main, Cli, CliLogFormat, CliModel, CliOutputMode, Command};
