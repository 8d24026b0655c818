//! Command-line interface for alertfeed.
//!
//! This module provides the CLI structure for the `alertfeed` binary.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::{
    CategoryArg, ConfigCommand, FeedCommand, ImportCommand, MapCommand, PostCommand,
    StatusCommand,
};

/// alertfeed - Live community safety alerts
///
/// Post incidents tagged with your location and follow a live feed of what
/// others nearby are reporting.
#[derive(Debug, Parser)]
#[command(name = "alertfeed")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Post a new alert at your current location
    Post(PostCommand),

    /// Print the current feed once
    Feed(FeedCommand),

    /// Follow the feed live until interrupted
    Watch,

    /// Show the map projection of the feed
    Map(MapCommand),

    /// Load alerts from a JSON file into the local store
    Import(ImportCommand),

    /// Show store and session status
    Status(StatusCommand),

    /// View or validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> crate::logging::Verbosity {
        if self.quiet {
            crate::logging::Verbosity::Quiet
        } else {
            match self.verbose {
                0 => crate::logging::Verbosity::Normal,
                1 => crate::logging::Verbosity::Verbose,
                _ => crate::logging::Verbosity::Trace,
            }
        }
    }
}
