//! CLI command definitions.
//!
//! This module defines the structure of all CLI subcommands.

use std::path::PathBuf;

use clap::{Args, Subcommand, ValueEnum};

use crate::alert::Category;

/// Post command arguments.
#[derive(Debug, Args)]
pub struct PostCommand {
    /// Describe the incident (what, where, when)
    pub description: String,

    /// Incident category
    #[arg(short = 't', long, value_enum, default_value = "crime")]
    pub category: CategoryArg,

    /// Latitude of the incident (overrides the configured position)
    #[arg(long, requires = "lng", allow_hyphen_values = true)]
    pub lat: Option<f64>,

    /// Longitude of the incident (overrides the configured position)
    #[arg(long, requires = "lat", allow_hyphen_values = true)]
    pub lng: Option<f64>,
}

/// Feed command arguments.
#[derive(Debug, Args)]
pub struct FeedCommand {
    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Map command arguments.
#[derive(Debug, Args)]
pub struct MapCommand {
    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Import command arguments.
#[derive(Debug, Args)]
pub struct ImportCommand {
    /// JSON file holding an array of alerts
    pub file: PathBuf,
}

/// Status command arguments.
#[derive(Debug, Args)]
pub struct StatusCommand {
    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show the configuration file path
    Path,

    /// Validate configuration
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

/// Category argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CategoryArg {
    /// Crime
    Crime,
    /// Traffic
    Traffic,
    /// Strike/Unrest
    #[value(alias = "strike")]
    StrikeUnrest,
    /// Load shedding
    Loadshedding,
    /// Other
    Other,
}

impl From<CategoryArg> for Category {
    fn from(arg: CategoryArg) -> Self {
        match arg {
            CategoryArg::Crime => Self::Crime,
            CategoryArg::Traffic => Self::Traffic,
            CategoryArg::StrikeUnrest => Self::StrikeUnrest,
            CategoryArg::Loadshedding => Self::Loadshedding,
            CategoryArg::Other => Self::Other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_arg_conversion() {
        assert_eq!(Category::from(CategoryArg::Crime), Category::Crime);
        assert_eq!(Category::from(CategoryArg::Traffic), Category::Traffic);
        assert_eq!(
            Category::from(CategoryArg::StrikeUnrest),
            Category::StrikeUnrest
        );
        assert_eq!(
            Category::from(CategoryArg::Loadshedding),
            Category::Loadshedding
        );
        assert_eq!(Category::from(CategoryArg::Other), Category::Other);
    }

    #[test]
    fn test_category_arg_value_names_match_wire_names() {
        for arg in CategoryArg::value_variants() {
            let name = arg.to_possible_value().unwrap();
            assert_eq!(name.get_name(), Category::from(*arg).as_str());
        }
    }

    #[test]
    fn test_config_command_debug() {
        let cmd = ConfigCommand::Show { json: false };
        assert!(format!("{cmd:?}").contains("Show"));
    }
}
