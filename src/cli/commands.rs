//! CLI command definitions.
//!
//! This module defines all CLI commands and their arguments using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::TOKEN_FILE_ENV;
use crate::kind::Kind;

/// Apiman - deploy, import and export entities of an API-management backend.
#[derive(Parser, Debug)]
#[command(name = "apiman")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json).
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    /// Location of the stored access token.
    #[arg(long, global = true, env = TOKEN_FILE_ENV)]
    pub token_file: Option<PathBuf>,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Obtain an access token and store it.
    Login {
        /// Base URI of the backend.
        #[arg(long, env = "APIMAN_URL")]
        url: String,

        /// Client id.
        #[arg(short, long, env = "APIMAN_USERNAME")]
        username: String,

        /// Client secret.
        #[arg(short, long, env = "APIMAN_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Revoke and delete the stored access token.
    Logout,

    /// Show who the stored access token belongs to.
    Whoami,

    /// Deploy a deploy file.
    Deploy {
        /// Deploy file (defaults to `.apiman.yml` in the current directory
        /// or one of its parents).
        file: Option<PathBuf>,
    },

    /// Import a JSON import document.
    Import {
        /// Import document.
        file: PathBuf,
    },

    /// Export all entities as an import document.
    Export {
        /// Target file (defaults to stdout).
        file: Option<PathBuf>,
    },

    /// List entities of a kind.
    List {
        /// Entity kind.
        kind: Kind,

        /// Search term.
        search: Option<String>,

        /// Offset of the first entry.
        #[arg(long, default_value = "0")]
        start_index: u32,

        /// Entries per page.
        #[arg(long, default_value = "16")]
        count: u32,
    },

    /// Show one entity.
    Detail {
        /// Entity kind.
        kind: Kind,

        /// Numeric id or name.
        id: String,
    },

    /// Create an entity from a JSON or YAML file.
    Create {
        /// Entity kind.
        kind: Kind,

        /// Payload file.
        file: PathBuf,
    },

    /// Update an entity from a JSON or YAML file.
    Update {
        /// Entity kind.
        kind: Kind,

        /// Numeric id or name.
        id: String,

        /// Payload file.
        file: PathBuf,
    },

    /// Delete an entity.
    Delete {
        /// Entity kind.
        kind: Kind,

        /// Numeric id or name.
        id: String,
    },
}

/// Output format options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output for scripting.
    Json,
}
