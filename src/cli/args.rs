//! CLI argument definitions using clap

use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand, ValueHint};

use crate::domain::{EntityId, EntityKind};

/// Browse and inspect a manufacturing work-breakdown tree
#[derive(Parser, Debug)]
#[command(name = "jobtree")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Debug output, repeat for more (-d info, -dd debug, -ddd trace)
    #[arg(short = 'd', long = "debug", action = ArgAction::Count, global = true)]
    pub debug: u8,

    /// Working directory holding .jobtree.toml (default: cwd)
    #[arg(short = 'C', long, global = true, value_hint = ValueHint::DirPath)]
    pub dir: Option<PathBuf>,

    /// Dataset file, overrides `data_file` from the config
    #[arg(long, global = true, value_hint = ValueHint::FilePath)]
    pub data: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show the level layout for the configured hierarchy
    Schema,

    /// Load the roots and print the tree
    Tree {
        /// Levels to expand below the roots (default: all)
        #[arg(long)]
        depth: Option<usize>,
        /// Only work orders with this status
        #[arg(long)]
        status: Option<i64>,
        /// Only archived (true) or only active (false) projects and parts
        #[arg(long, value_name = "BOOL")]
        project_archived: Option<bool>,
        /// Only work pieces whose operation is archived (true) or active (false), part roots only
        #[arg(long, value_name = "BOOL")]
        operation_archived: Option<bool>,
        /// Also list parentless entities
        #[arg(long)]
        orphans: bool,
    },

    /// List every position of an entity, top level first
    Branches {
        /// Entity kind (e.g. component, iwp, simple-operation)
        kind: EntityKind,
        /// Entity id
        id: EntityId,
    },

    /// Expand the tree to every node showing an entity
    Focus {
        /// Entity kind (e.g. component, iwp, simple-operation)
        kind: EntityKind,
        /// Entity id
        id: EntityId,
    },

    /// Manage settings
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Generate shell completions
    Completion {
        /// Shell type
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show merged config
    Show,

    /// Print a config template
    Template,

    /// Show config paths
    Path,
}
