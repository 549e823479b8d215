//! CLI argument parsing using clap v4
//!
//! `serve` starts workers; the pool commands read a discovery file and
//! drive every worker listed in it.

use clap::{Args, Parser, Subcommand};

use crate::client::Criterion;

/// nsworker - pool of remote workers with persistent namespaces
///
/// Start workers with `serve`, then drive the whole pool through the
/// endpoint file they publish.
#[derive(Parser, Debug)]
#[command(name = "nsworker")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Discovery file and config shared by the pool commands
#[derive(Args, Debug, Clone)]
pub struct PoolArgs {
    /// File listing worker endpoints, one per line
    pub uri_file: String,

    /// Path to configuration file
    #[arg(short, long, env = "NSWORKER_CONFIG")]
    pub config: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start one or more workers in this process
    Serve {
        /// Path to configuration file
        #[arg(short, long, env = "NSWORKER_CONFIG")]
        config: Option<String>,

        /// Number of workers to start
        #[arg(short = 'n', long, conflicts_with = "multi")]
        count: Option<usize>,

        /// Start one worker per CPU
        #[arg(long)]
        multi: bool,

        /// Address to listen on
        #[arg(long)]
        bind: Option<String>,

        /// First port (0 = pick free ports)
        #[arg(short, long)]
        port: Option<u16>,

        /// Append each worker's endpoint to this file
        #[arg(short, long)]
        uri_file: Option<String>,
    },

    /// Check that every worker in the pool answers
    Ping {
        #[command(flatten)]
        pool: PoolArgs,
    },

    /// Benchmark the pool and print workers fastest first
    Bench {
        #[command(flatten)]
        pool: PoolArgs,

        /// Prime-sum workload size
        #[arg(long)]
        cycles: Option<u64>,

        /// Ranking criterion: network, compute or combined
        #[arg(long, default_value_t = Criterion::Combined)]
        criterion: Criterion,
    },

    /// Execute code on every worker in parallel
    Exec {
        #[command(flatten)]
        pool: PoolArgs,

        /// Code to run against each worker's namespace
        code: String,

        /// Stop waiting after this many milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
    },

    /// Evaluate an expression on every worker in turn
    Eval {
        #[command(flatten)]
        pool: PoolArgs,

        /// Expression to evaluate
        expr: String,
    },

    /// Display version and build information
    Version,

    /// Configuration management
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

/// Configuration subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum ConfigSubcommand {
    /// Display the current configuration
    Show {
        /// Path to configuration file
        #[arg(short, long)]
        config: Option<String>,
    },

    /// Initialize a new configuration file
    Init {
        /// Path where to create the config file
        #[arg(short, long)]
        path: Option<String>,

        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Validate a configuration file
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        config: Option<String>,
    },
}
