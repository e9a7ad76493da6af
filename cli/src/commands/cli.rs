use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "dagflow", version, about = "Build, inspect and run dagflow graph clusters")]
pub struct Args {
    /// Engine config file. Falls back to $DAGFLOW_CONFIG, then ./dagflow.toml.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct ValidateArgs {
    /// Cluster documents; each cluster is named after its file stem.
    #[arg(required = true)]
    pub files: Vec<PathBuf>,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct DotArgs {
    pub file: PathBuf,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct RunArgs {
    pub file: PathBuf,

    #[arg(long)]
    pub graph: String,

    /// Graph argument (KEY=VALUE). Can be specified multiple times.
    /// Booleans and numbers are typed, anything else is a string.
    #[arg(long = "arg", action = clap::ArgAction::Append)]
    pub args: Vec<String>,

    /// Cancel the run after this many milliseconds.
    #[arg(long)]
    pub timeout_ms: Option<u64>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build every cluster and report the first error of each.
    Validate(ValidateArgs),
    /// Print a cluster as Graphviz DOT.
    Dot(DotArgs),
    /// Print the metadata of the built-in operators as JSON.
    Operators,
    /// Run one graph of a cluster with the built-in operators.
    Run(RunArgs),
}
