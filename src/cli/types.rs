//! CLI type definitions
//!
//! This module contains clap command structures that define the CLI interface.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "shepherd")]
#[command(about = "Shepherd - worker-fleet orchestrator for model runners", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to the YAML configuration file
    #[arg(short, long, global = true, default_value = "shepherd.yaml")]
    pub config: PathBuf,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the shepherd and its health loop until interrupted
    Run,

    /// Validate the configuration and list the configured sheep
    Check,

    /// Run a single job to completion
    Job(JobArgs),
}

#[derive(Args, Debug)]
pub struct JobArgs {
    /// Sheep that should process the job
    #[arg(long)]
    pub sheep: String,

    /// Model name
    #[arg(long)]
    pub model: String,

    /// Model version
    #[arg(long, default_value = "latest")]
    pub model_version: String,

    /// Job id (generated when omitted)
    #[arg(long)]
    pub job_id: Option<String>,

    /// Local file uploaded as the job's `inputs/input.json`
    #[arg(long)]
    pub input: Option<PathBuf>,

    /// Give up waiting after this many seconds
    #[arg(long, default_value = "300")]
    pub timeout_secs: u64,
}
