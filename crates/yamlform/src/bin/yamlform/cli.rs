//! yamlform cli interface

use clap::{Parser, Subcommand, ValueEnum};
use std::fmt::Formatter;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Change the work directory
    ///
    /// Can be specified multiple times. Note that all
    /// paths on the way to the final path must exist.
    ///
    /// This is equivalent to running { cd <directory>; yamlform ... }
    #[clap(short = 'C', long = "directory", global(true))]
    pub directory: Vec<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Schedule and type check a template
    Check(CheckCommand),

    /// Evaluate a template against an in-memory engine
    ///
    /// Resource outputs echo their inputs, ids are unknown.
    Preview(PreviewCommand),

    /// Print debug information for development
    Dev(DevCommand),
}

#[derive(Parser, Debug)]
pub struct CheckCommand {
    #[clap(flatten)]
    pub input: InputArgs,
}

#[derive(Parser, Debug)]
pub struct PreviewCommand {
    #[clap(flatten)]
    pub input: InputArgs,

    #[clap(flatten)]
    pub output: OutputArgs,

    /// Skip type checking
    #[clap(long = "no-type-check")]
    pub no_type_check: bool,
}

#[derive(Parser, Debug)]
pub struct InputArgs {
    /// Template file
    #[clap(default_value = "Pulumi.yaml")]
    pub template: PathBuf,

    /// Load a package schema (YAML or JSON)
    #[clap(short = 's', long = "schema")]
    pub schemas: Vec<PathBuf>,

    /// Set a config value, as key=value
    #[clap(short = 'c', long = "config")]
    pub config: Vec<String>,

    /// Load config values from a YAML or JSON mapping
    #[clap(long = "config-file")]
    pub config_files: Vec<PathBuf>,

    /// Treat a config key as secret
    #[clap(long = "secret")]
    pub secrets: Vec<String>,

    /// Stack name
    #[clap(long = "stack", default_value = "dev")]
    pub stack: String,

    /// References to undeclared names are scheduling errors
    #[clap(long = "strict")]
    pub strict: bool,
}

#[derive(Parser, Debug)]
pub struct OutputArgs {
    #[arg(short = 'F', long = "output-format", default_value_t)]
    pub format: OutputFormat,
}

#[derive(ValueEnum, Clone, Default, Debug)]
pub enum OutputFormat {
    Json,
    #[default]
    Yaml,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Json => f.write_str("json"),
            OutputFormat::Yaml => f.write_str("yaml"),
        }
    }
}

#[derive(Parser, Debug)]
pub struct DevCommand {
    #[command(subcommand)]
    pub command: DevSubCommand,

    /// Template file
    #[clap(short = 'f', long = "file", default_value = "Pulumi.yaml", global(true))]
    pub template: PathBuf,
}

#[derive(Subcommand, Debug)]
pub enum DevSubCommand {
    /// Evaluation order
    Order,
    /// Loaded syntax tree
    Ast,
    /// Referenced provider plugins
    Plugins,
}
