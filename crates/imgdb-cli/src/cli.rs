use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use imgdb_types::Identity;

#[derive(Parser)]
#[command(
    name = "imgdb",
    about = "Single-file, content-addressed image database",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Database file. Overrides `IMDB_PATH` and the config file.
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// TOML file with store settings.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Insert an image, or update an existing record
    Put(PutArgs),
    /// Write an image's bytes to a file or stdout
    Get(GetArgs),
    /// Delete an image and its metadata
    Delete(DeleteArgs),
    /// Set the training label of an image
    Label(LabelArgs),
    /// List catalog rows
    List(ListArgs),
    /// List distinct prompt tags
    Tags,
    /// Export images into a directory
    Export(ExportArgs),
    /// Check the file structure and every stored image
    Verify,
}

#[derive(Args)]
pub struct PutArgs {
    /// Image file to store. Required for an insert.
    #[arg(long)]
    pub image: Option<PathBuf>,
    /// Update this record instead of inserting a new one.
    #[arg(long)]
    pub update: Option<Identity>,
    /// Insert as training data, with sentinel generation parameters. Only
    /// `--image`, `--width` and `--height` apply.
    #[arg(
        long,
        conflicts_with_all = [
            "update",
            "seed",
            "prompt",
            "negative_prompt",
            "steps",
            "guidance_scale",
            "labeled",
            "label",
        ]
    )]
    pub training: bool,
    #[arg(long, allow_hyphen_values = true)]
    pub seed: Option<i64>,
    #[arg(long)]
    pub prompt: Option<String>,
    #[arg(long)]
    pub negative_prompt: Option<String>,
    #[arg(long)]
    pub width: Option<u32>,
    #[arg(long)]
    pub height: Option<u32>,
    #[arg(long)]
    pub steps: Option<i32>,
    #[arg(long, allow_hyphen_values = true)]
    pub guidance_scale: Option<f64>,
    #[arg(long)]
    pub labeled: Option<bool>,
    #[arg(long)]
    pub label: Option<String>,
}

#[derive(Args)]
pub struct GetArgs {
    pub identity: Identity,
    /// Output file; stdout when omitted.
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Args)]
pub struct DeleteArgs {
    pub identity: Identity,
}

#[derive(Args)]
pub struct LabelArgs {
    pub identity: Identity,
    pub label: String,
}

#[derive(Args)]
pub struct ListArgs {
    /// Keep rows whose prompt has any of these comma-separated tags.
    #[arg(long)]
    pub include_prompt: Option<String>,
    #[arg(long)]
    pub include_negative_prompt: Option<String>,
    /// Drop rows whose prompt has any of these comma-separated tags.
    #[arg(long)]
    pub exclude_prompt: Option<String>,
    #[arg(long)]
    pub exclude_negative_prompt: Option<String>,
    #[arg(long)]
    pub labeled: Option<bool>,
    /// Only the images at these positions of the blob region.
    #[arg(long, value_delimiter = ',')]
    pub positions: Vec<usize>,
}

#[derive(Args)]
pub struct ExportArgs {
    pub dir: PathBuf,
    /// Export only these images (repeatable).
    #[arg(long = "identity")]
    pub identities: Vec<Identity>,
    /// Write labeled training pairs instead of images plus metadata.
    #[arg(long)]
    pub training: bool,
}
