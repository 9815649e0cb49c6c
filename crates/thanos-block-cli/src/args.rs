use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use thanos_block::Ulid;

#[derive(Parser)]
#[command(
    name = "thanos-block",
    version,
    about = "Upload, download and inspect TSDB blocks in object storage"
)]
pub struct Cli {
    #[command(flatten)]
    pub store: StoreArgs,

    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Debug, Args, Clone)]
pub struct StoreArgs {
    /// Store URL (e.g., s3://bucket/prefix, file:///path).
    /// Overrides the bucket from --config.
    #[arg(long, global = true, env = "THANOS_BLOCK_BUCKET")]
    pub bucket: Option<String>,

    /// YAML config file with bucket and layout settings
    #[arg(long, global = true, env = "THANOS_BLOCK_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Upload a finalized block directory
    Upload(UploadArgs),
    /// Download a published block
    Download(DownloadArgs),
    /// Print the remote meta.json of a block
    Meta(BlockIdArgs),
    /// Delete every object of a block (the debug meta copy is kept)
    Delete(BlockIdArgs),
    /// Attach external labels to a local block and drop its tombstones
    Finalize(FinalizeArgs),
    /// List blocks in the bucket, including incomplete uploads
    Ls(LsArgs),
}

#[derive(Debug, Args, Clone)]
pub struct UploadArgs {
    /// Block directory; its name must be the block id
    #[arg(value_name = "DIR")]
    pub dir: PathBuf,
}

#[derive(Debug, Args, Clone)]
pub struct DownloadArgs {
    #[arg(value_name = "ID", value_parser = parse_id)]
    pub id: Ulid,

    /// Parent directory; the block is written to <OUT>/<ID>
    #[arg(long, short = 'o', default_value = ".")]
    pub out: PathBuf,

    /// Also fetch a prefix without meta.json, e.g. a failed upload
    #[arg(long)]
    pub incomplete: bool,
}

#[derive(Debug, Args, Clone)]
pub struct BlockIdArgs {
    #[arg(value_name = "ID", value_parser = parse_id)]
    pub id: Ulid,
}

#[derive(Debug, Args, Clone)]
pub struct FinalizeArgs {
    /// Block directory
    #[arg(value_name = "DIR")]
    pub dir: PathBuf,

    /// External label as name=value; repeat for several labels
    #[arg(long = "label", value_name = "NAME=VALUE", value_parser = parse_label, required = true)]
    pub labels: Vec<(String, String)>,

    /// Downsampling resolution in milliseconds (0 for raw data)
    #[arg(long, default_value_t = 0)]
    pub resolution: i64,
}

#[derive(Debug, Args, Clone)]
pub struct LsArgs {
    /// Output format: 'table' or 'json'
    #[arg(long, default_value = "table")]
    pub format: String,
}

fn parse_id(s: &str) -> Result<Ulid, String> {
    thanos_block::parse_block_id(s).ok_or_else(|| format!("{s:?} is not a valid block id"))
}

fn parse_label(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((name, value)) if !name.is_empty() => Ok((name.to_string(), value.to_string())),
        _ => Err(format!("expected NAME=VALUE, got {s:?}")),
    }
}
