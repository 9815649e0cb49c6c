pub mod download;
pub mod finalize;
pub mod ls;
pub mod meta;
pub mod upload;

use std::sync::Arc;

use anyhow::{Context, Result};
use thanos_block::{BlockError, BlockTransfer, CancellationToken, Config};

use crate::args::{Cli, Command, StoreArgs};
use crate::exit_codes;

pub async fn dispatch(cli: Cli, cancel: CancellationToken) -> Result<i32> {
    match cli.cmd {
        Command::Finalize(args) => finalize::cmd_finalize(&cli.store, args),
        Command::Upload(args) => {
            upload::cmd_upload(connect(&cli.store)?, args, &cancel).await
        }
        Command::Download(args) => {
            download::cmd_download(connect(&cli.store)?, args, &cancel).await
        }
        Command::Meta(args) => meta::cmd_meta(connect(&cli.store)?, args, &cancel).await,
        Command::Delete(args) => meta::cmd_delete(connect(&cli.store)?, args, &cancel).await,
        Command::Ls(args) => ls::cmd_ls(connect(&cli.store)?, args, &cancel).await,
    }
}

/// Merge `--config` and `--bucket`; the flag wins over the file.
pub fn load_config(store: &StoreArgs) -> Result<Config> {
    let mut cfg = match &store.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(url) = &store.bucket {
        cfg.bucket = url.clone();
    }
    Ok(cfg)
}

fn connect(store: &StoreArgs) -> Result<BlockTransfer> {
    let cfg = load_config(store)?;
    if cfg.bucket.is_empty() {
        anyhow::bail!(
            "no bucket configured: pass --bucket, set THANOS_BLOCK_BUCKET or use --config"
        );
    }
    let bucket = cfg
        .open_bucket()
        .with_context(|| format!("failed to open bucket {}", cfg.bucket))?;
    Ok(BlockTransfer::with_layout(Arc::new(bucket), cfg.layout))
}

/// Map well-known block errors to exit codes; everything else propagates.
///
/// Only remote absence is reported as not found. A missing local meta file
/// is an ordinary failure.
pub(crate) fn classify(err: BlockError, what: &str) -> Result<i32> {
    let local = matches!(err, BlockError::ReadMeta(_) | BlockError::Meta(_));
    if err.is_not_found() && !local {
        eprintln!("{what} not found: {err}");
        return Ok(exit_codes::NOT_FOUND);
    }
    if matches!(err, BlockError::Cancelled { .. }) {
        eprintln!("{what} cancelled");
        return Ok(exit_codes::CANCELLED);
    }
    Err(err).with_context(|| format!("{what} failed"))
}
