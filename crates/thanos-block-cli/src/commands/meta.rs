//! `thanos-block meta` and `thanos-block delete`.

use anyhow::{Context, Result};
use thanos_block::{BlockTransfer, CancellationToken};

use super::classify;
use crate::args::BlockIdArgs;
use crate::exit_codes;

pub async fn cmd_meta(
    transfer: BlockTransfer,
    args: BlockIdArgs,
    cancel: &CancellationToken,
) -> Result<i32> {
    let meta = match transfer.download_meta(cancel, args.id).await {
        Ok(m) => m,
        Err(e) => return classify(e, &format!("block {}", args.id)),
    };
    let json = serde_json::to_string_pretty(&meta).context("failed to render meta")?;
    println!("{}", json);
    Ok(exit_codes::SUCCESS)
}

pub async fn cmd_delete(
    transfer: BlockTransfer,
    args: BlockIdArgs,
    cancel: &CancellationToken,
) -> Result<i32> {
    match transfer.delete(cancel, args.id).await {
        Ok(()) => {
            eprintln!("Deleted block {}", args.id);
            Ok(exit_codes::SUCCESS)
        }
        Err(e) => classify(e, &format!("delete of block {}", args.id)),
    }
}
