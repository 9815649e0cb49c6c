//! `thanos-block ls` - List blocks in the bucket.

use anyhow::{Context, Result};
use thanos_block::{BlockTransfer, CancellationToken};

use super::classify;
use crate::args::LsArgs;
use crate::exit_codes;

pub async fn cmd_ls(
    transfer: BlockTransfer,
    args: LsArgs,
    cancel: &CancellationToken,
) -> Result<i32> {
    let blocks = match transfer.list_blocks(cancel).await {
        Ok(b) => b,
        Err(e) => return classify(e, "listing"),
    };

    match args.format.as_str() {
        "json" => {
            let rows: Vec<_> = blocks
                .iter()
                .map(|b| serde_json::json!({ "id": b.id.to_string(), "complete": b.complete }))
                .collect();
            let out = serde_json::to_string_pretty(&rows).context("failed to render listing")?;
            println!("{}", out);
        }
        "table" => {
            for b in &blocks {
                let state = if b.complete { "complete" } else { "partial" };
                println!("{}\t{}", b.id, state);
            }
            eprintln!("{} block(s)", blocks.len());
        }
        other => anyhow::bail!("unknown format {:?}, expected 'table' or 'json'", other),
    }
    Ok(exit_codes::SUCCESS)
}
