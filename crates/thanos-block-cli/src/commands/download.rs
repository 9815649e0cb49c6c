//! `thanos-block download` - Download a published block.

use anyhow::Result;
use thanos_block::{BlockTransfer, CancellationToken};

use super::classify;
use crate::args::DownloadArgs;
use crate::exit_codes;

pub async fn cmd_download(
    transfer: BlockTransfer,
    args: DownloadArgs,
    cancel: &CancellationToken,
) -> Result<i32> {
    let dst = args.out.join(args.id.to_string());
    if dst.exists() {
        anyhow::bail!("destination {} already exists", dst.display());
    }

    let res = if args.incomplete {
        transfer.download_incomplete(cancel, args.id, &dst).await
    } else {
        transfer.download(cancel, args.id, &dst).await
    };
    match res {
        Ok(()) => {
            eprintln!("Downloaded block {} to {}", args.id, dst.display());
            Ok(exit_codes::SUCCESS)
        }
        Err(e) => classify(e, &format!("block {}", args.id)),
    }
}
