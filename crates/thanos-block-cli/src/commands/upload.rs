//! `thanos-block upload` - Upload a finalized block directory.

use anyhow::Result;
use thanos_block::{BlockTransfer, CancellationToken};

use super::classify;
use crate::args::UploadArgs;
use crate::exit_codes;

pub async fn cmd_upload(
    transfer: BlockTransfer,
    args: UploadArgs,
    cancel: &CancellationToken,
) -> Result<i32> {
    match transfer.upload(cancel, &args.dir).await {
        Ok(id) => {
            eprintln!("Uploaded block {} to {}", id, transfer.bucket().name());
            Ok(exit_codes::SUCCESS)
        }
        Err(e) if e.is_partial_upload() => {
            eprintln!("Upload failed and cleanup failed; remove the partial block manually.");
            Err(e.into())
        }
        Err(e) => classify(e, &format!("upload of {}", args.dir.display())),
    }
}
