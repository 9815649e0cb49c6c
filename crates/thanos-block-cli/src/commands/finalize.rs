//! `thanos-block finalize` - Attach external labels to a local block.

use anyhow::{Context, Result};
use thanos_block::LocalMetaStore;

use super::load_config;
use crate::args::{FinalizeArgs, StoreArgs};
use crate::exit_codes;

pub fn cmd_finalize(store: &StoreArgs, args: FinalizeArgs) -> Result<i32> {
    // Only the layout matters here; no bucket is needed.
    let layout = load_config(store)?.layout;
    let metas = LocalMetaStore::new(layout);

    let labels = args.labels.into_iter().collect();
    let meta = metas
        .finalize(&args.dir, labels, args.resolution, None)
        .with_context(|| format!("failed to finalize {}", args.dir.display()))?;

    eprintln!(
        "Finalized block {} with {} label(s), resolution {}",
        meta.block.ulid,
        meta.thanos.labels.len(),
        meta.thanos.downsample.resolution
    );
    Ok(exit_codes::SUCCESS)
}
