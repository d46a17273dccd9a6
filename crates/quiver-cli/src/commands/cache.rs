//! Cache command - regenerate or check the tool cache artifact.

use std::path::Path;

use anyhow::bail;
use quiver_package::{CacheStatus, check_cache, write_cache};

use crate::theme::Theme;

/// Write the cache for `dir`, or with `check` report drift.
pub(crate) fn run(dir: &Path, check: bool) -> anyhow::Result<()> {
    if !check {
        match write_cache(dir)? {
            Some(path) => println!("{}", Theme::success(&format!("wrote {}", path.display()))),
            None => println!("{}", Theme::info("tool cache is up to date")),
        }
        return Ok(());
    }

    match check_cache(dir)? {
        CacheStatus::Fresh => println!("{}", Theme::success("tool cache is fresh")),
        CacheStatus::Unmanaged => println!(
            "{}",
            Theme::info("manifest declares no tools; the cache is the tool source")
        ),
        CacheStatus::Missing => {
            println!("{}", Theme::warning("tool cache is missing"));
            bail!("tool cache is missing; run `quiver cache` to create it");
        },
        CacheStatus::Stale { conflicts } => {
            println!("{}", Theme::warning("tool cache is stale"));
            for conflict in &conflicts {
                println!("  {} {conflict}", Theme::dimmed("-"));
            }
            bail!("tool cache is stale; run `quiver cache` to regenerate it");
        },
    }
    Ok(())
}
