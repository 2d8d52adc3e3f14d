/// `trellis cache` command implementation
///
/// Inspects the durable cache directory (stats, list, show, clear).
use anyhow::{Context, Result};
use std::path::PathBuf;

use crate::cli::{CacheArgs, CacheCommands};
use crate::cli_utils::{format_size, trellis_prefix};
use trellis::config::TrellisConfig;
use trellis::storage::{CacheBackend, DiskCache};

pub fn cache(args: &CacheArgs, config: &TrellisConfig) -> Result<()> {
    let dir = args
        .cache_dir
        .as_deref()
        .map(PathBuf::from)
        .unwrap_or_else(|| config.cache_dir());
    let cache = DiskCache::new(&dir)
        .with_context(|| format!("Failed to open cache directory {}", dir.display()))?;

    match &args.command {
        CacheCommands::Stats => stats(&cache),
        CacheCommands::List { verbose } => list(&cache, *verbose),
        CacheCommands::Show { key } => show(&cache, key),
        CacheCommands::Clear => clear(&cache),
    }
}

fn stats(cache: &DiskCache) -> Result<()> {
    let stats = cache.stats().context("Failed to get cache statistics")?;

    println!("Cache Statistics");
    println!();
    println!("Directory: {}", stats.dir.display());
    println!("Entries: {}", stats.entries);
    println!("Blobs: {} ({})", stats.blobs, format_size(stats.blob_bytes));

    if stats.blobs > 0 {
        println!(
            "Average blob size: {}",
            format_size(stats.blob_bytes / stats.blobs)
        );
    }

    Ok(())
}

fn list(cache: &DiskCache, verbose: bool) -> Result<()> {
    let keys = cache.keys().context("Failed to list cache entries")?;

    if keys.is_empty() {
        println!("No cached entries.");
        return Ok(());
    }

    println!("Cached entries ({}):", keys.len());
    println!();

    for key in keys {
        println!("  {}", key);
        if !verbose {
            continue;
        }
        if let Some(signature) = cache.get_meta(&key)? {
            println!("    code:   {}", signature.code_hash);
            println!("    env:    {}", signature.env_hash);
            println!("    inputs: {}", signature.inputs_hash);
            println!("    deps:   {}", signature.deps_hash);
            println!(
                "    stored: {}",
                signature.timestamp.format("%Y-%m-%d %H:%M:%S")
            );
        }
    }

    Ok(())
}

fn show(cache: &DiskCache, key: &str) -> Result<()> {
    let Some(signature) = cache.get_meta(key)? else {
        anyhow::bail!("No cache entry for key: {}", key);
    };

    println!("Key: {}", key);
    println!("Signature:");
    println!("  code:   {}", signature.code_hash);
    println!("  env:    {}", signature.env_hash);
    println!("  inputs: {}", signature.inputs_hash);
    println!("  deps:   {}", signature.deps_hash);
    println!(
        "  stored: {}",
        signature.timestamp.format("%Y-%m-%d %H:%M:%S")
    );

    match cache.get_blob(key)? {
        Some(value) => {
            println!("Output:");
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        None => println!("Output: <missing, next run re-executes this node>"),
    }

    Ok(())
}

fn clear(cache: &DiskCache) -> Result<()> {
    let count = cache.keys()?.len();
    println!(
        "{} Clearing {} entries from {}",
        trellis_prefix(),
        count,
        cache.dir().display()
    );
    cache.clear().context("Failed to clear cache")?;
    println!("{} Cache cleared.", trellis_prefix());
    Ok(())
}
