//! `scan` and `cache-info` subcommands: run the library collector to
//! completion once and report what it found, without leaving a
//! background thread running.

use crate::artwork::ArtworkCache;
use crate::config::Config;
use crate::library::Library;

/// Scan every configured music directory once and persist the result.
pub fn cmd_scan(config: &Config) -> anyhow::Result<()> {
    let roots = config.paths.all_roots();
    if roots.is_empty() {
        anyhow::bail!("no music directory configured; set [paths] music_directory in config.toml");
    }

    let cache_path = config.cache.library_cache_path();
    let artwork_cache_path = config.cache.artwork_cache_path();

    println!("Scanning {} director{}...", roots.len(), if roots.len() == 1 { "y" } else { "ies" });
    for root in &roots {
        println!("  {}", root.display());
    }

    let artwork_cache = ArtworkCache::new();
    if artwork_cache_path.exists() {
        artwork_cache.load(&artwork_cache_path)?;
    }

    let mut library = Library::new(roots, cache_path);
    library.load_cache();

    let outcome = library.refresh(&artwork_cache);
    library.save()?;
    artwork_cache.save(&artwork_cache_path)?;

    println!(
        "\nScan complete: tier={:?}, {} reparsed, {} pruned, {} tracks total",
        outcome.tier,
        outcome.reparsed_count,
        outcome.pruned_count,
        library.track_count(),
    );

    Ok(())
}

/// Print cache statistics without scanning.
pub fn cmd_cache_info(config: &Config) -> anyhow::Result<()> {
    let cache_path = config.cache.library_cache_path();
    let artwork_cache_path = config.cache.artwork_cache_path();

    let mut library = Library::new(config.paths.all_roots(), cache_path.clone());
    library.load_cache();
    println!("Library cache: {}", cache_path.display());
    println!("  tracks:     {}", library.track_count());
    println!("  tree hash:  {:016x}", library.tree_hash());

    let artwork_cache = ArtworkCache::new();
    if artwork_cache_path.exists() {
        artwork_cache.load(&artwork_cache_path)?;
    }
    println!("\nArtwork cache: {}", artwork_cache_path.display());
    println!("  entries:    {}", artwork_cache.len());
    println!("  bytes:      {}", artwork_cache.total_bytes());

    Ok(())
}
