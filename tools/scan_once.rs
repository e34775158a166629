use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use library::{scan_with_report, LocalProbe, ScanOptions};
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let mut as_json = false;
    let mut roots = Vec::new();
    for arg in env::args().skip(1) {
        if arg == "--json" {
            as_json = true;
        } else {
            roots.push(PathBuf::from(arg));
        }
    }
    if roots.is_empty() {
        if let Ok(root) = env::var("MUSIC_ROOT") {
            roots.push(PathBuf::from(root));
        }
    }
    if roots.is_empty() {
        return Err("usage: scan_once <root>... [--json] (or set MUSIC_ROOT)".into());
    }

    let report = scan_with_report(&roots, &ScanOptions::default(), Arc::new(LocalProbe)).await;
    for root in &report.missing_roots {
        warn!("Root {} was not scanned", root.display());
    }

    if as_json {
        println!("{}", serde_json::to_string_pretty(&report.albums)?);
        return Ok(());
    }

    let tracks: usize = report
        .albums
        .iter()
        .map(|album| album.resolved_tracks.len())
        .sum();
    println!(
        "Indexed: {} albums, {} tracks ({} folders skipped, {} roots missing)",
        report.albums.len(),
        tracks,
        report.failed_folders,
        report.missing_roots.len()
    );

    Ok(())
}
