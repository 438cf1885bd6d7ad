//! Progress display example
//!
//! Shows how to poll job status for a human-readable progress display. A
//! simulated provider stands in for the network.
//!
//! Usage: cargo run --example progress_display -- ["Artist - Title"] ...

use std::env;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use peerfetch::provider::stream_of;
use peerfetch::{
    Candidate, CandidateStream, DownloadScheduler, EngineConfig, EnqueueOptions, JobState,
    ProgressCallback, SearchFilters, SearchProvider, TrackQuery,
};
use tokio_util::sync::CancellationToken;

/// Offers three copies of every track and "downloads" by writing zeros
struct SimulatedProvider;

#[async_trait]
impl SearchProvider for SimulatedProvider {
    async fn search(
        &self,
        query: &TrackQuery,
        _filters: &SearchFilters,
    ) -> peerfetch::Result<CandidateStream> {
        tokio::time::sleep(Duration::from_millis(300)).await;
        let name = query.display_name();
        Ok(stream_of(vec![
            Candidate::from_remote_path("slowpeer", format!("Music\\{name}.mp3"), Some(3_000_000))
                .bitrate(128)
                .peer_conditions(false, 12, 40_000),
            Candidate::from_remote_path(
                "goodpeer",
                format!("Music\\{name} [320].mp3"),
                Some(8_000_000),
            )
            .bitrate(320)
            .peer_conditions(true, 0, 900_000),
            Candidate::from_remote_path("lossless", format!("FLAC\\{name}.flac"), Some(30_000_000))
                .peer_conditions(true, 3, 500_000),
        ]))
    }

    async fn transfer(
        &self,
        candidate: &Candidate,
        destination: &Path,
        on_progress: ProgressCallback,
    ) -> peerfetch::Result<u64> {
        let size = candidate.size.unwrap_or(1_000_000);
        let chunk = (candidate.upload_speed.max(100_000)) / 4;
        let mut written = 0;
        while written < size {
            tokio::time::sleep(Duration::from_millis(250)).await;
            written = (written + chunk).min(size);
            on_progress(written, Some(size));
        }
        tokio::fs::write(destination, vec![0u8; size as usize]).await?;
        Ok(size)
    }

    async fn cancel(&self, _candidate: &Candidate) {}
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let names: Vec<String> = env::args().skip(1).collect();
    let names = if names.is_empty() {
        vec![
            "Daft Punk - One More Time".to_string(),
            "Boards of Canada - Roygbiv".to_string(),
            "Aphex Twin - Xtal".to_string(),
        ]
    } else {
        names
    };

    let download_dir = env::temp_dir().join("peerfetch-demo");
    std::fs::create_dir_all(&download_dir)?;
    let config = EngineConfig::default()
        .download_dir(&download_dir)
        .max_concurrent_downloads(2);
    let scheduler = DownloadScheduler::new(config, Arc::new(SimulatedProvider))?;

    // Add all tracks
    let mut ids = Vec::new();
    for name in &names {
        let (artist, title) = name.split_once(" - ").unwrap_or(("", name.as_str()));
        let id = scheduler.enqueue(TrackQuery::new(artist, title), EnqueueOptions::default())?;
        println!("Added: {} ({})", id.short(), name);
        ids.push(id);
    }

    scheduler.start(CancellationToken::new())?;

    // Poll progress until all are finished
    loop {
        tokio::time::sleep(Duration::from_millis(500)).await;

        let mut all_done = true;
        println!("\n--- Status ---");

        for &id in &ids {
            if let Some(job) = scheduler.get_job(id) {
                let progress = job.transfer_progress();
                let eta = progress
                    .eta_seconds
                    .map_or_else(|| "--".to_string(), |s| format!("{s}s"));
                let source = job
                    .candidate
                    .as_ref()
                    .map_or_else(|| "-".to_string(), |c| c.peer.clone());

                println!(
                    "  {} | {:12} | {:>4.0}% | {}/s | ETA {} | {}",
                    id.short(),
                    job.state.as_str(),
                    job.progress * 100.0,
                    format_bytes(job.speed),
                    eta,
                    source,
                );

                if !job.state.is_terminal() {
                    all_done = false;
                }
                if job.state == JobState::Failed {
                    println!("      error: {}", job.error_message.unwrap_or_default());
                }
            }
        }

        let stats = scheduler.stats();
        println!(
            "  Total: {} active, {} waiting, {}/s down",
            stats.slots_in_use,
            stats.slots_waiting,
            format_bytes(stats.download_speed),
        );

        if all_done {
            println!("\nAll jobs finished.");
            break;
        }
    }

    scheduler.shutdown().await?;
    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    if bytes >= 1_048_576 {
        format!("{:.1} MB", bytes as f64 / 1_048_576.0)
    } else if bytes >= 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{bytes} B")
    }
}
