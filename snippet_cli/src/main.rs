use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use tracing::{debug, info, warn};

mod audio;
mod snippets;

/// Create snippets of audio performances and the corresponding MusicXML scores.
#[derive(Debug, clap::Parser)]
#[command(version, about)]
struct Args {
    /// The length of the snippets in seconds.
    #[arg(short = 'l', long, default_value_t = 12.8)]
    snippets_length: f64,
    /// The metadata table listing performances, scores and annotations.
    #[arg(long, default_value = "metadata.csv")]
    metadata: PathBuf,
    /// The output folder for the snippets.
    #[arg(short, long, default_value = "snippets/")]
    output_folder: PathBuf,
    /// Directory that relative paths in the metadata table are resolved against.
    #[arg(short = 'r', long, default_value = ".")]
    dataset_root: PathBuf,
}

fn main() -> anyhow::Result<()> {
    {
        use tracing_subscriber::prelude::*;

        tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer())
            .with(tracing_subscriber::EnvFilter::from_default_env())
            .init()
    }

    let args = Args::parse();
    debug!(?args, "parsed arguments");

    let catalog = catalog::Catalog::open(&args.metadata)
        .with_context(|| format!("failed to load {}", args.metadata.display()))?;
    std::fs::create_dir_all(&args.output_folder)
        .with_context(|| format!("failed to create {}", args.output_folder.display()))?;
    let config = snippets::SnippetConfig {
        output_folder: args.output_folder,
        dataset_root: args.dataset_root,
        snippets_length: args.snippets_length,
    };

    info!("creating snippets of audio performances and MusicXML scores");
    let start = std::time::Instant::now();
    let (mut processed, mut skipped, mut failed) = (0usize, 0usize, 0usize);

    for (row, entry) in catalog.entries().iter().enumerate() {
        let references = match entry.references(row) {
            Ok(references) => references,
            Err(e) if e.is_missing_audio() => {
                debug!(row, "no audio performance, skipping");
                skipped += 1;
                continue;
            }
            Err(e) => {
                warn!(row, "failed: {e}");
                failed += 1;
                continue;
            }
        };

        match snippets::make_snippets(&config, &references) {
            Ok(n_snippets) => debug!(row, n_snippets, "wrote snippets"),
            Err(e) => {
                warn!(row, audio = references.audio, "failed: {e:#}");
                failed += 1;
            }
        }

        processed += 1;
        if processed % 20 == 0 {
            info!("{processed}/{} completed", catalog.len());
        }
    }

    let elapsed = start.elapsed();
    info!(processed, skipped, failed, ?elapsed, "completed");
    Ok(())
}
