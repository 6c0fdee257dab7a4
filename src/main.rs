//! Rarity model training — binary entrypoint.
//! Loads config, builds the station list, and runs the resumable ingest
//! pipeline for one archive family.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use metar_rarity::config::train::load_with_env;
use metar_rarity::ingest::archive::ArchiveSpec;
use metar_rarity::ingest::checkpoint::CheckpointStore;
use metar_rarity::ingest::providers::HttpTransport;
use metar_rarity::ingest::stations::{conus_stations, CONUS_STATES};
use metar_rarity::ingest::types::TimeWindow;
use metar_rarity::{ModelStore, TrainOutcome, TrainingPipeline};

/// Compact logs by default; `LOG_FORMAT=json` for machine-readable lines.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("ingest=info,train=info,warn"));

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().compact()).init();
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = load_with_env()?;
    let family = cfg.train.archive;

    let transport = HttpTransport::new(&cfg.http).context("building HTTP client")?;
    let archive = ArchiveSpec::new(family)
        .with_base_url(cfg.train.base_url.clone())
        .with_pirep_filter(cfg.pirep.clone());

    let stations = if archive.needs_stations() {
        let list = conus_stations(&transport, &cfg.train.base_url, CONUS_STATES).await;
        if list.is_empty() {
            bail!("no stations found for any CONUS network");
        }
        list
    } else {
        Vec::new()
    };

    let window = TimeWindow::trailing_years(Utc::now(), cfg.years());
    let checkpoint = CheckpointStore::new(cfg.checkpoint_path());
    let store = ModelStore::new(cfg.out_path());

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = Arc::clone(&stop);
        tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                if stop.swap(true, Ordering::SeqCst) {
                    tracing::warn!(target: "train", "second interrupt; exiting now");
                    std::process::exit(130);
                }
                tracing::warn!(
                    target: "train",
                    "interrupt received; stopping after current chunk (Ctrl-C again to exit now)"
                );
            }
        });
    }

    let mut pipeline = TrainingPipeline::new(Box::new(transport), archive, store)
        .with_retry(cfg.retry)
        .with_alpha(cfg.train.alpha)
        .with_max_text_len(cfg.train.max_text_len)
        .with_stop_flag(stop);
    if let Some(note) = &cfg.train.note {
        pipeline = pipeline.with_note(note.clone());
    }

    tracing::info!(
        target: "train",
        archive = family.as_str(),
        years = cfg.years(),
        stations = stations.len(),
        out = %cfg.out_path().display(),
        checkpoint = %checkpoint.path().display(),
        "starting training run"
    );

    match pipeline
        .run(window, &stations, &cfg.policy(), Some(&checkpoint))
        .await?
    {
        TrainOutcome::Completed(model) => {
            tracing::info!(
                target: "train",
                vocab = model.vocab_all(),
                events = model.total_all(),
                "training complete"
            );
        }
        TrainOutcome::Interrupted { next_chunk_index } => {
            tracing::info!(
                target: "train",
                next_chunk = next_chunk_index,
                "training interrupted; rerun to resume from checkpoint"
            );
        }
    }
    Ok(())
}
