//! CLI entry point for the ArpGuard training pipeline.
//!
//! Pretrains the encoder with masked-feature reconstruction on the train
//! split, then, when both splits are labeled, trains and evaluates the
//! spoofing classifier on top of the frozen encoder.

use anyhow::Context;
use arpguard_core::{load_config, ExperimentConfig};
use arpguard_training::pipeline;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "train-arpguard", about = "Self-supervised ARP spoofing detector training")]
struct Cli {
    /// Training split (CSV).
    #[arg(long)]
    train: PathBuf,

    /// Held-out split (CSV).
    #[arg(long)]
    test: PathBuf,

    /// YAML configuration file. Omit to use the built-in constants.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Random seed for masking and shuffling.
    #[arg(long)]
    seed: Option<u64>,

    /// Output path for the JSON run report.
    #[arg(long, default_value = "results/arpguard_report.json")]
    report: PathBuf,

    /// Save the pretrained encoder weights (safetensors).
    #[arg(long)]
    save_encoder: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ExperimentConfig::default(),
    };
    if cli.seed.is_some() {
        config.seed = cli.seed;
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level)),
        )
        .init();

    let device = arpguard_model::select_device();
    let output = pipeline::run(&config, &cli.train, &cli.test, &device)
        .context("training run failed")?;

    pipeline::write_report(&output.report, &cli.report)
        .with_context(|| format!("failed to write report to {}", cli.report.display()))?;

    if let Some(path) = &cli.save_encoder {
        output
            .model
            .save_encoder(path)
            .with_context(|| format!("failed to save encoder to {}", path.display()))?;
        tracing::info!(path = %path.display(), "Encoder weights saved");
    }

    let report = &output.report;
    if let Some(last) = report.pretext.last() {
        println!("Pretext epoch {}: loss={:.4}", last.epoch, last.loss);
    }
    match &report.downstream {
        Some(downstream) => println!("Test: {}", downstream.metrics),
        None => println!("Downstream stage skipped (labels unavailable)"),
    }
    println!("Report written to {}", cli.report.display());

    Ok(())
}
