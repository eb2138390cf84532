//! End-to-end run: fit the transform, pretrain, freeze, classify, evaluate.

use crate::data::{labels_of, load_records};
use crate::downstream::DownstreamTrainer;
use crate::metrics::EvaluationMetrics;
use crate::pretext::{EpochLoss, PretextTrainer};
use arpguard_core::{ArpGuardError, ExperimentConfig, RawRecord, Result, LABEL_COLUMN};
use arpguard_model::{FeaturePipeline, RepresentationModel};
use candle_core::Device;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use std::path::Path;

/// Downstream history plus held-out metrics.
#[derive(Debug, Clone, Serialize)]
pub struct DownstreamReport {
    pub history: Vec<EpochLoss>,
    pub metrics: EvaluationMetrics,
}

/// Structured outcome of one run.
///
/// Write-only: an epoch whose batches were all skipped has a `NaN` loss,
/// which serializes as `null`.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub feature_dim: usize,
    pub feature_names: Vec<String>,
    pub train_records: usize,
    pub test_records: usize,
    pub seed: Option<u64>,
    pub pretext: Vec<EpochLoss>,
    /// `None` when either split lacks labels.
    pub downstream: Option<DownstreamReport>,
}

/// Report plus the trained model, for callers that persist weights.
pub struct RunOutput {
    pub report: RunReport,
    pub model: RepresentationModel,
}

/// RNG for masking and shuffling: seeded when configured, OS entropy otherwise.
pub fn make_rng(seed: Option<u64>) -> ChaCha8Rng {
    match seed {
        Some(seed) => ChaCha8Rng::seed_from_u64(seed),
        None => ChaCha8Rng::from_entropy(),
    }
}

/// Load both CSV splits and run the full pipeline.
///
/// # Errors
///
/// Any missing input file, fit failure, unknown address, or model failure
/// aborts the run.
pub fn run(
    config: &ExperimentConfig,
    train_path: &Path,
    test_path: &Path,
    device: &Device,
) -> Result<RunOutput> {
    config.validate()?;
    let train = load_records(train_path)?;
    let test = load_records(test_path)?;
    run_with_records(config, &train, &test, device)
}

/// Run the full pipeline on in-memory splits.
pub fn run_with_records(
    config: &ExperimentConfig,
    train: &[RawRecord],
    test: &[RawRecord],
    device: &Device,
) -> Result<RunOutput> {
    config.validate()?;
    let mut rng = make_rng(config.seed);
    let train_y = labels_of(train)?;
    let test_y = labels_of(test)?;

    let mut pipeline = FeaturePipeline::new();
    let state = pipeline.fit(train.iter().chain(test.iter()))?;
    let feature_dim = state.feature_dim();
    let feature_names = state.feature_names();
    tracing::info!(
        feature_dim,
        features = ?feature_names,
        "Feature transform fitted on pooled splits"
    );

    let train_x = pipeline.apply(train)?;
    let test_x = pipeline.apply(test)?;

    let mut model = RepresentationModel::new(feature_dim, &config.model, device)?;

    let mut pretext = PretextTrainer::new(&config.pretext, &config.masking)?;
    let pretext_history = pretext.train(&mut model, &train_x, &mut rng)?;

    let downstream = match (train_y, test_y) {
        (Some(train_y), Some(test_y)) => {
            model.freeze_encoder()?;
            let trainer = DownstreamTrainer::new(&config.downstream);
            let history = trainer.train(&mut model, &train_x, &train_y, &mut rng)?;
            let metrics = trainer.evaluate(&model, &test_x, &test_y)?;
            Some(DownstreamReport { history, metrics })
        }
        (train_y, test_y) => {
            tracing::warn!(
                column = LABEL_COLUMN,
                train_labeled = train_y.is_some(),
                test_labeled = test_y.is_some(),
                "Labels unavailable, downstream stage skipped"
            );
            None
        }
    };

    Ok(RunOutput {
        report: RunReport {
            feature_dim,
            feature_names,
            train_records: train.len(),
            test_records: test.len(),
            seed: config.seed,
            pretext: pretext_history,
            downstream,
        },
        model,
    })
}

/// Write the report as pretty JSON, creating parent directories.
pub fn write_report(report: &RunReport, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let json = serde_json::to_string_pretty(report)
        .map_err(|e| ArpGuardError::Serialization(format!("Failed to encode report: {e}")))?;
    std::fs::write(path, json)?;
    Ok(())
}
