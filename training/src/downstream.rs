//! Downstream stage: frozen-encoder classification and evaluation.

use crate::data::{gather_labels, gather_rows, BatchIterator};
use crate::metrics::{compute_metrics, EvaluationMetrics};
use crate::pretext::{loss_value, EpochLoss};
use arpguard_core::{ArpGuardError, Result, StageConfig};
use arpguard_model::{FeatureVector, RepresentationModel};
use candle_nn::Optimizer;
use rand::Rng;

/// Trains the classification head on top of a frozen encoder.
pub struct DownstreamTrainer {
    stage: StageConfig,
}

impl DownstreamTrainer {
    pub fn new(stage: &StageConfig) -> Self {
        Self {
            stage: stage.clone(),
        }
    }

    /// Train the classification head with cross-entropy against `labels`.
    ///
    /// # Errors
    ///
    /// Fails if the encoder has not been frozen, the split is empty, or
    /// `features`/`labels` differ in length.
    pub fn train<R: Rng + ?Sized>(
        &self,
        model: &mut RepresentationModel,
        features: &[FeatureVector],
        labels: &[u8],
        rng: &mut R,
    ) -> Result<Vec<EpochLoss>> {
        if !model.is_encoder_frozen() {
            return Err(ArpGuardError::Training(
                "encoder must be frozen before downstream training".to_string(),
            ));
        }
        check_split(features, labels)?;

        let mut optimizer = candle_nn::AdamW::new(
            model.downstream_vars(),
            candle_nn::ParamsAdamW {
                lr: self.stage.learning_rate,
                weight_decay: 0.0,
                ..Default::default()
            },
        )
        .map_err(|e| ArpGuardError::Model(format!("Failed to create optimizer: {e}")))?;

        let device = model.device().clone();
        let mut batches = BatchIterator::new(features.len(), self.stage.batch_size);
        let mut history = Vec::with_capacity(self.stage.epochs);

        tracing::info!(
            examples = features.len(),
            spoofing = labels.iter().filter(|&&l| l == 1).count(),
            epochs = self.stage.epochs,
            batch_size = self.stage.batch_size,
            lr = self.stage.learning_rate,
            "Downstream training started"
        );

        for epoch in 1..=self.stage.epochs {
            batches.reshuffle(rng);

            let mut epoch_loss = 0.0;
            let mut batch_count = 0usize;
            let mut skipped = 0usize;

            while let Some(batch) = batches.next_batch() {
                let inputs = gather_rows(features, batch, &device)?;
                let targets = gather_labels(labels, batch, &device)?;

                let logits = model.downstream(&inputs, true)?;
                let loss = candle_nn::loss::cross_entropy(&logits, &targets)
                    .map_err(|e| ArpGuardError::Model(format!("Loss computation failed: {e}")))?;
                let value = loss_value(&loss)?;
                if !value.is_finite() {
                    tracing::warn!(
                        epoch,
                        batch = batch_count + skipped,
                        loss = value,
                        "Skipping downstream batch with non-finite loss"
                    );
                    skipped += 1;
                    continue;
                }

                optimizer
                    .backward_step(&loss)
                    .map_err(|e| ArpGuardError::Model(format!("Backward step failed: {e}")))?;

                epoch_loss += value;
                batch_count += 1;
            }

            let avg_loss = if batch_count > 0 {
                epoch_loss / batch_count as f64
            } else {
                f64::NAN
            };

            tracing::info!(
                epoch,
                loss = avg_loss,
                batches = batch_count,
                skipped,
                "Downstream epoch complete"
            );

            history.push(EpochLoss {
                epoch,
                loss: avg_loss,
                batches: batch_count,
                skipped_batches: skipped,
            });
        }

        Ok(history)
    }

    /// Arg-max class per row, evaluated in order without dropout.
    pub fn predict(
        &self,
        model: &RepresentationModel,
        features: &[FeatureVector],
    ) -> Result<Vec<u8>> {
        let device = model.device().clone();
        let mut batches = BatchIterator::new(features.len(), self.stage.batch_size);
        let mut predictions = Vec::with_capacity(features.len());

        while let Some(batch) = batches.next_batch() {
            let inputs = gather_rows(features, batch, &device)?;
            let logits = model.downstream(&inputs, false)?;
            let preds: Vec<u32> = logits
                .argmax(candle_core::D::Minus1)
                .and_then(|p| p.to_vec1())
                .map_err(|e| ArpGuardError::Model(format!("argmax failed: {e}")))?;
            predictions.extend(preds.into_iter().map(|p| p.min(1) as u8));
        }
        Ok(predictions)
    }

    /// Predict the held-out split and compute metrics. No parameters change.
    pub fn evaluate(
        &self,
        model: &RepresentationModel,
        features: &[FeatureVector],
        labels: &[u8],
    ) -> Result<EvaluationMetrics> {
        check_split(features, labels)?;
        let predictions = self.predict(model, features)?;
        let metrics = compute_metrics(&predictions, labels)?;
        tracing::info!(
            accuracy = metrics.accuracy,
            precision = metrics.precision,
            recall = metrics.recall,
            f1 = metrics.f1,
            "Downstream evaluation complete"
        );
        Ok(metrics)
    }
}

fn check_split(features: &[FeatureVector], labels: &[u8]) -> Result<()> {
    if features.is_empty() {
        return Err(ArpGuardError::Training(
            "downstream stage needs at least one labeled example".to_string(),
        ));
    }
    if features.len() != labels.len() {
        return Err(ArpGuardError::Training(format!(
            "{} feature rows but {} labels",
            features.len(),
            labels.len()
        )));
    }
    Ok(())
}
