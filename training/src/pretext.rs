//! Pretext stage: masked-feature reconstruction.
//!
//! Trains the encoder together with the reconstruction head. Every drawn
//! example gets a fresh mask, and the loss only counts masked positions.

use crate::data::{gather_rows, BatchIterator};
use arpguard_core::{ArpGuardError, MaskingConfig, Result, StageConfig};
use arpguard_model::{FeatureVector, MaskingSampler, RepresentationModel};
use candle_core::{Device, Tensor};
use candle_nn::Optimizer;
use rand::Rng;
use serde::Serialize;

/// Lower bound on the mask-sum denominator of the reconstruction loss.
pub const MASK_DENOMINATOR_FLOOR: f32 = 1e-8;

/// Per-epoch training record, shared by both stages.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EpochLoss {
    pub epoch: usize,
    /// Mean loss over non-skipped batches; NaN if every batch was skipped.
    pub loss: f64,
    pub batches: usize,
    pub skipped_batches: usize,
}

/// Lifecycle of a [`PretextTrainer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PretextState {
    Uninitialized,
    Training { epoch: usize },
    Converged,
}

/// Mean squared error over masked positions only:
/// `sum(mask * (recon - original)^2) / max(sum(mask), floor)`.
pub fn masked_reconstruction_loss(
    reconstruction: &Tensor,
    original: &Tensor,
    mask: &Tensor,
) -> Result<Tensor> {
    let compute = || -> candle_core::Result<Tensor> {
        let masked_error = reconstruction.sub(original)?.sqr()?.mul(mask)?.sum_all()?;
        let denominator = mask.sum_all()?.maximum(MASK_DENOMINATOR_FLOOR)?;
        masked_error.div(&denominator)
    };
    compute().map_err(|e| ArpGuardError::Model(format!("Reconstruction loss failed: {e}")))
}

/// Read a scalar loss tensor.
pub(crate) fn loss_value(loss: &Tensor) -> Result<f64> {
    loss.to_scalar::<f32>()
        .map(f64::from)
        .map_err(|e| ArpGuardError::Model(format!("Loss scalar failed: {e}")))
}

/// Trains encoder + reconstruction head for a fixed number of epochs.
pub struct PretextTrainer {
    stage: StageConfig,
    sampler: MaskingSampler,
    state: PretextState,
}

impl PretextTrainer {
    pub fn new(stage: &StageConfig, masking: &MaskingConfig) -> Result<Self> {
        Ok(Self {
            stage: stage.clone(),
            sampler: MaskingSampler::new(masking)?,
            state: PretextState::Uninitialized,
        })
    }

    pub fn state(&self) -> PretextState {
        self.state
    }

    /// Run every epoch over `features` and return the loss history.
    ///
    /// # Errors
    ///
    /// Fails if the trainer already ran, the encoder is frozen, `features` is
    /// empty or of the wrong width, or a tensor operation fails. Batches with
    /// a non-finite loss are skipped, not fatal.
    pub fn train<R: Rng + ?Sized>(
        &mut self,
        model: &mut RepresentationModel,
        features: &[FeatureVector],
        rng: &mut R,
    ) -> Result<Vec<EpochLoss>> {
        if self.state != PretextState::Uninitialized {
            return Err(ArpGuardError::Training(format!(
                "pretext trainer cannot restart from state {:?}",
                self.state
            )));
        }
        if features.is_empty() {
            return Err(ArpGuardError::Training(
                "pretext stage needs at least one example".to_string(),
            ));
        }
        let dim = model.input_dim();
        if let Some(row) = features.iter().position(|f| f.len() != dim) {
            return Err(ArpGuardError::Model(format!(
                "row {row} has width {}, model expects {dim}",
                features[row].len()
            )));
        }

        let mut optimizer = candle_nn::AdamW::new(
            model.pretext_vars()?,
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
            dim,
            mask_fraction = self.sampler.fraction(),
            masked_per_example = self.sampler.num_masked(dim),
            epochs = self.stage.epochs,
            batch_size = self.stage.batch_size,
            lr = self.stage.learning_rate,
            "Pretext training started"
        );

        for epoch in 1..=self.stage.epochs {
            self.state = PretextState::Training { epoch };
            batches.reshuffle(rng);

            let mut epoch_loss = 0.0;
            let mut batch_count = 0usize;
            let mut skipped = 0usize;

            while let Some(batch) = batches.next_batch() {
                let (masked, original, mask) =
                    self.masked_batch(features, batch, &device, rng)?;

                let reconstruction = model.pretext(&masked, true)?;
                let loss = masked_reconstruction_loss(&reconstruction, &original, &mask)?;
                let value = loss_value(&loss)?;
                if !value.is_finite() {
                    tracing::warn!(
                        epoch,
                        batch = batch_count + skipped,
                        loss = value,
                        "Skipping pretext batch with non-finite loss"
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
                "Pretext epoch complete"
            );

            history.push(EpochLoss {
                epoch,
                loss: avg_loss,
                batches: batch_count,
                skipped_batches: skipped,
            });
        }

        self.state = PretextState::Converged;
        Ok(history)
    }

    /// Draw fresh masks for `indices` and stack (masked, original, mask).
    fn masked_batch<R: Rng + ?Sized>(
        &self,
        features: &[FeatureVector],
        indices: &[usize],
        device: &Device,
        rng: &mut R,
    ) -> Result<(Tensor, Tensor, Tensor)> {
        let dim = features[indices[0]].len();
        let mut masked = Vec::with_capacity(indices.len() * dim);
        let mut mask = Vec::with_capacity(indices.len() * dim);
        for &i in indices {
            let example = self.sampler.sample(&features[i], rng);
            masked.extend(example.masked);
            mask.extend(example.mask);
        }

        let shape = (indices.len(), dim);
        let masked = Tensor::from_vec(masked, shape, device)
            .map_err(|e| ArpGuardError::Model(format!("Failed to build masked batch: {e}")))?;
        let mask = Tensor::from_vec(mask, shape, device)
            .map_err(|e| ArpGuardError::Model(format!("Failed to build mask batch: {e}")))?;
        let original = gather_rows(features, indices, device)?;
        Ok((masked, original, mask))
    }
}
