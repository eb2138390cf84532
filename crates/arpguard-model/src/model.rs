//! Representation model shared by the pretext and downstream stages.
//!
//! A two-stage feed-forward encoder maps a feature vector to an embedding;
//! two linear heads sit on top of it:
//!
//! ```text
//!                         ┌─ reconstruction: Linear(embedding → d)   (pretext)
//! Input (d) → Linear(hidden) → ReLU → Dropout
//!           → Linear(embedding) → ReLU → Dropout
//!                         └─ classification: Linear(embedding → 2)   (downstream)
//! ```
//!
//! Encoder and heads keep their parameters in separate [`VarMap`]s so each
//! stage optimizes exactly its trainable subset. Once the encoder is frozen,
//! downstream forwards detach the embedding from the autograd graph.

use std::path::Path;
use std::str::FromStr;

use arpguard_core::{ArpGuardError, ModelConfig, Result};
use candle_core::{DType, Device, Tensor, Var};
use candle_nn::{Dropout, VarBuilder, VarMap};

/// Number of output classes (normal, spoofing).
pub const NUM_CLASSES: usize = 2;

/// Which head, if any, follows the shared encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ForwardMode {
    /// Embedding only.
    Encode,
    /// Reconstruction head output, one value per input position.
    Pretext,
    /// Classification head output, two logits.
    Downstream,
}

impl ForwardMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ForwardMode::Encode => "encode",
            ForwardMode::Pretext => "pretext",
            ForwardMode::Downstream => "downstream",
        }
    }
}

impl FromStr for ForwardMode {
    type Err = ArpGuardError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "encode" => Ok(ForwardMode::Encode),
            "pretext" => Ok(ForwardMode::Pretext),
            "downstream" => Ok(ForwardMode::Downstream),
            other => Err(ArpGuardError::UnknownMode(other.to_string())),
        }
    }
}

impl std::fmt::Display for ForwardMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shared encoder with reconstruction and classification heads.
pub struct RepresentationModel {
    encoder_vars: VarMap,
    reconstruction_vars: VarMap,
    classification_vars: VarMap,
    fc1: candle_nn::Linear,
    fc2: candle_nn::Linear,
    dropout: Dropout,
    reconstruction: candle_nn::Linear,
    classification: candle_nn::Linear,
    input_dim: usize,
    embedding_dim: usize,
    encoder_frozen: bool,
    device: Device,
}

impl RepresentationModel {
    /// Create a model with freshly initialized weights for `input_dim`-wide
    /// feature vectors.
    pub fn new(input_dim: usize, config: &ModelConfig, device: &Device) -> Result<Self> {
        if input_dim == 0 {
            return Err(ArpGuardError::Model(
                "input dimension must be > 0".to_string(),
            ));
        }

        let encoder_vars = VarMap::new();
        let reconstruction_vars = VarMap::new();
        let classification_vars = VarMap::new();

        let vb = VarBuilder::from_varmap(&encoder_vars, DType::F32, device);
        let fc1 = candle_nn::linear(input_dim, config.hidden_dim, vb.pp("encoder.fc1"))
            .map_err(|e| ArpGuardError::Model(format!("Failed to create encoder fc1: {e}")))?;
        let fc2 = candle_nn::linear(config.hidden_dim, config.embedding_dim, vb.pp("encoder.fc2"))
            .map_err(|e| ArpGuardError::Model(format!("Failed to create encoder fc2: {e}")))?;

        let vb = VarBuilder::from_varmap(&reconstruction_vars, DType::F32, device);
        let reconstruction =
            candle_nn::linear(config.embedding_dim, input_dim, vb.pp("reconstruction"))
                .map_err(|e| {
                    ArpGuardError::Model(format!("Failed to create reconstruction head: {e}"))
                })?;

        let vb = VarBuilder::from_varmap(&classification_vars, DType::F32, device);
        let classification =
            candle_nn::linear(config.embedding_dim, NUM_CLASSES, vb.pp("classification"))
                .map_err(|e| {
                    ArpGuardError::Model(format!("Failed to create classification head: {e}"))
                })?;

        Ok(Self {
            encoder_vars,
            reconstruction_vars,
            classification_vars,
            fc1,
            fc2,
            dropout: Dropout::new(config.dropout),
            reconstruction,
            classification,
            input_dim,
            embedding_dim: config.embedding_dim,
            encoder_frozen: false,
            device: device.clone(),
        })
    }

    /// Map a `[batch, input_dim]` tensor to `[batch, embedding_dim]`.
    ///
    /// Dropout is applied only when `train` is set.
    pub fn encode(&self, xs: &Tensor, train: bool) -> Result<Tensor> {
        let h = candle_nn::Module::forward(&self.fc1, xs)
            .and_then(|h| h.relu())
            .and_then(|h| self.dropout.forward(&h, train))
            .map_err(|e| ArpGuardError::Model(format!("Encoder stage 1 failed: {e}")))?;
        candle_nn::Module::forward(&self.fc2, &h)
            .and_then(|h| h.relu())
            .and_then(|h| self.dropout.forward(&h, train))
            .map_err(|e| ArpGuardError::Model(format!("Encoder stage 2 failed: {e}")))
    }

    /// Reconstruct every input position: `[batch, input_dim]`.
    pub fn pretext(&self, xs: &Tensor, train: bool) -> Result<Tensor> {
        let embedding = self.encode(xs, train)?;
        candle_nn::Module::forward(&self.reconstruction, &embedding)
            .map_err(|e| ArpGuardError::Model(format!("Reconstruction head failed: {e}")))
    }

    /// Class logits: `[batch, 2]`.
    pub fn downstream(&self, xs: &Tensor, train: bool) -> Result<Tensor> {
        let mut embedding = self.encode(xs, train)?;
        if self.encoder_frozen {
            embedding = embedding.detach();
        }
        candle_nn::Module::forward(&self.classification, &embedding)
            .map_err(|e| ArpGuardError::Model(format!("Classification head failed: {e}")))
    }

    /// Dispatch to [`encode`](Self::encode), [`pretext`](Self::pretext), or
    /// [`downstream`](Self::downstream).
    pub fn forward(&self, xs: &Tensor, mode: ForwardMode, train: bool) -> Result<Tensor> {
        match mode {
            ForwardMode::Encode => self.encode(xs, train),
            ForwardMode::Pretext => self.pretext(xs, train),
            ForwardMode::Downstream => self.downstream(xs, train),
        }
    }

    /// Exclude the encoder from every later update. May be called once.
    pub fn freeze_encoder(&mut self) -> Result<()> {
        if self.encoder_frozen {
            return Err(ArpGuardError::Training(
                "encoder is already frozen".to_string(),
            ));
        }
        self.encoder_frozen = true;
        tracing::info!(
            encoder_params = self.encoder_vars.all_vars().len(),
            "Encoder frozen"
        );
        Ok(())
    }

    pub fn is_encoder_frozen(&self) -> bool {
        self.encoder_frozen
    }

    /// Parameters optimized by the pretext stage: encoder + reconstruction
    /// head. Fails once the encoder is frozen.
    pub fn pretext_vars(&self) -> Result<Vec<Var>> {
        if self.encoder_frozen {
            return Err(ArpGuardError::Training(
                "cannot pretrain a frozen encoder".to_string(),
            ));
        }
        let mut vars = self.encoder_vars.all_vars();
        vars.extend(self.reconstruction_vars.all_vars());
        Ok(vars)
    }

    /// Parameters optimized by the downstream stage: classification head only.
    pub fn downstream_vars(&self) -> Vec<Var> {
        self.classification_vars.all_vars()
    }

    /// Encoder parameters, e.g. for inspection.
    pub fn encoder_vars(&self) -> Vec<Var> {
        self.encoder_vars.all_vars()
    }

    /// Save encoder weights as safetensors.
    pub fn save_encoder(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        self.encoder_vars
            .save(path)
            .map_err(|e| ArpGuardError::Model(format!("Failed to save encoder: {e}")))
    }

    pub fn input_dim(&self) -> usize {
        self.input_dim
    }

    pub fn embedding_dim(&self) -> usize {
        self.embedding_dim
    }

    /// Returns a reference to the device the parameters live on.
    pub fn device(&self) -> &Device {
        &self.device
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ModelConfig {
        ModelConfig {
            hidden_dim: 16,
            embedding_dim: 8,
            dropout: 0.1,
        }
    }

    fn model() -> RepresentationModel {
        RepresentationModel::new(7, &config(), &Device::Cpu).unwrap()
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("encode".parse::<ForwardMode>().unwrap(), ForwardMode::Encode);
        assert_eq!("pretext".parse::<ForwardMode>().unwrap(), ForwardMode::Pretext);
        assert_eq!(
            "downstream".parse::<ForwardMode>().unwrap(),
            ForwardMode::Downstream
        );
        assert_eq!(ForwardMode::Pretext.to_string(), "pretext");
    }

    #[test]
    fn test_unknown_mode_rejected() {
        let err = "classify".parse::<ForwardMode>().unwrap_err();
        assert!(matches!(err, ArpGuardError::UnknownMode(ref m) if m == "classify"));
    }

    #[test]
    fn test_output_shapes_per_mode() {
        let m = model();
        let xs = Tensor::ones((5, 7), DType::F32, &Device::Cpu).unwrap();
        let enc = m.forward(&xs, ForwardMode::Encode, false).unwrap();
        assert_eq!(enc.dims(), &[5, 8]);
        let rec = m.forward(&xs, ForwardMode::Pretext, false).unwrap();
        assert_eq!(rec.dims(), &[5, 7]);
        let logits = m.forward(&xs, ForwardMode::Downstream, false).unwrap();
        assert_eq!(logits.dims(), &[5, NUM_CLASSES]);
    }

    #[test]
    fn test_eval_forward_is_deterministic() {
        let m = model();
        let xs = Tensor::ones((3, 7), DType::F32, &Device::Cpu).unwrap();
        let a: Vec<Vec<f32>> = m.pretext(&xs, false).unwrap().to_vec2().unwrap();
        let b: Vec<Vec<f32>> = m.pretext(&xs, false).unwrap().to_vec2().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_zero_input_dim_rejected() {
        assert!(RepresentationModel::new(0, &config(), &Device::Cpu).is_err());
    }

    #[test]
    fn test_freeze_once() {
        let mut m = model();
        assert!(!m.is_encoder_frozen());
        assert_eq!(m.pretext_vars().unwrap().len(), 6);
        m.freeze_encoder().unwrap();
        assert!(m.is_encoder_frozen());
        assert!(m.freeze_encoder().is_err());
        assert!(m.pretext_vars().is_err());
        assert_eq!(m.downstream_vars().len(), 2);
    }

    #[test]
    fn test_save_encoder_writes_file() {
        let m = model();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weights").join("encoder.safetensors");
        m.save_encoder(&path).unwrap();
        assert!(path.exists());
    }
}
