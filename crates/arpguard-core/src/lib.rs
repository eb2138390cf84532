//! Core types, configuration, and errors for ArpGuard
//!
//! This crate contains the foundational types shared across all ArpGuard
//! components: the raw ARP packet record read from tabular exports, the
//! immutable experiment configuration consumed by the feature pipeline and
//! both trainers, and the error taxonomy.

use serde::{Deserialize, Serialize};

pub mod config;

pub use config::load_config;

// ---------------------------------------------------------------------------
// Packet records
// ---------------------------------------------------------------------------

/// Label value for normal ARP traffic.
pub const LABEL_NORMAL: u8 = 0;

/// Label value for ARP-spoofing traffic.
pub const LABEL_SPOOFING: u8 = 1;

/// Column holding the frame length.
pub const FRAME_LEN_COLUMN: &str = "frame.len";

/// Column holding the ARP operation code.
pub const OPCODE_COLUMN: &str = "arp.opcode";

/// Column holding the ground-truth label.
pub const LABEL_COLUMN: &str = "label";

/// One of the four high-cardinality ARP address attributes.
///
/// The declaration order of [`AddressField::ALL`] is the order in which the
/// encoded addresses appear at the end of every feature vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressField {
    /// Sender hardware (MAC) address.
    SrcHw,
    /// Target hardware (MAC) address.
    DstHw,
    /// Sender protocol (IPv4) address.
    SrcProto,
    /// Target protocol (IPv4) address.
    DstProto,
}

impl AddressField {
    /// All address attributes in declaration order.
    pub const ALL: [AddressField; 4] = [
        AddressField::SrcHw,
        AddressField::DstHw,
        AddressField::SrcProto,
        AddressField::DstProto,
    ];

    /// Name of the tabular column carrying this attribute.
    pub fn column_name(&self) -> &'static str {
        match self {
            AddressField::SrcHw => "arp.src.hw_mac",
            AddressField::DstHw => "arp.dst.hw_mac",
            AddressField::SrcProto => "arp.src.proto_ipv4",
            AddressField::DstProto => "arp.dst.proto_ipv4",
        }
    }
}

impl std::fmt::Display for AddressField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.column_name())
    }
}

/// One row of ARP packet attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    /// Captured frame length in bytes.
    #[serde(rename = "frame.len")]
    pub frame_len: u32,
    /// ARP operation code (1 = request, 2 = reply).
    #[serde(rename = "arp.opcode")]
    pub opcode: u16,
    /// Sender hardware address.
    #[serde(rename = "arp.src.hw_mac")]
    pub src_hw: String,
    /// Target hardware address.
    #[serde(rename = "arp.dst.hw_mac")]
    pub dst_hw: String,
    /// Sender protocol address.
    #[serde(rename = "arp.src.proto_ipv4")]
    pub src_proto: String,
    /// Target protocol address.
    #[serde(rename = "arp.dst.proto_ipv4")]
    pub dst_proto: String,
    /// Ground truth, present only for labeled splits.
    #[serde(default)]
    pub label: Option<u8>,
}

impl RawRecord {
    /// Returns the string form of the given address attribute.
    pub fn address(&self, field: AddressField) -> &str {
        match field {
            AddressField::SrcHw => &self.src_hw,
            AddressField::DstHw => &self.dst_hw,
            AddressField::SrcProto => &self.src_proto,
            AddressField::DstProto => &self.dst_proto,
        }
    }

    /// Whether this record is labeled as spoofing traffic.
    pub fn is_spoofing(&self) -> bool {
        self.label == Some(LABEL_SPOOFING)
    }
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Masked-feature sampling configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaskingConfig {
    /// Fraction of positions masked per example, in `[0, 1]`.
    #[serde(default = "default_mask_fraction")]
    pub fraction: f64,
    /// Value written into masked positions.
    #[serde(default)]
    pub sentinel: f32,
}

fn default_mask_fraction() -> f64 {
    0.15
}

impl Default for MaskingConfig {
    fn default() -> Self {
        Self {
            fraction: default_mask_fraction(),
            sentinel: 0.0,
        }
    }
}

/// Optimization schedule for one training stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageConfig {
    /// Number of full passes over the training split.
    #[serde(default = "default_epochs")]
    pub epochs: usize,
    /// Mini-batch size.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// AdamW learning rate.
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
}

fn default_epochs() -> usize {
    20
}

fn default_batch_size() -> usize {
    64
}

fn default_learning_rate() -> f64 {
    1e-3
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            epochs: default_epochs(),
            batch_size: default_batch_size(),
            learning_rate: default_learning_rate(),
        }
    }
}

/// Representation model shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Width of the first encoder layer.
    #[serde(default = "default_hidden_dim")]
    pub hidden_dim: usize,
    /// Width of the embedding produced by the encoder.
    #[serde(default = "default_embedding_dim")]
    pub embedding_dim: usize,
    /// Dropout probability applied after each encoder stage during training.
    #[serde(default = "default_dropout")]
    pub dropout: f32,
}

fn default_hidden_dim() -> usize {
    64
}

fn default_embedding_dim() -> usize {
    32
}

fn default_dropout() -> f32 {
    0.1
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            hidden_dim: default_hidden_dim(),
            embedding_dim: default_embedding_dim(),
            dropout: default_dropout(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level used when `RUST_LOG` is unset: `trace`, `debug`, `info`, `warn`, or `error`.
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Complete, immutable configuration of one training run.
///
/// The [`Default`] values are the fixed constants of the pipeline; a YAML file
/// loaded with [`load_config`] may replace them wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentConfig {
    /// Masked-feature sampling.
    #[serde(default)]
    pub masking: MaskingConfig,
    /// Pretext (masked reconstruction) stage.
    #[serde(default)]
    pub pretext: StageConfig,
    /// Downstream (frozen-encoder classification) stage.
    #[serde(default)]
    pub downstream: StageConfig,
    /// Model shape.
    #[serde(default)]
    pub model: ModelConfig,
    /// RNG seed for masking and shuffling. `None` draws from OS entropy.
    #[serde(default)]
    pub seed: Option<u64>,
    /// Logging.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            masking: MaskingConfig::default(),
            pretext: StageConfig::default(),
            downstream: StageConfig::default(),
            model: ModelConfig::default(),
            seed: None,
            logging: LoggingConfig::default(),
        }
    }
}

impl ExperimentConfig {
    /// Check every constant is usable before any stage starts.
    ///
    /// # Errors
    ///
    /// Returns [`ArpGuardError::Config`] naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        let fraction = self.masking.fraction;
        if !fraction.is_finite() || !(0.0..=1.0).contains(&fraction) {
            return Err(ArpGuardError::Config(format!(
                "masking.fraction must be in [0, 1], got {fraction}"
            )));
        }
        for (name, stage) in [("pretext", &self.pretext), ("downstream", &self.downstream)] {
            if stage.epochs == 0 {
                return Err(ArpGuardError::Config(format!("{name}.epochs must be > 0")));
            }
            if stage.batch_size == 0 {
                return Err(ArpGuardError::Config(format!(
                    "{name}.batch_size must be > 0"
                )));
            }
            if !(stage.learning_rate.is_finite() && stage.learning_rate > 0.0) {
                return Err(ArpGuardError::Config(format!(
                    "{name}.learning_rate must be positive, got {}",
                    stage.learning_rate
                )));
            }
        }
        if self.model.hidden_dim == 0 || self.model.embedding_dim == 0 {
            return Err(ArpGuardError::Config(
                "model.hidden_dim and model.embedding_dim must be > 0".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&self.model.dropout) {
            return Err(ArpGuardError::Config(format!(
                "model.dropout must be in [0, 1), got {}",
                self.model.dropout
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Core error types.
#[derive(thiserror::Error, Debug)]
pub enum ArpGuardError {
    /// An input file does not exist.
    #[error("Missing input file: {path}")]
    MissingInput {
        /// The path that was requested.
        path: String,
    },

    /// Reading or parsing tabular input failed.
    #[error("Input error: {0}")]
    Input(String),

    /// The transform state could not be fit.
    #[error("Transform fit failed: {0}")]
    Fit(String),

    /// `apply` was called before `fit`.
    #[error("Transform applied before it was fit")]
    NotFitted,

    /// An address value was not seen when the vocabulary was built.
    #[error("Unknown category {value:?} in column {column}")]
    UnknownCategory {
        /// Column holding the value.
        column: String,
        /// The unseen value.
        value: String,
    },

    /// An encoded value is not a finite number.
    #[error("Non-numeric value in column {column} at row {row}")]
    TypeConversion {
        /// Column producing the value.
        column: String,
        /// Row index within the applied batch.
        row: usize,
    },

    /// A model mode name that is not `encode`, `pretext`, or `downstream`.
    #[error("Unknown model mode: {0}")]
    UnknownMode(String),

    /// Tensor or model failure.
    #[error("Model error: {0}")]
    Model(String),

    /// Training stage contract violated.
    #[error("Training error: {0}")]
    Training(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization / deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias for `std::result::Result<T, ArpGuardError>`.
pub type Result<T> = std::result::Result<T, ArpGuardError>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
