//! ArpGuard training pipeline
//!
//! Two-stage learning over ARP packet records: a masked-feature pretext task
//! shapes the encoder, then a classification head is trained on top of the
//! frozen encoder and evaluated on the held-out split.
//!
//! # Modules
//!
//! - [`data`]: CSV loading, label extraction, batch iteration
//! - [`pretext`]: masked reconstruction training
//! - [`downstream`]: frozen-encoder classification and evaluation
//! - [`metrics`]: accuracy, precision, recall, F1, confusion matrix
//! - [`pipeline`]: end-to-end run and JSON report

pub mod data;
pub mod downstream;
pub mod metrics;
pub mod pipeline;
pub mod pretext;

/// Re-export commonly used types.
pub mod prelude {
    pub use crate::data::{load_records, BatchIterator};
    pub use crate::downstream::DownstreamTrainer;
    pub use crate::metrics::{compute_metrics, ConfusionMatrix, EvaluationMetrics};
    pub use crate::pipeline::{run, run_with_records, write_report, RunOutput, RunReport};
    pub use crate::pretext::{EpochLoss, PretextState, PretextTrainer};
}
