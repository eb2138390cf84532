//! Evaluation metrics for the downstream classifier.
//!
//! Computes confusion-matrix-derived metrics from predicted and ground-truth
//! labels. Class 0 = normal, class 1 = spoofing (positive).

use arpguard_core::{ArpGuardError, Result};
use serde::{Deserialize, Serialize};

/// 2×2 confusion matrix: rows = actual {0, 1}, columns = predicted {0, 1}.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix(pub [[usize; 2]; 2]);

impl ConfusionMatrix {
    /// Record one prediction.
    pub fn record(&mut self, actual: u8, predicted: u8) {
        let (a, p) = (usize::from(actual.min(1)), usize::from(predicted.min(1)));
        self.0[a][p] += 1;
    }

    pub fn tn(&self) -> usize {
        self.0[0][0]
    }

    pub fn fp(&self) -> usize {
        self.0[0][1]
    }

    pub fn fn_(&self) -> usize {
        self.0[1][0]
    }

    pub fn tp(&self) -> usize {
        self.0[1][1]
    }

    /// Total number of samples.
    pub fn total(&self) -> usize {
        self.0.iter().flatten().sum()
    }
}

/// Binary classification metrics computed from a confusion matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationMetrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    /// False positive rate = FP / (FP + TN).
    pub fpr: f64,
    /// Actual sample count per class `[normal, spoofing]`.
    pub support: [usize; 2],
    pub confusion_matrix: ConfusionMatrix,
}

impl EvaluationMetrics {
    /// Compute all metrics from a confusion matrix; zero divisions yield 0.
    pub fn from_confusion_matrix(cm: ConfusionMatrix) -> Self {
        let (tp, fp, tn, fn_count) = (cm.tp(), cm.fp(), cm.tn(), cm.fn_());

        let total = cm.total() as f64;
        let accuracy = if total > 0.0 {
            (tp + tn) as f64 / total
        } else {
            0.0
        };

        let precision = if tp + fp > 0 {
            tp as f64 / (tp + fp) as f64
        } else {
            0.0
        };

        let recall = if tp + fn_count > 0 {
            tp as f64 / (tp + fn_count) as f64
        } else {
            0.0
        };

        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };

        let fpr = if fp + tn > 0 {
            fp as f64 / (fp + tn) as f64
        } else {
            0.0
        };

        Self {
            accuracy,
            precision,
            recall,
            f1,
            fpr,
            support: [tn + fp, tp + fn_count],
            confusion_matrix: cm,
        }
    }
}

/// Compute evaluation metrics from predicted and ground-truth labels.
///
/// # Errors
///
/// Returns [`ArpGuardError::Training`] if the two slices differ in length.
pub fn compute_metrics(predictions: &[u8], labels: &[u8]) -> Result<EvaluationMetrics> {
    if predictions.len() != labels.len() {
        return Err(ArpGuardError::Training(format!(
            "{} predictions but {} labels",
            predictions.len(),
            labels.len()
        )));
    }

    let mut cm = ConfusionMatrix::default();
    for (&pred, &label) in predictions.iter().zip(labels.iter()) {
        cm.record(label, pred);
    }
    Ok(EvaluationMetrics::from_confusion_matrix(cm))
}

impl std::fmt::Display for EvaluationMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let cm = &self.confusion_matrix;
        write!(
            f,
            "acc={:.4} prec={:.4} rec={:.4} f1={:.4} fpr={:.4} (tp={} fp={} tn={} fn={})",
            self.accuracy,
            self.precision,
            self.recall,
            self.f1,
            self.fpr,
            cm.tp(),
            cm.fp(),
            cm.tn(),
            cm.fn_(),
        )
    }
}
