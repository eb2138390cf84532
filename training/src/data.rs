//! CSV loading, label extraction, and batch iteration for both stages.

use arpguard_core::{ArpGuardError, RawRecord, Result, LABEL_NORMAL, LABEL_SPOOFING};
use arpguard_model::FeatureVector;
use candle_core::{Device, Tensor};
use rand::seq::SliceRandom;
use rand::Rng;
use std::path::Path;

/// Load packet records from a CSV export with a header row.
///
/// # Errors
///
/// Returns [`ArpGuardError::MissingInput`] if `path` does not exist and
/// [`ArpGuardError::Input`] if a row cannot be parsed.
pub fn load_records(path: &Path) -> Result<Vec<RawRecord>> {
    if !path.exists() {
        return Err(ArpGuardError::MissingInput {
            path: path.display().to_string(),
        });
    }
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| ArpGuardError::Input(format!("Failed to open {}: {e}", path.display())))?;

    let records = reader
        .deserialize::<RawRecord>()
        .enumerate()
        .map(|(i, row)| {
            row.map_err(|e| {
                ArpGuardError::Input(format!("{} row {}: {e}", path.display(), i + 1))
            })
        })
        .collect::<Result<Vec<_>>>()?;

    tracing::info!(
        path = %path.display(),
        records = records.len(),
        spoofing = records.iter().filter(|r| r.is_spoofing()).count(),
        "Loaded records"
    );
    Ok(records)
}

/// Labels of a split, or `None` if any record is unlabeled.
///
/// # Errors
///
/// Returns [`ArpGuardError::Input`] for a label other than 0 or 1.
pub fn labels_of(records: &[RawRecord]) -> Result<Option<Vec<u8>>> {
    let mut labels = Vec::with_capacity(records.len());
    for (row, record) in records.iter().enumerate() {
        match record.label {
            Some(l @ (LABEL_NORMAL | LABEL_SPOOFING)) => labels.push(l),
            Some(l) => {
                return Err(ArpGuardError::Input(format!(
                    "row {}: label must be 0 or 1, got {l}",
                    row + 1
                )))
            }
            None => return Ok(None),
        }
    }
    if labels.is_empty() {
        return Ok(None);
    }
    Ok(Some(labels))
}

/// Mini-batch iterator over row indices. Reshuffles each epoch.
pub struct BatchIterator {
    indices: Vec<usize>,
    batch_size: usize,
    pos: usize,
}

impl BatchIterator {
    pub fn new(len: usize, batch_size: usize) -> Self {
        Self {
            indices: (0..len).collect(),
            batch_size: batch_size.max(1),
            pos: 0,
        }
    }

    /// Reshuffle for a new epoch.
    pub fn reshuffle<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        self.indices.shuffle(rng);
        self.pos = 0;
    }

    /// Returns the next mini-batch of row indices, or None if the epoch is
    /// exhausted.
    pub fn next_batch(&mut self) -> Option<&[usize]> {
        let n = self.indices.len();
        if self.pos >= n {
            return None;
        }
        let start = self.pos;
        let end = (start + self.batch_size).min(n);
        self.pos = end;
        Some(&self.indices[start..end])
    }

    /// Number of batches per epoch.
    pub fn num_batches(&self) -> usize {
        self.indices.len().div_ceil(self.batch_size)
    }
}

/// Stack the selected feature rows into a `[batch, dim]` tensor.
pub fn gather_rows(rows: &[FeatureVector], indices: &[usize], device: &Device) -> Result<Tensor> {
    let dim = rows.first().map(Vec::len).unwrap_or(0);
    let mut flat = Vec::with_capacity(indices.len() * dim);
    for &i in indices {
        flat.extend_from_slice(&rows[i]);
    }
    Tensor::from_vec(flat, (indices.len(), dim), device)
        .map_err(|e| ArpGuardError::Model(format!("Failed to build feature batch: {e}")))
}

/// Label tensor (`i64`) for the selected rows.
pub fn gather_labels(labels: &[u8], indices: &[usize], device: &Device) -> Result<Tensor> {
    let batch: Vec<i64> = indices.iter().map(|&i| i64::from(labels[i])).collect();
    Tensor::new(batch.as_slice(), device)
        .map_err(|e| ArpGuardError::Model(format!("Failed to build label batch: {e}")))
}
