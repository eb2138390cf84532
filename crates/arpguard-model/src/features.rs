//! Tabular feature pipeline for ARP packet records.
//!
//! Turns [`RawRecord`]s into fixed-width `f32` vectors consumed by both the
//! pretext and the downstream stage. The transform is fit once on the pooled
//! train+test records and then applied, unmodified, to each split. Addresses
//! are identifiers rather than statistics, so their vocabularies are closed
//! over the pooled set.
//!
//! # Feature Vector Layout
//!
//! | Block | Width | Encoding |
//! |-------|-------|----------|
//! | `frame.len` | 1 | standardized `(x - mean) / scale` |
//! | `arp.opcode` | one per fitted category | one-hot, unseen category → all zeros |
//! | addresses | 4 | integer code in the sorted vocabulary |

use arpguard_core::{
    AddressField, ArpGuardError, RawRecord, Result, FRAME_LEN_COLUMN, OPCODE_COLUMN,
};
use std::collections::{BTreeSet, HashMap};

/// A fixed-length encoded record.
pub type FeatureVector = Vec<f32>;

/// Mean/scale standardizer for the numeric attribute.
#[derive(Debug, Clone, PartialEq)]
pub struct StandardScaler {
    mean: f64,
    scale: f64,
}

impl StandardScaler {
    /// Fit population moments over `values`.
    ///
    /// A zero-variance column gets `scale = 1.0`.
    pub fn fit(values: &[f64]) -> Result<Self> {
        if values.is_empty() {
            return Err(ArpGuardError::Fit(format!(
                "column {FRAME_LEN_COLUMN} has no values"
            )));
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err(ArpGuardError::Fit(format!(
                "column {FRAME_LEN_COLUMN} contains non-finite values"
            )));
        }
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        let std = variance.sqrt();
        let scale = if std > 0.0 { std } else { 1.0 };
        Ok(Self { mean, scale })
    }

    pub fn transform(&self, value: f64) -> f64 {
        (value - self.mean) / self.scale
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }
}

/// One-hot encoder over a fixed category vocabulary.
#[derive(Debug, Clone, PartialEq)]
pub struct OneHotEncoder {
    categories: Vec<u16>,
}

impl OneHotEncoder {
    /// Learn the sorted set of observed categories.
    pub fn fit(values: impl IntoIterator<Item = u16>) -> Result<Self> {
        let categories: Vec<u16> = values
            .into_iter()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if categories.is_empty() {
            return Err(ArpGuardError::Fit(format!(
                "column {OPCODE_COLUMN} has no values"
            )));
        }
        Ok(Self { categories })
    }

    /// Categories in column order.
    pub fn categories(&self) -> &[u16] {
        &self.categories
    }

    /// Write the indicator block for `value` into `out`. Unseen values leave
    /// every column at zero.
    fn encode_into(&self, value: u16, out: &mut Vec<f32>) {
        out.extend(
            self.categories
                .iter()
                .map(|&c| if c == value { 1.0 } else { 0.0 }),
        );
    }
}

/// Integer vocabulary for one address attribute.
#[derive(Debug, Clone, PartialEq)]
pub struct AddressVocabulary {
    field: AddressField,
    classes: Vec<String>,
    index: HashMap<String, usize>,
}

impl AddressVocabulary {
    /// Build the sorted vocabulary of observed values.
    pub fn fit<'a>(
        field: AddressField,
        values: impl IntoIterator<Item = &'a str>,
    ) -> Result<Self> {
        let classes: Vec<String> = values
            .into_iter()
            .map(str::to_string)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if classes.is_empty() {
            return Err(ArpGuardError::Fit(format!("column {field} has no values")));
        }
        let index = classes
            .iter()
            .enumerate()
            .map(|(i, c)| (c.clone(), i))
            .collect();
        Ok(Self {
            field,
            classes,
            index,
        })
    }

    /// Code of `value`, or [`ArpGuardError::UnknownCategory`] when it was not
    /// seen at fit time.
    pub fn encode(&self, value: &str) -> Result<usize> {
        self.index
            .get(value)
            .copied()
            .ok_or_else(|| ArpGuardError::UnknownCategory {
                column: self.field.column_name().to_string(),
                value: value.to_string(),
            })
    }

    pub fn field(&self) -> AddressField {
        self.field
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

/// Fitted state of the feature pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformState {
    scaler: StandardScaler,
    opcode: OneHotEncoder,
    addresses: Vec<AddressVocabulary>,
}

impl TransformState {
    /// Fit every encoder on the pooled records. Labels are never read.
    ///
    /// # Errors
    ///
    /// Returns [`ArpGuardError::Fit`] when the pooled set is empty.
    pub fn fit<'a>(pooled: impl IntoIterator<Item = &'a RawRecord>) -> Result<Self> {
        let pooled: Vec<&RawRecord> = pooled.into_iter().collect();

        let frame_lens: Vec<f64> = pooled.iter().map(|r| f64::from(r.frame_len)).collect();
        let scaler = StandardScaler::fit(&frame_lens)?;
        let opcode = OneHotEncoder::fit(pooled.iter().map(|r| r.opcode))?;
        let addresses = AddressField::ALL
            .iter()
            .map(|&field| {
                AddressVocabulary::fit(field, pooled.iter().map(|r| r.address(field)))
            })
            .collect::<Result<Vec<_>>>()?;

        tracing::debug!(
            records = pooled.len(),
            frame_len_mean = scaler.mean,
            frame_len_scale = scaler.scale,
            opcode_categories = ?opcode.categories,
            address_vocab = ?addresses.iter().map(AddressVocabulary::len).collect::<Vec<_>>(),
            "Fitted feature transform"
        );

        Ok(Self {
            scaler,
            opcode,
            addresses,
        })
    }

    /// Encode `records` into feature vectors, in input order.
    ///
    /// # Errors
    ///
    /// Returns [`ArpGuardError::UnknownCategory`] for an address outside the
    /// fitted vocabulary and [`ArpGuardError::TypeConversion`] if a produced
    /// value is not a finite number.
    pub fn apply(&self, records: &[RawRecord]) -> Result<Vec<FeatureVector>> {
        let dim = self.feature_dim();
        records
            .iter()
            .enumerate()
            .map(|(row, record)| {
                let mut features = Vec::with_capacity(dim);
                features.push(self.scaler.transform(f64::from(record.frame_len)) as f32);
                self.opcode.encode_into(record.opcode, &mut features);
                for vocab in &self.addresses {
                    features.push(vocab.encode(record.address(vocab.field))? as f32);
                }
                if let Some(col) = features.iter().position(|v| !v.is_finite()) {
                    return Err(ArpGuardError::TypeConversion {
                        column: self.feature_names()[col].clone(),
                        row,
                    });
                }
                Ok(features)
            })
            .collect()
    }

    /// Length of every produced feature vector.
    pub fn feature_dim(&self) -> usize {
        1 + self.opcode.categories.len() + self.addresses.len()
    }

    /// Column names in feature-vector order.
    pub fn feature_names(&self) -> Vec<String> {
        let mut names = Vec::with_capacity(self.feature_dim());
        names.push(FRAME_LEN_COLUMN.to_string());
        names.extend(
            self.opcode
                .categories
                .iter()
                .map(|c| format!("{OPCODE_COLUMN}={c}")),
        );
        names.extend(
            self.addresses
                .iter()
                .map(|v| v.field.column_name().to_string()),
        );
        names
    }

    pub fn scaler(&self) -> &StandardScaler {
        &self.scaler
    }

    pub fn opcode_encoder(&self) -> &OneHotEncoder {
        &self.opcode
    }

    pub fn address_vocabularies(&self) -> &[AddressVocabulary] {
        &self.addresses
    }
}

/// Feature pipeline holding an optional fitted state.
///
/// `fit` may run once; `apply` before `fit` is an error.
#[derive(Debug, Clone, Default)]
pub struct FeaturePipeline {
    state: Option<TransformState>,
}

impl FeaturePipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fit the transform on the pooled train+test records.
    pub fn fit<'a>(
        &mut self,
        pooled: impl IntoIterator<Item = &'a RawRecord>,
    ) -> Result<&TransformState> {
        if self.state.is_some() {
            return Err(ArpGuardError::Fit(
                "feature pipeline has already been fit".to_string(),
            ));
        }
        Ok(self.state.insert(TransformState::fit(pooled)?))
    }

    /// Apply the fitted transform to one split.
    pub fn apply(&self, records: &[RawRecord]) -> Result<Vec<FeatureVector>> {
        self.state
            .as_ref()
            .ok_or(ArpGuardError::NotFitted)?
            .apply(records)
    }

    pub fn state(&self) -> Option<&TransformState> {
        self.state.as_ref()
    }

    pub fn is_fitted(&self) -> bool {
        self.state.is_some()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
