//! Feature pipeline, masking sampler, and representation model for ArpGuard
//!
//! This crate turns raw ARP packet records into fixed-width feature vectors,
//! draws masked views of those vectors for the pretext task, and holds the
//! shared encoder with its reconstruction and classification heads.
//!
//! # Modules
//!
//! - [`features`]: pooled-fit / per-split-apply tabular transform
//! - [`masking`]: masked-feature sampling
//! - [`model`]: encoder plus pretext and downstream heads
//! - [`device`]: compute device selection

pub mod device;
pub mod features;
pub mod masking;
pub mod model;

pub use device::select_device;
pub use features::{FeaturePipeline, FeatureVector, TransformState};
pub use masking::{MaskedExample, MaskingSampler};
pub use model::{ForwardMode, RepresentationModel, NUM_CLASSES};
