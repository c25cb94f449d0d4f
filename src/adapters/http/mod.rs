//! HTTP adapters for external collaborators.

pub mod inference;

pub use inference::{HttpInferenceClient, HttpInferenceConfig};
