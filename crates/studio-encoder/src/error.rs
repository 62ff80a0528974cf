//! Error types for the encoder module.

use thiserror::Error;

/// Errors that can occur while creating or configuring bindings.
#[derive(Debug, Error)]
pub enum EncoderError {
    /// Unknown encoder type identifier.
    #[error("Unknown encoder type: {0}")]
    UnknownType(String),

    /// Unknown service type identifier.
    #[error("Unknown service type: {0}")]
    UnknownService(String),

    /// Empty instance name.
    #[error("Binding name must not be empty")]
    EmptyName,

    /// Settings change while an output is using the binding.
    #[error("{name} is in use by {outputs} output(s)")]
    InUse { name: String, outputs: usize },

    /// A setting value is unusable.
    #[error("Invalid setting: {0}")]
    InvalidSetting(String),
}
