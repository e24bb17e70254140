//! Error taxonomy for the analysis pipeline.
//!
//! Only [`ImageError::CorruptImage`] and cancellation abort a run. Everything
//! else is recoverable: the pipeline turns it into a [`Diagnostic`] and lowers
//! the confidence of the affected region or marks the affected function as
//! partial.
//!
//! [`Diagnostic`]: crate::model::Diagnostic

use std::path::PathBuf;

use thiserror::Error;

use crate::mapping::MappingMode;
use crate::model::Address;

/// The declared mapping does not agree with the image, or an address does not
/// land inside the image.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MappingError {
    #[error("Invalid {mode} mapping for a {size:#X}-byte image: {reason}")]
    InvalidMapping { mode: MappingMode, size: usize, reason: String },

    #[error("Address {address} is not mapped to ROM under {mode}")]
    OutOfRange { address: Address, mode: MappingMode },

    #[error("ROM offset {offset:#X} is outside the {size:#X}-byte image")]
    OffsetOutOfRange { offset: usize, size: usize },
}

/// A truncated or otherwise undecodable instruction stream.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("Decode offset {offset:#X} is past the end of the image ({size:#X} bytes)")]
    OutOfBounds { offset: usize, size: usize },

    #[error("Instruction at {offset:#X} needs {needed} bytes but only {available} remain")]
    Truncated { offset: usize, needed: usize, available: usize },

    #[error("Reserved opcode {opcode:#04X} at {offset:#X}")]
    Reserved { offset: usize, opcode: u8 },

    #[error("Control transfer at {offset:#X} targets {target}, which is not in the image")]
    TargetOutOfRange { offset: usize, target: Address },
}

/// A function walk exceeded one of the configured traversal limits.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Function at {entry:#X} exceeded the {limit} limit ({value})")]
pub struct TraversalLimitExceeded {
    pub entry: usize,
    pub limit: TraversalLimit,
    pub value: usize,
}

/// Which traversal budget was exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraversalLimit {
    FunctionBytes,
    Instructions,
    Blocks,
}

impl std::fmt::Display for TraversalLimit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TraversalLimit::FunctionBytes => "function size",
            TraversalLimit::Instructions => "instruction count",
            TraversalLimit::Blocks => "block count",
        };
        f.write_str(name)
    }
}

/// Errors raised while loading an image. `CorruptImage` is fatal.
#[derive(Debug, Error)]
pub enum ImageError {
    #[error("Corrupt image: {size:#X} bytes is below the minimum of {minimum:#X}")]
    CorruptImage { size: usize, minimum: usize },

    #[error("Failed to read ROM image at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors that abort an analysis run.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error(transparent)]
    Image(#[from] ImageError),

    #[error("Analysis cancelled before {stage}")]
    Cancelled { stage: &'static str },

    #[error("Invalid analysis profile: {0}")]
    Profile(String),
}
