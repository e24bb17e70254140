//! romscope-core
//!
//! Core library for classifying the bytes of 16-bit console ROM images and
//! discovering 65816 code by control-flow traversal.
//!
//! The crate defines the address mapping, the CPU model, the analysis stages,
//! the read-only project model and the project database. All substantive
//! logic lives here so that it stays testable and reusable from frontends.

pub mod analysis;
pub mod cpu;
pub mod db;
pub mod error;
pub mod image;
pub mod mapping;
pub mod model;
pub mod project;
pub mod services;

/// Returns the library version as encoded at compile time.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
