//! Core types for devspace.
//!
//! This crate contains:
//! - The shared error type
//! - The `Builder` contract implemented by the image build backends

pub mod builder;
pub mod error;

pub use builder::{BuildOptions, Builder, RegistryAuth};
pub use error::{Error, Result};
