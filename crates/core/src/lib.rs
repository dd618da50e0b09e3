//! `fynelo-core`: domain building blocks.
//!
//! This crate contains **pure domain** primitives shared by the queue, the
//! worker and the HTTP surface (no infrastructure concerns).

pub mod error;
pub mod id;
pub mod value_object;

pub use error::{DomainError, DomainResult};
pub use id::{JobId, UserId};
pub use value_object::ValueObject;
