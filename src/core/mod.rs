//! Core error types shared by every layer of the crate.

mod error;

pub use error::{EntityError, Result};
