//! Plain feed-forward layers.

pub mod dense;

pub use dense::{Dense, DenseConfig};
