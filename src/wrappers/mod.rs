//! # Wrapper Layers
//!
//! Layers that change how another layer is applied without changing what it
//! computes.
//!
//! | Wrapper | Wraps | Effect |
//! |---------|-------|--------|
//! | [`TimeDistributed`] | any layer | applies it to every step of axis 1 |
//! | [`Bidirectional`] | a recurrent layer | runs it in both time directions and merges |
//!
//! Both serialize as `{"layer": {"className", "config"}, ...}` and are
//! reconstructed through [`crate::registry`].

mod bidirectional;
mod time_distributed;
mod wrapper;

pub use bidirectional::{Bidirectional, BidirectionalArgs, MergeMode};
pub use time_distributed::TimeDistributed;
pub use wrapper::Wrapper;
