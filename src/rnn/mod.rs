//! # Recurrent Layers
//!
//! [`RecurrentLayer`] drives one of the cells in [`crate::cells`] across the
//! time axis of a `[batch, time, features]` input using
//! [`backend::rnn`](crate::backend::rnn).
//!
//! | Constructor | Class name | States |
//! |-------------|------------|--------|
//! | [`RecurrentLayer::lstm`] | `LSTM` | hidden, cell |
//! | [`RecurrentLayer::cfc`] | `CfC` | hidden |
//!
//! ## Output
//!
//! | Setting | Shape |
//! |---------|-------|
//! | `return_sequences=false` (default) | `[batch, units]` |
//! | `return_sequences=true` | `[batch, time, units]` |
//!
//! With `return_state=true` the final states follow the output, each of
//! shape `[batch, units]`.
//!
//! ```ignore
//! use seqwrap::prelude::*;
//!
//! let mut lstm = RecurrentLayer::<Backend>::lstm(32, &device).with_return_sequences(true);
//! let out = lstm.apply(input.into(), ApplyOptions::new())?;
//! ```

mod cell;
mod recurrent;

pub use cell::{CellKind, RecurrentCell};
pub use recurrent::{RecurrentConfig, RecurrentLayer};
