//! # RNN Cell Implementations
//!
//! Single-timestep cells. They are driven across a sequence by
//! [`RecurrentLayer`](crate::rnn::RecurrentLayer), which is what users
//! normally wrap in [`Bidirectional`](crate::wrappers::Bidirectional).
//!
//! | Cell | Description | States |
//! |------|-------------|--------|
//! | [`LSTMCell`] | Standard LSTM | hidden, cell |
//! | [`CfCCell`] | Closed-form Continuous-time | hidden |
//!
//! ## CfC Operating Modes
//!
//! The [`CfCCell`] supports three operating modes via [`CfcMode`]:
//!
//! ### Default Mode (Recommended)
//! ```text
//! h = tanh(ff1) × (1 - σ(t)) + tanh(ff2) × σ(t)
//! ```
//!
//! ### Pure Mode
//! ```text
//! h = a - a × exp(-t × (|w_τ| + |ff1|)) × ff1
//! ```
//!
//! ### NoGate Mode
//! ```text
//! h = tanh(ff1) + tanh(ff2) × σ(t)
//! ```
//!
//! ## Tensor Shapes
//!
//! | Tensor | Shape |
//! |--------|-------|
//! | `input` | `[batch, input_size]` |
//! | `hidden_state` | `[batch, hidden_size]` |
//! | `output` | `[batch, hidden_size]` |

pub mod cfc_cell;
pub mod lstm_cell;

pub use cfc_cell::{CfCCell, CfcMode};
pub use lstm_cell::LSTMCell;
