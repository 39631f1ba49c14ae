//! # seqwrap - Sequence wrapper layers on Burn
//!
//! Layers that reshape how another layer is applied over time:
//!
//! - **TimeDistributed**: apply any layer independently to every time step
//! - **Bidirectional**: run a recurrent layer in both time directions and merge
//!   the two streams (`concat`, `sum`, `mul`, `ave`, or unmerged)
//!
//! The wrapped layers are ordinary [`Layer`](layer::Layer) implementations:
//! [`Dense`](layers::Dense) and [`RecurrentLayer`](rnn::RecurrentLayer) (LSTM
//! and CfC cells) ship with the crate, and user layers plug in through
//! [`CustomObjects`](registry::CustomObjects).
//!
//! ## Quick Start
//!
//! ```rust
//! use burn::backend::NdArray;
//! use burn::tensor::Tensor;
//! use seqwrap::prelude::*;
//!
//! type Backend = NdArray<f32>;
//! let device = Default::default();
//!
//! let lstm = RecurrentLayer::<Backend>::lstm(3, &device).with_return_sequences(true);
//! let mut bi = Bidirectional::new(Box::new(lstm), Some(MergeMode::Concat)).unwrap();
//!
//! let x: DynTensor<Backend> = Tensor::<Backend, 3>::zeros([2, 5, 4], &device).into();
//! let y = bi.apply(x.into(), ApplyOptions::new()).unwrap();
//! assert_eq!(y.first().unwrap().shape(), Shape::from([2, 5, 6]));
//! ```
//!
//! ## Shape-only inference
//!
//! Passing a [`SymbolicTensor`](tensor::SymbolicTensor) to `apply` builds the
//! layer and returns output shapes without computing anything:
//!
//! ```ignore
//! let mut td = TimeDistributed::new(Box::new(Dense::<Backend>::new(1, &device)));
//! let out = td.apply(SymbolicTensor::new(Shape::batched(&[3, 4])).into(), ApplyOptions::new())?;
//! // [None, 3, 1]
//! ```

pub mod activation;
pub mod backend;
pub mod cells;
pub mod config;
pub mod error;
pub mod layer;
pub mod layers;
pub mod registry;
pub mod rnn;
pub mod shape;
pub mod tensor;
pub mod weights;
pub mod wrappers;

pub mod prelude {
    pub use crate::activation::{Activation, LeCun};
    pub use crate::cells::{CfCCell, CfcMode, LSTMCell};
    pub use crate::config::{ConfigDict, SerializedLayer};
    pub use crate::error::{LayerError, Result};
    pub use crate::layer::{ApplyOptions, CallOptions, Layer};
    pub use crate::layers::Dense;
    pub use crate::registry::{clone_layer, deserialize, serialize, CustomObjects, LayerKind};
    pub use crate::rnn::RecurrentLayer;
    pub use crate::shape::{InputSpec, Shape};
    pub use crate::tensor::{DynTensor, OneOrMany, SymbolicTensor, TensorValue};
    pub use crate::wrappers::{Bidirectional, BidirectionalArgs, MergeMode, TimeDistributed};
}
