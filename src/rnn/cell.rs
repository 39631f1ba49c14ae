//! Dispatch over the cell kinds a [`RecurrentLayer`](super::RecurrentLayer)
//! can drive.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use serde::{Deserialize, Serialize};

use crate::cells::{CfCCell, CfcMode, LSTMCell};
use crate::error::{LayerError, Result};
use crate::weights::{ParamMut, ParamRef};

/// Which cell a recurrent layer runs; also fixes its registry class name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CellKind {
    #[serde(rename = "LSTM")]
    Lstm,
    #[serde(rename = "CfC")]
    CfC,
}

impl CellKind {
    pub fn class_name(&self) -> &'static str {
        match self {
            Self::Lstm => "LSTM",
            Self::CfC => "CfC",
        }
    }

    /// Number of state tensors the cell carries between steps.
    pub fn num_states(&self) -> usize {
        match self {
            Self::Lstm => 2,
            Self::CfC => 1,
        }
    }
}

#[derive(Debug)]
pub enum RecurrentCell<B: Backend> {
    Lstm(LSTMCell<B>),
    CfC(CfCCell<B>),
}

impl<B: Backend> RecurrentCell<B> {
    pub fn new(
        kind: CellKind,
        input_size: usize,
        units: usize,
        mode: CfcMode,
        device: &B::Device,
    ) -> Self {
        match kind {
            CellKind::Lstm => Self::Lstm(LSTMCell::new(input_size, units, device)),
            CellKind::CfC => Self::CfC(CfCCell::new(input_size, units, device).with_mode(mode)),
        }
    }

    pub fn input_size(&self) -> usize {
        match self {
            Self::Lstm(cell) => cell.input_size(),
            Self::CfC(cell) => cell.input_size(),
        }
    }

    /// Advance one step: `(output, new_states)`.
    pub fn step(
        &self,
        input: Tensor<B, 2>,
        states: Vec<Tensor<B, 2>>,
    ) -> Result<(Tensor<B, 2>, Vec<Tensor<B, 2>>)> {
        match self {
            Self::Lstm(cell) => {
                let [h, c]: [Tensor<B, 2>; 2] = states
                    .try_into()
                    .map_err(|_| LayerError::validation("an LSTM cell expects 2 states"))?;
                let (h, c) = cell.forward(input, (h, c));
                Ok((h.clone(), vec![h, c]))
            }
            Self::CfC(cell) => {
                let [h]: [Tensor<B, 2>; 1] = states
                    .try_into()
                    .map_err(|_| LayerError::validation("a CfC cell expects 1 state"))?;
                let (output, h) = cell.forward(input, h, 1.0)?;
                Ok((output, vec![h]))
            }
        }
    }

    pub fn params(&self) -> Vec<(String, ParamRef<'_, B>)> {
        match self {
            Self::Lstm(cell) => cell
                .params()
                .into_iter()
                .map(|(name, p)| (name.to_string(), p))
                .collect(),
            Self::CfC(cell) => cell.params(),
        }
    }

    pub fn params_mut(&mut self) -> Vec<(String, ParamMut<'_, B>)> {
        match self {
            Self::Lstm(cell) => cell
                .params_mut()
                .into_iter()
                .map(|(name, p)| (name.to_string(), p))
                .collect(),
            Self::CfC(cell) => cell.params_mut(),
        }
    }
}
