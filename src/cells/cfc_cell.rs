//! Closed-form Continuous-time (CfC) Cell Implementation
//!
//! The CfC cell is a fast approximation of the LTC (Liquid Time-Constant) cell.
//! It provides closed-form solutions to continuous-time neural dynamics without
//! requiring iterative ODE solvers.
//!
//! Three modes are supported:
//! - **Default**: Gated interpolation between two feedforward paths
//! - **Pure**: Direct ODE solution without gating
//! - **NoGate**: Simplified gating with addition instead of interpolation

use burn::module::Module;
use burn::nn::{Linear, LinearConfig};
use burn::tensor::activation;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use serde::{Deserialize, Serialize};

use crate::error::{LayerError, Result};
use crate::weights::{ParamMut, ParamRef};

/// CfC cell operating modes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CfcMode {
    /// Default gated mode: h = tanh(ff1) * (1 - σ) + tanh(ff2) * σ
    #[default]
    Default = 0,
    /// Pure ODE solution without gating
    Pure = 1,
    /// No-gate mode: h = ff1 + tanh(ff2) * σ
    NoGate = 2,
}

/// A Closed-form Continuous-time cell
///
/// This is an RNNCell that processes single time-steps. To process whole
/// sequences, use [`RecurrentLayer::cfc`](crate::rnn::RecurrentLayer::cfc).
///
/// # Type Parameters
/// * `B` - The backend type
#[derive(Module, Debug)]
pub struct CfCCell<B: Backend> {
    input_size: usize,
    hidden_size: usize,
    /// Mode: 0=Default, 1=Pure, 2=NoGate
    mode: u8,
    ff1: Linear<B>,
    ff2: Option<Linear<B>>,
    time_a: Option<Linear<B>>,
    time_b: Option<Linear<B>>,
    w_tau: Option<Linear<B>>,
    a: Option<Linear<B>>,
}

impl<B: Backend> CfCCell<B> {
    /// Create a new CfC cell
    pub fn new(input_size: usize, hidden_size: usize, device: &B::Device) -> Self {
        let ff1 = LinearConfig::new(input_size + hidden_size, hidden_size)
            .with_bias(true)
            .init(device);

        let ff2 = LinearConfig::new(input_size + hidden_size, hidden_size)
            .with_bias(true)
            .init(device);

        let time_a = LinearConfig::new(input_size + hidden_size, hidden_size)
            .with_bias(true)
            .init(device);

        let time_b = LinearConfig::new(input_size + hidden_size, hidden_size)
            .with_bias(true)
            .init(device);

        Self {
            input_size,
            hidden_size,
            mode: 0, // Default
            ff1,
            ff2: Some(ff2),
            time_a: Some(time_a),
            time_b: Some(time_b),
            w_tau: None,
            a: None,
        }
    }

    /// Set the CfC mode (Default, Pure, or NoGate)
    pub fn with_mode(mut self, mode: CfcMode) -> Self {
        self.mode = match mode {
            CfcMode::Default => 0,
            CfcMode::Pure => 1,
            CfcMode::NoGate => 2,
        };
        self.reconfigure_for_mode();
        self
    }

    /// Get input size
    pub fn input_size(&self) -> usize {
        self.input_size
    }

    /// Get hidden size
    pub fn hidden_size(&self) -> usize {
        self.hidden_size
    }

    /// Get current mode
    pub fn mode(&self) -> CfcMode {
        match self.mode {
            0 => CfcMode::Default,
            1 => CfcMode::Pure,
            2 => CfcMode::NoGate,
            _ => CfcMode::Default,
        }
    }

    fn reconfigure_for_mode(&mut self) {
        let device = self.ff1.weight.device();

        match self.mode {
            1 => {
                // Pure mode: use w_tau and a, remove ff2/time parameters
                self.ff2 = None;
                self.time_a = None;
                self.time_b = None;

                self.w_tau = Some(
                    LinearConfig::new(1, self.hidden_size)
                        .with_bias(false)
                        .init(&device),
                );
                self.a = Some(
                    LinearConfig::new(1, self.hidden_size)
                        .with_bias(false)
                        .init(&device),
                );
            }
            _ => {
                // Default/NoGate mode: ensure ff2, time_a, time_b exist
                if self.ff2.is_none() {
                    self.ff2 = Some(
                        LinearConfig::new(self.input_size + self.hidden_size, self.hidden_size)
                            .with_bias(true)
                            .init(&device),
                    );
                }
                if self.time_a.is_none() {
                    self.time_a = Some(
                        LinearConfig::new(self.input_size + self.hidden_size, self.hidden_size)
                            .with_bias(true)
                            .init(&device),
                    );
                }
                if self.time_b.is_none() {
                    self.time_b = Some(
                        LinearConfig::new(self.input_size + self.hidden_size, self.hidden_size)
                            .with_bias(true)
                            .init(&device),
                    );
                }
                self.w_tau = None;
                self.a = None;
            }
        }
    }

    /// Parameters of the active mode, named after their role.
    pub fn params(&self) -> Vec<(String, ParamRef<'_, B>)> {
        let mut params = Vec::new();
        let layers = [
            ("ff1", Some(&self.ff1)),
            ("ff2", self.ff2.as_ref()),
            ("time_a", self.time_a.as_ref()),
            ("time_b", self.time_b.as_ref()),
            ("w_tau", self.w_tau.as_ref()),
            ("a", self.a.as_ref()),
        ];
        for (name, linear) in layers {
            if let Some(linear) = linear {
                params.push((format!("{name}/kernel"), ParamRef::Matrix(&linear.weight)));
                if let Some(bias) = &linear.bias {
                    params.push((format!("{name}/bias"), ParamRef::Vector(bias)));
                }
            }
        }
        params
    }

    pub fn params_mut(&mut self) -> Vec<(String, ParamMut<'_, B>)> {
        let mut params = Vec::new();
        let layers = [
            ("ff1", Some(&mut self.ff1)),
            ("ff2", self.ff2.as_mut()),
            ("time_a", self.time_a.as_mut()),
            ("time_b", self.time_b.as_mut()),
            ("w_tau", self.w_tau.as_mut()),
            ("a", self.a.as_mut()),
        ];
        for (name, linear) in layers {
            if let Some(linear) = linear {
                params.push((format!("{name}/kernel"), ParamMut::Matrix(&mut linear.weight)));
                if let Some(bias) = &mut linear.bias {
                    params.push((format!("{name}/bias"), ParamMut::Vector(bias)));
                }
            }
        }
        params
    }

    /// Perform a forward pass through the CfC cell
    ///
    /// # Arguments
    /// * `input` - `[batch, input_size]`
    /// * `hx` - Previous hidden state `[batch, hidden_size]`
    /// * `ts` - Elapsed time for this step
    ///
    /// # Returns
    /// Tuple of (output, new_hidden); the two are equal for CfC
    pub fn forward(
        &self,
        input: Tensor<B, 2>,
        hx: Tensor<B, 2>,
        ts: f32,
    ) -> Result<(Tensor<B, 2>, Tensor<B, 2>)> {
        let batch_size = input.dims()[0];
        let device = input.device();

        // Concatenate input and hidden state
        let x = Tensor::cat(vec![input, hx], 1);

        let ff1_out = self.ff1.forward(x.clone());
        let ts_tensor = Tensor::<B, 2>::full([batch_size, self.hidden_size], ts, &device);

        let new_hidden = match (self.mode, &self.w_tau, &self.a) {
            (1, Some(w_tau_layer), Some(a_layer)) => {
                // Pure mode
                let ones_input = Tensor::<B, 2>::ones([batch_size, 1], &device);
                let w_tau_out = w_tau_layer.forward(ones_input.clone());
                let a_out = a_layer.forward(ones_input);

                let abs_w_tau = w_tau_out.abs();
                let abs_ff1 = ff1_out.clone().abs();

                let exp_term = (ts_tensor * (abs_w_tau + abs_ff1)).neg().exp();
                a_out.clone() - a_out * exp_term * ff1_out
            }
            _ => {
                let (Some(ff2), Some(time_a), Some(time_b)) = (&self.ff2, &self.time_a, &self.time_b)
                else {
                    return Err(LayerError::Attribute(format!(
                        "CfC cell parameters do not match mode {:?}",
                        self.mode()
                    )));
                };

                // Default or NoGate mode
                let ff1_tanh = ff1_out.tanh();
                let ff2_tanh = ff2.forward(x.clone()).tanh();

                let time_a = time_a.forward(x.clone());
                let time_b = time_b.forward(x);

                // Compute time interpolation
                let t_interp = activation::sigmoid(time_a * ts_tensor + time_b);

                if self.mode == 2 {
                    // NoGate: h = ff1 + t_interp * ff2
                    ff1_tanh + t_interp * ff2_tanh
                } else {
                    // Default: h = ff1 * (1 - t_interp) + t_interp * ff2
                    ff1_tanh
                        * (Tensor::<B, 2>::ones([batch_size, self.hidden_size], &device)
                            - t_interp.clone())
                        + t_interp * ff2_tanh
                }
            }
        };

        Ok((new_hidden.clone(), new_hidden))
    }
}
