use burn::module::Module;
use burn::nn::{Linear, LinearConfig};
use burn::tensor::activation;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use crate::weights::{ParamMut, ParamRef};

/// Standard LSTM cell
///
/// Implements the standard LSTM equations:
/// - i = tanh(W_ii @ x + b_ii + W_hi @ h + b_hi)
/// - g = sigmoid(W_ig @ x + b_ig + W_hg @ h + b_hg)
/// - f = sigmoid(W_if @ x + b_if + W_hf @ h + b_hf + 1)
/// - o = sigmoid(W_io @ x + b_io + W_ho @ h + b_ho)
/// - c' = f * c + i * g
/// - h' = o * tanh(c')
#[derive(Module, Debug)]
pub struct LSTMCell<B: Backend> {
    input_size: usize,
    hidden_size: usize,
    input_map: Linear<B>,     // Maps input to 4 * hidden_size (with bias)
    recurrent_map: Linear<B>, // Maps hidden state to 4 * hidden_size (no bias)
}

impl<B: Backend> LSTMCell<B> {
    /// Create a new LSTM cell
    ///
    /// # Arguments
    /// * `input_size` - Size of the input features
    /// * `hidden_size` - Size of the hidden state
    /// * `device` - Device to create the module on
    pub fn new(input_size: usize, hidden_size: usize, device: &B::Device) -> Self {
        let input_map = LinearConfig::new(input_size, 4 * hidden_size)
            .with_bias(true)
            .init(device);

        let recurrent_map = LinearConfig::new(hidden_size, 4 * hidden_size)
            .with_bias(false)
            .init(device);

        Self {
            input_size,
            hidden_size,
            input_map,
            recurrent_map,
        }
    }

    /// Get the input size
    pub fn input_size(&self) -> usize {
        self.input_size
    }

    /// Get the hidden size
    pub fn hidden_size(&self) -> usize {
        self.hidden_size
    }

    /// Parameters in `kernel`, `recurrent_kernel`, `bias` order.
    pub fn params(&self) -> Vec<(&'static str, ParamRef<'_, B>)> {
        let mut params = vec![
            ("kernel", ParamRef::Matrix(&self.input_map.weight)),
            ("recurrent_kernel", ParamRef::Matrix(&self.recurrent_map.weight)),
        ];
        if let Some(bias) = &self.input_map.bias {
            params.push(("bias", ParamRef::Vector(bias)));
        }
        params
    }

    pub fn params_mut(&mut self) -> Vec<(&'static str, ParamMut<'_, B>)> {
        let mut params = vec![
            ("kernel", ParamMut::Matrix(&mut self.input_map.weight)),
            ("recurrent_kernel", ParamMut::Matrix(&mut self.recurrent_map.weight)),
        ];
        if let Some(bias) = &mut self.input_map.bias {
            params.push(("bias", ParamMut::Vector(bias)));
        }
        params
    }

    /// Perform a forward pass through the LSTM cell
    ///
    /// # Arguments
    /// * `input` - Input tensor of shape `[batch_size, input_size]`
    /// * `states` - Tuple of (hidden_state, cell_state), each of shape `[batch_size, hidden_size]`
    ///
    /// # Returns
    /// Tuple of (new_hidden_state, new_cell_state)
    pub fn forward(
        &self,
        input: Tensor<B, 2>,
        states: (Tensor<B, 2>, Tensor<B, 2>),
    ) -> (Tensor<B, 2>, Tensor<B, 2>) {
        let (hidden_state, cell_state) = states;

        let input_contrib = self.input_map.forward(input);
        let recurrent_contrib = self.recurrent_map.forward(hidden_state);
        let z = input_contrib + recurrent_contrib;

        // Split into 4 gates
        let chunks = z.chunk(4, 1);
        let input_activation = chunks[0].clone().tanh();
        let input_gate = activation::sigmoid(chunks[1].clone());
        let forget_gate = activation::sigmoid(chunks[2].clone() + 1.0); // +1 forget bias
        let output_gate = activation::sigmoid(chunks[3].clone());

        // c' = f * c + i * g
        let new_cell = cell_state * forget_gate + input_activation * input_gate;

        // h' = o * tanh(c')
        let new_hidden = new_cell.clone().tanh() * output_gate;

        (new_hidden, new_cell)
    }
}
