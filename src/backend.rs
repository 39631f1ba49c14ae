//! Step-execution primitive.
//!
//! [`rnn`] runs a per-step function across the time axis (axis 1) of an
//! input, threading state from one step to the next. Recurrent layers and
//! [`TimeDistributed`](crate::wrappers::TimeDistributed) are both built on it.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use crate::error::{LayerError, Result};
use crate::tensor::DynTensor;

/// Result of running a step function over a sequence.
#[derive(Debug, Clone)]
pub struct RnnOutput<B: Backend> {
    /// Output of the final processed step, `[batch, ...]`.
    pub last_output: DynTensor<B>,
    /// Step outputs stacked along axis 1 in processing order.
    pub outputs: DynTensor<B>,
    /// States after the final processed step.
    pub states: Vec<DynTensor<B>>,
}

/// Iterate `step_fn` over the time axis of `inputs`.
///
/// # Arguments
/// * `step_fn` - Called as `step_fn(step_input, states, constants)` and returns
///   `(step_output, new_states)`
/// * `inputs` - Tensor of shape `[batch, time, ...]`
/// * `initial_states` - States fed to the first step
/// * `go_backwards` - Process the time axis from last to first. Outputs are
///   stacked in processing order, so they come out reversed in time.
/// * `mask` - Optional `[batch, time]` tensor of 0/1 values; masked-out steps
///   repeat the previous output and keep the previous states
/// * `constants` - Passed unchanged to every step
pub fn rnn<B, F>(
    mut step_fn: F,
    inputs: &DynTensor<B>,
    initial_states: Vec<DynTensor<B>>,
    go_backwards: bool,
    mask: Option<&Tensor<B, 2>>,
    constants: &[DynTensor<B>],
) -> Result<RnnOutput<B>>
where
    B: Backend,
    F: FnMut(DynTensor<B>, Vec<DynTensor<B>>, &[DynTensor<B>]) -> Result<(DynTensor<B>, Vec<DynTensor<B>>)>,
{
    let dims = inputs.dims();
    if dims.len() < 3 {
        return Err(LayerError::validation(format!(
            "input should have at least 3 dimensions (batch, time, features), received shape {dims:?}"
        )));
    }
    let num_steps = dims[1];
    if num_steps == 0 {
        return Err(LayerError::validation(
            "cannot run a step function over a zero-length time axis",
        ));
    }
    if let Some(mask) = mask {
        let [mask_batch, mask_steps] = mask.dims();
        if mask_batch != dims[0] || mask_steps != num_steps {
            return Err(LayerError::validation(format!(
                "mask shape [{mask_batch}, {mask_steps}] does not match input batch/time [{}, {num_steps}]",
                dims[0]
            )));
        }
    }

    log::trace!("rnn: {num_steps} steps, go_backwards={go_backwards}");

    let mut states = initial_states;
    let mut outputs: Vec<DynTensor<B>> = Vec::with_capacity(num_steps);
    let mut last_output: Option<DynTensor<B>> = None;

    for i in 0..num_steps {
        let t = if go_backwards { num_steps - 1 - i } else { i };
        let step_input = inputs.time_step(t)?;

        let (output, new_states) = step_fn(step_input, states.clone(), constants)?;
        if new_states.len() != states.len() {
            return Err(LayerError::validation(format!(
                "step function returned {} states, expected {}",
                new_states.len(),
                states.len()
            )));
        }

        let (output, new_states) = match mask {
            Some(mask) => {
                let step_mask: Tensor<B, 1> = mask.clone().narrow(1, t, 1).squeeze(1);
                // The first step has no previous output, so it keeps zeros.
                let previous = match &last_output {
                    Some(prev) => prev.clone(),
                    None => DynTensor::zeros(&output.dims(), &output.device())?,
                };
                let output = output.blend(previous, step_mask.clone())?;
                let new_states = new_states
                    .into_iter()
                    .zip(states)
                    .map(|(new, old)| new.blend(old, step_mask.clone()))
                    .collect::<Result<Vec<_>>>()?;
                (output, new_states)
            }
            None => (output, new_states),
        };

        states = new_states;
        last_output = Some(output.clone());
        outputs.push(output);
    }

    let outputs = DynTensor::stack_steps(outputs)?;
    let last_output = last_output.ok_or_else(|| LayerError::validation("no steps were run"))?;

    Ok(RnnOutput {
        last_output,
        outputs,
        states,
    })
}
