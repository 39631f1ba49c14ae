//! The capability set every layer implements.
//!
//! A layer is built once from a (possibly partially known) input shape, can
//! infer its output shape without data, and computes outputs from concrete
//! tensors. [`Layer::apply`] is the entry point that accepts either kind of
//! input and builds the layer on first use.

use std::fmt;

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use ndarray::ArrayD;

use crate::config::ConfigDict;
use crate::error::{LayerError, Result};
use crate::shape::{check_input_compatibility, InputSpec, Shape};
use crate::tensor::{DynTensor, OneOrMany, SymbolicTensor, TensorValue};
use crate::weights::LayerWeight;

/// Options passed to [`Layer::call`].
#[derive(Debug, Clone)]
pub struct CallOptions<B: Backend> {
    pub training: Option<bool>,
    /// `[batch, time]` tensor of 0/1 values.
    pub mask: Option<Tensor<B, 2>>,
    pub initial_state: Option<Vec<DynTensor<B>>>,
    pub constants: Option<Vec<DynTensor<B>>>,
}

impl<B: Backend> Default for CallOptions<B> {
    fn default() -> Self {
        Self {
            training: None,
            mask: None,
            initial_state: None,
            constants: None,
        }
    }
}

impl<B: Backend> CallOptions<B> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_training(mut self, training: bool) -> Self {
        self.training = Some(training);
        self
    }

    pub fn with_mask(mut self, mask: Tensor<B, 2>) -> Self {
        self.mask = Some(mask);
        self
    }

    pub fn with_initial_state(mut self, initial_state: Vec<DynTensor<B>>) -> Self {
        self.initial_state = Some(initial_state);
        self
    }

    pub fn with_constants(mut self, constants: Vec<DynTensor<B>>) -> Self {
        self.constants = Some(constants);
        self
    }
}

/// Options passed to [`Layer::apply`]; states and constants may be symbolic.
#[derive(Debug, Clone)]
pub struct ApplyOptions<B: Backend> {
    pub training: Option<bool>,
    pub mask: Option<Tensor<B, 2>>,
    pub initial_state: Option<Vec<TensorValue<B>>>,
    pub constants: Option<Vec<TensorValue<B>>>,
}

impl<B: Backend> Default for ApplyOptions<B> {
    fn default() -> Self {
        Self {
            training: None,
            mask: None,
            initial_state: None,
            constants: None,
        }
    }
}

impl<B: Backend> ApplyOptions<B> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_training(mut self, training: bool) -> Self {
        self.training = Some(training);
        self
    }

    pub fn with_mask(mut self, mask: Tensor<B, 2>) -> Self {
        self.mask = Some(mask);
        self
    }

    pub fn with_initial_state(mut self, initial_state: Vec<TensorValue<B>>) -> Self {
        self.initial_state = Some(initial_state);
        self
    }

    pub fn with_constants(mut self, constants: Vec<TensorValue<B>>) -> Self {
        self.constants = Some(constants);
        self
    }

    /// Call options for the concrete execution path.
    ///
    /// Symbolic states and constants carry no data and are dropped here; the
    /// caller has already rejected any symbolic/concrete mix.
    pub fn into_call_options(self) -> Result<CallOptions<B>> {
        let concrete = |values: Option<Vec<TensorValue<B>>>| -> Result<Option<Vec<DynTensor<B>>>> {
            match values {
                Some(values) if values.iter().all(|v| !v.is_symbolic()) => Ok(Some(
                    values
                        .into_iter()
                        .map(TensorValue::into_concrete)
                        .collect::<Result<Vec<_>>>()?,
                )),
                _ => Ok(None),
            }
        };
        Ok(CallOptions {
            training: self.training,
            mask: self.mask,
            initial_state: concrete(self.initial_state)?,
            constants: concrete(self.constants)?,
        })
    }
}

/// A neural-network layer.
pub trait Layer<B: Backend>: fmt::Debug {
    /// Registry name of the layer kind, e.g. `"Dense"`.
    fn class_name(&self) -> &'static str;

    fn name(&self) -> &str;

    fn device(&self) -> &B::Device;

    fn built(&self) -> bool;

    /// Create weights for inputs of `input_shape`.
    fn build(&mut self, input_shape: &Shape) -> Result<()>;

    /// Output shape(s) for an input of `input_shape`, without touching data.
    fn compute_output_shape(&self, input_shape: &Shape) -> Result<OneOrMany<Shape>>;

    /// Compute outputs for concrete input data. The layer must be built.
    fn call(&mut self, inputs: DynTensor<B>, options: &CallOptions<B>) -> Result<OneOrMany<DynTensor<B>>>;

    /// Validate, build on first use, then either infer shapes (symbolic
    /// inputs) or compute outputs (concrete inputs).
    fn apply(
        &mut self,
        inputs: TensorValue<B>,
        options: ApplyOptions<B>,
    ) -> Result<OneOrMany<TensorValue<B>>> {
        let specs = self.input_spec();
        ensure_uniform_inputs(&inputs, &options)?;
        connect(self, &specs, vec![inputs], options.into_call_options()?)
    }

    /// Declared input constraints, one entry per positional input.
    fn input_spec(&self) -> Vec<InputSpec>;

    fn trainable(&self) -> bool;

    fn set_trainable(&mut self, trainable: bool);

    fn trainable_weights(&self) -> Vec<LayerWeight>;

    fn non_trainable_weights(&self) -> Vec<LayerWeight>;

    /// Trainable weights followed by non-trainable ones.
    fn weights(&self) -> Vec<LayerWeight> {
        let mut all = self.trainable_weights();
        all.extend(self.non_trainable_weights());
        all
    }

    /// Regularization losses, each a one-element tensor.
    fn losses(&self) -> Vec<Tensor<B, 1>>;

    /// Current weight values, in [`Layer::weights`] order.
    fn get_weights(&self) -> Result<Vec<ArrayD<f32>>>;

    fn set_weights(&mut self, weights: Vec<ArrayD<f32>>) -> Result<()>;

    /// Clear carried recurrent state. Stateless layers have nothing to clear.
    fn reset_states(&mut self) -> Result<()> {
        Ok(())
    }

    fn get_config(&self) -> Result<ConfigDict>;
}

/// Rejects a mix of symbolic and concrete values among the inputs, initial
/// states and constants of a single apply.
pub fn ensure_uniform_inputs<B: Backend>(
    inputs: &TensorValue<B>,
    options: &ApplyOptions<B>,
) -> Result<()> {
    let extras = options
        .initial_state
        .iter()
        .flatten()
        .chain(options.constants.iter().flatten());
    let symbolic = inputs.is_symbolic();
    for value in extras {
        if value.is_symbolic() != symbolic {
            return Err(LayerError::validation(
                "the initial state or constants of an RNN layer cannot be specified with a mix of symbolic and concrete tensors",
            ));
        }
    }
    Ok(())
}

/// Shared connect routine behind every `apply`.
///
/// `specs` is built by the caller for the exact inputs being passed; the
/// first input is the main one, any further inputs only take part in
/// validation.
pub fn connect<B, L>(
    layer: &mut L,
    specs: &[InputSpec],
    inputs: Vec<TensorValue<B>>,
    options: CallOptions<B>,
) -> Result<OneOrMany<TensorValue<B>>>
where
    B: Backend,
    L: Layer<B> + ?Sized,
{
    let symbolic = inputs.iter().filter(|v| v.is_symbolic()).count();
    if symbolic != 0 && symbolic != inputs.len() {
        return Err(LayerError::validation(format!(
            "layer {} received a mix of symbolic and concrete inputs",
            layer.name()
        )));
    }

    let shapes: Vec<Shape> = inputs.iter().map(TensorValue::shape).collect();
    check_input_compatibility(layer.name(), specs, &shapes)?;

    let main_shape = shapes
        .first()
        .ok_or_else(|| LayerError::validation(format!("layer {} received no inputs", layer.name())))?;
    if !layer.built() {
        layer.build(main_shape)?;
    }

    if symbolic > 0 {
        let shapes = layer.compute_output_shape(main_shape)?;
        return Ok(shapes.map(|shape| TensorValue::Symbolic(SymbolicTensor::new(shape))));
    }

    let main = inputs
        .into_iter()
        .next()
        .ok_or_else(|| LayerError::validation("missing main input"))?
        .into_concrete()?;
    log::trace!("{}: call on input {:?}", layer.name(), main.dims());
    let outputs = layer.call(main, &options)?;
    Ok(outputs.map(TensorValue::Concrete))
}
