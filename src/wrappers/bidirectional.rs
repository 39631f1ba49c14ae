//! Bidirectional wrapper for recurrent layers.

use std::fmt;
use std::str::FromStr;

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use ndarray::ArrayD;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::wrapper::Wrapper;
use crate::config::{from_dict, BaseLayerConfig, ConfigDict};
use crate::error::{LayerError, Result};
use crate::layer::{connect, ensure_uniform_inputs, ApplyOptions, CallOptions, Layer};
use crate::registry::{self, CustomObjects};
use crate::shape::{InputSpec, Shape};
use crate::tensor::{DynTensor, OneOrMany, TensorValue};
use crate::weights::LayerWeight;

/// How the forward and backward outputs are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MergeMode {
    #[serde(rename = "sum")]
    Sum,
    #[serde(rename = "mul")]
    Mul,
    #[serde(rename = "concat")]
    Concat,
    #[serde(rename = "ave")]
    Ave,
}

impl MergeMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sum => "sum",
            Self::Mul => "mul",
            Self::Concat => "concat",
            Self::Ave => "ave",
        }
    }
}

impl fmt::Display for MergeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MergeMode {
    type Err = LayerError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "sum" => Ok(Self::Sum),
            "mul" => Ok(Self::Mul),
            "concat" => Ok(Self::Concat),
            "ave" => Ok(Self::Ave),
            other => Err(LayerError::validation(format!(
                "Invalid merge mode: {other}. Merge mode should be one of \"sum\", \"mul\", \"ave\", \"concat\", null"
            ))),
        }
    }
}

fn default_merge_mode() -> Option<String> {
    Some(MergeMode::Concat.as_str().to_string())
}

/// Wrapper-owned fields of a serialized [`Bidirectional`].
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BidirectionalConfig {
    #[serde(default = "default_merge_mode")]
    merge_mode: Option<String>,
    #[serde(default)]
    weights: Option<Value>,
    #[serde(default)]
    num_constants: Option<Value>,
    #[serde(flatten)]
    base: BaseLayerConfig,
}

/// Construction arguments of a [`Bidirectional`] wrapper.
///
/// `merge_mode` is kept as a string so that invalid values coming from user
/// input are rejected by [`Bidirectional::from_args`] rather than earlier.
#[derive(Debug)]
pub struct BidirectionalArgs<B: Backend> {
    pub layer: Box<dyn Layer<B>>,
    /// `None` returns both outputs unmerged.
    pub merge_mode: Option<String>,
    /// Initial weights; not supported yet.
    pub weights: Option<Vec<ArrayD<f32>>>,
    /// `None` keeps the trainable flag of the supplied layer.
    pub trainable: Option<bool>,
    pub base: BaseLayerConfig,
    pub custom_objects: CustomObjects<B>,
}

impl<B: Backend> BidirectionalArgs<B> {
    pub fn new(layer: Box<dyn Layer<B>>) -> Self {
        Self {
            layer,
            merge_mode: default_merge_mode(),
            weights: None,
            trainable: None,
            base: BaseLayerConfig::default(),
            custom_objects: CustomObjects::new(),
        }
    }

    pub fn with_merge_mode(mut self, merge_mode: Option<&str>) -> Self {
        self.merge_mode = merge_mode.map(str::to_string);
        self
    }

    pub fn with_weights(mut self, weights: Vec<ArrayD<f32>>) -> Self {
        self.weights = Some(weights);
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.base.name = Some(name.into());
        self
    }

    pub fn with_trainable(mut self, trainable: bool) -> Self {
        self.trainable = Some(trainable);
        self
    }

    pub fn with_custom_objects(mut self, custom_objects: CustomObjects<B>) -> Self {
        self.custom_objects = custom_objects;
        self
    }
}

/// Bidirectional wrapper
///
/// Runs two independent copies of a recurrent layer over the same input, one
/// in each time direction, and merges their outputs.
///
/// | Merge mode | Output |
/// |------------|--------|
/// | `concat` (default) | last axis doubled |
/// | `sum`, `mul`, `ave` | same shape as the wrapped layer |
/// | `None` | `[forward, backward]`, unmerged |
///
/// With `return_state` the forward states, then the backward states, follow
/// the output(s).
#[derive(Debug)]
pub struct Bidirectional<B: Backend> {
    /// Holds the layer as supplied; its config is what gets serialized.
    wrapper: Wrapper<B>,
    forward_layer: Box<dyn Layer<B>>,
    backward_layer: Box<dyn Layer<B>>,
    merge_mode: Option<MergeMode>,
    return_sequences: bool,
    return_state: bool,
    stateful: bool,
    input_spec: Vec<InputSpec>,
}

impl<B: Backend> Bidirectional<B> {
    /// Wrap `layer` with a typed merge mode.
    pub fn new(layer: Box<dyn Layer<B>>, merge_mode: Option<MergeMode>) -> Result<Self> {
        Self::from_args(
            BidirectionalArgs::new(layer).with_merge_mode(merge_mode.as_ref().map(MergeMode::as_str)),
        )
    }

    pub fn from_args(args: BidirectionalArgs<B>) -> Result<Self> {
        let merge_mode = args
            .merge_mode
            .as_deref()
            .map(MergeMode::from_str)
            .transpose()?;
        if args.weights.is_some() {
            return Err(LayerError::not_implemented(
                "the weights argument of the Bidirectional layer is not supported yet",
            ));
        }

        let layer = args.layer;
        let config = layer.get_config()?;
        let go_backwards = config
            .get("goBackwards")
            .and_then(Value::as_bool)
            .ok_or_else(|| {
                LayerError::validation(format!(
                    "Bidirectional requires a recurrent layer with a goBackwards setting, got {} layer {}",
                    layer.class_name(),
                    layer.name()
                ))
            })?;
        let flag = |key: &str| config.get(key).and_then(Value::as_bool).unwrap_or(false);

        let mut forward_overrides = ConfigDict::new();
        forward_overrides.insert("name".into(), Value::from(format!("forward_{}", layer.name())));
        let mut backward_overrides = ConfigDict::new();
        backward_overrides.insert("name".into(), Value::from(format!("backward_{}", layer.name())));
        backward_overrides.insert("goBackwards".into(), Value::from(!go_backwards));

        let forward_layer = registry::clone_layer(layer.as_ref(), forward_overrides, &args.custom_objects)?;
        let backward_layer = registry::clone_layer(layer.as_ref(), backward_overrides, &args.custom_objects)?;

        let trainable = args.trainable.unwrap_or_else(|| layer.trainable());
        let mut bidirectional = Self {
            return_sequences: flag("returnSequences"),
            return_state: flag("returnState"),
            stateful: flag("stateful"),
            input_spec: layer.input_spec(),
            wrapper: Wrapper::new(layer, args.base, "Bidirectional"),
            forward_layer,
            backward_layer,
            merge_mode,
        };
        bidirectional.set_trainable(trainable);
        Ok(bidirectional)
    }

    pub fn from_config(
        config: &ConfigDict,
        custom_objects: &CustomObjects<B>,
        device: &B::Device,
    ) -> Result<Self> {
        let (layer, rest) = Wrapper::split_config(config, custom_objects, device)?;
        let config: BidirectionalConfig = from_dict(&rest)?;
        if config.num_constants.is_some() {
            return Err(LayerError::not_implemented(
                "constants in Bidirectional layers are not supported yet",
            ));
        }
        if config.weights.is_some() {
            return Err(LayerError::not_implemented(
                "the weights argument of the Bidirectional layer is not supported yet",
            ));
        }
        Self::from_args(BidirectionalArgs {
            layer,
            merge_mode: config.merge_mode,
            weights: None,
            trainable: Some(config.base.trainable),
            base: config.base,
            custom_objects: custom_objects.clone(),
        })
    }

    pub fn merge_mode(&self) -> Option<MergeMode> {
        self.merge_mode
    }

    pub fn forward_layer(&self) -> &dyn Layer<B> {
        self.forward_layer.as_ref()
    }

    pub fn backward_layer(&self) -> &dyn Layer<B> {
        self.backward_layer.as_ref()
    }

    /// The layer as originally supplied.
    pub fn layer(&self) -> &dyn Layer<B> {
        self.wrapper.layer()
    }

    pub fn return_sequences(&self) -> bool {
        self.return_sequences
    }

    pub fn return_state(&self) -> bool {
        self.return_state
    }

    pub fn stateful(&self) -> bool {
        self.stateful
    }

    fn check_state_count(&self, count: usize) -> Result<()> {
        if count % 2 != 0 {
            return Err(LayerError::validation(format!(
                "when passing `initial_state` to a Bidirectional RNN, the state should be a list containing the states of the underlying RNNs; layer {} received {count} states",
                self.wrapper.name()
            )));
        }
        Ok(())
    }

    /// Main output first, then any returned states.
    fn split_output(&self, output: OneOrMany<DynTensor<B>>) -> Result<(DynTensor<B>, Vec<DynTensor<B>>)> {
        if !self.return_state {
            return Ok((output.into_single()?, Vec::new()));
        }
        let mut all = output.into_vec().into_iter();
        let main = all.next().ok_or_else(|| {
            LayerError::validation(format!(
                "layer {} returned no outputs",
                self.wrapper.name()
            ))
        })?;
        Ok((main, all.collect()))
    }
}

impl<B: Backend> Layer<B> for Bidirectional<B> {
    fn class_name(&self) -> &'static str {
        "Bidirectional"
    }

    fn name(&self) -> &str {
        self.wrapper.name()
    }

    fn device(&self) -> &B::Device {
        self.forward_layer.device()
    }

    fn built(&self) -> bool {
        self.wrapper.built()
    }

    fn build(&mut self, input_shape: &Shape) -> Result<()> {
        log::debug!("{}: building both directions on {input_shape}", self.wrapper.name());
        self.forward_layer.build(input_shape)?;
        self.backward_layer.build(input_shape)?;
        self.wrapper.build();
        Ok(())
    }

    fn compute_output_shape(&self, input_shape: &Shape) -> Result<OneOrMany<Shape>> {
        let forward = self.forward_layer.compute_output_shape(input_shape)?;
        let (output_shape, state_shapes) = if self.return_state {
            let mut shapes = forward.into_vec();
            if shapes.is_empty() {
                return Err(LayerError::validation(format!(
                    "layer {} reported no output shapes",
                    self.forward_layer.name()
                )));
            }
            let output = shapes.remove(0);
            (output, shapes)
        } else {
            (forward.into_single()?, Vec::new())
        };

        let mut shapes = match self.merge_mode {
            Some(MergeMode::Concat) => {
                vec![output_shape.with_last(output_shape.last().map(|d| d * 2))]
            }
            None => vec![output_shape.clone(), output_shape],
            Some(_) => vec![output_shape],
        };
        if self.return_state {
            shapes.extend(state_shapes.iter().cloned());
            shapes.extend(state_shapes);
        }

        Ok(match shapes.len() {
            1 => OneOrMany::One(shapes.remove(0)),
            _ => OneOrMany::Many(shapes),
        })
    }

    /// Initial states are threaded as extra positional inputs on the symbolic
    /// path and through the call options on the concrete path; each path
    /// builds the input specs for exactly what it passes.
    fn apply(
        &mut self,
        inputs: TensorValue<B>,
        mut options: ApplyOptions<B>,
    ) -> Result<OneOrMany<TensorValue<B>>> {
        if options.constants.is_some() {
            return Err(LayerError::not_implemented(
                "constants are not supported by the Bidirectional layer yet",
            ));
        }
        ensure_uniform_inputs(&inputs, &options)?;

        let mut specs = self.input_spec();
        let states = match options.initial_state.take() {
            Some(states) => states,
            None => return connect(self, &specs, vec![inputs], options.into_call_options()?),
        };
        self.check_state_count(states.len())?;

        if !inputs.is_symbolic() {
            options.initial_state = Some(states);
            return connect(self, &specs, vec![inputs], options.into_call_options()?);
        }

        if specs.is_empty() {
            specs.push(InputSpec::default());
        }
        specs.extend(states.iter().map(|state| InputSpec::with_shape(&state.shape())));

        let mut all_inputs = Vec::with_capacity(states.len() + 1);
        all_inputs.push(inputs);
        all_inputs.extend(states);
        connect(self, &specs, all_inputs, options.into_call_options()?)
    }

    fn call(&mut self, inputs: DynTensor<B>, options: &CallOptions<B>) -> Result<OneOrMany<DynTensor<B>>> {
        if options.mask.is_some() {
            return Err(LayerError::not_implemented(
                "masking is not supported by the Bidirectional layer yet",
            ));
        }
        if options.constants.as_ref().is_some_and(|c| !c.is_empty()) {
            return Err(LayerError::not_implemented(
                "constants are not supported by the Bidirectional layer yet",
            ));
        }

        let mut forward_options = options.clone();
        let mut backward_options = options.clone();
        if let Some(states) = &options.initial_state {
            self.check_state_count(states.len())?;
            let (forward_states, backward_states) = states.split_at(states.len() / 2);
            forward_options.initial_state = Some(forward_states.to_vec());
            backward_options.initial_state = Some(backward_states.to_vec());
        }

        // Intermediate outputs of both directions are owned by this frame and
        // released on every return path.
        let forward = self.forward_layer.call(inputs.clone(), &forward_options)?;
        let backward = self.backward_layer.call(inputs, &backward_options)?;
        let (y, forward_states) = self.split_output(forward)?;
        let (y_rev, backward_states) = self.split_output(backward)?;

        let y_rev = if self.return_sequences {
            y_rev.reverse_time()?
        } else {
            y_rev
        };

        let mut outputs = match self.merge_mode {
            Some(MergeMode::Concat) => vec![y.concat_last(y_rev)?],
            Some(MergeMode::Sum) => vec![y.add(y_rev)?],
            Some(MergeMode::Ave) => vec![y.add(y_rev)?.mul_scalar(0.5)],
            Some(MergeMode::Mul) => vec![y.mul(y_rev)?],
            None => vec![y, y_rev],
        };
        if self.return_state {
            outputs.extend(forward_states);
            outputs.extend(backward_states);
        }

        Ok(match outputs.len() {
            1 => OneOrMany::One(outputs.remove(0)),
            _ => OneOrMany::Many(outputs),
        })
    }

    fn input_spec(&self) -> Vec<InputSpec> {
        self.input_spec.clone()
    }

    fn trainable(&self) -> bool {
        self.wrapper.base().trainable
    }

    fn set_trainable(&mut self, trainable: bool) {
        self.wrapper.base_mut().trainable = trainable;
        self.forward_layer.set_trainable(trainable);
        self.backward_layer.set_trainable(trainable);
    }

    fn trainable_weights(&self) -> Vec<LayerWeight> {
        let mut weights = self.forward_layer.trainable_weights();
        weights.extend(self.backward_layer.trainable_weights());
        weights
    }

    fn non_trainable_weights(&self) -> Vec<LayerWeight> {
        let mut weights = self.forward_layer.non_trainable_weights();
        weights.extend(self.backward_layer.non_trainable_weights());
        weights
    }

    fn losses(&self) -> Vec<Tensor<B, 1>> {
        let mut losses = self.forward_layer.losses();
        losses.extend(self.backward_layer.losses());
        losses
    }

    fn get_weights(&self) -> Result<Vec<ArrayD<f32>>> {
        let mut weights = self.forward_layer.get_weights()?;
        weights.extend(self.backward_layer.get_weights()?);
        Ok(weights)
    }

    /// First half to the forward layer, the rest to the backward layer.
    ///
    /// Either both directions are updated or neither is.
    fn set_weights(&mut self, mut weights: Vec<ArrayD<f32>>) -> Result<()> {
        let backward = weights.split_off(weights.len() / 2);
        let previous = self.forward_layer.get_weights()?;
        self.forward_layer.set_weights(weights)?;
        if let Err(err) = self.backward_layer.set_weights(backward) {
            self.forward_layer.set_weights(previous)?;
            return Err(err);
        }
        Ok(())
    }

    fn reset_states(&mut self) -> Result<()> {
        self.forward_layer.reset_states()?;
        self.backward_layer.reset_states()
    }

    fn get_config(&self) -> Result<ConfigDict> {
        let mut own = ConfigDict::new();
        own.insert(
            "mergeMode".into(),
            self.merge_mode.map_or(Value::Null, |mode| Value::from(mode.as_str())),
        );
        self.wrapper.get_config(own, self.trainable())
    }
}
