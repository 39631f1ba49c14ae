//! Recurrent sequence layer
//!
//! Full RNN layer that handles sequence processing, batching, and state
//! management for the cells in [`crate::cells`].

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use ndarray::ArrayD;
use serde::{Deserialize, Serialize};

use super::cell::{CellKind, RecurrentCell};
use crate::backend;
use crate::cells::CfcMode;
use crate::config::{from_dict, to_dict, BaseLayerConfig, ConfigDict};
use crate::error::{LayerError, Result};
use crate::layer::{CallOptions, Layer};
use crate::shape::{InputSpec, Shape};
use crate::tensor::{DynTensor, OneOrMany};
use crate::weights::{self, LayerWeight, ParamMut, ParamRef};

/// Serializable configuration of a [`RecurrentLayer`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecurrentConfig {
    pub units: usize,
    #[serde(default)]
    pub return_sequences: bool,
    #[serde(default)]
    pub return_state: bool,
    #[serde(default)]
    pub go_backwards: bool,
    #[serde(default)]
    pub stateful: bool,
    /// CfC operating mode; absent for LSTM.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<CfcMode>,
    #[serde(flatten)]
    pub base: BaseLayerConfig,
}

impl RecurrentConfig {
    pub fn new(units: usize) -> Self {
        Self {
            units,
            return_sequences: false,
            return_state: false,
            go_backwards: false,
            stateful: false,
            mode: None,
            base: BaseLayerConfig::default(),
        }
    }
}

/// Recurrent layer
///
/// Runs an LSTM or CfC cell over a `[batch, time, features]` input.
///
/// | Setting | Output |
/// |---------|--------|
/// | `return_sequences=true` | `[batch, time, units]` |
/// | `return_sequences=false` (default) | `[batch, units]` |
/// | `return_state=true` | `[output, state_1, ..., state_n]`, each state `[batch, units]` |
///
/// # Type Parameters
/// * `B` - The backend type
#[derive(Debug)]
pub struct RecurrentLayer<B: Backend> {
    kind: CellKind,
    config: RecurrentConfig,
    name: String,
    cell: Option<RecurrentCell<B>>,
    /// States carried between calls when stateful.
    states: Option<Vec<DynTensor<B>>>,
    device: B::Device,
}

impl<B: Backend> RecurrentLayer<B> {
    /// Create an LSTM layer with `units` hidden units
    pub fn lstm(units: usize, device: &B::Device) -> Self {
        Self::from_typed_config(CellKind::Lstm, RecurrentConfig::new(units), device)
    }

    /// Create a CfC layer with `units` hidden units in the default mode
    pub fn cfc(units: usize, device: &B::Device) -> Self {
        let mut config = RecurrentConfig::new(units);
        config.mode = Some(CfcMode::Default);
        Self::from_typed_config(CellKind::CfC, config, device)
    }

    pub fn from_typed_config(kind: CellKind, mut config: RecurrentConfig, device: &B::Device) -> Self {
        if kind == CellKind::CfC && config.mode.is_none() {
            config.mode = Some(CfcMode::Default);
        }
        let name = config.base.resolve_name(kind.class_name());
        Self {
            kind,
            config,
            name,
            cell: None,
            states: None,
            device: device.clone(),
        }
    }

    pub fn from_config(kind: CellKind, config: &ConfigDict, device: &B::Device) -> Result<Self> {
        let config: RecurrentConfig = from_dict(config)?;
        if kind == CellKind::Lstm && config.mode.is_some() {
            return Err(LayerError::deserialization("LSTM layers do not take a CfC mode"));
        }
        Ok(Self::from_typed_config(kind, config, device))
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set whether to return full sequences (default: false)
    pub fn with_return_sequences(mut self, return_sequences: bool) -> Self {
        self.config.return_sequences = return_sequences;
        self
    }

    /// Set whether to return the final states after the output (default: false)
    pub fn with_return_state(mut self, return_state: bool) -> Self {
        self.config.return_state = return_state;
        self
    }

    /// Process the sequence from last step to first (default: false)
    pub fn with_go_backwards(mut self, go_backwards: bool) -> Self {
        self.config.go_backwards = go_backwards;
        self
    }

    /// Carry final states into the next call (default: false)
    pub fn with_stateful(mut self, stateful: bool) -> Self {
        self.config.stateful = stateful;
        self
    }

    /// Set the CfC mode; ignored for LSTM layers
    pub fn with_mode(mut self, mode: CfcMode) -> Self {
        if self.kind == CellKind::CfC {
            self.config.mode = Some(mode);
        }
        self
    }

    pub fn kind(&self) -> CellKind {
        self.kind
    }

    pub fn units(&self) -> usize {
        self.config.units
    }

    pub fn return_sequences(&self) -> bool {
        self.config.return_sequences
    }

    pub fn return_state(&self) -> bool {
        self.config.return_state
    }

    pub fn go_backwards(&self) -> bool {
        self.config.go_backwards
    }

    pub fn stateful(&self) -> bool {
        self.config.stateful
    }

    /// States carried over from the previous call of a stateful layer.
    pub fn states(&self) -> Option<&[DynTensor<B>]> {
        self.states.as_deref()
    }

    fn params(&self) -> Vec<(String, ParamRef<'_, B>)> {
        match &self.cell {
            Some(cell) => cell
                .params()
                .into_iter()
                .map(|(param, p)| (format!("{}/{param}", self.name), p))
                .collect(),
            None => Vec::new(),
        }
    }

    fn params_mut(&mut self) -> Vec<(String, ParamMut<'_, B>)> {
        let name = &self.name;
        match &mut self.cell {
            Some(cell) => cell
                .params_mut()
                .into_iter()
                .map(|(param, p)| (format!("{name}/{param}"), p))
                .collect(),
            None => Vec::new(),
        }
    }

    fn initial_states(&self, batch_size: usize, options: &CallOptions<B>) -> Result<Vec<DynTensor<B>>> {
        let num_states = self.kind.num_states();
        let units = self.config.units;

        if let Some(states) = &options.initial_state {
            if states.len() != num_states {
                return Err(LayerError::validation(format!(
                    "layer {} expects {num_states} initial states, but it received {}",
                    self.name,
                    states.len()
                )));
            }
            for state in states {
                if state.dims() != [batch_size, units] {
                    return Err(LayerError::validation(format!(
                        "initial state of layer {} must have shape [{batch_size}, {units}], received {:?}",
                        self.name,
                        state.dims()
                    )));
                }
            }
            return Ok(states.clone());
        }

        if let Some(states) = &self.states {
            if states.iter().all(|s| s.dims() == [batch_size, units]) {
                return Ok(states.clone());
            }
            return Err(LayerError::validation(format!(
                "stateful layer {} carries states for a different batch size than {batch_size}; call reset_states first",
                self.name
            )));
        }

        (0..num_states)
            .map(|_| DynTensor::zeros(&[batch_size, units], &self.device))
            .collect()
    }
}

impl<B: Backend> Layer<B> for RecurrentLayer<B> {
    fn class_name(&self) -> &'static str {
        self.kind.class_name()
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn device(&self) -> &B::Device {
        &self.device
    }

    fn built(&self) -> bool {
        self.cell.is_some()
    }

    fn build(&mut self, input_shape: &Shape) -> Result<()> {
        if input_shape.rank() != 3 {
            return Err(LayerError::validation(format!(
                "recurrent layer {} expects inputs of shape [batch, time, features], received {input_shape}",
                self.name
            )));
        }
        let input_dim = input_shape.last().ok_or_else(|| {
            LayerError::validation(format!(
                "the feature dimension of the input to {} must be defined, received {input_shape}",
                self.name
            ))
        })?;
        log::debug!(
            "{}: building {} cell ({input_dim} -> {})",
            self.name,
            self.kind.class_name(),
            self.config.units
        );
        self.cell = Some(RecurrentCell::new(
            self.kind,
            input_dim,
            self.config.units,
            self.config.mode.unwrap_or_default(),
            &self.device,
        ));
        Ok(())
    }

    fn compute_output_shape(&self, input_shape: &Shape) -> Result<OneOrMany<Shape>> {
        if input_shape.rank() != 3 {
            return Err(LayerError::validation(format!(
                "recurrent layer {} expects inputs of shape [batch, time, features], received {input_shape}",
                self.name
            )));
        }
        let batch = input_shape.dim(0);
        let units = Some(self.config.units);
        let output = if self.config.return_sequences {
            Shape::new(vec![batch, input_shape.dim(1), units])
        } else {
            Shape::new(vec![batch, units])
        };
        if !self.config.return_state {
            return Ok(OneOrMany::One(output));
        }
        let mut shapes = vec![output];
        shapes.extend((0..self.kind.num_states()).map(|_| Shape::new(vec![batch, units])));
        Ok(OneOrMany::Many(shapes))
    }

    fn call(&mut self, inputs: DynTensor<B>, options: &CallOptions<B>) -> Result<OneOrMany<DynTensor<B>>> {
        if options.constants.as_ref().is_some_and(|c| !c.is_empty()) {
            return Err(LayerError::not_implemented(format!(
                "the {} cell of layer {} does not accept constants",
                self.kind.class_name(),
                self.name
            )));
        }
        let dims = inputs.dims();
        if dims.len() != 3 {
            return Err(LayerError::validation(format!(
                "recurrent layer {} expects inputs of rank 3, received shape {dims:?}",
                self.name
            )));
        }
        let cell = self.cell.as_ref().ok_or_else(|| {
            LayerError::Attribute(format!("recurrent layer {} has not been built", self.name))
        })?;
        if cell.input_size() != dims[2] {
            return Err(LayerError::validation(format!(
                "recurrent layer {} expects {} features, received shape {dims:?}",
                self.name,
                cell.input_size()
            )));
        }

        let initial_states = self.initial_states(dims[0], options)?;
        let out = backend::rnn(
            |x, states, _constants| {
                let x: Tensor<B, 2> = x.try_into()?;
                let states = states
                    .into_iter()
                    .map(TryFrom::try_from)
                    .collect::<Result<Vec<Tensor<B, 2>>>>()?;
                let (output, states) = cell.step(x, states)?;
                Ok((output.into(), states.into_iter().map(DynTensor::from).collect()))
            },
            &inputs,
            initial_states,
            self.config.go_backwards,
            options.mask.as_ref(),
            &[],
        )?;

        if self.config.stateful {
            self.states = Some(out.states.clone());
        }

        let output = if self.config.return_sequences {
            out.outputs
        } else {
            out.last_output
        };
        if self.config.return_state {
            let mut all = vec![output];
            all.extend(out.states);
            Ok(OneOrMany::Many(all))
        } else {
            Ok(OneOrMany::One(output))
        }
    }

    fn input_spec(&self) -> Vec<InputSpec> {
        vec![InputSpec::with_ndim(3)]
    }

    fn trainable(&self) -> bool {
        self.config.base.trainable
    }

    fn set_trainable(&mut self, trainable: bool) {
        self.config.base.trainable = trainable;
    }

    fn trainable_weights(&self) -> Vec<LayerWeight> {
        if self.trainable() {
            weights::describe(&self.params(), true)
        } else {
            Vec::new()
        }
    }

    fn non_trainable_weights(&self) -> Vec<LayerWeight> {
        if self.trainable() {
            Vec::new()
        } else {
            weights::describe(&self.params(), false)
        }
    }

    fn losses(&self) -> Vec<Tensor<B, 1>> {
        Vec::new()
    }

    fn get_weights(&self) -> Result<Vec<ArrayD<f32>>> {
        weights::read_all(&self.params())
    }

    fn set_weights(&mut self, weights: Vec<ArrayD<f32>>) -> Result<()> {
        let name = self.name.clone();
        weights::assign_all(&name, self.params_mut(), &weights)
    }

    fn reset_states(&mut self) -> Result<()> {
        if !self.config.stateful {
            return Err(LayerError::Attribute(format!(
                "cannot reset states of recurrent layer {}: it is not stateful",
                self.name
            )));
        }
        self.states = None;
        Ok(())
    }

    fn get_config(&self) -> Result<ConfigDict> {
        let mut config = self.config.clone();
        config.base.name = Some(self.name.clone());
        to_dict(&config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::backend::Backend as BurnBackend;
    use burn::tensor::Distribution;

    type TestBackend = NdArray<f32>;
    type TestDevice = <TestBackend as BurnBackend>::Device;

    fn get_test_device() -> TestDevice {
        Default::default()
    }

    fn random_input(dims: [usize; 3], device: &TestDevice) -> DynTensor<TestBackend> {
        Tensor::<TestBackend, 3>::random(dims, Distribution::Uniform(-1.0, 1.0), device).into()
    }

    #[test]
    fn test_lstm_layer_return_last_only() {
        let device = get_test_device();
        let mut lstm = RecurrentLayer::<TestBackend>::lstm(3, &device);
        lstm.build(&Shape::batched(&[5, 4])).unwrap();

        let y = lstm
            .call(random_input([2, 5, 4], &device), &CallOptions::new())
            .unwrap()
            .into_single()
            .unwrap();

        assert_eq!(y.dims(), vec![2, 3]);
    }

    #[test]
    fn test_lstm_layer_sequences_and_state() {
        let device = get_test_device();
        let mut lstm = RecurrentLayer::<TestBackend>::lstm(3, &device)
            .with_return_sequences(true)
            .with_return_state(true);
        lstm.build(&Shape::batched(&[5, 4])).unwrap();

        let out = lstm
            .call(random_input([2, 5, 4], &device), &CallOptions::new())
            .unwrap()
            .into_vec();

        assert_eq!(out.len(), 3);
        assert_eq!(out[0].dims(), vec![2, 5, 3]);
        assert_eq!(out[1].dims(), vec![2, 3]);
        assert_eq!(out[2].dims(), vec![2, 3]);
    }

    #[test]
    fn test_output_shape_matches_call() {
        let device = get_test_device();
        let cfc = RecurrentLayer::<TestBackend>::cfc(6, &device)
            .with_return_sequences(true)
            .with_return_state(true);

        let shapes = cfc.compute_output_shape(&Shape::batched(&[5, 4])).unwrap();
        assert_eq!(
            shapes,
            OneOrMany::Many(vec![Shape::batched(&[5, 6]), Shape::batched(&[6])])
        );
    }

    #[test]
    fn test_last_output_matches_sequence_tail() {
        let device = get_test_device();
        let mut seq = RecurrentLayer::<TestBackend>::cfc(4, &device)
            .with_return_sequences(true)
            .with_return_state(true);
        seq.build(&Shape::batched(&[3, 2])).unwrap();

        let out = seq
            .call(random_input([1, 3, 2], &device), &CallOptions::new())
            .unwrap()
            .into_vec();
        let tail = out[0].time_step(2).unwrap().to_vec().unwrap();
        let state = out[1].to_vec().unwrap();
        assert_eq!(tail, state);
    }

    #[test]
    fn test_initial_state_count_is_validated() {
        let device = get_test_device();
        let mut lstm = RecurrentLayer::<TestBackend>::lstm(3, &device);
        lstm.build(&Shape::batched(&[5, 4])).unwrap();

        let state = DynTensor::zeros(&[2, 3], &device).unwrap();
        let options = CallOptions::new().with_initial_state(vec![state]);
        let err = lstm.call(random_input([2, 5, 4], &device), &options).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_stateful_carry_and_reset() {
        let device = get_test_device();
        let mut cfc = RecurrentLayer::<TestBackend>::cfc(3, &device).with_stateful(true);
        cfc.build(&Shape::batched(&[2, 4])).unwrap();
        let x = random_input([1, 2, 4], &device);

        let first = cfc.call(x.clone(), &CallOptions::new()).unwrap().into_single().unwrap();
        assert!(cfc.states().is_some());
        let second = cfc.call(x.clone(), &CallOptions::new()).unwrap().into_single().unwrap();
        assert_ne!(first.to_vec().unwrap(), second.to_vec().unwrap());

        cfc.reset_states().unwrap();
        assert!(cfc.states().is_none());
        let third = cfc.call(x, &CallOptions::new()).unwrap().into_single().unwrap();
        assert_eq!(first.to_vec().unwrap(), third.to_vec().unwrap());
    }

    #[test]
    fn test_reset_states_requires_stateful() {
        let device = get_test_device();
        let mut lstm = RecurrentLayer::<TestBackend>::lstm(3, &device);
        assert!(matches!(lstm.reset_states(), Err(LayerError::Attribute(_))));
    }

    #[test]
    fn test_lstm_weight_layout() {
        let device = get_test_device();
        let mut lstm = RecurrentLayer::<TestBackend>::lstm(3, &device).with_name("enc");
        lstm.build(&Shape::batched(&[5, 4])).unwrap();

        let weights = lstm.weights();
        let names: Vec<_> = weights.iter().map(|w| w.name.as_str()).collect();
        assert_eq!(names, vec!["enc/kernel", "enc/recurrent_kernel", "enc/bias"]);
        assert_eq!(lstm.get_weights().unwrap().len(), 3);
    }

    #[test]
    fn test_config_round_trip() {
        let device = get_test_device();
        let cfc = RecurrentLayer::<TestBackend>::cfc(8, &device)
            .with_name("cfc_rt")
            .with_mode(CfcMode::NoGate)
            .with_go_backwards(true);

        let config = cfc.get_config().unwrap();
        assert_eq!(config["goBackwards"], true);
        assert_eq!(config["mode"], "no_gate");

        let restored = RecurrentLayer::<TestBackend>::from_config(CellKind::CfC, &config, &device).unwrap();
        assert_eq!(restored.get_config().unwrap(), config);
    }
}
