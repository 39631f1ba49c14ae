//! Densely connected layer applied over the last axis.

use burn::module::Param;
use burn::nn::{Linear, LinearConfig};
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use ndarray::ArrayD;
use serde::{Deserialize, Serialize};

use crate::activation::Activation;
use crate::config::{from_dict, to_dict, BaseLayerConfig, ConfigDict};
use crate::error::{LayerError, Result};
use crate::layer::{CallOptions, Layer};
use crate::shape::{InputSpec, Shape};
use crate::tensor::{map_rank, DynTensor, OneOrMany};
use crate::weights::{self, LayerWeight, ParamMut, ParamRef};

/// Serializable configuration of a [`Dense`] layer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DenseConfig {
    pub units: usize,
    #[serde(default)]
    pub activation: Activation,
    #[serde(default = "default_use_bias")]
    pub use_bias: bool,
    /// L2 factor applied to the kernel.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kernel_regularizer: Option<f32>,
    #[serde(flatten)]
    pub base: BaseLayerConfig,
}

fn default_use_bias() -> bool {
    true
}

/// Dense layer
///
/// Maps the last axis of an input of rank 2..=5 from `input_dim` to `units`
/// features. Weights are created on first build, when `input_dim` is known.
///
/// # Type Parameters
/// * `B` - The backend type
#[derive(Debug)]
pub struct Dense<B: Backend> {
    config: DenseConfig,
    name: String,
    linear: Option<Linear<B>>,
    input_spec: Vec<InputSpec>,
    device: B::Device,
}

impl<B: Backend> Dense<B> {
    /// Create a dense layer with `units` outputs and linear activation.
    pub fn new(units: usize, device: &B::Device) -> Self {
        Self::from_typed_config(
            DenseConfig {
                units,
                activation: Activation::Linear,
                use_bias: true,
                kernel_regularizer: None,
                base: BaseLayerConfig::default(),
            },
            device,
        )
    }

    pub fn from_typed_config(config: DenseConfig, device: &B::Device) -> Self {
        let name = config.base.resolve_name("Dense");
        Self {
            config,
            name,
            linear: None,
            input_spec: vec![InputSpec::with_min_ndim(2)],
            device: device.clone(),
        }
    }

    pub fn from_config(config: &ConfigDict, device: &B::Device) -> Result<Self> {
        Ok(Self::from_typed_config(from_dict(config)?, device))
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_activation(mut self, activation: Activation) -> Self {
        self.config.activation = activation;
        self
    }

    pub fn with_bias(mut self, use_bias: bool) -> Self {
        self.config.use_bias = use_bias;
        self
    }

    pub fn with_kernel_regularizer(mut self, l2: f32) -> Self {
        self.config.kernel_regularizer = Some(l2);
        self
    }

    pub fn units(&self) -> usize {
        self.config.units
    }

    fn params(&self) -> Vec<(String, ParamRef<'_, B>)> {
        let Some(linear) = &self.linear else {
            return Vec::new();
        };
        let mut params = vec![(format!("{}/kernel", self.name), ParamRef::Matrix(&linear.weight))];
        if let Some(bias) = &linear.bias {
            params.push((format!("{}/bias", self.name), ParamRef::Vector(bias)));
        }
        params
    }

    fn params_mut(&mut self) -> Vec<(String, ParamMut<'_, B>)> {
        let name = &self.name;
        let Some(linear) = &mut self.linear else {
            return Vec::new();
        };
        let mut params = vec![(format!("{name}/kernel"), ParamMut::Matrix(&mut linear.weight))];
        if let Some(bias) = &mut linear.bias {
            params.push((format!("{name}/bias"), ParamMut::Vector(bias)));
        }
        params
    }

    fn kernel(&self) -> Option<&Param<Tensor<B, 2>>> {
        self.linear.as_ref().map(|linear| &linear.weight)
    }
}

impl<B: Backend> Layer<B> for Dense<B> {
    fn class_name(&self) -> &'static str {
        "Dense"
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn device(&self) -> &B::Device {
        &self.device
    }

    fn built(&self) -> bool {
        self.linear.is_some()
    }

    fn build(&mut self, input_shape: &Shape) -> Result<()> {
        let input_dim = input_shape.last().ok_or_else(|| {
            LayerError::validation(format!(
                "the last dimension of the input to Dense layer {} must be defined, received {input_shape}",
                self.name
            ))
        })?;
        log::debug!("{}: building kernel [{input_dim}, {}]", self.name, self.config.units);
        self.linear = Some(
            LinearConfig::new(input_dim, self.config.units)
                .with_bias(self.config.use_bias)
                .init(&self.device),
        );
        Ok(())
    }

    fn compute_output_shape(&self, input_shape: &Shape) -> Result<OneOrMany<Shape>> {
        if input_shape.rank() < 2 {
            return Err(LayerError::validation(format!(
                "Dense layer {} expects inputs of rank >= 2, received {input_shape}",
                self.name
            )));
        }
        Ok(OneOrMany::One(input_shape.with_last(Some(self.config.units))))
    }

    fn call(&mut self, inputs: DynTensor<B>, _options: &CallOptions<B>) -> Result<OneOrMany<DynTensor<B>>> {
        let linear = self.linear.as_ref().ok_or_else(|| {
            LayerError::Attribute(format!("Dense layer {} has not been built", self.name))
        })?;
        let [input_dim, _] = linear.weight.val().dims();
        let dims = inputs.dims();
        if dims.last() != Some(&input_dim) {
            return Err(LayerError::validation(format!(
                "Dense layer {} expects last dimension {input_dim}, received shape {dims:?}",
                self.name
            )));
        }
        let projected = map_rank!(inputs, t => linear.forward(t));
        Ok(OneOrMany::One(self.config.activation.apply_dyn(projected)))
    }

    fn input_spec(&self) -> Vec<InputSpec> {
        self.input_spec.clone()
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
        match (self.config.kernel_regularizer, self.kernel()) {
            (Some(l2), Some(kernel)) => {
                let w = kernel.val();
                vec![(w.clone() * w).sum().mul_scalar(l2)]
            }
            _ => Vec::new(),
        }
    }

    fn get_weights(&self) -> Result<Vec<ArrayD<f32>>> {
        weights::read_all(&self.params())
    }

    fn set_weights(&mut self, weights: Vec<ArrayD<f32>>) -> Result<()> {
        let name = self.name.clone();
        weights::assign_all(&name, self.params_mut(), &weights)
    }

    fn get_config(&self) -> Result<ConfigDict> {
        let mut config = self.config.clone();
        config.base.name = Some(self.name.clone());
        to_dict(&config)
    }
}
