//! Apply one layer to every time slice of an input.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use ndarray::ArrayD;

use super::wrapper::Wrapper;
use crate::backend;
use crate::config::{from_dict, BaseLayerConfig, ConfigDict};
use crate::error::{LayerError, Result};
use crate::layer::{CallOptions, Layer};
use crate::registry::CustomObjects;
use crate::shape::{InputSpec, Shape};
use crate::tensor::{DynTensor, OneOrMany};
use crate::weights::LayerWeight;

/// Applies a layer independently to every step of axis 1.
///
/// The input must have rank 3 or more (`[batch, time, ...]`). The wrapped
/// layer sees `[batch, ...]` slices and shares its weights across all steps.
///
/// ```ignore
/// let dense = Dense::<Backend>::new(8, &device);
/// let mut td = TimeDistributed::new(Box::new(dense));
/// // [32, 10, 16] -> [32, 10, 8]
/// let y = td.apply(x.into(), ApplyOptions::new())?;
/// ```
#[derive(Debug)]
pub struct TimeDistributed<B: Backend> {
    wrapper: Wrapper<B>,
    input_spec: Vec<InputSpec>,
}

impl<B: Backend> TimeDistributed<B> {
    pub fn new(layer: Box<dyn Layer<B>>) -> Self {
        Self::with_base(layer, BaseLayerConfig::default())
    }

    pub fn with_base(layer: Box<dyn Layer<B>>, base: BaseLayerConfig) -> Self {
        Self {
            wrapper: Wrapper::new(layer, base, "TimeDistributed"),
            input_spec: Vec::new(),
        }
    }

    pub fn from_config(
        config: &ConfigDict,
        custom_objects: &CustomObjects<B>,
        device: &B::Device,
    ) -> Result<Self> {
        let (layer, rest) = Wrapper::split_config(config, custom_objects, device)?;
        let base: BaseLayerConfig = from_dict(&rest)?;
        let trainable = base.trainable;
        let mut td = Self::with_base(layer, base);
        td.set_trainable(trainable);
        Ok(td)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.wrapper.set_name(name);
        self
    }

    /// The wrapped layer.
    pub fn layer(&self) -> &dyn Layer<B> {
        self.wrapper.layer()
    }

    fn check_rank(&self, input_shape: &Shape) -> Result<()> {
        if input_shape.rank() < 3 {
            return Err(LayerError::validation(format!(
                "`TimeDistributed` layer {} requires an input of at least rank 3 ([batch, time, ...]), received input shape: {input_shape}",
                self.wrapper.name()
            )));
        }
        Ok(())
    }

    /// Output shape of the wrapped layer on one time slice. Steps are
    /// stacked into a single tensor, so the wrapped layer must produce
    /// exactly one output.
    fn step_output_shape(&self, input_shape: &Shape) -> Result<Shape> {
        let inner = self.wrapper.layer();
        match inner.compute_output_shape(&input_shape.without_axis(1))? {
            OneOrMany::One(shape) => Ok(shape),
            OneOrMany::Many(shapes) => Err(LayerError::validation(format!(
                "`TimeDistributed` layer {} requires a wrapped layer with a single output, but {} returns {} outputs",
                self.wrapper.name(),
                inner.name(),
                shapes.len()
            ))),
        }
    }
}

impl<B: Backend> Layer<B> for TimeDistributed<B> {
    fn class_name(&self) -> &'static str {
        "TimeDistributed"
    }

    fn name(&self) -> &str {
        self.wrapper.name()
    }

    fn device(&self) -> &B::Device {
        self.wrapper.layer().device()
    }

    fn built(&self) -> bool {
        self.wrapper.built()
    }

    fn build(&mut self, input_shape: &Shape) -> Result<()> {
        self.check_rank(input_shape)?;
        let step_shape = input_shape.without_axis(1);
        let inner = self.wrapper.layer_mut();
        if !inner.built() {
            log::debug!("building {} on per-step shape {step_shape}", inner.name());
            inner.build(&step_shape)?;
        }
        self.step_output_shape(input_shape)?;
        self.input_spec = vec![InputSpec::with_shape(input_shape)];
        self.wrapper.build();
        Ok(())
    }

    fn compute_output_shape(&self, input_shape: &Shape) -> Result<OneOrMany<Shape>> {
        self.check_rank(input_shape)?;
        let step_output = self.step_output_shape(input_shape)?;
        Ok(OneOrMany::One(step_output.with_axis(1, input_shape.dim(1))))
    }

    fn call(&mut self, inputs: DynTensor<B>, options: &CallOptions<B>) -> Result<OneOrMany<DynTensor<B>>> {
        if inputs.rank() < 3 {
            return Err(LayerError::validation(format!(
                "`TimeDistributed` layer {} requires an input of at least rank 3, received shape {:?}",
                self.wrapper.name(),
                inputs.dims()
            )));
        }
        // Per-step slices are dropped as soon as each step returns; only
        // the stacked result outlives this call.
        let inner = self.wrapper.layer_mut();
        let out = backend::rnn(
            |step, _states, _constants| {
                let output = inner.call(step, options)?.into_single()?;
                Ok((output, Vec::new()))
            },
            &inputs,
            Vec::new(),
            false,
            None,
            &[],
        )?;
        Ok(OneOrMany::One(out.outputs))
    }

    fn input_spec(&self) -> Vec<InputSpec> {
        self.input_spec.clone()
    }

    fn trainable(&self) -> bool {
        self.wrapper.trainable()
    }

    fn set_trainable(&mut self, trainable: bool) {
        self.wrapper.set_trainable(trainable);
    }

    fn trainable_weights(&self) -> Vec<LayerWeight> {
        self.wrapper.trainable_weights()
    }

    fn non_trainable_weights(&self) -> Vec<LayerWeight> {
        self.wrapper.non_trainable_weights()
    }

    fn losses(&self) -> Vec<Tensor<B, 1>> {
        self.wrapper.losses()
    }

    fn get_weights(&self) -> Result<Vec<ArrayD<f32>>> {
        self.wrapper.get_weights()
    }

    fn set_weights(&mut self, weights: Vec<ArrayD<f32>>) -> Result<()> {
        self.wrapper.set_weights(weights)
    }

    fn reset_states(&mut self) -> Result<()> {
        self.wrapper.layer_mut().reset_states()
    }

    fn get_config(&self) -> Result<ConfigDict> {
        self.wrapper.get_config(ConfigDict::new(), self.trainable())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::backend::Backend as BurnBackend;
    use burn::tensor::Distribution;

    use crate::layers::Dense;

    type TestBackend = NdArray<f32>;
    type TestDevice = <TestBackend as BurnBackend>::Device;

    fn get_test_device() -> TestDevice {
        Default::default()
    }

    #[test]
    fn test_build_rejects_rank_two() {
        let device = get_test_device();
        let mut td = TimeDistributed::new(Box::new(Dense::<TestBackend>::new(1, &device)));

        let err = td.build(&Shape::batched(&[4])).unwrap_err();
        assert!(err.is_validation());
        assert!(err.to_string().contains("[None, 4]"));
        assert!(!td.built());
    }

    #[test]
    fn test_build_uses_per_step_shape() {
        let device = get_test_device();
        let mut td = TimeDistributed::new(Box::new(Dense::<TestBackend>::new(2, &device)));
        td.build(&Shape::batched(&[3, 4])).unwrap();

        assert!(td.built());
        assert!(td.layer().built());
        assert_eq!(td.weights()[0].shape, vec![4, 2]);
        assert_eq!(td.input_spec()[0].shape, Some(Shape::batched(&[3, 4])));
    }

    #[test]
    fn test_output_shape_reinserts_time_axis() {
        let device = get_test_device();
        let td = TimeDistributed::new(Box::new(Dense::<TestBackend>::new(5, &device)));

        let shape = td.compute_output_shape(&Shape::batched(&[7, 2, 3])).unwrap();
        assert_eq!(shape, OneOrMany::One(Shape::batched(&[7, 2, 5])));
    }

    #[test]
    fn test_call_matches_per_step_application() {
        let device = get_test_device();
        let mut td = TimeDistributed::new(Box::new(Dense::<TestBackend>::new(3, &device)));
        td.build(&Shape::batched(&[4, 2])).unwrap();

        let x: DynTensor<TestBackend> =
            Tensor::<TestBackend, 3>::random([2, 4, 2], Distribution::Default, &device).into();
        let y = td.call(x.clone(), &CallOptions::new()).unwrap().into_single().unwrap();
        assert_eq!(y.dims(), vec![2, 4, 3]);

        let options = CallOptions::new();
        for t in 0..4 {
            let expected = td
                .wrapper
                .layer_mut()
                .call(x.time_step(t).unwrap(), &options)
                .unwrap()
                .into_single()
                .unwrap();
            let actual = y.time_step(t).unwrap();
            for (a, b) in actual.to_vec().unwrap().iter().zip(expected.to_vec().unwrap()) {
                assert!((a - b).abs() < 1e-6);
            }
        }
    }
}
