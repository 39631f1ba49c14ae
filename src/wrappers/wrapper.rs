use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use ndarray::ArrayD;
use serde_json::Value;

use crate::config::{merge_base, BaseLayerConfig, ConfigDict, SerializedLayer};
use crate::error::{LayerError, Result};
use crate::layer::Layer;
use crate::registry::{self, CustomObjects};
use crate::weights::LayerWeight;

/// State shared by every wrapper layer: the wrapped layer plus the wrapper's
/// own name and base configuration.
///
/// The inner layer is supplied at construction, so every delegating accessor
/// can rely on it being present.
#[derive(Debug)]
pub struct Wrapper<B: Backend> {
    layer: Box<dyn Layer<B>>,
    name: String,
    base: BaseLayerConfig,
    built: bool,
}

impl<B: Backend> Wrapper<B> {
    pub fn new(layer: Box<dyn Layer<B>>, base: BaseLayerConfig, class_name: &str) -> Self {
        let name = base.resolve_name(class_name);
        Self {
            layer,
            name,
            base,
            built: false,
        }
    }

    pub fn layer(&self) -> &dyn Layer<B> {
        self.layer.as_ref()
    }

    pub fn layer_mut(&mut self) -> &mut dyn Layer<B> {
        self.layer.as_mut()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn base(&self) -> &BaseLayerConfig {
        &self.base
    }

    pub fn base_mut(&mut self) -> &mut BaseLayerConfig {
        &mut self.base
    }

    pub fn built(&self) -> bool {
        self.built
    }

    /// Marks the wrapper built. The inner layer is left alone; each wrapper
    /// builds it against the shape it should see.
    pub fn build(&mut self) {
        self.built = true;
    }

    pub fn trainable(&self) -> bool {
        self.layer.trainable()
    }

    pub fn set_trainable(&mut self, trainable: bool) {
        self.layer.set_trainable(trainable);
    }

    pub fn trainable_weights(&self) -> Vec<LayerWeight> {
        self.layer.trainable_weights()
    }

    pub fn non_trainable_weights(&self) -> Vec<LayerWeight> {
        self.layer.non_trainable_weights()
    }

    pub fn losses(&self) -> Vec<Tensor<B, 1>> {
        self.layer.losses()
    }

    pub fn get_weights(&self) -> Result<Vec<ArrayD<f32>>> {
        self.layer.get_weights()
    }

    pub fn set_weights(&mut self, weights: Vec<ArrayD<f32>>) -> Result<()> {
        self.layer.set_weights(weights)
    }

    /// Wrapper config: `own` fields, the nested `layer` entry, then the base
    /// fields for any key not already present.
    pub fn get_config(&self, mut own: ConfigDict, trainable: bool) -> Result<ConfigDict> {
        let inner = registry::serialize(self.layer.as_ref())?;
        own.insert("layer".to_string(), serde_json::to_value(inner)?);

        let mut base = self.base.clone();
        base.name = Some(self.name.clone());
        base.trainable = trainable;
        merge_base(own, &base)
    }

    /// Resolve the nested `layer` entry of a wrapper config.
    ///
    /// Returns the live inner layer and the remaining wrapper fields.
    pub fn split_config(
        config: &ConfigDict,
        custom_objects: &CustomObjects<B>,
        device: &B::Device,
    ) -> Result<(Box<dyn Layer<B>>, ConfigDict)> {
        let mut rest = config.clone();
        let entry = rest
            .remove("layer")
            .ok_or_else(|| LayerError::deserialization("wrapper config has no \"layer\" entry"))?;
        let serialized: SerializedLayer = match entry {
            Value::Object(_) => serde_json::from_value(entry)?,
            other => {
                return Err(LayerError::deserialization(format!(
                    "the \"layer\" entry of a wrapper config must be an object, got {other}"
                )))
            }
        };
        let layer = registry::deserialize(&serialized, custom_objects, device)?;
        Ok((layer, rest))
    }
}
