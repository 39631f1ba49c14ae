//! Class registry: resolves serialized layers back into live instances.
//!
//! Built-in kinds form a closed set ([`LayerKind`]). User layers are added
//! through [`CustomObjects`], which is consulted first so a user class can
//! shadow a built-in one.

use std::collections::BTreeMap;
use std::fmt;

use burn::tensor::backend::Backend;

use crate::config::{ConfigDict, SerializedLayer};
use crate::error::{LayerError, Result};
use crate::layer::Layer;
use crate::layers::Dense;
use crate::rnn::{CellKind, RecurrentLayer};
use crate::wrappers::{Bidirectional, TimeDistributed};

/// Constructor stored for a user-registered class.
pub type LayerConstructor<B> =
    fn(&ConfigDict, &CustomObjects<B>, &<B as Backend>::Device) -> Result<Box<dyn Layer<B>>>;

/// Built-in layer kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerKind {
    Dense,
    Lstm,
    CfC,
    TimeDistributed,
    Bidirectional,
}

impl LayerKind {
    pub const ALL: [LayerKind; 5] = [
        Self::Dense,
        Self::Lstm,
        Self::CfC,
        Self::TimeDistributed,
        Self::Bidirectional,
    ];

    pub fn class_name(&self) -> &'static str {
        match self {
            Self::Dense => "Dense",
            Self::Lstm => "LSTM",
            Self::CfC => "CfC",
            Self::TimeDistributed => "TimeDistributed",
            Self::Bidirectional => "Bidirectional",
        }
    }

    pub fn from_class_name(class_name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.class_name() == class_name)
    }

    fn construct<B: Backend>(
        &self,
        config: &ConfigDict,
        custom_objects: &CustomObjects<B>,
        device: &B::Device,
    ) -> Result<Box<dyn Layer<B>>> {
        Ok(match self {
            Self::Dense => Box::new(Dense::from_config(config, device)?),
            Self::Lstm => Box::new(RecurrentLayer::from_config(CellKind::Lstm, config, device)?),
            Self::CfC => Box::new(RecurrentLayer::from_config(CellKind::CfC, config, device)?),
            Self::TimeDistributed => {
                Box::new(TimeDistributed::from_config(config, custom_objects, device)?)
            }
            Self::Bidirectional => {
                Box::new(Bidirectional::from_config(config, custom_objects, device)?)
            }
        })
    }
}

/// User-registered layer classes, looked up by class name.
pub struct CustomObjects<B: Backend> {
    constructors: BTreeMap<String, LayerConstructor<B>>,
}

impl<B: Backend> Default for CustomObjects<B> {
    fn default() -> Self {
        Self {
            constructors: BTreeMap::new(),
        }
    }
}

impl<B: Backend> Clone for CustomObjects<B> {
    fn clone(&self) -> Self {
        Self {
            constructors: self.constructors.clone(),
        }
    }
}

impl<B: Backend> fmt::Debug for CustomObjects<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.constructors.keys()).finish()
    }
}

impl<B: Backend> CustomObjects<B> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, class_name: impl Into<String>, constructor: LayerConstructor<B>) -> Self {
        self.register(class_name, constructor);
        self
    }

    pub fn register(&mut self, class_name: impl Into<String>, constructor: LayerConstructor<B>) {
        self.constructors.insert(class_name.into(), constructor);
    }

    pub fn get(&self, class_name: &str) -> Option<LayerConstructor<B>> {
        self.constructors.get(class_name).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.constructors.is_empty()
    }
}

/// Class name and configuration of `layer`.
pub fn serialize<B: Backend>(layer: &dyn Layer<B>) -> Result<SerializedLayer> {
    Ok(SerializedLayer {
        class_name: layer.class_name().to_string(),
        config: layer.get_config()?,
    })
}

/// Construct a fresh layer from its class name and configuration.
pub fn deserialize<B: Backend>(
    serialized: &SerializedLayer,
    custom_objects: &CustomObjects<B>,
    device: &B::Device,
) -> Result<Box<dyn Layer<B>>> {
    let class_name = serialized.class_name.as_str();
    if let Some(constructor) = custom_objects.get(class_name) {
        return constructor(&serialized.config, custom_objects, device);
    }
    match LayerKind::from_class_name(class_name) {
        Some(kind) => kind.construct(&serialized.config, custom_objects, device),
        None => Err(LayerError::deserialization(format!("unknown layer: {class_name}"))),
    }
}

/// Deep copy of `layer` through a config round trip.
///
/// Keys in `overrides` replace the corresponding config entries before the
/// copy is constructed. The copy is unbuilt and shares no state with `layer`.
pub fn clone_layer<B: Backend>(
    layer: &dyn Layer<B>,
    overrides: ConfigDict,
    custom_objects: &CustomObjects<B>,
) -> Result<Box<dyn Layer<B>>> {
    let mut serialized = serialize(layer)?;
    serialized.config.extend(overrides);
    log::debug!(
        "cloning {} layer {} as {:?}",
        serialized.class_name,
        layer.name(),
        serialized.config.get("name")
    );
    deserialize(&serialized, custom_objects, layer.device())
}
