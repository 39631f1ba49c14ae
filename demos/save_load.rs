//! Save and Load Example
//!
//! Serializes a wrapper layer to JSON, rebuilds it through the layer
//! registry, and copies the trained weights across.

use burn::backend::NdArray;
use burn::tensor::{Distribution, Tensor};
use seqwrap::prelude::*;

fn main() -> Result<()> {
    env_logger::init();
    println!("=== Model Save/Load Example ===\n");

    type Backend = NdArray<f32>;
    let device = Default::default();

    println!("Creating model...");
    let lstm = RecurrentLayer::<Backend>::lstm(6, &device)
        .with_return_sequences(true)
        .with_name("encoder");
    let mut model = Bidirectional::new(Box::new(lstm), Some(MergeMode::Sum))?;
    model.build(&Shape::batched(&[10, 12]))?;
    println!("  Weights: {}", model.weights().len());
    println!();

    // Architecture as JSON
    println!("=== Serialization ===");
    let serialized = serialize(&model)?;
    let json = serde_json::to_string_pretty(&serialized)?;
    println!("{json}");
    println!();

    // Rebuild from JSON and copy the weights
    println!("=== Deserialization ===");
    let parsed: SerializedLayer = serde_json::from_str(&json)?;
    let mut restored = deserialize(&parsed, &CustomObjects::<Backend>::new(), &device)?;
    restored.build(&Shape::batched(&[10, 12]))?;
    restored.set_weights(model.get_weights()?)?;
    println!("  Restored {} layer {}", restored.class_name(), restored.name());

    let x: DynTensor<Backend> =
        Tensor::<Backend, 3>::random([1, 10, 12], Distribution::Uniform(-1.0, 1.0), &device).into();
    let a = model.call(x.clone(), &CallOptions::new())?.into_single()?.to_vec()?;
    let b = restored.call(x, &CallOptions::new())?.into_single()?.to_vec()?;
    let max_diff = a
        .iter()
        .zip(&b)
        .map(|(x, y)| (x - y).abs())
        .fold(0.0f32, f32::max);
    println!("  Max output difference: {max_diff:e}");
    println!();

    println!("=== Example Complete ===");
    Ok(())
}
