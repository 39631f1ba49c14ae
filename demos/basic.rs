//! Basic usage of the wrapper layers
//!
//! Applies a dense projection to every time step with `TimeDistributed`, then
//! reads a sequence in both directions with a `Bidirectional` LSTM.
//!
//! Run with `RUST_LOG=debug` to see layers being built and cloned.

use burn::backend::NdArray;
use burn::tensor::{Distribution, Tensor};
use seqwrap::prelude::*;

fn main() -> Result<()> {
    env_logger::init();
    println!("=== seqwrap Basic Example ===\n");

    // Use the NdArray backend (CPU)
    type Backend = NdArray<f32>;
    let device = Default::default();

    // Input shape: [batch=4, seq=10, features=20]
    let x: DynTensor<Backend> =
        Tensor::<Backend, 3>::random([4, 10, 20], Distribution::Uniform(-1.0, 1.0), &device).into();

    // Example 1: the same Dense layer on every time step
    println!("Example 1: TimeDistributed(Dense(8))");
    let mut td = TimeDistributed::new(Box::new(Dense::<Backend>::new(8, &device)));
    let projected = td.apply(x.clone().into(), ApplyOptions::new())?.into_single()?;
    println!("  Input shape:  {:?}", x.dims());
    println!("  Output shape: {}", projected.shape());
    println!("  Shared weights: {:?}", td.weights().iter().map(|w| &w.shape).collect::<Vec<_>>());
    println!();

    // Example 2: bidirectional LSTM, concatenated
    println!("Example 2: Bidirectional(LSTM(16), merge_mode=concat)");
    let lstm = RecurrentLayer::<Backend>::lstm(16, &device).with_return_sequences(true);
    let mut bi = Bidirectional::new(Box::new(lstm), Some(MergeMode::Concat))?;
    let y = bi.apply(projected, ApplyOptions::new())?.into_single()?;
    println!("  Output shape: {}", y.shape());
    println!("  Forward layer:  {}", bi.forward_layer().name());
    println!("  Backward layer: {}", bi.backward_layer().name());
    println!();

    // Example 3: unmerged directions plus final states
    println!("Example 3: Bidirectional(CfC(12), merge_mode=None, return_state)");
    let cfc = RecurrentLayer::<Backend>::cfc(12, &device).with_return_state(true);
    let mut bi_states = Bidirectional::new(Box::new(cfc), None)?;
    let outputs = bi_states.apply(x.into(), ApplyOptions::new())?.into_vec();
    for (i, out) in outputs.iter().enumerate() {
        println!("  Output {i}: {}", out.shape());
    }
    println!();

    // Example 4: shape inference without data
    println!("Example 4: Symbolic shapes");
    let mut td_symbolic = TimeDistributed::new(Box::new(Dense::<Backend>::new(3, &device)));
    let inferred = td_symbolic.apply(
        SymbolicTensor::new(Shape::batched(&[10, 20])).into(),
        ApplyOptions::new(),
    )?;
    println!("  [None, 10, 20] -> {}", inferred.into_single()?.shape());
    println!();

    println!("=== Examples completed successfully! ===");
    Ok(())
}
