//! Tests for the Bidirectional wrapper

use burn::backend::NdArray;
use burn::tensor::backend::Backend as BurnBackend;
use burn::tensor::{Distribution, Tensor};
use seqwrap::error::LayerError;
use seqwrap::layer::{ApplyOptions, CallOptions, Layer};
use seqwrap::layers::Dense;
use seqwrap::rnn::RecurrentLayer;
use seqwrap::shape::Shape;
use seqwrap::tensor::{DynTensor, OneOrMany, SymbolicTensor, TensorValue};
use seqwrap::wrappers::{Bidirectional, BidirectionalArgs, MergeMode};

type Backend = NdArray<f32>;
type Device = <Backend as BurnBackend>::Device;

fn get_test_device() -> Device {
    Default::default()
}

fn lstm(units: usize, device: &Device) -> RecurrentLayer<Backend> {
    RecurrentLayer::<Backend>::lstm(units, device).with_return_sequences(true)
}

fn input(dims: [usize; 3], device: &Device) -> DynTensor<Backend> {
    Tensor::<Backend, 3>::random(dims, Distribution::Uniform(-1.0, 1.0), device).into()
}

fn output_shapes(outputs: OneOrMany<TensorValue<Backend>>) -> Vec<Shape> {
    outputs.into_vec().iter().map(TensorValue::shape).collect()
}

fn assert_close(a: &[f32], b: &[f32]) {
    assert_eq!(a.len(), b.len());
    for (x, y) in a.iter().zip(b) {
        assert!((x - y).abs() < 1e-5, "{x} != {y}");
    }
}

#[test]
fn test_concat_doubles_last_axis() {
    let device = get_test_device();
    let mut bi = Bidirectional::new(Box::new(lstm(3, &device)), Some(MergeMode::Concat)).unwrap();

    let y = bi.apply(input([2, 5, 4], &device).into(), ApplyOptions::new()).unwrap();

    assert_eq!(output_shapes(y), vec![Shape::from([2, 5, 6])]);
}

#[test]
fn test_elementwise_merge_modes_keep_shape() {
    let device = get_test_device();
    for mode in [MergeMode::Sum, MergeMode::Mul, MergeMode::Ave] {
        let mut bi = Bidirectional::new(Box::new(lstm(3, &device)), Some(mode)).unwrap();
        let y = bi.apply(input([2, 5, 4], &device).into(), ApplyOptions::new()).unwrap();
        assert_eq!(output_shapes(y), vec![Shape::from([2, 5, 3])], "merge mode {mode}");
    }
}

#[test]
fn test_no_merge_returns_both_directions() {
    let device = get_test_device();
    let mut bi = Bidirectional::new(Box::new(lstm(3, &device)), None).unwrap();

    let y = bi.apply(input([2, 5, 4], &device).into(), ApplyOptions::new()).unwrap();

    assert!(y.is_many());
    assert_eq!(output_shapes(y), vec![Shape::from([2, 5, 3]), Shape::from([2, 5, 3])]);
}

#[test]
fn test_invalid_merge_mode_is_rejected() {
    let device = get_test_device();
    let args = BidirectionalArgs::new(Box::new(lstm(3, &device))).with_merge_mode(Some("xyz"));

    let err = Bidirectional::from_args(args).unwrap_err();
    assert!(err.is_validation());
    assert!(err.to_string().contains("xyz"));
}

#[test]
fn test_initial_weights_are_not_supported() {
    let device = get_test_device();
    let args = BidirectionalArgs::new(Box::new(lstm(3, &device))).with_weights(Vec::new());

    assert!(Bidirectional::from_args(args).unwrap_err().is_not_implemented());
}

#[test]
fn test_requires_recurrent_layer() {
    let device = get_test_device();
    let err = Bidirectional::new(Box::new(Dense::<Backend>::new(3, &device)), None).unwrap_err();
    assert!(err.is_validation());
}

#[test]
fn test_clones_are_named_and_flipped() {
    let device = get_test_device();
    let original = lstm(3, &device).with_name("enc");
    let bi = Bidirectional::new(Box::new(original), Some(MergeMode::Concat)).unwrap();

    assert_eq!(bi.forward_layer().name(), "forward_enc");
    assert_eq!(bi.backward_layer().name(), "backward_enc");
    assert_eq!(bi.forward_layer().get_config().unwrap()["goBackwards"], false);
    assert_eq!(bi.backward_layer().get_config().unwrap()["goBackwards"], true);
    assert!(bi.return_sequences());
    assert!(!bi.return_state());

    let reversed = lstm(3, &device).with_name("rev").with_go_backwards(true);
    let bi = Bidirectional::new(Box::new(reversed), Some(MergeMode::Concat)).unwrap();
    assert_eq!(bi.forward_layer().get_config().unwrap()["goBackwards"], true);
    assert_eq!(bi.backward_layer().get_config().unwrap()["goBackwards"], false);
}

#[test]
fn test_outputs_match_standalone_directions() {
    let device = get_test_device();
    let mut bi = Bidirectional::new(Box::new(lstm(3, &device)), None).unwrap();
    bi.build(&Shape::batched(&[5, 4])).unwrap();

    let mut weights = bi.get_weights().unwrap();
    let backward_weights = weights.split_off(weights.len() / 2);
    let mut forward = lstm(3, &device);
    let mut backward = lstm(3, &device).with_go_backwards(true);
    forward.build(&Shape::batched(&[5, 4])).unwrap();
    backward.build(&Shape::batched(&[5, 4])).unwrap();
    forward.set_weights(weights).unwrap();
    backward.set_weights(backward_weights).unwrap();

    let x = input([2, 5, 4], &device);
    let outputs = bi.call(x.clone(), &CallOptions::new()).unwrap().into_vec();
    let expected_forward = forward.call(x.clone(), &CallOptions::new()).unwrap().into_single().unwrap();
    let expected_backward = backward
        .call(x, &CallOptions::new())
        .unwrap()
        .into_single()
        .unwrap()
        .reverse_time()
        .unwrap();

    assert_close(&outputs[0].to_vec().unwrap(), &expected_forward.to_vec().unwrap());
    assert_close(&outputs[1].to_vec().unwrap(), &expected_backward.to_vec().unwrap());
}

#[test]
fn test_ave_is_half_of_sum() {
    let device = get_test_device();
    let mut sum = Bidirectional::new(Box::new(lstm(2, &device)), Some(MergeMode::Sum)).unwrap();
    let mut ave = Bidirectional::new(Box::new(lstm(2, &device)), Some(MergeMode::Ave)).unwrap();
    sum.build(&Shape::batched(&[3, 4])).unwrap();
    ave.build(&Shape::batched(&[3, 4])).unwrap();
    ave.set_weights(sum.get_weights().unwrap()).unwrap();

    let x = input([1, 3, 4], &device);
    let s = sum.call(x.clone(), &CallOptions::new()).unwrap().into_single().unwrap();
    let a = ave.call(x, &CallOptions::new()).unwrap().into_single().unwrap();
    assert_close(&s.mul_scalar(0.5).to_vec().unwrap(), &a.to_vec().unwrap());
}

#[test]
fn test_return_state_appends_forward_then_backward_states() {
    let device = get_test_device();
    let layer = RecurrentLayer::<Backend>::lstm(3, &device).with_return_state(true);
    let mut bi = Bidirectional::new(Box::new(layer), Some(MergeMode::Concat)).unwrap();

    let symbolic = bi
        .compute_output_shape(&Shape::batched(&[5, 4]))
        .unwrap()
        .into_vec();
    assert_eq!(symbolic.len(), 5);
    assert_eq!(symbolic[0], Shape::batched(&[6]));

    let outputs = bi.apply(input([2, 5, 4], &device).into(), ApplyOptions::new()).unwrap();
    let shapes = output_shapes(outputs);
    assert_eq!(shapes.len(), 5);
    assert_eq!(shapes[0], Shape::from([2, 6]));
    for state in &shapes[1..] {
        assert_eq!(*state, Shape::from([2, 3]));
    }
}

#[test]
fn test_no_merge_with_state_shapes() {
    let device = get_test_device();
    let layer = RecurrentLayer::<Backend>::cfc(4, &device)
        .with_return_sequences(true)
        .with_return_state(true);
    let bi = Bidirectional::new(Box::new(layer), None).unwrap();

    let shapes = bi.compute_output_shape(&Shape::batched(&[7, 2])).unwrap().into_vec();
    assert_eq!(
        shapes,
        vec![
            Shape::batched(&[7, 4]),
            Shape::batched(&[7, 4]),
            Shape::batched(&[4]),
            Shape::batched(&[4]),
        ]
    );
}

#[test]
fn test_weights_round_trip() {
    let device = get_test_device();
    let mut bi = Bidirectional::new(Box::new(lstm(3, &device)), Some(MergeMode::Concat)).unwrap();
    bi.build(&Shape::batched(&[5, 4])).unwrap();

    let weights = bi.get_weights().unwrap();
    assert_eq!(weights.len(), 6);
    let shifted: Vec<_> = weights.iter().map(|w| w.mapv(|v| v + 1.0)).collect();

    bi.set_weights(shifted.clone()).unwrap();
    assert_eq!(bi.get_weights().unwrap(), shifted);
}

#[test]
fn test_weight_names_do_not_collide() {
    let device = get_test_device();
    let mut bi = Bidirectional::new(Box::new(lstm(3, &device).with_name("enc")), None).unwrap();
    bi.build(&Shape::batched(&[5, 4])).unwrap();

    let names: Vec<_> = bi.weights().into_iter().map(|w| w.name).collect();
    assert_eq!(names.len(), 6);
    assert_eq!(names[0], "forward_enc/kernel");
    assert_eq!(names[3], "backward_enc/kernel");
}

#[test]
fn test_mask_is_not_supported() {
    let device = get_test_device();
    let mut bi = Bidirectional::new(Box::new(lstm(3, &device)), None).unwrap();
    bi.build(&Shape::batched(&[5, 4])).unwrap();

    let mask = Tensor::<Backend, 2>::ones([2, 5], &device);
    let err = bi
        .call(input([2, 5, 4], &device), &CallOptions::new().with_mask(mask))
        .unwrap_err();
    assert!(matches!(err, LayerError::NotImplemented(_)));
}

#[test]
fn test_constants_are_not_supported() {
    let device = get_test_device();
    let mut bi = Bidirectional::new(Box::new(lstm(3, &device)), None).unwrap();
    let constant: DynTensor<Backend> = Tensor::<Backend, 2>::zeros([2, 1], &device).into();

    let err = bi
        .apply(
            input([2, 5, 4], &device).into(),
            ApplyOptions::new().with_constants(vec![constant.into()]),
        )
        .unwrap_err();
    assert!(err.is_not_implemented());
    assert!(!bi.built());
}

#[test]
fn test_initial_state_is_split_between_directions() {
    let device = get_test_device();
    let layer = RecurrentLayer::<Backend>::lstm(3, &device);
    let mut bi = Bidirectional::new(Box::new(layer), None).unwrap();
    let x = input([2, 5, 4], &device);

    let baseline = bi
        .apply(x.clone().into(), ApplyOptions::new())
        .unwrap()
        .into_vec();

    // Non-zero forward states, zero backward states.
    let mut states: Vec<TensorValue<Backend>> = Vec::new();
    for _ in 0..2 {
        states.push(DynTensor::from(Tensor::<Backend, 2>::ones([2, 3], &device)).into());
    }
    for _ in 0..2 {
        states.push(DynTensor::from(Tensor::<Backend, 2>::zeros([2, 3], &device)).into());
    }
    let seeded = bi
        .apply(x.into(), ApplyOptions::new().with_initial_state(states))
        .unwrap()
        .into_vec();

    let values = |v: &TensorValue<Backend>| v.clone().into_concrete().unwrap().to_vec().unwrap();
    let forward_diff: f32 = values(&baseline[0])
        .iter()
        .zip(values(&seeded[0]))
        .map(|(a, b)| (a - b).abs())
        .sum();
    assert!(forward_diff > 1e-4);
    assert_close(&values(&baseline[1]), &values(&seeded[1]));
}

#[test]
fn test_odd_state_count_is_rejected() {
    let device = get_test_device();
    let layer = RecurrentLayer::<Backend>::cfc(3, &device);
    let mut bi = Bidirectional::new(Box::new(layer), None).unwrap();
    let state: DynTensor<Backend> = Tensor::<Backend, 2>::zeros([2, 3], &device).into();

    let err = bi
        .apply(
            input([2, 5, 4], &device).into(),
            ApplyOptions::new().with_initial_state(vec![state.into()]),
        )
        .unwrap_err();
    assert!(err.is_validation());
}

#[test]
fn test_symbolic_states_are_extra_inputs() {
    let device = get_test_device();
    let layer = RecurrentLayer::<Backend>::cfc(3, &device).with_return_sequences(true);
    let mut bi = Bidirectional::new(Box::new(layer), Some(MergeMode::Concat)).unwrap();
    let state = || TensorValue::from(SymbolicTensor::new(Shape::batched(&[3])));

    let out = bi
        .apply(
            SymbolicTensor::new(Shape::batched(&[5, 4])).into(),
            ApplyOptions::new().with_initial_state(vec![state(), state()]),
        )
        .unwrap();

    assert!(bi.built());
    assert_eq!(output_shapes(out), vec![Shape::batched(&[5, 6])]);
    assert_eq!(bi.input_spec().len(), 1);
}

#[test]
fn test_mixed_symbolic_and_concrete_states_are_rejected() {
    let device = get_test_device();
    let layer = RecurrentLayer::<Backend>::cfc(3, &device);
    let mut bi = Bidirectional::new(Box::new(layer), None).unwrap();
    let concrete: DynTensor<Backend> = Tensor::<Backend, 2>::zeros([2, 3], &device).into();

    let err = bi
        .apply(
            SymbolicTensor::new(Shape::batched(&[5, 4])).into(),
            ApplyOptions::new().with_initial_state(vec![
                SymbolicTensor::new(Shape::batched(&[3])).into(),
                concrete.into(),
            ]),
        )
        .unwrap_err();
    assert!(err.is_validation());
}

#[test]
fn test_trainable_propagates_to_both_directions() {
    let device = get_test_device();
    let mut bi = Bidirectional::new(Box::new(lstm(3, &device)), None).unwrap();
    bi.build(&Shape::batched(&[5, 4])).unwrap();
    assert_eq!(bi.trainable_weights().len(), 6);

    bi.set_trainable(false);
    assert!(!bi.trainable());
    assert!(!bi.forward_layer().trainable());
    assert!(!bi.backward_layer().trainable());
    assert!(bi.trainable_weights().is_empty());
    assert_eq!(bi.non_trainable_weights().len(), 6);
}

#[test]
fn test_reset_states_resets_both_directions() {
    let device = get_test_device();
    let stateful = RecurrentLayer::<Backend>::cfc(3, &device).with_stateful(true);
    let mut bi = Bidirectional::new(Box::new(stateful), Some(MergeMode::Sum)).unwrap();
    assert!(bi.stateful());
    bi.build(&Shape::batched(&[2, 4])).unwrap();

    let x = input([1, 2, 4], &device);
    let first = bi.call(x.clone(), &CallOptions::new()).unwrap().into_single().unwrap();
    bi.call(x.clone(), &CallOptions::new()).unwrap();
    bi.reset_states().unwrap();
    let after_reset = bi.call(x, &CallOptions::new()).unwrap().into_single().unwrap();
    assert_close(&first.to_vec().unwrap(), &after_reset.to_vec().unwrap());

    let mut stateless = Bidirectional::new(Box::new(lstm(3, &device)), None).unwrap();
    assert!(matches!(stateless.reset_states(), Err(LayerError::Attribute(_))));
}

#[test]
fn test_failed_set_weights_leaves_both_directions_untouched() {
    let device = get_test_device();
    let mut bi = Bidirectional::new(Box::new(lstm(3, &device)), None).unwrap();
    bi.build(&Shape::batched(&[5, 4])).unwrap();
    let before = bi.get_weights().unwrap();

    // Seven arrays: the forward half of three is valid, the backward four is not.
    let mut shifted: Vec<_> = before.iter().map(|w| w.mapv(|v| v + 1.0)).collect();
    shifted.push(before[0].clone());

    let err = bi.set_weights(shifted).unwrap_err();
    assert!(err.is_validation());
    assert_eq!(bi.get_weights().unwrap(), before);
}

#[test]
fn test_frozen_layer_stays_frozen() {
    let device = get_test_device();
    let mut frozen = lstm(3, &device);
    frozen.set_trainable(false);

    let bi = Bidirectional::new(Box::new(frozen), None).unwrap();
    assert!(!bi.trainable());
    assert!(!bi.forward_layer().trainable());
    assert!(!bi.backward_layer().trainable());

    let mut frozen = lstm(3, &device);
    frozen.set_trainable(false);
    let args = BidirectionalArgs::new(Box::new(frozen)).with_trainable(true);
    let bi = Bidirectional::from_args(args).unwrap();
    assert!(bi.trainable());
    assert!(bi.backward_layer().trainable());
}
