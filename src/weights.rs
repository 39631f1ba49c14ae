//! Weight access shared by concrete layers.
//!
//! Layers expose their parameters as named [`ParamRef`]/[`ParamMut`] slots;
//! the helpers here turn those slots into weight descriptors and move values
//! between Burn parameters and host-side `ndarray` arrays.

use burn::module::Param;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use ndarray::{ArrayD, IxDyn};

use crate::error::{LayerError, Result};

/// Descriptor of one weight variable of a layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerWeight {
    pub name: String,
    pub shape: Vec<usize>,
    pub trainable: bool,
}

/// Read-only view of a layer parameter.
pub enum ParamRef<'a, B: Backend> {
    Matrix(&'a Param<Tensor<B, 2>>),
    Vector(&'a Param<Tensor<B, 1>>),
}

/// Mutable view of a layer parameter.
pub enum ParamMut<'a, B: Backend> {
    Matrix(&'a mut Param<Tensor<B, 2>>),
    Vector(&'a mut Param<Tensor<B, 1>>),
}

impl<B: Backend> ParamRef<'_, B> {
    pub fn shape(&self) -> Vec<usize> {
        match self {
            Self::Matrix(p) => p.val().dims().to_vec(),
            Self::Vector(p) => p.val().dims().to_vec(),
        }
    }

    pub fn to_array(&self) -> Result<ArrayD<f32>> {
        match self {
            Self::Matrix(p) => tensor_to_array(p.val()),
            Self::Vector(p) => tensor_to_array(p.val()),
        }
    }
}

impl<B: Backend> ParamMut<'_, B> {
    pub fn shape(&self) -> Vec<usize> {
        match self {
            Self::Matrix(p) => p.val().dims().to_vec(),
            Self::Vector(p) => p.val().dims().to_vec(),
        }
    }

    /// Replace the parameter value; the caller has already checked the shape.
    fn assign(&mut self, array: &ArrayD<f32>) -> Result<()> {
        match self {
            Self::Matrix(p) => {
                let device = p.val().device();
                **p = Param::from_tensor(array_to_tensor(array, &device)?);
            }
            Self::Vector(p) => {
                let device = p.val().device();
                **p = Param::from_tensor(array_to_tensor(array, &device)?);
            }
        }
        Ok(())
    }
}

/// Copy a tensor to a host array of the same shape.
pub fn tensor_to_array<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Result<ArrayD<f32>> {
    let shape = tensor.dims().to_vec();
    let values = tensor
        .into_data()
        .to_vec::<f32>()
        .map_err(|err| LayerError::Tensor(format!("{err:?}")))?;
    ArrayD::from_shape_vec(IxDyn(&shape), values).map_err(|err| LayerError::Tensor(err.to_string()))
}

/// Upload a host array as a tensor of rank `D`.
pub fn array_to_tensor<B: Backend, const D: usize>(
    array: &ArrayD<f32>,
    device: &B::Device,
) -> Result<Tensor<B, D>> {
    let shape: [usize; D] = array.shape().try_into().map_err(|_| {
        LayerError::validation(format!(
            "expected an array of rank {D}, got shape {:?}",
            array.shape()
        ))
    })?;
    let values: Vec<f32> = array.iter().copied().collect();
    Ok(Tensor::<B, 1>::from_floats(values.as_slice(), device).reshape(shape))
}

/// Weight descriptors for `params`, all flagged with `trainable`.
pub fn describe<B: Backend>(params: &[(String, ParamRef<'_, B>)], trainable: bool) -> Vec<LayerWeight> {
    params
        .iter()
        .map(|(name, param)| LayerWeight {
            name: name.clone(),
            shape: param.shape(),
            trainable,
        })
        .collect()
}

/// Current values of `params`, in order.
pub fn read_all<B: Backend>(params: &[(String, ParamRef<'_, B>)]) -> Result<Vec<ArrayD<f32>>> {
    params.iter().map(|(_, param)| param.to_array()).collect()
}

/// Assign `weights` to `params` positionally after validating count and shapes.
///
/// Nothing is written unless every weight matches.
pub fn assign_all<B: Backend>(
    layer_name: &str,
    mut params: Vec<(String, ParamMut<'_, B>)>,
    weights: &[ArrayD<f32>],
) -> Result<()> {
    if params.len() != weights.len() {
        return Err(LayerError::validation(format!(
            "you called set_weights on layer \"{layer_name}\" with a weight list of length {}, but the layer was expecting {} weights",
            weights.len(),
            params.len()
        )));
    }
    for ((name, param), value) in params.iter().zip(weights) {
        let expected = param.shape();
        if expected.as_slice() != value.shape() {
            return Err(LayerError::validation(format!(
                "layer weight shape {expected:?} of {name} is not compatible with provided weight shape {:?}",
                value.shape()
            )));
        }
    }
    for ((_, param), value) in params.iter_mut().zip(weights) {
        param.assign(value)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::backend::Backend as BurnBackend;

    type TestBackend = NdArray<f32>;
    type TestDevice = <TestBackend as BurnBackend>::Device;

    fn get_test_device() -> TestDevice {
        Default::default()
    }

    #[test]
    fn test_tensor_array_round_trip() {
        let device = get_test_device();
        let tensor = Tensor::<TestBackend, 1>::from_floats([1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &device)
            .reshape([2, 3]);

        let array = tensor_to_array(tensor).unwrap();
        assert_eq!(array.shape(), &[2, 3]);
        assert_eq!(array[[1, 0]], 4.0);

        let back: Tensor<TestBackend, 2> = array_to_tensor(&array, &device).unwrap();
        assert_eq!(back.dims(), [2, 3]);
    }

    #[test]
    fn test_array_to_tensor_rank_mismatch() {
        let device = get_test_device();
        let array = ArrayD::<f32>::zeros(IxDyn(&[4]));
        let result: Result<Tensor<TestBackend, 2>> = array_to_tensor(&array, &device);
        assert!(result.unwrap_err().is_validation());
    }

    #[test]
    fn test_assign_all_validates_before_writing() {
        let device = get_test_device();
        let mut kernel = Param::from_tensor(Tensor::<TestBackend, 2>::zeros([2, 3], &device));
        let mut bias = Param::from_tensor(Tensor::<TestBackend, 1>::zeros([3], &device));

        let good_kernel = ArrayD::<f32>::ones(IxDyn(&[2, 3]));
        let bad_bias = ArrayD::<f32>::ones(IxDyn(&[4]));
        let params = vec![
            ("kernel".to_string(), ParamMut::Matrix(&mut kernel)),
            ("bias".to_string(), ParamMut::Vector(&mut bias)),
        ];
        let err = assign_all("dense", params, &[good_kernel, bad_bias]).unwrap_err();
        assert!(err.is_validation());
        assert_eq!(kernel.val().sum().into_scalar(), 0.0);
    }
}
