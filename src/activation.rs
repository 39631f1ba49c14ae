//! Activation functions
//!
//! [`Activation`] names the element-wise activations layers can be configured
//! with. [`LeCun`] provides the scaled tanh that Burn's standard library lacks.

use std::str::FromStr;

use burn::tensor::{activation, backend::Backend, Tensor};
use serde::{Deserialize, Serialize};

use crate::error::LayerError;
use crate::tensor::{map_rank, DynTensor};

/// Element-wise activation selectable by name in layer configs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    #[default]
    Linear,
    Relu,
    Tanh,
    Sigmoid,
    LecunTanh,
}

impl Activation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Linear => "linear",
            Self::Relu => "relu",
            Self::Tanh => "tanh",
            Self::Sigmoid => "sigmoid",
            Self::LecunTanh => "lecun_tanh",
        }
    }

    pub fn apply<B: Backend, const D: usize>(&self, x: Tensor<B, D>) -> Tensor<B, D> {
        match self {
            Self::Linear => x,
            Self::Relu => activation::relu(x),
            Self::Tanh => x.tanh(),
            Self::Sigmoid => activation::sigmoid(x),
            Self::LecunTanh => LeCun::forward(x),
        }
    }

    pub fn apply_dyn<B: Backend>(&self, x: DynTensor<B>) -> DynTensor<B> {
        map_rank!(x, t => self.apply(t))
    }
}

impl FromStr for Activation {
    type Err = LayerError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name {
            "linear" => Ok(Self::Linear),
            "relu" => Ok(Self::Relu),
            "tanh" => Ok(Self::Tanh),
            "sigmoid" => Ok(Self::Sigmoid),
            "lecun_tanh" => Ok(Self::LecunTanh),
            other => Err(LayerError::validation(format!(
                "unknown activation: {other}. Valid options are linear, relu, tanh, sigmoid, lecun_tanh"
            ))),
        }
    }
}

/// LeCun's tanh activation function.
///
/// This activation function is defined as:
/// `f(x) = 1.7159 * tanh(0.666 * x)`
///
/// It provides a smoother alternative to standard tanh with better gradient flow
/// properties. The scaling factors (1.7159 and 0.666) are chosen such that:
/// - The function approximates the identity near the origin
/// - The output range is approximately [-1.7159, 1.7159]
///
/// # Example
///
/// ```rust
/// use burn::backend::NdArray;
/// use burn::tensor::Tensor;
/// use seqwrap::activation::LeCun;
///
/// type Backend = NdArray<f32>;
/// let device = Default::default();
///
/// let x = Tensor::<Backend, 1>::from_floats([0.0, 1.0, -1.0], &device);
/// let y = LeCun::forward(x);
/// ```
pub struct LeCun;

impl LeCun {
    /// Applies the LeCun tanh activation function.
    ///
    /// # Arguments
    ///
    /// * `x` - Input tensor of any dimension
    ///
    /// # Returns
    ///
    /// Tensor with LeCun activation applied element-wise
    pub fn forward<B: Backend, const D: usize>(x: Tensor<B, D>) -> Tensor<B, D> {
        // LeCun tanh: 1.7159 * tanh(0.666 * x)
        let scaled = x * 0.666f32;
        scaled.tanh() * 1.7159f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::Tensor;

    type Backend = NdArray<f32>;

    #[test]
    fn test_lecun_tanh_zero() {
        let device = Default::default();
        let x = Tensor::<Backend, 1>::zeros([5], &device);
        let y = LeCun::forward(x);

        // tanh(0) = 0, so LeCun(0) = 0
        let sum = y.sum().into_scalar();
        assert!((sum - 0.0).abs() < 1e-6);
    }

    #[test]
    fn test_activation_by_name() {
        for name in ["linear", "relu", "tanh", "sigmoid", "lecun_tanh"] {
            let act: Activation = name.parse().unwrap();
            assert_eq!(act.as_str(), name);
        }
        let err = "softmax".parse::<Activation>().unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_activation_values() {
        let device = Default::default();
        let x = Tensor::<Backend, 1>::from_floats([-1.0f32, 0.0, 2.0], &device).reshape([1, 3]);

        let relu = Activation::Relu.apply(x.clone()).into_data().to_vec::<f32>().unwrap();
        assert_eq!(relu, vec![0.0, 0.0, 2.0]);

        let sigmoid = Activation::Sigmoid.apply(x.clone()).into_data().to_vec::<f32>().unwrap();
        assert!((sigmoid[1] - 0.5).abs() < 1e-6);

        let linear = Activation::Linear.apply(x).into_data().to_vec::<f32>().unwrap();
        assert_eq!(linear, vec![-1.0, 0.0, 2.0]);
    }

    #[test]
    fn test_activation_serde_names() {
        let json = serde_json::to_string(&Activation::LecunTanh).unwrap();
        assert_eq!(json, "\"lecun_tanh\"");
        let back: Activation = serde_json::from_str("\"relu\"").unwrap();
        assert_eq!(back, Activation::Relu);
    }
}
