//! Runtime-rank tensors and symbolic placeholders.
//!
//! Burn tensors carry their rank in the type. Wrappers need to move between
//! ranks at runtime (a time-distributed dense layer sees rank `N` outside and
//! rank `N - 1` per step), so layers exchange [`DynTensor`] values.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use crate::error::{LayerError, Result};
use crate::shape::Shape;

/// Highest tensor rank a layer can exchange.
pub const MAX_RANK: usize = 5;

/// A float tensor whose rank (2..=5) is known only at runtime.
///
/// Axis 0 is always the batch axis.
#[derive(Debug, Clone)]
pub enum DynTensor<B: Backend> {
    Rank2(Tensor<B, 2>),
    Rank3(Tensor<B, 3>),
    Rank4(Tensor<B, 4>),
    Rank5(Tensor<B, 5>),
}

/// Applies a rank-generic expression to every variant, preserving the rank.
macro_rules! map_rank {
    ($tensor:expr, $t:ident => $body:expr) => {
        match $tensor {
            $crate::tensor::DynTensor::Rank2($t) => $crate::tensor::DynTensor::Rank2($body),
            $crate::tensor::DynTensor::Rank3($t) => $crate::tensor::DynTensor::Rank3($body),
            $crate::tensor::DynTensor::Rank4($t) => $crate::tensor::DynTensor::Rank4($body),
            $crate::tensor::DynTensor::Rank5($t) => $crate::tensor::DynTensor::Rank5($body),
        }
    };
}
pub(crate) use map_rank;

/// Applies a rank-generic binary expression to two tensors of equal rank.
macro_rules! zip_rank {
    ($lhs:expr, $rhs:expr, ($a:ident, $b:ident) => $body:expr) => {
        match ($lhs, $rhs) {
            (DynTensor::Rank2($a), DynTensor::Rank2($b)) => Ok(DynTensor::Rank2($body)),
            (DynTensor::Rank3($a), DynTensor::Rank3($b)) => Ok(DynTensor::Rank3($body)),
            (DynTensor::Rank4($a), DynTensor::Rank4($b)) => Ok(DynTensor::Rank4($body)),
            (DynTensor::Rank5($a), DynTensor::Rank5($b)) => Ok(DynTensor::Rank5($body)),
            (lhs, rhs) => Err(LayerError::validation(format!(
                "cannot combine tensors of rank {} and rank {}",
                lhs.rank(),
                rhs.rank()
            ))),
        }
    };
}

macro_rules! impl_rank_conversions {
    ($($rank:literal => $variant:ident),*) => {
        $(
            impl<B: Backend> From<Tensor<B, $rank>> for DynTensor<B> {
                fn from(tensor: Tensor<B, $rank>) -> Self {
                    DynTensor::$variant(tensor)
                }
            }

            impl<B: Backend> TryFrom<DynTensor<B>> for Tensor<B, $rank> {
                type Error = LayerError;

                fn try_from(tensor: DynTensor<B>) -> Result<Self> {
                    match tensor {
                        DynTensor::$variant(t) => Ok(t),
                        other => Err(LayerError::validation(format!(
                            "expected a tensor of rank {}, found rank {} with shape {:?}",
                            $rank,
                            other.rank(),
                            other.dims()
                        ))),
                    }
                }
            }
        )*
    };
}

impl_rank_conversions!(2 => Rank2, 3 => Rank3, 4 => Rank4, 5 => Rank5);

impl<B: Backend> DynTensor<B> {
    /// Zero tensor of the given shape.
    pub fn zeros(dims: &[usize], device: &B::Device) -> Result<Self> {
        Ok(match *dims {
            [a, b] => Self::Rank2(Tensor::zeros([a, b], device)),
            [a, b, c] => Self::Rank3(Tensor::zeros([a, b, c], device)),
            [a, b, c, d] => Self::Rank4(Tensor::zeros([a, b, c, d], device)),
            [a, b, c, d, e] => Self::Rank5(Tensor::zeros([a, b, c, d, e], device)),
            _ => return Err(unsupported_rank(dims.len())),
        })
    }

    pub fn rank(&self) -> usize {
        match self {
            Self::Rank2(_) => 2,
            Self::Rank3(_) => 3,
            Self::Rank4(_) => 4,
            Self::Rank5(_) => 5,
        }
    }

    pub fn dims(&self) -> Vec<usize> {
        match self {
            Self::Rank2(t) => t.dims().to_vec(),
            Self::Rank3(t) => t.dims().to_vec(),
            Self::Rank4(t) => t.dims().to_vec(),
            Self::Rank5(t) => t.dims().to_vec(),
        }
    }

    pub fn shape(&self) -> Shape {
        Shape::from_dims(&self.dims())
    }

    pub fn device(&self) -> B::Device {
        match self {
            Self::Rank2(t) => t.device(),
            Self::Rank3(t) => t.device(),
            Self::Rank4(t) => t.device(),
            Self::Rank5(t) => t.device(),
        }
    }

    /// Slice step `t` out of the time axis (axis 1), dropping that axis.
    pub fn time_step(&self, t: usize) -> Result<Self> {
        match self {
            Self::Rank2(_) => Err(LayerError::validation(
                "a tensor of rank 2 has no time axis to slice",
            )),
            Self::Rank3(x) => Ok(Self::Rank2(x.clone().narrow(1, t, 1).squeeze(1))),
            Self::Rank4(x) => Ok(Self::Rank3(x.clone().narrow(1, t, 1).squeeze(1))),
            Self::Rank5(x) => Ok(Self::Rank4(x.clone().narrow(1, t, 1).squeeze(1))),
        }
    }

    /// Stack per-step tensors along a new time axis at position 1.
    pub fn stack_steps(steps: Vec<Self>) -> Result<Self> {
        let rank = match steps.first() {
            Some(first) => first.rank(),
            None => return Err(LayerError::validation("cannot stack an empty list of steps")),
        };
        match rank {
            2 => Ok(Self::Rank3(Tensor::stack(collect_rank::<B, 2>(steps)?, 1))),
            3 => Ok(Self::Rank4(Tensor::stack(collect_rank::<B, 3>(steps)?, 1))),
            4 => Ok(Self::Rank5(Tensor::stack(collect_rank::<B, 4>(steps)?, 1))),
            other => Err(unsupported_rank(other + 1)),
        }
    }

    /// Reverse the order of the time axis.
    pub fn reverse_time(self) -> Result<Self> {
        match self {
            Self::Rank2(_) => Err(LayerError::validation(
                "a tensor of rank 2 has no time axis to reverse",
            )),
            Self::Rank3(x) => Ok(Self::Rank3(x.flip([1]))),
            Self::Rank4(x) => Ok(Self::Rank4(x.flip([1]))),
            Self::Rank5(x) => Ok(Self::Rank5(x.flip([1]))),
        }
    }

    pub fn add(self, other: Self) -> Result<Self> {
        zip_rank!(self, other, (a, b) => a + b)
    }

    pub fn mul(self, other: Self) -> Result<Self> {
        zip_rank!(self, other, (a, b) => a * b)
    }

    pub fn mul_scalar(self, scalar: f32) -> Self {
        map_rank!(self, t => t.mul_scalar(scalar))
    }

    /// Concatenate two tensors of equal rank along their last axis.
    pub fn concat_last(self, other: Self) -> Result<Self> {
        match (self, other) {
            (Self::Rank2(a), Self::Rank2(b)) => Ok(Self::Rank2(Tensor::cat(vec![a, b], 1))),
            (Self::Rank3(a), Self::Rank3(b)) => Ok(Self::Rank3(Tensor::cat(vec![a, b], 2))),
            (Self::Rank4(a), Self::Rank4(b)) => Ok(Self::Rank4(Tensor::cat(vec![a, b], 3))),
            (Self::Rank5(a), Self::Rank5(b)) => Ok(Self::Rank5(Tensor::cat(vec![a, b], 4))),
            (a, b) => Err(LayerError::validation(format!(
                "cannot concatenate tensors of rank {} and rank {}",
                a.rank(),
                b.rank()
            ))),
        }
    }

    /// Per-sample select: rows where `mask` is 1 take `self`, rows where it
    /// is 0 keep `previous`. `mask` has shape `[batch]`.
    pub fn blend(self, previous: Self, mask: Tensor<B, 1>) -> Result<Self> {
        let [batch] = mask.dims();
        let delta = self.sub(previous.clone())?;
        let kept = match delta {
            Self::Rank2(d) => Self::Rank2(d * mask.reshape([batch, 1])),
            Self::Rank3(d) => Self::Rank3(d * mask.reshape([batch, 1, 1])),
            Self::Rank4(d) => Self::Rank4(d * mask.reshape([batch, 1, 1, 1])),
            Self::Rank5(d) => Self::Rank5(d * mask.reshape([batch, 1, 1, 1, 1])),
        };
        previous.add(kept)
    }

    fn sub(self, other: Self) -> Result<Self> {
        zip_rank!(self, other, (a, b) => a - b)
    }

    /// Flattened host copy of the values, mostly useful in tests.
    pub fn to_vec(&self) -> Result<Vec<f32>> {
        let data = match self {
            Self::Rank2(t) => t.to_data(),
            Self::Rank3(t) => t.to_data(),
            Self::Rank4(t) => t.to_data(),
            Self::Rank5(t) => t.to_data(),
        };
        data.to_vec::<f32>()
            .map_err(|err| LayerError::Tensor(format!("{err:?}")))
    }
}

fn collect_rank<B: Backend, const D: usize>(steps: Vec<DynTensor<B>>) -> Result<Vec<Tensor<B, D>>>
where
    Tensor<B, D>: TryFrom<DynTensor<B>, Error = LayerError>,
{
    steps.into_iter().map(TryFrom::try_from).collect()
}

fn unsupported_rank(rank: usize) -> LayerError {
    LayerError::validation(format!(
        "tensors of rank {rank} are not supported; ranks 2 to {MAX_RANK} are"
    ))
}

/// A single value or an ordered list of values.
#[derive(Debug, Clone, PartialEq)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    pub fn len(&self) -> usize {
        match self {
            Self::One(_) => 1,
            Self::Many(items) => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_many(&self) -> bool {
        matches!(self, Self::Many(_))
    }

    pub fn into_vec(self) -> Vec<T> {
        match self {
            Self::One(item) => vec![item],
            Self::Many(items) => items,
        }
    }

    /// The single value; a list is an error.
    pub fn into_single(self) -> Result<T> {
        match self {
            Self::One(item) => Ok(item),
            Self::Many(items) => Err(LayerError::validation(format!(
                "expected a single value, found a list of {}",
                items.len()
            ))),
        }
    }

    pub fn map<U>(self, mut f: impl FnMut(T) -> U) -> OneOrMany<U> {
        match self {
            Self::One(item) => OneOrMany::One(f(item)),
            Self::Many(items) => OneOrMany::Many(items.into_iter().map(f).collect()),
        }
    }

    pub fn first(&self) -> Option<&T> {
        match self {
            Self::One(item) => Some(item),
            Self::Many(items) => items.first(),
        }
    }
}

/// Shape-only stand-in for a tensor during graph construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolicTensor {
    pub shape: Shape,
}

impl SymbolicTensor {
    pub fn new(shape: Shape) -> Self {
        Self { shape }
    }
}

/// What [`crate::layer::Layer::apply`] consumes and returns.
#[derive(Debug, Clone)]
pub enum TensorValue<B: Backend> {
    Symbolic(SymbolicTensor),
    Concrete(DynTensor<B>),
}

impl<B: Backend> TensorValue<B> {
    pub fn shape(&self) -> Shape {
        match self {
            Self::Symbolic(s) => s.shape.clone(),
            Self::Concrete(t) => t.shape(),
        }
    }

    pub fn is_symbolic(&self) -> bool {
        matches!(self, Self::Symbolic(_))
    }

    pub fn into_concrete(self) -> Result<DynTensor<B>> {
        match self {
            Self::Concrete(t) => Ok(t),
            Self::Symbolic(s) => Err(LayerError::validation(format!(
                "expected concrete tensor data, found a symbolic tensor of shape {}",
                s.shape
            ))),
        }
    }
}

impl<B: Backend> From<DynTensor<B>> for TensorValue<B> {
    fn from(tensor: DynTensor<B>) -> Self {
        Self::Concrete(tensor)
    }
}

impl<B: Backend> From<SymbolicTensor> for TensorValue<B> {
    fn from(tensor: SymbolicTensor) -> Self {
        Self::Symbolic(tensor)
    }
}
