//! Symbolic shapes and connect-time input validation.
//!
//! A [`Shape`] is the shape of a tensor as seen before any data exists: the
//! first entry is always the batch dimension, and any entry may still be
//! unresolved (`None`).

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{LayerError, Result};

/// Ordered dimension sizes; `None` marks a dimension that is not yet known.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Shape(pub Vec<Option<usize>>);

impl Shape {
    pub fn new(dims: Vec<Option<usize>>) -> Self {
        Self(dims)
    }

    /// Shape with every dimension resolved.
    pub fn from_dims(dims: &[usize]) -> Self {
        Self(dims.iter().copied().map(Some).collect())
    }

    /// Shape with an unresolved batch dimension followed by `dims`.
    pub fn batched(dims: &[usize]) -> Self {
        let mut out = vec![None];
        out.extend(dims.iter().copied().map(Some));
        Self(out)
    }

    pub fn rank(&self) -> usize {
        self.0.len()
    }

    pub fn dims(&self) -> &[Option<usize>] {
        &self.0
    }

    pub fn dim(&self, axis: usize) -> Option<usize> {
        self.0.get(axis).copied().flatten()
    }

    pub fn last(&self) -> Option<usize> {
        self.0.last().copied().flatten()
    }

    /// Copy of the shape with `axis` removed.
    pub fn without_axis(&self, axis: usize) -> Self {
        let mut dims = self.0.clone();
        if axis < dims.len() {
            dims.remove(axis);
        }
        Self(dims)
    }

    /// Copy of the shape with `dim` inserted at `axis`.
    pub fn with_axis(&self, axis: usize, dim: Option<usize>) -> Self {
        let mut dims = self.0.clone();
        dims.insert(axis.min(dims.len()), dim);
        Self(dims)
    }

    /// Copy of the shape with the last dimension replaced.
    pub fn with_last(&self, dim: Option<usize>) -> Self {
        let mut dims = self.0.clone();
        if let Some(last) = dims.last_mut() {
            *last = dim;
        }
        Self(dims)
    }

    /// Resolved dims, or a validation error naming the first unknown axis.
    pub fn to_concrete(&self) -> Result<Vec<usize>> {
        self.0
            .iter()
            .enumerate()
            .map(|(axis, dim)| {
                dim.ok_or_else(|| {
                    LayerError::validation(format!("dimension {axis} of shape {self} is unresolved"))
                })
            })
            .collect()
    }
}

impl From<&[usize]> for Shape {
    fn from(dims: &[usize]) -> Self {
        Self::from_dims(dims)
    }
}

impl<const D: usize> From<[usize; D]> for Shape {
    fn from(dims: [usize; D]) -> Self {
        Self::from_dims(&dims)
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, dim) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            match dim {
                Some(d) => write!(f, "{d}")?,
                None => write!(f, "None")?,
            }
        }
        write!(f, "]")
    }
}

/// Constraints a layer places on one of its inputs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InputSpec {
    pub ndim: Option<usize>,
    pub min_ndim: Option<usize>,
    pub max_ndim: Option<usize>,
    /// Expected shape; `None` entries match anything.
    pub shape: Option<Shape>,
}

impl InputSpec {
    pub fn with_ndim(ndim: usize) -> Self {
        Self {
            ndim: Some(ndim),
            ..Self::default()
        }
    }

    pub fn with_min_ndim(min_ndim: usize) -> Self {
        Self {
            min_ndim: Some(min_ndim),
            ..Self::default()
        }
    }

    /// Spec pinned to `shape`, batch dimension left open.
    pub fn with_shape(shape: &Shape) -> Self {
        let mut dims = shape.0.clone();
        if let Some(batch) = dims.first_mut() {
            *batch = None;
        }
        Self {
            ndim: Some(shape.rank()),
            shape: Some(Shape(dims)),
            ..Self::default()
        }
    }
}

/// Checks `shapes` against `specs` positionally.
///
/// Surplus shapes beyond the number of specs are not checked. An empty spec
/// list accepts anything.
pub fn check_input_compatibility(
    layer_name: &str,
    specs: &[InputSpec],
    shapes: &[Shape],
) -> Result<()> {
    if specs.is_empty() {
        return Ok(());
    }
    if shapes.len() != specs.len() {
        return Err(LayerError::validation(format!(
            "layer {layer_name} expects {} inputs, but it received {} input tensors",
            specs.len(),
            shapes.len()
        )));
    }

    for (index, (spec, shape)) in specs.iter().zip(shapes).enumerate() {
        let rank = shape.rank();
        if let Some(ndim) = spec.ndim {
            if rank != ndim {
                return Err(LayerError::validation(format!(
                    "input {index} is incompatible with layer {layer_name}: expected ndim={ndim}, found ndim={rank}"
                )));
            }
        }
        if let Some(max_ndim) = spec.max_ndim {
            if rank > max_ndim {
                return Err(LayerError::validation(format!(
                    "input {index} is incompatible with layer {layer_name}: expected max_ndim={max_ndim}, found ndim={rank}"
                )));
            }
        }
        if let Some(min_ndim) = spec.min_ndim {
            if rank < min_ndim {
                return Err(LayerError::validation(format!(
                    "input {index} is incompatible with layer {layer_name}: expected min_ndim={min_ndim}, found ndim={rank}"
                )));
            }
        }
        if let Some(expected) = &spec.shape {
            if expected.rank() != rank {
                return Err(LayerError::validation(format!(
                    "input {index} is incompatible with layer {layer_name}: expected shape={expected}, found shape={shape}"
                )));
            }
            for (want, got) in expected.0.iter().zip(&shape.0) {
                if let (Some(want), Some(got)) = (want, got) {
                    if want != got {
                        return Err(LayerError::validation(format!(
                            "input {index} is incompatible with layer {layer_name}: expected shape={expected}, found shape={shape}"
                        )));
                    }
                }
            }
        }
    }
    Ok(())
}
