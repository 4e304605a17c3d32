use std::sync::Arc;

use crate::types::{ElementType, Shape};

use super::{BackendError, BackendResult, TensorSpec};

/// Host-side tensor storage.
#[derive(Debug, Clone, PartialEq)]
pub enum TensorData {
    F32(Arc<[f32]>),
    F64(Arc<[f64]>),
    I64(Arc<[i64]>),
    Boolean(Arc<[bool]>),
}

impl TensorData {
    pub fn len(&self) -> usize {
        match self {
            TensorData::F32(values) => values.len(),
            TensorData::F64(values) => values.len(),
            TensorData::I64(values) => values.len(),
            TensorData::Boolean(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn element_type(&self) -> ElementType {
        match self {
            TensorData::F32(_) => ElementType::F32,
            TensorData::F64(_) => ElementType::F64,
            TensorData::I64(_) => ElementType::I64,
            TensorData::Boolean(_) => ElementType::Boolean,
        }
    }

    /// Widens every element to `f64`; booleans become `0.0` or `1.0`.
    pub fn to_f64_vec(&self) -> Vec<f64> {
        match self {
            TensorData::F32(values) => values.iter().map(|v| f64::from(*v)).collect(),
            TensorData::F64(values) => values.to_vec(),
            TensorData::I64(values) => values.iter().map(|v| *v as f64).collect(),
            TensorData::Boolean(values) => values.iter().map(|v| f64::from(u8::from(*v))).collect(),
        }
    }

    /// Narrows `values` to `element_type`.
    pub fn from_f64(element_type: ElementType, values: &[f64]) -> BackendResult<Self> {
        let data = match element_type {
            ElementType::F32 => TensorData::F32(values.iter().map(|v| *v as f32).collect()),
            ElementType::F64 => TensorData::F64(values.into()),
            ElementType::I64 => TensorData::I64(values.iter().map(|v| *v as i64).collect()),
            ElementType::Boolean => TensorData::Boolean(values.iter().map(|v| *v != 0.0).collect()),
            other => {
                return Err(BackendError::unimplemented(
                    "host tensor",
                    format!("element type {other} has no host storage"),
                ))
            }
        };
        Ok(data)
    }
}

/// Dense row-major tensor in host memory.
#[derive(Debug, Clone, PartialEq)]
pub struct HostTensor {
    shape: Shape,
    data: TensorData,
}

impl HostTensor {
    pub fn new(shape: impl Into<Shape>, data: TensorData) -> BackendResult<Self> {
        let shape = shape.into();
        if data.len() != shape.element_count() {
            return Err(BackendError::shape_mismatch(
                format!("{} elements for shape {shape}", shape.element_count()),
                format!("{} elements", data.len()),
            ));
        }
        Ok(Self { shape, data })
    }

    pub fn from_f32(shape: impl Into<Shape>, values: Vec<f32>) -> BackendResult<Self> {
        Self::new(shape, TensorData::F32(values.into()))
    }

    pub fn from_f64(shape: impl Into<Shape>, values: Vec<f64>) -> BackendResult<Self> {
        Self::new(shape, TensorData::F64(values.into()))
    }

    pub fn from_i64(shape: impl Into<Shape>, values: Vec<i64>) -> BackendResult<Self> {
        Self::new(shape, TensorData::I64(values.into()))
    }

    pub fn from_bool(shape: impl Into<Shape>, values: Vec<bool>) -> BackendResult<Self> {
        Self::new(shape, TensorData::Boolean(values.into()))
    }

    pub fn zeros(element_type: ElementType, shape: impl Into<Shape>) -> BackendResult<Self> {
        let shape = shape.into();
        let data = TensorData::from_f64(element_type, &vec![0.0; shape.element_count()])?;
        Self::new(shape, data)
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn element_type(&self) -> ElementType {
        self.data.element_type()
    }

    pub fn spec(&self) -> TensorSpec {
        TensorSpec::new(self.element_type(), self.shape.clone())
    }

    pub fn data(&self) -> &TensorData {
        &self.data
    }

    pub fn as_f32(&self) -> Option<&[f32]> {
        match &self.data {
            TensorData::F32(values) => Some(values.as_ref()),
            _ => None,
        }
    }

    pub fn to_f64_vec(&self) -> Vec<f64> {
        self.data.to_f64_vec()
    }
}
