use std::{fmt, sync::Arc};

use ndarray::{ArrayD, ArrayView, Dimension, IxDyn};
use thiserror::Error;

use super::{
    AllocError, ArrayElement, DataType, Device, DeviceBuffer, DeviceContext, DeviceContextExt, NativeBuffer,
    element_count, size_for_shape,
};
use crate::backends::host::HostBuffer;

#[derive(Error, Debug)]
pub enum TensorError {
    #[error("Invalid data type, expected {expected}, actual {actual}")]
    InvalidDataType {
        expected: DataType,
        actual: DataType,
    },
    #[error("Shape {shape:?} holds {expected} elements, got {actual}")]
    ElementCountMismatch {
        shape: Box<[usize]>,
        expected: usize,
        actual: usize,
    },
    #[error("Axis {axis} out of range for shape {shape:?}")]
    AxisOutOfRange {
        axis: usize,
        shape: Box<[usize]>,
    },
    #[error("Index {index} out of range for axis of length {length}")]
    IndexOutOfRange {
        index: usize,
        length: usize,
    },
    #[error(transparent)]
    Alloc(#[from] AllocError),
}

/// Immutable n-dimensional tensor resident on a device.
///
/// Storage is shared: cloning a tensor never copies device memory.
#[derive(Clone)]
pub struct Tensor {
    buffer: Arc<dyn NativeBuffer>,
    shape: Box<[usize]>,
    data_type: DataType,
}

impl fmt::Debug for Tensor {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Tensor")
            .field("shape", &self.shape)
            .field("data_type", &self.data_type)
            .field("device", &self.device())
            .finish()
    }
}

impl Tensor {
    /// Wraps a fully written output buffer.
    pub fn from_buffer(buffer: DeviceBuffer) -> Self {
        let (inner, shape, data_type) = buffer.into_parts();
        Self {
            buffer: Arc::from(inner),
            shape,
            data_type,
        }
    }

    /// Reinterprets `buffer` under another shape with the same element count.
    pub(crate) fn from_buffer_with_shape(
        buffer: DeviceBuffer,
        shape: &[usize],
    ) -> Result<Self, TensorError> {
        if element_count(shape) != buffer.num_elements() {
            return Err(TensorError::ElementCountMismatch {
                shape: shape.into(),
                expected: element_count(shape),
                actual: buffer.num_elements(),
            });
        }
        let (inner, _, data_type) = buffer.into_parts();
        Ok(Self {
            buffer: Arc::from(inner),
            shape: shape.into(),
            data_type,
        })
    }

    /// Host tensor copied from a row-major slice.
    pub fn from_slice<T: ArrayElement>(
        shape: &[usize],
        data: &[T],
    ) -> Result<Self, TensorError> {
        Self::from_bytes(shape, T::data_type(), bytemuck::cast_slice(data))
    }

    /// Host tensor copied from raw row-major bytes.
    pub fn from_bytes(
        shape: &[usize],
        data_type: DataType,
        bytes: &[u8],
    ) -> Result<Self, TensorError> {
        let expected = size_for_shape(shape, data_type);
        if bytes.len() != expected {
            return Err(TensorError::ElementCountMismatch {
                shape: shape.into(),
                expected: element_count(shape),
                actual: bytes.len() / data_type.size_in_bytes(),
            });
        }
        Ok(Self {
            buffer: Arc::new(HostBuffer::from_bytes(Device::Cpu, bytes)),
            shape: shape.into(),
            data_type,
        })
    }

    /// Host boolean tensor, one byte per element.
    pub fn from_bools(
        shape: &[usize],
        data: &[bool],
    ) -> Result<Self, TensorError> {
        let bytes: Vec<u8> = data.iter().map(|&value| value as u8).collect();
        Self::from_bytes(shape, DataType::Bool, &bytes)
    }

    /// Host tensor copied from an ndarray view, in logical order.
    pub fn from_view<T: ArrayElement, D: Dimension>(view: ArrayView<'_, T, D>) -> Self {
        let data: Vec<T> = match view.as_slice() {
            Some(slice) => slice.to_vec(),
            None => view.iter().copied().collect(),
        };
        Self {
            buffer: Arc::new(HostBuffer::from_bytes(Device::Cpu, bytemuck::cast_slice(&data))),
            shape: view.shape().into(),
            data_type: T::data_type(),
        }
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn device(&self) -> Device {
        self.buffer.device()
    }

    pub fn address(&self) -> usize {
        self.buffer.address()
    }

    pub fn num_elements(&self) -> usize {
        element_count(&self.shape)
    }

    pub fn size_in_bytes(&self) -> usize {
        size_for_shape(&self.shape, self.data_type)
    }

    /// Size of `axis`, failing when the tensor has fewer dimensions.
    pub fn dim(
        &self,
        axis: usize,
    ) -> Result<usize, TensorError> {
        self.shape.get(axis).copied().ok_or_else(|| TensorError::AxisOutOfRange {
            axis,
            shape: self.shape.clone(),
        })
    }

    /// Returns true when both tensors view the same storage.
    pub fn shares_storage_with(
        &self,
        other: &Tensor,
    ) -> bool {
        Arc::ptr_eq(&self.buffer, &other.buffer)
    }

    /// Copies the contents to host memory.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = vec![0u8; self.size_in_bytes()];
        self.buffer.read(0, &mut bytes);
        bytes
    }

    /// Copies the contents to a host vector of `T`.
    pub fn to_vec<T: ArrayElement>(&self) -> Result<Vec<T>, TensorError> {
        let storage_type = self.data_type.storage_type();
        if T::data_type() != storage_type {
            return Err(TensorError::InvalidDataType {
                expected: T::data_type(),
                actual: self.data_type,
            });
        }
        let bytes = self.to_bytes();
        Ok(bytemuck::pod_collect_to_vec(&bytes))
    }

    /// Copies the contents to a host ndarray.
    pub fn to_ndarray<T: ArrayElement>(&self) -> Result<ArrayD<T>, TensorError> {
        let data = self.to_vec::<T>()?;
        let actual = data.len();
        ArrayD::from_shape_vec(IxDyn(&self.shape), data).map_err(|_| TensorError::ElementCountMismatch {
            shape: self.shape.clone(),
            expected: self.num_elements(),
            actual,
        })
    }

    /// Host copy of this tensor. Host tensors are returned as is.
    pub fn to_host(&self) -> Tensor {
        if self.device() == Device::Cpu {
            return self.clone();
        }
        Self {
            buffer: Arc::new(HostBuffer::from_bytes(Device::Cpu, &self.to_bytes())),
            shape: self.shape.clone(),
            data_type: self.data_type,
        }
    }

    /// Gathers `indices` along the first axis into a new tensor allocated by `context`.
    pub fn index_select(
        &self,
        indices: &[usize],
        context: &dyn DeviceContext,
    ) -> Result<Tensor, TensorError> {
        let batch = self.dim(0)?;
        let row_bytes = self.size_in_bytes().checked_div(batch).unwrap_or(0);
        let source = self.to_bytes();
        let mut gathered = Vec::with_capacity(row_bytes * indices.len());
        for &index in indices {
            if index >= batch {
                return Err(TensorError::IndexOutOfRange {
                    index,
                    length: batch,
                });
            }
            gathered.extend_from_slice(&source[index * row_bytes..(index + 1) * row_bytes]);
        }
        let mut shape = self.shape.to_vec();
        shape[0] = indices.len();
        Ok(context.tensor_from_bytes(&shape, self.data_type, &gathered)?)
    }

    /// Keeps `length` entries of `axis` starting at `start`, copying into `context`.
    pub fn narrow(
        &self,
        axis: usize,
        start: usize,
        length: usize,
        context: &dyn DeviceContext,
    ) -> Result<Tensor, TensorError> {
        let axis_length = self.dim(axis)?;
        if start + length > axis_length {
            return Err(TensorError::IndexOutOfRange {
                index: start + length,
                length: axis_length,
            });
        }
        let element_size = self.data_type.size_in_bytes();
        let outer: usize = self.shape[..axis].iter().product();
        let inner_bytes: usize = self.shape[axis + 1..].iter().product::<usize>() * element_size;
        let source = self.to_bytes();
        let mut narrowed = Vec::with_capacity(outer * length * inner_bytes);
        for outer_index in 0..outer {
            let base = (outer_index * axis_length + start) * inner_bytes;
            narrowed.extend_from_slice(&source[base..base + length * inner_bytes]);
        }
        let mut shape = self.shape.to_vec();
        shape[axis] = length;
        Ok(context.tensor_from_bytes(&shape, self.data_type, &narrowed)?)
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;
    use crate::backends::host::HostContext;

    #[test]
    fn test_from_slice_round_trip() {
        let tensor = Tensor::from_slice(&[2, 3], &[1i64, 2, 3, 4, 5, 6]).unwrap();
        assert_eq!(tensor.shape(), &[2, 3]);
        assert_eq!(tensor.data_type(), DataType::I64);
        assert_eq!(tensor.device(), Device::Cpu);
        assert_eq!(tensor.to_vec::<i64>().unwrap(), vec![1, 2, 3, 4, 5, 6]);
        assert!(matches!(tensor.to_vec::<f32>(), Err(TensorError::InvalidDataType { .. })));
    }

    #[test]
    fn test_element_count_is_checked() {
        assert!(matches!(
            Tensor::from_slice(&[2, 2], &[1.0f32, 2.0, 3.0]),
            Err(TensorError::ElementCountMismatch { .. })
        ));
    }

    #[test]
    fn test_from_view_respects_logical_order() {
        let matrix = array![[1.0f32, 2.0], [3.0, 4.0]];
        let transposed = Tensor::from_view(matrix.t());
        assert_eq!(transposed.to_vec::<f32>().unwrap(), vec![1.0, 3.0, 2.0, 4.0]);
    }

    #[test]
    fn test_bools_read_as_bytes() {
        let tensor = Tensor::from_bools(&[3], &[true, false, true]).unwrap();
        assert_eq!(tensor.data_type(), DataType::Bool);
        assert_eq!(tensor.to_vec::<u8>().unwrap(), vec![1, 0, 1]);
    }

    #[test]
    fn test_index_select_rows() {
        let context = HostContext::new(Device::Cpu);
        let tensor = Tensor::from_slice(&[3, 2], &[0i32, 1, 10, 11, 20, 21]).unwrap();
        let selected = tensor.index_select(&[2, 0, 2], &context).unwrap();
        assert_eq!(selected.shape(), &[3, 2]);
        assert_eq!(selected.to_vec::<i32>().unwrap(), vec![20, 21, 0, 1, 20, 21]);
        assert!(matches!(
            tensor.index_select(&[3], &context),
            Err(TensorError::IndexOutOfRange {
                index: 3,
                length: 3
            })
        ));
    }

    #[test]
    fn test_narrow_keeps_last_column() {
        let context = HostContext::new(Device::Cpu);
        let tensor = Tensor::from_slice(&[2, 4], &[1i64, 2, 3, 4, 5, 6, 7, 8]).unwrap();
        let last = tensor.narrow(1, 3, 1, &context).unwrap();
        assert_eq!(last.shape(), &[2, 1]);
        assert_eq!(last.to_vec::<i64>().unwrap(), vec![4, 8]);
    }

    #[test]
    fn test_to_ndarray() {
        let tensor = Tensor::from_slice(&[2, 2], &[1u8, 2, 3, 4]).unwrap();
        let array = tensor.to_ndarray::<u8>().unwrap();
        assert_eq!(array[[1, 0]], 3);
    }
}
