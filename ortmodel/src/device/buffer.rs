use std::fmt;

use thiserror::Error;

use super::{DataType, Device};

#[derive(Debug, Clone, Error)]
pub enum AllocError {
    #[error("Out of memory on {device}: requested {requested} bytes, {available} available")]
    OutOfMemory {
        device: Device,
        requested: usize,
        available: usize,
    },
    #[error("Failed to allocate {size} bytes on {device}: {reason}")]
    AllocationFailed {
        device: Device,
        size: usize,
        reason: String,
    },
}

/// Raw contiguous memory owned by a device backend.
pub trait NativeBuffer: Send + Sync + fmt::Debug {
    fn device(&self) -> Device;

    fn length(&self) -> usize;

    /// Address handed to the engine when the buffer is bound.
    fn address(&self) -> usize;

    /// Copies `dst.len()` bytes starting at `offset` into host memory.
    fn read(
        &self,
        offset: usize,
        dst: &mut [u8],
    );

    /// Copies `src` from host memory into the buffer starting at `offset`.
    fn write(
        &mut self,
        offset: usize,
        src: &[u8],
    );
}

/// Number of elements described by a shape. A rank-0 shape holds one element.
pub fn element_count(shape: &[usize]) -> usize {
    shape.iter().product()
}

pub fn size_for_shape(
    shape: &[usize],
    data_type: DataType,
) -> usize {
    element_count(shape) * data_type.size_in_bytes()
}

/// Output storage sized for one invocation.
///
/// The byte length always equals `element_count(shape) * data_type.size_in_bytes()`.
#[derive(Debug)]
pub struct DeviceBuffer {
    inner: Box<dyn NativeBuffer>,
    shape: Box<[usize]>,
    data_type: DataType,
}

impl DeviceBuffer {
    /// Fails when the backend handed out a buffer whose length differs from the shape's byte size.
    pub fn new(
        inner: Box<dyn NativeBuffer>,
        shape: &[usize],
        data_type: DataType,
    ) -> Result<Self, AllocError> {
        let size = size_for_shape(shape, data_type);
        if inner.length() != size {
            return Err(AllocError::AllocationFailed {
                device: inner.device(),
                size,
                reason: format!("backend returned {} bytes for shape {:?} of {}", inner.length(), shape, data_type),
            });
        }
        Ok(Self {
            inner,
            shape: shape.into(),
            data_type,
        })
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn device(&self) -> Device {
        self.inner.device()
    }

    pub fn num_elements(&self) -> usize {
        element_count(&self.shape)
    }

    pub fn size_in_bytes(&self) -> usize {
        self.inner.length()
    }

    pub fn address(&self) -> usize {
        self.inner.address()
    }

    pub fn native(&self) -> &dyn NativeBuffer {
        self.inner.as_ref()
    }

    pub fn native_mut(&mut self) -> &mut dyn NativeBuffer {
        self.inner.as_mut()
    }

    pub(crate) fn into_parts(self) -> (Box<dyn NativeBuffer>, Box<[usize]>, DataType) {
        (self.inner, self.shape, self.data_type)
    }
}
