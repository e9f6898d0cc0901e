use std::rc::Rc;

use super::{AllocError, DataType, Device, DeviceBuffer, NativeBuffer, Tensor, size_for_shape};

/// Allocation and queue synchronisation for one device.
pub trait DeviceContext {
    fn device(&self) -> Device;

    /// Allocate `size` bytes of device memory. Contents are unspecified.
    fn create_buffer(
        &self,
        size: usize,
    ) -> Result<Box<dyn NativeBuffer>, AllocError>;

    /// Blocks until every operation queued on the device has completed.
    fn synchronize(&self);
}

pub trait DeviceContextExt: DeviceContext {
    /// Allocate an output buffer matching `shape` and `data_type`.
    fn buffer(
        &self,
        shape: &[usize],
        data_type: DataType,
    ) -> Result<DeviceBuffer, AllocError> {
        let native = self.create_buffer(size_for_shape(shape, data_type))?;
        DeviceBuffer::new(native, shape, data_type)
    }

    /// Allocate a tensor on this device holding `bytes`.
    fn tensor_from_bytes(
        &self,
        shape: &[usize],
        data_type: DataType,
        bytes: &[u8],
    ) -> Result<Tensor, AllocError> {
        let mut buffer = self.buffer(shape, data_type)?;
        buffer.native_mut().write(0, bytes);
        Ok(Tensor::from_buffer(buffer))
    }

    /// Returns `tensor` itself when it already lives here, a device copy otherwise.
    fn upload(
        &self,
        tensor: &Tensor,
    ) -> Result<Tensor, AllocError> {
        if tensor.device() == self.device() {
            return Ok(tensor.clone());
        }
        self.tensor_from_bytes(tensor.shape(), tensor.data_type(), &tensor.to_bytes())
    }
}

impl<C: DeviceContext + ?Sized> DeviceContextExt for C {}

impl<C: DeviceContext + ?Sized> DeviceContext for Rc<C> {
    fn device(&self) -> Device {
        self.as_ref().device()
    }

    fn create_buffer(
        &self,
        size: usize,
    ) -> Result<Box<dyn NativeBuffer>, AllocError> {
        self.as_ref().create_buffer(size)
    }

    fn synchronize(&self) {
        self.as_ref().synchronize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::HostBuffer;

    /// Hands out buffers one byte shorter than requested.
    struct ShortContext;

    impl DeviceContext for ShortContext {
        fn device(&self) -> Device {
            Device::Cpu
        }

        fn create_buffer(
            &self,
            size: usize,
        ) -> Result<Box<dyn NativeBuffer>, AllocError> {
            Ok(Box::new(HostBuffer::zeroed(Device::Cpu, size.saturating_sub(1))))
        }

        fn synchronize(&self) {}
    }

    #[test]
    fn test_short_backend_buffer_is_an_error() {
        let error = ShortContext.buffer(&[2, 3], DataType::F32).unwrap_err();
        match error {
            AllocError::AllocationFailed {
                device,
                size,
                ..
            } => {
                assert_eq!(device, Device::Cpu);
                assert_eq!(size, 24);
            },
            other => panic!("unexpected error: {other}"),
        }
        assert!(ShortContext.tensor_from_bytes(&[1], DataType::I64, &[0; 8]).is_err());
    }
}
