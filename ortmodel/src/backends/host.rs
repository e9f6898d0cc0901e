use std::rc::Rc;

use crate::device::{AllocError, Device, DeviceContext, NativeBuffer};

/// Device memory backed by a host allocation.
///
/// Serves the CPU as well as accelerators that share memory with the host.
#[derive(Debug, Clone)]
pub struct HostBuffer {
    device: Device,
    data: Vec<u8>,
}

impl HostBuffer {
    pub fn zeroed(
        device: Device,
        length: usize,
    ) -> Self {
        Self {
            device,
            data: vec![0; length],
        }
    }

    pub fn from_bytes(
        device: Device,
        bytes: &[u8],
    ) -> Self {
        Self {
            device,
            data: bytes.to_vec(),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

impl NativeBuffer for HostBuffer {
    fn device(&self) -> Device {
        self.device
    }

    fn length(&self) -> usize {
        self.data.len()
    }

    fn address(&self) -> usize {
        self.data.as_ptr() as usize
    }

    fn read(
        &self,
        offset: usize,
        dst: &mut [u8],
    ) {
        dst.copy_from_slice(&self.data[offset..offset + dst.len()]);
    }

    fn write(
        &mut self,
        offset: usize,
        src: &[u8],
    ) {
        self.data[offset..offset + src.len()].copy_from_slice(src);
    }
}

#[derive(Debug, Clone)]
pub struct HostContext {
    device: Device,
}

impl HostContext {
    pub fn new(device: Device) -> Self {
        Self {
            device,
        }
    }

    pub fn shared(device: Device) -> Rc<dyn DeviceContext> {
        Rc::new(Self::new(device))
    }
}

impl Default for HostContext {
    fn default() -> Self {
        Self::new(Device::Cpu)
    }
}

impl DeviceContext for HostContext {
    fn device(&self) -> Device {
        self.device
    }

    fn create_buffer(
        &self,
        size: usize,
    ) -> Result<Box<dyn NativeBuffer>, AllocError> {
        Ok(Box::new(HostBuffer::zeroed(self.device, size)))
    }

    // Host memory is coherent once the call returns.
    fn synchronize(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{DataType, DeviceContextExt, Tensor};

    #[test]
    fn test_buffers_carry_device() {
        let device = Device::Cuda {
            ordinal: 1,
        };
        let context = HostContext::new(device);
        let buffer = context.buffer(&[2, 3], DataType::F16).unwrap();
        assert_eq!(buffer.size_in_bytes(), 12);
        assert_eq!(buffer.device(), device);
    }

    #[test]
    fn test_upload_is_noop_on_same_device() {
        let context = HostContext::default();
        let tensor = Tensor::from_slice(&[2], &[1.0f32, 2.0]).unwrap();
        let uploaded = context.upload(&tensor).unwrap();
        assert!(uploaded.shares_storage_with(&tensor));
        assert_eq!(uploaded.address(), tensor.address());
    }

    #[test]
    fn test_upload_copies_across_devices() {
        let context = HostContext::new(Device::Cuda {
            ordinal: 0,
        });
        let tensor = Tensor::from_slice(&[2], &[1i64, 2]).unwrap();
        let uploaded = context.upload(&tensor).unwrap();
        assert!(!uploaded.shares_storage_with(&tensor));
        assert_eq!(uploaded.device(), context.device());
        assert_eq!(uploaded.to_vec::<i64>().unwrap(), vec![1, 2]);
    }
}
