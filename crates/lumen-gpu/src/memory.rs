//! GPU memory management.

use crate::device::LogicalDevice;
use crate::error::{GpuError, Result};
use ash::vk;
use gpu_allocator::vulkan::{
    Allocation, AllocationCreateDesc, AllocationScheme, Allocator, AllocatorCreateDesc,
};
use gpu_allocator::MemoryLocation;
use std::sync::Arc;

/// GPU memory allocator wrapper.
///
/// Buffers are freed explicitly with [`GpuAllocator::free_buffer`]. Anything
/// still allocated when the allocator drops is reported as a leak.
pub struct GpuAllocator {
    allocator: Option<Allocator>,
    device: Arc<LogicalDevice>,
}

impl GpuAllocator {
    /// Create a new allocator for `device`.
    pub fn new(device: Arc<LogicalDevice>) -> Result<Self> {
        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: device.instance().raw().clone(),
            device: device.raw().clone(),
            physical_device: device.physical_device(),
            debug_settings: gpu_allocator::AllocatorDebugSettings {
                log_memory_information: cfg!(debug_assertions),
                log_leaks_on_shutdown: true,
                store_stack_traces: false,
                log_allocations: false,
                log_frees: false,
                log_stack_traces: false,
            },
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        })
        .map_err(|e| GpuError::AllocationFailed(e.to_string()))?;

        Ok(Self {
            allocator: Some(allocator),
            device,
        })
    }

    /// Allocate a buffer and bind its memory.
    pub fn create_buffer(
        &mut self,
        size: u64,
        usage: vk::BufferUsageFlags,
        location: MemoryLocation,
        name: &str,
    ) -> Result<GpuBuffer> {
        if size == 0 {
            return Err(GpuError::InvalidState(format!(
                "Buffer '{name}' has zero size"
            )));
        }

        let buffer_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let device = self.device.raw();
        let buffer = unsafe { device.create_buffer(&buffer_info, None)? };
        let requirements = unsafe { device.get_buffer_memory_requirements(buffer) };

        let allocator = match self.allocator.as_mut() {
            Some(allocator) => allocator,
            None => {
                unsafe { device.destroy_buffer(buffer, None) };
                return Err(GpuError::InvalidState(
                    "Allocator already shut down".to_string(),
                ));
            }
        };

        let allocation = match allocator.allocate(&AllocationCreateDesc {
            name,
            requirements,
            location,
            linear: true,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        }) {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { device.destroy_buffer(buffer, None) };
                return Err(GpuError::AllocationFailed(e.to_string()));
            }
        };

        if let Err(e) =
            unsafe { device.bind_buffer_memory(buffer, allocation.memory(), allocation.offset()) }
        {
            if let Err(free_err) = allocator.free(allocation) {
                tracing::warn!("Failed to free allocation for '{name}': {free_err}");
            }
            unsafe { device.destroy_buffer(buffer, None) };
            return Err(e.into());
        }

        tracing::trace!("Allocated buffer '{name}' ({size} bytes, {location:?})");

        Ok(GpuBuffer {
            buffer,
            allocation: Some(allocation),
            size,
        })
    }

    /// Free a buffer and its allocation.
    pub fn free_buffer(&mut self, buffer: &mut GpuBuffer) -> Result<()> {
        if let Some(allocation) = buffer.allocation.take() {
            self.allocator
                .as_mut()
                .ok_or_else(|| GpuError::InvalidState("Allocator already shut down".to_string()))?
                .free(allocation)
                .map_err(|e| GpuError::AllocationFailed(e.to_string()))?;
        }

        if buffer.buffer != vk::Buffer::null() {
            unsafe {
                self.device.raw().destroy_buffer(buffer.buffer, None);
            }
            buffer.buffer = vk::Buffer::null();
        }

        Ok(())
    }

    /// Release all device memory. Must happen before the device is destroyed.
    pub fn shutdown(&mut self) {
        if let Some(allocator) = self.allocator.take() {
            drop(allocator);
        }
    }
}

impl Drop for GpuAllocator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// A GPU buffer with its allocation.
pub struct GpuBuffer {
    pub buffer: vk::Buffer,
    pub allocation: Option<Allocation>,
    pub size: u64,
}

impl GpuBuffer {
    /// Host pointer to the buffer memory, if it is mapped.
    pub fn mapped_ptr(&self) -> Option<*mut u8> {
        self.allocation
            .as_ref()
            .and_then(Allocation::mapped_ptr)
            .map(|p| p.as_ptr().cast::<u8>())
    }

    /// Write data to the start of the buffer (must be host-visible).
    pub fn write<T: bytemuck::Pod>(&self, data: &[T]) -> Result<()> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        check_fits(bytes.len(), self.size)?;

        let ptr = self
            .mapped_ptr()
            .ok_or_else(|| GpuError::InvalidState("Buffer not mapped".to_string()))?;

        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr, bytes.len());
        }

        Ok(())
    }
}

fn check_fits(byte_len: usize, capacity: u64) -> Result<()> {
    if byte_len as u64 > capacity {
        return Err(GpuError::InvalidState(format!(
            "Data too large for buffer ({byte_len} > {capacity} bytes)"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oversized_write_rejected() {
        assert!(check_fits(16, 16).is_ok());
        assert!(matches!(
            check_fits(17, 16),
            Err(GpuError::InvalidState(_))
        ));
    }

    #[test]
    fn unallocated_buffer_is_not_mapped() {
        let buffer = GpuBuffer {
            buffer: vk::Buffer::null(),
            allocation: None,
            size: 64,
        };
        assert!(buffer.mapped_ptr().is_none());
        assert!(matches!(
            buffer.write(&[0u32; 4]),
            Err(GpuError::InvalidState(_))
        ));
    }
}
