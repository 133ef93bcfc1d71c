//! Synchronization primitives.

use crate::device::LogicalDevice;
use crate::error::Result;
use ash::vk;
use std::sync::Arc;

/// Create a semaphore.
///
/// # Safety
/// The device must be valid.
pub unsafe fn create_semaphore(device: &ash::Device) -> Result<vk::Semaphore> {
    let create_info = vk::SemaphoreCreateInfo::default();
    let semaphore = device.create_semaphore(&create_info, None)?;
    Ok(semaphore)
}

/// Create a fence.
///
/// # Safety
/// The device must be valid.
pub unsafe fn create_fence(device: &ash::Device, signaled: bool) -> Result<vk::Fence> {
    let flags = if signaled {
        vk::FenceCreateFlags::SIGNALED
    } else {
        vk::FenceCreateFlags::empty()
    };

    let create_info = vk::FenceCreateInfo::default().flags(flags);
    let fence = device.create_fence(&create_info, None)?;
    Ok(fence)
}

/// Wait for a fence to be signaled.
///
/// # Safety
/// The device and fence must be valid.
#[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
pub unsafe fn wait_for_fence(
    device: &ash::Device,
    fence: vk::Fence,
    timeout_ns: u64,
) -> Result<()> {
    device.wait_for_fences(&[fence], true, timeout_ns)?;
    Ok(())
}

/// Reset a fence to unsignaled state.
///
/// # Safety
/// The device and fence must be valid.
#[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
pub unsafe fn reset_fence(device: &ash::Device, fence: vk::Fence) -> Result<()> {
    device.reset_fences(&[fence])?;
    Ok(())
}

/// The one set of frame synchronization objects.
///
/// The fence starts signaled so the first frame does not wait on a
/// submission that never happened.
pub struct FrameSync {
    /// Signaled when the acquired image is ready to be rendered to
    pub image_available: vk::Semaphore,
    /// Signaled when rendering is complete, waited on by present
    pub render_finished: vk::Semaphore,
    /// Signaled when the frame's submission has finished on the GPU
    pub in_flight: vk::Fence,
    device: Arc<LogicalDevice>,
}

impl FrameSync {
    /// Create frame synchronization resources.
    pub fn new(device: Arc<LogicalDevice>) -> Result<Self> {
        unsafe {
            let raw = device.raw();
            let image_available = create_semaphore(raw)?;
            let render_finished = match create_semaphore(raw) {
                Ok(semaphore) => semaphore,
                Err(e) => {
                    raw.destroy_semaphore(image_available, None);
                    return Err(e);
                }
            };
            let in_flight = match create_fence(raw, true) {
                Ok(fence) => fence,
                Err(e) => {
                    raw.destroy_semaphore(image_available, None);
                    raw.destroy_semaphore(render_finished, None);
                    return Err(e);
                }
            };

            Ok(Self {
                image_available,
                render_finished,
                in_flight,
                device,
            })
        }
    }

    /// Block until the previous submission has completed.
    pub fn wait(&self) -> Result<()> {
        unsafe { wait_for_fence(self.device.raw(), self.in_flight, u64::MAX) }
    }

    /// Reset the fence for the next submission.
    pub fn reset(&self) -> Result<()> {
        unsafe { reset_fence(self.device.raw(), self.in_flight) }
    }
}

impl Drop for FrameSync {
    fn drop(&mut self) {
        unsafe {
            let device = self.device.raw();
            device.destroy_semaphore(self.image_available, None);
            device.destroy_semaphore(self.render_finished, None);
            device.destroy_fence(self.in_flight, None);
        }
    }
}
