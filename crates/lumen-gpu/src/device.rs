//! Logical device and its queues.

use crate::capabilities::PhysicalDeviceCandidate;
use crate::error::{GpuError, Result};
use crate::instance::Instance;
use crate::queue::QueueFamilies;
use ash::vk;
use std::ffi::{c_char, CStr};
use std::sync::Arc;

/// Logical device with resolved graphics and present queues.
///
/// Shared through `Arc` by everything that creates device objects, so the
/// device is destroyed only after the last of them is gone.
pub struct LogicalDevice {
    device: ash::Device,
    physical_device: vk::PhysicalDevice,
    families: QueueFamilies,
    graphics_queue: vk::Queue,
    present_queue: vk::Queue,
    instance: Arc<Instance>,
}

impl LogicalDevice {
    /// Create the logical device for a selected candidate.
    ///
    /// One queue is requested per distinct family, the given extensions are
    /// enabled along with dynamic rendering and synchronization2.
    ///
    /// # Safety
    /// The candidate must have been enumerated from `instance`.
    pub unsafe fn new(
        instance: Arc<Instance>,
        candidate: &PhysicalDeviceCandidate,
        extensions: &[&CStr],
    ) -> Result<Self> {
        let families = candidate.queue_families.resolve()?;

        let missing = candidate.missing_extensions(extensions);
        if !missing.is_empty() {
            return Err(GpuError::ExtensionNotSupported(missing.join(", ")));
        }

        let queue_priority = 1.0_f32;
        let queue_create_infos: Vec<vk::DeviceQueueCreateInfo> = families
            .unique()
            .into_iter()
            .map(|family| {
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(family)
                    .queue_priorities(std::slice::from_ref(&queue_priority))
            })
            .collect();

        let extension_names: Vec<*const c_char> =
            extensions.iter().map(|ext| ext.as_ptr()).collect();

        let mut vulkan_1_3_features = vk::PhysicalDeviceVulkan13Features::default()
            .dynamic_rendering(true)
            .synchronization2(true);

        let mut features2 =
            vk::PhysicalDeviceFeatures2::default().push_next(&mut vulkan_1_3_features);

        let device_create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&extension_names)
            .push_next(&mut features2);

        let device = instance
            .raw()
            .create_device(candidate.physical_device, &device_create_info, None)
            .map_err(GpuError::from)?;

        let graphics_queue = device.get_device_queue(families.graphics, 0);
        let present_queue = device.get_device_queue(families.present, 0);

        tracing::debug!(
            "Created logical device (graphics family {}, present family {})",
            families.graphics,
            families.present
        );

        Ok(Self {
            device,
            physical_device: candidate.physical_device,
            families,
            graphics_queue,
            present_queue,
            instance,
        })
    }

    /// Get the Vulkan device handle.
    pub fn raw(&self) -> &ash::Device {
        &self.device
    }

    /// Get the physical device handle.
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    /// Get the instance the device was created from.
    pub fn instance(&self) -> &Arc<Instance> {
        &self.instance
    }

    /// Get the resolved queue families.
    pub fn families(&self) -> QueueFamilies {
        self.families
    }

    /// Get the graphics queue.
    pub fn graphics_queue(&self) -> vk::Queue {
        self.graphics_queue
    }

    /// Get the present queue. May be the graphics queue.
    pub fn present_queue(&self) -> vk::Queue {
        self.present_queue
    }

    /// Wait for device to be idle.
    #[cfg_attr(
        feature = "profiling-tracy",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub fn wait_idle(&self) -> Result<()> {
        unsafe {
            self.device.device_wait_idle()?;
        }
        Ok(())
    }
}

impl Drop for LogicalDevice {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_device(None);
        }
    }
}
