//! Swapchain management.
//!
//! The swapchain is built once from a cached [`SurfaceSupport`]. There is no
//! recreation path: when the surface goes out of date, acquire and present
//! report [`GpuError::SurfaceOutOfDate`] and the caller is expected to shut
//! down.

use crate::device::LogicalDevice;
use crate::error::{GpuError, Result};
use crate::queue::QueueFamilies;
use crate::surface::{Surface, SurfaceConfiguration, SurfaceSupport};
use ash::vk;
use std::sync::Arc;

/// How swapchain images are shared between queue families.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSharing {
    pub mode: vk::SharingMode,
    /// Families listed for concurrent access; empty for exclusive access.
    pub queue_family_indices: Vec<u32>,
}

/// Decide the image sharing mode.
///
/// Exclusive when graphics and present share a family. Otherwise the images
/// are concurrently accessible from both families, which avoids explicit
/// ownership transfers.
pub fn image_sharing(families: QueueFamilies) -> ImageSharing {
    if families.is_shared() {
        ImageSharing {
            mode: vk::SharingMode::EXCLUSIVE,
            queue_family_indices: Vec::new(),
        }
    } else {
        ImageSharing {
            mode: vk::SharingMode::CONCURRENT,
            queue_family_indices: vec![families.graphics, families.present],
        }
    }
}

/// Swapchain with one view per image.
///
/// The images belong to the swapchain; only the views are created and
/// destroyed here. Dropping destroys the views, then the swapchain, and must
/// happen while the device is idle.
pub struct Swapchain {
    swapchain: vk::SwapchainKHR,
    loader: ash::khr::swapchain::Device,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    config: SurfaceConfiguration,
    device: Arc<LogicalDevice>,
    // Keeps the surface alive until the swapchain is gone
    _surface: Arc<Surface>,
}

impl Swapchain {
    /// Create a swapchain for `surface`.
    ///
    /// # Safety
    /// `support` must have been queried for this device and surface.
    pub unsafe fn new(
        device: Arc<LogicalDevice>,
        surface: Arc<Surface>,
        support: &SurfaceSupport,
        drawable_size: vk::Extent2D,
    ) -> Result<Self> {
        let config = support.configure(drawable_size)?;
        let sharing = image_sharing(device.families());

        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface.handle())
            .min_image_count(config.image_count)
            .image_format(config.format)
            .image_color_space(config.color_space)
            .image_extent(config.extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(sharing.mode)
            .queue_family_indices(&sharing.queue_family_indices)
            .pre_transform(support.capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(config.present_mode)
            .clipped(true)
            .old_swapchain(vk::SwapchainKHR::null());

        let loader = ash::khr::swapchain::Device::new(surface.instance().raw(), device.raw());

        let swapchain = loader
            .create_swapchain(&create_info, None)
            .map_err(|e| GpuError::SwapchainCreation(e.to_string()))?;

        let images = match loader.get_swapchain_images(swapchain) {
            Ok(images) => images,
            Err(e) => {
                loader.destroy_swapchain(swapchain, None);
                return Err(e.into());
            }
        };

        let mut image_views = Vec::with_capacity(images.len());
        for &image in &images {
            match create_image_view(device.raw(), image, config.format) {
                Ok(view) => image_views.push(view),
                Err(e) => {
                    for &view in &image_views {
                        device.raw().destroy_image_view(view, None);
                    }
                    loader.destroy_swapchain(swapchain, None);
                    return Err(e);
                }
            }
        }

        tracing::info!(
            "Swapchain: {}x{} {:?}/{:?}, {:?}, {} images ({} requested), {:?} sharing",
            config.extent.width,
            config.extent.height,
            config.format,
            config.color_space,
            config.present_mode,
            images.len(),
            config.image_count,
            sharing.mode,
        );

        Ok(Self {
            swapchain,
            loader,
            images,
            image_views,
            config,
            device,
            _surface: surface,
        })
    }

    /// Acquire the next image, blocking up to `timeout_ns`.
    ///
    /// `semaphore` and `fence` (either may be null) are signaled once the
    /// presentation engine has released the image.
    ///
    /// # Safety
    /// The semaphore must be unsignaled with no pending signal operation.
    #[cfg_attr(
        feature = "profiling-tracy",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub unsafe fn acquire_next_image(
        &self,
        timeout_ns: u64,
        semaphore: vk::Semaphore,
        fence: vk::Fence,
    ) -> Result<u32> {
        match self
            .loader
            .acquire_next_image(self.swapchain, timeout_ns, semaphore, fence)
        {
            Ok((index, suboptimal)) => {
                if suboptimal {
                    tracing::debug!("Acquired image {index} from a suboptimal swapchain");
                }
                Ok(index)
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Err(GpuError::SurfaceOutOfDate),
            Err(e) => Err(GpuError::from(e)),
        }
    }

    /// Queue an image for presentation on the present queue.
    ///
    /// # Safety
    /// `image_index` must have been acquired and not yet presented.
    #[cfg_attr(
        feature = "profiling-tracy",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub unsafe fn present(
        &self,
        image_index: u32,
        wait_semaphores: &[vk::Semaphore],
    ) -> Result<()> {
        let swapchains = [self.swapchain];
        let image_indices = [image_index];

        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        match self
            .loader
            .queue_present(self.device.present_queue(), &present_info)
        {
            Ok(suboptimal) => {
                if suboptimal {
                    tracing::debug!("Presented image {image_index} to a suboptimal swapchain");
                }
                Ok(())
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Err(GpuError::SurfaceOutOfDate),
            Err(e) => Err(GpuError::from(e)),
        }
    }

    /// Get the image extent.
    pub fn extent(&self) -> vk::Extent2D {
        self.config.extent
    }

    /// Get the image format.
    pub fn format(&self) -> vk::Format {
        self.config.format
    }

    /// Get an image and its view by index.
    pub fn image(&self, index: u32) -> Result<(vk::Image, vk::ImageView)> {
        let i = index as usize;
        match (self.images.get(i), self.image_views.get(i)) {
            (Some(&image), Some(&view)) => Ok((image, view)),
            _ => Err(GpuError::InvalidState(format!(
                "Swapchain image {index} out of range ({} images)",
                self.images.len()
            ))),
        }
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        unsafe {
            for &view in &self.image_views {
                self.device.raw().destroy_image_view(view, None);
            }
            self.loader.destroy_swapchain(self.swapchain, None);
        }
    }
}

unsafe fn create_image_view(
    device: &ash::Device,
    image: vk::Image,
    format: vk::Format,
) -> Result<vk::ImageView> {
    let view_info = vk::ImageViewCreateInfo::default()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(format)
        .components(vk::ComponentMapping::default())
        .subresource_range(
            vk::ImageSubresourceRange::default()
                .aspect_mask(vk::ImageAspectFlags::COLOR)
                .base_mip_level(0)
                .level_count(1)
                .base_array_layer(0)
                .layer_count(1),
        );

    let view = device.create_image_view(&view_info, None)?;
    Ok(view)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_family_is_exclusive() {
        let sharing = image_sharing(QueueFamilies {
            graphics: 2,
            present: 2,
        });
        assert_eq!(sharing.mode, vk::SharingMode::EXCLUSIVE);
        assert!(sharing.queue_family_indices.is_empty());
    }

    #[test]
    fn distinct_families_are_concurrent() {
        let sharing = image_sharing(QueueFamilies {
            graphics: 0,
            present: 1,
        });
        assert_eq!(sharing.mode, vk::SharingMode::CONCURRENT);
        assert_eq!(sharing.queue_family_indices, vec![0, 1]);
    }

    #[test]
    fn sharing_feeds_create_info() {
        let sharing = image_sharing(QueueFamilies {
            graphics: 0,
            present: 3,
        });
        let info = vk::SwapchainCreateInfoKHR::default()
            .image_sharing_mode(sharing.mode)
            .queue_family_indices(&sharing.queue_family_indices);
        assert_eq!(info.queue_family_index_count, 2);

        let exclusive = image_sharing(QueueFamilies {
            graphics: 1,
            present: 1,
        });
        let info = vk::SwapchainCreateInfoKHR::default()
            .image_sharing_mode(exclusive.mode)
            .queue_family_indices(&exclusive.queue_family_indices);
        assert_eq!(info.queue_family_index_count, 0);
    }
}
