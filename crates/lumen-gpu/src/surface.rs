//! Window surface and surface capability probing.
//!
//! [`SurfaceSupport`] is what a device reports for a surface. The selection
//! functions in this module turn it into a [`SurfaceConfiguration`], the
//! concrete format, present mode, extent and image count a swapchain is
//! built with.

use crate::error::{GpuError, Result};
use crate::instance::Instance;
use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::sync::Arc;

/// A presentation surface for a window.
///
/// Keeps its instance alive and destroys the surface on drop. Any swapchain
/// built on the surface must be dropped first.
pub struct Surface {
    surface: vk::SurfaceKHR,
    loader: ash::khr::surface::Instance,
    instance: Arc<Instance>,
}

impl Surface {
    /// Create a surface for a window.
    ///
    /// # Safety
    /// The window must outlive the returned surface.
    pub unsafe fn from_window<W>(instance: Arc<Instance>, window: &W) -> Result<Self>
    where
        W: HasDisplayHandle + HasWindowHandle,
    {
        let display = window
            .display_handle()
            .map_err(|e| GpuError::SurfaceCreation(format!("Failed to get display handle: {e}")))?;
        let window_handle = window
            .window_handle()
            .map_err(|e| GpuError::SurfaceCreation(format!("Failed to get window handle: {e}")))?;

        let surface = ash_window::create_surface(
            instance.entry(),
            instance.raw(),
            display.as_raw(),
            window_handle.as_raw(),
            None,
        )
        .map_err(|e| GpuError::SurfaceCreation(e.to_string()))?;

        let loader = ash::khr::surface::Instance::new(instance.entry(), instance.raw());

        Ok(Self {
            surface,
            loader,
            instance,
        })
    }

    /// Get the raw surface handle.
    pub fn handle(&self) -> vk::SurfaceKHR {
        self.surface
    }

    /// Get the instance this surface was created from.
    pub fn instance(&self) -> &Arc<Instance> {
        &self.instance
    }

    /// Whether a queue family of `physical_device` can present to this surface.
    ///
    /// # Safety
    /// `physical_device` must belong to this surface's instance.
    pub unsafe fn supports_present(
        &self,
        physical_device: vk::PhysicalDevice,
        queue_family: u32,
    ) -> Result<bool> {
        let supported = self.loader.get_physical_device_surface_support(
            physical_device,
            queue_family,
            self.surface,
        )?;
        Ok(supported)
    }

    /// Query formats, present modes and limits of this surface on a device.
    ///
    /// # Safety
    /// `physical_device` must belong to this surface's instance.
    pub unsafe fn query_support(
        &self,
        physical_device: vk::PhysicalDevice,
    ) -> Result<SurfaceSupport> {
        let capabilities = self
            .loader
            .get_physical_device_surface_capabilities(physical_device, self.surface)?;
        let formats = self
            .loader
            .get_physical_device_surface_formats(physical_device, self.surface)?;
        let present_modes = self
            .loader
            .get_physical_device_surface_present_modes(physical_device, self.surface)?;

        Ok(SurfaceSupport {
            capabilities,
            formats,
            present_modes,
        })
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        unsafe {
            self.loader.destroy_surface(self.surface, None);
        }
    }
}

/// Surface support reported by one device.
#[derive(Debug, Clone, Default)]
pub struct SurfaceSupport {
    /// Raw surface capabilities.
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    /// Supported surface formats, in device order.
    pub formats: Vec<vk::SurfaceFormatKHR>,
    /// Supported present modes, in device order.
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SurfaceSupport {
    /// A swapchain can be created: at least one format and one present mode.
    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }

    /// Derive the swapchain configuration.
    ///
    /// `drawable_size` is the window's framebuffer size in pixels. It is only
    /// consulted when the surface lets the swapchain pick its own extent.
    pub fn configure(&self, drawable_size: vk::Extent2D) -> Result<SurfaceConfiguration> {
        let surface_format = select_surface_format(&self.formats).ok_or_else(|| {
            GpuError::SwapchainCreation("Surface reports no supported formats".to_string())
        })?;

        if self.present_modes.is_empty() {
            return Err(GpuError::SwapchainCreation(
                "Surface reports no present modes".to_string(),
            ));
        }

        Ok(SurfaceConfiguration {
            format: surface_format.format,
            color_space: surface_format.color_space,
            present_mode: select_present_mode(&self.present_modes),
            extent: calculate_extent(&self.capabilities, drawable_size),
            image_count: select_image_count(&self.capabilities),
        })
    }
}

/// Concrete swapchain parameters derived from [`SurfaceSupport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceConfiguration {
    pub format: vk::Format,
    pub color_space: vk::ColorSpaceKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub image_count: u32,
}

/// Select the surface format.
///
/// 8-bit BGRA in the sRGB non-linear color space wherever it appears in the
/// list, otherwise the first reported format.
pub fn select_surface_format(
    available: &[vk::SurfaceFormatKHR],
) -> Option<vk::SurfaceFormatKHR> {
    available
        .iter()
        .find(|format| {
            format.format == vk::Format::B8G8R8A8_SRGB
                && format.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .or_else(|| available.first())
        .copied()
}

/// Select the present mode.
///
/// Mailbox when available, otherwise FIFO, which every implementation
/// supports.
pub fn select_present_mode(available: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    if available.contains(&vk::PresentModeKHR::MAILBOX) {
        vk::PresentModeKHR::MAILBOX
    } else {
        vk::PresentModeKHR::FIFO
    }
}

/// Calculate swapchain extent.
///
/// A current extent of `u32::MAX` means the surface size follows the
/// swapchain; the drawable size is then clamped into the allowed range.
pub fn calculate_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    drawable_size: vk::Extent2D,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        capabilities.current_extent
    } else {
        vk::Extent2D {
            width: drawable_size.width.clamp(
                capabilities.min_image_extent.width,
                capabilities.max_image_extent.width,
            ),
            height: drawable_size.height.clamp(
                capabilities.min_image_extent.height,
                capabilities.max_image_extent.height,
            ),
        }
    }
}

/// Number of swapchain images to request.
///
/// One more than the minimum so the driver never has to wait on us for an
/// image, capped by the maximum when the surface declares one (zero means
/// unbounded).
pub fn select_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let image_count = capabilities.min_image_count.saturating_add(1);
    if capabilities.max_image_count > 0 {
        image_count.min(capabilities.max_image_count)
    } else {
        image_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BGRA_SRGB: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
        format: vk::Format::B8G8R8A8_SRGB,
        color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
    };

    const RGBA_UNORM: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
        format: vk::Format::R8G8B8A8_UNORM,
        color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
    };

    fn capabilities(min: u32, max: u32) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: min,
            max_image_count: max,
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D {
                width: 1,
                height: 1,
            },
            max_image_extent: vk::Extent2D {
                width: 4096,
                height: 4096,
            },
            ..Default::default()
        }
    }

    #[test]
    fn preferred_format_chosen_regardless_of_position() {
        let first = [BGRA_SRGB, RGBA_UNORM];
        let last = [RGBA_UNORM, RGBA_UNORM, BGRA_SRGB];

        assert_eq!(select_surface_format(&first), Some(BGRA_SRGB));
        assert_eq!(select_surface_format(&last), Some(BGRA_SRGB));
    }

    #[test]
    fn format_falls_back_to_first_listed() {
        let linear_bgra = vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_SRGB,
            color_space: vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT,
        };
        let formats = [linear_bgra, RGBA_UNORM];

        assert_eq!(select_surface_format(&formats), Some(linear_bgra));
        assert_eq!(select_surface_format(&[]), None);
    }

    #[test]
    fn mailbox_preferred_over_fifo() {
        let modes = [
            vk::PresentModeKHR::FIFO,
            vk::PresentModeKHR::IMMEDIATE,
            vk::PresentModeKHR::MAILBOX,
        ];
        assert_eq!(select_present_mode(&modes), vk::PresentModeKHR::MAILBOX);
        assert_eq!(
            select_present_mode(&[vk::PresentModeKHR::IMMEDIATE, vk::PresentModeKHR::FIFO]),
            vk::PresentModeKHR::FIFO
        );
    }

    #[test]
    fn image_count_unbounded_max() {
        assert_eq!(select_image_count(&capabilities(2, 0)), 3);
    }

    #[test]
    fn image_count_clamped_to_max() {
        assert_eq!(select_image_count(&capabilities(2, 2)), 2);
        assert_eq!(select_image_count(&capabilities(2, 8)), 3);
    }

    #[test]
    fn image_count_saturates_at_u32_max() {
        assert_eq!(select_image_count(&capabilities(u32::MAX, 0)), u32::MAX);
        assert_eq!(select_image_count(&capabilities(u32::MAX, u32::MAX)), u32::MAX);
    }

    #[test]
    fn fixed_extent_used_verbatim() {
        let mut caps = capabilities(2, 0);
        caps.current_extent = vk::Extent2D {
            width: 1024,
            height: 768,
        };

        let extent = calculate_extent(
            &caps,
            vk::Extent2D {
                width: 10,
                height: 10,
            },
        );
        assert_eq!(extent, caps.current_extent);
    }

    #[test]
    fn sentinel_extent_clamps_drawable_size() {
        let mut caps = capabilities(2, 0);
        caps.min_image_extent = vk::Extent2D {
            width: 64,
            height: 64,
        };
        caps.max_image_extent = vk::Extent2D {
            width: 1920,
            height: 1080,
        };

        let extent = calculate_extent(
            &caps,
            vk::Extent2D {
                width: 2560,
                height: 0,
            },
        );
        assert_eq!(
            extent,
            vk::Extent2D {
                width: 1920,
                height: 64
            }
        );
    }

    #[test]
    fn adequacy_requires_formats_and_modes() {
        let mut support = SurfaceSupport::default();
        assert!(!support.is_adequate());

        support.formats.push(BGRA_SRGB);
        assert!(!support.is_adequate());

        support.present_modes.push(vk::PresentModeKHR::FIFO);
        assert!(support.is_adequate());
    }

    #[test]
    fn inadequate_support_cannot_be_configured() {
        let support = SurfaceSupport {
            capabilities: capabilities(2, 0),
            formats: vec![BGRA_SRGB],
            present_modes: vec![],
        };
        assert!(matches!(
            support.configure(vk::Extent2D::default()),
            Err(GpuError::SwapchainCreation(_))
        ));
    }

    #[test]
    fn single_image_surface_with_fifo_only() {
        let support = SurfaceSupport {
            capabilities: capabilities(1, 0),
            formats: vec![
                vk::SurfaceFormatKHR {
                    format: vk::Format::R8G8B8A8_UNORM,
                    color_space: vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT,
                },
                BGRA_SRGB,
            ],
            present_modes: vec![vk::PresentModeKHR::FIFO],
        };

        let config = support
            .configure(vk::Extent2D {
                width: 800,
                height: 600,
            })
            .unwrap();

        assert_eq!(
            config,
            SurfaceConfiguration {
                format: vk::Format::B8G8R8A8_SRGB,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
                present_mode: vk::PresentModeKHR::FIFO,
                extent: vk::Extent2D {
                    width: 800,
                    height: 600
                },
                image_count: 2,
            }
        );
    }
}
