//! Render context: the ready-to-render bundle of instance, surface, device,
//! swapchain and frame executor.

use crate::buffer::upload_to_device_local;
use crate::command::CommandPool;
use crate::device::LogicalDevice;
use crate::error::{GpuError, Result};
use crate::frame::{DrawRecorder, FrameExecutor};
use crate::instance::Instance;
use crate::memory::{GpuAllocator, GpuBuffer};
use crate::selection::{enumerate_candidates, required_device_extensions, select_device};
use crate::surface::Surface;
use crate::swapchain::Swapchain;
use ash::vk;
use parking_lot::Mutex;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::sync::Arc;

/// Everything needed to render frames to one window.
///
/// Dropping the context waits for the device to go idle, then releases
/// resources in reverse creation order.
pub struct RenderContext {
    frames: FrameExecutor,
    upload_pool: CommandPool,
    allocator: Mutex<GpuAllocator>,
    swapchain: Swapchain,
    device_name: String,
    device: Arc<LogicalDevice>,
}

impl RenderContext {
    /// Render and present one frame.
    ///
    /// `recorder` draws inside a pass that has already cleared the image.
    pub fn run_frame(&mut self, recorder: &mut dyn DrawRecorder) -> Result<u32> {
        self.frames.run_frame(&self.swapchain, recorder)
    }

    /// Get the current swapchain image extent.
    pub fn extent(&self) -> vk::Extent2D {
        self.swapchain.extent()
    }

    /// Get the swapchain image format.
    pub fn color_format(&self) -> vk::Format {
        self.swapchain.format()
    }

    /// Get the logical device.
    pub fn device(&self) -> &Arc<LogicalDevice> {
        &self.device
    }

    /// Get the swapchain.
    pub fn swapchain(&self) -> &Swapchain {
        &self.swapchain
    }

    /// Name of the selected GPU.
    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// Number of frames presented so far.
    pub fn frames_presented(&self) -> u64 {
        self.frames.frames_presented()
    }

    /// Upload `data` into a new device-local buffer. Blocks until the
    /// transfer completes.
    pub fn upload_buffer<T: bytemuck::Pod>(
        &self,
        data: &[T],
        usage: vk::BufferUsageFlags,
        name: &str,
    ) -> Result<GpuBuffer> {
        let mut allocator = self.allocator.lock();
        upload_to_device_local(&mut allocator, &self.upload_pool, data, usage, name)
    }

    /// Free a buffer created through this context.
    pub fn free_buffer(&self, buffer: &mut GpuBuffer) -> Result<()> {
        self.allocator.lock().free_buffer(buffer)
    }

    /// Wait for device to be idle.
    pub fn wait_idle(&self) -> Result<()> {
        self.device.wait_idle()
    }

    /// Drain the GPU and release everything.
    ///
    /// Must run before the window the context renders to is destroyed.
    pub fn shutdown(self) -> Result<()> {
        let idle = self.wait_idle();
        drop(self);
        idle
    }
}

impl Drop for RenderContext {
    fn drop(&mut self) {
        if let Err(e) = self.device.wait_idle() {
            tracing::error!("Failed to wait for device idle during teardown: {e}");
        }
        self.allocator.lock().shutdown();
        tracing::debug!(
            "Releasing render context after {} frames",
            self.frames.frames_presented()
        );
    }
}

/// Builder for creating a render context.
pub struct RenderContextBuilder {
    app_name: String,
    enable_validation: bool,
    clear_color: [f32; 4],
}

impl Default for RenderContextBuilder {
    fn default() -> Self {
        Self {
            app_name: "Lumen".to_string(),
            enable_validation: cfg!(debug_assertions),
            clear_color: [0.0, 0.0, 0.0, 1.0],
        }
    }
}

impl RenderContextBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the application name.
    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = name.into();
        self
    }

    /// Enable or disable validation layers.
    pub fn validation(mut self, enable: bool) -> Self {
        self.enable_validation = enable;
        self
    }

    /// Set the color frames are cleared to.
    pub fn clear_color(mut self, color: [f32; 4]) -> Self {
        self.clear_color = color;
        self
    }

    /// Build the render context for `window`.
    ///
    /// `drawable_size` is the window's framebuffer size in pixels, used when
    /// the surface leaves the extent to the application.
    ///
    /// # Safety
    /// `window` must outlive the returned context.
    pub unsafe fn build<W>(self, window: &W, drawable_size: vk::Extent2D) -> Result<RenderContext>
    where
        W: HasDisplayHandle + HasWindowHandle,
    {
        let display = window
            .display_handle()
            .map_err(|e| GpuError::SurfaceCreation(e.to_string()))?
            .as_raw();

        let instance = Arc::new(Instance::new(
            &self.app_name,
            self.enable_validation,
            display,
        )?);
        tracing::info!(
            "Validation layers {}",
            if instance.validation_enabled() {
                "enabled"
            } else {
                "disabled"
            }
        );

        let surface = Arc::new(Surface::from_window(instance.clone(), window)?);

        let required_extensions = required_device_extensions();
        let candidates = enumerate_candidates(&instance, &surface)?;
        let selected = select_device(&candidates, &required_extensions)?;

        tracing::info!("Selected GPU: {}", selected.summary());

        let device = Arc::new(LogicalDevice::new(
            instance,
            selected,
            &required_extensions,
        )?);

        let swapchain = Swapchain::new(
            device.clone(),
            surface,
            &selected.surface_support,
            drawable_size,
        )?;

        let frames = FrameExecutor::new(device.clone(), self.clear_color)?;

        let allocator = GpuAllocator::new(device.clone())?;
        let upload_pool = CommandPool::new(
            device.clone(),
            device.families().graphics,
            vk::CommandPoolCreateFlags::TRANSIENT,
        )?;

        Ok(RenderContext {
            frames,
            upload_pool,
            allocator: Mutex::new(allocator),
            swapchain,
            device_name: selected.name.clone(),
            device,
        })
    }
}
