//! Application context.

use std::sync::Arc;
use std::time::Instant;

use ash::vk;
use lumen_gpu::{LogicalDevice, RenderContext};
use winit::window::Window;

/// Application context shared across all app methods.
pub struct AppContext {
    /// Render context for the window. Declared first so it is released
    /// before the window.
    pub render: RenderContext,
    /// The window handle.
    pub window: Arc<Window>,
    /// Total frames rendered.
    pub frame_count: u64,
    /// Time of last frame (for delta time calculation).
    pub(crate) last_frame_time: Instant,
}

impl AppContext {
    pub(crate) fn new(window: Arc<Window>, render: RenderContext) -> Self {
        Self {
            render,
            window,
            frame_count: 0,
            last_frame_time: Instant::now(),
        }
    }

    /// Get the logical device.
    pub fn device(&self) -> &Arc<LogicalDevice> {
        self.render.device()
    }

    /// Get the swapchain extent.
    pub fn extent(&self) -> vk::Extent2D {
        self.render.extent()
    }

    /// Get the swapchain image format.
    pub fn color_format(&self) -> vk::Format {
        self.render.color_format()
    }

    /// Get the aspect ratio (width / height).
    pub fn aspect_ratio(&self) -> f32 {
        let extent = self.extent();
        extent.width as f32 / extent.height.max(1) as f32
    }
}
