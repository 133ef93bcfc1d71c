//! Per-frame context for rendering.

use ash::vk;
use lumen_gpu::FrameTarget;

/// Context for the frame being recorded.
pub struct FrameContext<'a> {
    /// Device to record commands with.
    pub device: &'a ash::Device,
    /// Command buffer inside the frame's rendering pass.
    pub command_buffer: vk::CommandBuffer,
    /// The swapchain image being rendered to.
    pub target: FrameTarget,
    /// Delta time since last frame in seconds.
    pub dt: f32,
    /// Current frame number.
    pub frame_number: u64,
}

impl<'a> FrameContext<'a> {
    pub(crate) fn new(
        device: &'a ash::Device,
        command_buffer: vk::CommandBuffer,
        target: FrameTarget,
        dt: f32,
        frame_number: u64,
    ) -> Self {
        Self {
            device,
            command_buffer,
            target,
            dt,
            frame_number,
        }
    }

    /// Index of the acquired swapchain image.
    pub fn image_index(&self) -> u32 {
        self.target.image_index
    }

    /// Extent of the image being rendered to.
    pub fn extent(&self) -> vk::Extent2D {
        self.target.extent
    }
}
