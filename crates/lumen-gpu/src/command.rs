//! Command buffer management.

use crate::device::LogicalDevice;
use crate::error::Result;
use crate::sync::{create_fence, wait_for_fence};
use ash::vk;
use std::sync::Arc;

/// Command pool for allocating command buffers.
///
/// Destroying the pool frees every buffer allocated from it.
pub struct CommandPool {
    pool: vk::CommandPool,
    device: Arc<LogicalDevice>,
}

impl CommandPool {
    /// Create a new command pool.
    pub fn new(
        device: Arc<LogicalDevice>,
        queue_family: u32,
        flags: vk::CommandPoolCreateFlags,
    ) -> Result<Self> {
        let create_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(queue_family)
            .flags(flags);

        let pool = unsafe { device.raw().create_command_pool(&create_info, None)? };

        Ok(Self { pool, device })
    }

    /// Get the raw pool handle.
    pub fn handle(&self) -> vk::CommandPool {
        self.pool
    }

    /// Allocate a single primary command buffer.
    pub fn allocate_command_buffer(&self) -> Result<vk::CommandBuffer> {
        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);

        let buffers = unsafe { self.device.raw().allocate_command_buffers(&alloc_info)? };
        Ok(buffers[0])
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        unsafe {
            self.device.raw().destroy_command_pool(self.pool, None);
        }
    }
}

/// Begin recording a command buffer.
///
/// # Safety
/// The device and command buffer must be valid.
pub unsafe fn begin_command_buffer(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    flags: vk::CommandBufferUsageFlags,
) -> Result<()> {
    let begin_info = vk::CommandBufferBeginInfo::default().flags(flags);
    device.begin_command_buffer(cmd, &begin_info)?;
    Ok(())
}

/// End recording a command buffer.
///
/// # Safety
/// The device and command buffer must be valid.
pub unsafe fn end_command_buffer(device: &ash::Device, cmd: vk::CommandBuffer) -> Result<()> {
    device.end_command_buffer(cmd)?;
    Ok(())
}

/// Submit command buffers to a queue.
///
/// # Safety
/// All handles must be valid.
#[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
pub unsafe fn submit_command_buffers(
    device: &ash::Device,
    queue: vk::Queue,
    command_buffers: &[vk::CommandBuffer],
    wait_semaphores: &[vk::Semaphore],
    wait_stages: &[vk::PipelineStageFlags],
    signal_semaphores: &[vk::Semaphore],
    fence: vk::Fence,
) -> Result<()> {
    let submit_info = vk::SubmitInfo::default()
        .command_buffers(command_buffers)
        .wait_semaphores(wait_semaphores)
        .wait_dst_stage_mask(wait_stages)
        .signal_semaphores(signal_semaphores);

    device.queue_submit(queue, &[submit_info], fence)?;
    Ok(())
}

/// Record, submit and wait for a one-off command buffer on the graphics queue.
///
/// Completion is awaited with a dedicated fence rather than a queue idle.
pub fn execute_single_time_commands<F>(pool: &CommandPool, f: F) -> Result<()>
where
    F: FnOnce(&ash::Device, vk::CommandBuffer),
{
    let device = pool.device.raw();
    let queue = pool.device.graphics_queue();
    let cmd = pool.allocate_command_buffer()?;

    let result = unsafe { submit_single_time(device, queue, cmd, f) };

    unsafe {
        device.free_command_buffers(pool.handle(), &[cmd]);
    }

    result
}

unsafe fn submit_single_time<F>(
    device: &ash::Device,
    queue: vk::Queue,
    cmd: vk::CommandBuffer,
    f: F,
) -> Result<()>
where
    F: FnOnce(&ash::Device, vk::CommandBuffer),
{
    begin_command_buffer(device, cmd, vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)?;
    f(device, cmd);
    end_command_buffer(device, cmd)?;

    let fence = create_fence(device, false)?;
    if let Err(e) = submit_command_buffers(device, queue, &[cmd], &[], &[], &[], fence) {
        device.destroy_fence(fence, None);
        return Err(e);
    }

    let waited = wait_for_fence(device, fence, u64::MAX);
    if waited.is_err() {
        // The submission may still be pending on the queue
        if let Err(e) = device.device_wait_idle() {
            tracing::warn!("Failed to drain device after a failed fence wait: {e}");
        }
    }
    device.destroy_fence(fence, None);

    waited
}

/// Image layout transition recorded as a synchronization2 barrier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutTransition {
    pub old_layout: vk::ImageLayout,
    pub new_layout: vk::ImageLayout,
    pub src_stage: vk::PipelineStageFlags2,
    pub src_access: vk::AccessFlags2,
    pub dst_stage: vk::PipelineStageFlags2,
    pub dst_access: vk::AccessFlags2,
}

impl LayoutTransition {
    /// Freshly acquired swapchain image to color attachment.
    ///
    /// The previous contents are discarded. The wait is on the color output
    /// stage so it chains with the acquire semaphore's wait stage.
    pub const fn to_color_attachment() -> Self {
        Self {
            old_layout: vk::ImageLayout::UNDEFINED,
            new_layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            src_stage: vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
            src_access: vk::AccessFlags2::NONE,
            dst_stage: vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
            dst_access: vk::AccessFlags2::COLOR_ATTACHMENT_WRITE,
        }
    }

    /// Rendered color attachment to presentable.
    pub const fn to_present() -> Self {
        Self {
            old_layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            new_layout: vk::ImageLayout::PRESENT_SRC_KHR,
            src_stage: vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
            src_access: vk::AccessFlags2::COLOR_ATTACHMENT_WRITE,
            dst_stage: vk::PipelineStageFlags2::BOTTOM_OF_PIPE,
            dst_access: vk::AccessFlags2::NONE,
        }
    }

    /// Record the transition for the single color mip/layer of `image`.
    ///
    /// # Safety
    /// The command buffer must be recording.
    pub unsafe fn record(&self, device: &ash::Device, cmd: vk::CommandBuffer, image: vk::Image) {
        let barrier = vk::ImageMemoryBarrier2::default()
            .src_stage_mask(self.src_stage)
            .src_access_mask(self.src_access)
            .dst_stage_mask(self.dst_stage)
            .dst_access_mask(self.dst_access)
            .old_layout(self.old_layout)
            .new_layout(self.new_layout)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(image)
            .subresource_range(
                vk::ImageSubresourceRange::default()
                    .aspect_mask(vk::ImageAspectFlags::COLOR)
                    .base_mip_level(0)
                    .level_count(1)
                    .base_array_layer(0)
                    .layer_count(1),
            );

        let barriers = [barrier];
        let dependency_info = vk::DependencyInfo::default().image_memory_barriers(&barriers);
        device.cmd_pipeline_barrier2(cmd, &dependency_info);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transitions_chain_through_color_attachment() {
        let acquire = LayoutTransition::to_color_attachment();
        let present = LayoutTransition::to_present();

        assert_eq!(acquire.old_layout, vk::ImageLayout::UNDEFINED);
        assert_eq!(acquire.new_layout, present.old_layout);
        assert_eq!(present.new_layout, vk::ImageLayout::PRESENT_SRC_KHR);
        assert_eq!(acquire.dst_access, present.src_access);
    }
}
