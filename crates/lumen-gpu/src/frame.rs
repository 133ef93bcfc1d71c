//! Per-frame render loop.
//!
//! One frame is in flight at a time. Each frame runs the same protocol:
//!
//! 1. wait for the previous submission's fence, then reset it
//! 2. acquire a swapchain image, signaling `image_available`
//! 3. reset and re-record the command buffer
//! 4. submit, waiting on `image_available` at color output and signaling
//!    `render_finished` and the fence
//! 5. present, waiting on `render_finished`
//!
//! The protocol is driven by [`FrameCycle`] over the [`FrameOps`] trait, so
//! the ordering can be exercised without a GPU. [`FrameExecutor`] supplies the
//! Vulkan implementation.

use crate::command::{
    begin_command_buffer, end_command_buffer, submit_command_buffers, CommandPool,
    LayoutTransition,
};
use crate::device::LogicalDevice;
use crate::error::Result;
use crate::swapchain::Swapchain;
use crate::sync::FrameSync;
use ash::vk;
use std::sync::Arc;

/// Where the frame protocol currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramePhase {
    Idle,
    Acquiring,
    Recording,
    Submitted,
    Presented,
}

/// The GPU operations one frame is made of.
pub trait FrameOps {
    /// Block until the previous frame's submission has completed.
    fn wait_for_previous_frame(&mut self) -> Result<()>;
    /// Return the completion fence to unsignaled.
    fn reset_fence(&mut self) -> Result<()>;
    /// Acquire the next swapchain image.
    fn acquire_image(&mut self) -> Result<u32>;
    fn reset_command_buffer(&mut self) -> Result<()>;
    /// Record the frame's commands targeting `image_index`.
    fn record(&mut self, image_index: u32) -> Result<()>;
    fn submit(&mut self) -> Result<()>;
    fn present(&mut self, image_index: u32) -> Result<()>;
}

/// Drives [`FrameOps`] through the frame protocol.
#[derive(Debug)]
pub struct FrameCycle {
    phase: FramePhase,
    frames_presented: u64,
}

impl Default for FrameCycle {
    fn default() -> Self {
        Self {
            phase: FramePhase::Idle,
            frames_presented: 0,
        }
    }
}

impl FrameCycle {
    /// Run one frame, returning the presented image index.
    ///
    /// Any error ends the frame immediately. [`FrameCycle::phase`] then
    /// reports the phase the failure happened in.
    #[cfg_attr(
        feature = "profiling-tracy",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub fn run<O: FrameOps + ?Sized>(&mut self, ops: &mut O) -> Result<u32> {
        self.phase = FramePhase::Idle;
        ops.wait_for_previous_frame()?;
        ops.reset_fence()?;

        self.phase = FramePhase::Acquiring;
        let image_index = ops.acquire_image()?;

        self.phase = FramePhase::Recording;
        ops.reset_command_buffer()?;
        ops.record(image_index)?;
        ops.submit()?;

        self.phase = FramePhase::Submitted;
        ops.present(image_index)?;

        self.phase = FramePhase::Presented;
        self.frames_presented += 1;
        tracing::trace!(
            "Frame {} presented image {}",
            self.frames_presented,
            image_index
        );

        self.phase = FramePhase::Idle;
        Ok(image_index)
    }

    /// Current phase.
    pub fn phase(&self) -> FramePhase {
        self.phase
    }

    /// Number of frames that completed the whole protocol.
    pub fn frames_presented(&self) -> u64 {
        self.frames_presented
    }
}

/// The swapchain image a frame renders to.
#[derive(Debug, Clone, Copy)]
pub struct FrameTarget {
    pub image_index: u32,
    pub image: vk::Image,
    pub view: vk::ImageView,
    pub extent: vk::Extent2D,
    pub format: vk::Format,
}

impl FrameTarget {
    /// Viewport covering the whole image.
    pub fn viewport(&self) -> vk::Viewport {
        vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: self.extent.width as f32,
            height: self.extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }

    /// Scissor covering the whole image.
    pub fn scissor(&self) -> vk::Rect2D {
        vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: self.extent,
        }
    }
}

/// Records draw commands into a frame.
///
/// Called inside a dynamic rendering scope that clears the target. Viewport
/// and scissor are already set to the full extent.
pub trait DrawRecorder {
    fn record(
        &mut self,
        device: &ash::Device,
        cmd: vk::CommandBuffer,
        target: &FrameTarget,
    ) -> Result<()>;
}

impl<F> DrawRecorder for F
where
    F: FnMut(&ash::Device, vk::CommandBuffer, &FrameTarget) -> Result<()>,
{
    fn record(
        &mut self,
        device: &ash::Device,
        cmd: vk::CommandBuffer,
        target: &FrameTarget,
    ) -> Result<()> {
        self(device, cmd, target)
    }
}

/// Owns the frame's synchronization objects and command buffer.
pub struct FrameExecutor {
    cycle: FrameCycle,
    sync: FrameSync,
    command_buffer: vk::CommandBuffer,
    // Owns command_buffer
    _command_pool: CommandPool,
    clear_color: [f32; 4],
    device: Arc<LogicalDevice>,
}

impl FrameExecutor {
    /// Create the synchronization set and a resettable command buffer on the
    /// graphics family.
    pub fn new(device: Arc<LogicalDevice>, clear_color: [f32; 4]) -> Result<Self> {
        let command_pool = CommandPool::new(
            device.clone(),
            device.families().graphics,
            vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
        )?;
        let command_buffer = command_pool.allocate_command_buffer()?;
        let sync = FrameSync::new(device.clone())?;

        Ok(Self {
            cycle: FrameCycle::default(),
            sync,
            command_buffer,
            _command_pool: command_pool,
            clear_color,
            device,
        })
    }

    /// Render and present one frame to `swapchain`.
    pub fn run_frame(
        &mut self,
        swapchain: &Swapchain,
        recorder: &mut dyn DrawRecorder,
    ) -> Result<u32> {
        let mut frame = VulkanFrame {
            device: &self.device,
            swapchain,
            sync: &self.sync,
            cmd: self.command_buffer,
            clear_color: self.clear_color,
            recorder,
        };
        self.cycle.run(&mut frame)
    }

    /// Current phase of the frame protocol.
    pub fn phase(&self) -> FramePhase {
        self.cycle.phase()
    }

    /// Number of frames presented so far.
    pub fn frames_presented(&self) -> u64 {
        self.cycle.frames_presented()
    }
}

/// Semaphores and fence linking a frame's submit and present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FrameSignals {
    submit_wait: vk::Semaphore,
    submit_wait_stage: vk::PipelineStageFlags,
    submit_signal: vk::Semaphore,
    submit_fence: vk::Fence,
    present_wait: vk::Semaphore,
}

impl FrameSignals {
    fn from_sync(sync: &FrameSync) -> Self {
        Self::new(sync.image_available, sync.render_finished, sync.in_flight)
    }

    /// Color output waits on the acquire; present waits on the render.
    const fn new(
        image_available: vk::Semaphore,
        render_finished: vk::Semaphore,
        in_flight: vk::Fence,
    ) -> Self {
        Self {
            submit_wait: image_available,
            submit_wait_stage: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            submit_signal: render_finished,
            submit_fence: in_flight,
            present_wait: render_finished,
        }
    }
}

struct VulkanFrame<'a> {
    device: &'a LogicalDevice,
    swapchain: &'a Swapchain,
    sync: &'a FrameSync,
    cmd: vk::CommandBuffer,
    clear_color: [f32; 4],
    recorder: &'a mut dyn DrawRecorder,
}

impl FrameOps for VulkanFrame<'_> {
    fn wait_for_previous_frame(&mut self) -> Result<()> {
        self.sync.wait()
    }

    fn reset_fence(&mut self) -> Result<()> {
        self.sync.reset()
    }

    fn acquire_image(&mut self) -> Result<u32> {
        // SAFETY: the previous frame has completed, so image_available has
        // no pending signal.
        unsafe {
            self.swapchain
                .acquire_next_image(u64::MAX, self.sync.image_available, vk::Fence::null())
        }
    }

    fn reset_command_buffer(&mut self) -> Result<()> {
        unsafe {
            self.device
                .raw()
                .reset_command_buffer(self.cmd, vk::CommandBufferResetFlags::empty())?;
        }
        Ok(())
    }

    fn record(&mut self, image_index: u32) -> Result<()> {
        let device = self.device.raw();
        let cmd = self.cmd;
        let (image, view) = self.swapchain.image(image_index)?;
        let target = FrameTarget {
            image_index,
            image,
            view,
            extent: self.swapchain.extent(),
            format: self.swapchain.format(),
        };

        unsafe {
            begin_command_buffer(device, cmd, vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)?;

            LayoutTransition::to_color_attachment().record(device, cmd, image);

            let clear_value = vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: self.clear_color,
                },
            };
            let color_attachment = vk::RenderingAttachmentInfo::default()
                .image_view(view)
                .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
                .load_op(vk::AttachmentLoadOp::CLEAR)
                .store_op(vk::AttachmentStoreOp::STORE)
                .clear_value(clear_value);
            let rendering_info = vk::RenderingInfo::default()
                .render_area(target.scissor())
                .layer_count(1)
                .color_attachments(std::slice::from_ref(&color_attachment));

            device.cmd_begin_rendering(cmd, &rendering_info);
            device.cmd_set_viewport(cmd, 0, &[target.viewport()]);
            device.cmd_set_scissor(cmd, 0, &[target.scissor()]);

            let drawn = self.recorder.record(device, cmd, &target);

            device.cmd_end_rendering(cmd);
            drawn?;

            LayoutTransition::to_present().record(device, cmd, image);

            end_command_buffer(device, cmd)
        }
    }

    fn submit(&mut self) -> Result<()> {
        let wiring = FrameSignals::from_sync(self.sync);
        unsafe {
            submit_command_buffers(
                self.device.raw(),
                self.device.graphics_queue(),
                &[self.cmd],
                &[wiring.submit_wait],
                &[wiring.submit_wait_stage],
                &[wiring.submit_signal],
                wiring.submit_fence,
            )
        }
    }

    fn present(&mut self, image_index: u32) -> Result<()> {
        let wiring = FrameSignals::from_sync(self.sync);
        unsafe { self.swapchain.present(image_index, &[wiring.present_wait]) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GpuError;
    use approx::assert_relative_eq;
    use ash::vk::Handle;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Call {
        Wait,
        ResetFence,
        Acquire,
        ResetCommands,
        Record(u32),
        Submit,
        Present(u32),
    }

    /// Records every call; image indices cycle through `image_count`.
    struct RecordingOps {
        calls: Vec<Call>,
        image_count: u32,
        next_image: u32,
        fail_acquire: bool,
    }

    impl RecordingOps {
        fn new(image_count: u32) -> Self {
            Self {
                calls: Vec::new(),
                image_count,
                next_image: 0,
                fail_acquire: false,
            }
        }

        fn count(&self, call: Call) -> usize {
            self.calls.iter().filter(|&&c| c == call).count()
        }
    }

    impl FrameOps for RecordingOps {
        fn wait_for_previous_frame(&mut self) -> Result<()> {
            self.calls.push(Call::Wait);
            Ok(())
        }

        fn reset_fence(&mut self) -> Result<()> {
            self.calls.push(Call::ResetFence);
            Ok(())
        }

        fn acquire_image(&mut self) -> Result<u32> {
            self.calls.push(Call::Acquire);
            if self.fail_acquire {
                return Err(GpuError::SurfaceOutOfDate);
            }
            let index = self.next_image;
            self.next_image = (self.next_image + 1) % self.image_count;
            Ok(index)
        }

        fn reset_command_buffer(&mut self) -> Result<()> {
            self.calls.push(Call::ResetCommands);
            Ok(())
        }

        fn record(&mut self, image_index: u32) -> Result<()> {
            self.calls.push(Call::Record(image_index));
            Ok(())
        }

        fn submit(&mut self) -> Result<()> {
            self.calls.push(Call::Submit);
            Ok(())
        }

        fn present(&mut self, image_index: u32) -> Result<()> {
            self.calls.push(Call::Present(image_index));
            Ok(())
        }
    }

    #[test]
    fn single_frame_order() {
        let mut cycle = FrameCycle::default();
        let mut ops = RecordingOps::new(3);

        let index = cycle.run(&mut ops).unwrap();

        assert_eq!(index, 0);
        assert_eq!(
            ops.calls,
            vec![
                Call::Wait,
                Call::ResetFence,
                Call::Acquire,
                Call::ResetCommands,
                Call::Record(0),
                Call::Submit,
                Call::Present(0),
            ]
        );
        assert_eq!(cycle.phase(), FramePhase::Idle);
    }

    #[test]
    fn one_wait_reset_and_acquire_per_frame() {
        const FRAMES: usize = 10;
        let mut cycle = FrameCycle::default();
        let mut ops = RecordingOps::new(3);

        for _ in 0..FRAMES {
            cycle.run(&mut ops).unwrap();
        }

        assert_eq!(ops.count(Call::Wait), FRAMES);
        assert_eq!(ops.count(Call::ResetFence), FRAMES);
        assert_eq!(ops.count(Call::Acquire), FRAMES);
        assert_eq!(ops.count(Call::ResetCommands), FRAMES);
        assert_eq!(ops.count(Call::Submit), FRAMES);
        assert_eq!(cycle.frames_presented(), FRAMES as u64);
    }

    #[test]
    fn command_buffer_reset_before_every_recording() {
        let mut cycle = FrameCycle::default();
        let mut ops = RecordingOps::new(2);

        for _ in 0..4 {
            cycle.run(&mut ops).unwrap();
        }

        for (i, call) in ops.calls.iter().enumerate() {
            if let Call::Record(_) = call {
                assert_eq!(ops.calls[i - 1], Call::ResetCommands);
            }
        }
    }

    #[test]
    fn presents_the_recorded_image() {
        let mut cycle = FrameCycle::default();
        let mut ops = RecordingOps::new(2);

        let indices: Vec<u32> = (0..4).map(|_| cycle.run(&mut ops).unwrap()).collect();
        assert_eq!(indices, vec![0, 1, 0, 1]);

        let recorded: Vec<u32> = ops
            .calls
            .iter()
            .filter_map(|c| match c {
                Call::Record(i) => Some(*i),
                _ => None,
            })
            .collect();
        let presented: Vec<u32> = ops
            .calls
            .iter()
            .filter_map(|c| match c {
                Call::Present(i) => Some(*i),
                _ => None,
            })
            .collect();
        assert_eq!(recorded, presented);
    }

    #[test]
    fn acquire_failure_ends_frame_before_submit() {
        let mut cycle = FrameCycle::default();
        let mut ops = RecordingOps::new(2);
        cycle.run(&mut ops).unwrap();

        ops.fail_acquire = true;
        ops.calls.clear();
        let result = cycle.run(&mut ops);

        assert!(matches!(result, Err(GpuError::SurfaceOutOfDate)));
        assert_eq!(ops.calls, vec![Call::Wait, Call::ResetFence, Call::Acquire]);
        assert_eq!(cycle.phase(), FramePhase::Acquiring);
        assert_eq!(cycle.frames_presented(), 1);
    }

    #[test]
    fn target_covers_full_extent() {
        let target = FrameTarget {
            image_index: 0,
            image: vk::Image::null(),
            view: vk::ImageView::null(),
            extent: vk::Extent2D {
                width: 800,
                height: 600,
            },
            format: vk::Format::B8G8R8A8_SRGB,
        };

        let viewport = target.viewport();
        assert_relative_eq!(viewport.width, 800.0);
        assert_relative_eq!(viewport.height, 600.0);
        assert_relative_eq!(viewport.max_depth, 1.0);
        assert_eq!(target.scissor().extent, target.extent);
        assert_eq!(target.scissor().offset, vk::Offset2D::default());
    }

    #[test]
    fn submit_and_present_are_chained_by_render_finished() {
        let image_available = vk::Semaphore::from_raw(1);
        let render_finished = vk::Semaphore::from_raw(2);
        let in_flight = vk::Fence::from_raw(3);

        let signals = FrameSignals::new(image_available, render_finished, in_flight);

        assert_eq!(signals.submit_wait, image_available);
        assert_eq!(
            signals.submit_wait_stage,
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
        );
        assert_eq!(signals.submit_signal, render_finished);
        assert_eq!(signals.submit_fence, in_flight);
        assert_eq!(signals.present_wait, render_finished);
    }
}
