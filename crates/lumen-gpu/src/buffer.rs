//! Vertex layout and device-local buffer uploads.

use crate::command::{execute_single_time_commands, CommandPool};
use crate::error::Result;
use crate::memory::{GpuAllocator, GpuBuffer};
use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3};
use gpu_allocator::MemoryLocation;
use std::mem::{offset_of, size_of};

/// A colored 2D vertex.
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct Vertex {
    pub position: Vec2,
    pub color: Vec3,
}

impl Vertex {
    pub const fn new(position: Vec2, color: Vec3) -> Self {
        Self { position, color }
    }

    /// Per-vertex binding at slot 0.
    pub fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription {
            binding: 0,
            stride: size_of::<Self>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }
    }

    /// Position at location 0, color at location 1.
    pub fn attribute_descriptions() -> [vk::VertexInputAttributeDescription; 2] {
        [
            vk::VertexInputAttributeDescription {
                location: 0,
                binding: 0,
                format: vk::Format::R32G32_SFLOAT,
                offset: offset_of!(Self, position) as u32,
            },
            vk::VertexInputAttributeDescription {
                location: 1,
                binding: 0,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: offset_of!(Self, color) as u32,
            },
        ]
    }
}

/// Copy `data` into a new device-local buffer through a staging buffer.
///
/// `usage` is extended with `TRANSFER_DST`. The call blocks until the copy
/// has completed, after which the staging buffer is released. On failure no
/// buffer is left allocated.
pub fn upload_to_device_local<T: Pod>(
    allocator: &mut GpuAllocator,
    pool: &CommandPool,
    data: &[T],
    usage: vk::BufferUsageFlags,
    name: &str,
) -> Result<GpuBuffer> {
    let bytes: &[u8] = bytemuck::cast_slice(data);
    let buffer = stage_upload(allocator, bytes, usage, name, |src, dst, size| {
        copy_buffer(pool, src, dst, size)
    })?;
    tracing::debug!("Uploaded '{name}' ({} bytes) to device-local memory", bytes.len());
    Ok(buffer)
}

/// Buffer creation and release as used by a staged upload.
trait UploadAllocator {
    type Buffer;

    fn create(
        &mut self,
        size: u64,
        usage: vk::BufferUsageFlags,
        location: MemoryLocation,
        name: &str,
    ) -> Result<Self::Buffer>;
    fn fill(&mut self, buffer: &Self::Buffer, bytes: &[u8]) -> Result<()>;
    fn free(&mut self, buffer: &mut Self::Buffer) -> Result<()>;
}

impl UploadAllocator for GpuAllocator {
    type Buffer = GpuBuffer;

    fn create(
        &mut self,
        size: u64,
        usage: vk::BufferUsageFlags,
        location: MemoryLocation,
        name: &str,
    ) -> Result<GpuBuffer> {
        self.create_buffer(size, usage, location, name)
    }

    fn fill(&mut self, buffer: &GpuBuffer, bytes: &[u8]) -> Result<()> {
        buffer.write(bytes)
    }

    fn free(&mut self, buffer: &mut GpuBuffer) -> Result<()> {
        self.free_buffer(buffer)
    }
}

/// Fill a staging buffer, create the destination and run `copy` between them.
///
/// The staging buffer is always released. The destination is released when
/// the copy fails.
fn stage_upload<A, F>(
    allocator: &mut A,
    bytes: &[u8],
    usage: vk::BufferUsageFlags,
    name: &str,
    copy: F,
) -> Result<A::Buffer>
where
    A: UploadAllocator,
    F: FnOnce(&A::Buffer, &A::Buffer, u64) -> Result<()>,
{
    let size = bytes.len() as u64;
    let staging_name = format!("{name} staging");

    let mut staging = allocator.create(
        size,
        vk::BufferUsageFlags::TRANSFER_SRC,
        MemoryLocation::CpuToGpu,
        &staging_name,
    )?;

    let uploaded = allocator.fill(&staging, bytes).and_then(|()| {
        let mut buffer = allocator.create(
            size,
            usage | vk::BufferUsageFlags::TRANSFER_DST,
            MemoryLocation::GpuOnly,
            name,
        )?;
        match copy(&staging, &buffer, size) {
            Ok(()) => Ok(buffer),
            Err(e) => {
                release(&mut *allocator, &mut buffer, name);
                Err(e)
            }
        }
    });

    release(allocator, &mut staging, &staging_name);
    uploaded
}

fn release<A: UploadAllocator>(allocator: &mut A, buffer: &mut A::Buffer, name: &str) {
    if let Err(e) = allocator.free(buffer) {
        tracing::warn!("Failed to free buffer '{name}': {e}");
    }
}

fn copy_buffer(pool: &CommandPool, src: &GpuBuffer, dst: &GpuBuffer, size: u64) -> Result<()> {
    let region = vk::BufferCopy {
        src_offset: 0,
        dst_offset: 0,
        size,
    };
    execute_single_time_commands(pool, |device, cmd| unsafe {
        device.cmd_copy_buffer(cmd, src.buffer, dst.buffer, &[region]);
    })
}
