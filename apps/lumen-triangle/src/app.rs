//! Triangle application.

use ash::vk;
use glam::{Vec2, Vec3};
use lumen_app::{AppContext, FrameContext, LumenApp};
use lumen_gpu::{GpuBuffer, GraphicsPipeline, GraphicsPipelineConfig, Vertex};

/// Clockwise in framebuffer space (y points down).
const VERTICES: [Vertex; 3] = [
    Vertex::new(Vec2::new(0.0, -0.5), Vec3::new(1.0, 0.0, 0.0)),
    Vertex::new(Vec2::new(0.5, 0.5), Vec3::new(0.0, 1.0, 0.0)),
    Vertex::new(Vec2::new(-0.5, 0.5), Vec3::new(0.0, 0.0, 1.0)),
];

const INDICES: [u16; 3] = [0, 1, 2];

pub struct Triangle {
    pipeline: GraphicsPipeline,
    vertex_buffer: GpuBuffer,
    index_buffer: GpuBuffer,
}

impl LumenApp for Triangle {
    fn init(ctx: &mut AppContext) -> anyhow::Result<Self> {
        let config = GraphicsPipelineConfig {
            vertex_shader: lumen_shaders::triangle_vertex_shader().to_vec(),
            fragment_shader: lumen_shaders::triangle_fragment_shader().to_vec(),
            vertex_bindings: vec![Vertex::binding_description()],
            vertex_attributes: Vertex::attribute_descriptions().to_vec(),
            color_format: ctx.color_format(),
            ..Default::default()
        };
        let pipeline = GraphicsPipeline::new(ctx.device().clone(), &config, &[])?;

        let vertex_buffer = ctx.render.upload_buffer(
            &VERTICES,
            vk::BufferUsageFlags::VERTEX_BUFFER,
            "triangle vertices",
        )?;
        let index_buffer = ctx.render.upload_buffer(
            &INDICES,
            vk::BufferUsageFlags::INDEX_BUFFER,
            "triangle indices",
        )?;

        tracing::info!(
            "Triangle ready: {} vertices, {} indices",
            VERTICES.len(),
            INDICES.len()
        );

        Ok(Self {
            pipeline,
            vertex_buffer,
            index_buffer,
        })
    }

    fn update(&mut self, _ctx: &AppContext, _dt: f32) {}

    fn render(&mut self, frame: &mut FrameContext) -> anyhow::Result<()> {
        let device = frame.device;
        let cmd = frame.command_buffer;

        unsafe {
            device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, self.pipeline.handle());
            device.cmd_bind_vertex_buffers(cmd, 0, &[self.vertex_buffer.buffer], &[0]);
            device.cmd_bind_index_buffer(cmd, self.index_buffer.buffer, 0, vk::IndexType::UINT16);
            device.cmd_draw_indexed(cmd, INDICES.len() as u32, 1, 0, 0, 0);
        }

        Ok(())
    }

    fn cleanup(&mut self, ctx: &mut AppContext) {
        for buffer in [&mut self.vertex_buffer, &mut self.index_buffer] {
            if let Err(e) = ctx.render.free_buffer(buffer) {
                tracing::error!("Failed to free buffer: {e}");
            }
        }
    }
}
