//! Graphics pipeline creation.

use crate::device::LogicalDevice;
use crate::error::{GpuError, Result};
use ash::vk;
use std::sync::Arc;

/// How fragment output is combined with the attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendMode {
    /// Overwrite the attachment.
    Opaque,
    /// Standard `src * a + dst * (1 - a)` blending.
    Alpha,
}

impl BlendMode {
    fn attachment_state(self) -> vk::PipelineColorBlendAttachmentState {
        let state = vk::PipelineColorBlendAttachmentState::default()
            .color_write_mask(vk::ColorComponentFlags::RGBA);

        match self {
            Self::Opaque => state.blend_enable(false),
            Self::Alpha => state
                .blend_enable(true)
                .src_color_blend_factor(vk::BlendFactor::SRC_ALPHA)
                .dst_color_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
                .color_blend_op(vk::BlendOp::ADD)
                .src_alpha_blend_factor(vk::BlendFactor::ONE)
                .dst_alpha_blend_factor(vk::BlendFactor::ZERO)
                .alpha_blend_op(vk::BlendOp::ADD),
        }
    }
}

/// Graphics pipeline configuration.
#[derive(Clone)]
pub struct GraphicsPipelineConfig {
    pub vertex_shader: Vec<u32>,
    pub fragment_shader: Vec<u32>,
    pub vertex_bindings: Vec<vk::VertexInputBindingDescription>,
    pub vertex_attributes: Vec<vk::VertexInputAttributeDescription>,
    pub topology: vk::PrimitiveTopology,
    pub polygon_mode: vk::PolygonMode,
    pub cull_mode: vk::CullModeFlags,
    pub front_face: vk::FrontFace,
    pub blend: BlendMode,
    pub color_format: vk::Format,
}

impl Default for GraphicsPipelineConfig {
    fn default() -> Self {
        Self {
            vertex_shader: Vec::new(),
            fragment_shader: Vec::new(),
            vertex_bindings: Vec::new(),
            vertex_attributes: Vec::new(),
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            polygon_mode: vk::PolygonMode::FILL,
            cull_mode: vk::CullModeFlags::BACK,
            front_face: vk::FrontFace::CLOCKWISE,
            blend: BlendMode::Alpha,
            color_format: vk::Format::B8G8R8A8_SRGB,
        }
    }
}

/// Graphics pipeline targeting a single color attachment through dynamic
/// rendering. Viewport and scissor are dynamic state.
pub struct GraphicsPipeline {
    pipeline: vk::Pipeline,
    layout: vk::PipelineLayout,
    device: Arc<LogicalDevice>,
}

impl GraphicsPipeline {
    /// Create a graphics pipeline.
    ///
    /// Shader code must be valid SPIR-V; an invalid module is reported as
    /// [`GpuError::ShaderModule`].
    pub fn new(
        device: Arc<LogicalDevice>,
        config: &GraphicsPipelineConfig,
        push_constant_ranges: &[vk::PushConstantRange],
    ) -> Result<Self> {
        let raw = device.raw();

        let vert_module = unsafe { create_shader_module(raw, &config.vertex_shader, "Vertex")? };
        let frag_module =
            match unsafe { create_shader_module(raw, &config.fragment_shader, "Fragment") } {
                Ok(module) => module,
                Err(e) => {
                    unsafe { raw.destroy_shader_module(vert_module, None) };
                    return Err(e);
                }
            };

        let result = unsafe {
            create_pipeline(raw, config, vert_module, frag_module, push_constant_ranges)
        };

        // Modules are only needed during creation
        unsafe {
            raw.destroy_shader_module(vert_module, None);
            raw.destroy_shader_module(frag_module, None);
        }

        let (pipeline, layout) = result?;
        tracing::debug!(
            "Created graphics pipeline for {:?} ({:?} blending)",
            config.color_format,
            config.blend
        );

        Ok(Self {
            pipeline,
            layout,
            device,
        })
    }

    /// Get the raw pipeline handle.
    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }

    /// Get the pipeline layout.
    pub fn layout(&self) -> vk::PipelineLayout {
        self.layout
    }
}

impl Drop for GraphicsPipeline {
    fn drop(&mut self) {
        unsafe {
            let device = self.device.raw();
            device.destroy_pipeline(self.pipeline, None);
            device.destroy_pipeline_layout(self.layout, None);
        }
    }
}

unsafe fn create_shader_module(
    device: &ash::Device,
    code: &[u32],
    stage: &str,
) -> Result<vk::ShaderModule> {
    if code.is_empty() {
        return Err(GpuError::ShaderModule(format!("{stage}: empty SPIR-V")));
    }

    let info = vk::ShaderModuleCreateInfo::default().code(code);
    device
        .create_shader_module(&info, None)
        .map_err(|e| GpuError::ShaderModule(format!("{stage}: {e}")))
}

unsafe fn create_pipeline(
    device: &ash::Device,
    config: &GraphicsPipelineConfig,
    vert_module: vk::ShaderModule,
    frag_module: vk::ShaderModule,
    push_constant_ranges: &[vk::PushConstantRange],
) -> Result<(vk::Pipeline, vk::PipelineLayout)> {
    let shader_stages = [
        vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::VERTEX)
            .module(vert_module)
            .name(c"main"),
        vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::FRAGMENT)
            .module(frag_module)
            .name(c"main"),
    ];

    let vertex_input = vk::PipelineVertexInputStateCreateInfo::default()
        .vertex_binding_descriptions(&config.vertex_bindings)
        .vertex_attribute_descriptions(&config.vertex_attributes);

    let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
        .topology(config.topology)
        .primitive_restart_enable(false);

    // Viewport (dynamic)
    let viewport_state = vk::PipelineViewportStateCreateInfo::default()
        .viewport_count(1)
        .scissor_count(1);

    let rasterization = vk::PipelineRasterizationStateCreateInfo::default()
        .depth_clamp_enable(false)
        .rasterizer_discard_enable(false)
        .polygon_mode(config.polygon_mode)
        .cull_mode(config.cull_mode)
        .front_face(config.front_face)
        .depth_bias_enable(false)
        .line_width(1.0);

    let multisampling = vk::PipelineMultisampleStateCreateInfo::default()
        .rasterization_samples(vk::SampleCountFlags::TYPE_1)
        .sample_shading_enable(false);

    let color_blend_attachments = [config.blend.attachment_state()];
    let color_blending = vk::PipelineColorBlendStateCreateInfo::default()
        .logic_op_enable(false)
        .attachments(&color_blend_attachments);

    let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
    let dynamic_state =
        vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

    let layout_info =
        vk::PipelineLayoutCreateInfo::default().push_constant_ranges(push_constant_ranges);
    let layout = device
        .create_pipeline_layout(&layout_info, None)
        .map_err(|e| GpuError::PipelineCreation(e.to_string()))?;

    let color_formats = [config.color_format];
    let mut rendering_info =
        vk::PipelineRenderingCreateInfo::default().color_attachment_formats(&color_formats);

    let pipeline_info = vk::GraphicsPipelineCreateInfo::default()
        .stages(&shader_stages)
        .vertex_input_state(&vertex_input)
        .input_assembly_state(&input_assembly)
        .viewport_state(&viewport_state)
        .rasterization_state(&rasterization)
        .multisample_state(&multisampling)
        .color_blend_state(&color_blending)
        .dynamic_state(&dynamic_state)
        .layout(layout)
        .push_next(&mut rendering_info);

    match device.create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None) {
        Ok(pipelines) => match pipelines.first() {
            Some(&pipeline) => Ok((pipeline, layout)),
            None => {
                device.destroy_pipeline_layout(layout, None);
                Err(GpuError::PipelineCreation(
                    "driver returned no pipeline".to_string(),
                ))
            }
        },
        Err((_pipelines, e)) => {
            device.destroy_pipeline_layout(layout, None);
            Err(GpuError::PipelineCreation(e.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_triangle_rendering() {
        let config = GraphicsPipelineConfig::default();
        assert_eq!(config.topology, vk::PrimitiveTopology::TRIANGLE_LIST);
        assert_eq!(config.cull_mode, vk::CullModeFlags::BACK);
        assert_eq!(config.front_face, vk::FrontFace::CLOCKWISE);
        assert_eq!(config.blend, BlendMode::Alpha);
    }

    #[test]
    fn alpha_blend_state() {
        let state = BlendMode::Alpha.attachment_state();
        assert_eq!(state.blend_enable, vk::TRUE);
        assert_eq!(state.src_color_blend_factor, vk::BlendFactor::SRC_ALPHA);
        assert_eq!(
            state.dst_color_blend_factor,
            vk::BlendFactor::ONE_MINUS_SRC_ALPHA
        );
        assert_eq!(state.color_write_mask, vk::ColorComponentFlags::RGBA);
    }

    #[test]
    fn opaque_blend_state() {
        let state = BlendMode::Opaque.attachment_state();
        assert_eq!(state.blend_enable, vk::FALSE);
        assert_eq!(state.color_write_mask, vk::ColorComponentFlags::RGBA);
    }
}
