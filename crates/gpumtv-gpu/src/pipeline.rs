//! The attachment-less voxelization pipeline.
//!
//! The pipeline renders with Vulkan 1.3 dynamic rendering and no color or
//! depth attachments. Coverage leaves the fragment stage only through
//! storage image writes, so depth testing, blending and culling are all off.

use crate::error::{GpuError, Result};
use ash::vk;

/// Shaders and vertex layout of the voxelization program.
#[derive(Clone, Default)]
pub struct GraphicsPipelineConfig {
    pub vertex_shader: Vec<u32>,
    pub geometry_shader: Vec<u32>,
    pub fragment_shader: Vec<u32>,
    pub vertex_bindings: Vec<vk::VertexInputBindingDescription>,
    pub vertex_attributes: Vec<vk::VertexInputAttributeDescription>,
    /// Overestimate coverage; needs `VK_EXT_conservative_rasterization`
    pub conservative_rasterization: bool,
}

impl GraphicsPipelineConfig {
    /// Stage, code and label of each shader, in pipeline order.
    fn stages(&self) -> Result<[(vk::ShaderStageFlags, &[u32], &'static str); 3]> {
        let stages = [
            (vk::ShaderStageFlags::VERTEX, self.vertex_shader.as_slice(), "vertex"),
            (vk::ShaderStageFlags::GEOMETRY, self.geometry_shader.as_slice(), "geometry"),
            (vk::ShaderStageFlags::FRAGMENT, self.fragment_shader.as_slice(), "fragment"),
        ];
        if let Some((_, _, label)) = stages.iter().find(|(_, code, _)| code.is_empty()) {
            return Err(GpuError::PipelineCreation(format!("{label} shader has no code")));
        }
        Ok(stages)
    }
}

/// Shader modules destroyed when dropped, whether or not the pipeline
/// was created.
struct ShaderModules<'d> {
    device: &'d ash::Device,
    modules: Vec<vk::ShaderModule>,
}

impl<'d> ShaderModules<'d> {
    unsafe fn create(
        device: &'d ash::Device,
        stages: &[(vk::ShaderStageFlags, &[u32], &'static str)],
    ) -> Result<Self> {
        let mut created = Self {
            device,
            modules: Vec::with_capacity(stages.len()),
        };
        for (_, code, label) in stages {
            let info = vk::ShaderModuleCreateInfo::default().code(code);
            let module = device
                .create_shader_module(&info, None)
                .map_err(|e| GpuError::PipelineCreation(format!("{label} shader module: {e}")))?;
            created.modules.push(module);
        }
        Ok(created)
    }
}

impl Drop for ShaderModules<'_> {
    fn drop(&mut self) {
        for module in self.modules.drain(..) {
            unsafe { self.device.destroy_shader_module(module, None) };
        }
    }
}

/// Pipeline and layout, destroyed together.
pub struct GraphicsPipeline {
    pub pipeline: vk::Pipeline,
    pub layout: vk::PipelineLayout,
}

impl GraphicsPipeline {
    /// A pipeline owning nothing; destroying it is a no-op.
    pub const fn null() -> Self {
        Self {
            pipeline: vk::Pipeline::null(),
            layout: vk::PipelineLayout::null(),
        }
    }

    /// # Safety
    /// The device must be valid and shader code must be valid SPIR-V.
    pub unsafe fn new(
        device: &ash::Device,
        config: &GraphicsPipelineConfig,
        set_layouts: &[vk::DescriptorSetLayout],
        push_constant_ranges: &[vk::PushConstantRange],
    ) -> Result<Self> {
        let stages = config.stages()?;
        let modules = ShaderModules::create(device, &stages)?;
        let stage_infos: Vec<_> = stages
            .iter()
            .zip(&modules.modules)
            .map(|((stage, _, _), module)| {
                vk::PipelineShaderStageCreateInfo::default()
                    .stage(*stage)
                    .module(*module)
                    .name(c"main")
            })
            .collect();

        let vertex_input = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&config.vertex_bindings)
            .vertex_attribute_descriptions(&config.vertex_attributes);
        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST);
        // Viewport and scissor are set per sector
        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewport_count(1)
            .scissor_count(1);

        let mut conservative = vk::PipelineRasterizationConservativeStateCreateInfoEXT::default()
            .conservative_rasterization_mode(vk::ConservativeRasterizationModeEXT::OVERESTIMATE);
        let mut rasterization = vk::PipelineRasterizationStateCreateInfo::default()
            .polygon_mode(vk::PolygonMode::FILL)
            .cull_mode(vk::CullModeFlags::NONE)
            .front_face(vk::FrontFace::COUNTER_CLOCKWISE)
            .line_width(1.0);
        if config.conservative_rasterization {
            rasterization = rasterization.push_next(&mut conservative);
        }

        let multisample = vk::PipelineMultisampleStateCreateInfo::default()
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);
        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::default();
        let color_blend = vk::PipelineColorBlendStateCreateInfo::default();
        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state =
            vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

        let layout_info = vk::PipelineLayoutCreateInfo::default()
            .set_layouts(set_layouts)
            .push_constant_ranges(push_constant_ranges);
        let layout = device
            .create_pipeline_layout(&layout_info, None)
            .map_err(|e| GpuError::PipelineCreation(format!("pipeline layout: {e}")))?;

        let mut rendering = vk::PipelineRenderingCreateInfo::default();
        let info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&stage_infos)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization)
            .multisample_state(&multisample)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blend)
            .dynamic_state(&dynamic_state)
            .layout(layout)
            .push_next(&mut rendering);

        match device.create_graphics_pipelines(vk::PipelineCache::null(), &[info], None) {
            Ok(pipelines) => Ok(Self {
                pipeline: pipelines[0],
                layout,
            }),
            Err((_, e)) => {
                device.destroy_pipeline_layout(layout, None);
                Err(GpuError::PipelineCreation(e.to_string()))
            }
        }
    }

    /// # Safety
    /// The device must be valid and the pipeline must not be in use.
    pub unsafe fn destroy(&self, device: &ash::Device) {
        device.destroy_pipeline(self.pipeline, None);
        device.destroy_pipeline_layout(self.layout, None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stages_come_in_pipeline_order() {
        let config = GraphicsPipelineConfig {
            vertex_shader: vec![1],
            geometry_shader: vec![2],
            fragment_shader: vec![3],
            ..Default::default()
        };
        let stages = config.stages().unwrap();
        assert_eq!(stages[0].0, vk::ShaderStageFlags::VERTEX);
        assert_eq!(stages[1].0, vk::ShaderStageFlags::GEOMETRY);
        assert_eq!(stages[2].1, &[3]);
    }

    #[test]
    fn missing_shader_code_is_named() {
        let config = GraphicsPipelineConfig {
            vertex_shader: vec![1],
            fragment_shader: vec![3],
            ..Default::default()
        };
        let err = config.stages().err().unwrap();
        assert!(err.to_string().contains("geometry shader"));
    }
}
