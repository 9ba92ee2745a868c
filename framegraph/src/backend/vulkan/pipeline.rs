//! Pipeline objects built from a pass's [`PipelineDescription`].
//!
//! Every pipeline owns its set-0 descriptor layout and its pipeline layout;
//! viewport and scissor are dynamic so the same pipeline serves any extent.

use std::ffi::CString;

use ash::vk;

use crate::compiler::{AttachmentFormats, BindingLayout};
use crate::error::GraphicsError;
use crate::graph::{PipelineDescription, PipelineKind, ShaderBinary};
use crate::types::ShaderStage;

use super::conversion::{
    convert_bind_point, convert_binding_kind, convert_cull_mode, convert_input_rate,
    convert_shader_stage, convert_shader_stages, convert_texture_format, convert_topology,
    convert_vertex_format,
};

/// A pipeline together with the layouts it was built against.
#[derive(Debug, Clone, Copy)]
pub struct VulkanPipeline {
    pub(crate) pipeline: vk::Pipeline,
    pub(crate) layout: vk::PipelineLayout,
    pub(crate) set_layout: vk::DescriptorSetLayout,
    pub(crate) bind_point: vk::PipelineBindPoint,
}

pub fn create_pipeline(
    device: &ash::Device,
    description: &PipelineDescription,
    layout: &BindingLayout,
    formats: &AttachmentFormats,
) -> Result<VulkanPipeline, GraphicsError> {
    let set_layout = create_set_layout(device, layout)?;

    let pipeline_layout = match create_pipeline_layout(device, description, set_layout) {
        Ok(pipeline_layout) => pipeline_layout,
        Err(e) => {
            unsafe { device.destroy_descriptor_set_layout(set_layout, None) };
            return Err(e);
        }
    };

    let pipeline = match description.kind() {
        PipelineKind::Graphics => {
            create_graphics_pipeline(device, description, pipeline_layout, formats)
        }
        PipelineKind::Compute => create_compute_pipeline(device, description, pipeline_layout),
    };

    match pipeline {
        Ok(pipeline) => Ok(VulkanPipeline {
            pipeline,
            layout: pipeline_layout,
            set_layout,
            bind_point: convert_bind_point(description.kind()),
        }),
        Err(e) => {
            unsafe {
                device.destroy_pipeline_layout(pipeline_layout, None);
                device.destroy_descriptor_set_layout(set_layout, None);
            }
            Err(e)
        }
    }
}

pub fn destroy_pipeline(device: &ash::Device, pipeline: VulkanPipeline) {
    unsafe {
        device.destroy_pipeline(pipeline.pipeline, None);
        device.destroy_pipeline_layout(pipeline.layout, None);
        device.destroy_descriptor_set_layout(pipeline.set_layout, None);
    }
}

fn create_set_layout(
    device: &ash::Device,
    layout: &BindingLayout,
) -> Result<vk::DescriptorSetLayout, GraphicsError> {
    let bindings: Vec<vk::DescriptorSetLayoutBinding> = layout
        .slots()
        .iter()
        .map(|slot| {
            vk::DescriptorSetLayoutBinding::default()
                .binding(slot.binding)
                .descriptor_type(convert_binding_kind(slot.kind))
                .descriptor_count(1)
                .stage_flags(convert_shader_stages(slot.stages))
        })
        .collect();

    let create_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&bindings);
    unsafe { device.create_descriptor_set_layout(&create_info, None) }.map_err(|e| {
        GraphicsError::ResourceCreationFailed(format!(
            "Failed to create descriptor set layout: {e:?}"
        ))
    })
}

fn create_pipeline_layout(
    device: &ash::Device,
    description: &PipelineDescription,
    set_layout: vk::DescriptorSetLayout,
) -> Result<vk::PipelineLayout, GraphicsError> {
    let push_constant_ranges: Vec<vk::PushConstantRange> = description
        .push_constants()
        .iter()
        .map(|range| {
            vk::PushConstantRange::default()
                .stage_flags(convert_shader_stages(range.stages))
                .offset(0)
                .size(range.size)
        })
        .collect();

    let set_layouts = [set_layout];
    let create_info = vk::PipelineLayoutCreateInfo::default()
        .set_layouts(&set_layouts)
        .push_constant_ranges(&push_constant_ranges);

    unsafe { device.create_pipeline_layout(&create_info, None) }.map_err(|e| {
        GraphicsError::ResourceCreationFailed(format!("Failed to create pipeline layout: {e:?}"))
    })
}

/// Shader modules created for one pipeline; destroyed once the pipeline
/// exists.
struct ShaderModules<'a> {
    device: &'a ash::Device,
    modules: Vec<(ShaderStage, vk::ShaderModule, CString)>,
}

impl<'a> ShaderModules<'a> {
    fn new(device: &'a ash::Device, shaders: &[ShaderBinary]) -> Result<Self, GraphicsError> {
        let mut modules = Self {
            device,
            modules: Vec::with_capacity(shaders.len()),
        };
        for shader in shaders {
            let entry = CString::new(shader.entry_point.as_str()).map_err(|e| {
                GraphicsError::InvalidParameter(format!(
                    "Invalid {:?} entry point name: {e}",
                    shader.stage
                ))
            })?;
            let create_info = vk::ShaderModuleCreateInfo::default().code(&shader.code);
            let module = unsafe { device.create_shader_module(&create_info, None) }.map_err(|e| {
                GraphicsError::ResourceCreationFailed(format!(
                    "Failed to create {:?} shader module: {e:?}",
                    shader.stage
                ))
            })?;
            modules.modules.push((shader.stage, module, entry));
        }
        Ok(modules)
    }

    fn stage_infos(&self) -> Vec<vk::PipelineShaderStageCreateInfo<'_>> {
        self.modules
            .iter()
            .map(|(stage, module, entry)| {
                vk::PipelineShaderStageCreateInfo::default()
                    .stage(convert_shader_stage(*stage))
                    .module(*module)
                    .name(entry)
            })
            .collect()
    }
}

impl Drop for ShaderModules<'_> {
    fn drop(&mut self) {
        for (_, module, _) in self.modules.drain(..) {
            unsafe { self.device.destroy_shader_module(module, None) };
        }
    }
}

fn create_compute_pipeline(
    device: &ash::Device,
    description: &PipelineDescription,
    layout: vk::PipelineLayout,
) -> Result<vk::Pipeline, GraphicsError> {
    if description.shader(ShaderStage::Compute).is_none() {
        return Err(GraphicsError::InvalidParameter(
            "Compute pipeline has no compute shader".to_string(),
        ));
    }

    let modules = ShaderModules::new(device, description.shaders())?;
    let stages = modules.stage_infos();
    let create_info = vk::ComputePipelineCreateInfo::default()
        .stage(stages[0])
        .layout(layout);

    let pipelines = unsafe {
        device.create_compute_pipelines(vk::PipelineCache::null(), &[create_info], None)
    }
    .map_err(|(_, e)| {
        GraphicsError::ResourceCreationFailed(format!("Failed to create compute pipeline: {e:?}"))
    })?;

    pipelines
        .into_iter()
        .next()
        .ok_or_else(|| GraphicsError::Internal("Driver returned no compute pipeline".to_string()))
}

fn create_graphics_pipeline(
    device: &ash::Device,
    description: &PipelineDescription,
    layout: vk::PipelineLayout,
    formats: &AttachmentFormats,
) -> Result<vk::Pipeline, GraphicsError> {
    if description.shader(ShaderStage::Vertex).is_none() {
        return Err(GraphicsError::InvalidParameter(
            "Graphics pipeline has no vertex shader".to_string(),
        ));
    }

    let modules = ShaderModules::new(device, description.shaders())?;
    let stages = modules.stage_infos();

    let binding_descriptions: Vec<vk::VertexInputBindingDescription> = description
        .vertex_streams()
        .iter()
        .enumerate()
        .map(|(binding, stream)| {
            vk::VertexInputBindingDescription::default()
                .binding(binding as u32)
                .stride(stream.stride)
                .input_rate(convert_input_rate(stream.input_rate))
        })
        .collect();

    let attribute_descriptions: Vec<vk::VertexInputAttributeDescription> = description
        .vertex_streams()
        .iter()
        .enumerate()
        .flat_map(|(binding, stream)| {
            stream.attributes.iter().map(move |attribute| {
                vk::VertexInputAttributeDescription::default()
                    .location(attribute.location)
                    .binding(binding as u32)
                    .format(convert_vertex_format(attribute.format))
                    .offset(attribute.offset)
            })
        })
        .collect();

    let vertex_input_state = vk::PipelineVertexInputStateCreateInfo::default()
        .vertex_binding_descriptions(&binding_descriptions)
        .vertex_attribute_descriptions(&attribute_descriptions);

    let input_assembly_state = vk::PipelineInputAssemblyStateCreateInfo::default()
        .topology(convert_topology(description.topology()))
        .primitive_restart_enable(false);

    let viewport_state = vk::PipelineViewportStateCreateInfo::default()
        .viewport_count(1)
        .scissor_count(1);

    let rasterization_state = vk::PipelineRasterizationStateCreateInfo::default()
        .polygon_mode(vk::PolygonMode::FILL)
        .line_width(1.0)
        .cull_mode(convert_cull_mode(description.cull_mode()))
        .front_face(vk::FrontFace::COUNTER_CLOCKWISE);

    let multisample_state = vk::PipelineMultisampleStateCreateInfo::default()
        .rasterization_samples(vk::SampleCountFlags::TYPE_1);

    let depth_enabled = description.depth_test() && formats.depth.is_some();
    let depth_stencil_state = vk::PipelineDepthStencilStateCreateInfo::default()
        .depth_test_enable(depth_enabled)
        .depth_write_enable(depth_enabled)
        .depth_compare_op(vk::CompareOp::LESS_OR_EQUAL);

    let color_blend_attachments: Vec<vk::PipelineColorBlendAttachmentState> = formats
        .colors
        .iter()
        .map(|_| {
            vk::PipelineColorBlendAttachmentState::default()
                .color_write_mask(vk::ColorComponentFlags::RGBA)
                .blend_enable(false)
        })
        .collect();
    let color_blend_state =
        vk::PipelineColorBlendStateCreateInfo::default().attachments(&color_blend_attachments);

    let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
    let dynamic_state =
        vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

    let color_formats: Vec<vk::Format> = formats
        .colors
        .iter()
        .map(|format| convert_texture_format(*format))
        .collect();
    let depth_format = formats
        .depth
        .map(convert_texture_format)
        .unwrap_or(vk::Format::UNDEFINED);
    let stencil_format = match formats.depth {
        Some(format) if format.has_stencil() => depth_format,
        _ => vk::Format::UNDEFINED,
    };

    let mut rendering_info = vk::PipelineRenderingCreateInfo::default()
        .color_attachment_formats(&color_formats)
        .depth_attachment_format(depth_format)
        .stencil_attachment_format(stencil_format);

    let create_info = vk::GraphicsPipelineCreateInfo::default()
        .stages(&stages)
        .vertex_input_state(&vertex_input_state)
        .input_assembly_state(&input_assembly_state)
        .viewport_state(&viewport_state)
        .rasterization_state(&rasterization_state)
        .multisample_state(&multisample_state)
        .depth_stencil_state(&depth_stencil_state)
        .color_blend_state(&color_blend_state)
        .dynamic_state(&dynamic_state)
        .layout(layout)
        .push_next(&mut rendering_info);

    let pipelines = unsafe {
        device.create_graphics_pipelines(vk::PipelineCache::null(), &[create_info], None)
    }
    .map_err(|(_, e)| {
        GraphicsError::ResourceCreationFailed(format!("Failed to create graphics pipeline: {e:?}"))
    })?;

    pipelines
        .into_iter()
        .next()
        .ok_or_else(|| GraphicsError::Internal("Driver returned no graphics pipeline".to_string()))
}
