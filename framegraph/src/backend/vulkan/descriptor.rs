//! Binding tables: one descriptor pool and set per pass and frame slot.
//!
//! Tables are rebuilt only when a graph is recompiled, so a dedicated pool
//! sized exactly to the layout keeps allocation trivially correct.

use ash::vk;

use crate::backend::BoundResource;
use crate::compiler::{BindingKind, BindingLayout};
use crate::error::GraphicsError;

use super::conversion::convert_binding_kind;
use super::pipeline::VulkanPipeline;
use super::VulkanBackend;

/// A descriptor set and the pool it came from. Both are null for passes
/// that bind no resources.
#[derive(Debug, Clone, Copy)]
pub struct VulkanBindingTable {
    pub(crate) pool: vk::DescriptorPool,
    pub(crate) set: vk::DescriptorSet,
}

impl VulkanBindingTable {
    pub(crate) fn is_empty(&self) -> bool {
        self.set == vk::DescriptorSet::null()
    }
}

pub fn create_binding_table(
    device: &ash::Device,
    pipeline: VulkanPipeline,
    layout: &BindingLayout,
    resources: &[BoundResource<'_, VulkanBackend>],
) -> Result<VulkanBindingTable, GraphicsError> {
    if resources.len() != layout.len() {
        return Err(GraphicsError::InvalidParameter(format!(
            "Binding table expects {} resources, got {}",
            layout.len(),
            resources.len()
        )));
    }
    if layout.is_empty() {
        return Ok(VulkanBindingTable {
            pool: vk::DescriptorPool::null(),
            set: vk::DescriptorSet::null(),
        });
    }

    let pool_sizes = pool_sizes(layout);
    let pool_info = vk::DescriptorPoolCreateInfo::default()
        .max_sets(1)
        .pool_sizes(&pool_sizes);
    let pool = unsafe { device.create_descriptor_pool(&pool_info, None) }.map_err(|e| {
        GraphicsError::ResourceCreationFailed(format!("Failed to create descriptor pool: {e:?}"))
    })?;

    let set_layouts = [pipeline.set_layout];
    let alloc_info = vk::DescriptorSetAllocateInfo::default()
        .descriptor_pool(pool)
        .set_layouts(&set_layouts);
    let set = match unsafe { device.allocate_descriptor_sets(&alloc_info) }
        .ok()
        .and_then(|sets| sets.into_iter().next())
    {
        Some(set) => set,
        None => {
            unsafe { device.destroy_descriptor_pool(pool, None) };
            return Err(GraphicsError::ResourceCreationFailed(
                "Failed to allocate descriptor set".to_string(),
            ));
        }
    };

    // Infos are collected first so the writes can borrow them.
    let mut buffer_infos = Vec::new();
    let mut image_infos = Vec::new();
    for resource in resources {
        match resource {
            BoundResource::Buffer(buffer) => buffer_infos.push([vk::DescriptorBufferInfo {
                buffer: buffer.buffer,
                offset: 0,
                range: vk::WHOLE_SIZE,
            }]),
            BoundResource::Texture(texture) => image_infos.push([vk::DescriptorImageInfo {
                sampler: vk::Sampler::null(),
                image_view: texture.view,
                image_layout: vk::ImageLayout::GENERAL,
            }]),
        }
    }

    let mut next_buffer = buffer_infos.iter();
    let mut next_image = image_infos.iter();
    let mut writes = Vec::with_capacity(resources.len());
    for (slot, resource) in layout.slots().iter().zip(resources) {
        let write = vk::WriteDescriptorSet::default()
            .dst_set(set)
            .dst_binding(slot.binding)
            .descriptor_type(convert_binding_kind(slot.kind));
        let write = match (resource, slot.kind) {
            (
                BoundResource::Buffer(_),
                BindingKind::UniformBuffer | BindingKind::StorageBuffer,
            ) => next_buffer.next().map(|info| write.buffer_info(info)),
            (
                BoundResource::Texture(_),
                BindingKind::SampledTexture | BindingKind::StorageTexture,
            ) => next_image.next().map(|info| write.image_info(info)),
            _ => None,
        };
        match write {
            Some(write) => writes.push(write),
            None => {
                unsafe { device.destroy_descriptor_pool(pool, None) };
                return Err(GraphicsError::InvalidParameter(format!(
                    "Binding {} expects a {:?}",
                    slot.binding, slot.kind
                )));
            }
        }
    }

    unsafe { device.update_descriptor_sets(&writes, &[]) };
    Ok(VulkanBindingTable { pool, set })
}

pub fn destroy_binding_table(device: &ash::Device, table: VulkanBindingTable) {
    if table.pool != vk::DescriptorPool::null() {
        // Freeing the pool frees its set.
        unsafe { device.destroy_descriptor_pool(table.pool, None) };
    }
}

fn pool_sizes(layout: &BindingLayout) -> Vec<vk::DescriptorPoolSize> {
    let mut sizes: Vec<vk::DescriptorPoolSize> = Vec::new();
    for slot in layout.slots() {
        let ty = convert_binding_kind(slot.kind);
        match sizes.iter_mut().find(|size| size.ty == ty) {
            Some(size) => size.descriptor_count += 1,
            None => sizes.push(vk::DescriptorPoolSize {
                ty,
                descriptor_count: 1,
            }),
        }
    }
    sizes
}
