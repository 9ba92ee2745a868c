//! Vulkan backend built on ash.
//!
//! Uses dynamic rendering and synchronization2 throughout: there are no
//! render passes or framebuffers, and barriers are `*2` structures.
//!
//! Layout model:
//! - offscreen textures live in `GENERAL` for their whole life; the frame
//!   graph orders passes with full memory barriers, so per-image layout
//!   tracking is unnecessary
//! - swapchain images move `UNDEFINED`/`PRESENT_SRC` to
//!   `COLOR_ATTACHMENT_OPTIMAL` at [`Backend::begin_rendering`] and back to
//!   `PRESENT_SRC` at [`Backend::end_rendering`]
//!
//! When the device has a compute-only queue family, buffers and textures are
//! created with `CONCURRENT` sharing so both queues can use them without
//! ownership transfers.

mod allocator;
mod command;
mod conversion;
mod debug;
mod descriptor;
mod device;
mod instance;
mod pipeline;
mod swapchain;

use std::collections::HashMap;

use ash::vk;
use gpu_allocator::vulkan::{Allocation, Allocator};

use crate::compiler::{AttachmentFormats, BindingLayout};
use crate::config::RendererConfig;
use crate::error::GraphicsError;
use crate::graph::PipelineDescription;
use crate::swapchain::{PresentMode, Window};
use crate::types::{
    BufferDescriptor, Extent2d, IndexFormat, PerQueue, QueueAffinity, ShaderStages,
    TextureDescriptor,
};

use super::{
    AcquireOutcome, AttachmentImage, Backend, BoundResource, PresentOutcome, PresentRequest,
    RenderingAttachment, RenderingInfo, Submission, SurfaceInfo,
};

use conversion::{
    aspect_mask, convert_buffer_usage, convert_extent, convert_index_format,
    convert_load_op_color, convert_load_op_depth, convert_present_mode, convert_shader_stages,
    convert_texture_format, convert_texture_usage, convert_wait_stage,
};
use device::QueueFamilies;
use swapchain::{SurfaceState, SwapchainContext};

pub use descriptor::VulkanBindingTable;
pub use pipeline::VulkanPipeline;

/// Map a raw Vulkan error onto the crate's error type.
pub(crate) fn map_vk_error(e: vk::Result) -> GraphicsError {
    match e {
        vk::Result::ERROR_DEVICE_LOST => GraphicsError::DeviceLost,
        vk::Result::ERROR_OUT_OF_HOST_MEMORY | vk::Result::ERROR_OUT_OF_DEVICE_MEMORY => {
            GraphicsError::OutOfMemory
        }
        other => GraphicsError::SubmissionFailed(format!("{other:?}")),
    }
}

fn released_allocator() -> GraphicsError {
    GraphicsError::Internal("Allocator already released".to_string())
}

/// Host-visible buffer with a persistent mapping.
#[derive(Debug)]
pub struct VulkanBuffer {
    buffer: vk::Buffer,
    allocation: Option<Allocation>,
    size: u64,
}

/// 2D image with a single view, kept in `GENERAL` layout.
#[derive(Debug)]
pub struct VulkanTexture {
    image: vk::Image,
    view: vk::ImageView,
    allocation: Option<Allocation>,
    aspect: vk::ImageAspectFlags,
}

/// Primary command buffer and the queue whose pool owns it.
#[derive(Debug, Clone, Copy)]
pub struct VulkanCommandBuffer {
    buffer: vk::CommandBuffer,
    queue: QueueAffinity,
}

/// Identifier of a window surface owned by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VulkanSurface(u32);

/// Vulkan implementation of [`Backend`].
pub struct VulkanBackend {
    // Kept alive for the loader's function pointers.
    entry: ash::Entry,
    instance: ash::Instance,
    debug_utils: Option<ash::ext::debug_utils::Instance>,
    debug_messenger: Option<vk::DebugUtilsMessengerEXT>,
    physical_device: vk::PhysicalDevice,
    device: ash::Device,
    families: QueueFamilies,
    queues: PerQueue<vk::Queue>,
    command_pools: PerQueue<vk::CommandPool>,
    // `None` only while dropping; the allocator must go before the device.
    allocator: Option<Allocator>,
    dynamic_rendering: ash::khr::dynamic_rendering::Device,
    synchronization2: ash::khr::synchronization2::Device,
    surface_loader: ash::khr::surface::Instance,
    swapchain_loader: ash::khr::swapchain::Device,
    surfaces: HashMap<VulkanSurface, SurfaceState>,
    next_surface: u32,
}

impl VulkanBackend {
    /// Create the instance, pick a device and open its graphics and compute
    /// queues.
    pub fn new(config: &RendererConfig) -> Result<Self, GraphicsError> {
        let entry = unsafe { ash::Entry::load() }.map_err(|e| {
            GraphicsError::InitializationFailed(format!("Failed to load Vulkan library: {e}"))
        })?;

        let bundle =
            instance::create_instance(&entry, &config.application_name, config.validation)?;
        let instance = bundle.instance;

        let destroy_instance = |instance: &ash::Instance| unsafe {
            if let (Some(utils), Some(messenger)) = (&bundle.debug_utils, bundle.debug_messenger) {
                utils.destroy_debug_utils_messenger(messenger, None);
            }
            instance.destroy_instance(None);
        };

        let (physical_device, families) = match device::select_physical_device(&instance) {
            Ok(selected) => selected,
            Err(e) => {
                destroy_instance(&instance);
                return Err(e);
            }
        };
        let (device, queues) =
            match device::create_logical_device(&instance, physical_device, families) {
                Ok(created) => created,
                Err(e) => {
                    destroy_instance(&instance);
                    return Err(e);
                }
            };

        let destroy_device = |device: &ash::Device, pools: &[vk::CommandPool]| unsafe {
            for pool in pools {
                device.destroy_command_pool(*pool, None);
            }
            device.destroy_device(None);
        };

        let mut pools = Vec::with_capacity(2);
        for queue in QueueAffinity::ALL {
            match command::create_command_pool(&device, families.get(queue)) {
                Ok(pool) => pools.push(pool),
                Err(e) => {
                    destroy_device(&device, &pools);
                    destroy_instance(&instance);
                    return Err(e);
                }
            }
        }
        let command_pools = PerQueue([pools[0], pools[1]]);

        let allocator =
            match allocator::create_allocator(&instance, physical_device, device.clone()) {
                Ok(allocator) => allocator,
                Err(e) => {
                    destroy_device(&device, &pools);
                    destroy_instance(&instance);
                    return Err(e);
                }
            };

        let dynamic_rendering = ash::khr::dynamic_rendering::Device::new(&instance, &device);
        let synchronization2 = ash::khr::synchronization2::Device::new(&instance, &device);
        let surface_loader = ash::khr::surface::Instance::new(&entry, &instance);
        let swapchain_loader = ash::khr::swapchain::Device::new(&instance, &device);

        log::info!(
            "Vulkan backend initialized (validation: {}, async compute: {})",
            bundle.debug_messenger.is_some(),
            families.has_async_compute()
        );

        Ok(Self {
            entry,
            instance,
            debug_utils: bundle.debug_utils,
            debug_messenger: bundle.debug_messenger,
            physical_device,
            device,
            families,
            queues,
            command_pools,
            allocator: Some(allocator),
            dynamic_rendering,
            synchronization2,
            surface_loader,
            swapchain_loader,
            surfaces: HashMap::new(),
            next_surface: 0,
        })
    }

    pub fn device(&self) -> &ash::Device {
        &self.device
    }

    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    /// Whether compute passes run on a queue family of their own.
    pub fn has_async_compute(&self) -> bool {
        self.families.has_async_compute()
    }

    fn swapchain_context(&self) -> SwapchainContext<'_> {
        SwapchainContext {
            device: &self.device,
            physical_device: self.physical_device,
            surface_loader: &self.surface_loader,
            swapchain_loader: &self.swapchain_loader,
        }
    }

    /// `CONCURRENT` across both families when they differ.
    fn sharing(&self) -> (vk::SharingMode, Vec<u32>) {
        if self.families.has_async_compute() {
            (vk::SharingMode::CONCURRENT, self.families.unique())
        } else {
            (vk::SharingMode::EXCLUSIVE, Vec::new())
        }
    }

    fn surface_state(&self, surface: VulkanSurface) -> Result<&SurfaceState, GraphicsError> {
        self.surfaces
            .get(&surface)
            .ok_or_else(|| GraphicsError::InvalidHandle(format!("surface {surface:?}")))
    }

    /// Resolve an attachment to its image view and record any layout
    /// transition it needs.
    fn resolve_attachment(
        &mut self,
        attachment: &RenderingAttachment<'_, Self>,
        barriers: &mut Vec<vk::ImageMemoryBarrier2<'static>>,
    ) -> Option<(vk::ImageView, vk::ImageLayout)> {
        match &attachment.image {
            AttachmentImage::Texture(texture) => Some((texture.view, vk::ImageLayout::GENERAL)),
            AttachmentImage::Surface {
                surface,
                image_index,
            } => {
                let Some(state) = self.surfaces.get_mut(surface) else {
                    log::warn!("Rendering into unknown surface {surface:?}, attachment skipped");
                    return None;
                };
                let (image, view) = state.image(*image_index)?;
                let old_layout =
                    state.transition(*image_index, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
                barriers.push(
                    vk::ImageMemoryBarrier2::default()
                        .src_stage_mask(vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT)
                        .src_access_mask(vk::AccessFlags2::NONE)
                        .dst_stage_mask(vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT)
                        .dst_access_mask(
                            vk::AccessFlags2::COLOR_ATTACHMENT_READ
                                | vk::AccessFlags2::COLOR_ATTACHMENT_WRITE,
                        )
                        .old_layout(old_layout)
                        .new_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
                        .image(image)
                        .subresource_range(swapchain::color_range()),
                );
                Some((view, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL))
            }
        }
    }

    fn image_barriers(
        &self,
        command_buffer: vk::CommandBuffer,
        barriers: &[vk::ImageMemoryBarrier2<'_>],
    ) {
        if barriers.is_empty() {
            return;
        }
        let dependency = vk::DependencyInfo::default().image_memory_barriers(barriers);
        unsafe {
            self.synchronization2
                .cmd_pipeline_barrier2(command_buffer, &dependency)
        };
    }

    /// Move a freshly created image from `UNDEFINED` to `GENERAL`.
    fn initialize_layout(
        &self,
        image: vk::Image,
        aspect: vk::ImageAspectFlags,
    ) -> Result<(), GraphicsError> {
        let barrier = vk::ImageMemoryBarrier2::default()
            .src_stage_mask(vk::PipelineStageFlags2::NONE)
            .dst_stage_mask(vk::PipelineStageFlags2::ALL_COMMANDS)
            .dst_access_mask(vk::AccessFlags2::MEMORY_READ | vk::AccessFlags2::MEMORY_WRITE)
            .old_layout(vk::ImageLayout::UNDEFINED)
            .new_layout(vk::ImageLayout::GENERAL)
            .image(image)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: aspect,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            });

        let queue = QueueAffinity::Graphics;
        command::submit_one_shot(
            &self.device,
            *self.command_pools.get(queue),
            *self.queues.get(queue),
            |cmd| self.image_barriers(cmd, &[barrier]),
        )
    }
}

impl Backend for VulkanBackend {
    type Buffer = VulkanBuffer;
    type Texture = VulkanTexture;
    type Fence = vk::Fence;
    type Semaphore = vk::Semaphore;
    type Pipeline = VulkanPipeline;
    type BindingTable = VulkanBindingTable;
    type CommandBuffer = VulkanCommandBuffer;
    type Surface = VulkanSurface;

    fn name(&self) -> &'static str {
        "Vulkan Backend (ash)"
    }

    fn create_buffer(
        &mut self,
        descriptor: &BufferDescriptor,
    ) -> Result<VulkanBuffer, GraphicsError> {
        if descriptor.size == 0 {
            return Err(GraphicsError::InvalidParameter(
                "Buffer size must be non-zero".to_string(),
            ));
        }

        let (sharing_mode, families) = self.sharing();
        let create_info = vk::BufferCreateInfo::default()
            .size(descriptor.size)
            .usage(convert_buffer_usage(descriptor.usage))
            .sharing_mode(sharing_mode)
            .queue_family_indices(&families);

        let buffer = unsafe { self.device.create_buffer(&create_info, None) }.map_err(|e| {
            GraphicsError::ResourceCreationFailed(format!("Failed to create buffer: {e:?}"))
        })?;

        let name = descriptor.label.as_deref().unwrap_or("buffer");
        let allocation = match self.allocator.as_mut() {
            Some(allocator) => allocator::allocate_buffer(&self.device, allocator, buffer, name),
            None => Err(released_allocator()),
        };
        let allocation = match allocation {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { self.device.destroy_buffer(buffer, None) };
                return Err(e);
            }
        };

        Ok(VulkanBuffer {
            buffer,
            allocation: Some(allocation),
            size: descriptor.size,
        })
    }

    fn write_buffer(
        &mut self,
        buffer: &VulkanBuffer,
        offset: u64,
        data: &[u8],
    ) -> Result<(), GraphicsError> {
        let end = offset.checked_add(data.len() as u64);
        if end.is_none_or(|end| end > buffer.size) {
            return Err(GraphicsError::InvalidParameter(format!(
                "Write of {} bytes at offset {offset} exceeds buffer size {}",
                data.len(),
                buffer.size
            )));
        }

        let mapped = buffer
            .allocation
            .as_ref()
            .and_then(|allocation| allocation.mapped_ptr())
            .ok_or_else(|| GraphicsError::Internal("Buffer memory is not mapped".to_string()))?;

        // SAFETY: the range was checked against the buffer size and the
        // mapping covers the whole allocation.
        unsafe {
            std::ptr::copy_nonoverlapping(
                data.as_ptr(),
                mapped.as_ptr().cast::<u8>().add(offset as usize),
                data.len(),
            );
        }
        Ok(())
    }

    fn destroy_buffer(&mut self, mut buffer: VulkanBuffer) {
        unsafe { self.device.destroy_buffer(buffer.buffer, None) };
        if let (Some(allocation), Some(allocator)) =
            (buffer.allocation.take(), self.allocator.as_mut())
            && let Err(e) = allocator.free(allocation)
        {
            log::warn!("Failed to free buffer memory: {e}");
        }
    }

    fn create_texture(
        &mut self,
        descriptor: &TextureDescriptor,
    ) -> Result<VulkanTexture, GraphicsError> {
        if descriptor.extent.is_empty() {
            return Err(GraphicsError::InvalidParameter(
                "Texture extent must be non-zero".to_string(),
            ));
        }

        let format = convert_texture_format(descriptor.format);
        let aspect = aspect_mask(descriptor.format);
        let extent = convert_extent(descriptor.extent);
        let (sharing_mode, families) = self.sharing();

        let create_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(format)
            .extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(convert_texture_usage(descriptor.usage, descriptor.format))
            .sharing_mode(sharing_mode)
            .queue_family_indices(&families)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let image = unsafe { self.device.create_image(&create_info, None) }.map_err(|e| {
            GraphicsError::ResourceCreationFailed(format!("Failed to create image: {e:?}"))
        })?;

        let name = descriptor.label.as_deref().unwrap_or("texture");
        let allocation = match self.allocator.as_mut() {
            Some(allocator) => allocator::allocate_image(&self.device, allocator, image, name),
            None => Err(released_allocator()),
        };
        let allocation = match allocation {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { self.device.destroy_image(image, None) };
                return Err(e);
            }
        };

        let view_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: aspect,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            });

        let view = match unsafe { self.device.create_image_view(&view_info, None) } {
            Ok(view) => view,
            Err(e) => {
                self.destroy_texture(VulkanTexture {
                    image,
                    view: vk::ImageView::null(),
                    allocation: Some(allocation),
                    aspect,
                });
                return Err(GraphicsError::ResourceCreationFailed(format!(
                    "Failed to create image view: {e:?}"
                )));
            }
        };

        let texture = VulkanTexture {
            image,
            view,
            allocation: Some(allocation),
            aspect,
        };
        if let Err(e) = self.initialize_layout(texture.image, texture.aspect) {
            self.destroy_texture(texture);
            return Err(e);
        }
        Ok(texture)
    }

    fn destroy_texture(&mut self, mut texture: VulkanTexture) {
        unsafe {
            if texture.view != vk::ImageView::null() {
                self.device.destroy_image_view(texture.view, None);
            }
            self.device.destroy_image(texture.image, None);
        }
        if let (Some(allocation), Some(allocator)) =
            (texture.allocation.take(), self.allocator.as_mut())
            && let Err(e) = allocator.free(allocation)
        {
            log::warn!("Failed to free texture memory: {e}");
        }
    }

    fn create_fence(&mut self, signaled: bool) -> Result<vk::Fence, GraphicsError> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let create_info = vk::FenceCreateInfo::default().flags(flags);
        unsafe { self.device.create_fence(&create_info, None) }.map_err(|e| {
            GraphicsError::ResourceCreationFailed(format!("Failed to create fence: {e:?}"))
        })
    }

    fn destroy_fence(&mut self, fence: vk::Fence) {
        unsafe { self.device.destroy_fence(fence, None) };
    }

    fn wait_for_fences(&mut self, fences: &[vk::Fence]) -> Result<(), GraphicsError> {
        if fences.is_empty() {
            return Ok(());
        }
        unsafe { self.device.wait_for_fences(fences, true, u64::MAX) }.map_err(map_vk_error)
    }

    fn reset_fences(&mut self, fences: &[vk::Fence]) -> Result<(), GraphicsError> {
        if fences.is_empty() {
            return Ok(());
        }
        unsafe { self.device.reset_fences(fences) }.map_err(map_vk_error)
    }

    fn is_fence_signaled(&self, fence: vk::Fence) -> Result<bool, GraphicsError> {
        unsafe { self.device.get_fence_status(fence) }.map_err(map_vk_error)
    }

    fn create_semaphore(&mut self) -> Result<vk::Semaphore, GraphicsError> {
        let create_info = vk::SemaphoreCreateInfo::default();
        unsafe { self.device.create_semaphore(&create_info, None) }.map_err(|e| {
            GraphicsError::ResourceCreationFailed(format!("Failed to create semaphore: {e:?}"))
        })
    }

    fn destroy_semaphore(&mut self, semaphore: vk::Semaphore) {
        unsafe { self.device.destroy_semaphore(semaphore, None) };
    }

    fn wait_idle(&mut self) -> Result<(), GraphicsError> {
        unsafe { self.device.device_wait_idle() }.map_err(map_vk_error)
    }

    fn create_pipeline(
        &mut self,
        description: &PipelineDescription,
        layout: &BindingLayout,
        formats: &AttachmentFormats,
    ) -> Result<VulkanPipeline, GraphicsError> {
        pipeline::create_pipeline(&self.device, description, layout, formats)
    }

    fn destroy_pipeline(&mut self, pipeline: VulkanPipeline) {
        pipeline::destroy_pipeline(&self.device, pipeline);
    }

    fn create_binding_table(
        &mut self,
        pipeline: VulkanPipeline,
        layout: &BindingLayout,
        resources: &[BoundResource<'_, Self>],
    ) -> Result<VulkanBindingTable, GraphicsError> {
        descriptor::create_binding_table(&self.device, pipeline, layout, resources)
    }

    fn destroy_binding_table(&mut self, table: VulkanBindingTable) {
        descriptor::destroy_binding_table(&self.device, table);
    }

    fn create_command_buffer(
        &mut self,
        queue: QueueAffinity,
    ) -> Result<VulkanCommandBuffer, GraphicsError> {
        let buffer = command::allocate_primary(&self.device, *self.command_pools.get(queue))?;
        Ok(VulkanCommandBuffer { buffer, queue })
    }

    fn destroy_command_buffer(&mut self, command_buffer: VulkanCommandBuffer) {
        let pool = *self.command_pools.get(command_buffer.queue);
        unsafe {
            self.device
                .free_command_buffers(pool, &[command_buffer.buffer])
        };
    }

    fn begin_commands(&mut self, command_buffer: VulkanCommandBuffer) -> Result<(), GraphicsError> {
        let cmd = command_buffer.buffer;
        unsafe {
            self.device
                .reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())
        }
        .map_err(map_vk_error)?;

        let begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe { self.device.begin_command_buffer(cmd, &begin_info) }.map_err(map_vk_error)
    }

    fn end_commands(&mut self, command_buffer: VulkanCommandBuffer) -> Result<(), GraphicsError> {
        unsafe { self.device.end_command_buffer(command_buffer.buffer) }.map_err(map_vk_error)
    }

    fn pass_barrier(&mut self, command_buffer: VulkanCommandBuffer) {
        let barrier = vk::MemoryBarrier2::default()
            .src_stage_mask(vk::PipelineStageFlags2::ALL_COMMANDS)
            .src_access_mask(vk::AccessFlags2::MEMORY_WRITE)
            .dst_stage_mask(vk::PipelineStageFlags2::ALL_COMMANDS)
            .dst_access_mask(vk::AccessFlags2::MEMORY_READ | vk::AccessFlags2::MEMORY_WRITE);
        let barriers = [barrier];
        let dependency = vk::DependencyInfo::default().memory_barriers(&barriers);
        unsafe {
            self.synchronization2
                .cmd_pipeline_barrier2(command_buffer.buffer, &dependency)
        };
    }

    fn begin_rendering(
        &mut self,
        command_buffer: VulkanCommandBuffer,
        info: &RenderingInfo<'_, Self>,
    ) {
        let cmd = command_buffer.buffer;
        let mut barriers = Vec::new();

        let mut colors = Vec::with_capacity(info.colors.len());
        for attachment in &info.colors {
            let Some((view, layout)) = self.resolve_attachment(attachment, &mut barriers) else {
                continue;
            };
            let (load_op, clear_value) = convert_load_op_color(attachment.load);
            colors.push(
                vk::RenderingAttachmentInfo::default()
                    .image_view(view)
                    .image_layout(layout)
                    .load_op(load_op)
                    .store_op(vk::AttachmentStoreOp::STORE)
                    .clear_value(clear_value),
            );
        }

        let depth = info.depth.as_ref().and_then(|attachment| {
            let (view, layout) = self.resolve_attachment(attachment, &mut barriers)?;
            let (load_op, clear_value) = convert_load_op_depth(attachment.load);
            Some(
                vk::RenderingAttachmentInfo::default()
                    .image_view(view)
                    .image_layout(layout)
                    .load_op(load_op)
                    .store_op(vk::AttachmentStoreOp::STORE)
                    .clear_value(clear_value),
            )
        });

        self.image_barriers(cmd, &barriers);

        let extent = convert_extent(info.extent);
        let render_area = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        };
        let mut rendering_info = vk::RenderingInfo::default()
            .render_area(render_area)
            .layer_count(1)
            .color_attachments(&colors);
        if let Some(depth) = depth.as_ref() {
            rendering_info = rendering_info.depth_attachment(depth);
        }

        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };
        unsafe {
            self.dynamic_rendering
                .cmd_begin_rendering(cmd, &rendering_info);
            self.device.cmd_set_viewport(cmd, 0, &[viewport]);
            self.device.cmd_set_scissor(cmd, 0, &[render_area]);
        }
    }

    fn end_rendering(
        &mut self,
        command_buffer: VulkanCommandBuffer,
        info: &RenderingInfo<'_, Self>,
    ) {
        let cmd = command_buffer.buffer;
        unsafe { self.dynamic_rendering.cmd_end_rendering(cmd) };

        let mut barriers = Vec::new();
        for attachment in &info.colors {
            let AttachmentImage::Surface {
                surface,
                image_index,
            } = attachment.image
            else {
                continue;
            };
            let Some(state) = self.surfaces.get_mut(&surface) else {
                continue;
            };
            let Some((image, _)) = state.image(image_index) else {
                continue;
            };
            let old_layout = state.transition(image_index, vk::ImageLayout::PRESENT_SRC_KHR);
            barriers.push(
                vk::ImageMemoryBarrier2::default()
                    .src_stage_mask(vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT)
                    .src_access_mask(vk::AccessFlags2::COLOR_ATTACHMENT_WRITE)
                    .dst_stage_mask(vk::PipelineStageFlags2::NONE)
                    .dst_access_mask(vk::AccessFlags2::NONE)
                    .old_layout(old_layout)
                    .new_layout(vk::ImageLayout::PRESENT_SRC_KHR)
                    .image(image)
                    .subresource_range(swapchain::color_range()),
            );
        }
        self.image_barriers(cmd, &barriers);
    }

    fn bind_pipeline(&mut self, command_buffer: VulkanCommandBuffer, pipeline: VulkanPipeline) {
        unsafe {
            self.device.cmd_bind_pipeline(
                command_buffer.buffer,
                pipeline.bind_point,
                pipeline.pipeline,
            )
        };
    }

    fn bind_binding_table(
        &mut self,
        command_buffer: VulkanCommandBuffer,
        pipeline: VulkanPipeline,
        table: VulkanBindingTable,
    ) {
        if table.is_empty() {
            return;
        }
        unsafe {
            self.device.cmd_bind_descriptor_sets(
                command_buffer.buffer,
                pipeline.bind_point,
                pipeline.layout,
                0,
                &[table.set],
                &[],
            )
        };
    }

    fn bind_vertex_buffers(
        &mut self,
        command_buffer: VulkanCommandBuffer,
        buffers: &[&VulkanBuffer],
    ) {
        let handles: Vec<vk::Buffer> = buffers.iter().map(|b| b.buffer).collect();
        let offsets = vec![0u64; handles.len()];
        unsafe {
            self.device
                .cmd_bind_vertex_buffers(command_buffer.buffer, 0, &handles, &offsets)
        };
    }

    fn bind_index_buffer(
        &mut self,
        command_buffer: VulkanCommandBuffer,
        buffer: &VulkanBuffer,
        format: IndexFormat,
    ) {
        unsafe {
            self.device.cmd_bind_index_buffer(
                command_buffer.buffer,
                buffer.buffer,
                0,
                convert_index_format(format),
            )
        };
    }

    fn push_constants(
        &mut self,
        command_buffer: VulkanCommandBuffer,
        pipeline: VulkanPipeline,
        stages: ShaderStages,
        data: &[u8],
    ) {
        unsafe {
            self.device.cmd_push_constants(
                command_buffer.buffer,
                pipeline.layout,
                convert_shader_stages(stages),
                0,
                data,
            )
        };
    }

    fn draw(
        &mut self,
        command_buffer: VulkanCommandBuffer,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    ) {
        unsafe {
            self.device.cmd_draw(
                command_buffer.buffer,
                vertex_count,
                instance_count,
                first_vertex,
                first_instance,
            )
        };
    }

    fn draw_indexed(
        &mut self,
        command_buffer: VulkanCommandBuffer,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) {
        unsafe {
            self.device.cmd_draw_indexed(
                command_buffer.buffer,
                index_count,
                instance_count,
                first_index,
                vertex_offset,
                first_instance,
            )
        };
    }

    fn dispatch(&mut self, command_buffer: VulkanCommandBuffer, x: u32, y: u32, z: u32) {
        unsafe { self.device.cmd_dispatch(command_buffer.buffer, x, y, z) };
    }

    fn submit(&mut self, submission: &Submission<'_, Self>) -> Result<(), GraphicsError> {
        if let Some(cmd) = submission
            .command_buffers
            .iter()
            .find(|cmd| cmd.queue != submission.queue)
        {
            return Err(GraphicsError::InvalidParameter(format!(
                "Command buffer for the {} queue submitted to the {} queue",
                cmd.queue.name(),
                submission.queue.name()
            )));
        }

        let command_infos: Vec<vk::CommandBufferSubmitInfo> = submission
            .command_buffers
            .iter()
            .map(|cmd| vk::CommandBufferSubmitInfo::default().command_buffer(cmd.buffer))
            .collect();
        let wait_infos: Vec<vk::SemaphoreSubmitInfo> = submission
            .waits
            .iter()
            .map(|wait| {
                vk::SemaphoreSubmitInfo::default()
                    .semaphore(wait.semaphore)
                    .stage_mask(convert_wait_stage(wait.stage))
            })
            .collect();
        let signal_infos: Vec<vk::SemaphoreSubmitInfo> = submission
            .signals
            .iter()
            .map(|semaphore| {
                vk::SemaphoreSubmitInfo::default()
                    .semaphore(*semaphore)
                    .stage_mask(vk::PipelineStageFlags2::ALL_COMMANDS)
            })
            .collect();

        let submit_info = vk::SubmitInfo2::default()
            .command_buffer_infos(&command_infos)
            .wait_semaphore_infos(&wait_infos)
            .signal_semaphore_infos(&signal_infos);

        let queue = *self.queues.get(submission.queue);
        let fence = submission.fence.unwrap_or_else(vk::Fence::null);
        unsafe {
            self.synchronization2
                .queue_submit2(queue, &[submit_info], fence)
        }
        .map_err(map_vk_error)
    }

    fn create_surface(
        &mut self,
        window: &dyn Window,
        present_mode: PresentMode,
    ) -> Result<(VulkanSurface, SurfaceInfo), GraphicsError> {
        let (display, handle) = window.raw_handles().map_err(|e| {
            GraphicsError::InvalidParameter(format!("Window has no usable handles: {e}"))
        })?;
        let vk_surface =
            swapchain::create_vk_surface(&self.entry, &self.instance, display, handle)?;

        let supported = unsafe {
            self.surface_loader.get_physical_device_surface_support(
                self.physical_device,
                self.families.graphics,
                vk_surface,
            )
        }
        .unwrap_or(false);
        if !supported {
            unsafe { self.surface_loader.destroy_surface(vk_surface, None) };
            return Err(GraphicsError::FeatureNotSupported(
                "Graphics queue cannot present to this window".to_string(),
            ));
        }

        let ctx = self.swapchain_context();
        let state = match SurfaceState::new(
            &ctx,
            vk_surface,
            convert_present_mode(present_mode),
            window.extent(),
        ) {
            Ok(state) => state,
            Err(e) => {
                unsafe { self.surface_loader.destroy_surface(vk_surface, None) };
                return Err(e);
            }
        };
        let info = match state.info() {
            Ok(info) => info,
            Err(e) => {
                state.destroy(&ctx);
                return Err(e);
            }
        };

        let id = VulkanSurface(self.next_surface);
        self.next_surface += 1;
        self.surfaces.insert(id, state);
        Ok((id, info))
    }

    fn recreate_surface(
        &mut self,
        surface: VulkanSurface,
        extent: Extent2d,
    ) -> Result<SurfaceInfo, GraphicsError> {
        self.surface_state(surface)?;
        // Older frames may still be presenting the images being replaced.
        self.wait_idle()?;

        let Some(mut state) = self.surfaces.remove(&surface) else {
            return Err(GraphicsError::InvalidHandle(format!("surface {surface:?}")));
        };
        let result = state
            .rebuild(&self.swapchain_context(), extent)
            .and_then(|()| state.info());
        self.surfaces.insert(surface, state);
        result
    }

    fn destroy_surface(&mut self, surface: VulkanSurface) {
        if let Some(state) = self.surfaces.remove(&surface) {
            state.destroy(&self.swapchain_context());
        }
    }

    fn acquire_next_image(
        &mut self,
        surface: VulkanSurface,
        signal: vk::Semaphore,
    ) -> Result<AcquireOutcome, GraphicsError> {
        let ctx = self.swapchain_context();
        let outcome = self.surface_state(surface)?.acquire(&ctx, signal)?;
        if let AcquireOutcome::Acquired(index) | AcquireOutcome::Suboptimal(index) = outcome
            && let Some(state) = self.surfaces.get_mut(&surface)
        {
            // A freshly acquired image has undefined contents.
            state.transition(index, vk::ImageLayout::UNDEFINED);
        }
        Ok(outcome)
    }

    fn present(
        &mut self,
        requests: &[PresentRequest<VulkanSurface>],
        waits: &[vk::Semaphore],
    ) -> Result<Vec<PresentOutcome>, GraphicsError> {
        if requests.is_empty() {
            return Ok(Vec::new());
        }
        let mut swapchains = Vec::with_capacity(requests.len());
        let mut indices = Vec::with_capacity(requests.len());
        for request in requests {
            swapchains.push(self.surface_state(request.surface)?.swapchain());
            indices.push(request.image_index);
        }
        swapchain::present(
            &self.swapchain_loader,
            *self.queues.get(QueueAffinity::Graphics),
            &swapchains,
            &indices,
            waits,
        )
    }
}

impl Drop for VulkanBackend {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();

            let ids: Vec<VulkanSurface> = self.surfaces.keys().copied().collect();
            for id in ids {
                self.destroy_surface(id);
            }

            for (_, pool) in self.command_pools.iter() {
                self.device.destroy_command_pool(*pool, None);
            }

            // Frees every remaining block; must happen before the device goes.
            self.allocator.take();
            self.device.destroy_device(None);

            if let (Some(debug_utils), Some(messenger)) = (&self.debug_utils, self.debug_messenger)
            {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}
