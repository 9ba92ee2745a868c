//! Command pools and one-shot submissions.

use ash::vk;

use crate::error::GraphicsError;

/// Pool whose buffers can be reset individually.
pub fn create_command_pool(
    device: &ash::Device,
    queue_family_index: u32,
) -> Result<vk::CommandPool, GraphicsError> {
    let pool_info = vk::CommandPoolCreateInfo::default()
        .queue_family_index(queue_family_index)
        .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);

    unsafe { device.create_command_pool(&pool_info, None) }.map_err(|e| {
        GraphicsError::InitializationFailed(format!("Failed to create command pool: {e:?}"))
    })
}

pub fn allocate_primary(
    device: &ash::Device,
    pool: vk::CommandPool,
) -> Result<vk::CommandBuffer, GraphicsError> {
    let alloc_info = vk::CommandBufferAllocateInfo::default()
        .command_pool(pool)
        .level(vk::CommandBufferLevel::PRIMARY)
        .command_buffer_count(1);

    let buffers = unsafe { device.allocate_command_buffers(&alloc_info) }.map_err(|e| {
        GraphicsError::ResourceCreationFailed(format!("Failed to allocate command buffer: {e:?}"))
    })?;
    buffers.into_iter().next().ok_or_else(|| {
        GraphicsError::Internal("Driver returned no command buffer".to_string())
    })
}

/// Record `record` into a temporary buffer, submit it and wait for the queue.
///
/// Only used at resource creation time, never inside a frame.
pub fn submit_one_shot(
    device: &ash::Device,
    pool: vk::CommandPool,
    queue: vk::Queue,
    record: impl FnOnce(vk::CommandBuffer),
) -> Result<(), GraphicsError> {
    let cmd = allocate_primary(device, pool)?;

    let result = (|| {
        let begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe { device.begin_command_buffer(cmd, &begin_info) }.map_err(|e| {
            GraphicsError::Internal(format!("Failed to begin one-shot commands: {e:?}"))
        })?;
        record(cmd);
        unsafe { device.end_command_buffer(cmd) }.map_err(|e| {
            GraphicsError::Internal(format!("Failed to end one-shot commands: {e:?}"))
        })?;

        let buffers = [cmd];
        let submit = vk::SubmitInfo::default().command_buffers(&buffers);
        unsafe { device.queue_submit(queue, &[submit], vk::Fence::null()) }
            .map_err(super::map_vk_error)?;
        unsafe { device.queue_wait_idle(queue) }.map_err(super::map_vk_error)
    })();

    unsafe { device.free_command_buffers(pool, &[cmd]) };
    result
}
