//! Device memory through gpu-allocator.
//!
//! Every buffer lives in host-visible memory so [`write_buffer`] can copy
//! into its persistent mapping; textures live in device-local memory.
//!
//! [`write_buffer`]: crate::backend::Backend::write_buffer

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{
    Allocation, AllocationCreateDesc, AllocationScheme, Allocator, AllocatorCreateDesc,
};

use crate::error::GraphicsError;

pub fn create_allocator(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    device: ash::Device,
) -> Result<Allocator, GraphicsError> {
    Allocator::new(&AllocatorCreateDesc {
        instance: instance.clone(),
        device,
        physical_device,
        debug_settings: Default::default(),
        buffer_device_address: false,
        allocation_sizes: gpu_allocator::AllocationSizes::default(),
    })
    .map_err(|e| {
        GraphicsError::InitializationFailed(format!("Failed to create memory allocator: {e}"))
    })
}

/// Allocate and bind memory for `buffer`.
pub fn allocate_buffer(
    device: &ash::Device,
    allocator: &mut Allocator,
    buffer: vk::Buffer,
    name: &str,
) -> Result<Allocation, GraphicsError> {
    let requirements = unsafe { device.get_buffer_memory_requirements(buffer) };
    let allocation = allocator
        .allocate(&AllocationCreateDesc {
            name,
            requirements,
            location: MemoryLocation::CpuToGpu,
            linear: true,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        })
        .map_err(map_allocation_error)?;

    if let Err(e) =
        unsafe { device.bind_buffer_memory(buffer, allocation.memory(), allocation.offset()) }
    {
        let _ = allocator.free(allocation);
        return Err(GraphicsError::ResourceCreationFailed(format!(
            "Failed to bind buffer memory: {e:?}"
        )));
    }
    Ok(allocation)
}

/// Allocate and bind memory for `image`.
pub fn allocate_image(
    device: &ash::Device,
    allocator: &mut Allocator,
    image: vk::Image,
    name: &str,
) -> Result<Allocation, GraphicsError> {
    let requirements = unsafe { device.get_image_memory_requirements(image) };
    let allocation = allocator
        .allocate(&AllocationCreateDesc {
            name,
            requirements,
            location: MemoryLocation::GpuOnly,
            linear: false,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        })
        .map_err(map_allocation_error)?;

    if let Err(e) =
        unsafe { device.bind_image_memory(image, allocation.memory(), allocation.offset()) }
    {
        let _ = allocator.free(allocation);
        return Err(GraphicsError::ResourceCreationFailed(format!(
            "Failed to bind image memory: {e:?}"
        )));
    }
    Ok(allocation)
}

fn map_allocation_error(e: gpu_allocator::AllocationError) -> GraphicsError {
    match e {
        gpu_allocator::AllocationError::OutOfMemory => GraphicsError::OutOfMemory,
        other => GraphicsError::ResourceCreationFailed(format!("Allocation failed: {other}")),
    }
}
