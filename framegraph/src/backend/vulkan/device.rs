//! Physical device selection and logical device creation.

use std::ffi::CStr;

use ash::vk;

use crate::error::GraphicsError;
use crate::types::{PerQueue, QueueAffinity};

/// Queue family chosen for each [`QueueAffinity`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilies {
    pub graphics: u32,
    pub compute: u32,
}

impl QueueFamilies {
    pub fn get(&self, queue: QueueAffinity) -> u32 {
        match queue {
            QueueAffinity::Graphics => self.graphics,
            QueueAffinity::Compute => self.compute,
        }
    }

    /// Distinct family indices, graphics first.
    pub fn unique(&self) -> Vec<u32> {
        if self.graphics == self.compute {
            vec![self.graphics]
        } else {
            vec![self.graphics, self.compute]
        }
    }

    /// Whether the compute queue lives in a family of its own.
    pub fn has_async_compute(&self) -> bool {
        self.graphics != self.compute
    }
}

/// Pick the highest scoring device that has a graphics queue.
///
/// Discrete GPUs score 1000, integrated 100; ties break on the largest
/// supported 2D image.
pub fn select_physical_device(
    instance: &ash::Instance,
) -> Result<(vk::PhysicalDevice, QueueFamilies), GraphicsError> {
    let devices = unsafe { instance.enumerate_physical_devices() }.map_err(|e| {
        GraphicsError::InitializationFailed(format!("Failed to enumerate physical devices: {e:?}"))
    })?;

    let mut best: Option<(u32, vk::PhysicalDevice, QueueFamilies)> = None;
    for device in devices {
        let properties = unsafe { instance.get_physical_device_properties(device) };
        let name = unsafe { CStr::from_ptr(properties.device_name.as_ptr()) };

        let Some(families) = find_queue_families(instance, device) else {
            log::info!("Skipping GPU {name:?}: no graphics queue");
            continue;
        };

        let mut score = match properties.device_type {
            vk::PhysicalDeviceType::DISCRETE_GPU => 1000,
            vk::PhysicalDeviceType::INTEGRATED_GPU => 100,
            _ => 1,
        };
        score += properties.limits.max_image_dimension2_d / 1024;

        log::info!(
            "Found GPU: {name:?} (type: {:?}, score: {score}, async compute: {})",
            properties.device_type,
            families.has_async_compute()
        );

        if best.as_ref().is_none_or(|(s, _, _)| score > *s) {
            best = Some((score, device, families));
        }
    }

    best.map(|(_, device, families)| (device, families))
        .ok_or_else(|| GraphicsError::InitializationFailed("No suitable GPU found".to_string()))
}

/// The first graphics family, and a compute family without graphics support
/// when one exists (falling back to the graphics family).
pub fn find_queue_families(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
) -> Option<QueueFamilies> {
    let families = unsafe { instance.get_physical_device_queue_family_properties(physical_device) };

    let graphics = families
        .iter()
        .position(|f| f.queue_flags.contains(vk::QueueFlags::GRAPHICS))? as u32;
    let compute = families
        .iter()
        .position(|f| {
            f.queue_flags.contains(vk::QueueFlags::COMPUTE)
                && !f.queue_flags.contains(vk::QueueFlags::GRAPHICS)
        })
        .map_or(graphics, |index| index as u32);

    Some(QueueFamilies { graphics, compute })
}

/// Create the logical device with dynamic rendering and synchronization2, and
/// fetch one queue per affinity.
///
/// When both affinities share a family they share its first queue.
pub fn create_logical_device(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    families: QueueFamilies,
) -> Result<(ash::Device, PerQueue<vk::Queue>), GraphicsError> {
    let priorities = [1.0f32];
    let queue_infos: Vec<vk::DeviceQueueCreateInfo> = families
        .unique()
        .into_iter()
        .map(|family| {
            vk::DeviceQueueCreateInfo::default()
                .queue_family_index(family)
                .queue_priorities(&priorities)
        })
        .collect();

    let extensions = [
        ash::khr::swapchain::NAME.as_ptr(),
        ash::khr::dynamic_rendering::NAME.as_ptr(),
        ash::khr::synchronization2::NAME.as_ptr(),
        #[cfg(target_os = "macos")]
        ash::khr::portability_subset::NAME.as_ptr(),
    ];

    let mut dynamic_rendering =
        vk::PhysicalDeviceDynamicRenderingFeatures::default().dynamic_rendering(true);
    let mut synchronization2 =
        vk::PhysicalDeviceSynchronization2Features::default().synchronization2(true);

    let create_info = vk::DeviceCreateInfo::default()
        .queue_create_infos(&queue_infos)
        .enabled_extension_names(&extensions)
        .push_next(&mut dynamic_rendering)
        .push_next(&mut synchronization2);

    let device =
        unsafe { instance.create_device(physical_device, &create_info, None) }.map_err(|e| {
            GraphicsError::InitializationFailed(format!("Failed to create logical device: {e:?}"))
        })?;

    let queues =
        PerQueue::from_fn(|queue| unsafe { device.get_device_queue(families.get(queue), 0) });

    Ok((device, queues))
}
