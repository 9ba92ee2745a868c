//! Window surfaces and their swapchains.

use ash::vk;
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};

use crate::backend::{AcquireOutcome, PresentOutcome, SurfaceInfo};
use crate::error::GraphicsError;
use crate::types::Extent2d;

use super::conversion::texture_format_from_vk;
use super::map_vk_error;

/// Loaders and device handles needed to (re)build a swapchain.
pub struct SwapchainContext<'a> {
    pub device: &'a ash::Device,
    pub physical_device: vk::PhysicalDevice,
    pub surface_loader: &'a ash::khr::surface::Instance,
    pub swapchain_loader: &'a ash::khr::swapchain::Device,
}

/// One window surface, its swapchain and the layout of every image as left
/// by the last recorded pass.
pub struct SurfaceState {
    surface: vk::SurfaceKHR,
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    views: Vec<vk::ImageView>,
    layouts: Vec<vk::ImageLayout>,
    format: vk::SurfaceFormatKHR,
    extent: vk::Extent2D,
    present_mode: vk::PresentModeKHR,
}

/// Create a `VkSurfaceKHR` for raw window handles.
pub fn create_vk_surface(
    entry: &ash::Entry,
    instance: &ash::Instance,
    display: RawDisplayHandle,
    window: RawWindowHandle,
) -> Result<vk::SurfaceKHR, GraphicsError> {
    unsafe { ash_window::create_surface(entry, instance, display, window, None) }.map_err(|e| {
        GraphicsError::ResourceCreationFailed(format!("Failed to create window surface: {e:?}"))
    })
}

impl SurfaceState {
    /// Build the first swapchain for `surface`.
    ///
    /// The requested present mode is used when supported, otherwise FIFO.
    pub fn new(
        ctx: &SwapchainContext<'_>,
        surface: vk::SurfaceKHR,
        present_mode: vk::PresentModeKHR,
        extent: Extent2d,
    ) -> Result<Self, GraphicsError> {
        let formats = unsafe {
            ctx.surface_loader
                .get_physical_device_surface_formats(ctx.physical_device, surface)
        }
        .map_err(map_vk_error)?;
        let format = choose_surface_format(&formats).ok_or_else(|| {
            GraphicsError::FeatureNotSupported(
                "Surface offers no format the frame graph can render to".to_string(),
            )
        })?;

        let modes = unsafe {
            ctx.surface_loader
                .get_physical_device_surface_present_modes(ctx.physical_device, surface)
        }
        .map_err(map_vk_error)?;
        let present_mode = if modes.contains(&present_mode) {
            present_mode
        } else {
            log::info!("Present mode {present_mode:?} unsupported, falling back to FIFO");
            vk::PresentModeKHR::FIFO
        };

        let mut state = Self {
            surface,
            swapchain: vk::SwapchainKHR::null(),
            images: Vec::new(),
            views: Vec::new(),
            layouts: Vec::new(),
            format,
            extent: vk::Extent2D::default(),
            present_mode,
        };
        state.rebuild(ctx, extent)?;
        Ok(state)
    }

    pub fn info(&self) -> Result<SurfaceInfo, GraphicsError> {
        let format = texture_format_from_vk(self.format.format).ok_or_else(|| {
            GraphicsError::Internal(format!("Unmapped surface format {:?}", self.format.format))
        })?;
        Ok(SurfaceInfo {
            format,
            extent: Extent2d::new(self.extent.width, self.extent.height),
            image_count: self.images.len() as u32,
        })
    }

    /// Replace the swapchain with one sized for `extent` (or the surface's
    /// current extent when the platform dictates it). The device must be
    /// idle with respect to the old images.
    pub fn rebuild(
        &mut self,
        ctx: &SwapchainContext<'_>,
        extent: Extent2d,
    ) -> Result<(), GraphicsError> {
        let capabilities = unsafe {
            ctx.surface_loader
                .get_physical_device_surface_capabilities(ctx.physical_device, self.surface)
        }
        .map_err(map_vk_error)?;

        let extent = if capabilities.current_extent.width != u32::MAX {
            capabilities.current_extent
        } else {
            vk::Extent2D {
                width: extent.width.clamp(
                    capabilities.min_image_extent.width,
                    capabilities.max_image_extent.width,
                ),
                height: extent.height.clamp(
                    capabilities.min_image_extent.height,
                    capabilities.max_image_extent.height,
                ),
            }
        };
        if extent.width == 0 || extent.height == 0 {
            return Err(GraphicsError::InvalidParameter(
                "Cannot build a swapchain for a zero-sized surface".to_string(),
            ));
        }

        let max_images = if capabilities.max_image_count > 0 {
            capabilities.max_image_count
        } else {
            u32::MAX
        };
        let image_count = (capabilities.min_image_count + 1).min(max_images);

        let old_swapchain = self.swapchain;
        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(self.surface)
            .min_image_count(image_count)
            .image_format(self.format.format)
            .image_color_space(self.format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(self.present_mode)
            .clipped(true)
            .old_swapchain(old_swapchain);

        let swapchain = unsafe { ctx.swapchain_loader.create_swapchain(&create_info, None) }
            .map_err(|e| {
                GraphicsError::ResourceCreationFailed(format!("Failed to create swapchain: {e:?}"))
            })?;

        self.destroy_swapchain(ctx);
        self.swapchain = swapchain;
        self.extent = extent;

        self.images = unsafe { ctx.swapchain_loader.get_swapchain_images(swapchain) }
            .map_err(map_vk_error)?;
        self.layouts = vec![vk::ImageLayout::UNDEFINED; self.images.len()];
        for &image in &self.images {
            let view = create_view(ctx.device, image, self.format.format)?;
            self.views.push(view);
        }

        log::info!(
            "Swapchain built: {}x{}, {} images, {:?}",
            extent.width,
            extent.height,
            self.images.len(),
            self.present_mode
        );
        Ok(())
    }

    pub fn acquire(
        &self,
        ctx: &SwapchainContext<'_>,
        signal: vk::Semaphore,
    ) -> Result<AcquireOutcome, GraphicsError> {
        let result = unsafe {
            ctx.swapchain_loader
                .acquire_next_image(self.swapchain, u64::MAX, signal, vk::Fence::null())
        };
        match result {
            Ok((index, false)) => Ok(AcquireOutcome::Acquired(index)),
            Ok((index, true)) => Ok(AcquireOutcome::Suboptimal(index)),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireOutcome::OutOfDate),
            Err(e) => Err(map_vk_error(e)),
        }
    }

    pub fn swapchain(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    pub fn image(&self, index: u32) -> Option<(vk::Image, vk::ImageView)> {
        let index = index as usize;
        Some((*self.images.get(index)?, *self.views.get(index)?))
    }

    /// Record the transition of an image into `layout`, returning the layout
    /// it was in.
    pub fn transition(&mut self, index: u32, layout: vk::ImageLayout) -> vk::ImageLayout {
        match self.layouts.get_mut(index as usize) {
            Some(current) => std::mem::replace(current, layout),
            None => vk::ImageLayout::UNDEFINED,
        }
    }

    fn destroy_swapchain(&mut self, ctx: &SwapchainContext<'_>) {
        unsafe {
            for view in self.views.drain(..) {
                ctx.device.destroy_image_view(view, None);
            }
            if self.swapchain != vk::SwapchainKHR::null() {
                ctx.swapchain_loader.destroy_swapchain(self.swapchain, None);
            }
        }
        self.swapchain = vk::SwapchainKHR::null();
        self.images.clear();
        self.layouts.clear();
    }

    /// Destroy the swapchain and the surface itself.
    pub fn destroy(mut self, ctx: &SwapchainContext<'_>) {
        self.destroy_swapchain(ctx);
        unsafe { ctx.surface_loader.destroy_surface(self.surface, None) };
    }
}

/// Present several swapchains with one call and report each one's outcome.
pub fn present(
    swapchain_loader: &ash::khr::swapchain::Device,
    queue: vk::Queue,
    swapchains: &[vk::SwapchainKHR],
    image_indices: &[u32],
    waits: &[vk::Semaphore],
) -> Result<Vec<PresentOutcome>, GraphicsError> {
    let mut results = vec![vk::Result::SUCCESS; swapchains.len()];
    let present_info = vk::PresentInfoKHR::default()
        .wait_semaphores(waits)
        .swapchains(swapchains)
        .image_indices(image_indices)
        .results(&mut results);

    match unsafe { swapchain_loader.queue_present(queue, &present_info) } {
        Ok(_) | Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {}
        Err(e) => return Err(map_vk_error(e)),
    }

    results
        .into_iter()
        .map(|result| match result {
            vk::Result::SUCCESS => Ok(PresentOutcome::Presented),
            vk::Result::SUBOPTIMAL_KHR => Ok(PresentOutcome::Suboptimal),
            vk::Result::ERROR_OUT_OF_DATE_KHR => Ok(PresentOutcome::OutOfDate),
            e => Err(map_vk_error(e)),
        })
        .collect()
}

/// Prefer an sRGB 8-bit BGRA or RGBA format, then anything mappable.
fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    let preferred = [vk::Format::B8G8R8A8_SRGB, vk::Format::R8G8B8A8_SRGB];
    preferred
        .iter()
        .find_map(|wanted| {
            formats.iter().copied().find(|f| {
                f.format == *wanted && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
            })
        })
        .or_else(|| {
            formats
                .iter()
                .copied()
                .find(|f| texture_format_from_vk(f.format).is_some())
        })
}

fn create_view(
    device: &ash::Device,
    image: vk::Image,
    format: vk::Format,
) -> Result<vk::ImageView, GraphicsError> {
    let create_info = vk::ImageViewCreateInfo::default()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(format)
        .subresource_range(color_range());
    unsafe { device.create_image_view(&create_info, None) }.map_err(|e| {
        GraphicsError::ResourceCreationFailed(format!("Failed to create swapchain view: {e:?}"))
    })
}

pub fn color_range() -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask: vk::ImageAspectFlags::COLOR,
        base_mip_level: 0,
        level_count: 1,
        base_array_layer: 0,
        layer_count: 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn format(format: vk::Format) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }
    }

    #[test]
    fn test_prefers_srgb() {
        let formats = [format(vk::Format::B8G8R8A8_UNORM), format(vk::Format::B8G8R8A8_SRGB)];
        assert_eq!(
            choose_surface_format(&formats).map(|f| f.format),
            Some(vk::Format::B8G8R8A8_SRGB)
        );
    }

    #[test]
    fn test_falls_back_to_mappable_format() {
        let formats = [
            format(vk::Format::A2B10G10R10_UNORM_PACK32),
            format(vk::Format::R8G8B8A8_UNORM),
        ];
        assert_eq!(
            choose_surface_format(&formats).map(|f| f.format),
            Some(vk::Format::R8G8B8A8_UNORM)
        );
        assert!(choose_surface_format(&formats[..1]).is_none());
    }
}
