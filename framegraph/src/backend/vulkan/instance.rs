//! Vulkan instance creation.

use std::ffi::{CStr, CString};

use ash::vk;

use crate::error::GraphicsError;

use super::debug;

/// MoltenVK tops out at 1.2; dynamic rendering and synchronization2 come from
/// their KHR extensions there.
#[cfg(target_os = "macos")]
const API_VERSION: u32 = vk::make_api_version(0, 1, 2, 0);

#[cfg(not(target_os = "macos"))]
const API_VERSION: u32 = vk::make_api_version(0, 1, 3, 0);

const VALIDATION_LAYER_NAME: &CStr = c"VK_LAYER_KHRONOS_validation";

const ENGINE_NAME: &CStr = c"RedLilium Frame Graph";

/// Instance plus the optional validation messenger.
pub struct InstanceBundle {
    pub instance: ash::Instance,
    pub debug_utils: Option<ash::ext::debug_utils::Instance>,
    pub debug_messenger: Option<vk::DebugUtilsMessengerEXT>,
}

/// Create an instance with every surface extension this platform may need.
///
/// Validation is enabled only when requested and the Khronos layer is
/// installed; otherwise a warning is logged and creation continues.
pub fn create_instance(
    entry: &ash::Entry,
    application_name: &str,
    validation_requested: bool,
) -> Result<InstanceBundle, GraphicsError> {
    let validation = validation_requested && has_validation_layer(entry);
    if validation_requested && !validation {
        log::warn!("Validation requested but VK_LAYER_KHRONOS_validation is not installed");
    }

    let app_name = CString::new(application_name).map_err(|e| {
        GraphicsError::InvalidParameter(format!("Application name contains a NUL byte: {e}"))
    })?;

    let app_info = vk::ApplicationInfo::default()
        .application_name(&app_name)
        .application_version(vk::make_api_version(0, 0, 1, 0))
        .engine_name(ENGINE_NAME)
        .engine_version(vk::make_api_version(0, 0, 1, 0))
        .api_version(API_VERSION);

    let mut extensions = vec![ash::khr::surface::NAME.as_ptr()];
    if validation {
        extensions.push(ash::ext::debug_utils::NAME.as_ptr());
    }

    #[cfg(target_os = "windows")]
    extensions.push(ash::khr::win32_surface::NAME.as_ptr());

    #[cfg(all(unix, not(target_os = "macos"), not(target_os = "android")))]
    {
        extensions.push(ash::khr::xlib_surface::NAME.as_ptr());
        extensions.push(ash::khr::xcb_surface::NAME.as_ptr());
        extensions.push(ash::khr::wayland_surface::NAME.as_ptr());
    }

    #[cfg(target_os = "macos")]
    {
        extensions.push(ash::khr::portability_enumeration::NAME.as_ptr());
        extensions.push(ash::ext::metal_surface::NAME.as_ptr());
    }

    let layers: Vec<*const std::ffi::c_char> = if validation {
        vec![VALIDATION_LAYER_NAME.as_ptr()]
    } else {
        Vec::new()
    };

    #[allow(unused_mut)]
    let mut flags = vk::InstanceCreateFlags::empty();
    #[cfg(target_os = "macos")]
    {
        flags |= vk::InstanceCreateFlags::ENUMERATE_PORTABILITY_KHR;
    }

    let create_info = vk::InstanceCreateInfo::default()
        .flags(flags)
        .application_info(&app_info)
        .enabled_extension_names(&extensions)
        .enabled_layer_names(&layers);

    let instance = unsafe { entry.create_instance(&create_info, None) }.map_err(|e| {
        GraphicsError::InitializationFailed(format!("Failed to create Vulkan instance: {e:?}"))
    })?;

    if !validation {
        return Ok(InstanceBundle {
            instance,
            debug_utils: None,
            debug_messenger: None,
        });
    }

    let debug_utils = ash::ext::debug_utils::Instance::new(entry, &instance);
    match debug::create_debug_messenger(&debug_utils) {
        Ok(messenger) => Ok(InstanceBundle {
            instance,
            debug_utils: Some(debug_utils),
            debug_messenger: Some(messenger),
        }),
        Err(e) => {
            unsafe { instance.destroy_instance(None) };
            Err(e)
        }
    }
}

fn has_validation_layer(entry: &ash::Entry) -> bool {
    let Ok(layers) = (unsafe { entry.enumerate_instance_layer_properties() }) else {
        return false;
    };
    layers.iter().any(|layer| {
        layer
            .layer_name_as_c_str()
            .is_ok_and(|name| name == VALIDATION_LAYER_NAME)
    })
}
