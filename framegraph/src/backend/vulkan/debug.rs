//! Validation-layer messages routed into the `log` crate.

use std::ffi::CStr;

use ash::vk;

use crate::error::GraphicsError;

/// Create a messenger forwarding warnings and errors (and info in debug
/// builds) to the logger.
pub fn create_debug_messenger(
    debug_utils: &ash::ext::debug_utils::Instance,
) -> Result<vk::DebugUtilsMessengerEXT, GraphicsError> {
    let create_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
        .message_severity(severity_filter())
        .message_type(
            vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        )
        .pfn_user_callback(Some(debug_callback));

    let messenger = unsafe { debug_utils.create_debug_utils_messenger(&create_info, None) }
        .map_err(|e| {
            GraphicsError::InitializationFailed(format!(
                "Failed to create debug messenger: {:?}",
                e
            ))
        })?;

    Ok(messenger)
}

fn severity_filter() -> vk::DebugUtilsMessageSeverityFlagsEXT {
    let mut severity = vk::DebugUtilsMessageSeverityFlagsEXT::ERROR
        | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING;
    if cfg!(debug_assertions) {
        severity |= vk::DebugUtilsMessageSeverityFlagsEXT::INFO;
    }
    severity
}

unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    // SAFETY: the loader passes either null or a valid callback payload.
    let message = unsafe { callback_data.as_ref() }
        .filter(|data| !data.p_message.is_null())
        // SAFETY: p_message is a NUL-terminated string owned by the loader.
        .map(|data| unsafe { CStr::from_ptr(data.p_message) }.to_string_lossy())
        .unwrap_or_default();

    let kind = if message_type.contains(vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION) {
        "validation"
    } else if message_type.contains(vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE) {
        "performance"
    } else {
        "general"
    };

    let level = if message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        log::Level::Error
    } else if message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        log::Level::Warn
    } else if message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
        log::Level::Info
    } else {
        log::Level::Debug
    };
    log::log!(target: "redlilium_framegraph::vulkan", level, "[{kind}] {message}");

    vk::FALSE
}
