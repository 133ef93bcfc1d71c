//! Vulkan instance creation and validation message routing.

use crate::error::{GpuError, Result};
use ash::vk;
use raw_window_handle::RawDisplayHandle;
use std::ffi::{c_char, c_void, CStr, CString};
use tracing::Level;

/// Validation layers to enable when validation is requested.
pub fn validation_layers() -> Vec<&'static CStr> {
    vec![c"VK_LAYER_KHRONOS_validation"]
}

/// Instance extensions needed to present to the given display, plus
/// debug utils when validation is enabled.
pub fn required_instance_extensions(
    display: RawDisplayHandle,
    enable_validation: bool,
) -> Result<Vec<*const c_char>> {
    let mut extensions = ash_window::enumerate_required_extensions(display)
        .map_err(|e| GpuError::ExtensionNotSupported(format!("window system: {e}")))?
        .to_vec();

    if enable_validation {
        extensions.push(ash::ext::debug_utils::NAME.as_ptr());
    }

    #[cfg(target_os = "macos")]
    extensions.push(ash::khr::portability_enumeration::NAME.as_ptr());

    Ok(extensions)
}

/// Owned Vulkan instance.
///
/// Holds the loader entry for as long as the instance lives and tears down
/// the validation messenger before the instance itself.
pub struct Instance {
    entry: ash::Entry,
    instance: ash::Instance,
    debug: Option<DebugMessenger>,
}

struct DebugMessenger {
    loader: ash::ext::debug_utils::Instance,
    messenger: vk::DebugUtilsMessengerEXT,
}

impl Instance {
    /// Load Vulkan and create an instance able to present to `display`.
    ///
    /// # Safety
    /// `display` must be a valid display handle for the lifetime of any
    /// surface created from this instance.
    pub unsafe fn new(
        app_name: &str,
        enable_validation: bool,
        display: RawDisplayHandle,
    ) -> Result<Self> {
        let entry = ash::Entry::load().map_err(|e| GpuError::Loading(e.to_string()))?;

        log_instance_extensions(&entry)?;

        let app_name = CString::new(app_name)
            .map_err(|e| GpuError::InvalidState(format!("Invalid application name: {e}")))?;

        let app_info = vk::ApplicationInfo::default()
            .application_name(&app_name)
            .application_version(vk::make_api_version(0, 0, 1, 0))
            .engine_name(c"Lumen")
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(vk::API_VERSION_1_3);

        let extension_names = required_instance_extensions(display, enable_validation)?;

        let layers = if enable_validation {
            available_layers(&entry, &validation_layers())?
        } else {
            vec![]
        };
        let layer_names: Vec<*const c_char> = layers.iter().map(|l| l.as_ptr()).collect();

        // Required for MoltenVK on macOS
        #[cfg(target_os = "macos")]
        let create_flags = vk::InstanceCreateFlags::ENUMERATE_PORTABILITY_KHR;
        #[cfg(not(target_os = "macos"))]
        let create_flags = vk::InstanceCreateFlags::empty();

        let mut debug_info = debug_messenger_create_info();

        let mut create_info = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_extension_names(&extension_names)
            .enabled_layer_names(&layer_names)
            .flags(create_flags);

        // Also covers messages emitted during instance creation itself
        if enable_validation {
            create_info = create_info.push_next(&mut debug_info);
        }

        let instance = entry.create_instance(&create_info, None)?;

        let debug = if enable_validation {
            let loader = ash::ext::debug_utils::Instance::new(&entry, &instance);
            match loader.create_debug_utils_messenger(&debug_messenger_create_info(), None) {
                Ok(messenger) => Some(DebugMessenger { loader, messenger }),
                Err(e) => {
                    instance.destroy_instance(None);
                    return Err(e.into());
                }
            }
        } else {
            None
        };

        let validation = debug.is_some();
        tracing::debug!("Created Vulkan 1.3 instance (validation: {})", validation);

        Ok(Self {
            entry,
            instance,
            debug,
        })
    }

    /// Get the loader entry.
    pub fn entry(&self) -> &ash::Entry {
        &self.entry
    }

    /// Get the raw instance.
    pub fn raw(&self) -> &ash::Instance {
        &self.instance
    }

    /// Whether validation output is being routed to the log.
    pub fn validation_enabled(&self) -> bool {
        self.debug.is_some()
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        unsafe {
            if let Some(debug) = self.debug.take() {
                debug
                    .loader
                    .destroy_debug_utils_messenger(debug.messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

/// Filter `requested` down to the layers this loader actually provides.
unsafe fn available_layers(
    entry: &ash::Entry,
    requested: &[&'static CStr],
) -> Result<Vec<&'static CStr>> {
    let available = entry.enumerate_instance_layer_properties()?;

    let mut layers = Vec::with_capacity(requested.len());
    for &layer in requested {
        let found = available
            .iter()
            .any(|props| CStr::from_ptr(props.layer_name.as_ptr()) == layer);
        if found {
            layers.push(layer);
        } else {
            tracing::warn!("Validation layer {:?} not available", layer);
        }
    }

    Ok(layers)
}

unsafe fn log_instance_extensions(entry: &ash::Entry) -> Result<()> {
    let extensions = entry.enumerate_instance_extension_properties(None)?;
    tracing::debug!("Supported instance extensions ({}):", extensions.len());
    for props in &extensions {
        let name = CStr::from_ptr(props.extension_name.as_ptr());
        tracing::debug!("  {}", name.to_string_lossy());
    }
    Ok(())
}

fn debug_messenger_create_info() -> vk::DebugUtilsMessengerCreateInfoEXT<'static> {
    vk::DebugUtilsMessengerCreateInfoEXT::default()
        .message_severity(
            vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
                | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        )
        .message_type(
            vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        )
        .pfn_user_callback(Some(debug_callback))
}

/// Log level a validation message is reported at.
fn severity_level(severity: vk::DebugUtilsMessageSeverityFlagsEXT) -> Level {
    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        Level::ERROR
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        Level::WARN
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
        Level::INFO
    } else {
        Level::DEBUG
    }
}

unsafe extern "system" fn debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user_data: *mut c_void,
) -> vk::Bool32 {
    if callback_data.is_null() || (*callback_data).p_message.is_null() {
        return vk::FALSE;
    }
    let message = CStr::from_ptr((*callback_data).p_message).to_string_lossy();

    let level = severity_level(severity);
    if level == Level::ERROR {
        tracing::error!(target: "vulkan", "[{:?}] {}", message_type, message);
    } else if level == Level::WARN {
        tracing::warn!(target: "vulkan", "[{:?}] {}", message_type, message);
    } else if level == Level::INFO {
        tracing::info!(target: "vulkan", "[{:?}] {}", message_type, message);
    } else {
        tracing::debug!(target: "vulkan", "[{:?}] {}", message_type, message);
    }

    vk::FALSE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_maps_to_log_level() {
        use vk::DebugUtilsMessageSeverityFlagsEXT as Severity;

        assert_eq!(severity_level(Severity::VERBOSE), Level::DEBUG);
        assert_eq!(severity_level(Severity::INFO), Level::INFO);
        assert_eq!(severity_level(Severity::WARNING), Level::WARN);
        assert_eq!(severity_level(Severity::ERROR), Level::ERROR);
        assert_eq!(severity_level(Severity::WARNING | Severity::ERROR), Level::ERROR);
    }

    #[test]
    fn messenger_listens_to_every_severity() {
        let info = debug_messenger_create_info();
        assert!(info
            .message_severity
            .contains(vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE));
        assert!(info
            .message_severity
            .contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR));
        assert!(info.pfn_user_callback.is_some());
    }
}
