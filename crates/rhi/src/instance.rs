//! Vulkan instance and validation layer setup.

use std::ffi::{CStr, c_char};

use ash::{Entry, vk};
use tracing::{debug, error, info, warn};

use crate::allocator::HostCallbacks;
use crate::error::{RhiError, RhiResult};

const VALIDATION_LAYER_NAME: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Vulkan instance with an optional debug messenger.
///
/// Everything created from the instance holds an `Arc<Instance>`, so the
/// instance is always destroyed last.
pub struct Instance {
    entry: Entry,
    instance: ash::Instance,
    debug_utils: Option<ash::ext::debug_utils::Instance>,
    debug_messenger: Option<vk::DebugUtilsMessengerEXT>,
    callbacks: HostCallbacks,
}

impl Instance {
    /// Create a Vulkan 1.3 instance.
    ///
    /// `surface_extensions` are the platform extensions the windowing layer
    /// needs (see [`crate::surface::required_extensions`]); pass an empty slice
    /// for headless use. Validation is enabled only when requested and the
    /// layer is installed.
    pub fn new(
        app_name: &CStr,
        enable_validation: bool,
        surface_extensions: &[*const c_char],
        callbacks: HostCallbacks,
    ) -> RhiResult<Self> {
        let entry = unsafe { Entry::load()? };

        let validation_available =
            enable_validation && Self::is_validation_layer_available(&entry)?;
        if enable_validation && !validation_available {
            warn!("Validation layer requested but not available, proceeding without it");
        }

        let app_info = vk::ApplicationInfo::default()
            .application_name(app_name)
            .application_version(vk::make_api_version(0, 0, 1, 0))
            .engine_name(c"vkpbr")
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(vk::API_VERSION_1_3);

        let mut extensions = surface_extensions.to_vec();
        if validation_available {
            extensions.push(ash::ext::debug_utils::NAME.as_ptr());
        }

        let layers = if validation_available {
            vec![VALIDATION_LAYER_NAME.as_ptr()]
        } else {
            vec![]
        };

        let create_info = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layers);

        let instance = unsafe {
            entry
                .create_instance(&create_info, callbacks.get())
                .map_err(RhiError::vk("vkCreateInstance"))?
        };
        info!(
            extensions = extensions.len(),
            validation = validation_available,
            "Vulkan instance created (API 1.3)"
        );

        let (debug_utils, debug_messenger) = if validation_available {
            let debug_utils = ash::ext::debug_utils::Instance::new(&entry, &instance);
            match Self::setup_debug_messenger(&debug_utils, &callbacks) {
                Ok(messenger) => (Some(debug_utils), Some(messenger)),
                Err(e) => {
                    unsafe { instance.destroy_instance(callbacks.get()) };
                    return Err(e);
                }
            }
        } else {
            (None, None)
        };

        Ok(Self {
            entry,
            instance,
            debug_utils,
            debug_messenger,
            callbacks,
        })
    }

    #[inline]
    pub fn handle(&self) -> &ash::Instance {
        &self.instance
    }

    #[inline]
    pub fn entry(&self) -> &Entry {
        &self.entry
    }

    /// Host allocation callbacks shared with everything created from this instance.
    #[inline]
    pub fn callbacks(&self) -> &HostCallbacks {
        &self.callbacks
    }

    #[inline]
    pub fn has_validation(&self) -> bool {
        self.debug_messenger.is_some()
    }

    fn is_validation_layer_available(entry: &Entry) -> RhiResult<bool> {
        let available_layers = unsafe {
            entry
                .enumerate_instance_layer_properties()
                .map_err(RhiError::vk("vkEnumerateInstanceLayerProperties"))?
        };

        Ok(available_layers.iter().any(|layer| {
            layer
                .layer_name_as_c_str()
                .is_ok_and(|name| name == VALIDATION_LAYER_NAME)
        }))
    }

    fn setup_debug_messenger(
        debug_utils: &ash::ext::debug_utils::Instance,
        callbacks: &HostCallbacks,
    ) -> RhiResult<vk::DebugUtilsMessengerEXT> {
        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                    | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));

        let messenger = unsafe {
            debug_utils
                .create_debug_utils_messenger(&create_info, callbacks.get())
                .map_err(RhiError::vk("vkCreateDebugUtilsMessengerEXT"))?
        };
        debug!("Debug messenger created");
        Ok(messenger)
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        unsafe {
            if let (Some(debug_utils), Some(messenger)) = (&self.debug_utils, self.debug_messenger)
            {
                debug_utils.destroy_debug_utils_messenger(messenger, self.callbacks.get());
            }
            self.instance.destroy_instance(self.callbacks.get());
        }
        info!("Vulkan instance destroyed");
    }
}

// SAFETY: ash::Instance is a table of function pointers plus a handle; the
// Vulkan instance is externally synchronized only for destruction, which
// happens in Drop with exclusive access.
unsafe impl Send for Instance {}
unsafe impl Sync for Instance {}

/// Forwards validation messages to tracing at the matching level.
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    if p_callback_data.is_null() {
        return vk::FALSE;
    }

    let callback_data = unsafe { &*p_callback_data };
    let message = if callback_data.p_message.is_null() {
        std::borrow::Cow::Borrowed("(no message)")
    } else {
        unsafe { CStr::from_ptr(callback_data.p_message).to_string_lossy() }
    };

    let kind = match message_type {
        vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION => "validation",
        vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE => "performance",
        _ => "general",
    };

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => error!(target: "vulkan", kind, "{message}"),
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => warn!(target: "vulkan", kind, "{message}"),
        vk::DebugUtilsMessageSeverityFlagsEXT::INFO => debug!(target: "vulkan", kind, "{message}"),
        _ => tracing::trace!(target: "vulkan", kind, "{message}"),
    }

    vk::FALSE
}
