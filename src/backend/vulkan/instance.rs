// Vulkan instance - loader, validation, adapter discovery
//
// Responsibilities:
// - Instance creation with validation layers
// - Surface extensions for every platform the loader offers
// - Adapter enumeration, best GPU first (discrete > integrated > other)

use super::convert;
use crate::backend::{Adapter, Capabilities};
use crate::error::{Error, Result};
use ash::extensions::{ext::DebugUtils, khr};
use ash::{vk, Entry};
use std::ffi::{c_char, CStr, CString};

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Queue family used for each kind, with the family's queue count.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueFamilies {
    pub graphics: Option<(u32, u32)>,
    pub compute: Option<(u32, u32)>,
    pub transfer: Option<(u32, u32)>,
}

impl QueueFamilies {
    /// Prefer dedicated compute and transfer families; fall back to the
    /// graphics family, which always supports both.
    pub fn select(families: &[vk::QueueFamilyProperties]) -> Self {
        let find = |required: vk::QueueFlags, excluded: vk::QueueFlags| {
            families
                .iter()
                .enumerate()
                .find(|(_, props)| {
                    props.queue_count > 0
                        && props.queue_flags.contains(required)
                        && !props.queue_flags.intersects(excluded)
                })
                .map(|(i, props)| (i as u32, props.queue_count))
        };

        let graphics = find(vk::QueueFlags::GRAPHICS, vk::QueueFlags::empty());
        let compute = find(vk::QueueFlags::COMPUTE, vk::QueueFlags::GRAPHICS).or(graphics);
        let transfer = find(
            vk::QueueFlags::TRANSFER,
            vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE,
        )
        .or(compute);

        Self {
            graphics,
            compute,
            transfer,
        }
    }
}

/// Everything cached about one physical device.
pub struct PhysicalDevice {
    pub handle: vk::PhysicalDevice,
    pub properties: vk::PhysicalDeviceProperties,
    pub features: vk::PhysicalDeviceFeatures,
    pub families: QueueFamilies,
    pub extensions: Vec<CString>,
    pub adapter: Adapter,
}

impl PhysicalDevice {
    pub fn supports_extension(&self, name: &CStr) -> bool {
        self.extensions.iter().any(|e| e.as_c_str() == name)
    }
}

/// Vulkan instance wrapper with automatic cleanup
pub struct VulkanInstance {
    pub physical_devices: Vec<PhysicalDevice>,
    pub surface_loader: Option<khr::Surface>,
    enabled_extensions: Vec<CString>,
    debug_utils: Option<(DebugUtils, vk::DebugUtilsMessengerEXT)>,
    pub instance: ash::Instance,
    pub entry: Entry,
}

impl VulkanInstance {
    pub fn new(app_name: &str, enable_validation: bool) -> Result<Self> {
        log::info!("Creating Vulkan instance: {}", app_name);

        // Step 1: Load Vulkan library
        let entry = unsafe { Entry::load() }.map_err(|e| {
            Error::Unsupported(format!("failed to load Vulkan library ({}). Is Vulkan installed?", e))
        })?;

        // Step 2: Create instance
        let (instance, enabled_extensions, validation) = Self::create_instance(&entry, app_name, enable_validation)?;

        // Step 3: Setup debug messenger if validation enabled
        let debug_utils = if validation {
            match Self::setup_debug_messenger(&entry, &instance) {
                Ok(debug_utils) => Some(debug_utils),
                Err(e) => {
                    log::warn!("Debug messenger unavailable: {}", e);
                    None
                }
            }
        } else {
            None
        };

        let has_surface = enabled_extensions.iter().any(|e| e.as_c_str() == khr::Surface::name());
        let surface_loader = has_surface.then(|| khr::Surface::new(&entry, &instance));

        let mut this = Self {
            physical_devices: Vec::new(),
            surface_loader,
            enabled_extensions,
            debug_utils,
            instance,
            entry,
        };

        // Step 4: Enumerate adapters, best first
        this.physical_devices = this.enumerate_physical_devices()?;
        if this.physical_devices.is_empty() {
            return Err(Error::Unsupported("no Vulkan-capable GPU found".into()));
        }
        for (index, device) in this.physical_devices.iter().enumerate() {
            log::info!(
                "Adapter {}: {} ({:?}), API {}.{}.{}",
                index,
                device.adapter.name,
                device.adapter.adapter_type,
                vk::api_version_major(device.properties.api_version),
                vk::api_version_minor(device.properties.api_version),
                vk::api_version_patch(device.properties.api_version)
            );
        }

        Ok(this)
    }

    pub fn has_extension(&self, name: &CStr) -> bool {
        self.enabled_extensions.iter().any(|e| e.as_c_str() == name)
    }

    fn create_instance(
        entry: &Entry,
        app_name: &str,
        enable_validation: bool,
    ) -> Result<(ash::Instance, Vec<CString>, bool)> {
        let app_name_cstr = CString::new(app_name).map_err(|e| Error::InvalidArgument(e.to_string()))?;
        let engine_name = c"render-device";

        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name_cstr)
            .application_version(vk::make_api_version(0, 0, 1, 0))
            .engine_name(engine_name)
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(vk::API_VERSION_1_3);

        // Surface extensions for every windowing system, keeping those the
        // loader has. Headless devices work without any of them.
        let available = entry.enumerate_instance_extension_properties(None)?;
        let available: Vec<CString> = available
            .iter()
            .map(|props| unsafe { CStr::from_ptr(props.extension_name.as_ptr()) }.to_owned())
            .collect();

        let mut wanted = vec![
            khr::Surface::name(),
            khr::Win32Surface::name(),
            khr::XlibSurface::name(),
            khr::XcbSurface::name(),
            khr::WaylandSurface::name(),
        ];
        if enable_validation {
            wanted.push(DebugUtils::name());
        }
        let extensions = select_supported(&available, &wanted);

        // Validation layers
        let validation = enable_validation && {
            let layers = entry.enumerate_instance_layer_properties()?;
            let found = layers
                .iter()
                .any(|layer| unsafe { CStr::from_ptr(layer.layer_name.as_ptr()) } == VALIDATION_LAYER);
            if !found {
                log::warn!("Validation requested but {:?} is not installed", VALIDATION_LAYER);
            }
            found
        };
        let layer_names = if validation {
            vec![VALIDATION_LAYER.as_ptr()]
        } else {
            vec![]
        };

        let extension_ptrs: Vec<*const c_char> = extensions.iter().map(|e| e.as_ptr()).collect();
        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extension_ptrs)
            .enabled_layer_names(&layer_names);

        let instance = unsafe { entry.create_instance(&create_info, None) }?;
        log::debug!("Instance extensions: {:?}", extensions);

        Ok((instance, extensions, validation))
    }

    fn setup_debug_messenger(
        entry: &Entry,
        instance: &ash::Instance,
    ) -> Result<(DebugUtils, vk::DebugUtilsMessengerEXT)> {
        let debug_utils = DebugUtils::new(entry, instance);

        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::WARNING | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));

        let messenger = unsafe { debug_utils.create_debug_utils_messenger(&create_info, None) }?;

        Ok((debug_utils, messenger))
    }

    fn enumerate_physical_devices(&self) -> Result<Vec<PhysicalDevice>> {
        let handles = unsafe { self.instance.enumerate_physical_devices() }?;

        let mut devices = Vec::new();
        for handle in handles {
            let properties = unsafe { self.instance.get_physical_device_properties(handle) };
            let features = unsafe { self.instance.get_physical_device_features(handle) };
            let queue_families = unsafe { self.instance.get_physical_device_queue_family_properties(handle) };
            let families = QueueFamilies::select(&queue_families);

            // Adapters without a graphics family cannot drive a swapchain
            let Some((_, graphics_count)) = families.graphics else {
                continue;
            };

            let extensions: Vec<CString> = unsafe { self.instance.enumerate_device_extension_properties(handle) }?
                .iter()
                .map(|props| unsafe { CStr::from_ptr(props.extension_name.as_ptr()) }.to_owned())
                .collect();

            let name = unsafe { CStr::from_ptr(properties.device_name.as_ptr()) }
                .to_string_lossy()
                .into_owned();

            let mut device = PhysicalDevice {
                handle,
                properties,
                features,
                families,
                extensions,
                adapter: Adapter {
                    name,
                    adapter_type: convert::adapter_type(properties.device_type),
                    vendor_id: properties.vendor_id,
                    device_id: properties.device_id,
                    max_graphics_queues: graphics_count,
                    max_compute_queues: families.compute.map_or(0, |(_, count)| count),
                    max_transfer_queues: families.transfer.map_or(0, |(_, count)| count),
                    capabilities: Capabilities::default(),
                },
            };
            device.adapter.capabilities = self.capabilities(&device);
            devices.push(device);
        }

        // Score each device (prefer discrete GPU); sort keeps driver order on ties
        devices.sort_by_key(|device| std::cmp::Reverse(device_score(device.properties.device_type)));
        Ok(devices)
    }

    fn capabilities(&self, device: &PhysicalDevice) -> Capabilities {
        let api_version = device.properties.api_version;
        let mut capabilities = Capabilities {
            index_type_uint8: device.supports_extension(c"VK_EXT_index_type_uint8"),
            pipeline_statistics: device.features.pipeline_statistics_query == vk::TRUE,
            independent_blending: device.features.independent_blend == vk::TRUE,
            fragment_stores_and_atomics: device.features.fragment_stores_and_atomics == vk::TRUE,
            fragment_density_map: device.supports_extension(vk::ExtFragmentDensityMapFn::name()),
            variable_rate_shading: device.supports_extension(vk::KhrFragmentShadingRateFn::name()),
            ..Capabilities::default()
        };

        if api_version < vk::API_VERSION_1_2 {
            return capabilities;
        }

        let mut vulkan11 = vk::PhysicalDeviceVulkan11Features::default();
        let mut vulkan12 = vk::PhysicalDeviceVulkan12Features::default();
        let mut vulkan13 = vk::PhysicalDeviceVulkan13Features::default();
        let mut features2 = vk::PhysicalDeviceFeatures2::builder()
            .push_next(&mut vulkan11)
            .push_next(&mut vulkan12);
        if api_version >= vk::API_VERSION_1_3 {
            features2 = features2.push_next(&mut vulkan13);
        }
        unsafe {
            self.instance.get_physical_device_features2(device.handle, &mut features2);
        }

        capabilities.multi_view = vulkan11.multiview == vk::TRUE;
        capabilities.partial_descriptor_bindings = vulkan12.descriptor_binding_partially_bound == vk::TRUE;
        capabilities.dynamic_rendering = vulkan13.dynamic_rendering == vk::TRUE;
        capabilities
    }
}

impl Drop for VulkanInstance {
    fn drop(&mut self) {
        unsafe {
            if let Some((debug_utils, messenger)) = self.debug_utils.take() {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

fn device_score(device_type: vk::PhysicalDeviceType) -> u32 {
    match device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => 1000,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 100,
        _ => 1,
    }
}

/// The entries of `wanted` present in `available`, in `wanted` order.
pub fn select_supported(available: &[CString], wanted: &[&CStr]) -> Vec<CString> {
    wanted
        .iter()
        .filter(|name| available.iter().any(|a| a.as_c_str() == **name))
        .map(|name| (*name).to_owned())
        .collect()
}

// Debug callback for validation layers
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _p_user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    let message = CStr::from_ptr((*p_callback_data).p_message);

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => {
            log::error!("[Vulkan] {}", message.to_string_lossy());
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => {
            log::warn!("[Vulkan] {}", message.to_string_lossy());
        }
        _ => {
            log::debug!("[Vulkan] {}", message.to_string_lossy());
        }
    }

    vk::FALSE
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags, count: u32) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: count,
            ..Default::default()
        }
    }

    #[test]
    fn prefers_dedicated_families() {
        let families = [
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER, 16),
            family(vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER, 8),
            family(vk::QueueFlags::TRANSFER, 2),
        ];
        let selected = QueueFamilies::select(&families);
        assert_eq!(selected.graphics, Some((0, 16)));
        assert_eq!(selected.compute, Some((1, 8)));
        assert_eq!(selected.transfer, Some((2, 2)));
    }

    #[test]
    fn single_family_serves_every_kind() {
        let families = [family(
            vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER,
            1,
        )];
        let selected = QueueFamilies::select(&families);
        assert_eq!(selected.graphics, Some((0, 1)));
        assert_eq!(selected.compute, Some((0, 1)));
        assert_eq!(selected.transfer, Some((0, 1)));
    }

    #[test]
    fn keeps_only_available_extensions() {
        let available = vec![khr::Surface::name().to_owned(), khr::XcbSurface::name().to_owned()];
        let selected = select_supported(&available, &[khr::Surface::name(), khr::Win32Surface::name(), khr::XcbSurface::name()]);
        assert_eq!(selected, available);
    }

    #[test]
    fn discrete_gpus_score_highest() {
        assert!(device_score(vk::PhysicalDeviceType::DISCRETE_GPU) > device_score(vk::PhysicalDeviceType::INTEGRATED_GPU));
        assert_eq!(device_score(vk::PhysicalDeviceType::CPU), 1);
    }
}
