// Vulkan logical device - queues, features, memory allocator
//
// Queue kinds that share a family get consecutive queue indices within it.
// When a shared family is smaller than the combined request, later queues
// alias earlier ones.

use super::instance::{PhysicalDevice, VulkanInstance};
use crate::backend::ShadingRateMode;
use crate::device::DeviceCreateInfo;
use crate::error::{Error, Result};
use crate::objects::QueueKind;
use ash::extensions::khr;
use ash::vk;
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use std::collections::BTreeMap;
use std::ffi::{c_char, CString};

/// Where each queue kind's queues live.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct QueuePlan {
    /// (family, first queue index) per kind: graphics, compute, transfer.
    pub slots: [Option<(u32, u32)>; 3],
    /// Queues created per family.
    pub families: BTreeMap<u32, u32>,
}

impl QueuePlan {
    pub fn new(device: &PhysicalDevice, info: &DeviceCreateInfo) -> Result<Self> {
        let requests = [
            (device.families.graphics, info.graphics_queue_count, "graphics"),
            (device.families.compute, info.compute_queue_count, "compute"),
            (device.families.transfer, info.transfer_queue_count, "transfer"),
        ];

        let mut plan = QueuePlan::default();
        let mut requested: BTreeMap<u32, (u32, u32)> = BTreeMap::new();
        for (slot, (family, count, name)) in requests.into_iter().enumerate() {
            if count == 0 {
                continue;
            }
            let (family, size) =
                family.ok_or_else(|| Error::Unsupported(format!("{} queues on '{}'", name, device.adapter.name)))?;
            let entry = requested.entry(family).or_insert((0, size));
            plan.slots[slot] = Some((family, entry.0));
            entry.0 += count;
        }

        for (family, (count, size)) in requested {
            if count > size {
                log::warn!(
                    "Queue family {} has {} queues, {} requested; queues will be shared",
                    family,
                    size,
                    count
                );
            }
            plan.families.insert(family, count.min(size));
        }
        Ok(plan)
    }

    /// Family and queue index for the `index`-th queue of `kind`.
    pub fn locate(&self, kind: QueueKind, index: u32) -> Result<(u32, u32)> {
        let slot = match kind {
            QueueKind::Graphics => 0,
            QueueKind::Compute => 1,
            QueueKind::Transfer => 2,
        };
        let (family, first) = self.slots[slot].ok_or_else(|| Error::Unsupported(format!("{:?} queues", kind)))?;
        let created = self.families.get(&family).copied().unwrap_or(1).max(1);
        Ok((family, (first + index) % created))
    }
}

/// Optional core features turned on when the adapter has them.
#[derive(Clone, Copy, Debug, Default)]
pub struct EnabledFeatures {
    pub sampler_anisotropy: bool,
    pub pipeline_statistics: bool,
    pub max_anisotropy: f32,
}

/// Vulkan device wrapper with automatic cleanup
pub struct LogicalDevice {
    // Vulkan handles (order matters for drop!)
    pub allocator: Option<Allocator>,
    pub swapchain_loader: Option<khr::Swapchain>,
    pub device: ash::Device,
    pub physical_device: vk::PhysicalDevice,
    pub queue_plan: QueuePlan,
    pub features: EnabledFeatures,
}

impl LogicalDevice {
    pub fn new(instance: &VulkanInstance, adapter_index: usize, info: &DeviceCreateInfo) -> Result<Self> {
        let physical = instance
            .physical_devices
            .get(adapter_index)
            .ok_or_else(|| Error::out_of_range("adapter", adapter_index as u32, instance.physical_devices.len()))?;

        // Step 1: Plan queues per family
        let queue_plan = QueuePlan::new(physical, info)?;
        let priorities: Vec<Vec<f32>> = queue_plan.families.values().map(|&count| vec![1.0; count as usize]).collect();
        let queue_create_infos: Vec<vk::DeviceQueueCreateInfo> = queue_plan
            .families
            .keys()
            .zip(&priorities)
            .map(|(&family, priorities)| {
                vk::DeviceQueueCreateInfo::builder()
                    .queue_family_index(family)
                    .queue_priorities(priorities)
                    .build()
            })
            .collect();

        // Step 2: Device extensions
        let mut extensions: Vec<CString> = Vec::new();
        let has_swapchain = physical.supports_extension(khr::Swapchain::name());
        if has_swapchain {
            extensions.push(khr::Swapchain::name().to_owned());
        }
        match info.shading_rate_mode {
            ShadingRateMode::None => {}
            ShadingRateMode::Fdm => extensions.push(vk::ExtFragmentDensityMapFn::name().to_owned()),
            ShadingRateMode::Vrs => extensions.push(vk::KhrFragmentShadingRateFn::name().to_owned()),
        }
        for name in &info.extensions {
            let name = CString::new(name.as_str()).map_err(|e| Error::InvalidArgument(e.to_string()))?;
            if !physical.supports_extension(&name) {
                return Err(Error::Unsupported(format!(
                    "device extension {:?} on '{}'",
                    name, physical.adapter.name
                )));
            }
            if !extensions.contains(&name) {
                extensions.push(name);
            }
        }
        let extension_ptrs: Vec<*const c_char> = extensions.iter().map(|e| e.as_ptr()).collect();

        // Step 3: Core features the adapter offers
        let supported = &physical.features;
        let enabled_features = vk::PhysicalDeviceFeatures {
            fill_mode_non_solid: supported.fill_mode_non_solid,
            sampler_anisotropy: supported.sampler_anisotropy,
            independent_blend: supported.independent_blend,
            fragment_stores_and_atomics: supported.fragment_stores_and_atomics,
            pipeline_statistics_query: supported.pipeline_statistics_query,
            ..Default::default()
        };
        let mut multiview = vk::PhysicalDeviceMultiviewFeatures::builder().multiview(info.multi_view);

        let mut create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&extension_ptrs)
            .enabled_features(&enabled_features);
        if info.multi_view {
            create_info = create_info.push_next(&mut multiview);
        }

        // Step 4: Create logical device
        let device = unsafe { instance.instance.create_device(physical.handle, &create_info, None) }?;
        log::info!("Logical device created with extensions {:?}", extensions);

        // Step 5: Create memory allocator
        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.instance.clone(),
            device: device.clone(),
            physical_device: physical.handle,
            debug_settings: Default::default(),
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        });
        let allocator = match allocator {
            Ok(allocator) => allocator,
            Err(e) => {
                unsafe { device.destroy_device(None) };
                return Err(e.into());
            }
        };

        let swapchain_loader = has_swapchain.then(|| khr::Swapchain::new(&instance.instance, &device));

        Ok(Self {
            allocator: Some(allocator),
            swapchain_loader,
            device,
            physical_device: physical.handle,
            queue_plan,
            features: EnabledFeatures {
                sampler_anisotropy: supported.sampler_anisotropy == vk::TRUE,
                pipeline_statistics: supported.pipeline_statistics_query == vk::TRUE,
                max_anisotropy: physical.properties.limits.max_sampler_anisotropy,
            },
        })
    }

    pub fn allocator(&mut self) -> Result<&mut Allocator> {
        self.allocator
            .as_mut()
            .ok_or_else(|| Error::Unsupported("memory allocation after teardown".into()))
    }

    pub fn swapchain_loader(&self) -> Result<&khr::Swapchain> {
        self.swapchain_loader
            .as_ref()
            .ok_or_else(|| Error::Unsupported("VK_KHR_swapchain on this adapter".into()))
    }

    /// Wait for device to be idle (e.g., before cleanup)
    pub fn wait_idle(&self) -> Result<()> {
        unsafe { self.device.device_wait_idle() }?;
        Ok(())
    }
}

impl Drop for LogicalDevice {
    fn drop(&mut self) {
        log::info!("Destroying Vulkan device...");

        // Wait for device to finish
        let _ = self.wait_idle();

        // The allocator frees its memory blocks through the device
        drop(self.allocator.take());
        unsafe {
            self.device.destroy_device(None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::vulkan::instance::QueueFamilies;
    use crate::backend::{Adapter, AdapterType, Capabilities};

    fn physical(families: QueueFamilies) -> PhysicalDevice {
        PhysicalDevice {
            handle: vk::PhysicalDevice::null(),
            properties: Default::default(),
            features: Default::default(),
            families,
            extensions: Vec::new(),
            adapter: Adapter {
                name: "test".into(),
                adapter_type: AdapterType::Discrete,
                vendor_id: 0,
                device_id: 0,
                max_graphics_queues: 4,
                max_compute_queues: 4,
                max_transfer_queues: 4,
                capabilities: Capabilities::default(),
            },
        }
    }

    #[test]
    fn shared_family_gets_consecutive_indices() {
        let device = physical(QueueFamilies {
            graphics: Some((0, 4)),
            compute: Some((0, 4)),
            transfer: Some((1, 2)),
        });
        let info = DeviceCreateInfo {
            graphics_queue_count: 2,
            compute_queue_count: 1,
            transfer_queue_count: 1,
            ..Default::default()
        };
        let plan = QueuePlan::new(&device, &info).unwrap();

        assert_eq!(plan.families.get(&0), Some(&3));
        assert_eq!(plan.families.get(&1), Some(&1));
        assert_eq!(plan.locate(QueueKind::Graphics, 1).unwrap(), (0, 1));
        assert_eq!(plan.locate(QueueKind::Compute, 0).unwrap(), (0, 2));
        assert_eq!(plan.locate(QueueKind::Transfer, 0).unwrap(), (1, 0));
    }

    #[test]
    fn oversubscribed_family_aliases_queues() {
        let device = physical(QueueFamilies {
            graphics: Some((0, 1)),
            compute: Some((0, 1)),
            transfer: Some((0, 1)),
        });
        let info = DeviceCreateInfo {
            graphics_queue_count: 1,
            compute_queue_count: 1,
            ..Default::default()
        };
        let plan = QueuePlan::new(&device, &info).unwrap();
        assert_eq!(plan.families.get(&0), Some(&1));
        assert_eq!(plan.locate(QueueKind::Compute, 0).unwrap(), (0, 0));
        assert!(plan.locate(QueueKind::Transfer, 0).is_err());
    }

    #[test]
    fn missing_family_is_unsupported() {
        let device = physical(QueueFamilies {
            graphics: Some((0, 1)),
            ..Default::default()
        });
        let info = DeviceCreateInfo {
            compute_queue_count: 1,
            ..Default::default()
        };
        assert!(matches!(QueuePlan::new(&device, &info), Err(Error::Unsupported(_))));
    }
}
