//! Headless instance creation and physical device selection.

use crate::capabilities::is_vulkan_1_3;
use crate::error::{GpuError, Result};
use ash::vk;
use std::ffi::{c_char, CStr, CString};

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Create a Vulkan 1.3 instance without any surface extensions.
///
/// A requested validation layer that is not installed is skipped with a
/// warning.
///
/// # Safety
/// The entry must be a valid Vulkan entry point.
pub unsafe fn create_instance(
    entry: &ash::Entry,
    app_name: &str,
    enable_validation: bool,
) -> Result<ash::Instance> {
    let app_name = CString::new(app_name)
        .map_err(|e| GpuError::LoaderUnavailable(format!("invalid application name: {e}")))?;
    let version = vk::make_api_version(0, 0, 1, 0);
    let app_info = vk::ApplicationInfo::default()
        .application_name(&app_name)
        .application_version(version)
        .engine_name(c"gpu-mtv")
        .engine_version(version)
        .api_version(vk::API_VERSION_1_3);

    let mut layers: Vec<*const c_char> = Vec::new();
    if enable_validation {
        let available = entry.enumerate_instance_layer_properties()?;
        let installed = available
            .iter()
            .any(|props| CStr::from_ptr(props.layer_name.as_ptr()) == VALIDATION_LAYER);
        if installed {
            layers.push(VALIDATION_LAYER.as_ptr());
        } else {
            tracing::warn!(
                "{} not installed, continuing without it",
                VALIDATION_LAYER.to_string_lossy()
            );
        }
    }

    #[cfg(target_os = "macos")]
    let (extensions, flags) = (
        vec![ash::khr::portability_enumeration::NAME.as_ptr()],
        vk::InstanceCreateFlags::ENUMERATE_PORTABILITY_KHR,
    );
    #[cfg(not(target_os = "macos"))]
    let (extensions, flags): (Vec<*const c_char>, _) =
        (Vec::new(), vk::InstanceCreateFlags::empty());

    let create_info = vk::InstanceCreateInfo::default()
        .application_info(&app_info)
        .enabled_extension_names(&extensions)
        .enabled_layer_names(&layers)
        .flags(flags);

    Ok(entry.create_instance(&create_info, None)?)
}

/// What device selection looks at for one physical device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceCandidate {
    pub api_version: u32,
    pub device_type: vk::PhysicalDeviceType,
    pub geometry_shader: bool,
    pub fragment_stores: bool,
    pub device_local_bytes: u64,
    pub max_image_dimension_3d: u32,
}

impl DeviceCandidate {
    /// # Safety
    /// The instance and device must be valid.
    pub unsafe fn query(instance: &ash::Instance, device: vk::PhysicalDevice) -> Self {
        let properties = instance.get_physical_device_properties(device);
        let features = instance.get_physical_device_features(device);
        let memory = instance.get_physical_device_memory_properties(device);
        let device_local_bytes = memory
            .memory_heaps
            .iter()
            .take(memory.memory_heap_count as usize)
            .filter(|heap| heap.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL))
            .map(|heap| heap.size)
            .sum();

        Self {
            api_version: properties.api_version,
            device_type: properties.device_type,
            geometry_shader: features.geometry_shader == vk::TRUE,
            fragment_stores: features.fragment_stores_and_atomics == vk::TRUE,
            device_local_bytes,
            max_image_dimension_3d: properties.limits.max_image_dimension3_d,
        }
    }

    /// Selection score, or `None` if the device cannot voxelize at all.
    ///
    /// Discrete GPUs win over integrated ones; within a type more VRAM and
    /// larger 3D images break ties.
    pub fn score(&self) -> Option<u64> {
        if !is_vulkan_1_3(self.api_version) || !self.geometry_shader || !self.fragment_stores {
            return None;
        }

        let type_score = match self.device_type {
            vk::PhysicalDeviceType::DISCRETE_GPU => 1000,
            vk::PhysicalDeviceType::INTEGRATED_GPU => 100,
            vk::PhysicalDeviceType::VIRTUAL_GPU => 50,
            _ => 0,
        };
        let vram_gb = self.device_local_bytes >> 30;
        Some(1 + type_score + vram_gb + u64::from(self.max_image_dimension_3d / 256))
    }
}

/// Pick the highest scoring physical device able to voxelize.
///
/// # Safety
/// The instance must be valid.
pub unsafe fn select_physical_device(instance: &ash::Instance) -> Result<vk::PhysicalDevice> {
    let devices = instance.enumerate_physical_devices()?;
    if devices.is_empty() {
        return Err(GpuError::NoSuitableDevice("no Vulkan devices present".to_string()));
    }

    devices
        .into_iter()
        .filter_map(|device| {
            let score = DeviceCandidate::query(instance, device).score()?;
            Some((score, device))
        })
        .max_by_key(|(score, _)| *score)
        .map(|(_, device)| device)
        .ok_or_else(|| {
            GpuError::NoSuitableDevice(
                "no device supports Vulkan 1.3 with geometry shaders and fragment stores"
                    .to_string(),
            )
        })
}
