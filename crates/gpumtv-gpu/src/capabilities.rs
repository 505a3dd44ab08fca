//! What the selected device can do for voxelization.

use ash::vk;
use std::ffi::CStr;

/// GPU vendor, from the PCI vendor ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GpuVendor {
    Nvidia,
    Amd,
    Intel,
    Apple,
    Other(u32),
}

impl GpuVendor {
    pub const fn from_vendor_id(id: u32) -> Self {
        match id {
            0x10DE => Self::Nvidia,
            0x1002 => Self::Amd,
            0x8086 => Self::Intel,
            0x106B => Self::Apple,
            other => Self::Other(other),
        }
    }
}

/// Whether `version` is Vulkan 1.3 or newer.
pub const fn is_vulkan_1_3(version: u32) -> bool {
    let major = vk::api_version_major(version);
    major > 1 || (major == 1 && vk::api_version_minor(version) >= 3)
}

/// Features and limits of the selected device that the voxelizer consults.
#[derive(Debug, Clone)]
pub struct GpuCapabilities {
    pub vendor: GpuVendor,
    pub device_name: String,
    pub api_version: u32,

    pub supports_geometry_shader: bool,
    /// Storage image writes from the fragment stage
    pub supports_fragment_stores: bool,
    pub supports_conservative_rasterization: bool,
    /// `R8_UINT` is usable as an optimally tiled storage image and copy
    /// source/destination; otherwise targets fall back to `R8G8B8A8_UNORM`
    pub supports_r8_uint_storage: bool,

    pub max_image_dimension_3d: u32,
    pub max_push_constants_size: u32,
    /// Nanoseconds per timestamp tick
    pub timestamp_period: f32,
    pub device_local_memory_mb: u64,
}

impl GpuCapabilities {
    /// # Safety
    /// The instance and physical device must be valid.
    pub unsafe fn query(instance: &ash::Instance, physical_device: vk::PhysicalDevice) -> Self {
        let properties = instance.get_physical_device_properties(physical_device);
        let features = instance.get_physical_device_features(physical_device);
        let memory = instance.get_physical_device_memory_properties(physical_device);

        let conservative = instance
            .enumerate_device_extension_properties(physical_device)
            .unwrap_or_default()
            .iter()
            .any(|ext| {
                CStr::from_ptr(ext.extension_name.as_ptr())
                    == ash::ext::conservative_rasterization::NAME
            });

        let r8_uint =
            instance.get_physical_device_format_properties(physical_device, vk::Format::R8_UINT);
        let r8_uint_storage = r8_uint.optimal_tiling_features.contains(
            vk::FormatFeatureFlags::STORAGE_IMAGE
                | vk::FormatFeatureFlags::TRANSFER_SRC
                | vk::FormatFeatureFlags::TRANSFER_DST,
        );

        let device_local_memory_mb = memory
            .memory_heaps
            .iter()
            .take(memory.memory_heap_count as usize)
            .filter(|heap| heap.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL))
            .map(|heap| heap.size >> 20)
            .sum();

        Self {
            vendor: GpuVendor::from_vendor_id(properties.vendor_id),
            device_name: CStr::from_ptr(properties.device_name.as_ptr())
                .to_string_lossy()
                .into_owned(),
            api_version: properties.api_version,
            supports_geometry_shader: features.geometry_shader == vk::TRUE,
            supports_fragment_stores: features.fragment_stores_and_atomics == vk::TRUE,
            supports_conservative_rasterization: conservative,
            supports_r8_uint_storage: r8_uint_storage,
            max_image_dimension_3d: properties.limits.max_image_dimension3_d,
            max_push_constants_size: properties.limits.max_push_constants_size,
            timestamp_period: properties.limits.timestamp_period,
            device_local_memory_mb,
        }
    }

    /// Requirements the device does not meet; empty if it can voxelize.
    ///
    /// Dynamic rendering and synchronization2 are core in 1.3, so the
    /// version check covers them.
    pub fn missing_requirements(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if !is_vulkan_1_3(self.api_version) {
            missing.push("Vulkan 1.3");
        }
        if !self.supports_geometry_shader {
            missing.push("geometry shaders");
        }
        if !self.supports_fragment_stores {
            missing.push("fragment stores and atomics");
        }
        missing
    }

    pub fn summary(&self) -> String {
        format!(
            "{} ({:?}) - Vulkan {}.{}.{} - {} MB VRAM - max 3D image {}",
            self.device_name,
            self.vendor,
            vk::api_version_major(self.api_version),
            vk::api_version_minor(self.api_version),
            vk::api_version_patch(self.api_version),
            self.device_local_memory_mb,
            self.max_image_dimension_3d,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capable() -> GpuCapabilities {
        GpuCapabilities {
            vendor: GpuVendor::Amd,
            device_name: "Test GPU".to_string(),
            api_version: vk::API_VERSION_1_3,
            supports_geometry_shader: true,
            supports_fragment_stores: true,
            supports_conservative_rasterization: false,
            supports_r8_uint_storage: true,
            max_image_dimension_3d: 2048,
            max_push_constants_size: 128,
            timestamp_period: 1.0,
            device_local_memory_mb: 4096,
        }
    }

    #[test]
    fn vendor_identification() {
        assert_eq!(GpuVendor::from_vendor_id(0x10DE), GpuVendor::Nvidia);
        assert_eq!(GpuVendor::from_vendor_id(0x8086), GpuVendor::Intel);
        assert_eq!(GpuVendor::from_vendor_id(0x1234), GpuVendor::Other(0x1234));
    }

    #[test]
    fn version_gate() {
        assert!(is_vulkan_1_3(vk::API_VERSION_1_3));
        assert!(is_vulkan_1_3(vk::make_api_version(0, 1, 4, 0)));
        assert!(is_vulkan_1_3(vk::make_api_version(0, 2, 0, 0)));
        assert!(!is_vulkan_1_3(vk::API_VERSION_1_2));
    }

    #[test]
    fn requirements() {
        let caps = capable();
        assert!(caps.missing_requirements().is_empty());
        assert!(caps.summary().contains("Test GPU (Amd) - Vulkan 1.3.0 - 4096 MB"));

        let caps = GpuCapabilities {
            supports_geometry_shader: false,
            api_version: vk::API_VERSION_1_2,
            ..capable()
        };
        assert_eq!(caps.missing_requirements(), vec!["Vulkan 1.3", "geometry shaders"]);
    }
}
