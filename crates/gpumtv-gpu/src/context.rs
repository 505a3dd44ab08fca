//! The run-scoped GPU context.

use crate::capabilities::GpuCapabilities;
use crate::error::{GpuError, Result};
use crate::instance::{create_instance, select_physical_device};
use crate::memory::GpuAllocator;
use ash::vk;
use parking_lot::Mutex;
use std::ffi::{c_char, CStr};
use std::sync::Arc;

/// Instance, device, one graphics queue and the allocator.
///
/// Created once per conversion and dropped after every GPU resource of the
/// run has been released.
pub struct GpuContext {
    // Keeps the loader library mapped
    _entry: ash::Entry,
    instance: ash::Instance,
    device: Arc<ash::Device>,
    capabilities: GpuCapabilities,
    allocator: Mutex<GpuAllocator>,
    conservative_rasterization: bool,
    queue_family: u32,
    timestamp_valid_bits: u32,
    queue: vk::Queue,
}

impl GpuContext {
    pub fn device(&self) -> &ash::Device {
        &self.device
    }

    pub const fn capabilities(&self) -> &GpuCapabilities {
        &self.capabilities
    }

    pub const fn graphics_queue(&self) -> vk::Queue {
        self.queue
    }

    pub const fn graphics_queue_family(&self) -> u32 {
        self.queue_family
    }

    /// Meaningful bits of a timestamp on the graphics queue; zero when the
    /// queue cannot write timestamps.
    pub const fn timestamp_valid_bits(&self) -> u32 {
        self.timestamp_valid_bits
    }

    /// Whether `VK_EXT_conservative_rasterization` was enabled.
    pub const fn conservative_rasterization(&self) -> bool {
        self.conservative_rasterization
    }

    pub const fn allocator(&self) -> &Mutex<GpuAllocator> {
        &self.allocator
    }

    pub fn wait_idle(&self) -> Result<()> {
        unsafe { self.device.device_wait_idle()? };
        Ok(())
    }
}

impl Drop for GpuContext {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();
            // Device memory must go before the device
            self.allocator.lock().shutdown();
            self.device.destroy_device(None);
            self.instance.destroy_instance(None);
        }
    }
}

/// Builder for [`GpuContext`].
pub struct GpuContextBuilder {
    app_name: String,
    enable_validation: bool,
}

impl Default for GpuContextBuilder {
    fn default() -> Self {
        Self {
            app_name: "gpu-mtv".to_string(),
            enable_validation: cfg!(debug_assertions),
        }
    }
}

impl GpuContextBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request the Khronos validation layer.
    #[must_use]
    pub const fn validation(mut self, enable: bool) -> Self {
        self.enable_validation = enable;
        self
    }

    /// Load Vulkan, pick a device and create the context.
    pub fn build(self) -> Result<GpuContext> {
        let entry = unsafe { ash::Entry::load() }
            .map_err(|e| GpuError::LoaderUnavailable(e.to_string()))?;
        let instance = unsafe { create_instance(&entry, &self.app_name, self.enable_validation) }?;

        let parts = match unsafe { open_device(&instance) } {
            Ok(parts) => parts,
            Err(e) => {
                unsafe { instance.destroy_instance(None) };
                return Err(e);
            }
        };

        Ok(GpuContext {
            _entry: entry,
            instance,
            device: parts.device,
            capabilities: parts.capabilities,
            allocator: Mutex::new(parts.allocator),
            conservative_rasterization: parts.conservative_rasterization,
            queue_family: parts.queue_family,
            timestamp_valid_bits: parts.timestamp_valid_bits,
            queue: parts.queue,
        })
    }
}

struct DeviceParts {
    device: Arc<ash::Device>,
    capabilities: GpuCapabilities,
    allocator: GpuAllocator,
    conservative_rasterization: bool,
    queue_family: u32,
    timestamp_valid_bits: u32,
    queue: vk::Queue,
}

/// Everything that lives on top of the instance. On error nothing created
/// here survives.
unsafe fn open_device(instance: &ash::Instance) -> Result<DeviceParts> {
    let physical_device = select_physical_device(instance)?;
    let capabilities = GpuCapabilities::query(instance, physical_device);

    let missing = capabilities.missing_requirements();
    if !missing.is_empty() {
        return Err(GpuError::NoSuitableDevice(format!(
            "{} lacks {}",
            capabilities.device_name,
            missing.join(", ")
        )));
    }
    tracing::info!("Selected GPU: {}", capabilities.summary());

    let families = instance.get_physical_device_queue_family_properties(physical_device);
    let queue_family = graphics_queue_family(&families)?;
    let timestamp_valid_bits = families[queue_family as usize].timestamp_valid_bits;
    if timestamp_valid_bits == 0 {
        tracing::debug!("Graphics queue has no timestamps; per-sector device time disabled");
    }
    let conservative_rasterization = capabilities.supports_conservative_rasterization;
    if !conservative_rasterization {
        tracing::warn!("Conservative rasterization unavailable; thin geometry may leave gaps");
    }

    let device = Arc::new(create_device(
        instance,
        physical_device,
        queue_family,
        &device_extensions(conservative_rasterization),
    )?);
    let queue = device.get_device_queue(queue_family, 0);

    let allocator = match GpuAllocator::new(instance, Arc::clone(&device), physical_device) {
        Ok(allocator) => allocator,
        Err(e) => {
            device.destroy_device(None);
            return Err(e);
        }
    };

    Ok(DeviceParts {
        device,
        capabilities,
        allocator,
        conservative_rasterization,
        queue_family,
        timestamp_valid_bits,
        queue,
    })
}

/// Index of the first family that can do graphics work.
fn graphics_queue_family(families: &[vk::QueueFamilyProperties]) -> Result<u32> {
    families
        .iter()
        .position(|family| family.queue_flags.contains(vk::QueueFlags::GRAPHICS))
        .map(|index| index as u32)
        .ok_or_else(|| GpuError::NoSuitableDevice("no graphics queue family".to_string()))
}

fn device_extensions(conservative_rasterization: bool) -> Vec<&'static CStr> {
    if conservative_rasterization {
        vec![ash::ext::conservative_rasterization::NAME]
    } else {
        Vec::new()
    }
}

/// Create the logical device with dynamic rendering, synchronization2, the
/// geometry stage and fragment stores enabled.
unsafe fn create_device(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    queue_family: u32,
    extensions: &[&CStr],
) -> Result<ash::Device> {
    let priorities = [1.0_f32];
    let queue_info = vk::DeviceQueueCreateInfo::default()
        .queue_family_index(queue_family)
        .queue_priorities(&priorities);
    let extension_names: Vec<*const c_char> = extensions.iter().map(|ext| ext.as_ptr()).collect();

    let mut vulkan_13 = vk::PhysicalDeviceVulkan13Features::default()
        .dynamic_rendering(true)
        .synchronization2(true);
    let core = vk::PhysicalDeviceFeatures::default()
        .geometry_shader(true)
        .fragment_stores_and_atomics(true);
    let mut features = vk::PhysicalDeviceFeatures2::default()
        .features(core)
        .push_next(&mut vulkan_13);

    let info = vk::DeviceCreateInfo::default()
        .queue_create_infos(std::slice::from_ref(&queue_info))
        .enabled_extension_names(&extension_names)
        .push_next(&mut features);

    Ok(instance.create_device(physical_device, &info, None)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: 1,
            ..Default::default()
        }
    }

    #[test]
    fn first_graphics_family_wins() {
        let families = [
            family(vk::QueueFlags::TRANSFER),
            family(vk::QueueFlags::COMPUTE),
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE),
            family(vk::QueueFlags::GRAPHICS),
        ];
        assert_eq!(graphics_queue_family(&families).unwrap(), 2);
    }

    #[test]
    fn compute_only_devices_are_rejected() {
        let families = [family(vk::QueueFlags::COMPUTE)];
        assert!(matches!(
            graphics_queue_family(&families),
            Err(GpuError::NoSuitableDevice(_))
        ));
    }

    #[test]
    fn conservative_extension_only_when_enabled() {
        assert!(device_extensions(false).is_empty());
        assert_eq!(
            device_extensions(true),
            vec![ash::ext::conservative_rasterization::NAME]
        );
    }
}
