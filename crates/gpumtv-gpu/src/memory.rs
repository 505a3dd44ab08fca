//! Buffer and image memory through gpu-allocator.
//!
//! Render targets live in `GpuOnly` memory, uniforms in `CpuToGpu` and
//! readback buffers in `GpuToCpu`; the latter two stay persistently mapped
//! so the host can write or read them without extra calls.

use crate::error::{GpuError, Result};
use ash::vk;
use gpu_allocator::vulkan::{
    Allocation, AllocationCreateDesc, AllocationScheme, Allocator, AllocatorCreateDesc,
};
use gpu_allocator::{AllocatorDebugSettings, MemoryLocation};
use std::sync::Arc;

/// Owner of every device allocation made during a run.
///
/// Must be shut down before the device is destroyed; [`crate::GpuContext`]
/// does this in its `Drop`.
pub struct GpuAllocator {
    allocator: Option<Allocator>,
    device: Arc<ash::Device>,
}

impl GpuAllocator {
    /// Create the allocator.
    ///
    /// # Safety
    /// The instance, device, and physical device must be valid.
    pub unsafe fn new(
        instance: &ash::Instance,
        device: Arc<ash::Device>,
        physical_device: vk::PhysicalDevice,
    ) -> Result<Self> {
        let debug_settings = AllocatorDebugSettings {
            log_memory_information: cfg!(debug_assertions),
            log_leaks_on_shutdown: true,
            store_stack_traces: cfg!(debug_assertions),
            ..AllocatorDebugSettings::default()
        };

        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.clone(),
            device: (*device).clone(),
            physical_device,
            debug_settings,
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        })
        .map_err(|e| GpuError::AllocationFailed(e.to_string()))?;

        Ok(Self {
            allocator: Some(allocator),
            device,
        })
    }

    fn inner(&mut self) -> Result<&mut Allocator> {
        self.allocator
            .as_mut()
            .ok_or_else(|| GpuError::InvalidState("allocator already shut down".to_string()))
    }

    fn allocate(
        &mut self,
        name: &str,
        requirements: vk::MemoryRequirements,
        location: MemoryLocation,
        linear: bool,
    ) -> Result<Allocation> {
        self.inner()?
            .allocate(&AllocationCreateDesc {
                name,
                requirements,
                location,
                linear,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            })
            .map_err(|e| GpuError::AllocationFailed(format!("{name}: {e}")))
    }

    fn release(&mut self, allocation: Option<Allocation>) -> Result<()> {
        match allocation {
            Some(allocation) => self
                .inner()?
                .free(allocation)
                .map_err(|e| GpuError::AllocationFailed(e.to_string())),
            None => Ok(()),
        }
    }

    /// Create a buffer and bind fresh memory to it.
    ///
    /// Nothing is leaked if allocation or binding fails.
    pub fn create_buffer(
        &mut self,
        size: u64,
        usage: vk::BufferUsageFlags,
        location: MemoryLocation,
        name: &str,
    ) -> Result<GpuBuffer> {
        let info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let device = Arc::clone(&self.device);
        let buffer = unsafe { device.create_buffer(&info, None)? };
        let requirements = unsafe { device.get_buffer_memory_requirements(buffer) };

        let bound = self
            .allocate(name, requirements, location, true)
            .and_then(|allocation| {
                match unsafe {
                    device.bind_buffer_memory(buffer, allocation.memory(), allocation.offset())
                } {
                    Ok(()) => Ok(allocation),
                    Err(e) => {
                        let _ = self.release(Some(allocation));
                        Err(e.into())
                    }
                }
            });

        match bound {
            Ok(allocation) => Ok(GpuBuffer {
                buffer,
                allocation: Some(allocation),
                size,
            }),
            Err(e) => {
                unsafe { device.destroy_buffer(buffer, None) };
                Err(e)
            }
        }
    }

    /// Create an image and bind fresh memory to it.
    ///
    /// Nothing is leaked if allocation or binding fails.
    pub fn create_image(
        &mut self,
        info: &vk::ImageCreateInfo,
        location: MemoryLocation,
        name: &str,
    ) -> Result<GpuImage> {
        let device = Arc::clone(&self.device);
        let image = unsafe { device.create_image(info, None)? };
        let requirements = unsafe { device.get_image_memory_requirements(image) };

        let linear = info.tiling == vk::ImageTiling::LINEAR;
        let bound = self
            .allocate(name, requirements, location, linear)
            .and_then(|allocation| {
                match unsafe {
                    device.bind_image_memory(image, allocation.memory(), allocation.offset())
                } {
                    Ok(()) => Ok(allocation),
                    Err(e) => {
                        let _ = self.release(Some(allocation));
                        Err(e.into())
                    }
                }
            });

        match bound {
            Ok(allocation) => Ok(GpuImage {
                image,
                allocation: Some(allocation),
                format: info.format,
                extent: info.extent,
            }),
            Err(e) => {
                unsafe { device.destroy_image(image, None) };
                Err(e)
            }
        }
    }

    /// Release a buffer and its memory. Null buffers are a no-op.
    pub fn free_buffer(&mut self, buffer: &mut GpuBuffer) -> Result<()> {
        let released = self.release(buffer.allocation.take());
        unsafe { self.device.destroy_buffer(buffer.buffer, None) };
        buffer.buffer = vk::Buffer::null();
        buffer.size = 0;
        released
    }

    /// Release an image and its memory. Null images are a no-op.
    pub fn free_image(&mut self, image: &mut GpuImage) -> Result<()> {
        let released = self.release(image.allocation.take());
        unsafe { self.device.destroy_image(image.image, None) };
        image.image = vk::Image::null();
        released
    }

    /// Drop the inner allocator, freeing every remaining block.
    ///
    /// Allocations still alive at this point are reported as leaks.
    pub fn shutdown(&mut self) {
        self.allocator.take();
    }
}

impl Drop for GpuAllocator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// A buffer with its memory.
pub struct GpuBuffer {
    pub buffer: vk::Buffer,
    pub allocation: Option<Allocation>,
    pub size: u64,
}

impl GpuBuffer {
    /// A buffer owning nothing; freeing it is a no-op.
    pub const fn null() -> Self {
        Self {
            buffer: vk::Buffer::null(),
            allocation: None,
            size: 0,
        }
    }

    /// Host view of the buffer contents, `size` bytes long.
    ///
    /// Only host-visible (`CpuToGpu`, `GpuToCpu`) buffers are mapped.
    pub fn mapped_bytes(&self) -> Result<&[u8]> {
        let slice = self
            .allocation
            .as_ref()
            .and_then(Allocation::mapped_slice)
            .ok_or_else(|| GpuError::InvalidState("buffer is not host visible".to_string()))?;
        slice
            .get(..self.size as usize)
            .ok_or_else(|| GpuError::InvalidState("mapping smaller than buffer".to_string()))
    }

    /// Copy `data` to the start of the buffer.
    pub fn write<T: bytemuck::Pod>(&mut self, data: &[T]) -> Result<()> {
        self.write_bytes(0, bytemuck::cast_slice(data))
    }

    /// Copy raw bytes into the buffer at `offset`.
    pub fn write_bytes(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        let size = self.size;
        let range = offset
            .checked_add(data.len() as u64)
            .filter(|&end| end <= size)
            .map(|end| offset as usize..end as usize)
            .ok_or_else(|| {
                GpuError::InvalidState(format!(
                    "write of {} bytes at {offset} overruns {size}-byte buffer",
                    data.len()
                ))
            })?;

        let mapped = self
            .allocation
            .as_mut()
            .and_then(Allocation::mapped_slice_mut)
            .ok_or_else(|| GpuError::InvalidState("buffer is not host visible".to_string()))?;
        mapped[range].copy_from_slice(data);
        Ok(())
    }
}

/// An image with its memory.
pub struct GpuImage {
    pub image: vk::Image,
    pub allocation: Option<Allocation>,
    pub format: vk::Format,
    pub extent: vk::Extent3D,
}

impl GpuImage {
    /// An image owning nothing; freeing it is a no-op.
    pub const fn null() -> Self {
        Self {
            image: vk::Image::null(),
            allocation: None,
            format: vk::Format::UNDEFINED,
            extent: vk::Extent3D {
                width: 0,
                height: 0,
                depth: 0,
            },
        }
    }

    /// Bytes per axis-aligned copy of the whole image at `texel_size`.
    pub const fn byte_size(&self, texel_size: u64) -> u64 {
        self.extent.width as u64 * self.extent.height as u64 * self.extent.depth as u64 * texel_size
    }
}
