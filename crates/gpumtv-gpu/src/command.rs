//! Command recording and submission.
//!
//! Every command buffer in gpu-mtv is primary, recorded for a single
//! submission and reset before it is recorded again.

use std::time::Duration;

use crate::error::{GpuError, Result};
use crate::sync::{create_fence, wait_for_fence};
use ash::vk;

/// Pool whose command buffers can be reset individually.
pub struct CommandPool {
    pool: vk::CommandPool,
}

impl CommandPool {
    /// Create a pool for `queue_family`.
    ///
    /// # Safety
    /// The device must be valid and the queue family must exist.
    pub unsafe fn new(device: &ash::Device, queue_family: u32) -> Result<Self> {
        let info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(queue_family)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);

        Ok(Self {
            pool: device.create_command_pool(&info, None)?,
        })
    }

    /// A pool owning nothing; destroying it is a no-op.
    pub const fn null() -> Self {
        Self {
            pool: vk::CommandPool::null(),
        }
    }

    pub const fn handle(&self) -> vk::CommandPool {
        self.pool
    }

    /// Allocate one primary command buffer.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn allocate_primary(&self, device: &ash::Device) -> Result<vk::CommandBuffer> {
        let info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);

        Ok(device.allocate_command_buffers(&info)?[0])
    }

    /// Destroy the pool and every command buffer allocated from it.
    ///
    /// # Safety
    /// The device must be valid and no command buffer of the pool may be
    /// pending.
    pub unsafe fn destroy(&self, device: &ash::Device) {
        device.destroy_command_pool(self.pool, None);
    }
}

/// Reset `cmd` and begin recording it for a single submission.
///
/// # Safety
/// The device and command buffer must be valid and the buffer not pending.
pub unsafe fn begin_one_time(device: &ash::Device, cmd: vk::CommandBuffer) -> Result<()> {
    device.reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())?;
    let info =
        vk::CommandBufferBeginInfo::default().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
    device.begin_command_buffer(cmd, &info)?;
    Ok(())
}

/// Finish recording `cmd`.
///
/// # Safety
/// The device and command buffer must be valid and recording.
pub unsafe fn end(device: &ash::Device, cmd: vk::CommandBuffer) -> Result<()> {
    device.end_command_buffer(cmd)?;
    Ok(())
}

/// Submit one command buffer; `fence` signals when the device is done.
///
/// # Safety
/// All handles must be valid and `fence` unsignaled.
pub unsafe fn submit(
    device: &ash::Device,
    queue: vk::Queue,
    cmd: vk::CommandBuffer,
    fence: vk::Fence,
) -> Result<()> {
    let command_buffers = [cmd];
    let info = vk::SubmitInfo::default().command_buffers(&command_buffers);
    device.queue_submit(queue, &[info], fence)?;
    Ok(())
}

/// Whether resources referenced by a submission may still be in use by the
/// device after it finished with `result`.
///
/// Only a timed-out wait leaves work pending; on success the fence has
/// signaled and every other error happens before or instead of execution.
pub fn device_may_still_use<T>(result: &Result<T>) -> bool {
    matches!(result, Err(GpuError::Timeout(_)))
}

/// Record commands with `record`, submit them and wait up to `timeout` for
/// completion. Used for uploads before the first sector.
///
/// # Safety
/// All handles must be valid.
pub unsafe fn submit_one_shot<F>(
    device: &ash::Device,
    pool: &CommandPool,
    queue: vk::Queue,
    timeout: Duration,
    record: F,
) -> Result<()>
where
    F: FnOnce(vk::CommandBuffer),
{
    let cmd = pool.allocate_primary(device)?;
    let fence = match create_fence(device, false) {
        Ok(fence) => fence,
        Err(e) => {
            device.free_command_buffers(pool.handle(), &[cmd]);
            return Err(e);
        }
    };

    let result = begin_one_time(device, cmd)
        .and_then(|()| {
            record(cmd);
            end(device, cmd)
        })
        .and_then(|()| submit(device, queue, cmd, fence))
        .and_then(|()| wait_for_fence(device, fence, timeout));

    // Otherwise the pool and device teardown reclaim them
    if !device_may_still_use(&result) {
        device.free_command_buffers(pool.handle(), &[cmd]);
        device.destroy_fence(fence, None);
    }
    result
}
